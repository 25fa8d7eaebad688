//! 密钥后端
//!
//! Agent 通过外部命令解析配置中的 `ENC[...]` 引用。命令参数以环境变量传入，
//! 读取 Secret 的权限可以是集群级的，也可以按命名空间逐个授予。

use k8s_openapi::api::rbac::v1::PolicyRule;

use crate::constants::{
    DD_SECRET_BACKEND_ARGUMENTS, DD_SECRET_BACKEND_COMMAND, DD_SECRET_BACKEND_TIMEOUT,
};
use crate::crd::DatadogAgent;
use crate::feature::RequiredComponents;
use crate::merger::{env, PodTemplateManagers};
use crate::store::{policy_rule, ResourceManagers};
use datadog_common::error::aggregate;
use datadog_common::{bool_value, ComponentName, Result, SecretBackendConfig, SecretBackendRole};

fn non_empty(value: Option<&String>) -> Option<&str> {
    value.map(String::as_str).filter(|v| !v.is_empty())
}

pub(super) fn apply_secret_backend(managers: &mut PodTemplateManagers, config: &SecretBackendConfig) {
    let mut envs = managers.env_var();
    if let Some(command) = non_empty(config.command.as_ref()) {
        envs.add_env_var(env(DD_SECRET_BACKEND_COMMAND, command));
    }
    if let Some(args) = non_empty(config.args.as_ref()) {
        envs.add_env_var(env(DD_SECRET_BACKEND_ARGUMENTS, args));
    }
    if let Some(timeout) = config.timeout.filter(|t| *t != 0) {
        envs.add_env_var(env(DD_SECRET_BACKEND_TIMEOUT, timeout.to_string()));
    }
}

fn role_rules(role: &SecretBackendRole) -> Vec<PolicyRule> {
    vec![PolicyRule {
        resource_names: Some(role.secrets.clone()),
        ..policy_rule(&[""], &["secrets"], &["get"])
    }]
}

/// 读取 Secret 的 RBAC
///
/// 列出了角色时只按命名空间授权，此时忽略 `enableGlobalPermissions`。第一个启用的组件
/// 拥有角色本身，其余组件只获得绑定。
pub(super) fn secret_backend_rbac(
    dda: &DatadogAgent,
    config: &SecretBackendConfig,
    resources: &mut ResourceManagers,
    required: &RequiredComponents,
) -> Result<()> {
    let components: Vec<ComponentName> = ComponentName::ALL
        .into_iter()
        .filter(|c| required.get(*c).is_enabled())
        .collect();
    let Some((owner, others)) = components.split_first() else {
        return Ok(());
    };
    let roles = config.roles.as_deref().unwrap_or_default();
    let mut errors = Vec::new();

    if roles.is_empty() && bool_value(config.enable_global_permissions) {
        let name = dda.child_name("secret-backend");
        if let Err(e) = resources.rbac().add_cluster_policy_rules_by_component(
            &name,
            &dda.service_account_name(*owner),
            vec![policy_rule(&[""], &["secrets"], &["get"])],
            Some(*owner),
        ) {
            errors.push(e);
        }
        for component in others {
            if let Err(e) = resources.rbac().add_cluster_role_binding(
                &format!("{}-{}", name, component.resource_suffix()),
                &dda.service_account_name(*component),
                &name,
                Some(*component),
            ) {
                errors.push(e);
            }
        }
    }

    for role in roles {
        let namespace = role
            .namespace
            .clone()
            .unwrap_or_else(|| dda.namespace_or_default());
        let name = dda.child_name(&format!("{}-secret-reader", namespace));
        if let Err(e) = resources.rbac().add_policy_rules_by_component(
            &namespace,
            &name,
            &dda.service_account_name(*owner),
            role_rules(role),
            Some(*owner),
        ) {
            errors.push(e);
        }
        for component in others {
            if let Err(e) = resources.rbac().add_role_binding(
                &namespace,
                &format!("{}-{}", name, component.resource_suffix()),
                &name,
                &dda.service_account_name(*component),
                Some(*component),
            ) {
                errors.push(e);
            }
        }
    }
    aggregate(errors)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feature::test_utils::{dda_with_features, resource_managers};
    use crate::feature::RequiredComponent;
    use crate::merger::test_utils::{env_value, template_with};
    use crate::store::{ObjectKind, StoreObject};
    use datadog_common::{ContainerName, DatadogFeatures};

    fn required() -> RequiredComponents {
        RequiredComponents {
            agent: RequiredComponent::required(&[ContainerName::CoreAgent]),
            cluster_agent: RequiredComponent::required(&[ContainerName::ClusterAgent]),
            ..Default::default()
        }
    }

    #[test]
    fn test_env_skips_empty_values() {
        let config = SecretBackendConfig {
            command: Some("/readsecret.sh".to_string()),
            args: Some(String::new()),
            timeout: Some(30),
            ..Default::default()
        };
        let mut managers = PodTemplateManagers::new(template_with(&[ContainerName::CoreAgent], &[]));
        apply_secret_backend(&mut managers, &config);
        let template = managers.finalize();
        let value = |name| env_value(&template, ContainerName::CoreAgent, name);
        assert_eq!(value(DD_SECRET_BACKEND_COMMAND).as_deref(), Some("/readsecret.sh"));
        assert_eq!(value(DD_SECRET_BACKEND_ARGUMENTS), None);
        assert_eq!(value(DD_SECRET_BACKEND_TIMEOUT).as_deref(), Some("30"));
    }

    #[test]
    fn test_global_permissions() {
        let dda = dda_with_features(DatadogFeatures::default());
        let config = SecretBackendConfig {
            enable_global_permissions: Some(true),
            ..Default::default()
        };
        let mut resources = resource_managers();
        secret_backend_rbac(&dda, &config, &mut resources, &required()).unwrap();
        let store = resources.store();
        assert!(store
            .get(ObjectKind::ClusterRole, "", "datadog-secret-backend")
            .is_some());
        match store.get(
            ObjectKind::ClusterRoleBinding,
            "",
            "datadog-secret-backend-cluster-agent",
        ) {
            Some(StoreObject::ClusterRoleBinding(binding)) => {
                assert_eq!(binding.role_ref.name, "datadog-secret-backend");
                assert_eq!(binding.subjects.as_ref().unwrap()[0].name, "datadog-cluster-agent");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_roles_take_precedence_over_global_permissions() {
        let dda = dda_with_features(DatadogFeatures::default());
        let config = SecretBackendConfig {
            enable_global_permissions: Some(true),
            roles: Some(vec![SecretBackendRole {
                namespace: Some("apps".to_string()),
                secrets: vec!["db-password".to_string()],
            }]),
            ..Default::default()
        };
        let mut resources = resource_managers();
        secret_backend_rbac(&dda, &config, &mut resources, &required()).unwrap();
        let store = resources.store();
        assert!(store
            .get(ObjectKind::ClusterRole, "", "datadog-secret-backend")
            .is_none());
        match store.get(ObjectKind::Role, "apps", "datadog-apps-secret-reader") {
            Some(StoreObject::Role(role)) => {
                let rule = &role.rules.as_ref().unwrap()[0];
                assert_eq!(rule.resource_names, Some(vec!["db-password".to_string()]));
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(store
            .get(
                ObjectKind::RoleBinding,
                "apps",
                "datadog-apps-secret-reader-cluster-agent"
            )
            .is_some());
    }
}
