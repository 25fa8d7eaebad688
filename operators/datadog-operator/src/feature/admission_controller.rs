//! 准入控制器特性
//!
//! Cluster Agent 内置的准入 Webhook 为应用 Pod 注入 Agent 地址与标签。特性负责
//! Webhook 所需的 Service 与 RBAC，并通过环境变量配置 Cluster Agent。

use k8s_openapi::api::rbac::v1::PolicyRule;

use super::{Feature, FeatureId, Options, RequiredComponent, RequiredComponents};
use crate::constants::{
    DD_ADMISSION_CONTROLLER_ENABLED, DD_ADMISSION_CONTROLLER_INJECT_CONFIG_MODE,
    DD_ADMISSION_CONTROLLER_LOCAL_SERVICE_NAME, DD_ADMISSION_CONTROLLER_MUTATE_UNLABELLED,
    DD_ADMISSION_CONTROLLER_SERVICE_NAME, DD_ADMISSION_CONTROLLER_WEBHOOK_NAME,
};
use crate::crd::DatadogAgent;
use crate::merger::{env, PodTemplateManagers};
use crate::store::{policy_rule, service_port, ResourceManagers};
use datadog_common::error::aggregate;
use datadog_common::{bool_value, ComponentName, ContainerName, Result};

const WEBHOOK_PORT_NAME: &str = "datadog-webhook";
const WEBHOOK_SERVICE_PORT: i32 = 443;
const WEBHOOK_TARGET_PORT: i32 = 8000;
const DEFAULT_WEBHOOK_NAME: &str = "datadog-webhook";
const SOCKET_COMMUNICATION_MODE: &str = "socket";

fn webhook_cluster_rules(webhook_name: &str) -> Vec<PolicyRule> {
    let read = ["get", "list", "watch"];
    vec![
        policy_rule(
            &["admissionregistration.k8s.io"],
            &["mutatingwebhookconfigurations", "validatingwebhookconfigurations"],
            &["get", "list", "watch", "update", "create"],
        ),
        PolicyRule {
            resource_names: Some(vec![webhook_name.to_string()]),
            ..policy_rule(
                &["admissionregistration.k8s.io"],
                &["mutatingwebhookconfigurations", "validatingwebhookconfigurations"],
                &["delete"],
            )
        },
        policy_rule(&["batch"], &["jobs", "cronjobs"], &["get"]),
        policy_rule(&["apps"], &["statefulsets", "replicasets", "deployments"], &["get"]),
        policy_rule(&[""], &["pods", "namespaces"], &read),
    ]
}

/// Webhook 证书保存在 Cluster Agent 所在命名空间的 Secret 中
fn webhook_namespace_rules() -> Vec<PolicyRule> {
    vec![policy_rule(
        &[""],
        &["secrets"],
        &["get", "list", "watch", "update", "create"],
    )]
}

#[derive(Debug, Default)]
struct AdmissionControllerFeature {
    mutate_unlabelled: bool,
    service_name: String,
    webhook_name: String,
    agent_communication_mode: Option<String>,
    local_service_name: String,
    namespace: String,
    rbac_name: String,
    service_account: String,
}

pub(super) fn build(_options: &Options) -> Box<dyn Feature> {
    Box::<AdmissionControllerFeature>::default()
}

/// 未显式指定通信方式时，APM 或 DogStatsD 启用了 Unix 套接字则使用 `socket`
fn default_communication_mode(dda: &DatadogAgent) -> Option<String> {
    let features = dda.features();
    let apm_socket = features.apm.as_ref().map_or(false, |apm| {
        bool_value(apm.enabled)
            && apm
                .unix_domain_socket_config
                .as_ref()
                .map_or(false, |c| bool_value(c.enabled))
    });
    let dsd_socket = features.dogstatsd.as_ref().map_or(false, |dsd| {
        dsd.unix_domain_socket_config
            .as_ref()
            .map_or(false, |c| bool_value(c.enabled))
    });
    (apm_socket || dsd_socket).then(|| SOCKET_COMMUNICATION_MODE.to_string())
}

impl Feature for AdmissionControllerFeature {
    fn id(&self) -> FeatureId {
        FeatureId::AdmissionController
    }

    fn configure(&mut self, dda: &DatadogAgent) -> RequiredComponents {
        let features = dda.features();
        let Some(config) = features
            .admission_controller
            .filter(|c| bool_value(c.enabled))
        else {
            return RequiredComponents::default();
        };

        self.mutate_unlabelled = bool_value(config.mutate_unlabelled);
        self.service_name = config
            .service_name
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| dda.child_name("admission-controller"));
        self.webhook_name = DEFAULT_WEBHOOK_NAME.to_string();
        self.agent_communication_mode = config
            .agent_communication_mode
            .filter(|m| !m.is_empty())
            .or_else(|| default_communication_mode(dda));
        self.local_service_name = dda.child_name(ComponentName::NodeAgent.resource_suffix());
        self.namespace = dda.namespace_or_default();
        self.rbac_name = dda.rbac_resource_name(ComponentName::ClusterAgent);
        self.service_account = dda.service_account_name(ComponentName::ClusterAgent);

        RequiredComponents {
            cluster_agent: RequiredComponent::required(&[ContainerName::ClusterAgent]),
            ..Default::default()
        }
    }

    fn manage_dependencies(
        &self,
        managers: &mut ResourceManagers,
        _components: &RequiredComponents,
    ) -> Result<()> {
        let mut errors = Vec::new();
        if let Err(e) = managers.service().add_component_service(
            &self.service_name,
            ComponentName::ClusterAgent,
            vec![service_port(
                WEBHOOK_PORT_NAME,
                WEBHOOK_SERVICE_PORT,
                WEBHOOK_TARGET_PORT,
            )],
        ) {
            errors.push(e);
        }
        if let Err(e) = managers.rbac().add_cluster_policy_rules_by_component(
            &self.rbac_name,
            &self.service_account,
            webhook_cluster_rules(&self.webhook_name),
            Some(ComponentName::ClusterAgent),
        ) {
            errors.push(e);
        }
        if let Err(e) = managers.rbac().add_policy_rules_by_component(
            &self.namespace,
            &self.rbac_name,
            &self.service_account,
            webhook_namespace_rules(),
            Some(ComponentName::ClusterAgent),
        ) {
            errors.push(e);
        }
        aggregate(errors)
    }

    fn manage_cluster_agent(&self, managers: &mut PodTemplateManagers) -> Result<()> {
        let container = ContainerName::ClusterAgent;
        let mut envs = managers.env_var();
        envs.add_env_var_to_container(container, env(DD_ADMISSION_CONTROLLER_ENABLED, "true"));
        envs.add_env_var_to_container(
            container,
            env(
                DD_ADMISSION_CONTROLLER_MUTATE_UNLABELLED,
                self.mutate_unlabelled.to_string(),
            ),
        );
        envs.add_env_var_to_container(
            container,
            env(DD_ADMISSION_CONTROLLER_SERVICE_NAME, self.service_name.clone()),
        );
        if let Some(mode) = &self.agent_communication_mode {
            envs.add_env_var_to_container(
                container,
                env(DD_ADMISSION_CONTROLLER_INJECT_CONFIG_MODE, mode.clone()),
            );
        }
        envs.add_env_var_to_container(
            container,
            env(
                DD_ADMISSION_CONTROLLER_LOCAL_SERVICE_NAME,
                self.local_service_name.clone(),
            ),
        );
        envs.add_env_var_to_container(
            container,
            env(DD_ADMISSION_CONTROLLER_WEBHOOK_NAME, self.webhook_name.clone()),
        );
        Ok(())
    }
}
