//! RBAC 管理器
//!
//! 生成 ServiceAccount、Role/ClusterRole 以及对应的绑定。同名角色重复写入时规则合并去重。

use k8s_openapi::api::core::v1::ServiceAccount;
use k8s_openapi::api::rbac::v1::{
    ClusterRole, ClusterRoleBinding, PolicyRule, Role, RoleBinding, RoleRef, Subject,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

use super::{component_labels, ObjectKind, Store, StoreObject};
use datadog_common::{ComponentName, Result};

const RBAC_API_GROUP: &str = "rbac.authorization.k8s.io";

/// 构造策略规则
pub fn policy_rule(api_groups: &[&str], resources: &[&str], verbs: &[&str]) -> PolicyRule {
    let to_vec = |items: &[&str]| items.iter().map(|s| s.to_string()).collect::<Vec<_>>();
    PolicyRule {
        api_groups: Some(to_vec(api_groups)),
        resources: Some(to_vec(resources)),
        verbs: to_vec(verbs),
        ..Default::default()
    }
}

fn merge_rules(existing: &mut Vec<PolicyRule>, rules: Vec<PolicyRule>) {
    for rule in rules {
        if !existing.contains(&rule) {
            existing.push(rule);
        }
    }
}

fn meta(name: &str, namespace: Option<&str>, component: Option<ComponentName>) -> ObjectMeta {
    ObjectMeta {
        name: Some(name.to_string()),
        namespace: namespace.map(str::to_string),
        labels: component.map(component_labels),
        ..Default::default()
    }
}

fn service_account_subject(name: &str, namespace: &str) -> Subject {
    Subject {
        kind: "ServiceAccount".to_string(),
        name: name.to_string(),
        namespace: Some(namespace.to_string()),
        api_group: None,
    }
}

pub struct RbacManager<'a> {
    store: &'a mut Store,
}

impl<'a> RbacManager<'a> {
    pub(super) fn new(store: &'a mut Store) -> Self {
        Self { store }
    }

    pub fn add_service_account_by_component(
        &mut self,
        namespace: &str,
        name: &str,
        component: ComponentName,
    ) -> Result<()> {
        self.store.add_or_update(ServiceAccount {
            metadata: meta(name, Some(namespace), Some(component)),
            ..Default::default()
        })
    }

    /// 命名空间级角色及绑定
    pub fn add_policy_rules_by_component(
        &mut self,
        namespace: &str,
        role_name: &str,
        service_account: &str,
        rules: Vec<PolicyRule>,
        component: Option<ComponentName>,
    ) -> Result<()> {
        let owner_namespace = self.store.owner().namespace.clone();
        self.add_policy_rules_for_subject(
            namespace,
            role_name,
            service_account,
            &owner_namespace,
            rules,
            component,
        )
    }

    /// 命名空间级角色，绑定到其他命名空间中的 ServiceAccount
    pub fn add_policy_rules_for_subject(
        &mut self,
        namespace: &str,
        role_name: &str,
        service_account: &str,
        service_account_namespace: &str,
        rules: Vec<PolicyRule>,
        component: Option<ComponentName>,
    ) -> Result<()> {
        let role = match self.store.get(ObjectKind::Role, namespace, role_name) {
            Some(StoreObject::Role(existing)) => {
                let mut role = existing.clone();
                merge_rules(role.rules.get_or_insert_with(Vec::new), rules);
                role
            }
            _ => Role {
                metadata: meta(role_name, Some(namespace), component),
                rules: Some(rules),
            },
        };
        self.store.add_or_update(role)?;
        self.store.add_or_update(RoleBinding {
            metadata: meta(role_name, Some(namespace), component),
            role_ref: RoleRef {
                api_group: RBAC_API_GROUP.to_string(),
                kind: "Role".to_string(),
                name: role_name.to_string(),
            },
            subjects: Some(vec![service_account_subject(
                service_account,
                service_account_namespace,
            )]),
        })
    }

    /// 集群级角色及绑定
    pub fn add_cluster_policy_rules_by_component(
        &mut self,
        role_name: &str,
        service_account: &str,
        rules: Vec<PolicyRule>,
        component: Option<ComponentName>,
    ) -> Result<()> {
        let role = match self.store.get(ObjectKind::ClusterRole, "", role_name) {
            Some(StoreObject::ClusterRole(existing)) => {
                let mut role = existing.clone();
                merge_rules(role.rules.get_or_insert_with(Vec::new), rules);
                role
            }
            _ => ClusterRole {
                metadata: meta(role_name, None, component),
                rules: Some(rules),
                aggregation_rule: None,
            },
        };
        self.store.add_or_update(role)?;
        let namespace = self.store.owner().namespace.clone();
        self.store.add_or_update(ClusterRoleBinding {
            metadata: meta(role_name, None, component),
            role_ref: RoleRef {
                api_group: RBAC_API_GROUP.to_string(),
                kind: "ClusterRole".to_string(),
                name: role_name.to_string(),
            },
            subjects: Some(vec![service_account_subject(service_account, &namespace)]),
        })
    }

    /// 绑定到已存在的集群角色，例如 `system:auth-delegator`
    pub fn add_cluster_role_binding(
        &mut self,
        binding_name: &str,
        service_account: &str,
        cluster_role: &str,
        component: Option<ComponentName>,
    ) -> Result<()> {
        let namespace = self.store.owner().namespace.clone();
        self.store.add_or_update(ClusterRoleBinding {
            metadata: meta(binding_name, None, component),
            role_ref: RoleRef {
                api_group: RBAC_API_GROUP.to_string(),
                kind: "ClusterRole".to_string(),
                name: cluster_role.to_string(),
            },
            subjects: Some(vec![service_account_subject(service_account, &namespace)]),
        })
    }

    /// 绑定到已存在的命名空间级角色
    pub fn add_role_binding(
        &mut self,
        namespace: &str,
        binding_name: &str,
        role_name: &str,
        service_account: &str,
        component: Option<ComponentName>,
    ) -> Result<()> {
        let owner_namespace = self.store.owner().namespace.clone();
        self.store.add_or_update(RoleBinding {
            metadata: meta(binding_name, Some(namespace), component),
            role_ref: RoleRef {
                api_group: RBAC_API_GROUP.to_string(),
                kind: "Role".to_string(),
                name: role_name.to_string(),
            },
            subjects: Some(vec![service_account_subject(
                service_account,
                &owner_namespace,
            )]),
        })
    }

    /// 删除某组件此前创建的全部 RBAC 对象
    pub fn delete_by_component(&mut self, component: ComponentName) {
        self.store.delete_by_component(component, &ObjectKind::RBAC);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::test_owner;

    #[test]
    fn test_role_rules_merged_and_deduplicated() {
        let mut store = Store::new(test_owner());
        let mut rbac = RbacManager::new(&mut store);
        let get_pods = policy_rule(&[""], &["pods"], &["get"]);
        let list_nodes = policy_rule(&[""], &["nodes"], &["list"]);
        rbac.add_policy_rules_by_component(
            "monitoring",
            "datadog-agent",
            "datadog-agent",
            vec![get_pods.clone()],
            Some(ComponentName::NodeAgent),
        )
        .unwrap();
        rbac.add_policy_rules_by_component(
            "monitoring",
            "datadog-agent",
            "datadog-agent",
            vec![get_pods, list_nodes],
            Some(ComponentName::NodeAgent),
        )
        .unwrap();

        match store.get(ObjectKind::Role, "monitoring", "datadog-agent") {
            Some(StoreObject::Role(role)) => assert_eq!(role.rules.as_ref().unwrap().len(), 2),
            other => panic!("unexpected {:?}", other),
        }
        assert!(store
            .get(ObjectKind::RoleBinding, "monitoring", "datadog-agent")
            .is_some());
    }

    #[test]
    fn test_cluster_role_binding_targets_owner_namespace() {
        let mut store = Store::new(test_owner());
        RbacManager::new(&mut store)
            .add_cluster_policy_rules_by_component(
                "datadog-cluster-agent",
                "datadog-cluster-agent",
                vec![policy_rule(&[""], &["nodes"], &["get"])],
                Some(ComponentName::ClusterAgent),
            )
            .unwrap();

        match store.get(ObjectKind::ClusterRoleBinding, "", "datadog-cluster-agent") {
            Some(StoreObject::ClusterRoleBinding(binding)) => {
                let subject = &binding.subjects.as_ref().unwrap()[0];
                assert_eq!(subject.namespace.as_deref(), Some("monitoring"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_delete_by_component_clears_rbac() {
        let mut store = Store::new(test_owner());
        let mut rbac = RbacManager::new(&mut store);
        rbac.add_service_account_by_component("monitoring", "sa", ComponentName::NodeAgent)
            .unwrap();
        rbac.delete_by_component(ComponentName::NodeAgent);
        assert!(store.is_empty());
        assert_eq!(store.deletions().count(), 1);
    }
}
