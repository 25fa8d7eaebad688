//! Kubernetes 事件采集特性
//!
//! 事件由 Cluster Agent 的领导者实例采集。

use k8s_openapi::api::rbac::v1::PolicyRule;

use super::{Feature, FeatureId, Options, RequiredComponent, RequiredComponents};
use crate::constants::{
    DD_CLUSTER_AGENT_TOKEN_NAME, DD_COLLECT_KUBERNETES_EVENTS, DD_LEADER_ELECTION,
    DD_LEADER_LEASE_NAME,
};
use crate::crd::DatadogAgent;
use crate::merger::{env, PodTemplateManagers};
use crate::store::{policy_rule, ResourceManagers};
use datadog_common::{bool_value, ComponentName, ContainerName, Result};

fn event_rules(token_name: &str) -> Vec<PolicyRule> {
    vec![
        policy_rule(&[""], &["events"], &["get", "list", "watch"]),
        PolicyRule {
            resource_names: Some(vec![token_name.to_string()]),
            ..policy_rule(&[""], &["configmaps"], &["get", "update"])
        },
    ]
}

#[derive(Debug, Default)]
struct EventCollectionFeature {
    rbac_name: String,
    service_account: String,
    leader_election_name: String,
    token_name: String,
}

pub(super) fn build(_options: &Options) -> Box<dyn Feature> {
    Box::<EventCollectionFeature>::default()
}

impl Feature for EventCollectionFeature {
    fn id(&self) -> FeatureId {
        FeatureId::EventCollection
    }

    fn configure(&mut self, dda: &DatadogAgent) -> RequiredComponents {
        let enabled = dda
            .features()
            .event_collection
            .and_then(|c| c.collect_kubernetes_events);
        if !bool_value(enabled) {
            return RequiredComponents::default();
        }

        self.rbac_name = dda.rbac_resource_name(ComponentName::ClusterAgent);
        self.service_account = dda.service_account_name(ComponentName::ClusterAgent);
        self.leader_election_name = dda.child_name("leader-election");
        self.token_name = dda.child_name("token");

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
        managers.rbac().add_cluster_policy_rules_by_component(
            &self.rbac_name,
            &self.service_account,
            event_rules(&self.token_name),
            Some(ComponentName::ClusterAgent),
        )
    }

    fn manage_cluster_agent(&self, managers: &mut PodTemplateManagers) -> Result<()> {
        let container = ContainerName::ClusterAgent;
        let mut envs = managers.env_var();
        envs.add_env_var_to_container(container, env(DD_COLLECT_KUBERNETES_EVENTS, "true"));
        envs.add_env_var_to_container(container, env(DD_LEADER_ELECTION, "true"));
        envs.add_env_var_to_container(
            container,
            env(DD_LEADER_LEASE_NAME, self.leader_election_name.clone()),
        );
        envs.add_env_var_to_container(
            container,
            env(DD_CLUSTER_AGENT_TOKEN_NAME, self.token_name.clone()),
        );
        Ok(())
    }
}
