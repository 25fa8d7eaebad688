//! 外部指标服务特性
//!
//! Cluster Agent 充当 `external.metrics.k8s.io` 的提供者，供 HPA 使用 Datadog 指标。

use k8s_openapi::api::rbac::v1::PolicyRule;

use super::{bool_to_string, Feature, FeatureId, Options, RequiredComponent, RequiredComponents};
use crate::constants::{
    DD_EXTERNAL_METRICS_PROVIDER_ENABLED, DD_EXTERNAL_METRICS_PROVIDER_PORT,
    DD_EXTERNAL_METRICS_PROVIDER_USE_DATADOGMETRIC_CRD, DEFAULT_METRICS_PROVIDER_PORT,
};
use crate::crd::DatadogAgent;
use crate::merger::{container_port, env, PodTemplateManagers};
use crate::store::{policy_rule, service_port, ResourceManagers};
use datadog_common::error::aggregate;
use datadog_common::{bool_value, ComponentName, ContainerName, Result};

const METRICS_API_PORT_NAME: &str = "metricsapi";
const AUTH_DELEGATOR_ROLE: &str = "system:auth-delegator";

fn external_metrics_rules(use_datadog_metrics: bool) -> Vec<PolicyRule> {
    let mut rules = vec![
        policy_rule(&["external.metrics.k8s.io"], &["*"], &["list", "watch"]),
        policy_rule(&["autoscaling"], &["horizontalpodautoscalers"], &["list", "watch"]),
        policy_rule(&[""], &["configmaps"], &["get", "update", "create"]),
    ];
    if use_datadog_metrics {
        rules.push(policy_rule(
            &["datadoghq.com"],
            &["datadogmetrics"],
            &["list", "watch", "create", "delete"],
        ));
        rules.push(policy_rule(
            &["datadoghq.com"],
            &["datadogmetrics/status"],
            &["update"],
        ));
    }
    rules
}

#[derive(Debug, Default)]
struct ExternalMetricsFeature {
    port: i32,
    use_datadog_metrics: bool,
    service_name: String,
    rbac_name: String,
    auth_delegator_binding: String,
    service_account: String,
}

pub(super) fn build(_options: &Options) -> Box<dyn Feature> {
    Box::<ExternalMetricsFeature>::default()
}

impl Feature for ExternalMetricsFeature {
    fn id(&self) -> FeatureId {
        FeatureId::ExternalMetrics
    }

    fn configure(&mut self, dda: &DatadogAgent) -> RequiredComponents {
        let features = dda.features();
        let Some(config) = features
            .external_metrics_server
            .filter(|c| bool_value(c.enabled))
        else {
            return RequiredComponents::default();
        };

        self.port = config.port.unwrap_or(DEFAULT_METRICS_PROVIDER_PORT);
        self.use_datadog_metrics = bool_value(config.use_datadog_metrics);
        self.service_name = dda.child_name("cluster-agent-metrics-api");
        self.rbac_name = dda.rbac_resource_name(ComponentName::ClusterAgent);
        self.auth_delegator_binding = dda.child_name("cluster-agent-auth-delegator");
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
            vec![service_port(METRICS_API_PORT_NAME, self.port, self.port)],
        ) {
            errors.push(e);
        }
        if let Err(e) = managers.rbac().add_cluster_policy_rules_by_component(
            &self.rbac_name,
            &self.service_account,
            external_metrics_rules(self.use_datadog_metrics),
            Some(ComponentName::ClusterAgent),
        ) {
            errors.push(e);
        }
        if let Err(e) = managers.rbac().add_cluster_role_binding(
            &self.auth_delegator_binding,
            &self.service_account,
            AUTH_DELEGATOR_ROLE,
            Some(ComponentName::ClusterAgent),
        ) {
            errors.push(e);
        }
        aggregate(errors)
    }

    fn manage_cluster_agent(&self, managers: &mut PodTemplateManagers) -> Result<()> {
        let container = ContainerName::ClusterAgent;
        let mut envs = managers.env_var();
        envs.add_env_var_to_container(container, env(DD_EXTERNAL_METRICS_PROVIDER_ENABLED, "true"));
        envs.add_env_var_to_container(
            container,
            env(DD_EXTERNAL_METRICS_PROVIDER_PORT, self.port.to_string()),
        );
        envs.add_env_var_to_container(
            container,
            env(
                DD_EXTERNAL_METRICS_PROVIDER_USE_DATADOGMETRIC_CRD,
                bool_to_string(self.use_datadog_metrics),
            ),
        );
        managers.port().add_port_to_container(
            container,
            container_port(METRICS_API_PORT_NAME, self.port, "TCP"),
        );
        Ok(())
    }
}
