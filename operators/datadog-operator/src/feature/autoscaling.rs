//! 自动扩缩容特性
//!
//! 工作负载扩缩容由 Cluster Agent 管理 DatadogPodAutoscaler，并依赖准入控制器
//! 修改 Pod 资源；节点 Agent 在本地保存故障转移所需的指标。集群扩缩容通过 Karpenter
//! 管理节点。

use k8s_openapi::api::rbac::v1::PolicyRule;

use super::{Feature, FeatureId, Options, RequiredComponent, RequiredComponents};
use crate::constants::{
    DD_AUTOSCALING_CLUSTER_ENABLED, DD_AUTOSCALING_FAILOVER_ENABLED,
    DD_AUTOSCALING_FAILOVER_METRICS, DD_AUTOSCALING_WORKLOAD_ENABLED,
};
use crate::crd::DatadogAgent;
use crate::merger::{env, PodTemplateManagers};
use crate::store::{policy_rule, ResourceManagers};
use datadog_common::{bool_value, ComponentName, ContainerName, Error, Result};

const DEFAULT_FAILOVER_METRICS: &str = "container.memory.usage container.cpu.usage";

fn workload_rules() -> Vec<PolicyRule> {
    vec![
        policy_rule(
            &["datadoghq.com"],
            &["datadogpodautoscalers", "datadogpodautoscalers/status"],
            &["*"],
        ),
        policy_rule(&["*"], &["*/scale"], &["get", "update"]),
        policy_rule(&[""], &["pods"], &["patch"]),
        policy_rule(&["apps"], &["deployments"], &["patch"]),
        policy_rule(&["argoproj.io"], &["rollouts"], &["patch"]),
    ]
}

fn cluster_rules() -> Vec<PolicyRule> {
    vec![
        policy_rule(
            &["karpenter.sh"],
            &["*"],
            &["create", "delete", "get", "list", "patch"],
        ),
        policy_rule(&["karpenter.k8s.aws"], &["*"], &["get", "list"]),
    ]
}

#[derive(Debug, Default)]
struct AutoscalingFeature {
    workload: bool,
    cluster: bool,
    admission_controller: bool,
    rbac_name: String,
    service_account: String,
}

pub(super) fn build(_options: &Options) -> Box<dyn Feature> {
    Box::<AutoscalingFeature>::default()
}

impl AutoscalingFeature {
    fn rules(&self) -> Vec<PolicyRule> {
        let mut rules = Vec::new();
        if self.workload {
            rules.extend(workload_rules());
        }
        rules.push(policy_rule(&[""], &["events"], &["create", "patch"]));
        if self.cluster {
            rules.extend(cluster_rules());
        }
        rules
    }
}

impl Feature for AutoscalingFeature {
    fn id(&self) -> FeatureId {
        FeatureId::Autoscaling
    }

    fn configure(&mut self, dda: &DatadogAgent) -> RequiredComponents {
        let features = dda.features();
        let Some(config) = features.autoscaling else {
            return RequiredComponents::default();
        };
        self.workload = bool_value(config.workload.and_then(|w| w.enabled));
        self.cluster = bool_value(config.cluster.and_then(|c| c.enabled));
        if !self.workload && !self.cluster {
            return RequiredComponents::default();
        }

        self.admission_controller = bool_value(
            features
                .admission_controller
                .and_then(|c| c.enabled),
        );
        self.rbac_name = dda.child_name("cluster-agent-autoscaling");
        self.service_account = dda.service_account_name(ComponentName::ClusterAgent);

        let mut required = RequiredComponents {
            cluster_agent: RequiredComponent::required(&[ContainerName::ClusterAgent]),
            ..Default::default()
        };
        if self.workload {
            required.agent = RequiredComponent::required(&[ContainerName::CoreAgent]);
        }
        required
    }

    fn manage_dependencies(
        &self,
        managers: &mut ResourceManagers,
        _components: &RequiredComponents,
    ) -> Result<()> {
        if self.workload && !self.admission_controller {
            return Err(Error::Config(
                "工作负载自动扩缩容需要启用准入控制器".to_string(),
            ));
        }
        managers.rbac().add_cluster_policy_rules_by_component(
            &self.rbac_name,
            &self.service_account,
            self.rules(),
            Some(ComponentName::ClusterAgent),
        )
    }

    fn manage_cluster_agent(&self, managers: &mut PodTemplateManagers) -> Result<()> {
        let mut envs = managers.env_var();
        if self.workload {
            envs.add_env_var_to_container(
                ContainerName::ClusterAgent,
                env(DD_AUTOSCALING_WORKLOAD_ENABLED, "true"),
            );
            envs.add_env_var_to_container(
                ContainerName::ClusterAgent,
                env(DD_AUTOSCALING_FAILOVER_ENABLED, "true"),
            );
        }
        if self.cluster {
            envs.add_env_var_to_container(
                ContainerName::ClusterAgent,
                env(DD_AUTOSCALING_CLUSTER_ENABLED, "true"),
            );
        }
        Ok(())
    }

    fn manage_node_agent(&self, managers: &mut PodTemplateManagers, _provider: &str) -> Result<()> {
        if self.workload {
            let mut envs = managers.env_var();
            envs.add_env_var_to_container(
                ContainerName::CoreAgent,
                env(DD_AUTOSCALING_FAILOVER_ENABLED, "true"),
            );
            envs.add_env_var_to_container(
                ContainerName::CoreAgent,
                env(DD_AUTOSCALING_FAILOVER_METRICS, DEFAULT_FAILOVER_METRICS),
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feature::test_utils::*;
    use crate::merger::test_utils::env_value;
    use crate::store::{ObjectKind, StoreObject};
    use datadog_common::{
        AdmissionControllerFeatureConfig, AutoscalingFeatureConfig, DatadogFeatures,
        EnabledConfig,
    };
    use rstest::rstest;

    fn dda(workload: bool, cluster: bool, admission: bool) -> DatadogAgent {
        dda_with_features(DatadogFeatures {
            autoscaling: Some(AutoscalingFeatureConfig {
                workload: Some(EnabledConfig::new(workload)),
                cluster: Some(EnabledConfig::new(cluster)),
            }),
            admission_controller: Some(AdmissionControllerFeatureConfig {
                enabled: Some(admission),
                ..Default::default()
            }),
            ..Default::default()
        })
    }

    fn role_groups(resources: &ResourceManagers) -> Vec<String> {
        match resources
            .store()
            .get(ObjectKind::ClusterRole, "", "datadog-cluster-agent-autoscaling")
        {
            Some(StoreObject::ClusterRole(role)) => role
                .rules
                .iter()
                .flatten()
                .flat_map(|r| r.api_groups.clone().unwrap_or_default())
                .collect(),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[rstest]
    #[case(true, false, true, &["datadoghq.com", "argoproj.io"], &["karpenter.sh"])]
    #[case(false, true, false, &["karpenter.sh", "karpenter.k8s.aws"], &["datadoghq.com"])]
    #[case(true, true, true, &["datadoghq.com", "karpenter.sh"], &[])]
    fn test_rbac_follows_enabled_products(
        #[case] workload: bool,
        #[case] cluster: bool,
        #[case] admission: bool,
        #[case] present: &[&str],
        #[case] absent: &[&str],
    ) {
        let mut feature = build(&Options::default());
        let required = feature.configure(&dda(workload, cluster, admission));
        assert!(required.cluster_agent.is_enabled());
        assert_eq!(required.agent.is_enabled(), workload);

        let mut resources = resource_managers();
        feature.manage_dependencies(&mut resources, &required).unwrap();
        let groups = role_groups(&resources);
        for group in present {
            assert!(groups.iter().any(|g| g == group), "缺少 {}", group);
        }
        for group in absent {
            assert!(!groups.iter().any(|g| g == group), "多余 {}", group);
        }
    }

    #[test]
    fn test_workload_without_admission_controller_fails() {
        let mut feature = build(&Options::default());
        let required = feature.configure(&dda(true, false, false));
        let err = feature
            .manage_dependencies(&mut resource_managers(), &required)
            .unwrap_err();
        assert!(err.is_config());
    }

    #[test]
    fn test_disabled_products_require_nothing() {
        let mut feature = build(&Options::default());
        assert!(!feature.configure(&dda(false, false, true)).is_enabled());
    }

    #[test]
    fn test_env_on_cluster_agent_and_core_agent() {
        let mut feature = build(&Options::default());
        feature.configure(&dda(true, true, true));

        let mut managers = cluster_agent_managers();
        feature.manage_cluster_agent(&mut managers).unwrap();
        let template = managers.finalize();
        for name in [
            DD_AUTOSCALING_WORKLOAD_ENABLED,
            DD_AUTOSCALING_FAILOVER_ENABLED,
            DD_AUTOSCALING_CLUSTER_ENABLED,
        ] {
            assert_eq!(
                env_value(&template, ContainerName::ClusterAgent, name).as_deref(),
                Some("true")
            );
        }

        let mut managers = agent_managers();
        feature.manage_node_agent(&mut managers, "").unwrap();
        let template = managers.finalize();
        assert_eq!(
            env_value(&template, ContainerName::CoreAgent, DD_AUTOSCALING_FAILOVER_METRICS)
                .as_deref(),
            Some(DEFAULT_FAILOVER_METRICS)
        );
    }
}
