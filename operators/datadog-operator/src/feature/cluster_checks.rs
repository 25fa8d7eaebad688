//! 集群检查特性
//!
//! Cluster Agent 根据 Service 与 Endpoints 注解调度检查。启用运行器时，集群检查交给
//! 独立的 Cluster Checks Runner 执行，节点 Agent 只保留 endpoints 检查。

use tracing::warn;

use super::{Feature, FeatureId, Options, RequiredComponent, RequiredComponents};
use crate::constants::{
    checksum_annotation_key, DD_CLC_RUNNER_ENABLED, DD_CLC_RUNNER_HOST, DD_CLC_RUNNER_ID,
    DD_CLUSTER_CHECKS_ENABLED, DD_EXTRA_CONFIG_PROVIDERS, DD_EXTRA_LISTENERS,
};
use crate::crd::DatadogAgent;
use crate::merger::{env, env_from_field, PodTemplateManagers};
use crate::utils::generate_md5_for_spec;
use datadog_common::{bool_value, ContainerName, Result};

const KUBE_SERVICES_AND_ENDPOINTS: &str = "kube_services kube_endpoints";
const ENDPOINTS_CHECKS: &str = "endpointschecks";
const CLUSTER_AND_ENDPOINTS_CHECKS: &str = "clusterchecks endpointschecks";
const CLUSTER_CHECKS: &str = "clusterchecks";

#[derive(Debug, Default)]
struct ClusterChecksFeature {
    use_runners: bool,
    checksum: String,
}

pub(super) fn build(_options: &Options) -> Box<dyn Feature> {
    Box::<ClusterChecksFeature>::default()
}

impl ClusterChecksFeature {
    fn configure_node_agent(&self, managers: &mut PodTemplateManagers, container: ContainerName) {
        let providers = if self.use_runners {
            ENDPOINTS_CHECKS
        } else {
            CLUSTER_AND_ENDPOINTS_CHECKS
        };
        managers
            .env_var()
            .add_env_var_to_container(container, env(DD_EXTRA_CONFIG_PROVIDERS, providers));
    }
}

impl Feature for ClusterChecksFeature {
    fn id(&self) -> FeatureId {
        FeatureId::ClusterChecks
    }

    fn configure(&mut self, dda: &DatadogAgent) -> RequiredComponents {
        let features = dda.features();
        let Some(config) = features.cluster_checks.filter(|c| bool_value(c.enabled)) else {
            return RequiredComponents::default();
        };

        self.use_runners = bool_value(config.use_cluster_checks_runners);
        // 配置变化时通过注解触发 Cluster Agent 滚动更新
        self.checksum = match generate_md5_for_spec(&config) {
            Ok(hash) => hash,
            Err(e) => {
                warn!("无法计算集群检查配置的校验和: {}", e);
                String::new()
            }
        };

        let mut required = RequiredComponents {
            cluster_agent: RequiredComponent::required(&[ContainerName::ClusterAgent]),
            ..Default::default()
        };
        if self.use_runners {
            required.cluster_checks_runner =
                RequiredComponent::required(&[ContainerName::ClusterChecksRunner]);
        }
        required
    }

    fn manage_cluster_agent(&self, managers: &mut PodTemplateManagers) -> Result<()> {
        let container = ContainerName::ClusterAgent;
        let mut envs = managers.env_var();
        envs.add_env_var_to_container(container, env(DD_CLUSTER_CHECKS_ENABLED, "true"));
        envs.add_env_var_to_container(
            container,
            env(DD_EXTRA_CONFIG_PROVIDERS, KUBE_SERVICES_AND_ENDPOINTS),
        );
        envs.add_env_var_to_container(container, env(DD_EXTRA_LISTENERS, KUBE_SERVICES_AND_ENDPOINTS));
        if !self.checksum.is_empty() {
            managers.add_annotation(
                checksum_annotation_key(FeatureId::ClusterChecks.as_str()),
                self.checksum.clone(),
            );
        }
        Ok(())
    }

    fn manage_node_agent(&self, managers: &mut PodTemplateManagers, _provider: &str) -> Result<()> {
        self.configure_node_agent(managers, ContainerName::CoreAgent);
        Ok(())
    }

    fn manage_single_container_node_agent(
        &self,
        managers: &mut PodTemplateManagers,
        _provider: &str,
    ) -> Result<()> {
        self.configure_node_agent(managers, ContainerName::UnprivilegedSingleAgent);
        Ok(())
    }

    fn manage_cluster_checks_runner(&self, managers: &mut PodTemplateManagers) -> Result<()> {
        if !self.use_runners {
            return Ok(());
        }
        let container = ContainerName::ClusterChecksRunner;
        let mut envs = managers.env_var();
        envs.add_env_var_to_container(container, env(DD_CLUSTER_CHECKS_ENABLED, "true"));
        envs.add_env_var_to_container(container, env(DD_EXTRA_CONFIG_PROVIDERS, CLUSTER_CHECKS));
        envs.add_env_var_to_container(container, env(DD_CLC_RUNNER_ENABLED, "true"));
        envs.add_env_var_to_container(container, env_from_field(DD_CLC_RUNNER_HOST, "status.podIP"));
        envs.add_env_var_to_container(container, env_from_field(DD_CLC_RUNNER_ID, "metadata.name"));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feature::test_utils::*;
    use crate::merger::find_container;
    use crate::merger::test_utils::{env_value, template_with};
    use datadog_common::{ClusterChecksFeatureConfig, DatadogFeatures};
    use rstest::rstest;

    fn dda(runners: bool) -> DatadogAgent {
        dda_with_features(DatadogFeatures {
            cluster_checks: Some(ClusterChecksFeatureConfig {
                enabled: Some(true),
                use_cluster_checks_runners: Some(runners),
            }),
            ..Default::default()
        })
    }

    #[rstest]
    #[case(false, CLUSTER_AND_ENDPOINTS_CHECKS)]
    #[case(true, ENDPOINTS_CHECKS)]
    fn test_node_agent_config_providers(#[case] runners: bool, #[case] expected: &str) {
        let mut feature = build(&Options::default());
        let required = feature.configure(&dda(runners));
        assert_eq!(required.cluster_checks_runner.is_enabled(), runners);

        let mut managers = agent_managers();
        feature.manage_node_agent(&mut managers, "").unwrap();
        let template = managers.finalize();
        assert_eq!(
            env_value(&template, ContainerName::CoreAgent, DD_EXTRA_CONFIG_PROVIDERS).as_deref(),
            Some(expected)
        );
    }

    #[test]
    fn test_cluster_agent_env_and_checksum() {
        let mut feature = build(&Options::default());
        feature.configure(&dda(false));
        let mut managers = cluster_agent_managers();
        feature.manage_cluster_agent(&mut managers).unwrap();
        assert!(managers
            .annotations()
            .contains_key("checksum/clusterChecks-custom-config"));
        let template = managers.finalize();
        assert_eq!(
            env_value(&template, ContainerName::ClusterAgent, DD_EXTRA_LISTENERS).as_deref(),
            Some(KUBE_SERVICES_AND_ENDPOINTS)
        );
    }

    #[test]
    fn test_runner_env_uses_pod_fields() {
        let mut feature = build(&Options::default());
        feature.configure(&dda(true));
        let mut managers =
            PodTemplateManagers::new(template_with(&[ContainerName::ClusterChecksRunner], &[]));
        feature.manage_cluster_checks_runner(&mut managers).unwrap();
        let template = managers.finalize();
        let spec = template.spec.as_ref().unwrap();
        let envs = find_container(spec, ContainerName::ClusterChecksRunner)
            .unwrap()
            .env
            .as_ref()
            .unwrap();
        let host = envs.iter().find(|e| e.name == DD_CLC_RUNNER_HOST).unwrap();
        assert_eq!(
            host.value_from
                .as_ref()
                .and_then(|v| v.field_ref.as_ref())
                .map(|f| f.field_path.as_str()),
            Some("status.podIP")
        );
        assert_eq!(
            env_value(&template, ContainerName::ClusterChecksRunner, DD_EXTRA_CONFIG_PROVIDERS)
                .as_deref(),
            Some(CLUSTER_CHECKS)
        );
    }

    #[test]
    fn test_disabled_requires_nothing() {
        let mut feature = build(&Options::default());
        assert!(!feature
            .configure(&dda_with_features(DatadogFeatures::default()))
            .is_enabled());
    }
}
