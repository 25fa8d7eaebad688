//! 远程配置特性
//!
//! 只有显式设置了开关时才写入环境变量，未设置时保留 Agent 自身的默认行为。

use super::{bool_to_string, Feature, FeatureId, Options, RequiredComponent, RequiredComponents};
use crate::constants::DD_REMOTE_CONFIGURATION_ENABLED;
use crate::crd::DatadogAgent;
use crate::merger::{env, PodTemplateManagers};
use datadog_common::{ContainerName, Result};

#[derive(Debug, Default)]
struct RemoteConfigFeature {
    enabled: Option<bool>,
}

pub(super) fn build(_options: &Options) -> Box<dyn Feature> {
    Box::<RemoteConfigFeature>::default()
}

impl RemoteConfigFeature {
    fn set_env(&self, managers: &mut PodTemplateManagers, container: ContainerName) {
        if let Some(enabled) = self.enabled {
            managers.env_var().add_env_var_to_container(
                container,
                env(DD_REMOTE_CONFIGURATION_ENABLED, bool_to_string(enabled)),
            );
        }
    }
}

impl Feature for RemoteConfigFeature {
    fn id(&self) -> FeatureId {
        FeatureId::RemoteConfig
    }

    fn configure(&mut self, dda: &DatadogAgent) -> RequiredComponents {
        self.enabled = dda
            .features()
            .remote_configuration
            .and_then(|config| config.enabled);
        if self.enabled.is_none() {
            return RequiredComponents::default();
        }
        RequiredComponents {
            agent: RequiredComponent::required(&[ContainerName::CoreAgent]),
            cluster_agent: RequiredComponent::required(&[ContainerName::ClusterAgent]),
            ..Default::default()
        }
    }

    fn manage_cluster_agent(&self, managers: &mut PodTemplateManagers) -> Result<()> {
        self.set_env(managers, ContainerName::ClusterAgent);
        Ok(())
    }

    fn manage_node_agent(&self, managers: &mut PodTemplateManagers, _provider: &str) -> Result<()> {
        self.set_env(managers, ContainerName::CoreAgent);
        Ok(())
    }

    fn manage_single_container_node_agent(
        &self,
        managers: &mut PodTemplateManagers,
        _provider: &str,
    ) -> Result<()> {
        self.set_env(managers, ContainerName::UnprivilegedSingleAgent);
        Ok(())
    }
}
