//! 通用服务监控特性
//!
//! 远程配置下发的开关优先于规格中的开关。

use super::system_probe::configure_system_probe;
use super::{
    overlay_enabled, remote_features, Feature, FeatureId, Options, RequiredComponent,
    RequiredComponents,
};
use crate::constants::{DD_SYSTEM_PROBE_EXTERNAL, DD_SYSTEM_PROBE_USM_ENABLED};
use crate::crd::DatadogAgent;
use crate::merger::{env, PodTemplateManagers};
use datadog_common::{bool_value, ContainerName, Result};

const USM_CONTAINERS: [ContainerName; 3] = [
    ContainerName::CoreAgent,
    ContainerName::ProcessAgent,
    ContainerName::SystemProbe,
];

#[derive(Debug, Default)]
struct UsmFeature;

pub(super) fn build(_options: &Options) -> Box<dyn Feature> {
    Box::new(UsmFeature)
}

impl Feature for UsmFeature {
    fn id(&self) -> FeatureId {
        FeatureId::Usm
    }

    fn configure(&mut self, dda: &DatadogAgent) -> RequiredComponents {
        let spec = dda.features().usm.and_then(|c| c.enabled);
        let remote = remote_features(dda)
            .and_then(|f| f.usm.as_ref())
            .and_then(|c| c.enabled);
        if !bool_value(overlay_enabled(spec, remote)) {
            return RequiredComponents::default();
        }

        RequiredComponents {
            agent: RequiredComponent::required(&USM_CONTAINERS),
            ..Default::default()
        }
    }

    fn manage_node_agent(&self, managers: &mut PodTemplateManagers, _provider: &str) -> Result<()> {
        configure_system_probe(
            managers,
            &[ContainerName::CoreAgent, ContainerName::ProcessAgent],
            &[ContainerName::ProcessAgent],
        );

        let mut envs = managers.env_var();
        envs.add_env_var_to_containers(&USM_CONTAINERS, env(DD_SYSTEM_PROBE_USM_ENABLED, "true"));
        envs.add_env_var_to_container(
            ContainerName::ProcessAgent,
            env(DD_SYSTEM_PROBE_EXTERNAL, "true"),
        );
        Ok(())
    }
}
