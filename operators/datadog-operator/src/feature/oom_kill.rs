//! OOM kill 检查特性
//!
//! 由 system-probe 通过 eBPF 采集，结果交给核心 Agent 的检查上报。

use super::system_probe::{configure_system_probe, mount_kernel_sources};
use super::{Feature, FeatureId, Options, RequiredComponent, RequiredComponents};
use crate::constants::DD_ENABLE_OOM_KILL;
use crate::crd::DatadogAgent;
use crate::merger::{env, PodTemplateManagers};
use datadog_common::{bool_value, ContainerName, Result};

#[derive(Debug, Default)]
struct OomKillFeature;

pub(super) fn build(_options: &Options) -> Box<dyn Feature> {
    Box::new(OomKillFeature)
}

impl Feature for OomKillFeature {
    fn id(&self) -> FeatureId {
        FeatureId::OomKill
    }

    fn configure(&mut self, dda: &DatadogAgent) -> RequiredComponents {
        let enabled = dda
            .features()
            .oom_kill
            .map_or(false, |c| bool_value(c.enabled));
        if !enabled {
            return RequiredComponents::default();
        }
        RequiredComponents {
            agent: RequiredComponent::required(&[
                ContainerName::CoreAgent,
                ContainerName::SystemProbe,
            ]),
            ..Default::default()
        }
    }

    fn manage_node_agent(&self, managers: &mut PodTemplateManagers, _provider: &str) -> Result<()> {
        configure_system_probe(managers, &[ContainerName::CoreAgent], &[]);
        mount_kernel_sources(managers);
        managers.env_var().add_env_var_to_containers(
            &[ContainerName::CoreAgent, ContainerName::SystemProbe],
            env(DD_ENABLE_OOM_KILL, "true"),
        );
        Ok(())
    }
}
