//! TCP 队列长度检查特性
//!
//! 由 system-probe 采集队列长度，核心 Agent 的检查负责上报。

use super::system_probe::{configure_system_probe, mount_kernel_sources};
use super::{Feature, FeatureId, Options, RequiredComponent, RequiredComponents};
use crate::constants::DD_ENABLE_TCP_QUEUE_LENGTH;
use crate::crd::DatadogAgent;
use crate::merger::{env, PodTemplateManagers};
use datadog_common::{bool_value, ContainerName, Result};

#[derive(Debug, Default)]
struct TcpQueueLengthFeature;

pub(super) fn build(_options: &Options) -> Box<dyn Feature> {
    Box::new(TcpQueueLengthFeature)
}

impl Feature for TcpQueueLengthFeature {
    fn id(&self) -> FeatureId {
        FeatureId::TcpQueueLength
    }

    fn configure(&mut self, dda: &DatadogAgent) -> RequiredComponents {
        let enabled = dda
            .features()
            .tcp_queue_length
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
            env(DD_ENABLE_TCP_QUEUE_LENGTH, "true"),
        );
        Ok(())
    }
}
