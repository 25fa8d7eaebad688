//! 服务发现特性
//!
//! system-probe 识别节点上的服务进程，网络统计默认开启并需要内核模块与源码目录。

use super::system_probe::{configure_system_probe, mount_kernel_sources};
use super::{bool_to_string, Feature, FeatureId, Options, RequiredComponent, RequiredComponents};
use crate::constants::{DD_DISCOVERY_ENABLED, DD_DISCOVERY_NETWORK_STATS_ENABLED};
use crate::crd::DatadogAgent;
use crate::merger::{env, PodTemplateManagers};
use datadog_common::{bool_value, ContainerName, Result};

#[derive(Debug, Default)]
struct ServiceDiscoveryFeature {
    network_stats: bool,
}

pub(super) fn build(_options: &Options) -> Box<dyn Feature> {
    Box::<ServiceDiscoveryFeature>::default()
}

impl Feature for ServiceDiscoveryFeature {
    fn id(&self) -> FeatureId {
        FeatureId::ServiceDiscovery
    }

    fn configure(&mut self, dda: &DatadogAgent) -> RequiredComponents {
        let Some(config) = dda
            .features()
            .service_discovery
            .filter(|c| bool_value(c.enabled))
        else {
            return RequiredComponents::default();
        };
        self.network_stats = config
            .network_stats
            .map_or(true, |n| bool_value(n.enabled));

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
        if self.network_stats {
            mount_kernel_sources(managers);
        }

        let mut envs = managers.env_var();
        envs.add_env_var_to_containers(
            &[
                ContainerName::CoreAgent,
                ContainerName::SystemProbe,
                ContainerName::InitConfig,
            ],
            env(DD_DISCOVERY_ENABLED, "true"),
        );
        envs.add_env_var_to_container(
            ContainerName::SystemProbe,
            env(
                DD_DISCOVERY_NETWORK_STATS_ENABLED,
                bool_to_string(self.network_stats),
            ),
        );
        Ok(())
    }
}
