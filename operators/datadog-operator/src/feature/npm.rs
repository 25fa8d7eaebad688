//! 网络性能监控特性

use super::system_probe::configure_system_probe;
use super::{bool_to_string, Feature, FeatureId, Options, RequiredComponent, RequiredComponents};
use crate::constants::{
    DD_SYSTEM_PROBE_COLLECT_DNS_STATS, DD_SYSTEM_PROBE_CONNTRACK_ENABLED, DD_SYSTEM_PROBE_EXTERNAL,
    DD_SYSTEM_PROBE_NPM_ENABLED,
};
use crate::crd::DatadogAgent;
use crate::merger::{env, PodTemplateManagers};
use datadog_common::{bool_value, ContainerName, Result};

const NPM_CONTAINERS: [ContainerName; 3] = [
    ContainerName::CoreAgent,
    ContainerName::ProcessAgent,
    ContainerName::SystemProbe,
];

#[derive(Debug, Default)]
struct NpmFeature {
    collect_dns_stats: bool,
    enable_conntrack: bool,
}

pub(super) fn build(_options: &Options) -> Box<dyn Feature> {
    Box::<NpmFeature>::default()
}

impl Feature for NpmFeature {
    fn id(&self) -> FeatureId {
        FeatureId::Npm
    }

    fn configure(&mut self, dda: &DatadogAgent) -> RequiredComponents {
        let features = dda.features();
        let Some(npm) = features.npm.filter(|c| bool_value(c.enabled)) else {
            return RequiredComponents::default();
        };
        self.collect_dns_stats = bool_value(npm.collect_dns_stats);
        self.enable_conntrack = bool_value(npm.enable_conntrack);

        RequiredComponents {
            agent: RequiredComponent::required(&NPM_CONTAINERS),
            ..Default::default()
        }
    }

    fn manage_node_agent(&self, managers: &mut PodTemplateManagers, _provider: &str) -> Result<()> {
        configure_system_probe(
            managers,
            &[ContainerName::CoreAgent, ContainerName::ProcessAgent],
            &[ContainerName::ProcessAgent],
        );

        let core_and_probe = [ContainerName::CoreAgent, ContainerName::SystemProbe];
        let mut envs = managers.env_var();
        envs.add_env_var_to_containers(&NPM_CONTAINERS, env(DD_SYSTEM_PROBE_NPM_ENABLED, "true"));
        envs.add_env_var_to_containers(
            &core_and_probe,
            env(
                DD_SYSTEM_PROBE_COLLECT_DNS_STATS,
                bool_to_string(self.collect_dns_stats),
            ),
        );
        envs.add_env_var_to_containers(
            &core_and_probe,
            env(
                DD_SYSTEM_PROBE_CONNTRACK_ENABLED,
                bool_to_string(self.enable_conntrack),
            ),
        );
        envs.add_env_var_to_container(
            ContainerName::ProcessAgent,
            env(DD_SYSTEM_PROBE_EXTERNAL, "true"),
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::{DD_SYSTEM_PROBE_ENABLED, DEBUGFS_VOLUME_NAME};
    use crate::feature::test_utils::*;
    use crate::merger::find_container;
    use crate::merger::test_utils::env_value;
    use datadog_common::{DatadogFeatures, NpmFeatureConfig};

    #[test]
    fn test_npm_env_and_mounts() {
        let mut feature = build(&Options::default());
        let required = feature.configure(&dda_with_features(DatadogFeatures {
            npm: Some(NpmFeatureConfig {
                enabled: Some(true),
                collect_dns_stats: Some(true),
                ..Default::default()
            }),
            ..Default::default()
        }));
        assert_eq!(required.agent.containers, NPM_CONTAINERS.to_vec());

        let mut managers = agent_managers();
        feature.manage_node_agent(&mut managers, "").unwrap();
        let template = managers.finalize();

        assert_eq!(
            env_value(&template, ContainerName::SystemProbe, DD_SYSTEM_PROBE_COLLECT_DNS_STATS)
                .as_deref(),
            Some("true")
        );
        assert_eq!(
            env_value(&template, ContainerName::CoreAgent, DD_SYSTEM_PROBE_CONNTRACK_ENABLED)
                .as_deref(),
            Some("false")
        );
        assert_eq!(
            env_value(&template, ContainerName::ProcessAgent, DD_SYSTEM_PROBE_ENABLED).as_deref(),
            Some("true")
        );
        assert_eq!(
            env_value(&template, ContainerName::ProcessAgent, DD_SYSTEM_PROBE_EXTERNAL).as_deref(),
            Some("true")
        );

        let spec = template.spec.as_ref().unwrap();
        let process = find_container(spec, ContainerName::ProcessAgent).unwrap();
        assert!(process
            .volume_mounts
            .as_ref()
            .unwrap()
            .iter()
            .any(|m| m.name == DEBUGFS_VOLUME_NAME));
    }
}
