//! 进程发现特性

use super::live_process::{mount_process_volumes, process_container, process_containers};
use super::{
    bool_to_string, override_run_in_core_agent, Feature, FeatureId, Options, RequiredComponents,
};
use crate::constants::{DD_PROCESS_CONFIG_RUN_IN_CORE_AGENT, DD_PROCESS_DISCOVERY_ENABLED};
use crate::crd::DatadogAgent;
use crate::merger::{env, PodTemplateManagers};
use datadog_common::{bool_value, ContainerName, Result};

#[derive(Debug)]
struct ProcessDiscoveryFeature {
    run_in_core_agent_default: bool,
    run_in_core_agent: bool,
}

pub(super) fn build(options: &Options) -> Box<dyn Feature> {
    Box::new(ProcessDiscoveryFeature {
        run_in_core_agent_default: options.process_checks_in_core_agent_enabled,
        run_in_core_agent: false,
    })
}

impl Feature for ProcessDiscoveryFeature {
    fn id(&self) -> FeatureId {
        FeatureId::ProcessDiscovery
    }

    fn configure(&mut self, dda: &DatadogAgent) -> RequiredComponents {
        let enabled = dda
            .features()
            .process_discovery
            .map_or(false, |c| bool_value(c.enabled));
        if !enabled {
            return RequiredComponents::default();
        }
        self.run_in_core_agent = override_run_in_core_agent(dda, self.run_in_core_agent_default);
        process_containers(self.run_in_core_agent)
    }

    fn manage_node_agent(&self, managers: &mut PodTemplateManagers, _provider: &str) -> Result<()> {
        let container = process_container(self.run_in_core_agent);
        managers.env_var().add_env_var_to_containers(
            &[ContainerName::CoreAgent, ContainerName::ProcessAgent],
            env(
                DD_PROCESS_CONFIG_RUN_IN_CORE_AGENT,
                bool_to_string(self.run_in_core_agent),
            ),
        );
        mount_process_volumes(managers, container);
        managers
            .env_var()
            .add_env_var_to_container(container, env(DD_PROCESS_DISCOVERY_ENABLED, "true"));
        Ok(())
    }

    fn manage_single_container_node_agent(
        &self,
        managers: &mut PodTemplateManagers,
        _provider: &str,
    ) -> Result<()> {
        let container = ContainerName::UnprivilegedSingleAgent;
        managers.env_var().add_env_var_to_container(
            container,
            env(
                DD_PROCESS_CONFIG_RUN_IN_CORE_AGENT,
                bool_to_string(self.run_in_core_agent),
            ),
        );
        mount_process_volumes(managers, container);
        managers
            .env_var()
            .add_env_var_to_container(container, env(DD_PROCESS_DISCOVERY_ENABLED, "true"));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feature::test_utils::*;
    use crate::merger::test_utils::env_value;
    use datadog_common::{DatadogFeatures, EnabledConfig};

    #[test]
    fn test_discovery_runs_in_core_agent_when_allowed() {
        let mut feature = build(&Options {
            process_checks_in_core_agent_enabled: true,
            ..Default::default()
        });
        let required = feature.configure(&dda_with_features(DatadogFeatures {
            process_discovery: Some(EnabledConfig::new(true)),
            ..Default::default()
        }));
        assert_eq!(required.agent.containers, vec![ContainerName::CoreAgent]);

        let mut managers = agent_managers();
        feature.manage_node_agent(&mut managers, "").unwrap();
        let template = managers.finalize();
        assert_eq!(
            env_value(&template, ContainerName::CoreAgent, DD_PROCESS_DISCOVERY_ENABLED).as_deref(),
            Some("true")
        );
    }
}
