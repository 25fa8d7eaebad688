//! 实时容器采集特性

use super::live_process::{mount_process_volumes, process_container, process_containers};
use super::{
    bool_to_string, override_run_in_core_agent, Feature, FeatureId, Options, RequiredComponents,
};
use crate::constants::{DD_CONTAINER_COLLECTION_ENABLED, DD_PROCESS_CONFIG_RUN_IN_CORE_AGENT};
use crate::crd::DatadogAgent;
use crate::merger::{env, PodTemplateManagers};
use datadog_common::{bool_value, ContainerName, Result};

#[derive(Debug)]
struct LiveContainerFeature {
    run_in_core_agent_default: bool,
    run_in_core_agent: bool,
}

pub(super) fn build(options: &Options) -> Box<dyn Feature> {
    Box::new(LiveContainerFeature {
        run_in_core_agent_default: options.process_checks_in_core_agent_enabled,
        run_in_core_agent: false,
    })
}

impl LiveContainerFeature {
    fn configure_container(&self, managers: &mut PodTemplateManagers, container: ContainerName) {
        mount_process_volumes(managers, container);
        managers
            .env_var()
            .add_env_var_to_container(container, env(DD_CONTAINER_COLLECTION_ENABLED, "true"));
    }
}

impl Feature for LiveContainerFeature {
    fn id(&self) -> FeatureId {
        FeatureId::LiveContainer
    }

    fn configure(&mut self, dda: &DatadogAgent) -> RequiredComponents {
        let enabled = dda
            .features()
            .live_container_collection
            .map_or(false, |c| bool_value(c.enabled));
        if !enabled {
            return RequiredComponents::default();
        }
        self.run_in_core_agent = override_run_in_core_agent(dda, self.run_in_core_agent_default);
        process_containers(self.run_in_core_agent)
    }

    fn manage_node_agent(&self, managers: &mut PodTemplateManagers, _provider: &str) -> Result<()> {
        managers.env_var().add_env_var_to_containers(
            &[ContainerName::CoreAgent, ContainerName::ProcessAgent],
            env(
                DD_PROCESS_CONFIG_RUN_IN_CORE_AGENT,
                bool_to_string(self.run_in_core_agent),
            ),
        );
        self.configure_container(managers, process_container(self.run_in_core_agent));
        Ok(())
    }

    fn manage_single_container_node_agent(
        &self,
        managers: &mut PodTemplateManagers,
        _provider: &str,
    ) -> Result<()> {
        self.configure_container(managers, ContainerName::UnprivilegedSingleAgent);
        Ok(())
    }
}
