//! 实时进程采集特性
//!
//! 进程检查可以在独立的 process-agent 中运行，也可以并入核心 Agent，
//! 由 [`override_run_in_core_agent`] 决定。

use super::{
    bool_to_string, override_run_in_core_agent, Feature, FeatureId, Options, RequiredComponent,
    RequiredComponents,
};
use crate::constants::{
    CGROUPS_HOST_PATH, CGROUPS_MOUNT_PATH, CGROUPS_VOLUME_NAME, DD_PROCESS_COLLECTION_ENABLED,
    DD_PROCESS_CONFIG_RUN_IN_CORE_AGENT, DD_PROCESS_SCRUB_ARGS, DD_PROCESS_STRIP_ARGS,
    PASSWD_HOST_PATH, PASSWD_MOUNT_PATH, PASSWD_VOLUME_NAME, PROCDIR_HOST_PATH,
    PROCDIR_MOUNT_PATH, PROCDIR_VOLUME_NAME,
};
use crate::crd::DatadogAgent;
use crate::merger::{env, host_path_volume, PodTemplateManagers};
use datadog_common::{bool_value, ContainerName, Result};

/// 进程类检查共用的主机挂载：passwd、cgroups 与 procdir
pub(super) fn mount_process_volumes(managers: &mut PodTemplateManagers, container: ContainerName) {
    for (name, host, path) in [
        (PASSWD_VOLUME_NAME, PASSWD_HOST_PATH, PASSWD_MOUNT_PATH),
        (CGROUPS_VOLUME_NAME, CGROUPS_HOST_PATH, CGROUPS_MOUNT_PATH),
        (PROCDIR_VOLUME_NAME, PROCDIR_HOST_PATH, PROCDIR_MOUNT_PATH),
    ] {
        let (volume, mount) = host_path_volume(name, host, path, true);
        managers.volume().add_volume(volume);
        managers.volume_mount().add_volume_mount_to_container(mount, container);
    }
}

/// 进程检查所在的容器
pub(super) fn process_container(run_in_core_agent: bool) -> ContainerName {
    if run_in_core_agent {
        ContainerName::CoreAgent
    } else {
        ContainerName::ProcessAgent
    }
}

/// 进程类特性需要的容器
pub(super) fn process_containers(run_in_core_agent: bool) -> RequiredComponents {
    let mut containers = vec![ContainerName::CoreAgent];
    if !run_in_core_agent {
        containers.push(ContainerName::ProcessAgent);
    }
    RequiredComponents {
        agent: RequiredComponent::required(&containers),
        ..Default::default()
    }
}

#[derive(Debug)]
struct LiveProcessFeature {
    run_in_core_agent_default: bool,
    run_in_core_agent: bool,
    scrub_args: Option<bool>,
    strip_args: Option<bool>,
}

pub(super) fn build(options: &Options) -> Box<dyn Feature> {
    Box::new(LiveProcessFeature {
        run_in_core_agent_default: options.process_checks_in_core_agent_enabled,
        run_in_core_agent: false,
        scrub_args: None,
        strip_args: None,
    })
}

impl LiveProcessFeature {
    fn configure_container(&self, managers: &mut PodTemplateManagers, container: ContainerName) {
        mount_process_volumes(managers, container);

        let mut envs = managers.env_var();
        envs.add_env_var_to_container(container, env(DD_PROCESS_COLLECTION_ENABLED, "true"));
        if let Some(scrub) = self.scrub_args {
            envs.add_env_var_to_container(container, env(DD_PROCESS_SCRUB_ARGS, bool_to_string(scrub)));
        }
        if let Some(strip) = self.strip_args {
            envs.add_env_var_to_container(container, env(DD_PROCESS_STRIP_ARGS, bool_to_string(strip)));
        }
    }
}

impl Feature for LiveProcessFeature {
    fn id(&self) -> FeatureId {
        FeatureId::LiveProcess
    }

    fn configure(&mut self, dda: &DatadogAgent) -> RequiredComponents {
        let features = dda.features();
        let Some(config) = features
            .live_process_collection
            .filter(|c| bool_value(c.enabled))
        else {
            return RequiredComponents::default();
        };

        self.scrub_args = config.scrub_process_arguments;
        self.strip_args = config.strip_process_arguments;
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
        managers.env_var().add_env_var_to_container(
            ContainerName::UnprivilegedSingleAgent,
            env(
                DD_PROCESS_CONFIG_RUN_IN_CORE_AGENT,
                bool_to_string(self.run_in_core_agent),
            ),
        );
        self.configure_container(managers, ContainerName::UnprivilegedSingleAgent);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feature::test_utils::*;
    use crate::merger::test_utils::env_value;
    use datadog_common::{
        AgentImageConfig, ComponentName, DatadogAgentComponentOverride, DatadogFeatures,
        LiveProcessCollectionFeatureConfig,
    };
    use rstest::rstest;

    fn dda() -> DatadogAgent {
        dda_with_features(DatadogFeatures {
            live_process_collection: Some(LiveProcessCollectionFeatureConfig {
                enabled: Some(true),
                scrub_process_arguments: Some(false),
                ..Default::default()
            }),
            ..Default::default()
        })
    }

    #[rstest]
    #[case(false, true)]
    #[case(true, false)]
    fn test_process_agent_required_unless_in_core(
        #[case] in_core: bool,
        #[case] needs_process_agent: bool,
    ) {
        let mut feature = build(&Options {
            process_checks_in_core_agent_enabled: in_core,
            ..Default::default()
        });
        let required = feature.configure(&dda());
        assert!(required.agent.has_container(ContainerName::CoreAgent));
        assert_eq!(
            required.agent.has_container(ContainerName::ProcessAgent),
            needs_process_agent
        );
    }

    #[test]
    fn test_old_image_forces_process_agent() {
        let mut dda = dda();
        dda.spec.override_.insert(
            ComponentName::NodeAgent,
            DatadogAgentComponentOverride {
                image: Some(AgentImageConfig {
                    name: "agent".to_string(),
                    tag: "7.50.0".to_string(),
                    ..Default::default()
                }),
                ..Default::default()
            },
        );
        let mut feature = build(&Options {
            process_checks_in_core_agent_enabled: true,
            ..Default::default()
        });
        let required = feature.configure(&dda);
        assert!(required.agent.has_container(ContainerName::ProcessAgent));
    }

    #[test]
    fn test_env_lands_on_core_agent_when_running_in_core() {
        let mut feature = build(&Options {
            process_checks_in_core_agent_enabled: true,
            ..Default::default()
        });
        feature.configure(&dda());
        let mut managers = agent_managers();
        feature.manage_node_agent(&mut managers, "").unwrap();
        let template = managers.finalize();

        assert_eq!(
            env_value(&template, ContainerName::CoreAgent, DD_PROCESS_COLLECTION_ENABLED).as_deref(),
            Some("true")
        );
        assert_eq!(
            env_value(&template, ContainerName::CoreAgent, DD_PROCESS_SCRUB_ARGS).as_deref(),
            Some("false")
        );
        assert_eq!(
            env_value(&template, ContainerName::ProcessAgent, DD_PROCESS_CONFIG_RUN_IN_CORE_AGENT)
                .as_deref(),
            Some("true")
        );
        assert_eq!(
            env_value(&template, ContainerName::ProcessAgent, DD_PROCESS_COLLECTION_ENABLED),
            None
        );
    }
}
