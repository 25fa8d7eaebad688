//! 云工作负载安全特性
//!
//! security-agent 与 system-probe 协同工作：system-probe 加载运行时安全模块，
//! security-agent 负责上报。自定义策略通过 ConfigMap 挂载到策略目录。

use super::custom_config::FeatureCustomConfig;
use super::system_probe::configure_system_probe;
use super::{
    overlay_enabled, remote_features, Feature, FeatureId, Options, RequiredComponent,
    RequiredComponents,
};
use crate::constants::{
    DD_HOST_ROOT, DD_RUNTIME_SECURITY_ENABLED, DD_RUNTIME_SECURITY_POLICIES_DIR,
    DD_RUNTIME_SECURITY_SOCKET, DD_RUNTIME_SECURITY_SYSCALL_MONITOR,
    DEFAULT_RUNTIME_SECURITY_SOCKET_PATH, GROUP_HOST_PATH, GROUP_MOUNT_PATH, GROUP_VOLUME_NAME,
    HOST_ROOT_HOST_PATH, HOST_ROOT_MOUNT_PATH, HOST_ROOT_VOLUME_NAME, OS_RELEASE_HOST_PATH,
    OS_RELEASE_MOUNT_PATH, OS_RELEASE_VOLUME_NAME, PASSWD_HOST_PATH, PASSWD_MOUNT_PATH,
    PASSWD_VOLUME_NAME, SECURITYFS_HOST_PATH, SECURITYFS_MOUNT_PATH, SECURITYFS_VOLUME_NAME,
    SECURITY_AGENT_RUNTIME_POLICIES_DIR_VOLUME_NAME, SECURITY_AGENT_RUNTIME_POLICIES_DIR_VOLUME_PATH,
    TRACEFS_PATH, TRACEFS_VOLUME_NAME,
};
use crate::crd::DatadogAgent;
use crate::merger::{env, host_path_volume, mount, PodTemplateManagers};
use crate::store::ResourceManagers;
use datadog_common::{bool_value, ContainerName, Result};

const CWS_POLICIES_SUFFIX: &str = "cws-policies";
const CWS_POLICY_FILE_NAME: &str = "custom.policy";

const CWS_CONTAINERS: [ContainerName; 3] = [
    ContainerName::CoreAgent,
    ContainerName::SecurityAgent,
    ContainerName::SystemProbe,
];

#[derive(Debug, Default)]
struct CwsFeature {
    syscall_monitor_enabled: bool,
    custom_policies: Option<FeatureCustomConfig>,
}

pub(super) fn build(_options: &Options) -> Box<dyn Feature> {
    Box::<CwsFeature>::default()
}

impl Feature for CwsFeature {
    fn id(&self) -> FeatureId {
        FeatureId::Cws
    }

    fn configure(&mut self, dda: &DatadogAgent) -> RequiredComponents {
        let config = dda.features().cws.unwrap_or_default();
        let remote = remote_features(dda)
            .and_then(|f| f.cws.as_ref())
            .and_then(|c| c.enabled);
        if !bool_value(overlay_enabled(config.enabled, remote)) {
            return RequiredComponents::default();
        }

        self.syscall_monitor_enabled = bool_value(config.syscall_monitor_enabled);
        self.custom_policies = config
            .custom_policies
            .as_ref()
            .map(|custom| FeatureCustomConfig::new(dda, custom, FeatureId::Cws, CWS_POLICIES_SUFFIX));

        RequiredComponents {
            agent: RequiredComponent::required(&[
                ContainerName::SecurityAgent,
                ContainerName::SystemProbe,
            ]),
            ..Default::default()
        }
    }

    fn manage_dependencies(
        &self,
        managers: &mut ResourceManagers,
        _components: &RequiredComponents,
    ) -> Result<()> {
        match &self.custom_policies {
            Some(custom) => custom.manage_dependencies(managers, CWS_POLICY_FILE_NAME),
            None => Ok(()),
        }
    }

    fn manage_node_agent(&self, managers: &mut PodTemplateManagers, _provider: &str) -> Result<()> {
        configure_system_probe(
            managers,
            &[ContainerName::CoreAgent, ContainerName::SecurityAgent],
            &[],
        );

        let mut envs = managers.env_var();
        envs.add_env_var_to_containers(&CWS_CONTAINERS, env(DD_RUNTIME_SECURITY_ENABLED, "true"));
        envs.add_env_var_to_containers(
            &CWS_CONTAINERS,
            env(DD_RUNTIME_SECURITY_SOCKET, DEFAULT_RUNTIME_SECURITY_SOCKET_PATH),
        );
        if self.syscall_monitor_enabled {
            envs.add_env_var_to_containers(
                &CWS_CONTAINERS,
                env(DD_RUNTIME_SECURITY_SYSCALL_MONITOR, "true"),
            );
        }
        envs.add_env_var_to_container(
            ContainerName::SystemProbe,
            env(
                DD_RUNTIME_SECURITY_POLICIES_DIR,
                SECURITY_AGENT_RUNTIME_POLICIES_DIR_VOLUME_PATH,
            ),
        );
        envs.add_env_var_to_container(
            ContainerName::SecurityAgent,
            env(DD_HOST_ROOT, HOST_ROOT_MOUNT_PATH),
        );

        let probe_mounts = [
            (TRACEFS_VOLUME_NAME, TRACEFS_PATH, TRACEFS_PATH, false),
            (SECURITYFS_VOLUME_NAME, SECURITYFS_HOST_PATH, SECURITYFS_MOUNT_PATH, true),
            (PASSWD_VOLUME_NAME, PASSWD_HOST_PATH, PASSWD_MOUNT_PATH, true),
            (GROUP_VOLUME_NAME, GROUP_HOST_PATH, GROUP_MOUNT_PATH, true),
            (OS_RELEASE_VOLUME_NAME, OS_RELEASE_HOST_PATH, OS_RELEASE_MOUNT_PATH, true),
        ];
        for (name, host, path, read_only) in probe_mounts {
            let (volume, mount) = host_path_volume(name, host, path, read_only);
            managers.volume().add_volume(volume);
            managers
                .volume_mount()
                .add_volume_mount_to_container(mount, ContainerName::SystemProbe);
        }
        let (hostroot, hostroot_mount) =
            host_path_volume(HOST_ROOT_VOLUME_NAME, HOST_ROOT_HOST_PATH, HOST_ROOT_MOUNT_PATH, true);
        managers.volume().add_volume(hostroot);
        managers
            .volume_mount()
            .add_volume_mount_to_container(hostroot_mount, ContainerName::SecurityAgent);

        if let Some(custom) = &self.custom_policies {
            custom.add_checksum_annotation(managers);
            managers.volume().add_volume(custom.volume(
                SECURITY_AGENT_RUNTIME_POLICIES_DIR_VOLUME_NAME,
                CWS_POLICY_FILE_NAME,
            ));
            managers.volume_mount().add_volume_mount_to_containers(
                mount(
                    SECURITY_AGENT_RUNTIME_POLICIES_DIR_VOLUME_NAME,
                    SECURITY_AGENT_RUNTIME_POLICIES_DIR_VOLUME_PATH,
                    true,
                ),
                &[ContainerName::SecurityAgent, ContainerName::SystemProbe],
            );
            managers.env_var().add_env_var_to_container(
                ContainerName::SecurityAgent,
                env(
                    DD_RUNTIME_SECURITY_POLICIES_DIR,
                    SECURITY_AGENT_RUNTIME_POLICIES_DIR_VOLUME_PATH,
                ),
            );
        }
        Ok(())
    }
}
