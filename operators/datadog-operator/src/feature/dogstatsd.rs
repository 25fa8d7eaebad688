//! DogStatsD 特性
//!
//! 核心 Agent 始终监听 UDP 8125。该特性没有开关，只调整端口映射、套接字与来源检测。

use super::apm::split_socket_path;
use super::{Feature, FeatureId, Options, RequiredComponent, RequiredComponents};
use crate::constants::{
    DD_DOGSTATSD_NON_LOCAL_TRAFFIC, DD_DOGSTATSD_ORIGIN_DETECTION,
    DD_DOGSTATSD_ORIGIN_DETECTION_CLIENT, DD_DOGSTATSD_PORT, DD_DOGSTATSD_SOCKET,
    DD_DOGSTATSD_TAG_CARDINALITY, DEFAULT_DOGSTATSD_PORT, DOGSTATSD_SOCKET_HOST_PATH,
    DOGSTATSD_SOCKET_LOCAL_PATH, DOGSTATSD_SOCKET_NAME, DOGSTATSD_SOCKET_VOLUME_NAME,
};
use crate::crd::DatadogAgent;
use crate::merger::{container_port, env, host_path_volume, PodTemplateManagers};
use datadog_common::{bool_value, ComponentName, ContainerName, Result};

const DOGSTATSD_PORT_NAME: &str = "dogstatsdport";

#[derive(Debug, Default)]
struct DogstatsdFeature {
    host_port: Option<i32>,
    use_host_network: bool,
    uds_host_path: Option<String>,
    origin_detection: bool,
    tag_cardinality: Option<String>,
}

pub(super) fn build(_options: &Options) -> Box<dyn Feature> {
    Box::<DogstatsdFeature>::default()
}

impl DogstatsdFeature {
    fn configure_agent(&self, managers: &mut PodTemplateManagers, container: ContainerName) {
        let mut port = container_port(DOGSTATSD_PORT_NAME, DEFAULT_DOGSTATSD_PORT, "UDP");
        if let Some(host_port) = self.host_port {
            port.host_port = Some(host_port);
            if self.use_host_network {
                port.container_port = host_port;
                managers
                    .env_var()
                    .add_env_var_to_container(container, env(DD_DOGSTATSD_PORT, host_port.to_string()));
            }
            managers
                .env_var()
                .add_env_var_to_container(container, env(DD_DOGSTATSD_NON_LOCAL_TRAFFIC, "true"));
        }
        managers.port().add_port_to_container(container, port);

        if let Some(host_path) = &self.uds_host_path {
            let (dir, socket) = split_socket_path(host_path, DOGSTATSD_SOCKET_NAME);
            managers.env_var().add_env_var_to_container(
                container,
                env(
                    DD_DOGSTATSD_SOCKET,
                    format!("{}/{}", DOGSTATSD_SOCKET_LOCAL_PATH, socket),
                ),
            );
            let (volume, volume_mount) = host_path_volume(
                DOGSTATSD_SOCKET_VOLUME_NAME,
                dir,
                DOGSTATSD_SOCKET_LOCAL_PATH,
                false,
            );
            managers.volume().add_volume(volume);
            managers
                .volume_mount()
                .add_volume_mount_to_container(volume_mount, container);
        }

        if self.origin_detection {
            let mut envs = managers.env_var();
            envs.add_env_var_to_container(container, env(DD_DOGSTATSD_ORIGIN_DETECTION, "true"));
            envs.add_env_var_to_container(
                container,
                env(DD_DOGSTATSD_ORIGIN_DETECTION_CLIENT, "true"),
            );
            // 通过套接字做来源检测需要看到主机上的进程
            if self.uds_host_path.is_some() {
                managers.pod_spec_mut().host_pid = Some(true);
            }
        }
        if let Some(cardinality) = &self.tag_cardinality {
            managers
                .env_var()
                .add_env_var_to_container(container, env(DD_DOGSTATSD_TAG_CARDINALITY, cardinality));
        }
    }
}

impl Feature for DogstatsdFeature {
    fn id(&self) -> FeatureId {
        FeatureId::Dogstatsd
    }

    fn configure(&mut self, dda: &DatadogAgent) -> RequiredComponents {
        let config = dda.features().dogstatsd.unwrap_or_default();

        self.host_port = config
            .host_port_config
            .filter(|c| bool_value(c.enabled))
            .map(|c| c.port.unwrap_or(DEFAULT_DOGSTATSD_PORT));
        self.use_host_network = dda
            .component_override(ComponentName::NodeAgent)
            .and_then(|o| o.host_network)
            .unwrap_or(false);
        self.uds_host_path = config
            .unix_domain_socket_config
            .filter(|c| bool_value(c.enabled))
            .map(|c| {
                c.path.unwrap_or_else(|| {
                    format!("{}/{}", DOGSTATSD_SOCKET_HOST_PATH, DOGSTATSD_SOCKET_NAME)
                })
            });
        self.origin_detection = bool_value(config.origin_detection_enabled);
        self.tag_cardinality = config.tag_cardinality.filter(|c| !c.is_empty());

        RequiredComponents {
            agent: RequiredComponent::required(&[ContainerName::CoreAgent]),
            ..Default::default()
        }
    }

    fn manage_node_agent(&self, managers: &mut PodTemplateManagers, _provider: &str) -> Result<()> {
        self.configure_agent(managers, ContainerName::CoreAgent);
        Ok(())
    }

    fn manage_single_container_node_agent(
        &self,
        managers: &mut PodTemplateManagers,
        _provider: &str,
    ) -> Result<()> {
        self.configure_agent(managers, ContainerName::UnprivilegedSingleAgent);
        Ok(())
    }
}
