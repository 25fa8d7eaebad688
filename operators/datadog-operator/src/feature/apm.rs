//! APM 特性
//!
//! trace-agent 通过 TCP 端口 8126（可选映射到主机端口）或主机上的 Unix 套接字接收追踪数据。

use std::path::Path;

use super::{Feature, FeatureId, Options, RequiredComponent, RequiredComponents};
use crate::constants::{
    APM_SOCKET_HOST_PATH, APM_SOCKET_LOCAL_PATH, APM_SOCKET_NAME, APM_SOCKET_VOLUME_NAME,
    DD_APM_ENABLED, DD_APM_NON_LOCAL_TRAFFIC, DD_APM_RECEIVER_PORT, DD_APM_RECEIVER_SOCKET,
    DEFAULT_APM_PORT,
};
use crate::crd::DatadogAgent;
use crate::merger::{container_port, env, host_path_volume, PodTemplateManagers};
use datadog_common::{bool_value, ComponentName, ContainerName, Result};

const APM_PORT_NAME: &str = "traceport";

#[derive(Debug, Default)]
struct ApmFeature {
    host_port: Option<i32>,
    use_host_network: bool,
    uds_host_path: Option<String>,
}

pub(super) fn build(_options: &Options) -> Box<dyn Feature> {
    Box::<ApmFeature>::default()
}

/// 将主机上的套接字路径拆为目录与文件名
pub(super) fn split_socket_path<'a>(path: &'a str, default_name: &'a str) -> (&'a str, &'a str) {
    let path = Path::new(path);
    let dir = path.parent().and_then(|p| p.to_str()).filter(|d| !d.is_empty());
    let file = path.file_name().and_then(|f| f.to_str());
    match (dir, file) {
        (Some(dir), Some(file)) => (dir, file),
        _ => ("/", default_name),
    }
}

impl ApmFeature {
    fn configure_trace_agent(&self, managers: &mut PodTemplateManagers, container: ContainerName) {
        managers
            .env_var()
            .add_env_var_to_container(container, env(DD_APM_ENABLED, "true"));

        let mut port = container_port(APM_PORT_NAME, DEFAULT_APM_PORT, "TCP");
        if let Some(host_port) = self.host_port {
            port.host_port = Some(host_port);
            let mut receiver_port = DEFAULT_APM_PORT;
            // 使用主机网络时容器端口必须与主机端口一致
            if self.use_host_network {
                port.container_port = host_port;
                receiver_port = host_port;
            }
            let mut envs = managers.env_var();
            envs.add_env_var_to_container(container, env(DD_APM_NON_LOCAL_TRAFFIC, "true"));
            envs.add_env_var_to_container(
                container,
                env(DD_APM_RECEIVER_PORT, receiver_port.to_string()),
            );
        }
        managers.port().add_port_to_container(container, port);

        if let Some(host_path) = &self.uds_host_path {
            let (dir, socket) = split_socket_path(host_path, APM_SOCKET_NAME);
            managers.env_var().add_env_var_to_container(
                container,
                env(DD_APM_RECEIVER_SOCKET, format!("{}/{}", APM_SOCKET_LOCAL_PATH, socket)),
            );
            let (volume, volume_mount) =
                host_path_volume(APM_SOCKET_VOLUME_NAME, dir, APM_SOCKET_LOCAL_PATH, false);
            managers.volume().add_volume(volume);
            managers
                .volume_mount()
                .add_volume_mount_to_container(volume_mount, container);
        }
    }
}

impl Feature for ApmFeature {
    fn id(&self) -> FeatureId {
        FeatureId::Apm
    }

    fn configure(&mut self, dda: &DatadogAgent) -> RequiredComponents {
        let features = dda.features();
        let Some(config) = features.apm.filter(|c| bool_value(c.enabled)) else {
            return RequiredComponents::default();
        };

        self.host_port = config
            .host_port_config
            .filter(|c| bool_value(c.enabled))
            .map(|c| c.port.unwrap_or(DEFAULT_APM_PORT));
        self.use_host_network = dda
            .component_override(ComponentName::NodeAgent)
            .and_then(|o| o.host_network)
            .unwrap_or(false);
        self.uds_host_path = config
            .unix_domain_socket_config
            .filter(|c| bool_value(c.enabled))
            .map(|c| {
                c.path
                    .unwrap_or_else(|| format!("{}/{}", APM_SOCKET_HOST_PATH, APM_SOCKET_NAME))
            });

        RequiredComponents {
            agent: RequiredComponent::required(&[
                ContainerName::CoreAgent,
                ContainerName::TraceAgent,
            ]),
            ..Default::default()
        }
    }

    fn manage_node_agent(&self, managers: &mut PodTemplateManagers, _provider: &str) -> Result<()> {
        self.configure_trace_agent(managers, ContainerName::TraceAgent);
        Ok(())
    }

    fn manage_single_container_node_agent(
        &self,
        managers: &mut PodTemplateManagers,
        _provider: &str,
    ) -> Result<()> {
        self.configure_trace_agent(managers, ContainerName::UnprivilegedSingleAgent);
        Ok(())
    }
}
