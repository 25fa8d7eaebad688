//! GPU 监控特性
//!
//! 核心 Agent 运行 GPU 检查并通过 NVIDIA 容器运行时访问设备。特权模式下
//! system-probe 额外加载 eBPF GPU 模块，需要 system-probe 的全部公共配置。

use std::path::Path;

use super::system_probe::configure_system_probe;
use super::{Feature, FeatureId, Options, RequiredComponent, RequiredComponents};
use crate::constants::{
    DD_ENABLE_NVML_DETECTION, DD_GPU_CONFIGURE_CGROUP_PERMS, DD_GPU_ENABLED,
    DD_GPU_MONITORING_ENABLED, DD_KUBERNETES_POD_RESOURCES_SOCKET, DEV_NULL_PATH,
    HOST_RUN_MOUNT_PATH, HOST_RUN_PATH, HOST_RUN_VOLUME_NAME, NVIDIA_DEVICES_MOUNT_PATH,
    NVIDIA_DEVICES_VOLUME_NAME, NVIDIA_VISIBLE_DEVICES, POD_RESOURCES_VOLUME_NAME,
};
use crate::crd::DatadogAgent;
use crate::merger::{env, host_path_volume, PodTemplateManagers};
use datadog_common::{bool_value, ContainerName, Error, Result};

const DEFAULT_GPU_RUNTIME_CLASS: &str = "nvidia";

/// 创建 NVIDIA 设备节点需要的能力
const MKNOD: [&str; 1] = ["MKNOD"];

#[derive(Debug, Default)]
struct GpuFeature {
    privileged_mode: bool,
    patch_cgroup_permissions: bool,
    runtime_class: String,
    pod_resources_socket_path: Option<String>,
}

pub(super) fn build(_options: &Options) -> Box<dyn Feature> {
    Box::<GpuFeature>::default()
}

impl GpuFeature {
    fn configure_pod_resources_socket(&self, managers: &mut PodTemplateManagers) {
        let Some(dir) = self.pod_resources_socket_path.as_deref() else {
            return;
        };
        let socket = Path::new(dir).join("kubelet.sock");
        managers.env_var().add_env_var_to_container(
            ContainerName::CoreAgent,
            env(DD_KUBERNETES_POD_RESOURCES_SOCKET, socket.to_string_lossy()),
        );
        let (volume, mount) = host_path_volume(POD_RESOURCES_VOLUME_NAME, dir, dir, false);
        managers.volume().add_volume(volume);
        managers
            .volume_mount()
            .add_volume_mount_to_container(mount, ContainerName::CoreAgent);
    }

    fn configure_system_probe_module(&self, managers: &mut PodTemplateManagers) {
        configure_system_probe(managers, &[ContainerName::CoreAgent], &[]);
        let probe_and_core = [ContainerName::CoreAgent, ContainerName::SystemProbe];
        managers
            .env_var()
            .add_env_var_to_containers(&probe_and_core, env(DD_GPU_MONITORING_ENABLED, "true"));
        managers
            .env_var()
            .add_env_var_to_container(ContainerName::SystemProbe, env(NVIDIA_VISIBLE_DEVICES, "all"));
        for container in probe_and_core {
            managers
                .security_context()
                .add_capabilities_to_container(&MKNOD, container);
        }
        let (_, devices) = host_path_volume(
            NVIDIA_DEVICES_VOLUME_NAME,
            DEV_NULL_PATH,
            NVIDIA_DEVICES_MOUNT_PATH,
            true,
        );
        managers
            .volume_mount()
            .add_volume_mount_to_container(devices, ContainerName::SystemProbe);
    }

    fn configure_cgroup_permissions(&self, managers: &mut PodTemplateManagers) -> Result<()> {
        if !self.privileged_mode {
            return Err(Error::Render(
                "patchCgroupPermissions 只能在 privilegedMode 下使用".to_string(),
            ));
        }
        managers.env_var().add_env_var_to_container(
            ContainerName::SystemProbe,
            env(DD_GPU_CONFIGURE_CGROUP_PERMS, "true"),
        );
        let (volume, mount) =
            host_path_volume(HOST_RUN_VOLUME_NAME, HOST_RUN_PATH, HOST_RUN_MOUNT_PATH, false);
        managers.volume().add_volume(volume);
        managers
            .volume_mount()
            .add_volume_mount_to_container(mount, ContainerName::SystemProbe);
        Ok(())
    }
}

impl Feature for GpuFeature {
    fn id(&self) -> FeatureId {
        FeatureId::Gpu
    }

    fn configure(&mut self, dda: &DatadogAgent) -> RequiredComponents {
        let Some(config) = dda.features().gpu.filter(|c| bool_value(c.enabled)) else {
            return RequiredComponents::default();
        };
        self.privileged_mode = bool_value(config.privileged_mode);
        self.patch_cgroup_permissions = bool_value(config.patch_cgroup_permissions);
        self.runtime_class = config
            .pod_runtime_class_name
            .unwrap_or_else(|| DEFAULT_GPU_RUNTIME_CLASS.to_string());
        self.pod_resources_socket_path = dda
            .global()
            .kubelet
            .and_then(|k| k.pod_resources_socket_path)
            .filter(|p| !p.is_empty());

        let mut containers = vec![ContainerName::CoreAgent];
        if self.privileged_mode {
            containers.push(ContainerName::SystemProbe);
        }
        RequiredComponents {
            agent: RequiredComponent::required(&containers),
            ..Default::default()
        }
    }

    fn manage_node_agent(&self, managers: &mut PodTemplateManagers, _provider: &str) -> Result<()> {
        {
            let mut envs = managers.env_var();
            envs.add_env_var_to_container(ContainerName::CoreAgent, env(DD_ENABLE_NVML_DETECTION, "true"));
            envs.add_env_var_to_containers(
                &[ContainerName::CoreAgent, ContainerName::InitConfig],
                env(DD_GPU_ENABLED, "true"),
            );
            envs.add_env_var_to_container(ContainerName::CoreAgent, env(NVIDIA_VISIBLE_DEVICES, "all"));
        }
        self.configure_pod_resources_socket(managers);
        if self.privileged_mode {
            self.configure_system_probe_module(managers);
        }
        if self.patch_cgroup_permissions {
            self.configure_cgroup_permissions(managers)?;
        }

        let (volume, mount) = host_path_volume(
            NVIDIA_DEVICES_VOLUME_NAME,
            DEV_NULL_PATH,
            NVIDIA_DEVICES_MOUNT_PATH,
            true,
        );
        managers.volume().add_volume(volume);
        managers
            .volume_mount()
            .add_volume_mount_to_container(mount, ContainerName::CoreAgent);

        // 空字符串表示保留原有的运行时类
        if !self.runtime_class.is_empty() {
            managers.pod_spec_mut().runtime_class_name = Some(self.runtime_class.clone());
        }
        Ok(())
    }
}
