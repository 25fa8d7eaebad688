//! 节点 Agent 默认模板
//!
//! 容器列表由需求决定：单容器策略下只有一个非特权容器，否则每个需要的 Agent 进程
//! 各占一个容器。init 容器负责准备配置目录，需要 system-probe 时还会安装 seccomp 配置。

use k8s_openapi::api::core::v1::{
    Container, EnvVar, PodSecurityContext, PodSpec, SeccompProfile, SecurityContext, Volume,
    VolumeMount,
};

use super::{command, default_image, health_probes, install_info_volume};
use crate::constants::{
    AGENT_IMAGE_NAME, AGENT_LATEST_VERSION, AUTH_TOKEN_FILE_PATH, AUTH_VOLUME_NAME,
    AUTH_VOLUME_PATH, CGROUPS_HOST_PATH, CGROUPS_MOUNT_PATH, CGROUPS_VOLUME_NAME,
    CONFIG_VOLUME_NAME, CONFIG_VOLUME_PATH, DD_AUTH_TOKEN_FILE_PATH, DD_CLUSTER_AGENT_ENABLED,
    DD_CLUSTER_AGENT_KUBE_SERVICE_NAME, DD_CLUSTER_AGENT_TOKEN_NAME, DD_HEALTH_PORT,
    DD_KUBERNETES_KUBELET_HOST, DEFAULT_AGENT_HEALTH_PORT, DOGSTATSD_SOCKET_HOST_PATH,
    DOGSTATSD_SOCKET_LOCAL_PATH, DOGSTATSD_SOCKET_VOLUME_NAME, EXTRA_CHECKSD_VOLUME_NAME,
    EXTRA_CHECKSD_VOLUME_PATH, EXTRA_CONFD_VOLUME_NAME, EXTRA_CONFD_VOLUME_PATH,
    INIT_VOLUME_MOUNT_PATH, KUBERNETES_ENV, LOGS_VOLUME_NAME, LOGS_VOLUME_PATH,
    PROCDIR_HOST_PATH, PROCDIR_MOUNT_PATH, PROCDIR_VOLUME_NAME, SECCOMP_ROOT_HOST_PATH,
    SECCOMP_ROOT_VOLUME_NAME, SECCOMP_ROOT_VOLUME_PATH, SECCOMP_SECURITY_VOLUME_NAME,
    SECCOMP_SECURITY_VOLUME_PATH, SYSTEM_PROBE_SECCOMP_KEY, SYSTEM_PROBE_SECCOMP_PROFILE_NAME,
};
use crate::crd::DatadogAgent;
use crate::feature::{Options, RequiredComponents};
use crate::merger::{
    config_map_volume, empty_dir_volume, env, env_from_field, host_path_volume,
};
use datadog_common::{ComponentName, ContainerName};

const DATADOG_YAML: &str = "/etc/datadog-agent/datadog.yaml";
const SYSTEM_PROBE_YAML: &str = "/etc/datadog-agent/system-probe.yaml";
const INIT_CONFIG_SCRIPT: &str =
    "for script in $(find /etc/cont-init.d/ -type f -name '*.sh' | sort) ; do bash $script ; done";

/// 节点 Agent 使用的全部卷
struct AgentVolumes {
    logs: (Volume, VolumeMount),
    auth: (Volume, VolumeMount),
    install_info: (Volume, VolumeMount),
    checksd: (Volume, VolumeMount),
    confd: (Volume, VolumeMount),
    config: (Volume, VolumeMount),
    procdir: (Volume, VolumeMount),
    cgroups: (Volume, VolumeMount),
    dsd_socket: (Volume, VolumeMount),
}

impl AgentVolumes {
    fn new(dda: &DatadogAgent) -> Self {
        Self {
            logs: empty_dir_volume(LOGS_VOLUME_NAME, LOGS_VOLUME_PATH, false),
            auth: empty_dir_volume(AUTH_VOLUME_NAME, AUTH_VOLUME_PATH, false),
            install_info: install_info_volume(dda),
            checksd: empty_dir_volume(EXTRA_CHECKSD_VOLUME_NAME, EXTRA_CHECKSD_VOLUME_PATH, true),
            confd: empty_dir_volume(EXTRA_CONFD_VOLUME_NAME, EXTRA_CONFD_VOLUME_PATH, true),
            config: empty_dir_volume(CONFIG_VOLUME_NAME, CONFIG_VOLUME_PATH, false),
            procdir: host_path_volume(PROCDIR_VOLUME_NAME, PROCDIR_HOST_PATH, PROCDIR_MOUNT_PATH, true),
            cgroups: host_path_volume(CGROUPS_VOLUME_NAME, CGROUPS_HOST_PATH, CGROUPS_MOUNT_PATH, true),
            dsd_socket: host_path_volume(
                DOGSTATSD_SOCKET_VOLUME_NAME,
                DOGSTATSD_SOCKET_HOST_PATH,
                DOGSTATSD_SOCKET_LOCAL_PATH,
                false,
            ),
        }
    }

    fn volumes(&self) -> Vec<Volume> {
        [
            &self.logs,
            &self.auth,
            &self.install_info,
            &self.checksd,
            &self.confd,
            &self.config,
            &self.procdir,
            &self.cgroups,
            &self.dsd_socket,
        ]
        .into_iter()
        .map(|(volume, _)| volume.clone())
        .collect()
    }

    fn mounts(&self, container: ContainerName) -> Vec<VolumeMount> {
        let pick = |items: &[&(Volume, VolumeMount)]| items.iter().map(|(_, m)| m.clone()).collect();
        match container {
            ContainerName::CoreAgent | ContainerName::UnprivilegedSingleAgent => pick(&[
                &self.logs,
                &self.auth,
                &self.install_info,
                &self.config,
                &self.procdir,
                &self.cgroups,
                &self.dsd_socket,
            ]),
            ContainerName::TraceAgent | ContainerName::ProcessAgent => pick(&[
                &self.logs,
                &self.auth,
                &self.config,
                &self.procdir,
                &self.cgroups,
                &self.dsd_socket,
            ]),
            ContainerName::SecurityAgent => {
                pick(&[&self.logs, &self.auth, &self.config, &self.dsd_socket])
            }
            ContainerName::SystemProbe => pick(&[&self.logs, &self.auth, &self.config]),
            _ => Vec::new(),
        }
    }
}

/// 所有 Agent 容器共用的环境变量
fn common_env(dda: &DatadogAgent, required: &RequiredComponents) -> Vec<EnvVar> {
    let mut vars = vec![
        env(KUBERNETES_ENV, "yes"),
        env_from_field(DD_KUBERNETES_KUBELET_HOST, "status.hostIP"),
        env(DD_AUTH_TOKEN_FILE_PATH, AUTH_TOKEN_FILE_PATH),
    ];
    if required.cluster_agent.is_enabled() {
        vars.push(env(DD_CLUSTER_AGENT_ENABLED, "true"));
        vars.push(env(
            DD_CLUSTER_AGENT_KUBE_SERVICE_NAME,
            dda.rbac_resource_name(ComponentName::ClusterAgent),
        ));
        vars.push(env(DD_CLUSTER_AGENT_TOKEN_NAME, dda.child_name("token")));
    }
    vars
}

fn agent_container(
    name: ContainerName,
    image: &str,
    common: &[EnvVar],
    volumes: &AgentVolumes,
) -> Option<Container> {
    let mut container = Container {
        name: name.as_str().to_string(),
        image: Some(image.to_string()),
        env: Some(common.to_vec()),
        volume_mounts: Some(volumes.mounts(name)),
        ..Default::default()
    };
    match name {
        ContainerName::CoreAgent | ContainerName::UnprivilegedSingleAgent => {
            let (liveness, readiness, startup) = health_probes();
            container.command = command(&["agent", "run"]);
            container.liveness_probe = Some(liveness);
            container.readiness_probe = Some(readiness);
            container.startup_probe = Some(startup);
            container
                .env
                .get_or_insert_with(Vec::new)
                .push(env(DD_HEALTH_PORT, DEFAULT_AGENT_HEALTH_PORT.to_string()));
        }
        ContainerName::TraceAgent => {
            container.command = command(&["trace-agent", &format!("-config={}", DATADOG_YAML)]);
        }
        ContainerName::ProcessAgent => {
            container.command = command(&["process-agent", &format!("--cfgpath={}", DATADOG_YAML)]);
        }
        ContainerName::SecurityAgent => {
            container.command = command(&["security-agent", "start", &format!("-c={}", DATADOG_YAML)]);
        }
        ContainerName::SystemProbe => {
            container.command =
                command(&["system-probe", &format!("--config={}", SYSTEM_PROBE_YAML)]);
            container.security_context = Some(SecurityContext {
                seccomp_profile: Some(SeccompProfile {
                    type_: "Localhost".to_string(),
                    localhost_profile: Some(SYSTEM_PROBE_SECCOMP_PROFILE_NAME.to_string()),
                }),
                ..Default::default()
            });
        }
        _ => return None,
    }
    Some(container)
}

/// 需求中的 Agent 容器；多容器模式下始终包含核心 Agent
fn agent_container_names(required: &RequiredComponents) -> Vec<ContainerName> {
    if required.agent.single_container_strategy_enabled() {
        return vec![ContainerName::UnprivilegedSingleAgent];
    }
    let mut names = required.agent.containers.clone();
    if !names.contains(&ContainerName::CoreAgent) {
        names.insert(0, ContainerName::CoreAgent);
    }
    names.retain(|n| *n != ContainerName::UnprivilegedSingleAgent);
    names.sort();
    names
}

fn init_containers(
    image: &str,
    volumes: &AgentVolumes,
    common: &[EnvVar],
    system_probe: bool,
    seccomp: &[(Volume, VolumeMount)],
) -> Vec<Container> {
    let mut init_volume_mount = volumes.config.1.clone();
    init_volume_mount.mount_path = INIT_VOLUME_MOUNT_PATH.to_string();
    let mut checksd = volumes.checksd.1.clone();
    checksd.read_only = Some(true);
    let mut confd = volumes.confd.1.clone();
    confd.read_only = Some(true);

    let mut containers = vec![
        Container {
            name: ContainerName::InitVolume.as_str().to_string(),
            image: Some(image.to_string()),
            command: command(&["bash", "-c"]),
            args: Some(vec![format!("cp -vnr {} /opt", CONFIG_VOLUME_PATH)]),
            volume_mounts: Some(vec![init_volume_mount]),
            ..Default::default()
        },
        Container {
            name: ContainerName::InitConfig.as_str().to_string(),
            image: Some(image.to_string()),
            command: command(&["bash", "-c"]),
            args: Some(vec![INIT_CONFIG_SCRIPT.to_string()]),
            env: Some(common.to_vec()),
            volume_mounts: Some(vec![
                volumes.logs.1.clone(),
                checksd,
                volumes.auth.1.clone(),
                confd,
                volumes.config.1.clone(),
                volumes.procdir.1.clone(),
            ]),
            ..Default::default()
        },
    ];
    if system_probe {
        containers.push(Container {
            name: ContainerName::SeccompSetup.as_str().to_string(),
            image: Some(image.to_string()),
            command: command(&[
                "cp",
                &format!("{}/{}", SECCOMP_SECURITY_VOLUME_PATH, SYSTEM_PROBE_SECCOMP_KEY),
                &format!("{}/{}", SECCOMP_ROOT_VOLUME_PATH, SYSTEM_PROBE_SECCOMP_PROFILE_NAME),
            ]),
            volume_mounts: Some(seccomp.iter().map(|(_, m)| m.clone()).collect()),
            ..Default::default()
        });
    }
    containers
}

/// seccomp 配置卷与 kubelet seccomp 根目录
fn seccomp_volumes(dda: &DatadogAgent) -> Vec<(Volume, VolumeMount)> {
    vec![
        config_map_volume(
            SECCOMP_SECURITY_VOLUME_NAME,
            &dda.child_name("system-probe-seccomp"),
            Vec::new(),
            SECCOMP_SECURITY_VOLUME_PATH,
        ),
        host_path_volume(
            SECCOMP_ROOT_VOLUME_NAME,
            SECCOMP_ROOT_HOST_PATH,
            SECCOMP_ROOT_VOLUME_PATH,
            false,
        ),
    ]
}

pub(super) fn default_pod_spec(
    dda: &DatadogAgent,
    required: &RequiredComponents,
    options: &Options,
) -> PodSpec {
    let image = default_image(options, AGENT_IMAGE_NAME, AGENT_LATEST_VERSION);
    let volumes = AgentVolumes::new(dda);
    let common = common_env(dda, required);
    let names = agent_container_names(required);
    let system_probe = names.contains(&ContainerName::SystemProbe);
    let seccomp = if system_probe {
        seccomp_volumes(dda)
    } else {
        Vec::new()
    };

    let mut pod_volumes = volumes.volumes();
    pod_volumes.extend(seccomp.iter().map(|(v, _)| v.clone()));

    PodSpec {
        service_account_name: Some(dda.service_account_name(ComponentName::NodeAgent)),
        security_context: Some(PodSecurityContext {
            run_as_user: Some(0),
            ..Default::default()
        }),
        init_containers: Some(init_containers(&image, &volumes, &common, system_probe, &seccomp)),
        containers: names
            .into_iter()
            .filter_map(|name| agent_container(name, &image, &common, &volumes))
            .collect(),
        volumes: Some(pod_volumes),
        ..Default::default()
    }
}
