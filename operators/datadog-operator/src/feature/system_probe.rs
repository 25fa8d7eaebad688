//! system-probe 公共配置
//!
//! npm、usm、cws、服务发现与特权模式的 GPU 监控等特性都依赖 system-probe 容器，
//! 它们共享同一组注解、能力、卷与环境变量。

use crate::constants::{
    CGROUPS_HOST_PATH, CGROUPS_MOUNT_PATH, CGROUPS_VOLUME_NAME, DD_SYSTEM_PROBE_ENABLED,
    DD_SYSTEM_PROBE_SOCKET, DEBUGFS_PATH, DEBUGFS_VOLUME_NAME, DEFAULT_SYSTEM_PROBE_SOCKET_PATH,
    MODULES_VOLUME_NAME, MODULES_VOLUME_PATH, PROCDIR_HOST_PATH, PROCDIR_MOUNT_PATH,
    PROCDIR_VOLUME_NAME, SRC_VOLUME_NAME, SRC_VOLUME_PATH, SYSTEM_PROBE_APPARMOR_ANNOTATION_KEY,
    SYSTEM_PROBE_APPARMOR_ANNOTATION_VALUE, SYSTEM_PROBE_SOCKET_VOLUME_NAME,
    SYSTEM_PROBE_SOCKET_VOLUME_PATH,
};
use crate::merger::{empty_dir_volume, env, host_path_volume, PodTemplateManagers};
use datadog_common::ContainerName;

/// system-probe 需要的 Linux 能力
pub(super) const SYSTEM_PROBE_CAPABILITIES: [&str; 9] = [
    "SYS_ADMIN",
    "SYS_RESOURCE",
    "SYS_PTRACE",
    "NET_ADMIN",
    "NET_BROADCAST",
    "NET_RAW",
    "IPC_LOCK",
    "CHOWN",
    "DAC_READ_SEARCH",
];

/// 配置 system-probe 以及读取其套接字的容器
///
/// `consumers` 只读挂载套接字目录，并与 system-probe 一起获得启用开关与套接字路径。
/// `host_mounts` 额外获得 procdir、cgroups 与 debugfs 挂载。
pub(super) fn configure_system_probe(
    managers: &mut PodTemplateManagers,
    consumers: &[ContainerName],
    host_mounts: &[ContainerName],
) {
    managers.add_annotation(
        SYSTEM_PROBE_APPARMOR_ANNOTATION_KEY,
        SYSTEM_PROBE_APPARMOR_ANNOTATION_VALUE,
    );
    managers
        .security_context()
        .add_capabilities_to_container(&SYSTEM_PROBE_CAPABILITIES, ContainerName::SystemProbe);

    let mut mounted = vec![ContainerName::SystemProbe];
    mounted.extend(host_mounts.iter().copied().filter(|c| *c != ContainerName::SystemProbe));

    for (name, host, path, read_only) in [
        (PROCDIR_VOLUME_NAME, PROCDIR_HOST_PATH, PROCDIR_MOUNT_PATH, true),
        (CGROUPS_VOLUME_NAME, CGROUPS_HOST_PATH, CGROUPS_MOUNT_PATH, true),
        (DEBUGFS_VOLUME_NAME, DEBUGFS_PATH, DEBUGFS_PATH, false),
    ] {
        let (volume, mount) = host_path_volume(name, host, path, read_only);
        managers.volume().add_volume(volume);
        managers.volume_mount().add_volume_mount_to_containers(mount, &mounted);
    }

    let (socket, socket_rw) =
        empty_dir_volume(SYSTEM_PROBE_SOCKET_VOLUME_NAME, SYSTEM_PROBE_SOCKET_VOLUME_PATH, false);
    managers.volume().add_volume(socket);
    managers
        .volume_mount()
        .add_volume_mount_to_container(socket_rw, ContainerName::SystemProbe);
    let (_, socket_ro) =
        empty_dir_volume(SYSTEM_PROBE_SOCKET_VOLUME_NAME, SYSTEM_PROBE_SOCKET_VOLUME_PATH, true);
    managers.volume_mount().add_volume_mount_to_containers(socket_ro, consumers);

    let mut env_targets = consumers.to_vec();
    env_targets.push(ContainerName::SystemProbe);
    managers
        .env_var()
        .add_env_var_to_containers(&env_targets, env(DD_SYSTEM_PROBE_ENABLED, "true"));
    managers.env_var().add_env_var_to_containers(
        &env_targets,
        env(DD_SYSTEM_PROBE_SOCKET, DEFAULT_SYSTEM_PROBE_SOCKET_PATH),
    );
}

/// 内核模块与源码目录，eBPF 编译类检查需要
pub(super) fn mount_kernel_sources(managers: &mut PodTemplateManagers) {
    for (name, path) in [
        (MODULES_VOLUME_NAME, MODULES_VOLUME_PATH),
        (SRC_VOLUME_NAME, SRC_VOLUME_PATH),
    ] {
        let (volume, mount) = host_path_volume(name, path, path, true);
        managers.volume().add_volume(volume);
        managers
            .volume_mount()
            .add_volume_mount_to_container(mount, ContainerName::SystemProbe);
    }
}
