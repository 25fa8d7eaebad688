//! 单个容器的覆盖
//!
//! 普通容器与同名 init 容器都会被覆盖，容器改名放在最后，之前的步骤都按原名定位。

use k8s_openapi::api::core::v1::{
    ConfigMapVolumeSource, Container, HTTPGetAction, HostPathVolumeSource, Probe,
    ResourceRequirements, Volume,
};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use std::collections::BTreeMap;

use crate::constants::{
    APPARMOR_ANNOTATION_PREFIX, DD_HEALTH_PORT, DD_LOG_LEVEL, DEFAULT_AGENT_HEALTH_PORT,
    DEFAULT_LIVENESS_PROBE_PATH, DEFAULT_READINESS_PROBE_PATH, DEFAULT_STARTUP_PROBE_PATH,
    SECCOMP_ROOT_VOLUME_NAME, SECCOMP_SECURITY_VOLUME_NAME,
};
use crate::merger::{env, PodTemplateManagers};
use datadog_common::{ContainerName, DatadogAgentGenericContainer, SeccompConfig};

/// 探针是否已经指定了处理方式
fn has_handler(probe: &Probe) -> bool {
    probe.exec.is_some() || probe.http_get.is_some() || probe.tcp_socket.is_some() || probe.grpc.is_some()
}

/// 未指定处理方式的探针补上指向健康检查端口的 httpGet
fn default_probe(probe: &Probe, path: &str, health_port: i32) -> Probe {
    if has_handler(probe) {
        return probe.clone();
    }
    Probe {
        http_get: Some(HTTPGetAction {
            path: Some(path.to_string()),
            port: IntOrString::Int(health_port),
            ..Default::default()
        }),
        ..probe.clone()
    }
}

/// 指向默认健康端口的探针改为新端口
fn retarget_probe(probe: Option<&mut Probe>, health_port: i32) {
    let Some(action) = probe.and_then(|p| p.http_get.as_mut()) else {
        return;
    };
    if action.port == IntOrString::Int(DEFAULT_AGENT_HEALTH_PORT) {
        action.port = IntOrString::Int(health_port);
    }
}

/// 按键合并资源请求与限制，显式的 0 也是有效值
fn merge_resources(current: &mut ResourceRequirements, other: &ResourceRequirements) {
    for (target, source) in [
        (&mut current.requests, &other.requests),
        (&mut current.limits, &other.limits),
    ] {
        if let Some(source) = source {
            let target = target.get_or_insert_with(BTreeMap::new);
            for (name, quantity) in source {
                target.insert(name.clone(), quantity.clone());
            }
        }
    }
}

fn override_container(container: &mut Container, config: &DatadogAgentGenericContainer) {
    if let Some(resources) = &config.resources {
        merge_resources(
            container.resources.get_or_insert_with(ResourceRequirements::default),
            resources,
        );
    }
    if let Some(command) = &config.command {
        container.command = Some(command.clone());
    }
    if let Some(args) = &config.args {
        container.args = Some(args.clone());
    }
    if let Some(security_context) = &config.security_context {
        container.security_context = Some(security_context.clone());
    }

    let health_port = config.health_port.unwrap_or(DEFAULT_AGENT_HEALTH_PORT);
    if config.health_port.is_some() {
        retarget_probe(container.readiness_probe.as_mut(), health_port);
        retarget_probe(container.liveness_probe.as_mut(), health_port);
        retarget_probe(container.startup_probe.as_mut(), health_port);
    }
    if let Some(probe) = &config.readiness_probe {
        container.readiness_probe = Some(default_probe(probe, DEFAULT_READINESS_PROBE_PATH, health_port));
    }
    if let Some(probe) = &config.liveness_probe {
        container.liveness_probe = Some(default_probe(probe, DEFAULT_LIVENESS_PROBE_PATH, health_port));
    }
    if let Some(probe) = &config.startup_probe {
        container.startup_probe = Some(default_probe(probe, DEFAULT_STARTUP_PROBE_PATH, health_port));
    }
}

/// 自定义 seccomp 根目录与配置，只作用于 system-probe
fn apply_seccomp(managers: &mut PodTemplateManagers, seccomp: &SeccompConfig) {
    if let Some(root) = seccomp.custom_root_path.as_ref().filter(|p| !p.is_empty()) {
        managers.volume().add_volume(Volume {
            name: SECCOMP_ROOT_VOLUME_NAME.to_string(),
            host_path: Some(HostPathVolumeSource {
                path: root.clone(),
                type_: None,
            }),
            ..Default::default()
        });
    }
    // 内联的 seccomp 配置不会生成 ConfigMap，只支持引用
    if let Some(config_map) = seccomp.custom_profile.as_ref().and_then(|p| p.config_map.as_ref()) {
        managers.volume().add_volume(Volume {
            name: SECCOMP_SECURITY_VOLUME_NAME.to_string(),
            config_map: Some(ConfigMapVolumeSource {
                name: Some(config_map.name.clone()),
                items: if config_map.items.is_empty() {
                    None
                } else {
                    Some(config_map.items.clone())
                },
                ..Default::default()
            }),
            ..Default::default()
        });
    }
}

/// 应用单个容器的覆盖配置
pub(super) fn apply_container_override(
    managers: &mut PodTemplateManagers,
    name: ContainerName,
    config: &DatadogAgentGenericContainer,
) {
    if !managers.has_container(name) {
        tracing::debug!("容器 {} 不在模板中，忽略其覆盖配置", name);
        return;
    }

    {
        let mut envs = managers.env_var();
        if let Some(level) = config.log_level.as_ref().filter(|l| !l.is_empty()) {
            envs.add_env_var_to_container(name, env(DD_LOG_LEVEL, level.as_str()));
        }
        if let Some(port) = config.health_port {
            envs.add_env_var_to_container(name, env(DD_HEALTH_PORT, port.to_string()));
        }
        for var in &config.env {
            envs.add_env_var_to_container(name, var.clone());
        }
    }
    for volume_mount in &config.volume_mounts {
        managers
            .volume_mount()
            .add_volume_mount_to_container(volume_mount.clone(), name);
    }

    if name == ContainerName::SystemProbe {
        if let Some(seccomp) = &config.seccomp_config {
            apply_seccomp(managers, seccomp);
        }
    }
    if let Some(profile) = &config.app_armor_profile_name {
        let target = config.name.as_deref().unwrap_or(name.as_str());
        managers.add_annotation(
            format!("{}/{}", APPARMOR_ANNOTATION_PREFIX, target),
            profile.as_str(),
        );
    }

    for container in managers.containers_named_mut(name.as_str()) {
        override_container(container, config);
    }
    if let Some(new_name) = config.name.as_ref().filter(|n| !n.is_empty()) {
        managers.rename_container(name.as_str(), new_name);
    }
}
