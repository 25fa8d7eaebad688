//! 全局设置
//!
//! 与启用了哪些特性无关、作用于每个组件的横切步骤：站点、日志级别、标签、凭证、
//! 密钥后端、镜像仓库与 FIPS 代理。kubelet 与容器运行时套接字只作用于节点 Agent。
//! 全局附属资源（凭证 Secret、令牌、RBAC、网络策略）每次协调只生成一次。

mod credentials;
mod fips;
mod secret_backend;
mod tags;

use tracing::debug;

use crate::constants::{
    DD_CLUSTER_NAME, DD_CRI_SOCKET_PATH, DD_DD_URL, DD_KUBELET_CLIENT_CA,
    DD_KUBELET_TLS_VERIFY, DD_KUBERNETES_KUBELET_HOST, DD_LOG_LEVEL, DD_ORIGIN_DETECTION_UNIFIED,
    DD_SITE, DOCKER_HOST, HOST_CRI_SOCKET_PATH_PREFIX, KUBELET_AGENT_CA_PATH,
    KUBELET_CA_VOLUME_NAME, RUNTIME_SOCKET_VOLUME_NAME,
};
use crate::crd::DatadogAgent;
use crate::feature::{Options, RequiredComponents};
use crate::merger::{env, host_path_volume, PodTemplateManagers};
use crate::overrides::image::with_registry;
use crate::store::ResourceManagers;
use datadog_common::error::aggregate;
use datadog_common::{
    bool_value, ComponentName, ContainerName, GlobalConfig, KubeletConfig, NetworkPolicyFlavor,
    Result, DEFAULT_LOG_LEVEL, DEFAULT_REGISTRY,
};

/// 全局仓库可以替换的官方镜像仓库
const KNOWN_REGISTRIES: [&str; 4] = [
    DEFAULT_REGISTRY,
    "docker.io/datadog",
    "public.ecr.aws/datadog",
    "datadoghq.azurecr.io",
];

/// 节点上需要访问 kubelet 与容器运行时的容器
const HOST_ACCESS_CONTAINERS: [ContainerName; 5] = [
    ContainerName::CoreAgent,
    ContainerName::ProcessAgent,
    ContainerName::TraceAgent,
    ContainerName::SecurityAgent,
    ContainerName::UnprivilegedSingleAgent,
];

fn non_empty(value: Option<&String>) -> Option<&str> {
    value.map(String::as_str).filter(|v| !v.is_empty())
}

/// 把全局配置应用到某个组件的 Pod 模板
///
/// 站点、日志级别、标签与凭证写入全部容器桶，容器级覆盖仍然优先。
pub fn apply_global_settings(
    managers: &mut PodTemplateManagers,
    dda: &DatadogAgent,
    component: ComponentName,
    required: &RequiredComponents,
    options: &Options,
) -> Result<()> {
    let global = dda.global();

    {
        let mut envs = managers.env_var();
        if let Some(cluster_name) = non_empty(global.cluster_name.as_ref()) {
            envs.add_env_var(env(DD_CLUSTER_NAME, cluster_name));
        }
        envs.add_env_var(env(DD_SITE, global.site()));
        if let Some(url) = global.endpoint.as_ref().and_then(|e| non_empty(e.url.as_ref())) {
            envs.add_env_var(env(DD_DD_URL, url));
        }
        envs.add_env_var(env(
            DD_LOG_LEVEL,
            global.log_level.as_deref().unwrap_or(DEFAULT_LOG_LEVEL),
        ));
        if let Some(enabled) = global.origin_detection_unified.as_ref().and_then(|o| o.enabled) {
            envs.add_env_var(env(DD_ORIGIN_DETECTION_UNIFIED, enabled.to_string()));
        }
    }

    tags::apply_tags(managers, &global)?;
    credentials::apply_credentials(managers, dda, &global, required.cluster_agent.is_enabled());
    if required.cluster_agent.is_enabled() {
        if let Some((key, checksum)) = credentials::token_checksum_annotation(&global)? {
            managers.add_annotation(key, checksum);
        }
    }
    if let Some(secret_backend) = global.secret_backend.as_ref() {
        secret_backend::apply_secret_backend(managers, secret_backend);
    }
    for var in &global.env {
        managers.env_var().add_env_var_to_every_container(var.clone());
    }

    apply_registry(managers, &global, options);

    if component == ComponentName::NodeAgent {
        if let Some(kubelet) = global.kubelet.as_ref() {
            apply_kubelet(managers, kubelet);
        }
        apply_runtime_socket(managers, &global);
    }

    if let Some(fips) = fips::enabled(global.fips.as_ref()) {
        fips::apply_fips(managers, dda, fips, global.registry())?;
    }
    Ok(())
}

/// 非默认仓库时替换官方仓库中的镜像，用户指定的其他仓库不动
fn apply_registry(managers: &mut PodTemplateManagers, global: &GlobalConfig, options: &Options) {
    let registry = global.registry();
    if registry == DEFAULT_REGISTRY {
        return;
    }
    let mut replaceable: Vec<&str> = KNOWN_REGISTRIES.to_vec();
    replaceable.push(options.default_registry.as_str());

    for container in managers.all_containers_mut() {
        let Some(image) = container.image.as_deref() else {
            continue;
        };
        if let Some(updated) = with_registry(image, registry, &replaceable) {
            debug!("容器 {} 使用全局镜像仓库: {}", container.name, updated);
            container.image = Some(updated);
        }
    }
}

fn apply_kubelet(managers: &mut PodTemplateManagers, kubelet: &KubeletConfig) {
    if let Some(host) = kubelet.host.as_ref() {
        managers.env_var().add_env_var(k8s_openapi::api::core::v1::EnvVar {
            name: DD_KUBERNETES_KUBELET_HOST.to_string(),
            value: None,
            value_from: Some(host.clone()),
        });
    }
    if let Some(tls_verify) = kubelet.tls_verify {
        managers
            .env_var()
            .add_env_var(env(DD_KUBELET_TLS_VERIFY, tls_verify.to_string()));
    }
    if let Some(host_ca_path) = non_empty(kubelet.host_ca_path.as_ref()) {
        let agent_ca_path =
            non_empty(kubelet.agent_ca_path.as_ref()).unwrap_or(KUBELET_AGENT_CA_PATH);
        let (volume, mount) =
            host_path_volume(KUBELET_CA_VOLUME_NAME, host_ca_path, agent_ca_path, true);
        managers.volume().add_volume(volume);
        managers
            .volume_mount()
            .add_volume_mount_to_containers(mount, &HOST_ACCESS_CONTAINERS);
        managers
            .env_var()
            .add_env_var(env(DD_KUBELET_CLIENT_CA, agent_ca_path));
    }
}

/// 宿主机路径在容器内的挂载位置
fn host_mount_path(path: &str) -> String {
    format!(
        "{}/{}",
        HOST_CRI_SOCKET_PATH_PREFIX,
        path.trim_start_matches('/')
    )
}

/// Docker 套接字优先于 CRI 套接字，二者只挂载一个
fn apply_runtime_socket(managers: &mut PodTemplateManagers, global: &GlobalConfig) {
    let (socket, var) = if let Some(docker) = non_empty(global.docker_socket_path.as_ref()) {
        let mount_path = host_mount_path(docker);
        (docker, env(DOCKER_HOST, format!("unix://{}", mount_path)))
    } else if let Some(cri) = non_empty(global.cri_socket_path.as_ref()) {
        (cri, env(DD_CRI_SOCKET_PATH, host_mount_path(cri)))
    } else {
        return;
    };

    let (volume, mount) =
        host_path_volume(RUNTIME_SOCKET_VOLUME_NAME, socket, &host_mount_path(socket), true);
    managers.volume().add_volume(volume);
    managers
        .volume_mount()
        .add_volume_mount_to_containers(mount, &HOST_ACCESS_CONTAINERS);
    managers.env_var().add_env_var(var);
}

/// 生成全局附属资源，返回本次新生成（或沿用）的 Cluster Agent 令牌
///
/// 缺少凭证属于配置错误，直接返回；其余错误汇总后一起返回。
pub fn global_dependencies(
    dda: &DatadogAgent,
    resources: &mut ResourceManagers,
    required: &RequiredComponents,
) -> Result<Option<String>> {
    let global = dda.global();
    credentials::validate(dda, &global)?;

    let mut errors = Vec::new();
    if let Err(e) = credentials::credentials_secret(dda, &global, resources) {
        errors.push(e);
    }

    let mut generated_token = None;
    if required.cluster_agent.is_enabled() {
        match credentials::token_secret(dda, &global, resources) {
            Ok(token) => generated_token = token,
            Err(e) => errors.push(e),
        }

        let rules = tags::resource_metadata_rules(&global);
        if !rules.is_empty() {
            if let Err(e) = resources.rbac().add_cluster_policy_rules_by_component(
                &dda.child_name("annotations-and-labels-as-tags"),
                &dda.service_account_name(ComponentName::ClusterAgent),
                rules,
                Some(ComponentName::ClusterAgent),
            ) {
                errors.push(e);
            }
        }
    }

    if let Some(secret_backend) = global.secret_backend.as_ref() {
        if let Err(e) = secret_backend::secret_backend_rbac(dda, secret_backend, resources, required) {
            errors.push(e);
        }
    }

    if let Some(policy) = global.network_policy.as_ref().filter(|p| bool_value(p.create)) {
        for component in ComponentName::ALL {
            if !required.get(component).is_enabled() {
                continue;
            }
            let name = dda.rbac_resource_name(component);
            let result = match policy.flavor {
                NetworkPolicyFlavor::Kubernetes => resources
                    .network_policy()
                    .build_kubernetes_network_policy(component, &name),
                NetworkPolicyFlavor::Cilium => resources.network_policy().build_cilium_policy(
                    component,
                    &name,
                    global.site(),
                    &policy.dns_selector_endpoints,
                ),
            };
            if let Err(e) = result {
                errors.push(e);
            }
        }
    }

    if let Some(fips) = fips::enabled(global.fips.as_ref()) {
        if let Err(e) = fips::fips_config_map(dda, fips, resources) {
            errors.push(e);
        }
    }

    aggregate(errors)?;
    Ok(generated_token)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feature::test_utils::{
        agent_managers, cluster_agent_managers, dda_with_features, resource_managers,
    };
    use crate::feature::RequiredComponent;
    use crate::merger::find_container;
    use crate::merger::test_utils::env_value;
    use crate::store::ObjectKind;
    use datadog_common::{DatadogCredentials, DatadogFeatures, NetworkPolicyConfig};

    fn dda(global: GlobalConfig) -> DatadogAgent {
        let mut dda = dda_with_features(DatadogFeatures::default());
        dda.spec.global = Some(GlobalConfig {
            credentials: Some(DatadogCredentials {
                api_key: Some("api".to_string()),
                ..Default::default()
            }),
            ..global
        });
        dda.with_defaults()
    }

    fn required() -> RequiredComponents {
        RequiredComponents {
            agent: RequiredComponent::required(&[ContainerName::CoreAgent]),
            cluster_agent: RequiredComponent::required(&[ContainerName::ClusterAgent]),
            ..Default::default()
        }
    }

    #[test]
    fn test_common_env_and_container_override_precedence() {
        let dda = dda(GlobalConfig {
            cluster_name: Some("prod".to_string()),
            site: Some("datadoghq.eu".to_string()),
            ..Default::default()
        });
        let mut managers = agent_managers();
        managers
            .env_var()
            .add_env_var_to_container(ContainerName::TraceAgent, env(DD_LOG_LEVEL, "debug"));
        apply_global_settings(
            &mut managers,
            &dda,
            ComponentName::NodeAgent,
            &required(),
            &Options::default(),
        )
        .unwrap();
        let template = managers.finalize();

        let value = |c, name| env_value(&template, c, name);
        assert_eq!(value(ContainerName::CoreAgent, DD_SITE).as_deref(), Some("datadoghq.eu"));
        assert_eq!(value(ContainerName::CoreAgent, DD_CLUSTER_NAME).as_deref(), Some("prod"));
        assert_eq!(value(ContainerName::CoreAgent, DD_LOG_LEVEL).as_deref(), Some("info"));
        assert_eq!(value(ContainerName::TraceAgent, DD_LOG_LEVEL).as_deref(), Some("debug"));
    }

    #[test]
    fn test_registry_substitution() {
        let dda = dda(GlobalConfig {
            registry: Some("registry.example.com".to_string()),
            ..Default::default()
        });
        let mut managers = agent_managers();
        apply_global_settings(
            &mut managers,
            &dda,
            ComponentName::NodeAgent,
            &required(),
            &Options::default(),
        )
        .unwrap();
        let template = managers.finalize();
        let spec = template.spec.as_ref().unwrap();
        for name in [ContainerName::CoreAgent, ContainerName::InitVolume] {
            assert_eq!(
                find_container(spec, name).unwrap().image.as_deref(),
                Some("registry.example.com/agent:7.64.0")
            );
        }
    }

    #[test]
    fn test_kubelet_and_socket_only_on_node_agent() {
        let global = GlobalConfig {
            kubelet: Some(KubeletConfig {
                tls_verify: Some(false),
                host_ca_path: Some("/etc/kubernetes/kubelet-ca.crt".to_string()),
                ..Default::default()
            }),
            cri_socket_path: Some("/var/run/containerd/containerd.sock".to_string()),
            ..Default::default()
        };
        let dda = dda(global);

        let mut managers = agent_managers();
        apply_global_settings(
            &mut managers,
            &dda,
            ComponentName::NodeAgent,
            &required(),
            &Options::default(),
        )
        .unwrap();
        let template = managers.finalize();
        assert_eq!(
            env_value(&template, ContainerName::CoreAgent, DD_KUBELET_CLIENT_CA).as_deref(),
            Some(KUBELET_AGENT_CA_PATH)
        );
        assert_eq!(
            env_value(&template, ContainerName::CoreAgent, DD_CRI_SOCKET_PATH).as_deref(),
            Some("/host/var/run/containerd/containerd.sock")
        );
        let spec = template.spec.as_ref().unwrap();
        let volumes: Vec<&str> = spec
            .volumes
            .iter()
            .flatten()
            .map(|v| v.name.as_str())
            .collect();
        assert!(volumes.contains(&KUBELET_CA_VOLUME_NAME));
        assert!(volumes.contains(&RUNTIME_SOCKET_VOLUME_NAME));
        let core = find_container(spec, ContainerName::CoreAgent).unwrap();
        assert!(core
            .volume_mounts
            .iter()
            .flatten()
            .any(|m| m.name == KUBELET_CA_VOLUME_NAME && m.mount_path == KUBELET_AGENT_CA_PATH));
        let system_probe = find_container(spec, ContainerName::SystemProbe).unwrap();
        assert!(system_probe.volume_mounts.is_none());

        let mut managers = cluster_agent_managers();
        apply_global_settings(
            &mut managers,
            &dda,
            ComponentName::ClusterAgent,
            &required(),
            &Options::default(),
        )
        .unwrap();
        let template = managers.finalize();
        assert_eq!(
            env_value(&template, ContainerName::ClusterAgent, DD_KUBELET_TLS_VERIFY),
            None
        );
    }

    #[test]
    fn test_docker_socket_wins_over_cri() {
        let dda = dda(GlobalConfig {
            docker_socket_path: Some("/var/run/docker.sock".to_string()),
            cri_socket_path: Some("/var/run/containerd/containerd.sock".to_string()),
            ..Default::default()
        });
        let mut managers = agent_managers();
        apply_global_settings(
            &mut managers,
            &dda,
            ComponentName::NodeAgent,
            &required(),
            &Options::default(),
        )
        .unwrap();
        let template = managers.finalize();
        assert_eq!(
            env_value(&template, ContainerName::CoreAgent, DOCKER_HOST).as_deref(),
            Some("unix:///host/var/run/docker.sock")
        );
        assert_eq!(env_value(&template, ContainerName::CoreAgent, DD_CRI_SOCKET_PATH), None);
    }

    #[test]
    fn test_dependencies_require_api_key() {
        let mut dda = dda_with_features(DatadogFeatures::default());
        dda.spec.global = Some(GlobalConfig::default());
        let mut resources = resource_managers();
        let err = global_dependencies(&dda, &mut resources, &required()).unwrap_err();
        assert!(err.is_config());
        assert!(resources.store().is_empty());
    }

    #[test]
    fn test_dependencies_token_and_network_policies() {
        let dda = dda(GlobalConfig {
            network_policy: Some(NetworkPolicyConfig {
                create: Some(true),
                ..Default::default()
            }),
            ..Default::default()
        });
        let mut resources = resource_managers();
        let token = global_dependencies(&dda, &mut resources, &required()).unwrap();
        assert!(token.is_some());

        let store = resources.store();
        assert!(store.get(ObjectKind::Secret, "monitoring", "datadog-secret").is_some());
        assert!(store.get(ObjectKind::Secret, "monitoring", "datadog-token").is_some());
        assert!(store
            .get(ObjectKind::NetworkPolicy, "monitoring", "datadog-agent")
            .is_some());
        assert!(store
            .get(ObjectKind::NetworkPolicy, "monitoring", "datadog-cluster-agent")
            .is_some());
        assert!(store
            .get(ObjectKind::NetworkPolicy, "monitoring", "datadog-cluster-checks-runner")
            .is_none());
    }
}
