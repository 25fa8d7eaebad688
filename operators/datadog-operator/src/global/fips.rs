//! FIPS 代理边车
//!
//! 启用后在 Pod 中加入 `fips-proxy` 容器，监听从 `port` 开始的 `portRange` 个连续端口，
//! 其余非 system-probe 容器通过 `DD_FIPS_*` 变量把流量转给它。

use k8s_openapi::api::core::v1::{Container, KeyToPath};
use std::collections::BTreeMap;

use crate::constants::{
    checksum_annotation_key, DD_FIPS_ENABLED, DD_FIPS_LOCAL_ADDRESS, DD_FIPS_PORT_RANGE_START,
    DD_FIPS_USE_HTTPS, FIPS_CONFIG_FILE_NAME, FIPS_CONFIG_MOUNT_PATH, FIPS_CONFIG_VOLUME_NAME,
    FIPS_PROXY_IMAGE_NAME, FIPS_PROXY_LATEST_VERSION,
};
use crate::crd::DatadogAgent;
use crate::merger::{container_port, env, mount, PodTemplateManagers};
use crate::overrides::image::image_reference;
use crate::store::ResourceManagers;
use crate::utils::{conf_name, config_map_source_volume, custom_config_items, generate_md5_for_spec};
use datadog_common::{
    bool_value, ContainerName, FipsConfig, Result, DEFAULT_FIPS_LOCAL_ADDRESS, DEFAULT_FIPS_PORT,
    DEFAULT_FIPS_PORT_RANGE,
};

const FIPS_CONFIG_SUFFIX: &str = "fips-config";

/// 已启用的 FIPS 配置
pub(super) fn enabled(fips: Option<&FipsConfig>) -> Option<&FipsConfig> {
    fips.filter(|f| bool_value(f.enabled))
}

fn proxy_container(fips: &FipsConfig, registry: &str) -> Container {
    let image = match fips.image.as_ref() {
        Some(image) => {
            image_reference(image, registry, FIPS_PROXY_IMAGE_NAME, FIPS_PROXY_LATEST_VERSION)
        }
        None => format!("{}/{}:{}", registry, FIPS_PROXY_IMAGE_NAME, FIPS_PROXY_LATEST_VERSION),
    };
    let port = fips.port.unwrap_or(DEFAULT_FIPS_PORT);
    let range = fips.port_range.unwrap_or(DEFAULT_FIPS_PORT_RANGE).max(0);
    let ports = (0..range)
        .map(|i| container_port(&format!("port-{}", i), port + i, "TCP"))
        .collect();

    Container {
        name: ContainerName::FipsProxy.as_str().to_string(),
        image: Some(image),
        image_pull_policy: Some("IfNotPresent".to_string()),
        ports: Some(ports),
        env: Some(vec![env(DD_FIPS_LOCAL_ADDRESS, local_address(fips))]),
        resources: fips.resources.clone(),
        ..Default::default()
    }
}

fn local_address(fips: &FipsConfig) -> String {
    fips.local_address
        .clone()
        .unwrap_or_else(|| DEFAULT_FIPS_LOCAL_ADDRESS.to_string())
}

/// 注入边车并为其他容器配置代理地址
///
/// 边车按名称插入或替换，重复应用结果不变。
pub(super) fn apply_fips(
    managers: &mut PodTemplateManagers,
    dda: &DatadogAgent,
    fips: &FipsConfig,
    registry: &str,
) -> Result<()> {
    let clients: Vec<ContainerName> = managers
        .container_names()
        .iter()
        .filter_map(|name| name.parse::<ContainerName>().ok())
        .filter(|c| !matches!(c, ContainerName::SystemProbe | ContainerName::FipsProxy))
        .collect();
    let port = fips.port.unwrap_or(DEFAULT_FIPS_PORT);
    {
        let mut envs = managers.env_var();
        envs.add_env_var_to_containers(&clients, env(DD_FIPS_ENABLED, "true"));
        envs.add_env_var_to_containers(&clients, env(DD_FIPS_PORT_RANGE_START, port.to_string()));
        envs.add_env_var_to_containers(
            &clients,
            env(DD_FIPS_USE_HTTPS, bool_value(fips.use_https).to_string()),
        );
        envs.add_env_var_to_containers(&clients, env(DD_FIPS_LOCAL_ADDRESS, local_address(fips)));
    }

    managers.upsert_container(proxy_container(fips, registry));

    if let Some(custom) = fips.custom_fips_config.as_ref() {
        if custom.config_map.is_none() && custom.config_data.is_none() {
            return Ok(());
        }
        let config_map = conf_name(dda, Some(custom), FIPS_CONFIG_SUFFIX);
        let items: Vec<KeyToPath> = custom_config_items(custom, FIPS_CONFIG_FILE_NAME);
        managers
            .volume()
            .add_volume(config_map_source_volume(FIPS_CONFIG_VOLUME_NAME, &config_map, &items));
        let mut config_mount = mount(FIPS_CONFIG_VOLUME_NAME, FIPS_CONFIG_MOUNT_PATH, true);
        config_mount.sub_path = Some(FIPS_CONFIG_FILE_NAME.to_string());
        managers
            .volume_mount()
            .add_volume_mount_to_container(config_mount, ContainerName::FipsProxy);
        managers.add_annotation(
            checksum_annotation_key(FIPS_CONFIG_VOLUME_NAME),
            generate_md5_for_spec(custom)?,
        );
    }
    Ok(())
}

/// 内联的 FIPS 代理配置需要创建 ConfigMap
pub(super) fn fips_config_map(
    dda: &DatadogAgent,
    fips: &FipsConfig,
    resources: &mut ResourceManagers,
) -> Result<()> {
    let Some(custom) = fips.custom_fips_config.as_ref() else {
        return Ok(());
    };
    if custom.config_map.is_some() {
        return Ok(());
    }
    let Some(data) = custom.config_data.as_ref() else {
        return Ok(());
    };
    resources.config_map().add_config_map(
        &dda.namespace_or_default(),
        &dda.child_name(FIPS_CONFIG_SUFFIX),
        BTreeMap::from([(FIPS_CONFIG_FILE_NAME.to_string(), data.clone())]),
        BTreeMap::new(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feature::test_utils::{agent_managers, dda_with_features, resource_managers};
    use crate::merger::find_container;
    use crate::merger::test_utils::env_value;
    use crate::store::ObjectKind;
    use datadog_common::{AgentImageConfig, CustomConfig, DatadogFeatures};

    fn fips() -> FipsConfig {
        FipsConfig {
            enabled: Some(true),
            port: Some(2000),
            port_range: Some(3),
            ..Default::default()
        }
    }

    #[test]
    fn test_sidecar_ports_and_client_env() {
        let dda = dda_with_features(DatadogFeatures::default());
        let mut managers = agent_managers();
        apply_fips(&mut managers, &dda, &fips(), "gcr.io/datadoghq").unwrap();
        apply_fips(&mut managers, &dda, &fips(), "gcr.io/datadoghq").unwrap();
        let template = managers.finalize();
        let spec = template.spec.as_ref().unwrap();

        let proxies = spec.containers.iter().filter(|c| c.name == "fips-proxy").count();
        assert_eq!(proxies, 1);
        let proxy = find_container(spec, ContainerName::FipsProxy).unwrap();
        let ports: Vec<i32> = proxy
            .ports
            .as_ref()
            .unwrap()
            .iter()
            .map(|p| p.container_port)
            .collect();
        assert_eq!(ports, vec![2000, 2001, 2002]);
        assert_eq!(proxy.image.as_deref(), Some("gcr.io/datadoghq/fips-proxy:1.1.9"));

        assert_eq!(
            env_value(&template, ContainerName::CoreAgent, DD_FIPS_PORT_RANGE_START).as_deref(),
            Some("2000")
        );
        assert_eq!(
            env_value(&template, ContainerName::TraceAgent, DD_FIPS_USE_HTTPS).as_deref(),
            Some("false")
        );
        assert_eq!(env_value(&template, ContainerName::SystemProbe, DD_FIPS_ENABLED), None);
        assert_eq!(env_value(&template, ContainerName::FipsProxy, DD_FIPS_ENABLED), None);
    }

    #[test]
    fn test_custom_image_and_inline_config() {
        let dda = dda_with_features(DatadogFeatures::default());
        let config = FipsConfig {
            image: Some(AgentImageConfig {
                tag: "1.2.0".to_string(),
                ..Default::default()
            }),
            custom_fips_config: Some(CustomConfig::from_data("global\n  log stdout\n")),
            ..fips()
        };
        let mut managers = agent_managers();
        apply_fips(&mut managers, &dda, &config, "registry.example.com").unwrap();
        assert!(managers
            .annotations()
            .contains_key("checksum/fips-config-custom-config"));
        let template = managers.finalize();
        let spec = template.spec.as_ref().unwrap();
        let proxy = find_container(spec, ContainerName::FipsProxy).unwrap();
        assert_eq!(
            proxy.image.as_deref(),
            Some("registry.example.com/fips-proxy:1.2.0")
        );
        let mount = &proxy.volume_mounts.as_ref().unwrap()[0];
        assert_eq!(mount.sub_path.as_deref(), Some(FIPS_CONFIG_FILE_NAME));

        let mut resources = resource_managers();
        fips_config_map(&dda, &config, &mut resources).unwrap();
        assert!(resources
            .store()
            .get(ObjectKind::ConfigMap, "monitoring", "datadog-fips-config")
            .is_some());
    }
}
