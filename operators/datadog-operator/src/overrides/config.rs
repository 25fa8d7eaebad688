//! 自定义配置文件与额外的 confd/checksd
//!
//! 每份配置都以其内容的 MD5 作为 Pod 注解，内容不变则注解不变，内容变化会触发滚动更新。

use k8s_openapi::api::core::v1::KeyToPath;
use std::collections::BTreeMap;

use crate::constants::{
    checksum_annotation_key, CONFIG_VOLUME_PATH, EXTRA_CHECKSD_VOLUME_NAME,
    EXTRA_CHECKSD_VOLUME_PATH, EXTRA_CONFD_VOLUME_NAME, EXTRA_CONFD_VOLUME_PATH,
};
use crate::crd::DatadogAgent;
use crate::merger::{mount, PodTemplateManagers};
use crate::store::ResourceManagers;
use crate::utils::{conf_name, config_map_source_volume, custom_config_items, generate_md5_for_spec};
use datadog_common::{
    AgentConfigFileName, ComponentName, ContainerName, CustomConfig, MultiCustomConfig, Result,
};

/// 读取 conf.d 与 checks.d 的容器
const EXTRA_CONFIG_CONTAINERS: [ContainerName; 5] = [
    ContainerName::CoreAgent,
    ContainerName::UnprivilegedSingleAgent,
    ContainerName::ClusterAgent,
    ContainerName::ClusterChecksRunner,
    ContainerName::InitConfig,
];

/// 额外的检查配置目录
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum ExtraConfig {
    Confd,
    Checksd,
}

impl ExtraConfig {
    fn volume_name(&self) -> &'static str {
        match self {
            ExtraConfig::Confd => EXTRA_CONFD_VOLUME_NAME,
            ExtraConfig::Checksd => EXTRA_CHECKSD_VOLUME_NAME,
        }
    }

    fn mount_path(&self) -> &'static str {
        match self {
            ExtraConfig::Confd => EXTRA_CONFD_VOLUME_PATH,
            ExtraConfig::Checksd => EXTRA_CHECKSD_VOLUME_PATH,
        }
    }

    /// Operator 管理的 ConfigMap 名称，例如 `datadog-agent-extra-confd`
    fn config_map_name(&self, dda: &DatadogAgent, component: ComponentName) -> String {
        let kind = match self {
            ExtraConfig::Confd => "extra-confd",
            ExtraConfig::Checksd => "extra-checksd",
        };
        dda.child_name(&format!("{}-{}", component.resource_suffix(), kind))
    }
}

fn custom_config_suffix(file: AgentConfigFileName, component: ComponentName) -> String {
    format!("{}-{}", file.volume_fragment(), component.resource_suffix())
}

fn custom_config_volume_name(file: AgentConfigFileName) -> String {
    format!("custom-{}", file.volume_fragment())
}

/// 挂载自定义配置文件，覆盖 `/etc/datadog-agent` 下的同名文件
pub(super) fn apply_custom_configurations(
    managers: &mut PodTemplateManagers,
    dda: &DatadogAgent,
    component: ComponentName,
    configs: &BTreeMap<AgentConfigFileName, CustomConfig>,
) -> Result<()> {
    for (file, custom) in configs {
        if custom.config_map.is_none() && custom.config_data.is_none() {
            tracing::debug!("自定义配置 {} 既无 ConfigMap 也无内容，跳过", file);
            continue;
        }
        let config_map = conf_name(dda, Some(custom), &custom_config_suffix(*file, component));
        let volume_name = custom_config_volume_name(*file);
        let items = custom_config_items(custom, file.as_str());
        managers
            .volume()
            .add_volume(config_map_source_volume(&volume_name, &config_map, &items));

        let mut file_mount = mount(
            &volume_name,
            &format!("{}/{}", CONFIG_VOLUME_PATH, file.as_str()),
            true,
        );
        file_mount.sub_path = Some(file.as_str().to_string());
        managers
            .volume_mount()
            .add_volume_mount_to_every_container(file_mount);

        let hash = generate_md5_for_spec(custom)?;
        tracing::debug!("自定义配置 {} 校验和 {}", file, hash);
        managers.add_annotation(checksum_annotation_key(file.as_str()), hash);
    }
    Ok(())
}

fn extra_items(config: &MultiCustomConfig) -> Vec<KeyToPath> {
    match &config.config_map {
        Some(cm) => cm.items.clone(),
        None => config
            .config_data_map
            .keys()
            .map(|key| KeyToPath {
                key: key.clone(),
                path: key.clone(),
                mode: None,
            })
            .collect(),
    }
}

/// 以 ConfigMap 替换 conf.d 或 checks.d 目录，引用优先于内联内容
pub(super) fn apply_extra_config(
    managers: &mut PodTemplateManagers,
    dda: &DatadogAgent,
    component: ComponentName,
    kind: ExtraConfig,
    config: &MultiCustomConfig,
) -> Result<()> {
    let default_name = kind.config_map_name(dda, component);
    let config_map = config
        .config_map
        .as_ref()
        .map(|cm| cm.name.clone())
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| default_name.clone());

    managers.volume().add_volume(config_map_source_volume(
        kind.volume_name(),
        &config_map,
        &extra_items(config),
    ));
    managers.volume_mount().add_volume_mount_to_containers(
        mount(kind.volume_name(), kind.mount_path(), true),
        &EXTRA_CONFIG_CONTAINERS,
    );
    managers.add_annotation(
        checksum_annotation_key(&default_name),
        generate_md5_for_spec(config)?,
    );
    Ok(())
}

/// 为内联的自定义配置创建 ConfigMap，每个失败单独收集
pub(super) fn custom_config_maps(
    dda: &DatadogAgent,
    component: ComponentName,
    configs: &BTreeMap<AgentConfigFileName, CustomConfig>,
    resources: &mut ResourceManagers,
    errors: &mut Vec<datadog_common::Error>,
) {
    let namespace = dda.namespace_or_default();
    for (file, custom) in configs {
        if custom.config_map.is_some() {
            continue;
        }
        let Some(data) = custom.config_data.as_ref() else {
            continue;
        };
        let result = generate_md5_for_spec(custom).and_then(|hash| {
            resources.config_map().add_config_map(
                &namespace,
                &dda.child_name(&custom_config_suffix(*file, component)),
                BTreeMap::from([(file.as_str().to_string(), data.clone())]),
                BTreeMap::from([(checksum_annotation_key(file.as_str()), hash)]),
            )
        });
        if let Err(e) = result {
            errors.push(e);
        }
    }
}

/// 为内联的 confd/checksd 内容创建 ConfigMap
pub(super) fn extra_config_map(
    dda: &DatadogAgent,
    component: ComponentName,
    kind: ExtraConfig,
    config: &MultiCustomConfig,
    resources: &mut ResourceManagers,
) -> Result<()> {
    if config.config_map.is_some() || config.config_data_map.is_empty() {
        return Ok(());
    }
    let name = kind.config_map_name(dda, component);
    let hash = generate_md5_for_spec(config)?;
    resources.config_map().add_config_map(
        &dda.namespace_or_default(),
        &name,
        config.config_data_map.clone(),
        BTreeMap::from([(checksum_annotation_key(&name), hash)]),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feature::test_utils::{agent_managers, dda_with_features, resource_managers};
    use crate::merger::find_container;
    use crate::store::{ObjectKind, StoreObject};
    use datadog_common::{ConfigMapConfig, DatadogFeatures};

    fn configs(data: &str) -> BTreeMap<AgentConfigFileName, CustomConfig> {
        BTreeMap::from([(AgentConfigFileName::AgentGeneral, CustomConfig::from_data(data))])
    }

    #[test]
    fn test_custom_config_mounted_with_sub_path_and_checksum() {
        let dda = dda_with_features(DatadogFeatures::default());
        let mut managers = agent_managers();
        apply_custom_configurations(&mut managers, &dda, ComponentName::NodeAgent, &configs("a: b"))
            .unwrap();
        let first = managers.annotations();

        let template = managers.finalize();
        let spec = template.spec.as_ref().unwrap();
        let volume = spec
            .volumes
            .as_ref()
            .unwrap()
            .iter()
            .find(|v| v.name == "custom-datadog-yaml")
            .unwrap();
        assert_eq!(
            volume.config_map.as_ref().unwrap().name.as_deref(),
            Some("datadog-datadog-yaml-agent")
        );
        for name in [ContainerName::CoreAgent, ContainerName::TraceAgent] {
            let mounts = find_container(spec, name).unwrap().volume_mounts.clone().unwrap();
            let m = mounts.iter().find(|m| m.name == "custom-datadog-yaml").unwrap();
            assert_eq!(m.mount_path, "/etc/datadog-agent/datadog.yaml");
            assert_eq!(m.sub_path.as_deref(), Some("datadog.yaml"));
        }

        let mut again = agent_managers();
        apply_custom_configurations(&mut again, &dda, ComponentName::NodeAgent, &configs("a: b"))
            .unwrap();
        assert_eq!(again.annotations(), first);
        assert!(first.contains_key("checksum/datadog.yaml-custom-config"));
    }

    #[test]
    fn test_empty_custom_config_not_mounted() {
        let dda = dda_with_features(DatadogFeatures::default());
        let mut managers = agent_managers();
        let empty = BTreeMap::from([(AgentConfigFileName::AgentGeneral, CustomConfig::default())]);
        apply_custom_configurations(&mut managers, &dda, ComponentName::NodeAgent, &empty).unwrap();
        assert!(managers.annotations().is_empty());

        let template = managers.finalize();
        let spec = template.spec.as_ref().unwrap();
        assert!(!spec
            .volumes
            .iter()
            .flatten()
            .any(|v| v.name == "custom-datadog-yaml"));
        let mounts = find_container(spec, ContainerName::CoreAgent)
            .unwrap()
            .volume_mounts
            .clone()
            .unwrap_or_default();
        assert!(!mounts.iter().any(|m| m.name == "custom-datadog-yaml"));
    }

    #[test]
    fn test_custom_config_map_only_for_inline_data() {
        let dda = dda_with_features(DatadogFeatures::default());
        let mut resources = resource_managers();
        let mut errors = Vec::new();
        let mut all = configs("a: b");
        all.insert(
            AgentConfigFileName::SystemProbe,
            CustomConfig::from_config_map("existing"),
        );
        custom_config_maps(&dda, ComponentName::NodeAgent, &all, &mut resources, &mut errors);
        assert!(errors.is_empty());
        assert_eq!(resources.store().len(), 1);
        match resources
            .store()
            .get(ObjectKind::ConfigMap, "monitoring", "datadog-datadog-yaml-agent")
        {
            Some(StoreObject::ConfigMap(cm)) => {
                assert_eq!(cm.data.as_ref().unwrap()["datadog.yaml"], "a: b");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_extra_confd_from_inline_data() {
        let dda = dda_with_features(DatadogFeatures::default());
        let config = MultiCustomConfig {
            config_data_map: BTreeMap::from([
                ("redis.yaml".to_string(), "init_config:".to_string()),
                ("http.yaml".to_string(), "instances: []".to_string()),
            ]),
            config_map: None,
        };
        let mut managers = agent_managers();
        apply_extra_config(&mut managers, &dda, ComponentName::NodeAgent, ExtraConfig::Confd, &config)
            .unwrap();
        assert!(managers
            .annotations()
            .contains_key("checksum/datadog-agent-extra-confd-custom-config"));

        let template = managers.finalize();
        let spec = template.spec.as_ref().unwrap();
        let volume = &spec.volumes.as_ref().unwrap()[0];
        let source = volume.config_map.as_ref().unwrap();
        assert_eq!(source.name.as_deref(), Some("datadog-agent-extra-confd"));
        assert_eq!(source.items.as_ref().unwrap().len(), 2);
        let init = find_container(spec, ContainerName::InitConfig).unwrap();
        assert_eq!(init.volume_mounts.as_ref().unwrap()[0].mount_path, "/conf.d");
        assert!(find_container(spec, ContainerName::TraceAgent)
            .unwrap()
            .volume_mounts
            .is_none());

        let mut resources = resource_managers();
        extra_config_map(&dda, ComponentName::NodeAgent, ExtraConfig::Confd, &config, &mut resources)
            .unwrap();
        assert!(resources
            .store()
            .get(ObjectKind::ConfigMap, "monitoring", "datadog-agent-extra-confd")
            .is_some());
    }

    #[test]
    fn test_extra_checksd_reference_wins() {
        let dda = dda_with_features(DatadogFeatures::default());
        let config = MultiCustomConfig {
            config_data_map: BTreeMap::from([("check.py".to_string(), "pass".to_string())]),
            config_map: Some(ConfigMapConfig {
                name: "my-checks".to_string(),
                items: Vec::new(),
            }),
        };
        let mut managers = agent_managers();
        apply_extra_config(&mut managers, &dda, ComponentName::NodeAgent, ExtraConfig::Checksd, &config)
            .unwrap();
        let template = managers.finalize();
        let volume = &template.spec.unwrap().volumes.unwrap()[0];
        assert_eq!(volume.name, "checksd");
        assert_eq!(volume.config_map.as_ref().unwrap().name.as_deref(), Some("my-checks"));

        let mut resources = resource_managers();
        extra_config_map(&dda, ComponentName::NodeAgent, ExtraConfig::Checksd, &config, &mut resources)
            .unwrap();
        assert!(resources.store().is_empty());
    }
}
