//! 特性级自定义配置
//!
//! cws 的自定义策略、cspm 的自定义基准以及 kube-state-metrics core 的检查配置
//! 都以 [`CustomConfig`] 提供：引用已有 ConfigMap 或内联内容。内联内容由特性写成
//! ConfigMap，两种情况都在 Pod 模板上留下校验和注解。

use k8s_openapi::api::core::v1::Volume;
use std::collections::BTreeMap;
use tracing::warn;

use super::FeatureId;
use crate::constants::checksum_annotation_key;
use crate::crd::DatadogAgent;
use crate::merger::PodTemplateManagers;
use crate::store::ResourceManagers;
use crate::utils::{conf_name, config_map_source_volume, custom_config_items, generate_md5_for_spec};
use datadog_common::{CustomConfig, Result};

#[derive(Debug, Clone, Default)]
pub(super) struct FeatureCustomConfig {
    pub config: CustomConfig,
    pub config_map_name: String,
    namespace: String,
    checksum_key: String,
    checksum: String,
}

impl FeatureCustomConfig {
    pub fn new(
        dda: &DatadogAgent,
        config: &CustomConfig,
        feature: FeatureId,
        default_suffix: &str,
    ) -> Self {
        let checksum = match generate_md5_for_spec(config) {
            Ok(hash) => hash,
            Err(e) => {
                warn!("无法计算特性 {} 自定义配置的校验和: {}", feature, e);
                String::new()
            }
        };
        Self {
            config: config.clone(),
            config_map_name: conf_name(dda, Some(config), default_suffix),
            namespace: dda.namespace_or_default(),
            checksum_key: checksum_annotation_key(feature.as_str()),
            checksum,
        }
    }

    /// 是否需要由特性创建 ConfigMap
    fn is_inline(&self) -> bool {
        self.config.config_map.is_none() && self.config.config_data.is_some()
    }

    /// 内联内容写成 ConfigMap，键为 `file_name`
    pub fn manage_dependencies(&self, managers: &mut ResourceManagers, file_name: &str) -> Result<()> {
        if !self.is_inline() {
            return Ok(());
        }
        let data = self.config.config_data.clone().unwrap_or_default();
        let mut annotations = BTreeMap::new();
        if !self.checksum.is_empty() {
            annotations.insert(self.checksum_key.clone(), self.checksum.clone());
        }
        managers.config_map().add_config_map(
            &self.namespace,
            &self.config_map_name,
            BTreeMap::from([(file_name.to_string(), data)]),
            annotations,
        )
    }

    pub fn add_checksum_annotation(&self, managers: &mut PodTemplateManagers) {
        if !self.checksum.is_empty() {
            managers.add_annotation(self.checksum_key.clone(), self.checksum.clone());
        }
    }

    pub fn volume(&self, volume_name: &str, file_name: &str) -> Volume {
        config_map_source_volume(
            volume_name,
            &self.config_map_name,
            &custom_config_items(&self.config, file_name),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feature::test_utils::*;
    use crate::merger::test_utils::template_with;
    use crate::store::{ObjectKind, StoreObject};
    use datadog_common::{ContainerName, DatadogFeatures};

    #[test]
    fn test_inline_config_creates_annotated_config_map() {
        let dda = dda_with_features(DatadogFeatures::default());
        let custom = FeatureCustomConfig::new(
            &dda,
            &CustomConfig::from_data("rules: []"),
            FeatureId::Cws,
            "cws-policies",
        );
        let mut resources = resource_managers();
        custom.manage_dependencies(&mut resources, "custom.policy").unwrap();

        match resources
            .store()
            .get(ObjectKind::ConfigMap, "monitoring", "datadog-cws-policies")
        {
            Some(StoreObject::ConfigMap(cm)) => {
                let annotations = cm.metadata.annotations.as_ref().unwrap();
                assert!(annotations.contains_key("checksum/cws-custom-config"));
                assert_eq!(cm.data.as_ref().unwrap()["custom.policy"], "rules: []");
            }
            other => panic!("unexpected {:?}", other),
        }

        let mut managers = PodTemplateManagers::new(template_with(&[ContainerName::CoreAgent], &[]));
        custom.add_checksum_annotation(&mut managers);
        assert_eq!(
            managers.annotations().get("checksum/cws-custom-config"),
            cm_annotation(&resources).as_ref()
        );
    }

    fn cm_annotation(resources: &ResourceManagers) -> Option<String> {
        match resources
            .store()
            .get(ObjectKind::ConfigMap, "monitoring", "datadog-cws-policies")
        {
            Some(StoreObject::ConfigMap(cm)) => cm
                .metadata
                .annotations
                .as_ref()
                .and_then(|a| a.get("checksum/cws-custom-config").cloned()),
            _ => None,
        }
    }

    #[test]
    fn test_referenced_config_map_is_not_created() {
        let dda = dda_with_features(DatadogFeatures::default());
        let custom = FeatureCustomConfig::new(
            &dda,
            &CustomConfig::from_config_map("existing"),
            FeatureId::Cspm,
            "cspm-benchmarks",
        );
        let mut resources = resource_managers();
        custom.manage_dependencies(&mut resources, "bench.yaml").unwrap();
        assert!(resources.store().is_empty());
        assert_eq!(custom.config_map_name, "existing");
        let volume = custom.volume("customcompliance", "bench.yaml");
        assert_eq!(
            volume.config_map.unwrap().name.as_deref(),
            Some("existing")
        );
    }
}
