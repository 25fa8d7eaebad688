//! Helm 检查特性
//!
//! Cluster Agent 读取 Helm 发布记录（保存在 Secret 与 ConfigMap 中）并上报。
//! 检查配置总是由特性生成；启用集群检查运行器时作为集群检查分发给运行器。

use k8s_openapi::api::rbac::v1::PolicyRule;
use serde_json::json;
use std::collections::BTreeMap;
use tracing::{debug, warn};

use super::{Feature, FeatureId, Options, RequiredComponent, RequiredComponents};
use crate::constants::{
    checksum_annotation_key, CONFIG_VOLUME_PATH, EXTRA_CONFD_VOLUME_PATH,
    HELM_CHECK_CONFIG_VOLUME_NAME,
};
use crate::crd::DatadogAgent;
use crate::merger::{config_map_volume, PodTemplateManagers};
use crate::store::{policy_rule, ResourceManagers};
use crate::utils::generate_md5_for_spec;
use datadog_common::error::aggregate;
use datadog_common::{bool_value, ComponentName, ContainerName, Result};

const HELM_CHECK_SUFFIX: &str = "helm-check-config";
const HELM_CHECK_CONFIG_FILE: &str = "helm.yaml";
const HELM_CHECK_FOLDER: &str = "helm.d";

fn helm_rules() -> Vec<PolicyRule> {
    vec![policy_rule(&[""], &["secrets", "configmaps"], &["get", "list", "watch"])]
}

#[derive(Debug, Default)]
struct HelmCheckFeature {
    run_in_runner: bool,
    collect_events: bool,
    values_as_tags: BTreeMap<String, String>,
    namespace: String,
    config_map_name: String,
    rbac_name: String,
    service_account: String,
}

pub(super) fn build(_options: &Options) -> Box<dyn Feature> {
    Box::<HelmCheckFeature>::default()
}

impl HelmCheckFeature {
    fn check_component(&self) -> ComponentName {
        if self.run_in_runner {
            ComponentName::ClusterChecksRunner
        } else {
            ComponentName::ClusterAgent
        }
    }

    fn check_config(&self) -> Result<BTreeMap<String, String>> {
        let config = json!({
            "cluster_check": self.run_in_runner,
            "init_config": {},
            "instances": [{
                "collect_events": self.collect_events,
                "values_as_tags": self.values_as_tags,
            }],
        });
        let content = format!("---\n{}", serde_yaml::to_string(&config)?);
        Ok(BTreeMap::from([(HELM_CHECK_CONFIG_FILE.to_string(), content)]))
    }

    fn checksum(&self) -> Option<String> {
        let data = self.check_config().ok()?;
        match generate_md5_for_spec(&data) {
            Ok(hash) => Some(hash),
            Err(e) => {
                warn!("无法计算 Helm 检查配置的校验和: {}", e);
                None
            }
        }
    }
}

impl Feature for HelmCheckFeature {
    fn id(&self) -> FeatureId {
        FeatureId::HelmCheck
    }

    fn configure(&mut self, dda: &DatadogAgent) -> RequiredComponents {
        let features = dda.features();
        let Some(config) = features.helm_check.filter(|c| bool_value(c.enabled)) else {
            return RequiredComponents::default();
        };

        let cluster_checks = features.cluster_checks.unwrap_or_default();
        self.run_in_runner = bool_value(cluster_checks.enabled)
            && bool_value(cluster_checks.use_cluster_checks_runners);
        self.collect_events = bool_value(config.collect_events);
        self.values_as_tags = config.values_as_tags;
        self.namespace = dda.namespace_or_default();
        self.config_map_name = dda.child_name(HELM_CHECK_SUFFIX);

        let component = self.check_component();
        self.rbac_name = dda.child_name(&format!("{}-helm-check", component.resource_suffix()));
        self.service_account = dda.service_account_name(component);
        debug!("Helm 检查已启用, 运行于 {}", component.resource_suffix());

        let mut required = RequiredComponents {
            agent: RequiredComponent::required(&[ContainerName::CoreAgent]),
            cluster_agent: RequiredComponent::required(&[ContainerName::ClusterAgent]),
            ..Default::default()
        };
        if self.run_in_runner {
            required.cluster_checks_runner =
                RequiredComponent::required(&[ContainerName::ClusterChecksRunner]);
        }
        required
    }

    fn manage_dependencies(
        &self,
        managers: &mut ResourceManagers,
        _components: &RequiredComponents,
    ) -> Result<()> {
        let mut errors = Vec::new();
        match self.check_config() {
            Ok(data) => {
                let annotations = self
                    .checksum()
                    .map(|hash| BTreeMap::from([(checksum_annotation_key(FeatureId::HelmCheck.as_str()), hash)]))
                    .unwrap_or_default();
                if let Err(e) = managers.config_map().add_config_map(
                    &self.namespace,
                    &self.config_map_name,
                    data,
                    annotations,
                ) {
                    errors.push(e);
                }
            }
            Err(e) => errors.push(e),
        }
        if let Err(e) = managers.rbac().add_cluster_policy_rules_by_component(
            &self.rbac_name,
            &self.service_account,
            helm_rules(),
            Some(self.check_component()),
        ) {
            errors.push(e);
        }
        aggregate(errors)
    }

    fn manage_cluster_agent(&self, managers: &mut PodTemplateManagers) -> Result<()> {
        let mount_path = format!(
            "{}{}/{}",
            CONFIG_VOLUME_PATH, EXTRA_CONFD_VOLUME_PATH, HELM_CHECK_FOLDER
        );
        let (volume, volume_mount) = config_map_volume(
            HELM_CHECK_CONFIG_VOLUME_NAME,
            &self.config_map_name,
            Vec::new(),
            &mount_path,
        );
        managers.volume().add_volume(volume);
        managers
            .volume_mount()
            .add_volume_mount_to_container(volume_mount, ContainerName::ClusterAgent);
        if let Some(hash) = self.checksum() {
            managers.add_annotation(checksum_annotation_key(FeatureId::HelmCheck.as_str()), hash);
        }
        Ok(())
    }
}
