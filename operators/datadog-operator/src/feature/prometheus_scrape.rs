//! Prometheus 自动发现特性
//!
//! 节点 Agent 与 Cluster Agent 按注解发现暴露 Prometheus 指标的 Pod 与 Service。

use tracing::warn;

use super::{bool_to_string, Feature, FeatureId, Options, RequiredComponent, RequiredComponents};
use crate::constants::{
    DD_PROMETHEUS_SCRAPE_CHECKS, DD_PROMETHEUS_SCRAPE_ENABLED,
    DD_PROMETHEUS_SCRAPE_SERVICE_ENDPOINTS, DD_PROMETHEUS_SCRAPE_VERSION,
};
use crate::crd::DatadogAgent;
use crate::merger::{env, PodTemplateManagers};
use datadog_common::{bool_value, ContainerName, Result};

/// YAML 形式的检查配置转为 Agent 接受的 JSON 字符串
fn yaml_to_json(content: &str) -> Option<String> {
    let value: serde_json::Value = match serde_yaml::from_str(content) {
        Ok(value) => value,
        Err(e) => {
            warn!("Prometheus 额外检查配置不是合法的 YAML: {}", e);
            return None;
        }
    };
    serde_json::to_string(&value).ok()
}

#[derive(Debug, Default)]
struct PrometheusScrapeFeature {
    service_endpoints: bool,
    additional_configs: Option<String>,
    version: Option<i32>,
}

pub(super) fn build(_options: &Options) -> Box<dyn Feature> {
    Box::<PrometheusScrapeFeature>::default()
}

impl PrometheusScrapeFeature {
    fn configure_container(&self, managers: &mut PodTemplateManagers, container: ContainerName) {
        let mut envs = managers.env_var();
        envs.add_env_var_to_container(container, env(DD_PROMETHEUS_SCRAPE_ENABLED, "true"));
        envs.add_env_var_to_container(
            container,
            env(
                DD_PROMETHEUS_SCRAPE_SERVICE_ENDPOINTS,
                bool_to_string(self.service_endpoints),
            ),
        );
        if let Some(checks) = &self.additional_configs {
            envs.add_env_var_to_container(container, env(DD_PROMETHEUS_SCRAPE_CHECKS, checks.clone()));
        }
        if let Some(version) = self.version {
            envs.add_env_var_to_container(
                container,
                env(DD_PROMETHEUS_SCRAPE_VERSION, version.to_string()),
            );
        }
    }
}

impl Feature for PrometheusScrapeFeature {
    fn id(&self) -> FeatureId {
        FeatureId::PrometheusScrape
    }

    fn configure(&mut self, dda: &DatadogAgent) -> RequiredComponents {
        let Some(config) = dda
            .features()
            .prometheus_scrape
            .filter(|c| bool_value(c.enabled))
        else {
            return RequiredComponents::default();
        };

        self.service_endpoints = bool_value(config.enable_service_endpoints);
        self.additional_configs = config
            .additional_configs
            .as_deref()
            .filter(|c| !c.trim().is_empty())
            .and_then(yaml_to_json);
        // 0 表示使用 Agent 的默认版本
        self.version = config.version.filter(|v| *v != 0);

        RequiredComponents {
            agent: RequiredComponent::required(&[ContainerName::CoreAgent]),
            cluster_agent: RequiredComponent::required(&[ContainerName::ClusterAgent]),
            ..Default::default()
        }
    }

    fn manage_cluster_agent(&self, managers: &mut PodTemplateManagers) -> Result<()> {
        self.configure_container(managers, ContainerName::ClusterAgent);
        Ok(())
    }

    fn manage_node_agent(&self, managers: &mut PodTemplateManagers, _provider: &str) -> Result<()> {
        self.configure_container(managers, ContainerName::CoreAgent);
        Ok(())
    }

    fn manage_single_container_node_agent(
        &self,
        managers: &mut PodTemplateManagers,
        _provider: &str,
    ) -> Result<()> {
        self.configure_container(managers, ContainerName::UnprivilegedSingleAgent);
        Ok(())
    }
}
