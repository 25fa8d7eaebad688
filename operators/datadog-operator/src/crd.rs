//! 自定义资源定义模块
//!
//! 该模块定义了 DatadogAgent 自定义资源。规格由特性、全局配置和按组件划分的覆盖
//! 配置三部分组成，状态子资源记录各组件工作负载的健康状况与协调条件。

use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kube::{CustomResource, CustomResourceExt, ResourceExt};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use datadog_common::{
    ComponentName, DatadogAgentComponentOverride, DatadogAgentStatus, DatadogFeatures,
    GlobalConfig, Result,
};

/// DatadogAgent 规格
#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[kube(group = "datadoghq.com", version = "v2alpha1", kind = "DatadogAgent", namespaced)]
#[kube(status = "DatadogAgentStatus", shortname = "dd")]
#[kube(printcolumn = r#"{"name":"Agent", "type":"string", "jsonPath":".status.agent.status"}"#)]
#[kube(
    printcolumn = r#"{"name":"Cluster-Agent", "type":"string", "jsonPath":".status.clusterAgent.status"}"#
)]
#[kube(
    printcolumn = r#"{"name":"Cluster-Checks-Runner", "type":"string", "jsonPath":".status.clusterChecksRunner.status"}"#
)]
#[kube(printcolumn = r#"{"name":"Age", "type":"date", "jsonPath":".metadata.creationTimestamp"}"#)]
#[serde(rename_all = "camelCase")]
pub struct DatadogAgentSpec {
    /// 特性开关与特性配置
    pub features: Option<DatadogFeatures>,

    /// 作用于全部组件的全局配置
    pub global: Option<GlobalConfig>,

    /// 按组件划分的覆盖配置
    #[serde(default, rename = "override", skip_serializing_if = "BTreeMap::is_empty")]
    pub override_: BTreeMap<ComponentName, DatadogAgentComponentOverride>,
}

impl DatadogAgent {
    /// 资源所在命名空间，缺省为 `default`
    pub fn namespace_or_default(&self) -> String {
        self.namespace().unwrap_or_else(|| "default".to_string())
    }

    /// 全局配置，未设置时返回默认值
    pub fn global(&self) -> GlobalConfig {
        self.spec.global.clone().unwrap_or_default()
    }

    /// 特性配置，未设置时返回默认值
    pub fn features(&self) -> DatadogFeatures {
        self.spec.features.clone().unwrap_or_default()
    }

    pub fn component_override(
        &self,
        component: ComponentName,
    ) -> Option<&DatadogAgentComponentOverride> {
        self.spec.override_.get(&component)
    }

    /// 组件工作负载名称，例如 `datadog-agent`；覆盖配置中的 `name` 优先
    pub fn component_resource_name(&self, component: ComponentName) -> String {
        self.component_override(component)
            .and_then(|o| o.name.clone())
            .unwrap_or_else(|| format!("{}-{}", self.name_any(), component.resource_suffix()))
    }

    /// 组件使用的 ServiceAccount；覆盖配置中的 `serviceAccountName` 优先
    pub fn service_account_name(&self, component: ComponentName) -> String {
        self.component_override(component)
            .and_then(|o| o.service_account_name.clone())
            .unwrap_or_else(|| self.rbac_resource_name(component))
    }

    /// 组件 RBAC 对象名称，不受覆盖配置中的 `name` 影响
    pub fn rbac_resource_name(&self, component: ComponentName) -> String {
        format!("{}-{}", self.name_any(), component.resource_suffix())
    }

    /// 以资源名为前缀的附属对象名称，例如 `datadog-token`
    pub fn child_name(&self, suffix: &str) -> String {
        format!("{}-{}", self.name_any(), suffix)
    }

    /// 复制一份并填充默认值
    pub fn with_defaults(&self) -> DatadogAgent {
        let mut dda = self.clone();
        dda.spec
            .global
            .get_or_insert_with(GlobalConfig::default)
            .apply_defaults();
        dda.spec.features.get_or_insert_with(DatadogFeatures::default);
        dda
    }
}

/// 生成 CRD 定义
pub fn crd() -> CustomResourceDefinition {
    DatadogAgent::crd()
}

/// 以 YAML 形式输出 CRD
pub fn crd_yaml() -> Result<String> {
    Ok(serde_yaml::to_string(&crd())?)
}
