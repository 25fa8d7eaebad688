//! 全局配置模型
//!
//! 与具体特性无关、作用于全部组件的配置：站点、凭证、标签、镜像仓库、
//! kubelet、FIPS 代理、密钥后端以及网络策略。

use k8s_openapi::api::core::v1::{EnvVar, EnvVarSource, ResourceRequirements};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::component::ContainerStrategy;
use super::config::{AgentImageConfig, CustomConfig, SecretConfig};

/// 默认站点
pub const DEFAULT_SITE: &str = "datadoghq.com";
/// 默认镜像仓库
pub const DEFAULT_REGISTRY: &str = "gcr.io/datadoghq";
/// 默认日志级别
pub const DEFAULT_LOG_LEVEL: &str = "info";
/// FIPS 代理默认起始端口
pub const DEFAULT_FIPS_PORT: i32 = 9803;
/// FIPS 代理默认端口数量
pub const DEFAULT_FIPS_PORT_RANGE: i32 = 15;
/// FIPS 代理默认监听地址
pub const DEFAULT_FIPS_LOCAL_ADDRESS: &str = "127.0.0.1";

/// 全局配置
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct GlobalConfig {
    pub credentials: Option<DatadogCredentials>,
    pub cluster_agent_token: Option<String>,
    pub cluster_agent_token_secret: Option<SecretConfig>,
    pub cluster_name: Option<String>,
    pub site: Option<String>,
    pub endpoint: Option<Endpoint>,
    pub registry: Option<String>,
    pub log_level: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub env: Vec<EnvVar>,
    pub origin_detection_unified: Option<OriginDetectionUnified>,
    pub pod_labels_as_tags: Option<BTreeMap<String, String>>,
    pub pod_annotations_as_tags: Option<BTreeMap<String, String>>,
    pub node_labels_as_tags: Option<BTreeMap<String, String>>,
    pub namespace_labels_as_tags: Option<BTreeMap<String, String>>,
    pub namespace_annotations_as_tags: Option<BTreeMap<String, String>>,
    /// 键为 `resource.group`（核心组省略 group），值为标签到 tag 的映射
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub kubernetes_resources_labels_as_tags: BTreeMap<String, BTreeMap<String, String>>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub kubernetes_resources_annotations_as_tags: BTreeMap<String, BTreeMap<String, String>>,
    pub network_policy: Option<NetworkPolicyConfig>,
    pub kubelet: Option<KubeletConfig>,
    pub docker_socket_path: Option<String>,
    pub cri_socket_path: Option<String>,
    pub disable_non_resource_rules: Option<bool>,
    pub container_strategy: Option<ContainerStrategy>,
    pub fips: Option<FipsConfig>,
    pub secret_backend: Option<SecretBackendConfig>,
}

impl GlobalConfig {
    /// 填充默认值，渲染前调用一次
    pub fn apply_defaults(&mut self) {
        self.site.get_or_insert_with(|| DEFAULT_SITE.to_string());
        self.registry.get_or_insert_with(|| DEFAULT_REGISTRY.to_string());
        self.log_level.get_or_insert_with(|| DEFAULT_LOG_LEVEL.to_string());

        if let Some(fips) = self.fips.as_mut() {
            fips.port.get_or_insert(DEFAULT_FIPS_PORT);
            fips.port_range.get_or_insert(DEFAULT_FIPS_PORT_RANGE);
            fips.local_address
                .get_or_insert_with(|| DEFAULT_FIPS_LOCAL_ADDRESS.to_string());
        }
    }

    /// 实际生效的镜像仓库
    pub fn registry(&self) -> &str {
        self.registry.as_deref().unwrap_or(DEFAULT_REGISTRY)
    }

    /// 实际生效的站点
    pub fn site(&self) -> &str {
        self.site.as_deref().unwrap_or(DEFAULT_SITE)
    }
}

/// API/APP 凭证
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DatadogCredentials {
    pub api_key: Option<String>,
    pub api_secret: Option<SecretConfig>,
    pub app_key: Option<String>,
    pub app_secret: Option<SecretConfig>,
}

/// 自定义接入端点
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Endpoint {
    pub url: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct OriginDetectionUnified {
    pub enabled: Option<bool>,
}

/// 网络策略类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum NetworkPolicyFlavor {
    #[default]
    Kubernetes,
    Cilium,
}

/// 网络策略配置
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct NetworkPolicyConfig {
    pub create: Option<bool>,
    #[serde(default)]
    pub flavor: NetworkPolicyFlavor,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dns_selector_endpoints: Vec<LabelSelector>,
}

/// kubelet 连接配置
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct KubeletConfig {
    pub host: Option<EnvVarSource>,
    pub tls_verify: Option<bool>,
    #[serde(rename = "hostCAPath")]
    pub host_ca_path: Option<String>,
    #[serde(rename = "agentCAPath")]
    pub agent_ca_path: Option<String>,
    /// kubelet pod-resources 套接字所在目录
    pub pod_resources_socket_path: Option<String>,
}

/// FIPS 代理配置
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct FipsConfig {
    pub enabled: Option<bool>,
    pub image: Option<AgentImageConfig>,
    pub local_address: Option<String>,
    pub port: Option<i32>,
    pub port_range: Option<i32>,
    pub resources: Option<ResourceRequirements>,
    #[serde(rename = "useHTTPS")]
    pub use_https: Option<bool>,
    #[serde(rename = "customFIPSConfig")]
    pub custom_fips_config: Option<CustomConfig>,
}

/// 密钥后端配置
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SecretBackendConfig {
    pub command: Option<String>,
    pub args: Option<String>,
    pub timeout: Option<i32>,
    pub enable_global_permissions: Option<bool>,
    pub roles: Option<Vec<SecretBackendRole>>,
}

/// 密钥后端可以读取的某个命名空间下的 Secret
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SecretBackendRole {
    pub namespace: Option<String>,
    #[serde(default)]
    pub secrets: Vec<String>,
}
