//! 组件覆盖配置模型
//!
//! 用户在 `spec.override` 中为每个组件提供的高优先级补丁。覆盖在全部特性与全局
//! 设置之后应用。

use k8s_openapi::api::core::v1::{
    Affinity, EnvFromSource, EnvVar, PodDNSConfig, PodSecurityContext, Probe,
    ResourceRequirements, SecurityContext, Toleration, TopologySpreadConstraint, Volume,
    VolumeMount,
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use super::component::ContainerName;
use super::config::{AgentImageConfig, CustomConfig, MultiCustomConfig};

/// 可以被自定义的 Agent 配置文件
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema,
)]
pub enum AgentConfigFileName {
    #[serde(rename = "datadog.yaml")]
    AgentGeneral,
    #[serde(rename = "system-probe.yaml")]
    SystemProbe,
    #[serde(rename = "security-agent.yaml")]
    SecurityAgent,
    #[serde(rename = "datadog-cluster.yaml")]
    ClusterAgent,
}

impl AgentConfigFileName {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentConfigFileName::AgentGeneral => "datadog.yaml",
            AgentConfigFileName::SystemProbe => "system-probe.yaml",
            AgentConfigFileName::SecurityAgent => "security-agent.yaml",
            AgentConfigFileName::ClusterAgent => "datadog-cluster.yaml",
        }
    }

    /// 用于卷名的形式，例如 `datadog-yaml`
    pub fn volume_fragment(&self) -> String {
        self.as_str().replace('.', "-")
    }
}

impl fmt::Display for AgentConfigFileName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 组件覆盖配置
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DatadogAgentComponentOverride {
    pub name: Option<String>,
    pub replicas: Option<i32>,
    pub create_rbac: Option<bool>,
    pub service_account_name: Option<String>,
    pub image: Option<AgentImageConfig>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub env: Vec<EnvVar>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub env_from: Vec<EnvFromSource>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub custom_configurations: BTreeMap<AgentConfigFileName, CustomConfig>,
    pub extra_confd: Option<MultiCustomConfig>,
    pub extra_checksd: Option<MultiCustomConfig>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub containers: BTreeMap<ContainerName, DatadogAgentGenericContainer>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub volumes: Vec<Volume>,
    pub security_context: Option<PodSecurityContext>,
    pub priority_class_name: Option<String>,
    pub runtime_class_name: Option<String>,
    pub affinity: Option<Affinity>,
    pub dns_policy: Option<String>,
    #[serde(rename = "dnsConfig")]
    pub dns_config: Option<PodDNSConfig>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub node_selector: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tolerations: Vec<Toleration>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    pub host_network: Option<bool>,
    #[serde(rename = "hostPID")]
    pub host_pid: Option<bool>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub topology_spread_constraints: Vec<TopologySpreadConstraint>,
    pub disabled: Option<bool>,
}

impl DatadogAgentComponentOverride {
    /// 是否显式禁用 RBAC 创建
    pub fn rbac_disabled(&self) -> bool {
        self.create_rbac == Some(false)
    }

    /// 是否显式禁用整个组件
    pub fn is_disabled(&self) -> bool {
        self.disabled == Some(true)
    }

    /// 指定容器中某个环境变量的字面值
    pub fn container_env_value(&self, container: ContainerName, name: &str) -> Option<&str> {
        self.containers
            .get(&container)?
            .env
            .iter()
            .find(|env| env.name == name)
            .and_then(|env| env.value.as_deref())
    }
}

/// 单个容器的覆盖配置
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DatadogAgentGenericContainer {
    pub name: Option<String>,
    pub log_level: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub env: Vec<EnvVar>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub volume_mounts: Vec<VolumeMount>,
    pub resources: Option<ResourceRequirements>,
    pub command: Option<Vec<String>>,
    pub args: Option<Vec<String>>,
    pub health_port: Option<i32>,
    pub readiness_probe: Option<Probe>,
    pub liveness_probe: Option<Probe>,
    pub startup_probe: Option<Probe>,
    pub security_context: Option<SecurityContext>,
    pub seccomp_config: Option<SeccompConfig>,
    pub app_armor_profile_name: Option<String>,
}

/// system-probe 的 seccomp 配置
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SeccompConfig {
    pub custom_root_path: Option<String>,
    pub custom_profile: Option<CustomConfig>,
}
