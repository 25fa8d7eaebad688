//! 状态模型
//!
//! DaemonSet / Deployment 的归一化状态快照、组件状态枚举以及 DatadogAgent 的
//! 状态子资源。

use k8s_openapi::apimachinery::pkg::apis::meta::v1::{Condition, Time};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::features::DatadogFeatures;
use crate::error::{Error, Result};

/// 工作负载状态
///
/// 严重程度由 [`AgentState::severity`] 给出，数值越小越严重。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub enum AgentState {
    Progressing,
    Running,
    Updating,
    Canary,
    Failed,
}

impl AgentState {
    /// 严重程度：Failed(1) < Canary(2) < Updating(3) < Progressing(4) < Running(5)
    pub fn severity(&self) -> u8 {
        match self {
            AgentState::Failed => 1,
            AgentState::Canary => 2,
            AgentState::Updating => 3,
            AgentState::Progressing => 4,
            AgentState::Running => 5,
        }
    }
}

impl fmt::Display for AgentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AgentState::Progressing => write!(f, "Progressing"),
            AgentState::Running => write!(f, "Running"),
            AgentState::Updating => write!(f, "Updating"),
            AgentState::Canary => write!(f, "Canary"),
            AgentState::Failed => write!(f, "Failed"),
        }
    }
}

impl FromStr for AgentState {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "Progressing" => Ok(AgentState::Progressing),
            "Running" => Ok(AgentState::Running),
            "Updating" => Ok(AgentState::Updating),
            "Canary" => Ok(AgentState::Canary),
            "Failed" => Ok(AgentState::Failed),
            _ => Err(Error::Serialization(format!("无效的状态: {}", s))),
        }
    }
}

/// DaemonSet 状态快照
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DaemonSetStatus {
    pub desired: i32,
    pub current: i32,
    pub ready: i32,
    pub available: i32,
    pub up_to_date: i32,
    pub last_update: Option<Time>,
    #[serde(default)]
    pub current_hash: String,
    /// 可读状态，例如 `Running (3/3/3)`
    #[serde(default)]
    pub status: String,
    pub state: Option<AgentState>,
    #[serde(default)]
    pub daemonset_name: String,
}

/// Deployment 状态快照
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentStatus {
    pub replicas: i32,
    pub updated_replicas: i32,
    pub ready_replicas: i32,
    pub available_replicas: i32,
    pub unavailable_replicas: i32,
    pub last_update: Option<Time>,
    #[serde(default)]
    pub current_hash: String,
    /// 自动生成的 Cluster Agent 令牌，跨协调保持不变
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub generated_token: String,
    #[serde(default)]
    pub status: String,
    pub state: Option<AgentState>,
    #[serde(default)]
    pub deployment_name: String,
}

/// 远程配置下发的特性覆盖
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RemoteConfigConfiguration {
    pub features: Option<DatadogFeatures>,
}

/// DatadogAgent 状态子资源
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DatadogAgentStatus {
    #[serde(default)]
    pub conditions: Vec<Condition>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub agent_list: Vec<DaemonSetStatus>,
    pub agent: Option<DaemonSetStatus>,
    pub cluster_agent: Option<DeploymentStatus>,
    pub cluster_checks_runner: Option<DeploymentStatus>,
    pub remote_config_configuration: Option<RemoteConfigConfiguration>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_severity_order() {
        let ordered = [
            AgentState::Failed,
            AgentState::Canary,
            AgentState::Updating,
            AgentState::Progressing,
            AgentState::Running,
        ];
        for pair in ordered.windows(2) {
            assert!(pair[0].severity() < pair[1].severity());
        }
    }

    #[test]
    fn test_state_round_trip_through_display() {
        assert_eq!("Canary".parse::<AgentState>().unwrap(), AgentState::Canary);
        assert_eq!(AgentState::Updating.to_string(), "Updating");
        assert!("Unknown".parse::<AgentState>().is_err());
    }
}
