//! 组件与容器名称模型
//!
//! 定义 DatadogAgent 渲染出的三类组件（节点 Agent、Cluster Agent、Cluster Checks Runner）
//! 以及组件内部可能出现的容器名称。容器名称枚举的顺序即渲染顺序。

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// 组件名称，同时作为覆盖配置映射的键
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema,
)]
pub enum ComponentName {
    /// 节点 Agent（DaemonSet）
    #[serde(rename = "nodeAgent")]
    NodeAgent,
    /// Cluster Agent（Deployment）
    #[serde(rename = "clusterAgent")]
    ClusterAgent,
    /// Cluster Checks Runner（Deployment）
    #[serde(rename = "clusterChecksRunner")]
    ClusterChecksRunner,
}

impl ComponentName {
    /// 全部组件，按渲染顺序排列
    pub const ALL: [ComponentName; 3] = [
        ComponentName::NodeAgent,
        ComponentName::ClusterAgent,
        ComponentName::ClusterChecksRunner,
    ];

    /// 组件对应的工作负载名称后缀
    pub fn resource_suffix(&self) -> &'static str {
        match self {
            ComponentName::NodeAgent => "agent",
            ComponentName::ClusterAgent => "cluster-agent",
            ComponentName::ClusterChecksRunner => "cluster-checks-runner",
        }
    }

    /// 状态条件类型，例如 `AgentReconcile`
    pub fn reconcile_condition_type(&self) -> &'static str {
        match self {
            ComponentName::NodeAgent => "AgentReconcile",
            ComponentName::ClusterAgent => "ClusterAgentReconcile",
            ComponentName::ClusterChecksRunner => "ClusterChecksRunnerReconcile",
        }
    }
}

impl fmt::Display for ComponentName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ComponentName::NodeAgent => write!(f, "nodeAgent"),
            ComponentName::ClusterAgent => write!(f, "clusterAgent"),
            ComponentName::ClusterChecksRunner => write!(f, "clusterChecksRunner"),
        }
    }
}

impl FromStr for ComponentName {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "nodeAgent" => Ok(ComponentName::NodeAgent),
            "clusterAgent" => Ok(ComponentName::ClusterAgent),
            "clusterChecksRunner" => Ok(ComponentName::ClusterChecksRunner),
            _ => Err(Error::Config(format!("无效的组件名称: {}", s))),
        }
    }
}

/// 容器名称
///
/// 派生的 `Ord` 决定了容器在 Pod 模板中的顺序，保证重复渲染结果一致。
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema,
)]
pub enum ContainerName {
    #[serde(rename = "agent")]
    CoreAgent,
    #[serde(rename = "trace-agent")]
    TraceAgent,
    #[serde(rename = "process-agent")]
    ProcessAgent,
    #[serde(rename = "security-agent")]
    SecurityAgent,
    #[serde(rename = "system-probe")]
    SystemProbe,
    #[serde(rename = "unprivileged-single-agent")]
    UnprivilegedSingleAgent,
    #[serde(rename = "cluster-agent")]
    ClusterAgent,
    #[serde(rename = "cluster-checks-runner")]
    ClusterChecksRunner,
    #[serde(rename = "fips-proxy")]
    FipsProxy,
    #[serde(rename = "init-volume")]
    InitVolume,
    #[serde(rename = "init-config")]
    InitConfig,
    #[serde(rename = "seccomp-setup")]
    SeccompSetup,
}

impl ContainerName {
    /// 容器在 Pod 模板中的名称
    pub fn as_str(&self) -> &'static str {
        match self {
            ContainerName::CoreAgent => "agent",
            ContainerName::TraceAgent => "trace-agent",
            ContainerName::ProcessAgent => "process-agent",
            ContainerName::SecurityAgent => "security-agent",
            ContainerName::SystemProbe => "system-probe",
            ContainerName::UnprivilegedSingleAgent => "unprivileged-single-agent",
            ContainerName::ClusterAgent => "cluster-agent",
            ContainerName::ClusterChecksRunner => "cluster-checks-runner",
            ContainerName::FipsProxy => "fips-proxy",
            ContainerName::InitVolume => "init-volume",
            ContainerName::InitConfig => "init-config",
            ContainerName::SeccompSetup => "seccomp-setup",
        }
    }

    /// 需要特权的容器；存在时无法使用单容器策略
    pub fn is_privileged(&self) -> bool {
        matches!(self, ContainerName::SystemProbe | ContainerName::SecurityAgent)
    }

    /// 是否运行 Agent 镜像（镜像覆盖只作用于这些容器）
    pub fn runs_agent_image(&self) -> bool {
        !matches!(self, ContainerName::FipsProxy)
    }
}

impl fmt::Display for ContainerName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContainerName {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "agent" => Ok(ContainerName::CoreAgent),
            "trace-agent" => Ok(ContainerName::TraceAgent),
            "process-agent" => Ok(ContainerName::ProcessAgent),
            "security-agent" => Ok(ContainerName::SecurityAgent),
            "system-probe" => Ok(ContainerName::SystemProbe),
            "unprivileged-single-agent" => Ok(ContainerName::UnprivilegedSingleAgent),
            "cluster-agent" => Ok(ContainerName::ClusterAgent),
            "cluster-checks-runner" => Ok(ContainerName::ClusterChecksRunner),
            "fips-proxy" => Ok(ContainerName::FipsProxy),
            "init-volume" => Ok(ContainerName::InitVolume),
            "init-config" => Ok(ContainerName::InitConfig),
            "seccomp-setup" => Ok(ContainerName::SeccompSetup),
            _ => Err(Error::Config(format!("无效的容器名称: {}", s))),
        }
    }
}

/// 节点 Agent 的容器策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum ContainerStrategy {
    /// 每个进程一个容器
    #[default]
    Optimized,
    /// 所有进程共享一个容器
    Single,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(ContainerName::CoreAgent, "agent")]
    #[case(ContainerName::SystemProbe, "system-probe")]
    #[case(ContainerName::FipsProxy, "fips-proxy")]
    #[case(ContainerName::UnprivilegedSingleAgent, "unprivileged-single-agent")]
    fn test_container_name_display_and_parse(#[case] name: ContainerName, #[case] text: &str) {
        assert_eq!(name.to_string(), text);
        assert_eq!(text.parse::<ContainerName>().unwrap(), name);
    }

    #[test]
    fn test_container_order_is_stable() {
        let mut names = vec![
            ContainerName::SystemProbe,
            ContainerName::CoreAgent,
            ContainerName::ProcessAgent,
        ];
        names.sort();
        assert_eq!(
            names,
            vec![
                ContainerName::CoreAgent,
                ContainerName::ProcessAgent,
                ContainerName::SystemProbe
            ]
        );
    }

    #[test]
    fn test_component_name_serde() {
        let json = serde_json::to_string(&ComponentName::ClusterChecksRunner).unwrap();
        assert_eq!(json, "\"clusterChecksRunner\"");
        assert!("dca".parse::<ComponentName>().is_err());
    }
}
