//! 特性组合引擎
//!
//! 每个特性都是独立的单元：根据规格决定需要哪些组件与容器，创建附属资源，
//! 再修改各组件的 Pod 模板。特性实例只在一次协调内存在，可用的特性构造函数
//! 是编译期确定的有序表，见 [`registry`]。

mod admission_controller;
mod apm;
mod autoscaling;
mod cluster_checks;
mod cspm;
mod custom_config;
mod cws;
mod dogstatsd;
mod enabled_default;
mod event_collection;
mod external_metrics;
mod gpu;
mod helm_check;
mod kube_state_metrics_core;
mod live_container;
mod live_process;
mod log_collection;
mod npm;
mod oom_kill;
mod orchestrator_explorer;
mod otlp;
mod process_discovery;
mod prometheus_scrape;
pub mod registry;
mod remote_config;
mod sbom;
mod service_discovery;
mod system_probe;
mod tcp_queue_length;
mod usm;

pub use registry::{build_features, FEATURE_REGISTRY};
pub(crate) use enabled_default::CLUSTER_AGENT_SERVICE_PORT;

use std::fmt;

use crate::constants::{DD_PROCESS_CONFIG_RUN_IN_CORE_AGENT, RUN_IN_CORE_AGENT_MIN_VERSION};
use crate::crd::DatadogAgent;
use crate::merger::PodTemplateManagers;
use crate::store::ResourceManagers;
use datadog_common::{
    bool_value, AgentImageConfig, ComponentName, ContainerName, ContainerStrategy,
    DatadogFeatures, Result,
};

/// 特性标识
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FeatureId {
    Default,
    LogCollection,
    LiveProcess,
    ProcessDiscovery,
    LiveContainer,
    OomKill,
    TcpQueueLength,
    Npm,
    Usm,
    ServiceDiscovery,
    Gpu,
    Cws,
    Cspm,
    Apm,
    Dogstatsd,
    Sbom,
    EventCollection,
    OrchestratorExplorer,
    KubeStateMetricsCore,
    PrometheusScrape,
    HelmCheck,
    AdmissionController,
    ExternalMetrics,
    Autoscaling,
    ClusterChecks,
    RemoteConfig,
    Otlp,
}

impl FeatureId {
    pub fn as_str(&self) -> &'static str {
        match self {
            FeatureId::Default => "default",
            FeatureId::LogCollection => "logCollection",
            FeatureId::LiveProcess => "liveProcess",
            FeatureId::ProcessDiscovery => "processDiscovery",
            FeatureId::LiveContainer => "liveContainer",
            FeatureId::OomKill => "oomKill",
            FeatureId::TcpQueueLength => "tcpQueueLength",
            FeatureId::Npm => "npm",
            FeatureId::Usm => "usm",
            FeatureId::ServiceDiscovery => "serviceDiscovery",
            FeatureId::Gpu => "gpu",
            FeatureId::Cws => "cws",
            FeatureId::Cspm => "cspm",
            FeatureId::Apm => "apm",
            FeatureId::Dogstatsd => "dogstatsd",
            FeatureId::Sbom => "sbom",
            FeatureId::EventCollection => "eventCollection",
            FeatureId::OrchestratorExplorer => "orchestratorExplorer",
            FeatureId::KubeStateMetricsCore => "kubeStateMetricsCore",
            FeatureId::PrometheusScrape => "prometheusScrape",
            FeatureId::HelmCheck => "helmCheck",
            FeatureId::AdmissionController => "admissionController",
            FeatureId::ExternalMetrics => "externalMetrics",
            FeatureId::Autoscaling => "autoscaling",
            FeatureId::ClusterChecks => "clusterChecks",
            FeatureId::RemoteConfig => "remoteConfig",
            FeatureId::Otlp => "otlp",
        }
    }
}

impl fmt::Display for FeatureId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 单个组件的需求
///
/// `is_required` 为 `None` 表示没有意见。合并时 `Some(false)` 不会覆盖已有的 `Some(true)`。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequiredComponent {
    pub is_required: Option<bool>,
    /// 去重并按 [`ContainerName`] 顺序排列
    pub containers: Vec<ContainerName>,
}

impl RequiredComponent {
    /// 需要该组件且包含指定容器
    pub fn required(containers: &[ContainerName]) -> Self {
        let mut component = Self {
            is_required: Some(true),
            containers: containers.to_vec(),
        };
        component.normalize();
        component
    }

    /// 显式不需要该组件
    pub fn not_required() -> Self {
        Self {
            is_required: Some(false),
            containers: Vec::new(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        bool_value(self.is_required) || !self.containers.is_empty()
    }

    pub fn is_configured(&self) -> bool {
        self.is_required.is_some() || !self.containers.is_empty()
    }

    pub fn is_privileged(&self) -> bool {
        self.containers.iter().any(ContainerName::is_privileged)
    }

    pub fn has_container(&self, container: ContainerName) -> bool {
        self.containers.contains(&container)
    }

    pub fn merge(&mut self, other: &RequiredComponent) {
        self.is_required = match (self.is_required, other.is_required) {
            (None, b) => b,
            (a, None) => a,
            (Some(a), Some(b)) => Some(a || b),
        };
        self.containers.extend(other.containers.iter().copied());
        self.normalize();
    }

    /// 单容器策略可用时，用单个非特权容器替换全部 Agent 容器
    pub fn apply_container_strategy(&mut self, strategy: ContainerStrategy) {
        if strategy == ContainerStrategy::Single && self.is_enabled() && !self.is_privileged() {
            self.containers = vec![ContainerName::UnprivilegedSingleAgent];
        }
    }

    pub fn single_container_strategy_enabled(&self) -> bool {
        self.containers == [ContainerName::UnprivilegedSingleAgent]
    }

    fn normalize(&mut self) {
        self.containers.sort();
        self.containers.dedup();
    }
}

/// 三个组件的需求
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequiredComponents {
    pub agent: RequiredComponent,
    pub cluster_agent: RequiredComponent,
    pub cluster_checks_runner: RequiredComponent,
}

impl RequiredComponents {
    pub fn merge(&mut self, other: &RequiredComponents) {
        self.agent.merge(&other.agent);
        self.cluster_agent.merge(&other.cluster_agent);
        self.cluster_checks_runner.merge(&other.cluster_checks_runner);
    }

    pub fn is_enabled(&self) -> bool {
        self.agent.is_enabled()
            || self.cluster_agent.is_enabled()
            || self.cluster_checks_runner.is_enabled()
    }

    pub fn get(&self, component: ComponentName) -> &RequiredComponent {
        match component {
            ComponentName::NodeAgent => &self.agent,
            ComponentName::ClusterAgent => &self.cluster_agent,
            ComponentName::ClusterChecksRunner => &self.cluster_checks_runner,
        }
    }

    pub fn get_mut(&mut self, component: ComponentName) -> &mut RequiredComponent {
        match component {
            ComponentName::NodeAgent => &mut self.agent,
            ComponentName::ClusterAgent => &mut self.cluster_agent,
            ComponentName::ClusterChecksRunner => &mut self.cluster_checks_runner,
        }
    }

    /// 强制移除某个组件
    pub fn disable(&mut self, component: ComponentName) {
        *self.get_mut(component) = RequiredComponent::not_required();
    }
}

/// 构建特性时共享的选项
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Options {
    pub support_extended_daemonset: bool,
    pub process_checks_in_core_agent_enabled: bool,
    pub default_registry: String,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            support_extended_daemonset: false,
            process_checks_in_core_agent_enabled: false,
            default_registry: datadog_common::DEFAULT_REGISTRY.to_string(),
        }
    }
}

/// 特性接口
///
/// `configure` 是规格的纯函数；其余方法除 `id` 外默认什么都不做。Pod 模板修改
/// 返回的错误会使本次协调失败，不会留下部分应用的模板。
pub trait Feature: Send + Sync {
    fn id(&self) -> FeatureId;

    /// 读取规格（及远程配置覆盖）并返回需要的组件
    fn configure(&mut self, dda: &DatadogAgent) -> RequiredComponents;

    /// 创建附属资源，必须幂等
    fn manage_dependencies(
        &self,
        _managers: &mut ResourceManagers,
        _components: &RequiredComponents,
    ) -> Result<()> {
        Ok(())
    }

    fn manage_cluster_agent(&self, _managers: &mut PodTemplateManagers) -> Result<()> {
        Ok(())
    }

    fn manage_node_agent(&self, _managers: &mut PodTemplateManagers, _provider: &str) -> Result<()> {
        Ok(())
    }

    fn manage_single_container_node_agent(
        &self,
        _managers: &mut PodTemplateManagers,
        _provider: &str,
    ) -> Result<()> {
        Ok(())
    }

    fn manage_cluster_checks_runner(&self, _managers: &mut PodTemplateManagers) -> Result<()> {
        Ok(())
    }
}

/// 远程配置覆盖后的特性配置，`status.remoteConfigConfiguration.features` 优先
pub(crate) fn remote_features(dda: &DatadogAgent) -> Option<&DatadogFeatures> {
    dda.status
        .as_ref()?
        .remote_config_configuration
        .as_ref()?
        .features
        .as_ref()
}

/// 远程配置中的非空开关优先于规格中的开关
pub(crate) fn overlay_enabled(spec: Option<bool>, remote: Option<bool>) -> Option<bool> {
    remote.or(spec)
}

/// 从镜像配置中提取 Agent 版本
///
/// 名称本身带标签时取名称中的标签，否则取 `tag` 字段。
pub fn agent_version_from_image(image: &AgentImageConfig) -> Option<String> {
    if let Some((_, tag)) = image.name.rsplit_once(':') {
        if !tag.contains('/') {
            return Some(tag.to_string());
        }
    }
    if image.tag.is_empty() {
        None
    } else {
        Some(image.tag.clone())
    }
}

/// 只比较主版本、次版本与修订号，`7.53.0-jmx` 视为 `7.53.0`
fn is_below_version(version: &str, minimum: &str) -> Option<bool> {
    let parse = |v: &str| {
        semver::Version::parse(v)
            .ok()
            .map(|v| (v.major, v.minor, v.patch))
    };
    Some(parse(version)? < parse(minimum)?)
}

/// 决定进程检查是否在核心 Agent 中运行
///
/// 节点 Agent 覆盖中显式设置的 `DD_PROCESS_CONFIG_RUN_IN_CORE_AGENT` 优先；其次镜像
/// 版本低于最低版本时强制为 false；否则保持调用方给出的默认值。无法解析的版本
/// （例如 `latest`）不视为旧版本。
pub fn override_run_in_core_agent(dda: &DatadogAgent, current: bool) -> bool {
    let Some(node_agent) = dda.component_override(ComponentName::NodeAgent) else {
        return current;
    };

    let explicit = node_agent
        .env
        .iter()
        .chain(node_agent.containers.values().flat_map(|c| c.env.iter()))
        .find(|env| env.name == DD_PROCESS_CONFIG_RUN_IN_CORE_AGENT)
        .and_then(|env| env.value.as_deref())
        .and_then(|value| value.parse::<bool>().ok());
    if let Some(value) = explicit {
        return value;
    }

    let below_minimum = node_agent
        .image
        .as_ref()
        .and_then(agent_version_from_image)
        .and_then(|version| is_below_version(&version, RUN_IN_CORE_AGENT_MIN_VERSION));
    if below_minimum == Some(true) {
        return false;
    }
    current
}

/// 布尔值的环境变量形式
pub(crate) fn bool_to_string(value: bool) -> String {
    value.to_string()
}


#[cfg(test)]
mod tests {
    use super::test_utils::*;
    use super::*;
    use datadog_common::{DatadogAgentComponentOverride, DatadogAgentGenericContainer};
    use k8s_openapi::api::core::v1::EnvVar;
    use rstest::rstest;

    #[test]
    fn test_merge_never_downgrades_required() {
        let mut a = RequiredComponent::required(&[ContainerName::CoreAgent]);
        a.merge(&RequiredComponent::not_required());
        assert_eq!(a.is_required, Some(true));

        let mut b = RequiredComponent::not_required();
        b.merge(&RequiredComponent::required(&[]));
        assert_eq!(b.is_required, Some(true));

        let mut c = RequiredComponent::default();
        c.merge(&RequiredComponent::default());
        assert_eq!(c.is_required, None);
    }

    #[test]
    fn test_merge_containers_is_order_independent() {
        let x = RequiredComponent::required(&[ContainerName::SystemProbe, ContainerName::CoreAgent]);
        let y = RequiredComponent::required(&[ContainerName::ProcessAgent, ContainerName::CoreAgent]);

        let mut xy = x.clone();
        xy.merge(&y);
        let mut yx = y.clone();
        yx.merge(&x);

        assert_eq!(xy, yx);
        assert_eq!(
            xy.containers,
            vec![
                ContainerName::CoreAgent,
                ContainerName::ProcessAgent,
                ContainerName::SystemProbe
            ]
        );
    }

    #[rstest]
    #[case(&[ContainerName::CoreAgent, ContainerName::TraceAgent], true)]
    #[case(&[ContainerName::CoreAgent, ContainerName::SystemProbe], false)]
    #[case(&[ContainerName::SecurityAgent], false)]
    fn test_single_container_strategy(#[case] containers: &[ContainerName], #[case] single: bool) {
        let mut component = RequiredComponent::required(containers);
        component.apply_container_strategy(ContainerStrategy::Single);
        assert_eq!(component.single_container_strategy_enabled(), single);
    }

    fn dda_with_node_override(o: DatadogAgentComponentOverride) -> DatadogAgent {
        let mut dda = dda_with_features(DatadogFeatures::default());
        dda.spec.override_.insert(ComponentName::NodeAgent, o);
        dda
    }

    fn image(name: &str, tag: &str) -> Option<AgentImageConfig> {
        Some(AgentImageConfig {
            name: name.to_string(),
            tag: tag.to_string(),
            ..Default::default()
        })
    }

    #[rstest]
    #[case(image("agent", "7.52.1"), true, false)]
    #[case(image("agent", "7.53.0"), true, true)]
    #[case(image("agent:7.50.0", ""), true, false)]
    #[case(image("agent", "7.53.0-jmx"), true, true)]
    #[case(image("agent", "latest"), true, true)]
    #[case(None, false, false)]
    fn test_run_in_core_agent_version_gate(
        #[case] image: Option<AgentImageConfig>,
        #[case] current: bool,
        #[case] expected: bool,
    ) {
        let dda = dda_with_node_override(DatadogAgentComponentOverride {
            image,
            ..Default::default()
        });
        assert_eq!(override_run_in_core_agent(&dda, current), expected);
    }

    #[test]
    fn test_run_in_core_agent_explicit_env_wins_over_version() {
        let mut containers = std::collections::BTreeMap::new();
        containers.insert(
            ContainerName::ProcessAgent,
            DatadogAgentGenericContainer {
                env: vec![EnvVar {
                    name: DD_PROCESS_CONFIG_RUN_IN_CORE_AGENT.to_string(),
                    value: Some("true".to_string()),
                    value_from: None,
                }],
                ..Default::default()
            },
        );
        let dda = dda_with_node_override(DatadogAgentComponentOverride {
            image: image("agent", "7.40.0"),
            containers,
            ..Default::default()
        });
        assert!(override_run_in_core_agent(&dda, false));
    }

    #[test]
    fn test_agent_version_from_image_ignores_registry_port() {
        let config = AgentImageConfig {
            name: "registry:5000/agent".to_string(),
            tag: "7.60.0".to_string(),
            ..Default::default()
        };
        assert_eq!(agent_version_from_image(&config).as_deref(), Some("7.60.0"));
    }
}
