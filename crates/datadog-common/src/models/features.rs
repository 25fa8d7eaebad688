//! 特性配置模型
//!
//! 每个特性对应一个配置结构，通常包含三态的 `enabled` 字段以及特性专属字段。

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::config::{CustomConfig, HostPortConfig, UnixDomainSocketConfig};

/// 全部特性配置
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DatadogFeatures {
    pub log_collection: Option<LogCollectionFeatureConfig>,
    pub live_process_collection: Option<LiveProcessCollectionFeatureConfig>,
    pub live_container_collection: Option<EnabledConfig>,
    pub process_discovery: Option<EnabledConfig>,
    #[serde(rename = "oomKill")]
    pub oom_kill: Option<EnabledConfig>,
    #[serde(rename = "tcpQueueLength")]
    pub tcp_queue_length: Option<EnabledConfig>,
    pub apm: Option<ApmFeatureConfig>,
    pub cspm: Option<CspmFeatureConfig>,
    pub cws: Option<CwsFeatureConfig>,
    pub npm: Option<NpmFeatureConfig>,
    pub usm: Option<EnabledConfig>,
    pub dogstatsd: Option<DogstatsdFeatureConfig>,
    pub otlp: Option<OtlpFeatureConfig>,
    pub remote_configuration: Option<EnabledConfig>,
    pub sbom: Option<SbomFeatureConfig>,
    pub event_collection: Option<EventCollectionFeatureConfig>,
    pub orchestrator_explorer: Option<OrchestratorExplorerFeatureConfig>,
    pub kube_state_metrics_core: Option<KubeStateMetricsCoreFeatureConfig>,
    pub admission_controller: Option<AdmissionControllerFeatureConfig>,
    pub external_metrics_server: Option<ExternalMetricsServerFeatureConfig>,
    pub cluster_checks: Option<ClusterChecksFeatureConfig>,
    pub autoscaling: Option<AutoscalingFeatureConfig>,
    pub prometheus_scrape: Option<PrometheusScrapeFeatureConfig>,
    pub helm_check: Option<HelmCheckFeatureConfig>,
    pub service_discovery: Option<ServiceDiscoveryFeatureConfig>,
    pub gpu: Option<GpuFeatureConfig>,
}

/// 仅包含开关的特性配置
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct EnabledConfig {
    pub enabled: Option<bool>,
}

impl EnabledConfig {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled: Some(enabled),
        }
    }
}

/// 日志采集
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct LogCollectionFeatureConfig {
    pub enabled: Option<bool>,
    pub container_collect_all: Option<bool>,
    pub container_collect_using_files: Option<bool>,
    pub container_logs_path: Option<String>,
    pub pod_logs_path: Option<String>,
    pub container_symlinks_path: Option<String>,
    pub temp_storage_path: Option<String>,
    pub open_files_limit: Option<i32>,
}

/// 实时进程采集
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct LiveProcessCollectionFeatureConfig {
    pub enabled: Option<bool>,
    pub scrub_process_arguments: Option<bool>,
    pub strip_process_arguments: Option<bool>,
}

/// APM
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ApmFeatureConfig {
    pub enabled: Option<bool>,
    pub host_port_config: Option<HostPortConfig>,
    pub unix_domain_socket_config: Option<UnixDomainSocketConfig>,
}

/// 云安全态势管理
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CspmFeatureConfig {
    pub enabled: Option<bool>,
    pub custom_benchmarks: Option<CustomConfig>,
    pub host_benchmarks: Option<EnabledConfig>,
}

/// 云工作负载安全
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CwsFeatureConfig {
    pub enabled: Option<bool>,
    pub syscall_monitor_enabled: Option<bool>,
    pub custom_policies: Option<CustomConfig>,
}

/// 网络性能监控
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct NpmFeatureConfig {
    pub enabled: Option<bool>,
    pub enable_conntrack: Option<bool>,
    #[serde(rename = "collectDNSStats")]
    pub collect_dns_stats: Option<bool>,
}

/// DogStatsD
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DogstatsdFeatureConfig {
    pub origin_detection_enabled: Option<bool>,
    pub tag_cardinality: Option<String>,
    pub host_port_config: Option<HostPortConfig>,
    pub unix_domain_socket_config: Option<UnixDomainSocketConfig>,
}

/// OTLP 接收端
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct OtlpFeatureConfig {
    #[serde(default)]
    pub receiver: OtlpReceiverConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct OtlpReceiverConfig {
    #[serde(default)]
    pub protocols: OtlpProtocolsConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct OtlpProtocolsConfig {
    pub grpc: Option<OtlpProtocolConfig>,
    pub http: Option<OtlpProtocolConfig>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct OtlpProtocolConfig {
    pub enabled: Option<bool>,
    pub endpoint: Option<String>,
}

/// SBOM
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SbomFeatureConfig {
    pub enabled: Option<bool>,
    pub container_image: Option<SbomTargetConfig>,
    pub host: Option<SbomTargetConfig>,
}

/// SBOM 扫描目标（容器镜像或主机）
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SbomTargetConfig {
    pub enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub analyzers: Vec<String>,
}

/// 事件采集
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct EventCollectionFeatureConfig {
    pub collect_kubernetes_events: Option<bool>,
}

/// 编排资源浏览
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct OrchestratorExplorerFeatureConfig {
    pub enabled: Option<bool>,
    pub scrub_containers: Option<bool>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extra_tags: Vec<String>,
    pub dd_url: Option<String>,
}

/// kube-state-metrics core 检查
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct KubeStateMetricsCoreFeatureConfig {
    pub enabled: Option<bool>,
    pub conf: Option<CustomConfig>,
}

/// 准入控制器
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AdmissionControllerFeatureConfig {
    pub enabled: Option<bool>,
    pub mutate_unlabelled: Option<bool>,
    pub service_name: Option<String>,
    pub agent_communication_mode: Option<String>,
}

/// 外部指标服务
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ExternalMetricsServerFeatureConfig {
    pub enabled: Option<bool>,
    pub use_datadog_metrics: Option<bool>,
    pub port: Option<i32>,
}

/// 集群检查
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ClusterChecksFeatureConfig {
    pub enabled: Option<bool>,
    pub use_cluster_checks_runners: Option<bool>,
}

/// 自动扩缩容，`workload` 需要准入控制器
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AutoscalingFeatureConfig {
    pub workload: Option<EnabledConfig>,
    pub cluster: Option<EnabledConfig>,
}

/// Prometheus 自动发现
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PrometheusScrapeFeatureConfig {
    pub enabled: Option<bool>,
    pub enable_service_endpoints: Option<bool>,
    /// YAML 形式的额外检查配置
    pub additional_configs: Option<String>,
    pub version: Option<i32>,
}

/// Helm 检查
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct HelmCheckFeatureConfig {
    pub enabled: Option<bool>,
    pub collect_events: Option<bool>,
    #[serde(default)]
    pub values_as_tags: BTreeMap<String, String>,
}

/// 服务发现
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ServiceDiscoveryFeatureConfig {
    pub enabled: Option<bool>,
    /// 未设置时默认开启
    pub network_stats: Option<EnabledConfig>,
}

/// GPU 监控
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct GpuFeatureConfig {
    pub enabled: Option<bool>,
    /// 在 system-probe 中启用 eBPF GPU 模块
    pub privileged_mode: Option<bool>,
    pub patch_cgroup_permissions: Option<bool>,
    /// 未设置时使用 `nvidia`，空字符串表示不修改
    pub pod_runtime_class_name: Option<String>,
}
