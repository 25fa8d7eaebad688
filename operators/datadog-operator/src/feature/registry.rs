//! 特性注册表
//!
//! 编译期常量表，顺序即特性的执行顺序。同一个键被多个特性写入时，后注册的特性生效。

use tracing::debug;

use super::{
    admission_controller, apm, autoscaling, cluster_checks, cspm, cws, dogstatsd, enabled_default,
    event_collection, external_metrics, gpu, helm_check, kube_state_metrics_core, live_container,
    live_process, log_collection, npm, oom_kill, orchestrator_explorer, otlp, process_discovery,
    prometheus_scrape, remote_config, sbom, service_discovery, tcp_queue_length, usm, Feature,
    FeatureId, Options, RequiredComponents,
};
use crate::crd::DatadogAgent;

/// 特性构造函数
pub type BuildFn = fn(&Options) -> Box<dyn Feature>;

/// 全部特性，按执行顺序排列
pub const FEATURE_REGISTRY: [(FeatureId, BuildFn); 27] = [
    (FeatureId::Default, enabled_default::build),
    (FeatureId::LogCollection, log_collection::build),
    (FeatureId::LiveProcess, live_process::build),
    (FeatureId::ProcessDiscovery, process_discovery::build),
    (FeatureId::LiveContainer, live_container::build),
    (FeatureId::OomKill, oom_kill::build),
    (FeatureId::TcpQueueLength, tcp_queue_length::build),
    (FeatureId::Npm, npm::build),
    (FeatureId::Usm, usm::build),
    (FeatureId::ServiceDiscovery, service_discovery::build),
    (FeatureId::Gpu, gpu::build),
    (FeatureId::Cws, cws::build),
    (FeatureId::Cspm, cspm::build),
    (FeatureId::Apm, apm::build),
    (FeatureId::Dogstatsd, dogstatsd::build),
    (FeatureId::Sbom, sbom::build),
    (FeatureId::EventCollection, event_collection::build),
    (FeatureId::OrchestratorExplorer, orchestrator_explorer::build),
    (FeatureId::KubeStateMetricsCore, kube_state_metrics_core::build),
    (FeatureId::PrometheusScrape, prometheus_scrape::build),
    (FeatureId::HelmCheck, helm_check::build),
    (FeatureId::AdmissionController, admission_controller::build),
    (FeatureId::ExternalMetrics, external_metrics::build),
    (FeatureId::Autoscaling, autoscaling::build),
    (FeatureId::ClusterChecks, cluster_checks::build),
    (FeatureId::RemoteConfig, remote_config::build),
    (FeatureId::Otlp, otlp::build),
];

/// 构建本次协调启用的特性，并聚合它们的组件需求
pub fn build_features(
    dda: &DatadogAgent,
    options: &Options,
) -> (Vec<Box<dyn Feature>>, RequiredComponents) {
    let mut enabled = Vec::new();
    let mut required = RequiredComponents::default();

    for (id, build) in FEATURE_REGISTRY.iter() {
        let mut feature = build(options);
        let components = feature.configure(dda);
        required.merge(&components);
        if components.is_enabled() {
            debug!("启用特性: {}", id);
            enabled.push(feature);
        }
    }

    (enabled, required)
}
