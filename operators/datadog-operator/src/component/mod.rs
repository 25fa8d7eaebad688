//! 组件默认模板与工作负载
//!
//! 每个组件先得到一个只含默认容器、卷与探针的 Pod 模板，特性、全局设置与覆盖配置
//! 在此基础上累加。最终模板由 [`build_workload`] 包装为 DaemonSet、ExtendedDaemonSet
//! 或 Deployment。

mod agent;
mod cluster_agent;
mod cluster_checks_runner;
mod workload;

pub use workload::{build_workload, extended_daemonset_api_resource, pod_labels};

use k8s_openapi::api::core::v1::{
    HTTPGetAction, KeyToPath, PodTemplateSpec, Probe, Volume, VolumeMount,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;

use crate::constants::{
    DEFAULT_AGENT_HEALTH_PORT, DEFAULT_LIVENESS_PROBE_PATH, DEFAULT_READINESS_PROBE_PATH,
    DEFAULT_STARTUP_PROBE_PATH, INSTALL_INFO_VOLUME_NAME, INSTALL_INFO_VOLUME_PATH,
};
use crate::crd::DatadogAgent;
use crate::feature::{Options, RequiredComponents};
use crate::merger::mount;
use crate::utils::config_map_source_volume;
use datadog_common::ComponentName;

/// install-info ConfigMap 中的键
pub(crate) const INSTALL_INFO_KEY: &str = "install_info";

/// 组件的默认 Pod 模板
pub fn default_pod_template(
    dda: &DatadogAgent,
    component: ComponentName,
    required: &RequiredComponents,
    options: &Options,
) -> PodTemplateSpec {
    let spec = match component {
        ComponentName::NodeAgent => agent::default_pod_spec(dda, required, options),
        ComponentName::ClusterAgent => cluster_agent::default_pod_spec(dda, options),
        ComponentName::ClusterChecksRunner => {
            cluster_checks_runner::default_pod_spec(dda, required, options)
        }
    };
    PodTemplateSpec {
        metadata: Some(ObjectMeta {
            labels: Some(pod_labels(dda, component)),
            ..Default::default()
        }),
        spec: Some(spec),
    }
}

/// `<registry>/<name>:<tag>`
fn default_image(options: &Options, name: &str, tag: &str) -> String {
    format!("{}/{}:{}", options.default_registry, name, tag)
}

fn command(parts: &[&str]) -> Option<Vec<String>> {
    Some(parts.iter().map(|p| p.to_string()).collect())
}

fn http_probe(path: &str) -> Probe {
    Probe {
        http_get: Some(HTTPGetAction {
            path: Some(path.to_string()),
            port: IntOrString::Int(DEFAULT_AGENT_HEALTH_PORT),
            ..Default::default()
        }),
        initial_delay_seconds: Some(15),
        period_seconds: Some(15),
        timeout_seconds: Some(5),
        success_threshold: Some(1),
        failure_threshold: Some(6),
        ..Default::default()
    }
}

/// 健康检查端口上的存活、就绪与启动探针
fn health_probes() -> (Probe, Probe, Probe) {
    (
        http_probe(DEFAULT_LIVENESS_PROBE_PATH),
        http_probe(DEFAULT_READINESS_PROBE_PATH),
        http_probe(DEFAULT_STARTUP_PROBE_PATH),
    )
}

/// install-info 卷，只挂载单个文件
fn install_info_volume(dda: &DatadogAgent) -> (Volume, VolumeMount) {
    let items = [KeyToPath {
        key: INSTALL_INFO_KEY.to_string(),
        path: INSTALL_INFO_KEY.to_string(),
        mode: None,
    }];
    let volume = config_map_source_volume(
        INSTALL_INFO_VOLUME_NAME,
        &dda.child_name("install-info"),
        &items,
    );
    let mut volume_mount = mount(INSTALL_INFO_VOLUME_NAME, INSTALL_INFO_VOLUME_PATH, true);
    volume_mount.sub_path = Some(INSTALL_INFO_KEY.to_string());
    (volume, volume_mount)
}
