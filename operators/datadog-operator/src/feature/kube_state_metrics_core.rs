//! kube-state-metrics core 特性
//!
//! 检查由 Cluster Agent 执行；启用集群检查运行器时改由运行器执行。检查配置来自
//! 用户提供的 [`CustomConfig`](datadog_common::CustomConfig)，否则生成默认配置。
//! 节点 Agent 上关闭旧版 `kubernetes_state` 自动配置，避免重复采集。

use k8s_openapi::api::rbac::v1::PolicyRule;
use serde_json::json;
use std::collections::BTreeMap;
use tracing::{debug, warn};

use super::custom_config::FeatureCustomConfig;
use super::{Feature, FeatureId, Options, RequiredComponent, RequiredComponents};
use crate::constants::{
    checksum_annotation_key, CONFIG_VOLUME_PATH, DD_IGNORE_AUTOCONF,
    DD_KUBE_STATE_METRICS_CORE_CONFIGMAP, DD_KUBE_STATE_METRICS_CORE_ENABLED,
    EXTRA_CONFD_VOLUME_PATH,
};
use crate::crd::DatadogAgent;
use crate::merger::{config_map_volume, env, mount, PodTemplateManagers};
use crate::store::{policy_rule, ResourceManagers};
use crate::utils::{conf_name, generate_md5_for_spec};
use datadog_common::error::aggregate;
use datadog_common::{bool_value, ComponentName, ContainerName, Result};

const KSM_CORE_SUFFIX: &str = "kube-state-metrics-core-config";
const KSM_CORE_VOLUME_NAME: &str = "ksm-core-config";
const KSM_CORE_CONFIG_FILE: &str = "kubernetes_state_core.yaml.default";
const KSM_CORE_FOLDER: &str = "kubernetes_state_core.d";

/// 默认配置启用的采集器
const DEFAULT_COLLECTORS: &[&str] = &[
    "pods",
    "replicationcontrollers",
    "statefulsets",
    "nodes",
    "cronjobs",
    "jobs",
    "replicasets",
    "deployments",
    "configmaps",
    "services",
    "endpoints",
    "daemonsets",
    "horizontalpodautoscalers",
    "limitranges",
    "resourcequotas",
    "secrets",
    "namespaces",
    "persistentvolumeclaims",
    "persistentvolumes",
    "storageclasses",
    "ingresses",
    "poddisruptionbudgets",
    "customresourcedefinitions",
    "apiservices",
];

/// 默认检查配置
fn default_check_config(run_in_runner: bool) -> Result<String> {
    let config = json!({
        "cluster_check": run_in_runner,
        "init_config": null,
        "instances": [{
            "collectors": DEFAULT_COLLECTORS,
            "skip_leader_election": run_in_runner,
        }],
    });
    Ok(format!("---\n{}", serde_yaml::to_string(&config)?))
}

fn ksm_rules() -> Vec<PolicyRule> {
    let list_watch = ["list", "watch"];
    vec![
        policy_rule(
            &[""],
            &[
                "configmaps",
                "endpoints",
                "events",
                "limitranges",
                "namespaces",
                "nodes",
                "persistentvolumeclaims",
                "persistentvolumes",
                "pods",
                "replicationcontrollers",
                "resourcequotas",
                "secrets",
                "services",
            ],
            &list_watch,
        ),
        policy_rule(
            &["apps"],
            &["daemonsets", "deployments", "replicasets", "statefulsets"],
            &list_watch,
        ),
        policy_rule(&["batch"], &["cronjobs", "jobs"], &list_watch),
        policy_rule(&["autoscaling"], &["horizontalpodautoscalers"], &list_watch),
        policy_rule(&["policy"], &["poddisruptionbudgets"], &list_watch),
        policy_rule(&["storage.k8s.io"], &["storageclasses"], &list_watch),
        policy_rule(&["networking.k8s.io"], &["ingresses"], &list_watch),
        policy_rule(
            &["apiextensions.k8s.io"],
            &["customresourcedefinitions"],
            &list_watch,
        ),
        policy_rule(&["apiregistration.k8s.io"], &["apiservices"], &list_watch),
    ]
}

#[derive(Debug, Default)]
struct KubeStateMetricsCoreFeature {
    run_in_runner: bool,
    custom_config: Option<FeatureCustomConfig>,
    namespace: String,
    config_map_name: String,
    rbac_name: String,
    service_account: String,
}

pub(super) fn build(_options: &Options) -> Box<dyn Feature> {
    Box::<KubeStateMetricsCoreFeature>::default()
}

impl KubeStateMetricsCoreFeature {
    fn check_component(&self) -> ComponentName {
        if self.run_in_runner {
            ComponentName::ClusterChecksRunner
        } else {
            ComponentName::ClusterAgent
        }
    }

    /// 引用已有 ConfigMap 时沿用其 items，否则挂载整个生成的 ConfigMap
    fn add_config_volume(&self, managers: &mut PodTemplateManagers) {
        let mount_path = format!(
            "{}{}/{}",
            CONFIG_VOLUME_PATH, EXTRA_CONFD_VOLUME_PATH, KSM_CORE_FOLDER
        );
        match self.custom_config.as_ref().filter(|c| c.config.config_map.is_some()) {
            Some(custom) => {
                custom.add_checksum_annotation(managers);
                managers
                    .volume()
                    .add_volume(custom.volume(KSM_CORE_VOLUME_NAME, KSM_CORE_CONFIG_FILE));
                managers.volume_mount().add_volume_mount_to_container(
                    mount(KSM_CORE_VOLUME_NAME, &mount_path, true),
                    ContainerName::ClusterAgent,
                );
            }
            None => {
                if let Some(custom) = &self.custom_config {
                    custom.add_checksum_annotation(managers);
                }
                let (volume, volume_mount) = config_map_volume(
                    KSM_CORE_VOLUME_NAME,
                    &self.config_map_name,
                    Vec::new(),
                    &mount_path,
                );
                managers.volume().add_volume(volume);
                managers
                    .volume_mount()
                    .add_volume_mount_to_container(volume_mount, ContainerName::ClusterAgent);
            }
        }
    }

    fn ignore_legacy_check(&self, managers: &mut PodTemplateManagers, container: ContainerName) {
        managers
            .env_var()
            .add_env_var_to_container(container, env(DD_IGNORE_AUTOCONF, "kubernetes_state"));
    }
}

impl Feature for KubeStateMetricsCoreFeature {
    fn id(&self) -> FeatureId {
        FeatureId::KubeStateMetricsCore
    }

    fn configure(&mut self, dda: &DatadogAgent) -> RequiredComponents {
        let features = dda.features();
        let Some(config) = features
            .kube_state_metrics_core
            .filter(|c| bool_value(c.enabled))
        else {
            return RequiredComponents::default();
        };

        let cluster_checks = features.cluster_checks.unwrap_or_default();
        self.run_in_runner = bool_value(cluster_checks.enabled)
            && bool_value(cluster_checks.use_cluster_checks_runners);
        let component = self.check_component();
        self.rbac_name =
            dda.child_name(&format!("{}-kube-state-metrics-core", component.resource_suffix()));
        self.service_account = dda.service_account_name(component);
        self.namespace = dda.namespace_or_default();
        self.custom_config = config.conf.as_ref().map(|conf| {
            FeatureCustomConfig::new(dda, conf, FeatureId::KubeStateMetricsCore, KSM_CORE_SUFFIX)
        });
        self.config_map_name = conf_name(dda, config.conf.as_ref(), KSM_CORE_SUFFIX);
        debug!(
            "kube-state-metrics core 已启用, 运行于 {}",
            component.resource_suffix()
        );

        let mut required = RequiredComponents {
            agent: RequiredComponent::required(&[ContainerName::CoreAgent]),
            cluster_agent: RequiredComponent::required(&[ContainerName::ClusterAgent]),
            ..Default::default()
        };
        if self.run_in_runner {
            required.cluster_checks_runner =
                RequiredComponent::required(&[ContainerName::ClusterChecksRunner]);
        }
        required
    }

    fn manage_dependencies(
        &self,
        managers: &mut ResourceManagers,
        _components: &RequiredComponents,
    ) -> Result<()> {
        let mut errors = Vec::new();
        match &self.custom_config {
            Some(custom) => {
                if let Err(e) = custom.manage_dependencies(managers, KSM_CORE_CONFIG_FILE) {
                    errors.push(e);
                }
            }
            None => {
                if let Err(e) = self.add_default_config_map(managers) {
                    errors.push(e);
                }
            }
        }
        if let Err(e) = managers.rbac().add_cluster_policy_rules_by_component(
            &self.rbac_name,
            &self.service_account,
            ksm_rules(),
            Some(self.check_component()),
        ) {
            errors.push(e);
        }
        aggregate(errors)
    }

    fn manage_cluster_agent(&self, managers: &mut PodTemplateManagers) -> Result<()> {
        self.add_config_volume(managers);
        let mut envs = managers.env_var();
        envs.add_env_var_to_container(
            ContainerName::ClusterAgent,
            env(DD_KUBE_STATE_METRICS_CORE_ENABLED, "true"),
        );
        envs.add_env_var_to_container(
            ContainerName::ClusterAgent,
            env(DD_KUBE_STATE_METRICS_CORE_CONFIGMAP, self.config_map_name.clone()),
        );
        Ok(())
    }

    fn manage_node_agent(&self, managers: &mut PodTemplateManagers, _provider: &str) -> Result<()> {
        self.ignore_legacy_check(managers, ContainerName::CoreAgent);
        Ok(())
    }

    fn manage_single_container_node_agent(
        &self,
        managers: &mut PodTemplateManagers,
        _provider: &str,
    ) -> Result<()> {
        self.ignore_legacy_check(managers, ContainerName::UnprivilegedSingleAgent);
        Ok(())
    }

    fn manage_cluster_checks_runner(&self, managers: &mut PodTemplateManagers) -> Result<()> {
        if self.run_in_runner {
            self.ignore_legacy_check(managers, ContainerName::ClusterChecksRunner);
        }
        Ok(())
    }
}

impl KubeStateMetricsCoreFeature {
    fn add_default_config_map(&self, managers: &mut ResourceManagers) -> Result<()> {
        let content = default_check_config(self.run_in_runner)?;
        let data = BTreeMap::from([(KSM_CORE_CONFIG_FILE.to_string(), content)]);
        let mut annotations = BTreeMap::new();
        match generate_md5_for_spec(&data) {
            Ok(hash) => {
                annotations.insert(
                    checksum_annotation_key(FeatureId::KubeStateMetricsCore.as_str()),
                    hash,
                );
            }
            Err(e) => warn!("无法计算 kube-state-metrics core 默认配置的校验和: {}", e),
        }
        managers
            .config_map()
            .add_config_map(&self.namespace, &self.config_map_name, data, annotations)
    }
}
