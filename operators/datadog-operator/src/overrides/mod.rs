//! 组件覆盖
//!
//! 覆盖在全部特性与全局设置之后应用，同一个键上总是覆盖配置胜出。标量字段整体替换，
//! 亲和性按项合并，节点选择器、标签与注解按键合并，容忍与拓扑约束追加。
//!
//! `replicas` 不属于 Pod 模板，由工作负载构建时读取。

mod affinity;
mod config;
mod container;
pub mod image;

pub use affinity::merge_affinities;

use crate::crd::DatadogAgent;
use crate::feature::RequiredComponents;
use crate::merger::PodTemplateManagers;
use crate::store::ResourceManagers;
use config::{
    apply_custom_configurations, apply_extra_config, custom_config_maps, extra_config_map,
    ExtraConfig,
};
use container::apply_container_override;
use datadog_common::error::aggregate;
use datadog_common::{
    AgentImageConfig, ComponentName, ContainerName, DatadogAgentComponentOverride, Result,
};
use image::merge_image;

/// `disabled: true` 的组件从需求中移除
pub fn apply_disabled_overrides(dda: &DatadogAgent, required: &mut RequiredComponents) {
    for component in ComponentName::ALL {
        if dda
            .component_override(component)
            .map_or(false, DatadogAgentComponentOverride::is_disabled)
        {
            tracing::info!("组件 {} 已通过覆盖配置禁用", component);
            required.disable(component);
        }
    }
}

fn apply_image(managers: &mut PodTemplateManagers, image: &AgentImageConfig) {
    let spec = managers.pod_spec_mut();
    let agent_containers = spec.containers.iter_mut().filter(|c| {
        c.name
            .parse::<ContainerName>()
            .map_or(false, |name| name.runs_agent_image())
    });
    for container in agent_containers.chain(spec.init_containers.iter_mut().flatten()) {
        if let Some(current) = container.image.as_deref() {
            container.image = Some(merge_image(current, image));
        }
        if let Some(policy) = &image.pull_policy {
            container.image_pull_policy = Some(policy.clone());
        }
    }
    if let Some(secrets) = &image.pull_secrets {
        spec.image_pull_secrets = Some(secrets.clone());
    }
}

/// 把组件覆盖配置应用到 Pod 模板
pub fn apply_component_override(
    managers: &mut PodTemplateManagers,
    dda: &DatadogAgent,
    component: ComponentName,
    config: &DatadogAgentComponentOverride,
) -> Result<()> {
    if let Some(name) = &config.service_account_name {
        managers.pod_spec_mut().service_account_name = Some(name.clone());
    }
    if let Some(image) = &config.image {
        apply_image(managers, image);
    }

    for var in &config.env {
        managers.env_var().add_env_var_to_every_container(var.clone());
    }
    for source in &config.env_from {
        managers.env_from().add_env_from_to_every_container(source.clone());
    }

    apply_custom_configurations(managers, dda, component, &config.custom_configurations)?;
    if let Some(confd) = &config.extra_confd {
        apply_extra_config(managers, dda, component, ExtraConfig::Confd, confd)?;
    }
    if let Some(checksd) = &config.extra_checksd {
        apply_extra_config(managers, dda, component, ExtraConfig::Checksd, checksd)?;
    }

    for (name, container) in &config.containers {
        apply_container_override(managers, *name, container);
    }

    for volume in &config.volumes {
        managers.volume().add_volume(volume.clone());
    }

    let spec = managers.pod_spec_mut();
    if let Some(security_context) = &config.security_context {
        spec.security_context = Some(security_context.clone());
    }
    if let Some(priority_class) = &config.priority_class_name {
        spec.priority_class_name = Some(priority_class.clone());
    }
    if let Some(runtime_class) = &config.runtime_class_name {
        spec.runtime_class_name = Some(runtime_class.clone());
    }
    if config.affinity.is_some() {
        spec.affinity = merge_affinities(spec.affinity.as_ref(), config.affinity.as_ref());
    }
    if !config.node_selector.is_empty() {
        spec.node_selector
            .get_or_insert_with(Default::default)
            .extend(config.node_selector.clone());
    }
    if !config.tolerations.is_empty() {
        spec.tolerations
            .get_or_insert_with(Vec::new)
            .extend(config.tolerations.iter().cloned());
    }
    if let Some(host_network) = config.host_network {
        spec.host_network = Some(host_network);
    }
    if let Some(host_pid) = config.host_pid {
        spec.host_pid = Some(host_pid);
    }
    if let Some(dns_policy) = &config.dns_policy {
        spec.dns_policy = Some(dns_policy.clone());
    }
    if let Some(dns_config) = &config.dns_config {
        spec.dns_config = Some(dns_config.clone());
    }
    if !config.topology_spread_constraints.is_empty() {
        spec.topology_spread_constraints
            .get_or_insert_with(Vec::new)
            .extend(config.topology_spread_constraints.iter().cloned());
    }

    for (key, value) in &config.annotations {
        managers.add_annotation(key.as_str(), value.as_str());
    }
    for (key, value) in &config.labels {
        managers.add_label(key.as_str(), value.as_str());
    }
    Ok(())
}

/// 覆盖配置带来的附属资源变更
///
/// `createRbac: false` 删除该组件此前创建的 RBAC 对象；内联的自定义配置与
/// confd/checksd 生成 ConfigMap。错误全部收集后聚合返回。
pub fn override_dependencies(
    dda: &DatadogAgent,
    resources: &mut ResourceManagers,
    required: &RequiredComponents,
) -> Result<()> {
    let mut errors = Vec::new();
    for (component, config) in &dda.spec.override_ {
        if config.rbac_disabled() {
            tracing::info!("组件 {} 禁用了 RBAC 创建，删除已有的 RBAC 对象", component);
            resources.rbac().delete_by_component(*component);
        }
        if !required.get(*component).is_enabled() {
            continue;
        }
        custom_config_maps(
            dda,
            *component,
            &config.custom_configurations,
            resources,
            &mut errors,
        );
        for (kind, extra) in [
            (ExtraConfig::Confd, config.extra_confd.as_ref()),
            (ExtraConfig::Checksd, config.extra_checksd.as_ref()),
        ] {
            if let Some(extra) = extra {
                if let Err(e) = extra_config_map(dda, *component, kind, extra, resources) {
                    errors.push(e);
                }
            }
        }
    }
    aggregate(errors)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feature::test_utils::{agent_managers, dda_with_features, resource_managers};
    use crate::feature::RequiredComponent;
    use crate::merger::test_utils::{env_value, template_with};
    use crate::merger::{env, find_container};
    use crate::store::{component_labels, ObjectKind};
    use datadog_common::{CustomConfig, DatadogFeatures};
    use k8s_openapi::api::core::v1::{
        Container, LocalObjectReference, NodeAffinity, NodeSelector, NodeSelectorRequirement,
        NodeSelectorTerm, ServiceAccount, Toleration,
    };
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
    use std::collections::BTreeMap;

    fn node_affinity(key: &str) -> k8s_openapi::api::core::v1::Affinity {
        k8s_openapi::api::core::v1::Affinity {
            node_affinity: Some(NodeAffinity {
                required_during_scheduling_ignored_during_execution: Some(NodeSelector {
                    node_selector_terms: vec![NodeSelectorTerm {
                        match_expressions: Some(vec![NodeSelectorRequirement {
                            key: key.to_string(),
                            operator: "Exists".to_string(),
                            values: None,
                        }]),
                        match_fields: None,
                    }],
                }),
                preferred_during_scheduling_ignored_during_execution: None,
            }),
            ..Default::default()
        }
    }

    fn toleration(key: &str) -> Toleration {
        Toleration {
            key: Some(key.to_string()),
            operator: Some("Exists".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_image_override_skips_fips_proxy() {
        let dda = dda_with_features(DatadogFeatures::default());
        let mut managers = agent_managers();
        managers.upsert_container(Container {
            name: "fips-proxy".to_string(),
            image: Some("gcr.io/datadoghq/fips-proxy:1.1.9".to_string()),
            ..Default::default()
        });
        let config = DatadogAgentComponentOverride {
            image: Some(AgentImageConfig {
                tag: "7.65.0".to_string(),
                pull_policy: Some("Always".to_string()),
                pull_secrets: Some(vec![LocalObjectReference {
                    name: Some("registry-creds".to_string()),
                }]),
                ..Default::default()
            }),
            ..Default::default()
        };
        apply_component_override(&mut managers, &dda, ComponentName::NodeAgent, &config).unwrap();
        let template = managers.finalize();
        let spec = template.spec.as_ref().unwrap();

        for name in [ContainerName::CoreAgent, ContainerName::InitVolume] {
            let c = find_container(spec, name).unwrap();
            assert_eq!(c.image.as_deref(), Some("gcr.io/datadoghq/agent:7.65.0"));
            assert_eq!(c.image_pull_policy.as_deref(), Some("Always"));
        }
        assert_eq!(
            find_container(spec, ContainerName::FipsProxy).unwrap().image.as_deref(),
            Some("gcr.io/datadoghq/fips-proxy:1.1.9")
        );
        assert_eq!(spec.image_pull_secrets.as_ref().unwrap().len(), 1);
    }

    #[test]
    fn test_override_env_wins_over_feature_env() {
        let dda = dda_with_features(DatadogFeatures::default());
        let mut managers = agent_managers();
        managers
            .env_var()
            .add_env_var_to_container(ContainerName::CoreAgent, env("DD_LOGS_ENABLED", "false"));
        let config = DatadogAgentComponentOverride {
            env: vec![env("DD_LOGS_ENABLED", "true")],
            ..Default::default()
        };
        apply_component_override(&mut managers, &dda, ComponentName::NodeAgent, &config).unwrap();
        let template = managers.finalize();
        for name in [ContainerName::CoreAgent, ContainerName::InitConfig] {
            assert_eq!(
                env_value(&template, name, "DD_LOGS_ENABLED").as_deref(),
                Some("true")
            );
        }
    }

    #[test]
    fn test_pod_level_fields() {
        let dda = dda_with_features(DatadogFeatures::default());
        let mut managers = PodTemplateManagers::new(template_with(&[ContainerName::ClusterAgent], &[]));
        {
            let spec = managers.pod_spec_mut();
            spec.affinity = Some(node_affinity("feature"));
            spec.tolerations = Some(vec![toleration("existing")]);
            spec.node_selector = Some(BTreeMap::from([("os".to_string(), "linux".to_string())]));
        }
        managers.add_label("app", "datadog");

        let config = DatadogAgentComponentOverride {
            service_account_name: Some("custom-sa".to_string()),
            priority_class_name: Some("high".to_string()),
            host_network: Some(true),
            affinity: Some(node_affinity("override")),
            tolerations: vec![toleration("added")],
            node_selector: BTreeMap::from([("pool".to_string(), "infra".to_string())]),
            labels: BTreeMap::from([("team".to_string(), "obs".to_string())]),
            annotations: BTreeMap::from([("note".to_string(), "x".to_string())]),
            ..Default::default()
        };
        apply_component_override(&mut managers, &dda, ComponentName::ClusterAgent, &config).unwrap();
        let template = managers.finalize();
        let spec = template.spec.as_ref().unwrap();

        assert_eq!(spec.service_account_name.as_deref(), Some("custom-sa"));
        assert_eq!(spec.priority_class_name.as_deref(), Some("high"));
        assert_eq!(spec.host_network, Some(true));
        assert_eq!(spec.tolerations.as_ref().unwrap().len(), 2);
        assert_eq!(spec.node_selector.as_ref().unwrap().len(), 2);
        let terms = &spec
            .affinity
            .as_ref()
            .unwrap()
            .node_affinity
            .as_ref()
            .unwrap()
            .required_during_scheduling_ignored_during_execution
            .as_ref()
            .unwrap()
            .node_selector_terms;
        assert_eq!(terms.len(), 1);
        assert_eq!(terms[0].match_expressions.as_ref().unwrap().len(), 2);

        let labels = template.metadata.as_ref().unwrap().labels.as_ref().unwrap();
        assert_eq!(labels.get("app").map(String::as_str), Some("datadog"));
        assert_eq!(labels.get("team").map(String::as_str), Some("obs"));
        assert!(template.metadata.as_ref().unwrap().annotations.as_ref().unwrap().contains_key("note"));
    }

    #[test]
    fn test_disabled_override_removes_component() {
        let mut dda = dda_with_features(DatadogFeatures::default());
        dda.spec.override_.insert(
            ComponentName::ClusterAgent,
            DatadogAgentComponentOverride {
                disabled: Some(true),
                ..Default::default()
            },
        );
        let mut required = RequiredComponents {
            agent: RequiredComponent::required(&[ContainerName::CoreAgent]),
            cluster_agent: RequiredComponent::required(&[ContainerName::ClusterAgent]),
            ..Default::default()
        };
        apply_disabled_overrides(&dda, &mut required);
        assert!(!required.cluster_agent.is_enabled());
        assert!(required.agent.is_enabled());
    }

    #[test]
    fn test_create_rbac_false_deletes_component_rbac() {
        let mut dda = dda_with_features(DatadogFeatures::default());
        dda.spec.override_.insert(
            ComponentName::NodeAgent,
            DatadogAgentComponentOverride {
                create_rbac: Some(false),
                custom_configurations: BTreeMap::from([(
                    datadog_common::AgentConfigFileName::AgentGeneral,
                    CustomConfig::from_data("a: b"),
                )]),
                ..Default::default()
            },
        );
        let mut resources = resource_managers();
        resources
            .store_mut()
            .add_or_update(ServiceAccount {
                metadata: ObjectMeta {
                    name: Some("datadog-agent".to_string()),
                    labels: Some(component_labels(ComponentName::NodeAgent)),
                    ..Default::default()
                },
                ..Default::default()
            })
            .unwrap();
        let required = RequiredComponents {
            agent: RequiredComponent::required(&[ContainerName::CoreAgent]),
            ..Default::default()
        };

        override_dependencies(&dda, &mut resources, &required).unwrap();
        let store = resources.store();
        assert!(store
            .get(ObjectKind::ServiceAccount, "monitoring", "datadog-agent")
            .is_none());
        assert_eq!(store.deletions().count(), 1);
        assert!(store
            .get(ObjectKind::ConfigMap, "monitoring", "datadog-datadog-yaml-agent")
            .is_some());
    }
}
