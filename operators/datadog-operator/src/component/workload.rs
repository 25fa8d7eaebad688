//! 工作负载构建
//!
//! 最终 Pod 模板的 MD5 写入 `agent.datadoghq.com/agentspechash` 注解，状态计算时
//! 从工作负载上读回。

use k8s_openapi::api::apps::v1::{DaemonSet, DaemonSetSpec, Deployment, DeploymentSpec};
use k8s_openapi::api::core::v1::PodTemplateSpec;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use kube::api::{ApiResource, DynamicObject, GroupVersionKind};
use kube::ResourceExt;
use serde_json::json;
use std::collections::BTreeMap;
use tracing::debug;

use crate::constants::{COMPONENT_LABEL_KEY, MD5_AGENT_DEPLOYMENT_ANNOTATION_KEY};
use crate::crd::DatadogAgent;
use crate::feature::Options;
use crate::store::{component_pod_selector, StoreObject};
use crate::utils::generate_md5_for_spec;
use datadog_common::{ComponentName, Result};

/// ExtendedDaemonSet 的 API 资源描述
pub fn extended_daemonset_api_resource() -> ApiResource {
    ApiResource::from_gvk(&GroupVersionKind::gvk(
        "datadoghq.com",
        "v1alpha1",
        "ExtendedDaemonSet",
    ))
}

fn selector(dda: &DatadogAgent, component: ComponentName) -> LabelSelector {
    component_pod_selector(component, &dda.namespace_or_default(), &dda.name_any())
}

/// 组件 Pod 的标签，包含工作负载选择器用到的全部键
pub fn pod_labels(dda: &DatadogAgent, component: ComponentName) -> BTreeMap<String, String> {
    let mut labels = selector(dda, component).match_labels.unwrap_or_default();
    labels.insert(
        COMPONENT_LABEL_KEY.to_string(),
        component.resource_suffix().to_string(),
    );
    labels
}

/// 把最终 Pod 模板包装为组件的工作负载
pub fn build_workload(
    dda: &DatadogAgent,
    component: ComponentName,
    mut template: PodTemplateSpec,
    options: &Options,
) -> Result<StoreObject> {
    // 选择器标签不允许被覆盖配置改掉
    template
        .metadata
        .get_or_insert_with(ObjectMeta::default)
        .labels
        .get_or_insert_with(BTreeMap::new)
        .extend(pod_labels(dda, component));

    let hash = generate_md5_for_spec(&template)?;
    let metadata = ObjectMeta {
        name: Some(dda.component_resource_name(component)),
        namespace: Some(dda.namespace_or_default()),
        labels: Some(pod_labels(dda, component)),
        annotations: Some(BTreeMap::from([(
            MD5_AGENT_DEPLOYMENT_ANNOTATION_KEY.to_string(),
            hash,
        )])),
        ..Default::default()
    };
    let selector = selector(dda, component);
    debug!(
        "构建 {} 工作负载 {}",
        component,
        metadata.name.as_deref().unwrap_or_default()
    );

    let object = match component {
        ComponentName::NodeAgent if options.support_extended_daemonset => {
            let mut eds = DynamicObject::new(
                metadata.name.as_deref().unwrap_or_default(),
                &extended_daemonset_api_resource(),
            );
            eds.metadata = metadata;
            eds.data = json!({
                "spec": {
                    "selector": selector,
                    "template": template,
                }
            });
            StoreObject::ExtendedDaemonSet(eds)
        }
        ComponentName::NodeAgent => StoreObject::DaemonSet(DaemonSet {
            metadata,
            spec: Some(DaemonSetSpec {
                selector,
                template,
                ..Default::default()
            }),
            ..Default::default()
        }),
        ComponentName::ClusterAgent | ComponentName::ClusterChecksRunner => {
            let replicas = dda
                .component_override(component)
                .and_then(|o| o.replicas)
                .unwrap_or(1);
            StoreObject::Deployment(Deployment {
                metadata,
                spec: Some(DeploymentSpec {
                    replicas: Some(replicas),
                    selector,
                    template,
                    ..Default::default()
                }),
                ..Default::default()
            })
        }
    };
    Ok(object)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::{INSTANCE_LABEL_KEY, PART_OF_LABEL_KEY};
    use crate::feature::test_utils::dda_with_features;
    use datadog_common::{DatadogAgentComponentOverride, DatadogFeatures};

    fn template() -> PodTemplateSpec {
        PodTemplateSpec {
            metadata: Some(ObjectMeta {
                labels: Some(BTreeMap::from([("team".to_string(), "infra".to_string())])),
                ..Default::default()
            }),
            spec: None,
        }
    }

    #[test]
    fn test_daemonset_selector_matches_template() {
        let dda = dda_with_features(DatadogFeatures::default());
        let object =
            build_workload(&dda, ComponentName::NodeAgent, template(), &Options::default()).unwrap();

        let StoreObject::DaemonSet(ds) = object else {
            panic!("期望 DaemonSet");
        };
        assert_eq!(ds.metadata.name.as_deref(), Some("datadog-agent"));
        let spec = ds.spec.unwrap();
        let selector = spec.selector.match_labels.unwrap();
        let labels = spec.template.metadata.unwrap().labels.unwrap();
        for (key, value) in &selector {
            assert_eq!(labels.get(key), Some(value));
        }
        assert_eq!(selector[INSTANCE_LABEL_KEY], "agent");
        assert_eq!(selector[PART_OF_LABEL_KEY], "monitoring-datadog");
        assert_eq!(labels["team"], "infra");
    }

    #[test]
    fn test_spec_hash_changes_with_template() {
        let dda = dda_with_features(DatadogFeatures::default());
        let hash = |t: PodTemplateSpec| {
            build_workload(&dda, ComponentName::NodeAgent, t, &Options::default())
                .unwrap()
                .metadata()
                .annotations
                .clone()
                .unwrap()[MD5_AGENT_DEPLOYMENT_ANNOTATION_KEY]
                .clone()
        };
        let mut changed = template();
        changed
            .metadata
            .as_mut()
            .unwrap()
            .labels
            .as_mut()
            .unwrap()
            .insert("team".to_string(), "apm".to_string());

        assert_eq!(hash(template()), hash(template()));
        assert_ne!(hash(template()), hash(changed));
    }

    #[test]
    fn test_extended_daemonset_when_supported() {
        let dda = dda_with_features(DatadogFeatures::default());
        let options = Options {
            support_extended_daemonset: true,
            ..Default::default()
        };
        let object = build_workload(&dda, ComponentName::NodeAgent, template(), &options).unwrap();

        let StoreObject::ExtendedDaemonSet(eds) = object else {
            panic!("期望 ExtendedDaemonSet");
        };
        assert_eq!(eds.types.as_ref().unwrap().kind, "ExtendedDaemonSet");
        assert!(eds.data["spec"]["template"].is_object());
    }

    #[test]
    fn test_deployment_replicas_from_override() {
        let mut dda = dda_with_features(DatadogFeatures::default());
        dda.spec.override_.insert(
            ComponentName::ClusterChecksRunner,
            DatadogAgentComponentOverride {
                replicas: Some(3),
                ..Default::default()
            },
        );
        let runner = build_workload(
            &dda,
            ComponentName::ClusterChecksRunner,
            template(),
            &Options::default(),
        )
        .unwrap();
        let agent =
            build_workload(&dda, ComponentName::ClusterAgent, template(), &Options::default())
                .unwrap();

        match (runner, agent) {
            (StoreObject::Deployment(runner), StoreObject::Deployment(agent)) => {
                assert_eq!(runner.metadata.name.as_deref(), Some("datadog-cluster-checks-runner"));
                assert_eq!(runner.spec.unwrap().replicas, Some(3));
                assert_eq!(agent.spec.unwrap().replicas, Some(1));
            }
            other => panic!("期望两个 Deployment: {:?}", other),
        }
    }
}
