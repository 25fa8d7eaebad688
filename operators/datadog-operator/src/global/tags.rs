//! 标签相关的全局设置
//!
//! 全局标签与各类"标签映射"以 JSON 形式写入环境变量。资源级的标签/注解映射还需要
//! Cluster Agent 有权读取对应资源。

use k8s_openapi::api::rbac::v1::PolicyRule;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

use crate::constants::{
    DD_KUBERNETES_RESOURCES_ANNOTATIONS_AS_TAGS, DD_KUBERNETES_RESOURCES_LABELS_AS_TAGS,
    DD_NAMESPACE_ANNOTATIONS_AS_TAGS, DD_NAMESPACE_LABELS_AS_TAGS, DD_NODE_LABELS_AS_TAGS,
    DD_POD_ANNOTATIONS_AS_TAGS, DD_POD_LABELS_AS_TAGS, DD_TAGS,
};
use crate::merger::{env, PodTemplateManagers};
use crate::store::policy_rule;
use datadog_common::{GlobalConfig, Result};

fn add_json_env<T: Serialize + ?Sized>(
    managers: &mut PodTemplateManagers,
    name: &str,
    value: &T,
) -> Result<()> {
    let encoded = serde_json::to_string(value)?;
    managers.env_var().add_env_var(env(name, encoded));
    Ok(())
}

/// 写入 `DD_TAGS` 与全部标签映射
pub(super) fn apply_tags(managers: &mut PodTemplateManagers, global: &GlobalConfig) -> Result<()> {
    if !global.tags.is_empty() {
        add_json_env(managers, DD_TAGS, &global.tags)?;
    }

    let maps = [
        (DD_POD_LABELS_AS_TAGS, &global.pod_labels_as_tags),
        (DD_POD_ANNOTATIONS_AS_TAGS, &global.pod_annotations_as_tags),
        (DD_NODE_LABELS_AS_TAGS, &global.node_labels_as_tags),
        (DD_NAMESPACE_LABELS_AS_TAGS, &global.namespace_labels_as_tags),
        (DD_NAMESPACE_ANNOTATIONS_AS_TAGS, &global.namespace_annotations_as_tags),
    ];
    for (name, map) in maps {
        if let Some(map) = map.as_ref().filter(|m| !m.is_empty()) {
            add_json_env(managers, name, map)?;
        }
    }

    let resource_maps = [
        (
            DD_KUBERNETES_RESOURCES_LABELS_AS_TAGS,
            &global.kubernetes_resources_labels_as_tags,
        ),
        (
            DD_KUBERNETES_RESOURCES_ANNOTATIONS_AS_TAGS,
            &global.kubernetes_resources_annotations_as_tags,
        ),
    ];
    for (name, map) in resource_maps {
        if !map.is_empty() {
            add_json_env(managers, name, map)?;
        }
    }
    Ok(())
}

/// 解析 `resource.group` 形式的键，核心组资源没有后缀
fn parse_resource_key(key: &str) -> (&str, &str) {
    match key.split_once('.') {
        Some((resource, group)) => (resource, group),
        None => (key, ""),
    }
}

/// 资源级标签映射引用到的资源的只读规则，按 API 组归并
pub(super) fn resource_metadata_rules(global: &GlobalConfig) -> Vec<PolicyRule> {
    let keys: BTreeSet<&String> = global
        .kubernetes_resources_labels_as_tags
        .keys()
        .chain(global.kubernetes_resources_annotations_as_tags.keys())
        .collect();

    let mut by_group: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
    for key in keys {
        let (resource, group) = parse_resource_key(key);
        if resource.is_empty() {
            continue;
        }
        by_group.entry(group).or_default().insert(resource);
    }

    by_group
        .into_iter()
        .map(|(group, resources)| {
            let resources: Vec<&str> = resources.into_iter().collect();
            policy_rule(&[group], &resources, &["get", "list", "watch"])
        })
        .collect()
}
