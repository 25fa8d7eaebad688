//! 渲染工具函数
//!
//! 校验和计算与自定义配置相关的辅助函数，特性与覆盖配置共用。

use k8s_openapi::api::core::v1::{ConfigMapVolumeSource, KeyToPath, Volume};
use serde::Serialize;

use crate::crd::DatadogAgent;
use datadog_common::{CustomConfig, Result};

/// 对任意可序列化值计算 MD5，内容相同则结果相同
pub fn generate_md5_for_spec<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    let bytes = serde_json::to_vec(value)?;
    Ok(format!("{:x}", md5::compute(bytes)))
}

/// 自定义配置对应的 ConfigMap 名称
///
/// 引用已有 ConfigMap 时取其名称，否则为 `<dda>-<default_suffix>`。
pub fn conf_name(dda: &DatadogAgent, custom: Option<&CustomConfig>, default_suffix: &str) -> String {
    custom
        .and_then(|c| c.config_map.as_ref())
        .map(|cm| cm.name.clone())
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| dda.child_name(default_suffix))
}

/// 以 ConfigMap 为来源的卷，`items` 为空时挂载全部键
pub fn config_map_source_volume(volume_name: &str, config_map: &str, items: &[KeyToPath]) -> Volume {
    Volume {
        name: volume_name.to_string(),
        config_map: Some(ConfigMapVolumeSource {
            name: Some(config_map.to_string()),
            items: if items.is_empty() {
                None
            } else {
                Some(items.to_vec())
            },
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// 自定义配置实际生效的挂载键
///
/// 引用 ConfigMap 时沿用其 `items`；内联内容只有一个键 `file_name`。
pub fn custom_config_items(custom: &CustomConfig, file_name: &str) -> Vec<KeyToPath> {
    match &custom.config_map {
        Some(cm) => cm.items.clone(),
        None => vec![KeyToPath {
            key: file_name.to_string(),
            path: file_name.to_string(),
            mode: None,
        }],
    }
}

/// 逗号分隔的字符串列表，空列表返回 None
pub fn join_non_empty(items: &[String], separator: &str) -> Option<String> {
    if items.is_empty() {
        None
    } else {
        Some(items.join(separator))
    }
}
