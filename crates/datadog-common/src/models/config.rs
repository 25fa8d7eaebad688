//! 通用配置片段
//!
//! 多个特性与覆盖配置共用的结构：自定义配置文件、ConfigMap 引用、Secret 引用、
//! 镜像配置以及端口/套接字配置。

use k8s_openapi::api::core::v1::KeyToPath;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// ConfigMap 引用
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ConfigMapConfig {
    /// ConfigMap 名称
    #[serde(default)]
    pub name: String,
    /// 挂载的键，为空时挂载全部键
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub items: Vec<KeyToPath>,
}

/// 单文件自定义配置，`config_map` 与 `config_data` 互斥，同时存在时 `config_map` 生效
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CustomConfig {
    /// 内联配置内容
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config_data: Option<String>,
    /// ConfigMap 引用
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config_map: Option<ConfigMapConfig>,
}

impl CustomConfig {
    /// 从内联内容创建
    pub fn from_data(data: impl Into<String>) -> Self {
        Self {
            config_data: Some(data.into()),
            config_map: None,
        }
    }

    /// 从 ConfigMap 名称创建
    pub fn from_config_map(name: impl Into<String>) -> Self {
        Self {
            config_data: None,
            config_map: Some(ConfigMapConfig {
                name: name.into(),
                items: Vec::new(),
            }),
        }
    }
}

/// 多文件自定义配置（confd / checksd）
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct MultiCustomConfig {
    /// 文件名到内容的映射
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub config_data_map: BTreeMap<String, String>,
    /// ConfigMap 引用
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config_map: Option<ConfigMapConfig>,
}

/// Secret 引用
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SecretConfig {
    /// Secret 名称
    pub secret_name: String,
    /// Secret 中的键
    #[serde(default)]
    pub key_name: String,
}

impl SecretConfig {
    /// 名称与键均非空时才视为有效引用
    pub fn is_valid(&self) -> bool {
        !self.secret_name.is_empty() && !self.key_name.is_empty()
    }
}

/// 镜像配置
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AgentImageConfig {
    /// 镜像名称，可以是完整引用（带标签）
    #[serde(default)]
    pub name: String,
    /// 镜像标签
    #[serde(default)]
    pub tag: String,
    /// 是否使用 JMX 版本
    #[serde(default)]
    pub jmx_enabled: bool,
    /// 拉取策略
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pull_policy: Option<String>,
    /// 拉取凭证
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pull_secrets: Option<Vec<k8s_openapi::api::core::v1::LocalObjectReference>>,
}

/// 主机端口配置
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct HostPortConfig {
    pub enabled: Option<bool>,
    #[serde(rename = "hostPort")]
    pub port: Option<i32>,
}

/// Unix 域套接字配置
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct UnixDomainSocketConfig {
    pub enabled: Option<bool>,
    pub path: Option<String>,
}

/// 三态布尔值取值，`None` 视为 false
pub fn bool_value(value: Option<bool>) -> bool {
    value.unwrap_or(false)
}
