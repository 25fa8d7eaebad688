//! 配置管理模块
//!
//! 该模块负责加载 Operator 自身的配置。配置来源按优先级从低到高依次为：内置默认值、
//! 可选的 YAML/JSON 配置文件、以 `DD_OPERATOR_` 为前缀的环境变量。命令行参数在
//! 二进制入口处最后覆盖。

use anyhow::{anyhow, Context, Result};
use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::feature::Options;
use datadog_common::DEFAULT_REGISTRY;

/// 环境变量前缀
pub const ENV_PREFIX: &str = "DD_OPERATOR";

/// Operator 配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperatorConfig {
    /// 日志级别
    pub log_level: String,
    /// 只监听该命名空间，为空时监听全部命名空间
    #[serde(default)]
    pub watch_namespace: Option<String>,
    /// 协调成功后的重新入队间隔（秒）
    pub requeue_after_seconds: u64,
    /// 协调失败后的重新入队间隔（秒）
    pub error_requeue_seconds: u64,
    /// 节点 Agent 使用 ExtendedDaemonSet
    pub support_extended_daemonset: bool,
    /// 进程检查默认在核心 Agent 中运行
    pub process_checks_in_core_agent: bool,
    /// 默认镜像仓库
    pub default_registry: String,
    /// 服务端应用使用的字段管理器名称
    pub field_manager: String,
}

impl Default for OperatorConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            watch_namespace: None,
            requeue_after_seconds: 60,
            error_requeue_seconds: 15,
            support_extended_daemonset: false,
            process_checks_in_core_agent: false,
            default_registry: DEFAULT_REGISTRY.to_string(),
            field_manager: "datadog-operator".to_string(),
        }
    }
}

impl OperatorConfig {
    /// 加载配置，`path` 为空时只使用默认值与环境变量
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let defaults = OperatorConfig::default();
        let mut builder = Config::builder()
            .set_default("log_level", defaults.log_level)?
            .set_default("requeue_after_seconds", defaults.requeue_after_seconds as i64)?
            .set_default("error_requeue_seconds", defaults.error_requeue_seconds as i64)?
            .set_default("support_extended_daemonset", defaults.support_extended_daemonset)?
            .set_default(
                "process_checks_in_core_agent",
                defaults.process_checks_in_core_agent,
            )?
            .set_default("default_registry", defaults.default_registry)?
            .set_default("field_manager", defaults.field_manager)?;

        if let Some(path) = path {
            let file = path.to_str().ok_or_else(|| anyhow!("配置路径无效"))?;
            let format = match path.extension().and_then(|ext| ext.to_str()) {
                Some("yaml") | Some("yml") => FileFormat::Yaml,
                Some("json") => FileFormat::Json,
                _ => return Err(anyhow!("不支持的配置文件格式，仅支持 YAML 或 JSON")),
            };
            builder = builder.add_source(File::with_name(file).format(format));
        }

        let config = builder
            .add_source(Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .build()
            .context("构建配置失败")?;

        config
            .try_deserialize::<OperatorConfig>()
            .context("配置格式错误")
    }

    pub fn requeue_after(&self) -> Duration {
        Duration::from_secs(self.requeue_after_seconds)
    }

    pub fn error_requeue(&self) -> Duration {
        Duration::from_secs(self.error_requeue_seconds)
    }

    /// 构建特性时使用的共享选项
    pub fn feature_options(&self) -> Options {
        Options {
            support_extended_daemonset: self.support_extended_daemonset,
            process_checks_in_core_agent_enabled: self.process_checks_in_core_agent,
            default_registry: self.default_registry.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_load_without_file_uses_defaults() {
        let config = OperatorConfig::load(None).unwrap();
        assert_eq!(config.field_manager, "datadog-operator");
        assert_eq!(config.requeue_after(), Duration::from_secs(60));
    }

    #[test]
    fn test_load_yaml_file() {
        let dir = std::env::temp_dir();
        let path = dir.join(format!("datadog-operator-{}.yaml", uuid::Uuid::new_v4()));
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "watch_namespace: monitoring").unwrap();
        writeln!(file, "support_extended_daemonset: true").unwrap();
        writeln!(file, "error_requeue_seconds: 5").unwrap();

        let config = OperatorConfig::load(Some(&path)).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(config.watch_namespace.as_deref(), Some("monitoring"));
        assert!(config.support_extended_daemonset);
        assert_eq!(config.error_requeue(), Duration::from_secs(5));
        assert_eq!(config.log_level, "info");
    }

    #[test]
    fn test_unsupported_extension_is_rejected() {
        assert!(OperatorConfig::load(Some(Path::new("/tmp/operator.toml"))).is_err());
    }
}
