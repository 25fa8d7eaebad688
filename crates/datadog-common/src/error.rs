//! 错误处理模块
//!
//! 该模块提供 Datadog Operator 的统一错误处理机制。错误类型按照协调过程中的
//! 失败类别划分：配置错误、依赖资源错误、渲染错误以及 Kubernetes API 错误。

use std::fmt;
use std::io;
use thiserror::Error;

/// Datadog Operator 统一错误类型
#[derive(Error, Debug)]
pub enum Error {
    /// 配置错误，规格组合非法，在规格变更前不会重试
    #[error("配置错误: {0}")]
    Config(String),

    /// 依赖资源错误，多个错误聚合后一并报告
    #[error("依赖资源错误: {0}")]
    Dependency(AggregateError),

    /// 渲染错误，特性或覆盖步骤失败
    #[error("渲染错误: {0}")]
    Render(String),

    /// 资源存储错误
    #[error("资源存储错误: {0}")]
    Store(String),

    /// Kubernetes API 错误
    #[error("Kubernetes API 错误: {0}")]
    Kubernetes(#[from] kube::Error),

    /// 序列化/反序列化错误
    #[error("序列化/反序列化错误: {0}")]
    Serialization(String),

    /// I/O 错误
    #[error("I/O 错误: {0}")]
    Io(#[from] io::Error),

    /// JSON 错误
    #[error("JSON 错误: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML 错误
    #[error("YAML 错误: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl Error {
    /// 是否为配置错误
    pub fn is_config(&self) -> bool {
        matches!(self, Error::Config(_))
    }
}

/// Datadog Operator 结果类型别名
pub type Result<T> = std::result::Result<T, Error>;

/// 聚合错误，保存全部子错误的消息
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AggregateError {
    /// 子错误消息
    pub errors: Vec<String>,
}

impl AggregateError {
    /// 子错误数量
    pub fn len(&self) -> usize {
        self.errors.len()
    }

    /// 是否没有子错误
    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }
}

impl fmt::Display for AggregateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.errors.as_slice() {
            [single] => write!(f, "{}", single),
            errors => write!(f, "[{}]", errors.join(", ")),
        }
    }
}

/// 将多个错误聚合为一个依赖错误；列表为空时返回 Ok
pub fn aggregate(errors: Vec<Error>) -> Result<()> {
    if errors.is_empty() {
        return Ok(());
    }

    Err(Error::Dependency(AggregateError {
        errors: errors.iter().map(ToString::to_string).collect(),
    }))
}

/// 从字符串创建错误
pub trait IntoError<T> {
    /// 将当前类型转换为错误
    fn into_error(self, kind: fn(String) -> Error) -> Result<T>;
}

impl<T> IntoError<T> for String {
    fn into_error(self, kind: fn(String) -> Error) -> Result<T> {
        Err(kind(self))
    }
}

impl<T> IntoError<T> for &str {
    fn into_error(self, kind: fn(String) -> Error) -> Result<T> {
        Err(kind(self.to_string()))
    }
}
