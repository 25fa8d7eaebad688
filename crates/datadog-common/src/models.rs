//! 数据模型模块
//!
//! 该模块定义了 DatadogAgent 资源使用的核心数据模型，包括特性配置、全局配置、
//! 组件覆盖配置以及状态快照，并提供序列化/反序列化与 JSON Schema 支持。

pub mod component;
pub mod config;
pub mod features;
pub mod global;
pub mod overrides;
pub mod status;
