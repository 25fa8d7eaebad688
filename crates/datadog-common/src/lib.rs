//! Datadog Operator Common - 跨模块共享的 API 模型与错误类型
//!
//! 该模块提供 Operator 各组件共享的数据结构与统一的错误处理机制，
//! 包括特性配置、全局配置、组件覆盖配置以及状态快照。

pub mod error;
pub mod models;

/// 重新导出常用类型，方便使用
pub use error::Error;
pub use error::Result;
pub use models::component::*;
pub use models::config::*;
pub use models::features::*;
pub use models::global::*;
pub use models::overrides::*;
pub use models::status::*;
