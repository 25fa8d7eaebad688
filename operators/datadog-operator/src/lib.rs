//! Datadog Operator - 将 DatadogAgent 资源编译为 Datadog Agent 工作负载的 Kubernetes Operator
//!
//! 每次协调把一个 DatadogAgent 规格渲染为节点 Agent 的 DaemonSet（或 ExtendedDaemonSet）、
//! Cluster Agent 与集群检查执行器的 Deployment，以及它们依赖的 ConfigMap、Secret、RBAC、
//! Service 和网络策略。渲染是纯函数，集群读写集中在 [`reconcile`] 中。

pub mod component;
pub mod config;
pub mod constants;
pub mod controller;
pub mod crd;
pub mod feature;
pub mod global;
pub mod merger;
pub mod overrides;
pub mod reconcile;
pub mod render;
pub mod status;
pub mod store;
pub mod utils;

pub use config::OperatorConfig;
pub use controller::Controller;
pub use crd::DatadogAgent;
pub use render::{render, RenderOutput};
