//! 控制器模块
//!
//! 监听 DatadogAgent 资源，并拥有由其生成的 DaemonSet 与 Deployment，任一变化都会
//! 触发所属 DatadogAgent 的重新协调。

use anyhow::{Context as _, Result};
use futures::StreamExt;
use k8s_openapi::api::apps::v1::{DaemonSet, Deployment};
use kube::{
    api::{Api, ListParams},
    client::Client,
    runtime::{controller::Controller as KubeController, watcher},
    Resource,
};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::OperatorConfig;
use crate::crd::DatadogAgent;
use crate::reconcile::{error_policy, reconcile, Context};

/// 控制器结构体
pub struct Controller {
    /// Kubernetes 客户端
    client: Client,
    /// Operator 配置
    config: OperatorConfig,
}

impl Controller {
    /// 创建新的控制器
    pub fn new(client: Client, config: OperatorConfig) -> Self {
        Self { client, config }
    }

    fn api<K>(&self) -> Api<K>
    where
        K: Resource<Scope = k8s_openapi::NamespaceResourceScope>,
        <K as Resource>::DynamicType: Default,
    {
        match &self.config.watch_namespace {
            Some(namespace) => Api::namespaced(self.client.clone(), namespace),
            None => Api::all(self.client.clone()),
        }
    }

    /// 运行控制器，直到收到退出信号
    pub async fn run(self) -> Result<()> {
        let agents: Api<DatadogAgent> = self.api();
        agents
            .list(&ListParams::default().limit(1))
            .await
            .context("DatadogAgent CRD 未安装或无权访问")?;

        let daemonsets: Api<DaemonSet> = self.api();
        let deployments: Api<Deployment> = self.api();
        match &self.config.watch_namespace {
            Some(namespace) => info!("启动 DatadogAgent 控制器，命名空间 {}", namespace),
            None => info!("启动 DatadogAgent 控制器，监听全部命名空间"),
        }

        let context = Arc::new(Context::new(self.client.clone(), self.config.clone()));
        KubeController::new(agents, watcher::Config::default())
            .owns(daemonsets, watcher::Config::default())
            .owns(deployments, watcher::Config::default())
            .shutdown_on_signal()
            .run(reconcile, error_policy, context)
            .for_each(|result| async move {
                match result {
                    Ok((object, _)) => debug!("协调成功: {}", object.name),
                    Err(e) => warn!("协调错误: {}", e),
                }
            })
            .await;

        info!("DatadogAgent 控制器已停止");
        Ok(())
    }
}
