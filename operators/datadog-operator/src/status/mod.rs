//! DatadogAgent 状态计算
//!
//! 协调结束后根据集群中读回的工作负载与本次协调的结果重新计算状态子资源。
//! 计算是纯函数，写回由控制器负责。

mod condition;
mod workload;

pub use condition::{
    condition_status, delete_condition, new_condition, set_condition, update_condition,
    CONDITION_FALSE, CONDITION_TRUE, RECONCILE_FAILED, RECONCILE_SUCCEEDED,
};
pub use workload::{
    combine_daemonset_statuses, daemonset_status, deployment_status, extended_daemonset_status,
    missing_daemonset_status, most_severe, retain_daemonset_statuses, upsert_daemonset_status,
};

use k8s_openapi::api::apps::v1::{DaemonSet, Deployment};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use kube::api::DynamicObject;
use tracing::debug;

use crate::feature::RequiredComponents;
use datadog_common::{ComponentName, DatadogAgentStatus};

/// 节点 Agent 的工作负载
#[derive(Debug, Clone)]
pub enum AgentWorkload {
    DaemonSet(DaemonSet),
    ExtendedDaemonSet(DynamicObject),
}

/// 从集群读回的各组件工作负载，`None` 表示不存在
#[derive(Debug, Clone, Default)]
pub struct ObservedWorkloads {
    pub agent: Option<AgentWorkload>,
    pub cluster_agent: Option<Deployment>,
    pub cluster_checks_runner: Option<Deployment>,
}

/// 一次协调的输入摘要
#[derive(Debug, Clone, Default)]
pub struct ReconcileOutcome<'a> {
    pub required: RequiredComponents,
    /// 节点 Agent 工作负载的名称，用于记录缺失的分片
    pub agent_name: String,
    /// 第一个致命错误的消息
    pub error: Option<String>,
    pub generated_token: Option<&'a str>,
}

fn clear_component(status: &mut DatadogAgentStatus, component: ComponentName) {
    match component {
        ComponentName::NodeAgent => {
            status.agent = None;
            status.agent_list.clear();
        }
        ComponentName::ClusterAgent => status.cluster_agent = None,
        ComponentName::ClusterChecksRunner => status.cluster_checks_runner = None,
    }
    delete_condition(&mut status.conditions, component.reconcile_condition_type());
}

fn update_component(
    status: &mut DatadogAgentStatus,
    component: ComponentName,
    observed: &ObservedWorkloads,
    outcome: &ReconcileOutcome<'_>,
    now: &Time,
) {
    match component {
        ComponentName::NodeAgent => {
            let shard = match &observed.agent {
                Some(AgentWorkload::DaemonSet(ds)) => daemonset_status(ds, now),
                Some(AgentWorkload::ExtendedDaemonSet(eds)) => extended_daemonset_status(eds, now),
                None => missing_daemonset_status(&outcome.agent_name, now),
            };
            // 工作负载改名后旧名称的分片不再参与汇总
            let current = shard.daemonset_name.clone();
            retain_daemonset_statuses(
                &mut status.agent_list,
                &[current.as_str(), outcome.agent_name.as_str()],
            );
            upsert_daemonset_status(&mut status.agent_list, shard);
            status.agent = combine_daemonset_statuses(&status.agent_list);
        }
        ComponentName::ClusterAgent => {
            let mut updated = deployment_status(
                observed.cluster_agent.as_ref(),
                status.cluster_agent.as_ref(),
                now,
            );
            if let Some(token) = outcome.generated_token {
                updated.generated_token = token.to_string();
            }
            status.cluster_agent = Some(updated);
        }
        ComponentName::ClusterChecksRunner => {
            status.cluster_checks_runner = Some(deployment_status(
                observed.cluster_checks_runner.as_ref(),
                status.cluster_checks_runner.as_ref(),
                now,
            ));
        }
    }

    let (value, reason, message) = match &outcome.error {
        None => (CONDITION_TRUE, RECONCILE_SUCCEEDED, ""),
        Some(message) => (CONDITION_FALSE, RECONCILE_FAILED, message.as_str()),
    };
    update_condition(
        &mut status.conditions,
        now,
        component.reconcile_condition_type(),
        value,
        reason,
        message,
    );
}

/// 计算新的状态子资源
pub fn compute_status(
    previous: Option<&DatadogAgentStatus>,
    observed: &ObservedWorkloads,
    outcome: &ReconcileOutcome<'_>,
    now: &Time,
) -> DatadogAgentStatus {
    let mut status = previous.cloned().unwrap_or_default();
    for component in ComponentName::ALL {
        if outcome.required.get(component).is_enabled() {
            update_component(&mut status, component, observed, outcome, now);
        } else {
            debug!("组件 {} 未启用，清除其状态", component);
            clear_component(&mut status, component);
        }
    }
    status
}
