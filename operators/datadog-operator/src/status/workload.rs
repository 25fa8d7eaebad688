//! 工作负载状态归一化
//!
//! DaemonSet、ExtendedDaemonSet 与 Deployment 的状态被映射为统一的快照，
//! 多个分片按计数求和、严重程度取最严重的规则合并。

use k8s_openapi::api::apps::v1::{DaemonSet, Deployment};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, Time};
use kube::api::DynamicObject;
use serde_json::Value;

use crate::constants::MD5_AGENT_DEPLOYMENT_ANNOTATION_KEY;
use datadog_common::{AgentState, DaemonSetStatus, DeploymentStatus};

fn spec_hash(metadata: &ObjectMeta) -> String {
    metadata
        .annotations
        .as_ref()
        .and_then(|a| a.get(MD5_AGENT_DEPLOYMENT_ANNOTATION_KEY))
        .cloned()
        .unwrap_or_default()
}

fn rollout_state(desired: i32, ready: i32, up_to_date: i32) -> AgentState {
    if up_to_date != desired {
        AgentState::Updating
    } else if ready == 0 && desired != 0 {
        AgentState::Progressing
    } else {
        AgentState::Running
    }
}

fn daemonset_summary(status: &mut DaemonSetStatus) {
    let state = status
        .state
        .map(|s| s.to_string())
        .unwrap_or_default();
    status.status = format!(
        "{} ({}/{}/{})",
        state, status.desired, status.ready, status.up_to_date
    );
}

/// 找不到工作负载时记录的失败分片
pub fn missing_daemonset_status(name: &str, now: &Time) -> DaemonSetStatus {
    DaemonSetStatus {
        state: Some(AgentState::Failed),
        status: AgentState::Failed.to_string(),
        last_update: Some(now.clone()),
        daemonset_name: name.to_string(),
        ..Default::default()
    }
}

pub fn daemonset_status(ds: &DaemonSet, now: &Time) -> DaemonSetStatus {
    let observed = ds.status.clone().unwrap_or_default();
    let mut status = DaemonSetStatus {
        desired: observed.desired_number_scheduled,
        current: observed.current_number_scheduled,
        ready: observed.number_ready,
        available: observed.number_available.unwrap_or_default(),
        up_to_date: observed.updated_number_scheduled.unwrap_or_default(),
        last_update: Some(now.clone()),
        current_hash: spec_hash(&ds.metadata),
        daemonset_name: ds.metadata.name.clone().unwrap_or_default(),
        ..Default::default()
    };
    status.state = Some(rollout_state(status.desired, status.ready, status.up_to_date));
    daemonset_summary(&mut status);
    status
}

fn count(status: &Value, field: &str) -> i32 {
    status
        .get(field)
        .and_then(Value::as_i64)
        .and_then(|v| i32::try_from(v).ok())
        .unwrap_or_default()
}

/// ExtendedDaemonSet 的状态；金丝雀发布进行中时为 Canary
pub fn extended_daemonset_status(eds: &DynamicObject, now: &Time) -> DaemonSetStatus {
    let observed = eds.data.get("status").cloned().unwrap_or(Value::Null);
    let mut status = DaemonSetStatus {
        desired: count(&observed, "desired"),
        current: count(&observed, "current"),
        ready: count(&observed, "ready"),
        available: count(&observed, "available"),
        up_to_date: count(&observed, "upToDate"),
        last_update: Some(now.clone()),
        current_hash: spec_hash(&eds.metadata),
        daemonset_name: eds.metadata.name.clone().unwrap_or_default(),
        ..Default::default()
    };
    let canary = observed.get("canary").map_or(false, |c| !c.is_null());
    status.state = Some(if canary {
        AgentState::Canary
    } else {
        rollout_state(status.desired, status.ready, status.up_to_date)
    });
    daemonset_summary(&mut status);
    status
}

/// Deployment 的状态；`previous` 中的生成令牌会被保留
pub fn deployment_status(
    deployment: Option<&Deployment>,
    previous: Option<&DeploymentStatus>,
    now: &Time,
) -> DeploymentStatus {
    let mut status = DeploymentStatus {
        generated_token: previous
            .map(|p| p.generated_token.clone())
            .unwrap_or_default(),
        last_update: Some(now.clone()),
        ..Default::default()
    };

    let Some(deployment) = deployment else {
        status.state = Some(AgentState::Failed);
        status.status = AgentState::Failed.to_string();
        return status;
    };

    let observed = deployment.status.clone().unwrap_or_default();
    status.replicas = observed.replicas.unwrap_or_default();
    status.updated_replicas = observed.updated_replicas.unwrap_or_default();
    status.ready_replicas = observed.ready_replicas.unwrap_or_default();
    status.available_replicas = observed.available_replicas.unwrap_or_default();
    status.unavailable_replicas = observed.unavailable_replicas.unwrap_or_default();
    status.current_hash = spec_hash(&deployment.metadata);
    status.deployment_name = deployment.metadata.name.clone().unwrap_or_default();

    let replica_failure = observed
        .conditions
        .unwrap_or_default()
        .iter()
        .any(|c| c.type_ == "ReplicaFailure" && c.status == "True");
    let state = if replica_failure {
        AgentState::Failed
    } else {
        rollout_state(status.replicas, status.ready_replicas, status.updated_replicas)
    };
    status.state = Some(state);
    status.status = format!(
        "{} ({}/{}/{})",
        state, status.replicas, status.ready_replicas, status.updated_replicas
    );
    status
}

/// 两个状态中更严重的一个，未设置的一方不参与比较
pub fn most_severe(a: Option<AgentState>, b: Option<AgentState>) -> Option<AgentState> {
    match (a, b) {
        (Some(a), Some(b)) => Some(if b.severity() < a.severity() { b } else { a }),
        (a, None) => a,
        (None, b) => b,
    }
}

fn latest(a: Option<Time>, b: Option<Time>) -> Option<Time> {
    match (a, b) {
        (Some(a), Some(b)) => Some(if b.0 > a.0 { b } else { a }),
        (a, None) => a,
        (None, b) => b,
    }
}

/// 合并多个 DaemonSet 分片的状态
pub fn combine_daemonset_statuses(shards: &[DaemonSetStatus]) -> Option<DaemonSetStatus> {
    let (first, rest) = shards.split_first()?;
    let mut combined = first.clone();
    for shard in rest {
        combined.desired += shard.desired;
        combined.current += shard.current;
        combined.ready += shard.ready;
        combined.available += shard.available;
        combined.up_to_date += shard.up_to_date;
        combined.last_update = latest(combined.last_update.take(), shard.last_update.clone());
        combined.state = most_severe(combined.state, shard.state);
    }
    if shards.len() > 1 {
        combined.daemonset_name = String::new();
        combined.current_hash = String::new();
    }
    daemonset_summary(&mut combined);
    Some(combined)
}

/// 按名称插入或替换分片
pub fn upsert_daemonset_status(list: &mut Vec<DaemonSetStatus>, status: DaemonSetStatus) {
    match list
        .iter_mut()
        .find(|s| s.daemonset_name == status.daemonset_name)
    {
        Some(existing) => *existing = status,
        None => list.push(status),
    }
}

/// 只保留名称在 `names` 中的分片
pub fn retain_daemonset_statuses(list: &mut Vec<DaemonSetStatus>, names: &[&str]) {
    list.retain(|s| names.contains(&s.daemonset_name.as_str()));
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use k8s_openapi::api::apps::v1::{DaemonSetStatus as K8sDaemonSetStatus, DeploymentCondition, DeploymentStatus as K8sDeploymentStatus};
    use rstest::rstest;
    use serde_json::json;
    use std::collections::BTreeMap;

    fn now() -> Time {
        Time(Utc.timestamp_opt(1_700_000_000, 0).unwrap())
    }

    fn shard(name: &str, state: AgentState, desired: i32, ready: i32) -> DaemonSetStatus {
        DaemonSetStatus {
            desired,
            ready,
            up_to_date: desired,
            state: Some(state),
            daemonset_name: name.to_string(),
            last_update: Some(now()),
            ..Default::default()
        }
    }

    fn daemonset(desired: i32, ready: i32, updated: i32) -> DaemonSet {
        DaemonSet {
            metadata: ObjectMeta {
                name: Some("datadog-agent".to_string()),
                annotations: Some(BTreeMap::from([(
                    MD5_AGENT_DEPLOYMENT_ANNOTATION_KEY.to_string(),
                    "abc".to_string(),
                )])),
                ..Default::default()
            },
            status: Some(K8sDaemonSetStatus {
                desired_number_scheduled: desired,
                current_number_scheduled: desired,
                number_ready: ready,
                updated_number_scheduled: Some(updated),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[rstest]
    #[case(3, 3, 3, AgentState::Running)]
    #[case(3, 1, 2, AgentState::Updating)]
    #[case(3, 0, 3, AgentState::Progressing)]
    #[case(0, 0, 0, AgentState::Running)]
    fn test_daemonset_state(
        #[case] desired: i32,
        #[case] ready: i32,
        #[case] updated: i32,
        #[case] expected: AgentState,
    ) {
        let status = daemonset_status(&daemonset(desired, ready, updated), &now());
        assert_eq!(status.state, Some(expected));
        assert_eq!(status.current_hash, "abc");
        assert_eq!(
            status.status,
            format!("{} ({}/{}/{})", expected, desired, ready, updated)
        );
    }

    #[test]
    fn test_combine_failed_shard_wins() {
        let combined = combine_daemonset_statuses(&[
            shard("a", AgentState::Running, 3, 3),
            shard("b", AgentState::Failed, 2, 0),
        ])
        .unwrap();

        assert_eq!(combined.state, Some(AgentState::Failed));
        assert_eq!(combined.desired, 5);
        assert_eq!(combined.ready, 3);
        assert_eq!(combined.status, "Failed (5/3/5)");
    }

    #[test]
    fn test_combine_all_running() {
        let combined = combine_daemonset_statuses(&[
            shard("a", AgentState::Running, 1, 1),
            shard("b", AgentState::Running, 1, 1),
        ])
        .unwrap();
        assert_eq!(combined.state, Some(AgentState::Running));
        assert!(combine_daemonset_statuses(&[]).is_none());
    }

    #[test]
    fn test_unset_state_is_ignored() {
        assert_eq!(
            most_severe(None, Some(AgentState::Updating)),
            Some(AgentState::Updating)
        );
        assert_eq!(
            most_severe(Some(AgentState::Canary), Some(AgentState::Updating)),
            Some(AgentState::Canary)
        );
    }

    #[test]
    fn test_extended_daemonset_canary() {
        let mut eds = DynamicObject::new(
            "datadog-agent",
            &crate::component::extended_daemonset_api_resource(),
        );
        eds.data = json!({
            "status": {
                "desired": 4, "current": 4, "ready": 4, "available": 4, "upToDate": 1,
                "canary": {"nodes": ["node-a"]}
            }
        });
        let status = extended_daemonset_status(&eds, &now());
        assert_eq!(status.state, Some(AgentState::Canary));
        assert_eq!(status.up_to_date, 1);

        eds.data["status"]["canary"] = Value::Null;
        let status = extended_daemonset_status(&eds, &now());
        assert_eq!(status.state, Some(AgentState::Updating));
    }

    #[test]
    fn test_deployment_states() {
        let mut deployment = Deployment {
            metadata: ObjectMeta {
                name: Some("datadog-cluster-agent".to_string()),
                ..Default::default()
            },
            status: Some(K8sDeploymentStatus {
                replicas: Some(2),
                updated_replicas: Some(2),
                ready_replicas: Some(2),
                ..Default::default()
            }),
            ..Default::default()
        };
        let previous = DeploymentStatus {
            generated_token: "token".to_string(),
            ..Default::default()
        };
        let status = deployment_status(Some(&deployment), Some(&previous), &now());
        assert_eq!(status.state, Some(AgentState::Running));
        assert_eq!(status.status, "Running (2/2/2)");
        assert_eq!(status.generated_token, "token");

        if let Some(observed) = deployment.status.as_mut() {
            observed.conditions = Some(vec![DeploymentCondition {
                type_: "ReplicaFailure".to_string(),
                status: "True".to_string(),
                ..Default::default()
            }]);
        }
        let status = deployment_status(Some(&deployment), None, &now());
        assert_eq!(status.state, Some(AgentState::Failed));

        let status = deployment_status(None, None, &now());
        assert_eq!(status.state, Some(AgentState::Failed));
        assert_eq!(status.status, "Failed");
    }

    #[test]
    fn test_upsert_by_name() {
        let mut list = vec![shard("a", AgentState::Failed, 0, 0)];
        upsert_daemonset_status(&mut list, shard("a", AgentState::Running, 2, 2));
        upsert_daemonset_status(&mut list, shard("b", AgentState::Running, 1, 1));
        assert_eq!(list.len(), 2);
        assert_eq!(list[0].state, Some(AgentState::Running));
    }

    #[test]
    fn test_retain_drops_unknown_shards() {
        let mut list = vec![
            shard("datadog-agent", AgentState::Failed, 0, 0),
            shard("custom-agent", AgentState::Running, 2, 2),
        ];
        retain_daemonset_statuses(&mut list, &["custom-agent"]);
        let combined = combine_daemonset_statuses(&list).unwrap();
        assert_eq!(combined.state, Some(AgentState::Running));
        assert_eq!(combined.desired, 2);
    }
}
