//! 状态条件
//!
//! 条件以 `type` 为键。状态值没有变化时只刷新原因与消息，`lastTransitionTime` 保持不变。

use k8s_openapi::apimachinery::pkg::apis::meta::v1::{Condition, Time};

pub const CONDITION_TRUE: &str = "True";
pub const CONDITION_FALSE: &str = "False";

pub const RECONCILE_SUCCEEDED: &str = "ReconcileSucceeded";
pub const RECONCILE_FAILED: &str = "ReconcileFailed";

pub fn condition_status(value: bool) -> &'static str {
    if value {
        CONDITION_TRUE
    } else {
        CONDITION_FALSE
    }
}

pub fn new_condition(type_: &str, status: &str, now: &Time, reason: &str, message: &str) -> Condition {
    Condition {
        type_: type_.to_string(),
        status: status.to_string(),
        last_transition_time: now.clone(),
        reason: reason.to_string(),
        message: message.to_string(),
        observed_generation: None,
    }
}

/// 写入完整条件，状态值未变时沿用原有的 `lastTransitionTime`
pub fn set_condition(conditions: &mut Vec<Condition>, condition: Condition) {
    match conditions.iter_mut().find(|c| c.type_ == condition.type_) {
        Some(existing) => {
            let transition = if existing.status == condition.status {
                existing.last_transition_time.clone()
            } else {
                condition.last_transition_time.clone()
            };
            *existing = Condition {
                last_transition_time: transition,
                ..condition
            };
        }
        None => conditions.push(condition),
    }
}

/// 更新同类型条件，不存在时追加
pub fn update_condition(
    conditions: &mut Vec<Condition>,
    now: &Time,
    type_: &str,
    status: &str,
    reason: &str,
    message: &str,
) {
    match conditions.iter_mut().find(|c| c.type_ == type_) {
        Some(existing) => {
            if existing.status != status {
                existing.last_transition_time = now.clone();
                existing.status = status.to_string();
            }
            existing.reason = reason.to_string();
            existing.message = message.to_string();
        }
        None => conditions.push(new_condition(type_, status, now, reason, message)),
    }
}

pub fn delete_condition(conditions: &mut Vec<Condition>, type_: &str) {
    conditions.retain(|c| c.type_ != type_);
}
