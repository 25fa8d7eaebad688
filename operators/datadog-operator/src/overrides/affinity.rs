//! 亲和性合并
//!
//! 节点亲和性的必需条件是"项之间为或、项内为与"，合并时对两侧的每一对
//! `NodeSelectorTerm` 做笛卡尔积，结果同时满足两侧。偏好项与 Pod (反)亲和性
//! 只做拼接。

use k8s_openapi::api::core::v1::{
    Affinity, NodeAffinity, NodeSelector, NodeSelectorTerm, PodAffinity, PodAntiAffinity,
};

fn concat<T: Clone>(a: Option<&Vec<T>>, b: Option<&Vec<T>>) -> Option<Vec<T>> {
    match (a, b) {
        (None, None) => None,
        (a, b) => Some(a.into_iter().chain(b).flatten().cloned().collect()),
    }
}

fn merge_terms(existing: &NodeSelectorTerm, other: &NodeSelectorTerm) -> NodeSelectorTerm {
    NodeSelectorTerm {
        match_expressions: concat(
            existing.match_expressions.as_ref(),
            other.match_expressions.as_ref(),
        ),
        match_fields: concat(existing.match_fields.as_ref(), other.match_fields.as_ref()),
    }
}

fn merge_node_selectors(existing: Option<&NodeSelector>, other: Option<&NodeSelector>) -> Option<NodeSelector> {
    let terms = |s: Option<&NodeSelector>| {
        s.map(|s| s.node_selector_terms.clone())
            .filter(|t| !t.is_empty())
    };
    let node_selector_terms = match (terms(existing), terms(other)) {
        (None, None) => return None,
        (Some(terms), None) | (None, Some(terms)) => terms,
        (Some(left), Some(right)) => left
            .iter()
            .flat_map(|l| right.iter().map(move |r| merge_terms(l, r)))
            .collect(),
    };
    Some(NodeSelector { node_selector_terms })
}

fn merge_node_affinity(existing: Option<&NodeAffinity>, other: Option<&NodeAffinity>) -> Option<NodeAffinity> {
    if existing.is_none() && other.is_none() {
        return None;
    }
    Some(NodeAffinity {
        required_during_scheduling_ignored_during_execution: merge_node_selectors(
            existing.and_then(|a| a.required_during_scheduling_ignored_during_execution.as_ref()),
            other.and_then(|a| a.required_during_scheduling_ignored_during_execution.as_ref()),
        ),
        preferred_during_scheduling_ignored_during_execution: concat(
            existing.and_then(|a| a.preferred_during_scheduling_ignored_during_execution.as_ref()),
            other.and_then(|a| a.preferred_during_scheduling_ignored_during_execution.as_ref()),
        ),
    })
}

fn merge_pod_affinity(existing: Option<&PodAffinity>, other: Option<&PodAffinity>) -> Option<PodAffinity> {
    if existing.is_none() && other.is_none() {
        return None;
    }
    Some(PodAffinity {
        required_during_scheduling_ignored_during_execution: concat(
            existing.and_then(|a| a.required_during_scheduling_ignored_during_execution.as_ref()),
            other.and_then(|a| a.required_during_scheduling_ignored_during_execution.as_ref()),
        ),
        preferred_during_scheduling_ignored_during_execution: concat(
            existing.and_then(|a| a.preferred_during_scheduling_ignored_during_execution.as_ref()),
            other.and_then(|a| a.preferred_during_scheduling_ignored_during_execution.as_ref()),
        ),
    })
}

fn merge_pod_anti_affinity(
    existing: Option<&PodAntiAffinity>,
    other: Option<&PodAntiAffinity>,
) -> Option<PodAntiAffinity> {
    if existing.is_none() && other.is_none() {
        return None;
    }
    Some(PodAntiAffinity {
        required_during_scheduling_ignored_during_execution: concat(
            existing.and_then(|a| a.required_during_scheduling_ignored_during_execution.as_ref()),
            other.and_then(|a| a.required_during_scheduling_ignored_during_execution.as_ref()),
        ),
        preferred_during_scheduling_ignored_during_execution: concat(
            existing.and_then(|a| a.preferred_during_scheduling_ignored_during_execution.as_ref()),
            other.and_then(|a| a.preferred_during_scheduling_ignored_during_execution.as_ref()),
        ),
    })
}

/// 合并模板已有的亲和性与覆盖配置中的亲和性
pub fn merge_affinities(existing: Option<&Affinity>, other: Option<&Affinity>) -> Option<Affinity> {
    match (existing, other) {
        (None, None) => None,
        (Some(a), None) | (None, Some(a)) => Some(a.clone()),
        (Some(existing), Some(other)) => Some(Affinity {
            node_affinity: merge_node_affinity(
                existing.node_affinity.as_ref(),
                other.node_affinity.as_ref(),
            ),
            pod_affinity: merge_pod_affinity(existing.pod_affinity.as_ref(), other.pod_affinity.as_ref()),
            pod_anti_affinity: merge_pod_anti_affinity(
                existing.pod_anti_affinity.as_ref(),
                other.pod_anti_affinity.as_ref(),
            ),
        }),
    }
}
