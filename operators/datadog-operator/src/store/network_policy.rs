//! 网络策略管理器
//!
//! 按组件生成 Kubernetes NetworkPolicy 或 CiliumNetworkPolicy。Cilium 策略没有
//! 现成的类型，以 `DynamicObject` 表示。

use k8s_openapi::api::networking::v1::{
    NetworkPolicy, NetworkPolicyEgressRule, NetworkPolicyIngressRule, NetworkPolicyPeer,
    NetworkPolicyPort, NetworkPolicySpec,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::api::{ApiResource, DynamicObject, GroupVersionKind};
use serde_json::{json, Value};
use std::collections::BTreeMap;

use super::{Store, StoreObject};
use crate::constants::{DEFAULT_DOGSTATSD_PORT, INSTANCE_LABEL_KEY, PART_OF_LABEL_KEY};
use datadog_common::{ComponentName, Result};

/// Datadog 接入端点与 kube-apiserver 端口
const INTAKE_PORT: i32 = 443;
/// Cluster Agent 服务端口
const CLUSTER_AGENT_SERVICE_PORT: i32 = 5005;
/// Cluster Agent 的 Prometheus 指标端口
const CLUSTER_AGENT_METRICS_PORT: i32 = 5000;

/// CiliumNetworkPolicy 的 API 资源描述
pub fn cilium_api_resource() -> ApiResource {
    ApiResource::from_gvk(&GroupVersionKind::gvk(
        "cilium.io",
        "v2",
        "CiliumNetworkPolicy",
    ))
}

/// 组件 Pod 选择器
pub fn component_pod_selector(
    component: ComponentName,
    owner_namespace: &str,
    owner_name: &str,
) -> LabelSelector {
    LabelSelector {
        match_labels: Some(BTreeMap::from([
            (
                INSTANCE_LABEL_KEY.to_string(),
                component.resource_suffix().to_string(),
            ),
            (
                PART_OF_LABEL_KEY.to_string(),
                format!("{}-{}", owner_namespace, owner_name),
            ),
        ])),
        match_expressions: None,
    }
}

fn port(port: i32) -> NetworkPolicyPort {
    NetworkPolicyPort {
        port: Some(IntOrString::Int(port)),
        ..Default::default()
    }
}

fn peer(selector: &LabelSelector) -> NetworkPolicyPeer {
    NetworkPolicyPeer {
        pod_selector: Some(selector.clone()),
        ..Default::default()
    }
}

pub struct NetworkPolicyManager<'a> {
    store: &'a mut Store,
}

impl<'a> NetworkPolicyManager<'a> {
    pub(super) fn new(store: &'a mut Store) -> Self {
        Self { store }
    }

    /// 生成组件的 Kubernetes NetworkPolicy
    pub fn build_kubernetes_network_policy(
        &mut self,
        component: ComponentName,
        policy_name: &str,
    ) -> Result<()> {
        let owner = self.store.owner().clone();
        let selector = component_pod_selector(component, &owner.namespace, &owner.name);
        let node_agent =
            component_pod_selector(ComponentName::NodeAgent, &owner.namespace, &owner.name);

        let (ingress, egress) = match component {
            ComponentName::NodeAgent => (
                vec![NetworkPolicyIngressRule {
                    ports: Some(vec![NetworkPolicyPort {
                        port: Some(IntOrString::Int(DEFAULT_DOGSTATSD_PORT)),
                        protocol: Some("UDP".to_string()),
                        ..Default::default()
                    }]),
                    from: None,
                }],
                vec![NetworkPolicyEgressRule {
                    ports: Some(vec![port(INTAKE_PORT)]),
                    to: None,
                }],
            ),
            ComponentName::ClusterAgent => (
                vec![
                    NetworkPolicyIngressRule {
                        ports: Some(vec![port(CLUSTER_AGENT_SERVICE_PORT)]),
                        from: Some(vec![peer(&node_agent), peer(&selector)]),
                    },
                    NetworkPolicyIngressRule {
                        ports: Some(vec![port(CLUSTER_AGENT_METRICS_PORT)]),
                        from: Some(vec![peer(&node_agent)]),
                    },
                ],
                vec![
                    NetworkPolicyEgressRule {
                        ports: Some(vec![port(INTAKE_PORT)]),
                        to: None,
                    },
                    NetworkPolicyEgressRule {
                        ports: Some(vec![port(CLUSTER_AGENT_SERVICE_PORT)]),
                        to: Some(vec![peer(&selector)]),
                    },
                ],
            ),
            ComponentName::ClusterChecksRunner => {
                let cluster_agent = component_pod_selector(
                    ComponentName::ClusterAgent,
                    &owner.namespace,
                    &owner.name,
                );
                (
                    Vec::new(),
                    vec![
                        NetworkPolicyEgressRule {
                            ports: Some(vec![port(INTAKE_PORT)]),
                            to: None,
                        },
                        NetworkPolicyEgressRule {
                            ports: Some(vec![port(CLUSTER_AGENT_SERVICE_PORT)]),
                            to: Some(vec![peer(&cluster_agent)]),
                        },
                    ],
                )
            }
        };

        self.store.add_or_update(NetworkPolicy {
            metadata: ObjectMeta {
                name: Some(policy_name.to_string()),
                namespace: Some(owner.namespace.clone()),
                ..Default::default()
            },
            spec: Some(NetworkPolicySpec {
                pod_selector: selector,
                policy_types: Some(vec!["Ingress".to_string(), "Egress".to_string()]),
                ingress: Some(ingress),
                egress: Some(egress),
            }),
            ..Default::default()
        })
    }

    /// 生成组件的 CiliumNetworkPolicy
    pub fn build_cilium_policy(
        &mut self,
        component: ComponentName,
        policy_name: &str,
        site: &str,
        dns_selector_endpoints: &[LabelSelector],
    ) -> Result<()> {
        let owner = self.store.owner().clone();
        let selector = serde_json::to_value(component_pod_selector(
            component,
            &owner.namespace,
            &owner.name,
        ))?;
        let dns_endpoints = if dns_selector_endpoints.is_empty() {
            json!([{"matchLabels": {"k8s:io.kubernetes.pod.namespace": "kube-system", "k8s:k8s-app": "kube-dns"}}])
        } else {
            serde_json::to_value(dns_selector_endpoints)?
        };

        let mut specs: Vec<Value> = vec![
            json!({
                "description": "Egress to DNS",
                "endpointSelector": selector,
                "egress": [{
                    "toEndpoints": dns_endpoints,
                    "toPorts": [{
                        "ports": [{"port": "53", "protocol": "ANY"}],
                        "rules": {"dns": [{"matchPattern": "*"}]}
                    }]
                }]
            }),
            json!({
                "description": "Egress to Datadog intake",
                "endpointSelector": selector,
                "egress": [{
                    "toFQDNs": [{"matchPattern": format!("*-intake.{}", site)}, {"matchPattern": format!("*.{}", site)}],
                    "toPorts": [{"ports": [{"port": "443", "protocol": "TCP"}]}]
                }]
            }),
        ];
        match component {
            ComponentName::NodeAgent => specs.push(json!({
                "description": "Ingress for DogStatsD",
                "endpointSelector": selector,
                "ingress": [{
                    "fromEndpoints": [{}],
                    "toPorts": [{"ports": [{"port": DEFAULT_DOGSTATSD_PORT.to_string(), "protocol": "UDP"}]}]
                }]
            })),
            ComponentName::ClusterAgent => specs.push(json!({
                "description": "Egress to Kube API Server",
                "endpointSelector": selector,
                "egress": [{
                    "toEntities": ["kube-apiserver"],
                    "toPorts": [{"ports": [{"port": "443", "protocol": "TCP"}]}]
                }]
            })),
            ComponentName::ClusterChecksRunner => {
                let cluster_agent = serde_json::to_value(component_pod_selector(
                    ComponentName::ClusterAgent,
                    &owner.namespace,
                    &owner.name,
                ))?;
                specs.push(json!({
                    "description": "Egress to Cluster Agent",
                    "endpointSelector": selector,
                    "egress": [{
                        "toEndpoints": [cluster_agent],
                        "toPorts": [{"ports": [{"port": CLUSTER_AGENT_SERVICE_PORT.to_string(), "protocol": "TCP"}]}]
                    }]
                }))
            }
        }

        let policy = DynamicObject::new(policy_name, &cilium_api_resource())
            .within(&owner.namespace)
            .data(json!({ "specs": specs }));
        self.store.add_or_update(StoreObject::CiliumNetworkPolicy(policy))
    }
}
