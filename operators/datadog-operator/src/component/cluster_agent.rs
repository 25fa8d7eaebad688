//! Cluster Agent 默认模板

use k8s_openapi::api::core::v1::{
    Affinity, Container, PodAffinityTerm, PodAntiAffinity, PodSpec, SecurityContext,
    WeightedPodAffinityTerm,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use std::collections::BTreeMap;

use super::{command, default_image, health_probes, install_info_volume};
use crate::constants::{
    AUTH_TOKEN_FILE_PATH, AUTH_VOLUME_NAME, AUTH_VOLUME_PATH, CERTIFICATES_VOLUME_NAME,
    CERTIFICATES_VOLUME_PATH, CLUSTER_AGENT_IMAGE_NAME, CLUSTER_AGENT_LATEST_VERSION,
    COMPONENT_LABEL_KEY, DD_AUTH_TOKEN_FILE_PATH, DD_CLUSTER_AGENT_KUBE_SERVICE_NAME,
    DD_HEALTH_PORT, DD_KUBE_RESOURCES_NAMESPACE, DD_LEADER_ELECTION, DD_POD_NAME,
    DEFAULT_AGENT_HEALTH_PORT, EXTRA_CONFD_VOLUME_NAME, EXTRA_CONFD_VOLUME_PATH,
    LOGS_VOLUME_NAME, LOGS_VOLUME_PATH, TMP_VOLUME_NAME, TMP_VOLUME_PATH,
};
use crate::crd::DatadogAgent;
use crate::feature::{Options, CLUSTER_AGENT_SERVICE_PORT};
use crate::merger::{container_port, empty_dir_volume, env, env_from_field};
use datadog_common::{ComponentName, ContainerName};

/// 同一节点上尽量只调度一个副本
pub(super) fn spread_across_nodes(component: ComponentName) -> Affinity {
    Affinity {
        pod_anti_affinity: Some(PodAntiAffinity {
            preferred_during_scheduling_ignored_during_execution: Some(vec![
                WeightedPodAffinityTerm {
                    weight: 50,
                    pod_affinity_term: PodAffinityTerm {
                        label_selector: Some(LabelSelector {
                            match_labels: Some(BTreeMap::from([(
                                COMPONENT_LABEL_KEY.to_string(),
                                component.resource_suffix().to_string(),
                            )])),
                            match_expressions: None,
                        }),
                        topology_key: "kubernetes.io/hostname".to_string(),
                        ..Default::default()
                    },
                },
            ]),
            required_during_scheduling_ignored_during_execution: None,
        }),
        ..Default::default()
    }
}

pub(super) fn default_pod_spec(dda: &DatadogAgent, options: &Options) -> PodSpec {
    let volumes = [
        install_info_volume(dda),
        empty_dir_volume(EXTRA_CONFD_VOLUME_NAME, EXTRA_CONFD_VOLUME_PATH, true),
        empty_dir_volume(LOGS_VOLUME_NAME, LOGS_VOLUME_PATH, false),
        empty_dir_volume(CERTIFICATES_VOLUME_NAME, CERTIFICATES_VOLUME_PATH, false),
        empty_dir_volume(AUTH_VOLUME_NAME, AUTH_VOLUME_PATH, false),
        empty_dir_volume(TMP_VOLUME_NAME, TMP_VOLUME_PATH, false),
    ];
    let (liveness, readiness, startup) = health_probes();

    let container = Container {
        name: ContainerName::ClusterAgent.as_str().to_string(),
        image: Some(default_image(
            options,
            CLUSTER_AGENT_IMAGE_NAME,
            CLUSTER_AGENT_LATEST_VERSION,
        )),
        command: command(&["datadog-cluster-agent", "start"]),
        ports: Some(vec![container_port(
            "agentport",
            CLUSTER_AGENT_SERVICE_PORT,
            "TCP",
        )]),
        env: Some(vec![
            env(DD_AUTH_TOKEN_FILE_PATH, AUTH_TOKEN_FILE_PATH),
            env_from_field(DD_POD_NAME, "metadata.name"),
            env(
                DD_CLUSTER_AGENT_KUBE_SERVICE_NAME,
                dda.rbac_resource_name(ComponentName::ClusterAgent),
            ),
            env(DD_LEADER_ELECTION, "true"),
            env(DD_HEALTH_PORT, DEFAULT_AGENT_HEALTH_PORT.to_string()),
            env(DD_KUBE_RESOURCES_NAMESPACE, dda.namespace_or_default()),
        ]),
        volume_mounts: Some(volumes.iter().map(|(_, m)| m.clone()).collect()),
        liveness_probe: Some(liveness),
        readiness_probe: Some(readiness),
        startup_probe: Some(startup),
        security_context: Some(SecurityContext {
            read_only_root_filesystem: Some(true),
            allow_privilege_escalation: Some(false),
            ..Default::default()
        }),
        ..Default::default()
    };

    PodSpec {
        service_account_name: Some(dda.service_account_name(ComponentName::ClusterAgent)),
        affinity: Some(spread_across_nodes(ComponentName::ClusterAgent)),
        containers: vec![container],
        volumes: Some(volumes.into_iter().map(|(v, _)| v).collect()),
        ..Default::default()
    }
}
