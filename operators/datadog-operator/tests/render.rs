//! 渲染流水线与状态计算的集成测试

use chrono::{TimeZone, Utc};
use k8s_openapi::api::apps::v1::{DaemonSet, DaemonSetStatus as K8sDaemonSetStatus};
use k8s_openapi::api::core::v1::{EnvVar, PodTemplateSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, Time};
use rstest::rstest;
use std::collections::BTreeMap;

use datadog_common::{
    AgentState, ApmFeatureConfig, ClusterChecksFeatureConfig, ComponentName, ContainerName,
    DaemonSetStatus, DatadogAgentComponentOverride, DatadogAgentGenericContainer,
    DatadogCredentials, DatadogFeatures, EnabledConfig, GlobalConfig, LogCollectionFeatureConfig,
};
use datadog_operator::constants::MD5_AGENT_DEPLOYMENT_ANNOTATION_KEY;
use datadog_operator::crd::{DatadogAgent, DatadogAgentSpec};
use datadog_operator::feature::{Options, RequiredComponent, RequiredComponents};
use datadog_operator::render;
use datadog_operator::status::{
    combine_daemonset_statuses, compute_status, AgentWorkload, ObservedWorkloads,
    ReconcileOutcome,
};
use datadog_operator::store::{Deletion, ObjectKind, StoreObject};

fn agent(features: DatadogFeatures) -> DatadogAgent {
    let mut dda = DatadogAgent::new(
        "datadog",
        DatadogAgentSpec {
            features: Some(features),
            global: Some(GlobalConfig {
                credentials: Some(DatadogCredentials {
                    api_key: Some("0123456789abcdef".to_string()),
                    ..Default::default()
                }),
                cluster_agent_token: Some("0123456789abcdef0123456789abcdef".to_string()),
                ..Default::default()
            }),
            ..Default::default()
        },
    );
    dda.metadata.namespace = Some("monitoring".to_string());
    dda.metadata.uid = Some("uid-1".to_string());
    dda
}

fn template_of(object: &StoreObject) -> PodTemplateSpec {
    match object {
        StoreObject::DaemonSet(ds) => ds.spec.clone().unwrap().template,
        StoreObject::Deployment(d) => d.spec.clone().unwrap().template,
        other => panic!("不是工作负载: {:?}", other.kind()),
    }
}

fn container_env(template: &PodTemplateSpec, container: &str, name: &str) -> Option<String> {
    template
        .spec
        .as_ref()?
        .containers
        .iter()
        .find(|c| c.name == container)?
        .env
        .as_ref()?
        .iter()
        .find(|e| e.name == name)
        .and_then(|e| e.value.clone())
}

fn container_names(template: &PodTemplateSpec) -> Vec<String> {
    template
        .spec
        .as_ref()
        .map(|spec| spec.containers.iter().map(|c| c.name.clone()).collect())
        .unwrap_or_default()
}

#[test_log::test]
fn test_apm_and_logs_configure_node_agent() {
    let dda = agent(DatadogFeatures {
        apm: Some(ApmFeatureConfig {
            enabled: Some(true),
            ..Default::default()
        }),
        log_collection: Some(LogCollectionFeatureConfig {
            enabled: Some(true),
            ..Default::default()
        }),
        ..Default::default()
    });
    let output = render(&dda, &Options::default()).unwrap();

    assert!(output
        .required
        .agent
        .containers
        .contains(&ContainerName::TraceAgent));
    let ds = output
        .store
        .get(ObjectKind::DaemonSet, "monitoring", "datadog-agent")
        .unwrap();
    let template = template_of(ds);
    let names = container_names(&template);
    assert!(names.contains(&"agent".to_string()));
    assert!(names.contains(&"trace-agent".to_string()));
    assert_eq!(
        container_env(&template, "agent", "DD_LOGS_ENABLED").as_deref(),
        Some("true")
    );
    assert_eq!(
        container_env(&template, "trace-agent", "DD_APM_ENABLED").as_deref(),
        Some("true")
    );
}

#[test_log::test]
fn test_container_override_wins_over_feature() {
    let mut dda = agent(DatadogFeatures {
        log_collection: Some(LogCollectionFeatureConfig {
            enabled: Some(true),
            ..Default::default()
        }),
        ..Default::default()
    });
    dda.spec.override_.insert(
        ComponentName::NodeAgent,
        DatadogAgentComponentOverride {
            containers: BTreeMap::from([(
                ContainerName::CoreAgent,
                DatadogAgentGenericContainer {
                    env: vec![EnvVar {
                        name: "DD_LOGS_ENABLED".to_string(),
                        value: Some("false".to_string()),
                        value_from: None,
                    }],
                    ..Default::default()
                },
            )]),
            ..Default::default()
        },
    );
    let output = render(&dda, &Options::default()).unwrap();
    let template = template_of(
        output
            .store
            .get(ObjectKind::DaemonSet, "monitoring", "datadog-agent")
            .unwrap(),
    );

    assert_eq!(
        container_env(&template, "agent", "DD_LOGS_ENABLED").as_deref(),
        Some("false")
    );
}

#[test_log::test]
fn test_cluster_checks_runners_get_a_deployment() {
    let dda = agent(DatadogFeatures {
        cluster_checks: Some(ClusterChecksFeatureConfig {
            enabled: Some(true),
            use_cluster_checks_runners: Some(true),
        }),
        ..Default::default()
    });
    let output = render(&dda, &Options::default()).unwrap();

    assert!(output.required.cluster_checks_runner.is_enabled());
    let runner = output
        .store
        .get(
            ObjectKind::Deployment,
            "monitoring",
            "datadog-cluster-checks-runner",
        )
        .unwrap();
    let template = template_of(runner);
    assert_eq!(
        container_env(&template, "cluster-checks-runner", "DD_CLC_RUNNER_ENABLED").as_deref(),
        Some("true")
    );
    let cluster_agent = template_of(
        output
            .store
            .get(ObjectKind::Deployment, "monitoring", "datadog-cluster-agent")
            .unwrap(),
    );
    assert_eq!(
        container_env(&cluster_agent, "cluster-agent", "DD_CLUSTER_CHECKS_ENABLED").as_deref(),
        Some("true")
    );
}

#[test_log::test]
fn test_enabling_a_feature_keeps_existing_requirements() {
    let base = DatadogFeatures {
        apm: Some(ApmFeatureConfig {
            enabled: Some(true),
            ..Default::default()
        }),
        ..Default::default()
    };
    let mut extended = base.clone();
    extended.oom_kill = Some(EnabledConfig {
        enabled: Some(true),
    });

    let before = render(&agent(base), &Options::default()).unwrap().required;
    let after = render(&agent(extended), &Options::default())
        .unwrap()
        .required;

    for component in ComponentName::ALL {
        if before.get(component).is_enabled() {
            assert!(after.get(component).is_enabled());
        }
        for container in &before.get(component).containers {
            assert!(after.get(component).containers.contains(container));
        }
    }
}

#[test_log::test]
fn test_rendering_twice_keeps_spec_hashes() {
    let dda = agent(DatadogFeatures::default());
    let hashes = |options: &Options| -> Vec<Option<String>> {
        let output = render(&dda, options).unwrap();
        output
            .store
            .objects()
            .filter(|o| matches!(o.kind(), ObjectKind::DaemonSet | ObjectKind::Deployment))
            .map(|o| {
                o.metadata()
                    .annotations
                    .as_ref()
                    .and_then(|a| a.get(MD5_AGENT_DEPLOYMENT_ANNOTATION_KEY).cloned())
            })
            .collect()
    };
    let first = hashes(&Options::default());
    assert!(first.iter().all(Option::is_some));
    assert_eq!(first, hashes(&Options::default()));
}

#[test_log::test]
fn test_disabled_node_agent_is_deleted() {
    let mut dda = agent(DatadogFeatures::default());
    dda.spec.override_.insert(
        ComponentName::NodeAgent,
        DatadogAgentComponentOverride {
            disabled: Some(true),
            ..Default::default()
        },
    );
    let output = render(&dda, &Options::default()).unwrap();

    assert!(output
        .store
        .get(ObjectKind::DaemonSet, "monitoring", "datadog-agent")
        .is_none());
    assert!(output.store.deletions().any(|d| matches!(
        d,
        Deletion::Object(key) if key.kind == ObjectKind::DaemonSet && key.name == "datadog-agent"
    )));
}

#[rstest]
#[case(&[(AgentState::Running, 3, 3), (AgentState::Failed, 2, 0)], AgentState::Failed, 5, 3)]
#[case(&[(AgentState::Running, 3, 3), (AgentState::Updating, 2, 1)], AgentState::Updating, 5, 4)]
#[case(&[(AgentState::Running, 1, 1), (AgentState::Running, 1, 1)], AgentState::Running, 2, 2)]
fn test_combined_agent_status(
    #[case] shards: &[(AgentState, i32, i32)],
    #[case] state: AgentState,
    #[case] desired: i32,
    #[case] ready: i32,
) {
    let shards: Vec<_> = shards
        .iter()
        .enumerate()
        .map(|(i, (state, desired, ready))| DaemonSetStatus {
            desired: *desired,
            ready: *ready,
            up_to_date: *desired,
            state: Some(*state),
            daemonset_name: format!("shard-{}", i),
            ..Default::default()
        })
        .collect();
    let combined = combine_daemonset_statuses(&shards).unwrap();

    assert_eq!(combined.state, Some(state));
    assert_eq!(combined.desired, desired);
    assert_eq!(combined.ready, ready);
}

#[test_log::test]
fn test_status_after_reconcile() {
    let now = Time(Utc.timestamp_opt(1_700_000_000, 0).unwrap());
    let ds = DaemonSet {
        metadata: ObjectMeta {
            name: Some("datadog-agent".to_string()),
            ..Default::default()
        },
        status: Some(K8sDaemonSetStatus {
            desired_number_scheduled: 3,
            current_number_scheduled: 3,
            number_ready: 0,
            updated_number_scheduled: Some(3),
            ..Default::default()
        }),
        ..Default::default()
    };
    let outcome = ReconcileOutcome {
        required: RequiredComponents {
            agent: RequiredComponent::required(&[ContainerName::CoreAgent]),
            ..Default::default()
        },
        agent_name: "datadog-agent".to_string(),
        error: None,
        generated_token: None,
    };
    let observed = ObservedWorkloads {
        agent: Some(AgentWorkload::DaemonSet(ds)),
        ..Default::default()
    };
    let status = compute_status(None, &observed, &outcome, &now);

    let agent = status.agent.unwrap();
    assert_eq!(agent.state, Some(AgentState::Progressing));
    assert_eq!(agent.status, "Progressing (3/0/3)");
    assert_eq!(status.conditions.len(), 1);
    assert_eq!(status.conditions[0].type_, "AgentReconcile");
    assert_eq!(status.conditions[0].status, "True");
}
