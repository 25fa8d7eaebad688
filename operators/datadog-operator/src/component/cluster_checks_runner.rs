//! 集群检查执行器默认模板
//!
//! 使用 Agent 镜像，只运行集群检查：DogStatsD、日志、APM 与进程采集全部关闭。

use k8s_openapi::api::core::v1::{Container, EnvVar, PodSpec};

use super::cluster_agent::spread_across_nodes;
use super::{command, default_image, health_probes, install_info_volume};
use crate::constants::{
    AGENT_IMAGE_NAME, AGENT_LATEST_VERSION, CONFIG_VOLUME_NAME, CONFIG_VOLUME_PATH,
    DD_APM_ENABLED, DD_CLUSTER_AGENT_ENABLED, DD_CLUSTER_AGENT_KUBE_SERVICE_NAME,
    DD_CONTAINER_COLLECTION_ENABLED, DD_ENABLE_METADATA_COLLECTION, DD_HEALTH_PORT, DD_HOSTNAME,
    DD_LOGS_ENABLED, DD_PROCESS_COLLECTION_ENABLED, DD_USE_DOGSTATSD, DEFAULT_AGENT_HEALTH_PORT,
    KUBERNETES_ENV, LOGS_VOLUME_NAME, LOGS_VOLUME_PATH, TMP_VOLUME_NAME, TMP_VOLUME_PATH,
};
use crate::crd::DatadogAgent;
use crate::feature::{Options, RequiredComponents};
use crate::merger::{empty_dir_volume, env, env_from_field};
use datadog_common::{ComponentName, ContainerName};

fn default_env(dda: &DatadogAgent, required: &RequiredComponents) -> Vec<EnvVar> {
    vec![
        env(
            DD_CLUSTER_AGENT_KUBE_SERVICE_NAME,
            dda.rbac_resource_name(ComponentName::ClusterAgent),
        ),
        env(
            DD_CLUSTER_AGENT_ENABLED,
            required.cluster_agent.is_enabled().to_string(),
        ),
        env(DD_HEALTH_PORT, DEFAULT_AGENT_HEALTH_PORT.to_string()),
        env(KUBERNETES_ENV, "yes"),
        env(DD_ENABLE_METADATA_COLLECTION, "false"),
        env(DD_USE_DOGSTATSD, "false"),
        env(DD_PROCESS_COLLECTION_ENABLED, "false"),
        env(DD_CONTAINER_COLLECTION_ENABLED, "true"),
        env(DD_LOGS_ENABLED, "false"),
        env(DD_APM_ENABLED, "false"),
        env_from_field(DD_HOSTNAME, "spec.nodeName"),
    ]
}

pub(super) fn default_pod_spec(
    dda: &DatadogAgent,
    required: &RequiredComponents,
    options: &Options,
) -> PodSpec {
    let volumes = [
        install_info_volume(dda),
        empty_dir_volume(CONFIG_VOLUME_NAME, CONFIG_VOLUME_PATH, false),
        empty_dir_volume(LOGS_VOLUME_NAME, LOGS_VOLUME_PATH, false),
        empty_dir_volume(TMP_VOLUME_NAME, TMP_VOLUME_PATH, false),
    ];
    let (liveness, readiness, startup) = health_probes();

    let container = Container {
        name: ContainerName::ClusterChecksRunner.as_str().to_string(),
        image: Some(default_image(options, AGENT_IMAGE_NAME, AGENT_LATEST_VERSION)),
        command: command(&["bash", "-c"]),
        args: Some(vec!["agent run".to_string()]),
        env: Some(default_env(dda, required)),
        volume_mounts: Some(volumes.iter().map(|(_, m)| m.clone()).collect()),
        liveness_probe: Some(liveness),
        readiness_probe: Some(readiness),
        startup_probe: Some(startup),
        ..Default::default()
    };

    PodSpec {
        service_account_name: Some(dda.service_account_name(ComponentName::ClusterChecksRunner)),
        affinity: Some(spread_across_nodes(ComponentName::ClusterChecksRunner)),
        containers: vec![container],
        volumes: Some(volumes.into_iter().map(|(v, _)| v).collect()),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feature::test_utils::dda_with_features;
    use crate::feature::RequiredComponent;
    use datadog_common::DatadogFeatures;

    #[test]
    fn test_runner_disables_node_level_collection() {
        let dda = dda_with_features(DatadogFeatures::default());
        let required = RequiredComponents {
            cluster_agent: RequiredComponent::required(&[ContainerName::ClusterAgent]),
            ..Default::default()
        };
        let spec = default_pod_spec(&dda, &required, &Options::default());

        let container = &spec.containers[0];
        assert_eq!(container.name, "cluster-checks-runner");
        assert_eq!(container.image.as_deref(), Some("gcr.io/datadoghq/agent:7.64.0"));
        let value = |name: &str| {
            container
                .env
                .as_ref()
                .unwrap()
                .iter()
                .find(|e| e.name == name)
                .and_then(|e| e.value.clone())
        };
        assert_eq!(value(DD_LOGS_ENABLED).as_deref(), Some("false"));
        assert_eq!(value(DD_CLUSTER_AGENT_ENABLED).as_deref(), Some("true"));
        assert!(spec.init_containers.is_none());
    }
}
