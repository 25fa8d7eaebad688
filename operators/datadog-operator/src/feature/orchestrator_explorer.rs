//! 编排资源浏览特性
//!
//! Cluster Agent 以集群检查的方式采集编排对象；启用集群检查运行器时，检查改由运行器执行，
//! RBAC 也授予运行器的 ServiceAccount。

use k8s_openapi::api::core::v1::EnvVar;
use k8s_openapi::api::rbac::v1::PolicyRule;
use std::collections::BTreeMap;
use tracing::warn;

use super::{
    overlay_enabled, remote_features, Feature, FeatureId, Options, RequiredComponent,
    RequiredComponents,
};
use crate::constants::{
    checksum_annotation_key, CONFIG_VOLUME_PATH, DD_ORCHESTRATOR_EXPLORER_CONTAINER_SCRUBBING,
    DD_ORCHESTRATOR_EXPLORER_DD_URL, DD_ORCHESTRATOR_EXPLORER_ENABLED,
    DD_ORCHESTRATOR_EXPLORER_EXTRA_TAGS, EXTRA_CONFD_VOLUME_PATH,
};
use crate::crd::DatadogAgent;
use crate::merger::{config_map_volume, env, PodTemplateManagers};
use crate::store::{policy_rule, ResourceManagers};
use crate::utils::generate_md5_for_spec;
use datadog_common::{bool_value, ComponentName, ContainerName, Result};

const ORCHESTRATOR_VOLUME_NAME: &str = "orchestrator-explorer-config";
const ORCHESTRATOR_CONFIG_FILE: &str = "orchestrator.yaml";
const ORCHESTRATOR_FOLDER: &str = "orchestrator.d";

fn orchestrator_rules() -> Vec<PolicyRule> {
    let read = ["get", "list", "watch"];
    vec![
        policy_rule(
            &[""],
            &[
                "pods",
                "services",
                "nodes",
                "namespaces",
                "persistentvolumes",
                "persistentvolumeclaims",
                "serviceaccounts",
                "limitranges",
            ],
            &read,
        ),
        policy_rule(
            &["apps"],
            &["deployments", "replicasets", "daemonsets", "statefulsets"],
            &read,
        ),
        policy_rule(&["batch"], &["cronjobs", "jobs"], &read),
        policy_rule(&["networking.k8s.io"], &["ingresses", "networkpolicies"], &read),
        policy_rule(
            &["rbac.authorization.k8s.io"],
            &["roles", "rolebindings", "clusterroles", "clusterrolebindings"],
            &read,
        ),
        policy_rule(&["autoscaling"], &["horizontalpodautoscalers"], &read),
        policy_rule(&["storage.k8s.io"], &["storageclasses"], &read),
        policy_rule(&["apiextensions.k8s.io"], &["customresourcedefinitions"], &read),
    ]
}

/// 默认检查配置；在运行器上执行时不需要领导者选举
fn default_check_config(run_in_runner: bool) -> String {
    format!(
        "---\ncluster_check: {}\ninit_config:\ninstances:\n  - skip_leader_election: {}\n",
        run_in_runner, run_in_runner
    )
}

#[derive(Debug, Default)]
struct OrchestratorExplorerFeature {
    scrub_containers: bool,
    extra_tags: Vec<String>,
    dd_url: Option<String>,
    run_in_runner: bool,
    namespace: String,
    config_map_name: String,
    rbac_name: String,
    service_account: String,
    checksum: String,
}

pub(super) fn build(_options: &Options) -> Box<dyn Feature> {
    Box::<OrchestratorExplorerFeature>::default()
}

impl OrchestratorExplorerFeature {
    fn env_vars(&self) -> Vec<EnvVar> {
        let mut envs = vec![
            env(DD_ORCHESTRATOR_EXPLORER_ENABLED, "true"),
            env(
                DD_ORCHESTRATOR_EXPLORER_CONTAINER_SCRUBBING,
                self.scrub_containers.to_string(),
            ),
        ];
        if !self.extra_tags.is_empty() {
            match serde_json::to_string(&self.extra_tags) {
                Ok(tags) => envs.push(env(DD_ORCHESTRATOR_EXPLORER_EXTRA_TAGS, tags)),
                Err(e) => warn!("无法序列化编排资源附加标签: {}", e),
            }
        }
        if let Some(url) = &self.dd_url {
            envs.push(env(DD_ORCHESTRATOR_EXPLORER_DD_URL, url.clone()));
        }
        envs
    }

    fn config_data(&self) -> BTreeMap<String, String> {
        BTreeMap::from([(
            ORCHESTRATOR_CONFIG_FILE.to_string(),
            default_check_config(self.run_in_runner),
        )])
    }
}

impl Feature for OrchestratorExplorerFeature {
    fn id(&self) -> FeatureId {
        FeatureId::OrchestratorExplorer
    }

    fn configure(&mut self, dda: &DatadogAgent) -> RequiredComponents {
        let features = dda.features();
        let config = features.orchestrator_explorer.clone().unwrap_or_default();
        let remote = remote_features(dda)
            .and_then(|f| f.orchestrator_explorer.as_ref())
            .and_then(|c| c.enabled);
        if !bool_value(overlay_enabled(config.enabled, remote)) {
            return RequiredComponents::default();
        }

        self.scrub_containers = bool_value(config.scrub_containers);
        self.extra_tags = config.extra_tags;
        self.dd_url = config.dd_url.filter(|u| !u.is_empty());
        self.namespace = dda.namespace_or_default();
        self.config_map_name = dda.child_name("orchestrator-explorer-config");

        let cluster_checks = features.cluster_checks.unwrap_or_default();
        self.run_in_runner = bool_value(cluster_checks.enabled)
            && bool_value(cluster_checks.use_cluster_checks_runners);
        let component = if self.run_in_runner {
            ComponentName::ClusterChecksRunner
        } else {
            ComponentName::ClusterAgent
        };
        self.rbac_name = dda.child_name(&format!("{}-orchestrator", component.resource_suffix()));
        self.service_account = dda.service_account_name(component);
        self.checksum = match generate_md5_for_spec(&self.config_data()) {
            Ok(hash) => hash,
            Err(e) => {
                warn!("无法计算编排资源配置的校验和: {}", e);
                String::new()
            }
        };

        let mut required = RequiredComponents {
            agent: RequiredComponent::required(&[ContainerName::CoreAgent]),
            cluster_agent: RequiredComponent::required(&[ContainerName::ClusterAgent]),
            ..Default::default()
        };
        if self.run_in_runner {
            required.cluster_checks_runner =
                RequiredComponent::required(&[ContainerName::ClusterChecksRunner]);
        }
        required
    }

    fn manage_dependencies(
        &self,
        managers: &mut ResourceManagers,
        _components: &RequiredComponents,
    ) -> Result<()> {
        let mut annotations = BTreeMap::new();
        if !self.checksum.is_empty() {
            annotations.insert(
                checksum_annotation_key(FeatureId::OrchestratorExplorer.as_str()),
                self.checksum.clone(),
            );
        }
        managers.config_map().add_config_map(
            &self.namespace,
            &self.config_map_name,
            self.config_data(),
            annotations,
        )?;

        let component = if self.run_in_runner {
            ComponentName::ClusterChecksRunner
        } else {
            ComponentName::ClusterAgent
        };
        managers.rbac().add_cluster_policy_rules_by_component(
            &self.rbac_name,
            &self.service_account,
            orchestrator_rules(),
            Some(component),
        )
    }

    fn manage_cluster_agent(&self, managers: &mut PodTemplateManagers) -> Result<()> {
        let (volume, volume_mount) = config_map_volume(
            ORCHESTRATOR_VOLUME_NAME,
            &self.config_map_name,
            Vec::new(),
            &format!(
                "{}{}/{}",
                CONFIG_VOLUME_PATH, EXTRA_CONFD_VOLUME_PATH, ORCHESTRATOR_FOLDER
            ),
        );
        managers.volume().add_volume(volume);
        managers
            .volume_mount()
            .add_volume_mount_to_container(volume_mount, ContainerName::ClusterAgent);
        if !self.checksum.is_empty() {
            managers.add_annotation(
                checksum_annotation_key(FeatureId::OrchestratorExplorer.as_str()),
                self.checksum.clone(),
            );
        }

        let mut envs = managers.env_var();
        for var in self.env_vars() {
            envs.add_env_var_to_container(ContainerName::ClusterAgent, var);
        }
        Ok(())
    }

    fn manage_node_agent(&self, managers: &mut PodTemplateManagers, _provider: &str) -> Result<()> {
        let mut envs = managers.env_var();
        for var in self.env_vars() {
            envs.add_env_var_to_container(ContainerName::CoreAgent, var);
        }
        Ok(())
    }

    fn manage_single_container_node_agent(
        &self,
        managers: &mut PodTemplateManagers,
        _provider: &str,
    ) -> Result<()> {
        let mut envs = managers.env_var();
        for var in self.env_vars() {
            envs.add_env_var_to_container(ContainerName::UnprivilegedSingleAgent, var);
        }
        Ok(())
    }

    fn manage_cluster_checks_runner(&self, managers: &mut PodTemplateManagers) -> Result<()> {
        if !self.run_in_runner {
            return Ok(());
        }
        let mut envs = managers.env_var();
        for var in self.env_vars() {
            envs.add_env_var_to_container(ContainerName::ClusterChecksRunner, var);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feature::test_utils::*;
    use crate::merger::test_utils::{env_value, template_with};
    use crate::store::ObjectKind;
    use datadog_common::{
        ClusterChecksFeatureConfig, DatadogAgentStatus, DatadogFeatures,
        OrchestratorExplorerFeatureConfig, RemoteConfigConfiguration,
    };

    fn config() -> OrchestratorExplorerFeatureConfig {
        OrchestratorExplorerFeatureConfig {
            enabled: Some(true),
            scrub_containers: Some(true),
            extra_tags: vec!["a:z".to_string(), "b:y".to_string()],
            dd_url: Some("https://foo.bar".to_string()),
        }
    }

    #[test]
    fn test_orchestrator_env_on_cluster_agent() {
        let mut feature = build(&Options::default());
        let required = feature.configure(&dda_with_features(DatadogFeatures {
            orchestrator_explorer: Some(config()),
            ..Default::default()
        }));
        assert!(required.cluster_agent.is_enabled());
        assert!(!required.cluster_checks_runner.is_enabled());

        let mut managers = cluster_agent_managers();
        feature.manage_cluster_agent(&mut managers).unwrap();
        assert!(managers
            .annotations()
            .contains_key("checksum/orchestratorExplorer-custom-config"));
        let template = managers.finalize();
        let value = |name| env_value(&template, ContainerName::ClusterAgent, name);
        assert_eq!(value(DD_ORCHESTRATOR_EXPLORER_EXTRA_TAGS).as_deref(), Some(r#"["a:z","b:y"]"#));
        assert_eq!(value(DD_ORCHESTRATOR_EXPLORER_DD_URL).as_deref(), Some("https://foo.bar"));
        assert_eq!(
            value(DD_ORCHESTRATOR_EXPLORER_CONTAINER_SCRUBBING).as_deref(),
            Some("true")
        );
    }

    #[test]
    fn test_orchestrator_runs_in_cluster_checks_runner() {
        let mut feature = build(&Options::default());
        let required = feature.configure(&dda_with_features(DatadogFeatures {
            orchestrator_explorer: Some(config()),
            cluster_checks: Some(ClusterChecksFeatureConfig {
                enabled: Some(true),
                use_cluster_checks_runners: Some(true),
            }),
            ..Default::default()
        }));
        assert!(required
            .cluster_checks_runner
            .has_container(ContainerName::ClusterChecksRunner));

        let mut resources = resource_managers();
        feature.manage_dependencies(&mut resources, &required).unwrap();
        assert!(resources
            .store()
            .get(
                ObjectKind::ClusterRole,
                "",
                "datadog-cluster-checks-runner-orchestrator"
            )
            .is_some());

        let mut managers =
            PodTemplateManagers::new(template_with(&[ContainerName::ClusterChecksRunner], &[]));
        feature.manage_cluster_checks_runner(&mut managers).unwrap();
        let template = managers.finalize();
        assert_eq!(
            env_value(&template, ContainerName::ClusterChecksRunner, DD_ORCHESTRATOR_EXPLORER_ENABLED)
                .as_deref(),
            Some("true")
        );
    }

    #[test]
    fn test_remote_config_can_disable() {
        let mut dda = dda_with_features(DatadogFeatures {
            orchestrator_explorer: Some(config()),
            ..Default::default()
        });
        dda.status = Some(DatadogAgentStatus {
            remote_config_configuration: Some(RemoteConfigConfiguration {
                features: Some(DatadogFeatures {
                    orchestrator_explorer: Some(OrchestratorExplorerFeatureConfig {
                        enabled: Some(false),
                        ..Default::default()
                    }),
                    ..Default::default()
                }),
            }),
            ..Default::default()
        });
        let mut feature = build(&Options::default());
        assert!(!feature.configure(&dda).is_enabled());
    }
}
