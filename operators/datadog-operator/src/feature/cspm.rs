//! 云安全态势管理特性
//!
//! 节点上由 security-agent 执行主机基准，Cluster Agent 执行集群级基准。

use k8s_openapi::api::rbac::v1::PolicyRule;

use super::custom_config::FeatureCustomConfig;
use super::{Feature, FeatureId, Options, RequiredComponent, RequiredComponents};
use crate::constants::{
    CGROUPS_HOST_PATH, CGROUPS_MOUNT_PATH, CGROUPS_VOLUME_NAME, DD_COMPLIANCE_ENABLED,
    DD_COMPLIANCE_HOST_BENCHMARKS, DD_HOST_ROOT, GROUP_HOST_PATH, GROUP_MOUNT_PATH,
    GROUP_VOLUME_NAME, HOST_ROOT_HOST_PATH, HOST_ROOT_MOUNT_PATH, HOST_ROOT_VOLUME_NAME,
    PASSWD_HOST_PATH, PASSWD_MOUNT_PATH, PASSWD_VOLUME_NAME, PROCDIR_HOST_PATH,
    PROCDIR_MOUNT_PATH, PROCDIR_VOLUME_NAME, SECURITY_AGENT_COMPLIANCE_CONFIG_DIR_VOLUME_NAME,
    SECURITY_AGENT_COMPLIANCE_CONFIG_DIR_VOLUME_PATH,
};
use crate::crd::DatadogAgent;
use crate::merger::{empty_dir_volume, env, host_path_volume, mount, PodTemplateManagers};
use crate::store::{policy_rule, ResourceManagers};
use datadog_common::error::aggregate;
use datadog_common::{bool_value, ComponentName, ContainerName, Result};

const CSPM_BENCHMARKS_SUFFIX: &str = "cspm-benchmarks";
const CSPM_BENCHMARK_FILE_NAME: &str = "custom-benchmarks.yaml";
const CSPM_CONFIG_VOLUME_NAME: &str = "customcompliancebenchmarks";

/// Cluster Agent 执行集群基准需要读取的资源
fn cspm_cluster_rules() -> Vec<PolicyRule> {
    vec![
        policy_rule(&[""], &["namespaces", "serviceaccounts"], &["list"]),
        policy_rule(&["policy"], &["podsecuritypolicies"], &["get", "list", "watch"]),
        policy_rule(
            &["rbac.authorization.k8s.io"],
            &["clusterrolebindings", "rolebindings"],
            &["list"],
        ),
        policy_rule(&["networking.k8s.io"], &["networkpolicies"], &["list"]),
    ]
}

#[derive(Debug, Default)]
struct CspmFeature {
    host_benchmarks: bool,
    custom_benchmarks: Option<FeatureCustomConfig>,
    cluster_role_name: String,
    cluster_agent_service_account: String,
}

pub(super) fn build(_options: &Options) -> Box<dyn Feature> {
    Box::<CspmFeature>::default()
}

impl Feature for CspmFeature {
    fn id(&self) -> FeatureId {
        FeatureId::Cspm
    }

    fn configure(&mut self, dda: &DatadogAgent) -> RequiredComponents {
        let features = dda.features();
        let Some(config) = features.cspm.filter(|c| bool_value(c.enabled)) else {
            return RequiredComponents::default();
        };

        self.host_benchmarks = config
            .host_benchmarks
            .as_ref()
            .map_or(false, |c| bool_value(c.enabled));
        self.custom_benchmarks = config.custom_benchmarks.as_ref().map(|custom| {
            FeatureCustomConfig::new(dda, custom, FeatureId::Cspm, CSPM_BENCHMARKS_SUFFIX)
        });
        self.cluster_role_name = dda.child_name("cspm-cluster-agent");
        self.cluster_agent_service_account = dda.service_account_name(ComponentName::ClusterAgent);

        RequiredComponents {
            agent: RequiredComponent::required(&[
                ContainerName::CoreAgent,
                ContainerName::SecurityAgent,
            ]),
            cluster_agent: RequiredComponent::required(&[ContainerName::ClusterAgent]),
            ..Default::default()
        }
    }

    fn manage_dependencies(
        &self,
        managers: &mut ResourceManagers,
        _components: &RequiredComponents,
    ) -> Result<()> {
        let mut errors = Vec::new();
        if let Some(custom) = &self.custom_benchmarks {
            if let Err(e) = custom.manage_dependencies(managers, CSPM_BENCHMARK_FILE_NAME) {
                errors.push(e);
            }
        }
        if let Err(e) = managers.rbac().add_cluster_policy_rules_by_component(
            &self.cluster_role_name,
            &self.cluster_agent_service_account,
            cspm_cluster_rules(),
            Some(ComponentName::ClusterAgent),
        ) {
            errors.push(e);
        }
        aggregate(errors)
    }

    fn manage_cluster_agent(&self, managers: &mut PodTemplateManagers) -> Result<()> {
        managers.env_var().add_env_var_to_container(
            ContainerName::ClusterAgent,
            env(DD_COMPLIANCE_ENABLED, "true"),
        );
        if let Some(custom) = &self.custom_benchmarks {
            custom.add_checksum_annotation(managers);
            managers
                .volume()
                .add_volume(custom.volume(CSPM_CONFIG_VOLUME_NAME, CSPM_BENCHMARK_FILE_NAME));
            managers.volume_mount().add_volume_mount_to_container(
                mount(
                    CSPM_CONFIG_VOLUME_NAME,
                    SECURITY_AGENT_COMPLIANCE_CONFIG_DIR_VOLUME_PATH,
                    true,
                ),
                ContainerName::ClusterAgent,
            );
        }
        Ok(())
    }

    fn manage_node_agent(&self, managers: &mut PodTemplateManagers, _provider: &str) -> Result<()> {
        let container = ContainerName::SecurityAgent;
        let mut envs = managers.env_var();
        envs.add_env_var_to_container(container, env(DD_COMPLIANCE_ENABLED, "true"));
        envs.add_env_var_to_container(container, env(DD_HOST_ROOT, HOST_ROOT_MOUNT_PATH));
        if self.host_benchmarks {
            envs.add_env_var_to_container(container, env(DD_COMPLIANCE_HOST_BENCHMARKS, "true"));
        }

        match &self.custom_benchmarks {
            Some(custom) => {
                custom.add_checksum_annotation(managers);
                managers.volume().add_volume(custom.volume(
                    SECURITY_AGENT_COMPLIANCE_CONFIG_DIR_VOLUME_NAME,
                    CSPM_BENCHMARK_FILE_NAME,
                ));
                managers.volume_mount().add_volume_mount_to_container(
                    mount(
                        SECURITY_AGENT_COMPLIANCE_CONFIG_DIR_VOLUME_NAME,
                        SECURITY_AGENT_COMPLIANCE_CONFIG_DIR_VOLUME_PATH,
                        true,
                    ),
                    container,
                );
            }
            None => {
                let (volume, volume_mount) = empty_dir_volume(
                    SECURITY_AGENT_COMPLIANCE_CONFIG_DIR_VOLUME_NAME,
                    SECURITY_AGENT_COMPLIANCE_CONFIG_DIR_VOLUME_PATH,
                    true,
                );
                managers.volume().add_volume(volume);
                managers
                    .volume_mount()
                    .add_volume_mount_to_container(volume_mount, container);
            }
        }

        for (name, host, path) in [
            (CGROUPS_VOLUME_NAME, CGROUPS_HOST_PATH, CGROUPS_MOUNT_PATH),
            (PASSWD_VOLUME_NAME, PASSWD_HOST_PATH, PASSWD_MOUNT_PATH),
            (PROCDIR_VOLUME_NAME, PROCDIR_HOST_PATH, PROCDIR_MOUNT_PATH),
            (HOST_ROOT_VOLUME_NAME, HOST_ROOT_HOST_PATH, HOST_ROOT_MOUNT_PATH),
            (GROUP_VOLUME_NAME, GROUP_HOST_PATH, GROUP_MOUNT_PATH),
        ] {
            let (volume, volume_mount) = host_path_volume(name, host, path, true);
            managers.volume().add_volume(volume);
            managers
                .volume_mount()
                .add_volume_mount_to_container(volume_mount, container);
        }
        Ok(())
    }
}
