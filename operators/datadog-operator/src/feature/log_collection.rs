//! 日志采集特性

use super::{Feature, FeatureId, Options, RequiredComponent, RequiredComponents};
use crate::constants::{
    CONTAINER_LOG_VOLUME_NAME, CONTAINER_LOG_VOLUME_PATH, DD_LOGS_CONTAINER_COLLECT_ALL,
    DD_LOGS_CONTAINER_USE_FILE, DD_LOGS_ENABLED, DD_LOGS_OPEN_FILES_LIMIT, POD_LOG_VOLUME_NAME,
    POD_LOG_VOLUME_PATH, POINTER_VOLUME_NAME, POINTER_VOLUME_PATH, SYMLINK_CONTAINER_VOLUME_NAME,
    SYMLINK_CONTAINER_VOLUME_PATH,
};
use crate::crd::DatadogAgent;
use crate::merger::{env, host_path_volume, PodTemplateManagers};
use datadog_common::{bool_value, ContainerName, Result};

/// 日志位置指针在主机上的默认目录
const DEFAULT_TEMP_STORAGE_PATH: &str = "/var/lib/datadog-agent/logs";

#[derive(Debug, Default)]
struct LogCollectionFeature {
    container_collect_all: bool,
    container_collect_using_files: bool,
    container_logs_path: String,
    pod_logs_path: String,
    container_symlinks_path: String,
    temp_storage_path: String,
    open_files_limit: Option<i32>,
}

pub(super) fn build(_options: &Options) -> Box<dyn Feature> {
    Box::<LogCollectionFeature>::default()
}

impl LogCollectionFeature {
    fn configure_agent(&self, managers: &mut PodTemplateManagers, container: ContainerName) {
        let volumes = [
            (POINTER_VOLUME_NAME, self.temp_storage_path.as_str(), POINTER_VOLUME_PATH, false),
            (POD_LOG_VOLUME_NAME, self.pod_logs_path.as_str(), POD_LOG_VOLUME_PATH, true),
            (
                CONTAINER_LOG_VOLUME_NAME,
                self.container_logs_path.as_str(),
                CONTAINER_LOG_VOLUME_PATH,
                true,
            ),
            (
                SYMLINK_CONTAINER_VOLUME_NAME,
                self.container_symlinks_path.as_str(),
                SYMLINK_CONTAINER_VOLUME_PATH,
                true,
            ),
        ];
        for (name, host, path, read_only) in volumes {
            let (volume, mount) = host_path_volume(name, host, path, read_only);
            managers.volume().add_volume(volume);
            managers.volume_mount().add_volume_mount_to_container(mount, container);
        }

        let mut envs = managers.env_var();
        envs.add_env_var_to_container(container, env(DD_LOGS_ENABLED, "true"));
        envs.add_env_var_to_container(
            container,
            env(DD_LOGS_CONTAINER_COLLECT_ALL, self.container_collect_all.to_string()),
        );
        envs.add_env_var_to_container(
            container,
            env(
                DD_LOGS_CONTAINER_USE_FILE,
                self.container_collect_using_files.to_string(),
            ),
        );
        if let Some(limit) = self.open_files_limit.filter(|l| *l != 0) {
            envs.add_env_var_to_container(container, env(DD_LOGS_OPEN_FILES_LIMIT, limit.to_string()));
        }
    }
}

impl Feature for LogCollectionFeature {
    fn id(&self) -> FeatureId {
        FeatureId::LogCollection
    }

    fn configure(&mut self, dda: &DatadogAgent) -> RequiredComponents {
        let features = dda.features();
        let Some(config) = features.log_collection.filter(|c| bool_value(c.enabled)) else {
            return RequiredComponents::default();
        };

        self.container_collect_all = bool_value(config.container_collect_all);
        // 未设置时默认通过文件采集
        self.container_collect_using_files = config.container_collect_using_files.unwrap_or(true);
        self.container_logs_path = config
            .container_logs_path
            .unwrap_or_else(|| CONTAINER_LOG_VOLUME_PATH.to_string());
        self.pod_logs_path = config
            .pod_logs_path
            .unwrap_or_else(|| POD_LOG_VOLUME_PATH.to_string());
        self.container_symlinks_path = config
            .container_symlinks_path
            .unwrap_or_else(|| SYMLINK_CONTAINER_VOLUME_PATH.to_string());
        self.temp_storage_path = config
            .temp_storage_path
            .unwrap_or_else(|| DEFAULT_TEMP_STORAGE_PATH.to_string());
        self.open_files_limit = config.open_files_limit;

        RequiredComponents {
            agent: RequiredComponent::required(&[ContainerName::CoreAgent]),
            ..Default::default()
        }
    }

    fn manage_node_agent(&self, managers: &mut PodTemplateManagers, _provider: &str) -> Result<()> {
        self.configure_agent(managers, ContainerName::CoreAgent);
        Ok(())
    }

    fn manage_single_container_node_agent(
        &self,
        managers: &mut PodTemplateManagers,
        _provider: &str,
    ) -> Result<()> {
        self.configure_agent(managers, ContainerName::UnprivilegedSingleAgent);
        Ok(())
    }
}
