//! SBOM 采集特性
//!
//! 远程配置可分别覆盖总开关、容器镜像扫描与主机扫描的开关。

use super::{
    bool_to_string, overlay_enabled, remote_features, Feature, FeatureId, Options,
    RequiredComponent, RequiredComponents,
};
use crate::constants::{
    DD_HOST_ROOT, DD_SBOM_CONTAINER_IMAGE_ANALYZERS, DD_SBOM_CONTAINER_IMAGE_ENABLED,
    DD_SBOM_ENABLED, DD_SBOM_HOST_ANALYZERS, DD_SBOM_HOST_ENABLED, HOST_ROOT_HOST_PATH,
    HOST_ROOT_MOUNT_PATH, HOST_ROOT_VOLUME_NAME,
};
use crate::crd::DatadogAgent;
use crate::merger::{env, host_path_volume, PodTemplateManagers};
use datadog_common::{bool_value, ContainerName, Result, SbomFeatureConfig, SbomTargetConfig};

#[derive(Debug, Default)]
struct SbomFeature {
    container_image_enabled: bool,
    container_image_analyzers: Vec<String>,
    host_enabled: bool,
    host_analyzers: Vec<String>,
}

pub(super) fn build(_options: &Options) -> Box<dyn Feature> {
    Box::<SbomFeature>::default()
}

/// 远程配置中非空的开关逐项覆盖规格
fn merge_remote(spec: Option<SbomFeatureConfig>, remote: Option<&SbomFeatureConfig>) -> SbomFeatureConfig {
    let mut merged = spec.unwrap_or_default();
    let Some(remote) = remote else {
        return merged;
    };
    merged.enabled = overlay_enabled(merged.enabled, remote.enabled);

    let overlay_target = |target: &mut Option<SbomTargetConfig>, remote: Option<&SbomTargetConfig>| {
        if let Some(enabled) = remote.and_then(|r| r.enabled) {
            target.get_or_insert_with(SbomTargetConfig::default).enabled = Some(enabled);
        }
    };
    overlay_target(&mut merged.container_image, remote.container_image.as_ref());
    overlay_target(&mut merged.host, remote.host.as_ref());
    merged
}

impl SbomFeature {
    fn configure_agent(&self, managers: &mut PodTemplateManagers, container: ContainerName) {
        let mut envs = managers.env_var();
        envs.add_env_var_to_container(container, env(DD_SBOM_ENABLED, "true"));
        envs.add_env_var_to_container(
            container,
            env(
                DD_SBOM_CONTAINER_IMAGE_ENABLED,
                bool_to_string(self.container_image_enabled),
            ),
        );
        if !self.container_image_analyzers.is_empty() {
            envs.add_env_var_to_container(
                container,
                env(
                    DD_SBOM_CONTAINER_IMAGE_ANALYZERS,
                    self.container_image_analyzers.join(" "),
                ),
            );
        }
        envs.add_env_var_to_container(
            container,
            env(DD_SBOM_HOST_ENABLED, bool_to_string(self.host_enabled)),
        );
        if !self.host_analyzers.is_empty() {
            envs.add_env_var_to_container(
                container,
                env(DD_SBOM_HOST_ANALYZERS, self.host_analyzers.join(" ")),
            );
        }

        if self.host_enabled {
            envs.add_env_var_to_container(container, env(DD_HOST_ROOT, HOST_ROOT_MOUNT_PATH));
            let (volume, volume_mount) = host_path_volume(
                HOST_ROOT_VOLUME_NAME,
                HOST_ROOT_HOST_PATH,
                HOST_ROOT_MOUNT_PATH,
                true,
            );
            managers.volume().add_volume(volume);
            managers
                .volume_mount()
                .add_volume_mount_to_container(volume_mount, container);
        }
    }
}

impl Feature for SbomFeature {
    fn id(&self) -> FeatureId {
        FeatureId::Sbom
    }

    fn configure(&mut self, dda: &DatadogAgent) -> RequiredComponents {
        let config = merge_remote(
            dda.features().sbom,
            remote_features(dda).and_then(|f| f.sbom.as_ref()),
        );
        if !bool_value(config.enabled) {
            return RequiredComponents::default();
        }

        if let Some(image) = config.container_image.filter(|c| bool_value(c.enabled)) {
            self.container_image_enabled = true;
            self.container_image_analyzers = image.analyzers;
        }
        if let Some(host) = config.host.filter(|c| bool_value(c.enabled)) {
            self.host_enabled = true;
            self.host_analyzers = host.analyzers;
        }

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
