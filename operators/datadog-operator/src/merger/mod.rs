//! Pod 模板累加器
//!
//! 特性、全局设置与覆盖配置都通过 [`PodTemplateManagers`] 修改同一个 Pod 模板，
//! 彼此无需知道前面的步骤已经写入了什么。每个子管理器只负责一类字段，
//! 同一个键重复写入时后写者覆盖前写者，并保留原有位置。
//!
//! 写入"全部容器"桶的环境变量在 [`PodTemplateManagers::finalize`] 时才展开到每个容器，
//! 针对单个容器显式设置的同名变量不会被覆盖。

mod env_var;
mod port;
mod security_context;
mod volume;

pub use env_var::{env, env_from_field, env_from_secret, EnvFromManager, EnvVarManager};
pub use port::{container_port, PortManager};
pub use security_context::SecurityContextManager;
pub use volume::{
    config_map_volume, empty_dir_volume, host_path_volume, mount, VolumeManager, VolumeMountManager,
};

use k8s_openapi::api::core::v1::{Container, EnvVar, PodSpec, PodTemplateSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use std::collections::{BTreeMap, BTreeSet};

use datadog_common::ContainerName;

/// Pod 模板累加器
#[derive(Debug, Clone, Default)]
pub struct PodTemplateManagers {
    template: PodTemplateSpec,
    /// 作用于全部容器的环境变量
    global_env: Vec<EnvVar>,
    /// 已针对单个容器显式设置的 (容器, 变量名)
    explicit_env: BTreeSet<(String, String)>,
}

impl PodTemplateManagers {
    /// 以组件默认模板为起点创建累加器
    pub fn new(template: PodTemplateSpec) -> Self {
        Self {
            template,
            global_env: Vec::new(),
            explicit_env: BTreeSet::new(),
        }
    }

    /// 当前模板（全部容器桶尚未展开）
    pub fn template(&self) -> &PodTemplateSpec {
        &self.template
    }

    pub fn template_mut(&mut self) -> &mut PodTemplateSpec {
        &mut self.template
    }

    /// Pod 规格，不存在时创建
    pub fn pod_spec_mut(&mut self) -> &mut PodSpec {
        self.template.spec.get_or_insert_with(PodSpec::default)
    }

    fn metadata_mut(&mut self) -> &mut ObjectMeta {
        self.template.metadata.get_or_insert_with(ObjectMeta::default)
    }

    pub fn env_var(&mut self) -> EnvVarManager<'_> {
        EnvVarManager::new(self)
    }

    pub fn env_from(&mut self) -> EnvFromManager<'_> {
        EnvFromManager::new(self)
    }

    pub fn volume(&mut self) -> VolumeManager<'_> {
        VolumeManager::new(self)
    }

    pub fn volume_mount(&mut self) -> VolumeMountManager<'_> {
        VolumeMountManager::new(self)
    }

    pub fn port(&mut self) -> PortManager<'_> {
        PortManager::new(self)
    }

    pub fn security_context(&mut self) -> SecurityContextManager<'_> {
        SecurityContextManager::new(self)
    }

    /// 设置 Pod 注解，同名键覆盖
    pub fn add_annotation(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.metadata_mut()
            .annotations
            .get_or_insert_with(BTreeMap::new)
            .insert(key.into(), value.into());
    }

    /// 设置 Pod 标签，同名键覆盖
    pub fn add_label(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.metadata_mut()
            .labels
            .get_or_insert_with(BTreeMap::new)
            .insert(key.into(), value.into());
    }

    pub fn annotations(&self) -> BTreeMap<String, String> {
        self.template
            .metadata
            .as_ref()
            .and_then(|m| m.annotations.clone())
            .unwrap_or_default()
    }

    /// 模板中是否存在指定容器（含 init 容器）
    pub fn has_container(&self, name: ContainerName) -> bool {
        self.template.spec.as_ref().map_or(false, |spec| {
            spec.containers
                .iter()
                .chain(spec.init_containers.iter().flatten())
                .any(|c| c.name == name.as_str())
        })
    }

    /// 模板中的全部普通容器名称
    pub fn container_names(&self) -> Vec<String> {
        self.template
            .spec
            .as_ref()
            .map(|spec| spec.containers.iter().map(|c| c.name.clone()).collect())
            .unwrap_or_default()
    }

    /// 以名称插入或替换容器，保证重复应用的结果一致
    pub fn upsert_container(&mut self, container: Container) {
        let containers = &mut self.pod_spec_mut().containers;
        match containers.iter_mut().find(|c| c.name == container.name) {
            Some(existing) => *existing = container,
            None => containers.push(container),
        }
    }

    /// 容器改名，已显式设置的环境变量随容器一起迁移到新名称
    pub fn rename_container(&mut self, old: &str, new: &str) {
        if old == new || new.is_empty() {
            return;
        }
        for container in self.containers_named_mut(old) {
            container.name = new.to_string();
        }
        let moved: Vec<(String, String)> = self
            .explicit_env
            .iter()
            .filter(|(container, _)| container == old)
            .cloned()
            .collect();
        for (container, name) in moved {
            self.explicit_env.remove(&(container, name.clone()));
            self.explicit_env.insert((new.to_string(), name));
        }
    }

    /// 展开全部容器桶并返回最终模板
    pub fn finalize(mut self) -> PodTemplateSpec {
        let global_env = std::mem::take(&mut self.global_env);
        let explicit = std::mem::take(&mut self.explicit_env);
        if let Some(spec) = self.template.spec.as_mut() {
            let all = spec
                .containers
                .iter_mut()
                .chain(spec.init_containers.iter_mut().flatten());
            for container in all {
                for env in &global_env {
                    if explicit.contains(&(container.name.clone(), env.name.clone())) {
                        continue;
                    }
                    env_var::upsert_env(container, env.clone());
                }
            }
        }
        self.template
    }

    /// 名称匹配的全部容器（含 init 容器）
    pub(crate) fn containers_named_mut<'a>(
        &'a mut self,
        name: &'a str,
    ) -> impl Iterator<Item = &'a mut Container> + 'a {
        let spec = self.template.spec.get_or_insert_with(PodSpec::default);
        spec.containers
            .iter_mut()
            .chain(spec.init_containers.iter_mut().flatten())
            .filter(move |c| c.name == name)
    }

    /// 全部普通容器与 init 容器
    pub(crate) fn all_containers_mut(&mut self) -> impl Iterator<Item = &mut Container> {
        let spec = self.template.spec.get_or_insert_with(PodSpec::default);
        spec.containers
            .iter_mut()
            .chain(spec.init_containers.iter_mut().flatten())
    }
}

/// 按名称在容器列表中查找
pub fn find_container<'a>(spec: &'a PodSpec, name: ContainerName) -> Option<&'a Container> {
    spec.containers
        .iter()
        .chain(spec.init_containers.iter().flatten())
        .find(|c| c.name == name.as_str())
}
