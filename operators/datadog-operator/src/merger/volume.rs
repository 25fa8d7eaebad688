//! 卷与挂载管理器
//!
//! 卷以名称为键，挂载以 (容器, 名称 + 挂载路径) 为键，重复写入时替换。

use k8s_openapi::api::core::v1::{
    ConfigMapVolumeSource, Container, EmptyDirVolumeSource, HostPathVolumeSource, KeyToPath,
    Volume, VolumeMount,
};

use super::PodTemplateManagers;
use datadog_common::ContainerName;

/// 卷管理器
pub struct VolumeManager<'a> {
    managers: &'a mut PodTemplateManagers,
}

impl<'a> VolumeManager<'a> {
    pub(super) fn new(managers: &'a mut PodTemplateManagers) -> Self {
        Self { managers }
    }

    /// 插入或替换同名卷
    pub fn add_volume(&mut self, volume: Volume) {
        let volumes = self.managers.pod_spec_mut().volumes.get_or_insert_with(Vec::new);
        match volumes.iter_mut().find(|v| v.name == volume.name) {
            Some(existing) => *existing = volume,
            None => volumes.push(volume),
        }
    }

    /// 删除同名卷，返回是否存在
    pub fn remove_volume(&mut self, name: &str) -> bool {
        match self.managers.pod_spec_mut().volumes.as_mut() {
            Some(volumes) => {
                let before = volumes.len();
                volumes.retain(|v| v.name != name);
                before != volumes.len()
            }
            None => false,
        }
    }
}

/// 挂载管理器
pub struct VolumeMountManager<'a> {
    managers: &'a mut PodTemplateManagers,
}

impl<'a> VolumeMountManager<'a> {
    pub(super) fn new(managers: &'a mut PodTemplateManagers) -> Self {
        Self { managers }
    }

    pub fn add_volume_mount_to_container(&mut self, mount: VolumeMount, container: ContainerName) {
        for c in self.managers.containers_named_mut(container.as_str()) {
            upsert_mount(c, mount.clone());
        }
    }

    pub fn add_volume_mount_to_containers(
        &mut self,
        mount: VolumeMount,
        containers: &[ContainerName],
    ) {
        for container in containers {
            self.add_volume_mount_to_container(mount.clone(), *container);
        }
    }

    /// 挂载到模板中现有的每个普通容器
    pub fn add_volume_mount_to_every_container(&mut self, mount: VolumeMount) {
        let spec = self.managers.pod_spec_mut();
        for c in spec.containers.iter_mut() {
            upsert_mount(c, mount.clone());
        }
    }

    /// 删除容器中引用某个卷的全部挂载
    pub fn remove_volume_mounts_by_name(&mut self, container: ContainerName, volume: &str) {
        for c in self.managers.containers_named_mut(container.as_str()) {
            if let Some(mounts) = c.volume_mounts.as_mut() {
                mounts.retain(|m| m.name != volume);
            }
        }
    }
}

pub(crate) fn upsert_mount(container: &mut Container, mount: VolumeMount) {
    let mounts = container.volume_mounts.get_or_insert_with(Vec::new);
    match mounts
        .iter_mut()
        .find(|m| m.name == mount.name && m.mount_path == mount.mount_path)
    {
        Some(existing) => *existing = mount,
        None => mounts.push(mount),
    }
}

/// 单个卷挂载
pub fn mount(name: &str, mount_path: &str, read_only: bool) -> VolumeMount {
    VolumeMount {
        name: name.to_string(),
        mount_path: mount_path.to_string(),
        read_only: Some(read_only),
        ..Default::default()
    }
}

/// 主机路径卷及其挂载
pub fn host_path_volume(
    name: &str,
    host_path: &str,
    mount_path: &str,
    read_only: bool,
) -> (Volume, VolumeMount) {
    let volume = Volume {
        name: name.to_string(),
        host_path: Some(HostPathVolumeSource {
            path: host_path.to_string(),
            type_: None,
        }),
        ..Default::default()
    };
    (volume, mount(name, mount_path, read_only))
}

/// emptyDir 卷及其挂载
pub fn empty_dir_volume(name: &str, mount_path: &str, read_only: bool) -> (Volume, VolumeMount) {
    let volume = Volume {
        name: name.to_string(),
        empty_dir: Some(EmptyDirVolumeSource::default()),
        ..Default::default()
    };
    (volume, mount(name, mount_path, read_only))
}

/// ConfigMap 卷及其挂载；`items` 为空时挂载全部键
pub fn config_map_volume(
    name: &str,
    config_map: &str,
    items: Vec<KeyToPath>,
    mount_path: &str,
) -> (Volume, VolumeMount) {
    let volume = Volume {
        name: name.to_string(),
        config_map: Some(ConfigMapVolumeSource {
            name: Some(config_map.to_string()),
            items: if items.is_empty() { None } else { Some(items) },
            ..Default::default()
        }),
        ..Default::default()
    };
    (volume, mount(name, mount_path, true))
}
