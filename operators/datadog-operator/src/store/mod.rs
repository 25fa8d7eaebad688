//! 资源存储
//!
//! 一次协调中生成的全部对象（工作负载与 ConfigMap、RBAC、网络策略等附属资源）先写入
//! [`Store`]，渲染全部成功后才由控制器统一提交到集群。存储以 (类型, 命名空间, 名称)
//! 为键，同时记录需要删除的对象。

mod config_map;
mod network_policy;
mod rbac;
mod secret;
mod service;

pub use config_map::ConfigMapManager;
pub use network_policy::{cilium_api_resource, component_pod_selector, NetworkPolicyManager};
pub use rbac::{policy_rule, RbacManager};
pub use secret::SecretManager;
pub use service::{service_port, ServiceManager};

use k8s_openapi::api::apps::v1::{DaemonSet, Deployment};
use k8s_openapi::api::core::v1::{ConfigMap, Secret, Service, ServiceAccount};
use k8s_openapi::api::networking::v1::NetworkPolicy;
use k8s_openapi::api::rbac::v1::{ClusterRole, ClusterRoleBinding, Role, RoleBinding};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};
use kube::api::DynamicObject;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::constants::{COMPONENT_LABEL_KEY, MANAGED_BY_LABEL_KEY, OPERATOR_NAME, PART_OF_LABEL_KEY};
use datadog_common::{ComponentName, Error, Result};

/// 对象类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ObjectKind {
    ConfigMap,
    Secret,
    Service,
    ServiceAccount,
    Role,
    RoleBinding,
    ClusterRole,
    ClusterRoleBinding,
    NetworkPolicy,
    CiliumNetworkPolicy,
    DaemonSet,
    ExtendedDaemonSet,
    Deployment,
}

impl ObjectKind {
    /// 集群级对象没有命名空间，也不能挂属主引用
    pub fn is_cluster_scoped(&self) -> bool {
        matches!(self, ObjectKind::ClusterRole | ObjectKind::ClusterRoleBinding)
    }

    /// RBAC 相关的类型
    pub const RBAC: [ObjectKind; 5] = [
        ObjectKind::ServiceAccount,
        ObjectKind::Role,
        ObjectKind::RoleBinding,
        ObjectKind::ClusterRole,
        ObjectKind::ClusterRoleBinding,
    ];
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// 存储键
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjectKey {
    pub kind: ObjectKind,
    /// 集群级对象为空字符串
    pub namespace: String,
    pub name: String,
}

impl ObjectKey {
    pub fn new(kind: ObjectKind, namespace: &str, name: &str) -> Self {
        let namespace = if kind.is_cluster_scoped() {
            String::new()
        } else {
            namespace.to_string()
        };
        Self {
            kind,
            namespace,
            name: name.to_string(),
        }
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.namespace.is_empty() {
            write!(f, "{} {}", self.kind, self.name)
        } else {
            write!(f, "{} {}/{}", self.kind, self.namespace, self.name)
        }
    }
}

/// 存储中的对象
#[derive(Debug, Clone, PartialEq)]
pub enum StoreObject {
    ConfigMap(ConfigMap),
    Secret(Secret),
    Service(Service),
    ServiceAccount(ServiceAccount),
    Role(Role),
    RoleBinding(RoleBinding),
    ClusterRole(ClusterRole),
    ClusterRoleBinding(ClusterRoleBinding),
    NetworkPolicy(NetworkPolicy),
    CiliumNetworkPolicy(DynamicObject),
    DaemonSet(DaemonSet),
    ExtendedDaemonSet(DynamicObject),
    Deployment(Deployment),
}

macro_rules! store_object_accessors {
    ($($variant:ident),*) => {
        impl StoreObject {
            pub fn kind(&self) -> ObjectKind {
                match self {
                    $(StoreObject::$variant(_) => ObjectKind::$variant,)*
                }
            }

            pub fn metadata(&self) -> &ObjectMeta {
                match self {
                    $(StoreObject::$variant(o) => &o.metadata,)*
                }
            }

            pub fn metadata_mut(&mut self) -> &mut ObjectMeta {
                match self {
                    $(StoreObject::$variant(o) => &mut o.metadata,)*
                }
            }
        }
    };
}

store_object_accessors!(
    ConfigMap,
    Secret,
    Service,
    ServiceAccount,
    Role,
    RoleBinding,
    ClusterRole,
    ClusterRoleBinding,
    NetworkPolicy,
    CiliumNetworkPolicy,
    DaemonSet,
    ExtendedDaemonSet,
    Deployment
);

macro_rules! impl_from_typed {
    ($($variant:ident),*) => {
        $(impl From<$variant> for StoreObject {
            fn from(o: $variant) -> Self {
                StoreObject::$variant(o)
            }
        })*
    };
}

impl_from_typed!(
    ConfigMap,
    Secret,
    Service,
    ServiceAccount,
    Role,
    RoleBinding,
    ClusterRole,
    ClusterRoleBinding,
    NetworkPolicy,
    DaemonSet,
    Deployment
);

impl StoreObject {
    pub fn name(&self) -> &str {
        self.metadata().name.as_deref().unwrap_or_default()
    }

    pub fn key(&self) -> ObjectKey {
        ObjectKey::new(
            self.kind(),
            self.metadata().namespace.as_deref().unwrap_or_default(),
            self.name(),
        )
    }
}

/// 删除请求
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum Deletion {
    /// 删除单个对象
    Object(ObjectKey),
    /// 按组件标签删除一组类型的对象
    ByComponent {
        kinds: Vec<ObjectKind>,
        namespace: String,
        component: ComponentName,
    },
}

/// 对象属主信息
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StoreOwner {
    pub name: String,
    pub namespace: String,
    pub owner_reference: Option<OwnerReference>,
}

/// 资源存储
#[derive(Debug, Clone, Default)]
pub struct Store {
    owner: StoreOwner,
    objects: BTreeMap<ObjectKey, StoreObject>,
    deletions: BTreeSet<Deletion>,
}

impl Store {
    pub fn new(owner: StoreOwner) -> Self {
        Self {
            owner,
            objects: BTreeMap::new(),
            deletions: BTreeSet::new(),
        }
    }

    pub fn owner(&self) -> &StoreOwner {
        &self.owner
    }

    /// 插入或替换对象，并补齐属主标签与属主引用
    pub fn add_or_update(&mut self, object: impl Into<StoreObject>) -> Result<()> {
        let mut object = object.into();
        if object.name().is_empty() {
            return Err(Error::Store(format!("{} 对象缺少名称", object.kind())));
        }

        let kind = object.kind();
        let owner = self.owner.clone();
        let meta = object.metadata_mut();
        if kind.is_cluster_scoped() {
            meta.namespace = None;
        } else if meta.namespace.is_none() {
            meta.namespace = Some(owner.namespace.clone());
        }
        let labels = meta.labels.get_or_insert_with(BTreeMap::new);
        labels.insert(MANAGED_BY_LABEL_KEY.to_string(), OPERATOR_NAME.to_string());
        labels.insert(
            PART_OF_LABEL_KEY.to_string(),
            format!("{}-{}", owner.namespace, owner.name),
        );
        if !kind.is_cluster_scoped() {
            if let Some(reference) = owner.owner_reference {
                meta.owner_references = Some(vec![reference]);
            }
        }

        let key = object.key();
        self.deletions.remove(&Deletion::Object(key.clone()));
        self.objects.insert(key, object);
        Ok(())
    }

    pub fn get(&self, kind: ObjectKind, namespace: &str, name: &str) -> Option<&StoreObject> {
        self.objects.get(&ObjectKey::new(kind, namespace, name))
    }

    pub fn get_mut(
        &mut self,
        kind: ObjectKind,
        namespace: &str,
        name: &str,
    ) -> Option<&mut StoreObject> {
        self.objects.get_mut(&ObjectKey::new(kind, namespace, name))
    }

    /// 从存储中移除对象，并记录为需要在集群中删除
    pub fn delete(&mut self, kind: ObjectKind, namespace: &str, name: &str) {
        let key = ObjectKey::new(kind, namespace, name);
        self.objects.remove(&key);
        self.deletions.insert(Deletion::Object(key));
    }

    /// 移除某组件的全部指定类型对象，并记录按标签删除
    pub fn delete_by_component(&mut self, component: ComponentName, kinds: &[ObjectKind]) {
        let value = component.resource_suffix();
        self.objects.retain(|key, object| {
            let labeled = object
                .metadata()
                .labels
                .as_ref()
                .and_then(|labels| labels.get(COMPONENT_LABEL_KEY))
                .map_or(false, |v| v == value);
            !(kinds.contains(&key.kind) && labeled)
        });
        self.deletions.insert(Deletion::ByComponent {
            kinds: kinds.to_vec(),
            namespace: self.owner.namespace.clone(),
            component,
        });
    }

    pub fn objects(&self) -> impl Iterator<Item = &StoreObject> {
        self.objects.values()
    }

    pub fn deletions(&self) -> impl Iterator<Item = &Deletion> {
        self.deletions.iter()
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

/// 组件标签
pub fn component_labels(component: ComponentName) -> BTreeMap<String, String> {
    BTreeMap::from([(
        COMPONENT_LABEL_KEY.to_string(),
        component.resource_suffix().to_string(),
    )])
}

/// 附属资源管理器集合，各管理器共享同一个存储
#[derive(Debug, Clone, Default)]
pub struct ResourceManagers {
    store: Store,
}

impl ResourceManagers {
    pub fn new(owner: StoreOwner) -> Self {
        Self {
            store: Store::new(owner),
        }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut Store {
        &mut self.store
    }

    pub fn into_store(self) -> Store {
        self.store
    }

    pub fn rbac(&mut self) -> RbacManager<'_> {
        RbacManager::new(&mut self.store)
    }

    pub fn config_map(&mut self) -> ConfigMapManager<'_> {
        ConfigMapManager::new(&mut self.store)
    }

    pub fn secret(&mut self) -> SecretManager<'_> {
        SecretManager::new(&mut self.store)
    }

    pub fn network_policy(&mut self) -> NetworkPolicyManager<'_> {
        NetworkPolicyManager::new(&mut self.store)
    }

    pub fn service(&mut self) -> ServiceManager<'_> {
        ServiceManager::new(&mut self.store)
    }
}

#[cfg(test)]
pub(crate) fn test_owner() -> StoreOwner {
    StoreOwner {
        name: "datadog".to_string(),
        namespace: "monitoring".to_string(),
        owner_reference: Some(OwnerReference {
            api_version: "datadoghq.com/v2alpha1".to_string(),
            kind: "DatadogAgent".to_string(),
            name: "datadog".to_string(),
            uid: "uid-1".to_string(),
            controller: Some(true),
            ..Default::default()
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_map(name: &str) -> ConfigMap {
        ConfigMap {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_add_or_update_sets_owner_metadata() {
        let mut store = Store::new(test_owner());
        store.add_or_update(config_map("cm")).unwrap();

        let stored = store.get(ObjectKind::ConfigMap, "monitoring", "cm").unwrap();
        let meta = stored.metadata();
        assert_eq!(meta.namespace.as_deref(), Some("monitoring"));
        assert_eq!(meta.owner_references.as_ref().unwrap()[0].uid, "uid-1");
        assert_eq!(
            meta.labels.as_ref().unwrap().get(MANAGED_BY_LABEL_KEY).map(String::as_str),
            Some("datadog-operator")
        );
    }

    #[test]
    fn test_cluster_scoped_objects_have_no_owner_reference() {
        let mut store = Store::new(test_owner());
        let role = ClusterRole {
            metadata: ObjectMeta {
                name: Some("role".to_string()),
                namespace: Some("monitoring".to_string()),
                ..Default::default()
            },
            ..Default::default()
        };
        store.add_or_update(role).unwrap();

        let stored = store.get(ObjectKind::ClusterRole, "", "role").unwrap();
        assert!(stored.metadata().owner_references.is_none());
        assert!(stored.metadata().namespace.is_none());
    }

    #[test]
    fn test_missing_name_is_rejected() {
        let mut store = Store::new(test_owner());
        let err = store.add_or_update(ConfigMap::default()).unwrap_err();
        assert!(matches!(err, Error::Store(_)));
    }

    #[test]
    fn test_delete_records_intent_and_re_add_cancels_it() {
        let mut store = Store::new(test_owner());
        store.add_or_update(config_map("cm")).unwrap();
        store.delete(ObjectKind::ConfigMap, "monitoring", "cm");
        assert!(store.is_empty());
        assert_eq!(store.deletions().count(), 1);

        store.add_or_update(config_map("cm")).unwrap();
        assert_eq!(store.deletions().count(), 0);
    }

    #[test]
    fn test_delete_by_component_removes_labeled_objects() {
        let mut store = Store::new(test_owner());
        let mut labeled = config_map("labeled");
        labeled.metadata.labels = Some(component_labels(ComponentName::ClusterAgent));
        let sa = ServiceAccount {
            metadata: labeled.metadata.clone(),
            ..Default::default()
        };
        store.add_or_update(sa).unwrap();
        store.add_or_update(labeled).unwrap();

        store.delete_by_component(ComponentName::ClusterAgent, &ObjectKind::RBAC);

        assert!(store
            .get(ObjectKind::ServiceAccount, "monitoring", "labeled")
            .is_none());
        assert!(store.get(ObjectKind::ConfigMap, "monitoring", "labeled").is_some());
        assert!(matches!(
            store.deletions().next(),
            Some(Deletion::ByComponent { component: ComponentName::ClusterAgent, .. })
        ));
    }
}
