//! ConfigMap 管理器

use k8s_openapi::api::core::v1::ConfigMap;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use std::collections::BTreeMap;

use super::Store;
use datadog_common::Result;

pub struct ConfigMapManager<'a> {
    store: &'a mut Store,
}

impl<'a> ConfigMapManager<'a> {
    pub(super) fn new(store: &'a mut Store) -> Self {
        Self { store }
    }

    /// 写入 ConfigMap，同名对象整体替换
    pub fn add_config_map(
        &mut self,
        namespace: &str,
        name: &str,
        data: BTreeMap<String, String>,
        annotations: BTreeMap<String, String>,
    ) -> Result<()> {
        self.store.add_or_update(ConfigMap {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some(namespace.to_string()),
                annotations: if annotations.is_empty() {
                    None
                } else {
                    Some(annotations)
                },
                ..Default::default()
            },
            data: Some(data),
            ..Default::default()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{test_owner, ObjectKind, StoreObject};

    #[test]
    fn test_add_config_map_replaces_data() {
        let mut store = Store::new(test_owner());
        let mut manager = ConfigMapManager::new(&mut store);
        manager
            .add_config_map(
                "monitoring",
                "cm",
                BTreeMap::from([("a".to_string(), "1".to_string())]),
                BTreeMap::new(),
            )
            .unwrap();
        manager
            .add_config_map(
                "monitoring",
                "cm",
                BTreeMap::from([("b".to_string(), "2".to_string())]),
                BTreeMap::new(),
            )
            .unwrap();

        match store.get(ObjectKind::ConfigMap, "monitoring", "cm") {
            Some(StoreObject::ConfigMap(cm)) => {
                let data = cm.data.as_ref().unwrap();
                assert_eq!(data.len(), 1);
                assert!(data.contains_key("b"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}
