//! Secret 管理器

use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use std::collections::BTreeMap;

use super::{ObjectKind, Store, StoreObject};
use datadog_common::Result;

pub struct SecretManager<'a> {
    store: &'a mut Store,
}

impl<'a> SecretManager<'a> {
    pub(super) fn new(store: &'a mut Store) -> Self {
        Self { store }
    }

    /// 向 Secret 写入一个键，Secret 不存在时创建
    pub fn add_secret(&mut self, namespace: &str, name: &str, key: &str, value: &str) -> Result<()> {
        let mut secret = match self.store.get(ObjectKind::Secret, namespace, name) {
            Some(StoreObject::Secret(existing)) => existing.clone(),
            _ => Secret {
                metadata: ObjectMeta {
                    name: Some(name.to_string()),
                    namespace: Some(namespace.to_string()),
                    ..Default::default()
                },
                type_: Some("Opaque".to_string()),
                ..Default::default()
            },
        };
        secret
            .string_data
            .get_or_insert_with(BTreeMap::new)
            .insert(key.to_string(), value.to_string());
        self.store.add_or_update(secret)
    }

    /// 合并注解到已存在的 Secret
    pub fn add_annotations(
        &mut self,
        namespace: &str,
        name: &str,
        annotations: BTreeMap<String, String>,
    ) {
        if let Some(StoreObject::Secret(secret)) =
            self.store.get_mut(ObjectKind::Secret, namespace, name)
        {
            secret
                .metadata
                .annotations
                .get_or_insert_with(BTreeMap::new)
                .extend(annotations);
        }
    }
}
