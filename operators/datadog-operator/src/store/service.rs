//! Service 管理器

use k8s_openapi::api::core::v1::{Service, ServicePort, ServiceSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;

use super::{component_labels, component_pod_selector, Store};
use datadog_common::{ComponentName, Result};

pub struct ServiceManager<'a> {
    store: &'a mut Store,
}

/// TCP 服务端口
pub fn service_port(name: &str, port: i32, target_port: i32) -> ServicePort {
    ServicePort {
        name: Some(name.to_string()),
        port,
        target_port: Some(IntOrString::Int(target_port)),
        protocol: Some("TCP".to_string()),
        ..Default::default()
    }
}

impl<'a> ServiceManager<'a> {
    pub(super) fn new(store: &'a mut Store) -> Self {
        Self { store }
    }

    /// 选中某组件 Pod 的 Service，位于属主所在命名空间
    pub fn add_component_service(
        &mut self,
        name: &str,
        component: ComponentName,
        ports: Vec<ServicePort>,
    ) -> Result<()> {
        let owner = self.store.owner();
        let namespace = owner.namespace.clone();
        let selector = component_pod_selector(component, &owner.namespace, &owner.name);
        let mut labels = component_labels(component);
        labels.extend(selector.match_labels.clone().unwrap_or_default());

        self.store.add_or_update(Service {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some(namespace),
                labels: Some(labels),
                ..Default::default()
            },
            spec: Some(ServiceSpec {
                selector: selector.match_labels,
                ports: Some(ports),
                ..Default::default()
            }),
            ..Default::default()
        })
    }
}
