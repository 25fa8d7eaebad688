//! 端口管理器

use k8s_openapi::api::core::v1::ContainerPort;

use super::PodTemplateManagers;
use datadog_common::ContainerName;

/// 端口管理器，有名称时以名称为键，否则以容器端口为键
pub struct PortManager<'a> {
    managers: &'a mut PodTemplateManagers,
}

impl<'a> PortManager<'a> {
    pub(super) fn new(managers: &'a mut PodTemplateManagers) -> Self {
        Self { managers }
    }

    pub fn add_port_to_container(&mut self, container: ContainerName, port: ContainerPort) {
        for c in self.managers.containers_named_mut(container.as_str()) {
            let ports = c.ports.get_or_insert_with(Vec::new);
            let existing = ports.iter_mut().find(|p| match (&p.name, &port.name) {
                (Some(a), Some(b)) => a == b,
                _ => p.container_port == port.container_port,
            });
            match existing {
                Some(existing) => *existing = port.clone(),
                None => ports.push(port.clone()),
            }
        }
    }
}

/// 构造 TCP/UDP 端口
pub fn container_port(name: &str, port: i32, protocol: &str) -> ContainerPort {
    ContainerPort {
        name: Some(name.to_string()),
        container_port: port,
        protocol: Some(protocol.to_string()),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::merger::test_utils::template_with;

    #[test]
    fn test_port_replaced_by_name() {
        let mut managers = PodTemplateManagers::new(template_with(&[ContainerName::CoreAgent], &[]));
        managers
            .port()
            .add_port_to_container(ContainerName::CoreAgent, container_port("dogstatsdport", 8125, "UDP"));
        let mut with_host = container_port("dogstatsdport", 8125, "UDP");
        with_host.host_port = Some(8125);
        managers
            .port()
            .add_port_to_container(ContainerName::CoreAgent, with_host);

        let template = managers.finalize();
        let ports = template.spec.unwrap().containers[0].ports.clone().unwrap();
        assert_eq!(ports.len(), 1);
        assert_eq!(ports[0].host_port, Some(8125));
    }
}
