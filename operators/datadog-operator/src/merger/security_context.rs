//! 安全上下文管理器

use k8s_openapi::api::core::v1::{Capabilities, SecurityContext};

use super::PodTemplateManagers;
use datadog_common::ContainerName;

pub struct SecurityContextManager<'a> {
    managers: &'a mut PodTemplateManagers,
}

impl<'a> SecurityContextManager<'a> {
    pub(super) fn new(managers: &'a mut PodTemplateManagers) -> Self {
        Self { managers }
    }

    /// 追加 capabilities，已存在的不重复添加
    pub fn add_capabilities_to_container(&mut self, capabilities: &[&str], container: ContainerName) {
        for c in self.managers.containers_named_mut(container.as_str()) {
            let add = c
                .security_context
                .get_or_insert_with(SecurityContext::default)
                .capabilities
                .get_or_insert_with(Capabilities::default)
                .add
                .get_or_insert_with(Vec::new);
            for capability in capabilities {
                if !add.iter().any(|existing| existing == capability) {
                    add.push(capability.to_string());
                }
            }
        }
    }

    /// 整体替换容器的安全上下文
    pub fn set_container_security_context(
        &mut self,
        container: ContainerName,
        context: SecurityContext,
    ) {
        for c in self.managers.containers_named_mut(container.as_str()) {
            c.security_context = Some(context.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::merger::test_utils::template_with;

    #[test]
    fn test_capabilities_deduplicated() {
        let mut managers =
            PodTemplateManagers::new(template_with(&[ContainerName::SystemProbe], &[]));
        managers
            .security_context()
            .add_capabilities_to_container(&["SYS_ADMIN", "NET_ADMIN"], ContainerName::SystemProbe);
        managers
            .security_context()
            .add_capabilities_to_container(&["SYS_ADMIN", "IPC_LOCK"], ContainerName::SystemProbe);

        let template = managers.finalize();
        let caps = template.spec.unwrap().containers[0]
            .security_context
            .clone()
            .unwrap()
            .capabilities
            .unwrap()
            .add
            .unwrap();
        assert_eq!(caps, vec!["SYS_ADMIN", "NET_ADMIN", "IPC_LOCK"]);
    }
}
