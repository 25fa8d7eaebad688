//! 环境变量管理器

use k8s_openapi::api::core::v1::{
    Container, EnvFromSource, EnvVar, EnvVarSource, ObjectFieldSelector, SecretKeySelector,
};

use super::PodTemplateManagers;
use datadog_common::ContainerName;

/// 插入或替换环境变量，替换时保留原位置
pub(crate) fn upsert_env(container: &mut Container, env: EnvVar) {
    let envs = container.env.get_or_insert_with(Vec::new);
    match envs.iter_mut().find(|e| e.name == env.name) {
        Some(existing) => *existing = env,
        None => envs.push(env),
    }
}

/// 以字面值构造环境变量
pub fn env(name: impl Into<String>, value: impl Into<String>) -> EnvVar {
    EnvVar {
        name: name.into(),
        value: Some(value.into()),
        value_from: None,
    }
}

/// 取值来自 Pod 字段，例如 `status.podIP`
pub fn env_from_field(name: impl Into<String>, field_path: &str) -> EnvVar {
    EnvVar {
        name: name.into(),
        value: None,
        value_from: Some(EnvVarSource {
            field_ref: Some(ObjectFieldSelector {
                field_path: field_path.to_string(),
                api_version: None,
            }),
            ..Default::default()
        }),
    }
}

/// 取值来自 Secret 中的某个键
pub fn env_from_secret(name: impl Into<String>, secret: &str, key: &str) -> EnvVar {
    EnvVar {
        name: name.into(),
        value: None,
        value_from: Some(EnvVarSource {
            secret_key_ref: Some(SecretKeySelector {
                name: Some(secret.to_string()),
                key: key.to_string(),
                optional: None,
            }),
            ..Default::default()
        }),
    }
}

/// 环境变量管理器，键为 (容器, 变量名)
pub struct EnvVarManager<'a> {
    managers: &'a mut PodTemplateManagers,
}

impl<'a> EnvVarManager<'a> {
    pub(super) fn new(managers: &'a mut PodTemplateManagers) -> Self {
        Self { managers }
    }

    /// 写入全部容器桶，在 finalize 时展开
    pub fn add_env_var(&mut self, env: EnvVar) {
        let bucket = &mut self.managers.global_env;
        match bucket.iter_mut().find(|e| e.name == env.name) {
            Some(existing) => *existing = env,
            None => bucket.push(env),
        }
    }

    /// 写入指定容器（含同名 init 容器），立即生效
    pub fn add_env_var_to_container(&mut self, container: ContainerName, env: EnvVar) {
        self.add_env_var_to_named_container(container.as_str(), env);
    }

    pub fn add_env_var_to_containers(&mut self, containers: &[ContainerName], env: EnvVar) {
        for container in containers {
            self.add_env_var_to_container(*container, env.clone());
        }
    }

    /// 立即写入模板中现有的每个容器，优先级与单容器写入相同
    pub fn add_env_var_to_every_container(&mut self, env: EnvVar) {
        let names: Vec<String> = self
            .managers
            .all_containers_mut()
            .map(|c| c.name.clone())
            .collect();
        for name in names {
            self.add_env_var_to_named_container(&name, env.clone());
        }
    }

    fn add_env_var_to_named_container(&mut self, name: &str, env: EnvVar) {
        self.managers
            .explicit_env
            .insert((name.to_string(), env.name.clone()));
        for container in self.managers.containers_named_mut(name) {
            upsert_env(container, env.clone());
        }
    }
}

/// envFrom 管理器，按引用的 ConfigMap/Secret 名称去重
pub struct EnvFromManager<'a> {
    managers: &'a mut PodTemplateManagers,
}

impl<'a> EnvFromManager<'a> {
    pub(super) fn new(managers: &'a mut PodTemplateManagers) -> Self {
        Self { managers }
    }

    pub fn add_env_from_to_container(&mut self, container: ContainerName, source: EnvFromSource) {
        for c in self.managers.containers_named_mut(container.as_str()) {
            upsert_env_from(c, source.clone());
        }
    }

    pub fn add_env_from_to_every_container(&mut self, source: EnvFromSource) {
        for c in self.managers.all_containers_mut() {
            upsert_env_from(c, source.clone());
        }
    }
}

fn env_from_key(source: &EnvFromSource) -> (Option<String>, Option<String>, Option<String>) {
    (
        source.config_map_ref.as_ref().and_then(|r| r.name.clone()),
        source.secret_ref.as_ref().and_then(|r| r.name.clone()),
        source.prefix.clone(),
    )
}

fn upsert_env_from(container: &mut Container, source: EnvFromSource) {
    let sources = container.env_from.get_or_insert_with(Vec::new);
    let key = env_from_key(&source);
    match sources.iter_mut().find(|s| env_from_key(s) == key) {
        Some(existing) => *existing = source,
        None => sources.push(source),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::merger::test_utils::*;
    use k8s_openapi::api::core::v1::SecretEnvSource;

    #[test]
    fn test_same_name_replaces_value_in_place() {
        let mut managers = PodTemplateManagers::new(template_with(&[ContainerName::CoreAgent], &[]));
        managers
            .env_var()
            .add_env_var_to_container(ContainerName::CoreAgent, env("A", "1"));
        managers
            .env_var()
            .add_env_var_to_container(ContainerName::CoreAgent, env("B", "2"));
        managers
            .env_var()
            .add_env_var_to_container(ContainerName::CoreAgent, env("A", "3"));

        let template = managers.finalize();
        let envs = template.spec.unwrap().containers[0].env.clone().unwrap();
        assert_eq!(envs.len(), 2);
        assert_eq!(envs[0].name, "A");
        assert_eq!(envs[0].value.as_deref(), Some("3"));
    }

    #[test]
    fn test_per_container_wins_over_all_bucket_in_any_order() {
        let mut managers = PodTemplateManagers::new(template_with(
            &[ContainerName::CoreAgent, ContainerName::TraceAgent],
            &[],
        ));
        managers.env_var().add_env_var(env("DD_LOG_LEVEL", "info"));
        managers
            .env_var()
            .add_env_var_to_container(ContainerName::CoreAgent, env("DD_LOG_LEVEL", "debug"));
        managers
            .env_var()
            .add_env_var_to_container(ContainerName::TraceAgent, env("DD_SITE", "eu"));
        managers.env_var().add_env_var(env("DD_SITE", "us"));

        let template = managers.finalize();
        assert_eq!(
            env_value(&template, ContainerName::CoreAgent, "DD_LOG_LEVEL").as_deref(),
            Some("debug")
        );
        assert_eq!(
            env_value(&template, ContainerName::TraceAgent, "DD_LOG_LEVEL").as_deref(),
            Some("info")
        );
        assert_eq!(
            env_value(&template, ContainerName::TraceAgent, "DD_SITE").as_deref(),
            Some("eu")
        );
        assert_eq!(
            env_value(&template, ContainerName::CoreAgent, "DD_SITE").as_deref(),
            Some("us")
        );
    }

    #[test]
    fn test_all_bucket_reaches_init_containers() {
        let mut managers = PodTemplateManagers::new(template_with(
            &[ContainerName::CoreAgent],
            &[ContainerName::InitConfig],
        ));
        managers.env_var().add_env_var(env("DD_SITE", "datadoghq.com"));
        let template = managers.finalize();
        assert_eq!(
            env_value(&template, ContainerName::InitConfig, "DD_SITE").as_deref(),
            Some("datadoghq.com")
        );
    }

    #[test]
    fn test_env_from_deduplicated_by_reference() {
        let mut managers = PodTemplateManagers::new(template_with(&[ContainerName::CoreAgent], &[]));
        let source = EnvFromSource {
            secret_ref: Some(SecretEnvSource {
                name: Some("extra".to_string()),
                optional: None,
            }),
            ..Default::default()
        };
        managers.env_from().add_env_from_to_every_container(source.clone());
        managers
            .env_from()
            .add_env_from_to_container(ContainerName::CoreAgent, source);

        let template = managers.finalize();
        assert_eq!(template.spec.unwrap().containers[0].env_from.as_ref().unwrap().len(), 1);
    }
}
