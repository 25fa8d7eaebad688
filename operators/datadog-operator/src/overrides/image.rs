//! 镜像引用的解析与合并
//!
//! 优先级从高到低：带标签的完整名称、名称加标签、仅标签、仓库默认值。

use datadog_common::AgentImageConfig;

const JMX_SUFFIX: &str = "-jmx";

/// 拆开后的镜像引用，`tag` 不含 `-jmx` 后缀
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRef {
    pub registry: Option<String>,
    pub name: String,
    pub tag: String,
    pub jmx: bool,
}

impl ImageRef {
    pub fn parse(image: &str) -> Self {
        let (registry, rest) = match image.rsplit_once('/') {
            Some((registry, rest)) => (Some(registry.to_string()), rest),
            None => (None, image),
        };
        let (name, tag) = rest.split_once(':').unwrap_or((rest, ""));
        let (tag, jmx) = match tag.strip_suffix(JMX_SUFFIX) {
            Some(base) => (base, true),
            None => (tag, false),
        };
        Self {
            registry,
            name: name.to_string(),
            tag: tag.to_string(),
            jmx,
        }
    }

    /// 名称本身是否带标签，仓库地址中的端口不算
    pub fn has_tag(name: &str) -> bool {
        name.rsplit('/').next().map_or(false, |last| last.contains(':'))
    }
}

impl std::fmt::Display for ImageRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(registry) = &self.registry {
            write!(f, "{}/", registry)?;
        }
        f.write_str(&self.name)?;
        if !self.tag.is_empty() {
            write!(f, ":{}", self.tag)?;
            if self.jmx {
                f.write_str(JMX_SUFFIX)?;
            }
        }
        Ok(())
    }
}

fn with_jmx(tag: &str, jmx: bool) -> String {
    if jmx && !tag.ends_with(JMX_SUFFIX) {
        format!("{}{}", tag, JMX_SUFFIX)
    } else {
        tag.to_string()
    }
}

/// 把覆盖配置合并进容器当前的镜像
///
/// 名称带标签时原样使用；否则只替换给出的名称与标签，`-jmx` 后缀由 `jmxEnabled` 决定。
pub fn merge_image(current: &str, image: &AgentImageConfig) -> String {
    if ImageRef::has_tag(&image.name) {
        return image.name.clone();
    }

    let mut merged = ImageRef::parse(current);
    if !image.name.is_empty() {
        match image.name.rsplit_once('/') {
            Some((registry, name)) => {
                merged.registry = Some(registry.to_string());
                merged.name = name.to_string();
            }
            None => merged.name = image.name.clone(),
        }
    }

    let tag = if image.tag.is_empty() {
        merged.tag.clone()
    } else {
        image.tag.clone()
    };
    merged.tag = with_jmx(&tag, image.jmx_enabled);
    merged.jmx = false;
    merged.to_string()
}

/// 由镜像配置拼出完整引用，缺省名称与标签取给定默认值
pub fn image_reference(
    image: &AgentImageConfig,
    registry: &str,
    default_name: &str,
    default_tag: &str,
) -> String {
    if ImageRef::has_tag(&image.name) {
        return image.name.clone();
    }
    let name = if image.name.is_empty() {
        default_name
    } else {
        image.name.as_str()
    };
    let tag = if image.tag.is_empty() {
        default_tag
    } else {
        image.tag.as_str()
    };
    let tag = with_jmx(tag, image.jmx_enabled);
    if name.contains('/') {
        format!("{}:{}", name, tag)
    } else {
        format!("{}/{}:{}", registry, name, tag)
    }
}

/// 把镜像的仓库替换为 `registry`，仅当原仓库属于 `replaceable`
pub fn with_registry(current: &str, registry: &str, replaceable: &[&str]) -> Option<String> {
    let mut parsed = ImageRef::parse(current);
    let from = parsed.registry.as_deref()?;
    if from == registry || !replaceable.contains(&from) {
        return None;
    }
    parsed.registry = Some(registry.to_string());
    Some(parsed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn config(name: &str, tag: &str, jmx: bool) -> AgentImageConfig {
        AgentImageConfig {
            name: name.to_string(),
            tag: tag.to_string(),
            jmx_enabled: jmx,
            ..Default::default()
        }
    }

    #[rstest]
    #[case("agent:7.38.0", config("custom-agent", "latest", false), "custom-agent:latest")]
    #[case(
        "someregistry.com/datadog/agent:7.38.0",
        config("agent:9.99.9", "latest", true),
        "agent:9.99.9"
    )]
    #[case(
        "someregistry.com/datadog/agent:7.38.0-jmx",
        config("", "", false),
        "someregistry.com/datadog/agent:7.38.0"
    )]
    #[case("gcr.io/datadoghq/agent:7.64.0", config("", "", true), "gcr.io/datadoghq/agent:7.64.0-jmx")]
    #[case("gcr.io/datadoghq/agent:7.64.0", config("agent", "latest-jmx", true), "gcr.io/datadoghq/agent:latest-jmx")]
    #[case("gcr.io/datadoghq/agent:7.64.0", config("custom-agent", "", false), "gcr.io/datadoghq/custom-agent:7.64.0")]
    #[case(
        "gcr.io/datadoghq/agent:7.64.0",
        config("docker.io/datadog/agent", "7.60.0", false),
        "docker.io/datadog/agent:7.60.0"
    )]
    #[case("registry:5000/agent:7.64.0", config("", "7.65.0", false), "registry:5000/agent:7.65.0")]
    fn test_merge_image(
        #[case] current: &str,
        #[case] image: AgentImageConfig,
        #[case] expected: &str,
    ) {
        assert_eq!(merge_image(current, &image), expected);
    }

    #[rstest]
    #[case(config("gcr.io/datadoghq/agent:7.64.0", "", false), "gcr.io/datadoghq", "gcr.io/datadoghq/agent:7.64.0")]
    #[case(config("agent", "7", false), "public.ecr.aws/datadog", "public.ecr.aws/datadog/agent:7")]
    #[case(
        config("docker.io/datadog/agent:7.28.1-rc.3", "latest", false),
        "gcr.io/datadoghq",
        "docker.io/datadog/agent:7.28.1-rc.3"
    )]
    #[case(config("", "", false), "gcr.io/datadoghq", "gcr.io/datadoghq/agent:7.64.0")]
    #[case(config("agent", "latest-jmx", true), "gcr.io/datadoghq", "gcr.io/datadoghq/agent:latest-jmx")]
    fn test_image_reference(
        #[case] image: AgentImageConfig,
        #[case] registry: &str,
        #[case] expected: &str,
    ) {
        assert_eq!(image_reference(&image, registry, "agent", "7.64.0"), expected);
    }

    #[test]
    fn test_with_registry_only_replaces_known_registries() {
        let known = ["gcr.io/datadoghq", "docker.io/datadog"];
        assert_eq!(
            with_registry("gcr.io/datadoghq/agent:7.64.0-jmx", "registry.example.com", &known).as_deref(),
            Some("registry.example.com/agent:7.64.0-jmx")
        );
        assert_eq!(
            with_registry("mirror.internal/agent:7.64.0", "registry.example.com", &known),
            None
        );
        assert_eq!(with_registry("agent:7.64.0", "registry.example.com", &known), None);
    }
}
