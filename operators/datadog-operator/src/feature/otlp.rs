//! OTLP 接收特性
//!
//! 核心 Agent 通过 gRPC 与 HTTP 接收 OpenTelemetry 数据，端口取自监听地址并映射到主机。
//! APM 启用时 trace-agent 也需要知道同样的地址。

use once_cell::sync::Lazy;
use regex::Regex;

use super::{Feature, FeatureId, Options, RequiredComponent, RequiredComponents};
use crate::constants::{
    DD_OTLP_GRPC_ENDPOINT, DD_OTLP_HTTP_ENDPOINT, DEFAULT_OTLP_GRPC_PORT, DEFAULT_OTLP_HTTP_PORT,
};
use crate::crd::DatadogAgent;
use crate::merger::{container_port, env, PodTemplateManagers};
use datadog_common::{bool_value, ContainerName, Error, OtlpProtocolConfig, Result};

const OTLP_GRPC_PORT_NAME: &str = "otlpgrpcport";
const OTLP_HTTP_PORT_NAME: &str = "otlphttpport";

static PORT_REGEX: Lazy<std::result::Result<Regex, regex::Error>> =
    Lazy::new(|| Regex::new(r":(\d+)$"));

/// 从 `host:port` 形式的地址中取出端口
fn extract_port(endpoint: &str) -> Result<i32> {
    let regex = PORT_REGEX
        .as_ref()
        .map_err(|e| Error::Render(format!("端口正则无效: {}", e)))?;
    let captures = regex
        .captures(endpoint)
        .ok_or_else(|| Error::Render(format!("OTLP 地址 {:?} 没有显式指定端口", endpoint)))?;
    let port: i32 = captures[1]
        .parse()
        .map_err(|e| Error::Render(format!("无法解析 OTLP 地址 {:?} 中的端口: {}", endpoint, e)))?;
    if !(0..=65535).contains(&port) {
        return Err(Error::Render(format!("OTLP 端口 {} 超出范围", port)));
    }
    Ok(port)
}

/// gRPC 暂不支持 Unix 套接字
fn validate_grpc_endpoint(endpoint: &str) -> Result<()> {
    for scheme in ["unix", "unix-abstract"] {
        if endpoint.starts_with(&format!("{}:", scheme)) {
            return Err(Error::Render(format!("OTLP/gRPC 暂不支持 {:?} 协议", scheme)));
        }
    }
    Ok(())
}

#[derive(Debug, Clone)]
struct Receiver {
    env_name: &'static str,
    port_name: &'static str,
    endpoint: String,
}

#[derive(Debug, Default)]
struct OtlpFeature {
    grpc: Option<Receiver>,
    http: Option<Receiver>,
    using_apm: bool,
}

pub(super) fn build(_options: &Options) -> Box<dyn Feature> {
    Box::<OtlpFeature>::default()
}

fn receiver(
    config: Option<OtlpProtocolConfig>,
    env_name: &'static str,
    port_name: &'static str,
    default_port: i32,
) -> Option<Receiver> {
    let config = config.filter(|c| bool_value(c.enabled))?;
    Some(Receiver {
        env_name,
        port_name,
        endpoint: config
            .endpoint
            .filter(|e| !e.is_empty())
            .unwrap_or_else(|| format!("0.0.0.0:{}", default_port)),
    })
}

impl OtlpFeature {
    fn configure_agent(&self, managers: &mut PodTemplateManagers, container: ContainerName) -> Result<()> {
        if let Some(grpc) = &self.grpc {
            validate_grpc_endpoint(&grpc.endpoint)?;
        }
        for receiver in self.grpc.iter().chain(self.http.iter()) {
            let port = extract_port(&receiver.endpoint)?;
            let mut container_port = container_port(receiver.port_name, port, "TCP");
            container_port.host_port = Some(port);
            managers.port().add_port_to_container(container, container_port);

            let var = env(receiver.env_name, receiver.endpoint.clone());
            let mut envs = managers.env_var();
            envs.add_env_var_to_container(container, var.clone());
            if self.using_apm && container == ContainerName::CoreAgent {
                envs.add_env_var_to_container(ContainerName::TraceAgent, var);
            }
        }
        Ok(())
    }
}

impl Feature for OtlpFeature {
    fn id(&self) -> FeatureId {
        FeatureId::Otlp
    }

    fn configure(&mut self, dda: &DatadogAgent) -> RequiredComponents {
        let features = dda.features();
        let protocols = features.otlp.unwrap_or_default().receiver.protocols;
        self.grpc = receiver(
            protocols.grpc,
            DD_OTLP_GRPC_ENDPOINT,
            OTLP_GRPC_PORT_NAME,
            DEFAULT_OTLP_GRPC_PORT,
        );
        self.http = receiver(
            protocols.http,
            DD_OTLP_HTTP_ENDPOINT,
            OTLP_HTTP_PORT_NAME,
            DEFAULT_OTLP_HTTP_PORT,
        );
        if self.grpc.is_none() && self.http.is_none() {
            return RequiredComponents::default();
        }

        self.using_apm = features.apm.map_or(false, |apm| bool_value(apm.enabled));
        let mut containers = vec![ContainerName::CoreAgent];
        if self.using_apm {
            containers.push(ContainerName::TraceAgent);
        }
        RequiredComponents {
            agent: RequiredComponent::required(&containers),
            ..Default::default()
        }
    }

    fn manage_node_agent(&self, managers: &mut PodTemplateManagers, _provider: &str) -> Result<()> {
        self.configure_agent(managers, ContainerName::CoreAgent)
    }

    fn manage_single_container_node_agent(
        &self,
        managers: &mut PodTemplateManagers,
        _provider: &str,
    ) -> Result<()> {
        self.configure_agent(managers, ContainerName::UnprivilegedSingleAgent)
    }
}
