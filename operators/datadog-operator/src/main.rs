//! Datadog Operator 入口

use anyhow::{Context, Result};
use clap::Parser;
use kube::Client;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

use datadog_operator::crd::crd_yaml;
use datadog_operator::{Controller, OperatorConfig};

/// Datadog Operator：根据 DatadogAgent 资源部署与维护 Datadog Agent
#[derive(Parser, Debug)]
#[command(name = "datadog-operator", version, about, long_about = None)]
struct Cli {
    /// 配置文件路径（YAML 或 JSON）
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// 日志级别，覆盖配置文件；`RUST_LOG` 优先
    #[arg(long)]
    log_level: Option<String>,

    /// 只监听该命名空间
    #[arg(short, long)]
    namespace: Option<String>,

    /// 输出 DatadogAgent CRD 后退出
    #[arg(long)]
    print_crd: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.print_crd {
        print!("{}", crd_yaml().context("生成 CRD 失败")?);
        return Ok(());
    }

    let mut config = OperatorConfig::load(cli.config.as_deref())?;
    if let Some(level) = cli.log_level {
        config.log_level = level;
    }
    if let Some(namespace) = cli.namespace {
        config.watch_namespace = Some(namespace);
    }

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .context("日志级别无效")?;
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("启动 Datadog Operator {}", env!("CARGO_PKG_VERSION"));
    let client = Client::try_default()
        .await
        .context("创建 Kubernetes 客户端失败")?;

    Controller::new(client, config).run().await
}
