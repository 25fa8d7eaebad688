//! 渲染流水线
//!
//! 把一个 DatadogAgent 编译为一组待应用与待删除的对象，不访问集群。顺序固定：
//! 构建特性与组件需求，生成全局与特性附属资源，然后逐个组件依次应用默认模板、
//! 特性、全局设置与覆盖配置，最后处理覆盖配置带来的附属资源。

use kube::{Resource, ResourceExt};
use tracing::{debug, error, info};

use crate::component::{build_workload, default_pod_template};
use crate::crd::DatadogAgent;
use crate::feature::{build_features, Feature, Options, RequiredComponents};
use crate::global::{apply_global_settings, global_dependencies};
use crate::merger::PodTemplateManagers;
use crate::overrides::{apply_component_override, apply_disabled_overrides, override_dependencies};
use crate::store::{ObjectKind, ResourceManagers, Store, StoreObject, StoreOwner};
use datadog_common::error::aggregate;
use datadog_common::{ComponentName, Result};

/// 特性渲染节点 Agent 时使用的平台标识
pub const DEFAULT_PROVIDER: &str = "default";

/// 一次渲染的结果
#[derive(Debug, Clone)]
pub struct RenderOutput {
    pub store: Store,
    pub required: RequiredComponents,
    /// 本次生成或沿用的 Cluster Agent 令牌，需要写回状态
    pub generated_token: Option<String>,
}

/// 特性需求叠加覆盖配置中的禁用与容器策略后的最终组件需求
pub fn required_components(
    dda: &DatadogAgent,
    options: &Options,
) -> (Vec<Box<dyn Feature>>, RequiredComponents) {
    let (features, mut required) = build_features(dda, options);
    apply_disabled_overrides(dda, &mut required);
    if let Some(strategy) = dda.global().container_strategy {
        required.agent.apply_container_strategy(strategy);
    }
    (features, required)
}

fn store_owner(dda: &DatadogAgent) -> StoreOwner {
    StoreOwner {
        name: dda.name_any(),
        namespace: dda.namespace_or_default(),
        owner_reference: dda.controller_owner_ref(&()),
    }
}

/// 渲染单个组件的工作负载
fn render_component(
    dda: &DatadogAgent,
    component: ComponentName,
    features: &[Box<dyn Feature>],
    required: &RequiredComponents,
    options: &Options,
) -> Result<StoreObject> {
    let template = default_pod_template(dda, component, required, options);
    let mut managers = PodTemplateManagers::new(template);
    let single = required.agent.single_container_strategy_enabled();

    for feature in features {
        let result = match component {
            ComponentName::NodeAgent if single => {
                feature.manage_single_container_node_agent(&mut managers, DEFAULT_PROVIDER)
            }
            ComponentName::NodeAgent => feature.manage_node_agent(&mut managers, DEFAULT_PROVIDER),
            ComponentName::ClusterAgent => feature.manage_cluster_agent(&mut managers),
            ComponentName::ClusterChecksRunner => feature.manage_cluster_checks_runner(&mut managers),
        };
        if let Err(e) = result {
            error!("特性 {} 渲染 {} 失败: {}", feature.id(), component, e);
            return Err(e);
        }
    }

    apply_global_settings(&mut managers, dda, component, required, options)?;
    if let Some(config) = dda.component_override(component) {
        apply_component_override(&mut managers, dda, component, config)?;
    }
    build_workload(dda, component, managers.finalize(), options)
}

/// 组件使用的工作负载类型
fn workload_kind(component: ComponentName, options: &Options) -> ObjectKind {
    match component {
        ComponentName::NodeAgent if options.support_extended_daemonset => {
            ObjectKind::ExtendedDaemonSet
        }
        ComponentName::NodeAgent => ObjectKind::DaemonSet,
        ComponentName::ClusterAgent | ComponentName::ClusterChecksRunner => ObjectKind::Deployment,
    }
}

/// 渲染 DatadogAgent
///
/// 配置错误与附属资源错误在写入任何工作负载之前返回；组件渲染中的任何错误都会
/// 使整次渲染失败，不会产出部分应用的模板。
pub fn render(dda: &DatadogAgent, options: &Options) -> Result<RenderOutput> {
    let dda = dda.with_defaults();
    let (features, required) = required_components(&dda, options);
    info!(
        "{}/{} 启用 {} 个特性",
        dda.namespace_or_default(),
        dda.name_any(),
        features.len()
    );

    let mut resources = ResourceManagers::new(store_owner(&dda));
    let generated_token = global_dependencies(&dda, &mut resources, &required)?;

    let mut errors = Vec::new();
    for feature in &features {
        if let Err(e) = feature.manage_dependencies(&mut resources, &required) {
            error!("特性 {} 附属资源失败: {}", feature.id(), e);
            errors.push(e);
        }
    }
    aggregate(errors)?;

    for component in ComponentName::ALL {
        let kind = workload_kind(component, options);
        if !required.get(component).is_enabled() {
            debug!("组件 {} 不需要，删除其工作负载", component);
            resources.store_mut().delete(
                kind,
                &dda.namespace_or_default(),
                &dda.component_resource_name(component),
            );
            continue;
        }
        let workload = render_component(&dda, component, &features, &required, options)?;
        resources.store_mut().add_or_update(workload)?;
    }

    override_dependencies(&dda, &mut resources, &required)?;

    Ok(RenderOutput {
        store: resources.into_store(),
        required,
        generated_token,
    })
}
