//! 资源协调模块
//!
//! 该模块负责协调 DatadogAgent 自定义资源：渲染期望对象，以服务端应用的方式提交到集群，
//! 删除不再需要的对象，最后根据读回的工作负载更新状态子资源。渲染本身不访问集群，
//! 本模块是唯一发起 API 调用的地方。

use chrono::Utc;
use k8s_openapi::api::apps::v1::{DaemonSet, Deployment};
use k8s_openapi::api::core::v1::{ConfigMap, Secret, Service, ServiceAccount};
use k8s_openapi::api::networking::v1::NetworkPolicy;
use k8s_openapi::api::rbac::v1::{ClusterRole, ClusterRoleBinding, Role, RoleBinding};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use kube::{
    api::{Api, DeleteParams, DynamicObject, ListParams, Patch, PatchParams},
    client::Client,
    runtime::controller::Action,
    ResourceExt,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::json;
use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::component::extended_daemonset_api_resource;
use crate::config::OperatorConfig;
use crate::constants::{COMPONENT_LABEL_KEY, PART_OF_LABEL_KEY};
use crate::crd::DatadogAgent;
use crate::feature::Options;
use crate::render::{render, required_components, RenderOutput};
use crate::status::{compute_status, AgentWorkload, ObservedWorkloads, ReconcileOutcome};
use crate::store::{cilium_api_resource, Deletion, ObjectKey, ObjectKind, StoreObject};
use datadog_common::{ComponentName, Error, Result};

/// 配置错误在规格变更前不会自行恢复，使用较长的重新入队间隔
pub const CONFIG_ERROR_REQUEUE: Duration = Duration::from_secs(300);

/// 协调上下文，所有协调任务共享
pub struct Context {
    /// Kubernetes 客户端
    pub client: Client,
    /// Operator 配置
    pub config: OperatorConfig,
}

impl Context {
    pub fn new(client: Client, config: OperatorConfig) -> Self {
        Self { client, config }
    }

    fn patch_params(&self) -> PatchParams {
        PatchParams::apply(&self.config.field_manager).force()
    }
}

/// 按对象类型选择对应的 API 并执行操作
macro_rules! with_api {
    ($client:expr, $kind:expr, $namespace:expr, $op:ident($($arg:expr),*)) => {
        match $kind {
            ObjectKind::ConfigMap => $op(Api::<ConfigMap>::namespaced($client, $namespace), $($arg),*).await,
            ObjectKind::Secret => $op(Api::<Secret>::namespaced($client, $namespace), $($arg),*).await,
            ObjectKind::Service => $op(Api::<Service>::namespaced($client, $namespace), $($arg),*).await,
            ObjectKind::ServiceAccount => {
                $op(Api::<ServiceAccount>::namespaced($client, $namespace), $($arg),*).await
            }
            ObjectKind::Role => $op(Api::<Role>::namespaced($client, $namespace), $($arg),*).await,
            ObjectKind::RoleBinding => {
                $op(Api::<RoleBinding>::namespaced($client, $namespace), $($arg),*).await
            }
            ObjectKind::ClusterRole => $op(Api::<ClusterRole>::all($client), $($arg),*).await,
            ObjectKind::ClusterRoleBinding => {
                $op(Api::<ClusterRoleBinding>::all($client), $($arg),*).await
            }
            ObjectKind::NetworkPolicy => {
                $op(Api::<NetworkPolicy>::namespaced($client, $namespace), $($arg),*).await
            }
            ObjectKind::CiliumNetworkPolicy => {
                $op(
                    Api::<DynamicObject>::namespaced_with($client, $namespace, &cilium_api_resource()),
                    $($arg),*
                )
                .await
            }
            ObjectKind::DaemonSet => $op(Api::<DaemonSet>::namespaced($client, $namespace), $($arg),*).await,
            ObjectKind::ExtendedDaemonSet => {
                $op(
                    Api::<DynamicObject>::namespaced_with(
                        $client,
                        $namespace,
                        &extended_daemonset_api_resource(),
                    ),
                    $($arg),*
                )
                .await
            }
            ObjectKind::Deployment => $op(Api::<Deployment>::namespaced($client, $namespace), $($arg),*).await,
        }
    };
}

fn is_not_found(error: &kube::Error) -> bool {
    matches!(error, kube::Error::Api(response) if response.code == 404)
}

async fn apply<K>(api: Api<K>, name: &str, object: &K, params: &PatchParams) -> Result<()>
where
    K: Clone + DeserializeOwned + Serialize + Debug,
{
    api.patch(name, params, &Patch::Apply(object)).await?;
    Ok(())
}

async fn delete<K>(api: Api<K>, name: &str) -> Result<()>
where
    K: Clone + DeserializeOwned + Debug,
{
    match api.delete(name, &DeleteParams::default()).await {
        Ok(_) => Ok(()),
        Err(e) if is_not_found(&e) => Ok(()),
        Err(e) => Err(e.into()),
    }
}

async fn delete_labelled<K>(api: Api<K>, selector: &str) -> Result<()>
where
    K: Clone + DeserializeOwned + Debug,
{
    let params = ListParams::default().labels(selector);
    match api.delete_collection(&DeleteParams::default(), &params).await {
        Ok(_) => Ok(()),
        // 可选 CRD 未安装
        Err(e) if is_not_found(&e) => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// 以服务端应用方式提交单个对象
async fn apply_object(ctx: &Context, object: &StoreObject) -> Result<()> {
    let client = ctx.client.clone();
    let params = ctx.patch_params();
    let name = object.name();
    let namespace = object.metadata().namespace.clone().unwrap_or_default();
    let ns = namespace.as_str();

    match object {
        StoreObject::ConfigMap(o) => apply(Api::namespaced(client, ns), name, o, &params).await,
        StoreObject::Secret(o) => apply(Api::namespaced(client, ns), name, o, &params).await,
        StoreObject::Service(o) => apply(Api::namespaced(client, ns), name, o, &params).await,
        StoreObject::ServiceAccount(o) => apply(Api::namespaced(client, ns), name, o, &params).await,
        StoreObject::Role(o) => apply(Api::namespaced(client, ns), name, o, &params).await,
        StoreObject::RoleBinding(o) => apply(Api::namespaced(client, ns), name, o, &params).await,
        StoreObject::ClusterRole(o) => apply(Api::all(client), name, o, &params).await,
        StoreObject::ClusterRoleBinding(o) => apply(Api::all(client), name, o, &params).await,
        StoreObject::NetworkPolicy(o) => apply(Api::namespaced(client, ns), name, o, &params).await,
        StoreObject::CiliumNetworkPolicy(o) => {
            let api = Api::namespaced_with(client, ns, &cilium_api_resource());
            apply(api, name, o, &params).await
        }
        StoreObject::DaemonSet(o) => apply(Api::namespaced(client, ns), name, o, &params).await,
        StoreObject::ExtendedDaemonSet(o) => {
            let api = Api::namespaced_with(client, ns, &extended_daemonset_api_resource());
            apply(api, name, o, &params).await
        }
        StoreObject::Deployment(o) => apply(Api::namespaced(client, ns), name, o, &params).await,
    }
}

async fn delete_object(ctx: &Context, key: &ObjectKey) -> Result<()> {
    let client = ctx.client.clone();
    with_api!(client, key.kind, &key.namespace, delete(&key.name))
}

/// 组件标签加属主标签
fn component_selector(dda: &DatadogAgent, component: ComponentName) -> String {
    format!(
        "{}={},{}={}-{}",
        COMPONENT_LABEL_KEY,
        component.resource_suffix(),
        PART_OF_LABEL_KEY,
        dda.namespace_or_default(),
        dda.name_any()
    )
}

async fn execute_deletion(ctx: &Context, dda: &DatadogAgent, deletion: &Deletion) -> Result<()> {
    match deletion {
        Deletion::Object(key) => {
            debug!("删除 {}", key);
            delete_object(ctx, key).await
        }
        Deletion::ByComponent {
            kinds,
            namespace,
            component,
        } => {
            let selector = component_selector(dda, *component);
            for kind in kinds {
                debug!("按标签 {} 删除 {}", selector, kind);
                let client = ctx.client.clone();
                let selector = selector.as_str();
                with_api!(client, *kind, namespace, delete_labelled(selector))?;
            }
            Ok(())
        }
    }
}

/// 提交渲染结果：先应用全部对象，再执行删除
///
/// 单个对象失败不会中断其他对象的提交，全部错误聚合后返回。
async fn commit(ctx: &Context, dda: &DatadogAgent, output: &RenderOutput) -> Result<()> {
    let mut errors = Vec::new();
    for object in output.store.objects() {
        if let Err(e) = apply_object(ctx, object).await {
            error!("应用 {} 失败: {}", object.key(), e);
            errors.push(e);
        }
    }
    for deletion in output.store.deletions() {
        if let Err(e) = execute_deletion(ctx, dda, deletion).await {
            error!("删除失败: {}", e);
            errors.push(e);
        }
    }
    datadog_common::error::aggregate(errors)
}

/// 读回各组件的工作负载
async fn observe_workloads(
    ctx: &Context,
    dda: &DatadogAgent,
    options: &Options,
) -> Result<ObservedWorkloads> {
    let namespace = dda.namespace_or_default();
    let agent_name = dda.component_resource_name(ComponentName::NodeAgent);

    let agent = if options.support_extended_daemonset {
        let api: Api<DynamicObject> = Api::namespaced_with(
            ctx.client.clone(),
            &namespace,
            &extended_daemonset_api_resource(),
        );
        api.get_opt(&agent_name)
            .await?
            .map(AgentWorkload::ExtendedDaemonSet)
    } else {
        let api: Api<DaemonSet> = Api::namespaced(ctx.client.clone(), &namespace);
        api.get_opt(&agent_name).await?.map(AgentWorkload::DaemonSet)
    };

    let deployments: Api<Deployment> = Api::namespaced(ctx.client.clone(), &namespace);
    let cluster_agent = deployments
        .get_opt(&dda.component_resource_name(ComponentName::ClusterAgent))
        .await?;
    let cluster_checks_runner = deployments
        .get_opt(&dda.component_resource_name(ComponentName::ClusterChecksRunner))
        .await?;

    Ok(ObservedWorkloads {
        agent,
        cluster_agent,
        cluster_checks_runner,
    })
}

async fn update_status(
    ctx: &Context,
    dda: &DatadogAgent,
    options: &Options,
    outcome: &ReconcileOutcome<'_>,
) -> Result<()> {
    let observed = observe_workloads(ctx, dda, options).await?;
    let status = compute_status(dda.status.as_ref(), &observed, outcome, &Time(Utc::now()));

    let mut value = serde_json::to_value(&status)?;
    // 合并补丁需要显式写出空列表才能清空旧分片
    value["agentList"] = json!(status.agent_list);
    let api: Api<DatadogAgent> = Api::namespaced(ctx.client.clone(), &dda.namespace_or_default());
    api.patch_status(
        &dda.name_any(),
        &PatchParams::default(),
        &Patch::Merge(json!({ "status": value })),
    )
    .await?;
    Ok(())
}

/// 协调 DatadogAgent 资源
pub async fn reconcile(dda: Arc<DatadogAgent>, ctx: Arc<Context>) -> Result<Action> {
    let name = dda.name_any();
    let namespace = dda.namespace_or_default();
    info!("协调 DatadogAgent {}/{}", namespace, name);

    let options = ctx.config.feature_options();
    let (required, generated_token, result) = match render(&dda, &options) {
        Ok(output) => {
            debug!(
                "{}/{} 渲染出 {} 个对象",
                namespace,
                name,
                output.store.len()
            );
            let result = commit(&ctx, &dda, &output).await;
            (output.required, output.generated_token, result)
        }
        Err(e) => {
            let (_, required) = required_components(&dda.with_defaults(), &options);
            (required, None, Err(e))
        }
    };

    let outcome = ReconcileOutcome {
        required,
        agent_name: dda.component_resource_name(ComponentName::NodeAgent),
        error: result.as_ref().err().map(ToString::to_string),
        generated_token: generated_token.as_deref(),
    };
    if let Err(e) = update_status(&ctx, &dda, &options, &outcome).await {
        warn!("更新 {}/{} 状态失败: {}", namespace, name, e);
        result?;
        return Err(e);
    }

    result?;
    info!("DatadogAgent {}/{} 协调完成", namespace, name);
    Ok(Action::requeue(ctx.config.requeue_after()))
}

/// 处理协调错误
pub fn error_policy(dda: Arc<DatadogAgent>, error: &Error, ctx: Arc<Context>) -> Action {
    error!(
        "协调 DatadogAgent {}/{} 失败: {}",
        dda.namespace_or_default(),
        dda.name_any(),
        error
    );
    requeue_for(error, &ctx.config)
}

/// 错误对应的重新入队间隔
pub fn requeue_for(error: &Error, config: &OperatorConfig) -> Action {
    if error.is_config() {
        Action::requeue(CONFIG_ERROR_REQUEUE)
    } else {
        Action::requeue(config.error_requeue())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feature::test_utils::dda_with_features;
    use datadog_common::DatadogFeatures;

    #[test]
    fn test_config_errors_use_long_requeue() {
        let config = OperatorConfig::default();
        assert_eq!(
            requeue_for(&Error::Config("缺少 API 密钥".to_string()), &config),
            Action::requeue(CONFIG_ERROR_REQUEUE)
        );
        assert_eq!(
            requeue_for(&Error::Render("失败".to_string()), &config),
            Action::requeue(Duration::from_secs(15))
        );
    }

    #[test]
    fn test_component_selector_scoped_to_owner() {
        let dda = dda_with_features(DatadogFeatures::default());
        assert_eq!(
            component_selector(&dda, ComponentName::ClusterAgent),
            "agent.datadoghq.com/component=cluster-agent,app.kubernetes.io/part-of=monitoring-datadog"
        );
    }
}
