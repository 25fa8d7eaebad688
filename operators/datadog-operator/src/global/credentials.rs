//! 凭证与 Cluster Agent 令牌
//!
//! API/APP 密钥与令牌以 Secret 引用的方式注入容器，明文值只出现在 Operator 创建的
//! Secret 中。

use std::collections::BTreeMap;

use crate::constants::{
    checksum_annotation_key, DD_API_KEY, DD_APP_KEY, DD_CLUSTER_AGENT_AUTH_TOKEN,
    DEFAULT_API_KEY_KEY, DEFAULT_APP_KEY_KEY, DEFAULT_TOKEN_KEY,
};
use crate::crd::DatadogAgent;
use crate::merger::{env_from_secret, PodTemplateManagers};
use crate::store::ResourceManagers;
use crate::utils::generate_md5_for_spec;
use datadog_common::{Error, GlobalConfig, Result, SecretConfig};

/// 令牌 Secret 校验和注解使用的名称
const TOKEN_CHECKSUM_NAME: &str = "dca-token";
/// 生成令牌的长度
const GENERATED_TOKEN_LENGTH: usize = 32;

/// Secret 引用：(Secret 名称, 键)
type SecretRef = (String, String);

fn valid_secret(config: Option<&SecretConfig>) -> Option<SecretRef> {
    config
        .filter(|s| s.is_valid())
        .map(|s| (s.secret_name.clone(), s.key_name.clone()))
}

fn non_empty(value: Option<&String>) -> Option<&str> {
    value.map(String::as_str).filter(|v| !v.is_empty())
}

/// API 密钥所在的 Secret；没有任何来源时返回 None
fn api_key_ref(dda: &DatadogAgent, global: &GlobalConfig) -> Option<SecretRef> {
    let credentials = global.credentials.as_ref()?;
    valid_secret(credentials.api_secret.as_ref()).or_else(|| {
        non_empty(credentials.api_key.as_ref())
            .map(|_| (dda.child_name("secret"), DEFAULT_API_KEY_KEY.to_string()))
    })
}

fn app_key_ref(dda: &DatadogAgent, global: &GlobalConfig) -> Option<SecretRef> {
    let credentials = global.credentials.as_ref()?;
    valid_secret(credentials.app_secret.as_ref()).or_else(|| {
        non_empty(credentials.app_key.as_ref())
            .map(|_| (dda.child_name("secret"), DEFAULT_APP_KEY_KEY.to_string()))
    })
}

/// 令牌所在的 Secret，引用优先于 Operator 管理的 `<dda>-token`
fn token_ref(dda: &DatadogAgent, global: &GlobalConfig) -> SecretRef {
    valid_secret(global.cluster_agent_token_secret.as_ref())
        .unwrap_or_else(|| (dda.child_name("token"), DEFAULT_TOKEN_KEY.to_string()))
}

/// 渲染前的凭证校验
pub(super) fn validate(dda: &DatadogAgent, global: &GlobalConfig) -> Result<()> {
    if api_key_ref(dda, global).is_none() {
        return Err(Error::Config(
            "缺少 API 密钥：需要设置 credentials.apiKey 或 credentials.apiSecret".to_string(),
        ));
    }
    Ok(())
}

/// 注入密钥与令牌环境变量
pub(super) fn apply_credentials(
    managers: &mut PodTemplateManagers,
    dda: &DatadogAgent,
    global: &GlobalConfig,
    cluster_agent_required: bool,
) {
    let mut envs = managers.env_var();
    if let Some((secret, key)) = api_key_ref(dda, global) {
        envs.add_env_var(env_from_secret(DD_API_KEY, &secret, &key));
    }
    if let Some((secret, key)) = app_key_ref(dda, global) {
        envs.add_env_var(env_from_secret(DD_APP_KEY, &secret, &key));
    }
    if cluster_agent_required {
        let (secret, key) = token_ref(dda, global);
        envs.add_env_var(env_from_secret(DD_CLUSTER_AGENT_AUTH_TOKEN, &secret, &key));
    }
}

/// 明文令牌的校验和注解，令牌变化时 Pod 随之滚动
pub(super) fn token_checksum_annotation(global: &GlobalConfig) -> Result<Option<(String, String)>> {
    match non_empty(global.cluster_agent_token.as_ref()) {
        Some(token) => Ok(Some((
            checksum_annotation_key(TOKEN_CHECKSUM_NAME),
            generate_md5_for_spec(token)?,
        ))),
        None => Ok(None),
    }
}

/// 随机生成令牌
fn generate_token() -> String {
    let mut token = uuid::Uuid::new_v4().simple().to_string();
    token.truncate(GENERATED_TOKEN_LENGTH);
    token
}

/// 创建凭证 Secret
pub(super) fn credentials_secret(
    dda: &DatadogAgent,
    global: &GlobalConfig,
    resources: &mut ResourceManagers,
) -> Result<()> {
    let Some(credentials) = global.credentials.as_ref() else {
        return Ok(());
    };
    let namespace = dda.namespace_or_default();
    let name = dda.child_name("secret");

    if valid_secret(credentials.api_secret.as_ref()).is_none() {
        if let Some(api_key) = non_empty(credentials.api_key.as_ref()) {
            resources
                .secret()
                .add_secret(&namespace, &name, DEFAULT_API_KEY_KEY, api_key)?;
        }
    }
    if valid_secret(credentials.app_secret.as_ref()).is_none() {
        if let Some(app_key) = non_empty(credentials.app_key.as_ref()) {
            resources
                .secret()
                .add_secret(&namespace, &name, DEFAULT_APP_KEY_KEY, app_key)?;
        }
    }
    Ok(())
}

/// 创建令牌 Secret，返回需要记录到状态中的生成令牌
///
/// 明文令牌带校验和注解；引用外部 Secret 时什么都不创建。否则沿用状态中此前生成的
/// 令牌，避免每次协调都轮换。
pub(super) fn token_secret(
    dda: &DatadogAgent,
    global: &GlobalConfig,
    resources: &mut ResourceManagers,
) -> Result<Option<String>> {
    let namespace = dda.namespace_or_default();
    let name = dda.child_name("token");

    if let Some(token) = non_empty(global.cluster_agent_token.as_ref()) {
        resources
            .secret()
            .add_secret(&namespace, &name, DEFAULT_TOKEN_KEY, token)?;
        if let Some(annotation) = token_checksum_annotation(global)? {
            resources
                .secret()
                .add_annotations(&namespace, &name, BTreeMap::from([annotation]));
        }
        return Ok(None);
    }
    if valid_secret(global.cluster_agent_token_secret.as_ref()).is_some() {
        return Ok(None);
    }

    let token = dda
        .status
        .as_ref()
        .and_then(|s| s.cluster_agent.as_ref())
        .map(|s| s.generated_token.clone())
        .filter(|t| !t.is_empty())
        .unwrap_or_else(generate_token);
    resources
        .secret()
        .add_secret(&namespace, &name, DEFAULT_TOKEN_KEY, &token)?;
    Ok(Some(token))
}
