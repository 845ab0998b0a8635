//! # 认证与使用者校验阶段
//!
//! 受保护路由最先执行认证阶段：取令牌、验签章、解析 provider 授权、
//! 比对 scope，并把 [`AuthContext`] 放进请求扩展；
//! 使用者阶段再校验拥有者状态并刷新 last_seen。

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{Path, Request, State};
use axum::middleware::Next;
use axum::response::Response;

use super::scope;
use super::AuthContext;
use crate::error::{ProxyError, Result};
use crate::logging::{LogComponent, LogStage};
use crate::response::RequestId;
use crate::server::AppContext;
use crate::types::ProviderName;
use crate::{ldebug, linfo};

/// 从标头取平台令牌：优先 `Authorization: Bearer`，其次 `X-API-Key`
fn read_platform_key(req: &Request) -> Option<String> {
    if let Some(auth) = req
        .headers()
        .get("Authorization")
        .and_then(|v| v.to_str().ok())
    {
        let auth = auth.trim();
        if auth.len() > 7 && auth[..7].eq_ignore_ascii_case("bearer ") {
            let token = auth[7..].trim();
            if !token.is_empty() {
                return Some(token.to_string());
            }
        }
    }
    req.headers()
        .get("X-API-Key")
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(ToString::to_string)
}

fn request_id(req: &Request) -> String {
    req.extensions()
        .get::<RequestId>()
        .map_or_else(|| "unknown".to_string(), |id| id.0.clone())
}

/// 认证阶段
pub async fn auth_middleware(
    State(ctx): State<Arc<AppContext>>,
    Path(params): Path<HashMap<String, String>>,
    mut req: Request,
    next: Next,
) -> Result<Response> {
    let rid = request_id(&req);

    let provider = params
        .get("provider")
        .and_then(|p| p.parse::<ProviderName>().ok())
        .ok_or_else(|| ProxyError::bad_request_params("Invalid provider in path"))?;

    let Some(token) = read_platform_key(&req) else {
        return Err(ProxyError::unauthorized_api_key("Missing API Key"));
    };

    // 签章/存储层的细节不外泄，统一折叠为 Invalid API Key
    let record = ctx
        .auth
        .validate_key(&token)
        .await
        .map_err(|e| ProxyError::unauthorized_api_key_with_source("Invalid API Key", e))?;

    let access = ctx.auth.validate_provider_access(&record, provider).await?;

    let required = scope::required_scope_from_path(req.uri().path());
    if !scope::is_scope_allowed(&access.api_scopes, &required) {
        ldebug!(
            rid,
            LogStage::Authentication,
            LogComponent::Auth,
            "scope_rejected",
            &format!("required={required}, allowed={:?}", access.api_scopes)
        );
        return Err(ProxyError::forbidden("forbidden: api scope not allowed"));
    }

    linfo!(
        rid,
        LogStage::Authentication,
        LogComponent::ApiKey,
        "api_key_authenticated",
        "API Key 验证通过",
        user_id = %record.user_id,
        api_key_id = %record.id,
        provider = provider.as_str()
    );

    req.extensions_mut().insert(AuthContext {
        user_id: record.user_id.clone(),
        api_key_id: record.id.clone(),
        key_name: record.key_name.clone(),
        display_name: String::new(),
        provider,
        provider_access: Arc::new(access),
    });

    Ok(next.run(req).await)
}

/// 使用者校验阶段：拥有者必须处于 active；last_seen 更新失败视为存储故障
pub async fn user_middleware(
    State(ctx): State<Arc<AppContext>>,
    mut req: Request,
    next: Next,
) -> Result<Response> {
    let rid = request_id(&req);
    let Some(mut auth) = req.extensions().get::<AuthContext>().cloned() else {
        return Err(ProxyError::unauthorized_api_key("missing user context"));
    };

    let user = ctx
        .auth
        .user_store()
        .get_user(&auth.user_id)
        .await?
        .ok_or_else(|| ProxyError::unauthorized_api_key("invalid api key: user not found"))?;

    if user.status != crate::types::AccessStatus::Active {
        ldebug!(
            rid,
            LogStage::Authentication,
            LogComponent::Auth,
            "user_not_active",
            &format!("user={} status={}", user.id, user.status.as_str())
        );
        return Err(ProxyError::unauthorized("invalid_user_status"));
    }

    ctx.auth
        .user_store()
        .update_user_last_seen(&user.id, chrono::Utc::now())
        .await?;

    auth.display_name = user.display_name;
    req.extensions_mut().insert(auth);

    Ok(next.run(req).await)
}
