//! # 配额预检阶段
//!
//! 只读取计数器并写 `X-RateLimit-*` 标头；真正的扣减在
//! 上游调用成功后的记账步骤（预检通过不保证扣减成功）。
//! 读取失败时降级放行，不阻断主流程。

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::HeaderValue;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use chrono::Utc;

use crate::auth::AuthContext;
use crate::error::ProxyError;
use crate::logging::{LogComponent, LogStage};
use crate::response::RequestId;
use crate::server::AppContext;
use crate::{ldebug, lwarn};

fn header_value(value: i64) -> HeaderValue {
    HeaderValue::from_str(&value.to_string()).unwrap_or(HeaderValue::from_static("0"))
}

pub async fn quota_middleware(
    State(ctx): State<Arc<AppContext>>,
    req: Request,
    next: Next,
) -> Response {
    let rid = req
        .extensions()
        .get::<RequestId>()
        .map_or_else(|| "unknown".to_string(), |id| id.0.clone());

    let Some(auth) = req.extensions().get::<AuthContext>().cloned() else {
        return ProxyError::unauthorized("missing or invalid API Key").into_response();
    };
    let access = &auth.provider_access;

    // 未配置配额 → 直接放行，不写标头
    let (Some(period), Some(limit)) = (access.limit_period, access.limit_count) else {
        return next.run(req).await;
    };
    if limit <= 0 {
        return next.run(req).await;
    }

    let outcome = match ctx
        .auth
        .rate_limiter()
        .get_current(&auth.api_key_id, auth.provider, period, limit)
        .await
    {
        Ok(outcome) => outcome,
        Err(err) => {
            // 预检读取失败不阻断主流程；权威闸门在尾端 consume
            lwarn!(
                rid,
                LogStage::RateLimit,
                LogComponent::Quota,
                "precheck_degraded",
                &format!("限流预检读取失败，降级放行: {err}")
            );
            return next.run(req).await;
        }
    };

    let mut effective_remaining = outcome.remaining;
    if !outcome.initialized {
        // 新窗口：预视剩余为全额，并同步持久层的窗口元数据
        effective_remaining = limit;
        if let Err(err) = ctx
            .auth
            .key_store()
            .update_access_last_reset_at(&auth.api_key_id, auth.provider, Utc::now())
            .await
        {
            return err.into_response();
        }
        if let Err(err) = ctx
            .auth
            .key_store()
            .update_access_used_count(&auth.api_key_id, auth.provider, 0)
            .await
        {
            return err.into_response();
        }
    }

    let blocked = effective_remaining <= 0 && outcome.ttl_seconds > 0;
    ldebug!(
        rid,
        LogStage::RateLimit,
        LogComponent::Quota,
        "precheck",
        &format!(
            "limit={limit}, remaining={effective_remaining}, ttl={}, blocked={blocked}",
            outcome.ttl_seconds
        )
    );

    let mut response = if blocked {
        let mut blocked_response =
            ProxyError::rate_limit_exceeded("rate limit exceeded").into_response();
        blocked_response
            .headers_mut()
            .insert("Retry-After", header_value(outcome.ttl_seconds));
        blocked_response
    } else {
        next.run(req).await
    };

    let headers = response.headers_mut();
    headers.insert("X-RateLimit-Limit", header_value(limit));
    headers.insert("X-RateLimit-Remaining", header_value(effective_remaining));
    if outcome.ttl_seconds > 0 {
        headers.insert("X-RateLimit-Reset", header_value(outcome.ttl_seconds));
    }

    response
}
