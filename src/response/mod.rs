//! # 统一响应信封
//!
//! 类型化端点的成功/失败统一为
//! `{request_id, code, data, message, description}`；
//! 透传路由以 `RawPassthrough` 标记让封装中间件跳过改写。

use std::sync::Arc;
use std::time::Instant;

use axum::extract::{Request, State};
use axum::http::{header, HeaderValue, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use crate::collect::ResponseLog;
use crate::error::{ErrorParts, CODE_SUCCESS};
use crate::logging::{LogComponent, LogStage};
use crate::server::AppContext;
use crate::{ldebug, linfo, lwarn};

/// 请求标识，信封与日志共用（十六进制）
#[derive(Debug, Clone)]
pub struct RequestId(pub String);

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// 响应扩展标记：跳过信封改写，按原样回传
#[derive(Debug, Clone, Copy)]
pub struct RawPassthrough;

/// 成功数据载荷，由封装中间件组装为最终信封
#[derive(Debug, Clone)]
pub struct EnvelopeData {
    pub data: Value,
    pub message: String,
}

/// 统一信封结构
#[derive(Debug, Serialize)]
pub struct Envelope {
    pub request_id: String,
    pub code: i64,
    pub data: Value,
    pub message: String,
    pub description: String,
}

/// 类型化 handler 的成功回传值
pub struct ApiResponse {
    data: Value,
    message: String,
}

impl ApiResponse {
    #[must_use]
    pub fn success<T: Serialize>(data: &T) -> Self {
        Self {
            data: serde_json::to_value(data).unwrap_or(Value::Null),
            message: "Request Success".to_string(),
        }
    }

    #[must_use]
    pub fn success_with_message<T: Serialize>(data: &T, message: impl Into<String>) -> Self {
        Self {
            data: serde_json::to_value(data).unwrap_or(Value::Null),
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiResponse {
    fn into_response(self) -> Response {
        // 实际响应体由封装中间件补上 request_id 后写出
        let mut response = StatusCode::OK.into_response();
        response.extensions_mut().insert(EnvelopeData {
            data: self.data,
            message: self.message,
        });
        response
    }
}

/// 标记响应为透传原文；同时写入 `X-Proxy-Passthrough: true`
pub fn mark_raw(response: &mut Response) {
    response.extensions_mut().insert(RawPassthrough);
    response.headers_mut().insert(
        "X-Proxy-Passthrough",
        HeaderValue::from_static("true"),
    );
}

fn json_response(status: StatusCode, envelope: &Envelope) -> Response {
    (status, Json(envelope)).into_response()
}

/// 响应封装中间件：生成 request_id，放入请求扩展；下游返回后
/// 依扩展内容重建统一信封，透传响应原样放行。
pub async fn envelope_middleware(
    State(ctx): State<Arc<AppContext>>,
    mut req: Request,
    next: Next,
) -> Response {
    let request_id = Uuid::new_v4().simple().to_string();
    req.extensions_mut().insert(RequestId(request_id.clone()));

    let path = req.uri().path().to_string();
    let method = req.method().to_string();
    let started = Instant::now();

    let now = crate::collect::log_timestamp();
    ctx.sink.emit_request(crate::collect::RequestLog {
        request_id: request_id.clone(),
        path: path.clone(),
        method: method.clone(),
        project_name: ctx.config.app.name.clone(),
        user_agent: req
            .headers()
            .get(header::USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string(),
        version: ctx.config.app.version.clone(),
        request_ts: now.clone(),
        logged_at: now,
        ..crate::collect::RequestLog::default()
    });

    let mut response = next.run(req).await;
    let elapsed = started.elapsed();

    if response.extensions().get::<RawPassthrough>().is_some() {
        ldebug!(
            request_id,
            LogStage::Response,
            LogComponent::Passthrough,
            "raw_response",
            &format!("{method} {path} -> {}", response.status())
        );
        ctx.metrics
            .observe(&path, response.status().as_u16(), elapsed);
        return response;
    }

    if let Some(parts) = response.extensions_mut().remove::<ErrorParts>() {
        let mut wrapped = write_error(&ctx, &request_id, &method, &path, parts, elapsed);
        // 保留下游塞好的标头（例如 429 的 Retry-After 与 X-RateLimit-*）
        merge_headers(&mut wrapped, &response);
        return wrapped;
    }

    if let Some(envelope_data) = response.extensions_mut().remove::<EnvelopeData>() {
        let status = response.status();
        let envelope = Envelope {
            request_id: request_id.clone(),
            code: CODE_SUCCESS,
            data: envelope_data.data,
            message: "OK".to_string(),
            description: envelope_data.message,
        };
        linfo!(
            request_id,
            LogStage::Response,
            LogComponent::Main,
            "response_ok",
            &format!("{method} {path} -> {}", status),
            duration_ms = elapsed.as_millis() as u64
        );
        ctx.sink.emit_response(ResponseLog::success(
            &request_id,
            &ctx.config.app,
            status.as_u16(),
            &envelope.data,
        ));
        ctx.metrics.observe(&path, status.as_u16(), elapsed);

        let mut wrapped = json_response(status, &envelope);
        // 保留下游塞好的标头（例如 X-RateLimit-*）
        merge_headers(&mut wrapped, &response);
        return wrapped;
    }

    // 未标记的非 2xx（如路由层 404）收敛为标准错误信封
    if response.status().is_client_error() || response.status().is_server_error() {
        let err = crate::error::ProxyError::from_upstream_status(response.status(), "request error");
        return write_error(&ctx, &request_id, &method, &path, err.error_parts(), elapsed);
    }

    ctx.metrics
        .observe(&path, response.status().as_u16(), elapsed);
    response
}

fn merge_headers(target: &mut Response, source: &Response) {
    for (name, value) in source.headers() {
        if name == header::CONTENT_TYPE || name == header::CONTENT_LENGTH {
            continue;
        }
        target.headers_mut().insert(name.clone(), value.clone());
    }
}

fn write_error(
    ctx: &AppContext,
    request_id: &str,
    method: &str,
    path: &str,
    parts: ErrorParts,
    elapsed: std::time::Duration,
) -> Response {
    lwarn!(
        request_id,
        LogStage::Response,
        LogComponent::Main,
        "response_error",
        &format!("{method} {path} -> {} {}", parts.status, parts.message),
        code = parts.code,
        description = %parts.description
    );
    ctx.sink.emit_response(ResponseLog::failure(
        request_id,
        &ctx.config.app,
        parts.status.as_u16(),
        parts.code,
        &parts.description,
    ));
    ctx.metrics.observe_failure(path, parts.message, elapsed);

    let envelope = Envelope {
        request_id: request_id.to_string(),
        code: parts.code,
        data: Value::Null,
        message: parts.message.to_string(),
        description: parts.description,
    };
    json_response(parts.status, &envelope)
}

/// 处理 handler panic：统一回 500 信封
#[must_use]
pub fn panic_response(err: Box<dyn std::any::Any + Send + 'static>) -> Response {
    let detail = err
        .downcast_ref::<&str>()
        .map(ToString::to_string)
        .or_else(|| err.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string());
    let request_id = Uuid::new_v4().simple().to_string();
    tracing::error!(request_id = %request_id, panic = %detail, "handler panicked");

    let envelope = Envelope {
        request_id,
        code: crate::error::CODE_INTERNAL_ERROR,
        data: Value::Null,
        message: "internal-server-error".to_string(),
        description: "unexpected panic".to_string(),
    };
    json_response(StatusCode::INTERNAL_SERVER_ERROR, &envelope)
}
