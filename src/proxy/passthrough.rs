//! # 透传处理器
//!
//! `/mcp-server/:version/:provider/*action` 的逐字节转发：
//! 标头做逐跳过滤后原样复制，body 与上游逐字节一致；
//! 流式响应边转发边把前 128 KiB 侧录进内存，EOF 后做一次预览解析产出用量事件。
//!
//! 配额在上游成功后、响应回写前消耗：客户端中途断线仍计一次
//! （配额计的是上游工作量）；消耗失败时丢弃上游响应，维持至多一次计费。

use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Path, Request, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::Response;
use axum::Extension;
use bytes::{Bytes, BytesMut};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use crate::auth::AuthContext;
use crate::collect::{log_timestamp, AiUsageLog};
use crate::error::{ProxyError, Result};
use crate::logging::{LogComponent, LogStage};
use crate::proxy::forward::ForwardParams;
use crate::proxy::sse::{self, SseParseResult};
use crate::response::{mark_raw, RequestId};
use crate::server::AppContext;
use crate::{ldebug, lwarn};

/// 流式侧录缓冲上限；超出后静默丢弃，不阻塞转发
const MIRROR_CAP_BYTES: usize = 128 * 1024;

/// 透传请求的用量事件固定挂在 mcp-server 项目下
const PASSTHROUGH_PROJECT: &str = "mcp-server";

/// 判定是否按流式转发：Accept 含 `text/event-stream`（不区分大小写），
/// 或 query 带 `stream=true`
fn is_stream(headers: &HeaderMap, raw_query: &str) -> bool {
    let accept_stream = headers
        .get(header::ACCEPT)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.to_ascii_lowercase().contains("text/event-stream"));
    if accept_stream {
        return true;
    }
    raw_query.split('&').any(|pair| {
        pair.split_once('=')
            .is_some_and(|(k, v)| k == "stream" && v.eq_ignore_ascii_case("true"))
    })
}

/// 复制下游标头：剔除逐跳标头；流式时再剔除 Content-Length
fn copy_downstream_headers(src: &HeaderMap, streaming: bool) -> HeaderMap {
    let mut dst = HeaderMap::new();
    for (name, value) in src {
        match name.as_str() {
            "connection" | "proxy-connection" | "keep-alive" | "proxy-authenticate"
            | "proxy-authorization" | "te" | "trailer" | "transfer-encoding" | "upgrade" => {
                continue;
            }
            "content-length" if streaming => continue,
            _ => {}
        }
        dst.append(name.clone(), value.clone());
    }
    dst
}

fn usage_log_from_preview(
    request_id: &str,
    auth: &AuthContext,
    endpoint: &str,
    version: &str,
    preview: &SseParseResult,
) -> AiUsageLog {
    let usage = preview.usage.unwrap_or_default();
    AiUsageLog {
        request_id: request_id.to_string(),
        external_id: auth.user_id.clone(),
        display_name: auth.display_name.clone(),
        project_name: PASSTHROUGH_PROJECT.to_string(),
        provider: auth.provider.as_str().to_string(),
        model: preview.model.clone(),
        endpoint: endpoint.to_string(),
        tokens_prompt: usage.prompt_tokens,
        tokens_completion: usage.completion_tokens,
        input_tokens: usage.input_tokens,
        output_tokens: usage.output_tokens,
        tokens_total: usage.total_tokens,
        version: version.to_string(),
        logged_at: log_timestamp(),
        ..AiUsageLog::default()
    }
}

pub async fn passthrough(
    State(ctx): State<Arc<AppContext>>,
    Path((version, _provider, action)): Path<(String, String, String)>,
    Extension(request_id): Extension<RequestId>,
    Extension(auth): Extension<AuthContext>,
    req: Request,
) -> Result<Response> {
    if version != "v1" {
        return Err(ProxyError::unsupported_version("unsupported version"));
    }

    let base = ctx
        .registry
        .passthrough_base(auth.provider)
        .ok_or_else(|| {
            ProxyError::forbidden(format!("provider not supported: {}", auth.provider))
        })?
        .to_string();

    let action = if action.is_empty() {
        "/".to_string()
    } else {
        format!("/{}", action.trim_start_matches('/'))
    };

    let (parts, body) = req.into_parts();
    let endpoint = parts.uri.path().to_string();
    let raw_query = parts.uri.query().unwrap_or("").to_string();
    let streaming = is_stream(&parts.headers, &raw_query);

    ldebug!(
        request_id,
        LogStage::Passthrough,
        LogComponent::Passthrough,
        "forward_begin",
        &format!(
            "{} {} -> {}{} (stream={streaming})",
            parts.method, endpoint, base, action
        )
    );

    let upstream = ctx
        .proxy
        .forward(
            ForwardParams {
                provider: auth.provider,
                provider_key: &auth.provider_access.provider_key,
                method: parts.method.clone(),
                base: &base,
                version: &version,
                path: &action,
                raw_query: &raw_query,
                headers: &parts.headers,
            },
            reqwest::Body::wrap_stream(body.into_data_stream()),
        )
        .await?;

    // 扣额度：上游成功才扣；扣失败则放弃这份上游响应（至多一次计费）
    ctx.auth
        .consume(&auth.api_key_id, &auth.provider_access)
        .await?;

    let status =
        StatusCode::from_u16(upstream.status().as_u16()).unwrap_or(StatusCode::BAD_GATEWAY);
    let upstream_headers = upstream.headers().clone();
    let response_headers = copy_downstream_headers(&upstream_headers, streaming);

    let body = if streaming {
        stream_with_mirror(
            ctx.clone(),
            upstream,
            upstream_headers.clone(),
            request_id.0.clone(),
            auth.clone(),
            endpoint,
        )
    } else {
        let bytes = upstream.bytes().await.map_err(|e| {
            ProxyError::internal_with_source("read downstream body failed", e)
        })?;

        let preview = sse::body_preview(&bytes, &upstream_headers);
        if preview.is_empty() {
            ldebug!(
                request_id,
                LogStage::Passthrough,
                LogComponent::Sse,
                "empty_preview",
                "预览解析为空，用量事件按零计"
            );
        }
        ctx.sink.emit_usage(usage_log_from_preview(
            &request_id.0,
            &auth,
            &endpoint,
            &ctx.config.app.version,
            &preview,
        ));

        // 客户端拿到的是未经解码的原始字节
        Body::from(bytes)
    };

    let mut response = Response::builder()
        .status(status)
        .body(body)
        .map_err(|e| ProxyError::internal_with_source("build passthrough response failed", e))?;
    *response.headers_mut() = response_headers;
    mark_raw(&mut response);
    Ok(response)
}

/// 流式转发：单读单写循环，上游块到达即转发；
/// 前 128 KiB 同步写进侧录缓冲，流结束后解析并发出用量事件
fn stream_with_mirror(
    ctx: Arc<AppContext>,
    mut upstream: reqwest::Response,
    upstream_headers: HeaderMap,
    request_id: String,
    auth: AuthContext,
    endpoint: String,
) -> Body {
    let (tx, rx) = mpsc::channel::<std::result::Result<Bytes, std::io::Error>>(1);

    tokio::spawn(async move {
        let mut mirror = BytesMut::with_capacity(MIRROR_CAP_BYTES);

        loop {
            match upstream.chunk().await {
                Ok(Some(chunk)) => {
                    if mirror.len() < MIRROR_CAP_BYTES {
                        let take = chunk.len().min(MIRROR_CAP_BYTES - mirror.len());
                        mirror.extend_from_slice(&chunk[..take]);
                    }
                    // 客户端断线时发送失败，停止拉取上游
                    if tx.send(Ok(chunk)).await.is_err() {
                        break;
                    }
                }
                Ok(None) => break,
                Err(err) => {
                    lwarn!(
                        request_id,
                        LogStage::Passthrough,
                        LogComponent::Passthrough,
                        "upstream_stream_error",
                        &format!("上游串流中断: {err}")
                    );
                    let _ = tx
                        .send(Err(std::io::Error::other(err)))
                        .await;
                    break;
                }
            }
        }

        let preview = sse::body_preview(&mirror, &upstream_headers);
        ctx.sink.emit_usage(usage_log_from_preview(
            &request_id,
            &auth,
            &endpoint,
            &ctx.config.app.version,
            &preview,
        ));
    });

    Body::from_stream(ReceiverStream::new(rx))
}
