//! # 聊天生成

use std::sync::Arc;

use axum::extract::{Path, Request, State};
use axum::Extension;

use super::{base_usage_log, ensure_v1, parse_json_body, read_body};
use crate::auth::AuthContext;
use crate::error::{ProxyError, Result};
use crate::providers::types::ChatPayload;
use crate::response::{ApiResponse, RequestId};
use crate::server::AppContext;

pub async fn chat_completions(
    State(ctx): State<Arc<AppContext>>,
    Path((version, _provider)): Path<(String, String)>,
    Extension(request_id): Extension<RequestId>,
    Extension(auth): Extension<AuthContext>,
    req: Request,
) -> Result<ApiResponse> {
    ensure_v1(&version)?;

    let service = ctx.registry.chat(auth.provider).ok_or_else(|| {
        ProxyError::forbidden(format!("provider not supported: {}", auth.provider))
    })?;

    let endpoint = req.uri().path().to_string();
    let body = read_body(req).await?;
    let payload: ChatPayload = parse_json_body(&body, "chat payload")?;

    let result = service
        .chat_completions_v1(&payload, &auth.provider_access.provider_key)
        .await?;

    ctx.auth
        .consume(&auth.api_key_id, &auth.provider_access)
        .await?;

    let mut log = base_usage_log(
        &request_id.0,
        &auth,
        &endpoint,
        &payload.model,
        &ctx.config.app.version,
    );
    log.tokens_prompt = result.usage.prompt_tokens;
    log.tokens_completion = result.usage.completion_tokens;
    log.tokens_total = result.usage.total_tokens;
    ctx.sink.emit_usage(log);

    Ok(ApiResponse::success(&result))
}
