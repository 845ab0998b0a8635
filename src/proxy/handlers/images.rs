//! # 图片生成 / 编辑 / 变体

use std::sync::Arc;

use axum::extract::{Multipart, OriginalUri, Path, Request, State};
use axum::Extension;

use super::{base_usage_log, ensure_v1, parse_json_body, read_body, read_multipart};
use crate::auth::AuthContext;
use crate::collect::AiUsageLog;
use crate::error::{ProxyError, Result};
use crate::providers::types::{
    ImageEditForm, ImageGenerationPayload, ImageVariationForm, ImagesResponse,
};
use crate::response::{ApiResponse, RequestId};
use crate::server::AppContext;

fn fill_image_tokens(log: &mut AiUsageLog, result: &ImagesResponse) {
    let Some(usage) = &result.usage else {
        return;
    };
    log.input_tokens = usage.input_tokens;
    log.output_tokens = usage.output_tokens;
    log.tokens_total = usage.total_tokens;
    if let Some(details) = &usage.input_tokens_details {
        log.text_tokens = details.text_tokens;
        log.image_tokens = details.image_tokens;
    }
}

async fn settle(
    ctx: &AppContext,
    request_id: &RequestId,
    auth: &AuthContext,
    endpoint: &str,
    model: &str,
    result: &ImagesResponse,
) -> Result<()> {
    ctx.auth
        .consume(&auth.api_key_id, &auth.provider_access)
        .await?;

    let mut log = base_usage_log(&request_id.0, auth, endpoint, model, &ctx.config.app.version);
    fill_image_tokens(&mut log, result);
    ctx.sink.emit_usage(log);
    Ok(())
}

pub async fn images_generations(
    State(ctx): State<Arc<AppContext>>,
    Path((version, _provider)): Path<(String, String)>,
    Extension(request_id): Extension<RequestId>,
    Extension(auth): Extension<AuthContext>,
    req: Request,
) -> Result<ApiResponse> {
    ensure_v1(&version)?;

    let service = ctx.registry.images(auth.provider).ok_or_else(|| {
        ProxyError::forbidden(format!("provider not supported: {}", auth.provider))
    })?;

    let endpoint = req.uri().path().to_string();
    let body = read_body(req).await?;
    let payload: ImageGenerationPayload = parse_json_body(&body, "image payload")?;

    let result = service
        .generate_v1(&payload, &auth.provider_access.provider_key)
        .await?;

    let model = payload.model.clone().unwrap_or_default();
    settle(&ctx, &request_id, &auth, &endpoint, &model, &result).await?;

    Ok(ApiResponse::success(&result))
}

pub async fn images_edits(
    State(ctx): State<Arc<AppContext>>,
    Path((version, _provider)): Path<(String, String)>,
    OriginalUri(uri): OriginalUri,
    Extension(request_id): Extension<RequestId>,
    Extension(auth): Extension<AuthContext>,
    multipart: Multipart,
) -> Result<ApiResponse> {
    ensure_v1(&version)?;

    let service = ctx.registry.images(auth.provider).ok_or_else(|| {
        ProxyError::forbidden(format!("provider not supported: {}", auth.provider))
    })?;

    let mut form = read_multipart(multipart).await?;
    let edit = ImageEditForm {
        prompt: form.require_text("prompt")?,
        images: form.take_files("image"),
        mask: form.file("mask"),
        model: form.text("model"),
        n: form.text("n").and_then(|n| n.parse().ok()),
        size: form.text("size"),
        response_format: form.text("response_format"),
    };
    let model = edit.model.clone().unwrap_or_default();

    let result = service
        .edit_v1(edit, &auth.provider_access.provider_key)
        .await?;

    settle(&ctx, &request_id, &auth, uri.path(), &model, &result).await?;

    Ok(ApiResponse::success(&result))
}

pub async fn images_variations(
    State(ctx): State<Arc<AppContext>>,
    Path((version, _provider)): Path<(String, String)>,
    OriginalUri(uri): OriginalUri,
    Extension(request_id): Extension<RequestId>,
    Extension(auth): Extension<AuthContext>,
    multipart: Multipart,
) -> Result<ApiResponse> {
    ensure_v1(&version)?;

    let service = ctx.registry.images(auth.provider).ok_or_else(|| {
        ProxyError::forbidden(format!("provider not supported: {}", auth.provider))
    })?;

    let mut form = read_multipart(multipart).await?;
    let variation = ImageVariationForm {
        image: form.require_file("image")?,
        model: form.text("model"),
        n: form.text("n").and_then(|n| n.parse().ok()),
        size: form.text("size"),
        response_format: form.text("response_format"),
    };
    let model = variation.model.clone().unwrap_or_default();

    let result = service
        .variation_v1(variation, &auth.provider_access.provider_key)
        .await?;

    settle(&ctx, &request_id, &auth, uri.path(), &model, &result).await?;

    Ok(ApiResponse::success(&result))
}
