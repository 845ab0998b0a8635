//! # 语音合成 / 转录 / 翻译

use std::sync::Arc;

use axum::extract::{Multipart, OriginalUri, Path, Request, State};
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Extension;

use super::{base_usage_log, ensure_v1, parse_json_body, read_body, read_multipart};
use crate::auth::AuthContext;
use crate::error::{ProxyError, Result};
use crate::providers::types::{
    AudioSpeechPayload, AudioTranscriptionForm, AudioTranslationForm,
};
use crate::response::{mark_raw, ApiResponse, RequestId};
use crate::server::AppContext;

/// 语音合成：回传原始音频位元流，不包统一信封
pub async fn audio_speech(
    State(ctx): State<Arc<AppContext>>,
    Path((version, _provider)): Path<(String, String)>,
    Extension(auth): Extension<AuthContext>,
    req: Request,
) -> Result<Response> {
    ensure_v1(&version)?;

    let service = ctx.registry.audio(auth.provider).ok_or_else(|| {
        ProxyError::forbidden(format!("provider not supported: {}", auth.provider))
    })?;

    let body = read_body(req).await?;
    let payload: AudioSpeechPayload = parse_json_body(&body, "audio speech payload")?;

    let audio = service
        .speech_v1(&payload, &auth.provider_access.provider_key)
        .await?;

    ctx.auth
        .consume(&auth.api_key_id, &auth.provider_access)
        .await?;

    let extension = audio
        .content_type
        .strip_prefix("audio/")
        .filter(|ext| !ext.is_empty())
        .unwrap_or("bin");
    let disposition = format!("inline; filename=\"speech.{extension}\"");

    let mut response = (StatusCode::OK, audio.bytes).into_response();
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_str(&audio.content_type)
            .unwrap_or(HeaderValue::from_static("application/octet-stream")),
    );
    response.headers_mut().insert(
        header::CONTENT_DISPOSITION,
        HeaderValue::from_str(&disposition)
            .unwrap_or(HeaderValue::from_static("inline")),
    );
    mark_raw(&mut response);
    Ok(response)
}

pub async fn audio_transcriptions(
    State(ctx): State<Arc<AppContext>>,
    Path((version, _provider)): Path<(String, String)>,
    OriginalUri(uri): OriginalUri,
    Extension(request_id): Extension<RequestId>,
    Extension(auth): Extension<AuthContext>,
    multipart: Multipart,
) -> Result<ApiResponse> {
    ensure_v1(&version)?;

    let service = ctx.registry.audio(auth.provider).ok_or_else(|| {
        ProxyError::forbidden(format!("provider not supported: {}", auth.provider))
    })?;

    let mut form = read_multipart(multipart).await?;
    let transcription = AudioTranscriptionForm {
        model: form.require_text("model")?,
        file: form.require_file("file")?,
        language: form.text("language"),
        prompt: form.text("prompt"),
        response_format: form.text("response_format"),
        temperature: form.text("temperature").and_then(|t| t.parse().ok()),
    };
    let model = transcription.model.clone();

    let result = service
        .transcriptions_v1(transcription, &auth.provider_access.provider_key)
        .await?;

    ctx.auth
        .consume(&auth.api_key_id, &auth.provider_access)
        .await?;

    let mut log = base_usage_log(
        &request_id.0,
        &auth,
        uri.path(),
        &model,
        &ctx.config.app.version,
    );
    if let Some(usage) = &result.usage {
        log.input_tokens = usage.input_tokens;
        log.output_tokens = usage.output_tokens;
        log.tokens_total = usage.total_tokens;
        if let Some(details) = &usage.input_tokens_details {
            log.text_tokens = details.text_tokens;
            log.audio_tokens = details.audio_tokens;
        }
    }
    ctx.sink.emit_usage(log);

    Ok(ApiResponse::success(&result))
}

pub async fn audio_translations(
    State(ctx): State<Arc<AppContext>>,
    Path((version, _provider)): Path<(String, String)>,
    OriginalUri(uri): OriginalUri,
    Extension(request_id): Extension<RequestId>,
    Extension(auth): Extension<AuthContext>,
    multipart: Multipart,
) -> Result<ApiResponse> {
    ensure_v1(&version)?;

    let service = ctx.registry.audio(auth.provider).ok_or_else(|| {
        ProxyError::forbidden(format!("provider not supported: {}", auth.provider))
    })?;

    let mut form = read_multipart(multipart).await?;
    let translation = AudioTranslationForm {
        model: form.require_text("model")?,
        file: form.require_file("file")?,
        prompt: form.text("prompt"),
        response_format: form.text("response_format"),
        temperature: form.text("temperature").and_then(|t| t.parse().ok()),
    };
    let model = translation.model.clone();

    let text = service
        .translations_v1(translation, &auth.provider_access.provider_key)
        .await?;

    ctx.auth
        .consume(&auth.api_key_id, &auth.provider_access)
        .await?;

    // 翻译响应不带用量计数，事件照发以便对账
    let log = base_usage_log(
        &request_id.0,
        &auth,
        uri.path(),
        &model,
        &ctx.config.app.version,
    );
    ctx.sink.emit_usage(log);

    Ok(ApiResponse::success(&text))
}
