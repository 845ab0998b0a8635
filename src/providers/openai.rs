//! # OpenAI 适配器
//!
//! 失败分类约定：
//! - 本地序列化 / 构造请求失败 → `InternalServer`
//! - 发送失败或上游非 2xx → `ExternalRequestError`（附 ≤3000 字预览）
//! - 响应体解析失败 → `ExternalResponseFormatError`

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;

use super::traits::{AudioService, ChatService, EmbeddingsService, ImagesService, ModelsService};
use super::types::{
    AudioSpeechPayload, AudioSpeechResult, AudioTranscriptionForm, AudioTranscriptionResponse,
    AudioTranslationForm, ChatPayload, ChatResult, EmbeddingPayload, EmbeddingResponse,
    ImageEditForm, ImageGenerationPayload, ImageVariationForm, ImagesResponse, ModelList,
    UploadedFile,
};
use crate::error::{ProxyError, Result};

/// 上游错误文本预览上限（Unicode 字符）
const ERROR_PREVIEW_MAX_CHARS: usize = 3000;

pub struct OpenAiProvider {
    http: Client,
    base_url: String,
}

impl OpenAiProvider {
    #[must_use]
    pub fn new(http: Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { http, base_url }
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}/v1{endpoint}", self.base_url)
    }

    fn preview(text: &str) -> String {
        let trimmed = text.trim();
        if trimmed.chars().count() <= ERROR_PREVIEW_MAX_CHARS {
            return trimmed.to_string();
        }
        trimmed.chars().take(ERROR_PREVIEW_MAX_CHARS).collect()
    }

    /// 状态码检查；非 2xx 读预览并上抛
    async fn read_success(response: Response) -> Result<Bytes> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProxyError::external_request(format!(
                "openai api error ({}): {}",
                status.as_u16(),
                Self::preview(&body)
            )));
        }
        response
            .bytes()
            .await
            .map_err(|e| ProxyError::external_request_with_source("read openai response failed", e))
    }

    fn decode<T: DeserializeOwned>(bytes: &Bytes) -> Result<T> {
        serde_json::from_slice(bytes).map_err(|e| {
            ProxyError::external_response_format_with_source("decode openai response failed", e)
        })
    }

    async fn post_json<P: Serialize, T: DeserializeOwned>(
        &self,
        endpoint: &str,
        payload: &P,
        api_key: &str,
    ) -> Result<T> {
        let body = serde_json::to_vec(payload)
            .map_err(|e| ProxyError::internal_with_source("marshal request payload failed", e))?;

        let response = self
            .http
            .post(self.url(endpoint))
            .bearer_auth(api_key)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await
            .map_err(|e| ProxyError::external_request_with_source("openai api request failed", e))?;

        let bytes = Self::read_success(response).await?;
        Self::decode(&bytes)
    }

    async fn post_multipart<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        form: Form,
        api_key: &str,
    ) -> Result<T> {
        let response = self
            .http
            .post(self.url(endpoint))
            .bearer_auth(api_key)
            .multipart(form)
            .send()
            .await
            .map_err(|e| ProxyError::external_request_with_source("openai api request failed", e))?;

        let bytes = Self::read_success(response).await?;
        Self::decode(&bytes)
    }

    fn file_part(file: &UploadedFile) -> Result<Part> {
        let mut part = Part::bytes(file.bytes.to_vec()).file_name(file.file_name.clone());
        if let Some(content_type) = &file.content_type {
            part = part
                .mime_str(content_type)
                .map_err(|e| ProxyError::internal_with_source("invalid file content type", e))?;
        }
        Ok(part)
    }
}

#[async_trait]
impl ChatService for OpenAiProvider {
    async fn chat_completions_v1(
        &self,
        payload: &ChatPayload,
        api_key: &str,
    ) -> Result<ChatResult> {
        self.post_json("/chat/completions", payload, api_key).await
    }
}

#[async_trait]
impl EmbeddingsService for OpenAiProvider {
    async fn embeddings_v1(
        &self,
        payload: &EmbeddingPayload,
        api_key: &str,
    ) -> Result<EmbeddingResponse> {
        self.post_json("/embeddings", payload, api_key).await
    }
}

#[async_trait]
impl ImagesService for OpenAiProvider {
    async fn generate_v1(
        &self,
        payload: &ImageGenerationPayload,
        api_key: &str,
    ) -> Result<ImagesResponse> {
        self.post_json("/images/generations", payload, api_key).await
    }

    async fn edit_v1(&self, form: ImageEditForm, api_key: &str) -> Result<ImagesResponse> {
        if form.images.is_empty() {
            return Err(ProxyError::bad_request_body("at least one image is required"));
        }

        let mut multipart = Form::new().text("prompt", form.prompt.clone());
        for image in &form.images {
            multipart = multipart.part("image[]", Self::file_part(image)?);
        }
        if let Some(mask) = &form.mask {
            multipart = multipart.part("mask", Self::file_part(mask)?);
        }
        if let Some(model) = &form.model {
            multipart = multipart.text("model", model.clone());
        }
        if let Some(n) = form.n {
            multipart = multipart.text("n", n.to_string());
        }
        if let Some(size) = &form.size {
            multipart = multipart.text("size", size.clone());
        }
        if let Some(response_format) = &form.response_format {
            multipart = multipart.text("response_format", response_format.clone());
        }

        self.post_multipart("/images/edits", multipart, api_key).await
    }

    async fn variation_v1(
        &self,
        form: ImageVariationForm,
        api_key: &str,
    ) -> Result<ImagesResponse> {
        let mut multipart = Form::new().part("image", Self::file_part(&form.image)?);
        if let Some(model) = &form.model {
            multipart = multipart.text("model", model.clone());
        }
        if let Some(n) = form.n {
            multipart = multipart.text("n", n.to_string());
        }
        if let Some(size) = &form.size {
            multipart = multipart.text("size", size.clone());
        }
        if let Some(response_format) = &form.response_format {
            multipart = multipart.text("response_format", response_format.clone());
        }

        self.post_multipart("/images/variations", multipart, api_key)
            .await
    }
}

#[async_trait]
impl AudioService for OpenAiProvider {
    async fn speech_v1(
        &self,
        payload: &AudioSpeechPayload,
        api_key: &str,
    ) -> Result<AudioSpeechResult> {
        let body = serde_json::to_vec(payload)
            .map_err(|e| ProxyError::internal_with_source("marshal request payload failed", e))?;

        let response = self
            .http
            .post(self.url("/audio/speech"))
            .bearer_auth(api_key)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await
            .map_err(|e| ProxyError::external_request_with_source("openai api request failed", e))?;

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("application/octet-stream")
            .to_string();
        let bytes = Self::read_success(response).await?;

        Ok(AudioSpeechResult {
            bytes,
            content_type,
        })
    }

    async fn transcriptions_v1(
        &self,
        form: AudioTranscriptionForm,
        api_key: &str,
    ) -> Result<AudioTranscriptionResponse> {
        let mut multipart = Form::new()
            .text("model", form.model.clone())
            .part("file", Self::file_part(&form.file)?);
        if let Some(language) = &form.language {
            multipart = multipart.text("language", language.clone());
        }
        if let Some(prompt) = &form.prompt {
            multipart = multipart.text("prompt", prompt.clone());
        }
        if let Some(response_format) = &form.response_format {
            multipart = multipart.text("response_format", response_format.clone());
        }
        if let Some(temperature) = form.temperature {
            multipart = multipart.text("temperature", temperature.to_string());
        }

        self.post_multipart("/audio/transcriptions", multipart, api_key)
            .await
    }

    async fn translations_v1(&self, form: AudioTranslationForm, api_key: &str) -> Result<String> {
        let mut multipart = Form::new()
            .text("model", form.model.clone())
            .part("file", Self::file_part(&form.file)?);
        if let Some(prompt) = &form.prompt {
            multipart = multipart.text("prompt", prompt.clone());
        }
        if let Some(response_format) = &form.response_format {
            multipart = multipart.text("response_format", response_format.clone());
        }
        if let Some(temperature) = form.temperature {
            multipart = multipart.text("temperature", temperature.to_string());
        }

        let response = self
            .http
            .post(self.url("/audio/translations"))
            .bearer_auth(api_key)
            .multipart(multipart)
            .send()
            .await
            .map_err(|e| ProxyError::external_request_with_source("openai api request failed", e))?;

        let bytes = Self::read_success(response).await?;
        let text = String::from_utf8_lossy(&bytes);
        // 默认 json 格式时取 text 栏位，其余格式（srt/vtt/text）原样回传
        if let Ok(parsed) = serde_json::from_slice::<serde_json::Value>(&bytes) {
            if let Some(inner) = parsed.get("text").and_then(|t| t.as_str()) {
                return Ok(inner.to_string());
            }
        }
        Ok(text.into_owned())
    }
}

#[async_trait]
impl ModelsService for OpenAiProvider {
    async fn list_v1(&self, api_key: &str) -> Result<ModelList> {
        let response = self
            .http
            .get(self.url("/models"))
            .bearer_auth(api_key)
            .send()
            .await
            .map_err(|e| ProxyError::external_request_with_source("openai api request failed", e))?;

        let bytes = Self::read_success(response).await?;
        Self::decode(&bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_trailing_slash_is_stripped() {
        let provider = OpenAiProvider::new(Client::new(), "https://api.openai.com/");
        assert_eq!(
            provider.url("/chat/completions"),
            "https://api.openai.com/v1/chat/completions"
        );
    }

    #[test]
    fn preview_truncates_on_char_boundary() {
        let long = "意".repeat(4000);
        let preview = OpenAiProvider::preview(&long);
        assert_eq!(preview.chars().count(), ERROR_PREVIEW_MAX_CHARS);
    }
}
