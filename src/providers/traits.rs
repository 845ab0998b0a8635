//! # 端点族服务契约
//!
//! 每个 provider 对每个端点族实现一个适配器；
//! 适配器负责发起上游调用并解析出带用量的类型化结果

use async_trait::async_trait;

use super::types::{
    AudioSpeechPayload, AudioSpeechResult, AudioTranscriptionForm, AudioTranscriptionResponse,
    AudioTranslationForm, ChatPayload, ChatResult, EmbeddingPayload, EmbeddingResponse,
    ImageEditForm, ImageGenerationPayload, ImageVariationForm, ImagesResponse, ModelList,
};
use crate::error::Result;

#[async_trait]
pub trait ChatService: Send + Sync {
    async fn chat_completions_v1(&self, payload: &ChatPayload, api_key: &str)
        -> Result<ChatResult>;
}

#[async_trait]
pub trait EmbeddingsService: Send + Sync {
    async fn embeddings_v1(
        &self,
        payload: &EmbeddingPayload,
        api_key: &str,
    ) -> Result<EmbeddingResponse>;
}

#[async_trait]
pub trait ImagesService: Send + Sync {
    async fn generate_v1(
        &self,
        payload: &ImageGenerationPayload,
        api_key: &str,
    ) -> Result<ImagesResponse>;

    async fn edit_v1(&self, form: ImageEditForm, api_key: &str) -> Result<ImagesResponse>;

    async fn variation_v1(&self, form: ImageVariationForm, api_key: &str)
        -> Result<ImagesResponse>;
}

#[async_trait]
pub trait AudioService: Send + Sync {
    async fn speech_v1(
        &self,
        payload: &AudioSpeechPayload,
        api_key: &str,
    ) -> Result<AudioSpeechResult>;

    async fn transcriptions_v1(
        &self,
        form: AudioTranscriptionForm,
        api_key: &str,
    ) -> Result<AudioTranscriptionResponse>;

    async fn translations_v1(&self, form: AudioTranslationForm, api_key: &str) -> Result<String>;
}

#[async_trait]
pub trait ModelsService: Send + Sync {
    async fn list_v1(&self, api_key: &str) -> Result<ModelList>;
}
