//! # Provider 能力注册表
//!
//! provider → 各端点族适配器的映射；缺少某能力即拒绝请求。
//! 新 provider 只需注册适配器，handler 不需要改动。

pub mod openai;
pub mod traits;
pub mod types;

use std::collections::HashMap;
use std::sync::Arc;

use traits::{AudioService, ChatService, EmbeddingsService, ImagesService, ModelsService};

use crate::types::{ProviderName, GEMINI_API_BASE_URL, OPENAI_API_BASE_URL};

#[derive(Default)]
pub struct ProviderRegistry {
    chat: HashMap<ProviderName, Arc<dyn ChatService>>,
    images: HashMap<ProviderName, Arc<dyn ImagesService>>,
    audio: HashMap<ProviderName, Arc<dyn AudioService>>,
    embeddings: HashMap<ProviderName, Arc<dyn EmbeddingsService>>,
    models: HashMap<ProviderName, Arc<dyn ModelsService>>,
    /// 透传路由的 provider → base URL 表
    passthrough_bases: HashMap<ProviderName, String>,
}

impl ProviderRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// 默认注册：类型化表面仅 openai；透传另外认得 gemini
    #[must_use]
    pub fn with_defaults(http: reqwest::Client) -> Self {
        let mut registry = Self::new();
        let openai = Arc::new(openai::OpenAiProvider::new(http, OPENAI_API_BASE_URL));
        registry.register_all(ProviderName::OpenAi, &openai);
        registry.register_passthrough_base(ProviderName::OpenAi, OPENAI_API_BASE_URL);
        registry.register_passthrough_base(ProviderName::Gemini, GEMINI_API_BASE_URL);
        registry
    }

    /// 将同一适配器注册到全部端点族
    pub fn register_all(&mut self, provider: ProviderName, adapter: &Arc<openai::OpenAiProvider>) {
        self.chat.insert(provider, adapter.clone());
        self.images.insert(provider, adapter.clone());
        self.audio.insert(provider, adapter.clone());
        self.embeddings.insert(provider, adapter.clone());
        self.models.insert(provider, adapter.clone());
    }

    pub fn register_passthrough_base(
        &mut self,
        provider: ProviderName,
        base_url: impl Into<String>,
    ) {
        self.passthrough_bases.insert(provider, base_url.into());
    }

    #[must_use]
    pub fn chat(&self, provider: ProviderName) -> Option<Arc<dyn ChatService>> {
        self.chat.get(&provider).cloned()
    }

    #[must_use]
    pub fn images(&self, provider: ProviderName) -> Option<Arc<dyn ImagesService>> {
        self.images.get(&provider).cloned()
    }

    #[must_use]
    pub fn audio(&self, provider: ProviderName) -> Option<Arc<dyn AudioService>> {
        self.audio.get(&provider).cloned()
    }

    #[must_use]
    pub fn embeddings(&self, provider: ProviderName) -> Option<Arc<dyn EmbeddingsService>> {
        self.embeddings.get(&provider).cloned()
    }

    #[must_use]
    pub fn models(&self, provider: ProviderName) -> Option<Arc<dyn ModelsService>> {
        self.models.get(&provider).cloned()
    }

    #[must_use]
    pub fn passthrough_base(&self, provider: ProviderName) -> Option<&str> {
        self.passthrough_bases.get(&provider).map(String::as_str)
    }
}
