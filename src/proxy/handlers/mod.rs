//! # 类型化端点处理器
//!
//! 绑定请求体 → 调 provider 适配器 → 记账 → 发用量事件 → 统一信封

pub mod audio;
pub mod chat;
pub mod embeddings;
pub mod images;
pub mod models;

use axum::body::Bytes;
use serde::de::DeserializeOwned;

use crate::auth::AuthContext;
use crate::collect::{log_timestamp, AiUsageLog};
use crate::error::{ProxyError, Result};

/// 请求体读入上限
const BODY_LIMIT_BYTES: usize = 32 * 1024 * 1024;

/// 目前类型化表面只支持 v1
pub(crate) fn ensure_v1(version: &str) -> Result<()> {
    if version == "v1" {
        Ok(())
    } else {
        Err(ProxyError::unsupported_version("unsupported version"))
    }
}

pub(crate) async fn read_body(req: axum::extract::Request) -> Result<Bytes> {
    axum::body::to_bytes(req.into_body(), BODY_LIMIT_BYTES)
        .await
        .map_err(|e| ProxyError::bad_request_body_with_source("read request body failed", e))
}

pub(crate) fn parse_json_body<T: DeserializeOwned>(bytes: &Bytes, what: &str) -> Result<T> {
    serde_json::from_slice(bytes)
        .map_err(|e| ProxyError::bad_request_body_with_source(format!("invalid {what}"), e))
}

/// 读入整个 multipart 表单：文本字段与文件字段分开收集；
/// 字段名的 `[]` 后缀（数组写法）归一化掉
pub(crate) async fn read_multipart(
    mut multipart: axum::extract::Multipart,
) -> Result<MultipartForm> {
    use std::collections::HashMap;

    let mut texts: HashMap<String, String> = HashMap::new();
    let mut files: HashMap<String, Vec<crate::providers::types::UploadedFile>> = HashMap::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ProxyError::bad_request_body_with_source("invalid multipart form", e))?
    {
        let name = field
            .name()
            .unwrap_or_default()
            .trim_end_matches("[]")
            .to_string();
        let file_name = field.file_name().map(ToString::to_string);
        if let Some(file_name) = file_name {
            let content_type = field.content_type().map(ToString::to_string);
            let bytes = field.bytes().await.map_err(|e| {
                ProxyError::bad_request_body_with_source("read multipart file failed", e)
            })?;
            files.entry(name).or_default().push(
                crate::providers::types::UploadedFile {
                    file_name,
                    content_type,
                    bytes,
                },
            );
        } else {
            let value = field.text().await.map_err(|e| {
                ProxyError::bad_request_body_with_source("read multipart field failed", e)
            })?;
            texts.insert(name, value);
        }
    }

    Ok(MultipartForm { texts, files })
}

pub(crate) struct MultipartForm {
    pub texts: std::collections::HashMap<String, String>,
    pub files: std::collections::HashMap<String, Vec<crate::providers::types::UploadedFile>>,
}

impl MultipartForm {
    pub fn text(&self, name: &str) -> Option<String> {
        self.texts.get(name).cloned().filter(|v| !v.is_empty())
    }

    pub fn require_text(&self, name: &str) -> Result<String> {
        self.text(name)
            .ok_or_else(|| ProxyError::bad_request_body(format!("missing form field: {name}")))
    }

    pub fn file(&mut self, name: &str) -> Option<crate::providers::types::UploadedFile> {
        self.files.get_mut(name).and_then(|list| {
            if list.is_empty() {
                None
            } else {
                Some(list.remove(0))
            }
        })
    }

    pub fn require_file(&mut self, name: &str) -> Result<crate::providers::types::UploadedFile> {
        self.file(name)
            .ok_or_else(|| ProxyError::bad_request_body(format!("missing form file: {name}")))
    }

    pub fn take_files(&mut self, name: &str) -> Vec<crate::providers::types::UploadedFile> {
        self.files.remove(name).unwrap_or_default()
    }
}

/// 预填身份与端点信息的用量事件；token 计数由各端点族补齐
pub(crate) fn base_usage_log(
    request_id: &str,
    auth: &AuthContext,
    endpoint: &str,
    model: &str,
    app_version: &str,
) -> AiUsageLog {
    AiUsageLog {
        request_id: request_id.to_string(),
        external_id: auth.user_id.clone(),
        display_name: auth.display_name.clone(),
        project_name: auth.key_name.clone(),
        provider: auth.provider.as_str().to_string(),
        model: model.to_string(),
        endpoint: endpoint.to_string(),
        version: app_version.to_string(),
        logged_at: log_timestamp(),
        ..AiUsageLog::default()
    }
}
