//! # 事件模型
//!
//! 字段与下游帐务管线约定一致，不要轻易改名

use chrono::Utc;
use serde::Serialize;
use serde_json::Value;

use crate::config::AppConfig;

/// 事件时间戳：UTC 微秒精度
#[must_use]
pub fn log_timestamp() -> String {
    Utc::now().format("%Y-%m-%d %H:%M:%S%.6f UTC").to_string()
}

/// 一次计费调用的用量事件
#[derive(Debug, Clone, Default, Serialize)]
pub struct AiUsageLog {
    pub request_id: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub external_id: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub display_name: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub project_name: String,
    pub provider: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub model: String,
    pub endpoint: String,
    #[serde(skip_serializing_if = "is_zero")]
    pub tokens_prompt: u64,
    #[serde(skip_serializing_if = "is_zero")]
    pub tokens_completion: u64,
    #[serde(skip_serializing_if = "is_zero")]
    pub text_tokens: u64,
    #[serde(skip_serializing_if = "is_zero")]
    pub audio_tokens: u64,
    #[serde(skip_serializing_if = "is_zero")]
    pub image_tokens: u64,
    #[serde(skip_serializing_if = "is_zero")]
    pub input_tokens: u64,
    #[serde(skip_serializing_if = "is_zero")]
    pub output_tokens: u64,
    #[serde(skip_serializing_if = "is_zero")]
    pub tokens_total: u64,
    pub version: String,
    pub logged_at: String,
}

#[allow(clippy::trivially_copy_pass_by_ref)]
fn is_zero(value: &u64) -> bool {
    *value == 0
}

/// 入站请求事件
#[derive(Debug, Clone, Default, Serialize)]
pub struct RequestLog {
    pub request_id: String,
    pub path: String,
    pub method: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub project_name: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub body: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub ip_hash: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub user_agent: String,
    pub version: String,
    pub request_ts: String,
    pub logged_at: String,
}

/// 出站响应事件
#[derive(Debug, Clone, Default, Serialize)]
pub struct ResponseLog {
    pub request_id: String,
    pub project_name: String,
    pub code: i64,
    pub status_code: u16,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub body: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub error: String,
    pub response_ts: String,
    pub version: String,
    pub logged_at: String,
}

/// 响应体预览截断上限（字节，UTF-8 安全）
const RESPONSE_BODY_PREVIEW_MAX: usize = 2000;

fn preview_json(value: &Value) -> String {
    let mut rendered = value.to_string();
    if rendered.len() > RESPONSE_BODY_PREVIEW_MAX {
        let mut cut = RESPONSE_BODY_PREVIEW_MAX;
        while !rendered.is_char_boundary(cut) {
            cut -= 1;
        }
        rendered.truncate(cut);
        rendered.push('…');
    }
    rendered
}

impl ResponseLog {
    #[must_use]
    pub fn success(request_id: &str, app: &AppConfig, status_code: u16, body: &Value) -> Self {
        let now = log_timestamp();
        Self {
            request_id: request_id.to_string(),
            project_name: app.name.clone(),
            code: 0,
            status_code,
            body: preview_json(body),
            error: String::new(),
            response_ts: now.clone(),
            version: app.version.clone(),
            logged_at: now,
        }
    }

    #[must_use]
    pub fn failure(
        request_id: &str,
        app: &AppConfig,
        status_code: u16,
        code: i64,
        error: &str,
    ) -> Self {
        let now = log_timestamp();
        Self {
            request_id: request_id.to_string(),
            project_name: app.name.clone(),
            code,
            status_code,
            body: String::new(),
            error: error.to_string(),
            response_ts: now.clone(),
            version: app.version.clone(),
            logged_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn usage_log_omits_zero_counters() {
        let log = AiUsageLog {
            request_id: "r1".to_string(),
            provider: "openai".to_string(),
            endpoint: "/proxy/v1/openai/chat/completions".to_string(),
            tokens_total: 8,
            version: "0.0.0".to_string(),
            logged_at: log_timestamp(),
            ..AiUsageLog::default()
        };
        let value = serde_json::to_value(&log).unwrap();
        assert_eq!(value["tokens_total"], 8);
        assert!(value.get("tokens_prompt").is_none());
        assert!(value.get("image_tokens").is_none());
    }

    #[test]
    fn response_preview_is_utf8_safe() {
        let body = Value::String("号".repeat(3000));
        let log = ResponseLog::success("r2", &AppConfig::default(), 200, &body);
        assert!(log.body.len() <= RESPONSE_BODY_PREVIEW_MAX + '…'.len_utf8());
        assert!(log.body.ends_with('…'));
    }
}
