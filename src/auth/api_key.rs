//! # API Key 凭证编解码
//!
//! 线上格式：`base64url(payload) "." base64url(HMAC-SHA256(payload, secret))[:16]`。
//! MAC 截断固定 16 个 base64url 字符（96 bit），跨版本校验必须逐位一致。

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use chrono::Utc;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

/// MAC 截断长度（base64url 字符数）
const SIGNATURE_LEN: usize = 16;

/// 令牌 payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiKeyPayload {
    #[serde(rename = "userID")]
    pub user_id: String,
    #[serde(rename = "apiKeyID")]
    pub api_key_id: String,
    #[serde(rename = "issuedAt")]
    pub issued_at: i64,
}

/// 编解码层错误；认证阶段统一折叠为 `UnauthorizedApiKey`
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodecError {
    #[error("invalid api key format")]
    InvalidFormat,
    #[error("invalid api key signature")]
    InvalidSignature,
}

/// 签发令牌
pub fn issue(user_id: &str, api_key_id: &str, secret: &str) -> Result<String, CodecError> {
    let payload = ApiKeyPayload {
        user_id: user_id.to_string(),
        api_key_id: api_key_id.to_string(),
        issued_at: Utc::now().timestamp(),
    };
    let payload_bytes = serde_json::to_vec(&payload).map_err(|_| CodecError::InvalidFormat)?;
    let payload_b64 = URL_SAFE_NO_PAD.encode(payload_bytes);
    let signature = sign_short(&payload_b64, secret);
    Ok(format!("{payload_b64}.{signature}"))
}

/// 验证并解析令牌。
/// `issued_at` 在这一层不检查；绝对过期由 provider 授权的 `expire_time` 负责。
pub fn verify(token: &str, secret: &str) -> Result<ApiKeyPayload, CodecError> {
    let mut parts = token.split('.');
    let (Some(payload_b64), Some(signature), None) = (parts.next(), parts.next(), parts.next())
    else {
        return Err(CodecError::InvalidFormat);
    };

    let expected = sign_short(payload_b64, secret);
    if !constant_time_eq(expected.as_bytes(), signature.as_bytes()) {
        return Err(CodecError::InvalidSignature);
    }

    let payload_bytes = URL_SAFE_NO_PAD
        .decode(payload_b64)
        .map_err(|_| CodecError::InvalidFormat)?;
    serde_json::from_slice(&payload_bytes).map_err(|_| CodecError::InvalidFormat)
}

/// 仅解析 payload，不验证签章。供管理工具检视，不得用于认证。
pub fn decode_unverified(token: &str) -> Result<ApiKeyPayload, CodecError> {
    let payload_b64 = token.split('.').next().ok_or(CodecError::InvalidFormat)?;
    let payload_bytes = URL_SAFE_NO_PAD
        .decode(payload_b64)
        .map_err(|_| CodecError::InvalidFormat)?;
    serde_json::from_slice(&payload_bytes).map_err(|_| CodecError::InvalidFormat)
}

/// HMAC-SHA256 签章，仅取前 16 个 base64url 字符
fn sign_short(payload_b64: &str, secret: &str) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC 可接受任意长度密钥");
    mac.update(payload_b64.as_bytes());
    let digest = mac.finalize().into_bytes();
    let mut encoded = URL_SAFE_NO_PAD.encode(digest);
    encoded.truncate(SIGNATURE_LEN);
    encoded
}

/// 常数时间比较，避免逐位短路泄漏 MAC 前缀
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}
