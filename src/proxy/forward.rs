//! # 上游转发器
//!
//! 无状态的单发转发：组 URL、过滤标头、注入 provider 凭证、执行。
//! 返回未读取的上游响应，由调用端决定消费方式；不重试。

use axum::http::{header, HeaderMap, HeaderName, Method};
use reqwest::Client;

use crate::error::{ProxyError, Result};
use crate::types::ProviderName;

/// RFC 7230 定义的逐跳标头，不得转发
const HOP_BY_HOP_HEADERS: [&str; 9] = [
    "connection",
    "proxy-connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// 一次转发所需的全部输入
pub struct ForwardParams<'a> {
    pub provider: ProviderName,
    /// 解析自 ProviderAccess 的上游凭证
    pub provider_key: &'a str,
    pub method: Method,
    /// 上游 base URL（不含尾端 `/`）
    pub base: &'a str,
    pub version: &'a str,
    pub path: &'a str,
    /// 原始 query string（不含 `?`）
    pub raw_query: &'a str,
    pub headers: &'a HeaderMap,
}

pub struct ProxyService {
    http: Client,
}

impl ProxyService {
    #[must_use]
    pub const fn new(http: Client) -> Self {
        Self { http }
    }

    /// 组合目标 URL，各段之间恰好一个 `/`
    fn compose_url(base: &str, version: &str, path: &str, raw_query: &str) -> String {
        let base = base.trim_end_matches('/');
        let version = version.trim_start_matches('/');
        let path = path.trim_start_matches('/');
        let mut target = format!("{base}/{version}/{path}");
        if !raw_query.is_empty() {
            target.push('?');
            target.push_str(raw_query);
        }
        target
    }

    /// 执行转发；body 可为空或入站请求体的流
    pub async fn forward(
        &self,
        params: ForwardParams<'_>,
        body: reqwest::Body,
    ) -> Result<reqwest::Response> {
        let target = Self::compose_url(params.base, params.version, params.path, params.raw_query);
        let url = url::Url::parse(&target)
            .map_err(|e| ProxyError::internal_with_source("create provider request failed", e))?;

        let mut headers = copy_safe_headers(params.headers);

        // 依 provider 注入上游凭证
        match params.provider {
            ProviderName::OpenAi => {
                let value = format!("Bearer {}", params.provider_key)
                    .parse()
                    .map_err(|_| ProxyError::internal("invalid provider credential"))?;
                headers.insert(header::AUTHORIZATION, value);
            }
            ProviderName::Gemini => {
                let value = params
                    .provider_key
                    .parse()
                    .map_err(|_| ProxyError::internal("invalid provider credential"))?;
                headers.insert(HeaderName::from_static("x-goog-api-key"), value);
            }
            other => {
                return Err(ProxyError::forbidden(format!(
                    "unsupported provider: {other}"
                )));
            }
        }

        if !headers.contains_key(header::ACCEPT) {
            headers.insert(
                header::ACCEPT,
                axum::http::HeaderValue::from_static("application/json"),
            );
        }

        self.http
            .request(params.method, url)
            .headers(headers)
            .body(body)
            .send()
            .await
            .map_err(|e| ProxyError::external_request_with_source("provider request failed", e))
    }
}

/// 复制入站标头并剔除不可转发者：
/// - 逐跳标头与 `Connection` 指示的附加标头
/// - 入站 `Authorization`（平台令牌绝不外泄给上游）
/// - `Host` / `Content-Length`（由客户端按目标重新计算）
#[must_use]
pub fn copy_safe_headers(src: &HeaderMap) -> HeaderMap {
    let mut dst = HeaderMap::new();
    for (name, value) in src {
        let lowered = name.as_str();
        if HOP_BY_HOP_HEADERS.contains(&lowered) {
            continue;
        }
        if lowered == "authorization" || lowered == "host" || lowered == "content-length" {
            continue;
        }
        dst.append(name.clone(), value.clone());
    }

    // RFC 7230 §6.1: Connection 列出的标头一并剔除
    if let Some(connection) = src.get(header::CONNECTION) {
        if let Ok(tokens) = connection.to_str() {
            for token in tokens.split(',') {
                let token = token.trim().to_ascii_lowercase();
                if !token.is_empty() {
                    dst.remove(token.as_str());
                }
            }
        }
    }

    dst
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn url_join_has_single_slashes() {
        assert_eq!(
            ProxyService::compose_url("https://api.openai.com/", "/v1/", "/chat/completions", ""),
            "https://api.openai.com/v1/chat/completions"
        );
        assert_eq!(
            ProxyService::compose_url("https://host", "v1", "models", "stream=true"),
            "https://host/v1/models?stream=true"
        );
    }

    #[test]
    fn authorization_never_forwarded() {
        let mut src = HeaderMap::new();
        src.insert(
            header::AUTHORIZATION,
            HeaderValue::from_static("Bearer platform-token"),
        );
        src.insert("x-custom", HeaderValue::from_static("kept"));
        let dst = copy_safe_headers(&src);
        assert!(dst.get(header::AUTHORIZATION).is_none());
        assert_eq!(dst.get("x-custom").unwrap(), "kept");
    }

    #[test]
    fn hop_by_hop_headers_stripped() {
        let mut src = HeaderMap::new();
        src.insert(header::CONNECTION, HeaderValue::from_static("keep-alive"));
        src.insert("keep-alive", HeaderValue::from_static("timeout=5"));
        src.insert("transfer-encoding", HeaderValue::from_static("chunked"));
        src.insert("upgrade", HeaderValue::from_static("websocket"));
        src.insert("accept", HeaderValue::from_static("application/json"));
        let dst = copy_safe_headers(&src);
        assert!(dst.get("connection").is_none());
        assert!(dst.get("keep-alive").is_none());
        assert!(dst.get("transfer-encoding").is_none());
        assert!(dst.get("upgrade").is_none());
        assert_eq!(dst.get("accept").unwrap(), "application/json");
    }

    #[test]
    fn connection_listed_headers_stripped() {
        let mut src = HeaderMap::new();
        src.insert(
            header::CONNECTION,
            HeaderValue::from_static("X-Internal-Token, X-Other"),
        );
        src.insert("x-internal-token", HeaderValue::from_static("secret"));
        src.insert("x-other", HeaderValue::from_static("value"));
        src.insert("x-kept", HeaderValue::from_static("stays"));
        let dst = copy_safe_headers(&src);
        assert!(dst.get("x-internal-token").is_none());
        assert!(dst.get("x-other").is_none());
        assert_eq!(dst.get("x-kept").unwrap(), "stays");
    }
}
