//! # 错误类型定义
//!
//! 网关的错误分类、业务错误码与 HTTP 状态映射。
//! 各阶段原样上抛错误，由响应封装中间件统一写出错误信封。

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

// 业务错误码，按 HTTP 状态分段
pub const CODE_SUCCESS: i64 = 0;
pub const CODE_BAD_REQUEST_BODY: i64 = 40000;
pub const CODE_BAD_REQUEST_PARAMS: i64 = 40001;
pub const CODE_BAD_REQUEST_HEADERS: i64 = 40002;
pub const CODE_UNAUTHORIZED: i64 = 40100;
pub const CODE_UNAUTHORIZED_API_KEY: i64 = 40300;
pub const CODE_FORBIDDEN: i64 = 40301;
pub const CODE_NOT_FOUND: i64 = 40400;
pub const CODE_RATE_LIMIT_EXCEEDED: i64 = 42900;
pub const CODE_INTERNAL_ERROR: i64 = 50000;
pub const CODE_DATABASE_ERROR: i64 = 50001;
pub const CODE_SERVICE_UNAVAILABLE: i64 = 50002;
pub const CODE_EXTERNAL_REQUEST_ERROR: i64 = 50200;
pub const CODE_EXTERNAL_RESPONSE_FORMAT_ERROR: i64 = 50201;
pub const CODE_GATEWAY_TIMEOUT: i64 = 50400;
pub const CODE_UNSUPPORTED_VERSION: i64 = 50401;

/// 应用主要错误类型
#[derive(Debug, Error)]
pub enum ProxyError {
    /// 请求体无效
    #[error("无效的请求体: {message}")]
    BadRequestBody {
        message: String,
        #[source]
        source: Option<anyhow::Error>,
    },

    /// 请求参数无效
    #[error("无效的请求参数: {message}")]
    BadRequestParams {
        message: String,
        #[source]
        source: Option<anyhow::Error>,
    },

    /// 请求标头无效
    #[error("无效的请求标头: {message}")]
    BadRequestHeaders {
        message: String,
        #[source]
        source: Option<anyhow::Error>,
    },

    /// 未授权（会话缺失或无效）
    #[error("未授权: {message}")]
    Unauthorized {
        message: String,
        #[source]
        source: Option<anyhow::Error>,
    },

    /// API Key 无效、过期或无对应 provider 授权
    #[error("API Key 无权限: {message}")]
    UnauthorizedApiKey {
        message: String,
        #[source]
        source: Option<anyhow::Error>,
    },

    /// scope 不匹配或 provider 不受支持
    #[error("禁止访问: {message}")]
    Forbidden {
        message: String,
        #[source]
        source: Option<anyhow::Error>,
    },

    /// 资源未找到
    #[error("资源未找到: {message}")]
    NotFound {
        message: String,
        #[source]
        source: Option<anyhow::Error>,
    },

    /// 配额耗尽
    #[error("速率限制: {message}")]
    RateLimitExceeded {
        message: String,
        #[source]
        source: Option<anyhow::Error>,
    },

    /// 本地处理失败
    #[error("内部错误: {message}")]
    InternalServer {
        message: String,
        #[source]
        source: Option<anyhow::Error>,
    },

    /// 持久化存储失败
    #[error("数据库错误: {message}")]
    DatabaseError {
        message: String,
        #[source]
        source: Option<anyhow::Error>,
    },

    /// 服务暂停
    #[error("服务不可用: {message}")]
    ServiceUnavailable {
        message: String,
        #[source]
        source: Option<anyhow::Error>,
    },

    /// 计数器存储不可用
    #[error("限流器不可用: {message}")]
    RateLimiterUnavailable {
        message: String,
        #[source]
        source: Option<anyhow::Error>,
    },

    /// 上游传输失败或非 2xx
    #[error("外部请求失败: {message}")]
    ExternalRequestError {
        message: String,
        #[source]
        source: Option<anyhow::Error>,
    },

    /// 上游响应体解析失败
    #[error("外部响应格式错误: {message}")]
    ExternalResponseFormatError {
        message: String,
        #[source]
        source: Option<anyhow::Error>,
    },

    /// 截止时间已到
    #[error("网关超时: {message}")]
    GatewayTimeout {
        message: String,
        #[source]
        source: Option<anyhow::Error>,
    },

    /// 不支持的 API 版本
    #[error("不支持的版本: {message}")]
    UnsupportedVersion {
        message: String,
        #[source]
        source: Option<anyhow::Error>,
    },
}

/// 错误信封所需的组成部分，由 [`ProxyError`] 写入响应扩展，
/// 响应封装中间件据此补上 request_id 后重建响应体
#[derive(Debug, Clone)]
pub struct ErrorParts {
    pub status: StatusCode,
    pub code: i64,
    pub message: &'static str,
    pub description: String,
}

macro_rules! error_ctor {
    ($fn_name:ident, $with_source:ident, $variant:ident) => {
        pub fn $fn_name<T: Into<String>>(message: T) -> Self {
            Self::$variant {
                message: message.into(),
                source: None,
            }
        }

        pub fn $with_source<T: Into<String>, E: Into<anyhow::Error>>(
            message: T,
            source: E,
        ) -> Self {
            Self::$variant {
                message: message.into(),
                source: Some(source.into()),
            }
        }
    };
}

impl ProxyError {
    error_ctor!(bad_request_body, bad_request_body_with_source, BadRequestBody);
    error_ctor!(
        bad_request_params,
        bad_request_params_with_source,
        BadRequestParams
    );
    error_ctor!(
        bad_request_headers,
        bad_request_headers_with_source,
        BadRequestHeaders
    );
    error_ctor!(unauthorized, unauthorized_with_source, Unauthorized);
    error_ctor!(
        unauthorized_api_key,
        unauthorized_api_key_with_source,
        UnauthorizedApiKey
    );
    error_ctor!(forbidden, forbidden_with_source, Forbidden);
    error_ctor!(not_found, not_found_with_source, NotFound);
    error_ctor!(
        rate_limit_exceeded,
        rate_limit_exceeded_with_source,
        RateLimitExceeded
    );
    error_ctor!(internal, internal_with_source, InternalServer);
    error_ctor!(database, database_with_source, DatabaseError);
    error_ctor!(
        service_unavailable,
        service_unavailable_with_source,
        ServiceUnavailable
    );
    error_ctor!(
        rate_limiter_unavailable,
        rate_limiter_unavailable_with_source,
        RateLimiterUnavailable
    );
    error_ctor!(
        external_request,
        external_request_with_source,
        ExternalRequestError
    );
    error_ctor!(
        external_response_format,
        external_response_format_with_source,
        ExternalResponseFormatError
    );
    error_ctor!(gateway_timeout, gateway_timeout_with_source, GatewayTimeout);
    error_ctor!(
        unsupported_version,
        unsupported_version_with_source,
        UnsupportedVersion
    );

    /// HTTP 状态码
    #[must_use]
    pub const fn http_status(&self) -> StatusCode {
        match self {
            Self::BadRequestBody { .. }
            | Self::BadRequestParams { .. }
            | Self::BadRequestHeaders { .. } => StatusCode::BAD_REQUEST,
            Self::Unauthorized { .. } => StatusCode::UNAUTHORIZED,
            Self::UnauthorizedApiKey { .. } | Self::Forbidden { .. } => StatusCode::FORBIDDEN,
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
            Self::RateLimitExceeded { .. } => StatusCode::TOO_MANY_REQUESTS,
            Self::InternalServer { .. } | Self::DatabaseError { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            Self::ServiceUnavailable { .. } | Self::RateLimiterUnavailable { .. } => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            Self::ExternalRequestError { .. } | Self::ExternalResponseFormatError { .. } => {
                StatusCode::BAD_GATEWAY
            }
            Self::GatewayTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            Self::UnsupportedVersion { .. } => StatusCode::HTTP_VERSION_NOT_SUPPORTED,
        }
    }

    /// 业务错误码
    #[must_use]
    pub const fn error_code(&self) -> i64 {
        match self {
            Self::BadRequestBody { .. } => CODE_BAD_REQUEST_BODY,
            Self::BadRequestParams { .. } => CODE_BAD_REQUEST_PARAMS,
            Self::BadRequestHeaders { .. } => CODE_BAD_REQUEST_HEADERS,
            Self::Unauthorized { .. } => CODE_UNAUTHORIZED,
            Self::UnauthorizedApiKey { .. } => CODE_UNAUTHORIZED_API_KEY,
            Self::Forbidden { .. } => CODE_FORBIDDEN,
            Self::NotFound { .. } => CODE_NOT_FOUND,
            Self::RateLimitExceeded { .. } => CODE_RATE_LIMIT_EXCEEDED,
            Self::InternalServer { .. } => CODE_INTERNAL_ERROR,
            Self::DatabaseError { .. } => CODE_DATABASE_ERROR,
            Self::ServiceUnavailable { .. } => CODE_SERVICE_UNAVAILABLE,
            Self::RateLimiterUnavailable { .. } => CODE_SERVICE_UNAVAILABLE,
            Self::ExternalRequestError { .. } => CODE_EXTERNAL_REQUEST_ERROR,
            Self::ExternalResponseFormatError { .. } => CODE_EXTERNAL_RESPONSE_FORMAT_ERROR,
            Self::GatewayTimeout { .. } => CODE_GATEWAY_TIMEOUT,
            Self::UnsupportedVersion { .. } => CODE_UNSUPPORTED_VERSION,
        }
    }

    /// 信封 message 栏位使用的稳定短语
    #[must_use]
    pub const fn slug(&self) -> &'static str {
        match self {
            Self::BadRequestBody { .. } => "bad-request-body",
            Self::BadRequestParams { .. } => "bad-request-params",
            Self::BadRequestHeaders { .. } => "bad-request-headers",
            Self::Unauthorized { .. } => "unauthorized",
            Self::UnauthorizedApiKey { .. } => "unauthorized-api-key",
            Self::Forbidden { .. } => "forbidden",
            Self::NotFound { .. } => "not-found",
            Self::RateLimitExceeded { .. } => "rate-limit-exceeded",
            Self::InternalServer { .. } => "internal-server-error",
            Self::DatabaseError { .. } => "database-error",
            Self::ServiceUnavailable { .. } => "service-unavailable",
            Self::RateLimiterUnavailable { .. } => "rate-limiter-unavailable",
            Self::ExternalRequestError { .. } => "external-request-failed",
            Self::ExternalResponseFormatError { .. } => "external-response-invalid",
            Self::GatewayTimeout { .. } => "gateway-timeout",
            Self::UnsupportedVersion { .. } => "unsupported-version",
        }
    }

    /// 错误详情
    #[must_use]
    pub fn description(&self) -> &str {
        match self {
            Self::BadRequestBody { message, .. }
            | Self::BadRequestParams { message, .. }
            | Self::BadRequestHeaders { message, .. }
            | Self::Unauthorized { message, .. }
            | Self::UnauthorizedApiKey { message, .. }
            | Self::Forbidden { message, .. }
            | Self::NotFound { message, .. }
            | Self::RateLimitExceeded { message, .. }
            | Self::InternalServer { message, .. }
            | Self::DatabaseError { message, .. }
            | Self::ServiceUnavailable { message, .. }
            | Self::RateLimiterUnavailable { message, .. }
            | Self::ExternalRequestError { message, .. }
            | Self::ExternalResponseFormatError { message, .. }
            | Self::GatewayTimeout { message, .. }
            | Self::UnsupportedVersion { message, .. } => message,
        }
    }

    #[must_use]
    pub fn error_parts(&self) -> ErrorParts {
        ErrorParts {
            status: self.http_status(),
            code: self.error_code(),
            message: self.slug(),
            description: self.description().to_string(),
        }
    }

    /// 将上游非 2xx 状态码映射为网关错误
    #[must_use]
    pub fn from_upstream_status(status: StatusCode, description: impl Into<String>) -> Self {
        let description = description.into();
        match status {
            StatusCode::BAD_REQUEST => Self::bad_request_body(description),
            StatusCode::UNAUTHORIZED => Self::unauthorized(description),
            StatusCode::FORBIDDEN => Self::forbidden(description),
            StatusCode::NOT_FOUND => Self::not_found(description),
            StatusCode::TOO_MANY_REQUESTS => Self::rate_limit_exceeded(description),
            StatusCode::SERVICE_UNAVAILABLE => Self::service_unavailable(description),
            StatusCode::GATEWAY_TIMEOUT => Self::gateway_timeout(description),
            _ => Self::internal(description),
        }
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        // 响应体由封装中间件依 ErrorParts 重建并补上 request_id
        let parts = self.error_parts();
        let mut response = parts.status.into_response();
        response.extensions_mut().insert(parts);
        response
    }
}
