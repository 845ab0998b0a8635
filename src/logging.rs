//! # 统一日志工具模块
//!
//! 结构化业务日志：固定 request_id / stage / component / operation 字段，
//! 由 `linfo!` 等宏写入 tracing

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::LogConfig;

/// 日志阶段枚举
#[derive(Debug, Clone, Copy)]
pub enum LogStage {
    Startup,
    Shutdown,
    Authentication,
    RateLimit,
    UpstreamRequest,
    Response,
    Passthrough,
    Accounting,
    Cache,
    Db,
    Internal,
}

impl LogStage {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Startup => "startup",
            Self::Shutdown => "shutdown",
            Self::Authentication => "authentication",
            Self::RateLimit => "rate_limit",
            Self::UpstreamRequest => "upstream_request",
            Self::Response => "response",
            Self::Passthrough => "passthrough",
            Self::Accounting => "accounting",
            Self::Cache => "cache",
            Self::Db => "db",
            Self::Internal => "internal",
        }
    }
}

/// 组件枚举
#[derive(Debug, Clone, Copy)]
pub enum LogComponent {
    Main,
    ServerSetup,
    Config,
    Store,
    CounterStore,
    Auth,
    ApiKey,
    Quota,
    Forwarder,
    Passthrough,
    Provider,
    Collect,
    Sse,
}

impl LogComponent {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Main => "main",
            Self::ServerSetup => "server_setup",
            Self::Config => "config",
            Self::Store => "store",
            Self::CounterStore => "counter_store",
            Self::Auth => "auth",
            Self::ApiKey => "api_key",
            Self::Quota => "quota",
            Self::Forwarder => "forwarder",
            Self::Passthrough => "passthrough",
            Self::Provider => "provider",
            Self::Collect => "collect",
            Self::Sse => "sse",
        }
    }
}

/// 标准日志宏 - 信息级别
#[macro_export]
macro_rules! linfo {
    ($request_id:expr, $stage:expr, $component:expr, $operation:expr, $description:expr, $($rest:tt)*) => {
        tracing::info!(
            request_id = %$request_id,
            stage = $stage.as_str(),
            component = $component.as_str(),
            operation = $operation,
            message = %$description,
            $($rest)*
        )
    };
    ($request_id:expr, $stage:expr, $component:expr, $operation:expr, $description:expr) => {
        tracing::info!(
            request_id = %$request_id,
            stage = $stage.as_str(),
            component = $component.as_str(),
            operation = $operation,
            message = %$description,
        )
    };
}

/// 标准日志宏 - 调试级别
#[macro_export]
macro_rules! ldebug {
    ($request_id:expr, $stage:expr, $component:expr, $operation:expr, $description:expr, $($rest:tt)*) => {
        tracing::debug!(
            request_id = %$request_id,
            stage = $stage.as_str(),
            component = $component.as_str(),
            operation = $operation,
            message = %$description,
            $($rest)*
        )
    };
    ($request_id:expr, $stage:expr, $component:expr, $operation:expr, $description:expr) => {
        tracing::debug!(
            request_id = %$request_id,
            stage = $stage.as_str(),
            component = $component.as_str(),
            operation = $operation,
            message = %$description,
        )
    };
}

/// 标准日志宏 - 警告级别
#[macro_export]
macro_rules! lwarn {
    ($request_id:expr, $stage:expr, $component:expr, $operation:expr, $description:expr, $($rest:tt)*) => {
        tracing::warn!(
            request_id = %$request_id,
            stage = $stage.as_str(),
            component = $component.as_str(),
            operation = $operation,
            message = %$description,
            $($rest)*
        )
    };
    ($request_id:expr, $stage:expr, $component:expr, $operation:expr, $description:expr) => {
        tracing::warn!(
            request_id = %$request_id,
            stage = $stage.as_str(),
            component = $component.as_str(),
            operation = $operation,
            message = %$description,
        )
    };
}

/// 标准日志宏 - 错误级别
#[macro_export]
macro_rules! lerror {
    ($request_id:expr, $stage:expr, $component:expr, $operation:expr, $description:expr, $($rest:tt)*) => {
        tracing::error!(
            request_id = %$request_id,
            stage = $stage.as_str(),
            component = $component.as_str(),
            operation = $operation,
            message = %$description,
            $($rest)*
        )
    };
    ($request_id:expr, $stage:expr, $component:expr, $operation:expr, $description:expr) => {
        tracing::error!(
            request_id = %$request_id,
            stage = $stage.as_str(),
            component = $component.as_str(),
            operation = $operation,
            message = %$description,
        )
    };
}

/// 初始化日志系统。
/// 环境变量 `RUST_LOG` 优先于配置中的 level。
pub fn init(config: &LogConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level.clone()));

    let registry = tracing_subscriber::registry().with(filter);
    if config.json {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer()).init();
    }
}
