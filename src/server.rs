//! # 服务器装配
//!
//! 共享资源注入、路由表与优雅停机。
//! 受保护路由的阶段顺序：信封 → 认证 → 使用者校验 → 配额预检 → handler。

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::State;
use axum::http::Method;
use axum::middleware;
use axum::routing::{any, get, post};
use axum::{Json, Router};
use serde_json::json;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::auth::service::ApiKeyAuthService;
use crate::collect::LogSink;
use crate::config::Configuration;
use crate::error::{ProxyError, Result};
use crate::health::HealthState;
use crate::logging::{LogComponent, LogStage};
use crate::providers::ProviderRegistry;
use crate::proxy::forward::ProxyService;
use crate::proxy::{handlers, passthrough};
use crate::telemetry::Metrics;
use crate::{auth, health, linfo, quota, response, telemetry};

/// 停机时给在途请求的固定排空时间
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

/// 进程级共享资源；启动时装配一次，整个请求图只读
pub struct AppContext {
    pub config: Configuration,
    pub auth: ApiKeyAuthService,
    pub registry: ProviderRegistry,
    pub proxy: ProxyService,
    pub sink: LogSink,
    pub metrics: Metrics,
    pub health: HealthState,
    pub started_at: Instant,
}

/// 构建完整路由表
pub fn build_router(ctx: Arc<AppContext>) -> Router {
    let protected = Router::new()
        .route(
            "/proxy/{version}/{provider}/chat/completions",
            post(handlers::chat::chat_completions),
        )
        .route(
            "/proxy/{version}/{provider}/embeddings",
            post(handlers::embeddings::generate_embedding),
        )
        .route(
            "/proxy/{version}/{provider}/models",
            get(handlers::models::list_models),
        )
        .route(
            "/proxy/{version}/{provider}/images/generations",
            post(handlers::images::images_generations),
        )
        .route(
            "/proxy/{version}/{provider}/images/variations",
            post(handlers::images::images_variations),
        )
        .route(
            "/proxy/{version}/{provider}/images/edits",
            post(handlers::images::images_edits),
        )
        .route(
            "/proxy/{version}/{provider}/audio/transcriptions",
            post(handlers::audio::audio_transcriptions),
        )
        .route(
            "/proxy/{version}/{provider}/audio/translations",
            post(handlers::audio::audio_translations),
        )
        .route(
            "/proxy/{version}/{provider}/audio/speech",
            post(handlers::audio::audio_speech),
        )
        .route(
            "/mcp-server/{version}/{provider}/{*action}",
            any(passthrough::passthrough),
        )
        // 音频/图片上传可能超过 axum 默认 2MB 上限
        .layer(axum::extract::DefaultBodyLimit::max(32 * 1024 * 1024))
        // layer 的执行顺序与添加顺序相反：后加的先跑
        .layer(middleware::from_fn_with_state(
            ctx.clone(),
            quota::middleware::quota_middleware,
        ))
        .layer(middleware::from_fn_with_state(
            ctx.clone(),
            auth::middleware::user_middleware,
        ))
        .layer(middleware::from_fn_with_state(
            ctx.clone(),
            auth::middleware::auth_middleware,
        ))
        .layer(middleware::from_fn_with_state(
            ctx.clone(),
            response::envelope_middleware,
        ));

    Router::new()
        .merge(protected)
        .route("/health/liveness", get(health::liveness))
        .route("/health/readiness", get(health::readiness))
        .route("/version", get(version_handler))
        .route("/metrics", get(telemetry::metrics_handler))
        .layer(
            ServiceBuilder::new()
                .layer(CatchPanicLayer::custom(response::panic_response))
                .layer(TraceLayer::new_for_http())
                .layer(
                    CorsLayer::new()
                        .allow_methods([
                            Method::GET,
                            Method::POST,
                            Method::PUT,
                            Method::PATCH,
                            Method::DELETE,
                        ])
                        .allow_origin(Any)
                        .allow_headers(Any),
                ),
        )
        .with_state(ctx)
}

/// 构建信息与运行时长
async fn version_handler(State(ctx): State<Arc<AppContext>>) -> Json<serde_json::Value> {
    Json(json!({
        "name": ctx.config.app.name,
        "version": ctx.config.app.version,
        "env": ctx.config.app.env,
        "uptime_seconds": ctx.started_at.elapsed().as_secs(),
    }))
}

/// 监听并服务；收到 SIGINT/SIGTERM 后先摘流再排空，最后冲洗日志汇
pub async fn serve(ctx: Arc<AppContext>) -> Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], ctx.config.app.port));
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| ProxyError::internal_with_source(format!("绑定 {addr} 失败"), e))?;

    let app = build_router(ctx.clone());
    ctx.health.set_ready(true);
    linfo!(
        "system",
        LogStage::Startup,
        LogComponent::ServerSetup,
        "listening",
        &format!("网关监听 {addr}")
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(ctx.clone()))
        .await
        .map_err(|e| ProxyError::internal_with_source("服务器异常退出", e))?;

    ctx.sink.shutdown().await;
    linfo!(
        "system",
        LogStage::Shutdown,
        LogComponent::ServerSetup,
        "stopped",
        "网关已停止"
    );
    Ok(())
}

async fn shutdown_signal(ctx: Arc<AppContext>) {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }

    // 先让 readiness 变红，负载均衡器停止派新流量，再给在途请求排空时间
    ctx.health.set_ready(false);
    linfo!(
        "system",
        LogStage::Shutdown,
        LogComponent::ServerSetup,
        "draining",
        &format!("收到退出信号，{}s 后关闭监听", SHUTDOWN_GRACE.as_secs())
    );
    tokio::time::sleep(SHUTDOWN_GRACE).await;
}
