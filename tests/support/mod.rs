//! 集成测试共用装配：内存存储 + 内存计数器 + 指向本地假上游的注册表
#![allow(dead_code)]

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::body::Body;
use axum::http::{HeaderMap, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use tower::ServiceExt;

use ai_gateway::auth::api_key;
use ai_gateway::auth::service::ApiKeyAuthService;
use ai_gateway::cache::{CounterStore, MemoryCounterStore};
use ai_gateway::collect::{AiUsageLog, LogSink};
use ai_gateway::config::Configuration;
use ai_gateway::health::HealthState;
use ai_gateway::providers::openai::OpenAiProvider;
use ai_gateway::providers::ProviderRegistry;
use ai_gateway::proxy::forward::ProxyService;
use ai_gateway::quota::RateLimiter;
use ai_gateway::server::{build_router, AppContext};
use ai_gateway::store::{KeyStore, ProviderAccessRecord, UserStore};
use ai_gateway::telemetry::Metrics;
use ai_gateway::testing::{make_api_key, make_user, MemoryStore};
use ai_gateway::types::ProviderName;

pub const SECRET: &str = "integration-secret";
pub const USER_ID: &str = "64f000000000000000000001";
pub const KEY_ID: &str = "64f000000000000000000002";

pub struct TestGateway {
    pub router: Router,
    pub ctx: Arc<AppContext>,
    pub store: Arc<MemoryStore>,
}

/// 构建指向指定上游 base 的完整网关
pub fn build_gateway(upstream_base: &str) -> TestGateway {
    let store = Arc::new(MemoryStore::new());
    let user_store: Arc<dyn UserStore> = store.clone();
    let key_store: Arc<dyn KeyStore> = store.clone();
    let counter: Arc<dyn CounterStore> = Arc::new(MemoryCounterStore::new());
    let rate_limiter = Arc::new(RateLimiter::new(counter, "gw-test"));
    let http = reqwest::Client::new();

    let mut config = Configuration::default();
    config.app.secret_key = SECRET.to_string();
    config.app.name = "gw-test".to_string();
    config.app.version = "0.0.0-test".to_string();

    let mut registry = ProviderRegistry::new();
    let adapter = Arc::new(OpenAiProvider::new(http.clone(), upstream_base));
    registry.register_all(ProviderName::OpenAi, &adapter);
    registry.register_passthrough_base(ProviderName::OpenAi, upstream_base);

    let ctx = Arc::new(AppContext {
        config,
        auth: ApiKeyAuthService::new(user_store, key_store, rate_limiter, SECRET),
        registry,
        proxy: ProxyService::new(http),
        sink: LogSink::memory(),
        metrics: Metrics::new(false, &[]).unwrap(),
        health: HealthState::new(),
        started_at: Instant::now(),
    });

    TestGateway {
        router: build_router(ctx.clone()),
        ctx,
        store,
    }
}

/// 写入一个 active 使用者 + 一把 key，回传可用令牌
pub fn seed_key(store: &MemoryStore, access: Vec<ProviderAccessRecord>) -> String {
    store.insert_user(make_user(USER_ID, "Integration Tester"));
    store.insert_api_key(make_api_key(KEY_ID, USER_ID, "placeholder", access));
    api_key::issue(USER_ID, KEY_ID, SECRET).unwrap()
}

/// 在随机端口起一个假上游，回传 base URL
pub async fn spawn_upstream(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{addr}")
}

/// 发请求并收齐响应
pub async fn send(
    router: &Router,
    request: Request<Body>,
) -> (StatusCode, HeaderMap, bytes::Bytes) {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    (status, headers, body)
}

/// 等待背景任务把用量事件送进内存汇
pub async fn wait_usage(ctx: &AppContext, min_count: usize) -> Vec<AiUsageLog> {
    for _ in 0..200 {
        let captured = ctx.sink.captured_usage();
        if captured.len() >= min_count {
            return captured;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    ctx.sink.captured_usage()
}

pub fn json_body(value: &serde_json::Value) -> Body {
    Body::from(serde_json::to_vec(value).unwrap())
}

pub fn parse_json(bytes: &[u8]) -> serde_json::Value {
    serde_json::from_slice(bytes).unwrap()
}
