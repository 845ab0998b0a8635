//! 端到端场景：类型化表面（认证 → 配额 → 转发 → 记账 → 信封）

mod support;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use axum::body::Body;
use axum::extract::State;
use axum::http::Request;
use axum::routing::post;
use axum::{Json, Router};
use chrono::{Duration as ChronoDuration, Utc};
use serde_json::json;

use ai_gateway::testing::{make_access, with_quota};
use ai_gateway::types::{LimitPeriod, ProviderName};

use support::{
    build_gateway, json_body, parse_json, seed_key, send, spawn_upstream, wait_usage, KEY_ID,
    USER_ID,
};

async fn chat_upstream(State(hits): State<Arc<AtomicUsize>>) -> Json<serde_json::Value> {
    hits.fetch_add(1, Ordering::SeqCst);
    Json(json!({
        "id": "chatcmpl-x",
        "object": "chat.completion",
        "created": 1_700_000_000,
        "model": "m",
        "choices": [{
            "index": 0,
            "message": {"role": "assistant", "content": "hi there"},
            "finish_reason": "stop"
        }],
        "usage": {"prompt_tokens": 3, "completion_tokens": 5, "total_tokens": 8}
    }))
}

fn upstream_router(hits: Arc<AtomicUsize>) -> Router {
    Router::new()
        .route("/v1/chat/completions", post(chat_upstream))
        .with_state(hits)
}

fn chat_request(token: &str, path: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(path)
        .header("Authorization", format!("Bearer {token}"))
        .header("Content-Type", "application/json")
        .body(json_body(&json!({
            "model": "m",
            "messages": [{"role": "user", "content": "hi"}]
        })))
        .unwrap()
}

#[tokio::test]
async fn s1_happy_path_chat_with_quota_headers_and_usage_event() {
    let hits = Arc::new(AtomicUsize::new(0));
    let base = spawn_upstream(upstream_router(hits.clone())).await;
    let gateway = build_gateway(&base);
    let token = seed_key(
        &gateway.store,
        vec![with_quota(
            make_access(ProviderName::OpenAi, "sk-upstream", &["/chat/completions"]),
            LimitPeriod::Daily,
            5,
        )],
    );

    // 第一个请求：窗口尚未开启，预检视图为全额
    let (status, headers, body) = send(
        &gateway.router,
        chat_request(&token, "/proxy/v1/openai/chat/completions"),
    )
    .await;
    assert_eq!(status, 200);
    assert_eq!(headers.get("X-RateLimit-Limit").unwrap(), "5");
    assert_eq!(headers.get("X-RateLimit-Remaining").unwrap(), "5");

    let envelope = parse_json(&body);
    assert_eq!(envelope["code"], 0);
    assert_eq!(envelope["data"]["usage"]["total_tokens"], 8);
    assert_eq!(envelope["data"]["choices"][0]["message"]["content"], "hi there");
    assert!(!envelope["request_id"].as_str().unwrap().is_empty());

    // 第二个请求：预检读到上一次消耗后的 L-1
    let (status, headers, _) = send(
        &gateway.router,
        chat_request(&token, "/proxy/v1/openai/chat/completions"),
    )
    .await;
    assert_eq!(status, 200);
    assert_eq!(headers.get("X-RateLimit-Remaining").unwrap(), "4");

    let usage = wait_usage(&gateway.ctx, 2).await;
    assert_eq!(usage.len(), 2);
    assert_eq!(usage[0].tokens_total, 8);
    assert_eq!(usage[0].tokens_prompt, 3);
    assert_eq!(usage[0].tokens_completion, 5);
    assert_eq!(usage[0].endpoint, "/proxy/v1/openai/chat/completions");
    assert_eq!(usage[0].external_id, USER_ID);
    assert_eq!(usage[0].provider, "openai");

    // 持久计数与热计数一致
    let access = gateway.store.access_of(KEY_ID, ProviderName::OpenAi).unwrap();
    assert_eq!(access.used_count, 2);
    assert!(access.last_reset_at.is_some());
    assert_eq!(hits.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn s2_quota_exhausted_blocks_before_upstream() {
    let hits = Arc::new(AtomicUsize::new(0));
    let base = spawn_upstream(upstream_router(hits.clone())).await;
    let gateway = build_gateway(&base);
    let token = seed_key(
        &gateway.store,
        vec![with_quota(
            make_access(ProviderName::OpenAi, "sk-upstream", &["/chat/completions"]),
            LimitPeriod::Daily,
            5,
        )],
    );

    // 预置：计数器归零且窗口剩 600s
    gateway
        .ctx
        .auth
        .rate_limiter()
        .reset(KEY_ID, ProviderName::OpenAi, LimitPeriod::Daily, 600, Some(0))
        .await
        .unwrap();

    let (status, headers, body) = send(
        &gateway.router,
        chat_request(&token, "/proxy/v1/openai/chat/completions"),
    )
    .await;
    assert_eq!(status, 429);
    let retry_after: i64 = headers
        .get("Retry-After")
        .unwrap()
        .to_str()
        .unwrap()
        .parse()
        .unwrap();
    assert!((595..=600).contains(&retry_after), "retry_after={retry_after}");
    assert_eq!(headers.get("X-RateLimit-Remaining").unwrap(), "0");

    let envelope = parse_json(&body);
    assert_eq!(envelope["code"], 42900);
    assert_eq!(envelope["message"], "rate-limit-exceeded");

    // 未触达上游
    assert_eq!(hits.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn s3_unknown_provider_rejected_in_path() {
    let hits = Arc::new(AtomicUsize::new(0));
    let base = spawn_upstream(upstream_router(hits.clone())).await;
    let gateway = build_gateway(&base);
    let token = seed_key(
        &gateway.store,
        vec![make_access(ProviderName::OpenAi, "sk-upstream", &["*"])],
    );

    let (status, _, body) = send(
        &gateway.router,
        chat_request(&token, "/proxy/v1/acme/chat/completions"),
    )
    .await;
    assert_eq!(status, 400);
    let envelope = parse_json(&body);
    assert_eq!(envelope["code"], 40001);
    assert_eq!(envelope["description"], "Invalid provider in path");
    assert_eq!(hits.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn s5_expired_access_marked_and_rejected() {
    let base = spawn_upstream(upstream_router(Arc::new(AtomicUsize::new(0)))).await;
    let gateway = build_gateway(&base);

    let mut access = make_access(ProviderName::OpenAi, "sk-upstream", &["*"]);
    access.expire_time = Some(Utc::now() - ChronoDuration::hours(1));
    let token = seed_key(&gateway.store, vec![access]);

    let (status, _, body) = send(
        &gateway.router,
        chat_request(&token, "/proxy/v1/openai/chat/completions"),
    )
    .await;
    assert_eq!(status, 403);
    let envelope = parse_json(&body);
    assert_eq!(envelope["code"], 40300);
    assert_eq!(envelope["description"], "Provider access has expired");

    // 持久化副作用：状态被改为 expired
    let access = gateway.store.access_of(KEY_ID, ProviderName::OpenAi).unwrap();
    assert_eq!(access.status, ai_gateway::types::AccessStatus::Expired);
}

#[tokio::test]
async fn s6_scope_violation_forbidden() {
    let base = spawn_upstream(upstream_router(Arc::new(AtomicUsize::new(0)))).await;
    let gateway = build_gateway(&base);
    let token = seed_key(
        &gateway.store,
        vec![make_access(
            ProviderName::OpenAi,
            "sk-upstream",
            &["/chat/completions"],
        )],
    );

    let request = Request::builder()
        .method("POST")
        .uri("/proxy/v1/openai/images/generations")
        .header("Authorization", format!("Bearer {token}"))
        .header("Content-Type", "application/json")
        .body(json_body(&json!({"prompt": "a cat"})))
        .unwrap();
    let (status, _, body) = send(&gateway.router, request).await;

    assert_eq!(status, 403);
    let envelope = parse_json(&body);
    assert_eq!(envelope["code"], 40301);
    assert_eq!(envelope["message"], "forbidden");
    assert_eq!(envelope["description"], "forbidden: api scope not allowed");
}

#[tokio::test]
async fn missing_and_invalid_api_key_rejected() {
    let base = spawn_upstream(upstream_router(Arc::new(AtomicUsize::new(0)))).await;
    let gateway = build_gateway(&base);
    seed_key(
        &gateway.store,
        vec![make_access(ProviderName::OpenAi, "sk-upstream", &["*"])],
    );

    // 无令牌
    let request = Request::builder()
        .method("POST")
        .uri("/proxy/v1/openai/chat/completions")
        .body(json_body(&json!({"model": "m", "messages": []})))
        .unwrap();
    let (status, _, body) = send(&gateway.router, request).await;
    assert_eq!(status, 403);
    assert_eq!(parse_json(&body)["description"], "Missing API Key");

    // 伪造令牌
    let (status, _, body) = send(
        &gateway.router,
        chat_request("not-a-real-token", "/proxy/v1/openai/chat/completions"),
    )
    .await;
    assert_eq!(status, 403);
    assert_eq!(parse_json(&body)["description"], "Invalid API Key");
}

#[tokio::test]
async fn unsupported_version_is_505() {
    let base = spawn_upstream(upstream_router(Arc::new(AtomicUsize::new(0)))).await;
    let gateway = build_gateway(&base);
    let token = seed_key(
        &gateway.store,
        vec![make_access(ProviderName::OpenAi, "sk-upstream", &["*"])],
    );

    let (status, _, body) = send(
        &gateway.router,
        chat_request(&token, "/proxy/v2/openai/chat/completions"),
    )
    .await;
    assert_eq!(status, 505);
    assert_eq!(parse_json(&body)["code"], 50401);
}

#[tokio::test]
async fn x_api_key_header_also_accepted() {
    let hits = Arc::new(AtomicUsize::new(0));
    let base = spawn_upstream(upstream_router(hits.clone())).await;
    let gateway = build_gateway(&base);
    let token = seed_key(
        &gateway.store,
        vec![make_access(ProviderName::OpenAi, "sk-upstream", &["*"])],
    );

    let request = Request::builder()
        .method("POST")
        .uri("/proxy/v1/openai/chat/completions")
        .header("X-API-Key", token)
        .header("Content-Type", "application/json")
        .body(json_body(&json!({
            "model": "m",
            "messages": [{"role": "user", "content": "hi"}]
        })))
        .unwrap();
    let (status, _, body) = send(&gateway.router, request).await;
    assert_eq!(status, 200);
    assert_eq!(parse_json(&body)["code"], 0);
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn blocked_user_rejected() {
    let base = spawn_upstream(upstream_router(Arc::new(AtomicUsize::new(0)))).await;
    let gateway = build_gateway(&base);
    let token = seed_key(
        &gateway.store,
        vec![make_access(ProviderName::OpenAi, "sk-upstream", &["*"])],
    );
    // 覆写使用者为 blocked
    let mut user = ai_gateway::testing::make_user(USER_ID, "Blocked");
    user.status = ai_gateway::types::AccessStatus::Blocked;
    gateway.store.insert_user(user);

    let (status, _, body) = send(
        &gateway.router,
        chat_request(&token, "/proxy/v1/openai/chat/completions"),
    )
    .await;
    assert_eq!(status, 401);
    assert_eq!(parse_json(&body)["code"], 40100);
}
