//! 类型化端点：错误分类、信封形态与其余端点族

mod support;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;

use ai_gateway::testing::make_access;
use ai_gateway::types::ProviderName;

use support::{build_gateway, json_body, parse_json, seed_key, send, spawn_upstream, wait_usage};

async fn failing_chat() -> impl IntoResponse {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({"error": {"message": "upstream exploded"}})),
    )
}

async fn embeddings_upstream() -> Json<serde_json::Value> {
    Json(json!({
        "object": "list",
        "data": [{"object": "embedding", "embedding": [0.1, 0.2], "index": 0}],
        "model": "text-embedding-3-small",
        "usage": {"prompt_tokens": 4, "total_tokens": 4}
    }))
}

async fn models_upstream() -> Json<serde_json::Value> {
    Json(json!({
        "object": "list",
        "data": [
            {"id": "gpt-4o", "object": "model", "created": 1, "owned_by": "openai"},
            {"id": "whisper-1", "object": "model", "created": 2, "owned_by": "openai"}
        ]
    }))
}

async fn speech_upstream() -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "audio/mpeg")],
        b"ID3fake-mp3-bytes".to_vec(),
    )
}

fn upstream_router() -> Router {
    Router::new()
        .route("/v1/chat/completions", post(failing_chat))
        .route("/v1/embeddings", post(embeddings_upstream))
        .route("/v1/models", get(models_upstream))
        .route("/v1/audio/speech", post(speech_upstream))
}

fn scopes() -> Vec<ai_gateway::store::ProviderAccessRecord> {
    vec![make_access(ProviderName::OpenAi, "sk-upstream", &["*"])]
}

#[tokio::test]
async fn upstream_failure_maps_to_bad_gateway() {
    let base = spawn_upstream(upstream_router()).await;
    let gateway = build_gateway(&base);
    let token = seed_key(&gateway.store, scopes());

    let request = Request::builder()
        .method("POST")
        .uri("/proxy/v1/openai/chat/completions")
        .header("Authorization", format!("Bearer {token}"))
        .header("Content-Type", "application/json")
        .body(json_body(&json!({
            "model": "m",
            "messages": [{"role": "user", "content": "hi"}]
        })))
        .unwrap();
    let (status, _, body) = send(&gateway.router, request).await;

    assert_eq!(status, 502);
    let envelope = parse_json(&body);
    assert_eq!(envelope["code"], 50200);
    assert_eq!(envelope["message"], "external-request-failed");
    assert!(envelope["description"]
        .as_str()
        .unwrap()
        .contains("upstream exploded"));

    // 上游失败不产生用量事件
    assert!(gateway.ctx.sink.captured_usage().is_empty());
}

#[tokio::test]
async fn malformed_body_is_bad_request() {
    let base = spawn_upstream(upstream_router()).await;
    let gateway = build_gateway(&base);
    let token = seed_key(&gateway.store, scopes());

    let request = Request::builder()
        .method("POST")
        .uri("/proxy/v1/openai/chat/completions")
        .header("Authorization", format!("Bearer {token}"))
        .header("Content-Type", "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let (status, _, body) = send(&gateway.router, request).await;

    assert_eq!(status, 400);
    let envelope = parse_json(&body);
    assert_eq!(envelope["code"], 40000);
    assert_eq!(envelope["message"], "bad-request-body");
}

#[tokio::test]
async fn embeddings_happy_path_logs_prompt_and_total() {
    let base = spawn_upstream(upstream_router()).await;
    let gateway = build_gateway(&base);
    let token = seed_key(&gateway.store, scopes());

    let request = Request::builder()
        .method("POST")
        .uri("/proxy/v1/openai/embeddings")
        .header("Authorization", format!("Bearer {token}"))
        .header("Content-Type", "application/json")
        .body(json_body(&json!({
            "input": "hello world",
            "model": "text-embedding-3-small"
        })))
        .unwrap();
    let (status, _, body) = send(&gateway.router, request).await;

    assert_eq!(status, 200);
    let envelope = parse_json(&body);
    assert_eq!(envelope["code"], 0);
    assert_eq!(envelope["data"]["usage"]["prompt_tokens"], 4);

    let usage = wait_usage(&gateway.ctx, 1).await;
    assert_eq!(usage[0].tokens_prompt, 4);
    assert_eq!(usage[0].tokens_total, 4);
    assert_eq!(usage[0].tokens_completion, 0);
    assert_eq!(usage[0].model, "text-embedding-3-small");
}

#[tokio::test]
async fn models_list_does_not_consume_quota() {
    let base = spawn_upstream(upstream_router()).await;
    let gateway = build_gateway(&base);
    let token = seed_key(&gateway.store, scopes());

    let request = Request::builder()
        .method("GET")
        .uri("/proxy/v1/openai/models")
        .header("Authorization", format!("Bearer {token}"))
        .body(Body::empty())
        .unwrap();
    let (status, _, body) = send(&gateway.router, request).await;

    assert_eq!(status, 200);
    let envelope = parse_json(&body);
    assert_eq!(envelope["data"]["data"][0]["id"], "gpt-4o");

    // 只读端点不记账
    assert!(gateway.ctx.sink.captured_usage().is_empty());
    let access = gateway
        .store
        .access_of(support::KEY_ID, ProviderName::OpenAi)
        .unwrap();
    assert_eq!(access.used_count, 0);
}

#[tokio::test]
async fn audio_speech_returns_raw_audio() {
    let base = spawn_upstream(upstream_router()).await;
    let gateway = build_gateway(&base);
    let token = seed_key(&gateway.store, scopes());

    let request = Request::builder()
        .method("POST")
        .uri("/proxy/v1/openai/audio/speech")
        .header("Authorization", format!("Bearer {token}"))
        .header("Content-Type", "application/json")
        .body(json_body(&json!({
            "input": "hello",
            "model": "tts-1",
            "voice": "alloy"
        })))
        .unwrap();
    let (status, headers, body) = send(&gateway.router, request).await;

    assert_eq!(status, 200);
    // 原始音频，不包统一信封
    assert_eq!(&body[..], b"ID3fake-mp3-bytes");
    assert_eq!(headers.get(header::CONTENT_TYPE).unwrap(), "audio/mpeg");
    assert_eq!(
        headers.get(header::CONTENT_DISPOSITION).unwrap(),
        "inline; filename=\"speech.mpeg\""
    );
    assert_eq!(headers.get("X-Proxy-Passthrough").unwrap(), "true");
}
