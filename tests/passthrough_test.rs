//! 透传端到端：逐字节一致、标头卫生、SSE 侧录与用量事件

mod support;

use axum::body::Body;
use axum::http::{header, HeaderMap, Request, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::any;
use axum::{Json, Router};
use serde_json::json;

use ai_gateway::testing::{make_access, with_quota};
use ai_gateway::types::{LimitPeriod, ProviderName};

use support::{build_gateway, parse_json, seed_key, send, spawn_upstream, wait_usage, KEY_ID};

const RAW_BODY: &[u8] = b"\x00\x01raw bytes \xf0\x9f\x8e\x89 not json";

const SSE_BODY: &str = "data: {\"id\":\"s1\",\"model\":\"m\",\"choices\":[{\"delta\":{\"content\":\"A\"}}]}\n\n\
data: {\"choices\":[{\"delta\":{\"content\":\"B\"}}]}\n\n\
data: {\"choices\":[],\"usage\":{\"total_tokens\":12}}\n\ndata: [DONE]\n";

async fn raw_upstream() -> Response {
    let mut response = (StatusCode::OK, RAW_BODY.to_vec()).into_response();
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        "application/octet-stream".parse().unwrap(),
    );
    response
        .headers_mut()
        .insert("x-upstream", "yes".parse().unwrap());
    // 逐跳标头：网关必须剥掉
    response
        .headers_mut()
        .insert("proxy-authenticate", "Basic".parse().unwrap());
    response
}

async fn teapot_upstream() -> Response {
    (StatusCode::IM_A_TEAPOT, "short and stout").into_response()
}

async fn sse_upstream() -> Response {
    let mut response = (StatusCode::OK, SSE_BODY.to_string()).into_response();
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        "text/event-stream".parse().unwrap(),
    );
    response
}

async fn echo_headers_upstream(headers: HeaderMap) -> Json<serde_json::Value> {
    let mut map = serde_json::Map::new();
    for (name, value) in &headers {
        map.insert(
            name.as_str().to_string(),
            json!(value.to_str().unwrap_or("")),
        );
    }
    Json(serde_json::Value::Object(map))
}

fn upstream_router() -> Router {
    Router::new()
        .route("/v1/raw", any(raw_upstream))
        .route("/v1/teapot", any(teapot_upstream))
        .route("/v1/sse", any(sse_upstream))
        .route("/v1/echo", any(echo_headers_upstream))
}

fn passthrough_request(token: &str, path: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(path)
        .header("Authorization", format!("Bearer {token}"))
        .body(Body::empty())
        .unwrap()
}

fn mcp_scopes() -> Vec<ai_gateway::store::ProviderAccessRecord> {
    vec![make_access(
        ProviderName::OpenAi,
        "sk-upstream-key",
        &["/mcp-server/*"],
    )]
}

#[tokio::test]
async fn non_stream_body_is_byte_identical() {
    let base = spawn_upstream(upstream_router()).await;
    let gateway = build_gateway(&base);
    let token = seed_key(&gateway.store, mcp_scopes());

    let (status, headers, body) = send(
        &gateway.router,
        passthrough_request(&token, "/mcp-server/v1/openai/raw"),
    )
    .await;

    assert_eq!(status, 200);
    assert_eq!(&body[..], RAW_BODY);
    assert_eq!(headers.get("X-Proxy-Passthrough").unwrap(), "true");
    assert_eq!(headers.get("x-upstream").unwrap(), "yes");
    assert!(headers.get("proxy-authenticate").is_none());

    // 非 SSE 的原始字节：事件照发、计数为零
    let usage = wait_usage(&gateway.ctx, 1).await;
    assert_eq!(usage.len(), 1);
    assert_eq!(usage[0].endpoint, "/mcp-server/v1/openai/raw");
    assert_eq!(usage[0].project_name, "mcp-server");
    assert_eq!(usage[0].tokens_total, 0);
}

#[tokio::test]
async fn upstream_status_forwarded_without_envelope() {
    let base = spawn_upstream(upstream_router()).await;
    let gateway = build_gateway(&base);
    let token = seed_key(&gateway.store, mcp_scopes());

    let (status, headers, body) = send(
        &gateway.router,
        passthrough_request(&token, "/mcp-server/v1/openai/teapot"),
    )
    .await;

    assert_eq!(status, StatusCode::IM_A_TEAPOT);
    assert_eq!(&body[..], b"short and stout");
    assert_eq!(headers.get("X-Proxy-Passthrough").unwrap(), "true");
}

#[tokio::test]
async fn s4_sse_stream_is_verbatim_and_usage_extracted() {
    let base = spawn_upstream(upstream_router()).await;
    let gateway = build_gateway(&base);
    let token = seed_key(&gateway.store, mcp_scopes());

    let request = Request::builder()
        .method("POST")
        .uri("/mcp-server/v1/openai/sse")
        .header("Authorization", format!("Bearer {token}"))
        .header("Accept", "text/event-stream")
        .body(Body::empty())
        .unwrap();
    let (status, headers, body) = send(&gateway.router, request).await;

    assert_eq!(status, 200);
    // 字节级一致
    assert_eq!(&body[..], SSE_BODY.as_bytes());
    // 串流模式不回传 Content-Length
    assert!(headers.get(header::CONTENT_LENGTH).is_none());
    assert_eq!(
        headers.get(header::CONTENT_TYPE).unwrap(),
        "text/event-stream"
    );

    let usage = wait_usage(&gateway.ctx, 1).await;
    assert_eq!(usage.len(), 1);
    assert_eq!(usage[0].tokens_total, 12);
    assert_eq!(usage[0].model, "m");
    assert_eq!(usage[0].endpoint, "/mcp-server/v1/openai/sse");
}

#[tokio::test]
async fn stream_query_parameter_also_triggers_streaming() {
    let base = spawn_upstream(upstream_router()).await;
    let gateway = build_gateway(&base);
    let token = seed_key(&gateway.store, mcp_scopes());

    let (status, headers, body) = send(
        &gateway.router,
        passthrough_request(&token, "/mcp-server/v1/openai/sse?stream=true"),
    )
    .await;

    assert_eq!(status, 200);
    assert_eq!(&body[..], SSE_BODY.as_bytes());
    assert!(headers.get(header::CONTENT_LENGTH).is_none());
}

#[tokio::test]
async fn platform_token_replaced_by_provider_credential() {
    let base = spawn_upstream(upstream_router()).await;
    let gateway = build_gateway(&base);
    let token = seed_key(&gateway.store, mcp_scopes());

    let request = Request::builder()
        .method("GET")
        .uri("/mcp-server/v1/openai/echo")
        .header("Authorization", format!("Bearer {token}"))
        .header("X-Custom", "kept")
        .header("Connection", "x-drop-me")
        .header("x-drop-me", "secret")
        .header("Keep-Alive", "timeout=5")
        .body(Body::empty())
        .unwrap();
    let (status, _, body) = send(&gateway.router, request).await;

    assert_eq!(status, 200);
    let echoed = parse_json(&body);
    // 平台令牌绝不外泄：上游看到的是注入的 provider 凭证
    assert_eq!(echoed["authorization"], "Bearer sk-upstream-key");
    assert_eq!(echoed["x-custom"], "kept");
    assert!(echoed.get("x-drop-me").is_none());
    assert!(echoed.get("keep-alive").is_none());
    assert!(echoed.get("connection").is_none());
}

#[tokio::test]
async fn passthrough_scope_and_quota_enforced() {
    let base = spawn_upstream(upstream_router()).await;
    let gateway = build_gateway(&base);

    // scope 只有 /chat/completions → 透传子树被拒
    let token = seed_key(
        &gateway.store,
        vec![make_access(
            ProviderName::OpenAi,
            "sk-upstream-key",
            &["/chat/completions"],
        )],
    );
    let (status, _, body) = send(
        &gateway.router,
        passthrough_request(&token, "/mcp-server/v1/openai/raw"),
    )
    .await;
    assert_eq!(status, 403);
    assert_eq!(parse_json(&body)["message"], "forbidden");
}

#[tokio::test]
async fn passthrough_consumes_quota_eagerly() {
    let base = spawn_upstream(upstream_router()).await;
    let gateway = build_gateway(&base);
    let token = seed_key(
        &gateway.store,
        vec![with_quota(
            make_access(ProviderName::OpenAi, "sk-upstream-key", &["/mcp-server/*"]),
            LimitPeriod::Daily,
            3,
        )],
    );

    let (status, _, _) = send(
        &gateway.router,
        passthrough_request(&token, "/mcp-server/v1/openai/raw"),
    )
    .await;
    assert_eq!(status, 200);

    let outcome = gateway
        .ctx
        .auth
        .rate_limiter()
        .get_current(KEY_ID, ProviderName::OpenAi, LimitPeriod::Daily, 3)
        .await
        .unwrap();
    assert_eq!(outcome.remaining, 2);

    let access = gateway.store.access_of(KEY_ID, ProviderName::OpenAi).unwrap();
    assert_eq!(access.used_count, 1);
}
