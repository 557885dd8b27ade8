//! Integration tests for the HTTP surface
//!
//! Drives the full Axum application in-process with a wiremock upstream,
//! covering authentication, request validation, routing headers, and the
//! health and metrics endpoints.

use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode},
};
use modelgate::api::{self, AppState};
use modelgate::config::Config;
use std::sync::Arc;
use tower::ServiceExt;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn app_for(server: &MockServer) -> Router {
    let toml = format!(
        r#"
[server]
host = "127.0.0.1"
port = 8080
api_key = "gateway-key"

[upstream]
base_url = "{}"
api_key = "sk-upstream"
timeout_seconds = 5

[models]
small = "mistral-small-latest"
medium = "mistral-medium-latest"
"#,
        server.uri()
    );
    let config: Config = toml::from_str(&toml).expect("should parse test config");
    let state = AppState::new(Arc::new(config)).expect("should create state");
    api::router(state)
}

fn completion_json(content: &str) -> serde_json::Value {
    serde_json::json!({
        "id": "cmpl-test",
        "object": "chat.completion",
        "created": 1700000000,
        "model": "mistral-small-latest",
        "choices": [{
            "index": 0,
            "message": {"role": "assistant", "content": content},
            "finish_reason": "stop"
        }],
        "usage": {"prompt_tokens": 12, "completion_tokens": 8, "total_tokens": 20}
    })
}

fn chat_request(body: &str, auth: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/v1/chat/completions")
        .header("content-type", "application/json");
    if let Some(auth) = auth {
        builder = builder.header("authorization", auth);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("should read body");
    serde_json::from_slice(&bytes).expect("body should be JSON")
}

const SIMPLE_BODY: &str = r#"{
    "model": "auto",
    "messages": [{"role": "user", "content": "Hello there"}]
}"#;

#[tokio::test]
async fn successful_request_returns_routing_headers() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion_json("Hi, human!")))
        .mount(&server)
        .await;

    let app = app_for(&server);
    let response = app
        .oneshot(chat_request(SIMPLE_BODY, Some("Bearer gateway-key")))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let headers = response.headers();
    assert_eq!(
        headers.get("x-router-model").unwrap(),
        "mistral-small-latest"
    );
    assert_eq!(headers.get("x-router-model-logical").unwrap(), "small");
    assert_eq!(headers.get("x-router-reason").unwrap(), "default_small");
    assert_eq!(headers.get("x-router-fallback").unwrap(), "false");
    assert!(headers.contains_key("x-router-request-id"));
    assert!(headers.contains_key("x-router-latency-ms"));
    assert!(headers.contains_key("x-router-cost-usd"));
    assert_eq!(headers.get("x-router-tokens-input").unwrap(), "12");
    assert_eq!(headers.get("x-router-tokens-output").unwrap(), "8");

    let body = body_json(response).await;
    assert_eq!(
        body["choices"][0]["message"]["content"],
        "Hi, human!"
    );
}

#[tokio::test]
async fn fallback_is_visible_in_headers() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(wiremock::matchers::body_partial_json(
            serde_json::json!({"model": "mistral-small-latest"}),
        ))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(wiremock::matchers::body_partial_json(
            serde_json::json!({"model": "mistral-medium-latest"}),
        ))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion_json("Recovered!")))
        .mount(&server)
        .await;

    let app = app_for(&server);
    let response = app
        .oneshot(chat_request(SIMPLE_BODY, Some("Bearer gateway-key")))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let headers = response.headers();
    assert_eq!(headers.get("x-router-fallback").unwrap(), "true");
    assert_eq!(headers.get("x-router-reason").unwrap(), "fallback");
    assert_eq!(
        headers.get("x-router-original-model").unwrap(),
        "mistral-small-latest"
    );
    assert_eq!(
        headers.get("x-router-original-model-logical").unwrap(),
        "small"
    );
}

#[tokio::test]
async fn missing_auth_is_401() {
    let server = MockServer::start().await;
    let app = app_for(&server);

    let response = app.oneshot(chat_request(SIMPLE_BODY, None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let body = body_json(response).await;
    assert_eq!(body["error"]["type"], "authentication_error");
}

#[tokio::test]
async fn wrong_key_is_401() {
    let server = MockServer::start().await;
    let app = app_for(&server);

    let response = app
        .oneshot(chat_request(SIMPLE_BODY, Some("Bearer nope")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn streaming_request_is_rejected_with_400() {
    let server = MockServer::start().await;
    let app = app_for(&server);

    let body = r#"{
        "model": "auto",
        "messages": [{"role": "user", "content": "Hello"}],
        "stream": true
    }"#;
    let response = app
        .oneshot(chat_request(body, Some("Bearer gateway-key")))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert!(
        body["error"]["message"]
            .as_str()
            .unwrap()
            .contains("Streaming")
    );
}

#[tokio::test]
async fn malformed_request_shape_is_4xx() {
    let server = MockServer::start().await;
    let app = app_for(&server);

    // Empty messages violate the schema during deserialization
    let body = r#"{"model": "auto", "messages": []}"#;
    let response = app
        .oneshot(chat_request(body, Some("Bearer gateway-key")))
        .await
        .unwrap();

    assert!(response.status().is_client_error());
}

#[tokio::test]
async fn terminal_upstream_failure_propagates_status() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(503).set_body_json(serde_json::json!({
            "error": {"message": "overloaded", "type": "server_error"}
        })))
        .mount(&server)
        .await;

    let app = app_for(&server);
    // Pin medium so the failure is terminal with no fallback
    let body = r#"{
        "model": "medium",
        "messages": [{"role": "user", "content": "Hello"}]
    }"#;
    let response = app
        .oneshot(chat_request(body, Some("Bearer gateway-key")))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body = body_json(response).await;
    assert_eq!(body["error"]["message"], "overloaded");
    assert_eq!(body["error"]["type"], "upstream_error");
}

#[tokio::test]
async fn health_endpoint_reflects_upstream_state() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/models"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let app = app_for(&server);
    let response = app
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["service"], "modelgate");
}

#[tokio::test]
async fn health_endpoint_503_when_upstream_down() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/models"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let app = app_for(&server);
    let response = app
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn metrics_endpoint_exposes_request_counters() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion_json("Hi, human!")))
        .mount(&server)
        .await;

    let config_toml = format!(
        r#"
[server]
host = "127.0.0.1"
port = 8080
api_key = "gateway-key"

[upstream]
base_url = "{}"
api_key = "sk-upstream"

[models]
small = "mistral-small-latest"
medium = "mistral-medium-latest"
"#,
        server.uri()
    );
    let config: Config = toml::from_str(&config_toml).expect("should parse test config");
    let state = AppState::new(Arc::new(config)).expect("should create state");

    // Same state for both calls so the counter survives between requests
    let response = api::router(state.clone())
        .oneshot(chat_request(SIMPLE_BODY, Some("Bearer gateway-key")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = api::router(state)
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/metrics")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(text.contains("modelgate_requests_total"));
    assert!(text.contains(r#"model="small""#));
    assert!(text.contains("modelgate_active_requests 0"));
}
