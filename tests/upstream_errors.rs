//! Integration tests for the upstream client error taxonomy
//!
//! Each upstream failure mode must map to exactly one status code and a
//! useful message, since the fallback logic and the caller-facing errors
//! are both built on this mapping.

use modelgate::api::types::ChatCompletionRequest;
use modelgate::config::Config;
use modelgate::upstream::{CompletionBackend, TIMEOUT_MESSAGE, UpstreamClient};
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn config_for(server: &MockServer, timeout_seconds: u64) -> Arc<Config> {
    let toml = format!(
        r#"
[server]
host = "127.0.0.1"
port = 8080

[upstream]
base_url = "{}"
api_key = "sk-test"
timeout_seconds = {}
health_check_timeout_seconds = 1

[models]
small = "mistral-small-latest"
medium = "mistral-medium-latest"
"#,
        server.uri(),
        timeout_seconds
    );
    Arc::new(toml::from_str(&toml).expect("should parse test config"))
}

fn request() -> ChatCompletionRequest {
    ChatCompletionRequest::builder()
        .model("auto")
        .user_message("Hi")
        .build()
        .expect("valid request")
}

#[tokio::test]
async fn non_2xx_with_nested_error_message() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(401).set_body_json(serde_json::json!({
            "error": {"message": "invalid api key", "type": "authentication_error"}
        })))
        .mount(&server)
        .await;

    let client = UpstreamClient::new(config_for(&server, 5));
    let error = client
        .chat_completion(&request(), "mistral-small-latest")
        .await
        .expect_err("should fail");

    assert_eq!(error.status_code, 401);
    assert_eq!(error.message, "invalid api key");
    assert!(error.body.is_some(), "parsed error body is kept");
}

#[tokio::test]
async fn non_2xx_with_plain_text_body_uses_raw_text() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(503).set_body_string("Service Unavailable"))
        .mount(&server)
        .await;

    let client = UpstreamClient::new(config_for(&server, 5));
    let error = client
        .chat_completion(&request(), "mistral-small-latest")
        .await
        .expect_err("should fail");

    assert_eq!(error.status_code, 503);
    assert_eq!(error.message, "Service Unavailable");
}

#[tokio::test]
async fn non_2xx_with_empty_body_uses_generic_message() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let client = UpstreamClient::new(config_for(&server, 5));
    let error = client
        .chat_completion(&request(), "mistral-small-latest")
        .await
        .expect_err("should fail");

    assert_eq!(error.status_code, 500);
    assert_eq!(error.message, "HTTP 500");
}

#[tokio::test]
async fn timeout_maps_to_504() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({"ignored": true}))
                .set_delay(Duration::from_secs(3)),
        )
        .mount(&server)
        .await;

    let client = UpstreamClient::new(config_for(&server, 1));
    let error = client
        .chat_completion(&request(), "mistral-small-latest")
        .await
        .expect_err("should time out");

    assert_eq!(error.status_code, 504);
    assert_eq!(error.message, TIMEOUT_MESSAGE);
}

#[tokio::test]
async fn connection_failure_maps_to_503() {
    // A server that is stopped before the call leaves a refused port behind
    let server = MockServer::start().await;
    let config = config_for(&server, 2);
    drop(server);

    let client = UpstreamClient::new(config);
    let error = client
        .chat_completion(&request(), "mistral-small-latest")
        .await
        .expect_err("should fail to connect");

    assert_eq!(error.status_code, 503);
    assert!(error.message.contains("Failed to connect"));
}

#[tokio::test]
async fn malformed_2xx_body_maps_to_502_with_raw_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_string("this is not a completion"))
        .mount(&server)
        .await;

    let client = UpstreamClient::new(config_for(&server, 5));
    let error = client
        .chat_completion(&request(), "mistral-small-latest")
        .await
        .expect_err("should fail validation");

    assert_eq!(error.status_code, 502);
    assert!(error.message.contains("Invalid response"));
    assert_eq!(
        error.body.unwrap()["raw_response"],
        "this is not a completion"
    );
}

#[tokio::test]
async fn schema_violating_2xx_json_maps_to_502() {
    let server = MockServer::start().await;
    // Valid JSON, wrong shape: choices missing entirely
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "id": "cmpl-1", "created": 1700000000, "model": "m"
        })))
        .mount(&server)
        .await;

    let client = UpstreamClient::new(config_for(&server, 5));
    let error = client
        .chat_completion(&request(), "mistral-small-latest")
        .await
        .expect_err("should fail schema validation");

    assert_eq!(error.status_code, 502);
}

#[tokio::test]
async fn request_body_carries_forced_model_and_auth() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(wiremock::matchers::header("authorization", "Bearer sk-test"))
        .and(wiremock::matchers::body_partial_json(
            serde_json::json!({"model": "mistral-medium-latest"}),
        ))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "id": "cmpl-1",
            "object": "chat.completion",
            "created": 1700000000,
            "model": "mistral-medium-latest",
            "choices": [{
                "index": 0,
                "message": {"role": "assistant", "content": "A fine answer"},
                "finish_reason": "stop"
            }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = UpstreamClient::new(config_for(&server, 5));
    let response = client
        .chat_completion(&request(), "mistral-medium-latest")
        .await
        .expect("should succeed");

    assert_eq!(response.model, "mistral-medium-latest");
}

#[tokio::test]
async fn health_check_true_when_models_endpoint_answers() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/models"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "object": "list", "data": []
        })))
        .mount(&server)
        .await;

    let client = UpstreamClient::new(config_for(&server, 5));
    assert!(client.health_check().await);
}

#[tokio::test]
async fn health_check_false_on_error_status() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/models"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let client = UpstreamClient::new(config_for(&server, 5));
    assert!(!client.health_check().await);
}

#[tokio::test]
async fn health_check_false_on_timeout_never_errors() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/models"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(3)))
        .mount(&server)
        .await;

    // Health-check timeout is 1s, shorter than the 3s delay
    let client = UpstreamClient::new(config_for(&server, 5));
    assert!(!client.health_check().await);
}

#[tokio::test]
async fn health_check_false_when_unreachable() {
    let server = MockServer::start().await;
    let config = config_for(&server, 2);
    drop(server);

    let client = UpstreamClient::new(config);
    assert!(!client.health_check().await);
}

#[tokio::test]
async fn close_releases_and_recreates_client() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/models"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let client = UpstreamClient::new(config_for(&server, 5));
    assert!(client.health_check().await);
    client.close().await;
    // A closed client lazily reopens on next use
    assert!(client.health_check().await);
}
