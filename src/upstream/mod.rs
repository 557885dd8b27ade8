//! Upstream completion API client
//!
//! Single owner of the connection to the hosted chat-completion API. Every
//! failure mode - HTTP errors, timeouts, transport failures, malformed
//! bodies - is translated into one [`UpstreamError`] carrying a status code,
//! a message, and optionally the raw body for diagnostics. The fallback
//! logic in the router service is built entirely on this taxonomy.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::RwLock;

use crate::api::types::{ChatCompletionRequest, ChatCompletionResponse};
use crate::config::Config;

/// Fixed message for upstream call timeouts
pub const TIMEOUT_MESSAGE: &str = "Request to upstream completion API timed out";
/// Fixed message for empty or degenerate upstream answers
pub const INVALID_RESPONSE_MESSAGE: &str = "Empty or invalid response from upstream model";

/// Error raised for any upstream completion API failure
#[derive(Error, Debug, Clone)]
#[error("upstream error {status_code}: {message}")]
pub struct UpstreamError {
    /// HTTP status describing the failure (gateway-style for non-HTTP causes)
    pub status_code: u16,
    pub message: String,
    /// Raw upstream body, attached when available for diagnostics
    pub body: Option<serde_json::Value>,
}

impl UpstreamError {
    pub fn new(status_code: u16, message: impl Into<String>) -> Self {
        Self {
            status_code,
            message: message.into(),
            body: None,
        }
    }

    pub fn with_body(mut self, body: serde_json::Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Timeout waiting for the upstream API (504)
    pub fn timeout() -> Self {
        Self::new(504, TIMEOUT_MESSAGE)
    }

    /// Transport-level failure reaching the upstream API (503)
    pub fn connection(cause: impl std::fmt::Display) -> Self {
        Self::new(
            503,
            format!("Failed to connect to upstream completion API: {}", cause),
        )
    }

    /// 2xx reply whose body failed schema validation (502)
    pub fn malformed_body(detail: impl std::fmt::Display, raw_body: String) -> Self {
        Self::new(
            502,
            format!("Invalid response from upstream completion API: {}", detail),
        )
        .with_body(serde_json::json!({ "raw_response": raw_body }))
    }

    /// Structurally valid reply that failed the validity predicate (502)
    pub fn invalid_response() -> Self {
        Self::new(502, INVALID_RESPONSE_MESSAGE)
    }

    /// Anything that doesn't fit the taxonomy (500)
    pub fn unexpected(cause: impl std::fmt::Display) -> Self {
        Self::new(500, format!("Unexpected upstream client error: {}", cause))
    }
}

/// Seam between the router service and the upstream API
///
/// The production implementation is [`UpstreamClient`]; tests substitute
/// scripted backends to exercise the fallback paths without a network.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    /// Execute a chat completion against a specific upstream model
    ///
    /// `force_model` is the upstream model identifier the router decided on;
    /// it always overrides whatever the caller put in the request.
    async fn chat_completion(
        &self,
        request: &ChatCompletionRequest,
        force_model: &str,
    ) -> Result<ChatCompletionResponse, UpstreamError>;

    /// Lightweight reachability probe; never fails, only reports
    async fn health_check(&self) -> bool;

    /// Release pooled connections. Required at process shutdown.
    async fn close(&self);
}

/// HTTP client for the upstream completion API
///
/// Owns the connection pool: the inner reqwest client is created lazily on
/// first use and shared by all in-flight requests, and `close()` drops it,
/// releasing every pooled connection.
pub struct UpstreamClient {
    config: Arc<Config>,
    client: RwLock<Option<reqwest::Client>>,
}

impl UpstreamClient {
    pub fn new(config: Arc<Config>) -> Self {
        Self {
            config,
            client: RwLock::new(None),
        }
    }

    /// Get or lazily create the pooled HTTP client
    async fn http_client(&self) -> Result<reqwest::Client, UpstreamError> {
        if let Some(client) = self.client.read().await.as_ref() {
            return Ok(client.clone());
        }

        let mut guard = self.client.write().await;
        // Another request may have created the client while we waited
        if let Some(client) = guard.as_ref() {
            return Ok(client.clone());
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(self.config.upstream.timeout_seconds))
            .pool_max_idle_per_host(self.config.upstream.max_idle_connections)
            .user_agent(concat!("modelgate/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(UpstreamError::unexpected)?;

        *guard = Some(client.clone());
        tracing::debug!(
            timeout_seconds = self.config.upstream.timeout_seconds,
            max_idle_connections = self.config.upstream.max_idle_connections,
            "Upstream HTTP client initialized"
        );
        Ok(client)
    }

    /// Serialize the request body, overriding the model with the decided
    /// upstream identifier
    fn prepare_body(
        request: &ChatCompletionRequest,
        force_model: &str,
    ) -> Result<serde_json::Value, UpstreamError> {
        let mut body = serde_json::to_value(request).map_err(UpstreamError::unexpected)?;
        body["model"] = serde_json::Value::String(force_model.to_string());
        Ok(body)
    }

    /// Classify a reqwest transport error into the taxonomy
    fn classify_transport(error: reqwest::Error) -> UpstreamError {
        if error.is_timeout() {
            tracing::error!(error = %error, "Upstream request timed out");
            return UpstreamError::timeout();
        }
        tracing::error!(error = %error, "Upstream request failed");
        UpstreamError::connection(error)
    }

    /// Extract the most useful message from a non-2xx upstream reply
    ///
    /// Prefers the nested `error.message` field, then the whole error
    /// object, then the raw body text, then a generic "HTTP {code}".
    fn error_message(status: u16, body_text: &str) -> (String, Option<serde_json::Value>) {
        let fallback = format!("HTTP {}", status);

        match serde_json::from_str::<serde_json::Value>(body_text) {
            Ok(body) => {
                let detail = body.get("error").unwrap_or(&body);
                let message = detail
                    .get("message")
                    .and_then(|m| m.as_str())
                    .map(str::to_string)
                    .unwrap_or_else(|| match detail {
                        serde_json::Value::String(s) => s.clone(),
                        other => other.to_string(),
                    });
                (message, Some(body))
            }
            Err(_) if !body_text.is_empty() => (body_text.to_string(), None),
            Err(_) => (fallback, None),
        }
    }
}

#[async_trait]
impl CompletionBackend for UpstreamClient {
    async fn chat_completion(
        &self,
        request: &ChatCompletionRequest,
        force_model: &str,
    ) -> Result<ChatCompletionResponse, UpstreamError> {
        let client = self.http_client().await?;
        let body = Self::prepare_body(request, force_model)?;
        let url = format!("{}/chat/completions", self.config.upstream.base_url);

        tracing::debug!(
            model = force_model,
            messages = request.messages().len(),
            tools = request.has_tools(),
            "Sending upstream completion request"
        );

        let response = client
            .post(&url)
            .bearer_auth(&self.config.upstream.api_key)
            .json(&body)
            .send()
            .await
            .map_err(Self::classify_transport)?;

        let status = response.status().as_u16();
        let body_text = response.text().await.map_err(Self::classify_transport)?;

        if !(200..300).contains(&status) {
            let (message, error_body) = Self::error_message(status, &body_text);
            tracing::error!(
                status = status,
                message = %message,
                "Upstream completion request failed"
            );
            let mut error = UpstreamError::new(status, message);
            if let Some(body) = error_body {
                error = error.with_body(body);
            }
            return Err(error);
        }

        let completion: ChatCompletionResponse = serde_json::from_str(&body_text)
            .map_err(|e| UpstreamError::malformed_body(e, body_text.clone()))?;

        if let Some(usage) = &completion.usage {
            tracing::debug!(
                prompt_tokens = usage.prompt_tokens,
                completion_tokens = usage.completion_tokens,
                "Upstream usage reported"
            );
        }

        Ok(completion)
    }

    async fn health_check(&self) -> bool {
        let client = match self.http_client().await {
            Ok(client) => client,
            Err(e) => {
                tracing::warn!(error = %e, "Health check could not create HTTP client");
                return false;
            }
        };

        let url = format!("{}/models", self.config.upstream.base_url);
        let result = client
            .get(&url)
            .bearer_auth(&self.config.upstream.api_key)
            .timeout(Duration::from_secs(
                self.config.upstream.health_check_timeout_seconds,
            ))
            .send()
            .await;

        match result {
            Ok(response) if response.status().is_success() => true,
            Ok(response) => {
                tracing::warn!(
                    status = response.status().as_u16(),
                    "Upstream health check returned non-success status"
                );
                false
            }
            Err(e) => {
                tracing::warn!(error = %e, "Upstream health check failed");
                false
            }
        }
    }

    async fn close(&self) {
        let mut guard = self.client.write().await;
        if guard.take().is_some() {
            tracing::info!("Upstream HTTP client closed, pooled connections released");
        }
    }
}
