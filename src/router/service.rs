//! Router service
//!
//! Orchestrates one request end to end: obtains a routing decision, executes
//! it against the upstream client, validates the answer, performs at most one
//! small-to-medium fallback, and accounts latency, token usage, and cost in
//! the request metadata.

use std::sync::Arc;
use std::time::Instant;

use tracing::Instrument;
use uuid::Uuid;

use super::{HeuristicStrategy, ModelType, RequestMetadata};
use crate::api::types::{ChatCompletionRequest, ChatCompletionResponse};
use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::metrics::Metrics;
use crate::upstream::{CompletionBackend, UpstreamError};

/// Core router service handling routing, fallback, and cost tracking
///
/// Generic over the upstream backend so the fallback logic can be exercised
/// against scripted doubles in tests.
pub struct RouterService<C: CompletionBackend> {
    config: Arc<Config>,
    strategy: HeuristicStrategy,
    client: C,
    metrics: Metrics,
}

impl<C: CompletionBackend> RouterService<C> {
    pub fn new(config: Arc<Config>, client: C, metrics: Metrics) -> Self {
        Self {
            strategy: HeuristicStrategy::new(config.clone()),
            config,
            client,
            metrics,
        }
    }

    /// Route a chat completion request to the appropriate model
    ///
    /// A failing or degenerate answer from the small model is retried once on
    /// the medium model; a failure on medium is terminal. On terminal failure
    /// the metadata (including its error field) is logged here before the
    /// upstream error propagates to the caller.
    ///
    /// # Errors
    ///
    /// - [`AppError::Validation`] if the request is unsupported (streaming)
    /// - [`AppError::Upstream`] if the final attempt failed, carrying the
    ///   second attempt's status code and message when a fallback was tried
    pub async fn route(
        &self,
        request: &ChatCompletionRequest,
    ) -> AppResult<(ChatCompletionResponse, RequestMetadata)> {
        if request.stream() {
            return Err(AppError::Validation(
                "Streaming is not supported in this version".to_string(),
            ));
        }

        let request_id = Uuid::new_v4();
        let span = tracing::info_span!("route_request", request_id = %request_id);
        self.route_inner(request, request_id).instrument(span).await
    }

    async fn route_inner(
        &self,
        request: &ChatCompletionRequest,
        request_id: Uuid,
    ) -> AppResult<(ChatCompletionResponse, RequestMetadata)> {
        let decision = self.strategy.decide(request);
        tracing::info!(
            model = decision.model().api_name(&self.config.models),
            reason = %decision.reason(),
            decision = %decision.to_log_value(&self.config.models),
            "Routing decision made"
        );

        let mut metadata = RequestMetadata::new(request_id, &decision);
        if let Some(estimate) = decision.estimated_tokens() {
            metadata.insert_context("estimated_tokens", serde_json::json!(estimate));
        }

        // Active-request gauge is held for the whole call; the guard
        // decrements on every exit path, including early returns below.
        let _active = self.metrics.track_active_request();
        let timer = Instant::now();

        let first_attempt = self.execute_validated(request, decision.model()).await;

        let response = match first_attempt {
            Ok(response) => response,
            Err(error) if decision.model().is_small() => {
                tracing::warn!(
                    model = decision.model().api_name(&self.config.models),
                    status = error.status_code,
                    error = %error.message,
                    "Primary model failed, attempting fallback to medium"
                );

                metadata.record_fallback(ModelType::Medium);

                match self.execute_validated(request, ModelType::Medium).await {
                    Ok(response) => response,
                    Err(second) => {
                        return Err(self.finish_failed(metadata, second, timer));
                    }
                }
            }
            Err(error) => {
                // No fallback path exists above medium
                return Err(self.finish_failed(metadata, error, timer));
            }
        };

        metadata.record_latency(elapsed_ms(timer));

        if let Some(usage) = &response.usage {
            let cost = calculate_cost(
                metadata.selected_model(),
                usage.prompt_tokens,
                usage.completion_tokens,
                &self.config.pricing,
            );
            metadata.record_usage(usage.prompt_tokens, usage.completion_tokens, cost);
        }

        tracing::info!(
            metadata = %metadata.to_log_value(&self.config.models),
            "Request completed"
        );
        self.metrics.record_completion(&metadata, 200);

        Ok((response, metadata))
    }

    /// Execute one attempt and apply the validity predicate
    ///
    /// A structurally valid but degenerate answer is reported as a 502
    /// upstream error, so the caller's fallback handling covers both cases
    /// identically.
    async fn execute_validated(
        &self,
        request: &ChatCompletionRequest,
        model: ModelType,
    ) -> Result<ChatCompletionResponse, UpstreamError> {
        let api_model = model.api_name(&self.config.models);
        tracing::debug!(model = api_model, "Executing upstream request");

        let response = self.client.chat_completion(request, api_model).await?;

        if !Self::is_valid_response(&response) {
            tracing::warn!(model = api_model, "Upstream returned an invalid response");
            return Err(UpstreamError::invalid_response());
        }

        Ok(response)
    }

    /// Finalize metadata for a terminal failure and convert the error
    ///
    /// The structured failure record is emitted here so callers that bubble
    /// the error up still leave a complete trace behind.
    fn finish_failed(
        &self,
        mut metadata: RequestMetadata,
        error: UpstreamError,
        timer: Instant,
    ) -> AppError {
        metadata.record_latency(elapsed_ms(timer));
        metadata.record_error(error.to_string());
        tracing::error!(
            status = error.status_code,
            metadata = %metadata.to_log_value(&self.config.models),
            "Request failed terminally"
        );
        self.metrics.record_completion(&metadata, error.status_code);
        AppError::Upstream(error)
    }

    /// Validity predicate for upstream answers
    ///
    /// A response is invalid if it has no choices, the first choice has no
    /// usable message, or the message carries neither tool calls nor at
    /// least 5 characters of trimmed content. Tool calls alone are always
    /// valid, even with empty content.
    pub fn is_valid_response(response: &ChatCompletionResponse) -> bool {
        let Some(first_choice) = response.choices.first() else {
            return false;
        };

        let message = &first_choice.message;

        if message
            .tool_calls
            .as_deref()
            .is_some_and(|calls| !calls.is_empty())
        {
            return true;
        }

        match message.content.as_deref() {
            Some(content) => content.trim().chars().count() >= 5,
            None => false,
        }
    }

    /// Check whether the upstream API is reachable
    pub async fn health_check(&self) -> bool {
        self.client.health_check().await
    }

    /// Release upstream resources. Required at process shutdown.
    pub async fn close(&self) {
        self.client.close().await;
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }
}

fn elapsed_ms(timer: Instant) -> f64 {
    timer.elapsed().as_secs_f64() * 1000.0
}

/// Request cost in USD for the model that actually served the request
fn calculate_cost(
    model: ModelType,
    input_tokens: u32,
    output_tokens: u32,
    pricing: &crate::config::PricingConfig,
) -> f64 {
    let input_cost = input_tokens as f64 / 1_000_000.0 * model.input_price(pricing);
    let output_cost = output_tokens as f64 / 1_000_000.0 * model.output_price(pricing);
    input_cost + output_cost
}
