//! Per-request lifecycle metadata
//!
//! Tracks one routed request from decision through execution to the final
//! response: selected model, fallback state, timing, token usage, and cost.
//! The record is mutable only from inside this crate while the request is in
//! flight; once handed to the boundary layer it is read-only by construction.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::{ModelType, ReasonCategory, RouterDecision, RoutingReason};
use crate::config::ModelsConfig;

// Weighted quality-score constants; see DESIGN.md for the scoring rationale.
const BASE_SCORE: f64 = 0.5;
const SUCCESS_BONUS: f64 = 0.2;
const LATENCY_THRESHOLD_MS: f64 = 500.0;
const LATENCY_BONUS: f64 = 0.1;
const NO_FALLBACK_BONUS: f64 = 0.1;
const TOKEN_THRESHOLD: u32 = 2000;
const TOKEN_BONUS: f64 = 0.1;

/// Complete lifecycle metadata for a routed request
#[derive(Debug, Clone)]
pub struct RequestMetadata {
    request_id: Uuid,
    created_at: DateTime<Utc>,
    selected_model: ModelType,
    routing_reason: RoutingReason,
    original_model: Option<ModelType>,
    fallback_occurred: bool,
    latency_ms: Option<f64>,
    tokens_input: Option<u32>,
    tokens_output: Option<u32>,
    cost_usd: Option<f64>,
    error: Option<String>,
    context: serde_json::Map<String, serde_json::Value>,
}

impl RequestMetadata {
    /// Create metadata for a freshly decided request
    pub fn new(request_id: Uuid, decision: &RouterDecision) -> Self {
        Self {
            request_id,
            created_at: Utc::now(),
            selected_model: decision.model(),
            routing_reason: decision.reason(),
            original_model: None,
            fallback_occurred: false,
            latency_ms: None,
            tokens_input: None,
            tokens_output: None,
            cost_usd: None,
            error: None,
            context: serde_json::Map::new(),
        }
    }

    // --- in-flight mutation, orchestrator only ---------------------------

    /// Record that the original decision failed and execution moved to the
    /// given model with reason `fallback`
    pub(crate) fn record_fallback(&mut self, to: ModelType) {
        self.original_model = Some(self.selected_model);
        self.selected_model = to;
        self.routing_reason = RoutingReason::Fallback;
        self.fallback_occurred = true;
    }

    pub(crate) fn record_latency(&mut self, latency_ms: f64) {
        self.latency_ms = Some(latency_ms);
    }

    pub(crate) fn record_usage(&mut self, tokens_input: u32, tokens_output: u32, cost_usd: f64) {
        self.tokens_input = Some(tokens_input);
        self.tokens_output = Some(tokens_output);
        self.cost_usd = Some(cost_usd);
    }

    pub(crate) fn record_error(&mut self, error: impl Into<String>) {
        self.error = Some(error.into());
    }

    pub(crate) fn insert_context(&mut self, key: impl Into<String>, value: serde_json::Value) {
        self.context.insert(key.into(), value);
    }

    // --- read-only surface ------------------------------------------------

    pub fn request_id(&self) -> Uuid {
        self.request_id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// The model that actually served (or last attempted) the request
    pub fn selected_model(&self) -> ModelType {
        self.selected_model
    }

    pub fn routing_reason(&self) -> RoutingReason {
        self.routing_reason
    }

    /// The originally decided model, set only when fallback occurred
    pub fn original_model(&self) -> Option<ModelType> {
        self.original_model
    }

    pub fn fallback_occurred(&self) -> bool {
        self.fallback_occurred
    }

    pub fn latency_ms(&self) -> Option<f64> {
        self.latency_ms
    }

    pub fn tokens_input(&self) -> Option<u32> {
        self.tokens_input
    }

    pub fn tokens_output(&self) -> Option<u32> {
        self.tokens_output
    }

    pub fn cost_usd(&self) -> Option<f64> {
        self.cost_usd
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn category(&self) -> ReasonCategory {
        self.routing_reason.category()
    }

    // --- derived fields ---------------------------------------------------

    pub fn total_tokens(&self) -> Option<u32> {
        match (self.tokens_input, self.tokens_output) {
            (Some(input), Some(output)) => Some(input + output),
            _ => None,
        }
    }

    pub fn cost_per_token(&self) -> Option<f64> {
        match (self.cost_usd, self.total_tokens()) {
            (Some(cost), Some(total)) if total > 0 && cost > 0.0 => Some(cost / total as f64),
            _ => None,
        }
    }

    pub fn tokens_per_second(&self) -> Option<f64> {
        match (self.total_tokens(), self.latency_ms) {
            (Some(total), Some(latency)) if total > 0 && latency > 0.0 => {
                Some(total as f64 * 1000.0 / latency)
            }
            _ => None,
        }
    }

    pub fn is_successful(&self) -> bool {
        self.error.is_none()
    }

    /// Weighted response quality score in [0.5, 1.0]
    pub fn quality_score(&self) -> f64 {
        let mut score = BASE_SCORE;
        if self.is_successful() {
            score += SUCCESS_BONUS;
        }
        if self.latency_ms.is_some_and(|l| l < LATENCY_THRESHOLD_MS) {
            score += LATENCY_BONUS;
        }
        if !self.fallback_occurred {
            score += NO_FALLBACK_BONUS;
        }
        if self.total_tokens().is_some_and(|t| t < TOKEN_THRESHOLD) {
            score += TOKEN_BONUS;
        }
        score.min(1.0)
    }

    // --- projections ------------------------------------------------------

    /// HTTP response headers exposing the routing outcome
    ///
    /// Carries both the upstream model identifier and the logical label, so
    /// callers can correlate with their own billing regardless of which
    /// naming they use.
    pub fn to_response_headers(&self, models: &ModelsConfig) -> Vec<(&'static str, String)> {
        let mut headers = vec![
            (
                "X-Router-Model",
                self.selected_model.api_name(models).to_string(),
            ),
            (
                "X-Router-Model-Logical",
                self.selected_model.as_str().to_string(),
            ),
            ("X-Router-Reason", self.routing_reason.as_str().to_string()),
            ("X-Router-Fallback", self.fallback_occurred.to_string()),
            ("X-Router-Request-ID", self.request_id.to_string()),
        ];

        if let Some(latency) = self.latency_ms {
            headers.push(("X-Router-Latency-MS", format!("{:.2}", latency)));
        }
        if let Some(cost) = self.cost_usd {
            headers.push(("X-Router-Cost-USD", format!("{:.8}", cost)));
        }
        if let Some(tokens) = self.tokens_input {
            headers.push(("X-Router-Tokens-Input", tokens.to_string()));
        }
        if let Some(tokens) = self.tokens_output {
            headers.push(("X-Router-Tokens-Output", tokens.to_string()));
        }
        if let Some(original) = self.original_model {
            headers.push((
                "X-Router-Original-Model",
                original.api_name(models).to_string(),
            ));
            headers.push((
                "X-Router-Original-Model-Logical",
                original.as_str().to_string(),
            ));
        }

        headers
    }

    /// Structured logging projection with derived totals and a success flag
    pub fn to_log_value(&self, models: &ModelsConfig) -> serde_json::Value {
        let mut data = serde_json::json!({
            "request_id": self.request_id.to_string(),
            "timestamp": self.created_at.to_rfc3339(),
            "model_logical": self.selected_model.as_str(),
            "model_actual": self.selected_model.api_name(models),
            "reason": self.routing_reason.as_str(),
            "category": self.category().as_str(),
            "fallback": self.fallback_occurred,
            "success": self.is_successful(),
            "quality_score": (self.quality_score() * 100.0).round() / 100.0,
        });
        let obj = data.as_object_mut().expect("json!({}) is an object");

        if let Some(latency) = self.latency_ms {
            obj.insert(
                "latency_ms".to_string(),
                serde_json::json!((latency * 100.0).round() / 100.0),
            );
        }
        if let Some(cost) = self.cost_usd {
            obj.insert("cost_usd".to_string(), serde_json::json!(cost));
        }
        if let Some(tokens) = self.tokens_input {
            obj.insert("tokens_input".to_string(), serde_json::json!(tokens));
        }
        if let Some(tokens) = self.tokens_output {
            obj.insert("tokens_output".to_string(), serde_json::json!(tokens));
        }
        if let Some(total) = self.total_tokens() {
            obj.insert("tokens_total".to_string(), serde_json::json!(total));
        }
        if let Some(original) = self.original_model {
            obj.insert(
                "original_model_logical".to_string(),
                serde_json::json!(original.as_str()),
            );
            obj.insert(
                "original_model_actual".to_string(),
                serde_json::json!(original.api_name(models)),
            );
        }
        if let Some(error) = &self.error {
            obj.insert("error".to_string(), serde_json::json!(error));
        }
        if !self.context.is_empty() {
            obj.insert(
                "context".to_string(),
                serde_json::Value::Object(self.context.clone()),
            );
        }

        data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn models() -> ModelsConfig {
        ModelsConfig {
            small: "mistral-small-latest".to_string(),
            medium: "mistral-medium-latest".to_string(),
        }
    }

    fn small_decision() -> RouterDecision {
        RouterDecision::new(ModelType::Small, RoutingReason::DefaultSmall)
    }

    fn fresh() -> RequestMetadata {
        RequestMetadata::new(Uuid::new_v4(), &small_decision())
    }

    #[test]
    fn test_new_metadata_reflects_decision() {
        let meta = fresh();
        assert_eq!(meta.selected_model(), ModelType::Small);
        assert_eq!(meta.routing_reason(), RoutingReason::DefaultSmall);
        assert!(!meta.fallback_occurred());
        assert!(meta.original_model().is_none());
        assert!(meta.is_successful());
    }

    #[test]
    fn test_record_fallback_preserves_original_model() {
        let mut meta = fresh();
        meta.record_fallback(ModelType::Medium);

        assert!(meta.fallback_occurred());
        assert_eq!(meta.original_model(), Some(ModelType::Small));
        assert_eq!(meta.selected_model(), ModelType::Medium);
        assert_eq!(meta.routing_reason(), RoutingReason::Fallback);
    }

    #[test]
    fn test_total_tokens_requires_both_counts() {
        let mut meta = fresh();
        assert_eq!(meta.total_tokens(), None);
        meta.record_usage(100, 50, 0.0001);
        assert_eq!(meta.total_tokens(), Some(150));
    }

    #[test]
    fn test_cost_per_token() {
        let mut meta = fresh();
        meta.record_usage(600, 400, 0.01);
        let per_token = meta.cost_per_token().unwrap();
        assert!((per_token - 0.00001).abs() < 1e-12);
    }

    #[test]
    fn test_tokens_per_second() {
        let mut meta = fresh();
        meta.record_usage(100, 100, 0.001);
        meta.record_latency(500.0);
        assert_eq!(meta.tokens_per_second(), Some(400.0));
    }

    #[test]
    fn test_error_makes_unsuccessful() {
        let mut meta = fresh();
        meta.record_error("upstream error 502: bad gateway");
        assert!(!meta.is_successful());
        assert_eq!(meta.error(), Some("upstream error 502: bad gateway"));
    }

    #[test]
    fn test_quality_score_best_case() {
        let mut meta = fresh();
        meta.record_latency(100.0);
        meta.record_usage(50, 50, 0.0001);
        // 0.5 base + 0.2 success + 0.1 latency + 0.1 no-fallback + 0.1 tokens
        assert!((meta.quality_score() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_quality_score_failed_fallback_request() {
        let mut meta = fresh();
        meta.record_fallback(ModelType::Medium);
        meta.record_error("boom");
        meta.record_latency(2000.0);
        // base only: no success, slow, fallback, no token counts
        assert!((meta.quality_score() - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_response_headers_minimal() {
        let meta = fresh();
        let headers = meta.to_response_headers(&models());
        let names: Vec<&str> = headers.iter().map(|(name, _)| *name).collect();
        assert_eq!(
            names,
            vec![
                "X-Router-Model",
                "X-Router-Model-Logical",
                "X-Router-Reason",
                "X-Router-Fallback",
                "X-Router-Request-ID",
            ]
        );

        let get = |name: &str| {
            headers
                .iter()
                .find(|(n, _)| *n == name)
                .map(|(_, v)| v.as_str())
                .unwrap()
        };
        assert_eq!(get("X-Router-Model"), "mistral-small-latest");
        assert_eq!(get("X-Router-Model-Logical"), "small");
        assert_eq!(get("X-Router-Fallback"), "false");
    }

    #[test]
    fn test_response_headers_after_fallback() {
        let mut meta = fresh();
        meta.record_fallback(ModelType::Medium);
        meta.record_latency(321.5);
        meta.record_usage(10, 20, 0.000123);

        let headers = meta.to_response_headers(&models());
        let get = |name: &str| {
            headers
                .iter()
                .find(|(n, _)| *n == name)
                .map(|(_, v)| v.as_str())
        };
        assert_eq!(get("X-Router-Model"), Some("mistral-medium-latest"));
        assert_eq!(get("X-Router-Fallback"), Some("true"));
        assert_eq!(get("X-Router-Latency-MS"), Some("321.50"));
        assert_eq!(get("X-Router-Tokens-Input"), Some("10"));
        assert_eq!(get("X-Router-Tokens-Output"), Some("20"));
        assert_eq!(
            get("X-Router-Original-Model"),
            Some("mistral-small-latest")
        );
        assert_eq!(get("X-Router-Original-Model-Logical"), Some("small"));
    }

    #[test]
    fn test_log_value_carries_derived_fields() {
        let mut meta = fresh();
        meta.record_fallback(ModelType::Medium);
        meta.record_latency(250.0);
        meta.record_usage(100, 60, 0.0005);

        let log = meta.to_log_value(&models());
        assert_eq!(log["model_logical"], "medium");
        assert_eq!(log["model_actual"], "mistral-medium-latest");
        assert_eq!(log["reason"], "fallback");
        assert_eq!(log["category"], "fallback");
        assert_eq!(log["fallback"], true);
        assert_eq!(log["success"], true);
        assert_eq!(log["tokens_total"], 160);
        assert_eq!(log["original_model_logical"], "small");
    }

    #[test]
    fn test_log_value_includes_error() {
        let mut meta = fresh();
        meta.record_error("upstream timed out");
        let log = meta.to_log_value(&models());
        assert_eq!(log["success"], false);
        assert_eq!(log["error"], "upstream timed out");
    }
}
