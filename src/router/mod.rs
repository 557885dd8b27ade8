//! Routing domain model for Modelgate
//!
//! Defines the logical model labels, the closed set of routing reasons with
//! their derived categories, the immutable routing decision value, and the
//! token estimator used as a routing signal.

pub mod metadata;
pub mod service;
pub mod strategy;

pub use metadata::RequestMetadata;
pub use service::RouterService;
pub use strategy::HeuristicStrategy;

use serde::{Deserialize, Serialize};

use crate::api::types::Message;
use crate::config::{ModelsConfig, PricingConfig};

/// Logical model labels
///
/// `Auto` is a virtual routing signal: it may appear in requests but never
/// in a final decision. Each billable variant maps to a configured upstream
/// model identifier and per-million-token prices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelType {
    Small,
    Medium,
    Auto,
}

impl ModelType {
    /// Whether this is the small model
    pub fn is_small(&self) -> bool {
        matches!(self, Self::Small)
    }

    /// Whether this is the medium model
    pub fn is_medium(&self) -> bool {
        matches!(self, Self::Medium)
    }

    /// Whether this is the virtual routing signal
    pub fn is_auto(&self) -> bool {
        matches!(self, Self::Auto)
    }

    /// Whether the model incurs cost (AUTO is virtual)
    pub fn is_billable(&self) -> bool {
        !self.is_auto()
    }

    /// Logical label for logging and metrics
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Small => "small",
            Self::Medium => "medium",
            Self::Auto => "auto",
        }
    }

    /// Configured upstream model identifier for this logical model
    ///
    /// # Panics
    /// Panics for `Auto`, which has no upstream identity. Callers only reach
    /// this through a `RouterDecision`, which already excludes AUTO.
    pub fn api_name<'a>(&self, models: &'a ModelsConfig) -> &'a str {
        match self {
            Self::Small => &models.small,
            Self::Medium => &models.medium,
            Self::Auto => unreachable!("AUTO has no upstream model identifier"),
        }
    }

    /// Input price in USD per million tokens
    pub fn input_price(&self, pricing: &PricingConfig) -> f64 {
        match self {
            Self::Small => pricing.small_input,
            Self::Medium => pricing.medium_input,
            Self::Auto => 0.0,
        }
    }

    /// Output price in USD per million tokens
    pub fn output_price(&self, pricing: &PricingConfig) -> f64 {
        match self {
            Self::Small => pricing.small_output,
            Self::Medium => pricing.medium_output,
            Self::Auto => 0.0,
        }
    }

    /// Parse a requested model string into a logical label
    ///
    /// Accepts the logical labels and the configured upstream IDs
    /// (case-insensitive, whitespace-trimmed), then falls back to substring
    /// matching. Unrecognized strings resolve to `Auto` so routing continues
    /// instead of erroring on a typo.
    pub fn from_request_str(model: &str, models: &ModelsConfig) -> Self {
        let m = model.trim().to_lowercase();

        if m == "small" || m == models.small.to_lowercase() {
            return Self::Small;
        }
        if m == "medium" || m == models.medium.to_lowercase() {
            return Self::Medium;
        }
        if m == "auto" {
            return Self::Auto;
        }

        if m.contains("small") {
            return Self::Small;
        }
        if m.contains("medium") {
            return Self::Medium;
        }

        Self::Auto
    }
}

impl std::fmt::Display for ModelType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Routing decision categories, derived from the reason
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReasonCategory {
    UserControlled,
    CapabilityRequired,
    Heuristic,
    Fallback,
    Default,
}

impl ReasonCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::UserControlled => "user_controlled",
            Self::CapabilityRequired => "capability_required",
            Self::Heuristic => "heuristic",
            Self::Fallback => "fallback",
            Self::Default => "default",
        }
    }
}

/// Why a request was routed to its model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoutingReason {
    ManualOverride,
    FunctionCalling,
    JsonMode,
    HeuristicConversation,
    HeuristicTokens,
    HeuristicKeyword,
    HeuristicLength,
    DefaultSmall,
    Fallback,
}

impl RoutingReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ManualOverride => "manual_override",
            Self::FunctionCalling => "function_calling",
            Self::JsonMode => "json_mode",
            Self::HeuristicConversation => "heuristic_conversation",
            Self::HeuristicTokens => "heuristic_tokens",
            Self::HeuristicKeyword => "heuristic_keyword",
            Self::HeuristicLength => "heuristic_length",
            Self::DefaultSmall => "default_small",
            Self::Fallback => "fallback",
        }
    }

    /// Category this reason belongs to; a pure function of the reason
    pub fn category(&self) -> ReasonCategory {
        match self {
            Self::ManualOverride => ReasonCategory::UserControlled,
            Self::FunctionCalling | Self::JsonMode => ReasonCategory::CapabilityRequired,
            Self::HeuristicConversation
            | Self::HeuristicTokens
            | Self::HeuristicKeyword
            | Self::HeuristicLength => ReasonCategory::Heuristic,
            Self::DefaultSmall => ReasonCategory::Default,
            Self::Fallback => ReasonCategory::Fallback,
        }
    }

    pub fn is_user_override(&self) -> bool {
        self.category() == ReasonCategory::UserControlled
    }

    pub fn is_heuristic(&self) -> bool {
        self.category() == ReasonCategory::Heuristic
    }
}

impl std::fmt::Display for RoutingReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of a routing strategy decision
///
/// Immutable once constructed. `model` is never `Auto`; violating that is a
/// defect in the calling code, not a runtime condition, and panics.
#[derive(Debug, Clone, PartialEq)]
pub struct RouterDecision {
    model: ModelType,
    reason: RoutingReason,
    estimated_tokens: Option<u32>,
    confidence: f64,
    metadata: serde_json::Map<String, serde_json::Value>,
}

impl RouterDecision {
    /// Create a routing decision
    ///
    /// # Panics
    /// Panics if `model` is `Auto` or `confidence` is outside [0, 1]; both
    /// are unreachable through external input.
    pub fn new(model: ModelType, reason: RoutingReason) -> Self {
        assert!(
            !model.is_auto(),
            "AUTO is a routing signal and cannot be a final decision"
        );
        Self {
            model,
            reason,
            estimated_tokens: None,
            confidence: 1.0,
            metadata: serde_json::Map::new(),
        }
    }

    /// Attach the token estimate that informed this decision
    pub fn with_estimated_tokens(mut self, estimated_tokens: u32) -> Self {
        self.estimated_tokens = Some(estimated_tokens);
        self
    }

    /// Set the decision confidence (defaults to 1.0)
    pub fn with_confidence(mut self, confidence: f64) -> Self {
        assert!(
            (0.0..=1.0).contains(&confidence),
            "confidence must be within [0, 1]"
        );
        self.confidence = confidence;
        self
    }

    pub fn model(&self) -> ModelType {
        self.model
    }

    pub fn reason(&self) -> RoutingReason {
        self.reason
    }

    pub fn estimated_tokens(&self) -> Option<u32> {
        self.estimated_tokens
    }

    pub fn confidence(&self) -> f64 {
        self.confidence
    }

    pub fn category(&self) -> ReasonCategory {
        self.reason.category()
    }

    /// Structured log projection carrying both the logical label and the
    /// upstream model identifier
    pub fn to_log_value(&self, models: &ModelsConfig) -> serde_json::Value {
        serde_json::json!({
            "model_logical": self.model.as_str(),
            "model_actual": self.model.api_name(models),
            "reason": self.reason.as_str(),
            "category": self.category().as_str(),
            "estimated_tokens": self.estimated_tokens,
            "confidence": self.confidence,
            "metadata": self.metadata,
        })
    }
}

/// Heuristic token estimator (~4 chars/token)
///
/// Used only as a routing signal; billed usage always comes from the
/// upstream response.
pub struct TokenEstimator;

impl TokenEstimator {
    const CHARS_PER_TOKEN: f64 = 4.0;
    /// Rough allowance for role and metadata framing per message
    const PER_MESSAGE_OVERHEAD: u32 = 10;

    /// Estimate tokens for a single piece of text
    pub fn estimate_text(text: &str) -> u32 {
        if text.is_empty() {
            return 0;
        }
        let estimate = (text.chars().count() as f64 / Self::CHARS_PER_TOKEN) as u32;
        estimate.max(1)
    }

    /// Estimate tokens for a full message list, including per-message overhead
    pub fn estimate_messages(messages: &[Message]) -> u32 {
        let total_chars: usize = messages.iter().map(|m| m.content_length()).sum();
        let content_estimate = if total_chars == 0 {
            0
        } else {
            ((total_chars as f64 / Self::CHARS_PER_TOKEN) as u32).max(1)
        };
        content_estimate + messages.len() as u32 * Self::PER_MESSAGE_OVERHEAD
    }
}
