//! Heuristic routing strategy
//!
//! Fast, deterministic routing using an ordered list of rules evaluated
//! against the request. Zero model overhead - all decisions are pure CPU
//! logic.
//!
//! Rule priority (first match wins):
//! 1. Manual override (user explicitly chose small or medium)
//! 2. Capability required (tool calling, then JSON mode)
//! 3. Heuristics (conversation length, token estimate, keywords, prompt length)
//! 4. Default to small

use std::sync::Arc;

use super::{ModelType, RouterDecision, RoutingReason, TokenEstimator};
use crate::api::types::{ChatCompletionRequest, MessageRole};
use crate::config::Config;

/// Keywords and phrases whose presence in a system/user message signals a
/// request complex enough to justify the medium model. Matched
/// case-insensitively as substrings.
pub const COMPLEXITY_KEYWORDS: &[&str] = &[
    "analyze",
    "analysis",
    "explain in detail",
    "compare and contrast",
    "evaluate",
    "assess",
    "critique",
    "argue",
    "justify",
    "reason",
    "derive",
    "prove",
    "demonstrate",
    "elaborate",
    "discuss in depth",
    "comprehensive",
    "thorough",
    "detailed explanation",
    "complex",
    "intricate",
    "sophisticated",
    "nuanced",
    "examine",
    "investigate",
    "explore",
    "review",
    "synthesize",
    "interpret",
    "contextualize",
];

/// Request properties the rules evaluate against, computed once per decision
struct RuleInput<'a> {
    request: &'a ChatCompletionRequest,
    estimated_tokens: u32,
}

type RuleFn = fn(&HeuristicStrategy, &RuleInput<'_>) -> Option<RouterDecision>;

/// Heuristic router that decides between the small and medium model
///
/// `decide` is a total, pure function of the request: no I/O, no mutable
/// state, and identical inputs always produce identical decisions.
#[derive(Debug, Clone)]
pub struct HeuristicStrategy {
    config: Arc<Config>,
}

impl HeuristicStrategy {
    /// Ordered rule chain. The order of this list IS the routing priority;
    /// the final rule is total, so evaluation always produces a decision.
    const RULES: &'static [(&'static str, RuleFn)] = &[
        ("manual_override", Self::check_manual_override),
        ("function_calling", Self::check_function_calling),
        ("json_mode", Self::check_json_mode),
        ("heuristic_conversation", Self::check_conversation_length),
        ("heuristic_tokens", Self::check_token_estimate),
        ("heuristic_keyword", Self::check_complexity_keywords),
        ("heuristic_length", Self::check_content_length),
        ("default_small", Self::check_default),
    ];

    /// Create a new strategy bound to the configured thresholds and model IDs
    pub fn new(config: Arc<Config>) -> Self {
        Self { config }
    }

    /// Rule names in evaluation order, for priority assertions in tests
    pub fn rule_names() -> Vec<&'static str> {
        Self::RULES.iter().map(|(name, _)| *name).collect()
    }

    /// Decide which model should serve the request
    pub fn decide(&self, request: &ChatCompletionRequest) -> RouterDecision {
        let input = RuleInput {
            request,
            estimated_tokens: TokenEstimator::estimate_messages(request.messages()),
        };

        for (name, rule) in Self::RULES.iter().copied() {
            if let Some(decision) = rule(self, &input) {
                tracing::debug!(
                    rule = name,
                    model = %decision.model(),
                    reason = %decision.reason(),
                    estimated_tokens = input.estimated_tokens,
                    "Routing rule matched"
                );
                return decision;
            }
        }

        unreachable!("the default rule matches every request")
    }

    /// Rule 1: explicit user model selection dominates everything else,
    /// including overrides *down* to small.
    fn check_manual_override(&self, input: &RuleInput<'_>) -> Option<RouterDecision> {
        let requested = ModelType::from_request_str(input.request.model(), &self.config.models);
        if requested.is_auto() {
            return None;
        }
        Some(RouterDecision::new(requested, RoutingReason::ManualOverride))
    }

    /// Rule 2a: declared tools require the medium model
    fn check_function_calling(&self, input: &RuleInput<'_>) -> Option<RouterDecision> {
        if !input.request.has_tools() {
            return None;
        }
        Some(RouterDecision::new(
            ModelType::Medium,
            RoutingReason::FunctionCalling,
        ))
    }

    /// Rule 2b: structured JSON output requires the medium model
    fn check_json_mode(&self, input: &RuleInput<'_>) -> Option<RouterDecision> {
        let wants_json = input
            .request
            .response_format()
            .is_some_and(|f| f.is_json_object());
        if !wants_json {
            return None;
        }
        Some(RouterDecision::new(ModelType::Medium, RoutingReason::JsonMode))
    }

    /// Rule 3a: long conversations escalate
    fn check_conversation_length(&self, input: &RuleInput<'_>) -> Option<RouterDecision> {
        if input.request.messages().len() <= self.config.router.conversation_threshold {
            return None;
        }
        Some(
            RouterDecision::new(ModelType::Medium, RoutingReason::HeuristicConversation)
                .with_estimated_tokens(input.estimated_tokens),
        )
    }

    /// Rule 3b: high token estimates escalate
    fn check_token_estimate(&self, input: &RuleInput<'_>) -> Option<RouterDecision> {
        if input.estimated_tokens <= self.config.router.token_threshold {
            return None;
        }
        Some(
            RouterDecision::new(ModelType::Medium, RoutingReason::HeuristicTokens)
                .with_estimated_tokens(input.estimated_tokens),
        )
    }

    /// Rule 3c: complexity keywords in system/user messages escalate
    fn check_complexity_keywords(&self, input: &RuleInput<'_>) -> Option<RouterDecision> {
        let found = input
            .request
            .messages()
            .iter()
            .filter(|m| matches!(m.role(), MessageRole::System | MessageRole::User))
            .filter_map(|m| m.content())
            .any(|content| {
                let lower = content.to_lowercase();
                COMPLEXITY_KEYWORDS.iter().any(|kw| lower.contains(kw))
            });
        if !found {
            return None;
        }
        Some(
            RouterDecision::new(ModelType::Medium, RoutingReason::HeuristicKeyword)
                .with_estimated_tokens(input.estimated_tokens),
        )
    }

    /// Rule 3d: long prompts escalate
    fn check_content_length(&self, input: &RuleInput<'_>) -> Option<RouterDecision> {
        if input.request.total_content_length() <= self.config.router.length_threshold {
            return None;
        }
        Some(
            RouterDecision::new(ModelType::Medium, RoutingReason::HeuristicLength)
                .with_estimated_tokens(input.estimated_tokens),
        )
    }

    /// Rule 4: nothing matched, the small model is enough
    fn check_default(&self, input: &RuleInput<'_>) -> Option<RouterDecision> {
        Some(
            RouterDecision::new(ModelType::Small, RoutingReason::DefaultSmall)
                .with_estimated_tokens(input.estimated_tokens),
        )
    }
}
