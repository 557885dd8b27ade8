//! Configuration management for Modelgate
//!
//! Parses TOML configuration files and provides typed access to settings.
//! Validation runs after parsing so a loaded `Config` is always usable.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{AppError, AppResult};

/// Environment variable that overrides `upstream.api_key`
pub const API_KEY_ENV: &str = "MODELGATE_UPSTREAM_API_KEY";

/// Root configuration structure
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub server: ServerConfig,
    pub upstream: UpstreamConfig,
    pub models: ModelsConfig,
    #[serde(default)]
    pub pricing: PricingConfig,
    #[serde(default)]
    pub router: RouterConfig,
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Bearer token expected from callers. Falls back to the upstream API key
    /// when unset, so the gateway is never accidentally left open.
    #[serde(default)]
    pub api_key: Option<String>,
}

/// Upstream completion API configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct UpstreamConfig {
    /// Base URL of the hosted completion API, e.g. "https://api.mistral.ai/v1"
    pub base_url: String,
    /// API key sent as a bearer token. Overridable via MODELGATE_UPSTREAM_API_KEY.
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_client_timeout")]
    pub timeout_seconds: u64,
    #[serde(default = "default_health_check_timeout")]
    pub health_check_timeout_seconds: u64,
    /// Connection-pool ceiling shared by all in-flight requests
    #[serde(default = "default_max_idle_connections")]
    pub max_idle_connections: usize,
}

fn default_client_timeout() -> u64 {
    15
}

fn default_health_check_timeout() -> u64 {
    5
}

fn default_max_idle_connections() -> usize {
    20
}

/// Upstream model identifiers for the two logical models
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ModelsConfig {
    pub small: String,
    pub medium: String,
}

/// Per-model prices in USD per million tokens
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PricingConfig {
    #[serde(default = "default_price_small_input")]
    pub small_input: f64,
    #[serde(default = "default_price_small_output")]
    pub small_output: f64,
    #[serde(default = "default_price_medium_input")]
    pub medium_input: f64,
    #[serde(default = "default_price_medium_output")]
    pub medium_output: f64,
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            small_input: default_price_small_input(),
            small_output: default_price_small_output(),
            medium_input: default_price_medium_input(),
            medium_output: default_price_medium_output(),
        }
    }
}

fn default_price_small_input() -> f64 {
    0.1
}

fn default_price_small_output() -> f64 {
    0.3
}

fn default_price_medium_input() -> f64 {
    0.4
}

fn default_price_medium_output() -> f64 {
    2.0
}

/// Routing thresholds
///
/// Each heuristic compares one request property against one of these values.
/// The complexity-keyword set is a fixed constant, not configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RouterConfig {
    /// Message count above which a conversation routes to medium
    #[serde(default = "default_conversation_threshold")]
    pub conversation_threshold: usize,
    /// Estimated token count above which a request routes to medium
    #[serde(default = "default_token_threshold")]
    pub token_threshold: u32,
    /// Total content character length above which a request routes to medium
    #[serde(default = "default_length_threshold")]
    pub length_threshold: usize,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            conversation_threshold: default_conversation_threshold(),
            token_threshold: default_token_threshold(),
            length_threshold: default_length_threshold(),
        }
    }
}

fn default_conversation_threshold() -> usize {
    6
}

fn default_token_threshold() -> u32 {
    150
}

fn default_length_threshold() -> usize {
    120
}

/// Observability configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Applies the MODELGATE_UPSTREAM_API_KEY environment override before
    /// validation, so the key never has to live in the file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> AppResult<Self> {
        let path_display = path.as_ref().display().to_string();

        // Phase 1: Read file (preserves io::Error context)
        let content =
            std::fs::read_to_string(path.as_ref()).map_err(|source| AppError::ConfigFileRead {
                path: path_display.clone(),
                source,
            })?;

        // Phase 2: Parse TOML (preserves toml::de::Error context)
        let mut config: Self =
            toml::from_str(&content).map_err(|source| AppError::ConfigParseFailed {
                path: path_display.clone(),
                source: Box::new(source),
            })?;

        if let Ok(key) = std::env::var(API_KEY_ENV)
            && !key.trim().is_empty()
        {
            config.upstream.api_key = key;
        }

        // Phase 3: Validate parsed config (provides contextual reason)
        config
            .validate()
            .map_err(|e| AppError::ConfigValidationFailed {
                path: path_display,
                reason: e.to_string(),
            })?;

        Ok(config)
    }

    /// Bearer token callers must present, falling back to the upstream key
    pub fn gateway_api_key(&self) -> &str {
        self.server
            .api_key
            .as_deref()
            .unwrap_or(&self.upstream.api_key)
    }

    /// Validate configuration after parsing
    ///
    /// This is called automatically by `from_file()`, but can also be called
    /// explicitly when constructing Config via other means (e.g., in tests).
    pub fn validate(&self) -> AppResult<()> {
        if !self.upstream.base_url.starts_with("http://")
            && !self.upstream.base_url.starts_with("https://")
        {
            return Err(AppError::Config(format!(
                "upstream.base_url must start with http:// or https://, got {:?}",
                self.upstream.base_url
            )));
        }
        if self.upstream.base_url.ends_with('/') {
            return Err(AppError::Config(
                "upstream.base_url must not end with a trailing slash".to_string(),
            ));
        }
        if self.upstream.api_key.trim().is_empty() {
            return Err(AppError::Config(format!(
                "upstream.api_key is required (set it in the config file or via {})",
                API_KEY_ENV
            )));
        }

        // Timeouts must be nonzero and bounded. The upper bound also rejects
        // extreme values like u64::MAX before they reach Duration arithmetic.
        for (name, timeout) in [
            ("upstream.timeout_seconds", self.upstream.timeout_seconds),
            (
                "upstream.health_check_timeout_seconds",
                self.upstream.health_check_timeout_seconds,
            ),
        ] {
            if timeout == 0 {
                return Err(AppError::Config(format!(
                    "{} must be greater than 0",
                    name
                )));
            }
            if timeout > 300 {
                return Err(AppError::Config(format!(
                    "{} cannot exceed 300 seconds (5 minutes), got {}",
                    name, timeout
                )));
            }
        }

        if self.models.small.trim().is_empty() || self.models.medium.trim().is_empty() {
            return Err(AppError::Config(
                "models.small and models.medium must be non-empty".to_string(),
            ));
        }
        if self.models.small.eq_ignore_ascii_case(&self.models.medium) {
            return Err(AppError::Config(format!(
                "models.small and models.medium must differ, both are {:?}",
                self.models.small
            )));
        }

        for (name, price) in [
            ("pricing.small_input", self.pricing.small_input),
            ("pricing.small_output", self.pricing.small_output),
            ("pricing.medium_input", self.pricing.medium_input),
            ("pricing.medium_output", self.pricing.medium_output),
        ] {
            if !price.is_finite() || price < 0.0 {
                return Err(AppError::Config(format!(
                    "{} must be a non-negative finite number, got {}",
                    name, price
                )));
            }
        }

        if self.router.conversation_threshold == 0
            || self.router.token_threshold == 0
            || self.router.length_threshold == 0
        {
            return Err(AppError::Config(
                "router thresholds must all be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}
