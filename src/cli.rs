//! Command-line interface for Modelgate
//!
//! Provides argument parsing and subcommand handling for the Modelgate binary.

use clap::{Parser, Subcommand};

/// Cost-aware routing gateway for hosted chat-completion APIs
#[derive(Parser)]
#[command(name = "modelgate")]
#[command(version)]
#[command(about = "Cost-aware routing gateway for hosted chat-completion APIs")]
#[command(
    long_about = "Modelgate fronts a hosted chat-completion API and routes each request \
    to the small or medium model based on explicit overrides, required capabilities, \
    and complexity heuristics, with automatic fallback to medium on failure."
)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml", global = true)]
    pub config: String,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Generate a template configuration file
    Config {
        /// Output file path (prints to stdout if not specified)
        #[arg(short, long)]
        output: Option<String>,
    },
}

/// Generate template configuration content
pub fn generate_config_template() -> &'static str {
    r#"# Modelgate Configuration
# ========================
#
# This file configures the HTTP server, the upstream completion API,
# the two routed models, pricing, and routing thresholds.

[server]
# IP address to bind to (0.0.0.0 for all interfaces, 127.0.0.1 for localhost only)
host = "0.0.0.0"

# Port to listen on
port = 8080

# Bearer token callers must present. Falls back to upstream.api_key when unset.
# api_key = "change-me"

[upstream]
# Base URL of the hosted completion API (no trailing slash)
base_url = "https://api.mistral.ai/v1"

# Upstream API key. Prefer setting MODELGATE_UPSTREAM_API_KEY instead of
# committing a key to this file.
api_key = ""

# Per-call timeout for completion requests, in seconds
timeout_seconds = 15

# Timeout for the /models reachability probe, in seconds
health_check_timeout_seconds = 5

[models]
# Upstream model identifiers for the two logical models
small = "mistral-small-latest"
medium = "mistral-medium-latest"

[pricing]
# USD per million tokens, used for per-request cost accounting
small_input = 0.1
small_output = 0.3
medium_input = 0.4
medium_output = 2.0

[router]
# Message count above which a conversation routes to medium
conversation_threshold = 6

# Estimated token count above which a request routes to medium
token_threshold = 150

# Total content character length above which a request routes to medium
length_threshold = 120

[observability]
# Log level: trace, debug, info, warn, error
log_level = "info"
"#
}
