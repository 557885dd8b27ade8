//! HTTP surface for the Modelgate gateway

use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
};
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::error::AppResult;
use crate::metrics::Metrics;
use crate::router::RouterService;
use crate::upstream::UpstreamClient;

pub mod chat;
pub mod health;
pub mod metrics;
pub mod types;

/// Application state shared across all handlers
///
/// Cheap to clone; the router service and config are Arc'd.
#[derive(Clone)]
pub struct AppState {
    config: Arc<Config>,
    service: Arc<RouterService<UpstreamClient>>,
}

impl AppState {
    /// Create application state from configuration
    ///
    /// # Errors
    /// Returns an error if metric registration fails.
    pub fn new(config: Arc<Config>) -> AppResult<Self> {
        let metrics = Metrics::new().map_err(|e| {
            crate::error::AppError::Internal(format!("Failed to register metrics: {}", e))
        })?;
        let client = UpstreamClient::new(config.clone());
        let service = Arc::new(RouterService::new(config.clone(), client, metrics));

        Ok(Self { config, service })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn service(&self) -> &RouterService<UpstreamClient> {
        &self.service
    }

    pub fn metrics(&self) -> &Metrics {
        self.service.metrics()
    }
}

/// Build the Axum router with all routes and middleware
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/v1/chat/completions", post(chat::handler))
        .route("/health", get(health::handler))
        .route("/metrics", get(metrics::handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
