//! Health check endpoint
//!
//! Performs a deep check: the gateway is only healthy if the upstream
//! completion API answers its metadata endpoint.

use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};

use crate::api::AppState;
use crate::api::types::HealthResponse;

/// GET /health handler
///
/// Returns 200 with service info when the upstream API is reachable,
/// 503 otherwise.
pub async fn handler(State(state): State<AppState>) -> impl IntoResponse {
    if !state.service().health_check().await {
        tracing::error!("Health check failed: upstream completion API is unreachable");
        let body = Json(serde_json::json!({
            "error": {
                "message": "Upstream completion API health check failed",
                "type": "upstream_error",
            },
        }));
        return (StatusCode::SERVICE_UNAVAILABLE, body).into_response();
    }

    Json(HealthResponse {
        status: "healthy",
        service: env!("CARGO_PKG_NAME").to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
    .into_response()
}
