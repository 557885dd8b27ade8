//! Prometheus metrics endpoint

use axum::{extract::State, http::header, response::IntoResponse};

use crate::api::AppState;

/// GET /metrics handler
///
/// Returns all registered metrics in Prometheus text exposition format.
pub async fn handler(State(state): State<AppState>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics().gather(),
    )
}
