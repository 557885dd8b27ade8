//! Chat completions endpoint
//!
//! Drop-in replacement for the upstream chat/completions route: callers keep
//! their existing client, gain routing, and can observe the outcome through
//! the X-Router-* response headers.

use axum::{
    Json,
    extract::State,
    http::{HeaderMap, HeaderName, HeaderValue},
    response::{IntoResponse, Response},
};

use crate::api::AppState;
use crate::api::types::ChatCompletionRequest;
use crate::error::{AppError, AppResult};

/// Verify the caller's bearer token
///
/// Rejected requests are counted against the "unknown" model since no
/// routing decision was made.
fn verify_bearer(headers: &HeaderMap, state: &AppState) -> AppResult<()> {
    let authorization = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| {
            state.metrics().record_rejected(401);
            AppError::Unauthorized("Missing Authorization header".to_string())
        })?;

    let token = match authorization.split_once(' ') {
        Some((scheme, token)) if scheme.eq_ignore_ascii_case("bearer") => token.trim(),
        _ => {
            state.metrics().record_rejected(401);
            return Err(AppError::Unauthorized(
                "Invalid Authorization header format".to_string(),
            ));
        }
    };

    if token != state.config().gateway_api_key() {
        state.metrics().record_rejected(401);
        return Err(AppError::Unauthorized("Invalid API key".to_string()));
    }

    Ok(())
}

/// POST /v1/chat/completions handler
///
/// Routes the request, executes it (with at most one fallback inside the
/// router service), and attaches the routing metadata as response headers.
/// Terminal upstream failures surface with the upstream's status code.
/// Completion metrics are recorded by the router service; only auth and
/// validation rejections are counted here.
pub async fn handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<ChatCompletionRequest>,
) -> Result<Response, AppError> {
    verify_bearer(&headers, &state)?;

    let (response, metadata) = state.service().route(&request).await.inspect_err(|e| {
        if matches!(e, AppError::Validation(_)) {
            state.metrics().record_rejected(400);
        }
    })?;

    let mut http_response = Json(response).into_response();
    let response_headers = http_response.headers_mut();
    for (name, value) in metadata.to_response_headers(&state.config().models) {
        match (HeaderName::try_from(name), HeaderValue::from_str(&value)) {
            (Ok(name), Ok(value)) => {
                response_headers.insert(name, value);
            }
            _ => {
                tracing::warn!(header = name, "Skipping unencodable metadata header");
            }
        }
    }

    Ok(http_response)
}
