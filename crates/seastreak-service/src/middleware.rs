//! API key authentication for the seastreak-service API.

use std::sync::Arc;

use axum::{
    Json,
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};
use subtle::ConstantTimeEq;
use tracing::warn;

use crate::config::SecurityConfig;

/// Header carrying the API key.
pub const API_KEY_HEADER: &str = "X-API-Key";

/// API key authentication middleware.
///
/// Checks the `X-API-Key` header against the configured key. `/api/health`
/// is always reachable so monitoring works without credentials.
///
/// Returns 401 Unauthorized if the key is missing or invalid.
pub async fn api_key_auth(
    State(config): State<Arc<SecurityConfig>>,
    request: Request,
    next: Next,
) -> Response {
    if !config.api_key_enabled || request.uri().path() == "/api/health" {
        return next.run(request).await;
    }

    let provided = request
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok());

    let valid = match (&config.api_key, provided) {
        (Some(expected), Some(provided)) => keys_match(expected, provided),
        _ => false,
    };

    if valid {
        next.run(request).await
    } else {
        warn!("API key authentication failed for {}", request.uri().path());
        (
            StatusCode::UNAUTHORIZED,
            Json(serde_json::json!({
                "error": "Invalid or missing API key",
                "hint": "Provide a valid API key in the X-API-Key header"
            })),
        )
            .into_response()
    }
}

/// Compare keys in constant time.
fn keys_match(expected: &str, provided: &str) -> bool {
    expected.as_bytes().ct_eq(provided.as_bytes()).into()
}
