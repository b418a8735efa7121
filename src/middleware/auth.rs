//! Authentication middleware
//!
//! Single static key gate for the management API. Proxy paths (`/v1/*`)
//! and health checks are exempt.

use crate::handlers::AppState;
use crate::utils::error::GatewayError;
use axum::{
    extract::{Request, State},
    http::{header, HeaderMap},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use tracing::{debug, warn};

/// Header carrying the key directly; takes precedence over `Authorization`
pub const API_KEY_HEADER: &str = "x-api-key";

/// Authentication middleware
pub async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    let path = request.uri().path().to_string();

    if !requires_auth(&path) {
        return next.run(request).await;
    }

    let expected = match state.config.api_key.as_deref().filter(|k| !k.is_empty()) {
        Some(key) => key,
        None => return next.run(request).await,
    };

    let authorized =
        extract_api_key(request.headers()).map(|provided| constant_time_eq(provided, expected));

    match authorized {
        Some(true) => {
            debug!("Authentication successful for {}", path);
            next.run(request).await
        }
        Some(false) => {
            warn!("Invalid API key for {}", path);
            GatewayError::Authentication("invalid API key".to_string()).into_response()
        }
        None => {
            warn!("Missing API key for {}", path);
            GatewayError::Authentication("missing API key".to_string()).into_response()
        }
    }
}

/// Compare keys without short-circuiting on the first differing byte
pub(crate) fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result = 0u8;
    for (a_byte, b_byte) in a.bytes().zip(b.bytes()) {
        result |= a_byte ^ b_byte;
    }

    result == 0
}

/// Only the management API is gated
pub fn requires_auth(path: &str) -> bool {
    path == "/api" || path.starts_with("/api/")
}

/// Key from `x-api-key`, else from `Authorization: Bearer <key>`
pub fn extract_api_key(headers: &HeaderMap) -> Option<&str> {
    if let Some(key) = headers
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|k| !k.is_empty())
    {
        return Some(key);
    }

    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|k| !k.is_empty())
}
