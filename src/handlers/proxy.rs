//! Client-facing proxy handlers
//!
//! `POST /v1/messages` validates the request and hands it to the executor;
//! `POST /v1/messages/count_tokens` answers from the local token counter.

use crate::handlers::AppState;
use crate::models::claude::{
    ClaudeContent, ClaudeContentBlock, ClaudeRequest, CountTokensRequest, CountTokensResponse,
};
use crate::services::usage::DEFAULT_SESSION_ID;
use crate::utils::error::{GatewayError, GatewayResult};
use crate::utils::logging::create_claude_request_log_summary;
use axum::{
    extract::{rejection::JsonRejection, State},
    http::HeaderMap,
    response::Response,
    Json,
};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

/// Header a client may use to name its session when `metadata.user_id` carries none
pub const SESSION_ID_HEADER: &str = "x-session-id";

/// Handle client message requests
///
/// POST /v1/messages
pub async fn handle_messages(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    payload: Result<Json<Value>, JsonRejection>,
) -> GatewayResult<Response> {
    let Json(body) = payload.map_err(|e| GatewayError::Validation(e.body_text()))?;
    // Typed view for validation and routing; the raw body is what gets forwarded
    let request: ClaudeRequest = serde_json::from_value(body.clone())
        .map_err(|e| GatewayError::Validation(format!("Invalid request body: {}", e)))?;

    debug!("Received request for model: {}", request.model);
    let summary = create_claude_request_log_summary(&request);
    if let Ok(summary) = serde_json::to_string_pretty(&summary) {
        debug!("Client request:\n{}", summary);
    }

    if let Err(message) = validate_claude_request(&request) {
        warn!("Request validation failed: {}", message);
        return Err(GatewayError::Validation(message));
    }

    let session_id = resolve_session_id(&request, &headers);
    state.executor.execute(&state.routing, &request, body, session_id).await
}

/// Count input tokens without calling a provider
///
/// POST /v1/messages/count_tokens
pub async fn handle_count_tokens(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<CountTokensRequest>, JsonRejection>,
) -> GatewayResult<Json<CountTokensResponse>> {
    let Json(request) = payload.map_err(|e| GatewayError::Validation(e.body_text()))?;

    let input_tokens = state.routing.token_counter().count_tokens(
        &request.messages,
        request.system.as_ref(),
        request.tools.as_deref(),
    )?;

    debug!("Counted {} input tokens for {} messages", input_tokens, request.messages.len());
    Ok(Json(CountTokensResponse { input_tokens }))
}

/// `metadata.user_id` session, then the session header, then the shared default
pub fn resolve_session_id(request: &ClaudeRequest, headers: &HeaderMap) -> String {
    request
        .session_id()
        .or_else(|| {
            headers
                .get(SESSION_ID_HEADER)
                .and_then(|v| v.to_str().ok())
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        })
        .unwrap_or_else(|| DEFAULT_SESSION_ID.to_string())
}

/// Validate client request
fn validate_claude_request(request: &ClaudeRequest) -> Result<(), String> {
    if request.model.trim().is_empty() {
        return Err("Model name cannot be empty".to_string());
    }

    if request.max_tokens == Some(0) {
        return Err("max_tokens must be greater than 0".to_string());
    }

    if request.messages.is_empty() {
        return Err("Message list cannot be empty".to_string());
    }

    for (i, message) in request.messages.iter().enumerate() {
        if !matches!(message.role.as_str(), "user" | "assistant") {
            return Err(format!("Message {} role is invalid: '{}'", i, message.role));
        }

        // Empty assistant turns occur in tool_use flows
        if message.role == "user" && is_empty_content(&message.content) {
            return Err(format!("Message {} content cannot be empty", i));
        }
    }

    if let Some(temperature) = request.temperature {
        if !(0.0..=2.0).contains(&temperature) {
            return Err("temperature must be between 0 and 2".to_string());
        }
    }

    if let Some(top_p) = request.top_p {
        if !(0.0..=1.0).contains(&top_p) {
            return Err("top_p must be between 0 and 1".to_string());
        }
    }

    if request.top_k == Some(0) {
        return Err("top_k must be greater than 0".to_string());
    }

    Ok(())
}

fn is_empty_content(content: &ClaudeContent) -> bool {
    match content {
        ClaudeContent::Text(text) => text.is_empty(),
        ClaudeContent::Blocks(blocks) => blocks
            .iter()
            .all(|block| matches!(block, ClaudeContentBlock::Text { text } if text.is_empty())),
    }
}
