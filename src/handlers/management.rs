//! Management API handlers
//!
//! Config inspection and persistence, transformer listing and usage
//! queries. Every route here sits behind the auth gate.

use crate::config::file::MASKED_SECRET;
use crate::config::AppConfig;
use crate::handlers::AppState;
use crate::services::usage::{ProviderUsage, UsageRecord, UsageSummary};
use crate::transformers::TransformerInfo;
use crate::utils::error::{GatewayError, GatewayResult};
use axum::{
    extract::{rejection::JsonRejection, Path, State},
    Json,
};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::info;

/// Result of a config write or backup
#[derive(Debug, Serialize)]
pub struct ConfigWriteResponse {
    pub success: bool,
    pub message: String,
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backup: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct TransformersResponse {
    pub transformers: Vec<TransformerInfo>,
    pub usage_by_provider: BTreeMap<String, ProviderUsage>,
}

#[derive(Debug, Serialize)]
pub struct SessionsResponse {
    pub count: usize,
    pub sessions: Vec<UsageRecord>,
}

#[derive(Debug, Serialize)]
pub struct DeleteSessionResponse {
    pub success: bool,
    pub session_id: String,
}

/// GET /api/config
pub async fn get_config(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(state.config.sanitized())
}

/// POST /api/config
///
/// Validates and persists the posted config. The running process keeps its
/// startup snapshot; the new file applies after a restart.
pub async fn update_config(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<AppConfig>, JsonRejection>,
) -> GatewayResult<Json<ConfigWriteResponse>> {
    let Json(mut config) = payload.map_err(|e| GatewayError::Validation(e.body_text()))?;
    let store = state
        .store
        .as_ref()
        .ok_or_else(|| {
            GatewayError::NotFound("configuration file is not managed by this process".to_string())
        })?;

    restore_masked_secrets(&mut config, &state.config);
    let backup = store.save(&config)?;

    info!("Configuration updated at {:?}, restart required to apply", store.path());
    Ok(Json(ConfigWriteResponse {
        success: true,
        message: "Configuration saved. Restart the service to apply it.".to_string(),
        path: store.path().display().to_string(),
        backup: backup.map(|p| p.display().to_string()),
    }))
}

/// POST /api/config/backup
pub async fn backup_config(
    State(state): State<Arc<AppState>>,
) -> GatewayResult<Json<ConfigWriteResponse>> {
    let store = state
        .store
        .as_ref()
        .ok_or_else(|| {
            GatewayError::NotFound("configuration file is not managed by this process".to_string())
        })?;

    let backup = store.backup()?;
    Ok(Json(ConfigWriteResponse {
        success: true,
        message: "Backup created".to_string(),
        path: store.path().display().to_string(),
        backup: Some(backup.display().to_string()),
    }))
}

/// GET /api/transformers
pub async fn list_transformers(State(state): State<Arc<AppState>>) -> Json<TransformersResponse> {
    Json(TransformersResponse {
        transformers: state.registry.describe(),
        usage_by_provider: state.usage.provider_totals(),
    })
}

/// GET /api/usage
pub async fn usage_summary(State(state): State<Arc<AppState>>) -> Json<UsageSummary> {
    Json(state.usage.summary())
}

/// GET /api/usage/sessions
pub async fn list_sessions(State(state): State<Arc<AppState>>) -> Json<SessionsResponse> {
    let sessions = state.usage.get_all();
    Json(SessionsResponse {
        count: sessions.len(),
        sessions,
    })
}

/// GET /api/usage/sessions/:id
pub async fn get_session(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> GatewayResult<Json<UsageRecord>> {
    state
        .usage
        .get(&session_id)
        .map(Json)
        .ok_or_else(|| GatewayError::NotFound(format!("usage session '{}'", session_id)))
}

/// DELETE /api/usage/sessions/:id
pub async fn delete_session(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> GatewayResult<Json<DeleteSessionResponse>> {
    if !state.usage.delete(&session_id) {
        return Err(GatewayError::NotFound(format!("usage session '{}'", session_id)));
    }

    info!("Deleted usage session {}", session_id);
    Ok(Json(DeleteSessionResponse {
        success: true,
        session_id,
    }))
}

/// Put real secrets back where a client echoed the masked `GET /api/config` output
fn restore_masked_secrets(config: &mut AppConfig, running: &AppConfig) {
    if config.api_key.as_deref() == Some(MASKED_SECRET) {
        config.api_key = running.api_key.clone();
    }

    for provider in &mut config.providers {
        if provider.api_key == MASKED_SECRET {
            if let Some(current) = running.find_provider(&provider.name) {
                provider.api_key = current.api_key.clone();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_config(api_key: &str) -> AppConfig {
        AppConfig::from_json_str(&format!(
            r#"{{
                "APIKEY": "{key}",
                "Providers": [
                    {{"name": "openai", "api_base_url": "https://api.openai.com/v1/chat/completions", "api_key": "{key}", "models": ["gpt-4o"]}}
                ],
                "Router": {{"default": "openai,gpt-4o"}}
            }}"#,
            key = api_key
        ))
        .unwrap()
    }

    #[test]
    fn test_restore_masked_secrets() {
        let running = create_test_config("real-secret");
        let mut posted = create_test_config(MASKED_SECRET);

        restore_masked_secrets(&mut posted, &running);

        assert_eq!(posted.api_key.as_deref(), Some("real-secret"));
        assert_eq!(posted.providers[0].api_key, "real-secret");
    }

    #[test]
    fn test_new_secrets_kept() {
        let running = create_test_config("real-secret");
        let mut posted = create_test_config("rotated");

        restore_masked_secrets(&mut posted, &running);

        assert_eq!(posted.providers[0].api_key, "rotated");
    }
}
