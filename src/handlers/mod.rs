//! HTTP handlers module
//!
//! Application state and router assembly for the proxy, management and
//! health endpoints

pub mod health;
pub mod management;
pub mod proxy;

use crate::config::{AppConfig, ConfigStore, Settings};
use crate::middleware::{auth_middleware, request_logging_middleware};
use crate::services::{Executor, RoutingEngine, TiktokenCounter, TokenCounter, UsageTracker};
use crate::transformers::TransformerRegistry;
use anyhow::Result;
use axum::{
    extract::DefaultBodyLimit,
    http::HeaderValue,
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use std::time::Instant;
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    limit::RequestBodyLimitLayer,
    trace::TraceLayer,
};
use tracing::warn;

/// Application state
pub struct AppState {
    pub settings: Settings,
    /// Configuration snapshot the process was started with
    pub config: AppConfig,
    pub routing: RoutingEngine,
    pub registry: Arc<TransformerRegistry>,
    pub usage: Arc<UsageTracker>,
    pub executor: Executor,
    /// Persistence for `POST /api/config`; absent when the config is not file-backed
    pub store: Option<ConfigStore>,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(
        settings: Settings,
        config: AppConfig,
        registry: Arc<TransformerRegistry>,
        counter: Arc<dyn TokenCounter>,
    ) -> Result<Self> {
        let usage = Arc::new(UsageTracker::new());
        let executor = Executor::new(registry.clone(), usage.clone(), settings.upstream.clone())?;
        let routing = RoutingEngine::new(config.router.clone(), config.providers.clone(), counter);

        Ok(Self {
            settings,
            config,
            routing,
            registry,
            usage,
            executor,
            store: None,
            started_at: Instant::now(),
        })
    }

    pub fn with_store(mut self, store: ConfigStore) -> Self {
        self.store = Some(store);
        self
    }
}

/// Create application router with built-in transformers and the default token counter
pub async fn create_router(settings: Settings, config: AppConfig) -> Result<Router> {
    let state = AppState::new(
        settings,
        config,
        Arc::new(TransformerRegistry::with_builtins()),
        Arc::new(TiktokenCounter::new()),
    )?;

    Ok(create_router_with_state(state))
}

/// Create application router around a prepared state
pub fn create_router_with_state(state: AppState) -> Router {
    let max_request_size = state.settings.request.max_request_size;
    let cors = cors_layer(&state.settings);
    let state = Arc::new(state);

    let middleware_stack = ServiceBuilder::new()
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(request_logging_middleware))
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(max_request_size));

    let router = Router::new()
        .route("/v1/messages", post(proxy::handle_messages))
        .route("/v1/messages/count_tokens", post(proxy::handle_count_tokens))
        .route("/api/config", get(management::get_config).post(management::update_config))
        .route("/api/config/backup", post(management::backup_config))
        .route("/api/transformers", get(management::list_transformers))
        .route("/api/usage", get(management::usage_summary))
        .route("/api/usage/sessions", get(management::list_sessions))
        .route(
            "/api/usage/sessions/:id",
            get(management::get_session).delete(management::delete_session),
        )
        .route("/health", get(health::health_check))
        .route("/health/live", get(health::liveness_check))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware))
        .with_state(state);

    let router = match cors {
        Some(cors) => router.layer(cors),
        None => router,
    };

    router.layer(middleware_stack)
}

fn cors_layer(settings: &Settings) -> Option<CorsLayer> {
    if !settings.security.cors_enabled {
        return None;
    }

    let origins = &settings.security.allowed_origins;
    if origins.is_empty() || origins.iter().any(|o| o == "*") {
        return Some(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any));
    }

    let parsed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("Ignoring invalid CORS origin: {}", origin);
                None
            }
        })
        .collect();

    Some(
        CorsLayer::new()
            .allow_origin(parsed)
            .allow_methods(Any)
            .allow_headers(Any),
    )
}
