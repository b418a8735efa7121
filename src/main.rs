//! routegate server
//!
//! Loads the JSON config, wires the transformer registry, router and usage
//! tracker, then serves the proxy and management API

use anyhow::{Context, Result};
use routegate::config::{AppConfig, ConfigStore, Settings};
use routegate::handlers::{create_router_with_state, AppState};
use routegate::services::TiktokenCounter;
use routegate::transformers::TransformerRegistry;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // Environment settings first: they load .env, which may point at the config file
    let settings = Settings::new().context("Failed to load server settings")?;

    let config_path = AppConfig::default_path()?;
    let app_config = AppConfig::load(&config_path).context("Failed to load gateway configuration")?;

    init_logging(&settings, &app_config)?;
    info!("{}", routegate::version_info());
    info!("Configuration loaded from {:?}", config_path);

    if app_config.api_key.as_deref().map(str::is_empty).unwrap_or(true) {
        warn!("APIKEY is not set: the management API is open to anyone who can reach it");
    }

    let registry = TransformerRegistry::builder()
        .declare_from_config(&app_config.transformers)
        .build();
    info!("Transformers available: {}", registry.list_transformers().join(", "));

    let addr = format!("{}:{}", app_config.host, app_config.port);
    let routes = app_config.list_routes();

    let state = AppState::new(
        settings,
        app_config,
        Arc::new(registry),
        Arc::new(TiktokenCounter::new()),
    )?
    .with_store(ConfigStore::new(config_path));

    let app = create_router_with_state(state);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    info!("routegate listening on http://{}", addr);
    info!("Proxy endpoint: http://{}/v1/messages", addr);
    info!("Health check: http://{}/health", addr);
    info!("{} routes configured: {}", routes.len(), routes.join(" | "));

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| anyhow::anyhow!("Server error: {}", e))?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

/// Initialize logging system
///
/// RUST_LOG wins over the config file's LOG_LEVEL; `LOG: false` silences everything.
fn init_logging(settings: &Settings, config: &AppConfig) -> Result<()> {
    let directive = if config.log == Some(false) {
        "off".to_string()
    } else {
        settings
            .logging
            .level
            .clone()
            .or_else(|| config.log_level.clone())
            .unwrap_or_else(|| "info".to_string())
    };

    let filter = EnvFilter::try_new(&directive)
        .with_context(|| format!("Invalid log filter '{}'", directive))?;

    let json_format = settings.logging.format == "json";
    let subscriber: Box<dyn tracing::Subscriber + Send + Sync> = if json_format {
        Box::new(
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .json()
                .with_current_span(true)
                .with_span_list(false)
                .finish(),
        )
    } else {
        Box::new(
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_target(false)
                .with_thread_ids(false)
                .finish(),
        )
    };

    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")?;
    Ok(())
}
