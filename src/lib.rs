//! routegate library
//!
//! Routes Claude Messages API requests to heterogeneous upstream providers
//! through configurable transformer chains

pub mod config;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;
pub mod transformers;
pub mod utils;

// Re-export common types
pub use config::{AppConfig, Settings};
pub use handlers::{create_router, create_router_with_state, AppState};
pub use models::{claude, gemini, openai};
pub use services::{Executor, RoutingEngine, UsageTracker};
pub use transformers::{Transformer, TransformerRegistry};
pub use utils::error::{GatewayError, GatewayResult};

/// Library version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");

/// Library description
pub const DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");

/// Get version information
pub fn version_info() -> String {
    format!("{} v{} - {}", NAME, VERSION, DESCRIPTION)
}
