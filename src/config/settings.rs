//! Process settings
//!
//! Runtime knobs read from the environment (optionally via `.env`): upstream
//! timeouts, request limits, CORS and log output format. Providers and routes
//! live in the JSON config file instead (see [`crate::config::file`]).

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Main process settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Upstream HTTP client configuration
    pub upstream: UpstreamConfig,
    /// Request configuration
    pub request: RequestConfig,
    /// Security configuration
    pub security: SecurityConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Upstream HTTP client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
    /// Buffered request timeout in seconds
    pub request_timeout: u64,
    /// Streaming request timeout in seconds
    pub stream_timeout: u64,
    /// Connect timeout in seconds
    pub connect_timeout: u64,
}

/// Request configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestConfig {
    /// Maximum request size in bytes
    pub max_request_size: usize,
}

/// Security configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    /// Allowed origins for CORS
    pub allowed_origins: Vec<String>,
    /// Whether CORS is enabled
    pub cors_enabled: bool,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Filter directive from RUST_LOG, overrides the config file's LOG_LEVEL
    pub level: Option<String>,
    /// Log format (text/json)
    pub format: String,
}

impl Settings {
    /// Create a new settings instance from the environment
    pub fn new() -> Result<Self> {
        // Load .env file if it exists
        dotenv::dotenv().ok();

        let settings = Self {
            upstream: UpstreamConfig {
                request_timeout: get_env_or_default("UPSTREAM_TIMEOUT", "120")
                    .parse()
                    .context("Invalid UPSTREAM_TIMEOUT value")?,
                stream_timeout: get_env_or_default("STREAM_TIMEOUT", "600")
                    .parse()
                    .context("Invalid STREAM_TIMEOUT value")?,
                connect_timeout: get_env_or_default("CONNECT_TIMEOUT", "10")
                    .parse()
                    .context("Invalid CONNECT_TIMEOUT value")?,
            },
            request: RequestConfig {
                max_request_size: get_env_or_default("MAX_REQUEST_SIZE", "10485760")
                    .parse()
                    .context("Invalid maximum request size")?,
            },
            security: SecurityConfig {
                allowed_origins: get_env_or_default("ALLOWED_ORIGINS", "*")
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect(),
                cors_enabled: get_env_or_default("CORS_ENABLED", "true")
                    .parse()
                    .context("Invalid CORS enabled flag")?,
            },
            logging: LoggingConfig {
                level: std::env::var("RUST_LOG").ok().filter(|l| !l.is_empty()),
                format: get_env_or_default("LOG_FORMAT", "text"),
            },
        };

        settings.validate()?;

        Ok(settings)
    }

    /// Validate settings
    pub fn validate(&self) -> Result<()> {
        if self.upstream.request_timeout == 0 || self.upstream.stream_timeout == 0 {
            anyhow::bail!("Timeout values cannot be 0");
        }

        if self.upstream.connect_timeout == 0 {
            anyhow::bail!("Connect timeout cannot be 0");
        }

        if self.request.max_request_size == 0 {
            anyhow::bail!("Maximum request size cannot be 0");
        }

        let valid_formats = ["text", "json"];
        if !valid_formats.contains(&self.logging.format.as_str()) {
            anyhow::bail!("Invalid log format: {}", self.logging.format);
        }

        Ok(())
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            upstream: UpstreamConfig {
                request_timeout: 120,
                stream_timeout: 600,
                connect_timeout: 10,
            },
            request: RequestConfig {
                max_request_size: 10 * 1024 * 1024,
            },
            security: SecurityConfig {
                allowed_origins: vec!["*".to_string()],
                cors_enabled: true,
            },
            logging: LoggingConfig {
                level: None,
                format: "text".to_string(),
            },
        }
    }
}

/// Get environment variable or default value
fn get_env_or_default(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}
