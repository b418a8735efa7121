//! Error handling module
//!
//! HTTP-facing gateway error: owns the status code and error type mapping
//! and renders the `{"error": {type, message, details?}}` body.

use crate::config::ConfigStoreError;
use crate::models::{ApiError, ApiErrorBody};
use crate::services::router::RoutingError;
use crate::services::tokenizer::TokenCountError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

/// Gateway error types
#[derive(Error, Debug)]
pub enum GatewayError {
    /// Missing or wrong API key on a management path
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Route resolution failed
    #[error("Routing failed: {0}")]
    Routing(#[from] RoutingError),

    /// A transformer in the chain rejected the request or response
    #[error("Transformer '{transformer}' failed: {message}")]
    Transformation { transformer: String, message: String },

    /// Token counting failed
    #[error("Token counting failed: {0}")]
    TokenCounting(#[from] TokenCountError),

    /// Upstream call failed before a response was received
    #[error("Upstream request failed: {0}")]
    Proxy(String),

    /// Request validation failed
    #[error("Request validation failed: {0}")]
    Validation(String),

    /// Resource not found
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Config validation or persistence failed
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigStoreError),
}

impl GatewayError {
    pub fn transformation(transformer: impl Into<String>, error: impl std::fmt::Display) -> Self {
        GatewayError::Transformation {
            transformer: transformer.into(),
            message: error.to_string(),
        }
    }

    /// Get HTTP status code
    pub fn status_code(&self) -> StatusCode {
        match self {
            GatewayError::Authentication(_) => StatusCode::UNAUTHORIZED,
            GatewayError::Routing(RoutingError::ProviderNotFound(_))
            | GatewayError::Routing(RoutingError::ModelNotAvailable { .. }) => {
                StatusCode::NOT_FOUND
            }
            GatewayError::Routing(_) => StatusCode::INTERNAL_SERVER_ERROR,
            GatewayError::Validation(_) => StatusCode::BAD_REQUEST,
            GatewayError::NotFound(_) => StatusCode::NOT_FOUND,
            GatewayError::Configuration(ConfigStoreError::Validation(_)) => StatusCode::BAD_REQUEST,
            GatewayError::Configuration(_)
            | GatewayError::Transformation { .. }
            | GatewayError::TokenCounting(_)
            | GatewayError::Proxy(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get error type string
    pub fn error_type(&self) -> &'static str {
        match self {
            GatewayError::Authentication(_) => "authentication_error",
            GatewayError::Routing(RoutingError::TokenCounting(_)) => "token_counting_error",
            GatewayError::Routing(_) => "routing_error",
            GatewayError::Transformation { .. } => "transformation_error",
            GatewayError::TokenCounting(_) => "token_counting_error",
            GatewayError::Proxy(_) => "proxy_error",
            GatewayError::Validation(_) => "invalid_request_error",
            GatewayError::NotFound(_) => "not_found_error",
            GatewayError::Configuration(_) => "configuration_error",
        }
    }

    /// Optional structured details for the error body
    pub fn details(&self) -> Option<serde_json::Value> {
        match self {
            GatewayError::Transformation { transformer, .. } => {
                Some(serde_json::json!({ "transformer": transformer }))
            }
            GatewayError::Routing(RoutingError::ModelNotAvailable { provider, model }) => {
                Some(serde_json::json!({ "provider": provider, "model": model }))
            }
            _ => None,
        }
    }

    /// Whether detailed error information should be logged
    pub fn should_log_details(&self) -> bool {
        self.status_code().is_server_error()
    }

    pub fn to_body(&self) -> ApiErrorBody {
        ApiErrorBody {
            error: ApiError {
                error_type: self.error_type().to_string(),
                message: self.to_string(),
                details: self.details(),
            },
        }
    }
}

/// Implement IntoResponse trait to allow errors to be returned directly as HTTP responses
impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        if self.should_log_details() {
            tracing::error!("Gateway error: {} - Status code: {}", self, status);
        } else {
            tracing::warn!(
                "Client error: {} ({}) - Status code: {}",
                self.error_type(),
                self,
                status
            );
        }

        (status, Json(self.to_body())).into_response()
    }
}

/// Result type alias
pub type GatewayResult<T> = Result<T, GatewayError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_status_codes() {
        assert_eq!(
            GatewayError::Authentication("x".to_string()).status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            GatewayError::Routing(RoutingError::ProviderNotFound("p".to_string())).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            GatewayError::Routing(RoutingError::InvalidRoute("p".to_string())).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            GatewayError::transformation("gemini", "bad").status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            GatewayError::Validation("x".to_string()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            GatewayError::Configuration(ConfigStoreError::Validation("x".to_string()))
                .status_code(),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn test_error_types() {
        assert_eq!(GatewayError::Proxy("x".to_string()).error_type(), "proxy_error");
        assert_eq!(
            GatewayError::Routing(RoutingError::ModelNotAvailable {
                provider: "p".to_string(),
                model: "m".to_string()
            })
            .error_type(),
            "routing_error"
        );
        assert_eq!(
            GatewayError::TokenCounting(TokenCountError::Unavailable("x".to_string())).error_type(),
            "token_counting_error"
        );
    }

    #[test]
    fn test_body_names_transformer() {
        let body = GatewayError::transformation("gemini", "missing 'candidates' array").to_body();
        let json = serde_json::to_value(&body).unwrap();

        assert_eq!(json["error"]["type"], "transformation_error");
        assert_eq!(json["error"]["details"]["transformer"], "gemini");
        assert!(json["error"]["message"].as_str().unwrap().contains("gemini"));
    }
}
