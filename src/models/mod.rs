//! Data models module
//!
//! Defines wire structures for the client protocol (Claude) and the upstream
//! provider protocols (OpenAI chat completions, Gemini generateContent)

use serde::{Deserialize, Serialize};

pub mod claude;
pub mod gemini;
pub mod openai;

/// Error body returned on every failure path
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiErrorBody {
    pub error: ApiError,
}

/// Error payload
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiError {
    /// Error type
    #[serde(rename = "type")]
    pub error_type: String,
    /// Error message
    pub message: String,
    /// Details (optional)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}
