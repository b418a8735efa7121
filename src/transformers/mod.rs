//! Transformer module
//!
//! Defines the Transformer trait and the built-in wire-format transformers.
//! Transformers operate on JSON values so chains can mix protocol
//! converters (`openai`, `gemini`) with small utility steps (`maxtoken`).

pub mod deepseek;
pub mod gemini;
pub mod maxtoken;
pub mod openai;
pub mod openai_compat;
pub mod registry;

use crate::models::claude::{ClaudeStreamEvent, ClaudeStreamMessage, ClaudeUsage};
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::warn;
use uuid::Uuid;

pub use deepseek::DeepSeekTransformer;
pub use gemini::GeminiTransformer;
pub use maxtoken::MaxTokenTransformer;
pub use openai::OpenAITransformer;
pub use registry::{
    ResolvedTransformer, TransformerInfo, TransformerRegistry, TransformerRegistryBuilder,
};

/// Per-invocation context handed to every transformer operation
#[derive(Debug, Clone, Default)]
pub struct TransformerContext {
    /// Options from the `[name, options]` chain entry
    pub config: Option<Value>,
    /// Routed provider name
    pub provider: String,
    /// Routed model id
    pub model: String,
}

impl TransformerContext {
    pub fn new(provider: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            config: None,
            provider: provider.into(),
            model: model.into(),
        }
    }

    pub fn with_config(mut self, config: Option<Value>) -> Self {
        self.config = config;
        self
    }
}

/// Which operations a transformer overrides
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TransformerCapabilities {
    pub request: bool,
    pub response: bool,
    pub stream: bool,
}

/// Transformer errors
#[derive(Debug, Error)]
pub enum TransformerError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Unexpected response format: {0}")]
    ResponseFormat(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Transformer trait for wire-format conversion
///
/// Every operation defaults to pass-through. Requests flow through a chain in
/// registration order; responses and stream chunks flow through it in reverse.
#[async_trait]
pub trait Transformer: Send + Sync {
    /// Unique transformer name
    fn name(&self) -> &str;

    /// Operations this transformer overrides
    fn capabilities(&self) -> TransformerCapabilities;

    /// Convert the request body towards the provider's schema
    async fn transform_request(
        &self,
        request: Value,
        _context: &TransformerContext,
    ) -> Result<Value, TransformerError> {
        Ok(request)
    }

    /// Convert a buffered provider response towards the client schema
    fn transform_response(
        &self,
        response: Value,
        _context: &TransformerContext,
    ) -> Result<Value, TransformerError> {
        Ok(response)
    }

    /// Convert one streaming unit into zero or more SSE frames.
    /// Must not fail; partial or unparseable input yields `""`.
    fn transform_stream_chunk(&self, chunk: &str, _context: &TransformerContext) -> String {
        chunk.to_string()
    }

    /// Upstream URL when the provider's `api_base_url` is not the full endpoint
    fn endpoint(
        &self,
        _base_url: &str,
        _context: &TransformerContext,
        _stream: bool,
    ) -> Option<String> {
        None
    }

    /// Auth headers replacing the default `Authorization: Bearer <api_key>`
    fn upstream_auth(&self, _api_key: &str) -> Option<Vec<(String, String)>> {
        None
    }
}

/// Render one event as an SSE frame: `event: <name>\ndata: <json>\n\n`
pub fn sse_frame(event: &ClaudeStreamEvent) -> String {
    match serde_json::to_string(event) {
        Ok(data) => format!("event: {}\ndata: {}\n\n", event.event_name(), data),
        Err(e) => {
            warn!("Failed to serialize stream event {}: {}", event.event_name(), e);
            String::new()
        }
    }
}

/// Render a list of events as concatenated SSE frames
pub fn sse_frames(events: &[ClaudeStreamEvent]) -> String {
    events.iter().map(sse_frame).collect()
}

/// Payload of an upstream SSE `data:` line, if the line is one
pub fn sse_data(line: &str) -> Option<&str> {
    line.trim().strip_prefix("data:").map(str::trim).filter(|d| !d.is_empty())
}

/// Initial `message_start` event for a streamed reply
pub fn message_start_event(model: &str, input_tokens: u64) -> ClaudeStreamEvent {
    ClaudeStreamEvent::MessageStart {
        message: ClaudeStreamMessage {
            id: generate_message_id(),
            message_type: "message".to_string(),
            role: "assistant".to_string(),
            content: vec![],
            model: model.to_string(),
            stop_reason: None,
            stop_sequence: None,
            usage: ClaudeUsage {
                input_tokens,
                output_tokens: 0,
            },
        },
    }
}

/// Map an OpenAI `finish_reason` to a client stop reason; unknown reasons pass through
pub fn map_openai_finish_reason(finish_reason: &str) -> String {
    match finish_reason {
        "stop" => "end_turn",
        "length" => "max_tokens",
        "tool_calls" | "function_call" => "tool_use",
        "content_filter" => "stop_sequence",
        other => other,
    }
    .to_string()
}

/// Map a Gemini `finishReason` to a client stop reason; unknown reasons pass through
pub fn map_gemini_finish_reason(finish_reason: &str, has_function_calls: bool) -> String {
    match finish_reason {
        "STOP" if has_function_calls => "tool_use",
        "STOP" => "end_turn",
        "MAX_TOKENS" => "max_tokens",
        "SAFETY" | "RECITATION" => "stop_sequence",
        other => other,
    }
    .to_string()
}

/// Parse tool-call arguments; empty or invalid JSON becomes `{}`
pub fn safe_parse_tool_arguments(arguments: &str) -> Value {
    if arguments.trim().is_empty() || arguments == "\"\"" {
        return Value::Object(Default::default());
    }

    serde_json::from_str(arguments).unwrap_or_else(|e| {
        warn!("Failed to parse tool arguments: {}, using empty object", e);
        Value::Object(Default::default())
    })
}

pub fn generate_message_id() -> String {
    format!("msg_{}", Uuid::new_v4().simple())
}

pub fn generate_tool_use_id() -> String {
    format!("toolu_{}", Uuid::new_v4().simple())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::claude::ClaudeMessageDelta;

    #[test]
    fn test_finish_reason_mapping() {
        assert_eq!(map_openai_finish_reason("stop"), "end_turn");
        assert_eq!(map_openai_finish_reason("length"), "max_tokens");
        assert_eq!(map_openai_finish_reason("tool_calls"), "tool_use");
        assert_eq!(map_openai_finish_reason("content_filter"), "stop_sequence");
        assert_eq!(
            map_openai_finish_reason("insufficient_system_resource"),
            "insufficient_system_resource"
        );

        assert_eq!(map_gemini_finish_reason("STOP", false), "end_turn");
        assert_eq!(map_gemini_finish_reason("STOP", true), "tool_use");
        assert_eq!(map_gemini_finish_reason("SAFETY", false), "stop_sequence");
        assert_eq!(map_gemini_finish_reason("BLOCKLIST", false), "BLOCKLIST");
    }

    #[test]
    fn test_sse_frame_format() {
        let frame = sse_frame(&ClaudeStreamEvent::MessageDelta {
            delta: ClaudeMessageDelta { stop_reason: None, stop_sequence: None },
            usage: ClaudeUsage { input_tokens: 3, output_tokens: 4 },
        });

        assert!(frame.starts_with("event: message_delta\ndata: {"));
        assert!(frame.ends_with("\n\n"));
        assert!(!frame.contains("stop_reason"));
    }

    #[test]
    fn test_safe_parse_tool_arguments() {
        assert_eq!(safe_parse_tool_arguments(""), serde_json::json!({}));
        assert_eq!(safe_parse_tool_arguments("{\"a\":"), serde_json::json!({}));
        assert_eq!(safe_parse_tool_arguments("{\"a\":1}"), serde_json::json!({"a": 1}));
    }

    #[test]
    fn test_sse_data() {
        assert_eq!(sse_data("data: {\"x\":1}"), Some("{\"x\":1}"));
        assert_eq!(sse_data("data:[DONE]"), Some("[DONE]"));
        assert_eq!(sse_data(": keep-alive"), None);
        assert_eq!(sse_data("data: "), None);
    }
}
