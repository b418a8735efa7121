//! DeepSeek transformer
//!
//! OpenAI-compatible, but without vision, with string-only message content
//! and a hard `max_tokens` ceiling.

use super::openai_compat::{self, OpenAICompatQuirks};
use super::{Transformer, TransformerCapabilities, TransformerContext, TransformerError};
use crate::models::claude::ClaudeRequest;
use async_trait::async_trait;
use serde_json::Value;

/// Largest `max_tokens` DeepSeek accepts
pub const DEEPSEEK_MAX_TOKENS: u32 = 8192;

const QUIRKS: OpenAICompatQuirks = OpenAICompatQuirks {
    supports_vision: false,
    string_content: true,
    max_tokens_cap: Some(DEEPSEEK_MAX_TOKENS),
};

#[derive(Debug, Default)]
pub struct DeepSeekTransformer;

impl DeepSeekTransformer {
    pub const NAME: &'static str = "deepseek";

    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Transformer for DeepSeekTransformer {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn capabilities(&self) -> TransformerCapabilities {
        TransformerCapabilities { request: true, response: true, stream: true }
    }

    async fn transform_request(
        &self,
        request: Value,
        _context: &TransformerContext,
    ) -> Result<Value, TransformerError> {
        let request: ClaudeRequest = serde_json::from_value(request)
            .map_err(|e| TransformerError::InvalidRequest(e.to_string()))?;
        let converted = openai_compat::build_request(request, QUIRKS)?;
        Ok(serde_json::to_value(converted)?)
    }

    fn transform_response(
        &self,
        response: Value,
        context: &TransformerContext,
    ) -> Result<Value, TransformerError> {
        let converted = openai_compat::parse_response(response, context)?;
        Ok(serde_json::to_value(converted)?)
    }

    fn transform_stream_chunk(&self, chunk: &str, context: &TransformerContext) -> String {
        openai_compat::convert_stream_line(chunk, context)
    }
}
