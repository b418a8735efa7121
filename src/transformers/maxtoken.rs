//! `maxtoken` utility transformer
//!
//! Request-only step that forces `max_tokens` to the value from its chain
//! entry options, e.g. `["maxtoken", {"max_tokens": 16384}]`.

use super::{Transformer, TransformerCapabilities, TransformerContext, TransformerError};
use async_trait::async_trait;
use serde_json::Value;
use tracing::warn;

#[derive(Debug, Default)]
pub struct MaxTokenTransformer;

impl MaxTokenTransformer {
    pub const NAME: &'static str = "maxtoken";

    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Transformer for MaxTokenTransformer {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn capabilities(&self) -> TransformerCapabilities {
        TransformerCapabilities { request: true, response: false, stream: false }
    }

    async fn transform_request(
        &self,
        mut request: Value,
        context: &TransformerContext,
    ) -> Result<Value, TransformerError> {
        let max_tokens = context
            .config
            .as_ref()
            .and_then(|options| options.get("max_tokens"))
            .and_then(|v| v.as_u64());

        match (max_tokens, request.as_object_mut()) {
            (Some(max_tokens), Some(body)) => {
                body.insert("max_tokens".to_string(), Value::from(max_tokens));
            }
            (None, _) => {
                warn!("maxtoken transformer configured without a numeric 'max_tokens' option")
            }
            (_, None) => {
                return Err(TransformerError::InvalidRequest(
                    "request body is not a JSON object".to_string(),
                ))
            }
        }

        Ok(request)
    }
}
