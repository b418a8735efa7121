//! Gemini transformer
//!
//! Converts between the client protocol and Gemini `generateContent`:
//! `contents`/`parts` with roles `user`/`model`, `systemInstruction`,
//! `functionCall`/`functionResponse` parts and `functionDeclarations`.

use super::{
    generate_message_id, generate_tool_use_id, map_gemini_finish_reason, sse_data, sse_frames,
    Transformer, TransformerCapabilities, TransformerContext, TransformerError,
};
use crate::models::claude::{
    ClaudeContent, ClaudeContentBlock, ClaudeContentDelta, ClaudeError, ClaudeMessageDelta,
    ClaudeRequest, ClaudeResponse, ClaudeStreamEvent, ClaudeUsage, ImageSource, ToolChoice,
};
use crate::models::gemini::{
    GeminiContent, GeminiFunctionCall, GeminiFunctionCallingConfig, GeminiFunctionDeclaration,
    GeminiFunctionResponse, GeminiGenerationConfig, GeminiInlineData, GeminiPart, GeminiRequest,
    GeminiResponse, GeminiSystemInstruction, GeminiThinkingConfig, GeminiTool, GeminiToolConfig,
    GeminiUsageMetadata,
};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::HashMap;
use tracing::{debug, warn};

/// JSON-Schema keywords the Gemini function-declaration validator rejects
const UNSUPPORTED_SCHEMA_KEYWORDS: &[&str] = &[
    // Meta
    "$schema", "$id", "$ref", "$defs", "definitions", "$comment",
    // Composition
    "anyOf", "allOf", "oneOf", "not", "if", "then", "else",
    // Numeric
    "exclusiveMinimum", "exclusiveMaximum", "multipleOf",
    // Object
    "additionalProperties", "propertyNames", "patternProperties", "unevaluatedProperties",
    "dependentSchemas", "dependentRequired", "minProperties", "maxProperties",
    // Array
    "contains", "minContains", "maxContains", "unevaluatedItems", "prefixItems", "uniqueItems",
    // String
    "contentEncoding", "contentMediaType", "contentSchema",
    // Annotations
    "const", "deprecated", "readOnly", "writeOnly", "examples", "default",
];

/// Remove unsupported keywords recursively
pub fn sanitize_schema(value: Value) -> Value {
    match value {
        Value::Object(mut map) => {
            for keyword in UNSUPPORTED_SCHEMA_KEYWORDS {
                map.remove(*keyword);
            }
            Value::Object(map.into_iter().map(|(k, v)| (k, sanitize_schema(v))).collect())
        }
        Value::Array(items) => Value::Array(items.into_iter().map(sanitize_schema).collect()),
        other => other,
    }
}

#[derive(Debug, Default)]
pub struct GeminiTransformer;

impl GeminiTransformer {
    pub const NAME: &'static str = "gemini";

    pub fn new() -> Self {
        Self
    }

    fn build_request(&self, request: ClaudeRequest) -> Result<GeminiRequest, TransformerError> {
        if request.messages.is_empty() {
            return Err(TransformerError::InvalidRequest("messages must not be empty".to_string()));
        }

        // functionResponse needs the function name; tool_result only carries the id
        let mut tool_names: HashMap<String, String> = HashMap::new();
        for message in &request.messages {
            if let ClaudeContent::Blocks(blocks) = &message.content {
                for block in blocks {
                    if let ClaudeContentBlock::ToolUse { id, name, .. } = block {
                        tool_names.insert(id.clone(), name.clone());
                    }
                }
            }
        }

        let mut contents = Vec::with_capacity(request.messages.len());
        for message in &request.messages {
            let role = if message.role == "assistant" { "model" } else { "user" };
            let parts = self.convert_blocks(message.content.blocks(), &tool_names);
            if parts.is_empty() {
                continue;
            }
            contents.push(GeminiContent { role: role.to_string(), parts });
        }

        let system_instruction = request
            .system
            .as_ref()
            .map(|s| s.extract_text())
            .filter(|text| !text.is_empty())
            .map(|text| GeminiSystemInstruction { parts: vec![GeminiPart::text(text)] });

        let declarations: Vec<GeminiFunctionDeclaration> = request
            .tools
            .as_deref()
            .unwrap_or_default()
            .iter()
            .map(|tool| GeminiFunctionDeclaration {
                name: tool.name.clone(),
                description: tool.description.clone().unwrap_or_default(),
                parameters: tool.input_schema.clone().map(sanitize_schema),
            })
            .collect();

        let (tools, tool_config) = if declarations.is_empty() {
            (None, None)
        } else {
            let tool_config = request.tool_choice.as_ref().map(|choice| {
                let (mode, allowed) = match choice {
                    ToolChoice::Auto => ("AUTO", None),
                    ToolChoice::Any => ("ANY", None),
                    ToolChoice::Tool { name } => ("ANY", Some(vec![name.clone()])),
                };
                GeminiToolConfig {
                    function_calling_config: GeminiFunctionCallingConfig {
                        mode: mode.to_string(),
                        allowed_function_names: allowed,
                    },
                }
            });
            (Some(vec![GeminiTool { function_declarations: declarations }]), tool_config)
        };

        let thinking_config = request
            .thinking
            .as_ref()
            .filter(|t| t.is_enabled())
            .map(|t| GeminiThinkingConfig {
                include_thoughts: true,
                thinking_budget: t.budget_tokens(),
            });

        Ok(GeminiRequest {
            contents,
            system_instruction,
            tools,
            tool_config,
            generation_config: Some(GeminiGenerationConfig {
                temperature: request.temperature,
                top_p: request.top_p,
                top_k: request.top_k,
                max_output_tokens: request.max_tokens,
                stop_sequences: request.stop_sequences,
                thinking_config,
            }),
        })
    }

    fn convert_blocks(
        &self,
        blocks: Vec<ClaudeContentBlock>,
        tool_names: &HashMap<String, String>,
    ) -> Vec<GeminiPart> {
        let mut parts = Vec::with_capacity(blocks.len());

        for block in blocks {
            match block {
                ClaudeContentBlock::Text { text } => {
                    if !text.is_empty() {
                        parts.push(GeminiPart::text(text));
                    }
                }
                ClaudeContentBlock::Image { source: ImageSource::Base64 { media_type, data } } => {
                    parts.push(GeminiPart::InlineData {
                        inline_data: GeminiInlineData { mime_type: media_type, data },
                    });
                }
                ClaudeContentBlock::Image { source: ImageSource::Url { url } } => {
                    parts.push(GeminiPart::text(format!("[Image URL: {}]", url)));
                }
                ClaudeContentBlock::ToolUse { name, input, .. } => {
                    parts.push(GeminiPart::FunctionCall {
                        function_call: GeminiFunctionCall { name, args: input },
                    });
                }
                ClaudeContentBlock::ToolResult { tool_use_id, content, is_error } => {
                    let name = tool_names.get(&tool_use_id).cloned().unwrap_or_else(|| {
                        warn!(
                            "No tool_use found for tool_result {}, using id as function name",
                            tool_use_id
                        );
                        tool_use_id.clone()
                    });
                    let response = if is_error.unwrap_or(false) {
                        json!({"error": content.to_text()})
                    } else {
                        json!({"content": content.to_text()})
                    };
                    parts.push(GeminiPart::FunctionResponse {
                        function_response: GeminiFunctionResponse { name, response },
                    });
                }
                ClaudeContentBlock::Unknown => {
                    warn!("Skipping unknown content block type in Gemini conversion");
                }
            }
        }

        parts
    }

    fn usage(metadata: Option<&GeminiUsageMetadata>) -> ClaudeUsage {
        metadata
            .map(|m| ClaudeUsage {
                input_tokens: m.prompt_token_count.unwrap_or(0),
                output_tokens: m.candidates_token_count.unwrap_or(0),
            })
            .unwrap_or_default()
    }
}

#[async_trait]
impl Transformer for GeminiTransformer {
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
        let converted = self.build_request(request)?;
        debug!("Built Gemini request with {} contents", converted.contents.len());
        Ok(serde_json::to_value(converted)?)
    }

    fn transform_response(
        &self,
        response: Value,
        context: &TransformerContext,
    ) -> Result<Value, TransformerError> {
        if response.get("candidates").map(|c| c.is_array()) != Some(true) {
            return Err(TransformerError::ResponseFormat("missing 'candidates' array".to_string()));
        }

        let response: GeminiResponse = serde_json::from_value(response)
            .map_err(|e| TransformerError::ResponseFormat(e.to_string()))?;

        let candidate = response
            .candidates
            .unwrap_or_default()
            .into_iter()
            .next()
            .ok_or_else(|| {
                TransformerError::ResponseFormat("empty 'candidates' array".to_string())
            })?;

        let mut content = Vec::new();
        for part in candidate.content.map(|c| c.parts).unwrap_or_default() {
            match part {
                GeminiPart::Text { thought: Some(true), .. } => {}
                GeminiPart::Text { text, .. } => {
                    if !text.is_empty() {
                        content.push(ClaudeContentBlock::Text { text });
                    }
                }
                GeminiPart::FunctionCall { function_call } => {
                    content.push(ClaudeContentBlock::ToolUse {
                        id: generate_tool_use_id(),
                        name: function_call.name,
                        input: function_call.args,
                    });
                }
                _ => debug!("Ignoring unsupported Gemini response part"),
            }
        }

        let has_function_calls = content
            .iter()
            .any(|b| matches!(b, ClaudeContentBlock::ToolUse { .. }));
        let stop_reason = candidate
            .finish_reason
            .as_deref()
            .map(|reason| map_gemini_finish_reason(reason, has_function_calls));

        let converted = ClaudeResponse {
            id: generate_message_id(),
            response_type: "message".to_string(),
            role: "assistant".to_string(),
            content,
            model: context.model.clone(),
            stop_reason,
            stop_sequence: None,
            usage: Self::usage(response.usage_metadata.as_ref()),
        };
        Ok(serde_json::to_value(converted)?)
    }

    fn transform_stream_chunk(&self, chunk: &str, _context: &TransformerContext) -> String {
        let data = match sse_data(chunk) {
            Some(data) => data,
            None => return String::new(),
        };

        let value: Value = match serde_json::from_str(data) {
            Ok(value) => value,
            Err(_) => return String::new(),
        };

        if let Some(error) = value.get("error") {
            let event = ClaudeStreamEvent::Error {
                error: ClaudeError {
                    error_type: error
                        .get("status")
                        .and_then(|s| s.as_str())
                        .unwrap_or("api_error")
                        .to_string(),
                    message: error
                        .get("message")
                        .and_then(|m| m.as_str())
                        .unwrap_or("upstream error")
                        .to_string(),
                },
            };
            return sse_frames(&[event]);
        }

        let response: GeminiResponse = match serde_json::from_value(value) {
            Ok(response) => response,
            Err(_) => return String::new(),
        };

        let candidate = match response.candidates.and_then(|c| c.into_iter().next()) {
            Some(candidate) => candidate,
            None => return String::new(),
        };

        let mut events = Vec::new();
        let mut has_function_calls = false;

        let parts = candidate.content.map(|c| c.parts).unwrap_or_default();
        for (position, part) in parts.into_iter().enumerate() {
            match part {
                GeminiPart::Text { thought: Some(true), .. } => {}
                GeminiPart::Text { text, .. } => {
                    if !text.is_empty() {
                        events.push(ClaudeStreamEvent::ContentBlockDelta {
                            index: 0,
                            delta: ClaudeContentDelta::TextDelta { text },
                        });
                    }
                }
                GeminiPart::FunctionCall { function_call } => {
                    has_function_calls = true;
                    // Chunk-local; the executor's StreamFramer assigns stream-wide indexes
                    let index = position as u32 + 1;
                    events.push(ClaudeStreamEvent::ContentBlockStart {
                        index,
                        content_block: ClaudeContentBlock::ToolUse {
                            id: generate_tool_use_id(),
                            name: function_call.name,
                            input: json!({}),
                        },
                    });
                    events.push(ClaudeStreamEvent::ContentBlockDelta {
                        index,
                        delta: ClaudeContentDelta::InputJsonDelta {
                            partial_json: function_call.args.to_string(),
                        },
                    });
                    events.push(ClaudeStreamEvent::ContentBlockStop { index });
                }
                _ => {}
            }
        }

        if let Some(finish_reason) = candidate.finish_reason {
            events.push(ClaudeStreamEvent::ContentBlockStop { index: 0 });
            events.push(ClaudeStreamEvent::MessageDelta {
                delta: ClaudeMessageDelta {
                    stop_reason: Some(map_gemini_finish_reason(&finish_reason, has_function_calls)),
                    stop_sequence: None,
                },
                usage: Self::usage(response.usage_metadata.as_ref()),
            });
        }

        sse_frames(&events)
    }

    fn endpoint(
        &self,
        base_url: &str,
        context: &TransformerContext,
        stream: bool,
    ) -> Option<String> {
        let base = base_url.trim_end_matches('/');
        Some(if stream {
            format!("{}/{}:streamGenerateContent?alt=sse", base, context.model)
        } else {
            format!("{}/{}:generateContent", base, context.model)
        })
    }

    fn upstream_auth(&self, api_key: &str) -> Option<Vec<(String, String)>> {
        Some(vec![("x-goog-api-key".to_string(), api_key.to_string())])
    }
}
