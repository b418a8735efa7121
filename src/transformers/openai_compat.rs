//! OpenAI-compatible conversion core
//!
//! Shared by the `openai` and `deepseek` transformers; vendor differences are
//! expressed as [`OpenAICompatQuirks`].

use super::{
    generate_message_id, generate_tool_use_id, map_openai_finish_reason, message_start_event,
    safe_parse_tool_arguments, sse_data, sse_frames, TransformerContext, TransformerError,
};
use crate::models::claude::{
    ClaudeContent, ClaudeContentBlock, ClaudeContentDelta, ClaudeMessage, ClaudeMessageDelta,
    ClaudeRequest, ClaudeResponse, ClaudeStreamEvent, ClaudeUsage, ImageSource, ToolChoice,
};
use crate::models::openai::{
    OpenAIContent, OpenAIContentPart, OpenAIFunction, OpenAIFunctionCall, OpenAIImageUrl,
    OpenAIMessage, OpenAIRequest, OpenAIResponse, OpenAIStreamOptions, OpenAIStreamResponse,
    OpenAITool, OpenAIToolCall,
};
use serde_json::{json, Value};
use tracing::{debug, warn};

/// Vendor differences between OpenAI-compatible APIs
#[derive(Debug, Clone, Copy)]
pub struct OpenAICompatQuirks {
    /// Image blocks are sent as `image_url` parts; otherwise degraded to text
    pub supports_vision: bool,
    /// Message content must be a plain string
    pub string_content: bool,
    /// Upper bound applied to `max_tokens`
    pub max_tokens_cap: Option<u32>,
}

impl OpenAICompatQuirks {
    pub const OPENAI: Self = Self {
        supports_vision: true,
        string_content: false,
        max_tokens_cap: None,
    };
}

/// Convert a client request into an OpenAI chat-completions request
pub fn build_request(
    request: ClaudeRequest,
    quirks: OpenAICompatQuirks,
) -> Result<OpenAIRequest, TransformerError> {
    if request.messages.is_empty() {
        return Err(TransformerError::InvalidRequest("messages must not be empty".to_string()));
    }

    let mut messages = Vec::with_capacity(request.messages.len() + 1);

    if let Some(system) = &request.system {
        let text = system.extract_text();
        if !text.is_empty() {
            messages.push(OpenAIMessage {
                role: "system".to_string(),
                content: Some(OpenAIContent::Text(text)),
                ..Default::default()
            });
        }
    }

    for message in request.messages {
        messages.extend(convert_message(message, quirks));
    }

    let streaming = request.stream.unwrap_or(false);
    let has_tools = request.tools.as_ref().map(|t| !t.is_empty()).unwrap_or(false);

    let tools = if has_tools {
        request.tools.map(|tools| {
            tools
                .into_iter()
                .map(|tool| OpenAITool {
                    tool_type: "function".to_string(),
                    function: OpenAIFunction {
                        name: tool.name,
                        description: tool.description,
                        parameters: tool.input_schema,
                    },
                })
                .collect()
        })
    } else {
        None
    };

    let tool_choice = if has_tools {
        request.tool_choice.map(|choice| match choice {
            ToolChoice::Auto => json!("auto"),
            ToolChoice::Any => json!("required"),
            ToolChoice::Tool { name } => json!({"type": "function", "function": {"name": name}}),
        })
    } else {
        None
    };

    let max_tokens = match (request.max_tokens, quirks.max_tokens_cap) {
        (Some(requested), Some(cap)) => Some(requested.min(cap)),
        (requested, _) => requested,
    };

    debug!("Built OpenAI-compatible request: {} messages, tools={}", messages.len(), has_tools);

    Ok(OpenAIRequest {
        model: request.model,
        messages,
        max_tokens,
        temperature: request.temperature,
        top_p: request.top_p,
        stop: request.stop_sequences,
        stream: if streaming { Some(true) } else { None },
        stream_options: if streaming {
            Some(OpenAIStreamOptions { include_usage: true })
        } else {
            None
        },
        user: None,
        tools,
        tool_choice,
    })
}

/// Convert one client message; tool results become separate `tool` messages
/// placed before whatever else the message carries
fn convert_message(message: ClaudeMessage, quirks: OpenAICompatQuirks) -> Vec<OpenAIMessage> {
    let blocks = match message.content {
        ClaudeContent::Text(text) => {
            return vec![OpenAIMessage {
                role: message.role,
                content: Some(OpenAIContent::Text(text)),
                ..Default::default()
            }];
        }
        ClaudeContent::Blocks(blocks) => blocks,
    };

    let mut converted = Vec::new();
    let mut parts = Vec::new();
    let mut tool_calls = Vec::new();

    for block in blocks {
        match block {
            ClaudeContentBlock::Text { text } => parts.push(OpenAIContentPart::Text { text }),
            ClaudeContentBlock::Image { source } => parts.push(convert_image(source, quirks)),
            ClaudeContentBlock::ToolUse { id, name, input } => {
                tool_calls.push(OpenAIToolCall {
                    index: None,
                    id: Some(id),
                    tool_type: Some("function".to_string()),
                    function: OpenAIFunctionCall {
                        name: Some(name),
                        arguments: Some(input.to_string()),
                    },
                });
            }
            ClaudeContentBlock::ToolResult { tool_use_id, content, .. } => {
                converted.push(OpenAIMessage {
                    role: "tool".to_string(),
                    content: Some(OpenAIContent::Text(content.to_text())),
                    tool_call_id: Some(tool_use_id),
                    ..Default::default()
                });
            }
            ClaudeContentBlock::Unknown => {
                warn!("Skipping unknown content block type in message conversion");
            }
        }
    }

    if parts.is_empty() && tool_calls.is_empty() {
        return converted;
    }

    let content = if parts.is_empty() {
        None
    } else if quirks.string_content {
        Some(OpenAIContent::Text(flatten_parts(&parts)))
    } else if parts.len() == 1 && matches!(parts[0], OpenAIContentPart::Text { .. }) {
        Some(OpenAIContent::Text(flatten_parts(&parts)))
    } else {
        Some(OpenAIContent::Array(parts))
    };

    converted.push(OpenAIMessage {
        role: message.role,
        content,
        tool_calls: if tool_calls.is_empty() { None } else { Some(tool_calls) },
        tool_call_id: None,
    });

    converted
}

fn convert_image(source: ImageSource, quirks: OpenAICompatQuirks) -> OpenAIContentPart {
    match source {
        ImageSource::Base64 { media_type, data } if quirks.supports_vision => {
            OpenAIContentPart::ImageUrl {
                image_url: OpenAIImageUrl {
                    url: format!("data:{};base64,{}", media_type, data),
                    detail: None,
                },
            }
        }
        ImageSource::Base64 { media_type, .. } => OpenAIContentPart::Text {
            text: format!("[Image: {}]", media_type),
        },
        ImageSource::Url { url } if quirks.supports_vision => OpenAIContentPart::ImageUrl {
            image_url: OpenAIImageUrl { url, detail: None },
        },
        ImageSource::Url { url } => OpenAIContentPart::Text {
            text: format!("[Image URL: {}]", url),
        },
    }
}

fn flatten_parts(parts: &[OpenAIContentPart]) -> String {
    parts
        .iter()
        .filter_map(|part| match part {
            OpenAIContentPart::Text { text } => Some(text.as_str()),
            OpenAIContentPart::ImageUrl { .. } => None,
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Convert a buffered chat-completions response into a client response
pub fn parse_response(
    response: Value,
    context: &TransformerContext,
) -> Result<ClaudeResponse, TransformerError> {
    if response.get("choices").map(|c| c.is_array()) != Some(true) {
        return Err(TransformerError::ResponseFormat("missing 'choices' array".to_string()));
    }

    let response: OpenAIResponse = serde_json::from_value(response)
        .map_err(|e| TransformerError::ResponseFormat(e.to_string()))?;

    let choice = response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| TransformerError::ResponseFormat("empty 'choices' array".to_string()))?;

    let mut content = Vec::new();

    if let Some(text) = choice.message.content.as_ref().map(|c| c.extract_text()) {
        if !text.is_empty() {
            content.push(ClaudeContentBlock::Text { text });
        }
    }

    for tool_call in choice.message.tool_calls.unwrap_or_default() {
        let id = tool_call
            .id
            .filter(|id| !id.is_empty())
            .unwrap_or_else(generate_tool_use_id);
        let arguments = tool_call.function.arguments.unwrap_or_default();
        content.push(ClaudeContentBlock::ToolUse {
            id,
            name: tool_call.function.name.unwrap_or_default(),
            input: safe_parse_tool_arguments(&arguments),
        });
    }

    let usage = response.usage.unwrap_or_default();

    Ok(ClaudeResponse {
        id: generate_message_id(),
        response_type: "message".to_string(),
        role: "assistant".to_string(),
        content,
        model: context.model.clone(),
        stop_reason: choice.finish_reason.as_deref().map(map_openai_finish_reason),
        stop_sequence: None,
        usage: ClaudeUsage {
            input_tokens: usage.prompt_tokens,
            output_tokens: usage.completion_tokens,
        },
    })
}

/// Convert one upstream SSE line into client SSE frames
pub fn convert_stream_line(line: &str, context: &TransformerContext) -> String {
    let data = match sse_data(line) {
        Some(data) => data,
        None => return String::new(),
    };

    if data == "[DONE]" {
        return sse_frames(&[ClaudeStreamEvent::MessageStop]);
    }

    let chunk: OpenAIStreamResponse = match serde_json::from_str(data) {
        Ok(chunk) => chunk,
        Err(_) => return String::new(),
    };

    let mut events = Vec::new();
    let usage = chunk.usage.map(|u| ClaudeUsage {
        input_tokens: u.prompt_tokens,
        output_tokens: u.completion_tokens,
    });

    if let Some(choice) = chunk.choices.into_iter().next() {
        let delta = choice.delta;

        if delta.role.is_some() {
            events.push(message_start_event(&context.model, 0));
            events.push(ClaudeStreamEvent::ContentBlockStart {
                index: 0,
                content_block: ClaudeContentBlock::Text { text: String::new() },
            });
        }

        if let Some(text) = delta.content.filter(|t| !t.is_empty()) {
            events.push(ClaudeStreamEvent::ContentBlockDelta {
                index: 0,
                delta: ClaudeContentDelta::TextDelta { text },
            });
        }

        for (position, tool_call) in delta.tool_calls.unwrap_or_default().into_iter().enumerate() {
            // Block 0 is the text block
            // Chunk-local; the executor's StreamFramer assigns stream-wide indexes
            let index = tool_call.index.unwrap_or(position as u32) + 1;

            if let Some(name) = tool_call.function.name {
                let id = tool_call
                    .id
                    .filter(|id| !id.is_empty())
                    .unwrap_or_else(generate_tool_use_id);
                events.push(ClaudeStreamEvent::ContentBlockStart {
                    index,
                    content_block: ClaudeContentBlock::ToolUse { id, name, input: json!({}) },
                });
            }

            if let Some(partial_json) = tool_call.function.arguments.filter(|a| !a.is_empty()) {
                events.push(ClaudeStreamEvent::ContentBlockDelta {
                    index,
                    delta: ClaudeContentDelta::InputJsonDelta { partial_json },
                });
            }
        }

        if let Some(finish_reason) = choice.finish_reason {
            events.push(ClaudeStreamEvent::ContentBlockStop { index: 0 });
            events.push(ClaudeStreamEvent::MessageDelta {
                delta: ClaudeMessageDelta {
                    stop_reason: Some(map_openai_finish_reason(&finish_reason)),
                    stop_sequence: None,
                },
                usage: usage.unwrap_or_default(),
            });
        }
    } else if let Some(usage) = usage {
        // Usage-only chunk sent after the finish chunk when include_usage is set
        events.push(ClaudeStreamEvent::MessageDelta {
            delta: ClaudeMessageDelta { stop_reason: None, stop_sequence: None },
            usage,
        });
    }

    sse_frames(&events)
}
