//! Logging utilities
//!
//! Truncated request summaries for debug logs; full prompts are never logged
//! unless `VERBOSE_REQUEST_LOGGING` is switched on.

use crate::models::claude::{ClaudeContent, ClaudeContentBlock, ClaudeMessage, ClaudeRequest};
use serde_json::{json, Value};

/// Set to true to include full request bodies in debug logs
pub const VERBOSE_REQUEST_LOGGING: bool = false;

/// Truncate a string on a char boundary with a note about original length
pub fn truncate_content(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((byte_index, _)) => {
            let total = s.chars().count();
            format!("{}... ({} chars truncated)", &s[..byte_index], total - max_chars)
        }
        None => s.to_string(),
    }
}

fn filter_claude_message(msg: &ClaudeMessage) -> Value {
    let content = match &msg.content {
        ClaudeContent::Text(t) => Value::String(truncate_content(t, 200)),
        ClaudeContent::Blocks(blocks) => {
            let mut previews: Vec<Value> = blocks
                .iter()
                .take(3)
                .map(|b| match b {
                    ClaudeContentBlock::Text { text } => {
                        json!({"type": "text", "text": truncate_content(text, 100)})
                    }
                    ClaudeContentBlock::Image { .. } => {
                        json!({"type": "image", "source": "[truncated]"})
                    }
                    ClaudeContentBlock::ToolUse { id, name, .. } => {
                        json!({"type": "tool_use", "id": id, "name": name, "input": "[truncated]"})
                    }
                    ClaudeContentBlock::ToolResult { tool_use_id, content, .. } => json!({
                        "type": "tool_result",
                        "tool_use_id": tool_use_id,
                        "content": truncate_content(&content.to_text(), 50)
                    }),
                    ClaudeContentBlock::Unknown => json!({"type": "unknown"}),
                })
                .collect();

            if blocks.len() > 3 {
                previews.push(json!(format!("...and {} more blocks", blocks.len() - 3)));
            }
            Value::Array(previews)
        }
    };

    json!({
        "role": msg.role,
        "content": content,
    })
}

/// Summary of a client request for logging
pub fn create_claude_request_log_summary(request: &ClaudeRequest) -> Value {
    if VERBOSE_REQUEST_LOGGING {
        return serde_json::to_value(request).unwrap_or(json!({"error": "serialize failed"}));
    }

    let tools = match &request.tools {
        Some(t) if !t.is_empty() => {
            json!(t.iter().map(|tool| tool.name.as_str()).collect::<Vec<_>>())
        }
        _ => Value::Null,
    };

    let system = request
        .system
        .as_ref()
        .map(|s| Value::String(truncate_content(&s.extract_text(), 100)))
        .unwrap_or(Value::Null);

    json!({
        "model": request.model,
        "max_tokens": request.max_tokens,
        "stream": request.stream,
        "thinking": request.thinking_enabled(),
        "system": system,
        "messages": request.messages.iter().map(filter_claude_message).collect::<Vec<_>>(),
        "tools": tools,
    })
}

/// Shape-only summary of a provider payload (any wire format)
pub fn create_upstream_request_log_summary(body: &Value) -> Value {
    if VERBOSE_REQUEST_LOGGING {
        return body.clone();
    }

    let count = |key: &str| body.get(key).and_then(|v| v.as_array()).map(|a| a.len());

    json!({
        "keys": body.as_object().map(|o| o.keys().cloned().collect::<Vec<_>>()).unwrap_or_default(),
        "model": body.get("model"),
        "messages": count("messages"),
        "contents": count("contents"),
        "tools": count("tools"),
        "max_tokens": body.get("max_tokens"),
        "stream": body.get("stream"),
    })
}
