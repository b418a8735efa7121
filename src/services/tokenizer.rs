//! Token counting
//!
//! Input-token estimate used by routing and `/v1/messages/count_tokens`.

use crate::models::claude::{ClaudeContentBlock, ClaudeMessage, ClaudeTool, SystemPrompt};
use once_cell::sync::OnceCell;
use thiserror::Error;
use tiktoken_rs::{cl100k_base, CoreBPE};

/// Token counting errors
#[derive(Debug, Error)]
pub enum TokenCountError {
    #[error("Tokenizer unavailable: {0}")]
    Unavailable(String),
}

/// Counts the input tokens of a request
pub trait TokenCounter: Send + Sync {
    fn count_tokens(
        &self,
        messages: &[ClaudeMessage],
        system: Option<&SystemPrompt>,
        tools: Option<&[ClaudeTool]>,
    ) -> Result<u64, TokenCountError>;
}

static CL100K: OnceCell<CoreBPE> = OnceCell::new();

/// `cl100k_base` counter over message text, tool traffic, system and tool definitions
#[derive(Debug, Default, Clone, Copy)]
pub struct TiktokenCounter;

impl TiktokenCounter {
    pub fn new() -> Self {
        Self
    }

    fn bpe(&self) -> Result<&'static CoreBPE, TokenCountError> {
        CL100K.get_or_try_init(|| {
            cl100k_base().map_err(|e| TokenCountError::Unavailable(e.to_string()))
        })
    }
}

impl TokenCounter for TiktokenCounter {
    fn count_tokens(
        &self,
        messages: &[ClaudeMessage],
        system: Option<&SystemPrompt>,
        tools: Option<&[ClaudeTool]>,
    ) -> Result<u64, TokenCountError> {
        let bpe = self.bpe()?;
        let count = |text: &str| bpe.encode_ordinary(text).len() as u64;

        let mut total = 0;

        for message in messages {
            for block in message.content.blocks() {
                total += match block {
                    ClaudeContentBlock::Text { text } => count(&text),
                    ClaudeContentBlock::ToolUse { name, input, .. } => {
                        count(&name) + count(&input.to_string())
                    }
                    ClaudeContentBlock::ToolResult { content, .. } => count(&content.to_text()),
                    ClaudeContentBlock::Image { .. } | ClaudeContentBlock::Unknown => 0,
                };
            }
        }

        if let Some(system) = system {
            total += count(&system.extract_text());
        }

        for tool in tools.unwrap_or_default() {
            total += count(&tool.name);
            if let Some(description) = &tool.description {
                total += count(description);
            }
            if let Some(schema) = &tool.input_schema {
                total += count(&schema.to_string());
            }
        }

        Ok(total)
    }
}
