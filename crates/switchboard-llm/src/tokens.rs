//! Input token estimation for `count_tokens`
//!
//! The backend exposes no counting endpoint, so the count is an estimate
//! from the `o200k_base` encoding over the text the model would see.

use std::sync::OnceLock;

use tiktoken_rs::{CoreBPE, o200k_base};

use crate::protocol::anthropic::{ContentBlock, CountTokensRequest, MessageContent};

fn encoder() -> Option<&'static CoreBPE> {
    static ENCODER: OnceLock<Option<CoreBPE>> = OnceLock::new();
    ENCODER.get_or_init(|| o200k_base().ok()).as_ref()
}

/// Estimate token count using tiktoken, or four bytes per token without it
fn estimate_tokens(text: &str) -> usize {
    encoder().map_or_else(|| text.len().div_ceil(4), |bpe| bpe.encode_with_special_tokens(text).len())
}

/// Estimated prompt size of a request
///
/// Covers the system prompt, every turn, and tool declarations. Images are
/// counted by their encoded size only.
pub fn estimate_input_tokens(request: &CountTokensRequest) -> u32 {
    let mut text = String::new();

    if let Some(system) = &request.system {
        text.push_str(&system.to_text());
        text.push('\n');
    }

    for message in &request.messages {
        match &message.content {
            MessageContent::Text(content) => text.push_str(content),
            MessageContent::Blocks(blocks) => {
                for block in blocks {
                    append_block(block, &mut text);
                }
            }
        }
        text.push('\n');
    }

    for tool in request.tools.iter().flatten() {
        text.push_str(&tool.name);
        if let Some(description) = &tool.description {
            text.push_str(description);
        }
        text.push_str(&tool.input_schema.to_string());
        text.push('\n');
    }

    u32::try_from(estimate_tokens(&text)).unwrap_or(u32::MAX)
}

fn append_block(block: &ContentBlock, text: &mut String) {
    match block {
        ContentBlock::Text { text: content } => text.push_str(content),
        ContentBlock::ToolUse { name, input, .. } => {
            text.push_str(name);
            text.push_str(&input.to_string());
        }
        ContentBlock::ToolResult { content, .. } => match content {
            Some(serde_json::Value::String(content)) => text.push_str(content),
            Some(other) => text.push_str(&other.to_string()),
            None => {}
        },
        ContentBlock::Image { .. } => {}
    }
}
