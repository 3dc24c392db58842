//! Prompt token estimation
//!
//! A length-proportional approximation, roughly four characters per token.
//! It only needs to be cheap, deterministic and monotonic; it drives routing
//! and the pre-flight context check, never billing.

use crate::types::{CanonicalRequest, Content, ContentBlock};

const CHARS_PER_TOKEN: usize = 4;
const PER_MESSAGE_OVERHEAD: u32 = 4;
const BASE_OVERHEAD: u32 = 3;

/// Estimate the prompt tokens of a request
pub fn estimate(request: &CanonicalRequest) -> u32 {
    let mut total = BASE_OVERHEAD;

    if let Some(system) = &request.system {
        total = total.saturating_add(content_tokens(system));
    }

    for message in &request.messages {
        total = total
            .saturating_add(PER_MESSAGE_OVERHEAD)
            .saturating_add(content_tokens(&message.content));
    }

    for tool in request.tools.iter().flatten() {
        total = total
            .saturating_add(text_tokens(&tool.name))
            .saturating_add(tool.description.as_deref().map_or(0, text_tokens))
            .saturating_add(text_tokens(&tool.input_schema.to_string()));
    }

    total
}

fn content_tokens(content: &Content) -> u32 {
    match content {
        Content::Text(text) => text_tokens(text),
        Content::Blocks(blocks) => blocks
            .iter()
            .fold(0u32, |acc, block| acc.saturating_add(block_tokens(block))),
    }
}

fn block_tokens(block: &ContentBlock) -> u32 {
    match block {
        ContentBlock::Text { text, .. } => text_tokens(text),
        ContentBlock::ToolUse { name, input, .. } => {
            text_tokens(name).saturating_add(text_tokens(&input.to_string()))
        }
        ContentBlock::ToolResult { content, .. } => content.as_ref().map_or(0, content_tokens),
        ContentBlock::Thinking { thinking, .. } => text_tokens(thinking),
        ContentBlock::Unknown(block) => text_tokens(&block.to_string()),
        ContentBlock::Image { .. } => 0,
    }
}

fn text_tokens(text: &str) -> u32 {
    u32::try_from(text.chars().count().div_ceil(CHARS_PER_TOKEN)).unwrap_or(u32::MAX)
}
