use serde::{Deserialize, Serialize};

use super::message::ContentBlock;

/// Reason the model stopped generating
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// Natural end of generation
    EndTurn,
    /// Hit the `max_tokens` limit
    MaxTokens,
    /// Matched a stop sequence
    StopSequence,
    /// Model decided to call a tool
    ToolUse,
    /// Long-running turn paused by the provider
    PauseTurn,
    /// Model declined to answer
    Refusal,
}

/// Token usage statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    /// Tokens consumed by the prompt
    #[serde(default)]
    pub input_tokens: u32,
    /// Tokens generated in the completion
    #[serde(default)]
    pub output_tokens: u32,
}

impl Usage {
    /// Overlay non-zero counts from a later report
    pub fn merge(&mut self, other: Self) {
        if other.input_tokens > 0 {
            self.input_tokens = other.input_tokens;
        }
        if other.output_tokens > 0 {
            self.output_tokens = other.output_tokens;
        }
    }
}

/// Complete assistant message returned to clients
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalResponse {
    /// Unique response identifier
    pub id: String,
    /// Always `message`
    #[serde(rename = "type", default = "message_type")]
    pub kind: String,
    /// Always `assistant`
    #[serde(default = "assistant_role")]
    pub role: String,
    /// Model that produced the response
    pub model: String,
    /// Generated content blocks
    #[serde(default)]
    pub content: Vec<ContentBlock>,
    /// Why generation stopped
    #[serde(default)]
    pub stop_reason: Option<StopReason>,
    /// Stop sequence that matched, if any
    #[serde(default)]
    pub stop_sequence: Option<String>,
    /// Token usage
    #[serde(default)]
    pub usage: Usage,
}

fn message_type() -> String {
    "message".to_owned()
}

fn assistant_role() -> String {
    "assistant".to_owned()
}

impl CanonicalResponse {
    /// Create an empty assistant message
    pub fn new(id: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: message_type(),
            role: assistant_role(),
            model: model.into(),
            content: Vec::new(),
            stop_reason: None,
            stop_sequence: None,
            usage: Usage::default(),
        }
    }
}
