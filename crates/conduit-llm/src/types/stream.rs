use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::message::ContentBlock;
use super::response::{CanonicalResponse, StopReason, Usage};

/// Server-sent event of a canonical streaming response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    /// Opens the message, carrying its metadata
    MessageStart {
        /// Message with empty content
        message: CanonicalResponse,
    },
    /// Opens a content block
    ContentBlockStart {
        /// Block position within the message
        index: u32,
        /// Block skeleton (empty text, or tool use with empty input)
        content_block: ContentBlock,
    },
    /// Incremental block content
    ContentBlockDelta {
        /// Block position within the message
        index: u32,
        /// Increment
        delta: BlockDelta,
    },
    /// Closes a content block
    ContentBlockStop {
        /// Block position within the message
        index: u32,
    },
    /// Final message-level fields
    MessageDelta {
        /// Stop reason and sequence
        delta: MessageDeltaBody,
        /// Usage reported at end of stream
        #[serde(default, skip_serializing_if = "Option::is_none")]
        usage: Option<Usage>,
    },
    /// Ends the message
    MessageStop,
    /// Keep-alive
    Ping,
    /// Terminal failure
    Error {
        /// Error details
        error: ErrorBody,
    },
    /// Event type this gateway does not model, kept as sent
    #[serde(untagged)]
    Other(Value),
}

impl StreamEvent {
    /// SSE event name for this event
    pub fn event_type(&self) -> &str {
        match self {
            Self::MessageStart { .. } => "message_start",
            Self::ContentBlockStart { .. } => "content_block_start",
            Self::ContentBlockDelta { .. } => "content_block_delta",
            Self::ContentBlockStop { .. } => "content_block_stop",
            Self::MessageDelta { .. } => "message_delta",
            Self::MessageStop => "message_stop",
            Self::Ping => "ping",
            Self::Error { .. } => "error",
            Self::Other(event) => event.get("type").and_then(Value::as_str).unwrap_or("unknown"),
        }
    }

    /// Build a text delta
    pub fn text_delta(index: u32, text: impl Into<String>) -> Self {
        Self::ContentBlockDelta {
            index,
            delta: BlockDelta::TextDelta { text: text.into() },
        }
    }
}

/// Increment within a content block
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BlockDelta {
    /// Text fragment
    TextDelta {
        /// Appended text
        text: String,
    },
    /// Tool input JSON fragment
    InputJsonDelta {
        /// Appended JSON text
        partial_json: String,
    },
    /// Reasoning fragment
    ThinkingDelta {
        /// Appended reasoning
        thinking: String,
    },
    /// Reasoning signature
    SignatureDelta {
        /// Signature
        signature: String,
    },
    /// Delta type this gateway does not model, such as `citations_delta`
    #[serde(untagged)]
    Other(Value),
}

/// Message-level fields delivered at the end of a stream
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageDeltaBody {
    /// Why generation stopped
    #[serde(default)]
    pub stop_reason: Option<StopReason>,
    /// Stop sequence that matched, if any
    #[serde(default)]
    pub stop_sequence: Option<String>,
}

/// Error details of an in-stream error event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Canonical error type
    #[serde(rename = "type")]
    pub kind: String,
    /// Human-readable message
    pub message: String,
}
