use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Role of a message participant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// User turn, including tool results
    User,
    /// Model turn, including tool calls
    Assistant,
}

/// Message in a conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Role of the message author
    pub role: Role,
    /// Message content
    pub content: Content,
}

impl Message {
    /// Build a plain-text message
    pub fn text(role: Role, text: impl Into<String>) -> Self {
        Self {
            role,
            content: Content::Text(text.into()),
        }
    }
}

/// Message content, either plain text or typed blocks
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Content {
    /// Plain text content
    Text(String),
    /// Ordered content blocks
    Blocks(Vec<ContentBlock>),
}

impl Content {
    /// Concatenated text of all text blocks
    pub fn as_text(&self) -> String {
        match self {
            Self::Text(text) => text.clone(),
            Self::Blocks(blocks) => blocks
                .iter()
                .filter_map(|block| match block {
                    ContentBlock::Text { text, .. } => Some(text.as_str()),
                    _ => None,
                })
                .collect::<Vec<_>>()
                .join(""),
        }
    }

    /// Content as a block list, wrapping plain text in a single text block
    pub fn to_blocks(&self) -> Vec<ContentBlock> {
        match self {
            Self::Text(text) => vec![ContentBlock::text(text.clone())],
            Self::Blocks(blocks) => blocks.clone(),
        }
    }
}

/// Typed content block
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    /// Text content block
    Text {
        /// The text string
        text: String,
        /// Prompt caching hint, forwarded verbatim
        #[serde(default, skip_serializing_if = "Option::is_none")]
        cache_control: Option<Value>,
    },
    /// Image content block
    Image {
        /// Image payload
        source: ImageSource,
    },
    /// Tool invocation requested by the model
    ToolUse {
        /// Call identifier referenced by the matching result
        id: String,
        /// Tool name
        name: String,
        /// Arguments object
        input: Value,
    },
    /// Result of a tool invocation
    ToolResult {
        /// Identifier of the `tool_use` this answers
        tool_use_id: String,
        /// Tool output
        #[serde(default, skip_serializing_if = "Option::is_none")]
        content: Option<Content>,
        /// Whether the tool failed
        #[serde(default, skip_serializing_if = "Option::is_none")]
        is_error: Option<bool>,
    },
    /// Model reasoning
    Thinking {
        /// Reasoning text
        thinking: String,
        /// Integrity signature, when the provider issues one
        #[serde(default, skip_serializing_if = "Option::is_none")]
        signature: Option<String>,
    },
    /// Block type this gateway does not model, kept as sent
    #[serde(untagged)]
    Unknown(Value),
}

impl ContentBlock {
    /// Build a text block without cache hints
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text {
            text: text.into(),
            cache_control: None,
        }
    }

    /// Whether the block carries streamed JSON input
    ///
    /// Covers client tool calls and provider-run calls such as
    /// `server_tool_use`.
    pub fn takes_input(&self) -> bool {
        match self {
            Self::ToolUse { .. } => true,
            Self::Unknown(block) => block
                .get("type")
                .and_then(Value::as_str)
                .is_some_and(|kind| kind.ends_with("tool_use")),
            _ => false,
        }
    }
}

/// Image payload of an image block
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageSource {
    /// `base64` or `url`
    #[serde(rename = "type")]
    pub kind: String,
    /// MIME type for base64 data
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,
    /// Base64-encoded bytes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
    /// Remote image location
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl ImageSource {
    /// Image as a URL, using a data URI for inline bytes
    pub fn to_url(&self) -> Option<String> {
        match (&self.url, &self.media_type, &self.data) {
            (Some(url), _, _) => Some(url.clone()),
            (None, Some(media_type), Some(data)) => Some(format!("data:{media_type};base64,{data}")),
            _ => None,
        }
    }
}
