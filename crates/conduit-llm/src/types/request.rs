use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::message::{Content, ContentBlock, Message};
use super::tool::{Tool, ToolChoice};
use crate::error::LlmError;

/// Client-protocol-shaped completion request
///
/// Fields this gateway does not model are captured in `extra` and forwarded
/// untouched to providers that understand them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalRequest {
    /// Requested model or `provider,model` pair
    pub model: String,
    /// Conversation messages, in order
    pub messages: Vec<Message>,
    /// System prompt
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system: Option<Content>,
    /// Maximum tokens to generate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    /// Sampling temperature
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    /// Nucleus sampling threshold
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
    /// Top-k sampling
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_k: Option<u32>,
    /// Stop sequences
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_sequences: Option<Vec<String>>,
    /// Whether to stream the response
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub stream: bool,
    /// Tool definitions available to the model
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<Tool>>,
    /// How the model should select tools
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<ToolChoice>,
    /// Extended thinking configuration, opaque
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thinking: Option<Value>,
    /// Request metadata, opaque
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
    /// Provider-specific top-level fields
    #[serde(flatten)]
    pub extra: Map<String, Value>,
    /// Body exactly as the client sent it
    #[serde(skip)]
    pub source: Option<Map<String, Value>>,
}

impl CanonicalRequest {
    /// Parse and validate a raw request body
    ///
    /// The parsed body is kept in `source` for providers that take the
    /// client format verbatim.
    pub fn from_slice(body: &[u8]) -> Result<Self, LlmError> {
        let malformed = |e: serde_json::Error| LlmError::InvalidRequest(format!("malformed request body: {e}"));

        let source: Map<String, Value> = serde_json::from_slice(body).map_err(malformed)?;
        let mut request: Self = serde_json::from_value(Value::Object(source.clone())).map_err(malformed)?;
        request.source = Some(source);

        request.validate()?;
        Ok(request)
    }

    /// Check structural invariants serde cannot express
    pub fn validate(&self) -> Result<(), LlmError> {
        if self.model.trim().is_empty() {
            return Err(LlmError::InvalidRequest("model must not be empty".to_owned()));
        }

        if self.messages.is_empty() {
            return Err(LlmError::InvalidRequest("messages must not be empty".to_owned()));
        }

        if self.max_tokens == Some(0) {
            return Err(LlmError::InvalidRequest("max_tokens must be greater than zero".to_owned()));
        }

        let mut seen = HashSet::new();

        for (index, message) in self.messages.iter().enumerate() {
            let Content::Blocks(blocks) = &message.content else {
                continue;
            };

            for block in blocks {
                match block {
                    ContentBlock::ToolUse { id, .. } => {
                        seen.insert(id.as_str());
                    }
                    ContentBlock::ToolResult { tool_use_id, .. } if !seen.contains(tool_use_id.as_str()) => {
                        return Err(LlmError::InvalidRequest(format!(
                            "messages.{index}: tool_result references unknown tool_use_id '{tool_use_id}'"
                        )));
                    }
                    _ => {}
                }
            }
        }

        Ok(())
    }

    /// Whether the request offers tools to the model
    pub fn has_tools(&self) -> bool {
        self.tools.as_ref().is_some_and(|tools| !tools.is_empty())
    }

    /// Whether extended thinking is switched on
    pub fn thinking_enabled(&self) -> bool {
        self.thinking
            .as_ref()
            .is_some_and(|thinking| thinking.get("type").and_then(Value::as_str) != Some("disabled"))
    }

    /// System prompt flattened to text
    pub fn system_text(&self) -> Option<String> {
        self.system
            .as_ref()
            .map(Content::as_text)
            .filter(|text| !text.is_empty())
    }
}
