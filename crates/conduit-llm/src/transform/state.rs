use std::collections::HashMap;

use serde::de::DeserializeOwned;

use crate::error::LlmError;
use crate::types::{BlockDelta, CanonicalResponse, ContentBlock, MessageDeltaBody, StopReason, StreamEvent, Usage};

/// Kind of the content block currently open
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BlockKind {
    Text,
    Thinking,
    ToolUse,
}

#[derive(Debug, Clone, Copy)]
struct OpenBlock {
    index: u32,
    kind: BlockKind,
}

/// Decoder state threaded through every `decode_stream_chunk` call
///
/// Owned by the caller so a stream can be decoded, paused and inspected
/// without a live connection.
#[derive(Debug, Default)]
pub struct StreamState {
    /// Payload prefix waiting for the rest of its JSON
    partial: String,
    started: bool,
    stopped: bool,
    open: Option<OpenBlock>,
    next_index: u32,
    /// Provider tool-call index to content block index
    tool_blocks: HashMap<u32, u32>,
    /// Arguments received so far per tool block
    arguments: HashMap<u32, String>,
    saw_tool_use: bool,
}

impl StreamState {
    /// Fresh state for a new stream
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a payload prefix is still waiting for more data
    pub fn has_partial(&self) -> bool {
        !self.partial.is_empty()
    }

    /// Whether `message_stop` has been produced
    pub const fn is_stopped(&self) -> bool {
        self.stopped
    }

    /// Whether any tool call was decoded
    pub const fn saw_tool_use(&self) -> bool {
        self.saw_tool_use
    }

    /// Parse one data payload, joining it with any buffered prefix
    ///
    /// Returns `None` when the payload ends mid-JSON; the prefix is kept and
    /// retried with the next payload.
    pub(crate) fn parse<T: DeserializeOwned>(&mut self, chunk: &str, provider: &str) -> Result<Option<T>, LlmError> {
        let joined;
        let payload = if self.partial.is_empty() {
            chunk
        } else {
            joined = format!("{}{chunk}", self.partial);
            joined.as_str()
        };

        match serde_json::from_str(payload) {
            Ok(value) => {
                self.partial.clear();
                Ok(Some(value))
            }
            Err(e) if e.is_eof() => {
                self.partial = payload.to_owned();
                Ok(None)
            }
            Err(e) => {
                self.partial.clear();
                Err(LlmError::upstream(provider, format!("malformed stream payload: {e}")))
            }
        }
    }

    /// `message_start` for the first payload, nothing afterwards
    pub(crate) fn start(&mut self, id: String, model: String, usage: Usage) -> Option<StreamEvent> {
        if self.started {
            return None;
        }
        self.started = true;

        let mut message = CanonicalResponse::new(id, model);
        message.usage = usage;
        Some(StreamEvent::MessageStart { message })
    }

    /// Append answer text, opening a text block when needed
    pub(crate) fn text(&mut self, text: &str) -> Vec<StreamEvent> {
        if text.is_empty() {
            return Vec::new();
        }

        let (mut events, index) = self.ensure_block(BlockKind::Text);
        events.push(StreamEvent::text_delta(index, text));
        events
    }

    /// Append reasoning, opening a thinking block when needed
    pub(crate) fn thinking(&mut self, thinking: &str) -> Vec<StreamEvent> {
        if thinking.is_empty() {
            return Vec::new();
        }

        let (mut events, index) = self.ensure_block(BlockKind::Thinking);
        events.push(StreamEvent::ContentBlockDelta {
            index,
            delta: BlockDelta::ThinkingDelta {
                thinking: thinking.to_owned(),
            },
        });
        events
    }

    /// Open a tool-use block for the provider's tool-call `key`
    pub(crate) fn begin_tool(&mut self, key: u32, id: String, name: String) -> Vec<StreamEvent> {
        let mut events = self.close_block();
        let index = self.allocate(BlockKind::ToolUse);

        self.tool_blocks.insert(key, index);
        self.arguments.insert(index, String::new());
        self.saw_tool_use = true;

        events.push(StreamEvent::ContentBlockStart {
            index,
            content_block: ContentBlock::ToolUse {
                id,
                name,
                input: serde_json::json!({}),
            },
        });
        events
    }

    /// Forward an argument fragment of an open tool call
    pub(crate) fn tool_arguments(
        &mut self,
        key: u32,
        fragment: &str,
        provider: &str,
    ) -> Result<Vec<StreamEvent>, LlmError> {
        let Some(&index) = self.tool_blocks.get(&key) else {
            return Err(LlmError::upstream(
                provider,
                format!("arguments for tool call {key} arrived before the call"),
            ));
        };

        if self.open.map(|block| block.index) != Some(index) {
            return Err(LlmError::upstream(
                provider,
                format!("arguments for tool call {key} arrived after it closed"),
            ));
        }

        if fragment.is_empty() {
            return Ok(Vec::new());
        }

        self.arguments.entry(index).or_default().push_str(fragment);

        Ok(vec![StreamEvent::ContentBlockDelta {
            index,
            delta: BlockDelta::InputJsonDelta {
                partial_json: fragment.to_owned(),
            },
        }])
    }

    /// Number of tool calls opened so far
    pub(crate) fn tool_count(&self) -> u32 {
        u32::try_from(self.tool_blocks.len()).unwrap_or(u32::MAX)
    }

    /// Whether the provider's tool-call `key` has been opened
    pub(crate) fn knows_tool(&self, key: u32) -> bool {
        self.tool_blocks.contains_key(&key)
    }

    /// Close the open block, if any
    pub(crate) fn close_block(&mut self) -> Vec<StreamEvent> {
        let Some(block) = self.open.take() else {
            return Vec::new();
        };

        let mut events = Vec::with_capacity(2);

        // Calls without arguments still carry an (empty) input object
        if block.kind == BlockKind::ToolUse && self.arguments.get(&block.index).is_none_or(String::is_empty) {
            events.push(StreamEvent::ContentBlockDelta {
                index: block.index,
                delta: BlockDelta::InputJsonDelta {
                    partial_json: "{}".to_owned(),
                },
            });
        }

        events.push(StreamEvent::ContentBlockStop { index: block.index });
        events
    }

    /// Close the open block and report the stop reason
    pub(crate) fn finish(&mut self, stop_reason: Option<StopReason>, usage: Option<Usage>) -> Vec<StreamEvent> {
        let mut events = self.close_block();
        events.push(StreamEvent::MessageDelta {
            delta: MessageDeltaBody {
                stop_reason,
                stop_sequence: None,
            },
            usage,
        });
        events
    }

    /// Close everything and emit `message_stop` once
    pub(crate) fn stop(&mut self) -> Vec<StreamEvent> {
        if self.stopped {
            return Vec::new();
        }
        self.stopped = true;

        let mut events = self.close_block();
        events.push(StreamEvent::MessageStop);
        events
    }

    fn ensure_block(&mut self, kind: BlockKind) -> (Vec<StreamEvent>, u32) {
        if let Some(block) = self.open
            && block.kind == kind
        {
            return (Vec::new(), block.index);
        }

        let mut events = self.close_block();
        let index = self.allocate(kind);

        let content_block = match kind {
            BlockKind::Thinking => ContentBlock::Thinking {
                thinking: String::new(),
                signature: None,
            },
            BlockKind::Text | BlockKind::ToolUse => ContentBlock::text(""),
        };
        events.push(StreamEvent::ContentBlockStart { index, content_block });

        (events, index)
    }

    fn allocate(&mut self, kind: BlockKind) -> u32 {
        let index = self.next_index;
        self.next_index += 1;
        self.open = Some(OpenBlock { index, kind });
        index
    }
}

/// Usage report without a stop reason
pub(crate) fn usage_event(usage: Usage) -> StreamEvent {
    StreamEvent::MessageDelta {
        delta: MessageDeltaBody::default(),
        usage: Some(usage),
    }
}
