//! Streaming relay
//!
//! [`StreamRelay`] sits between a provider decoder and the client. It enforces
//! the canonical event order, holds tool arguments back until they form a
//! complete JSON document, and guarantees that every stream ends with exactly
//! one terminal sequence: `message_delta` + `message_stop`, or `error`.

use std::collections::{BTreeSet, VecDeque};
use std::pin::Pin;
use std::sync::Arc;

use conduit_core::HttpError;
use futures_util::{Stream, StreamExt, stream};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::error::LlmError;
use crate::events::{self, TransformStage};
use crate::transform::{StreamState, Transformer, generated_message_id};
use crate::types::{
    BlockDelta, CanonicalResponse, ContentBlock, ErrorBody, MessageDeltaBody, StopReason, StreamEvent, Usage,
};

/// SSE data payloads read from a provider
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<String, LlmError>> + Send>>;

/// Canonical events delivered to the client
pub type EventStream = Pin<Box<dyn Stream<Item = StreamEvent> + Send>>;

/// Lifecycle of a relayed stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayState {
    /// Nothing emitted yet
    Started,
    /// `message_start` sent, forwarding content
    Emitting,
    /// Buffering tool arguments until they parse
    ToolAccumulating,
    /// Emitting the terminal sequence
    Closing,
    /// Terminal, nothing more is emitted
    Closed,
}

#[derive(Debug)]
struct ToolBuffer {
    index: u32,
    json: String,
    flushed: bool,
}

impl ToolBuffer {
    fn is_complete(&self) -> bool {
        serde_json::from_str::<serde_json::Value>(&self.json).is_ok()
    }
}

/// State machine re-emitting decoded provider events in canonical order
#[derive(Debug)]
pub struct StreamRelay {
    provider: String,
    model: String,
    input_tokens: u32,
    state: watch::Sender<RelayState>,
    pending_start: Option<CanonicalResponse>,
    open_blocks: BTreeSet<u32>,
    tool: Option<ToolBuffer>,
    delta: MessageDeltaBody,
    usage: Usage,
    saw_tool: bool,
}

impl StreamRelay {
    /// Create a relay for a routed stream
    ///
    /// `model` and `input_tokens` fill in the `message_start` when the provider
    /// does not report them.
    pub fn new(provider: impl Into<String>, model: impl Into<String>, input_tokens: u32) -> Self {
        Self {
            provider: provider.into(),
            model: model.into(),
            input_tokens,
            state: watch::Sender::new(RelayState::Started),
            pending_start: None,
            open_blocks: BTreeSet::new(),
            tool: None,
            delta: MessageDeltaBody::default(),
            usage: Usage::default(),
            saw_tool: false,
        }
    }

    /// Current state
    pub fn state(&self) -> RelayState {
        *self.state.borrow()
    }

    /// Watch state transitions
    pub fn observe(&self) -> watch::Receiver<RelayState> {
        self.state.subscribe()
    }

    /// Provider the stream comes from
    pub fn provider(&self) -> &str {
        &self.provider
    }

    /// Feed one decoded event
    pub fn push(&mut self, event: StreamEvent) -> Vec<StreamEvent> {
        if matches!(self.state(), RelayState::Closing | RelayState::Closed) {
            return Vec::new();
        }

        match event {
            StreamEvent::MessageStart { message } => {
                if self.state() == RelayState::Started {
                    self.pending_start = Some(message);
                }
                Vec::new()
            }
            StreamEvent::Ping => {
                if self.state() == RelayState::Started {
                    Vec::new()
                } else {
                    vec![StreamEvent::Ping]
                }
            }
            StreamEvent::ContentBlockStart { index, content_block } => self.open_block(index, content_block),
            StreamEvent::ContentBlockDelta { index, delta } => self.block_delta(index, delta),
            StreamEvent::ContentBlockStop { index } => self.stop_block(index),
            StreamEvent::MessageDelta { delta, usage } => {
                if delta.stop_reason.is_some() {
                    self.delta.stop_reason = delta.stop_reason;
                }
                if delta.stop_sequence.is_some() {
                    self.delta.stop_sequence = delta.stop_sequence;
                }
                if let Some(usage) = usage {
                    self.usage.merge(usage);
                }
                Vec::new()
            }
            StreamEvent::MessageStop => self.close(),
            StreamEvent::Error { error } => {
                self.transition(RelayState::Closed);
                vec![StreamEvent::Error { error }]
            }
            StreamEvent::Other(event) => {
                let mut events = Vec::new();
                self.ensure_started(&mut events);
                events.push(StreamEvent::Other(event));
                events
            }
        }
    }

    /// Provider stream ended
    pub fn finish(&mut self) -> Vec<StreamEvent> {
        if matches!(self.state(), RelayState::Closing | RelayState::Closed) {
            return Vec::new();
        }
        self.close()
    }

    /// Client went away, emits nothing
    pub fn cancel(&mut self) -> Vec<StreamEvent> {
        self.transition(RelayState::Closed);
        Vec::new()
    }

    /// Mid-stream failure, emits one error event
    pub fn fail(&mut self, error: &LlmError) -> Vec<StreamEvent> {
        if self.state() == RelayState::Closed {
            return Vec::new();
        }
        self.transition(RelayState::Closed);
        vec![error_event(error.error_type(), error.client_message())]
    }

    fn transition(&self, next: RelayState) {
        self.state.send_replace(next);
    }

    fn ensure_started(&mut self, events: &mut Vec<StreamEvent>) {
        if self.state() != RelayState::Started {
            return;
        }

        let mut message = self
            .pending_start
            .take()
            .unwrap_or_else(|| CanonicalResponse::new(generated_message_id(), self.model.clone()));
        if message.model.is_empty() {
            message.model.clone_from(&self.model);
        }
        if message.usage.input_tokens == 0 {
            message.usage.input_tokens = self.input_tokens;
        }

        events.push(StreamEvent::MessageStart { message });
        self.transition(RelayState::Emitting);
    }

    fn open_block(&mut self, index: u32, content_block: ContentBlock) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        self.ensure_started(&mut events);

        if !self.open_blocks.insert(index) {
            tracing::debug!(provider = %self.provider, index, "ignoring duplicate block start");
            return events;
        }

        if content_block.takes_input() {
            self.saw_tool |= matches!(content_block, ContentBlock::ToolUse { .. });
            self.tool = Some(ToolBuffer {
                index,
                json: String::new(),
                flushed: false,
            });
            self.transition(RelayState::ToolAccumulating);
        }

        events.push(StreamEvent::ContentBlockStart { index, content_block });
        events
    }

    fn block_delta(&mut self, index: u32, delta: BlockDelta) -> Vec<StreamEvent> {
        let mut events = Vec::new();

        if let BlockDelta::InputJsonDelta { partial_json } = &delta {
            return self.tool_fragment(index, partial_json);
        }

        if !self.open_blocks.contains(&index) {
            let content_block = match &delta {
                BlockDelta::TextDelta { .. } => ContentBlock::text(""),
                BlockDelta::ThinkingDelta { .. } => ContentBlock::Thinking {
                    thinking: String::new(),
                    signature: None,
                },
                BlockDelta::SignatureDelta { .. } | BlockDelta::InputJsonDelta { .. } | BlockDelta::Other(_) => {
                    tracing::debug!(provider = %self.provider, index, "dropping delta for unopened block");
                    return events;
                }
            };
            events.extend(self.open_block(index, content_block));
        }

        self.ensure_started(&mut events);
        events.push(StreamEvent::ContentBlockDelta { index, delta });
        events
    }

    fn tool_fragment(&mut self, index: u32, fragment: &str) -> Vec<StreamEvent> {
        let Some(tool) = self.tool.as_mut().filter(|tool| tool.index == index) else {
            tracing::debug!(provider = %self.provider, index, "dropping tool arguments for unknown block");
            return Vec::new();
        };

        if tool.flushed {
            if fragment.trim().is_empty() {
                return Vec::new();
            }
            return self.malformed_tool_arguments();
        }

        tool.json.push_str(fragment);
        if !tool.is_complete() {
            return Vec::new();
        }

        tool.flushed = true;
        let partial_json = tool.json.clone();
        self.transition(RelayState::Emitting);

        vec![StreamEvent::ContentBlockDelta {
            index,
            delta: BlockDelta::InputJsonDelta { partial_json },
        }]
    }

    fn stop_block(&mut self, index: u32) -> Vec<StreamEvent> {
        if !self.open_blocks.contains(&index) {
            return Vec::new();
        }

        let mut events = Vec::new();
        if self.tool.as_ref().is_some_and(|tool| tool.index == index) {
            match self.flush_tool() {
                Some(delta) => events.extend(delta),
                None => return self.malformed_tool_arguments(),
            }
            self.transition(RelayState::Emitting);
        }

        self.open_blocks.remove(&index);
        events.push(StreamEvent::ContentBlockStop { index });
        events
    }

    /// Release the tool buffer, `None` when its arguments never became valid JSON
    fn flush_tool(&mut self) -> Option<Option<StreamEvent>> {
        let tool = self.tool.take()?;

        if tool.flushed {
            return Some(None);
        }
        if tool.json.trim().is_empty() {
            return Some(Some(StreamEvent::ContentBlockDelta {
                index: tool.index,
                delta: BlockDelta::InputJsonDelta {
                    partial_json: "{}".to_owned(),
                },
            }));
        }

        tracing::warn!(
            provider = %self.provider,
            index = tool.index,
            buffered = tool.json.len(),
            "tool arguments ended before forming valid JSON"
        );
        None
    }

    fn malformed_tool_arguments(&mut self) -> Vec<StreamEvent> {
        self.tool = None;
        self.transition(RelayState::Closed);
        vec![error_event(
            "api_error",
            format!("{} sent incomplete tool call arguments", self.provider),
        )]
    }

    fn close(&mut self) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        self.ensure_started(&mut events);
        self.transition(RelayState::Closing);

        if self.tool.is_some() {
            match self.flush_tool() {
                Some(delta) => events.extend(delta),
                None => {
                    events.extend(self.malformed_tool_arguments());
                    return events;
                }
            }
        }

        events.extend(
            std::mem::take(&mut self.open_blocks)
                .into_iter()
                .map(|index| StreamEvent::ContentBlockStop { index }),
        );

        let default_reason = if self.saw_tool {
            StopReason::ToolUse
        } else {
            StopReason::EndTurn
        };
        let delta = MessageDeltaBody {
            stop_reason: Some(self.delta.stop_reason.unwrap_or(default_reason)),
            stop_sequence: self.delta.stop_sequence.take(),
        };
        events.push(StreamEvent::MessageDelta {
            delta,
            usage: Some(self.usage),
        });
        events.push(StreamEvent::MessageStop);

        self.transition(RelayState::Closed);
        events
    }
}

fn error_event(kind: &str, message: String) -> StreamEvent {
    StreamEvent::Error {
        error: ErrorBody {
            kind: kind.to_owned(),
            message,
        },
    }
}

/// Drive a provider stream through its decoder and a relay
///
/// Frames are read one at a time. Cancellation is checked before and during
/// every read; once it fires the upstream stream is dropped, which closes the
/// provider connection, and nothing more is emitted.
pub fn relay_stream(
    frames: FrameStream,
    transformer: Arc<dyn Transformer>,
    decode_state: StreamState,
    relay: StreamRelay,
    cancel: CancellationToken,
) -> EventStream {
    let driver = RelayDriver {
        frames: Some(frames),
        transformer,
        decode_state,
        relay,
        cancel,
        pending: VecDeque::new(),
    };

    Box::pin(stream::unfold(driver, |mut driver| async move {
        let event = driver.next_event().await?;
        Some((event, driver))
    }))
}

struct RelayDriver {
    frames: Option<FrameStream>,
    transformer: Arc<dyn Transformer>,
    decode_state: StreamState,
    relay: StreamRelay,
    cancel: CancellationToken,
    pending: VecDeque<StreamEvent>,
}

impl RelayDriver {
    async fn next_event(&mut self) -> Option<StreamEvent> {
        loop {
            if self.cancel.is_cancelled() {
                self.abort();
                return None;
            }

            if let Some(event) = self.pending.pop_front() {
                return Some(event);
            }

            if self.relay.state() == RelayState::Closed {
                self.frames = None;
                return None;
            }

            let frames = self.frames.as_mut()?;
            let next = tokio::select! {
                biased;
                () = self.cancel.cancelled() => None,
                next = frames.next() => Some(next),
            };

            match next {
                None => {
                    self.abort();
                    return None;
                }
                Some(Some(Ok(frame))) => self.on_frame(&frame),
                Some(Some(Err(error))) => {
                    self.frames = None;
                    tracing::warn!(provider = %self.relay.provider(), error = %error, "provider stream failed");
                    self.pending.extend(self.relay.fail(&error));
                }
                Some(None) => {
                    self.frames = None;
                    self.on_eof();
                }
            }
        }
    }

    fn on_frame(&mut self, frame: &str) {
        match self.transformer.decode_stream_chunk(frame, &mut self.decode_state) {
            Ok(decoded) => {
                for event in decoded {
                    self.pending.extend(self.relay.push(event));
                }
            }
            Err(error) => events::transform_error(self.relay.provider(), TransformStage::StreamChunk, &error),
        }
    }

    fn on_eof(&mut self) {
        if self.decode_state.has_partial() {
            tracing::warn!(provider = %self.relay.provider(), "provider stream ended inside a payload");
        }

        for event in self.transformer.finish_stream(&mut self.decode_state) {
            self.pending.extend(self.relay.push(event));
        }
        self.pending.extend(self.relay.finish());
    }

    fn abort(&mut self) {
        self.frames = None;
        self.pending.clear();
        self.relay.cancel();
        tracing::debug!(provider = %self.relay.provider(), "stream canceled by client");
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use tokio::sync::mpsc;

    use super::*;
    use crate::transform::PassthroughTransformer;

    fn tool_start(index: u32) -> StreamEvent {
        StreamEvent::ContentBlockStart {
            index,
            content_block: ContentBlock::ToolUse {
                id: "toolu_1".to_owned(),
                name: "get_weather".to_owned(),
                input: json!({}),
            },
        }
    }

    fn json_fragment(index: u32, partial_json: &str) -> StreamEvent {
        StreamEvent::ContentBlockDelta {
            index,
            delta: BlockDelta::InputJsonDelta {
                partial_json: partial_json.to_owned(),
            },
        }
    }

    fn transcript(events: &[StreamEvent]) -> String {
        events
            .iter()
            .map(|event| match event {
                StreamEvent::ContentBlockDelta {
                    index,
                    delta: BlockDelta::TextDelta { text },
                } => format!("content_block_delta[{index}] text {text:?}"),
                StreamEvent::ContentBlockDelta {
                    index,
                    delta: BlockDelta::InputJsonDelta { partial_json },
                } => format!("content_block_delta[{index}] json {partial_json}"),
                StreamEvent::ContentBlockStart { index, .. } | StreamEvent::ContentBlockStop { index } => {
                    format!("{}[{index}]", event.event_type())
                }
                StreamEvent::MessageDelta { delta, .. } => format!("message_delta {:?}", delta.stop_reason),
                other => other.event_type().to_owned(),
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn relay_all(relay: &mut StreamRelay, input: Vec<StreamEvent>) -> Vec<StreamEvent> {
        let mut out: Vec<StreamEvent> = input.into_iter().flat_map(|event| relay.push(event)).collect();
        out.extend(relay.finish());
        out
    }

    #[test]
    fn text_then_tool_call_keeps_order() {
        let mut relay = StreamRelay::new("openrouter", "claude-sonnet-4", 42);

        let out = relay_all(
            &mut relay,
            vec![
                StreamEvent::MessageStart {
                    message: CanonicalResponse::new("msg_1", ""),
                },
                StreamEvent::ContentBlockStart {
                    index: 0,
                    content_block: ContentBlock::text(""),
                },
                StreamEvent::text_delta(0, "Let"),
                StreamEvent::text_delta(0, " me"),
                StreamEvent::text_delta(0, " check."),
                StreamEvent::ContentBlockStop { index: 0 },
                tool_start(1),
                json_fragment(1, r#"{"city":"#),
                json_fragment(1, r#" "Paris"}"#),
                StreamEvent::ContentBlockStop { index: 1 },
                StreamEvent::MessageDelta {
                    delta: MessageDeltaBody {
                        stop_reason: Some(StopReason::ToolUse),
                        stop_sequence: None,
                    },
                    usage: Some(Usage {
                        input_tokens: 0,
                        output_tokens: 17,
                    }),
                },
                StreamEvent::MessageStop,
            ],
        );

        insta::assert_snapshot!(transcript(&out), @r#"
        message_start
        content_block_start[0]
        content_block_delta[0] text "Let"
        content_block_delta[0] text " me"
        content_block_delta[0] text " check."
        content_block_stop[0]
        content_block_start[1]
        content_block_delta[1] json {"city": "Paris"}
        content_block_stop[1]
        message_delta Some(ToolUse)
        message_stop
        "#);

        let StreamEvent::MessageStart { message } = &out[0] else {
            panic!("expected message_start, got {:?}", out[0]);
        };
        assert_eq!(message.id, "msg_1");
        assert_eq!(message.model, "claude-sonnet-4");
        assert_eq!(message.usage.input_tokens, 42);

        let StreamEvent::MessageDelta { usage, .. } = &out[9] else {
            panic!("expected message_delta, got {:?}", out[9]);
        };
        assert_eq!(usage.map(|u| u.output_tokens), Some(17));
        assert_eq!(relay.state(), RelayState::Closed);
    }

    #[test]
    fn synthesizes_start_and_closes_open_blocks() {
        let mut relay = StreamRelay::new("gemini", "gemini-2.5-pro", 10);

        let out = relay_all(&mut relay, vec![StreamEvent::text_delta(0, "hi")]);

        insta::assert_snapshot!(transcript(&out), @r#"
        message_start
        content_block_start[0]
        content_block_delta[0] text "hi"
        content_block_stop[0]
        message_delta Some(EndTurn)
        message_stop
        "#);

        let StreamEvent::MessageStart { message } = &out[0] else {
            panic!("expected message_start");
        };
        assert!(message.id.starts_with("msg_"));
        assert_eq!(message.model, "gemini-2.5-pro");
    }

    #[test]
    fn argument_less_tool_call_gets_empty_object() {
        let mut relay = StreamRelay::new("openai", "gpt-4o", 1);

        let out = relay_all(&mut relay, vec![tool_start(0), StreamEvent::ContentBlockStop { index: 0 }]);

        assert!(out.contains(&json_fragment(0, "{}")));
        assert!(matches!(
            out.iter().rev().nth(1),
            Some(StreamEvent::MessageDelta {
                delta: MessageDeltaBody {
                    stop_reason: Some(StopReason::ToolUse),
                    ..
                },
                ..
            })
        ));
    }

    #[test]
    fn server_tool_blocks_and_unmodeled_deltas_are_relayed() {
        let mut relay = StreamRelay::new("openrouter", "claude-sonnet-4", 1);
        let citation = StreamEvent::ContentBlockDelta {
            index: 2,
            delta: BlockDelta::Other(json!({"type": "citations_delta", "citation": {"cited_text": "x"}})),
        };

        let out = relay_all(
            &mut relay,
            vec![
                StreamEvent::ContentBlockStart {
                    index: 0,
                    content_block: ContentBlock::Unknown(json!({
                        "type": "server_tool_use", "id": "srvtoolu_1", "name": "web_search", "input": {}
                    })),
                },
                json_fragment(0, r#"{"query": "#),
                json_fragment(0, r#""rust"}"#),
                StreamEvent::ContentBlockStop { index: 0 },
                StreamEvent::ContentBlockStart {
                    index: 2,
                    content_block: ContentBlock::text(""),
                },
                citation.clone(),
                StreamEvent::ContentBlockStop { index: 2 },
            ],
        );

        assert!(out.contains(&json_fragment(0, r#"{"query": "rust"}"#)));
        assert!(out.contains(&citation));
        assert!(matches!(
            out.iter().rev().nth(1),
            Some(StreamEvent::MessageDelta {
                delta: MessageDeltaBody {
                    stop_reason: Some(StopReason::EndTurn),
                    ..
                },
                ..
            })
        ));
    }

    #[test]
    fn incomplete_tool_arguments_end_in_error() {
        let mut relay = StreamRelay::new("deepseek", "deepseek-chat", 1);

        let mut out = Vec::new();
        out.extend(relay.push(tool_start(0)));
        out.extend(relay.push(json_fragment(0, r#"{"city": "Par"#)));
        assert_eq!(relay.state(), RelayState::ToolAccumulating);
        out.extend(relay.push(StreamEvent::ContentBlockStop { index: 0 }));

        assert_eq!(relay.state(), RelayState::Closed);
        assert!(matches!(out.last(), Some(StreamEvent::Error { .. })));
        assert!(!out.iter().any(|event| matches!(
            event,
            StreamEvent::ContentBlockDelta {
                delta: BlockDelta::InputJsonDelta { .. },
                ..
            }
        )));

        assert!(relay.finish().is_empty());
        assert!(relay.push(StreamEvent::text_delta(1, "late")).is_empty());
    }

    #[test]
    fn failure_emits_single_error() {
        let mut relay = StreamRelay::new("openai", "gpt-4o", 1);
        relay.push(StreamEvent::text_delta(0, "partial"));

        let out = relay.fail(&LlmError::upstream("openai", "connection reset"));

        assert_eq!(out.len(), 1);
        let StreamEvent::Error { error } = &out[0] else {
            panic!("expected error event");
        };
        assert_eq!(error.kind, "api_error");
        assert!(relay.fail(&LlmError::Canceled).is_empty());
    }

    #[test]
    fn observers_see_transitions() {
        let mut relay = StreamRelay::new("openai", "gpt-4o", 1);
        let observer = relay.observe();

        relay.push(StreamEvent::text_delta(0, "a"));
        assert_eq!(*observer.borrow(), RelayState::Emitting);

        relay.push(tool_start(1));
        assert_eq!(*observer.borrow(), RelayState::ToolAccumulating);

        relay.finish();
        assert_eq!(*observer.borrow(), RelayState::Closed);
    }

    fn frame(event: &StreamEvent) -> String {
        serde_json::to_string(event).unwrap()
    }

    #[tokio::test]
    async fn cancel_drops_upstream_and_stops_emitting() {
        let (tx, rx) = mpsc::channel::<String>(16);
        for text in ["one", "two", "three", "four"] {
            tx.send(frame(&StreamEvent::text_delta(0, text))).await.unwrap();
        }

        // The sender stays alive, so only cancellation can end the stream
        let frames: FrameStream = Box::pin(stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|frame| (Ok(frame), rx))
        }));

        let relay = StreamRelay::new("openrouter", "claude-sonnet-4", 5);
        let observer = relay.observe();
        let cancel = CancellationToken::new();
        let mut events = relay_stream(
            frames,
            Arc::new(PassthroughTransformer),
            StreamState::new(),
            relay,
            cancel.clone(),
        );

        let mut deltas = 0;
        while deltas < 2 {
            let event = events.next().await.unwrap();
            if matches!(event, StreamEvent::ContentBlockDelta { .. }) {
                deltas += 1;
            }
        }

        cancel.cancel();

        assert!(events.next().await.is_none());
        assert_eq!(*observer.borrow(), RelayState::Closed);
        assert!(tx.is_closed());
    }

    #[tokio::test]
    async fn transport_error_becomes_terminal_event() {
        let frames: FrameStream = Box::pin(stream::iter(vec![
            Ok(frame(&StreamEvent::text_delta(0, "hello"))),
            Err(LlmError::upstream("openrouter", "connection reset")),
            Ok(frame(&StreamEvent::text_delta(0, "never"))),
        ]));

        let events: Vec<_> = relay_stream(
            frames,
            Arc::new(PassthroughTransformer),
            StreamState::new(),
            StreamRelay::new("openrouter", "claude-sonnet-4", 5),
            CancellationToken::new(),
        )
        .collect()
        .await;

        insta::assert_snapshot!(transcript(&events), @r#"
        message_start
        content_block_start[0]
        content_block_delta[0] text "hello"
        error
        "#);
    }

    #[tokio::test]
    async fn undecodable_frames_are_skipped() {
        let frames: FrameStream = Box::pin(stream::iter(vec![
            Ok(frame(&StreamEvent::text_delta(0, "a"))),
            Ok("{\"type\": 42}".to_owned()),
            Ok(frame(&StreamEvent::text_delta(0, "b"))),
        ]));

        let events: Vec<_> = relay_stream(
            frames,
            Arc::new(PassthroughTransformer),
            StreamState::new(),
            StreamRelay::new("openrouter", "claude-sonnet-4", 5),
            CancellationToken::new(),
        )
        .collect()
        .await;

        let texts: Vec<_> = events
            .iter()
            .filter_map(|event| match event {
                StreamEvent::ContentBlockDelta {
                    delta: BlockDelta::TextDelta { text },
                    ..
                } => Some(text.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(texts, ["a", "b"]);
        assert_eq!(events.last(), Some(&StreamEvent::MessageStop));
    }
}
