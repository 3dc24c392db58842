use serde_json::Value;

use super::state::usage_event;
use super::{
    StreamState, Transformer, WireRequest, clamp_max_tokens, ensure_parameter_ranges, ensure_tool_support,
    finalize_body, generated_message_id, parse_body,
};
use crate::error::LlmError;
use crate::profile::ProviderProfile;
use crate::protocol::openai::{
    ChatChunk, ChatMessage, ChatRequest, ChatResponse, ContentPart, FunctionCall, FunctionDef, FunctionTool, ImageUrl,
    MessageContent, ReplyMessage, StreamOptions, TokenUsage, ToolCall,
};
use crate::types::{
    CanonicalRequest, CanonicalResponse, Content, ContentBlock, Message, Role, StopReason, StreamEvent, ToolChoice,
    Usage,
};

const CHAT_COMPLETIONS_PATH: &str = "/chat/completions";
const DONE_SENTINEL: &str = "[DONE]";

/// OpenAI-compatible chat completions codec
#[derive(Debug, Clone, Copy, Default)]
pub struct OpenAiTransformer;

impl Transformer for OpenAiTransformer {
    fn name(&self) -> &'static str {
        "openai"
    }

    fn encode_request(
        &self,
        request: &CanonicalRequest,
        model: &str,
        profile: &ProviderProfile,
    ) -> Result<WireRequest, LlmError> {
        encode_chat(request, model, profile, profile.max_tokens_hard_cap)
    }

    fn decode_response(&self, body: &[u8]) -> Result<CanonicalResponse, LlmError> {
        decode_chat(body, self.name())
    }

    fn decode_stream_chunk(&self, chunk: &str, state: &mut StreamState) -> Result<Vec<StreamEvent>, LlmError> {
        decode_chat_chunk(chunk, state, self.name())
    }
}

/// Encode a chat completions request with the given output cap
pub(super) fn encode_chat(
    request: &CanonicalRequest,
    model: &str,
    profile: &ProviderProfile,
    cap: u32,
) -> Result<WireRequest, LlmError> {
    ensure_tool_support(request, profile)?;
    ensure_parameter_ranges(request, profile)?;

    let mut messages = Vec::with_capacity(request.messages.len() + 1);

    // No system field on the wire, the prompt leads the conversation
    if let Some(system) = request.system_text() {
        messages.push(ChatMessage::text("system", system));
    }

    for message in &request.messages {
        encode_message(message, &mut messages);
    }

    let tools = request.tools.as_ref().filter(|tools| !tools.is_empty()).map(|tools| {
        tools
            .iter()
            .map(|tool| FunctionTool {
                kind: "function",
                function: FunctionDef {
                    name: tool.name.clone(),
                    description: tool.description.clone(),
                    parameters: Some(tool.input_schema.clone()),
                },
            })
            .collect()
    });

    let wire = ChatRequest {
        model: model.to_owned(),
        messages,
        temperature: request.temperature,
        top_p: request.top_p,
        max_tokens: Some(clamp_max_tokens(request, cap)),
        stop: request.stop_sequences.clone(),
        stream: request.stream.then_some(true),
        tools,
        tool_choice: request.tool_choice.as_ref().map(encode_tool_choice),
        stream_options: (request.stream && profile.stream_usage).then_some(StreamOptions { include_usage: true }),
    };

    let mut body = serde_json::to_value(wire).map_err(|e| LlmError::InvalidRequest(e.to_string()))?;

    if let Some(user) = request
        .metadata
        .as_ref()
        .and_then(|metadata| metadata.get("user_id"))
        .and_then(Value::as_str)
        && let Some(object) = body.as_object_mut()
    {
        object.insert("user".to_owned(), Value::from(user));
    }

    Ok(WireRequest {
        path: CHAT_COMPLETIONS_PATH.to_owned(),
        body: finalize_body(body, request, profile),
        stream: request.stream,
    })
}

fn encode_message(message: &Message, out: &mut Vec<ChatMessage>) {
    let blocks = match &message.content {
        Content::Text(text) => {
            out.push(ChatMessage::text(role_name(message.role), text.clone()));
            return;
        }
        Content::Blocks(blocks) => blocks,
    };

    match message.role {
        Role::User => {
            // Tool results answer the previous turn, so they come first
            for block in blocks {
                if let ContentBlock::ToolResult {
                    tool_use_id,
                    content,
                    is_error,
                } = block
                {
                    let text = content.as_ref().map(Content::as_text).unwrap_or_default();
                    let text = if *is_error == Some(true) {
                        format!("Error: {text}")
                    } else {
                        text
                    };

                    out.push(ChatMessage {
                        role: "tool",
                        content: Some(MessageContent::Text(text)),
                        tool_calls: None,
                        tool_call_id: Some(tool_use_id.clone()),
                    });
                }
            }

            if let Some(content) = encode_user_parts(blocks) {
                out.push(ChatMessage {
                    role: "user",
                    content: Some(content),
                    tool_calls: None,
                    tool_call_id: None,
                });
            }
        }
        Role::Assistant => {
            let text = Content::Blocks(blocks.clone()).as_text();
            let tool_calls: Vec<ToolCall> = blocks
                .iter()
                .filter_map(|block| match block {
                    ContentBlock::ToolUse { id, name, input } => Some(ToolCall {
                        id: id.clone(),
                        kind: "function".to_owned(),
                        function: FunctionCall {
                            name: name.clone(),
                            arguments: input.to_string(),
                        },
                    }),
                    _ => None,
                })
                .collect();

            if text.is_empty() && tool_calls.is_empty() {
                return;
            }

            out.push(ChatMessage {
                role: "assistant",
                content: (!text.is_empty()).then_some(MessageContent::Text(text)),
                tool_calls: (!tool_calls.is_empty()).then_some(tool_calls),
                tool_call_id: None,
            });
        }
    }
}

/// User text and images, as a plain string when there are no images
fn encode_user_parts(blocks: &[ContentBlock]) -> Option<MessageContent> {
    let parts: Vec<ContentPart> = blocks
        .iter()
        .filter_map(|block| match block {
            ContentBlock::Text { text, .. } => Some(ContentPart::Text { text: text.clone() }),
            ContentBlock::Image { source } => source.to_url().map(|url| ContentPart::ImageUrl {
                image_url: ImageUrl { url },
            }),
            _ => None,
        })
        .collect();

    if parts.is_empty() {
        return None;
    }

    if parts.iter().all(|part| matches!(part, ContentPart::Text { .. })) {
        let text = parts
            .into_iter()
            .filter_map(|part| match part {
                ContentPart::Text { text } => Some(text),
                ContentPart::ImageUrl { .. } => None,
            })
            .collect::<Vec<_>>()
            .join("\n");
        return Some(MessageContent::Text(text));
    }

    Some(MessageContent::Parts(parts))
}

const fn role_name(role: Role) -> &'static str {
    match role {
        Role::User => "user",
        Role::Assistant => "assistant",
    }
}

fn encode_tool_choice(choice: &ToolChoice) -> Value {
    match choice {
        ToolChoice::Auto => Value::from("auto"),
        ToolChoice::Any => Value::from("required"),
        ToolChoice::None => Value::from("none"),
        ToolChoice::Tool { name } => serde_json::json!({
            "type": "function",
            "function": { "name": name },
        }),
    }
}

/// Map a chat completions finish reason
pub(super) fn stop_reason(finish_reason: &str) -> StopReason {
    match finish_reason {
        "length" => StopReason::MaxTokens,
        "tool_calls" | "function_call" => StopReason::ToolUse,
        _ => StopReason::EndTurn,
    }
}

const fn usage(usage: TokenUsage) -> Usage {
    Usage {
        input_tokens: usage.prompt_tokens,
        output_tokens: usage.completion_tokens,
    }
}

/// Decode a complete chat completions response
pub(super) fn decode_chat(body: &[u8], provider: &str) -> Result<CanonicalResponse, LlmError> {
    let wire: ChatResponse = parse_body(body, provider)?;

    let id = if wire.id.is_empty() {
        generated_message_id()
    } else {
        wire.id
    };
    let mut response = CanonicalResponse::new(id, wire.model);
    response.usage = wire.usage.map(usage).unwrap_or_default();

    let Some(choice) = wire.choices.into_iter().next() else {
        return Err(LlmError::upstream(provider, "response contained no choices"));
    };

    response.stop_reason = choice.finish_reason.as_deref().map(stop_reason);
    response.content = decode_choice_message(choice.message, provider)?;

    if response.stop_reason.is_none()
        && response
            .content
            .iter()
            .any(|block| matches!(block, ContentBlock::ToolUse { .. }))
    {
        response.stop_reason = Some(StopReason::ToolUse);
    }

    Ok(response)
}

fn decode_choice_message(message: ReplyMessage, provider: &str) -> Result<Vec<ContentBlock>, LlmError> {
    let mut content = Vec::new();

    if let Some(reasoning) = message.reasoning_content.filter(|text| !text.is_empty()) {
        content.push(ContentBlock::Thinking {
            thinking: reasoning,
            signature: None,
        });
    }

    if let Some(text) = message.content.filter(|text| !text.is_empty()) {
        content.push(ContentBlock::text(text));
    }

    for call in message.tool_calls.unwrap_or_default() {
        let input = if call.function.arguments.trim().is_empty() {
            serde_json::json!({})
        } else {
            serde_json::from_str(&call.function.arguments).map_err(|e| {
                LlmError::upstream(
                    provider,
                    format!("tool call '{}' has invalid arguments: {e}", call.function.name),
                )
            })?
        };

        content.push(ContentBlock::ToolUse {
            id: call.id,
            name: call.function.name,
            input,
        });
    }

    Ok(content)
}

/// Decode one chat completions stream payload
pub(super) fn decode_chat_chunk(
    chunk: &str,
    state: &mut StreamState,
    provider: &str,
) -> Result<Vec<StreamEvent>, LlmError> {
    if chunk.trim() == DONE_SENTINEL {
        return Ok(state.stop());
    }

    let Some(wire) = state.parse::<ChatChunk>(chunk, provider)? else {
        return Ok(Vec::new());
    };

    let mut events = Vec::new();

    let id = if wire.id.is_empty() {
        generated_message_id()
    } else {
        wire.id
    };
    events.extend(state.start(id, wire.model, Usage::default()));

    for choice in wire.choices.into_iter().take(1) {
        let delta = choice.delta;

        if let Some(reasoning) = &delta.reasoning_content {
            events.extend(state.thinking(reasoning));
        }

        if let Some(text) = &delta.content {
            events.extend(state.text(text));
        }

        for call in delta.tool_calls.unwrap_or_default() {
            let function = call.function.unwrap_or_default();

            if !state.knows_tool(call.index) {
                let Some(id) = call.id else {
                    return Err(LlmError::upstream(
                        provider,
                        format!("tool call {} started without an id", call.index),
                    ));
                };
                events.extend(state.begin_tool(call.index, id, function.name.unwrap_or_default()));
            }

            if let Some(arguments) = &function.arguments {
                events.extend(state.tool_arguments(call.index, arguments, provider)?);
            }
        }

        if let Some(finish_reason) = &choice.finish_reason {
            events.extend(state.finish(Some(stop_reason(finish_reason)), None));
        }
    }

    if let Some(reported) = wire.usage {
        events.push(usage_event(usage(reported)));
    }

    Ok(events)
}
