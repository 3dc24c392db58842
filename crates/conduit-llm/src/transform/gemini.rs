use std::collections::HashMap;

use serde_json::Value;

use super::{
    StreamState, Transformer, WireRequest, clamp_max_tokens, ensure_parameter_ranges, ensure_tool_support,
    finalize_body, generated_message_id, generated_tool_id, parse_body,
};
use crate::error::LlmError;
use crate::profile::ProviderProfile;
use crate::protocol::gemini::{
    GeminiContent, GeminiFileData, GeminiFunctionCall, GeminiFunctionCallingConfig, GeminiFunctionDeclaration,
    GeminiFunctionResponse, GeminiGenerationConfig, GeminiInlineData, GeminiPart, GeminiRequest, GeminiResponse,
    GeminiTool, GeminiToolConfig, GeminiUsageMetadata,
};
use crate::types::{
    CanonicalRequest, CanonicalResponse, Content, ContentBlock, ImageSource, Role, StopReason, StreamEvent, ToolChoice,
    Usage,
};

/// Schema keywords the Gemini function declaration schema rejects
const UNSUPPORTED_SCHEMA_KEYS: &[&str] = &["$schema", "additionalProperties"];

/// Gemini `generateContent` codec
#[derive(Debug, Clone, Copy, Default)]
pub struct GeminiTransformer;

impl Transformer for GeminiTransformer {
    fn name(&self) -> &'static str {
        "gemini"
    }

    fn encode_request(
        &self,
        request: &CanonicalRequest,
        model: &str,
        profile: &ProviderProfile,
    ) -> Result<WireRequest, LlmError> {
        ensure_tool_support(request, profile)?;
        ensure_parameter_ranges(request, profile)?;

        // functionResponse parts are keyed by name, not call id
        let tool_names: HashMap<&str, &str> = request
            .messages
            .iter()
            .filter_map(|message| match &message.content {
                Content::Blocks(blocks) => Some(blocks),
                Content::Text(_) => None,
            })
            .flatten()
            .filter_map(|block| match block {
                ContentBlock::ToolUse { id, name, .. } => Some((id.as_str(), name.as_str())),
                _ => None,
            })
            .collect();

        let contents = request
            .messages
            .iter()
            .filter_map(|message| {
                let parts: Vec<GeminiPart> = message
                    .content
                    .to_blocks()
                    .iter()
                    .filter_map(|block| encode_part(block, &tool_names))
                    .collect();

                // Gemini rejects contents without parts
                (!parts.is_empty()).then(|| GeminiContent {
                    role: Some(
                        match message.role {
                            Role::User => "user",
                            Role::Assistant => "model",
                        }
                        .to_owned(),
                    ),
                    parts,
                })
            })
            .collect();

        let system_instruction = request.system_text().map(|text| GeminiContent {
            role: None,
            parts: vec![GeminiPart::text(text)],
        });

        let generation_config = GeminiGenerationConfig {
            temperature: request.temperature,
            top_p: request.top_p,
            top_k: request.top_k,
            max_output_tokens: Some(clamp_max_tokens(request, profile.max_tokens_hard_cap)),
            stop_sequences: request.stop_sequences.clone(),
        };

        let tools = request.tools.as_ref().filter(|tools| !tools.is_empty()).map(|tools| {
            vec![GeminiTool {
                function_declarations: tools
                    .iter()
                    .map(|tool| GeminiFunctionDeclaration {
                        name: tool.name.clone(),
                        description: tool.description.clone(),
                        parameters: Some(clean_schema(tool.input_schema.clone())),
                    })
                    .collect(),
            }]
        });

        let tool_config = request.tool_choice.as_ref().map(|choice| {
            let (mode, allowed_function_names) = match choice {
                ToolChoice::Auto => ("AUTO", None),
                ToolChoice::Any => ("ANY", None),
                ToolChoice::None => ("NONE", None),
                ToolChoice::Tool { name } => ("ANY", Some(vec![name.clone()])),
            };
            GeminiToolConfig {
                function_calling_config: GeminiFunctionCallingConfig {
                    mode: mode.to_owned(),
                    allowed_function_names,
                },
            }
        });

        let wire = GeminiRequest {
            contents,
            system_instruction,
            generation_config: Some(generation_config),
            tools,
            tool_config,
        };

        let body = serde_json::to_value(wire).map_err(|e| LlmError::InvalidRequest(e.to_string()))?;

        let path = if request.stream {
            format!("/models/{model}:streamGenerateContent?alt=sse")
        } else {
            format!("/models/{model}:generateContent")
        };

        Ok(WireRequest {
            path,
            body: finalize_body(body, request, profile),
            stream: request.stream,
        })
    }

    fn decode_response(&self, body: &[u8]) -> Result<CanonicalResponse, LlmError> {
        let wire: GeminiResponse = parse_body(body, self.name())?;

        let id = wire.response_id.unwrap_or_else(generated_message_id);
        let mut response = CanonicalResponse::new(id, wire.model_version.unwrap_or_default());
        response.usage = wire.usage_metadata.map(usage).unwrap_or_default();

        let Some(candidate) = wire.candidates.into_iter().next() else {
            return Err(LlmError::upstream(self.name(), "response contained no candidates"));
        };

        for part in candidate.content.parts {
            if let Some(call) = part.function_call {
                response.content.push(ContentBlock::ToolUse {
                    id: generated_tool_id(),
                    name: call.name,
                    input: normalize_args(call.args),
                });
            } else if let Some(text) = part.text.filter(|text| !text.is_empty()) {
                if part.thought == Some(true) {
                    response.content.push(ContentBlock::Thinking {
                        thinking: text,
                        signature: None,
                    });
                } else {
                    response.content.push(ContentBlock::text(text));
                }
            }
        }

        let called_tool = response
            .content
            .iter()
            .any(|block| matches!(block, ContentBlock::ToolUse { .. }));
        response.stop_reason = candidate
            .finish_reason
            .as_deref()
            .map(|reason| stop_reason(reason, called_tool));

        Ok(response)
    }

    fn decode_stream_chunk(&self, chunk: &str, state: &mut StreamState) -> Result<Vec<StreamEvent>, LlmError> {
        let Some(wire) = state.parse::<GeminiResponse>(chunk, self.name())? else {
            return Ok(Vec::new());
        };

        let mut events = Vec::new();

        let id = wire.response_id.unwrap_or_else(generated_message_id);
        let start_usage = wire.usage_metadata.map(usage).map(|reported| Usage {
            output_tokens: 0,
            ..reported
        });
        events.extend(state.start(id, wire.model_version.unwrap_or_default(), start_usage.unwrap_or_default()));

        let Some(candidate) = wire.candidates.into_iter().next() else {
            return Ok(events);
        };

        for part in candidate.content.parts {
            if let Some(call) = part.function_call {
                // Calls arrive whole: open, deliver the full arguments, close
                let key = state.tool_count();
                events.extend(state.begin_tool(key, generated_tool_id(), call.name));
                let arguments = normalize_args(call.args).to_string();
                events.extend(state.tool_arguments(key, &arguments, self.name())?);
                events.extend(state.close_block());
            } else if let Some(text) = &part.text {
                if part.is_thought() {
                    events.extend(state.thinking(text));
                } else {
                    events.extend(state.text(text));
                }
            }
        }

        if let Some(reason) = &candidate.finish_reason {
            let stop = stop_reason(reason, state.saw_tool_use());
            events.extend(state.finish(Some(stop), wire.usage_metadata.map(usage)));
        }

        Ok(events)
    }
}

fn encode_part(block: &ContentBlock, tool_names: &HashMap<&str, &str>) -> Option<GeminiPart> {
    match block {
        ContentBlock::Text { text, .. } if !text.is_empty() => Some(GeminiPart::text(text.clone())),
        ContentBlock::Image { source } => encode_image(source),
        ContentBlock::ToolUse { name, input, .. } => Some(GeminiPart {
            function_call: Some(GeminiFunctionCall {
                name: name.clone(),
                args: input.clone(),
            }),
            ..GeminiPart::default()
        }),
        ContentBlock::ToolResult {
            tool_use_id,
            content,
            is_error,
        } => {
            let name = tool_names
                .get(tool_use_id.as_str())
                .map_or_else(|| tool_use_id.clone(), |name| (*name).to_owned());
            let text = content.as_ref().map(Content::as_text).unwrap_or_default();

            let response = if *is_error == Some(true) {
                serde_json::json!({ "error": text })
            } else {
                // Structured tool output is passed as-is
                serde_json::from_str::<Value>(&text)
                    .ok()
                    .filter(Value::is_object)
                    .unwrap_or_else(|| serde_json::json!({ "result": text }))
            };

            Some(GeminiPart {
                function_response: Some(GeminiFunctionResponse { name, response }),
                ..GeminiPart::default()
            })
        }
        ContentBlock::Text { .. } | ContentBlock::Thinking { .. } | ContentBlock::Unknown(_) => None,
    }
}

fn encode_image(source: &ImageSource) -> Option<GeminiPart> {
    if let (Some(media_type), Some(data)) = (&source.media_type, &source.data) {
        return Some(GeminiPart {
            inline_data: Some(GeminiInlineData {
                mime_type: media_type.clone(),
                data: data.clone(),
            }),
            ..GeminiPart::default()
        });
    }

    source.url.as_ref().map(|url| GeminiPart {
        file_data: Some(GeminiFileData {
            mime_type: source.media_type.clone(),
            file_uri: url.clone(),
        }),
        ..GeminiPart::default()
    })
}

/// Strip schema keywords Gemini rejects, at every depth
fn clean_schema(mut schema: Value) -> Value {
    match &mut schema {
        Value::Object(object) => {
            for key in UNSUPPORTED_SCHEMA_KEYS {
                object.remove(*key);
            }
            for value in object.values_mut() {
                *value = clean_schema(value.take());
            }
        }
        Value::Array(items) => {
            for item in items.iter_mut() {
                *item = clean_schema(item.take());
            }
        }
        _ => {}
    }
    schema
}

fn normalize_args(args: Value) -> Value {
    if args.is_null() { serde_json::json!({}) } else { args }
}

fn stop_reason(finish_reason: &str, called_tool: bool) -> StopReason {
    match finish_reason {
        "MAX_TOKENS" => StopReason::MaxTokens,
        _ if called_tool => StopReason::ToolUse,
        _ => StopReason::EndTurn,
    }
}

const fn usage(metadata: GeminiUsageMetadata) -> Usage {
    Usage {
        input_tokens: metadata.prompt_token_count,
        output_tokens: metadata.candidates_token_count,
    }
}
