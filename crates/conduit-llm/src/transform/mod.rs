//! Codecs between the canonical format and provider wire formats
//!
//! One `Transformer` per provider family, selected at runtime through
//! [`TransformerSet`]. Encoders apply the profile's token clamp and parameter
//! rules; decoders turn provider responses and stream payloads into canonical
//! values.

mod deepseek;
mod gemini;
mod openai;
mod passthrough;
mod state;

use std::sync::Arc;

use serde_json::{Map, Value};

pub use deepseek::DeepSeekTransformer;
pub use gemini::GeminiTransformer;
pub use openai::OpenAiTransformer;
pub use passthrough::PassthroughTransformer;
pub use state::StreamState;

use crate::error::LlmError;
use crate::profile::{ProviderFamily, ProviderProfile};
use crate::types::{CanonicalRequest, CanonicalResponse, StreamEvent};

/// Output budget used when the client does not set `max_tokens`
pub const DEFAULT_MAX_TOKENS: u32 = 4096;

/// Provider-native request ready to send
#[derive(Debug, Clone, PartialEq)]
pub struct WireRequest {
    /// Path appended to the provider base URL
    pub path: String,
    /// JSON body
    pub body: Value,
    /// Whether the provider will answer with an event stream
    pub stream: bool,
}

/// Codec for one provider family
pub trait Transformer: Send + Sync {
    /// Family name used in logs and events
    fn name(&self) -> &'static str;

    /// Translate a canonical request into the provider's wire format
    fn encode_request(
        &self,
        request: &CanonicalRequest,
        model: &str,
        profile: &ProviderProfile,
    ) -> Result<WireRequest, LlmError>;

    /// Translate a complete provider response body
    fn decode_response(&self, body: &[u8]) -> Result<CanonicalResponse, LlmError>;

    /// Translate one SSE data payload into zero or more canonical events
    fn decode_stream_chunk(&self, chunk: &str, state: &mut StreamState) -> Result<Vec<StreamEvent>, LlmError>;

    /// Events owed when the provider stream ends without an explicit terminator
    fn finish_stream(&self, state: &mut StreamState) -> Vec<StreamEvent> {
        state.stop()
    }
}

/// Transformers indexed by provider family
#[derive(Clone)]
pub struct TransformerSet {
    openai: Arc<dyn Transformer>,
    deepseek: Arc<dyn Transformer>,
    gemini: Arc<dyn Transformer>,
    passthrough: Arc<dyn Transformer>,
}

impl Default for TransformerSet {
    fn default() -> Self {
        Self {
            openai: Arc::new(OpenAiTransformer),
            deepseek: Arc::new(DeepSeekTransformer),
            gemini: Arc::new(GeminiTransformer),
            passthrough: Arc::new(PassthroughTransformer),
        }
    }
}

impl TransformerSet {
    /// Codec for a provider family
    pub fn for_family(&self, family: ProviderFamily) -> Arc<dyn Transformer> {
        let transformer = match family {
            ProviderFamily::OpenAi => &self.openai,
            ProviderFamily::DeepSeek => &self.deepseek,
            ProviderFamily::Gemini => &self.gemini,
            ProviderFamily::Passthrough => &self.passthrough,
        };
        Arc::clone(transformer)
    }
}

/// Fail fast when tools are requested from a provider without tool support
pub(crate) fn ensure_tool_support(request: &CanonicalRequest, profile: &ProviderProfile) -> Result<(), LlmError> {
    if request.has_tools() && !profile.supports_tools {
        return Err(LlmError::CapabilityUnsupported {
            provider: profile.name.clone(),
            capability: "tools",
        });
    }
    Ok(())
}

/// Reject sampling parameters outside the provider's accepted ranges
///
/// Parameters the profile strips are never sent, so they are not checked.
pub(crate) fn ensure_parameter_ranges(request: &CanonicalRequest, profile: &ProviderProfile) -> Result<(), LlmError> {
    for limit in profile.parameter_limits {
        if profile.parameters_to_strip.contains(limit.name) {
            continue;
        }

        let Some(value) = parameter_value(request, limit.name) else {
            continue;
        };

        if !limit.contains(value) {
            return Err(LlmError::InvalidRequest(format!(
                "{} must be between {} and {} for provider '{}', got {value}",
                limit.name, limit.min, limit.max, profile.name
            )));
        }
    }
    Ok(())
}

fn parameter_value(request: &CanonicalRequest, name: &str) -> Option<f64> {
    match name {
        "temperature" => request.temperature,
        "top_p" => request.top_p,
        "top_k" => request.top_k.map(f64::from),
        other => request.extra.get(other).and_then(Value::as_f64),
    }
}

/// Requested output budget clamped to `cap`
pub(crate) fn clamp_max_tokens(request: &CanonicalRequest, cap: u32) -> u32 {
    request.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS).min(cap)
}

/// Merge provider-specific extras, then apply the profile's strip and rename rules
///
/// Extras never override fields the encoder produced.
pub(crate) fn finalize_body(mut body: Value, request: &CanonicalRequest, profile: &ProviderProfile) -> Value {
    let Some(object) = body.as_object_mut() else {
        return body;
    };

    for (key, value) in &request.extra {
        object.entry(key.clone()).or_insert_with(|| value.clone());
    }

    apply_parameter_rules(object, profile);
    body
}

fn apply_parameter_rules(object: &mut Map<String, Value>, profile: &ProviderProfile) {
    let stripped: Vec<&str> = profile
        .parameters_to_strip
        .iter()
        .filter(|key| object.remove(key.as_str()).is_some())
        .map(String::as_str)
        .collect();

    if !stripped.is_empty() {
        tracing::debug!(provider = %profile.name, ?stripped, "stripped unsupported parameters");
    }

    for (from, to) in &profile.parameter_renames {
        if let Some(value) = object.remove(from) {
            object.insert(to.clone(), value);
        }
    }
}

/// Parse a complete response body, mapping failures to an upstream error
pub(crate) fn parse_body<T: serde::de::DeserializeOwned>(body: &[u8], provider: &str) -> Result<T, LlmError> {
    serde_json::from_slice(body).map_err(|e| LlmError::upstream(provider, format!("malformed response body: {e}")))
}

/// Response id for providers that do not send one
pub(crate) fn generated_message_id() -> String {
    format!("msg_{}", uuid::Uuid::new_v4().simple())
}

/// Tool-call id for providers that do not send one
pub(crate) fn generated_tool_id() -> String {
    format!("toolu_{}", uuid::Uuid::new_v4().simple())
}

#[cfg(test)]
pub(crate) mod fixtures {
    use url::Url;

    use crate::profile::{ProviderFamily, ProviderProfile};
    use crate::types::CanonicalRequest;

    pub fn profile(family: ProviderFamily) -> ProviderProfile {
        ProviderProfile::builtin(
            family.as_str(),
            family,
            Url::parse("http://127.0.0.1:1/v1").unwrap(),
        )
    }

    pub fn request(value: serde_json::Value) -> CanonicalRequest {
        let request: CanonicalRequest = serde_json::from_value(value).unwrap();
        request.validate().unwrap();
        request
    }

    /// A conversation exercising every block kind encoders translate
    pub fn tool_conversation() -> CanonicalRequest {
        request(serde_json::json!({
            "model": "claude-sonnet-4",
            "system": "You are terse.",
            "max_tokens": 512,
            "temperature": 0.2,
            "top_k": 40,
            "stop_sequences": ["END"],
            "tools": [{
                "name": "get_weather",
                "description": "Current weather",
                "input_schema": {
                    "$schema": "http://json-schema.org/draft-07/schema#",
                    "type": "object",
                    "additionalProperties": false,
                    "properties": {"city": {"type": "string", "additionalProperties": false}},
                    "required": ["city"]
                }
            }],
            "tool_choice": {"type": "auto"},
            "messages": [
                {"role": "user", "content": "Weather in Paris?"},
                {"role": "assistant", "content": [
                    {"type": "text", "text": "Checking."},
                    {"type": "tool_use", "id": "toolu_1", "name": "get_weather", "input": {"city": "Paris"}}
                ]},
                {"role": "user", "content": [
                    {"type": "tool_result", "tool_use_id": "toolu_1", "content": "18C and sunny"},
                    {"type": "text", "text": "Echo: sunny in Paris"}
                ]}
            ]
        }))
    }
}
