use serde_json::Value;

use super::{
    StreamState, Transformer, WireRequest, clamp_max_tokens, ensure_parameter_ranges, ensure_tool_support,
    finalize_body, parse_body,
};
use crate::error::LlmError;
use crate::profile::ProviderProfile;
use crate::types::{CanonicalRequest, CanonicalResponse, StreamEvent};

const MESSAGES_PATH: &str = "/messages";

/// Codec for providers that already speak the canonical format
#[derive(Debug, Clone, Copy, Default)]
pub struct PassthroughTransformer;

impl Transformer for PassthroughTransformer {
    fn name(&self) -> &'static str {
        "passthrough"
    }

    fn encode_request(
        &self,
        request: &CanonicalRequest,
        model: &str,
        profile: &ProviderProfile,
    ) -> Result<WireRequest, LlmError> {
        ensure_tool_support(request, profile)?;
        ensure_parameter_ranges(request, profile)?;

        // Blocks and tool fields the canonical types do not model survive only in the source
        let mut body = match &request.source {
            Some(source) => Value::Object(source.clone()),
            None => serde_json::to_value(request).map_err(|e| LlmError::InvalidRequest(e.to_string()))?,
        };

        if let Some(object) = body.as_object_mut() {
            object.insert("model".to_owned(), Value::from(model));
            object.insert(
                "max_tokens".to_owned(),
                Value::from(clamp_max_tokens(request, profile.max_tokens_hard_cap)),
            );
        }

        Ok(WireRequest {
            path: MESSAGES_PATH.to_owned(),
            body: finalize_body(body, request, profile),
            stream: request.stream,
        })
    }

    fn decode_response(&self, body: &[u8]) -> Result<CanonicalResponse, LlmError> {
        parse_body(body, self.name())
    }

    fn decode_stream_chunk(&self, chunk: &str, state: &mut StreamState) -> Result<Vec<StreamEvent>, LlmError> {
        Ok(state.parse::<StreamEvent>(chunk, self.name())?.into_iter().collect())
    }
}
