use super::openai::{decode_chat, decode_chat_chunk, encode_chat};
use super::{StreamState, Transformer, WireRequest};
use crate::error::LlmError;
use crate::profile::ProviderProfile;
use crate::types::{CanonicalRequest, CanonicalResponse, StreamEvent};

/// Output ceiling `DeepSeek` enforces regardless of configuration
pub const DEEPSEEK_MAX_OUTPUT_TOKENS: u32 = 8192;

/// `DeepSeek` codec: chat completions with a hard output cap and reasoning blocks
#[derive(Debug, Clone, Copy, Default)]
pub struct DeepSeekTransformer;

impl Transformer for DeepSeekTransformer {
    fn name(&self) -> &'static str {
        "deepseek"
    }

    fn encode_request(
        &self,
        request: &CanonicalRequest,
        model: &str,
        profile: &ProviderProfile,
    ) -> Result<WireRequest, LlmError> {
        let cap = profile.max_tokens_hard_cap.min(DEEPSEEK_MAX_OUTPUT_TOKENS);
        encode_chat(request, model, profile, cap)
    }

    fn decode_response(&self, body: &[u8]) -> Result<CanonicalResponse, LlmError> {
        decode_chat(body, self.name())
    }

    fn decode_stream_chunk(&self, chunk: &str, state: &mut StreamState) -> Result<Vec<StreamEvent>, LlmError> {
        decode_chat_chunk(chunk, state, self.name())
    }
}
