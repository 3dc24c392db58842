//! Outbound HTTP to providers
//!
//! Sends an encoded [`WireRequest`] with the family's authentication, retries
//! transient failures with jittered exponential backoff, and maps every
//! provider outcome onto [`LlmError`].

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use conduit_config::{RetryConfig, parse_duration};
use conduit_core::RequestContext;
use eventsource_stream::Eventsource;
use futures_util::StreamExt;
use http::{HeaderMap, StatusCode};
use rand::Rng;
use reqwest::Client;
use secrecy::ExposeSecret;

use crate::error::LlmError;
use crate::profile::{ProviderFamily, ProviderProfile};
use crate::protocol::gemini::GeminiErrorResponse;
use crate::protocol::openai::ErrorEnvelope;
use crate::relay::FrameStream;
use crate::transform::WireRequest;

/// `anthropic-version` sent to pass-through providers
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Wait applied to a 429 without a usable `Retry-After`
const DEFAULT_RATE_LIMIT_WAIT: Duration = Duration::from_secs(1);

/// Longest provider error body quoted back to the client
const MAX_ERROR_MESSAGE_LEN: usize = 512;

/// Provider answer
pub enum ProviderReply {
    /// Full response body
    Complete(Bytes),
    /// SSE data payloads, read lazily
    Stream(FrameStream),
}

impl std::fmt::Debug for ProviderReply {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Complete(body) => f.debug_tuple("Complete").field(&body.len()).finish(),
            Self::Stream(_) => f.write_str("Stream"),
        }
    }
}

/// Transport to a provider
#[async_trait]
pub trait ProviderClient: Send + Sync {
    /// Send one encoded request, retrying transient failures
    async fn send(
        &self,
        ctx: &RequestContext,
        request: &WireRequest,
        profile: &ProviderProfile,
    ) -> Result<ProviderReply, LlmError>;
}

/// Bounded exponential backoff with full jitter
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts including the first one
    pub max_attempts: u32,
    /// Ceiling of the first delay
    pub initial_delay: Duration,
    /// Ceiling of any delay
    pub max_delay: Duration,
    /// Growth factor of the ceiling
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Build from the `[llm.retry]` section
    pub fn from_config(config: &RetryConfig) -> anyhow::Result<Self> {
        Ok(Self {
            max_attempts: config.max_attempts.max(1),
            initial_delay: parse_duration(&config.initial_delay)?,
            max_delay: parse_duration(&config.max_delay)?,
            multiplier: config.multiplier,
        })
    }

    /// Policy that never retries
    pub const fn none() -> Self {
        Self {
            max_attempts: 1,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            multiplier: 1.0,
        }
    }

    /// Upper bound of the delay after the given failed attempt (1-based)
    pub fn ceiling(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt.saturating_sub(1)).unwrap_or(i32::MAX);
        let secs = self.initial_delay.as_secs_f64() * self.multiplier.powi(exponent);

        Duration::try_from_secs_f64(secs).map_or(self.max_delay, |delay| delay.min(self.max_delay))
    }

    /// Randomized delay in `[0, ceiling]`
    pub fn backoff(&self, attempt: u32) -> Duration {
        let ceiling = self.ceiling(attempt).as_secs_f64();
        let secs = rand::rng().random_range(0.0..=ceiling);

        Duration::try_from_secs_f64(secs).unwrap_or(Duration::ZERO)
    }
}

/// reqwest-backed provider client
#[derive(Debug, Clone)]
pub struct HttpProviderClient {
    client: Client,
    retry: RetryPolicy,
}

impl HttpProviderClient {
    /// Create a client with the given retry policy
    pub fn new(retry: RetryPolicy) -> Self {
        Self {
            client: Client::new(),
            retry,
        }
    }

    /// Create a client from the `[llm.retry]` section
    pub fn from_config(config: &RetryConfig) -> anyhow::Result<Self> {
        Ok(Self::new(RetryPolicy::from_config(config)?))
    }

    async fn attempt(
        &self,
        url: &str,
        request: &WireRequest,
        profile: &ProviderProfile,
    ) -> Result<ProviderReply, Failure> {
        let builder = authorize(self.client.post(url).json(&request.body), profile);

        let exchange = async move {
            let response = builder
                .send()
                .await
                .map_err(|e| transport_failure(&profile.name, &e))?;

            let status = response.status();
            if !status.is_success() {
                let retry_after = retry_after(response.headers());
                let body = response.text().await.unwrap_or_default();
                return Err(status_failure(&profile.name, status, retry_after, &body));
            }

            if request.stream {
                return Ok(ProviderReply::Stream(frames(response, profile.name.clone())));
            }

            let body = response
                .bytes()
                .await
                .map_err(|e| transport_failure(&profile.name, &e))?;
            Ok::<_, Failure>(ProviderReply::Complete(body))
        };

        // Streams only wait for headers here, the body is read by the relay
        match tokio::time::timeout(profile.timeout, exchange).await {
            Ok(result) => result,
            Err(_) => Err(Failure::fatal(LlmError::upstream(
                profile.name.clone(),
                format!("no response within {}s", profile.timeout.as_secs_f64()),
            ))),
        }
    }
}

impl Default for HttpProviderClient {
    fn default() -> Self {
        Self::new(RetryPolicy::default())
    }
}

#[async_trait]
impl ProviderClient for HttpProviderClient {
    async fn send(
        &self,
        ctx: &RequestContext,
        request: &WireRequest,
        profile: &ProviderProfile,
    ) -> Result<ProviderReply, LlmError> {
        let url = endpoint(profile, &request.path);
        let mut attempt = 1;

        loop {
            let outcome = tokio::select! {
                biased;
                () = ctx.cancellation.cancelled() => return Err(LlmError::Canceled),
                outcome = self.attempt(&url, request, profile) => outcome,
            };

            let failure = match outcome {
                Ok(reply) => return Ok(reply),
                Err(failure) => failure,
            };

            if !failure.retry || attempt >= self.retry.max_attempts {
                return Err(failure.error);
            }

            let delay = self.retry.backoff(attempt);
            tracing::warn!(
                provider = %profile.name,
                attempt,
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                error = %failure.error,
                "retrying provider request"
            );

            tokio::select! {
                biased;
                () = ctx.cancellation.cancelled() => return Err(LlmError::Canceled),
                () = tokio::time::sleep(delay) => {}
            }
            attempt += 1;
        }
    }
}

/// Failed attempt and whether another one may help
#[derive(Debug)]
struct Failure {
    error: LlmError,
    retry: bool,
}

impl Failure {
    /// Retry exactly when the error kind is transient
    fn classify(error: LlmError) -> Self {
        let retry = error.is_retryable();
        Self { error, retry }
    }

    /// Never retry, whatever the error kind
    const fn fatal(error: LlmError) -> Self {
        Self { error, retry: false }
    }
}

fn endpoint(profile: &ProviderProfile, path: &str) -> String {
    let base = profile.base_url.as_str().trim_end_matches('/');
    format!("{base}{path}")
}

fn authorize(builder: reqwest::RequestBuilder, profile: &ProviderProfile) -> reqwest::RequestBuilder {
    let Some(key) = &profile.api_key else {
        return builder;
    };
    let key = key.expose_secret();

    match profile.family {
        ProviderFamily::OpenAi | ProviderFamily::DeepSeek => builder.bearer_auth(key),
        ProviderFamily::Gemini => builder.header("x-goog-api-key", key),
        ProviderFamily::Passthrough => builder
            .header("x-api-key", key)
            .header("anthropic-version", ANTHROPIC_VERSION),
    }
}

fn frames(response: reqwest::Response, provider: String) -> FrameStream {
    Box::pin(response.bytes_stream().eventsource().map(move |event| match event {
        Ok(event) => Ok(event.data),
        Err(e) => Err(LlmError::upstream(provider.clone(), format!("stream interrupted: {e}"))),
    }))
}

fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(http::header::RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

fn status_failure(provider: &str, status: StatusCode, retry_after: Option<Duration>, body: &str) -> Failure {
    let message = error_message(body);
    tracing::warn!(provider, status = %status, message = %message, "provider returned error");

    match status.as_u16() {
        429 => Failure::fatal(LlmError::RateLimited {
            retry_after: retry_after.unwrap_or(DEFAULT_RATE_LIMIT_WAIT),
        }),
        413 => Failure::fatal(LlmError::RequestTooLarge {
            estimated: 0,
            limit: 0,
        }),
        400 | 404 | 422 => Failure::fatal(LlmError::InvalidRequest(message)),
        code => {
            let error = LlmError::Upstream {
                provider: provider.to_owned(),
                status: Some(code),
                message,
            };
            // A server asking to be left alone for a while is not retried inline
            if retry_after.is_some() {
                Failure::fatal(error)
            } else {
                Failure::classify(error)
            }
        }
    }
}

fn transport_failure(provider: &str, error: &reqwest::Error) -> Failure {
    if error.is_timeout() {
        return Failure::fatal(LlmError::upstream(provider, format!("timed out: {error}")));
    }

    if error.is_connect() {
        tracing::warn!(provider, error = %error, "provider unreachable");
        return Failure::classify(LlmError::ProviderUnavailable {
            target: provider.to_owned(),
        });
    }

    if is_connection_reset(error) {
        return Failure::classify(LlmError::upstream(provider, format!("connection reset: {error}")));
    }

    Failure::fatal(LlmError::upstream(provider, error.to_string()))
}

fn is_connection_reset(error: &reqwest::Error) -> bool {
    let mut source = std::error::Error::source(error);
    while let Some(inner) = source {
        if let Some(io) = inner.downcast_ref::<std::io::Error>() {
            return matches!(
                io.kind(),
                std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::BrokenPipe
                    | std::io::ErrorKind::UnexpectedEof
            );
        }
        source = inner.source();
    }
    false
}

/// Provider error message from an error body
///
/// OpenAI, Gemini and Anthropic all nest the message under `error.message`.
/// Gemini occasionally wraps its error in an array.
fn error_message(body: &str) -> String {
    if let Ok(response) = serde_json::from_str::<ErrorEnvelope>(body) {
        return response.error.message;
    }

    if let Ok(responses) = serde_json::from_str::<Vec<GeminiErrorResponse>>(body)
        && let Some(response) = responses.into_iter().next()
    {
        return response.error.message;
    }

    if let Ok(value) = serde_json::from_str::<serde_json::Value>(body)
        && let Some(message) = value.get("message").and_then(serde_json::Value::as_str)
    {
        return message.to_owned();
    }

    let trimmed = body.trim();
    if trimmed.is_empty() {
        return "empty error body".to_owned();
    }

    match trimmed.char_indices().nth(MAX_ERROR_MESSAGE_LEN) {
        Some((cut, _)) => format!("{}...", &trimmed[..cut]),
        None => trimmed.to_owned(),
    }
}
