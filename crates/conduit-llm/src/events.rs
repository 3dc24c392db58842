//! Structured pipeline events
//!
//! Emitted as `tracing` events on the `conduit::events` target so they can be
//! filtered independently from ordinary logs. Latency and route decisions are
//! mirrored onto OpenTelemetry instruments.

use std::time::Duration;

use conduit_core::HttpError;
use conduit_telemetry::metrics;

use crate::error::LlmError;
use crate::router::RouteDecision;

/// Codec stage that failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransformStage {
    /// Building the provider request
    Encode,
    /// Reading a complete provider response
    Decode,
    /// Reading one frame of a provider stream
    StreamChunk,
}

impl TransformStage {
    /// Stage name used as the `stage` field
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Encode => "encode",
            Self::Decode => "decode",
            Self::StreamChunk => "stream_chunk",
        }
    }
}

/// Record how a request was routed
pub fn route_decision(decision: &RouteDecision, estimated_tokens: u32) {
    tracing::info!(
        target: "conduit::events",
        event = "route_decision",
        alias = %decision.alias,
        provider = %decision.provider,
        model = %decision.model,
        reason = decision.reason.as_str(),
        estimated_tokens,
        "route resolved"
    );

    metrics::gateway().count_route_decision(&decision.alias, &decision.provider, decision.reason.as_str());
}

/// Record a codec failure
pub fn transform_error(provider: &str, stage: TransformStage, error: &LlmError) {
    tracing::warn!(
        target: "conduit::events",
        event = "transform_error",
        provider,
        stage = stage.as_str(),
        error = %error,
        "transform failed"
    );
}

/// Record one upstream exchange
///
/// For streams the latency is time to response headers.
pub fn provider_latency(
    provider: &str,
    model: &str,
    outcome: Result<(), &LlmError>,
    latency: Duration,
    streaming: bool,
) {
    let status = latency_status(outcome);
    let latency_ms = u64::try_from(latency.as_millis()).unwrap_or(u64::MAX);

    tracing::info!(
        target: "conduit::events",
        event = "provider_latency",
        provider,
        model,
        status,
        latency_ms,
        streaming,
        "provider call finished"
    );

    metrics::gateway().record_provider_latency(provider, model, status, streaming, latency);
}

/// Low-cardinality outcome label for latency reporting
fn latency_status(outcome: Result<(), &LlmError>) -> &'static str {
    match outcome {
        Ok(()) => "ok",
        Err(LlmError::Canceled) => "canceled",
        Err(error) => match error.status_code().as_u16() {
            400..=499 => "client_error",
            _ => "error",
        },
    }
}
