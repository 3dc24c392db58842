//! Request pipeline
//!
//! Parse, admit, route, pre-flight, encode, send, relay. Each request loads
//! one configuration snapshot and keeps it for its whole lifetime, so a
//! concurrent reload never changes routing halfway through a request.

use std::sync::Arc;
use std::time::Instant;

use arc_swap::ArcSwap;
use conduit_config::Config;
use conduit_core::{AllowAll, HealthReporter, RateLimiter, RequestContext};

use crate::client::{HttpProviderClient, ProviderClient, ProviderReply};
use crate::error::LlmError;
use crate::estimate::estimate;
use crate::events::{self, TransformStage};
use crate::health::ProviderHealthTracker;
use crate::profile::{ProfileRegistry, ProviderProfile};
use crate::relay::{EventStream, StreamRelay, relay_stream};
use crate::router::{RouteDecision, Router};
use crate::transform::{DEFAULT_MAX_TOKENS, StreamState, TransformerSet};
use crate::types::{CanonicalRequest, CanonicalResponse};

/// Output budget that must remain after the prompt
pub const MIN_OUTPUT_TOKENS: u32 = 16;

/// Routing state swapped atomically on reload
#[derive(Debug)]
pub struct PipelineSnapshot {
    /// Route resolution
    pub router: Router,
    /// Provider capabilities and limits
    pub profiles: ProfileRegistry,
}

impl PipelineSnapshot {
    /// Build a snapshot from configuration
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        Ok(Self {
            router: Router::new(&config.llm)?,
            profiles: ProfileRegistry::from_config(&config.llm)?,
        })
    }
}

/// Result of a handled request
pub enum PipelineOutput {
    /// Complete response
    Complete(CanonicalResponse),
    /// Open canonical event stream
    Stream(EventStream),
}

impl std::fmt::Debug for PipelineOutput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Complete(response) => f.debug_tuple("Complete").field(response).finish(),
            Self::Stream(_) => f.write_str("Stream"),
        }
    }
}

/// Gateway request pipeline
pub struct Pipeline {
    snapshot: ArcSwap<PipelineSnapshot>,
    transformers: TransformerSet,
    client: Arc<dyn ProviderClient>,
    rate_limiter: Arc<dyn RateLimiter>,
    health: Arc<dyn HealthReporter>,
}

impl Pipeline {
    /// Build the pipeline with the default HTTP client and health tracker
    ///
    /// Admission is unrestricted until a limiter is installed with
    /// [`Pipeline::with_rate_limiter`].
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let snapshot = PipelineSnapshot::from_config(config)?;

        Ok(Self {
            snapshot: ArcSwap::from_pointee(snapshot),
            transformers: TransformerSet::default(),
            client: Arc::new(HttpProviderClient::from_config(&config.llm.retry)?),
            rate_limiter: Arc::new(AllowAll),
            health: Arc::new(ProviderHealthTracker::new(config.llm.circuit_breaker.clone())),
        })
    }

    /// Replace the rate limiter
    #[must_use]
    pub fn with_rate_limiter(mut self, rate_limiter: Arc<dyn RateLimiter>) -> Self {
        self.rate_limiter = rate_limiter;
        self
    }

    /// Replace the health reporter
    #[must_use]
    pub fn with_health(mut self, health: Arc<dyn HealthReporter>) -> Self {
        self.health = health;
        self
    }

    /// Replace the provider client
    #[must_use]
    pub fn with_client(mut self, client: Arc<dyn ProviderClient>) -> Self {
        self.client = client;
        self
    }

    /// Swap in routes and profiles from a new configuration
    ///
    /// Requests already in flight finish on the snapshot they started with.
    /// Retry and circuit breaker settings are fixed at startup.
    pub fn reload(&self, config: &Config) -> anyhow::Result<()> {
        let snapshot = PipelineSnapshot::from_config(config)?;
        self.snapshot.store(Arc::new(snapshot));
        tracing::info!(providers = config.llm.providers.len(), routes = config.llm.routes.len(), "pipeline reloaded");
        Ok(())
    }

    /// Current routing snapshot
    pub fn snapshot(&self) -> Arc<PipelineSnapshot> {
        self.snapshot.load_full()
    }

    /// Estimated prompt tokens of a raw request body
    pub fn count_tokens(&self, raw_body: &[u8]) -> Result<u32, LlmError> {
        let request = CanonicalRequest::from_slice(raw_body)?;
        Ok(estimate(&request))
    }

    /// Handle one request end to end
    pub async fn handle(
        &self,
        ctx: &RequestContext,
        raw_body: &[u8],
        client_id: &str,
    ) -> Result<PipelineOutput, LlmError> {
        let mut request = CanonicalRequest::from_slice(raw_body)?;

        if !self.rate_limiter.allow(client_id) {
            tracing::debug!(client_id, "rate limit exceeded");
            return Err(LlmError::RateLimited {
                retry_after: self.rate_limiter.retry_after(),
            });
        }

        let snapshot = self.snapshot.load_full();
        let estimated = estimate(&request);
        let decision = snapshot
            .router
            .resolve_estimated(&request, estimated, ctx.route_hint(), self.health.as_ref())?;
        events::route_decision(&decision, estimated);

        let profile = snapshot
            .profiles
            .get(&decision.provider)
            .cloned()
            .ok_or_else(|| LlmError::ProviderUnavailable {
                target: decision.provider.clone(),
            })?;

        preflight(&mut request, estimated, &profile)?;

        self.dispatch(ctx, &request, &decision, &profile, estimated).await
    }

    async fn dispatch(
        &self,
        ctx: &RequestContext,
        request: &CanonicalRequest,
        decision: &RouteDecision,
        profile: &ProviderProfile,
        estimated: u32,
    ) -> Result<PipelineOutput, LlmError> {
        let transformer = self.transformers.for_family(profile.family);
        let wire = transformer
            .encode_request(request, &decision.model, profile)
            .inspect_err(|e| events::transform_error(&profile.name, TransformStage::Encode, e))?;

        let started = Instant::now();
        let reply = self.client.send(ctx, &wire, profile).await;
        events::provider_latency(
            &profile.name,
            &decision.model,
            reply.as_ref().map(|_| ()),
            started.elapsed(),
            wire.stream,
        );

        match &reply {
            Ok(_) => self.health.report_recovered(&profile.name),
            Err(error) if error.counts_against_provider() => self.health.report_degraded(&profile.name, error),
            Err(_) => {}
        }

        match reply.map_err(|e| with_request_size(e, estimated, profile.context_window))? {
            ProviderReply::Stream(frames) => {
                let relay = StreamRelay::new(profile.name.clone(), decision.model.clone(), estimated);
                Ok(PipelineOutput::Stream(relay_stream(
                    frames,
                    transformer,
                    StreamState::new(),
                    relay,
                    ctx.cancellation.clone(),
                )))
            }
            ProviderReply::Complete(body) => {
                let mut response = transformer.decode_response(&body).map_err(|e| {
                    events::transform_error(&profile.name, TransformStage::Decode, &e);
                    let message = match e {
                        LlmError::Upstream { message, .. } => message,
                        other => other.to_string(),
                    };
                    LlmError::upstream(profile.name.clone(), message)
                })?;

                if response.model.is_empty() {
                    response.model.clone_from(&decision.model);
                }
                Ok(PipelineOutput::Complete(response))
            }
        }
    }
}

/// Capability and budget checks against the resolved provider
///
/// Shrinks `max_tokens` to what the context window leaves after the prompt.
fn preflight(request: &mut CanonicalRequest, estimated: u32, profile: &ProviderProfile) -> Result<(), LlmError> {
    if request.has_tools() && !profile.supports_tools {
        return Err(LlmError::CapabilityUnsupported {
            provider: profile.name.clone(),
            capability: "tools",
        });
    }

    if request.stream && !profile.supports_streaming {
        return Err(LlmError::CapabilityUnsupported {
            provider: profile.name.clone(),
            capability: "streaming",
        });
    }

    if estimated.saturating_add(MIN_OUTPUT_TOKENS) > profile.context_window {
        return Err(LlmError::RequestTooLarge {
            estimated,
            limit: profile.context_window,
        });
    }

    let budget = profile.context_window - estimated;
    if request.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS) > budget {
        tracing::debug!(provider = %profile.name, budget, "reducing max_tokens to fit the context window");
        request.max_tokens = Some(budget);
    }

    Ok(())
}

/// Fill in the sizes of a provider's bare 413
fn with_request_size(error: LlmError, estimated: u32, limit: u32) -> LlmError {
    match error {
        LlmError::RequestTooLarge { estimated: 0, limit: 0 } => LlmError::RequestTooLarge { estimated, limit },
        other => other,
    }
}
