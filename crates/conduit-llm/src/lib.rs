//! LLM gateway pipeline for Conduit
//!
//! Accepts Messages-shaped requests, routes them to a configured provider,
//! re-encodes them into the provider's wire format and relays the answer back
//! in canonical form. Every failure surfaces as one [`LlmError`].

#![allow(clippy::must_use_candidate, clippy::missing_errors_doc)]

pub mod client;
pub mod error;
pub mod estimate;
pub mod events;
#[cfg(feature = "http")]
pub mod handler;
pub mod health;
pub mod pipeline;
pub mod profile;
pub mod protocol;
pub mod relay;
pub mod router;
pub mod transform;
pub mod types;

pub use client::{HttpProviderClient, ProviderClient, ProviderReply, RetryPolicy};
pub use error::LlmError;
pub use estimate::estimate;
#[cfg(feature = "http")]
pub use handler::llm_router;
pub use health::{CircuitState, ProviderHealthTracker};
pub use pipeline::{Pipeline, PipelineOutput, PipelineSnapshot};
pub use profile::{ProfileRegistry, ProviderFamily, ProviderProfile};
pub use relay::{EventStream, FrameStream, RelayState, StreamRelay, relay_stream};
pub use router::{RouteDecision, RouteReason, Router};
pub use transform::{StreamState, Transformer, TransformerSet, WireRequest};
pub use types::{CanonicalRequest, CanonicalResponse, StreamEvent};
