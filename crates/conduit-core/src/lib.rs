//! Shared primitives for the Conduit gateway
//!
//! Holds the pieces every other crate agrees on: how a domain error becomes
//! an HTTP response, the per-request context, and the collaborator traits the
//! pipeline consumes for rate limiting and provider health.

#![allow(clippy::must_use_candidate)]

mod collaborators;
mod context;
mod error;

pub use collaborators::{AllowAll, HealthReporter, NeverDegraded, RateLimiter};
pub use context::{ClientIdentity, ROUTE_HINT_HEADER, RequestContext};
pub use error::HttpError;
