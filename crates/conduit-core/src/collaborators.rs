//! Interfaces the pipeline consumes but does not own

use std::time::Duration;

/// Admission control keyed by client
pub trait RateLimiter: Send + Sync {
    /// Whether the client may issue another request now
    fn allow(&self, client_id: &str) -> bool;

    /// How long a denied client should wait before retrying
    fn retry_after(&self) -> Duration;
}

/// Provider health signal
pub trait HealthReporter: Send + Sync {
    /// Whether the provider should be skipped for this request
    ///
    /// Asked once per routing decision. Implementations may count the call
    /// as admitting a request, as circuit breakers do for recovery trials.
    fn is_degraded(&self, provider: &str) -> bool;

    /// Record a failure attributed to the provider
    fn report_degraded(&self, provider: &str, error: &(dyn std::error::Error + Send + Sync));

    /// Record a successful exchange with the provider
    fn report_recovered(&self, provider: &str) {
        let _ = provider;
    }
}

/// Rate limiter that admits every request
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

impl RateLimiter for AllowAll {
    fn allow(&self, _client_id: &str) -> bool {
        true
    }

    fn retry_after(&self) -> Duration {
        Duration::ZERO
    }
}

/// Health reporter that never marks a provider degraded
#[derive(Debug, Clone, Copy, Default)]
pub struct NeverDegraded;

impl HealthReporter for NeverDegraded {
    fn is_degraded(&self, _provider: &str) -> bool {
        false
    }

    fn report_degraded(&self, _provider: &str, _error: &(dyn std::error::Error + Send + Sync)) {}
}
