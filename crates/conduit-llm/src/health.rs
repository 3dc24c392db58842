//! Circuit-breaking health tracker
//!
//! Feeds the router's degraded signal: a provider whose circuit is open is
//! skipped in favor of its route's fallbacks until the recovery period ends.

use std::time::{Duration, Instant};

use conduit_config::CircuitBreakerConfig;
use conduit_core::HealthReporter;
use dashmap::DashMap;

/// Circuit breaker state for a provider
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Requests flow through
    Closed,
    /// Provider is failing, requests are diverted
    Open,
    /// Recovery period elapsed, one trial request goes through
    HalfOpen,
}

#[derive(Debug)]
struct Breaker {
    window_start: Instant,
    errors: u32,
    tripped_at: Option<Instant>,
    trial_started: Option<Instant>,
}

/// Per-provider circuit breakers
#[derive(Debug)]
pub struct ProviderHealthTracker {
    breakers: DashMap<String, Breaker>,
    threshold: u32,
    window: Duration,
    recovery: Duration,
}

impl ProviderHealthTracker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            breakers: DashMap::new(),
            threshold: config.error_threshold.max(1),
            window: Duration::from_secs(config.window_seconds),
            recovery: Duration::from_secs(config.recovery_seconds),
        }
    }

    pub fn state(&self, provider: &str) -> CircuitState {
        let tripped_at = self.breakers.get(provider).and_then(|breaker| breaker.tripped_at);

        match tripped_at {
            None => CircuitState::Closed,
            Some(at) if at.elapsed() >= self.recovery => CircuitState::HalfOpen,
            Some(_) => CircuitState::Open,
        }
    }

    /// Whether a request may go to the provider
    ///
    /// A half-open circuit admits a single trial request. The slot frees up
    /// again after another recovery period, so a trial that never reports
    /// back cannot hold the circuit open forever.
    pub fn admit(&self, provider: &str) -> bool {
        let Some(mut breaker) = self.breakers.get_mut(provider) else {
            return true;
        };
        let Some(tripped_at) = breaker.tripped_at else {
            return true;
        };

        let now = Instant::now();
        if now.duration_since(tripped_at) < self.recovery {
            return false;
        }
        if breaker
            .trial_started
            .is_some_and(|started| now.duration_since(started) < self.recovery)
        {
            return false;
        }

        breaker.trial_started = Some(now);
        drop(breaker);
        tracing::info!(provider, "circuit half-open, sending trial request");
        true
    }

    /// Close the circuit and forget counted errors
    pub fn record_success(&self, provider: &str) {
        // Providers that never failed have no breaker to reset
        if let Some(mut breaker) = self.breakers.get_mut(provider) {
            breaker.trial_started = None;
            breaker.errors = 0;
            breaker.window_start = Instant::now();
            if breaker.tripped_at.take().is_some() {
                drop(breaker);
                tracing::info!(provider, "circuit closed, provider recovered");
            }
        }
    }

    /// Count an error, tripping the circuit at the threshold
    ///
    /// A failed trial of a half-open circuit trips it again right away.
    pub fn record_failure(&self, provider: &str) {
        let now = Instant::now();
        let mut breaker = self.breakers.entry(provider.to_owned()).or_insert_with(|| Breaker {
            window_start: now,
            errors: 0,
            tripped_at: None,
            trial_started: None,
        });

        if now.duration_since(breaker.window_start) >= self.window {
            breaker.window_start = now;
            breaker.errors = 0;
        }
        breaker.errors += 1;

        let errors = breaker.errors;
        let half_open = breaker.tripped_at.is_some();

        if errors >= self.threshold || half_open {
            breaker.tripped_at = Some(now);
            breaker.trial_started = None;
            drop(breaker);
            tracing::warn!(provider, errors, "circuit opened, diverting traffic");
        }
    }
}

impl HealthReporter for ProviderHealthTracker {
    fn is_degraded(&self, provider: &str) -> bool {
        !self.admit(provider)
    }

    fn report_degraded(&self, provider: &str, error: &(dyn std::error::Error + Send + Sync)) {
        tracing::debug!(provider, error = %error, "provider failure recorded");
        self.record_failure(provider);
    }

    fn report_recovered(&self, provider: &str) {
        self.record_success(provider);
    }
}
