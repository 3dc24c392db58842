use std::num::NonZeroU32;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use conduit_core::RateLimiter;
use governor::clock::{Clock, DefaultClock};
use governor::state::keyed::DashMapStateStore;
use governor::{Quota, RateLimiter as Governor};

use crate::error::RateLimitError;

type KeyedLimiter = Governor<String, DashMapStateStore<String>, DefaultClock>;

/// Checks between sweeps of idle client buckets
const PRUNE_INTERVAL: u64 = 1024;

/// In-memory per-client rate limiter backed by governor
///
/// Each client gets a bucket of `max_requests` that refills evenly over the
/// window. Client keys come from request headers, so buckets that have fully
/// refilled are dropped every few checks to keep the store bounded.
pub struct MemoryLimiter {
    limiter: KeyedLimiter,
    clock: DefaultClock,
    period: Duration,
    checks: AtomicU64,
    prune_interval: u64,
}

impl MemoryLimiter {
    /// Create a limiter admitting `max_requests` per `window` for each client
    pub fn new(max_requests: u32, window: Duration) -> Result<Self, RateLimitError> {
        if window.is_zero() {
            return Err(RateLimitError::Config("rate limit window must be > 0".to_owned()));
        }

        let burst = NonZeroU32::new(max_requests)
            .ok_or_else(|| RateLimitError::Config("requests must be > 0".to_owned()))?;
        let period = window / max_requests;

        let quota = Quota::with_period(period)
            .ok_or_else(|| RateLimitError::Config("invalid rate limit period".to_owned()))?
            .allow_burst(burst);

        Ok(Self {
            limiter: Governor::dashmap(quota),
            clock: DefaultClock::default(),
            period,
            checks: AtomicU64::new(0),
            prune_interval: PRUNE_INTERVAL,
        })
    }

    /// Sweep idle buckets every `checks` checks instead of the default
    pub fn with_prune_interval(mut self, checks: u64) -> Self {
        self.prune_interval = checks.max(1);
        self
    }

    /// Number of clients with a bucket in memory
    pub fn tracked_clients(&self) -> usize {
        self.limiter.len()
    }

    /// Drop buckets of clients that could not be limited anymore
    pub fn prune(&self) {
        let before = self.limiter.len();
        self.limiter.retain_recent();
        self.limiter.shrink_to_fit();
        tracing::trace!(before, after = self.limiter.len(), "pruned idle rate limit buckets");
    }

    /// Check if a request is allowed for the given client
    pub fn check(&self, key: &str) -> Result<(), RateLimitError> {
        let seen = self.checks.fetch_add(1, Ordering::Relaxed) + 1;
        if seen % self.prune_interval == 0 {
            self.prune();
        }

        self.limiter
            .check_key(&key.to_owned())
            .map_err(|not_until| RateLimitError::Exceeded {
                retry_after: not_until.wait_time_from(self.clock.now()),
            })
    }
}

impl RateLimiter for MemoryLimiter {
    fn allow(&self, client_id: &str) -> bool {
        match self.check(client_id) {
            Ok(()) => true,
            Err(e) => {
                tracing::debug!(client_id, error = %e, "request rate limited");
                false
            }
        }
    }

    /// One refill period, the wait after which a denied client regains a request
    fn retry_after(&self) -> Duration {
        self.period
    }
}
