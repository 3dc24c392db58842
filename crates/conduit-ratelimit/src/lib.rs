//! Per-client request rate limiting for Conduit

#![allow(clippy::missing_errors_doc, clippy::must_use_candidate)]

mod error;
mod memory;

use std::time::Duration;

pub use error::RateLimitError;
pub use memory::MemoryLimiter;

use conduit_config::RateLimitConfig;

/// Create a per-client limiter from configuration
pub fn create_limiter(config: &RateLimitConfig) -> Result<MemoryLimiter, RateLimitError> {
    MemoryLimiter::new(config.requests, parse_duration(&config.window)?)
}

fn parse_duration(s: &str) -> Result<Duration, RateLimitError> {
    duration_str::parse(s).map_err(|e| RateLimitError::Config(format!("invalid duration '{s}': {e}")))
}

#[cfg(test)]
mod tests {
    use conduit_core::RateLimiter;

    use super::*;

    #[test]
    fn builds_from_config() {
        let config = RateLimitConfig {
            requests: 2,
            window: "1m".to_owned(),
        };

        let limiter = create_limiter(&config).unwrap();
        assert!(limiter.allow("client"));
        assert!(limiter.allow("client"));
        assert!(!limiter.allow("client"));
        assert_eq!(limiter.retry_after(), Duration::from_secs(30));
    }

    #[test]
    fn rejects_bad_window() {
        let config = RateLimitConfig {
            requests: 2,
            window: "soon".to_owned(),
        };

        assert!(matches!(create_limiter(&config), Err(RateLimitError::Config(_))));
    }
}
