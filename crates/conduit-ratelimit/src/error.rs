use std::time::Duration;

use thiserror::Error;

/// Rate limiting errors
#[derive(Debug, Error)]
pub enum RateLimitError {
    /// Configuration error
    #[error("rate limit configuration error: {0}")]
    Config(String),

    /// Rate limit exceeded
    #[error("rate limit exceeded, retry in {}s", retry_after.as_secs())]
    Exceeded {
        /// Time until the next request is admitted
        retry_after: Duration,
    },
}
