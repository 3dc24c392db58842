use serde::Deserialize;

/// Per-client request rate limit
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RateLimitConfig {
    /// Maximum requests per window for one client
    pub requests: u32,
    /// Window duration (e.g. "1m", "1h")
    pub window: String,
}
