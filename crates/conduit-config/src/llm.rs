use std::collections::BTreeMap;

use indexmap::IndexMap;
use secrecy::SecretString;
use serde::Deserialize;
use url::Url;

/// Alias every configuration must define
pub const DEFAULT_ROUTE: &str = "default";

/// Providers, route aliases and pipeline tuning
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LlmConfig {
    /// Provider configurations keyed by name, in declaration order
    #[serde(default)]
    pub providers: IndexMap<String, ProviderConfig>,
    /// Route aliases (`default`, `background`, `think`, `longContext`, ...)
    #[serde(default)]
    pub routes: IndexMap<String, RouteConfig>,
    /// Routing rule tuning
    #[serde(default)]
    pub routing: RoutingConfig,
    /// Retry policy for transient provider failures
    #[serde(default)]
    pub retry: RetryConfig,
    /// Circuit breaker feeding the health signal
    #[serde(default)]
    pub circuit_breaker: CircuitBreakerConfig,
}

/// Configuration for a single upstream provider
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProviderConfig {
    /// Wire format family
    #[serde(rename = "type")]
    pub provider_type: ProviderType,
    /// API key for authentication
    #[serde(default)]
    pub api_key: Option<SecretString>,
    /// Base URL override
    #[serde(default)]
    pub base_url: Option<Url>,
    /// Request timeout (e.g. "30s", "2m")
    #[serde(default = "default_timeout")]
    pub timeout: String,
    /// Output token ceiling, clamped to the family's own ceiling
    #[serde(default)]
    pub max_tokens: Option<u32>,
    /// Prompt plus output budget
    #[serde(default)]
    pub context_window: Option<u32>,
    /// Override tool-calling support
    #[serde(default)]
    pub supports_tools: Option<bool>,
    /// Override streaming support
    #[serde(default)]
    pub supports_streaming: Option<bool>,
    /// Request parameters removed before sending
    #[serde(default)]
    pub strip_parameters: Vec<String>,
    /// Request parameters renamed before sending
    #[serde(default)]
    pub rename_parameters: BTreeMap<String, String>,
}

/// Supported provider wire formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderType {
    /// OpenAI-compatible chat completions
    Openai,
    /// Google Gemini `generateContent`
    Gemini,
    /// DeepSeek (OpenAI-compatible with a hard output cap)
    Deepseek,
    /// Aggregators that already speak the Messages format
    Passthrough,
}

/// A named route alias
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RouteConfig {
    /// Provider name from `[llm.providers]`
    pub provider: String,
    /// Model identifier sent upstream
    pub model: String,
    /// Substitutes tried in order when the provider is degraded
    #[serde(default)]
    pub fallbacks: Vec<RouteTarget>,
}

/// Provider and model pair
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RouteTarget {
    /// Provider name from `[llm.providers]`
    pub provider: String,
    /// Model identifier sent upstream
    pub model: String,
}

/// Routing rule tuning
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RoutingConfig {
    /// Estimated token count above which `longContext` is used
    pub long_context_threshold: u32,
    /// Regex matched against the requested model to pick `background`
    pub background_model_pattern: String,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            long_context_threshold: 60_000,
            background_model_pattern: "haiku".to_owned(),
        }
    }
}

/// Retry policy for transient provider failures
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetryConfig {
    /// Total attempts including the first one
    pub max_attempts: u32,
    /// Delay before the first retry
    pub initial_delay: String,
    /// Upper bound for any single delay
    pub max_delay: String,
    /// Growth factor between consecutive delays
    pub multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: "1s".to_owned(),
            max_delay: "30s".to_owned(),
            multiplier: 2.0,
        }
    }
}

/// Circuit breaker thresholds
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CircuitBreakerConfig {
    /// Errors within the window that open the circuit
    #[serde(default = "default_error_threshold")]
    pub error_threshold: u32,
    /// Length of the error counting window
    #[serde(default = "default_window_seconds")]
    pub window_seconds: u64,
    /// How long an open circuit waits before letting a trial request through
    #[serde(default = "default_recovery_seconds")]
    pub recovery_seconds: u64,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            error_threshold: default_error_threshold(),
            window_seconds: default_window_seconds(),
            recovery_seconds: default_recovery_seconds(),
        }
    }
}

fn default_timeout() -> String {
    "30s".to_owned()
}

const fn default_error_threshold() -> u32 {
    5
}

const fn default_window_seconds() -> u64 {
    60
}

const fn default_recovery_seconds() -> u64 {
    30
}
