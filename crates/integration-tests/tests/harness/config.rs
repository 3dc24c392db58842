//! Programmatic configuration builder for integration tests

use std::collections::BTreeMap;
use std::net::SocketAddr;

use conduit_config::{
    Config, HealthConfig, LlmConfig, ProviderConfig, ProviderType, RateLimitConfig, RetryConfig, RouteConfig,
    RouteTarget, ServerConfig,
};
use secrecy::SecretString;

/// Builder for constructing test configurations
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Create a new builder with minimal defaults
    ///
    /// Retries are off so failing providers answer immediately.
    pub fn new() -> Self {
        Self {
            config: Config {
                server: ServerConfig {
                    listen_address: Some(SocketAddr::from(([127, 0, 0, 1], 0))),
                    health: HealthConfig {
                        enabled: true,
                        ..HealthConfig::default()
                    },
                    ..ServerConfig::default()
                },
                llm: LlmConfig {
                    retry: RetryConfig {
                        max_attempts: 1,
                        ..RetryConfig::default()
                    },
                    ..LlmConfig::default()
                },
                telemetry: None,
            },
        }
    }

    /// Add an OpenAI-compatible provider pointed at a mock backend
    pub fn with_openai_provider(self, name: &str, base_url: &str) -> Self {
        self.with_provider(name, ProviderType::Openai, base_url)
    }

    /// Add a Gemini provider pointed at a mock backend
    pub fn with_gemini_provider(self, name: &str, base_url: &str) -> Self {
        self.with_provider(name, ProviderType::Gemini, base_url)
    }

    /// Add a pass-through provider pointed at a mock backend
    pub fn with_passthrough_provider(self, name: &str, base_url: &str) -> Self {
        self.with_provider(name, ProviderType::Passthrough, base_url)
    }

    fn with_provider(mut self, name: &str, provider_type: ProviderType, base_url: &str) -> Self {
        self.config.llm.providers.insert(
            name.to_owned(),
            ProviderConfig {
                provider_type,
                api_key: Some(SecretString::from("test-key")),
                base_url: Some(base_url.parse().expect("valid URL")),
                timeout: "5s".to_owned(),
                max_tokens: None,
                context_window: None,
                supports_tools: None,
                supports_streaming: None,
                strip_parameters: Vec::new(),
                rename_parameters: BTreeMap::new(),
            },
        );
        self
    }

    /// Adjust a provider added earlier
    pub fn tune_provider(mut self, name: &str, tune: impl FnOnce(&mut ProviderConfig)) -> Self {
        tune(self.config.llm.providers.get_mut(name).expect("provider added before tuning"));
        self
    }

    /// Map a route alias to a provider and model
    pub fn with_route(mut self, alias: &str, provider: &str, model: &str) -> Self {
        self.config.llm.routes.insert(
            alias.to_owned(),
            RouteConfig {
                provider: provider.to_owned(),
                model: model.to_owned(),
                fallbacks: Vec::new(),
            },
        );
        self
    }

    /// Append a fallback to a route added earlier
    pub fn with_fallback(mut self, alias: &str, provider: &str, model: &str) -> Self {
        self.config
            .llm
            .routes
            .get_mut(alias)
            .expect("route added before its fallbacks")
            .fallbacks
            .push(RouteTarget {
                provider: provider.to_owned(),
                model: model.to_owned(),
            });
        self
    }

    /// Set the long-context routing threshold
    pub fn with_long_context_threshold(mut self, tokens: u32) -> Self {
        self.config.llm.routing.long_context_threshold = tokens;
        self
    }

    /// Enable retries with a short backoff
    pub fn with_retries(mut self, max_attempts: u32) -> Self {
        self.config.llm.retry = RetryConfig {
            max_attempts,
            initial_delay: "10ms".to_owned(),
            max_delay: "50ms".to_owned(),
            multiplier: 2.0,
        };
        self
    }

    /// Errors within the window that mark a provider degraded
    pub fn with_error_threshold(mut self, errors: u32) -> Self {
        self.config.llm.circuit_breaker.error_threshold = errors;
        self
    }

    /// Set rate limit configuration
    pub fn with_rate_limit(mut self, config: RateLimitConfig) -> Self {
        self.config.server.rate_limit = Some(config);
        self
    }

    /// Disable health endpoint
    pub fn without_health(mut self) -> Self {
        self.config.server.health.enabled = false;
        self
    }

    /// Build the final config
    pub fn build(self) -> Config {
        self.config
    }
}
