use std::path::Path;
use std::time::Duration;

use crate::{Config, DEFAULT_ROUTE};

/// Parse a human duration string such as `"30s"` or `"1m"`
///
/// # Errors
///
/// Returns an error if the string is not a valid duration
pub fn parse_duration(value: &str) -> anyhow::Result<Duration> {
    duration_str::parse(value).map_err(|e| anyhow::anyhow!("invalid duration '{value}': {e}"))
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Reads the file, expands `{{ env.VAR }}` placeholders, then
    /// deserializes and validates the result.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, environment variable
    /// expansion fails, TOML parsing fails, or validation fails
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("failed to read config file {}: {e}", path.display()))?;

        Self::parse(&raw)
    }

    /// Parse and validate configuration from TOML text
    ///
    /// # Errors
    ///
    /// Returns an error if expansion, parsing or validation fails
    pub fn parse(raw: &str) -> anyhow::Result<Self> {
        let expanded =
            crate::env::expand_env(raw).map_err(|e| anyhow::anyhow!("config variable expansion failed: {e}"))?;

        let config: Self = toml::from_str(&expanded).map_err(|e| anyhow::anyhow!("failed to parse config: {e}"))?;

        config.validate()?;

        Ok(config)
    }

    /// Validate that the configuration is internally consistent
    ///
    /// # Errors
    ///
    /// Returns an error if providers or routes are missing, a route points
    /// at an unknown provider, or a duration or pattern does not parse
    pub fn validate(&self) -> anyhow::Result<()> {
        self.validate_providers()?;
        self.validate_routes()?;
        self.validate_tuning()?;
        self.validate_rate_limit()?;
        Ok(())
    }

    fn validate_providers(&self) -> anyhow::Result<()> {
        if self.llm.providers.is_empty() {
            anyhow::bail!("at least one provider must be configured under [llm.providers]");
        }

        for (name, provider) in &self.llm.providers {
            parse_duration(&provider.timeout).map_err(|e| anyhow::anyhow!("provider '{name}': {e}"))?;

            if provider.max_tokens == Some(0) {
                anyhow::bail!("provider '{name}': max_tokens must be greater than 0");
            }
        }

        Ok(())
    }

    fn validate_routes(&self) -> anyhow::Result<()> {
        if !self.llm.routes.contains_key(DEFAULT_ROUTE) {
            anyhow::bail!("a '{DEFAULT_ROUTE}' route must be configured under [llm.routes]");
        }

        for (alias, route) in &self.llm.routes {
            let fallbacks = route.fallbacks.iter().map(|f| f.provider.as_str());
            let targets = std::iter::once(route.provider.as_str()).chain(fallbacks);

            for provider in targets {
                if !self.llm.providers.contains_key(provider) {
                    anyhow::bail!("route '{alias}' references unknown provider '{provider}'");
                }
            }
        }

        Ok(())
    }

    fn validate_tuning(&self) -> anyhow::Result<()> {
        regex::Regex::new(&self.llm.routing.background_model_pattern)
            .map_err(|e| anyhow::anyhow!("invalid background_model_pattern: {e}"))?;

        let retry = &self.llm.retry;
        if retry.max_attempts == 0 {
            anyhow::bail!("retry.max_attempts must be at least 1");
        }
        if retry.multiplier < 1.0 {
            anyhow::bail!("retry.multiplier must be at least 1.0");
        }
        parse_duration(&retry.initial_delay).map_err(|e| anyhow::anyhow!("retry.initial_delay: {e}"))?;
        parse_duration(&retry.max_delay).map_err(|e| anyhow::anyhow!("retry.max_delay: {e}"))?;

        Ok(())
    }

    fn validate_rate_limit(&self) -> anyhow::Result<()> {
        let Some(ref rate_limit) = self.server.rate_limit else {
            return Ok(());
        };

        if rate_limit.requests == 0 {
            anyhow::bail!("server.rate_limit.requests must be greater than 0");
        }

        let window = parse_duration(&rate_limit.window)?;
        if window.is_zero() {
            anyhow::bail!("server.rate_limit.window must be greater than 0");
        }

        Ok(())
    }
}
