//! Route resolution
//!
//! Maps a request to a route alias, then to a provider and model. Resolution
//! is a pure function of the configuration, the routing hint, the request and
//! the health signal.

use std::fmt;

use conduit_config::{DEFAULT_ROUTE, LlmConfig, RouteConfig, RouteTarget};
use conduit_core::HealthReporter;
use indexmap::IndexMap;
use regex::Regex;

use crate::error::LlmError;
use crate::estimate::estimate;
use crate::types::CanonicalRequest;

/// Alias used for prompts above the long-context threshold
pub const LONG_CONTEXT_ROUTE: &str = "longContext";
/// Alias used for requests naming a background model
pub const BACKGROUND_ROUTE: &str = "background";
/// Alias used for requests with extended thinking enabled
pub const THINK_ROUTE: &str = "think";

/// Why a route was chosen
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteReason {
    /// Named by the client, through the routing hint, a route alias as model, or a `provider,model` pair
    Explicit,
    /// Prompt estimate exceeded the long-context threshold
    TokenThreshold,
    /// Requested model matched the background pattern
    ModelAlias,
    /// Request enables extended thinking
    Thinking,
    /// No rule matched
    Default,
    /// Primary provider was degraded
    Fallback,
}

impl RouteReason {
    /// Snake-case name used in events
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Explicit => "explicit",
            Self::TokenThreshold => "token_threshold",
            Self::ModelAlias => "model_alias",
            Self::Thinking => "thinking",
            Self::Default => "default",
            Self::Fallback => "fallback",
        }
    }
}

impl fmt::Display for RouteReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of route resolution, immutable once produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteDecision {
    /// Route alias, or the raw `provider,model` string
    pub alias: String,
    /// Provider name
    pub provider: String,
    /// Model sent upstream
    pub model: String,
    /// Why this route won
    pub reason: RouteReason,
}

/// Route table plus routing rules
#[derive(Debug, Clone)]
pub struct Router {
    routes: IndexMap<String, RouteConfig>,
    providers: Vec<String>,
    long_context_threshold: u32,
    background_pattern: Regex,
}

impl Router {
    /// Build the router from configuration
    pub fn new(config: &LlmConfig) -> anyhow::Result<Self> {
        let background_pattern = Regex::new(&config.routing.background_model_pattern)?;

        Ok(Self {
            routes: config.routes.clone(),
            providers: config.providers.keys().cloned().collect(),
            long_context_threshold: config.routing.long_context_threshold,
            background_pattern,
        })
    }

    /// Resolve a request to a provider and model
    pub fn resolve(
        &self,
        request: &CanonicalRequest,
        explicit_route: Option<&str>,
        health: &dyn HealthReporter,
    ) -> Result<RouteDecision, LlmError> {
        self.resolve_estimated(request, estimate(request), explicit_route, health)
    }

    /// Resolve with an already computed prompt estimate
    pub fn resolve_estimated(
        &self,
        request: &CanonicalRequest,
        estimated_tokens: u32,
        explicit_route: Option<&str>,
        health: &dyn HealthReporter,
    ) -> Result<RouteDecision, LlmError> {
        if let Some((provider, model)) = self.direct_target(&request.model) {
            if health.is_degraded(provider) {
                return Err(LlmError::ProviderUnavailable {
                    target: request.model.clone(),
                });
            }

            return Ok(RouteDecision {
                alias: request.model.clone(),
                provider: provider.to_owned(),
                model: model.to_owned(),
                reason: RouteReason::Explicit,
            });
        }

        let (alias, route, reason) = self.select_alias(request, estimated_tokens, explicit_route)?;

        if !health.is_degraded(&route.provider) {
            return Ok(RouteDecision {
                alias: alias.to_owned(),
                provider: route.provider.clone(),
                model: route.model.clone(),
                reason,
            });
        }

        let fallback = route
            .fallbacks
            .iter()
            .find(|target| !health.is_degraded(&target.provider));

        match fallback {
            Some(RouteTarget { provider, model }) => {
                tracing::warn!(
                    alias,
                    degraded = %route.provider,
                    fallback = %provider,
                    "primary provider degraded, using fallback"
                );

                Ok(RouteDecision {
                    alias: alias.to_owned(),
                    provider: provider.clone(),
                    model: model.clone(),
                    reason: RouteReason::Fallback,
                })
            }
            None => Err(LlmError::ProviderUnavailable {
                target: alias.to_owned(),
            }),
        }
    }

    /// Pick the alias by rule priority
    fn select_alias<'a>(
        &'a self,
        request: &CanonicalRequest,
        estimated_tokens: u32,
        explicit_route: Option<&str>,
    ) -> Result<(&'a str, &'a RouteConfig, RouteReason), LlmError> {
        if let Some(hint) = explicit_route {
            match self.routes.get_key_value(hint) {
                Some((alias, route)) => return Ok((alias, route, RouteReason::Explicit)),
                None => tracing::debug!(hint, "ignoring unknown route hint"),
            }
        }

        // A model naming a route alias takes that route
        if let Some((alias, route)) = self.routes.get_key_value(request.model.as_str()) {
            return Ok((alias, route, RouteReason::Explicit));
        }

        if estimated_tokens > self.long_context_threshold
            && let Some((alias, route)) = self.routes.get_key_value(LONG_CONTEXT_ROUTE)
        {
            return Ok((alias, route, RouteReason::TokenThreshold));
        }

        if self.background_pattern.is_match(&request.model)
            && let Some((alias, route)) = self.routes.get_key_value(BACKGROUND_ROUTE)
        {
            return Ok((alias, route, RouteReason::ModelAlias));
        }

        if request.thinking_enabled()
            && let Some((alias, route)) = self.routes.get_key_value(THINK_ROUTE)
        {
            return Ok((alias, route, RouteReason::Thinking));
        }

        // Validation guarantees the default route, hand-built configs may skip it
        self.routes
            .get_key_value(DEFAULT_ROUTE)
            .map(|(alias, route)| (alias.as_str(), route, RouteReason::Default))
            .ok_or_else(|| LlmError::ProviderUnavailable {
                target: DEFAULT_ROUTE.to_owned(),
            })
    }

    /// Split a `provider,model` request model naming a configured provider
    fn direct_target<'r>(&self, model: &'r str) -> Option<(&'r str, &'r str)> {
        let (provider, model) = model.split_once(',')?;
        let (provider, model) = (provider.trim(), model.trim());

        (!model.is_empty() && self.providers.iter().any(|name| name == provider)).then_some((provider, model))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use conduit_config::Config;
    use conduit_core::NeverDegraded;
    use indoc::indoc;

    use super::*;

    const CONFIG: &str = indoc! {r#"
        [llm.providers.primary]
        type = "openai"

        [llm.providers.backup]
        type = "deepseek"

        [llm.providers.big]
        type = "gemini"

        [llm.providers.cheap]
        type = "openai"

        [llm.routing]
        long_context_threshold = 1000

        [llm.routes.default]
        provider = "primary"
        model = "gpt-4o"
        fallbacks = [{ provider = "backup", model = "deepseek-chat" }]

        [llm.routes.longContext]
        provider = "big"
        model = "gemini-2.5-pro"

        [llm.routes.background]
        provider = "cheap"
        model = "gpt-4o-mini"

        [llm.routes.think]
        provider = "backup"
        model = "deepseek-reasoner"
    "#};

    struct Degraded(HashSet<&'static str>);

    impl HealthReporter for Degraded {
        fn is_degraded(&self, provider: &str) -> bool {
            self.0.contains(provider)
        }

        fn report_degraded(&self, _: &str, _: &(dyn std::error::Error + Send + Sync)) {}
    }

    fn router() -> Router {
        Router::new(&Config::parse(CONFIG).unwrap().llm).unwrap()
    }

    fn request(model: &str, text: &str) -> CanonicalRequest {
        serde_json::from_value(serde_json::json!({
            "model": model,
            "messages": [{"role": "user", "content": text}],
        }))
        .unwrap()
    }

    #[test]
    fn estimate_above_threshold_routes_to_long_context() {
        let router = router();
        let req = request("claude-sonnet-4", "hello");

        let decision = router.resolve_estimated(&req, 1200, None, &NeverDegraded).unwrap();
        assert_eq!(decision.alias, "longContext");
        assert_eq!(decision.provider, "big");
        assert_eq!(decision.reason, RouteReason::TokenThreshold);

        let at_threshold = router.resolve_estimated(&req, 1000, None, &NeverDegraded).unwrap();
        assert_eq!(at_threshold.alias, "default");
        assert_eq!(at_threshold.reason, RouteReason::Default);

        let long = request("claude-sonnet-4", &"x".repeat(4800));
        let decision = router.resolve(&long, None, &NeverDegraded).unwrap();
        assert_eq!(decision.reason, RouteReason::TokenThreshold);
    }

    #[test]
    fn resolution_is_deterministic() {
        let router = router();
        let req = request("claude-3-5-haiku-latest", "summarize this");
        let health = Degraded(HashSet::from(["primary"]));

        let first = router.resolve(&req, Some("default"), &health).unwrap();
        for _ in 0..50 {
            assert_eq!(router.resolve(&req, Some("default"), &health).unwrap(), first);
        }
    }

    #[test]
    fn explicit_hint_wins_and_unknown_hint_is_ignored() {
        let router = router();
        let req = request("claude-3-5-haiku-latest", "hi");

        let decision = router.resolve_estimated(&req, 5000, Some("think"), &NeverDegraded).unwrap();
        assert_eq!(decision.alias, "think");
        assert_eq!(decision.reason, RouteReason::Explicit);

        let decision = router.resolve(&req, Some("nope"), &NeverDegraded).unwrap();
        assert_eq!(decision.alias, "background");
        assert_eq!(decision.reason, RouteReason::ModelAlias);
    }

    #[test]
    fn model_naming_a_route_takes_it_before_rules() {
        let router = router();
        let req = request("think", "hi");

        let decision = router.resolve_estimated(&req, 5000, None, &NeverDegraded).unwrap();
        assert_eq!(decision.alias, "think");
        assert_eq!(decision.provider, "backup");
        assert_eq!(decision.model, "deepseek-reasoner");
        assert_eq!(decision.reason, RouteReason::Explicit);

        // The hint still comes first
        let hinted = router.resolve_estimated(&req, 5000, Some("background"), &NeverDegraded).unwrap();
        assert_eq!(hinted.alias, "background");
    }

    #[test]
    fn thinking_routes_to_think() {
        let router = router();
        let mut req = request("claude-sonnet-4", "prove it");
        req.thinking = Some(serde_json::json!({"type": "enabled", "budget_tokens": 2048}));

        let decision = router.resolve(&req, None, &NeverDegraded).unwrap();
        assert_eq!(decision.alias, "think");
        assert_eq!(decision.model, "deepseek-reasoner");
        assert_eq!(decision.reason, RouteReason::Thinking);
    }

    #[test]
    fn degraded_primary_uses_fallback() {
        let router = router();
        let req = request("claude-sonnet-4", "hi");
        let health = Degraded(HashSet::from(["primary"]));

        let decision = router.resolve(&req, None, &health).unwrap();
        assert_eq!(decision.alias, "default");
        assert_eq!(decision.provider, "backup");
        assert_eq!(decision.model, "deepseek-chat");
        assert_eq!(decision.reason, RouteReason::Fallback);
    }

    #[test]
    fn degraded_primary_without_fallback_is_unavailable() {
        let router = router();
        let req = request("claude-3-5-haiku-latest", "hi");
        let health = Degraded(HashSet::from(["cheap"]));

        let err = router.resolve(&req, None, &health).unwrap_err();
        assert!(matches!(err, LlmError::ProviderUnavailable { target } if target == "background"));

        let both = Degraded(HashSet::from(["primary", "backup"]));
        let err = router.resolve(&request("m", "hi"), None, &both).unwrap_err();
        assert!(matches!(err, LlmError::ProviderUnavailable { .. }));
    }

    #[test]
    fn provider_model_pair_routes_directly() {
        let router = router();
        let req = request("backup,deepseek-reasoner", "hi");

        let decision = router.resolve_estimated(&req, 50_000, None, &NeverDegraded).unwrap();
        assert_eq!(decision.provider, "backup");
        assert_eq!(decision.model, "deepseek-reasoner");
        assert_eq!(decision.reason, RouteReason::Explicit);

        // Unknown provider names fall through to the rules
        let req = request("elsewhere,model", "hi");
        assert_eq!(router.resolve(&req, None, &NeverDegraded).unwrap().alias, "default");
    }
}
