//! Provider profile registry
//!
//! Profiles are static capability and limit metadata per configured provider,
//! built once from configuration and shared read-only behind `Arc`.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use conduit_config::{LlmConfig, ProviderConfig, ProviderType};
use indexmap::IndexMap;
use secrecy::SecretString;
use url::Url;

/// Wire format family of a provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderFamily {
    /// OpenAI-compatible chat completions
    OpenAi,
    /// Google Gemini
    Gemini,
    /// `DeepSeek`, OpenAI-compatible with a hard output cap
    DeepSeek,
    /// Providers that already speak the canonical format
    Passthrough,
}

impl ProviderFamily {
    /// Lowercase family name used in logs and events
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::Gemini => "gemini",
            Self::DeepSeek => "deepseek",
            Self::Passthrough => "passthrough",
        }
    }

    /// Built-in limits and compatibility rules for the family
    pub const fn defaults(self) -> FamilyDefaults {
        match self {
            Self::OpenAi => FamilyDefaults {
                max_tokens_hard_cap: 16_384,
                context_window: 128_000,
                tool_call_format: ToolCallFormat::OpenAiFunctions,
                strips: &[],
                limits: OPENAI_LIMITS,
                base_url: "https://api.openai.com/v1",
            },
            Self::DeepSeek => FamilyDefaults {
                max_tokens_hard_cap: 8192,
                context_window: 64_000,
                tool_call_format: ToolCallFormat::OpenAiFunctions,
                strips: &["top_k"],
                limits: DEEPSEEK_LIMITS,
                base_url: "https://api.deepseek.com/v1",
            },
            Self::Gemini => FamilyDefaults {
                max_tokens_hard_cap: 8192,
                context_window: 1_048_576,
                tool_call_format: ToolCallFormat::GeminiFunctionDeclarations,
                strips: &["frequency_penalty", "presence_penalty"],
                limits: GEMINI_LIMITS,
                base_url: "https://generativelanguage.googleapis.com/v1beta",
            },
            Self::Passthrough => FamilyDefaults {
                max_tokens_hard_cap: 32_000,
                context_window: 200_000,
                tool_call_format: ToolCallFormat::AnthropicToolUse,
                strips: &[],
                limits: PASSTHROUGH_LIMITS,
                base_url: "https://api.anthropic.com/v1",
            },
        }
    }
}

impl From<ProviderType> for ProviderFamily {
    fn from(value: ProviderType) -> Self {
        match value {
            ProviderType::Openai => Self::OpenAi,
            ProviderType::Gemini => Self::Gemini,
            ProviderType::Deepseek => Self::DeepSeek,
            ProviderType::Passthrough => Self::Passthrough,
        }
    }
}

/// How a family expresses tool calls on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolCallFormat {
    /// `tools[].function` plus `tool_calls`
    OpenAiFunctions,
    /// `functionDeclarations` plus `functionCall` parts
    GeminiFunctionDeclarations,
    /// Canonical `tool_use` blocks
    AnthropicToolUse,
}

/// Built-in limits for a provider family
#[derive(Debug, Clone, Copy)]
pub struct FamilyDefaults {
    /// Output token ceiling no configuration can exceed
    pub max_tokens_hard_cap: u32,
    /// Prompt plus output budget
    pub context_window: u32,
    /// Function-calling wire shape
    pub tool_call_format: ToolCallFormat,
    /// Parameters the family rejects
    pub strips: &'static [&'static str],
    /// Accepted ranges of sampling parameters
    pub limits: &'static [ParameterLimit],
    /// Endpoint used when no `base_url` is configured
    pub base_url: &'static str,
}

/// Inclusive range a numeric request parameter must fall in
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParameterLimit {
    /// Canonical parameter name
    pub name: &'static str,
    pub min: f64,
    pub max: f64,
}

impl ParameterLimit {
    pub const fn new(name: &'static str, min: f64, max: f64) -> Self {
        Self { name, min, max }
    }

    pub fn contains(&self, value: f64) -> bool {
        (self.min..=self.max).contains(&value)
    }
}

const OPENAI_LIMITS: &[ParameterLimit] = &[
    ParameterLimit::new("temperature", 0.0, 2.0),
    ParameterLimit::new("top_p", 0.0, 1.0),
    ParameterLimit::new("presence_penalty", -2.0, 2.0),
    ParameterLimit::new("frequency_penalty", -2.0, 2.0),
];

const DEEPSEEK_LIMITS: &[ParameterLimit] = &[
    ParameterLimit::new("temperature", 0.0, 2.0),
    ParameterLimit::new("top_p", 0.0, 1.0),
];

const GEMINI_LIMITS: &[ParameterLimit] = &[
    ParameterLimit::new("temperature", 0.0, 2.0),
    ParameterLimit::new("top_p", 0.0, 1.0),
    ParameterLimit::new("top_k", 1.0, 100.0),
];

const PASSTHROUGH_LIMITS: &[ParameterLimit] = &[
    ParameterLimit::new("temperature", 0.0, 1.0),
    ParameterLimit::new("top_p", 0.0, 1.0),
    ParameterLimit::new("top_k", 1.0, 100_000.0),
];

/// Static capability and limit metadata for one provider
#[derive(Debug, Clone)]
pub struct ProviderProfile {
    /// Configured provider name
    pub name: String,
    /// Wire format family
    pub family: ProviderFamily,
    /// Output token ceiling applied by the encoders
    pub max_tokens_hard_cap: u32,
    /// Prompt plus output budget used by the pre-flight check
    pub context_window: u32,
    /// Whether tool definitions may be sent
    pub supports_tools: bool,
    /// Whether streaming may be requested
    pub supports_streaming: bool,
    /// Request parameters removed before sending
    pub parameters_to_strip: BTreeSet<String>,
    /// Request parameters renamed before sending
    pub parameter_renames: BTreeMap<String, String>,
    /// Ranges checked before encoding
    pub parameter_limits: &'static [ParameterLimit],
    /// Function-calling wire shape
    pub tool_call_format: ToolCallFormat,
    /// API base URL
    pub base_url: Url,
    /// Credential sent upstream
    pub api_key: Option<SecretString>,
    /// Whole-exchange timeout (time to headers for streams)
    pub timeout: Duration,
    /// Ask OpenAI-compatible streams to report usage
    pub stream_usage: bool,
}

impl ProviderProfile {
    /// Profile with the family's built-in defaults
    pub fn builtin(name: impl Into<String>, family: ProviderFamily, base_url: Url) -> Self {
        let defaults = family.defaults();
        let stream_usage = match family {
            ProviderFamily::OpenAi => is_canonical_openai(&base_url),
            ProviderFamily::DeepSeek => true,
            ProviderFamily::Gemini | ProviderFamily::Passthrough => false,
        };

        Self {
            name: name.into(),
            family,
            max_tokens_hard_cap: defaults.max_tokens_hard_cap,
            context_window: defaults.context_window,
            supports_tools: true,
            supports_streaming: true,
            parameters_to_strip: defaults.strips.iter().map(|&key| key.to_owned()).collect(),
            parameter_renames: BTreeMap::new(),
            parameter_limits: defaults.limits,
            tool_call_format: defaults.tool_call_format,
            base_url,
            api_key: None,
            timeout: Duration::from_secs(30),
            stream_usage,
        }
    }

    /// Build a profile from provider configuration
    pub fn from_config(name: &str, config: &ProviderConfig) -> anyhow::Result<Self> {
        let family = ProviderFamily::from(config.provider_type);
        let defaults = family.defaults();

        let base_url = match &config.base_url {
            Some(url) => url.clone(),
            None => Url::parse(defaults.base_url).context("invalid built-in base URL")?,
        };

        let mut profile = Self::builtin(name, family, base_url);

        if let Some(max_tokens) = config.max_tokens {
            if max_tokens > defaults.max_tokens_hard_cap {
                tracing::warn!(
                    provider = name,
                    configured = max_tokens,
                    ceiling = defaults.max_tokens_hard_cap,
                    "max_tokens above family ceiling, clamping"
                );
            }
            profile.max_tokens_hard_cap = max_tokens.min(defaults.max_tokens_hard_cap);
        }

        if let Some(context_window) = config.context_window {
            profile.context_window = context_window;
        }
        if let Some(supports_tools) = config.supports_tools {
            profile.supports_tools = supports_tools;
        }
        if let Some(supports_streaming) = config.supports_streaming {
            profile.supports_streaming = supports_streaming;
        }

        profile.parameters_to_strip.extend(config.strip_parameters.iter().cloned());
        profile.parameter_renames.extend(
            config
                .rename_parameters
                .iter()
                .map(|(from, to)| (from.clone(), to.clone())),
        );

        profile.api_key.clone_from(&config.api_key);
        profile.timeout = conduit_config::parse_duration(&config.timeout)
            .with_context(|| format!("provider '{name}' has an invalid timeout"))?;

        Ok(profile)
    }
}

/// Whether the URL is the canonical `OpenAI` API rather than a compatible third party
///
/// Many compatible services reject `stream_options`, so usage reporting is
/// only requested from the real thing.
fn is_canonical_openai(base_url: &Url) -> bool {
    base_url.host_str().is_some_and(|host| host == "api.openai.com")
}

/// Profiles of all configured providers, in declaration order
#[derive(Debug, Clone, Default)]
pub struct ProfileRegistry {
    profiles: IndexMap<String, Arc<ProviderProfile>>,
}

impl ProfileRegistry {
    /// Build profiles for every configured provider
    pub fn from_config(config: &LlmConfig) -> anyhow::Result<Self> {
        let mut profiles = IndexMap::with_capacity(config.providers.len());

        for (name, provider) in &config.providers {
            let profile = ProviderProfile::from_config(name, provider)?;
            profiles.insert(name.clone(), Arc::new(profile));
        }

        Ok(Self { profiles })
    }

    /// Register a profile, replacing any profile with the same name
    pub fn insert(&mut self, profile: ProviderProfile) {
        self.profiles.insert(profile.name.clone(), Arc::new(profile));
    }

    /// Look up a profile by provider name
    pub fn get(&self, name: &str) -> Option<&Arc<ProviderProfile>> {
        self.profiles.get(name)
    }

    /// Whether a provider with this name exists
    pub fn contains(&self, name: &str) -> bool {
        self.profiles.contains_key(name)
    }

    /// Iterate over provider names
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.profiles.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use conduit_config::Config;

    use super::*;

    fn registry(toml: &str) -> ProfileRegistry {
        let config = Config::parse(toml).unwrap();
        ProfileRegistry::from_config(&config.llm).unwrap()
    }

    #[test]
    fn family_defaults_apply() {
        let registry = registry(
            r#"
            [llm.providers.ds]
            type = "deepseek"

            [llm.providers.gem]
            type = "gemini"

            [llm.routes.default]
            provider = "ds"
            model = "deepseek-chat"
            "#,
        );

        let ds = registry.get("ds").unwrap();
        assert_eq!(ds.family, ProviderFamily::DeepSeek);
        assert_eq!(ds.max_tokens_hard_cap, 8192);
        assert!(ds.parameters_to_strip.contains("top_k"));
        assert_eq!(ds.base_url.as_str(), "https://api.deepseek.com/v1");

        let gem = registry.get("gem").unwrap();
        assert_eq!(gem.tool_call_format, ToolCallFormat::GeminiFunctionDeclarations);
        assert!(
            gem.parameter_limits
                .iter()
                .any(|limit| limit.name == "top_k" && limit.contains(100.0) && !limit.contains(101.0))
        );
        assert!(gem.parameters_to_strip.contains("presence_penalty"));
        assert_eq!(registry.names().collect::<Vec<_>>(), ["ds", "gem"]);
    }

    #[test]
    fn configured_cap_is_clamped_to_family_ceiling() {
        let registry = registry(
            r#"
            [llm.providers.ds]
            type = "deepseek"
            max_tokens = 32000

            [llm.providers.oa]
            type = "openai"
            max_tokens = 2048
            supports_tools = false
            strip_parameters = ["temperature"]
            rename_parameters = { max_tokens = "max_completion_tokens" }
            timeout = "5s"

            [llm.routes.default]
            provider = "oa"
            model = "gpt-4o"
            "#,
        );

        assert_eq!(registry.get("ds").unwrap().max_tokens_hard_cap, 8192);

        let oa = registry.get("oa").unwrap();
        assert_eq!(oa.max_tokens_hard_cap, 2048);
        assert!(!oa.supports_tools);
        assert!(oa.parameters_to_strip.contains("temperature"));
        assert_eq!(oa.parameter_renames["max_tokens"], "max_completion_tokens");
        assert_eq!(oa.timeout, Duration::from_secs(5));
        assert!(oa.stream_usage);
    }

    #[test]
    fn compatible_openai_services_skip_stream_usage() {
        let profile = ProviderProfile::builtin(
            "local",
            ProviderFamily::OpenAi,
            Url::parse("http://localhost:8000/v1").unwrap(),
        );
        assert!(!profile.stream_usage);
    }
}
