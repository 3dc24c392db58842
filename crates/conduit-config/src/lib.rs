#![allow(clippy::must_use_candidate)]

pub mod client_identification;
mod env;
pub mod health;
pub mod llm;
mod loader;
pub mod rate_limit;
pub mod server;
pub mod telemetry;

use serde::Deserialize;

pub use client_identification::*;
pub use env::ExpandError;
pub use health::*;
pub use llm::*;
pub use loader::parse_duration;
pub use rate_limit::*;
pub use server::*;
pub use telemetry::{ExportProtocol, ExporterConfig, LogFormat, TelemetryConfig};

/// Top-level Conduit configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,
    /// Providers, routes and pipeline tuning
    #[serde(default)]
    pub llm: LlmConfig,
    /// Telemetry configuration
    #[serde(default)]
    pub telemetry: Option<TelemetryConfig>,
}
