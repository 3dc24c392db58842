use std::net::SocketAddr;

use serde::Deserialize;

use crate::{client_identification::ClientIdentificationConfig, health::HealthConfig, rate_limit::RateLimitConfig};

/// Address used when none is configured
pub const DEFAULT_LISTEN_ADDRESS: SocketAddr =
    SocketAddr::new(std::net::IpAddr::V4(std::net::Ipv4Addr::LOCALHOST), 3456);

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    pub listen_address: Option<SocketAddr>,
    #[serde(default)]
    pub health: HealthConfig,
    #[serde(default)]
    pub rate_limit: Option<RateLimitConfig>,
    #[serde(default)]
    pub client_identification: ClientIdentificationConfig,
}

impl ServerConfig {
    /// Configured listen address or `127.0.0.1:3456`
    pub fn listen_address(&self) -> SocketAddr {
        self.listen_address.unwrap_or(DEFAULT_LISTEN_ADDRESS)
    }
}
