use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;

/// Conduit LLM gateway
#[derive(Debug, Parser)]
#[command(name = "conduit", about = "Messages API gateway for OpenAI, Gemini, DeepSeek and compatible providers")]
pub struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "conduit.toml", env = "CONDUIT_CONFIG")]
    pub config: PathBuf,

    /// Override the listen address
    #[arg(long, env = "CONDUIT_LISTEN")]
    pub listen: Option<SocketAddr>,

    /// Log filter directives, `RUST_LOG` syntax
    #[arg(long, env = "CONDUIT_LOG")]
    pub log: Option<String>,
}

impl Args {
    /// Filter from `--log`, then `RUST_LOG`, then `info`
    pub fn log_filter(&self) -> String {
        self.log
            .clone()
            .or_else(|| std::env::var("RUST_LOG").ok())
            .unwrap_or_else(|| "info".to_owned())
    }
}
