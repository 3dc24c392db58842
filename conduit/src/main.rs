#![allow(clippy::must_use_candidate, clippy::missing_errors_doc)]

mod args;

use std::path::PathBuf;
use std::sync::Arc;

use args::Args;
use clap::Parser;
use conduit_config::Config;
use conduit_llm::Pipeline;
use conduit_server::Server;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Load configuration
    let config = Config::load(&args.config)?;

    // Initialize telemetry
    let _telemetry_guard = conduit_telemetry::init(config.telemetry.as_ref(), &args.log_filter())?;

    tracing::info!(config_path = %args.config.display(), "starting conduit");

    // Build server
    let mut server = Server::new(&config)?;
    if let Some(listen) = args.listen {
        server = server.with_listen_address(listen);
    }

    // Set up graceful shutdown
    let shutdown = CancellationToken::new();
    let shutdown_clone = shutdown.clone();

    tokio::spawn(async move {
        shutdown_signal().await;
        shutdown_clone.cancel();
    });

    spawn_reloader(args.config.clone(), server.pipeline(), shutdown.clone());

    // Run server
    server.serve(shutdown).await?;

    tracing::info!("conduit stopped");
    Ok(())
}

/// Reload routes and providers from the config file on `SIGHUP`
///
/// A config that fails to load leaves the running configuration untouched.
#[cfg(unix)]
fn spawn_reloader(path: PathBuf, pipeline: Arc<Pipeline>, shutdown: CancellationToken) {
    use tokio::signal::unix::{SignalKind, signal};

    let mut hangup = match signal(SignalKind::hangup()) {
        Ok(hangup) => hangup,
        Err(e) => {
            tracing::warn!(error = %e, "failed to install SIGHUP handler, reload disabled");
            return;
        }
    };

    tokio::spawn(async move {
        loop {
            tokio::select! {
                () = shutdown.cancelled() => break,
                received = hangup.recv() => {
                    if received.is_none() {
                        break;
                    }
                }
            }

            tracing::info!(config_path = %path.display(), "reloading configuration");
            match Config::load(&path).and_then(|config| pipeline.reload(&config)) {
                Ok(()) => tracing::info!("configuration reloaded"),
                Err(e) => tracing::warn!(error = %e, "configuration reload failed, keeping previous configuration"),
            }
        }
    });
}

#[cfg(not(unix))]
fn spawn_reloader(_path: PathBuf, _pipeline: Arc<Pipeline>, _shutdown: CancellationToken) {}

/// Wait for a shutdown signal (`SIGINT` or `SIGTERM`)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut terminate) => {
                terminate.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }

    tracing::info!("shutdown signal received");
}
