//! WebhookRelay - Main entry point
//!
//! Local forwarding relay between the webhook inspector UI and its private backend

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;
use webhook_relay::{RelayConfig, RelayError, RelayServer};

/// WebhookRelay - Local forwarding relay for the webhook inspector
#[derive(Parser, Debug)]
#[command(name = "webhook-relay")]
#[command(author = "WebhookRelay Contributors")]
#[command(version = "1.0.0")]
#[command(about = "Forwards /api/* to a private webhook backend")]
struct Args {
    /// Config file (JSON); defaults are used if it does not exist
    #[arg(long, env = "RELAY_CONFIG", default_value = "./config.json")]
    config: PathBuf,

    /// Upstream origin, overrides the config file
    #[arg(long, env = "RELAY_UPSTREAM")]
    upstream: Option<String>,

    /// Preferred port, overrides the config file
    #[arg(long, env = "RELAY_PORT")]
    port: Option<u16>,

    /// Log level
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let log_level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .compact()
        .init();

    info!("Starting WebhookRelay v1.0.0");

    let config = load_config(&args).context("Invalid relay configuration")?;

    let server = Arc::new(RelayServer::new(config));

    match server.run(shutdown_signal()).await {
        Ok(()) => Ok(()),
        Err(e @ RelayError::BindExhausted { .. }) => {
            error!("{}", e);
            Err(e.into())
        }
        Err(e) => Err(e.into()),
    }
}

fn load_config(args: &Args) -> Result<RelayConfig> {
    let mut config = RelayConfig::load(&args.config)?;

    if let Some(ref upstream) = args.upstream {
        config = config.with_upstream(upstream)?;
    }
    if let Some(port) = args.port {
        config.preferred_port = port;
    }

    Ok(config.validate()?)
}

/// Resolves on Ctrl-C, or SIGTERM on Unix
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl-C"),
        _ = terminate => info!("Received SIGTERM"),
    }
}
