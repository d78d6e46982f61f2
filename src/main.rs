//! # Telemetry Gateway
//!
//! Ground-station service between the instrument bridge and the pilot UI.
//!
//! Polls every sensor channel from the bridge, keeps a short in-memory
//! history per channel with older readings spooled to disk, uploads channel
//! logs on request, and supervises the bridge's serial link.

use std::path::PathBuf;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

use telemetry_gateway::app::Gateway;
use telemetry_gateway::config::{Config, CONFIG_PATH_ENV, MODE_ENV};
use telemetry_gateway::server;

/// Configuration file used when none is named
const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

/// Main entry point for the telemetry gateway
///
/// # Control Flow
///
/// 1. **Initialization**
///    - Load configuration (first argument, `GATEWAY_CONFIG`, then
///      `config/default.toml`, else built-in defaults)
///    - Apply `MODE=mock`
///    - Set up logging (console, plus daily files when `logging.log_dir` is set)
///
/// 2. **Run**
///    - Start one poller per channel and the port health check
///    - Serve the HTTP API until Ctrl+C
///
/// 3. **Graceful Shutdown**
///    - Stop accepting requests
///    - Cancel and join every background task
///
/// # Examples
///
/// ```bash
/// MODE=mock cargo run --release -- config/default.toml
/// ```
#[tokio::main]
async fn main() -> Result<()> {
    let mut config = load_config()?;
    config.apply_mode_override(std::env::var(MODE_ENV).ok().as_deref());

    // Keep the guard alive so buffered file logs are flushed on exit
    let _log_guard = init_logging(&config)?;

    info!("Telemetry Gateway v{} starting...", env!("CARGO_PKG_VERSION"));

    let cancel = CancellationToken::new();
    let gateway = Gateway::start(&config, cancel.clone()).context("failed to start gateway")?;
    let app = server::router(gateway.state().clone());

    let listener = tokio::net::TcpListener::bind(&config.server.bind)
        .await
        .with_context(|| format!("failed to bind {}", config.server.bind))?;
    info!("Listening on {}", config.server.bind);
    info!("Press Ctrl+C to exit");

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(cancel.clone()))
        .await;

    cancel.cancel();
    gateway.shutdown().await;

    if let Err(e) = served {
        error!("HTTP server failed: {}", e);
        return Err(e.into());
    }

    info!("Shutdown complete");
    Ok(())
}

fn load_config() -> Result<Config> {
    let named = std::env::args()
        .nth(1)
        .or_else(|| std::env::var(CONFIG_PATH_ENV).ok())
        .map(PathBuf::from);

    match named {
        Some(path) => {
            Config::load(&path).with_context(|| format!("failed to load config from {}", path.display()))
        }
        None => {
            let path = PathBuf::from(DEFAULT_CONFIG_PATH);
            if path.exists() {
                Config::load(&path).with_context(|| format!("failed to load config from {}", path.display()))
            } else {
                Ok(Config::default())
            }
        }
    }
}

fn init_logging(config: &Config) -> Result<Option<tracing_appender::non_blocking::WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.logging.level))
        .with_context(|| format!("invalid logging level '{}'", config.logging.level))?;

    let (file_layer, guard) = match &config.logging.log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "telemetry-gateway.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer().with_writer(writer).with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .with(file_layer)
        .init();

    Ok(guard)
}

async fn shutdown_signal(cancel: CancellationToken) {
    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                error!("Failed to listen for Ctrl+C: {}", e);
            }
            info!("Received Ctrl+C, shutting down...");
        }
        _ = cancel.cancelled() => {}
    }
}
