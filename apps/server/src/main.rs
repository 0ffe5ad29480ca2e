//! Stagecast Server - standalone server for the stage coordination protocol.
//!
//! Hosts create a room, share its ID, and an audience joins over WebSocket;
//! this binary wires up the HTTP/WS transport and runs until a shutdown
//! signal arrives.

mod config;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use parking_lot::RwLock;
use stagecast_core::{bootstrap_services, start_server, AppState};
use tokio::signal;

use crate::config::ServerConfig;

/// Stagecast Server - headless stage coordination server.
#[derive(Parser, Debug)]
#[command(name = "stagecast-server")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file (YAML).
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace).
    #[arg(short, long, default_value = "info", env = "STAGECAST_LOG_LEVEL")]
    log_level: log::LevelFilter,

    /// Bind port (overrides config file).
    #[arg(short = 'p', long, env = "STAGECAST_BIND_PORT")]
    port: Option<u16>,

    /// Directory host-uploaded audio is written to (overrides config file).
    #[arg(long, env = "STAGECAST_UPLOAD_DIR")]
    upload_dir: Option<PathBuf>,

    /// Directory pre-downloaded remote audio is cached in (overrides config file).
    #[arg(long, env = "STAGECAST_DOWNLOAD_DIR")]
    download_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    env_logger::Builder::new()
        .filter_level(args.log_level)
        .format_timestamp_millis()
        .init();

    log::info!("Stagecast Server v{}", env!("CARGO_PKG_VERSION"));

    let mut config =
        ServerConfig::load(args.config.as_deref()).context("Failed to load configuration")?;

    if let Some(port) = args.port {
        config.bind_port = port;
    }
    if let Some(dir) = args.upload_dir {
        config.upload_dir = dir;
    }
    if let Some(dir) = args.download_dir {
        config.download_dir = dir;
    }

    let core_config = config.to_core_config();
    let services =
        bootstrap_services(&core_config).context("Failed to bootstrap services")?;

    log::info!(
        "Services bootstrapped: uploads={}, downloads={}",
        core_config.upload_dir.display(),
        core_config.download_dir.display(),
    );

    let app_state = AppState::builder()
        .from_services(&services)
        .config(Arc::new(RwLock::new(core_config)))
        .build();

    let server_handle = tokio::spawn(async move {
        if let Err(e) = start_server(app_state).await {
            log::error!("Server error: {}", e);
        }
    });

    log::info!("HTTP/WS server started on port {}", config.bind_port);

    shutdown_signal().await;
    log::info!("Shutdown signal received, cleaning up...");

    services.shutdown().await;
    server_handle.abort();

    log::info!("Shutdown complete");
    Ok(())
}

/// Waits for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
