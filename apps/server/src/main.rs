//! Perch Server - headless supervisor daemon for a Spotify appliance.
//!
//! This binary bootstraps the supervisor, starts the watchdog loops, and
//! serves the HTTP control panel. It's designed to run as a systemd service
//! on the appliance itself.

mod config;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use perch_core::{start_server, AppState, Supervisor};
use tokio::signal;

use crate::config::ServerConfig;

/// Perch Server - keeps a Spotify appliance playing and its host healthy.
#[derive(Parser, Debug)]
#[command(name = "perch-server")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file (YAML).
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace).
    #[arg(short, long, default_value = "info", env = "PERCH_LOG_LEVEL")]
    log_level: log::LevelFilter,

    /// Bind port for the control panel (overrides config file).
    #[arg(short = 'p', long, env = "PERCH_BIND_PORT")]
    port: Option<u16>,

    /// Device name advertised to Spotify Connect (overrides config file).
    #[arg(short = 'n', long, env = "PERCH_DEVICE_NAME")]
    device_name: Option<String>,

    /// Data directory for persistent state (credentials).
    #[arg(short = 'd', long, env = "PERCH_DATA_DIR")]
    data_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    env_logger::Builder::new()
        .filter_level(args.log_level)
        .format_timestamp_millis()
        .init();

    log::info!("Perch Server v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let mut config =
        ServerConfig::load(args.config.as_deref()).context("Failed to load configuration")?;

    // Apply CLI overrides
    if let Some(port) = args.port {
        config.bind_port = port;
    }
    if let Some(device_name) = args.device_name {
        config.device_name = device_name;
    }
    if let Some(data_dir) = args.data_dir {
        config.data_dir = Some(data_dir);
    }

    log::info!(
        "Configuration: bind_port={}, device_name='{}'",
        config.bind_port,
        config.device_name
    );
    match &config.data_dir {
        Some(dir) => log::info!("Using data directory: {}", dir.display()),
        None => log::info!("No data directory configured - credentials will not persist"),
    }

    // Bootstrap the supervisor. Mixer detection failure is fatal here: an
    // audio appliance without audio output should fail fast and let systemd
    // surface the unit failure.
    let supervisor = Arc::new(
        Supervisor::bootstrap(config.to_core_config())
            .await
            .context("Failed to bootstrap supervisor")?,
    );

    log::info!("Supervisor bootstrapped successfully");

    // Start the watchdog loops
    supervisor.start_background_tasks();

    // Spawn the control panel server
    let app_state = AppState::new(Arc::clone(&supervisor));
    let server_handle = tokio::spawn(async move {
        if let Err(e) = start_server(app_state).await {
            log::error!("Server error: {}", e);
        }
    });

    // Wait for shutdown signal
    shutdown_signal().await;

    log::info!("Shutdown signal received, cleaning up...");

    // Graceful shutdown: cancel the loops, then stop the server
    supervisor.shutdown().await;
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
