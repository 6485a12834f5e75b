//! emotabi-server - photo emotion analysis and destination suggestions
//!
//! Serves the upload form, `POST /analyze`, the place photo proxy and the
//! health/diagnostics endpoints.

use anyhow::{Context, Result};
use clap::Parser;
use emotabi_common::config::TomlConfig;
use emotabi_server::config::{CliOverrides, ServiceConfig};
use emotabi_server::services::image_optimizer::ensure_placeholder;
use emotabi_server::{build_router, AppState};
use std::path::PathBuf;
use std::sync::Mutex;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "emotabi-server")]
#[command(about = "Suggests travel destinations from the emotions in a photo")]
#[command(version)]
struct Args {
    /// Port to listen on (`PORT` is read during config resolution)
    #[arg(short, long)]
    port: Option<u16>,

    /// Root folder holding static assets and uploads
    #[arg(short, long, env = "EMOTABI_ROOT_FOLDER")]
    root_folder: Option<PathBuf>,

    /// TOML config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Object detector command (receives the image path, prints JSON detections)
    #[arg(long, env = "EMOTABI_DETECTOR_COMMAND")]
    detector_command: Option<String>,

    /// Color to emotion lookup table (CSV)
    #[arg(long, env = "EMOTABI_COLOR_TABLE")]
    color_table: Option<PathBuf>,

    /// Absolute base URL for proxied photo links
    #[arg(long, env = "EMOTABI_PUBLIC_BASE_URL")]
    public_base_url: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let toml_config = TomlConfig::load(args.config.as_deref());

    let default_filter = format!("emotabi_server={},tower_http=info", toml_config.logging.level);
    let file_layer = match &toml_config.logging.log_file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            Some(
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_writer(Mutex::new(file)),
            )
        }
        None => None,
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .with(file_layer)
        .init();

    info!(
        "Starting emotabi-server v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );

    let overrides = CliOverrides {
        port: args.port,
        root_folder: args.root_folder,
        detector_command: args.detector_command,
        color_table: args.color_table,
        public_base_url: args.public_base_url,
    };
    let config = ServiceConfig::resolve(&toml_config, &overrides);
    info!("Root folder: {}", config.root_folder.display());

    config
        .ensure_directories()
        .context("Failed to create static/upload directories")?;
    if let Err(e) = ensure_placeholder(&config.placeholder_path) {
        warn!("Placeholder image unavailable: {}", e);
    }

    let port = config.port;
    let state = AppState::from_config(config).context("Failed to build application state")?;
    state.capabilities().log();

    let app = build_router(state);

    let addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;
    info!("Listening on http://{}", addr);
    info!("Health check: http://{}/health", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Ctrl+C handler unavailable: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("SIGTERM handler unavailable: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
