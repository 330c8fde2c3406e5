//! RBG simulation backend (rbg-sim) - Main entry point
//!
//! Serves the analysis backend API with scripted behavior on a local port.

use anyhow::{Context, Result};
use clap::Parser;
use rbg_common::config::{default_config_path, load_toml_or_default};
use rbg_sim::config::{SimConfig, MODULE_NAME};
use rbg_sim::{build_router, start_initialization, AppState};
use std::path::PathBuf;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command-line arguments for rbg-sim
#[derive(Parser, Debug)]
#[command(name = "rbg-sim")]
#[command(about = "Simulation backend for the RetinoblastoGemma analysis client")]
#[command(version)]
struct Args {
    /// Listen address (overrides the config file)
    #[arg(short, long, env = "RBG_SIM_BIND")]
    bind: Option<String>,

    /// Config file (default: <config_dir>/rbg/rbg-sim.toml)
    #[arg(short, long, env = "RBG_SIM_CONFIG")]
    config: Option<PathBuf>,

    /// Make this module fail to load
    #[arg(long)]
    fail_module: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let path = args.config.clone().or_else(|| default_config_path(MODULE_NAME));
    let mut config: SimConfig = load_toml_or_default(path.as_deref());
    if let Some(bind) = args.bind {
        config.bind = bind;
    }
    if args.fail_module.is_some() {
        config.fail_module = args.fail_module;
    }

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("rbg_sim={0},tower_http={0}", config.logging.level).into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting rbg-sim v{}", env!("CARGO_PKG_VERSION"));
    config.validate().context("Invalid simulation configuration")?;

    let state = AppState::new(config.clone())?;
    let init = start_initialization(&state);
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind)
        .await
        .with_context(|| format!("Failed to bind to {}", config.bind))?;
    info!("Listening on http://{}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    init.abort();
    info!("rbg-sim stopped");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down"),
        _ = terminate => info!("Received terminate signal, shutting down"),
    }
}
