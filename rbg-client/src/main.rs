//! RBG analysis client (rbg-client) - Main entry point
//!
//! Command-line front end over `rbg_client::AnalysisClient`.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use rbg_client::config::{ClientConfig, MODULE_NAME};
use rbg_client::{AnalysisClient, Artifact, BackendApi, ClientError, HttpBackend};
use rbg_common::config::{default_config_path, load_toml_or_default};
use rbg_common::events::ClientEvent;
use tokio::signal;
use tokio::sync::broadcast;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command-line arguments for rbg-client
#[derive(Parser, Debug)]
#[command(name = "rbg-client")]
#[command(about = "Client for the RetinoblastoGemma analysis backend")]
#[command(version)]
struct Args {
    /// Backend base URL (overrides the config file)
    #[arg(short, long, env = "RBG_BACKEND_URL", global = true)]
    backend_url: Option<String>,

    /// Config file (default: <config_dir>/rbg/rbg-client.toml)
    #[arg(short, long, env = "RBG_CLIENT_CONFIG", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print backend status
    Status,
    /// Print backend metrics
    Metrics,
    /// Stream client events as JSON lines until interrupted
    Watch,
    /// Upload an image, analyze it and print the result
    Analyze {
        /// Image file to analyze
        image: PathBuf,

        /// Detection confidence threshold in [0, 1]
        #[arg(long)]
        threshold: Option<f64>,

        /// Disable face tracking
        #[arg(long)]
        no_face_tracking: bool,

        /// Disable enhanced detection
        #[arg(long)]
        no_enhanced: bool,

        /// Seconds to wait for backend readiness
        #[arg(long, default_value = "300")]
        ready_timeout: u64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = load_config(&args);

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("rbg_client={}", config.logging.level).into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    config.validate().context("Invalid client configuration")?;
    info!(backend = %config.base_url(), "Starting rbg-client");

    match args.command {
        Command::Status => {
            let backend = HttpBackend::new(config.base_url(), config.request_timeout())?;
            let status = backend.status().await.context("Failed to fetch status")?;
            println!("{}", serde_json::to_string_pretty(&status)?);
        }
        Command::Metrics => {
            let backend = HttpBackend::new(config.base_url(), config.request_timeout())?;
            let metrics = backend.metrics().await.context("Failed to fetch metrics")?;
            println!("{}", serde_json::to_string_pretty(&metrics)?);
        }
        Command::Watch => watch(&config).await?,
        Command::Analyze {
            image,
            threshold,
            no_face_tracking,
            no_enhanced,
            ready_timeout,
        } => {
            let mut settings = config.analysis.settings();
            if let Some(threshold) = threshold {
                settings.confidence_threshold = threshold;
            }
            settings.face_tracking &= !no_face_tracking;
            settings.enhanced_detection &= !no_enhanced;
            settings.validate().context("Invalid analysis settings")?;

            analyze(&config, image, settings, Duration::from_secs(ready_timeout)).await?;
        }
    }

    Ok(())
}

/// TOML file, then command-line/environment overrides
fn load_config(args: &Args) -> ClientConfig {
    let path = args.config.clone().or_else(|| default_config_path(MODULE_NAME));
    let mut config: ClientConfig = load_toml_or_default(path.as_deref());
    if let Some(url) = &args.backend_url {
        config.backend_url = url.clone();
    }
    config
}

async fn watch(config: &ClientConfig) -> Result<()> {
    let client = AnalysisClient::start(config)?;
    let mut events = client.subscribe();

    let printer = async {
        loop {
            match events.recv().await {
                Ok(event) => println!("{}", serde_json::to_string(&event)?),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Event output lagged")
                }
                Err(broadcast::error::RecvError::Closed) => return Ok::<(), anyhow::Error>(()),
            }
        }
    };

    tokio::select! {
        result = printer => result?,
        _ = shutdown_signal() => {}
    }
    client.shutdown().await;
    Ok(())
}

async fn analyze(
    config: &ClientConfig,
    image: PathBuf,
    settings: rbg_common::api::types::AnalysisSettings,
    ready_timeout: Duration,
) -> Result<()> {
    let artifact = Artifact::from_path(&image)
        .await
        .with_context(|| format!("Cannot use {}", image.display()))?;

    let client = AnalysisClient::start(config)?;

    eprintln!("Waiting for backend readiness...");
    match client.wait_until_ready(ready_timeout).await {
        Ok(()) => {}
        Err(ClientError::NotReady) => {
            client.shutdown().await;
            bail!("Backend not ready after {}s", ready_timeout.as_secs());
        }
        Err(e) => {
            client.shutdown().await;
            return Err(e.into());
        }
    }

    let session = client.upload(artifact).await.context("Upload failed")?;
    eprintln!(
        "Uploaded {} ({}) as session {}",
        session.image.filename, session.image.dimensions, session.id
    );

    let mut events = client.subscribe();
    let accepted = client
        .request_analysis(settings)
        .await
        .context("Analysis request failed")?;
    eprintln!("Analysis run {} accepted", accepted.run_id);

    let result = loop {
        match events.recv().await {
            Ok(ClientEvent::RunProgress {
                run_id,
                progress,
                message,
                ..
            }) if run_id == accepted.run_id => {
                eprintln!("{:>5.1}% {}", progress, message.unwrap_or_default());
            }
            Ok(ClientEvent::ConnectionChanged { state, .. }) => {
                eprintln!("Connection: {state:?}");
            }
            Ok(ClientEvent::RunCompleted { run_id, result, .. }) if run_id == accepted.run_id => {
                break Ok(result);
            }
            Ok(ClientEvent::RunFailed { run_id, error, .. }) if run_id == accepted.run_id => {
                break Err(ClientError::Analysis(error));
            }
            Ok(_) => {}
            Err(broadcast::error::RecvError::Lagged(skipped)) => warn!(skipped, "Event output lagged"),
            Err(broadcast::error::RecvError::Closed) => break Err(ClientError::Shutdown),
        }
    };

    let snapshot = client.snapshot().await;
    client.shutdown().await;

    let result = result?;
    println!("{}", serde_json::to_string_pretty(&result)?);
    if let Ok(snapshot) = snapshot {
        eprintln!(
            "Session metrics: {} analyses, {} positive detections, {} errors, avg {:.2}s",
            snapshot.metrics.total_analyses,
            snapshot.metrics.positive_detections,
            snapshot.metrics.errors,
            snapshot.metrics.average_processing_time
        );
    }
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
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
