//! # rbg-sim
//!
//! Simulation backend for the RetinoblastoGemma analysis client.
//!
//! Serves the same REST endpoints and progress channel as the real backend,
//! with scripted module initialization and scripted analysis runs. Used for
//! client development and end-to-end tests.

pub mod api;
pub mod config;
pub mod error;
pub mod simulation;

pub use crate::config::SimConfig;
pub use crate::error::{ApiError, ApiResult};

use axum::http::HeaderValue;
use axum::Router;
use chrono::{DateTime, Utc};
use rbg_common::api::types::{ImageInfo, ResultsResponse, RunRecordStatus};
use rbg_common::events::{AnalysisResult, ChannelMessage, LifecyclePhase, ModuleState, SystemStatus};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, watch, RwLock};
use tokio::task::JoinHandle;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, warn};

/// Frames buffered per progress channel subscriber
const FRAME_CAPACITY: usize = 256;

/// Latest analysis run of a session
#[derive(Debug, Clone)]
pub struct RunRecord {
    /// Server-side sequence number; only the newest run updates the record
    pub seq: u64,
    /// Client-assigned run id, if any
    pub run_id: Option<u64>,
    pub status: RunRecordStatus,
    pub progress: f64,
    pub results: Option<AnalysisResult>,
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl RunRecord {
    pub fn to_response(&self, session_id: &str) -> ResultsResponse {
        ResultsResponse {
            session_id: session_id.to_string(),
            status: self.status,
            progress: self.progress,
            results: self.results.clone(),
            error: self.error.clone(),
            run_id: self.run_id,
        }
    }
}

/// Counters behind `GET /api/metrics`
#[derive(Debug, Clone, Default)]
pub struct SimStats {
    pub completed: u64,
    pub positive_detections: u64,
    /// Sum of wall-clock run durations, in seconds
    pub total_processing_time: f64,
    pub errors: u64,
}

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<SimConfig>,
    /// Backend lifecycle status
    pub status: Arc<RwLock<SystemStatus>>,
    /// Outbound progress channel frames, fanned out to every connection
    pub frames: broadcast::Sender<ChannelMessage>,
    /// Uploaded images by session id
    pub sessions: Arc<RwLock<HashMap<String, ImageInfo>>>,
    /// Latest run by session id
    pub runs: Arc<RwLock<HashMap<String, RunRecord>>>,
    pub stats: Arc<RwLock<SimStats>>,
    /// Result reported by every successful run
    pub canned_result: Arc<AnalysisResult>,
    /// Service startup timestamp
    pub startup_time: DateTime<Utc>,
    /// Bumped to close every open progress channel
    disconnects: Arc<watch::Sender<u64>>,
    run_seq: Arc<AtomicU64>,
}

impl AppState {
    /// State with the result from `config.result_file`, or the built-in one
    pub fn new(config: SimConfig) -> anyhow::Result<Self> {
        let result = match &config.result_file {
            Some(path) => {
                let text = std::fs::read_to_string(path).map_err(|e| {
                    anyhow::anyhow!("Failed to read result file {}: {}", path.display(), e)
                })?;
                serde_json::from_str(&text).map_err(|e| {
                    anyhow::anyhow!("Invalid result file {}: {}", path.display(), e)
                })?
            }
            None => simulation::default_result(),
        };
        Ok(Self::with_result(config, result))
    }

    /// State reporting `result` for every successful run
    pub fn with_result(config: SimConfig, result: AnalysisResult) -> Self {
        let status = SystemStatus::with_modules(
            LifecyclePhase::Starting,
            config.modules.iter().map(String::as_str),
            ModuleState::Pending,
        );
        let (frames, _) = broadcast::channel(FRAME_CAPACITY);
        let (disconnects, _) = watch::channel(0);
        Self {
            config: Arc::new(config),
            status: Arc::new(RwLock::new(status)),
            frames,
            sessions: Arc::new(RwLock::new(HashMap::new())),
            runs: Arc::new(RwLock::new(HashMap::new())),
            stats: Arc::new(RwLock::new(SimStats::default())),
            canned_result: Arc::new(result),
            startup_time: Utc::now(),
            disconnects: Arc::new(disconnects),
            run_seq: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Send a frame to every open progress channel
    pub fn broadcast(&self, frame: ChannelMessage) {
        let kind = frame.message_type();
        if self.frames.send(frame).is_err() {
            debug!(kind, "No progress channel subscribers");
        }
    }

    /// Close every open progress channel; clients are expected to reconnect
    pub fn drop_channels(&self) {
        self.disconnects.send_modify(|generation| *generation += 1);
        warn!("Dropping all progress channels");
    }

    /// Watch that changes whenever `drop_channels` is called
    pub fn disconnect_signal(&self) -> watch::Receiver<u64> {
        self.disconnects.subscribe()
    }

    pub(crate) fn next_run_seq(&self) -> u64 {
        self.run_seq.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub async fn is_ready(&self) -> bool {
        self.status.read().await.phase == LifecyclePhase::Ready
    }
}

/// Run the scripted module initialization in the background
pub fn start_initialization(state: &AppState) -> JoinHandle<()> {
    tokio::spawn(simulation::initialize(state.clone()))
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    let origins: Vec<HeaderValue> = state
        .config
        .cors_origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    let cors = CorsLayer::new()
        .allow_origin(origins)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .merge(api::status_routes())
        .merge(api::upload_routes())
        .merge(api::analysis_routes())
        .merge(api::channel_routes())
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}
