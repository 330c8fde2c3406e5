//! Service index, readiness and metrics endpoints

use axum::{extract::State, routing::get, Json, Router};
use rbg_common::api::types::{MetricsResponse, ModulesStatusResponse, StatusResponse};
use rbg_common::api::{CHANNEL_PATH, METRICS_PATH, MODULES_STATUS_PATH, STATUS_PATH, UPLOAD_PATH};
use rbg_common::events::LifecyclePhase;
use rbg_common::time;
use serde_json::{json, Value};

use crate::AppState;

/// GET /
///
/// Service name, version and endpoint map.
pub async fn index(State(state): State<AppState>) -> Json<Value> {
    let uptime_seconds = (chrono::Utc::now() - state.startup_time).num_seconds().max(0);
    Json(json!({
        "message": "RetinoblastoGemma simulation backend is running",
        "module": "rbg-sim",
        "version": env!("CARGO_PKG_VERSION"),
        "uptime_seconds": uptime_seconds,
        "endpoints": {
            "upload": UPLOAD_PATH,
            "analyze": "/api/analyze/{session_id}",
            "results": "/api/results/{session_id}",
            "status": STATUS_PATH,
            "modules_status": MODULES_STATUS_PATH,
            "metrics": METRICS_PATH,
            "websocket": CHANNEL_PATH,
        }
    }))
}

/// GET /api/status
pub async fn get_status(State(state): State<AppState>) -> Json<StatusResponse> {
    let status = state.status.read().await.clone();
    Json(StatusResponse {
        ready: status.phase == LifecyclePhase::Ready,
        status: status.phase,
        overall_progress: status.overall_progress,
        modules: status.modules,
        app_ready: true,
    })
}

/// GET /api/modules-status
pub async fn get_modules_status(State(state): State<AppState>) -> Json<ModulesStatusResponse> {
    let status = state.status.read().await.clone();
    Json(ModulesStatusResponse {
        initializing: status.phase.is_initializing(),
        overall_progress: status.overall_progress,
        modules: status.modules,
    })
}

/// GET /api/metrics
pub async fn get_metrics(State(state): State<AppState>) -> Json<MetricsResponse> {
    let stats = state.stats.read().await.clone();
    let average_processing_time = if stats.completed == 0 {
        0.0
    } else {
        stats.total_processing_time / stats.completed as f64
    };
    Json(MetricsResponse {
        total_analyses: stats.completed,
        positive_detections: stats.positive_detections,
        average_processing_time,
        errors: stats.errors,
        session_start: time::unix_seconds(state.startup_time),
    })
}

/// Build status routes
pub fn status_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(index))
        .route(STATUS_PATH, get(get_status))
        .route(MODULES_STATUS_PATH, get(get_modules_status))
        .route(METRICS_PATH, get(get_metrics))
}
