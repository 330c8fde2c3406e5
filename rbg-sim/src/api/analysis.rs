//! Analysis request and result endpoints

use axum::{
    body::Bytes,
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use rbg_common::api::types::{
    AnalysisSettings, AnalyzeAccepted, AnalyzeRequest, ResultsResponse, RunRecordStatus,
};
use tracing::info;

use crate::error::{ApiError, ApiResult};
use crate::{simulation, AppState, RunRecord};

/// POST /api/analyze/:session_id
///
/// Body is an `AnalyzeRequest`; an empty body means default settings.
/// Queues a run and returns immediately; progress goes out on the channel.
/// A new request for the same session replaces the previous run.
pub async fn analyze(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    body: Bytes,
) -> ApiResult<Json<AnalyzeAccepted>> {
    if !state.is_ready().await {
        return Err(ApiError::BadRequest("System not ready yet".to_string()));
    }
    if !state.sessions.read().await.contains_key(&session_id) {
        return Err(ApiError::NotFound("Session not found".to_string()));
    }

    let request = parse_request(&body)?;
    request.settings.validate()?;

    let seq = state.next_run_seq();
    state.runs.write().await.insert(
        session_id.clone(),
        RunRecord {
            seq,
            run_id: request.run_id,
            status: RunRecordStatus::Running,
            progress: 0.0,
            results: None,
            error: None,
            started_at: Utc::now(),
            completed_at: None,
        },
    );
    info!(session_id = %session_id, run_id = ?request.run_id, seq, "Analysis queued");

    tokio::spawn(simulation::run_analysis(
        state.clone(),
        session_id.clone(),
        seq,
        request.run_id,
        request.settings,
    ));

    Ok(Json(AnalyzeAccepted {
        session_id,
        status: "started".to_string(),
        run_id: request.run_id,
        message: Some("Analysis started".to_string()),
    }))
}

fn parse_request(body: &[u8]) -> ApiResult<AnalyzeRequest> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(AnalyzeRequest {
            settings: AnalysisSettings::default(),
            run_id: None,
        });
    }
    serde_json::from_slice(body)
        .map_err(|e| ApiError::BadRequest(format!("Invalid analysis settings: {e}")))
}

/// GET /api/results/:session_id
///
/// State of the session's latest run.
pub async fn get_results(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> ApiResult<Json<ResultsResponse>> {
    let runs = state.runs.read().await;
    let record = runs
        .get(&session_id)
        .ok_or_else(|| ApiError::NotFound("Session not found".to_string()))?;
    Ok(Json(record.to_response(&session_id)))
}

/// Build analysis routes
pub fn analysis_routes() -> Router<AppState> {
    Router::new()
        .route("/api/analyze/:session_id", post(analyze))
        .route("/api/results/:session_id", get(get_results))
}
