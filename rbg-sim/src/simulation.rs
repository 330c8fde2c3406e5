//! Scripted backend behavior
//!
//! Module initialization loads each configured module in order, one
//! `init_step` apart. An analysis run walks `progress_steps`, one
//! `analysis_step` apart, then reports the canned result. Every state change
//! is broadcast on the progress channel.

use chrono::Utc;
use rbg_common::api::types::{AnalysisSettings, RunRecordStatus};
use rbg_common::events::{
    AnalysisResult, AnalysisSummary, ChannelMessage, LifecyclePhase, ModuleState, ModuleStatus,
    RegionFinding, RiskTier, Urgency,
};
use rbg_common::time;
use tokio::time::sleep;
use tracing::{error, info, warn};

use crate::{AppState, RunRecord};

const STEP_MESSAGES: [&str; 6] = [
    "Loading image...",
    "Detecting eye regions...",
    "Processing with Gemma 3n AI...",
    "Analyzing for leukocoria...",
    "Generating medical report...",
    "Finalizing results...",
];

/// Load every configured module, reporting progress as it goes
pub async fn initialize(state: AppState) {
    let modules = state.config.modules.clone();
    let total = modules.len().max(1) as f64;

    {
        let mut status = state.status.write().await;
        status.phase = LifecyclePhase::Loading;
        status.overall_progress = 0.0;
        status.error = None;
    }
    publish_progress(&state, "Starting system initialization...").await;

    for (index, module) in modules.iter().enumerate() {
        set_module(&state, module, ModuleState::Loading, 0.0).await;
        publish_progress(&state, &format!("Loading {module}...")).await;

        sleep(state.config.init_step()).await;

        if state.config.fail_module.as_deref() == Some(module.as_str()) {
            let message = format!("Failed to load {module}");
            error!(module = %module, "Simulated initialization failure");
            let snapshot = {
                let mut status = state.status.write().await;
                if let Some(entry) = status.modules.get_mut(module) {
                    entry.status = ModuleState::Error;
                }
                status.phase = LifecyclePhase::Error;
                status.error = Some(message.clone());
                status.clone()
            };
            state.broadcast(ChannelMessage::InitializationError {
                status: Some(snapshot),
                error: message,
            });
            return;
        }

        set_module(&state, module, ModuleState::Ready, 100.0).await;
        {
            let mut status = state.status.write().await;
            status.overall_progress = (index + 1) as f64 / total * 100.0;
        }
        info!(module = %module, "Module ready");
        publish_progress(&state, &format!("{module} ready")).await;
    }

    let snapshot = {
        let mut status = state.status.write().await;
        status.phase = LifecyclePhase::Ready;
        status.overall_progress = 100.0;
        status.clone()
    };
    info!("All modules ready");
    state.broadcast(ChannelMessage::InitializationComplete {
        status: Some(snapshot),
        message: Some("All modules loaded successfully!".to_string()),
    });
}

async fn set_module(state: &AppState, module: &str, module_state: ModuleState, progress: f64) {
    let mut status = state.status.write().await;
    status.modules.insert(
        module.to_string(),
        ModuleStatus {
            status: module_state,
            progress,
        },
    );
}

async fn publish_progress(state: &AppState, message: &str) {
    let snapshot = state.status.read().await.clone();
    state.broadcast(ChannelMessage::InitializationProgress {
        status: snapshot,
        message: Some(message.to_string()),
    });
}

/// Drive one analysis run to completion
///
/// `seq` identifies the run server-side; a newer run for the same session
/// takes over the record and this one stops at its next step.
pub async fn run_analysis(
    state: AppState,
    session_id: String,
    seq: u64,
    run_id: Option<u64>,
    settings: AnalysisSettings,
) {
    let started_at = Utc::now();
    info!(
        session_id = %session_id,
        ?run_id,
        threshold = settings.confidence_threshold,
        face_tracking = settings.face_tracking,
        enhanced_detection = settings.enhanced_detection,
        "Analysis started"
    );

    state.broadcast(ChannelMessage::AnalysisProgress {
        session_id: session_id.clone(),
        run_id,
        progress: 0.0,
        message: Some("Starting retinoblastoma analysis...".to_string()),
    });

    let steps = state.config.progress_steps.clone();
    let fail_at = steps.len() / 2;

    for (index, progress) in steps.iter().copied().enumerate() {
        sleep(state.config.analysis_step()).await;

        if index == fail_at {
            if let Some(message) = state.config.analysis_error.clone() {
                fail_run(&state, &session_id, seq, run_id, message).await;
                return;
            }
        }

        if !update_record(&state, &session_id, seq, |record| record.progress = progress).await {
            info!(session_id = %session_id, ?run_id, "Run superseded, stopping");
            return;
        }
        state.broadcast(ChannelMessage::AnalysisProgress {
            session_id: session_id.clone(),
            run_id,
            progress,
            message: Some(STEP_MESSAGES[index % STEP_MESSAGES.len()].to_string()),
        });
    }

    sleep(state.config.analysis_step()).await;

    // An empty step list still fails when an error is configured
    if steps.is_empty() {
        if let Some(message) = state.config.analysis_error.clone() {
            fail_run(&state, &session_id, seq, run_id, message).await;
            return;
        }
    }

    let completed_at = Utc::now();
    let mut result = (*state.canned_result).clone();
    result.session_id = session_id.clone();
    result.processing_time = Some(time::elapsed_seconds(started_at, completed_at));

    let stored = result.clone();
    let current = update_record(&state, &session_id, seq, move |record| {
        record.status = RunRecordStatus::Completed;
        record.progress = 100.0;
        record.results = Some(stored);
        record.completed_at = Some(completed_at);
    })
    .await;
    if !current {
        info!(session_id = %session_id, ?run_id, "Run superseded, stopping");
        return;
    }

    {
        let mut stats = state.stats.write().await;
        stats.completed += 1;
        stats.positive_detections += result.positive_findings();
        stats.total_processing_time += time::elapsed_seconds(started_at, completed_at);
    }

    info!(session_id = %session_id, ?run_id, "Analysis completed");
    state.broadcast(ChannelMessage::AnalysisComplete {
        session_id,
        run_id,
        results: result,
    });
}

async fn fail_run(state: &AppState, session_id: &str, seq: u64, run_id: Option<u64>, message: String) {
    warn!(session_id = %session_id, ?run_id, error = %message, "Simulated analysis failure");
    let stored = message.clone();
    let current = update_record(state, session_id, seq, move |record| {
        record.status = RunRecordStatus::Error;
        record.error = Some(stored);
        record.completed_at = Some(Utc::now());
    })
    .await;
    if !current {
        return;
    }
    state.stats.write().await.errors += 1;
    state.broadcast(ChannelMessage::AnalysisError {
        session_id: session_id.to_string(),
        run_id,
        error: message,
    });
}

/// Apply `update` if `seq` is still the session's latest run
async fn update_record(
    state: &AppState,
    session_id: &str,
    seq: u64,
    update: impl FnOnce(&mut RunRecord),
) -> bool {
    let mut runs = state.runs.write().await;
    match runs.get_mut(session_id) {
        Some(record) if record.seq == seq => {
            update(record);
            true
        }
        _ => false,
    }
}

/// Built-in result: both eyes normal, low risk
pub fn default_result() -> AnalysisResult {
    let normal_eye = |region_id: u32, region_type: &str, confidence: f64| RegionFinding {
        region_id: Some(region_id),
        region_type: region_type.to_string(),
        leukocoria_detected: false,
        confidence,
        risk_level: RiskTier::Low,
        medical_reasoning: Some(
            "Normal dark pupil appearance with no signs of leukocoria. Healthy retinal reflex observed."
                .to_string(),
        ),
        recommendations: Some("Continue routine pediatric eye monitoring".to_string()),
        urgency: Some(Urgency::Routine),
    };

    AnalysisResult {
        session_id: String::new(),
        total_regions: 2,
        positive_detections: 0,
        results: vec![normal_eye(0, "left_eye", 0.925), normal_eye(1, "right_eye", 0.898)],
        analysis_method: Some("gemma3n_local".to_string()),
        processing_time: None,
        summary: Some(AnalysisSummary {
            overall_risk: RiskTier::Low,
            recommendation:
                "No signs of retinoblastoma detected. Continue regular pediatric eye examinations."
                    .to_string(),
            next_screening: Some("6 months".to_string()),
        }),
    }
}
