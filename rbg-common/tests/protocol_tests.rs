//! Wire-compatibility tests for progress channel frames and REST bodies
//!
//! Frames below are shaped exactly like those the Python backend emits.

use rbg_common::api::types::{ApiErrorResponse, ResultsResponse, RunRecordStatus, StatusResponse};
use rbg_common::events::{ChannelMessage, LifecyclePhase, ModuleState, RiskTier, Urgency};

#[test]
fn test_backend_initialization_sequence() {
    let frames = [
        r#"{"type": "status_update", "status": {"status": "starting", "modules": {
            "eye_detector": {"status": "waiting", "progress": 0},
            "gemma": {"status": "waiting", "progress": 0}}, "overall_progress": 0}}"#,
        r#"{"type": "initialization_progress", "status": {"status": "loading", "modules": {
            "eye_detector": {"status": "ready", "progress": 100},
            "gemma": {"status": "loading", "progress": 0}}, "overall_progress": 25},
            "message": "Eye Detector ready"}"#,
        r#"{"type": "initialization_complete", "status": {"status": "ready", "modules": {
            "eye_detector": {"status": "ready", "progress": 100},
            "gemma": {"status": "ready", "progress": 100}}, "overall_progress": 100},
            "message": "All modules loaded successfully!"}"#,
    ];

    let parsed: Vec<ChannelMessage> = frames
        .iter()
        .map(|f| ChannelMessage::parse_frame(f).unwrap().unwrap())
        .collect();

    let kinds: Vec<&str> = parsed.iter().map(ChannelMessage::message_type).collect();
    assert_eq!(
        kinds,
        ["status_update", "initialization_progress", "initialization_complete"]
    );

    let ChannelMessage::StatusUpdate { status } = &parsed[0] else {
        panic!("expected status_update");
    };
    assert_eq!(status.phase, LifecyclePhase::Starting);
    assert!(status
        .modules
        .values()
        .all(|m| m.status == ModuleState::Pending));
}

#[test]
fn test_backend_initialization_error_frame() {
    let frame = r#"{"type": "initialization_error",
        "status": {"status": "error", "modules": {}, "overall_progress": 50,
                   "error": "CUDA out of memory"},
        "error": "CUDA out of memory"}"#;

    let Some(ChannelMessage::InitializationError { status, error }) =
        ChannelMessage::parse_frame(frame).unwrap()
    else {
        panic!("expected initialization_error");
    };
    assert_eq!(error, "CUDA out of memory");
    let status = status.unwrap();
    assert_eq!(status.phase, LifecyclePhase::Error);
    assert_eq!(status.error.as_deref(), Some("CUDA out of memory"));
}

#[test]
fn test_backend_analysis_complete_frame() {
    let frame = r#"{"type": "analysis_complete", "session_id": "abc", "progress": 100,
        "results": {
            "session_id": "abc",
            "total_regions": 2,
            "positive_detections": 0,
            "analysis_method": "gemma3n_local",
            "processing_time": 5.2,
            "results": [
                {"region_id": 0, "region_type": "left_eye", "leukocoria_detected": false,
                 "confidence": 92.5, "risk_level": "low", "urgency": "routine",
                 "medical_reasoning": "Normal dark pupil appearance.",
                 "recommendations": "Continue routine pediatric eye monitoring"},
                {"region_id": 1, "region_type": "right_eye", "leukocoria_detected": false,
                 "confidence": 89.8, "risk_level": "low", "urgency": "routine"}
            ],
            "summary": {"overall_risk": "low",
                        "recommendation": "No signs of retinoblastoma detected.",
                        "next_screening": "6 months"}
        }}"#;

    let Some(ChannelMessage::AnalysisComplete { session_id, run_id, results }) =
        ChannelMessage::parse_frame(frame).unwrap()
    else {
        panic!("expected analysis_complete");
    };
    assert_eq!(session_id, "abc");
    assert_eq!(run_id, None);
    assert_eq!(results.results.len(), 2);
    assert!((results.results[0].confidence - 0.925).abs() < 1e-9);
    assert!((results.results[1].confidence - 0.898).abs() < 1e-9);
    assert_eq!(results.results[0].urgency, Some(Urgency::Routine));
    assert_eq!(results.highest_risk(), RiskTier::Low);
    assert_eq!(results.summary.unwrap().next_screening.as_deref(), Some("6 months"));
}

#[test]
fn test_status_response_shape() {
    let body = r#"{"status": "loading", "ready": false, "overall_progress": 40,
        "modules": {"gemma": {"status": "loading", "progress": 10}}, "app_ready": true}"#;
    let status: StatusResponse = serde_json::from_str(body).unwrap();
    assert!(!status.ready);
    assert!(status.app_ready);
    assert_eq!(status.modules["gemma"].status, ModuleState::Loading);
}

#[test]
fn test_results_response_completed() {
    let body = r#"{"session_id": "abc", "status": "completed", "progress": 100,
        "results": {"total_regions": 1, "results": []}, "error": null, "run_id": 2}"#;
    let response: ResultsResponse = serde_json::from_str(body).unwrap();
    assert_eq!(response.status, RunRecordStatus::Completed);
    assert_eq!(response.run_id, Some(2));
    assert_eq!(response.results.unwrap().total_regions, 1);
}

#[test]
fn test_error_body_from_python_backend() {
    assert_eq!(
        ApiErrorResponse::message_from_body(r#"{"detail": "System not ready yet"}"#),
        "System not ready yet"
    );
}
