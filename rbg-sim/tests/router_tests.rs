//! HTTP routing integration tests for rbg-sim

mod helpers;

use axum::http::StatusCode;
use helpers::*;
use rbg_sim::simulation::default_result;
use rbg_sim::{build_router, AppState};
use serde_json::Value;
use std::time::Duration;
use tower::ServiceExt;

#[tokio::test]
async fn test_index_lists_endpoints() {
    let app = build_router(ready_state().await);

    let response = app.oneshot(get("/")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["module"], "rbg-sim");
    assert_eq!(body["endpoints"]["websocket"], "/ws/progress");
}

#[tokio::test]
async fn test_status_before_initialization() {
    // Given: modules not loaded yet
    let state = AppState::with_result(fast_config(), default_result());
    let app = build_router(state);

    // When: GET /api/status
    let response = app.oneshot(get("/api/status")).await.unwrap();

    // Then: not ready, every module pending
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "starting");
    assert_eq!(body["ready"], false);
    assert_eq!(body["app_ready"], true);
    assert_eq!(body["modules"]["gemma"]["status"], "pending");
}

#[tokio::test]
async fn test_status_after_initialization() {
    let app = build_router(ready_state().await);

    let response = app.clone().oneshot(get("/api/status")).await.unwrap();
    let body = body_json(response).await;
    assert_eq!(body["status"], "ready");
    assert_eq!(body["ready"], true);
    assert_eq!(body["overall_progress"], 100.0);

    let response = app.oneshot(get("/api/modules-status")).await.unwrap();
    let body = body_json(response).await;
    assert_eq!(body["initializing"], false);
    assert_eq!(body["modules"].as_object().unwrap().len(), 3);
}

#[tokio::test]
async fn test_upload_png() {
    let app = build_router(ready_state().await);

    let response = app
        .oneshot(upload_request("eye.png", "image/png", &png_bytes(32, 24)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert!(!body["session_id"].as_str().unwrap().is_empty());
    assert_eq!(body["image_info"]["filename"], "eye.png");
    assert_eq!(body["image_info"]["dimensions"], "32x24");
    assert_eq!(body["image_info"]["format"], "PNG");
}

#[tokio::test]
async fn test_upload_issues_fresh_session_ids() {
    let app = build_router(ready_state().await);
    let bytes = png_bytes(4, 4);

    let first = body_json(
        app.clone()
            .oneshot(upload_request("a.png", "image/png", &bytes))
            .await
            .unwrap(),
    )
    .await;
    let second = body_json(
        app.oneshot(upload_request("a.png", "image/png", &bytes))
            .await
            .unwrap(),
    )
    .await;

    assert_ne!(first["session_id"], second["session_id"]);
}

#[tokio::test]
async fn test_upload_rejects_non_image() {
    let app = build_router(ready_state().await);

    let response = app
        .oneshot(upload_request("notes.txt", "text/plain", b"hello"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["error"]["code"], "BAD_REQUEST");
    assert_eq!(body["error"]["message"], "File must be an image");
}

#[tokio::test]
async fn test_analyze_before_ready_is_rejected() {
    let state = AppState::with_result(fast_config(), default_result());
    let app = build_router(state);

    let response = app
        .oneshot(post_json("/api/analyze/anything", "{}"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["error"]["message"], "System not ready yet");
}

#[tokio::test]
async fn test_analyze_unknown_session() {
    let app = build_router(ready_state().await);

    let response = app
        .oneshot(post_json("/api/analyze/no-such-session", ""))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = body_json(response).await;
    assert_eq!(body["error"]["message"], "Session not found");
}

#[tokio::test]
async fn test_results_unknown_session() {
    let app = build_router(ready_state().await);

    let response = app.oneshot(get("/api/results/nope")).await.unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_analyze_rejects_bad_threshold() {
    let app = build_router(ready_state().await);
    let upload = body_json(
        app.clone()
            .oneshot(upload_request("eye.png", "image/png", &png_bytes(4, 4)))
            .await
            .unwrap(),
    )
    .await;
    let session_id = upload["session_id"].as_str().unwrap();

    let response = app
        .oneshot(post_json(
            &format!("/api/analyze/{session_id}"),
            r#"{"confidence_threshold": 2.0, "face_tracking": true, "enhanced_detection": true}"#,
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_analysis_runs_to_completion() {
    // Given: a ready backend with an uploaded image
    let state = ready_state().await;
    let app = build_router(state);
    let upload = body_json(
        app.clone()
            .oneshot(upload_request("eye.png", "image/png", &png_bytes(8, 8)))
            .await
            .unwrap(),
    )
    .await;
    let session_id = upload["session_id"].as_str().unwrap().to_string();

    // When: analysis is requested with a run id
    let response = app
        .clone()
        .oneshot(post_json(
            &format!("/api/analyze/{session_id}"),
            r#"{"confidence_threshold": 0.5, "face_tracking": true,
                "enhanced_detection": true, "run_id": 1}"#,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let accepted = body_json(response).await;
    assert_eq!(accepted["status"], "started");
    assert_eq!(accepted["run_id"], 1);

    // Then: the results endpoint eventually reports the completed run
    let results = poll_until_done(&app, &session_id).await;
    assert_eq!(results["status"], "completed");
    assert_eq!(results["run_id"], 1);
    assert_eq!(results["results"]["session_id"], session_id.as_str());
    assert_eq!(results["results"]["total_regions"], 2);

    // And: metrics count it
    let metrics = body_json(app.oneshot(get("/api/metrics")).await.unwrap()).await;
    assert_eq!(metrics["total_analyses"], 1);
    assert_eq!(metrics["positive_detections"], 0);
    assert_eq!(metrics["errors"], 0);
    assert!(metrics["session_start"].as_f64().unwrap() > 0.0);
}

async fn poll_until_done(app: &axum::Router, session_id: &str) -> Value {
    for _ in 0..200 {
        let response = app
            .clone()
            .oneshot(get(&format!("/api/results/{session_id}")))
            .await
            .unwrap();
        let body = body_json(response).await;
        if body["status"] != "running" {
            return body;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("analysis did not finish");
}
