//! Shared helpers for rbg-sim integration tests

#![allow(dead_code)]

use axum::body::Body;
use axum::http::{header, Request, Response};
use http_body_util::BodyExt;
use rbg_sim::simulation::{default_result, initialize};
use rbg_sim::{AppState, SimConfig};
use serde_json::Value;
use std::io::Cursor;

pub const BOUNDARY: &str = "rbg-test-boundary";

/// Config with no artificial delays
pub fn fast_config() -> SimConfig {
    SimConfig {
        modules: vec!["face".into(), "eye".into(), "gemma".into()],
        init_step_ms: 0,
        analysis_step_ms: 0,
        progress_steps: vec![50.0],
        ping_interval_ms: 60_000,
        ..SimConfig::default()
    }
}

/// State whose modules have all finished loading
pub async fn ready_state() -> AppState {
    let state = AppState::with_result(fast_config(), default_result());
    initialize(state.clone()).await;
    state
}

pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let image = image::DynamicImage::ImageRgb8(image::RgbImage::new(width, height));
    let mut bytes = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
        .unwrap();
    bytes
}

/// `POST /api/upload-image` with one `file` part
pub fn upload_request(filename: &str, content_type: &str, bytes: &[u8]) -> Request<Body> {
    let mut body = Vec::new();
    body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
    body.extend_from_slice(
        format!("Content-Disposition: form-data; name=\"file\"; filename=\"{filename}\"\r\n")
            .as_bytes(),
    );
    body.extend_from_slice(format!("Content-Type: {content_type}\r\n\r\n").as_bytes());
    body.extend_from_slice(bytes);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

    Request::builder()
        .method("POST")
        .uri("/api/upload-image")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap()
}

pub fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

pub fn post_json(uri: &str, json: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(json.to_string()))
        .unwrap()
}

pub async fn body_json(response: Response<Body>) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}
