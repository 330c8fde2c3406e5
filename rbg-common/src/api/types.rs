//! REST request/response bodies

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::events::{AnalysisResult, LifecyclePhase, ModuleStatus};
use crate::{Error, Result};

// ========================================
// Upload
// ========================================

/// Metadata of an uploaded image
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageInfo {
    pub filename: String,
    /// `"WxH"`, or `"unknown"` when the backend could not decode the image
    pub dimensions: String,
    /// Payload size in bytes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    /// Image format as detected by the backend (e.g. "PNG")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
}

impl ImageInfo {
    /// Width and height, if `dimensions` is a `"WxH"` string
    pub fn parsed_dimensions(&self) -> Option<(u32, u32)> {
        let (w, h) = self.dimensions.split_once('x')?;
        Some((w.trim().parse().ok()?, h.trim().parse().ok()?))
    }
}

/// `POST /api/upload-image` response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadResponse {
    /// Backend-issued session token
    pub session_id: String,
    pub image_info: ImageInfo,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

// ========================================
// Analyze
// ========================================

/// User-selected analysis options, snapshotted per run
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AnalysisSettings {
    /// Detection confidence threshold in [0, 1]
    pub confidence_threshold: f64,
    pub face_tracking: bool,
    pub enhanced_detection: bool,
}

impl Default for AnalysisSettings {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.5,
            face_tracking: true,
            enhanced_detection: true,
        }
    }
}

impl AnalysisSettings {
    /// Check the threshold is a number in [0, 1]
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            return Err(Error::InvalidInput(format!(
                "confidence_threshold must be in [0, 1], got {}",
                self.confidence_threshold
            )));
        }
        Ok(())
    }
}

/// `POST /api/analyze/{session_id}` body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyzeRequest {
    #[serde(flatten)]
    pub settings: AnalysisSettings,
    /// Client-assigned run id, echoed on every `analysis_*` frame
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_id: Option<u64>,
}

/// `POST /api/analyze/{session_id}` response: the run was queued
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyzeAccepted {
    pub session_id: String,
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_id: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

// ========================================
// Results (poll fallback)
// ========================================

/// Backend-side state of the latest run of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunRecordStatus {
    Running,
    Completed,
    Error,
}

/// `GET /api/results/{session_id}` response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultsResponse {
    pub session_id: String,
    pub status: RunRecordStatus,
    #[serde(default)]
    pub progress: f64,
    #[serde(default)]
    pub results: Option<AnalysisResult>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_id: Option<u64>,
}

// ========================================
// Status and metrics
// ========================================

/// `GET /api/status` response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusResponse {
    pub status: LifecyclePhase,
    pub ready: bool,
    #[serde(default)]
    pub overall_progress: f64,
    #[serde(default)]
    pub modules: BTreeMap<String, ModuleStatus>,
    /// Backend application object exists (may be true before modules are ready)
    #[serde(default)]
    pub app_ready: bool,
}

/// `GET /api/modules-status` response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModulesStatusResponse {
    pub modules: BTreeMap<String, ModuleStatus>,
    pub initializing: bool,
    #[serde(default)]
    pub overall_progress: f64,
}

/// `GET /api/metrics` response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsResponse {
    pub total_analyses: u64,
    pub positive_detections: u64,
    /// Seconds
    pub average_processing_time: f64,
    pub errors: u64,
    /// Unix epoch seconds
    pub session_start: f64,
}

// ========================================
// Error Response Types
// ========================================

/// Error body inside an [`ApiErrorResponse`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiErrorBody {
    /// Machine-readable code, e.g. "NOT_FOUND"
    pub code: String,
    pub message: String,
}

/// JSON error response: `{"error": {"code": ..., "message": ...}}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiErrorResponse {
    pub error: ApiErrorBody,
}

impl ApiErrorResponse {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: ApiErrorBody {
                code: code.into(),
                message: message.into(),
            },
        }
    }

    /// Extract a human-readable message from an error response body
    ///
    /// Understands this crate's error shape and the `{"detail": ...}` shape
    /// some backends use; anything else is returned verbatim.
    pub fn message_from_body(body: &str) -> String {
        if let Ok(parsed) = serde_json::from_str::<ApiErrorResponse>(body) {
            return parsed.error.message;
        }
        if let Ok(value) = serde_json::from_str::<serde_json::Value>(body) {
            if let Some(detail) = value.get("detail").and_then(|d| d.as_str()) {
                return detail.to_string();
            }
        }
        body.trim().to_string()
    }
}

// ========================================
// Tests
// ========================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parsed_dimensions() {
        let info = ImageInfo {
            filename: "eye.png".into(),
            dimensions: "640x480".into(),
            size: Some(1024),
            format: Some("PNG".into()),
        };
        assert_eq!(info.parsed_dimensions(), Some((640, 480)));

        let unknown = ImageInfo {
            dimensions: "unknown".into(),
            ..info
        };
        assert_eq!(unknown.parsed_dimensions(), None);
    }

    #[test]
    fn test_upload_response_minimal() {
        let json = r#"{"session_id": "s1", "image_info": {"filename": "a.jpg", "dimensions": "10x20"}}"#;
        let resp: UploadResponse = serde_json::from_str(json).unwrap();
        assert_eq!(resp.session_id, "s1");
        assert_eq!(resp.image_info.parsed_dimensions(), Some((10, 20)));
        assert!(resp.image_info.size.is_none());
    }

    #[test]
    fn test_analyze_request_is_flat() {
        let request = AnalyzeRequest {
            settings: AnalysisSettings::default(),
            run_id: Some(2),
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["confidence_threshold"], 0.5);
        assert_eq!(value["face_tracking"], true);
        assert_eq!(value["enhanced_detection"], true);
        assert_eq!(value["run_id"], 2);
    }

    #[test]
    fn test_analyze_request_without_run_id() {
        let json = r#"{"confidence_threshold": 0.7, "face_tracking": false, "enhanced_detection": true}"#;
        let request: AnalyzeRequest = serde_json::from_str(json).unwrap();
        assert_eq!(request.run_id, None);
        assert!(!request.settings.face_tracking);
    }

    #[test]
    fn test_settings_validation() {
        assert!(AnalysisSettings::default().validate().is_ok());
        let bad = AnalysisSettings {
            confidence_threshold: 1.5,
            ..AnalysisSettings::default()
        };
        assert!(matches!(bad.validate(), Err(Error::InvalidInput(_))));
        let nan = AnalysisSettings {
            confidence_threshold: f64::NAN,
            ..AnalysisSettings::default()
        };
        assert!(nan.validate().is_err());
    }

    #[test]
    fn test_results_response_running() {
        let json = r#"{"session_id": "s1", "status": "running", "progress": 40, "results": null, "error": null}"#;
        let resp: ResultsResponse = serde_json::from_str(json).unwrap();
        assert_eq!(resp.status, RunRecordStatus::Running);
        assert!(resp.results.is_none());
        assert!(resp.run_id.is_none());
    }

    #[test]
    fn test_error_message_extraction() {
        let ours = serde_json::to_string(&ApiErrorResponse::new("BAD_REQUEST", "System not ready yet")).unwrap();
        assert_eq!(ApiErrorResponse::message_from_body(&ours), "System not ready yet");
        assert_eq!(
            ApiErrorResponse::message_from_body(r#"{"detail": "Session not found"}"#),
            "Session not found"
        );
        assert_eq!(ApiErrorResponse::message_from_body(" plain text "), "plain text");
    }
}
