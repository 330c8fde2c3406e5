//! Shared HTTP API types
//!
//! Request and response bodies for the backend REST endpoints:
//! - `POST /api/upload-image`
//! - `POST /api/analyze/{session_id}`
//! - `GET /api/results/{session_id}`
//! - `GET /api/status`
//! - `GET /api/modules-status`
//! - `GET /api/metrics`
//!
//! Contains only serde types and pure helpers; the client (reqwest) and the
//! simulation backend (axum) each wrap them with their own HTTP plumbing.

pub mod types;

pub use types::{
    AnalysisSettings, AnalyzeAccepted, AnalyzeRequest, ApiErrorBody, ApiErrorResponse, ImageInfo,
    MetricsResponse, ModulesStatusResponse, ResultsResponse, RunRecordStatus, StatusResponse,
    UploadResponse,
};

/// Upload endpoint path
pub const UPLOAD_PATH: &str = "/api/upload-image";
/// Multipart field name carrying the image
pub const UPLOAD_FIELD: &str = "file";
/// Status endpoint path
pub const STATUS_PATH: &str = "/api/status";
/// Module status endpoint path
pub const MODULES_STATUS_PATH: &str = "/api/modules-status";
/// Metrics endpoint path
pub const METRICS_PATH: &str = "/api/metrics";
/// Default real-time channel path
pub const CHANNEL_PATH: &str = "/ws/progress";

/// `POST /api/analyze/{session_id}`
pub fn analyze_path(session_id: &str) -> String {
    format!("/api/analyze/{session_id}")
}

/// `GET /api/results/{session_id}`
pub fn results_path(session_id: &str) -> String {
    format!("/api/results/{session_id}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_paths() {
        assert_eq!(analyze_path("s1"), "/api/analyze/s1");
        assert_eq!(results_path("abc-123"), "/api/results/abc-123");
    }
}
