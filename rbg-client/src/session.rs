//! Session Controller
//!
//! Owns the binding between an uploaded image and the backend-issued session
//! id, and gates analysis requests on that binding and on backend readiness.
//! At most one session is bound at a time; a successful upload replaces it.

use chrono::{DateTime, Utc};
use rbg_common::api::types::{AnalysisSettings, AnalyzeRequest, ImageInfo};
use serde::Serialize;
use std::path::Path;
use tracing::{info, warn};

use crate::backend::BackendApi;
use crate::error::{ClientError, ClientResult};

/// Image payload to upload
#[derive(Debug, Clone)]
pub struct Artifact {
    filename: String,
    bytes: Vec<u8>,
    mime_type: &'static str,
}

impl Artifact {
    /// Build an artifact from raw bytes
    ///
    /// Fails unless the payload is non-empty and sniffs as an image.
    pub fn new(filename: impl Into<String>, bytes: Vec<u8>) -> ClientResult<Self> {
        let filename = filename.into();
        if bytes.is_empty() {
            return Err(ClientError::InvalidArtifact(format!("{filename} is empty")));
        }
        let kind = infer::get(&bytes).ok_or_else(|| {
            ClientError::InvalidArtifact(format!("{filename}: unrecognized file type"))
        })?;
        if kind.matcher_type() != infer::MatcherType::Image {
            return Err(ClientError::InvalidArtifact(format!(
                "{filename}: expected an image, got {}",
                kind.mime_type()
            )));
        }
        Ok(Self {
            filename,
            bytes,
            mime_type: kind.mime_type(),
        })
    }

    /// Read an artifact from disk
    pub async fn from_path(path: &Path) -> ClientResult<Self> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| ClientError::InvalidArtifact(format!("{}: {}", path.display(), e)))?;
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "image".to_string());
        Self::new(filename, bytes)
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn mime_type(&self) -> &'static str {
        self.mime_type
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// A bound session
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Session {
    pub id: String,
    pub image: ImageInfo,
    pub bound_at: DateTime<Utc>,
}

/// Result of an accepted analysis request
#[derive(Debug, Clone, PartialEq)]
pub struct AcceptedRun {
    pub run_id: u64,
    pub session_id: String,
    /// Settings snapshot; later changes to the caller's settings do not affect the run
    pub settings: AnalysisSettings,
    pub accepted_at: DateTime<Utc>,
}

/// Session Controller state
#[derive(Debug, Default)]
pub struct SessionController {
    session: Option<Session>,
    last_run_id: u64,
}

impl SessionController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Currently bound session
    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    /// Upload an artifact and bind the returned session
    ///
    /// The previous session stays bound if the upload fails.
    pub async fn upload<B>(&mut self, backend: &B, artifact: &Artifact) -> ClientResult<Session>
    where
        B: BackendApi + ?Sized,
    {
        let response = backend.upload(artifact).await?;
        if response.session_id.trim().is_empty() {
            return Err(ClientError::InvalidResponse(
                "upload response carried an empty session_id".to_string(),
            ));
        }

        let session = Session {
            id: response.session_id,
            image: response.image_info,
            bound_at: Utc::now(),
        };
        if let Some(previous) = self.session.replace(session.clone()) {
            info!(
                previous = %previous.id,
                session_id = %session.id,
                "New upload replaced bound session"
            );
        } else {
            info!(session_id = %session.id, filename = %session.image.filename, "Session bound");
        }
        Ok(session)
    }

    /// Check the request preconditions without any network call
    ///
    /// Order matters: a missing session is reported before readiness.
    pub fn check_request(&self, ready: bool) -> ClientResult<&Session> {
        let session = self.session.as_ref().ok_or(ClientError::NoSession)?;
        if !ready {
            return Err(ClientError::NotReady);
        }
        Ok(session)
    }

    /// Request an analysis run for the bound session
    ///
    /// Returns once the backend acknowledges the request; progress and the
    /// result arrive later on the progress channel.
    pub async fn request_analysis<B>(
        &mut self,
        backend: &B,
        settings: AnalysisSettings,
        ready: bool,
    ) -> ClientResult<AcceptedRun>
    where
        B: BackendApi + ?Sized,
    {
        let session_id = self.check_request(ready)?.id.clone();
        settings.validate()?;

        self.last_run_id += 1;
        let run_id = self.last_run_id;
        let request = AnalyzeRequest {
            settings,
            run_id: Some(run_id),
        };

        let accepted = backend.analyze(&session_id, &request).await?;
        if let Some(echoed) = accepted.run_id {
            if echoed != run_id {
                warn!(run_id, echoed, "Backend acknowledged a different run id");
            }
        }

        info!(session_id = %session_id, run_id, "Analysis accepted");
        Ok(AcceptedRun {
            run_id,
            session_id,
            settings,
            accepted_at: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{png_bytes, FakeBackend};

    #[test]
    fn test_artifact_rejects_empty_payload() {
        let err = Artifact::new("eye.png", Vec::new()).unwrap_err();
        assert!(matches!(err, ClientError::InvalidArtifact(_)));
    }

    #[test]
    fn test_artifact_rejects_non_image() {
        let pdf = b"%PDF-1.4\n%\xe2\xe3\xcf\xd3\n".to_vec();
        let err = Artifact::new("report.pdf", pdf).unwrap_err();
        assert!(matches!(err, ClientError::InvalidArtifact(_)));

        let text = b"hello world".to_vec();
        assert!(Artifact::new("notes.txt", text).is_err());
    }

    #[test]
    fn test_artifact_accepts_png() {
        let artifact = Artifact::new("eye.png", png_bytes()).unwrap();
        assert_eq!(artifact.mime_type(), "image/png");
        assert_eq!(artifact.filename(), "eye.png");
        assert!(!artifact.is_empty());
    }

    #[tokio::test]
    async fn test_artifact_from_missing_path() {
        let err = Artifact::from_path(Path::new("/nonexistent/eye.png"))
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::InvalidArtifact(_)));
    }

    #[tokio::test]
    async fn test_request_without_session_makes_no_call() {
        let backend = FakeBackend::new("s1");
        let mut controller = SessionController::new();

        let err = controller
            .request_analysis(&backend, AnalysisSettings::default(), true)
            .await
            .unwrap_err();

        assert!(matches!(err, ClientError::NoSession));
        assert_eq!(backend.total_calls(), 0);
    }

    #[tokio::test]
    async fn test_request_when_not_ready_makes_no_call() {
        let backend = FakeBackend::new("s1");
        let mut controller = SessionController::new();
        let artifact = Artifact::new("eye.png", png_bytes()).unwrap();
        controller.upload(&backend, &artifact).await.unwrap();

        let err = controller
            .request_analysis(&backend, AnalysisSettings::default(), false)
            .await
            .unwrap_err();

        assert!(matches!(err, ClientError::NotReady));
        assert_eq!(backend.analyze_calls(), 0);
    }

    #[tokio::test]
    async fn test_no_session_reported_before_not_ready() {
        let controller = SessionController::new();
        assert!(matches!(
            controller.check_request(false),
            Err(ClientError::NoSession)
        ));
    }

    #[tokio::test]
    async fn test_accepted_request_snapshots_settings_and_numbers_runs() {
        let backend = FakeBackend::new("s1");
        let mut controller = SessionController::new();
        let artifact = Artifact::new("eye.png", png_bytes()).unwrap();
        let session = controller.upload(&backend, &artifact).await.unwrap();
        assert_eq!(session.id, "s1");

        let settings = AnalysisSettings {
            confidence_threshold: 0.5,
            face_tracking: true,
            enhanced_detection: true,
        };
        let first = controller
            .request_analysis(&backend, settings, true)
            .await
            .unwrap();
        let second = controller
            .request_analysis(&backend, settings, true)
            .await
            .unwrap();

        assert_eq!(first.session_id, "s1");
        assert_eq!(first.settings, settings);
        assert!(second.run_id > first.run_id);
        assert_eq!(backend.analyze_calls(), 2);
        assert_eq!(backend.last_analyze_request().unwrap().run_id, Some(second.run_id));
    }

    #[tokio::test]
    async fn test_invalid_threshold_rejected_before_network() {
        let backend = FakeBackend::new("s1");
        let mut controller = SessionController::new();
        let artifact = Artifact::new("eye.png", png_bytes()).unwrap();
        controller.upload(&backend, &artifact).await.unwrap();

        let settings = AnalysisSettings {
            confidence_threshold: 1.2,
            ..AnalysisSettings::default()
        };
        let err = controller
            .request_analysis(&backend, settings, true)
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Common(_)));
        assert_eq!(backend.analyze_calls(), 0);
    }

    #[tokio::test]
    async fn test_new_upload_replaces_session() {
        let backend = FakeBackend::new("s1");
        let mut controller = SessionController::new();
        let artifact = Artifact::new("eye.png", png_bytes()).unwrap();

        controller.upload(&backend, &artifact).await.unwrap();
        backend.set_next_session_id("s2");
        controller.upload(&backend, &artifact).await.unwrap();

        assert_eq!(controller.session().unwrap().id, "s2");
    }

    #[tokio::test]
    async fn test_failed_upload_keeps_previous_session() {
        let backend = FakeBackend::new("s1");
        let mut controller = SessionController::new();
        let artifact = Artifact::new("eye.png", png_bytes()).unwrap();
        controller.upload(&backend, &artifact).await.unwrap();

        backend.fail_transport(true);
        let err = controller.upload(&backend, &artifact).await.unwrap_err();

        assert!(matches!(err, ClientError::Transport(_)));
        assert_eq!(controller.session().unwrap().id, "s1");
    }

    #[tokio::test]
    async fn test_transport_failure_on_analyze_is_surfaced() {
        let backend = FakeBackend::new("s1");
        let mut controller = SessionController::new();
        let artifact = Artifact::new("eye.png", png_bytes()).unwrap();
        controller.upload(&backend, &artifact).await.unwrap();

        backend.fail_transport(true);
        let err = controller
            .request_analysis(&backend, AnalysisSettings::default(), true)
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Transport(_)));
        assert_eq!(controller.session().unwrap().id, "s1");
    }
}
