//! Backend REST client
//!
//! `BackendApi` is the seam between the client core and the backend's HTTP
//! endpoints. `HttpBackend` implements it with reqwest; tests substitute
//! in-memory fakes to observe exactly which calls were made.

use async_trait::async_trait;
use rbg_common::api::{
    self, AnalyzeAccepted, AnalyzeRequest, ApiErrorResponse, MetricsResponse, ResultsResponse,
    StatusResponse, UploadResponse,
};
use reqwest::multipart::{Form, Part};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::debug;

use crate::error::{ClientError, ClientResult};
use crate::session::Artifact;

const USER_AGENT: &str = concat!("rbg-client/", env!("CARGO_PKG_VERSION"));

/// Backend REST operations used by the client
#[async_trait]
pub trait BackendApi: Send + Sync {
    /// `POST /api/upload-image`
    async fn upload(&self, artifact: &Artifact) -> ClientResult<UploadResponse>;

    /// `POST /api/analyze/{session_id}`; returns once the run is queued
    async fn analyze(
        &self,
        session_id: &str,
        request: &AnalyzeRequest,
    ) -> ClientResult<AnalyzeAccepted>;

    /// `GET /api/results/{session_id}`; `None` when the backend has no record
    async fn results(&self, session_id: &str) -> ClientResult<Option<ResultsResponse>>;

    /// `GET /api/status`
    async fn status(&self) -> ClientResult<StatusResponse>;

    /// `GET /api/metrics`
    async fn metrics(&self) -> ClientResult<MetricsResponse>;
}

/// reqwest-backed implementation of [`BackendApi`]
#[derive(Debug, Clone)]
pub struct HttpBackend {
    http_client: reqwest::Client,
    base_url: String,
}

impl HttpBackend {
    pub fn new(base_url: &str, timeout: Duration) -> ClientResult<Self> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| ClientError::Transport(e.to_string()))?;

        Ok(Self {
            http_client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Decode a success body, or turn an error status into `ClientError::Http`
    async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> ClientResult<T> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ClientError::Http {
                status: status.as_u16(),
                message: ApiErrorResponse::message_from_body(&body),
            });
        }
        let body = response.bytes().await?;
        serde_json::from_slice(&body).map_err(|e| ClientError::InvalidResponse(e.to_string()))
    }
}

#[async_trait]
impl BackendApi for HttpBackend {
    async fn upload(&self, artifact: &Artifact) -> ClientResult<UploadResponse> {
        let part = Part::bytes(artifact.bytes().to_vec())
            .file_name(artifact.filename().to_string())
            .mime_str(artifact.mime_type())
            .map_err(|e| ClientError::InvalidArtifact(e.to_string()))?;
        let form = Form::new().part(api::UPLOAD_FIELD, part);

        debug!(
            filename = %artifact.filename(),
            bytes = artifact.len(),
            "Uploading image"
        );

        let response = self
            .http_client
            .post(self.url(api::UPLOAD_PATH))
            .multipart(form)
            .send()
            .await?;
        Self::decode(response).await
    }

    async fn analyze(
        &self,
        session_id: &str,
        request: &AnalyzeRequest,
    ) -> ClientResult<AnalyzeAccepted> {
        debug!(session_id = %session_id, run_id = ?request.run_id, "Requesting analysis");

        let response = self
            .http_client
            .post(self.url(&api::analyze_path(session_id)))
            .json(request)
            .send()
            .await?;
        Self::decode(response).await
    }

    async fn results(&self, session_id: &str) -> ClientResult<Option<ResultsResponse>> {
        let response = self
            .http_client
            .get(self.url(&api::results_path(session_id)))
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        Self::decode(response).await.map(Some)
    }

    async fn status(&self) -> ClientResult<StatusResponse> {
        let response = self
            .http_client
            .get(self.url(api::STATUS_PATH))
            .send()
            .await?;
        Self::decode(response).await
    }

    async fn metrics(&self) -> ClientResult<MetricsResponse> {
        let response = self
            .http_client
            .get(self.url(api::METRICS_PATH))
            .send()
            .await?;
        Self::decode(response).await
    }
}
