//! In-memory backend for unit tests

use async_trait::async_trait;
use rbg_common::api::types::{
    AnalyzeAccepted, AnalyzeRequest, ImageInfo, MetricsResponse, ResultsResponse, StatusResponse,
    UploadResponse,
};
use rbg_common::events::LifecyclePhase;
use std::collections::BTreeMap;
use std::io::Cursor;
use std::sync::Mutex;

use crate::backend::BackendApi;
use crate::error::{ClientError, ClientResult};
use crate::session::Artifact;

/// Small valid PNG
pub fn png_bytes() -> Vec<u8> {
    let image = image::DynamicImage::ImageRgb8(image::RgbImage::new(4, 3));
    let mut bytes = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
        .unwrap();
    bytes
}

#[derive(Default)]
struct FakeState {
    next_session_id: String,
    fail_transport: bool,
    upload_calls: usize,
    analyze_calls: usize,
    results_calls: usize,
    last_analyze: Option<AnalyzeRequest>,
    results: Option<ResultsResponse>,
}

/// Records every call; answers with canned bodies
pub struct FakeBackend {
    state: Mutex<FakeState>,
}

impl FakeBackend {
    pub fn new(session_id: &str) -> Self {
        Self {
            state: Mutex::new(FakeState {
                next_session_id: session_id.to_string(),
                ..FakeState::default()
            }),
        }
    }

    pub fn set_next_session_id(&self, session_id: &str) {
        self.state.lock().unwrap().next_session_id = session_id.to_string();
    }

    pub fn fail_transport(&self, fail: bool) {
        self.state.lock().unwrap().fail_transport = fail;
    }

    pub fn set_results(&self, results: Option<ResultsResponse>) {
        self.state.lock().unwrap().results = results;
    }

    pub fn analyze_calls(&self) -> usize {
        self.state.lock().unwrap().analyze_calls
    }

    pub fn total_calls(&self) -> usize {
        let state = self.state.lock().unwrap();
        state.upload_calls + state.analyze_calls + state.results_calls
    }

    pub fn last_analyze_request(&self) -> Option<AnalyzeRequest> {
        self.state.lock().unwrap().last_analyze.clone()
    }

    fn check_transport(&self) -> ClientResult<()> {
        if self.state.lock().unwrap().fail_transport {
            return Err(ClientError::Transport("connection refused".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl BackendApi for FakeBackend {
    async fn upload(&self, artifact: &Artifact) -> ClientResult<UploadResponse> {
        self.state.lock().unwrap().upload_calls += 1;
        self.check_transport()?;
        let session_id = self.state.lock().unwrap().next_session_id.clone();
        Ok(UploadResponse {
            session_id,
            image_info: ImageInfo {
                filename: artifact.filename().to_string(),
                dimensions: "4x3".into(),
                size: Some(artifact.len() as u64),
                format: Some("PNG".into()),
            },
            filename: Some(artifact.filename().to_string()),
            status: Some("uploaded".into()),
        })
    }

    async fn analyze(
        &self,
        session_id: &str,
        request: &AnalyzeRequest,
    ) -> ClientResult<AnalyzeAccepted> {
        {
            let mut state = self.state.lock().unwrap();
            state.analyze_calls += 1;
            state.last_analyze = Some(request.clone());
        }
        self.check_transport()?;
        Ok(AnalyzeAccepted {
            session_id: session_id.to_string(),
            status: "started".into(),
            run_id: request.run_id,
            message: None,
        })
    }

    async fn results(&self, _session_id: &str) -> ClientResult<Option<ResultsResponse>> {
        self.state.lock().unwrap().results_calls += 1;
        self.check_transport()?;
        Ok(self.state.lock().unwrap().results.clone())
    }

    async fn status(&self) -> ClientResult<StatusResponse> {
        self.check_transport()?;
        Ok(StatusResponse {
            status: LifecyclePhase::Ready,
            ready: true,
            overall_progress: 100.0,
            modules: BTreeMap::new(),
            app_ready: true,
        })
    }

    async fn metrics(&self) -> ClientResult<MetricsResponse> {
        self.check_transport()?;
        Ok(MetricsResponse {
            total_analyses: 0,
            positive_detections: 0,
            average_processing_time: 0.0,
            errors: 0,
            session_start: 0.0,
        })
    }
}
