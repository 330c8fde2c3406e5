//! Shared helpers for rbg-client integration tests
//!
//! Each test runs its own simulation backend on an ephemeral port.

#![allow(dead_code)]

use async_trait::async_trait;
use rbg_client::channel::ReconnectPolicy;
use rbg_client::config::ReconnectConfig;
use rbg_client::{Artifact, BackendApi, ClientConfig, ClientResult, HttpBackend};
use rbg_common::api::types::{
    AnalyzeAccepted, AnalyzeRequest, MetricsResponse, ResultsResponse, StatusResponse,
    UploadResponse,
};
use rbg_common::events::{AnalysisResult, ClientEvent};
use rbg_sim::{build_router, start_initialization, AppState, SimConfig};
use std::io::Cursor;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, oneshot};
use tokio::task::JoinHandle;

/// Simulation backend running in the test process
pub struct SimServer {
    pub addr: SocketAddr,
    pub state: AppState,
    shutdown: Option<oneshot::Sender<()>>,
    server: JoinHandle<()>,
    init: JoinHandle<()>,
}

impl SimServer {
    /// Start on an ephemeral port
    pub async fn start(config: SimConfig, result: AnalysisResult) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        Self::serve(listener, config, result)
    }

    /// Start on `addr` (used to restart a stopped backend)
    pub async fn start_at(addr: SocketAddr, config: SimConfig, result: AnalysisResult) -> Self {
        let listener = TcpListener::bind(addr).await.unwrap();
        Self::serve(listener, config, result)
    }

    fn serve(listener: TcpListener, config: SimConfig, result: AnalysisResult) -> Self {
        let addr = listener.local_addr().unwrap();
        let state = AppState::with_result(config, result);
        let init = start_initialization(&state);
        let app = build_router(state.clone());
        let (shutdown, signal) = oneshot::channel::<()>();
        let server = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    let _ = signal.await;
                })
                .await
                .unwrap();
        });
        Self {
            addr,
            state,
            shutdown: Some(shutdown),
            server,
            init,
        }
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Close every channel, then stop serving
    pub async fn stop(mut self) {
        self.state.drop_channels();
        self.init.abort();
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if tokio::time::timeout(Duration::from_secs(5), &mut self.server)
            .await
            .is_err()
        {
            self.server.abort();
        }
    }
}

/// Simulation config without artificial delays
pub fn fast_sim_config() -> SimConfig {
    SimConfig {
        init_step_ms: 10,
        analysis_step_ms: 10,
        ping_interval_ms: 200,
        ..SimConfig::default()
    }
}

/// Client config pointing at `base_url`, reconnecting quickly
pub fn client_config(base_url: &str) -> ClientConfig {
    ClientConfig {
        backend_url: base_url.to_string(),
        request_timeout_secs: 5,
        event_capacity: 1024,
        reconnect: ReconnectConfig {
            initial_delay_ms: 50,
            ..ReconnectConfig::default()
        },
        ..ClientConfig::default()
    }
}

pub fn fast_policy() -> ReconnectPolicy {
    ReconnectPolicy::fixed(Duration::from_millis(50))
}

pub fn png_artifact(width: u32, height: u32) -> Artifact {
    Artifact::new("eye.png", png_bytes(width, height)).unwrap()
}

pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let image = image::DynamicImage::ImageRgb8(image::RgbImage::new(width, height));
    let mut bytes = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
        .unwrap();
    bytes
}

/// Receive events until `pred` matches, failing after `timeout`
pub async fn wait_for_event<F>(
    events: &mut broadcast::Receiver<ClientEvent>,
    timeout: Duration,
    mut pred: F,
) -> ClientEvent
where
    F: FnMut(&ClientEvent) -> bool,
{
    tokio::time::timeout(timeout, async {
        loop {
            match events.recv().await {
                Ok(event) if pred(&event) => return event,
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(_)) => {}
                Err(broadcast::error::RecvError::Closed) => panic!("event bus closed"),
            }
        }
    })
    .await
    .expect("timed out waiting for client event")
}

/// HTTP backend that counts every request it makes
pub struct CountingBackend {
    inner: HttpBackend,
    calls: AtomicUsize,
}

impl CountingBackend {
    pub fn new(base_url: &str) -> Self {
        Self {
            inner: HttpBackend::new(base_url, Duration::from_secs(5)).unwrap(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn count(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl BackendApi for CountingBackend {
    async fn upload(&self, artifact: &Artifact) -> ClientResult<UploadResponse> {
        self.count();
        self.inner.upload(artifact).await
    }

    async fn analyze(
        &self,
        session_id: &str,
        request: &AnalyzeRequest,
    ) -> ClientResult<AnalyzeAccepted> {
        self.count();
        self.inner.analyze(session_id, request).await
    }

    async fn results(&self, session_id: &str) -> ClientResult<Option<ResultsResponse>> {
        self.count();
        self.inner.results(session_id).await
    }

    async fn status(&self) -> ClientResult<StatusResponse> {
        self.count();
        self.inner.status().await
    }

    async fn metrics(&self) -> ClientResult<MetricsResponse> {
        self.count();
        self.inner.metrics().await
    }
}
