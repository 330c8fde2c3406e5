//! Analysis client
//!
//! `AnalysisClient` is a cheap handle to a background actor that owns the
//! [`ClientCore`], the backend adapter and the progress channel. Commands and
//! channel inputs are processed one at a time in arrival order, so state is
//! never mutated concurrently. Observers follow along through the `EventBus`.

use chrono::Utc;
use rbg_common::api::types::AnalysisSettings;
use rbg_common::events::{AnalysisResult, ClientEvent, EventBus};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::backend::{BackendApi, HttpBackend};
use crate::channel::{ChannelInput, ChannelManager, ReconnectPolicy};
use crate::config::ClientConfig;
use crate::state::{ClientCore, ClientSnapshot};
use crate::error::{ClientError, ClientResult};
use crate::session::{AcceptedRun, Artifact, Session};

const COMMAND_BUFFER: usize = 32;
const CHANNEL_BUFFER: usize = 256;

/// Where and how to open the progress channel
#[derive(Debug, Clone)]
pub struct ChannelSettings {
    pub url: String,
    pub policy: ReconnectPolicy,
}

enum Command {
    Upload {
        artifact: Artifact,
        reply: oneshot::Sender<ClientResult<Session>>,
    },
    RequestAnalysis {
        settings: AnalysisSettings,
        reply: oneshot::Sender<ClientResult<AcceptedRun>>,
    },
    Snapshot {
        reply: oneshot::Sender<ClientSnapshot>,
    },
    Reconnect,
    Shutdown,
}

/// Handle to a running client
pub struct AnalysisClient {
    commands: mpsc::Sender<Command>,
    events: EventBus,
    task: JoinHandle<()>,
}

impl AnalysisClient {
    /// Start a client talking HTTP and WebSocket to `config.backend_url`
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(config: &ClientConfig) -> ClientResult<Self> {
        config.validate()?;
        let backend = HttpBackend::new(config.base_url(), config.request_timeout())?;
        let channel = ChannelSettings {
            url: config.channel_url()?,
            policy: config.reconnect.policy(),
        };
        Ok(Self::with_backend(
            Arc::new(backend),
            Some(channel),
            config.event_capacity,
        ))
    }

    /// Start a client over any backend, optionally without a progress channel
    pub fn with_backend(
        backend: Arc<dyn BackendApi>,
        channel: Option<ChannelSettings>,
        event_capacity: usize,
    ) -> Self {
        let events = EventBus::new(event_capacity.max(1));
        let (command_tx, command_rx) = mpsc::channel(COMMAND_BUFFER);
        let (input_tx, input_rx) = mpsc::channel(CHANNEL_BUFFER);

        let channel = channel.map(|settings| {
            ChannelManager::new(settings.url, settings.policy, input_tx.clone())
        });
        let actor = Actor {
            core: ClientCore::new(Utc::now()),
            backend,
            channel,
            events: events.clone(),
            _input_tx: input_tx,
        };
        let task = tokio::spawn(actor.run(command_rx, input_rx));

        Self {
            commands: command_tx,
            events,
            task,
        }
    }

    /// Subscribe to client events
    pub fn subscribe(&self) -> broadcast::Receiver<ClientEvent> {
        self.events.subscribe()
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Upload an image and bind the returned session
    pub async fn upload(&self, artifact: Artifact) -> ClientResult<Session> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Upload { artifact, reply }).await?;
        rx.await.map_err(|_| ClientError::Shutdown)?
    }

    /// Request analysis of the bound session
    ///
    /// Resolves when the backend accepts the request; follow the run through
    /// `RunProgress`/`RunCompleted`/`RunFailed` events.
    pub async fn request_analysis(&self, settings: AnalysisSettings) -> ClientResult<AcceptedRun> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::RequestAnalysis { settings, reply }).await?;
        rx.await.map_err(|_| ClientError::Shutdown)?
    }

    /// Copy of the current client state
    pub async fn snapshot(&self) -> ClientResult<ClientSnapshot> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Snapshot { reply }).await?;
        rx.await.map_err(|_| ClientError::Shutdown)
    }

    /// Drop the current channel and open a fresh one
    pub async fn reconnect(&self) -> ClientResult<()> {
        self.send(Command::Reconnect).await
    }

    /// Wait until the backend reports readiness
    ///
    /// Fails with `BackendInit` if initialization fails meanwhile, and with
    /// `NotReady` on timeout.
    pub async fn wait_until_ready(&self, timeout: Duration) -> ClientResult<()> {
        let mut rx = self.subscribe();
        let snapshot = self.snapshot().await?;
        if let Some(error) = snapshot.system.init_error {
            return Err(ClientError::BackendInit(error));
        }
        if snapshot.system.ready {
            return Ok(());
        }

        let wait = async {
            loop {
                match rx.recv().await {
                    Ok(ClientEvent::SystemStatusChanged { ready: true, .. }) => return Ok(()),
                    Ok(ClientEvent::BackendInitFailed { error, .. }) => {
                        return Err(ClientError::BackendInit(error))
                    }
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        debug!(skipped, "Readiness waiter lagged");
                        if self.snapshot().await?.system.ready {
                            return Ok(());
                        }
                    }
                    Err(broadcast::error::RecvError::Closed) => return Err(ClientError::Shutdown),
                }
            }
        };
        tokio::time::timeout(timeout, wait)
            .await
            .map_err(|_| ClientError::NotReady)?
    }

    /// Wait for run `run_id` to finish on an existing subscription
    ///
    /// Subscribe before requesting the analysis so no event is missed.
    pub async fn wait_for_run(
        events: &mut broadcast::Receiver<ClientEvent>,
        run_id: u64,
    ) -> ClientResult<AnalysisResult> {
        loop {
            match events.recv().await {
                Ok(ClientEvent::RunCompleted { run_id: id, result, .. }) if id == run_id => {
                    return Ok(result)
                }
                Ok(ClientEvent::RunFailed { run_id: id, error, .. }) if id == run_id => {
                    return Err(ClientError::Analysis(error))
                }
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Run waiter lagged");
                }
                Err(broadcast::error::RecvError::Closed) => return Err(ClientError::Shutdown),
            }
        }
    }

    /// Stop the actor and close the channel
    pub async fn shutdown(self) {
        let _ = self.commands.send(Command::Shutdown).await;
        if let Err(e) = self.task.await {
            warn!(error = %e, "Client task ended abnormally");
        }
    }

    async fn send(&self, command: Command) -> ClientResult<()> {
        self.commands
            .send(command)
            .await
            .map_err(|_| ClientError::Shutdown)
    }
}

struct Actor {
    core: ClientCore,
    backend: Arc<dyn BackendApi>,
    channel: Option<ChannelManager>,
    events: EventBus,
    /// Keeps the input queue open when there is no channel
    _input_tx: mpsc::Sender<ChannelInput>,
}

impl Actor {
    async fn run(
        mut self,
        mut commands: mpsc::Receiver<Command>,
        mut inputs: mpsc::Receiver<ChannelInput>,
    ) {
        info!("Client started");
        self.open_channel();

        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(Command::Shutdown) | None => break,
                    Some(command) => self.handle_command(command).await,
                },
                Some(input) = inputs.recv() => {
                    let events = self.core.apply_channel(input);
                    self.publish(events);
                    self.poll_if_due().await;
                }
            }
        }

        if let Some(channel) = self.channel.as_mut() {
            channel.close();
        }
        info!("Client stopped");
    }

    async fn handle_command(&mut self, command: Command) {
        match command {
            Command::Upload { artifact, reply } => {
                let result = self
                    .core
                    .session_mut()
                    .upload(self.backend.as_ref(), &artifact)
                    .await;
                if let Ok(session) = &result {
                    let events = self.core.session_bound(session);
                    self.publish(events);
                }
                let _ = reply.send(result);
            }
            Command::RequestAnalysis { settings, reply } => {
                let ready = self.core.is_ready();
                let result = self
                    .core
                    .session_mut()
                    .request_analysis(self.backend.as_ref(), settings, ready)
                    .await;
                let result = match result {
                    Err(ClientError::NotReady) => Err(match self.core.init_error() {
                        Some(error) => ClientError::BackendInit(error.to_string()),
                        None => ClientError::NotReady,
                    }),
                    other => other,
                };
                if let Ok(accepted) = &result {
                    let events = self.core.run_accepted(accepted);
                    self.publish(events);
                }
                let _ = reply.send(result);
            }
            Command::Snapshot { reply } => {
                let _ = reply.send(self.core.snapshot());
            }
            Command::Reconnect => self.open_channel(),
            Command::Shutdown => {}
        }
    }

    fn open_channel(&mut self) {
        let Some(channel) = self.channel.as_mut() else {
            return;
        };
        let epoch = channel.open();
        let events = self.core.channel_replaced(epoch);
        self.publish(events);
    }

    async fn poll_if_due(&mut self) {
        let Some(session_id) = self.core.take_poll() else {
            return;
        };
        debug!(session_id = %session_id, "Polling results after reconnect");
        match self.backend.results(&session_id).await {
            Ok(record) => {
                let events = self.core.apply_poll(record);
                self.publish(events);
            }
            Err(e) => warn!(session_id = %session_id, error = %e, "Results poll failed"),
        }
    }

    fn publish(&self, events: Vec<ClientEvent>) {
        for event in events {
            debug!(event_type = event.event_type(), "Client event");
            self.events.emit_lossy(event);
        }
    }
}
