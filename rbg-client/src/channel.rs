//! Progress Channel Manager
//!
//! Owns the single WebSocket connection to the backend's progress endpoint.
//! A supervisor task connects, forwards parsed frames to the client core and
//! reconnects according to a [`ReconnectPolicy`] when the connection drops.
//!
//! Every supervisor is stamped with an epoch. Opening a channel cancels the
//! previous supervisor before spawning the next one, and the core drops any
//! input whose epoch is not current, so at most one listener is ever live.

use futures::StreamExt;
use rbg_common::events::ChannelMessage;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Reconnect schedule
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectPolicy {
    /// Delay before the first reconnect attempt
    pub initial_delay: Duration,
    /// Growth factor per consecutive failure (1.0 = fixed delay)
    pub multiplier: f64,
    /// Upper bound on the delay
    pub max_delay: Duration,
    /// Consecutive failures tolerated before giving up (`None` = never)
    pub max_attempts: Option<u32>,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::fixed(Duration::from_secs(3))
    }
}

impl ReconnectPolicy {
    /// Fixed delay, unbounded attempts
    pub fn fixed(delay: Duration) -> Self {
        Self {
            initial_delay: delay,
            multiplier: 1.0,
            max_delay: delay,
            max_attempts: None,
        }
    }

    /// Delay before reconnect attempt `attempt` (1-based)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(32) as i32;
        let factor = self.multiplier.max(1.0).powi(exponent);
        let millis = self.initial_delay.as_millis() as f64 * factor;
        let capped = millis.min(self.max_delay.max(self.initial_delay).as_millis() as f64);
        Duration::from_millis(capped as u64)
    }

    /// Whether another attempt is allowed after `failures` consecutive failures
    pub fn allows(&self, failures: u32) -> bool {
        self.max_attempts.map_or(true, |max| failures <= max)
    }
}

/// Input delivered from a channel supervisor to the client core
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelInput {
    /// Connection established
    Opened { epoch: u64 },
    /// Parsed frame with a known type
    Frame { epoch: u64, message: ChannelMessage },
    /// Connection lost, or a connect attempt failed
    Closed { epoch: u64, reason: String },
    /// Reconnect scheduled
    Reconnecting {
        epoch: u64,
        attempt: u32,
        delay: Duration,
    },
    /// Reconnect attempts exhausted; the supervisor has stopped
    GaveUp { epoch: u64, attempts: u32 },
}

impl ChannelInput {
    pub fn epoch(&self) -> u64 {
        match self {
            ChannelInput::Opened { epoch }
            | ChannelInput::Frame { epoch, .. }
            | ChannelInput::Closed { epoch, .. }
            | ChannelInput::Reconnecting { epoch, .. }
            | ChannelInput::GaveUp { epoch, .. } => *epoch,
        }
    }
}

struct Supervisor {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Owner of the live channel supervisor
pub struct ChannelManager {
    url: String,
    policy: ReconnectPolicy,
    tx: mpsc::Sender<ChannelInput>,
    epoch: u64,
    live: Option<Supervisor>,
}

impl ChannelManager {
    pub fn new(url: impl Into<String>, policy: ReconnectPolicy, tx: mpsc::Sender<ChannelInput>) -> Self {
        Self {
            url: url.into(),
            policy,
            tx,
            epoch: 0,
            live: None,
        }
    }

    /// Epoch of the live supervisor (0 before the first open)
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn is_open(&self) -> bool {
        self.live
            .as_ref()
            .is_some_and(|supervisor| !supervisor.handle.is_finished())
    }

    /// Open the channel, replacing any live supervisor
    ///
    /// Returns the new epoch.
    pub fn open(&mut self) -> u64 {
        self.close();
        self.epoch += 1;

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(supervise(
            self.url.clone(),
            self.policy.clone(),
            self.epoch,
            self.tx.clone(),
            cancel.clone(),
        ));
        self.live = Some(Supervisor { cancel, handle });

        info!(epoch = self.epoch, url = %self.url, "Progress channel opened");
        self.epoch
    }

    /// Stop the live supervisor, if any
    pub fn close(&mut self) {
        if let Some(supervisor) = self.live.take() {
            supervisor.cancel.cancel();
            debug!(epoch = self.epoch, "Progress channel closed");
        }
    }
}

impl Drop for ChannelManager {
    fn drop(&mut self) {
        self.close();
    }
}

/// Supervisor loop: connect, pump frames, back off, repeat
async fn supervise(
    url: String,
    policy: ReconnectPolicy,
    epoch: u64,
    tx: mpsc::Sender<ChannelInput>,
    cancel: CancellationToken,
) {
    let mut failures: u32 = 0;

    loop {
        let connected = tokio::select! {
            _ = cancel.cancelled() => return,
            result = tokio_tungstenite::connect_async(url.as_str()) => result,
        };

        let reason = match connected {
            Ok((stream, _response)) => {
                failures = 0;
                if tx.send(ChannelInput::Opened { epoch }).await.is_err() {
                    return;
                }
                match pump(stream, epoch, &tx, &cancel).await {
                    Some(reason) => reason,
                    None => return,
                }
            }
            Err(e) => format!("connect failed: {e}"),
        };

        debug!(epoch, reason = %reason, "Progress channel down");
        if tx.send(ChannelInput::Closed { epoch, reason }).await.is_err() {
            return;
        }

        failures += 1;
        if !policy.allows(failures) {
            warn!(epoch, attempts = failures - 1, "Giving up on progress channel");
            let _ = tx
                .send(ChannelInput::GaveUp {
                    epoch,
                    attempts: failures - 1,
                })
                .await;
            return;
        }

        let delay = policy.delay_for(failures);
        if tx
            .send(ChannelInput::Reconnecting {
                epoch,
                attempt: failures,
                delay,
            })
            .await
            .is_err()
        {
            return;
        }

        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = tokio::time::sleep(delay) => {}
        }
    }
}

/// Forward frames until the connection ends
///
/// Returns the close reason, or `None` when cancelled or the core is gone.
async fn pump<S>(
    mut stream: tokio_tungstenite::WebSocketStream<S>,
    epoch: u64,
    tx: &mpsc::Sender<ChannelInput>,
    cancel: &CancellationToken,
) -> Option<String>
where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin,
{
    loop {
        let next = tokio::select! {
            _ = cancel.cancelled() => {
                let _ = stream.close(None).await;
                return None;
            }
            next = stream.next() => next,
        };

        let text = match next {
            Some(Ok(Message::Text(text))) => text,
            Some(Ok(Message::Close(frame))) => {
                return Some(match frame {
                    Some(frame) => format!("closed by backend: {}", frame.reason),
                    None => "closed by backend".to_string(),
                });
            }
            // Pings are answered by tungstenite; binary frames are not part of the protocol
            Some(Ok(_)) => continue,
            Some(Err(e)) => return Some(e.to_string()),
            None => return Some("connection closed".to_string()),
        };

        match ChannelMessage::parse_frame(&text) {
            Ok(Some(message)) => {
                debug!(epoch, frame_type = message.message_type(), "Frame received");
                if tx.send(ChannelInput::Frame { epoch, message }).await.is_err() {
                    return None;
                }
            }
            Ok(None) => debug!(epoch, "Skipping frame with unknown type"),
            Err(e) => warn!(epoch, error = %e, "Dropping malformed frame"),
        }
    }
}
