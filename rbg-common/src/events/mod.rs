//! Event types for the RBG event system
//!
//! Two families of events live here:
//! - `ChannelMessage`: frames received from the backend's progress channel
//! - `ClientEvent`: state changes published by the client to its observers
//!   (CLI, UI) through the `EventBus`

mod analysis_types;
mod channel_types;
mod status_types;

pub use analysis_types::{
    normalize_confidence, AnalysisResult, AnalysisSummary, RegionFinding, RiskTier, Urgency,
};
pub use channel_types::ChannelMessage;
pub use status_types::{LifecyclePhase, ModuleState, ModuleStatus, SystemStatus};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tokio::sync::broadcast;

use crate::api::types::AnalysisSettings;

/// Connection indicator for the progress channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// First connection attempt in flight
    Connecting,
    Connected,
    /// Lost; a reconnect is scheduled
    Disconnected,
    /// Reconnect attempts exhausted (only with a bounded reconnect policy)
    GaveUp,
}

/// Cross-run counters accumulated by the client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionMetrics {
    pub total_analyses: u64,
    pub positive_detections: u64,
    /// Running average of request-to-completion time, in seconds
    pub average_processing_time: f64,
    pub errors: u64,
    pub session_start: DateTime<Utc>,
}

impl SessionMetrics {
    pub fn new(session_start: DateTime<Utc>) -> Self {
        Self {
            total_analyses: 0,
            positive_detections: 0,
            average_processing_time: 0.0,
            errors: 0,
            session_start,
        }
    }
}

/// Client state changes
///
/// Emitted by the client core after each inbound event is applied. Every
/// variant is serializable so observers can forward them (e.g. to a browser).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientEvent {
    /// Progress channel connection state changed
    ConnectionChanged {
        state: ConnectionState,
        /// Consecutive failed attempts since the last successful connection
        attempt: u32,
        timestamp: DateTime<Utc>,
    },

    /// Tracked backend status changed
    SystemStatusChanged {
        phase: LifecyclePhase,
        ready: bool,
        overall_progress: f64,
        modules: BTreeMap<String, ModuleState>,
        /// True while the channel is down and the status may be out of date
        stale: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        message: Option<String>,
        timestamp: DateTime<Utc>,
    },

    /// Backend reported an initialization failure
    BackendInitFailed {
        error: String,
        timestamp: DateTime<Utc>,
    },

    /// Upload succeeded and a new session is bound
    SessionBound {
        session_id: String,
        filename: String,
        dimensions: String,
        timestamp: DateTime<Utc>,
    },

    /// Backend accepted an analysis request
    RunAccepted {
        run_id: u64,
        session_id: String,
        settings: AnalysisSettings,
        timestamp: DateTime<Utc>,
    },

    /// Run progress advanced
    RunProgress {
        run_id: u64,
        progress: f64,
        #[serde(skip_serializing_if = "Option::is_none")]
        message: Option<String>,
        timestamp: DateTime<Utc>,
    },

    /// Run completed with a result
    RunCompleted {
        run_id: u64,
        result: AnalysisResult,
        duration_secs: f64,
        timestamp: DateTime<Utc>,
    },

    /// Run failed
    RunFailed {
        run_id: u64,
        error: String,
        timestamp: DateTime<Utc>,
    },

    /// Session metrics changed
    MetricsUpdated {
        metrics: SessionMetrics,
        timestamp: DateTime<Utc>,
    },
}

impl ClientEvent {
    /// Event type name, matching the serialized `type` tag
    pub fn event_type(&self) -> &'static str {
        match self {
            ClientEvent::ConnectionChanged { .. } => "ConnectionChanged",
            ClientEvent::SystemStatusChanged { .. } => "SystemStatusChanged",
            ClientEvent::BackendInitFailed { .. } => "BackendInitFailed",
            ClientEvent::SessionBound { .. } => "SessionBound",
            ClientEvent::RunAccepted { .. } => "RunAccepted",
            ClientEvent::RunProgress { .. } => "RunProgress",
            ClientEvent::RunCompleted { .. } => "RunCompleted",
            ClientEvent::RunFailed { .. } => "RunFailed",
            ClientEvent::MetricsUpdated { .. } => "MetricsUpdated",
        }
    }
}

// ========================================
// EventBus Implementation
// ========================================

/// Event distribution bus for client events
///
/// Wraps `tokio::sync::broadcast`:
/// - Non-blocking publish (slow subscribers don't block the client core)
/// - Multiple concurrent subscribers
/// - Lagged subscribers lose the oldest events and are told so by `recv`
///
/// # Examples
///
/// ```
/// use rbg_common::events::{ClientEvent, ConnectionState, EventBus};
///
/// let event_bus = EventBus::new(100);
/// let mut rx = event_bus.subscribe();
///
/// event_bus.emit_lossy(ClientEvent::ConnectionChanged {
///     state: ConnectionState::Connected,
///     attempt: 0,
///     timestamp: chrono::Utc::now(),
/// });
///
/// let event = rx.try_recv().unwrap();
/// assert_eq!(event.event_type(), "ConnectionChanged");
/// ```
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<ClientEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus buffering up to `capacity` events per subscriber
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<ClientEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Err` if no subscribers are listening.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: ClientEvent,
    ) -> Result<usize, broadcast::error::SendError<ClientEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: ClientEvent) {
        let _ = self.tx.send(event);
    }

    /// Get the current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Get the configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
