//! System Readiness Tracker
//!
//! Reducer over status-bearing channel frames. The tracker keeps the last
//! known backend status and derives readiness from it on demand; readiness is
//! never stored.
//!
//! Merge rules:
//! - a status whose module map is a strict subset of the tracked one updates
//!   only the named modules; any other map replaces the tracked map
//! - overall progress never decreases while the backend is initializing
//! - `initialization_complete` forces every known module ready
//! - after `initialization_error`, status frames are ignored until the first
//!   `status_update` following a (re)connect, which replaces everything

use chrono::Utc;
use rbg_common::events::{
    ChannelMessage, ClientEvent, LifecyclePhase, ModuleState, ModuleStatus, SystemStatus,
};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{debug, error, info};

/// Immutable view of the tracked status
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReadinessSnapshot {
    pub phase: LifecyclePhase,
    pub ready: bool,
    pub overall_progress: f64,
    pub modules: BTreeMap<String, ModuleState>,
    /// The channel is down; the status may be out of date
    pub stale: bool,
    /// Last human-readable message from the backend
    pub message: Option<String>,
    pub init_error: Option<String>,
}

#[derive(Debug)]
pub struct ReadinessTracker {
    phase: LifecyclePhase,
    modules: BTreeMap<String, ModuleStatus>,
    overall_progress: f64,
    message: Option<String>,
    init_error: Option<String>,
    stale: bool,
    /// Next `status_update` is a full resync
    awaiting_resync: bool,
}

impl Default for ReadinessTracker {
    fn default() -> Self {
        Self {
            phase: LifecyclePhase::Starting,
            modules: BTreeMap::new(),
            overall_progress: 0.0,
            message: None,
            init_error: None,
            stale: false,
            awaiting_resync: true,
        }
    }
}

impl ReadinessTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Derived readiness
    pub fn is_ready(&self) -> bool {
        if self.phase == LifecyclePhase::Error || self.init_error.is_some() {
            return false;
        }
        if self.modules.is_empty() {
            self.phase == LifecyclePhase::Ready
        } else {
            self.modules.values().all(|m| m.status.is_ready())
        }
    }

    pub fn init_error(&self) -> Option<&str> {
        self.init_error.as_deref()
    }

    pub fn snapshot(&self) -> ReadinessSnapshot {
        ReadinessSnapshot {
            phase: self.phase,
            ready: self.is_ready(),
            overall_progress: self.overall_progress,
            modules: self
                .modules
                .iter()
                .map(|(name, status)| (name.clone(), status.status))
                .collect(),
            stale: self.stale,
            message: self.message.clone(),
            init_error: self.init_error.clone(),
        }
    }

    /// Apply one channel frame; returns the events describing what changed
    pub fn apply(&mut self, message: &ChannelMessage) -> Vec<ClientEvent> {
        let before = self.snapshot();
        let mut events = Vec::new();

        match message {
            ChannelMessage::StatusUpdate { status } if self.awaiting_resync => {
                self.resync(status, &mut events);
            }
            _ if self.init_error.is_some() => {
                debug!(frame_type = message.message_type(), "Ignoring status after init error");
                return events;
            }
            ChannelMessage::InitializationError { status, error } => {
                self.fail(error.clone(), &mut events);
                if let Some(status) = status {
                    self.merge(status, &mut events);
                    self.phase = LifecyclePhase::Error;
                }
            }
            ChannelMessage::StatusUpdate { status } => self.merge(status, &mut events),
            ChannelMessage::InitializationProgress { status, message } => {
                self.merge(status, &mut events);
                if message.is_some() {
                    self.message = message.clone();
                }
            }
            ChannelMessage::InitializationComplete { status, message } => {
                if let Some(status) = status {
                    self.merge(status, &mut events);
                }
                if self.init_error.is_none() {
                    for module in self.modules.values_mut() {
                        *module = ModuleStatus::new(ModuleState::Ready);
                    }
                    self.phase = LifecyclePhase::Ready;
                    self.overall_progress = 100.0;
                    if message.is_some() {
                        self.message = message.clone();
                    }
                    info!(modules = self.modules.len(), "Backend initialization complete");
                }
            }
            _ => return events,
        }

        self.push_change(before, &mut events);
        events
    }

    /// Channel lost: keep the last status but flag it stale
    pub fn mark_stale(&mut self) -> Vec<ClientEvent> {
        let before = self.snapshot();
        self.stale = true;
        self.awaiting_resync = true;
        let mut events = Vec::new();
        self.push_change(before, &mut events);
        events
    }

    /// A new channel is about to replace the current one
    ///
    /// Nothing to do if no `status_update` arrived since the last (re)connect;
    /// otherwise the tracked status goes stale until the next full resync.
    pub fn expect_resync(&mut self) -> Vec<ClientEvent> {
        if self.awaiting_resync {
            return Vec::new();
        }
        self.mark_stale()
    }

    fn resync(&mut self, status: &SystemStatus, events: &mut Vec<ClientEvent>) {
        info!(
            phase = ?status.phase,
            modules = status.modules.len(),
            "Status resynchronized"
        );
        self.awaiting_resync = false;
        self.stale = false;
        self.init_error = None;
        self.phase = status.phase;
        self.modules = status.modules.clone();
        self.overall_progress = clamp_progress(status.overall_progress);
        if status.phase == LifecyclePhase::Error {
            self.fail(error_text(status), events);
        }
    }

    fn merge(&mut self, status: &SystemStatus, events: &mut Vec<ClientEvent>) {
        let subset = status.modules.len() < self.modules.len()
            && status.modules.keys().all(|name| self.modules.contains_key(name));
        if subset {
            for (name, module) in &status.modules {
                self.modules.insert(name.clone(), module.clone());
            }
        } else {
            self.modules = status.modules.clone();
        }

        let incoming = clamp_progress(status.overall_progress);
        self.overall_progress = if status.phase.is_initializing() && self.phase.is_initializing() {
            self.overall_progress.max(incoming)
        } else {
            incoming
        };
        self.phase = status.phase;
        if status.phase == LifecyclePhase::Error {
            self.fail(error_text(status), events);
        }
    }

    /// Enter the sticky initialization-error state
    fn fail(&mut self, error: String, events: &mut Vec<ClientEvent>) {
        self.phase = LifecyclePhase::Error;
        if self.init_error.is_some() {
            return;
        }
        error!(error = %error, "Backend initialization failed");
        self.init_error = Some(error.clone());
        events.push(ClientEvent::BackendInitFailed {
            error,
            timestamp: Utc::now(),
        });
    }

    fn push_change(&self, before: ReadinessSnapshot, events: &mut Vec<ClientEvent>) {
        let after = self.snapshot();
        if after == before {
            return;
        }
        if after.ready != before.ready {
            info!(ready = after.ready, phase = ?after.phase, "Readiness changed");
        }
        events.push(ClientEvent::SystemStatusChanged {
            phase: after.phase,
            ready: after.ready,
            overall_progress: after.overall_progress,
            modules: after.modules,
            stale: after.stale,
            message: after.message,
            timestamp: Utc::now(),
        });
    }
}

fn error_text(status: &SystemStatus) -> String {
    status
        .error
        .clone()
        .unwrap_or_else(|| "backend reported error phase".to_string())
}

fn clamp_progress(progress: f64) -> f64 {
    if progress.is_nan() {
        0.0
    } else {
        progress.clamp(0.0, 100.0)
    }
}
