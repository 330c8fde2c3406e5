//! Client state core
//!
//! The single reducer behind the client. Every inbound event (channel input,
//! upload or analyze outcome, results poll) is applied to completion here and
//! turned into the `ClientEvent`s that observers see. Nothing in this module
//! performs I/O; the actor in `client.rs` feeds it.

use chrono::{DateTime, Utc};
use rbg_common::api::types::ResultsResponse;
use rbg_common::events::{ChannelMessage, ClientEvent, ConnectionState, SessionMetrics};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::channel::ChannelInput;
use crate::metrics::MetricsAggregator;
use crate::readiness::{ReadinessSnapshot, ReadinessTracker};
use crate::run::{RunSnapshot, RunTracker};
use crate::session::{AcceptedRun, Session, SessionController};

/// Error text when the channel will not come back
pub const CHANNEL_LOST: &str = "progress channel permanently lost";

/// Immutable copy of the whole client state
#[derive(Debug, Clone, Serialize)]
pub struct ClientSnapshot {
    pub connection: ConnectionState,
    /// Consecutive failed connection attempts
    pub reconnect_attempts: u32,
    pub system: ReadinessSnapshot,
    pub session: Option<Session>,
    pub run: Option<RunSnapshot>,
    pub metrics: SessionMetrics,
}

pub struct ClientCore {
    connection: ConnectionState,
    failed_attempts: u32,
    /// Epoch of the live channel supervisor
    epoch: u64,
    /// Poll results for the outstanding run on the next opportunity
    poll_due: bool,
    session: SessionController,
    readiness: ReadinessTracker,
    runs: RunTracker,
    metrics: MetricsAggregator,
}

impl ClientCore {
    pub fn new(session_start: DateTime<Utc>) -> Self {
        Self {
            connection: ConnectionState::Connecting,
            failed_attempts: 0,
            epoch: 0,
            poll_due: false,
            session: SessionController::new(),
            readiness: ReadinessTracker::new(),
            runs: RunTracker::new(),
            metrics: MetricsAggregator::new(session_start),
        }
    }

    pub fn connection(&self) -> ConnectionState {
        self.connection
    }

    pub fn is_ready(&self) -> bool {
        self.readiness.is_ready()
    }

    pub fn init_error(&self) -> Option<&str> {
        self.readiness.init_error()
    }

    pub fn session(&self) -> &SessionController {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut SessionController {
        &mut self.session
    }

    pub fn metrics(&self) -> &SessionMetrics {
        self.metrics.metrics()
    }

    /// A new channel supervisor took over; inputs from older ones are dropped
    pub fn channel_replaced(&mut self, epoch: u64) -> Vec<ClientEvent> {
        self.epoch = epoch;
        self.failed_attempts = 0;
        let mut events = self.set_connection(ConnectionState::Connecting);
        events.extend(self.readiness.expect_resync());
        events
    }

    /// Apply one input from the channel supervisor
    pub fn apply_channel(&mut self, input: ChannelInput) -> Vec<ClientEvent> {
        if input.epoch() != self.epoch {
            debug!(
                epoch = input.epoch(),
                current = self.epoch,
                "Dropping input from replaced channel"
            );
            return Vec::new();
        }

        match input {
            ChannelInput::Opened { .. } => {
                self.failed_attempts = 0;
                if self.runs.active().is_some() {
                    self.poll_due = true;
                }
                self.set_connection(ConnectionState::Connected)
            }
            ChannelInput::Frame { message, .. } => self.apply_message(&message),
            ChannelInput::Closed { reason, .. } => {
                if self.connection == ConnectionState::Connected {
                    warn!(reason = %reason, "Progress channel lost");
                }
                let mut events = self.set_connection(ConnectionState::Disconnected);
                events.extend(self.readiness.mark_stale());
                events
            }
            ChannelInput::Reconnecting { attempt, delay, .. } => {
                self.failed_attempts = attempt;
                info!(attempt, delay_ms = delay.as_millis() as u64, "Reconnecting progress channel");
                Vec::new()
            }
            ChannelInput::GaveUp { attempts, .. } => {
                self.failed_attempts = attempts;
                let mut events = self.set_connection(ConnectionState::GaveUp);
                let failed = self.runs.abandon(CHANNEL_LOST);
                self.push_run_events(failed, &mut events);
                events
            }
        }
    }

    /// Apply one channel frame to readiness and the run
    pub fn apply_message(&mut self, message: &ChannelMessage) -> Vec<ClientEvent> {
        let mut events = self.readiness.apply(message);
        let run_events = self.runs.apply(message);
        self.push_run_events(run_events, &mut events);
        events
    }

    /// Upload succeeded and `session` is now bound
    pub fn session_bound(&self, session: &Session) -> Vec<ClientEvent> {
        vec![ClientEvent::SessionBound {
            session_id: session.id.clone(),
            filename: session.image.filename.clone(),
            dimensions: session.image.dimensions.clone(),
            timestamp: session.bound_at,
        }]
    }

    /// Backend accepted an analysis request
    pub fn run_accepted(&mut self, accepted: &AcceptedRun) -> Vec<ClientEvent> {
        self.runs.begin(accepted)
    }

    /// Session to poll for the outstanding run, if a poll is due
    pub fn take_poll(&mut self) -> Option<String> {
        if !std::mem::take(&mut self.poll_due) {
            return None;
        }
        self.runs.active().map(|run| run.session_id.clone())
    }

    /// Apply a results poll (`None` = backend has no record)
    pub fn apply_poll(&mut self, record: Option<ResultsResponse>) -> Vec<ClientEvent> {
        let run_events = self.runs.apply_poll(record);
        let mut events = Vec::new();
        self.push_run_events(run_events, &mut events);
        events
    }

    pub fn snapshot(&self) -> ClientSnapshot {
        ClientSnapshot {
            connection: self.connection,
            reconnect_attempts: self.failed_attempts,
            system: self.readiness.snapshot(),
            session: self.session.session().cloned(),
            run: self.runs.snapshot(),
            metrics: self.metrics.metrics().clone(),
        }
    }

    fn set_connection(&mut self, state: ConnectionState) -> Vec<ClientEvent> {
        if self.connection == state {
            return Vec::new();
        }
        info!(from = ?self.connection, to = ?state, "Connection state changed");
        self.connection = state;
        vec![ClientEvent::ConnectionChanged {
            state,
            attempt: self.failed_attempts,
            timestamp: Utc::now(),
        }]
    }

    fn push_run_events(&mut self, run_events: Vec<ClientEvent>, events: &mut Vec<ClientEvent>) {
        for event in run_events {
            let update = self.metrics.fold(&event);
            events.push(event);
            events.extend(update);
        }
    }
}
