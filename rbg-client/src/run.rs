//! Analysis Run State Machine
//!
//! Tracks the single outstanding analysis run:
//! Idle → Requested → InProgress → {Completed, Failed}
//!
//! Only frames for the latest accepted run are applied. Frames carrying a
//! `run_id` must match it exactly; frames without one are matched on the
//! session id. A terminal run is discarded and kept only as a snapshot of the
//! last outcome.

use chrono::{DateTime, Utc};
use rbg_common::api::types::{AnalysisSettings, ResultsResponse, RunRecordStatus};
use rbg_common::events::{AnalysisResult, ChannelMessage, ClientEvent};
use rbg_common::time::elapsed_seconds;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::session::AcceptedRun;

/// Error text when the backend has no record of an outstanding run
pub const RUN_LOST: &str = "run lost: backend has no record of this analysis";

/// Run state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Idle,
    /// Backend acknowledged the request; no progress seen yet
    Requested,
    InProgress,
    Completed,
    Failed,
}

impl RunState {
    pub fn is_terminal(self) -> bool {
        matches!(self, RunState::Completed | RunState::Failed)
    }
}

/// One analysis run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSnapshot {
    pub run_id: u64,
    pub session_id: String,
    pub settings: AnalysisSettings,
    pub state: RunState,
    /// 0-100, never decreases
    pub progress: f64,
    pub message: Option<String>,
    pub accepted_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub result: Option<AnalysisResult>,
    pub error: Option<String>,
}

impl RunSnapshot {
    fn new(accepted: &AcceptedRun) -> Self {
        Self {
            run_id: accepted.run_id,
            session_id: accepted.session_id.clone(),
            settings: accepted.settings,
            state: RunState::Requested,
            progress: 0.0,
            message: None,
            accepted_at: accepted.accepted_at,
            ended_at: None,
            result: None,
            error: None,
        }
    }
}

#[derive(Debug, Default)]
pub struct RunTracker {
    active: Option<RunSnapshot>,
    last: Option<RunSnapshot>,
}

impl RunTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// State of the tracker as a whole
    pub fn state(&self) -> RunState {
        match (&self.active, &self.last) {
            (Some(run), _) => run.state,
            (None, Some(last)) => last.state,
            (None, None) => RunState::Idle,
        }
    }

    /// Outstanding run, if any
    pub fn active(&self) -> Option<&RunSnapshot> {
        self.active.as_ref()
    }

    /// Outstanding run, or else the last finished one
    pub fn snapshot(&self) -> Option<RunSnapshot> {
        self.active.clone().or_else(|| self.last.clone())
    }

    /// Start tracking an accepted run; supersedes any outstanding one
    pub fn begin(&mut self, accepted: &AcceptedRun) -> Vec<ClientEvent> {
        if let Some(previous) = self.active.take() {
            warn!(
                run_id = previous.run_id,
                superseded_by = accepted.run_id,
                "Outstanding run superseded"
            );
        }
        self.active = Some(RunSnapshot::new(accepted));
        vec![ClientEvent::RunAccepted {
            run_id: accepted.run_id,
            session_id: accepted.session_id.clone(),
            settings: accepted.settings,
            timestamp: Utc::now(),
        }]
    }

    /// Apply one channel frame
    pub fn apply(&mut self, message: &ChannelMessage) -> Vec<ClientEvent> {
        match message {
            ChannelMessage::AnalysisProgress {
                session_id,
                run_id,
                progress,
                message,
            } if self.matches(session_id, *run_id) => self.advance(*progress, message.clone()),
            ChannelMessage::AnalysisComplete {
                session_id,
                run_id,
                results,
            } if self.matches(session_id, *run_id) => self.complete(results.clone()),
            ChannelMessage::AnalysisError {
                session_id,
                run_id,
                error,
            } if self.matches(session_id, *run_id) => self.fail(error.clone()),
            ChannelMessage::AnalysisProgress { run_id, .. }
            | ChannelMessage::AnalysisComplete { run_id, .. }
            | ChannelMessage::AnalysisError { run_id, .. } => {
                debug!(
                    frame_type = message.message_type(),
                    run_id = ?run_id,
                    "Discarding frame for a run that is not outstanding"
                );
                Vec::new()
            }
            _ => Vec::new(),
        }
    }

    /// Apply a results poll made after the channel came back
    ///
    /// `None` means the backend has no record of the session.
    pub fn apply_poll(&mut self, record: Option<ResultsResponse>) -> Vec<ClientEvent> {
        let Some((run_id, session_id)) = self
            .active
            .as_ref()
            .map(|run| (run.run_id, run.session_id.clone()))
        else {
            return Vec::new();
        };
        let Some(record) = record else {
            return self.fail(RUN_LOST.to_string());
        };
        if record.session_id != session_id || record.run_id.is_some_and(|id| id != run_id) {
            return self.fail(RUN_LOST.to_string());
        }

        match record.status {
            RunRecordStatus::Running => self.advance(record.progress, None),
            RunRecordStatus::Completed => match record.results {
                Some(result) => self.complete(result),
                None => self.fail("backend completed the run without results".to_string()),
            },
            RunRecordStatus::Error => self.fail(
                record
                    .error
                    .unwrap_or_else(|| "analysis failed".to_string()),
            ),
        }
    }

    /// Fail the outstanding run because its events can no longer arrive
    pub fn abandon(&mut self, reason: &str) -> Vec<ClientEvent> {
        self.fail(reason.to_string())
    }

    fn matches(&self, session_id: &str, run_id: Option<u64>) -> bool {
        let Some(run) = &self.active else {
            return false;
        };
        match run_id {
            Some(id) => id == run.run_id,
            None => session_id == run.session_id,
        }
    }

    fn advance(&mut self, progress: f64, message: Option<String>) -> Vec<ClientEvent> {
        let Some(run) = self.active.as_mut() else {
            return Vec::new();
        };

        let progress = if progress.is_nan() { 0.0 } else { progress.clamp(0.0, 100.0) };
        let entered = run.state == RunState::Requested;
        run.state = RunState::InProgress;

        if progress < run.progress {
            debug!(run_id = run.run_id, progress, current = run.progress, "Ignoring stale progress");
            if !entered {
                return Vec::new();
            }
        }
        let advanced = progress > run.progress;
        if advanced {
            run.progress = progress;
        }
        let message_changed = message.is_some() && message != run.message;
        if message_changed {
            run.message = message;
        }
        if !(entered || advanced || message_changed) {
            return Vec::new();
        }

        vec![ClientEvent::RunProgress {
            run_id: run.run_id,
            progress: run.progress,
            message: run.message.clone(),
            timestamp: Utc::now(),
        }]
    }

    fn complete(&mut self, mut result: AnalysisResult) -> Vec<ClientEvent> {
        let Some(mut run) = self.active.take() else {
            return Vec::new();
        };

        if result.session_id.is_empty() {
            result.session_id = run.session_id.clone();
        }
        let ended_at = Utc::now();
        let duration_secs = elapsed_seconds(run.accepted_at, ended_at);
        run.state = RunState::Completed;
        run.progress = 100.0;
        run.ended_at = Some(ended_at);
        run.result = Some(result.clone());

        info!(
            run_id = run.run_id,
            session_id = %run.session_id,
            findings = result.results.len(),
            positives = result.positive_findings(),
            duration_secs,
            "Analysis completed"
        );

        let event = ClientEvent::RunCompleted {
            run_id: run.run_id,
            result,
            duration_secs,
            timestamp: ended_at,
        };
        self.last = Some(run);
        vec![event]
    }

    fn fail(&mut self, error: String) -> Vec<ClientEvent> {
        let Some(mut run) = self.active.take() else {
            return Vec::new();
        };

        let ended_at = Utc::now();
        run.state = RunState::Failed;
        run.ended_at = Some(ended_at);
        run.error = Some(error.clone());

        error!(run_id = run.run_id, session_id = %run.session_id, error = %error, "Analysis failed");

        let event = ClientEvent::RunFailed {
            run_id: run.run_id,
            error,
            timestamp: ended_at,
        };
        self.last = Some(run);
        vec![event]
    }
}
