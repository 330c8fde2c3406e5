//! Real-time channel frames
//!
//! Every frame on the progress channel is a JSON object `{"type": ..., ...}`.
//! Unknown `type` values are skipped so newer backends can add frames without
//! breaking older clients.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::analysis_types::AnalysisResult;
use super::status_types::SystemStatus;

/// Inbound frame from the backend's progress channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChannelMessage {
    /// Module-level initialization status plus a human-readable message
    InitializationProgress {
        status: SystemStatus,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },

    /// Backend declares initialization finished
    ///
    /// Forces readiness regardless of the carried module detail.
    InitializationComplete {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        status: Option<SystemStatus>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },

    /// Backend initialization failed; blocks analysis until the backend restarts
    InitializationError {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        status: Option<SystemStatus>,
        error: String,
    },

    /// Full status re-sync (sent on every new connection)
    StatusUpdate { status: SystemStatus },

    /// Progress of an analysis run (0-100)
    AnalysisProgress {
        session_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        run_id: Option<u64>,
        progress: f64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },

    /// Analysis run finished with a result
    AnalysisComplete {
        session_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        run_id: Option<u64>,
        results: AnalysisResult,
    },

    /// Analysis run failed
    AnalysisError {
        session_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        run_id: Option<u64>,
        error: String,
    },

    /// Liveness probe, carries no state
    Ping,
}

impl ChannelMessage {
    /// Wire `type` values this client understands
    pub const KNOWN_TYPES: [&'static str; 8] = [
        "initialization_progress",
        "initialization_complete",
        "initialization_error",
        "status_update",
        "analysis_progress",
        "analysis_complete",
        "analysis_error",
        "ping",
    ];

    /// Parse a text frame
    ///
    /// Returns `Ok(None)` for frames with a missing or unknown `type`.
    /// Malformed JSON and known types with invalid payloads are errors.
    pub fn parse_frame(text: &str) -> Result<Option<Self>, serde_json::Error> {
        let value: Value = serde_json::from_str(text)?;
        let known = value
            .get("type")
            .and_then(Value::as_str)
            .is_some_and(|t| Self::KNOWN_TYPES.contains(&t));
        if !known {
            return Ok(None);
        }
        serde_json::from_value(value).map(Some)
    }

    /// Wire `type` of this frame
    pub fn message_type(&self) -> &'static str {
        match self {
            ChannelMessage::InitializationProgress { .. } => "initialization_progress",
            ChannelMessage::InitializationComplete { .. } => "initialization_complete",
            ChannelMessage::InitializationError { .. } => "initialization_error",
            ChannelMessage::StatusUpdate { .. } => "status_update",
            ChannelMessage::AnalysisProgress { .. } => "analysis_progress",
            ChannelMessage::AnalysisComplete { .. } => "analysis_complete",
            ChannelMessage::AnalysisError { .. } => "analysis_error",
            ChannelMessage::Ping => "ping",
        }
    }

    /// Serialize for sending over the channel
    pub fn to_frame(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
