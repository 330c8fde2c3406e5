//! Backend readiness types
//!
//! The backend initializes several independent modules (eye detector, face
//! handler, visualizer, model) and reports their state over the real-time
//! channel and `GET /api/status`.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Per-module initialization state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModuleState {
    /// Not started yet (the backend also reports this as "waiting")
    #[serde(alias = "waiting")]
    Pending,
    /// Loading in progress
    Loading,
    /// Ready to serve analysis requests
    Ready,
    /// Failed to load
    Error,
}

impl ModuleState {
    pub fn is_ready(self) -> bool {
        self == ModuleState::Ready
    }
}

/// Module status entry as carried in a status frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleStatus {
    pub status: ModuleState,
    /// Module load progress (0-100), informational only
    #[serde(default)]
    pub progress: f64,
}

impl ModuleStatus {
    pub fn new(status: ModuleState) -> Self {
        Self {
            status,
            progress: if status.is_ready() { 100.0 } else { 0.0 },
        }
    }
}

/// Backend lifecycle phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecyclePhase {
    /// Process started, nothing loaded yet
    Starting,
    /// Modules are loading
    #[serde(alias = "initializing")]
    Loading,
    /// All modules loaded
    Ready,
    /// Initialization failed
    Error,
}

impl LifecyclePhase {
    /// Starting or loading
    pub fn is_initializing(self) -> bool {
        matches!(self, LifecyclePhase::Starting | LifecyclePhase::Loading)
    }
}

/// Full system status as sent by the backend
///
/// Carries no readiness flag: readiness is always derived from the phase and
/// module map by the receiver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemStatus {
    /// Lifecycle phase (wire name: `status`)
    #[serde(rename = "status")]
    pub phase: LifecyclePhase,
    /// Module name → module status
    #[serde(default)]
    pub modules: BTreeMap<String, ModuleStatus>,
    /// Overall initialization progress (0-100)
    #[serde(default)]
    pub overall_progress: f64,
    /// Initialization error description, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SystemStatus {
    /// Status with every named module in `state`
    pub fn with_modules<'a>(
        phase: LifecyclePhase,
        names: impl IntoIterator<Item = &'a str>,
        state: ModuleState,
    ) -> Self {
        Self {
            phase,
            modules: names
                .into_iter()
                .map(|name| (name.to_string(), ModuleStatus::new(state)))
                .collect(),
            overall_progress: 0.0,
            error: None,
        }
    }
}
