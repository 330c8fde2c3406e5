//! Configuration for rbg-client
//!
//! Bootstrap settings loaded from `<config_dir>/rbg/rbg-client.toml`.
//! Command-line arguments and environment variables override the file
//! (see `main.rs`); missing keys fall back to compiled defaults.

use rbg_common::api::types::AnalysisSettings;
use rbg_common::config::LoggingConfig;
use rbg_common::{Error, Result};
use serde::Deserialize;
use std::time::Duration;

use crate::channel::ReconnectPolicy;

/// Module name used for the config file
pub const MODULE_NAME: &str = "rbg-client";

/// Client configuration
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct ClientConfig {
    /// Backend base URL (http or https)
    pub backend_url: String,

    /// Real-time channel path on the backend
    pub channel_path: String,

    /// Per-request HTTP timeout in seconds
    pub request_timeout_secs: u64,

    /// Client event buffer per subscriber
    pub event_capacity: usize,

    pub reconnect: ReconnectConfig,

    /// Defaults for analysis requests
    pub analysis: AnalysisDefaults,

    pub logging: LoggingConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            backend_url: "http://127.0.0.1:8001".to_string(),
            channel_path: rbg_common::api::CHANNEL_PATH.to_string(),
            request_timeout_secs: 30,
            event_capacity: 100,
            reconnect: ReconnectConfig::default(),
            analysis: AnalysisDefaults::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl ClientConfig {
    /// Backend base URL without a trailing slash
    pub fn base_url(&self) -> &str {
        self.backend_url.trim_end_matches('/')
    }

    /// WebSocket URL of the progress channel
    ///
    /// `http://` maps to `ws://` and `https://` to `wss://`.
    pub fn channel_url(&self) -> Result<String> {
        let base = self.base_url();
        let ws_base = if let Some(rest) = base.strip_prefix("https://") {
            format!("wss://{rest}")
        } else if let Some(rest) = base.strip_prefix("http://") {
            format!("ws://{rest}")
        } else {
            return Err(Error::Config(format!(
                "backend_url must start with http:// or https://, got {}",
                self.backend_url
            )));
        };
        let path = self.channel_path.trim_start_matches('/');
        Ok(format!("{ws_base}/{path}"))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Validate values that would otherwise fail later at runtime
    pub fn validate(&self) -> Result<()> {
        self.channel_url()?;
        self.analysis.settings().validate()?;
        if self.event_capacity == 0 {
            return Err(Error::Config("event_capacity must be at least 1".to_string()));
        }
        if self.reconnect.multiplier < 1.0 {
            return Err(Error::Config(format!(
                "reconnect.multiplier must be >= 1.0, got {}",
                self.reconnect.multiplier
            )));
        }
        Ok(())
    }
}

/// Reconnect schedule for the progress channel
///
/// Defaults to a fixed 3 second delay with unbounded attempts.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct ReconnectConfig {
    pub initial_delay_ms: u64,
    /// Delay growth per failed attempt (1.0 = fixed delay)
    pub multiplier: f64,
    pub max_delay_ms: u64,
    /// Stop after this many consecutive failures (unset = never)
    pub max_attempts: Option<u32>,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay_ms: 3000,
            multiplier: 1.0,
            max_delay_ms: 30_000,
            max_attempts: None,
        }
    }
}

impl ReconnectConfig {
    pub fn policy(&self) -> ReconnectPolicy {
        ReconnectPolicy {
            initial_delay: Duration::from_millis(self.initial_delay_ms),
            multiplier: self.multiplier,
            max_delay: Duration::from_millis(self.max_delay_ms),
            max_attempts: self.max_attempts,
        }
    }
}

/// Default analysis options
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct AnalysisDefaults {
    pub confidence_threshold: f64,
    pub face_tracking: bool,
    pub enhanced_detection: bool,
}

impl Default for AnalysisDefaults {
    fn default() -> Self {
        let settings = AnalysisSettings::default();
        Self {
            confidence_threshold: settings.confidence_threshold,
            face_tracking: settings.face_tracking,
            enhanced_detection: settings.enhanced_detection,
        }
    }
}

impl AnalysisDefaults {
    pub fn settings(&self) -> AnalysisSettings {
        AnalysisSettings {
            confidence_threshold: self.confidence_threshold,
            face_tracking: self.face_tracking,
            enhanced_detection: self.enhanced_detection,
        }
    }
}
