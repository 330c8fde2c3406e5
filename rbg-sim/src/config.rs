//! Configuration for rbg-sim
//!
//! Loaded from `<config_dir>/rbg/rbg-sim.toml`; command-line arguments and
//! environment variables override the file (see `main.rs`).

use rbg_common::config::LoggingConfig;
use rbg_common::{Error, Result};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Module name used for the config file
pub const MODULE_NAME: &str = "rbg-sim";

/// Simulation backend configuration
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct SimConfig {
    /// Listen address
    pub bind: String,

    /// Simulated backend modules, loaded in order
    pub modules: Vec<String>,

    /// Delay per simulated module load
    pub init_step_ms: u64,

    /// Delay between simulated analysis steps
    pub analysis_step_ms: u64,

    /// Progress values reported by a simulated run (before 100)
    pub progress_steps: Vec<f64>,

    /// Interval between `ping` frames on the progress channel
    pub ping_interval_ms: u64,

    /// Module whose simulated load fails
    pub fail_module: Option<String>,

    /// When set, every run fails with this error halfway through
    pub analysis_error: Option<String>,

    /// JSON file holding the analysis result to report (default: built-in)
    pub result_file: Option<PathBuf>,

    /// Origins allowed by CORS
    pub cors_origins: Vec<String>,

    pub logging: LoggingConfig,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8001".to_string(),
            modules: ["gemma", "eye_detector", "face_handler", "visualizer"]
                .into_iter()
                .map(String::from)
                .collect(),
            init_step_ms: 500,
            analysis_step_ms: 1000,
            progress_steps: vec![10.0, 25.0, 40.0, 70.0, 85.0, 95.0],
            ping_interval_ms: 1000,
            fail_module: None,
            analysis_error: None,
            result_file: None,
            cors_origins: vec![
                "http://localhost:8080".to_string(),
                "http://localhost:3000".to_string(),
                "http://localhost:5173".to_string(),
            ],
            logging: LoggingConfig::default(),
        }
    }
}

impl SimConfig {
    pub fn init_step(&self) -> Duration {
        Duration::from_millis(self.init_step_ms)
    }

    pub fn analysis_step(&self) -> Duration {
        Duration::from_millis(self.analysis_step_ms)
    }

    pub fn ping_interval(&self) -> Duration {
        Duration::from_millis(self.ping_interval_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.ping_interval_ms == 0 {
            return Err(Error::Config("ping_interval_ms must be positive".to_string()));
        }
        if let Some(step) = self
            .progress_steps
            .iter()
            .find(|p| !(0.0..=100.0).contains(*p))
        {
            return Err(Error::Config(format!(
                "progress_steps must lie in [0, 100], got {step}"
            )));
        }
        if let Some(module) = &self.fail_module {
            if !self.modules.contains(module) {
                return Err(Error::Config(format!("fail_module {module} is not a configured module")));
            }
        }
        Ok(())
    }
}
