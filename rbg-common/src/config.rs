//! Configuration file loading
//!
//! Every RBG binary resolves its settings in the same priority order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable
//! 3. TOML config file
//! 4. Compiled default (fallback)
//!
//! Steps 1 and 2 are handled by clap (`#[arg(env = ...)]`) in each binary.
//! This module covers step 3: locating and parsing the TOML file. A missing or
//! broken config file is never fatal; a warning is logged and defaults apply.

use crate::{Error, Result};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Logging configuration shared by all binaries
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Default TOML path for a module: `<config_dir>/rbg/<module>.toml`
///
/// Returns `None` on platforms without a config directory.
pub fn default_config_path(module_name: &str) -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("rbg").join(format!("{module_name}.toml")))
}

/// Parse a TOML config file
pub fn load_toml<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Failed to read {}: {}", path.display(), e)))?;
    let config = toml::from_str(&content)?;
    Ok(config)
}

/// Load a TOML config file, falling back to defaults
///
/// - `None` path or missing file: defaults, logged at info
/// - unreadable or invalid file: defaults, logged at warn
pub fn load_toml_or_default<T: DeserializeOwned + Default>(path: Option<&Path>) -> T {
    let Some(path) = path else {
        info!("No config file location available, using defaults");
        return T::default();
    };

    if !path.exists() {
        info!("Config file {} not found, using defaults", path.display());
        return T::default();
    }

    match load_toml(path) {
        Ok(config) => {
            info!("Loaded config from {}", path.display());
            config
        }
        Err(e) => {
            warn!("Ignoring config file {}: {}", path.display(), e);
            T::default()
        }
    }
}
