//! Typed configuration from environment variables and an optional TOML file.
//!
//! Loads once at startup and fails fast on an unreadable or malformed file.
//! Environment variables win over file values.

use crate::error::{Error, Result};
use serde::Deserialize;
use std::path::Path;

/// Default name of the privileged thread.
pub const DEFAULT_MAIN_THREAD: &str = "main";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Name given to the privileged thread when the bridge spawns it.
    pub main_thread: String,
    pub otel_endpoint: Option<String>,
    pub log_level: String,
}

/// On-disk shape. Every key is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileConfig {
    main_thread: Option<String>,
    otel_endpoint: Option<String>,
    log_level: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            main_thread: DEFAULT_MAIN_THREAD.to_string(),
            otel_endpoint: None,
            log_level: "info".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// If `WVBRIDGE_CONFIG` names a TOML file it is read first. In local dev,
    /// call `dotenvy::dotenv().ok()` before this.
    pub fn from_env() -> Result<Self> {
        let base = match std::env::var("WVBRIDGE_CONFIG") {
            Ok(path) => Self::from_file(Path::new(&path))?,
            Err(_) => Self::default(),
        };
        Ok(base.with_env_overrides())
    }

    /// Load configuration from a TOML file, defaulting missing keys.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("cannot read config file {}: {e}", path.display()))
        })?;
        let file: FileConfig = toml::from_str(&content).map_err(|e| {
            Error::Config(format!("bad config file {}: {e}", path.display()))
        })?;
        Ok(Self::from_file_config(file))
    }

    /// Parse configuration from TOML text, defaulting missing keys.
    pub fn from_toml(content: &str) -> Result<Self> {
        let file: FileConfig =
            toml::from_str(content).map_err(|e| Error::Config(e.to_string()))?;
        Ok(Self::from_file_config(file))
    }

    fn from_file_config(file: FileConfig) -> Self {
        let defaults = Self::default();
        Self {
            main_thread: file.main_thread.unwrap_or(defaults.main_thread),
            otel_endpoint: file.otel_endpoint.or(defaults.otel_endpoint),
            log_level: file.log_level.unwrap_or(defaults.log_level),
        }
    }

    fn with_env_overrides(mut self) -> Self {
        if let Some(name) = non_empty_var("WVBRIDGE_MAIN_THREAD") {
            self.main_thread = name;
        }
        if let Some(endpoint) = non_empty_var("OTEL_ENDPOINT") {
            self.otel_endpoint = Some(endpoint);
        }
        if let Some(level) = non_empty_var("LOG_LEVEL") {
            self.log_level = level;
        }
        self
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}
