//! Configuration for a stats session
//!
//! Loaded from TOML. Every field has a default, so an empty file (or no file
//! at all) gives a working configuration.

use crate::error::ConfigError;
use log::debug;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Default sampling utility
pub const DEFAULT_PROGRAM: &str = "TypePerf";

/// Default liveness timeout before a session is considered stalled
pub const DEFAULT_STALL_TIMEOUT_SECONDS: u64 = 10;

/// Settings for a stats session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Seconds between samples
    pub interval_seconds: u64,
    /// Sampling utility to launch
    pub program: String,
    /// Seconds without a sample before the session is considered stalled
    pub stall_timeout_seconds: u64,
    /// Log every raw percentage as it is parsed
    pub debug: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            interval_seconds: 1,
            program: DEFAULT_PROGRAM.to_string(),
            stall_timeout_seconds: DEFAULT_STALL_TIMEOUT_SECONDS,
            debug: false,
        }
    }
}

impl Config {
    /// Read, parse, and validate a TOML configuration file
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ReadError` if the file cannot be read,
    /// `ConfigError::TomlError` if it is not valid TOML for this structure, and
    /// `ConfigError::ValidationError` if a value is out of range.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        debug!("Reading configuration from {}", path.display());
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadError(format!("{}: {}", path.display(), e)))?;
        Self::from_toml(&contents)
    }

    /// Parse and validate configuration from a TOML string
    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.interval_seconds == 0 {
            return Err(ConfigError::ValidationError(
                "interval_seconds must be at least 1".to_string(),
            ));
        }
        if self.stall_timeout_seconds == 0 {
            return Err(ConfigError::ValidationError(
                "stall_timeout_seconds must be at least 1".to_string(),
            ));
        }
        if self.program.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "program must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_seconds)
    }

    pub fn stall_timeout(&self) -> Duration {
        Duration::from_secs(self.stall_timeout_seconds)
    }
}
