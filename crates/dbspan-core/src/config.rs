//! Configuration for DBSpan instrumentation
//!
//! Provides:
//! - Trace options with sensible defaults
//! - TOML parsing with serde
//! - Validation

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Read(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Validation(String),

    #[error("Config file not found: {0}")]
    NotFound(PathBuf),
}

/// Result type for configuration operations
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Default eviction window: four hours. Long enough for any legitimate
/// command, short enough to bound memory when completions are lost.
pub const DEFAULT_MAX_ENTRY_AGE_SECS: u64 = 4 * 60 * 60;

/// Options controlling command tracing
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TraceOptions {
    /// Master switch for command tracing
    pub enabled: bool,

    /// Command names that are never traced (case-insensitive)
    pub filtered_commands: HashSet<String>,

    /// Attach the raw command payload to spans. Disable to keep query
    /// contents out of trace data.
    pub include_command_text: bool,

    /// Age in seconds after which an unresolved cache entry is considered
    /// abandoned. Commands legitimately running longer than this lose
    /// their tracing.
    pub max_entry_age_secs: u64,
}

impl Default for TraceOptions {
    fn default() -> Self {
        Self {
            enabled: true,
            filtered_commands: default_filtered_commands(),
            include_command_text: true,
            max_entry_age_secs: DEFAULT_MAX_ENTRY_AGE_SECS,
        }
    }
}

fn default_filtered_commands() -> HashSet<String> {
    [
        "buildInfo",
        "getLastError",
        "isMaster",
        "ping",
        "saslStart",
        "saslContinue",
    ]
    .into_iter()
    .map(str::to_string)
    .collect()
}

impl TraceOptions {
    /// Load options from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }

        let raw = std::fs::read_to_string(path)?;
        let options: Self = toml::from_str(&raw)?;
        options.validate()?;

        debug!(path = %path.display(), "loaded trace options");
        Ok(options)
    }

    /// Check option consistency
    pub fn validate(&self) -> ConfigResult<()> {
        if self.max_entry_age_secs == 0 {
            return Err(ConfigError::Validation(
                "max_entry_age_secs must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// The eviction window as a duration
    pub fn max_entry_age(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.max_entry_age_secs as i64)
    }
}
