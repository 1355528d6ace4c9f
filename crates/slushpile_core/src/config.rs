//! Pipeline configuration.
//!
//! # Responsibility
//! - Provide defaults for batch concurrency, SQLite busy timeout, stage
//!   auditing and logging.
//! - Load overrides from `SLUSHPILE_*` environment variables or JSON.
//!
//! # Invariants
//! - Unparseable environment values fall back to defaults.
//! - A validated config always has `batch_workers` in `1..=64`.

use crate::logging::default_log_level;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;
use std::time::Duration;

const MAX_BATCH_WORKERS: usize = 64;

/// Runtime settings shared by the pipeline services.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Worker threads used by batch assign/pass.
    pub batch_workers: usize,
    /// How long a connection waits on a locked database.
    pub busy_timeout_ms: u64,
    /// Append a system annotation for every stage change.
    pub audit_stage_changes: bool,
    pub log_level: String,
    /// Absolute directory for rolling log files; `None` disables file logs.
    pub log_dir: Option<PathBuf>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            batch_workers: 4,
            busy_timeout_ms: 5_000,
            audit_stage_changes: false,
            log_level: default_log_level().to_string(),
            log_dir: None,
        }
    }
}

impl PipelineConfig {
    /// Reads overrides from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads overrides through `lookup`, one call per variable name.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let default = Self::default();
        Self {
            batch_workers: lookup("SLUSHPILE_BATCH_WORKERS")
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(default.batch_workers),
            busy_timeout_ms: lookup("SLUSHPILE_BUSY_TIMEOUT_MS")
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(default.busy_timeout_ms),
            audit_stage_changes: lookup("SLUSHPILE_AUDIT_STAGE_CHANGES")
                .and_then(|v| parse_flag(&v))
                .unwrap_or(default.audit_stage_changes),
            log_level: lookup("SLUSHPILE_LOG_LEVEL")
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .unwrap_or(default.log_level),
            log_dir: lookup("SLUSHPILE_LOG_DIR")
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .map(PathBuf::from)
                .or(default.log_dir),
        }
    }

    /// Parses a JSON document; missing fields keep their defaults.
    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(raw).map_err(ConfigError::Parse)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=MAX_BATCH_WORKERS).contains(&self.batch_workers) {
            return Err(ConfigError::InvalidValue {
                field: "batch_workers",
                message: format!("expected 1..={MAX_BATCH_WORKERS}, got {}", self.batch_workers),
            });
        }
        if self.busy_timeout_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "busy_timeout_ms",
                message: "must be greater than zero".to_string(),
            });
        }
        if let Some(dir) = &self.log_dir {
            if !dir.is_absolute() {
                return Err(ConfigError::InvalidValue {
                    field: "log_dir",
                    message: format!("must be absolute, got `{}`", dir.display()),
                });
            }
        }
        Ok(())
    }

    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Configuration rejected during load or validation.
#[derive(Debug)]
pub enum ConfigError {
    InvalidValue {
        field: &'static str,
        message: String,
    },
    Parse(serde_json::Error),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidValue { field, message } => write!(f, "invalid `{field}`: {message}"),
            Self::Parse(err) => write!(f, "invalid config json: {err}"),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Parse(err) => Some(err),
            Self::InvalidValue { .. } => None,
        }
    }
}
