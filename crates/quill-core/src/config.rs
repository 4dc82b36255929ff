//! Configuration for talking to the task backend.
//!
//! Loaded from an optional TOML file; every missing entry falls back to the
//! default. `QUILL_BASE_URL` and `QUILL_TIMEOUT_SECS` override the file.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::app::RetryPolicy;
use crate::domain::{PollPolicy, TaskKind};

pub const ENV_BASE_URL: &str = "QUILL_BASE_URL";
pub const ENV_TIMEOUT_SECS: &str = "QUILL_TIMEOUT_SECS";

/// Larger retry budgets only keep a failing save spinning.
pub const MAX_SAVE_RETRIES: u32 = 10;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid value for {key}: {value:?}")]
    Invalid { key: &'static str, value: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuillConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default)]
    pub poll: PollConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub monitor: MonitorConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PollConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_annotation_interval_ms")]
    pub annotation_interval_ms: u64,
    #[serde(default = "default_note_interval_ms")]
    pub note_interval_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitorConfig {
    #[serde(default = "default_refresh_interval_ms")]
    pub refresh_interval_ms: u64,
}

fn default_base_url() -> String {
    "http://localhost:8000".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_max_attempts() -> u32 {
    PollPolicy::DEFAULT_MAX_ATTEMPTS
}

fn default_annotation_interval_ms() -> u64 {
    1000
}

fn default_note_interval_ms() -> u64 {
    2000
}

fn default_base_delay_ms() -> u64 {
    1000
}

fn default_multiplier() -> f64 {
    2.0
}

fn default_max_retries() -> u32 {
    3
}

fn default_refresh_interval_ms() -> u64 {
    2000
}

impl Default for QuillConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            request_timeout_secs: default_timeout_secs(),
            poll: PollConfig::default(),
            retry: RetryConfig::default(),
            monitor: MonitorConfig::default(),
        }
    }
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            annotation_interval_ms: default_annotation_interval_ms(),
            note_interval_ms: default_note_interval_ms(),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: default_base_delay_ms(),
            multiplier: default_multiplier(),
            max_retries: default_max_retries(),
        }
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            refresh_interval_ms: default_refresh_interval_ms(),
        }
    }
}

impl QuillConfig {
    /// Read `path` (when given) and apply environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        Self::load_with_env(path, |key| std::env::var(key).ok())
    }

    pub fn load_with_env(
        path: Option<&Path>,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => {
                let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
                    path: path.to_path_buf(),
                    source,
                })?;
                let config = Self::from_toml(&text)?;
                info!(path = %path.display(), "loaded config");
                config
            }
            None => Self::default(),
        };

        if let Some(url) = env(ENV_BASE_URL).filter(|v| !v.trim().is_empty()) {
            debug!(base_url = %url, "base url overridden from environment");
            config.base_url = url;
        }
        if let Some(raw) = env(ENV_TIMEOUT_SECS) {
            config.request_timeout_secs = raw.trim().parse().map_err(|_| ConfigError::Invalid {
                key: ENV_TIMEOUT_SECS,
                value: raw.clone(),
            })?;
        }
        Ok(config)
    }

    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the retry and poll loops cannot work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let multiplier = self.retry.multiplier;
        if !multiplier.is_finite() || multiplier <= 0.0 {
            return Err(ConfigError::Invalid {
                key: "retry.multiplier",
                value: multiplier.to_string(),
            });
        }
        if self.retry.max_retries > MAX_SAVE_RETRIES {
            return Err(ConfigError::Invalid {
                key: "retry.max_retries",
                value: self.retry.max_retries.to_string(),
            });
        }
        if self.poll.max_attempts == 0 {
            return Err(ConfigError::Invalid {
                key: "poll.max_attempts",
                value: "0".to_string(),
            });
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Poll cadence for `kind` with this configuration's budget.
    pub fn poll_policy(&self, kind: TaskKind) -> PollPolicy {
        let interval_ms = if kind.is_interactive() {
            self.poll.annotation_interval_ms
        } else {
            self.poll.note_interval_ms
        };
        PollPolicy {
            interval: Duration::from_millis(interval_ms),
            max_attempts: self.poll.max_attempts,
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            base_delay: Duration::from_millis(self.retry.base_delay_ms),
            multiplier: self.retry.multiplier,
            max_retries: self.retry.max_retries,
        }
    }

    pub fn monitor_refresh_interval(&self) -> Duration {
        Duration::from_millis(self.monitor.refresh_interval_ms)
    }
}
