use crate::defaults;
use crate::error::{Error, Result};
use crate::scheduler::SchedulerConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
#[cfg(feature = "cli")]
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub scheduler: SchedulerConfig,
    pub queue: QueueConfig,
    pub source: SourceConfig,
}

/// Inter-stage queue configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct QueueConfig {
    /// 0 means unbounded
    pub capacity: usize,
    pub dequeue_timeout_ms: u64,
}

/// Source stage configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SourceConfig {
    /// Bytes per packet read by the file backend
    pub packet_size: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            capacity: defaults::QUEUE_CAPACITY,
            dequeue_timeout_ms: defaults::DEQUEUE_TIMEOUT_MS,
        }
    }
}

impl QueueConfig {
    pub fn dequeue_timeout(&self) -> Duration {
        Duration::from_millis(self.dequeue_timeout_ms)
    }
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            packet_size: defaults::PACKET_SIZE,
        }
    }
}

/// Reads an environment variable, ignoring unset, empty or unparsable values.
fn env_value<T: FromStr>(key: &str) -> Option<T> {
    let raw = std::env::var(key).ok()?;
    if raw.is_empty() {
        return None;
    }
    match raw.parse() {
        Ok(value) => Some(value),
        Err(_) => {
            log::warn!("Ignoring {}={:?}: not a valid number", key, raw);
            None
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Missing fields use default values.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::ConfigFileNotFound {
                    path: path.display().to_string(),
                }
            } else {
                Error::Io(e)
            }
        })?;
        let config: Config = toml::from_str(&contents).map_err(|e| Error::ConfigParse {
            message: format!("{}: {}", path.display(), e),
        })?;
        Ok(config)
    }

    /// Load configuration from a file or return defaults if file doesn't exist
    ///
    /// Invalid TOML is still an error.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        match Self::load(path) {
            Err(Error::ConfigFileNotFound { path }) => {
                log::debug!("No config at {}, using defaults", path);
                Ok(Self::default())
            }
            other => other,
        }
    }

    /// Apply environment variable overrides
    ///
    /// Supported environment variables:
    /// - STAGEPIPE_WORKERS → scheduler.workers
    /// - STAGEPIPE_IDLE_THRESHOLD → scheduler.idle_threshold
    /// - STAGEPIPE_QUEUE_CAPACITY → queue.capacity
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(workers) = env_value("STAGEPIPE_WORKERS") {
            self.scheduler.workers = workers;
        }
        if let Some(threshold) = env_value("STAGEPIPE_IDLE_THRESHOLD") {
            self.scheduler.idle_threshold = threshold;
        }
        if let Some(capacity) = env_value("STAGEPIPE_QUEUE_CAPACITY") {
            self.queue.capacity = capacity;
        }
        self
    }

    /// Rejects values the scheduler and stages cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.scheduler.workers == 0 {
            return Err(Error::ConfigInvalidValue {
                key: "scheduler.workers".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        if self.source.packet_size == 0 {
            return Err(Error::ConfigInvalidValue {
                key: "source.packet_size".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    /// Get the default configuration file path
    ///
    /// Returns ~/.config/stagepipe/config.toml on Linux
    #[cfg(feature = "cli")]
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("stagepipe").join("config.toml"))
    }
}
