//! Queue configuration
//!
//! Loaded from a JSON file. Every field except `data_dir` is optional:
//!
//! ```json
//! {
//!   "data_dir": "/var/lib/aeroqueue",
//!   "max_storage_size_bytes": 5242880,
//!   "sync_mode": "fsync",
//!   "log_level": "info"
//! }
//! ```

mod errors;

pub use errors::{ConfigError, ConfigResult};

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::observability::{log_event_with_fields, Event, Logger, Severity};

/// Default storage ceiling: 5 MiB
pub const DEFAULT_MAX_STORAGE_SIZE: u64 = 5 * 1024 * 1024;

/// When appended bytes are forced to stable storage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncMode {
    /// `sync_data` after every append (and always during compaction)
    #[default]
    Fsync,
    /// Leave appends to the OS page cache; compaction still fsyncs
    None,
}

/// Configuration consumed by the record store and the CLI
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Root directory; records live in `<data_dir>/records/`
    pub data_dir: String,

    /// Byte ceiling for the record file, framing included
    #[serde(default = "default_max_storage_size")]
    pub max_storage_size_bytes: u64,

    /// Append durability
    #[serde(default)]
    pub sync_mode: SyncMode,

    /// Minimum log severity: trace, info, warn, error or fatal.
    /// Lines below ERROR share stdout with CLI responses.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_max_storage_size() -> u64 {
    DEFAULT_MAX_STORAGE_SIZE
}

// Info lines would interleave with the CLI's JSON responses on stdout.
fn default_log_level() -> String {
    "warn".to_string()
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            data_dir: "./aeroqueue_data".to_string(),
            max_storage_size_bytes: default_max_storage_size(),
            sync_mode: SyncMode::default(),
            log_level: default_log_level(),
        }
    }
}

impl QueueConfig {
    /// Default configuration rooted at `data_dir`
    pub fn new(data_dir: impl AsRef<Path>) -> Self {
        Self {
            data_dir: data_dir.as_ref().to_string_lossy().into_owned(),
            ..Self::default()
        }
    }

    /// Sets the storage ceiling in bytes
    pub fn with_max_storage_size(mut self, bytes: u64) -> Self {
        self.max_storage_size_bytes = bytes;
        self
    }

    /// Sets the append durability mode
    pub fn with_sync_mode(mut self, sync_mode: SyncMode) -> Self {
        self.sync_mode = sync_mode;
        self
    }

    /// Root data directory as a path
    pub fn data_path(&self) -> PathBuf {
        PathBuf::from(&self.data_dir)
    }

    /// Parsed log threshold
    pub fn log_severity(&self) -> ConfigResult<Severity> {
        self.log_level
            .parse()
            .map_err(|reason: String| ConfigError::invalid("log_level", reason))
    }

    /// Checks field values.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.data_dir.trim().is_empty() {
            return Err(ConfigError::invalid("data_dir", "must not be empty"));
        }
        if self.max_storage_size_bytes == 0 {
            return Err(ConfigError::invalid(
                "max_storage_size_bytes",
                "must be greater than zero",
            ));
        }
        self.log_severity()?;
        Ok(())
    }

    /// Reads, parses and validates a config file.
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let content = fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            source: e,
        })?;
        let config = Self::from_json(&content)?;

        let max_storage_size = config.max_storage_size_bytes.to_string();
        log_event_with_fields(
            Event::ConfigLoaded,
            Severity::Trace,
            &[
                ("data_dir", config.data_dir.as_str()),
                ("max_storage_size_bytes", max_storage_size.as_str()),
            ],
        );

        Ok(config)
    }

    /// Parses and validates a config from JSON text.
    pub fn from_json(content: &str) -> ConfigResult<Self> {
        let config: QueueConfig = serde_json::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Writes the config as pretty JSON.
    pub fn save(&self, path: &Path) -> ConfigResult<()> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content).map_err(|e| ConfigError::Write {
            path: path.display().to_string(),
            source: e,
        })
    }

    /// Applies `log_level` to the process-wide logger.
    pub fn apply_logging(&self) -> ConfigResult<()> {
        Logger::set_min_severity(self.log_severity()?);
        Ok(())
    }
}
