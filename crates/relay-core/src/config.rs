use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{RelayError, Result};
use crate::types::MessageType;

/// Top-level configuration for the relay.
///
/// Loaded from `~/.relay/config.toml` by default. Each section corresponds
/// to one component of the pipeline.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RelayConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,
    #[serde(default)]
    pub filter: FilterConfig,
}

impl RelayConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: RelayConfig = toml::from_str(&content)?;
        config.validate()?;
        info!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    /// Load configuration from a TOML file, falling back to defaults if the
    /// file does not exist or cannot be parsed.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(
                    "Failed to load config from {}: {}. Using defaults.",
                    path.display(),
                    e
                );
                Self::default()
            }
        }
    }

    /// Save the current configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        info!("Configuration saved to {}", path.display());
        Ok(())
    }

    /// Reject values the orchestrator cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.orchestrator.workers == 0 {
            return Err(RelayError::Config(
                "orchestrator.workers must be at least 1".to_string(),
            ));
        }
        if self.orchestrator.queue_capacity == 0 {
            return Err(RelayError::Config(
                "orchestrator.queue_capacity must be at least 1".to_string(),
            ));
        }
        if self.filter.supported_types.is_empty() {
            return Err(RelayError::Config(
                "filter.supported_types must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Data directory for the SQLite store.
    pub data_dir: String,
    /// Log level: trace, debug, info, warn, error.
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            data_dir: "~/.relay/data".to_string(),
            log_level: "info".to_string(),
        }
    }
}

/// Persistence settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Database file name inside the data directory.
    pub db_file: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_file: "relay.db".to_string(),
        }
    }
}

/// What to do when a completion handler fails after an answer was produced.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionPolicy {
    /// Stop the handler chain, skip persistence, mark the session `Error`.
    #[default]
    AbortAndDrop,
    /// Stop the handler chain, log a warning, persist and mark `Completion`.
    PersistWithWarning,
}

/// Worker pool and fan-out settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Number of workers draining the branch queue.
    pub workers: usize,
    /// Maximum queued branches before inbound delivery waits.
    pub queue_capacity: usize,
    /// Delay between queuing successive fan-out branches of one event.
    pub fanout_delay_ms: u64,
    pub completion_policy: CompletionPolicy,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            queue_capacity: 64,
            fanout_delay_ms: 0,
            completion_policy: CompletionPolicy::AbortAndDrop,
        }
    }
}

/// Default filter settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    /// Messages older than this are rejected as stale.
    pub staleness_secs: u64,
    /// Also reject redelivery of sessions whose last attempt failed.
    pub reject_failed_redelivery: bool,
    /// Message types the relay answers.
    pub supported_types: Vec<MessageType>,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            staleness_secs: 10,
            reject_failed_redelivery: false,
            supported_types: vec![MessageType::Text],
        }
    }
}
