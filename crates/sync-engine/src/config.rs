//! # Engine Configuration
//!
//! Configuration for the sync engine: server URL, batching, retry profile,
//! concurrency, and the conflict-resolution strategy name.
//!
//! ## Configuration File Format
//!
//! `conflict_strategy` is internally tagged (see [`ConflictStrategyName`]),
//! so it needs its own table with a `kind` key rather than a bare string.
//! ```toml
//! [sync]
//! server_url = "https://sync.example.com"
//! batch_size = 10
//! sync_interval_ms = 30000
//! max_attempts = 3
//! initial_retry_delay_ms = 1000
//! backoff_multiplier = 2.0
//! max_retry_delay_ms = 15000
//! request_timeout_ms = 10000
//! max_concurrent = 3
//! debug = false
//!
//! [sync.conflict_strategy]
//! kind = "timestamp-wins"
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::SyncResult;

// =============================================================================
// Conflict Strategy Name
// =============================================================================

/// The conflict strategy selected via configuration.
///
/// `version-based` and `smart-merge` carry the extra parameter the strategy
/// needs; `custom` cannot be represented in TOML and is always constructed
/// in code (see [`crate::resolver::ConflictStrategy::Custom`]) — a
/// configuration naming it is rejected at validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum ConflictStrategyName {
    ClientWins,
    ServerWins,
    TimestampWins,
    VersionBased { field: String },
    Merge,
    SmartMerge { keys: Vec<String> },
    Manual,
    Custom,
}

impl Default for ConflictStrategyName {
    fn default() -> Self {
        ConflictStrategyName::TimestampWins
    }
}

// =============================================================================
// Engine Configuration
// =============================================================================

/// Complete sync engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Base URL handed to the Adapter. Opaque to the coordinator.
    pub server_url: String,

    /// Maximum entries read per `NextBatch` call.
    pub batch_size: usize,

    /// Interval between periodic ticker drains, in milliseconds.
    pub sync_interval_ms: u64,

    /// Maximum transmission attempts (including the first) before an entry
    /// reaches `failed`.
    pub max_attempts: u32,

    /// Initial retry delay, in milliseconds.
    pub initial_retry_delay_ms: u64,

    /// Exponential backoff multiplier.
    pub backoff_multiplier: f64,

    /// Retry delay ceiling, in milliseconds.
    pub max_retry_delay_ms: u64,

    /// Per-Adapter-call timeout, in milliseconds.
    pub request_timeout_ms: u64,

    /// Maximum in-flight Adapter calls per drain cycle.
    pub max_concurrent: usize,

    /// The conflict resolution strategy to use.
    pub conflict_strategy: ConflictStrategyName,

    /// Enables verbose per-entry tracing.
    pub debug: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            server_url: String::new(),
            batch_size: 10,
            sync_interval_ms: 30_000,
            max_attempts: 3,
            initial_retry_delay_ms: 1_000,
            backoff_multiplier: 2.0,
            max_retry_delay_ms: 15_000,
            request_timeout_ms: 10_000,
            max_concurrent: 3,
            conflict_strategy: ConflictStrategyName::default(),
            debug: false,
        }
    }
}

impl EngineConfig {
    /// Creates a config with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from a TOML file, falling back to defaults for
    /// any field the file omits; validates before returning.
    pub fn load(config_path: Option<PathBuf>) -> SyncResult<Self> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "loading sync engine config from file");
                let contents = std::fs::read_to_string(&path)?;
                config = toml::from_str(&contents)?;
            } else {
                debug!(?path, "config file not found, using defaults");
            }
        }

        config.validate()?;
        Ok(config)
    }

    /// Loads config or falls back to defaults on any error.
    pub fn load_or_default(config_path: Option<PathBuf>) -> Self {
        Self::load(config_path).unwrap_or_else(|e| {
            warn!("failed to load sync engine config: {e}. using defaults.");
            Self::default()
        })
    }

    /// Saves configuration to a TOML file, creating parent directories.
    pub fn save(&self, config_path: Option<PathBuf>) -> SyncResult<()> {
        let path = config_path
            .or_else(Self::default_config_path)
            .ok_or_else(|| crate::error::SyncError::Config("no config path available".into()))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(&path, contents)?;
        info!(?path, "sync engine config saved");
        Ok(())
    }

    /// Validates the configuration.
    pub fn validate(&self) -> SyncResult<()> {
        if self.batch_size == 0 {
            return Err(crate::error::SyncError::Config("batch_size must be greater than 0".into()));
        }
        if self.max_attempts == 0 {
            return Err(crate::error::SyncError::Config("max_attempts must be greater than 0".into()));
        }
        if self.max_concurrent == 0 {
            return Err(crate::error::SyncError::Config("max_concurrent must be greater than 0".into()));
        }
        if self.backoff_multiplier < 1.0 {
            return Err(crate::error::SyncError::Config("backoff_multiplier must be >= 1.0".into()));
        }
        if self.conflict_strategy == ConflictStrategyName::Custom {
            return Err(crate::error::SyncError::Config(
                "conflict_strategy 'custom' cannot be selected from a config file; construct it in code".into(),
            ));
        }
        Ok(())
    }

    fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "syncwell", "syncwell").map(|dirs| dirs.config_dir().join("sync.toml"))
    }

    pub fn sync_interval(&self) -> Duration {
        Duration::from_millis(self.sync_interval_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_have_expected_values() {
        let config = EngineConfig::default();
        assert_eq!(config.batch_size, 10);
        assert_eq!(config.sync_interval_ms, 30_000);
        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.initial_retry_delay_ms, 1_000);
        assert_eq!(config.backoff_multiplier, 2.0);
        assert_eq!(config.max_retry_delay_ms, 15_000);
        assert_eq!(config.request_timeout_ms, 10_000);
        assert_eq!(config.max_concurrent, 3);
        assert_eq!(config.conflict_strategy, ConflictStrategyName::TimestampWins);
    }

    #[test]
    fn validate_rejects_zero_batch_size() {
        let mut config = EngineConfig::default();
        config.batch_size = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_custom_strategy_from_config() {
        let mut config = EngineConfig::default();
        config.conflict_strategy = ConflictStrategyName::Custom;
        assert!(config.validate().is_err());
    }

    #[test]
    fn toml_round_trips_a_bare_sync_table() {
        let toml_str = "";
        let config: EngineConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.batch_size, 10);
    }
}
