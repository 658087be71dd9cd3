//! Configuration types for the bulkops engine
//!
//! This module defines all configuration structures used throughout the crate.

use serde::{Deserialize, Serialize};

/// Main bulkops configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BulkOpsConfig {
    /// Executor settings
    #[serde(default)]
    pub engine: EngineConfig,

    /// Chunking of large item lists
    #[serde(default)]
    pub batching: BatchingConfig,

    /// Progress report settings
    #[serde(default)]
    pub progress: ProgressConfig,

    /// Job store configuration
    #[serde(default)]
    pub state_store: StateStoreConfig,
}

impl BulkOpsConfig {
    /// Create a new configuration with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        self.engine.validate()?;
        self.batching.validate()?;
        self.progress.validate()?;
        self.state_store.validate()?;
        Ok(())
    }
}

/// Executor configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Minimum spacing between two registrar calls, across all job kinds
    ///
    /// The registrar's quota is treated as one shared budget, so this applies
    /// process-wide. 0 only serializes calls.
    #[serde(default = "default_min_call_interval_ms")]
    pub min_call_interval_ms: u64,

    /// Capacity of the job event channel
    ///
    /// When full, new events are dropped (with a warning log).
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,
}

impl EngineConfig {
    /// Validate the engine configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.event_channel_capacity == 0 {
            return Err(crate::Error::config("Event channel capacity must be > 0"));
        }
        if self.min_call_interval_ms > 60_000 {
            return Err(crate::Error::config(format!(
                "Minimum call interval must be at most 60000 ms. Got: {}",
                self.min_call_interval_ms
            )));
        }
        Ok(())
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            min_call_interval_ms: default_min_call_interval_ms(),
            event_channel_capacity: default_event_channel_capacity(),
        }
    }
}

/// Chunking policy for large item lists
///
/// Runs with more than `chunk_threshold` items pause for `chunk_delay_secs`
/// after every `chunk_size` registrar calls, to stay clear of the
/// registrar's own throttling.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchingConfig {
    /// Item count above which a run is chunked
    #[serde(default = "default_chunk_threshold")]
    pub chunk_threshold: usize,

    /// Registrar calls per chunk
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Cooldown between chunks (in seconds)
    #[serde(default = "default_chunk_delay_secs")]
    pub chunk_delay_secs: u64,
}

impl BatchingConfig {
    /// Validate the batching configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.chunk_size == 0 {
            return Err(crate::Error::config("Chunk size must be > 0"));
        }
        if self.chunk_delay_secs > 3600 {
            return Err(crate::Error::config(format!(
                "Chunk delay must be at most 3600 seconds. Got: {}",
                self.chunk_delay_secs
            )));
        }
        Ok(())
    }

    /// Whether a run of `total` items is chunked
    pub fn applies_to(&self, total: usize) -> bool {
        total > self.chunk_threshold
    }
}

impl Default for BatchingConfig {
    fn default() -> Self {
        Self {
            chunk_threshold: default_chunk_threshold(),
            chunk_size: default_chunk_size(),
            chunk_delay_secs: default_chunk_delay_secs(),
        }
    }
}

/// Progress report configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressConfig {
    /// Number of most recent errors included in a report
    #[serde(default = "default_recent_errors")]
    pub recent_errors: usize,

    /// Maximum length of a reported error message (in characters)
    #[serde(default = "default_max_message_len")]
    pub max_message_len: usize,
}

impl ProgressConfig {
    /// Validate the progress configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.max_message_len < 16 {
            return Err(crate::Error::config(format!(
                "Maximum message length must be at least 16. Got: {}",
                self.max_message_len
            )));
        }
        Ok(())
    }
}

impl Default for ProgressConfig {
    fn default() -> Self {
        Self {
            recent_errors: default_recent_errors(),
            max_message_len: default_max_message_len(),
        }
    }
}

/// Job store configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StateStoreConfig {
    /// In-memory job store (not persistent)
    #[default]
    Memory,

    /// File-based job store
    File {
        /// Path to the job file
        path: String,
    },
}

impl StateStoreConfig {
    /// Validate the job store configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        match self {
            StateStoreConfig::File { path } if path.trim().is_empty() => Err(
                crate::Error::config("File job store path cannot be empty"),
            ),
            _ => Ok(()),
        }
    }

    /// Get the store type name
    pub fn type_name(&self) -> &str {
        match self {
            StateStoreConfig::Memory => "memory",
            StateStoreConfig::File { .. } => "file",
        }
    }
}

fn default_min_call_interval_ms() -> u64 {
    0
}

fn default_event_channel_capacity() -> usize {
    1000
}

fn default_chunk_threshold() -> usize {
    40
}

fn default_chunk_size() -> usize {
    40
}

fn default_chunk_delay_secs() -> u64 {
    15
}

fn default_recent_errors() -> usize {
    5
}

fn default_max_message_len() -> usize {
    200
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = BulkOpsConfig::new();
        assert!(config.validate().is_ok());
        assert_eq!(config.batching.chunk_threshold, 40);
        assert_eq!(config.batching.chunk_delay_secs, 15);
        assert_eq!(config.state_store.type_name(), "memory");
    }

    #[test]
    fn partial_json_fills_defaults() {
        let config: BulkOpsConfig = serde_json::from_str(
            r#"{"batching":{"chunk_delay_secs":30},"state_store":{"type":"file","path":"/tmp/jobs.json"}}"#,
        )
        .unwrap();
        assert_eq!(config.batching.chunk_delay_secs, 30);
        assert_eq!(config.batching.chunk_size, 40);
        assert_eq!(config.engine.event_channel_capacity, 1000);
        assert_eq!(config.state_store.type_name(), "file");
    }

    #[test]
    fn rejects_nonsense() {
        let mut config = BulkOpsConfig::new();
        config.batching.chunk_size = 0;
        assert!(config.validate().is_err());

        let mut config = BulkOpsConfig::new();
        config.state_store = StateStoreConfig::File { path: " ".into() };
        assert!(config.validate().is_err());

        let mut config = BulkOpsConfig::new();
        config.engine.event_channel_capacity = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn chunking_applies_above_threshold_only() {
        let batching = BatchingConfig::default();
        assert!(!batching.applies_to(40));
        assert!(batching.applies_to(41));
    }
}
