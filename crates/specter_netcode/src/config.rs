//! Replication session configuration.
//!
//! Loaded once at startup, usually from a `[replication]` table the host
//! application owns. Every field has a default so partial files are fine:
//!
//! ```toml
//! history_capacity = 64
//! desync_threshold_ticks = 32
//! ```

use serde::{Deserialize, Serialize};

use crate::error::{NetcodeError, NetcodeResult};
use crate::history::DEFAULT_HISTORY_CAPACITY;
use crate::prediction::DEFAULT_INPUT_HISTORY_CAPACITY;

/// Tunables for a [`crate::ReplicationSession`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ReplicationConfig {
    /// Snapshot records kept per ghost.
    pub history_capacity: usize,
    /// Maximum number of ghosts bound at once.
    pub max_ghosts: usize,
    /// Rows per chunk in the per-step passes.
    pub chunk_size: usize,
    /// Rows per archetype below which a pass stays on the calling thread.
    pub parallel_threshold: usize,
    /// Latest-tick spread above which a desync is reported.
    pub desync_threshold_ticks: u32,
    /// Local input ticks kept for replay.
    pub input_history_capacity: usize,
}

impl Default for ReplicationConfig {
    fn default() -> Self {
        Self {
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            max_ghosts: 4096,
            chunk_size: 64,
            parallel_threshold: 256,
            desync_threshold_ticks: 64,
            input_history_capacity: DEFAULT_INPUT_HISTORY_CAPACITY,
        }
    }
}

impl ReplicationConfig {
    /// Parses and validates a TOML document.
    ///
    /// # Errors
    ///
    /// Returns [`NetcodeError::InvalidConfig`] on malformed TOML or
    /// out-of-range values.
    pub fn from_toml_str(source: &str) -> NetcodeResult<Self> {
        let config: Self =
            toml::from_str(source).map_err(|err| NetcodeError::InvalidConfig(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Serializes the configuration back to TOML.
    ///
    /// # Errors
    ///
    /// Returns [`NetcodeError::InvalidConfig`] if serialization fails.
    pub fn to_toml_string(&self) -> NetcodeResult<String> {
        toml::to_string(self).map_err(|err| NetcodeError::InvalidConfig(err.to_string()))
    }

    /// Checks value ranges.
    ///
    /// # Errors
    ///
    /// Returns [`NetcodeError::InvalidConfig`] naming the first bad field.
    pub fn validate(&self) -> NetcodeResult<()> {
        if self.history_capacity < 2 {
            return Err(NetcodeError::InvalidConfig(
                "history_capacity must be at least 2".into(),
            ));
        }
        if self.chunk_size == 0 {
            return Err(NetcodeError::InvalidConfig("chunk_size must be at least 1".into()));
        }
        if self.max_ghosts == 0 {
            return Err(NetcodeError::InvalidConfig("max_ghosts must be at least 1".into()));
        }
        if self.input_history_capacity == 0 {
            return Err(NetcodeError::InvalidConfig(
                "input_history_capacity must be at least 1".into(),
            ));
        }
        Ok(())
    }
}
