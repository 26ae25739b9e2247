/*!
 * Bridge Configuration
 *
 * Sizes the descriptor table and names the host files opened into the
 * file table at construction.
 */

use crate::core::errors::ConfigError;
use crate::core::limits::{LOG_FILE_INDEX, MAX_FD_COUNT, MAX_FILE_FDS};
use crate::core::types::FileIndex;

use ahash::AHashSet;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Environment variable overriding the descriptor table size
pub const ENV_FD_TABLE_SIZE: &str = "GUEST_BRIDGE_FD_TABLE_SIZE";

/// Prefix of the per-slot file variables (`GUEST_BRIDGE_FILE_0` ..)
pub const ENV_FILE_PREFIX: &str = "GUEST_BRIDGE_FILE_";

/// Environment variable naming the guest log file
pub const ENV_LOG_FILE: &str = "GUEST_BRIDGE_LOG_FILE";

/// A host file bound to a guest file slot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileSlotConfig {
    pub index: FileIndex,
    pub path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Generic fd table capacity (default: 256)
    pub fd_table_size: usize,

    /// Host files opened at construction
    pub files: Vec<FileSlotConfig>,
}

impl BridgeConfig {
    pub fn new() -> Self {
        Self {
            fd_table_size: MAX_FD_COUNT,
            files: Vec::new(),
        }
    }

    /// Builder: bind `path` to file slot `index`
    pub fn with_file(mut self, index: FileIndex, path: impl Into<PathBuf>) -> Self {
        self.files.push(FileSlotConfig {
            index,
            path: path.into(),
        });
        self
    }

    /// Builder: bind `path` to the guest log slot
    pub fn with_log_file(self, path: impl Into<PathBuf>) -> Self {
        self.with_file(LOG_FILE_INDEX, path)
    }

    /// Parse and validate a JSON document
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Build from `GUEST_BRIDGE_*` environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    fn from_vars(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::new();

        if let Some(value) = lookup(ENV_FD_TABLE_SIZE) {
            config.fd_table_size = value.trim().parse().map_err(|_| ConfigError::InvalidEnv {
                key: ENV_FD_TABLE_SIZE.to_string(),
                value,
            })?;
        }

        for index in 0..MAX_FILE_FDS as FileIndex {
            if let Some(path) = lookup(&format!("{ENV_FILE_PREFIX}{index}")) {
                config = config.with_file(index, path);
            }
        }
        if let Some(path) = lookup(ENV_LOG_FILE) {
            config = config.with_log_file(path);
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=MAX_FD_COUNT).contains(&self.fd_table_size) {
            return Err(ConfigError::FdTableSize {
                requested: self.fd_table_size,
                max: MAX_FD_COUNT,
            });
        }

        let mut seen = AHashSet::new();
        for slot in &self.files {
            if slot.index >= MAX_FILE_FDS as FileIndex {
                return Err(ConfigError::FileIndex {
                    index: slot.index,
                    max: MAX_FILE_FDS,
                });
            }
            if !seen.insert(slot.index) {
                return Err(ConfigError::DuplicateFileSlot(slot.index));
            }
        }
        Ok(())
    }
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self::new()
    }
}
