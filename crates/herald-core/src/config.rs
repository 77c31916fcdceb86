//! Dispatcher configuration.
//!
//! Every field has a default, so `{}` is a valid config file.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

fn default_thread_count() -> usize {
    1
}

fn default_thread_name_prefix() -> String {
    "herald-worker".to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatcherConfig {
    /// Workers spawned by `start_configured()`. Clamped at start time.
    pub thread_count: usize,

    /// Worker threads are named `<prefix>-<index>`.
    pub thread_name_prefix: String,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            thread_count: default_thread_count(),
            thread_name_prefix: default_thread_name_prefix(),
        }
    }
}

impl DispatcherConfig {
    pub fn from_json_str(s: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&raw)
    }

    /// `thread_count` is not validated here: out-of-range values are clamped.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.thread_name_prefix.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "thread_name_prefix must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Clamp a requested worker count to `[1, available cores]`.
    pub fn effective_threads(requested: usize) -> usize {
        requested.clamp(1, max_threads())
    }
}

pub fn max_threads() -> usize {
    num_cpus::get().max(1)
}
