use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Failures outside the boolean start/stop/emit contract.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("failed to spawn worker {index}: {source}")]
    Spawn {
        index: usize,
        #[source]
        source: io::Error,
    },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}
