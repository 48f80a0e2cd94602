//! Error types for configuration loading.

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Errors that can occur while loading directory configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read a configuration file
    #[error("Failed to read config file {path}: {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Failed to parse a configuration file as JSON
    #[error("Failed to parse config file {path}: {source}")]
    ParseJson {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl ConfigError {
    /// Create a read error with path context.
    pub fn read_file(path: &Path, source: std::io::Error) -> Self {
        Self::ReadFile {
            path: path.to_path_buf(),
            source,
        }
    }

    /// Create a parse error with path context.
    pub fn parse_json(path: &Path, source: serde_json::Error) -> Self {
        Self::ParseJson {
            path: path.to_path_buf(),
            source,
        }
    }
}
