//! Settings error types.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while loading or saving configuration.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// A config file exists but could not be read.
    #[error("failed to read {path}: {source}")]
    Io {
        /// Offending file.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A config file exists but is not valid JSON or violates the schema.
    #[error("invalid config in {path}: {source}")]
    Parse {
        /// Offending file.
        path: PathBuf,
        /// Underlying parse error.
        #[source]
        source: serde_json::Error,
    },

    /// Serialization failure while saving.
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] serde_json::Error),
}
