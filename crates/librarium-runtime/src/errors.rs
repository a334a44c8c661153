//! Runtime error types.

use std::path::PathBuf;

use thiserror::Error;

/// I/O and serialization failures from the run engine.
///
/// Provider failures never surface here; they become reports.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// Filesystem failure with the offending path attached.
    #[error("{path}: {source}")]
    Io {
        /// Offending path.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// A JSON artifact could not be (de)serialized.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl RuntimeError {
    /// Attach a path to an I/O error.
    #[must_use]
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
