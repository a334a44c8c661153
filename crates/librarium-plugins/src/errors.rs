//! Plugin error types.

use thiserror::Error;

/// Failures while loading or driving a custom provider.
#[derive(Debug, Error)]
pub enum PluginError {
    /// The child process could not be spawned.
    #[error("failed to spawn \"{command}\": {message}")]
    Spawn {
        /// The executable that failed to start.
        command: String,
        /// Underlying error description.
        message: String,
    },

    /// The child did not answer within the operation timeout and was
    /// killed.
    #[error("plugin timed out after {timeout_ms}ms during {operation}")]
    Timeout {
        /// The envelope operation in flight.
        operation: &'static str,
        /// Enforced timeout.
        timeout_ms: u64,
    },

    /// The caller's cancellation signal fired; the child was killed.
    #[error("plugin operation cancelled")]
    Cancelled,

    /// The child exited without producing valid JSON.
    #[error("plugin produced invalid JSON: {excerpt}")]
    NonJson {
        /// Short excerpt of what the child actually wrote.
        excerpt: String,
    },

    /// The child answered `{ok: false}`.
    #[error("plugin reported an error: {message}")]
    Plugin {
        /// The plugin's own error string.
        message: String,
    },

    /// The response's `data` did not match the operation's schema.
    #[error("plugin response failed validation: {message}")]
    Schema {
        /// What was missing or malformed.
        message: String,
    },

    /// A Node module could not be resolved on disk.
    #[error("cannot resolve module \"{module}\"")]
    Resolution {
        /// The configured module specifier.
        module: String,
    },

    /// Child I/O failure (broken pipe, read error).
    #[error("plugin I/O error: {0}")]
    Io(#[from] std::io::Error),
}
