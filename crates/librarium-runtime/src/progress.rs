//! Progress events emitted during a dispatch.
//!
//! Events go to an optional sink, are never buffered, and must not
//! block: the CLI uses them for display only, and everything a caller
//! can rely on lands in the reports instead.

use librarium_core::ReportStatus;

/// One dispatch lifecycle event.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ProgressEvent {
    /// A provider task began executing.
    Started {
        /// Provider id.
        provider: String,
    },
    /// A provider task settled (any status).
    Completed {
        /// Provider id.
        provider: String,
        /// Settled status.
        status: ReportStatus,
        /// Wall-clock duration in milliseconds.
        duration_ms: u64,
    },
    /// A provider threw during the sync path.
    Error {
        /// Provider id.
        provider: String,
        /// Failure description.
        message: String,
    },
    /// A deep-research task was submitted for deferred retrieval.
    AsyncSubmitted {
        /// Provider id.
        provider: String,
        /// Provider-assigned task id.
        task_id: String,
    },
    /// A fallback execution began for a thrown primary.
    FallbackStarted {
        /// The failed primary provider.
        provider: String,
        /// The fallback about to execute.
        fallback: String,
    },
}

/// Non-blocking receiver of progress events.
pub trait ProgressSink: Send + Sync {
    /// Handle one event. Must not block.
    fn emit(&self, event: ProgressEvent);
}

/// Sink that drops everything; the default for headless callers.
pub struct NullSink;

impl ProgressSink for NullSink {
    fn emit(&self, _event: ProgressEvent) {}
}
