//! # Provider Trait
//!
//! Core abstraction for remote search / research services. Every provider
//! (built-in, Node module, or script subprocess) implements [`Provider`]
//! to expose the uniform operation surface the dispatcher routes on.
//!
//! `execute` is mandatory and infallible at the signature level: remote
//! errors are folded into the returned [`ProviderResponse`] rather than
//! thrown, so one misbehaving service can never abort a fan-out. The
//! optional operations default to [`ProviderError::Unsupported`]; the
//! capability flags in the descriptor tell the dispatcher which ones are
//! actually wired.

use std::time::Duration;

use async_trait::async_trait;
use librarium_core::{AsyncTaskHandle, ProviderDescriptor, ProviderResponse, TaskStatus};
use tokio_util::sync::CancellationToken;

/// Errors from the optional provider operations.
///
/// `execute` never returns these; only `submit`/`poll`/`retrieve`/`test`
/// are fallible at the call surface.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// The provider does not implement this operation.
    #[error("provider \"{provider}\" does not support {operation}")]
    Unsupported {
        /// Provider id.
        provider: String,
        /// Operation name (`submit`, `poll`, `retrieve`, `test`).
        operation: &'static str,
    },

    /// The remote service rejected the operation.
    #[error("{message}")]
    Api {
        /// HTTP status code, when one was received.
        status: Option<u16>,
        /// Folded error description (already includes provider context).
        message: String,
    },

    /// Transport-level failure (network, timeout, abort).
    #[error("{message}")]
    Transport {
        /// Folded error description.
        message: String,
    },

    /// The handle's task id is unknown to this provider.
    #[error("unknown task \"{task_id}\"")]
    UnknownTask {
        /// The id that failed to resolve.
        task_id: String,
    },

    /// The service answered with a shape the adapter cannot map.
    #[error("unexpected response shape: {message}")]
    InvalidResponse {
        /// What was missing or malformed.
        message: String,
    },
}

impl ProviderError {
    /// Shorthand for an [`ProviderError::Unsupported`] on `operation`.
    #[must_use]
    pub fn unsupported(provider: &ProviderDescriptor, operation: &'static str) -> Self {
        Self::Unsupported {
            provider: provider.id.clone(),
            operation,
        }
    }
}

/// Options passed to `execute` and `submit`.
#[derive(Clone, Debug)]
pub struct ExecuteOptions {
    /// Overall time budget for the operation.
    pub timeout: Duration,
    /// External cancellation signal, propagated into every HTTP attempt.
    pub cancellation: Option<CancellationToken>,
    /// Model override from `providers.<id>.model`, for adapters that
    /// honor a model name.
    pub model: Option<String>,
}

impl Default for ExecuteOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(300),
            cancellation: None,
            model: None,
        }
    }
}

/// Result of polling a submitted task.
#[derive(Clone, Debug)]
pub struct PollUpdate {
    /// Current lifecycle status.
    pub status: TaskStatus,
    /// Fractional progress in `[0, 1]`, when the service reports one.
    pub progress: Option<f64>,
    /// Human-readable progress note.
    pub message: Option<String>,
}

impl PollUpdate {
    /// A bare status update with no progress detail.
    #[must_use]
    pub fn status(status: TaskStatus) -> Self {
        Self {
            status,
            progress: None,
            message: None,
        }
    }
}

/// Result of a provider self-test.
#[derive(Clone, Debug)]
pub struct TestOutcome {
    /// Whether the provider looks usable.
    pub ok: bool,
    /// Failure description when not ok.
    pub error: Option<String>,
}

impl TestOutcome {
    /// A passing outcome.
    #[must_use]
    pub fn passed() -> Self {
        Self {
            ok: true,
            error: None,
        }
    }

    /// A failing outcome with a description.
    #[must_use]
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            ok: false,
            error: Some(error.into()),
        }
    }
}

/// Uniform façade for one remote search / research service.
///
/// Implementors must be `Send + Sync`; the dispatcher shares them across
/// tasks behind `Arc<dyn Provider>`.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Identity and declared capabilities.
    fn descriptor(&self) -> &ProviderDescriptor;

    /// Execute the query synchronously.
    ///
    /// Never fails at the signature level: remote errors, timeouts, and
    /// cancellation are folded into the response's `error` field.
    async fn execute(&self, query: &str, options: &ExecuteOptions) -> ProviderResponse;

    /// Submit the query as a long-running task (deep-research only).
    ///
    /// The returned handle may already be terminal for services that are
    /// really blocking (see [`SyntheticAsyncProvider`](crate::SyntheticAsyncProvider)).
    async fn submit(
        &self,
        _query: &str,
        _options: &ExecuteOptions,
    ) -> Result<AsyncTaskHandle, ProviderError> {
        Err(ProviderError::unsupported(self.descriptor(), "submit"))
    }

    /// Poll a submitted task for its current status.
    async fn poll(&self, _handle: &AsyncTaskHandle) -> Result<PollUpdate, ProviderError> {
        Err(ProviderError::unsupported(self.descriptor(), "poll"))
    }

    /// Retrieve the artifact of a completed task.
    async fn retrieve(
        &self,
        _handle: &AsyncTaskHandle,
    ) -> Result<ProviderResponse, ProviderError> {
        Err(ProviderError::unsupported(self.descriptor(), "retrieve"))
    }

    /// Cheap connectivity / credential check.
    async fn test(&self) -> Result<TestOutcome, ProviderError> {
        Err(ProviderError::unsupported(self.descriptor(), "test"))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use librarium_core::{Capabilities, ProviderSource, ProviderTier};

    struct MinimalProvider {
        descriptor: ProviderDescriptor,
    }

    fn minimal() -> MinimalProvider {
        MinimalProvider {
            descriptor: ProviderDescriptor {
                id: "minimal".into(),
                display_name: "Minimal".into(),
                tier: ProviderTier::RawSearch,
                env_var: "MINIMAL_API_KEY".into(),
                source: ProviderSource::Builtin,
                requires_api_key: true,
                capabilities: Capabilities::execute_only(),
            },
        }
    }

    #[async_trait]
    impl Provider for MinimalProvider {
        fn descriptor(&self) -> &ProviderDescriptor {
            &self.descriptor
        }

        async fn execute(&self, _query: &str, _options: &ExecuteOptions) -> ProviderResponse {
            ProviderResponse {
                provider: self.descriptor.id.clone(),
                tier: self.descriptor.tier,
                content: "hello".into(),
                citations: vec![],
                duration_ms: 1,
                model: None,
                token_usage: None,
                error: None,
            }
        }
    }

    #[test]
    fn provider_is_object_safe() {
        fn assert_object_safe(_: &dyn Provider) {}
        let _ = assert_object_safe;
    }

    #[test]
    fn provider_send_sync() {
        fn assert_send_sync<T: Send + Sync + ?Sized>() {}
        assert_send_sync::<dyn Provider>();
    }

    #[tokio::test]
    async fn optional_operations_default_to_unsupported() {
        let provider = minimal();
        let handle = AsyncTaskHandle {
            provider: "minimal".into(),
            task_id: "t1".into(),
            query: "q".into(),
            submitted_at: 0,
            status: TaskStatus::Pending,
            last_polled_at: None,
            completed_at: None,
            output_dir: None,
        };

        assert_matches!(
            provider.submit("q", &ExecuteOptions::default()).await,
            Err(ProviderError::Unsupported { operation: "submit", .. })
        );
        assert_matches!(
            provider.poll(&handle).await,
            Err(ProviderError::Unsupported { operation: "poll", .. })
        );
        assert_matches!(
            provider.retrieve(&handle).await,
            Err(ProviderError::Unsupported { operation: "retrieve", .. })
        );
        assert_matches!(
            provider.test().await,
            Err(ProviderError::Unsupported { operation: "test", .. })
        );
    }

    #[test]
    fn execute_options_defaults() {
        let options = ExecuteOptions::default();
        assert_eq!(options.timeout, Duration::from_secs(300));
        assert!(options.cancellation.is_none());
        assert!(options.model.is_none());
    }

    #[test]
    fn test_outcome_constructors() {
        assert!(TestOutcome::passed().ok);
        let failed = TestOutcome::failed("no key");
        assert!(!failed.ok);
        assert_eq!(failed.error.as_deref(), Some("no key"));
    }
}
