//! Synthetic async lifecycle for blocking deep-research services.
//!
//! Some deep-research services have no task API: the request blocks until
//! the research is done. Wrapping such an adapter in
//! [`SyntheticAsyncProvider`] lets it share the submit/poll/retrieve code
//! path: `submit` executes eagerly, caches the result, and returns a
//! handle that is already terminal; `poll` echoes the cached status;
//! `retrieve` returns the cached result and discards it.
//!
//! The cache is bounded by the number of in-flight handles and cleared on
//! retrieval. It is best-effort across process crashes: a handle whose
//! result was lost answers `UnknownTask` and a re-run produces a fresh
//! handle.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use librarium_core::{AsyncTaskHandle, ProviderDescriptor, ProviderResponse, TaskStatus};
use parking_lot::Mutex;

use crate::provider::{ExecuteOptions, PollUpdate, Provider, ProviderError, TestOutcome};

/// Wrapper adding a synthetic submit/poll/retrieve lifecycle to a
/// sync-only provider.
pub struct SyntheticAsyncProvider {
    inner: Arc<dyn Provider>,
    descriptor: ProviderDescriptor,
    cache: Mutex<HashMap<String, ProviderResponse>>,
}

impl SyntheticAsyncProvider {
    /// Wrap `inner`, advertising the full async capability set on top of
    /// its descriptor.
    #[must_use]
    pub fn new(inner: Arc<dyn Provider>) -> Self {
        let mut descriptor = inner.descriptor().clone();
        descriptor.capabilities.submit = true;
        descriptor.capabilities.poll = true;
        descriptor.capabilities.retrieve = true;
        Self {
            inner,
            descriptor,
            cache: Mutex::new(HashMap::new()),
        }
    }

    fn cached_status(response: &ProviderResponse) -> TaskStatus {
        if response.is_error() {
            TaskStatus::Failed
        } else {
            TaskStatus::Completed
        }
    }
}

#[async_trait]
impl Provider for SyntheticAsyncProvider {
    fn descriptor(&self) -> &ProviderDescriptor {
        &self.descriptor
    }

    async fn execute(&self, query: &str, options: &ExecuteOptions) -> ProviderResponse {
        self.inner.execute(query, options).await
    }

    async fn submit(
        &self,
        query: &str,
        options: &ExecuteOptions,
    ) -> Result<AsyncTaskHandle, ProviderError> {
        let response = self.inner.execute(query, options).await;
        let status = Self::cached_status(&response);
        let task_id = uuid::Uuid::now_v7().to_string();
        let now = chrono::Utc::now().timestamp_millis();

        let _ = self.cache.lock().insert(task_id.clone(), response);

        Ok(AsyncTaskHandle {
            provider: self.descriptor.id.clone(),
            task_id,
            query: query.to_string(),
            submitted_at: now,
            status,
            last_polled_at: None,
            completed_at: Some(now),
            output_dir: None,
        })
    }

    async fn poll(&self, handle: &AsyncTaskHandle) -> Result<PollUpdate, ProviderError> {
        let cache = self.cache.lock();
        match cache.get(&handle.task_id) {
            Some(response) => Ok(PollUpdate::status(Self::cached_status(response))),
            None => Err(ProviderError::UnknownTask {
                task_id: handle.task_id.clone(),
            }),
        }
    }

    async fn retrieve(
        &self,
        handle: &AsyncTaskHandle,
    ) -> Result<ProviderResponse, ProviderError> {
        let removed = self.cache.lock().remove(&handle.task_id);
        removed.ok_or_else(|| ProviderError::UnknownTask {
            task_id: handle.task_id.clone(),
        })
    }

    async fn test(&self) -> Result<TestOutcome, ProviderError> {
        self.inner.test().await
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

    struct BlockingStub {
        descriptor: ProviderDescriptor,
        fail: bool,
    }

    fn stub(fail: bool) -> SyntheticAsyncProvider {
        let descriptor = ProviderDescriptor {
            id: "blocking".into(),
            display_name: "Blocking Research".into(),
            tier: ProviderTier::DeepResearch,
            env_var: "BLOCKING_API_KEY".into(),
            source: ProviderSource::Builtin,
            requires_api_key: true,
            capabilities: Capabilities::execute_only(),
        };
        SyntheticAsyncProvider::new(Arc::new(BlockingStub { descriptor, fail }))
    }

    #[async_trait]
    impl Provider for BlockingStub {
        fn descriptor(&self) -> &ProviderDescriptor {
            &self.descriptor
        }

        async fn execute(&self, _query: &str, _options: &ExecuteOptions) -> ProviderResponse {
            if self.fail {
                ProviderResponse::failure("blocking", ProviderTier::DeepResearch, "boom", 3)
            } else {
                ProviderResponse {
                    provider: "blocking".into(),
                    tier: ProviderTier::DeepResearch,
                    content: "findings".into(),
                    citations: vec![],
                    duration_ms: 3,
                    model: None,
                    token_usage: None,
                    error: None,
                }
            }
        }
    }

    #[test]
    fn wrapper_advertises_async_capabilities() {
        let provider = stub(false);
        let caps = provider.descriptor().capabilities;
        assert!(caps.submit && caps.poll && caps.retrieve);
    }

    #[tokio::test]
    async fn submit_returns_terminal_handle() {
        let provider = stub(false);
        let handle = provider
            .submit("q", &ExecuteOptions::default())
            .await
            .unwrap();
        assert_eq!(handle.status, TaskStatus::Completed);
        assert!(handle.completed_at.is_some());
        assert!(!handle.task_id.is_empty());
    }

    #[tokio::test]
    async fn failed_execution_yields_failed_handle() {
        let provider = stub(true);
        let handle = provider
            .submit("q", &ExecuteOptions::default())
            .await
            .unwrap();
        assert_eq!(handle.status, TaskStatus::Failed);

        let response = provider.retrieve(&handle).await.unwrap();
        assert!(response.is_error());
    }

    #[tokio::test]
    async fn poll_echoes_cached_status() {
        let provider = stub(false);
        let handle = provider
            .submit("q", &ExecuteOptions::default())
            .await
            .unwrap();
        let update = provider.poll(&handle).await.unwrap();
        assert_eq!(update.status, TaskStatus::Completed);
    }

    #[tokio::test]
    async fn retrieve_returns_and_evicts() {
        let provider = stub(false);
        let handle = provider
            .submit("q", &ExecuteOptions::default())
            .await
            .unwrap();

        let response = provider.retrieve(&handle).await.unwrap();
        assert_eq!(response.content, "findings");

        // The cache entry is gone; a second retrieval cannot succeed.
        assert_matches!(
            provider.retrieve(&handle).await,
            Err(ProviderError::UnknownTask { .. })
        );
        assert_matches!(
            provider.poll(&handle).await,
            Err(ProviderError::UnknownTask { .. })
        );
    }

    #[tokio::test]
    async fn handles_are_unique_per_submission() {
        let provider = stub(false);
        let first = provider
            .submit("q", &ExecuteOptions::default())
            .await
            .unwrap();
        let second = provider
            .submit("q", &ExecuteOptions::default())
            .await
            .unwrap();
        assert_ne!(first.task_id, second.task_id);
    }
}
