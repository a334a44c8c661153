//! Script-IPC custom providers.
//!
//! A [`ScriptProvider`] satisfies the full provider contract by spawning
//! its configured command once per operation and speaking the envelope
//! protocol. Which optional operations are wired is decided by the
//! capabilities the plugin declared at `describe` time; undeclared
//! operations answer `Unsupported` without spawning anything.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use librarium_core::{AsyncTaskHandle, ProviderDescriptor, ProviderResponse};
use librarium_providers::provider::{
    ExecuteOptions, PollUpdate, Provider, ProviderError, TestOutcome,
};
use serde_json::Value;

use crate::errors::PluginError;
use crate::ipc::{
    DEFAULT_OPERATION_TIMEOUT, IpcCommand, MIN_EXECUTE_TIMEOUT, RETRIEVE_TIMEOUT, run_once,
};
use crate::protocol::{
    Operation, PluginRequest, RequestOptions, parse_response, validate_poll, validate_result,
    validate_submit, validate_test,
};

/// A custom provider driven over stdio JSON.
pub struct ScriptProvider {
    descriptor: ProviderDescriptor,
    command: IpcCommand,
    provider_config: Option<Value>,
    source_options: Option<Value>,
}

impl ScriptProvider {
    /// Wire a provider from its validated descriptor and spawn recipe.
    #[must_use]
    pub fn new(
        descriptor: ProviderDescriptor,
        command: IpcCommand,
        provider_config: Option<Value>,
        source_options: Option<Value>,
    ) -> Self {
        Self {
            descriptor,
            command,
            provider_config,
            source_options,
        }
    }

    fn request(&self, operation: Operation) -> PluginRequest {
        PluginRequest {
            provider_config: self.provider_config.clone(),
            source_options: self.source_options.clone(),
            ..PluginRequest::bare(operation, self.descriptor.id.clone())
        }
    }

    async fn call(
        &self,
        operation: Operation,
        request: &PluginRequest,
        timeout: Duration,
        options: Option<&ExecuteOptions>,
    ) -> Result<Value, PluginError> {
        let body = serde_json::to_string(request).map_err(|e| PluginError::Schema {
            message: format!("request serialization: {e}"),
        })?;
        let cancel = options.and_then(|o| o.cancellation.as_ref());
        let raw = run_once(&self.command, operation.name(), &body, timeout, cancel).await?;
        parse_response(&raw)
    }

    fn execute_timeout(options: &ExecuteOptions) -> Duration {
        options.timeout.max(MIN_EXECUTE_TIMEOUT)
    }
}

/// Map plugin failures onto the provider error surface.
fn to_provider_error(error: PluginError) -> ProviderError {
    match error {
        PluginError::Timeout { .. } | PluginError::Cancelled | PluginError::Spawn { .. } => {
            ProviderError::Transport {
                message: error.to_string(),
            }
        }
        other => ProviderError::Api {
            status: None,
            message: other.to_string(),
        },
    }
}

#[async_trait]
impl Provider for ScriptProvider {
    fn descriptor(&self) -> &ProviderDescriptor {
        &self.descriptor
    }

    async fn execute(&self, query: &str, options: &ExecuteOptions) -> ProviderResponse {
        let start = Instant::now();
        let request = PluginRequest {
            query: Some(query.to_string()),
            options: Some(RequestOptions {
                timeout_ms: Some(options.timeout.as_millis() as u64),
                model: options.model.clone(),
            }),
            ..self.request(Operation::Execute)
        };

        let outcome = self
            .call(
                Operation::Execute,
                &request,
                Self::execute_timeout(options),
                Some(options),
            )
            .await
            .and_then(|data| {
                validate_result(&self.descriptor, &data, start.elapsed().as_millis() as u64)
            });

        match outcome {
            Ok(response) => response,
            Err(error) => ProviderResponse::failure(
                &self.descriptor.id,
                self.descriptor.tier,
                format!("{} plugin failed: {error}", self.descriptor.display_name),
                start.elapsed().as_millis() as u64,
            ),
        }
    }

    async fn submit(
        &self,
        query: &str,
        options: &ExecuteOptions,
    ) -> Result<AsyncTaskHandle, ProviderError> {
        if !self.descriptor.capabilities.submit {
            return Err(ProviderError::unsupported(&self.descriptor, "submit"));
        }
        let request = PluginRequest {
            query: Some(query.to_string()),
            options: Some(RequestOptions {
                timeout_ms: Some(options.timeout.as_millis() as u64),
                model: options.model.clone(),
            }),
            ..self.request(Operation::Submit)
        };
        let data = self
            .call(
                Operation::Submit,
                &request,
                Self::execute_timeout(options),
                Some(options),
            )
            .await
            .map_err(to_provider_error)?;
        validate_submit(&self.descriptor, query, &data).map_err(to_provider_error)
    }

    async fn poll(&self, handle: &AsyncTaskHandle) -> Result<PollUpdate, ProviderError> {
        if !self.descriptor.capabilities.poll {
            return Err(ProviderError::unsupported(&self.descriptor, "poll"));
        }
        let request = PluginRequest {
            handle: Some(handle.clone()),
            ..self.request(Operation::Poll)
        };
        let data = self
            .call(Operation::Poll, &request, DEFAULT_OPERATION_TIMEOUT, None)
            .await
            .map_err(to_provider_error)?;
        validate_poll(&data).map_err(to_provider_error)
    }

    async fn retrieve(
        &self,
        handle: &AsyncTaskHandle,
    ) -> Result<ProviderResponse, ProviderError> {
        if !self.descriptor.capabilities.retrieve {
            return Err(ProviderError::unsupported(&self.descriptor, "retrieve"));
        }
        let start = Instant::now();
        let request = PluginRequest {
            handle: Some(handle.clone()),
            ..self.request(Operation::Retrieve)
        };
        let data = self
            .call(Operation::Retrieve, &request, RETRIEVE_TIMEOUT, None)
            .await
            .map_err(to_provider_error)?;
        validate_result(&self.descriptor, &data, start.elapsed().as_millis() as u64)
            .map_err(to_provider_error)
    }

    async fn test(&self) -> Result<TestOutcome, ProviderError> {
        if !self.descriptor.capabilities.test {
            return Err(ProviderError::unsupported(&self.descriptor, "test"));
        }
        let request = self.request(Operation::Test);
        let data = self
            .call(Operation::Test, &request, DEFAULT_OPERATION_TIMEOUT, None)
            .await
            .map_err(to_provider_error)?;
        validate_test(&data).map_err(to_provider_error)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use librarium_core::{Capabilities, ProviderSource, ProviderTier, TaskStatus};
    use std::collections::BTreeMap;

    /// A POSIX-sh plugin that answers every protocol operation.
    const PLUGIN_SCRIPT: &str = r#"
req=$(cat)
case "$req" in
  *'"operation":"execute"'*)
    printf '%s' '{"ok":true,"data":{"content":"plugin findings","citations":[{"url":"https://plug.dev/a","title":"Plug A","provider":"my-search"}],"durationMs":12}}' ;;
  *'"operation":"submit"'*)
    printf '%s' '{"ok":true,"data":{"taskId":"task-7","status":"running"}}' ;;
  *'"operation":"poll"'*)
    printf '%s' '{"ok":true,"data":{"status":"completed","progress":1.0}}' ;;
  *'"operation":"retrieve"'*)
    printf '%s' '{"ok":true,"data":{"content":"retrieved","citations":[]}}' ;;
  *'"operation":"test"'*)
    printf '%s' '{"ok":true,"data":{"ok":true}}' ;;
  *)
    printf '%s' '{"ok":false,"error":"unsupported operation"}' ;;
esac
"#;

    fn plugin(capabilities: Capabilities) -> (ScriptProvider, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plugin.sh");
        std::fs::write(&path, PLUGIN_SCRIPT).unwrap();

        let provider = ScriptProvider::new(
            ProviderDescriptor {
                id: "my-search".into(),
                display_name: "My Search".into(),
                tier: ProviderTier::RawSearch,
                env_var: "MY_KEY".into(),
                source: ProviderSource::Script,
                requires_api_key: true,
                capabilities,
            },
            IpcCommand {
                command: "sh".into(),
                args: vec![path.to_string_lossy().into_owned()],
                env: BTreeMap::new(),
                cwd: None,
            },
            Some(serde_json::json!({"enabled": true})),
            Some(serde_json::json!({"region": "eu"})),
        );
        (provider, dir)
    }

    fn all_capabilities() -> Capabilities {
        Capabilities::full_async().with_test()
    }

    #[tokio::test]
    async fn execute_round_trip() {
        let (provider, _dir) = plugin(all_capabilities());
        let response = provider.execute("q", &ExecuteOptions::default()).await;

        assert!(!response.is_error());
        assert_eq!(response.content, "plugin findings");
        assert_eq!(response.citations.len(), 1);
        assert_eq!(response.citations[0].provider, "my-search");
        assert_eq!(response.duration_ms, 12);
    }

    #[tokio::test]
    async fn submit_poll_round_trip() {
        let (provider, _dir) = plugin(all_capabilities());

        let handle = provider
            .submit("q", &ExecuteOptions::default())
            .await
            .unwrap();
        assert_eq!(handle.task_id, "task-7");
        assert_eq!(handle.status, TaskStatus::Running);

        let update = provider.poll(&handle).await.unwrap();
        assert_eq!(update.status, TaskStatus::Completed);

        let response = provider.retrieve(&handle).await.unwrap();
        assert_eq!(response.content, "retrieved");
    }

    #[tokio::test]
    async fn test_operation() {
        let (provider, _dir) = plugin(all_capabilities());
        let outcome = provider.test().await.unwrap();
        assert!(outcome.ok);
    }

    #[tokio::test]
    async fn undeclared_capabilities_do_not_spawn() {
        let (provider, _dir) = plugin(Capabilities::execute_only());
        assert_matches!(
            provider.submit("q", &ExecuteOptions::default()).await,
            Err(ProviderError::Unsupported { operation: "submit", .. })
        );
        assert_matches!(
            provider.test().await,
            Err(ProviderError::Unsupported { operation: "test", .. })
        );
    }

    #[tokio::test]
    async fn plugin_error_folds_into_execute_response() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("failing.sh");
        std::fs::write(&path, "cat >/dev/null; printf '{\"ok\":false,\"error\":\"backend down\"}'")
            .unwrap();

        let provider = ScriptProvider::new(
            ProviderDescriptor {
                id: "failing".into(),
                display_name: "Failing".into(),
                tier: ProviderTier::RawSearch,
                env_var: String::new(),
                source: ProviderSource::Script,
                requires_api_key: false,
                capabilities: Capabilities::execute_only(),
            },
            IpcCommand {
                command: "sh".into(),
                args: vec![path.to_string_lossy().into_owned()],
                env: BTreeMap::new(),
                cwd: None,
            },
            None,
            None,
        );

        let response = provider.execute("q", &ExecuteOptions::default()).await;
        assert!(response.is_error());
        let error = response.error.unwrap();
        assert!(error.contains("Failing plugin failed"));
        assert!(error.contains("backend down"));
    }

    #[tokio::test]
    async fn non_json_output_folds_into_execute_response() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("noisy.sh");
        std::fs::write(&path, "cat >/dev/null; echo 'DEBUG: starting up'").unwrap();

        let provider = ScriptProvider::new(
            ProviderDescriptor {
                id: "noisy".into(),
                display_name: "Noisy".into(),
                tier: ProviderTier::RawSearch,
                env_var: String::new(),
                source: ProviderSource::Script,
                requires_api_key: false,
                capabilities: Capabilities::execute_only(),
            },
            IpcCommand {
                command: "sh".into(),
                args: vec![path.to_string_lossy().into_owned()],
                env: BTreeMap::new(),
                cwd: None,
            },
            None,
            None,
        );

        let response = provider.execute("q", &ExecuteOptions::default()).await;
        assert!(response.is_error());
        assert!(response.error.unwrap().contains("invalid JSON"));
    }
}
