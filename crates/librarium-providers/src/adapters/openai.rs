//! OpenAI deep research adapter — background Responses API.
//!
//! The only built-in provider with a native async lifecycle: `submit`
//! creates a background response, `poll` reads its status, and `retrieve`
//! fetches the finished artifact. `execute` runs the same request in
//! foreground mode for sync dispatches.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use librarium_core::{
    AsyncTaskHandle, Capabilities, Citation, ProviderDescriptor, ProviderResponse, ProviderSource,
    ProviderTier, TaskStatus, TokenUsage,
};
use librarium_http::{HttpClient, HttpRequest};
use serde_json::{Value, json};

use crate::base::{apply_options, key_presence_test, missing_key_error, send};
use crate::provider::{ExecuteOptions, PollUpdate, Provider, ProviderError, TestOutcome};

const DEFAULT_BASE_URL: &str = "https://api.openai.com";
const DEFAULT_MODEL: &str = "o4-mini-deep-research";
const POLL_TIMEOUT: Duration = Duration::from_secs(30);
const RETRIEVE_TIMEOUT: Duration = Duration::from_secs(120);

/// OpenAI `/v1/responses` with `background: true`.
pub struct OpenAiDeepResearch {
    http: HttpClient,
    descriptor: ProviderDescriptor,
    api_key: Option<String>,
    base_url: String,
}

impl OpenAiDeepResearch {
    /// Stable provider id.
    pub const ID: &'static str = "openai-deep-research";

    /// Create the adapter with a resolved API key (None when missing).
    #[must_use]
    pub fn new(http: HttpClient, api_key: Option<String>) -> Self {
        Self {
            http,
            descriptor: ProviderDescriptor {
                id: Self::ID.into(),
                display_name: "OpenAI Deep Research".into(),
                tier: ProviderTier::DeepResearch,
                env_var: "OPENAI_API_KEY".into(),
                source: ProviderSource::Builtin,
                requires_api_key: true,
                capabilities: Capabilities::full_async().with_test(),
            },
            api_key,
            base_url: DEFAULT_BASE_URL.into(),
        }
    }

    /// Point the adapter at a different base URL (tests).
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn key(&self) -> Result<&str, ProviderError> {
        self.api_key
            .as_deref()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| ProviderError::Api {
                status: None,
                message: missing_key_error(&self.descriptor),
            })
    }

    fn create_request(&self, key: &str, model: &str, query: &str, background: bool) -> HttpRequest {
        let body = json!({
            "model": model,
            "input": query,
            "background": background,
            "tools": [{"type": "web_search_preview"}],
        });
        HttpRequest::post(format!("{}/v1/responses", self.base_url), body)
            .header("Authorization", format!("Bearer {key}"))
    }

    fn get_request(&self, key: &str, task_id: &str) -> HttpRequest {
        HttpRequest::get(format!("{}/v1/responses/{task_id}", self.base_url))
            .header("Authorization", format!("Bearer {key}"))
    }

    fn map_status(raw: &str) -> TaskStatus {
        match raw {
            "queued" => TaskStatus::Pending,
            "in_progress" => TaskStatus::Running,
            "completed" => TaskStatus::Completed,
            // failed, cancelled, incomplete, expired
            _ => TaskStatus::Failed,
        }
    }

    fn map_response(&self, body: &Value, duration_ms: u64) -> ProviderResponse {
        let mut content = String::new();
        let mut citations = Vec::new();

        if let Some(output) = body.get("output").and_then(Value::as_array) {
            for item in output {
                if item.get("type").and_then(Value::as_str) != Some("message") {
                    continue;
                }
                let Some(parts) = item.get("content").and_then(Value::as_array) else {
                    continue;
                };
                for part in parts {
                    if part.get("type").and_then(Value::as_str) != Some("output_text") {
                        continue;
                    }
                    if let Some(text) = part.get("text").and_then(Value::as_str) {
                        content.push_str(text);
                    }
                    let Some(annotations) = part.get("annotations").and_then(Value::as_array)
                    else {
                        continue;
                    };
                    for annotation in annotations {
                        if annotation.get("type").and_then(Value::as_str) != Some("url_citation") {
                            continue;
                        }
                        let url = annotation.get("url").and_then(Value::as_str).unwrap_or("");
                        if url.is_empty() {
                            continue;
                        }
                        citations.push(Citation {
                            url: url.to_string(),
                            title: annotation
                                .get("title")
                                .and_then(Value::as_str)
                                .map(String::from)
                                .filter(|t| !t.is_empty()),
                            snippet: None,
                            provider: Self::ID.into(),
                        });
                    }
                }
            }
        }

        let token_usage = body.get("usage").map(|usage| TokenUsage {
            input: usage.get("input_tokens").and_then(Value::as_u64),
            output: usage.get("output_tokens").and_then(Value::as_u64),
        });

        let model = body
            .get("model")
            .and_then(Value::as_str)
            .unwrap_or(DEFAULT_MODEL)
            .to_string();

        let error = match body.get("status").and_then(Value::as_str) {
            Some("completed") | None => None,
            Some(other) => Some(format!(
                "{} task ended with status \"{other}\": {}",
                self.descriptor.display_name,
                body.get("error")
                    .and_then(|e| e.get("message"))
                    .and_then(Value::as_str)
                    .unwrap_or("no detail")
            )),
        };

        ProviderResponse {
            provider: Self::ID.into(),
            tier: ProviderTier::DeepResearch,
            content,
            citations,
            duration_ms,
            model: Some(model),
            token_usage,
            error,
        }
    }
}

#[async_trait]
impl Provider for OpenAiDeepResearch {
    fn descriptor(&self) -> &ProviderDescriptor {
        &self.descriptor
    }

    async fn execute(&self, query: &str, options: &ExecuteOptions) -> ProviderResponse {
        let start = Instant::now();
        let key = match self.key() {
            Ok(key) => key,
            Err(error) => {
                return ProviderResponse::failure(
                    Self::ID,
                    ProviderTier::DeepResearch,
                    error.to_string(),
                    0,
                );
            }
        };

        let model = options.model.as_deref().unwrap_or(DEFAULT_MODEL);
        let request = apply_options(self.create_request(key, model, query, false), options);

        match send(&self.http, &self.descriptor, request).await {
            Ok(response) => {
                self.map_response(&response.data, start.elapsed().as_millis() as u64)
            }
            Err(error) => ProviderResponse::failure(
                Self::ID,
                ProviderTier::DeepResearch,
                error,
                start.elapsed().as_millis() as u64,
            ),
        }
    }

    async fn submit(
        &self,
        query: &str,
        options: &ExecuteOptions,
    ) -> Result<AsyncTaskHandle, ProviderError> {
        let key = self.key()?;
        let model = options.model.as_deref().unwrap_or(DEFAULT_MODEL);
        let request = apply_options(self.create_request(key, model, query, true), options);

        let response = send(&self.http, &self.descriptor, request)
            .await
            .map_err(|message| ProviderError::Api {
                status: None,
                message,
            })?;

        let task_id = response
            .data
            .get("id")
            .and_then(Value::as_str)
            .ok_or_else(|| ProviderError::InvalidResponse {
                message: "background response carried no id".into(),
            })?
            .to_string();
        let status = response
            .data
            .get("status")
            .and_then(Value::as_str)
            .map_or(TaskStatus::Pending, Self::map_status);

        Ok(AsyncTaskHandle {
            provider: Self::ID.into(),
            task_id,
            query: query.to_string(),
            submitted_at: chrono::Utc::now().timestamp_millis(),
            status,
            last_polled_at: None,
            completed_at: None,
            output_dir: None,
        })
    }

    async fn poll(&self, handle: &AsyncTaskHandle) -> Result<PollUpdate, ProviderError> {
        let key = self.key()?;
        let request = self.get_request(key, &handle.task_id).timeout(POLL_TIMEOUT);

        let response = send(&self.http, &self.descriptor, request)
            .await
            .map_err(|message| ProviderError::Api {
                status: None,
                message,
            })?;

        let raw = response
            .data
            .get("status")
            .and_then(Value::as_str)
            .ok_or_else(|| ProviderError::InvalidResponse {
                message: "response carried no status".into(),
            })?;

        Ok(PollUpdate {
            status: Self::map_status(raw),
            progress: None,
            message: Some(raw.to_string()),
        })
    }

    async fn retrieve(
        &self,
        handle: &AsyncTaskHandle,
    ) -> Result<ProviderResponse, ProviderError> {
        let start = Instant::now();
        let key = self.key()?;
        let request = self
            .get_request(key, &handle.task_id)
            .timeout(RETRIEVE_TIMEOUT);

        let response = send(&self.http, &self.descriptor, request)
            .await
            .map_err(|message| ProviderError::Api {
                status: None,
                message,
            })?;

        Ok(self.map_response(&response.data, start.elapsed().as_millis() as u64))
    }

    async fn test(&self) -> Result<TestOutcome, ProviderError> {
        Ok(key_presence_test(&self.descriptor, self.api_key.as_deref()))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn adapter(server: &MockServer) -> OpenAiDeepResearch {
        OpenAiDeepResearch::new(
            HttpClient::new().with_retry_delay_ms(1),
            Some("sk-key".into()),
        )
        .with_base_url(server.uri())
    }

    fn handle(task_id: &str) -> AsyncTaskHandle {
        AsyncTaskHandle {
            provider: "openai-deep-research".into(),
            task_id: task_id.into(),
            query: "q".into(),
            submitted_at: 0,
            status: TaskStatus::Pending,
            last_polled_at: None,
            completed_at: None,
            output_dir: None,
        }
    }

    fn completed_body() -> serde_json::Value {
        serde_json::json!({
            "id": "resp_123",
            "status": "completed",
            "model": "o4-mini-deep-research",
            "output": [
                {"type": "web_search_call", "status": "completed"},
                {
                    "type": "message",
                    "content": [{
                        "type": "output_text",
                        "text": "Deep findings.",
                        "annotations": [
                            {"type": "url_citation", "url": "https://src.dev/1", "title": "Src 1"},
                            {"type": "url_citation", "url": "https://src.dev/2"}
                        ]
                    }]
                }
            ],
            "usage": {"input_tokens": 40, "output_tokens": 900}
        })
    }

    #[tokio::test]
    async fn submit_returns_pending_handle() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/responses"))
            .and(header("Authorization", "Bearer sk-key"))
            .and(body_partial_json(serde_json::json!({"background": true})))
            .respond_with(ResponseTemplate::new(200).set_body_json(
                serde_json::json!({"id": "resp_123", "status": "queued"}),
            ))
            .mount(&server)
            .await;

        let handle = adapter(&server)
            .submit("q", &ExecuteOptions::default())
            .await
            .unwrap();
        assert_eq!(handle.task_id, "resp_123");
        assert_eq!(handle.status, TaskStatus::Pending);
        assert!(handle.completed_at.is_none());
    }

    #[tokio::test]
    async fn poll_maps_service_statuses() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/responses/resp_123"))
            .respond_with(ResponseTemplate::new(200).set_body_json(
                serde_json::json!({"id": "resp_123", "status": "in_progress"}),
            ))
            .mount(&server)
            .await;

        let update = adapter(&server).poll(&handle("resp_123")).await.unwrap();
        assert_eq!(update.status, TaskStatus::Running);
        assert_eq!(update.message.as_deref(), Some("in_progress"));
    }

    #[tokio::test]
    async fn retrieve_maps_output_and_annotations() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/responses/resp_123"))
            .respond_with(ResponseTemplate::new(200).set_body_json(completed_body()))
            .mount(&server)
            .await;

        let response = adapter(&server)
            .retrieve(&handle("resp_123"))
            .await
            .unwrap();
        assert!(!response.is_error());
        assert_eq!(response.content, "Deep findings.");
        assert_eq!(response.citations.len(), 2);
        assert_eq!(response.citations[0].title.as_deref(), Some("Src 1"));
        assert_eq!(response.token_usage.unwrap().output, Some(900));
    }

    #[tokio::test]
    async fn retrieve_of_failed_task_carries_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "resp_123",
                "status": "failed",
                "error": {"message": "model overloaded"}
            })))
            .mount(&server)
            .await;

        let response = adapter(&server)
            .retrieve(&handle("resp_123"))
            .await
            .unwrap();
        assert!(response.is_error());
        let error = response.error.unwrap();
        assert!(error.contains("failed"));
        assert!(error.contains("model overloaded"));
    }

    #[tokio::test]
    async fn execute_runs_foreground() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(serde_json::json!({"background": false})))
            .respond_with(ResponseTemplate::new(200).set_body_json(completed_body()))
            .expect(1)
            .mount(&server)
            .await;

        let response = adapter(&server)
            .execute("q", &ExecuteOptions::default())
            .await;
        assert!(!response.is_error());
        assert_eq!(response.content, "Deep findings.");
    }

    #[tokio::test]
    async fn submit_without_id_is_invalid() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"status": "queued"})),
            )
            .mount(&server)
            .await;

        let error = adapter(&server)
            .submit("q", &ExecuteOptions::default())
            .await
            .unwrap_err();
        assert_matches!(error, ProviderError::InvalidResponse { .. });
    }

    #[tokio::test]
    async fn submit_without_key_fails() {
        let provider = OpenAiDeepResearch::new(HttpClient::new(), None);
        let error = provider
            .submit("q", &ExecuteOptions::default())
            .await
            .unwrap_err();
        assert!(error.to_string().contains("OPENAI_API_KEY"));
    }
}
