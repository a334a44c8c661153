//! Anthropic adapter — Messages API with the server-side web search tool.
//!
//! The call blocks until the model finishes researching, so the bootstrap
//! wraps this adapter in
//! [`SyntheticAsyncProvider`](crate::SyntheticAsyncProvider) to give it
//! the async lifecycle.

use std::time::Instant;

use async_trait::async_trait;
use librarium_core::{
    Capabilities, Citation, ProviderDescriptor, ProviderResponse, ProviderSource, ProviderTier,
    TokenUsage,
};
use librarium_http::{HttpClient, HttpRequest};
use serde_json::{Value, json};

use crate::base::{apply_options, key_presence_test, missing_key_error, send};
use crate::provider::{ExecuteOptions, Provider, ProviderError, TestOutcome};

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const DEFAULT_MODEL: &str = "claude-sonnet-4-20250514";
const API_VERSION: &str = "2023-06-01";
const MAX_TOKENS: u32 = 4096;
const MAX_SEARCHES: u32 = 5;

/// Anthropic Messages API with `web_search`.
pub struct AnthropicResearch {
    http: HttpClient,
    descriptor: ProviderDescriptor,
    api_key: Option<String>,
    base_url: String,
}

impl AnthropicResearch {
    /// Stable provider id.
    pub const ID: &'static str = "anthropic-research";

    /// Create the adapter with a resolved API key (None when missing).
    #[must_use]
    pub fn new(http: HttpClient, api_key: Option<String>) -> Self {
        Self {
            http,
            descriptor: ProviderDescriptor {
                id: Self::ID.into(),
                display_name: "Anthropic Research".into(),
                tier: ProviderTier::DeepResearch,
                env_var: "ANTHROPIC_API_KEY".into(),
                source: ProviderSource::Builtin,
                requires_api_key: true,
                capabilities: Capabilities::execute_only().with_test(),
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

    fn map_response(&self, model: &str, body: &Value, duration_ms: u64) -> ProviderResponse {
        let blocks = body.get("content").and_then(Value::as_array);

        let mut content = String::new();
        let mut citations = Vec::new();
        if let Some(blocks) = blocks {
            for block in blocks {
                if block.get("type").and_then(Value::as_str) != Some("text") {
                    continue;
                }
                if let Some(text) = block.get("text").and_then(Value::as_str) {
                    content.push_str(text);
                }
                let Some(cites) = block.get("citations").and_then(Value::as_array) else {
                    continue;
                };
                for cite in cites {
                    if cite.get("type").and_then(Value::as_str)
                        != Some("web_search_result_location")
                    {
                        continue;
                    }
                    let url = cite.get("url").and_then(Value::as_str).unwrap_or("");
                    if url.is_empty() {
                        continue;
                    }
                    citations.push(Citation {
                        url: url.to_string(),
                        title: cite
                            .get("title")
                            .and_then(Value::as_str)
                            .map(String::from)
                            .filter(|t| !t.is_empty()),
                        snippet: cite
                            .get("cited_text")
                            .and_then(Value::as_str)
                            .map(String::from)
                            .filter(|s| !s.is_empty()),
                        provider: Self::ID.into(),
                    });
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
            .unwrap_or(model)
            .to_string();

        ProviderResponse {
            provider: Self::ID.into(),
            tier: ProviderTier::DeepResearch,
            content,
            citations,
            duration_ms,
            model: Some(model),
            token_usage,
            error: None,
        }
    }
}

#[async_trait]
impl Provider for AnthropicResearch {
    fn descriptor(&self) -> &ProviderDescriptor {
        &self.descriptor
    }

    async fn execute(&self, query: &str, options: &ExecuteOptions) -> ProviderResponse {
        let start = Instant::now();
        let Some(key) = self.api_key.as_deref().filter(|k| !k.is_empty()) else {
            return ProviderResponse::failure(
                Self::ID,
                ProviderTier::DeepResearch,
                missing_key_error(&self.descriptor),
                0,
            );
        };

        let model = options.model.as_deref().unwrap_or(DEFAULT_MODEL);
        let body = json!({
            "model": model,
            "max_tokens": MAX_TOKENS,
            "messages": [{"role": "user", "content": query}],
            "tools": [{
                "type": "web_search_20250305",
                "name": "web_search",
                "max_uses": MAX_SEARCHES,
            }],
        });
        let request = HttpRequest::post(format!("{}/v1/messages", self.base_url), body)
            .header("x-api-key", key)
            .header("anthropic-version", API_VERSION);
        let request = apply_options(request, options);

        match send(&self.http, &self.descriptor, request).await {
            Ok(response) => {
                self.map_response(model, &response.data, start.elapsed().as_millis() as u64)
            }
            Err(error) => ProviderResponse::failure(
                Self::ID,
                ProviderTier::DeepResearch,
                error,
                start.elapsed().as_millis() as u64,
            ),
        }
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
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn adapter(server: &MockServer) -> AnthropicResearch {
        AnthropicResearch::new(
            HttpClient::new().with_retry_delay_ms(1),
            Some("sk-ant-key".into()),
        )
        .with_base_url(server.uri())
    }

    fn messages_body() -> serde_json::Value {
        serde_json::json!({
            "model": "claude-sonnet-4-20250514",
            "content": [
                {"type": "server_tool_use", "name": "web_search", "input": {"query": "q"}},
                {
                    "type": "text",
                    "text": "Research summary.",
                    "citations": [
                        {
                            "type": "web_search_result_location",
                            "url": "https://ref.dev/a",
                            "title": "Reference A",
                            "cited_text": "quoted passage"
                        },
                        {"type": "char_location", "url": "https://ignored.dev"}
                    ]
                }
            ],
            "usage": {"input_tokens": 20, "output_tokens": 350}
        })
    }

    #[tokio::test]
    async fn maps_text_blocks_and_search_citations() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .and(header("x-api-key", "sk-ant-key"))
            .and(header("anthropic-version", API_VERSION))
            .respond_with(ResponseTemplate::new(200).set_body_json(messages_body()))
            .mount(&server)
            .await;

        let response = adapter(&server)
            .execute("q", &ExecuteOptions::default())
            .await;

        assert!(!response.is_error());
        assert_eq!(response.content, "Research summary.");
        // The char_location citation is not a web search result
        assert_eq!(response.citations.len(), 1);
        assert_eq!(response.citations[0].url, "https://ref.dev/a");
        assert_eq!(
            response.citations[0].snippet.as_deref(),
            Some("quoted passage")
        );
        assert_eq!(response.token_usage.unwrap().output, Some(350));
    }

    #[tokio::test]
    async fn unauthorized_names_env_var() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(401)
                    .set_body_json(serde_json::json!({"error": {"message": "invalid x-api-key"}})),
            )
            .mount(&server)
            .await;

        let response = adapter(&server)
            .execute("q", &ExecuteOptions::default())
            .await;
        assert!(response.is_error());
        assert!(response.error.unwrap().contains("ANTHROPIC_API_KEY"));
    }

    #[tokio::test]
    async fn missing_key_short_circuits() {
        let provider = AnthropicResearch::new(HttpClient::new(), None);
        let response = provider.execute("q", &ExecuteOptions::default()).await;
        assert!(response.is_error());
        assert!(response.error.unwrap().contains("ANTHROPIC_API_KEY"));
    }
}
