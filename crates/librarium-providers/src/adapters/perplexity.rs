//! Perplexity adapters — grounded chat completions.
//!
//! Two providers share the same wire shape:
//!
//! - [`PerplexitySonarPro`] (`sonar-pro`): ai-grounded, seconds-scale
//! - [`PerplexityDeepResearch`] (`sonar-deep-research`): deep-research;
//!   the API blocks until the research finishes, so the bootstrap wraps it
//!   in [`SyntheticAsyncProvider`](crate::SyntheticAsyncProvider) for the
//!   async code path

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

const DEFAULT_BASE_URL: &str = "https://api.perplexity.ai";
const SONAR_PRO_MODEL: &str = "sonar-pro";
const DEEP_RESEARCH_MODEL: &str = "sonar-deep-research";

/// Build the chat-completions request both providers send.
fn chat_request(base_url: &str, key: &str, model: &str, query: &str) -> HttpRequest {
    let body = json!({
        "model": model,
        "messages": [{"role": "user", "content": query}],
    });
    HttpRequest::post(format!("{base_url}/chat/completions"), body)
        .header("Authorization", format!("Bearer {key}"))
}

/// Map a chat-completions body onto the uniform response shape.
///
/// Citations come from `search_results` (title + url + snippet) with a
/// fallback to the bare-url `citations` array older responses carry.
fn map_chat_response(
    provider_id: &str,
    tier: ProviderTier,
    requested_model: &str,
    body: &Value,
    duration_ms: u64,
) -> ProviderResponse {
    let content = body
        .get("choices")
        .and_then(Value::as_array)
        .and_then(|choices| choices.first())
        .and_then(|choice| choice.get("message"))
        .and_then(|message| message.get("content"))
        .and_then(Value::as_str)
        .unwrap_or("")
        .to_string();

    let mut citations = Vec::new();
    if let Some(results) = body.get("search_results").and_then(Value::as_array) {
        for result in results {
            let url = result.get("url").and_then(Value::as_str).unwrap_or("");
            if url.is_empty() {
                continue;
            }
            citations.push(Citation {
                url: url.to_string(),
                title: result
                    .get("title")
                    .and_then(Value::as_str)
                    .map(String::from)
                    .filter(|t| !t.is_empty()),
                snippet: result
                    .get("snippet")
                    .and_then(Value::as_str)
                    .map(String::from)
                    .filter(|s| !s.is_empty()),
                provider: provider_id.to_string(),
            });
        }
    } else if let Some(urls) = body.get("citations").and_then(Value::as_array) {
        for url in urls.iter().filter_map(Value::as_str) {
            if url.is_empty() {
                continue;
            }
            citations.push(Citation {
                url: url.to_string(),
                title: None,
                snippet: None,
                provider: provider_id.to_string(),
            });
        }
    }

    let token_usage = body.get("usage").map(|usage| TokenUsage {
        input: usage.get("prompt_tokens").and_then(Value::as_u64),
        output: usage.get("completion_tokens").and_then(Value::as_u64),
    });

    let model = body
        .get("model")
        .and_then(Value::as_str)
        .unwrap_or(requested_model)
        .to_string();

    ProviderResponse {
        provider: provider_id.to_string(),
        tier,
        content,
        citations,
        duration_ms,
        model: Some(model),
        token_usage,
        error: None,
    }
}

/// Shared execute implementation for both Perplexity providers.
async fn execute_chat(
    http: &HttpClient,
    descriptor: &ProviderDescriptor,
    api_key: Option<&str>,
    base_url: &str,
    default_model: &str,
    query: &str,
    options: &ExecuteOptions,
) -> ProviderResponse {
    let start = Instant::now();
    let Some(key) = api_key.filter(|k| !k.is_empty()) else {
        return ProviderResponse::failure(
            &descriptor.id,
            descriptor.tier,
            missing_key_error(descriptor),
            0,
        );
    };

    let model = options.model.as_deref().unwrap_or(default_model);
    let request = apply_options(chat_request(base_url, key, model, query), options);

    match send(http, descriptor, request).await {
        Ok(response) => map_chat_response(
            &descriptor.id,
            descriptor.tier,
            model,
            &response.data,
            start.elapsed().as_millis() as u64,
        ),
        Err(error) => ProviderResponse::failure(
            &descriptor.id,
            descriptor.tier,
            error,
            start.elapsed().as_millis() as u64,
        ),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Sonar Pro (ai-grounded)
// ─────────────────────────────────────────────────────────────────────────────

/// Perplexity `sonar-pro`: grounded answers with search results.
pub struct PerplexitySonarPro {
    http: HttpClient,
    descriptor: ProviderDescriptor,
    api_key: Option<String>,
    base_url: String,
}

impl PerplexitySonarPro {
    /// Stable provider id. The legacy id `perplexity-sonar` migrates here.
    pub const ID: &'static str = "perplexity-sonar-pro";

    /// Create the adapter with a resolved API key (None when missing).
    #[must_use]
    pub fn new(http: HttpClient, api_key: Option<String>) -> Self {
        Self {
            http,
            descriptor: ProviderDescriptor {
                id: Self::ID.into(),
                display_name: "Perplexity Sonar Pro".into(),
                tier: ProviderTier::AiGrounded,
                env_var: "PERPLEXITY_API_KEY".into(),
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
}

#[async_trait]
impl Provider for PerplexitySonarPro {
    fn descriptor(&self) -> &ProviderDescriptor {
        &self.descriptor
    }

    async fn execute(&self, query: &str, options: &ExecuteOptions) -> ProviderResponse {
        execute_chat(
            &self.http,
            &self.descriptor,
            self.api_key.as_deref(),
            &self.base_url,
            SONAR_PRO_MODEL,
            query,
            options,
        )
        .await
    }

    async fn test(&self) -> Result<TestOutcome, ProviderError> {
        Ok(key_presence_test(&self.descriptor, self.api_key.as_deref()))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Deep Research (blocking; wrapped for synthetic async)
// ─────────────────────────────────────────────────────────────────────────────

/// Perplexity `sonar-deep-research`: a blocking deep-research call.
pub struct PerplexityDeepResearch {
    http: HttpClient,
    descriptor: ProviderDescriptor,
    api_key: Option<String>,
    base_url: String,
}

impl PerplexityDeepResearch {
    /// Stable provider id.
    pub const ID: &'static str = "perplexity-deep-research";

    /// Create the adapter with a resolved API key (None when missing).
    #[must_use]
    pub fn new(http: HttpClient, api_key: Option<String>) -> Self {
        Self {
            http,
            descriptor: ProviderDescriptor {
                id: Self::ID.into(),
                display_name: "Perplexity Deep Research".into(),
                tier: ProviderTier::DeepResearch,
                env_var: "PERPLEXITY_API_KEY".into(),
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
}

#[async_trait]
impl Provider for PerplexityDeepResearch {
    fn descriptor(&self) -> &ProviderDescriptor {
        &self.descriptor
    }

    async fn execute(&self, query: &str, options: &ExecuteOptions) -> ProviderResponse {
        execute_chat(
            &self.http,
            &self.descriptor,
            self.api_key.as_deref(),
            &self.base_url,
            DEEP_RESEARCH_MODEL,
            query,
            options,
        )
        .await
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
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn sonar(server: &MockServer) -> PerplexitySonarPro {
        PerplexitySonarPro::new(
            HttpClient::new().with_retry_delay_ms(1),
            Some("pplx-key".into()),
        )
        .with_base_url(server.uri())
    }

    fn chat_body() -> serde_json::Value {
        serde_json::json!({
            "model": "sonar-pro",
            "choices": [
                {"message": {"role": "assistant", "content": "Grounded answer."}}
            ],
            "search_results": [
                {"title": "Source A", "url": "https://a.dev/1", "snippet": "context"},
                {"title": "", "url": "https://b.dev/2"}
            ],
            "usage": {"prompt_tokens": 12, "completion_tokens": 80}
        })
    }

    #[tokio::test]
    async fn maps_content_citations_and_usage() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("Authorization", "Bearer pplx-key"))
            .and(body_partial_json(serde_json::json!({"model": "sonar-pro"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(chat_body()))
            .mount(&server)
            .await;

        let response = sonar(&server).execute("q", &ExecuteOptions::default()).await;

        assert!(!response.is_error());
        assert_eq!(response.content, "Grounded answer.");
        assert_eq!(response.citations.len(), 2);
        assert_eq!(response.citations[0].title.as_deref(), Some("Source A"));
        assert_eq!(response.citations[1].title, None);
        assert_eq!(response.model.as_deref(), Some("sonar-pro"));
        let usage = response.token_usage.unwrap();
        assert_eq!(usage.input, Some(12));
        assert_eq!(usage.output, Some(80));
    }

    #[tokio::test]
    async fn falls_back_to_bare_citation_urls() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{"message": {"content": "text"}}],
                "citations": ["https://old.dev/a", "https://old.dev/b"]
            })))
            .mount(&server)
            .await;

        let response = sonar(&server).execute("q", &ExecuteOptions::default()).await;
        assert_eq!(response.citations.len(), 2);
        assert_eq!(response.citations[0].url, "https://old.dev/a");
        assert_eq!(response.citations[0].title, None);
    }

    #[tokio::test]
    async fn model_override_is_sent() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(serde_json::json!({"model": "sonar-reasoning"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{"message": {"content": "x"}}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let options = ExecuteOptions {
            model: Some("sonar-reasoning".into()),
            ..ExecuteOptions::default()
        };
        let response = sonar(&server).execute("q", &options).await;
        assert!(!response.is_error());
    }

    #[tokio::test]
    async fn deep_research_uses_its_model() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(
                serde_json::json!({"model": "sonar-deep-research"}),
            ))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{"message": {"content": "deep findings"}}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let provider = PerplexityDeepResearch::new(
            HttpClient::new().with_retry_delay_ms(1),
            Some("pplx-key".into()),
        )
        .with_base_url(server.uri());

        let response = provider.execute("q", &ExecuteOptions::default()).await;
        assert_eq!(response.content, "deep findings");
        assert_eq!(response.tier, ProviderTier::DeepResearch);
    }

    #[tokio::test]
    async fn unauthorized_names_env_var() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_string("invalid key"))
            .mount(&server)
            .await;

        let response = sonar(&server).execute("q", &ExecuteOptions::default()).await;
        assert!(response.is_error());
        assert!(response.error.unwrap().contains("PERPLEXITY_API_KEY"));
    }

    #[tokio::test]
    async fn missing_key_short_circuits() {
        let provider = PerplexitySonarPro::new(HttpClient::new(), None);
        let response = provider.execute("q", &ExecuteOptions::default()).await;
        assert!(response.is_error());
        assert!(response.error.unwrap().contains("PERPLEXITY_API_KEY"));
    }
}
