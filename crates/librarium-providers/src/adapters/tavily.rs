//! Tavily adapter — search with an optional LLM-written answer.

use std::time::Instant;

use async_trait::async_trait;
use librarium_core::{
    Capabilities, Citation, ProviderDescriptor, ProviderResponse, ProviderSource, ProviderTier,
};
use librarium_http::{HttpClient, HttpRequest};
use serde_json::{Value, json};

use crate::base::{apply_options, key_presence_test, missing_key_error, send};
use crate::provider::{ExecuteOptions, Provider, ProviderError, TestOutcome};

const DEFAULT_BASE_URL: &str = "https://api.tavily.com";
const MAX_RESULTS: u32 = 10;

/// Tavily `/search` endpoint.
pub struct TavilySearch {
    http: HttpClient,
    descriptor: ProviderDescriptor,
    api_key: Option<String>,
    base_url: String,
}

impl TavilySearch {
    /// Stable provider id.
    pub const ID: &'static str = "tavily-search";

    /// Create the adapter with a resolved API key (None when missing).
    #[must_use]
    pub fn new(http: HttpClient, api_key: Option<String>) -> Self {
        Self {
            http,
            descriptor: ProviderDescriptor {
                id: Self::ID.into(),
                display_name: "Tavily".into(),
                tier: ProviderTier::RawSearch,
                env_var: "TAVILY_API_KEY".into(),
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

    fn map_response(&self, body: &Value, duration_ms: u64) -> ProviderResponse {
        let answer = body.get("answer").and_then(Value::as_str).unwrap_or("");
        let results = body.get("results").and_then(Value::as_array);

        let mut citations = Vec::new();
        let mut lines = Vec::new();
        if let Some(results) = results {
            for (i, result) in results.iter().enumerate() {
                let title = result.get("title").and_then(Value::as_str).unwrap_or("");
                let url = result.get("url").and_then(Value::as_str).unwrap_or("");
                let snippet = result.get("content").and_then(Value::as_str).unwrap_or("");
                if url.is_empty() {
                    continue;
                }
                lines.push(format!("{}. [{title}]({url})\n   {snippet}", i + 1));
                citations.push(Citation {
                    url: url.to_string(),
                    title: Some(title.to_string()).filter(|t| !t.is_empty()),
                    snippet: Some(snippet.to_string()).filter(|s| !s.is_empty()),
                    provider: Self::ID.into(),
                });
            }
        }

        let mut content = String::new();
        if !answer.is_empty() {
            content.push_str(answer);
        }
        if !lines.is_empty() {
            if !content.is_empty() {
                content.push_str("\n\n");
            }
            content.push_str(&lines.join("\n\n"));
        }
        if content.is_empty() {
            content.push_str("No results found.");
        }

        ProviderResponse {
            provider: Self::ID.into(),
            tier: ProviderTier::RawSearch,
            content,
            citations,
            duration_ms,
            model: None,
            token_usage: None,
            error: None,
        }
    }
}

#[async_trait]
impl Provider for TavilySearch {
    fn descriptor(&self) -> &ProviderDescriptor {
        &self.descriptor
    }

    async fn execute(&self, query: &str, options: &ExecuteOptions) -> ProviderResponse {
        let start = Instant::now();
        let Some(key) = self.api_key.as_deref().filter(|k| !k.is_empty()) else {
            return ProviderResponse::failure(
                Self::ID,
                ProviderTier::RawSearch,
                missing_key_error(&self.descriptor),
                0,
            );
        };

        let body = json!({
            "query": query,
            "include_answer": true,
            "max_results": MAX_RESULTS,
        });
        let request = HttpRequest::post(format!("{}/search", self.base_url), body)
            .header("Authorization", format!("Bearer {key}"));
        let request = apply_options(request, options);

        match send(&self.http, &self.descriptor, request).await {
            Ok(response) => {
                self.map_response(&response.data, start.elapsed().as_millis() as u64)
            }
            Err(error) => ProviderResponse::failure(
                Self::ID,
                ProviderTier::RawSearch,
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
