//! Exa adapter — neural search with text contents.

use std::time::Instant;

use async_trait::async_trait;
use librarium_core::text::excerpt;
use librarium_core::{
    Capabilities, Citation, ProviderDescriptor, ProviderResponse, ProviderSource, ProviderTier,
};
use librarium_http::{HttpClient, HttpRequest};
use serde_json::{Value, json};

use crate::base::{apply_options, key_presence_test, missing_key_error, send};
use crate::provider::{ExecuteOptions, Provider, ProviderError, TestOutcome};

const DEFAULT_BASE_URL: &str = "https://api.exa.ai";
const NUM_RESULTS: u32 = 10;
const SNIPPET_BYTES: usize = 400;

/// Exa `/search` endpoint with text contents.
pub struct ExaSearch {
    http: HttpClient,
    descriptor: ProviderDescriptor,
    api_key: Option<String>,
    base_url: String,
}

impl ExaSearch {
    /// Stable provider id.
    pub const ID: &'static str = "exa-search";

    /// Create the adapter with a resolved API key (None when missing).
    #[must_use]
    pub fn new(http: HttpClient, api_key: Option<String>) -> Self {
        Self {
            http,
            descriptor: ProviderDescriptor {
                id: Self::ID.into(),
                display_name: "Exa".into(),
                tier: ProviderTier::RawSearch,
                env_var: "EXA_API_KEY".into(),
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
        let results = body.get("results").and_then(Value::as_array);

        let mut citations = Vec::new();
        let mut lines = Vec::new();
        if let Some(results) = results {
            for (i, result) in results.iter().enumerate() {
                let title = result.get("title").and_then(Value::as_str).unwrap_or("");
                let url = result.get("url").and_then(Value::as_str).unwrap_or("");
                let text = result.get("text").and_then(Value::as_str).unwrap_or("");
                if url.is_empty() {
                    continue;
                }
                let snippet = excerpt(text, SNIPPET_BYTES);
                lines.push(format!("{}. [{title}]({url})\n   {snippet}", i + 1));
                citations.push(Citation {
                    url: url.to_string(),
                    title: Some(title.to_string()).filter(|t| !t.is_empty()),
                    snippet: Some(snippet).filter(|s| !s.is_empty()),
                    provider: Self::ID.into(),
                });
            }
        }

        let content = if lines.is_empty() {
            "No results found.".to_string()
        } else {
            lines.join("\n\n")
        };

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
impl Provider for ExaSearch {
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
            "numResults": NUM_RESULTS,
            "contents": {"text": true},
        });
        let request = HttpRequest::post(format!("{}/search", self.base_url), body)
            .header("x-api-key", key);
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
