//! Brave Search adapter — raw web-index results.

use std::time::Instant;

use async_trait::async_trait;
use librarium_core::{
    Capabilities, Citation, ProviderDescriptor, ProviderResponse, ProviderSource, ProviderTier,
};
use librarium_http::{HttpClient, HttpRequest};
use serde_json::Value;

use crate::base::{apply_options, key_presence_test, missing_key_error, send};
use crate::provider::{ExecuteOptions, Provider, ProviderError, TestOutcome};

const DEFAULT_BASE_URL: &str = "https://api.search.brave.com";
const RESULT_COUNT: u32 = 10;

/// Brave Search web endpoint.
pub struct BraveSearch {
    http: HttpClient,
    descriptor: ProviderDescriptor,
    api_key: Option<String>,
    base_url: String,
}

impl BraveSearch {
    /// Stable provider id.
    pub const ID: &'static str = "brave-search";

    /// Create the adapter with a resolved API key (None when missing).
    #[must_use]
    pub fn new(http: HttpClient, api_key: Option<String>) -> Self {
        Self {
            http,
            descriptor: ProviderDescriptor {
                id: Self::ID.into(),
                display_name: "Brave Search".into(),
                tier: ProviderTier::RawSearch,
                env_var: "BRAVE_API_KEY".into(),
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

    fn search_request(&self, query: &str, count: u32, key: &str) -> HttpRequest {
        let url = format!(
            "{}/res/v1/web/search?q={}&count={count}",
            self.base_url,
            urlencoding::encode(query)
        );
        HttpRequest::get(url)
            .header("Accept", "application/json")
            .header("X-Subscription-Token", key)
    }

    fn map_response(&self, body: &Value, duration_ms: u64) -> ProviderResponse {
        let results = body
            .get("web")
            .and_then(|w| w.get("results"))
            .and_then(Value::as_array);

        let mut citations = Vec::new();
        let mut lines = Vec::new();
        if let Some(results) = results {
            for (i, result) in results.iter().enumerate() {
                let title = result.get("title").and_then(Value::as_str).unwrap_or("");
                let url = result.get("url").and_then(Value::as_str).unwrap_or("");
                let description = result
                    .get("description")
                    .and_then(Value::as_str)
                    .unwrap_or("");
                if url.is_empty() {
                    continue;
                }
                lines.push(format!("{}. [{title}]({url})\n   {description}", i + 1));
                citations.push(Citation {
                    url: url.to_string(),
                    title: Some(title.to_string()).filter(|t| !t.is_empty()),
                    snippet: Some(description.to_string()).filter(|s| !s.is_empty()),
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
impl Provider for BraveSearch {
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

        let request = apply_options(self.search_request(query, RESULT_COUNT, key), options);
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
        let presence = key_presence_test(&self.descriptor, self.api_key.as_deref());
        if !presence.ok {
            return Ok(presence);
        }
        let key = self.api_key.as_deref().unwrap_or_default();
        let request = self.search_request("connectivity check", 1, key);
        match send(&self.http, &self.descriptor, request).await {
            Ok(_) => Ok(TestOutcome::passed()),
            Err(error) => Ok(TestOutcome::failed(error)),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn adapter(server: &MockServer) -> BraveSearch {
        BraveSearch::new(
            HttpClient::new().with_retry_delay_ms(1),
            Some("brave-key".into()),
        )
        .with_base_url(server.uri())
    }

    fn web_body() -> serde_json::Value {
        serde_json::json!({
            "web": {
                "results": [
                    {"title": "Example", "url": "https://example.com", "description": "A test result"},
                    {"title": "Second", "url": "https://second.dev/page", "description": ""}
                ]
            }
        })
    }

    #[tokio::test]
    async fn maps_results_to_citations() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/res/v1/web/search"))
            .and(header("X-Subscription-Token", "brave-key"))
            .and(query_param("q", "rust async runtimes"))
            .respond_with(ResponseTemplate::new(200).set_body_json(web_body()))
            .mount(&server)
            .await;

        let response = adapter(&server)
            .execute("rust async runtimes", &ExecuteOptions::default())
            .await;

        assert!(!response.is_error());
        assert_eq!(response.citations.len(), 2);
        assert_eq!(response.citations[0].url, "https://example.com");
        assert_eq!(response.citations[0].title.as_deref(), Some("Example"));
        assert_eq!(response.citations[1].snippet, None);
        assert!(response.content.contains("[Example](https://example.com)"));
        assert_eq!(response.provider, "brave-search");
    }

    #[tokio::test]
    async fn empty_results_have_placeholder_content() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"web": {"results": []}})),
            )
            .mount(&server)
            .await;

        let response = adapter(&server)
            .execute("q", &ExecuteOptions::default())
            .await;
        assert!(!response.is_error());
        assert_eq!(response.content, "No results found.");
        assert!(response.citations.is_empty());
    }

    #[tokio::test]
    async fn missing_key_short_circuits() {
        let provider = BraveSearch::new(HttpClient::new(), None);
        let response = provider.execute("q", &ExecuteOptions::default()).await;
        assert!(response.is_error());
        assert!(response.error.unwrap().contains("BRAVE_API_KEY"));
    }

    #[tokio::test]
    async fn unauthorized_folds_with_hint() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(401).set_body_string("invalid token"))
            .mount(&server)
            .await;

        let response = adapter(&server)
            .execute("q", &ExecuteOptions::default())
            .await;
        assert!(response.is_error());
        let error = response.error.unwrap();
        assert!(error.contains("HTTP 401"));
        assert!(error.contains("BRAVE_API_KEY"));
    }

    #[tokio::test]
    async fn test_passes_on_reachable_service() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(web_body()))
            .mount(&server)
            .await;

        let outcome = adapter(&server).test().await.unwrap();
        assert!(outcome.ok);
    }

    #[tokio::test]
    async fn test_fails_without_key() {
        let provider = BraveSearch::new(HttpClient::new(), None);
        let outcome = provider.test().await.unwrap();
        assert!(!outcome.ok);
    }

}
