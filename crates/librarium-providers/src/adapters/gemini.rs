//! Gemini adapter — generateContent with Google Search grounding.

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

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";
const DEFAULT_MODEL: &str = "gemini-2.5-flash";

/// Gemini `generateContent` with the `google_search` grounding tool.
pub struct GeminiGrounded {
    http: HttpClient,
    descriptor: ProviderDescriptor,
    api_key: Option<String>,
    base_url: String,
}

impl GeminiGrounded {
    /// Stable provider id.
    pub const ID: &'static str = "gemini-grounded";

    /// Create the adapter with a resolved API key (None when missing).
    #[must_use]
    pub fn new(http: HttpClient, api_key: Option<String>) -> Self {
        Self {
            http,
            descriptor: ProviderDescriptor {
                id: Self::ID.into(),
                display_name: "Gemini Grounded Search".into(),
                tier: ProviderTier::AiGrounded,
                env_var: "GEMINI_API_KEY".into(),
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
        let candidate = body
            .get("candidates")
            .and_then(Value::as_array)
            .and_then(|candidates| candidates.first());

        let content = candidate
            .and_then(|c| c.get("content"))
            .and_then(|c| c.get("parts"))
            .and_then(Value::as_array)
            .map(|parts| {
                parts
                    .iter()
                    .filter_map(|part| part.get("text").and_then(Value::as_str))
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default();

        let mut citations = Vec::new();
        if let Some(chunks) = candidate
            .and_then(|c| c.get("groundingMetadata"))
            .and_then(|g| g.get("groundingChunks"))
            .and_then(Value::as_array)
        {
            for chunk in chunks {
                let web = chunk.get("web").unwrap_or(&Value::Null);
                let uri = web.get("uri").and_then(Value::as_str).unwrap_or("");
                if uri.is_empty() {
                    continue;
                }
                citations.push(Citation {
                    url: uri.to_string(),
                    title: web
                        .get("title")
                        .and_then(Value::as_str)
                        .map(String::from)
                        .filter(|t| !t.is_empty()),
                    snippet: None,
                    provider: Self::ID.into(),
                });
            }
        }

        let token_usage = body.get("usageMetadata").map(|usage| TokenUsage {
            input: usage.get("promptTokenCount").and_then(Value::as_u64),
            output: usage.get("candidatesTokenCount").and_then(Value::as_u64),
        });

        ProviderResponse {
            provider: Self::ID.into(),
            tier: ProviderTier::AiGrounded,
            content,
            citations,
            duration_ms,
            model: Some(model.to_string()),
            token_usage,
            error: None,
        }
    }
}

#[async_trait]
impl Provider for GeminiGrounded {
    fn descriptor(&self) -> &ProviderDescriptor {
        &self.descriptor
    }

    async fn execute(&self, query: &str, options: &ExecuteOptions) -> ProviderResponse {
        let start = Instant::now();
        let Some(key) = self.api_key.as_deref().filter(|k| !k.is_empty()) else {
            return ProviderResponse::failure(
                Self::ID,
                ProviderTier::AiGrounded,
                missing_key_error(&self.descriptor),
                0,
            );
        };

        let model = options.model.as_deref().unwrap_or(DEFAULT_MODEL);
        let body = json!({
            "contents": [{"parts": [{"text": query}]}],
            "tools": [{"google_search": {}}],
        });
        let url = format!(
            "{}/v1beta/models/{model}:generateContent",
            self.base_url
        );
        let request = HttpRequest::post(url, body).header("x-goog-api-key", key);
        let request = apply_options(request, options);

        match send(&self.http, &self.descriptor, request).await {
            Ok(response) => {
                self.map_response(model, &response.data, start.elapsed().as_millis() as u64)
            }
            Err(error) => ProviderResponse::failure(
                Self::ID,
                ProviderTier::AiGrounded,
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
