//! Retrying JSON HTTP client.
//!
//! One public entry point: [`HttpClient::request`]. The retry policy is
//! fixed by the constants in [`librarium_core::retry`]; the delay base and
//! response-size cap are overridable for tests.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use librarium_core::retry::{MAX_RETRIES, INITIAL_RETRY_DELAY_MS, backoff_delay_ms, is_retryable_status};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Response-size cap for the terminal response body (10 MiB).
pub const MAX_RESPONSE_SIZE: usize = 10 * 1024 * 1024;

/// Errors surfaced by [`HttpClient::request`].
///
/// HTTP error *statuses* are not represented here; they are returned as
/// ordinary [`HttpResponse`]s. These variants cover transport-level
/// failures only.
#[derive(Debug, thiserror::Error)]
pub enum HttpError {
    /// The caller's cancellation signal fired.
    #[error("request aborted")]
    Aborted,

    /// An attempt exceeded its timeout and retries were exhausted.
    #[error("request timed out after {timeout_ms}ms")]
    Timeout {
        /// Per-attempt timeout that was exceeded.
        timeout_ms: u64,
    },

    /// Connection-level failure after retries were exhausted.
    #[error("network error: {message}")]
    Network {
        /// Transport error description.
        message: String,
    },

    /// The terminal response body exceeded the size cap.
    #[error("response too large: {size} bytes (limit {limit})")]
    TooLarge {
        /// Observed body size in bytes.
        size: usize,
        /// Enforced limit in bytes.
        limit: usize,
    },
}

/// A single JSON request.
#[derive(Clone, Debug)]
pub struct HttpRequest {
    /// HTTP method.
    pub method: reqwest::Method,
    /// Absolute URL.
    pub url: String,
    /// Extra headers. `Content-Type: application/json` is implied when a
    /// body is supplied.
    pub headers: Vec<(String, String)>,
    /// Optional JSON body.
    pub json_body: Option<serde_json::Value>,
    /// Per-attempt timeout.
    pub timeout: Duration,
    /// Optional external cancellation signal.
    pub cancellation: Option<CancellationToken>,
}

impl HttpRequest {
    /// A GET request with default timeout and no headers.
    #[must_use]
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: reqwest::Method::GET,
            url: url.into(),
            headers: Vec::new(),
            json_body: None,
            timeout: Duration::from_secs(30),
            cancellation: None,
        }
    }

    /// A POST request carrying a JSON body.
    #[must_use]
    pub fn post(url: impl Into<String>, body: serde_json::Value) -> Self {
        Self {
            method: reqwest::Method::POST,
            url: url.into(),
            headers: Vec::new(),
            json_body: Some(body),
            timeout: Duration::from_secs(30),
            cancellation: None,
        }
    }

    /// Add a header.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Set the per-attempt timeout.
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Attach an external cancellation signal.
    #[must_use]
    pub fn cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }
}

/// The terminal response of a request (any status).
#[derive(Clone, Debug)]
pub struct HttpResponse {
    /// HTTP status code.
    pub status: u16,
    /// Canonical reason phrase (empty when unknown).
    pub status_text: String,
    /// Parsed JSON body, or `Value::String` with the raw text when the
    /// body is not valid JSON.
    pub data: serde_json::Value,
    /// Response headers (last value wins for repeated names).
    pub headers: HashMap<String, String>,
    /// Duration of the returned attempt in milliseconds (not summed
    /// across retries).
    pub duration_ms: u64,
}

impl HttpResponse {
    /// Whether the status is in the 2xx range.
    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// The body rendered as text: raw string bodies verbatim, JSON bodies
    /// re-serialized.
    #[must_use]
    pub fn body_text(&self) -> String {
        match &self.data {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }
}

/// Shared JSON HTTP client with retry.
#[derive(Clone, Debug)]
pub struct HttpClient {
    client: reqwest::Client,
    max_retries: u32,
    retry_delay_ms: u64,
    max_response_size: usize,
}

impl Default for HttpClient {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpClient {
    /// Create a client with the standard retry policy and size cap.
    #[must_use]
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
            max_retries: MAX_RETRIES,
            retry_delay_ms: INITIAL_RETRY_DELAY_MS,
            max_response_size: MAX_RESPONSE_SIZE,
        }
    }

    /// Override the base retry delay (tests).
    #[must_use]
    pub fn with_retry_delay_ms(mut self, ms: u64) -> Self {
        self.retry_delay_ms = ms;
        self
    }

    /// Override the response-size cap (tests).
    #[must_use]
    pub fn with_max_response_size(mut self, bytes: usize) -> Self {
        self.max_response_size = bytes;
        self
    }

    /// Perform a request with retry, timeout, size cap, and cancellation.
    ///
    /// Retries up to `MAX_RETRIES` times on network errors, per-attempt
    /// timeouts, 5xx, and 429, sleeping `retry_delay_ms × 2^(n−1)` before
    /// retry `n`. Other statuses are returned verbatim. External
    /// cancellation aborts in-flight attempts and pending backoff sleeps
    /// with [`HttpError::Aborted`].
    pub async fn request(&self, request: HttpRequest) -> Result<HttpResponse, HttpError> {
        let cancel = request
            .cancellation
            .clone()
            .unwrap_or_else(CancellationToken::new);
        let mut retry = 0u32;

        loop {
            if cancel.is_cancelled() {
                return Err(HttpError::Aborted);
            }

            let outcome = self.attempt(&request, &cancel).await;

            let retryable = match &outcome {
                Ok(response) => is_retryable_status(response.status),
                Err(HttpError::Timeout { .. } | HttpError::Network { .. }) => true,
                Err(HttpError::Aborted | HttpError::TooLarge { .. }) => false,
            };

            if !retryable || retry >= self.max_retries {
                return outcome;
            }

            retry += 1;
            let delay = self.delay_for_retry(retry);
            match &outcome {
                Ok(response) => debug!(
                    url = %request.url,
                    status = response.status,
                    retry,
                    delay_ms = delay.as_millis() as u64,
                    "retrying after retryable status"
                ),
                Err(error) => debug!(
                    url = %request.url,
                    error = %error,
                    retry,
                    delay_ms = delay.as_millis() as u64,
                    "retrying after transport error"
                ),
            }

            tokio::select! {
                () = tokio::time::sleep(delay) => {}
                () = cancel.cancelled() => return Err(HttpError::Aborted),
            }
        }
    }

    fn delay_for_retry(&self, retry: u32) -> Duration {
        let scale = backoff_delay_ms(retry) / INITIAL_RETRY_DELAY_MS.max(1);
        Duration::from_millis(self.retry_delay_ms.saturating_mul(scale.max(1)))
    }

    /// One attempt: send, enforce timeout and cancellation, read and cap
    /// the body, parse JSON.
    async fn attempt(
        &self,
        request: &HttpRequest,
        cancel: &CancellationToken,
    ) -> Result<HttpResponse, HttpError> {
        let start = Instant::now();

        let mut builder = self
            .client
            .request(request.method.clone(), &request.url)
            .timeout(request.timeout);
        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }
        if let Some(body) = &request.json_body {
            builder = builder.json(body);
        }

        let timeout_ms = request.timeout.as_millis() as u64;
        let send = async {
            let response = builder
                .send()
                .await
                .map_err(|e| classify_reqwest_error(e, timeout_ms))?;

            let status = response.status();
            let headers: HashMap<String, String> = response
                .headers()
                .iter()
                .map(|(name, value)| {
                    (
                        name.as_str().to_string(),
                        value.to_str().unwrap_or_default().to_string(),
                    )
                })
                .collect();

            if let Some(length) = response.content_length() {
                if length as usize > self.max_response_size {
                    return Err(HttpError::TooLarge {
                        size: length as usize,
                        limit: self.max_response_size,
                    });
                }
            }

            let text = response
                .text()
                .await
                .map_err(|e| classify_reqwest_error(e, timeout_ms))?;
            if text.len() > self.max_response_size {
                return Err(HttpError::TooLarge {
                    size: text.len(),
                    limit: self.max_response_size,
                });
            }

            let data = serde_json::from_str::<serde_json::Value>(&text)
                .unwrap_or(serde_json::Value::String(text));

            Ok(HttpResponse {
                status: status.as_u16(),
                status_text: status.canonical_reason().unwrap_or_default().to_string(),
                data,
                headers,
                duration_ms: start.elapsed().as_millis() as u64,
            })
        };

        tokio::select! {
            outcome = send => outcome,
            () = cancel.cancelled() => Err(HttpError::Aborted),
        }
    }
}

/// Map reqwest transport errors onto [`HttpError`].
fn classify_reqwest_error(error: reqwest::Error, timeout_ms: u64) -> HttpError {
    if error.is_timeout() {
        HttpError::Timeout { timeout_ms }
    } else {
        HttpError::Network {
            message: error.to_string(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
