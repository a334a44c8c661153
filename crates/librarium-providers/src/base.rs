//! Shared adapter plumbing: error folding and credential checks.
//!
//! Every built-in adapter routes its HTTP traffic through [`send`], which
//! turns transport failures and error statuses into the message strings
//! that land in `ProviderResponse.error`. The folding rules are uniform:
//!
//! - status ≥ 400 → `"<display> request failed (HTTP <status>): <excerpt>"`,
//!   with 401/403 adding a hint naming the provider's environment variable
//! - connection-level failures → `"network error connecting to <display>"`
//! - timeout and abort keep their distinct wording so callers can tell
//!   them apart from remote rejections

use librarium_core::ProviderDescriptor;
use librarium_core::text::excerpt;
use librarium_http::{HttpClient, HttpError, HttpRequest, HttpResponse};

use crate::provider::{ExecuteOptions, TestOutcome};

/// Longest body excerpt included in a folded error message.
const ERROR_EXCERPT_BYTES: usize = 200;

/// Apply the caller's timeout and cancellation signal to a request.
#[must_use]
pub fn apply_options(mut request: HttpRequest, options: &ExecuteOptions) -> HttpRequest {
    request = request.timeout(options.timeout);
    if let Some(token) = &options.cancellation {
        request = request.cancellation(token.clone());
    }
    request
}

/// Send a request and fold any failure into an error string.
///
/// `Ok` responses below 400 pass through untouched; everything else comes
/// back as `Err(message)` ready to be placed in `ProviderResponse.error`.
pub async fn send(
    http: &HttpClient,
    descriptor: &ProviderDescriptor,
    request: HttpRequest,
) -> Result<HttpResponse, String> {
    match http.request(request).await {
        Ok(response) if response.status >= 400 => Err(fold_status_error(descriptor, &response)),
        Ok(response) => Ok(response),
        Err(error) => Err(fold_transport_error(descriptor, &error)),
    }
}

/// Fold an HTTP error status into a provider error message.
#[must_use]
pub fn fold_status_error(descriptor: &ProviderDescriptor, response: &HttpResponse) -> String {
    let body = excerpt(&response.body_text(), ERROR_EXCERPT_BYTES);
    let mut message = format!(
        "{} request failed (HTTP {}): {}",
        descriptor.display_name, response.status, body
    );
    if matches!(response.status, 401 | 403) && !descriptor.env_var.is_empty() {
        message.push_str(&format!("; set {} to a valid API key", descriptor.env_var));
    }
    message
}

/// Fold a transport-level failure into a provider error message.
#[must_use]
pub fn fold_transport_error(descriptor: &ProviderDescriptor, error: &HttpError) -> String {
    match error {
        HttpError::Aborted => format!("{} request aborted", descriptor.display_name),
        HttpError::Timeout { timeout_ms } => format!(
            "{} timed out after {}s",
            descriptor.display_name,
            timeout_ms / 1000
        ),
        HttpError::Network { .. } => {
            format!("network error connecting to {}", descriptor.display_name)
        }
        HttpError::TooLarge { size, limit } => format!(
            "{} response too large ({size} bytes, limit {limit})",
            descriptor.display_name
        ),
    }
}

/// The error message for a keyless execution attempt.
#[must_use]
pub fn missing_key_error(descriptor: &ProviderDescriptor) -> String {
    format!(
        "no API key for {}; set {}",
        descriptor.display_name, descriptor.env_var
    )
}

/// Credential-presence self-test shared by adapters without a cheap
/// remote check.
#[must_use]
pub fn key_presence_test(descriptor: &ProviderDescriptor, api_key: Option<&str>) -> TestOutcome {
    match api_key {
        Some(key) if !key.is_empty() => TestOutcome::passed(),
        _ => TestOutcome::failed(missing_key_error(descriptor)),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
