//! The versioned stdin/stdout JSON envelope protocol (version 1).
//!
//! One process per operation: the host writes a single
//! [`PluginRequest`] to the child's stdin, the child answers with a
//! single response envelope on stdout, `{ok: true, data}` or
//! `{ok: false, error}`. Operation-specific `data` shapes are validated
//! here against the same record schemas native providers use.

use librarium_core::{
    AsyncTaskHandle, Citation, ProviderDescriptor, ProviderResponse, ProviderTier, TaskStatus,
    TokenUsage,
};
use librarium_providers::provider::{PollUpdate, TestOutcome};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::PluginError;

/// Wire protocol version spoken by this host.
pub const PROTOCOL_VERSION: u32 = 1;

/// Envelope operations.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    /// Identity + capabilities, called once at load time.
    Describe,
    /// Synchronous query execution.
    Execute,
    /// Long-running task submission.
    Submit,
    /// Task status poll.
    Poll,
    /// Completed-task artifact retrieval.
    Retrieve,
    /// Connectivity / credential self-test.
    Test,
}

impl Operation {
    /// Static name for timeouts and error messages.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Describe => "describe",
            Self::Execute => "execute",
            Self::Submit => "submit",
            Self::Poll => "poll",
            Self::Retrieve => "retrieve",
            Self::Test => "test",
        }
    }
}

/// Options forwarded to the plugin with `execute`/`submit`.
#[derive(Clone, Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestOptions {
    /// Operation time budget in milliseconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
    /// Model override.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

/// The request envelope written to the child's stdin.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginRequest {
    /// Always [`PROTOCOL_VERSION`].
    pub protocol_version: u32,
    /// Requested operation.
    pub operation: Operation,
    /// The configured provider id.
    pub provider_id: String,
    /// Query text (`execute`/`submit`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
    /// Task handle (`poll`/`retrieve`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub handle: Option<AsyncTaskHandle>,
    /// Operation options (`execute`/`submit`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub options: Option<RequestOptions>,
    /// The `providers.<id>` config entry, verbatim.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider_config: Option<Value>,
    /// The `customProviders.<id>.options` value, verbatim.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_options: Option<Value>,
}

impl PluginRequest {
    /// A bare request for `operation` with no payload fields.
    #[must_use]
    pub fn bare(operation: Operation, provider_id: impl Into<String>) -> Self {
        Self {
            protocol_version: PROTOCOL_VERSION,
            operation,
            provider_id: provider_id.into(),
            query: None,
            handle: None,
            options: None,
            provider_config: None,
            source_options: None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawResponse {
    ok: bool,
    #[serde(default)]
    data: Option<Value>,
    #[serde(default)]
    error: Option<String>,
}

/// Parse a response envelope, returning its `data` payload.
///
/// `{ok: false}` must carry a non-empty `error`; anything that is not a
/// valid envelope fails with the raw output excerpted for debugging.
pub fn parse_response(raw: &str) -> Result<Value, PluginError> {
    let response: RawResponse =
        serde_json::from_str(raw.trim()).map_err(|_| PluginError::NonJson {
            excerpt: librarium_core::text::excerpt(raw, 120),
        })?;

    if response.ok {
        Ok(response.data.unwrap_or(Value::Null))
    } else {
        let message = response.error.unwrap_or_default();
        if message.is_empty() {
            return Err(PluginError::Schema {
                message: "ok:false response carried no error".into(),
            });
        }
        Err(PluginError::Plugin { message })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Operation data schemas
// ─────────────────────────────────────────────────────────────────────────────

/// Declared capabilities in a `describe` response.
#[derive(Clone, Copy, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct DescribeCapabilities {
    /// Mandatory for every provider.
    #[serde(default)]
    pub execute: bool,
    /// Long-poll submission support.
    #[serde(default)]
    pub submit: bool,
    /// Poll support.
    #[serde(default)]
    pub poll: bool,
    /// Retrieval support.
    #[serde(default)]
    pub retrieve: bool,
    /// Self-test support.
    #[serde(default)]
    pub test: bool,
}

/// `describe` response payload.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct DescribeData {
    /// Optional echo of the provider id; must match the configured id
    /// when present.
    #[serde(default)]
    pub id: Option<String>,
    /// Human-readable name.
    pub display_name: String,
    /// Latency/depth tier.
    pub tier: ProviderTier,
    /// Environment variable holding the API key.
    #[serde(default)]
    pub env_var: Option<String>,
    /// Whether the provider needs an API key (default true).
    #[serde(default)]
    pub requires_api_key: Option<bool>,
    /// Declared operations.
    pub capabilities: DescribeCapabilities,
}

/// Validate a `describe` payload against the provider contract.
///
/// Checks: id echo matches, `execute` capability declared, and a
/// non-empty `envVar` whenever the provider requires an API key.
pub fn validate_describe(
    configured_id: &str,
    data: &Value,
) -> Result<DescribeData, PluginError> {
    let describe: DescribeData =
        serde_json::from_value(data.clone()).map_err(|e| PluginError::Schema {
            message: format!("describe: {e}"),
        })?;

    if let Some(id) = &describe.id {
        if id != configured_id {
            return Err(PluginError::Schema {
                message: format!(
                    "describe: id \"{id}\" does not match configured id \"{configured_id}\""
                ),
            });
        }
    }
    if !describe.capabilities.execute {
        return Err(PluginError::Schema {
            message: "describe: the execute capability is mandatory".into(),
        });
    }
    if describe.requires_api_key.unwrap_or(true)
        && describe.env_var.as_deref().unwrap_or("").is_empty()
    {
        return Err(PluginError::Schema {
            message: "describe: envVar is required when requiresApiKey is true".into(),
        });
    }

    Ok(describe)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CitationData {
    #[serde(default)]
    url: String,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    snippet: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResultData {
    #[serde(default)]
    content: String,
    #[serde(default)]
    citations: Vec<CitationData>,
    #[serde(default)]
    duration_ms: u64,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    token_usage: Option<TokenUsage>,
    #[serde(default)]
    error: Option<String>,
}

/// Validate an `execute`/`retrieve` payload into a [`ProviderResponse`].
///
/// The provider field of every citation is forced to the configured id
/// so a plugin cannot attribute sources to someone else.
pub fn validate_result(
    descriptor: &ProviderDescriptor,
    data: &Value,
    measured_ms: u64,
) -> Result<ProviderResponse, PluginError> {
    let result: ResultData =
        serde_json::from_value(data.clone()).map_err(|e| PluginError::Schema {
            message: format!("result: {e}"),
        })?;

    let citations = result
        .citations
        .into_iter()
        .filter(|c| !c.url.is_empty())
        .map(|c| Citation {
            url: c.url,
            title: c.title.filter(|t| !t.is_empty()),
            snippet: c.snippet.filter(|s| !s.is_empty()),
            provider: descriptor.id.clone(),
        })
        .collect();

    Ok(ProviderResponse {
        provider: descriptor.id.clone(),
        tier: descriptor.tier,
        content: result.content,
        citations,
        duration_ms: if result.duration_ms > 0 {
            result.duration_ms
        } else {
            measured_ms
        },
        model: result.model,
        token_usage: result.token_usage,
        error: result.error.filter(|e| !e.is_empty()),
    })
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SubmitData {
    task_id: String,
    status: TaskStatus,
    #[serde(default)]
    submitted_at: Option<i64>,
}

/// Validate a `submit` payload into an [`AsyncTaskHandle`].
pub fn validate_submit(
    descriptor: &ProviderDescriptor,
    query: &str,
    data: &Value,
) -> Result<AsyncTaskHandle, PluginError> {
    let submit: SubmitData =
        serde_json::from_value(data.clone()).map_err(|e| PluginError::Schema {
            message: format!("submit: {e}"),
        })?;
    if submit.task_id.is_empty() {
        return Err(PluginError::Schema {
            message: "submit: taskId must be non-empty".into(),
        });
    }

    let now = chrono::Utc::now().timestamp_millis();
    Ok(AsyncTaskHandle {
        provider: descriptor.id.clone(),
        task_id: submit.task_id,
        query: query.to_string(),
        submitted_at: submit.submitted_at.unwrap_or(now),
        status: submit.status,
        last_polled_at: None,
        completed_at: submit.status.is_terminal().then_some(now),
        output_dir: None,
    })
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PollData {
    status: TaskStatus,
    #[serde(default)]
    progress: Option<f64>,
    #[serde(default)]
    message: Option<String>,
}

/// Validate a `poll` payload into a [`PollUpdate`].
pub fn validate_poll(data: &Value) -> Result<PollUpdate, PluginError> {
    let poll: PollData =
        serde_json::from_value(data.clone()).map_err(|e| PluginError::Schema {
            message: format!("poll: {e}"),
        })?;
    Ok(PollUpdate {
        status: poll.status,
        progress: poll.progress,
        message: poll.message,
    })
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TestData {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
}

/// Validate a `test` payload into a [`TestOutcome`].
pub fn validate_test(data: &Value) -> Result<TestOutcome, PluginError> {
    let test: TestData = serde_json::from_value(data.clone()).map_err(|e| PluginError::Schema {
        message: format!("test: {e}"),
    })?;
    Ok(TestOutcome {
        ok: test.ok,
        error: test.error,
    })
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
