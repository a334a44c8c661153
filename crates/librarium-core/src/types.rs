//! Shared record definitions for the research runner.
//!
//! These types are the wire and disk vocabulary of the system: provider
//! identity and results, citations and deduplicated sources, async task
//! handles, per-provider reports, and the run manifest. All records
//! serialize as camelCase JSON; optional fields are omitted when absent so
//! the on-disk artifacts stay compact.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

// ─────────────────────────────────────────────────────────────────────────────
// Provider identity
// ─────────────────────────────────────────────────────────────────────────────

/// Categorical label for a provider's latency/depth tradeoff.
///
/// Tiers are informational but drive default dispatch routing: only
/// `deep-research` providers may take the async path.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProviderTier {
    /// Long-running multi-source research (minutes).
    DeepResearch,
    /// Model-grounded answers with citations (seconds).
    AiGrounded,
    /// Plain search-index results (sub-second).
    RawSearch,
}

impl fmt::Display for ProviderTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::DeepResearch => "deep-research",
            Self::AiGrounded => "ai-grounded",
            Self::RawSearch => "raw-search",
        };
        f.write_str(s)
    }
}

/// Where a provider implementation comes from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderSource {
    /// Compiled into this binary.
    Builtin,
    /// Loaded from a Node module declared in `customProviders`.
    Npm,
    /// Driven over stdio JSON by a subprocess declared in `customProviders`.
    Script,
}

/// Optional-operation support declared by a provider.
///
/// `execute` is mandatory for every provider; the rest gate dispatch
/// routing and the async lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Capabilities {
    /// Synchronous query execution. Always true.
    pub execute: bool,
    /// Long-poll task submission (deep-research only).
    pub submit: bool,
    /// Status polling for submitted tasks.
    pub poll: bool,
    /// Deferred artifact retrieval for completed tasks.
    pub retrieve: bool,
    /// Cheap connectivity/credential check.
    pub test: bool,
}

impl Capabilities {
    /// Sync-only provider: `execute` and nothing else.
    #[must_use]
    pub fn execute_only() -> Self {
        Self {
            execute: true,
            submit: false,
            poll: false,
            retrieve: false,
            test: false,
        }
    }

    /// Full async lifecycle: execute + submit + poll + retrieve.
    #[must_use]
    pub fn full_async() -> Self {
        Self {
            execute: true,
            submit: true,
            poll: true,
            retrieve: true,
            test: false,
        }
    }

    /// Enable the `test` capability.
    #[must_use]
    pub fn with_test(mut self) -> Self {
        self.test = true;
        self
    }
}

/// Identity and contract of one provider.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderDescriptor {
    /// Stable, file-safe identifier (e.g. `"perplexity-sonar-pro"`).
    pub id: String,
    /// Human-readable name used in error messages and summaries.
    pub display_name: String,
    /// Latency/depth tier.
    pub tier: ProviderTier,
    /// Name of the environment variable holding the API key.
    ///
    /// May be empty only when `requires_api_key` is false.
    pub env_var: String,
    /// Implementation origin.
    pub source: ProviderSource,
    /// Whether the provider is unusable without an API key.
    pub requires_api_key: bool,
    /// Declared optional-operation support.
    pub capabilities: Capabilities,
}

// ─────────────────────────────────────────────────────────────────────────────
// Results and citations
// ─────────────────────────────────────────────────────────────────────────────

/// One cited source as returned by a provider.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Citation {
    /// Source URL. Citations with an empty url are dropped by the
    /// deduplicator.
    pub url: String,
    /// Source title, when the service supplies one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Short excerpt or description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snippet: Option<String>,
    /// Id of the provider that produced this citation.
    pub provider: String,
}

/// Token accounting reported by model-backed providers.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenUsage {
    /// Input (prompt) tokens.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input: Option<u64>,
    /// Output (completion) tokens.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<u64>,
}

/// The uniform artifact every provider execution produces.
///
/// `error` present ↔ the execution failed; `content` and `citations` are
/// never both meaningful in an error result.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderResponse {
    /// Producing provider id.
    pub provider: String,
    /// Producing provider tier.
    pub tier: ProviderTier,
    /// Rendered markdown-like text.
    pub content: String,
    /// Cited sources in the order the service returned them.
    pub citations: Vec<Citation>,
    /// Wall-clock duration of the execution in milliseconds.
    pub duration_ms: u64,
    /// Model that produced the content, when applicable.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Token accounting, when the service reports it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_usage: Option<TokenUsage>,
    /// Failure description. Present exactly when the execution failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ProviderResponse {
    /// Build a failed response carrying only an error message.
    #[must_use]
    pub fn failure(
        provider: impl Into<String>,
        tier: ProviderTier,
        error: impl Into<String>,
        duration_ms: u64,
    ) -> Self {
        Self {
            provider: provider.into(),
            tier,
            content: String::new(),
            citations: Vec::new(),
            duration_ms,
            model: None,
            token_usage: None,
            error: Some(error.into()),
        }
    }

    /// Whether this response represents a failed execution.
    #[must_use]
    pub fn is_error(&self) -> bool {
        self.error.as_deref().is_some_and(|e| !e.is_empty())
    }
}

/// One deduplicated source bucket across providers.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DedupedSource {
    /// Representative original url (first seen).
    pub url: String,
    /// Canonical key this bucket was grouped by.
    pub normalized_url: String,
    /// First non-empty title encountered.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Distinct citing provider ids in first-seen order.
    pub providers: Vec<String>,
    /// Number of citations in the bucket (≥ 1).
    pub citation_count: usize,
}

// ─────────────────────────────────────────────────────────────────────────────
// Async task handles
// ─────────────────────────────────────────────────────────────────────────────

/// Lifecycle status of a submitted long-running task.
///
/// Transitions are monotonic except that `Pending` and `Running` are
/// interchangeable intermediate states: a handle never leaves
/// `Completed`/`Failed`/`Cancelled`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    /// Accepted but not yet started by the service.
    Pending,
    /// In progress.
    Running,
    /// Finished; artifact ready for retrieval.
    Completed,
    /// Finished unsuccessfully.
    Failed,
    /// Aborted before completion.
    Cancelled,
}

impl TaskStatus {
    /// Whether this status is terminal.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Whether a transition to `next` respects monotonicity.
    #[must_use]
    pub fn can_transition_to(self, next: Self) -> bool {
        if self.is_terminal() {
            return self == next;
        }
        true
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// Durable reference to a submitted long-running provider task.
///
/// Persisted in the run directory's `async-tasks.json`; the handle file is
/// the sole durable state of the async lifecycle.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AsyncTaskHandle {
    /// Owning provider id.
    pub provider: String,
    /// Provider-assigned task id, opaque to the engine. Unique within its
    /// provider.
    pub task_id: String,
    /// The query that was submitted.
    pub query: String,
    /// Submission time, epoch milliseconds.
    pub submitted_at: i64,
    /// Current lifecycle status.
    pub status: TaskStatus,
    /// Last poll time, epoch milliseconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_polled_at: Option<i64>,
    /// Completion time, epoch milliseconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<i64>,
    /// Run directory the submission was attached to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_dir: Option<PathBuf>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Reports and manifest
// ─────────────────────────────────────────────────────────────────────────────

/// Outcome category of one provider within a run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReportStatus {
    /// Execution produced a usable result.
    Success,
    /// Execution failed (remote error, thrown exception, or error result).
    Error,
    /// Execution exceeded its time budget.
    Timeout,
    /// Provider was disabled or unconfigured.
    Skipped,
    /// Task submitted; artifact retrieval deferred.
    AsyncPending,
}

impl fmt::Display for ReportStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Success => "success",
            Self::Error => "error",
            Self::Timeout => "timeout",
            Self::Skipped => "skipped",
            Self::AsyncPending => "async-pending",
        };
        f.write_str(s)
    }
}

/// The per-provider line written into the run manifest.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderReport {
    /// Provider id.
    pub id: String,
    /// Provider tier. `RawSearch` when the provider was never resolved.
    pub tier: ProviderTier,
    /// Outcome category.
    pub status: ReportStatus,
    /// Wall-clock duration in milliseconds.
    pub duration_ms: u64,
    /// Whitespace-delimited word count of the written content.
    pub word_count: usize,
    /// Citations carried by the result.
    pub citation_count: usize,
    /// Relative path of the written content file.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_file: Option<String>,
    /// Relative path of the written metadata file.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta_file: Option<String>,
    /// Failure description for `error`/`timeout`/`skipped` outcomes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// When this report is a fallback execution, the id of the provider it
    /// stood in for.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback_for: Option<String>,
}

impl ProviderReport {
    /// A report for a provider that never produced output (missing,
    /// skipped, or failed before execution).
    #[must_use]
    pub fn without_output(
        id: impl Into<String>,
        tier: ProviderTier,
        status: ReportStatus,
        error: Option<String>,
    ) -> Self {
        Self {
            id: id.into(),
            tier,
            status,
            duration_ms: 0,
            word_count: 0,
            citation_count: 0,
            output_file: None,
            meta_file: None,
            error,
            fallback_for: None,
        }
    }
}

/// Counts and location of the deduplicated source list.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourcesSummary {
    /// Total citations produced across providers.
    pub total: usize,
    /// Unique sources after deduplication.
    pub unique: usize,
    /// Relative path of `sources.json`.
    pub file: String,
}

/// How deep-research providers are routed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DispatchMode {
    /// Everything executes synchronously.
    Sync,
    /// Deep-research providers submit and defer retrieval.
    Async,
    /// Deep-research providers submit; others execute synchronously.
    #[default]
    Mixed,
}

impl FromStr for DispatchMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sync" => Ok(Self::Sync),
            "async" => Ok(Self::Async),
            "mixed" => Ok(Self::Mixed),
            other => Err(format!(
                "unknown mode \"{other}\" (expected sync, async, or mixed)"
            )),
        }
    }
}

impl fmt::Display for DispatchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Sync => "sync",
            Self::Async => "async",
            Self::Mixed => "mixed",
        };
        f.write_str(s)
    }
}

/// The canonical machine-readable record of one run, written as `run.json`.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunManifest {
    /// Manifest schema version. Always 1.
    pub version: u32,
    /// Run start time, epoch seconds.
    pub timestamp: i64,
    /// Directory-name slug derived from the query.
    pub slug: String,
    /// The dispatched query.
    pub query: String,
    /// Dispatch mode the run used.
    pub mode: DispatchMode,
    /// Absolute run directory.
    pub output_dir: PathBuf,
    /// Per-provider reports in completion order.
    pub providers: Vec<ProviderReport>,
    /// Citation accounting.
    pub sources: SourcesSummary,
    /// Handles still pending at the end of the run, in submission order.
    pub async_tasks: Vec<AsyncTaskHandle>,
    /// Exit code the CLI reported for this run.
    pub exit_code: i32,
}

/// Current manifest schema version.
pub const MANIFEST_VERSION: u32 = 1;

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
