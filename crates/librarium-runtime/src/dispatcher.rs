//! Bounded-parallel fan-out of one query across many providers.
//!
//! Scheduling: one tokio task per selected provider id, gated by a
//! semaphore of width `maxParallel`; a task holds its permit for its
//! entire lifetime, retries included. The dispatcher awaits all tasks
//! (success or failure) and returns reports in completion order —
//! callers index by `id`, never by position.
//!
//! Per-task routing:
//! 1. unknown id → `error` report; 2. unconfigured / disabled / keyless
//! → `skipped` report; 3. deep-research + `submit` capability + mode ≠
//! sync → async submission (terminal handles retrieve inline, `submit`
//! errors fall through to sync); 4. otherwise sync `execute`.
//!
//! A panic in adapter code is caught at the join boundary and treated as
//! a thrown execution: `error` report, then single-level fallback. An
//! error-carrying *result* is not a fallback trigger.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use librarium_core::ids::canonical_id;
use librarium_core::text::word_count;
use librarium_core::{
    AsyncTaskHandle, Citation, DispatchMode, ProviderReport, ProviderResponse, ProviderTier,
    ReportStatus,
};
use librarium_providers::provider::{ExecuteOptions, Provider};
use librarium_providers::ProviderRegistry;
use librarium_settings::{Config, resolve_api_key};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::artifacts::write_provider_artifacts;
use crate::errors::RuntimeError;
use crate::progress::{ProgressEvent, ProgressSink};

/// Inputs of one dispatch.
#[derive(Clone)]
pub struct DispatchParams {
    /// The research query.
    pub query: String,
    /// Selected provider ids (duplicates collapse; first occurrence
    /// wins).
    pub provider_ids: Vec<String>,
    /// Sync/async routing mode.
    pub mode: DispatchMode,
    /// The run directory artifacts are written into.
    pub output_dir: PathBuf,
    /// Per-provider execution timeout.
    pub timeout: Duration,
    /// Fan-out width.
    pub max_parallel: usize,
    /// External cancellation, propagated into every provider.
    pub cancellation: CancellationToken,
}

/// Everything one dispatch produced.
#[derive(Debug, Default)]
pub struct DispatchOutcome {
    /// Reports in completion order (fallback reports follow their
    /// primary).
    pub reports: Vec<ProviderReport>,
    /// Handles submitted for deferred retrieval, in submission order.
    pub async_tasks: Vec<AsyncTaskHandle>,
    /// Every citation produced by successful executions.
    pub citations: Vec<Citation>,
}

/// What one provider task sends back to the collector.
struct TaskOutput {
    reports: Vec<ProviderReport>,
    handle: Option<AsyncTaskHandle>,
    citations: Vec<Citation>,
}

/// Fan the query out and await settlement of every provider task.
///
/// Never fails for provider-side reasons; only artifact I/O errors
/// propagate.
pub async fn dispatch(
    registry: &Arc<ProviderRegistry>,
    config: &Arc<Config>,
    params: DispatchParams,
    sink: &Arc<dyn ProgressSink>,
) -> Result<DispatchOutcome, RuntimeError> {
    // One concurrent execution per provider id per dispatch
    let mut seen = HashSet::new();
    let ids: Vec<String> = params
        .provider_ids
        .iter()
        .filter(|id| seen.insert(effective_id(id)))
        .cloned()
        .collect();

    let semaphore = Arc::new(Semaphore::new(params.max_parallel.max(1)));
    let mut join_set: JoinSet<Result<TaskOutput, RuntimeError>> = JoinSet::new();

    for id in ids {
        let registry = Arc::clone(registry);
        let config = Arc::clone(config);
        let params = params.clone();
        let sink = Arc::clone(sink);
        let semaphore = Arc::clone(&semaphore);

        let _abort = join_set.spawn(async move {
            let Ok(_permit) = semaphore.acquire_owned().await else {
                // The semaphore is never closed while tasks run
                return Ok(TaskOutput {
                    reports: Vec::new(),
                    handle: None,
                    citations: Vec::new(),
                });
            };
            run_provider(&registry, &config, &params, &sink, &id).await
        });
    }

    let mut outcome = DispatchOutcome::default();
    while let Some(joined) = join_set.join_next().await {
        match joined {
            Ok(result) => {
                let output = result?;
                outcome.reports.extend(output.reports);
                outcome.citations.extend(output.citations);
                if let Some(handle) = output.handle {
                    outcome.async_tasks.push(handle);
                }
            }
            Err(join_error) => {
                // A panic below the catch point; should not happen, but a
                // run must never die for it
                warn!(error = %join_error, "provider task aborted unexpectedly");
            }
        }
    }

    // Submission order, not completion order, for the handle file
    outcome
        .async_tasks
        .sort_by_key(|handle| handle.submitted_at);
    Ok(outcome)
}

/// The per-task state machine.
async fn run_provider(
    registry: &Arc<ProviderRegistry>,
    config: &Arc<Config>,
    params: &DispatchParams,
    sink: &Arc<dyn ProgressSink>,
    selected_id: &str,
) -> Result<TaskOutput, RuntimeError> {
    let mut output = TaskOutput {
        reports: Vec::new(),
        handle: None,
        citations: Vec::new(),
    };

    // 1. Resolve. Unknown ids report, never crash.
    let Some(provider) = registry.get(selected_id) else {
        output.reports.push(ProviderReport::without_output(
            selected_id,
            ProviderTier::RawSearch,
            ReportStatus::Error,
            Some(format!("Provider \"{selected_id}\" not found")),
        ));
        sink.emit(ProgressEvent::Completed {
            provider: selected_id.to_string(),
            status: ReportStatus::Error,
            duration_ms: 0,
        });
        return Ok(output);
    };
    let descriptor = provider.descriptor().clone();

    // 2. Configured and usable?
    let entry = config.provider(&descriptor.id);
    let skip_reason = match entry {
        None => Some("not configured".to_string()),
        Some(entry) if !entry.enabled => Some("disabled".to_string()),
        Some(entry) => {
            if descriptor.requires_api_key
                && resolve_api_key(entry.api_key.as_deref(), &descriptor.env_var).is_none()
            {
                Some(format!("no API key (set {})", descriptor.env_var))
            } else {
                None
            }
        }
    };
    if let Some(reason) = skip_reason {
        debug!(provider = %descriptor.id, reason = %reason, "skipping provider");
        output.reports.push(ProviderReport::without_output(
            &descriptor.id,
            descriptor.tier,
            ReportStatus::Skipped,
            Some(reason),
        ));
        sink.emit(ProgressEvent::Completed {
            provider: descriptor.id.clone(),
            status: ReportStatus::Skipped,
            duration_ms: 0,
        });
        return Ok(output);
    }

    // 3. Running for real now.
    sink.emit(ProgressEvent::Started {
        provider: descriptor.id.clone(),
    });

    let options = ExecuteOptions {
        timeout: params.timeout,
        cancellation: Some(params.cancellation.clone()),
        model: entry.and_then(|e| e.model.clone()),
    };

    // 4. Async routing.
    if params.mode != DispatchMode::Sync
        && descriptor.tier == ProviderTier::DeepResearch
        && descriptor.capabilities.submit
    {
        match provider.submit(&params.query, &options).await {
            Ok(mut handle) => {
                handle.output_dir = Some(params.output_dir.clone());

                if handle.status.is_terminal() && descriptor.capabilities.retrieve {
                    // Synthetic async: the work already happened
                    match provider.retrieve(&handle).await {
                        Ok(response) => {
                            record_response(&mut output, params, sink, response, None)?;
                        }
                        Err(error) => {
                            output.reports.push(ProviderReport::without_output(
                                &descriptor.id,
                                descriptor.tier,
                                ReportStatus::Error,
                                Some(error.to_string()),
                            ));
                            sink.emit(ProgressEvent::Completed {
                                provider: descriptor.id.clone(),
                                status: ReportStatus::Error,
                                duration_ms: 0,
                            });
                        }
                    }
                    return Ok(output);
                }

                sink.emit(ProgressEvent::AsyncSubmitted {
                    provider: descriptor.id.clone(),
                    task_id: handle.task_id.clone(),
                });
                output.reports.push(ProviderReport::without_output(
                    &descriptor.id,
                    descriptor.tier,
                    ReportStatus::AsyncPending,
                    None,
                ));
                sink.emit(ProgressEvent::Completed {
                    provider: descriptor.id.clone(),
                    status: ReportStatus::AsyncPending,
                    duration_ms: 0,
                });
                output.handle = Some(handle);
                return Ok(output);
            }
            Err(error) => {
                warn!(provider = %descriptor.id, error = %error, "submit failed, falling back to sync execution");
            }
        }
    }

    // 5. Sync execution, with the panic boundary that defines "thrown".
    let executed = {
        let provider: Arc<dyn Provider> = Arc::clone(&provider);
        let query = params.query.clone();
        let options = options.clone();
        tokio::spawn(async move { provider.execute(&query, &options).await }).await
    };

    match executed {
        Ok(response) => {
            record_response(&mut output, params, sink, response, None)?;
        }
        Err(join_error) => {
            // 6. Thrown: error report, then single-level fallback.
            let message = panic_message(join_error);
            output.reports.push(ProviderReport::without_output(
                &descriptor.id,
                descriptor.tier,
                ReportStatus::Error,
                Some(message.clone()),
            ));
            sink.emit(ProgressEvent::Error {
                provider: descriptor.id.clone(),
                message,
            });
            try_fallback(registry, config, params, sink, &descriptor.id, &mut output).await?;
        }
    }

    Ok(output)
}

/// Record a sync-style result: artifacts (non-error only), report,
/// citations, progress.
fn record_response(
    output: &mut TaskOutput,
    params: &DispatchParams,
    sink: &Arc<dyn ProgressSink>,
    response: ProviderResponse,
    fallback_for: Option<String>,
) -> Result<(), RuntimeError> {
    let mut report = report_from_response(&response);
    report.fallback_for = fallback_for;

    if !response.is_error() {
        let (output_file, meta_file) =
            write_provider_artifacts(&params.output_dir, &response)?;
        report.output_file = Some(output_file);
        report.meta_file = Some(meta_file);
        output.citations.extend(response.citations.iter().cloned());
    }

    sink.emit(ProgressEvent::Completed {
        provider: report.id.clone(),
        status: report.status,
        duration_ms: report.duration_ms,
    });
    output.reports.push(report);
    Ok(())
}

/// Build the report line for an executed response.
fn report_from_response(response: &ProviderResponse) -> ProviderReport {
    let status = if response.is_error() {
        if response
            .error
            .as_deref()
            .is_some_and(|e| e.contains("timed out"))
        {
            ReportStatus::Timeout
        } else {
            ReportStatus::Error
        }
    } else {
        ReportStatus::Success
    };

    ProviderReport {
        id: response.provider.clone(),
        tier: response.tier,
        status,
        duration_ms: response.duration_ms,
        word_count: word_count(&response.content),
        citation_count: response.citations.len(),
        output_file: None,
        meta_file: None,
        error: response.error.clone().filter(|e| !e.is_empty()),
        fallback_for: None,
    }
}

/// Attempt the configured single-level fallback for a thrown primary.
async fn try_fallback(
    registry: &Arc<ProviderRegistry>,
    config: &Arc<Config>,
    params: &DispatchParams,
    sink: &Arc<dyn ProgressSink>,
    failed_id: &str,
    output: &mut TaskOutput,
) -> Result<(), RuntimeError> {
    let Some(fallback_id) = config
        .provider(failed_id)
        .and_then(|entry| entry.fallback.clone())
    else {
        return Ok(());
    };

    // Already part of this dispatch? Its own top-level report covers it.
    let selected: HashSet<String> = params
        .provider_ids
        .iter()
        .map(|id| effective_id(id))
        .collect();
    if selected.contains(&effective_id(&fallback_id)) {
        debug!(fallback = %fallback_id, "fallback already selected, skipping");
        return Ok(());
    }

    let Some(provider) = registry.get(&fallback_id) else {
        warn!(fallback = %fallback_id, "fallback not registered, skipping");
        return Ok(());
    };
    let descriptor = provider.descriptor().clone();

    let Some(entry) = config.provider(&descriptor.id) else {
        warn!(fallback = %fallback_id, "fallback not configured, skipping");
        return Ok(());
    };
    if descriptor.requires_api_key
        && resolve_api_key(entry.api_key.as_deref(), &descriptor.env_var).is_none()
    {
        warn!(fallback = %fallback_id, "fallback has no API key, skipping");
        return Ok(());
    }

    sink.emit(ProgressEvent::FallbackStarted {
        provider: failed_id.to_string(),
        fallback: descriptor.id.clone(),
    });

    // Synchronous, no recursion: the fallback's own fallback is ignored
    let options = ExecuteOptions {
        timeout: params.timeout,
        cancellation: Some(params.cancellation.clone()),
        model: entry.model.clone(),
    };
    let response = provider.execute(&params.query, &options).await;
    record_response(output, params, sink, response, Some(failed_id.to_string()))
}

/// Canonical form of a possibly-legacy selection id.
fn effective_id(id: &str) -> String {
    canonical_id(id).unwrap_or(id).to_string()
}

/// Extract a readable message from a panicked provider task.
fn panic_message(join_error: tokio::task::JoinError) -> String {
    if join_error.is_panic() {
        let payload = join_error.into_panic();
        if let Some(message) = payload.downcast_ref::<&str>() {
            (*message).to_string()
        } else if let Some(message) = payload.downcast_ref::<String>() {
            message.clone()
        } else {
            "provider panicked".to_string()
        }
    } else {
        "provider task cancelled".to_string()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Exit codes
// ─────────────────────────────────────────────────────────────────────────────

/// Compute the `run` exit code from the final report list.
///
/// The "effective" list removes the primary error report of any provider
/// whose fallback succeeded. All effective reports succeeded or
/// async-pending → 0; some succeeded → 1; none → 2.
#[must_use]
pub fn compute_exit_code(reports: &[ProviderReport]) -> i32 {
    let recovered: HashSet<&str> = reports
        .iter()
        .filter(|r| r.status == ReportStatus::Success)
        .filter_map(|r| r.fallback_for.as_deref())
        .collect();

    let effective: Vec<&ProviderReport> = reports
        .iter()
        .filter(|r| {
            !(r.fallback_for.is_none()
                && r.status == ReportStatus::Error
                && recovered.contains(r.id.as_str()))
        })
        .collect();

    let ok = |r: &&ProviderReport| {
        matches!(r.status, ReportStatus::Success | ReportStatus::AsyncPending)
    };
    if effective.iter().all(ok) {
        0
    } else if effective.iter().any(ok) {
        1
    } else {
        2
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
