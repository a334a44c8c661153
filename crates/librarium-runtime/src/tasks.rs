//! Durable async task handles and the poll/retrieve loop.
//!
//! Each run directory owns one `async-tasks.json` holding its pending
//! handles in submission order. That file is the sole durable state of
//! the async lifecycle: everything else in the directory can be
//! regenerated by re-running retrieval. Writes go through a temporary
//! file in the same directory followed by a rename, so a racing reader
//! never sees torn JSON. One dispatcher process per directory is
//! assumed.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use librarium_core::{AsyncTaskHandle, ProviderResponse, TaskStatus};
use librarium_providers::ProviderRegistry;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::artifacts::write_provider_artifacts;
use crate::errors::RuntimeError;

/// File name of the handle store inside a run directory.
pub const TASKS_FILE: &str = "async-tasks.json";

/// Handle store for one run directory.
pub struct TaskStore {
    dir: PathBuf,
    path: PathBuf,
}

impl TaskStore {
    /// The store for `dir` (the file need not exist yet).
    #[must_use]
    pub fn new(dir: &Path) -> Self {
        Self {
            dir: dir.to_path_buf(),
            path: dir.join(TASKS_FILE),
        }
    }

    /// The run directory this store belongs to.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Load all handles; a missing file is an empty store.
    pub fn load(&self) -> Result<Vec<AsyncTaskHandle>, RuntimeError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let body = std::fs::read_to_string(&self.path)
            .map_err(|e| RuntimeError::io(&self.path, e))?;
        Ok(serde_json::from_str(&body)?)
    }

    /// Overwrite the store atomically. Saving an empty list removes the
    /// file (the layout keeps `async-tasks.json` only while handles
    /// exist).
    pub fn save(&self, handles: &[AsyncTaskHandle]) -> Result<(), RuntimeError> {
        if handles.is_empty() {
            if self.path.exists() {
                std::fs::remove_file(&self.path).map_err(|e| RuntimeError::io(&self.path, e))?;
            }
            return Ok(());
        }

        let body = serde_json::to_string_pretty(handles)?;
        let tmp = tempfile::NamedTempFile::new_in(&self.dir)
            .map_err(|e| RuntimeError::io(&self.dir, e))?;
        std::fs::write(tmp.path(), body).map_err(|e| RuntimeError::io(tmp.path(), e))?;
        let _ = tmp
            .persist(&self.path)
            .map_err(|e| RuntimeError::io(&self.path, e.error))?;
        Ok(())
    }

    /// Merge fields into the handle with `task_id` and save.
    ///
    /// Status changes that would reopen a terminal handle are ignored
    /// (the store is monotonic). Returns whether the handle was found.
    pub fn update(
        &self,
        task_id: &str,
        mutate: impl FnOnce(&mut AsyncTaskHandle),
    ) -> Result<bool, RuntimeError> {
        let mut handles = self.load()?;
        let Some(handle) = handles.iter_mut().find(|h| h.task_id == task_id) else {
            return Ok(false);
        };

        let previous = handle.status;
        mutate(handle);
        if !previous.can_transition_to(handle.status) {
            warn!(
                task = %task_id,
                from = %previous,
                to = %handle.status,
                "ignoring status transition that would reopen a terminal handle"
            );
            handle.status = previous;
        }

        self.save(&handles)?;
        Ok(true)
    }

    /// Remove the handle with `task_id`. Returns whether it existed.
    pub fn remove(&self, task_id: &str) -> Result<bool, RuntimeError> {
        let mut handles = self.load()?;
        let before = handles.len();
        handles.retain(|h| h.task_id != task_id);
        if handles.len() == before {
            return Ok(false);
        }
        self.save(&handles)?;
        Ok(true)
    }
}

/// Find every run directory with live handles under an output root.
///
/// Walks the root's immediate children only and keeps handles that are
/// `pending`, `running`, or `completed` (retrieved handles are removed
/// from their stores, failed ones stay visible for `status`).
pub fn scan_output_root(base: &Path) -> Vec<(PathBuf, Vec<AsyncTaskHandle>)> {
    let mut found = Vec::new();
    let Ok(entries) = std::fs::read_dir(base) else {
        return found;
    };
    let mut dirs: Vec<PathBuf> = entries
        .filter_map(Result::ok)
        .map(|e| e.path())
        .filter(|p| p.is_dir())
        .collect();
    dirs.sort();

    for dir in dirs {
        let store = TaskStore::new(&dir);
        match store.load() {
            Ok(handles) => {
                let live: Vec<AsyncTaskHandle> = handles
                    .into_iter()
                    .filter(|h| {
                        matches!(
                            h.status,
                            TaskStatus::Pending | TaskStatus::Running | TaskStatus::Completed
                        )
                    })
                    .collect();
                if !live.is_empty() {
                    found.push((dir, live));
                }
            }
            Err(error) => {
                warn!(dir = %dir.display(), error = %error, "unreadable task store, skipping");
            }
        }
    }
    found
}

/// Knobs for [`poll_store`].
pub struct PollOptions {
    /// Sleep between full sweeps.
    pub poll_interval: Duration,
    /// Overall budget; expiry leaves remaining handles in the store.
    pub overall_timeout: Duration,
    /// External cancellation, checked between polls and sweeps.
    pub cancellation: CancellationToken,
}

/// What happened to one handle during a poll/retrieve pass.
#[derive(Clone, Debug)]
pub struct RetrievedTask {
    /// Owning provider id.
    pub provider: String,
    /// Provider-assigned task id.
    pub task_id: String,
    /// The retrieved artifact, when retrieval happened and succeeded.
    pub response: Option<ProviderResponse>,
}

/// Poll a store's pending handles until they settle, then retrieve.
///
/// The loop: sweep every `pending`/`running` handle with the provider's
/// `poll` (providers without `poll` fail the handle), persist each
/// transition, sleep `poll_interval` between sweeps, and stop on
/// settlement, timeout, or cancellation. Afterwards every `completed`
/// handle is retrieved, its artifacts written next to the store, and the
/// handle removed. A failed retrieval leaves the handle in place for the
/// next invocation.
pub async fn poll_store(
    registry: &Arc<ProviderRegistry>,
    store: &TaskStore,
    options: &PollOptions,
) -> Result<Vec<RetrievedTask>, RuntimeError> {
    let started = Instant::now();

    loop {
        let open: Vec<AsyncTaskHandle> = store
            .load()?
            .into_iter()
            .filter(|h| matches!(h.status, TaskStatus::Pending | TaskStatus::Running))
            .collect();
        if open.is_empty() {
            break;
        }
        if options.cancellation.is_cancelled() || started.elapsed() >= options.overall_timeout {
            debug!(dir = %store.dir().display(), "poll loop stopping early, handles left in store");
            break;
        }

        for handle in &open {
            if options.cancellation.is_cancelled() {
                break;
            }
            sweep_one(registry, store, handle).await?;
        }

        // Sleep between sweeps unless everything just settled
        let still_open = store
            .load()?
            .iter()
            .any(|h| matches!(h.status, TaskStatus::Pending | TaskStatus::Running));
        if !still_open {
            break;
        }
        tokio::select! {
            () = tokio::time::sleep(options.poll_interval) => {}
            () = options.cancellation.cancelled() => break,
        }
    }

    retrieve_completed(registry, store).await
}

/// Poll one handle and persist the result.
async fn sweep_one(
    registry: &Arc<ProviderRegistry>,
    store: &TaskStore,
    handle: &AsyncTaskHandle,
) -> Result<(), RuntimeError> {
    let now = chrono::Utc::now().timestamp_millis();

    let polled = match registry.get(&handle.provider) {
        Some(provider) if provider.descriptor().capabilities.poll => {
            provider.poll(handle).await
        }
        Some(provider) => {
            warn!(provider = %provider.descriptor().id, task = %handle.task_id, "provider cannot poll, failing handle");
            let _ = store.update(&handle.task_id, |h| {
                h.status = TaskStatus::Failed;
                h.completed_at = Some(now);
            })?;
            return Ok(());
        }
        None => {
            warn!(provider = %handle.provider, task = %handle.task_id, "provider not registered, failing handle");
            let _ = store.update(&handle.task_id, |h| {
                h.status = TaskStatus::Failed;
                h.completed_at = Some(now);
            })?;
            return Ok(());
        }
    };

    match polled {
        Ok(update) if update.status.is_terminal() => {
            debug!(provider = %handle.provider, task = %handle.task_id, status = %update.status, "task settled");
            let _ = store.update(&handle.task_id, |h| {
                h.status = update.status;
                h.completed_at = Some(now);
            })?;
        }
        Ok(update) => {
            let _ = store.update(&handle.task_id, |h| {
                h.status = update.status;
                h.last_polled_at = Some(now);
            })?;
        }
        Err(error) => {
            // Transient poll failures keep the handle open
            warn!(provider = %handle.provider, task = %handle.task_id, error = %error, "poll failed");
            let _ = store.update(&handle.task_id, |h| {
                h.last_polled_at = Some(now);
            })?;
        }
    }
    Ok(())
}

/// Retrieve every completed handle, write artifacts, drop the handle.
async fn retrieve_completed(
    registry: &Arc<ProviderRegistry>,
    store: &TaskStore,
) -> Result<Vec<RetrievedTask>, RuntimeError> {
    let mut results = Vec::new();

    let completed: Vec<AsyncTaskHandle> = store
        .load()?
        .into_iter()
        .filter(|h| h.status == TaskStatus::Completed)
        .collect();

    for handle in completed {
        let Some(provider) = registry.get(&handle.provider) else {
            warn!(provider = %handle.provider, task = %handle.task_id, "provider not registered, leaving handle");
            results.push(RetrievedTask {
                provider: handle.provider.clone(),
                task_id: handle.task_id.clone(),
                response: None,
            });
            continue;
        };
        if !provider.descriptor().capabilities.retrieve {
            warn!(provider = %handle.provider, task = %handle.task_id, "provider cannot retrieve, leaving handle");
            results.push(RetrievedTask {
                provider: handle.provider.clone(),
                task_id: handle.task_id.clone(),
                response: None,
            });
            continue;
        }

        match provider.retrieve(&handle).await {
            Ok(response) => {
                let target = handle
                    .output_dir
                    .clone()
                    .unwrap_or_else(|| store.dir().to_path_buf());
                write_provider_artifacts(&target, &response)?;
                let _ = store.remove(&handle.task_id)?;
                debug!(provider = %handle.provider, task = %handle.task_id, "retrieved and removed handle");
                results.push(RetrievedTask {
                    provider: handle.provider.clone(),
                    task_id: handle.task_id.clone(),
                    response: Some(response),
                });
            }
            Err(error) => {
                // Left in place; the next invocation resumes retrieval
                warn!(provider = %handle.provider, task = %handle.task_id, error = %error, "retrieve failed, handle kept");
                results.push(RetrievedTask {
                    provider: handle.provider.clone(),
                    task_id: handle.task_id.clone(),
                    response: None,
                });
            }
        }
    }

    Ok(results)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
