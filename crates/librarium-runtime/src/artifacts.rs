//! The on-disk run record.
//!
//! One run → one directory under the output root, named
//! `<epoch-seconds>-<slug>`:
//!
//! ```text
//! <outputDir>/
//!   prompt.md
//!   summary.md
//!   sources.json
//!   run.json
//!   <id>.md
//!   <id>.meta.json
//!   async-tasks.json   (only while async handles are pending)
//! ```
//!
//! Files are written once per run; the async handle store is the only
//! artifact that gets rewritten afterwards.

use std::path::{Path, PathBuf};

use chrono::{TimeZone, Utc};
use librarium_core::text::sanitize_id;
use librarium_core::{DedupedSource, ProviderResponse, ReportStatus, RunManifest};
use serde_json::json;

use crate::errors::RuntimeError;

/// File name of the deduplicated source list.
pub const SOURCES_FILE: &str = "sources.json";

/// File name of the run manifest.
pub const MANIFEST_FILE: &str = "run.json";

/// How many ranked sources the summary lists.
const SUMMARY_TOP_SOURCES: usize = 20;

/// Create `<base>/<timestamp>-<slug>/` (slug omitted when empty).
pub fn create_run_dir(base: &Path, timestamp: i64, slug: &str) -> Result<PathBuf, RuntimeError> {
    let name = if slug.is_empty() {
        timestamp.to_string()
    } else {
        format!("{timestamp}-{slug}")
    };
    let dir = base.join(name);
    std::fs::create_dir_all(&dir).map_err(|e| RuntimeError::io(&dir, e))?;
    Ok(dir)
}

/// Write `prompt.md`: the query under a human-readable header.
pub fn write_prompt(dir: &Path, query: &str, timestamp: i64) -> Result<(), RuntimeError> {
    let when = Utc
        .timestamp_opt(timestamp, 0)
        .single()
        .unwrap_or_else(Utc::now);
    let body = format!(
        "# Research Prompt\n\n**Date:** {}\n\n{query}\n",
        when.to_rfc3339()
    );
    let path = dir.join("prompt.md");
    std::fs::write(&path, body).map_err(|e| RuntimeError::io(&path, e))
}

/// Write `<sanitized-id>.md` (content verbatim) and
/// `<sanitized-id>.meta.json`. Returns the two relative file names.
pub fn write_provider_artifacts(
    dir: &Path,
    response: &ProviderResponse,
) -> Result<(String, String), RuntimeError> {
    let stem = sanitize_id(&response.provider);
    let output_file = format!("{stem}.md");
    let meta_file = format!("{stem}.meta.json");

    let output_path = dir.join(&output_file);
    std::fs::write(&output_path, &response.content)
        .map_err(|e| RuntimeError::io(&output_path, e))?;

    let meta = json!({
        "provider": response.provider,
        "tier": response.tier,
        "model": response.model,
        "durationMs": response.duration_ms,
        "citationCount": response.citations.len(),
        "tokenUsage": response.token_usage,
        "citations": response.citations,
    });
    let meta_path = dir.join(&meta_file);
    std::fs::write(&meta_path, serde_json::to_string_pretty(&meta)?)
        .map_err(|e| RuntimeError::io(&meta_path, e))?;

    Ok((output_file, meta_file))
}

/// Write `sources.json`: the deduplicated sources in ranked order.
pub fn write_sources(dir: &Path, sources: &[DedupedSource]) -> Result<(), RuntimeError> {
    let path = dir.join(SOURCES_FILE);
    std::fs::write(&path, serde_json::to_string_pretty(sources)?)
        .map_err(|e| RuntimeError::io(&path, e))
}

/// Write `run.json`: the canonical run manifest.
pub fn write_manifest(dir: &Path, manifest: &RunManifest) -> Result<(), RuntimeError> {
    let path = dir.join(MANIFEST_FILE);
    std::fs::write(&path, serde_json::to_string_pretty(manifest)?)
        .map_err(|e| RuntimeError::io(&path, e))
}

/// Read a run manifest back (used by `ls` and `cleanup`).
pub fn read_manifest(dir: &Path) -> Result<RunManifest, RuntimeError> {
    let path = dir.join(MANIFEST_FILE);
    let body = std::fs::read_to_string(&path).map_err(|e| RuntimeError::io(&path, e))?;
    Ok(serde_json::from_str(&body)?)
}

/// Write `summary.md`: the human-readable digest of the run.
pub fn write_summary(
    dir: &Path,
    manifest: &RunManifest,
    sources: &[DedupedSource],
) -> Result<(), RuntimeError> {
    let path = dir.join("summary.md");
    std::fs::write(&path, render_summary(manifest, sources))
        .map_err(|e| RuntimeError::io(&path, e))
}

/// Render the summary body (split out for tests).
#[must_use]
pub fn render_summary(manifest: &RunManifest, sources: &[DedupedSource]) -> String {
    let succeeded = count_status(manifest, ReportStatus::Success);
    let failed = count_status(manifest, ReportStatus::Error)
        + count_status(manifest, ReportStatus::Timeout);
    let pending = count_status(manifest, ReportStatus::AsyncPending);
    let elapsed_ms = manifest
        .providers
        .iter()
        .map(|r| r.duration_ms)
        .max()
        .unwrap_or(0);

    let when = Utc
        .timestamp_opt(manifest.timestamp, 0)
        .single()
        .unwrap_or_else(Utc::now);

    let mut out = String::new();
    out.push_str("# Research Summary\n\n");
    out.push_str(&format!("**Query:** {}\n\n", manifest.query));
    out.push_str(&format!("**Date:** {}\n\n", when.to_rfc3339()));
    out.push_str(&format!("**Mode:** {}\n\n", manifest.mode));

    out.push_str("## Outcome\n\n");
    out.push_str(&format!(
        "- {succeeded} succeeded, {failed} failed, {pending} async-pending\n"
    ));
    out.push_str(&format!(
        "- Elapsed: {:.1}s (longest provider)\n",
        elapsed_ms as f64 / 1000.0
    ));
    out.push_str(&format!(
        "- {} unique sources from {} citations\n\n",
        manifest.sources.unique, manifest.sources.total
    ));

    out.push_str("## Providers\n\n");
    for report in &manifest.providers {
        let label = if let Some(primary) = &report.fallback_for {
            format!("{} (fallback for {primary})", report.id)
        } else {
            report.id.clone()
        };
        match report.status {
            ReportStatus::Success => out.push_str(&format!(
                "- [success] {label}: {:.1}s, {} words, {} citations\n",
                report.duration_ms as f64 / 1000.0,
                report.word_count,
                report.citation_count
            )),
            ReportStatus::AsyncPending => {
                out.push_str(&format!("- [async-pending] {label}\n"));
            }
            status => out.push_str(&format!(
                "- [{status}] {label}: {}\n",
                report.error.as_deref().unwrap_or("no detail")
            )),
        }
    }
    out.push('\n');

    if !sources.is_empty() {
        out.push_str("## Top Sources\n\n");
        for (i, source) in sources.iter().take(SUMMARY_TOP_SOURCES).enumerate() {
            let title = source.title.as_deref().unwrap_or(&source.url);
            out.push_str(&format!(
                "{}. {title} — {} ({} citation{}, via {})\n",
                i + 1,
                source.url,
                source.citation_count,
                if source.citation_count == 1 { "" } else { "s" },
                source.providers.join(", ")
            ));
        }
        out.push('\n');
    }

    if !manifest.async_tasks.is_empty() {
        out.push_str("## Pending Async Tasks\n\n");
        for handle in &manifest.async_tasks {
            let submitted = Utc
                .timestamp_millis_opt(handle.submitted_at)
                .single()
                .map(|t| t.to_rfc3339())
                .unwrap_or_default();
            out.push_str(&format!(
                "- {} task {} ({}, submitted {submitted})\n",
                handle.provider, handle.task_id, handle.status
            ));
        }
        out.push_str("\nRun `librarium status --wait` to poll and retrieve.\n");
    }

    out
}

fn count_status(manifest: &RunManifest, status: ReportStatus) -> usize {
    manifest
        .providers
        .iter()
        .filter(|r| r.status == status)
        .count()
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use librarium_core::{
        AsyncTaskHandle, Citation, DispatchMode, ProviderReport, ProviderTier, SourcesSummary,
        TaskStatus, TokenUsage,
    };

    fn response() -> ProviderResponse {
        ProviderResponse {
            provider: "brave-search".into(),
            tier: ProviderTier::RawSearch,
            content: "# Results\n\ncontent body".into(),
            citations: vec![Citation {
                url: "https://a.dev".into(),
                title: Some("A".into()),
                snippet: None,
                provider: "brave-search".into(),
            }],
            duration_ms: 1234,
            model: None,
            token_usage: Some(TokenUsage {
                input: Some(1),
                output: Some(2),
            }),
            error: None,
        }
    }

    fn manifest() -> RunManifest {
        RunManifest {
            version: 1,
            timestamp: 1_700_000_000,
            slug: "q".into(),
            query: "q".into(),
            mode: DispatchMode::Mixed,
            output_dir: PathBuf::from("/tmp/x"),
            providers: vec![
                ProviderReport {
                    id: "brave-search".into(),
                    tier: ProviderTier::RawSearch,
                    status: ReportStatus::Success,
                    duration_ms: 1500,
                    word_count: 100,
                    citation_count: 3,
                    output_file: Some("brave-search.md".into()),
                    meta_file: Some("brave-search.meta.json".into()),
                    error: None,
                    fallback_for: None,
                },
                ProviderReport::without_output(
                    "exa-search",
                    ProviderTier::RawSearch,
                    ReportStatus::Error,
                    Some("network error connecting to Exa".into()),
                ),
            ],
            sources: SourcesSummary {
                total: 5,
                unique: 3,
                file: SOURCES_FILE.into(),
            },
            async_tasks: vec![AsyncTaskHandle {
                provider: "openai-deep-research".into(),
                task_id: "resp_9".into(),
                query: "q".into(),
                submitted_at: 1_700_000_000_000,
                status: TaskStatus::Running,
                last_polled_at: None,
                completed_at: None,
                output_dir: None,
            }],
            exit_code: 1,
        }
    }

    #[test]
    fn run_dir_name_is_timestamp_and_slug() {
        let base = tempfile::tempdir().unwrap();
        let dir = create_run_dir(base.path(), 1_700_000_000, "my-query").unwrap();
        assert!(dir.ends_with("1700000000-my-query"));
        assert!(dir.is_dir());
    }

    #[test]
    fn empty_slug_uses_bare_timestamp() {
        let base = tempfile::tempdir().unwrap();
        let dir = create_run_dir(base.path(), 1_700_000_000, "").unwrap();
        assert!(dir.ends_with("1700000000"));
    }

    #[test]
    fn provider_artifacts_round_trip() {
        let base = tempfile::tempdir().unwrap();
        let (output_file, meta_file) =
            write_provider_artifacts(base.path(), &response()).unwrap();
        assert_eq!(output_file, "brave-search.md");
        assert_eq!(meta_file, "brave-search.meta.json");

        let content = std::fs::read_to_string(base.path().join(&output_file)).unwrap();
        assert_eq!(content, "# Results\n\ncontent body");

        let meta: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(base.path().join(&meta_file)).unwrap())
                .unwrap();
        assert_eq!(meta["provider"], "brave-search");
        assert_eq!(meta["durationMs"], 1234);
        assert_eq!(meta["citationCount"], 1);
        assert_eq!(meta["citations"][0]["url"], "https://a.dev");
        assert_eq!(meta["tokenUsage"]["input"], 1);
    }

    #[test]
    fn unsafe_provider_ids_are_sanitized_in_file_names() {
        let base = tempfile::tempdir().unwrap();
        let mut r = response();
        r.provider = "weird/id:v2".into();
        let (output_file, _) = write_provider_artifacts(base.path(), &r).unwrap();
        assert_eq!(output_file, "weird_id_v2.md");
    }

    #[test]
    fn manifest_write_read_round_trip() {
        let base = tempfile::tempdir().unwrap();
        write_manifest(base.path(), &manifest()).unwrap();
        let back = read_manifest(base.path()).unwrap();
        assert_eq!(back.query, "q");
        assert_eq!(back.providers.len(), 2);
        assert_eq!(back.exit_code, 1);
    }

    #[test]
    fn summary_mentions_counts_statuses_and_pending_tasks() {
        let sources = vec![DedupedSource {
            url: "https://a.dev".into(),
            normalized_url: "a.dev".into(),
            title: Some("Title A".into()),
            providers: vec!["brave-search".into(), "exa-search".into()],
            citation_count: 3,
        }];
        let summary = render_summary(&manifest(), &sources);

        assert!(summary.contains("1 succeeded, 1 failed, 0 async-pending"));
        assert!(summary.contains("Elapsed: 1.5s"));
        assert!(summary.contains("3 unique sources from 5 citations"));
        assert!(summary.contains("[success] brave-search"));
        assert!(summary.contains("[error] exa-search"));
        assert!(summary.contains("Title A — https://a.dev (3 citations, via brave-search, exa-search)"));
        assert!(summary.contains("openai-deep-research task resp_9"));
        assert!(summary.contains("status --wait"));
    }

    #[test]
    fn summary_caps_sources_at_twenty() {
        let sources: Vec<DedupedSource> = (0..30)
            .map(|i| DedupedSource {
                url: format!("https://s{i}.dev"),
                normalized_url: format!("s{i}.dev"),
                title: None,
                providers: vec!["p".into()],
                citation_count: 1,
            })
            .collect();
        let summary = render_summary(&manifest(), &sources);
        assert!(summary.contains("20. "));
        assert!(!summary.contains("21. "));
    }

    #[test]
    fn prompt_contains_query_and_date() {
        let base = tempfile::tempdir().unwrap();
        write_prompt(base.path(), "What is io_uring?", 1_700_000_000).unwrap();
        let body = std::fs::read_to_string(base.path().join("prompt.md")).unwrap();
        assert!(body.contains("What is io_uring?"));
        assert!(body.contains("2023-11-14"));
    }
}
