//! `librarium run <query>` — one fan-out, one run directory.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args;
use librarium_core::text::slugify;
use librarium_core::types::MANIFEST_VERSION;
use librarium_core::{DispatchMode, RunManifest, SourcesSummary, dedup_citations};
use librarium_runtime::artifacts::{
    SOURCES_FILE, create_run_dir, write_manifest, write_prompt, write_sources, write_summary,
};
use librarium_runtime::tasks::TaskStore;
use librarium_runtime::{DispatchParams, ProgressSink, compute_exit_code, dispatch};
use librarium_settings::{CliOverrides, Config};
use tokio_util::sync::CancellationToken;

use crate::bootstrap;
use crate::progress::StderrProgress;

/// Arguments of `librarium run`.
#[derive(Args, Debug)]
pub struct RunArgs {
    /// The research query.
    pub query: String,

    /// Comma-separated provider ids to run (default: every enabled
    /// configured provider).
    #[arg(short, long, value_delimiter = ',')]
    pub providers: Option<Vec<String>>,

    /// Run a named group from the config.
    #[arg(short, long, conflicts_with = "providers")]
    pub group: Option<String>,

    /// Dispatch mode: sync, async, or mixed.
    #[arg(short, long)]
    pub mode: Option<String>,

    /// Output root (overrides defaults.outputDir).
    #[arg(short, long)]
    pub output: Option<String>,

    /// Fan-out width (overrides defaults.maxParallel).
    #[arg(long)]
    pub parallel: Option<usize>,

    /// Per-provider timeout in seconds (overrides defaults.timeout).
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Print the run manifest as JSON on stdout.
    #[arg(long)]
    pub json: bool,
}

/// Resolve which providers this run targets.
///
/// Explicit `-p` wins, then `-g`, then every enabled configured
/// provider in config order.
pub fn resolve_selection(
    config: &Config,
    providers: Option<&[String]>,
    group: Option<&str>,
) -> Result<Vec<String>, String> {
    if let Some(ids) = providers {
        let ids: Vec<String> = ids
            .iter()
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty())
            .collect();
        if ids.is_empty() {
            return Err("no providers selected".into());
        }
        return Ok(ids);
    }

    if let Some(name) = group {
        return match config.groups.get(name) {
            Some(members) if !members.is_empty() => Ok(members.clone()),
            Some(_) => Err(format!("group \"{name}\" is empty")),
            None => Err(format!("unknown group \"{name}\"")),
        };
    }

    let enabled: Vec<String> = config
        .providers
        .iter()
        .filter(|(_, entry)| entry.enabled)
        .map(|(id, _)| id.clone())
        .collect();
    if enabled.is_empty() {
        return Err(
            "no providers configured; run `librarium init --auto` or pass --providers".into(),
        );
    }
    Ok(enabled)
}

pub async fn run(args: RunArgs, cwd: &Path, cancel: CancellationToken) -> Result<i32> {
    let mode_override = match args.mode.as_deref() {
        Some(raw) => match raw.parse::<DispatchMode>() {
            Ok(mode) => Some(mode),
            Err(message) => {
                eprintln!("error: {message}");
                return Ok(2);
            }
        },
        None => None,
    };

    let overrides = CliOverrides {
        output_dir: args.output.clone(),
        max_parallel: args.parallel,
        timeout: args.timeout,
        mode: mode_override,
    };
    let boot = bootstrap::initialize(cwd, &overrides).await?;

    let selection = match resolve_selection(
        &boot.config,
        args.providers.as_deref(),
        args.group.as_deref(),
    ) {
        Ok(selection) => selection,
        Err(message) => {
            eprintln!("error: {message}");
            return Ok(2);
        }
    };

    let timestamp = chrono::Utc::now().timestamp();
    let slug = slugify(&args.query);
    let base = cwd.join(&boot.config.defaults.output_dir);
    let run_dir = create_run_dir(&base, timestamp, &slug)
        .with_context(|| format!("cannot create run directory under {}", base.display()))?;
    let run_dir = run_dir.canonicalize().unwrap_or(run_dir);

    write_prompt(&run_dir, &args.query, timestamp)?;

    let sink: Arc<dyn ProgressSink> = Arc::new(StderrProgress);
    let mode = boot.config.defaults.mode;
    let params = DispatchParams {
        query: args.query.clone(),
        provider_ids: selection,
        mode,
        output_dir: run_dir.clone(),
        timeout: Duration::from_secs(boot.config.defaults.timeout.max(1)),
        max_parallel: boot.config.defaults.max_parallel,
        cancellation: cancel,
    };
    let selection_for_manifest = params.provider_ids.clone();

    let outcome = dispatch(&boot.registry, &boot.config, params, &sink).await?;

    // Sources: every citation from every successful provider, deduped
    let sources = dedup_citations(&outcome.citations);
    write_sources(&run_dir, &sources)?;

    // Durable async handles (file exists only when handles do)
    let store = TaskStore::new(&run_dir);
    store.save(&outcome.async_tasks)?;

    let exit_code = compute_exit_code(&outcome.reports);
    let manifest = RunManifest {
        version: MANIFEST_VERSION,
        timestamp,
        slug,
        query: args.query,
        mode,
        output_dir: run_dir.clone(),
        providers: outcome.reports,
        sources: SourcesSummary {
            total: outcome.citations.len(),
            unique: sources.len(),
            file: SOURCES_FILE.into(),
        },
        async_tasks: outcome.async_tasks,
        exit_code,
    };
    write_manifest(&run_dir, &manifest)?;
    write_summary(&run_dir, &manifest, &sources)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&manifest)?);
    } else {
        eprintln!();
        println!("run directory: {}", run_dir.display());
        println!(
            "providers: {} selected, {} unique sources from {} citations",
            selection_for_manifest.len(),
            manifest.sources.unique,
            manifest.sources.total
        );
        if !manifest.async_tasks.is_empty() {
            println!(
                "{} async task(s) pending; poll with `librarium status --wait`",
                manifest.async_tasks.len()
            );
        }
    }

    Ok(exit_code)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> Config {
        serde_json::from_str(
            r#"{
                "providers": {
                    "brave-search": {},
                    "exa-search": {"enabled": false},
                    "tavily-search": {}
                },
                "groups": {
                    "fast": ["brave-search", "tavily-search"],
                    "empty": []
                }
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn explicit_providers_win() {
        let selection = resolve_selection(
            &config(),
            Some(&["exa-search".into(), " brave-search ".into()]),
            Some("fast"),
        )
        .unwrap();
        assert_eq!(selection, vec!["exa-search", "brave-search"]);
    }

    #[test]
    fn group_selection() {
        let selection = resolve_selection(&config(), None, Some("fast")).unwrap();
        assert_eq!(selection, vec!["brave-search", "tavily-search"]);
    }

    #[test]
    fn unknown_or_empty_group_fails() {
        assert!(resolve_selection(&config(), None, Some("nope"))
            .unwrap_err()
            .contains("unknown group"));
        assert!(resolve_selection(&config(), None, Some("empty"))
            .unwrap_err()
            .contains("empty"));
    }

    #[test]
    fn default_selection_is_enabled_providers() {
        let selection = resolve_selection(&config(), None, None).unwrap();
        // exa-search is disabled; BTreeMap order for the rest
        assert_eq!(selection, vec!["brave-search", "tavily-search"]);
    }

    #[test]
    fn empty_config_has_no_default_selection() {
        let error = resolve_selection(&Config::default(), None, None).unwrap_err();
        assert!(error.contains("no providers configured"));
    }
}
