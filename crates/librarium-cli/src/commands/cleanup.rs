//! `librarium cleanup` — delete old run directories.
//!
//! Age comes from the directory name's epoch-seconds prefix (the run
//! layout guarantees one), falling back to filesystem mtime for foreign
//! directories. Directories still holding live async handles are kept
//! unless `--force`.

use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::Args;
use librarium_core::TaskStatus;
use librarium_runtime::tasks::TaskStore;
use librarium_settings::{CliOverrides, load_config};

/// Arguments of `librarium cleanup`.
#[derive(Args, Debug)]
pub struct CleanupArgs {
    /// Delete runs older than this many days.
    #[arg(long, default_value_t = 30)]
    pub days: u64,

    /// Report what would be deleted without deleting.
    #[arg(long)]
    pub dry_run: bool,

    /// Delete even directories with live async handles.
    #[arg(long)]
    pub force: bool,

    /// Output root to clean (overrides defaults.outputDir).
    #[arg(short, long)]
    pub output: Option<String>,

    /// Print the result as JSON on stdout.
    #[arg(long)]
    pub json: bool,
}

/// Epoch seconds a run directory was created at, from its name prefix
/// (`<epoch>-<slug>`), else from mtime.
fn run_dir_timestamp(dir: &Path) -> Option<i64> {
    let name = dir.file_name()?.to_string_lossy();
    let prefix = name.split('-').next()?;
    if let Ok(timestamp) = prefix.parse::<i64>() {
        return Some(timestamp);
    }
    let modified = dir.metadata().ok()?.modified().ok()?;
    let since_epoch = modified.duration_since(std::time::UNIX_EPOCH).ok()?;
    Some(since_epoch.as_secs() as i64)
}

fn has_live_handles(dir: &Path) -> bool {
    TaskStore::new(dir).load().is_ok_and(|handles| {
        handles
            .iter()
            .any(|h| matches!(h.status, TaskStatus::Pending | TaskStatus::Running))
    })
}

pub fn run(args: &CleanupArgs, cwd: &Path) -> Result<i32> {
    let overrides = CliOverrides {
        output_dir: args.output.clone(),
        ..CliOverrides::default()
    };
    let config = load_config(cwd, &overrides)?;
    let base = cwd.join(&config.defaults.output_dir);

    let cutoff = chrono::Utc::now().timestamp() - (args.days as i64) * 86_400;

    let mut removed: Vec<PathBuf> = Vec::new();
    let mut kept_live: Vec<PathBuf> = Vec::new();

    if let Ok(entries) = std::fs::read_dir(&base) {
        let mut dirs: Vec<PathBuf> = entries
            .filter_map(std::result::Result::ok)
            .map(|e| e.path())
            .filter(|p| p.is_dir())
            .collect();
        dirs.sort();

        for dir in dirs {
            let Some(timestamp) = run_dir_timestamp(&dir) else {
                continue;
            };
            if timestamp >= cutoff {
                continue;
            }
            if !args.force && has_live_handles(&dir) {
                kept_live.push(dir);
                continue;
            }
            if !args.dry_run {
                if let Err(error) = std::fs::remove_dir_all(&dir) {
                    tracing::warn!(dir = %dir.display(), error = %error, "cannot remove run directory");
                    continue;
                }
            }
            removed.push(dir);
        }
    }

    if args.json {
        println!(
            "{}",
            serde_json::json!({
                "dryRun": args.dry_run,
                "removed": removed,
                "keptWithLiveTasks": kept_live,
            })
        );
    } else {
        let verb = if args.dry_run { "would remove" } else { "removed" };
        println!("{verb} {} run director{}", removed.len(), plural_y(removed.len()));
        for dir in &removed {
            println!("  {}", dir.display());
        }
        if !kept_live.is_empty() {
            println!(
                "kept {} director{} with live async tasks (use --force to delete)",
                kept_live.len(),
                plural_y(kept_live.len())
            );
        }
    }
    Ok(0)
}

fn plural_y(n: usize) -> &'static str {
    if n == 1 { "y" } else { "ies" }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
