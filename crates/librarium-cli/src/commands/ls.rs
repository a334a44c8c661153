//! `librarium ls` — list past runs.

use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::Args;
use librarium_core::ReportStatus;
use librarium_runtime::artifacts::read_manifest;
use librarium_settings::{CliOverrides, load_config};

/// Arguments of `librarium ls`.
#[derive(Args, Debug)]
pub struct LsArgs {
    /// Output root to list (overrides defaults.outputDir).
    #[arg(short, long)]
    pub output: Option<String>,

    /// Print manifests as JSON on stdout.
    #[arg(long)]
    pub json: bool,
}

pub fn run(args: &LsArgs, cwd: &Path) -> Result<i32> {
    let overrides = CliOverrides {
        output_dir: args.output.clone(),
        ..CliOverrides::default()
    };
    let config = load_config(cwd, &overrides)?;
    let base = cwd.join(&config.defaults.output_dir);

    let mut dirs: Vec<PathBuf> = match std::fs::read_dir(&base) {
        Ok(entries) => entries
            .filter_map(std::result::Result::ok)
            .map(|e| e.path())
            .filter(|p| p.is_dir())
            .collect(),
        Err(_) => {
            println!("no runs under {}", base.display());
            return Ok(0);
        }
    };
    // Timestamp-prefixed names sort chronologically; newest first
    dirs.sort();
    dirs.reverse();

    if args.json {
        let manifests: Vec<_> = dirs
            .iter()
            .filter_map(|dir| read_manifest(dir).ok())
            .collect();
        println!("{}", serde_json::to_string_pretty(&manifests)?);
        return Ok(0);
    }

    if dirs.is_empty() {
        println!("no runs under {}", base.display());
        return Ok(0);
    }

    for dir in &dirs {
        let name = dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        match read_manifest(dir) {
            Ok(manifest) => {
                let succeeded = manifest
                    .providers
                    .iter()
                    .filter(|r| r.status == ReportStatus::Success)
                    .count();
                let pending = manifest.async_tasks.len();
                let pending_note = if pending > 0 {
                    format!(", {pending} async pending")
                } else {
                    String::new()
                };
                println!(
                    "{name}  \"{}\"  ({succeeded}/{} succeeded, {} sources{pending_note})",
                    manifest.query,
                    manifest.providers.len(),
                    manifest.sources.unique,
                );
            }
            Err(_) => println!("{name}  (no run.json)"),
        }
    }
    Ok(0)
}
