//! `librarium status` — show, poll, or retrieve pending async tasks.

use std::path::Path;
use std::time::Duration;

use anyhow::Result;
use clap::Args;
use librarium_runtime::tasks::{PollOptions, TaskStore, poll_store, scan_output_root};
use librarium_settings::CliOverrides;
use tokio_util::sync::CancellationToken;

use crate::bootstrap;

/// Arguments of `librarium status`.
#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Poll until every task settles (bounded by defaults.asyncTimeout),
    /// then retrieve.
    #[arg(long)]
    pub wait: bool,

    /// Retrieve already-completed tasks without waiting for the rest.
    #[arg(long)]
    pub retrieve: bool,

    /// Output root to scan (overrides defaults.outputDir).
    #[arg(short, long)]
    pub output: Option<String>,

    /// Print handles as JSON on stdout.
    #[arg(long)]
    pub json: bool,
}

pub async fn run(args: StatusArgs, cwd: &Path, cancel: CancellationToken) -> Result<i32> {
    let overrides = CliOverrides {
        output_dir: args.output.clone(),
        ..CliOverrides::default()
    };
    let boot = bootstrap::initialize(cwd, &overrides).await?;
    let base = cwd.join(&boot.config.defaults.output_dir);

    let found = scan_output_root(&base);
    if found.is_empty() {
        if args.json {
            println!("[]");
        } else {
            println!("no pending async tasks under {}", base.display());
        }
        return Ok(0);
    }

    if args.wait || args.retrieve {
        // --retrieve without --wait: a zero-budget pass that skips
        // polling and goes straight to retrieval of completed handles
        let overall_timeout = if args.wait {
            Duration::from_secs(boot.config.defaults.async_timeout)
        } else {
            Duration::ZERO
        };

        let mut retrieved = 0usize;
        let mut left = 0usize;
        for (dir, _) in &found {
            let store = TaskStore::new(dir);
            let options = PollOptions {
                poll_interval: Duration::from_secs(
                    boot.config.defaults.async_poll_interval.max(1),
                ),
                overall_timeout,
                cancellation: cancel.clone(),
            };
            let results = poll_store(&boot.registry, &store, &options).await?;
            retrieved += results.iter().filter(|r| r.response.is_some()).count();
            left += store.load()?.len();
            if cancel.is_cancelled() {
                break;
            }
        }

        if args.json {
            println!(
                "{}",
                serde_json::json!({"retrieved": retrieved, "remaining": left})
            );
        } else {
            println!("{retrieved} task(s) retrieved, {left} still pending");
        }
        return Ok(0);
    }

    // Listing only
    if args.json {
        let handles: Vec<_> = found.iter().flat_map(|(_, handles)| handles).collect();
        println!("{}", serde_json::to_string_pretty(&handles)?);
    } else {
        for (dir, handles) in &found {
            println!("{}:", dir.display());
            for handle in handles {
                println!(
                    "  {} task {} [{}]",
                    handle.provider, handle.task_id, handle.status
                );
            }
        }
        println!("\npoll with `librarium status --wait`");
    }
    Ok(0)
}
