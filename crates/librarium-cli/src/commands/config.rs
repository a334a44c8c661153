//! `librarium config` — print the resolved (or global) configuration.
//!
//! Output is always key-redacted: literal API keys are masked, env-refs
//! stay as `$NAME` references.

use std::path::Path;

use anyhow::{Context, Result};
use clap::Args;
use librarium_settings::{CliOverrides, Config, global_config_path, load_config};

/// Arguments of `librarium config`.
#[derive(Args, Debug)]
pub struct ConfigArgs {
    /// Show the global file's contents instead of the merged view.
    #[arg(long)]
    pub global: bool,

    /// Print JSON only (no path header).
    #[arg(long)]
    pub json: bool,
}

pub fn run(args: &ConfigArgs, cwd: &Path) -> Result<i32> {
    let config = if args.global {
        let path = global_config_path();
        if !path.exists() {
            if args.json {
                println!("{}", serde_json::to_string_pretty(&Config::default())?);
            } else {
                println!("{} does not exist; showing defaults", path.display());
                println!("{}", serde_json::to_string_pretty(&Config::default().redacted())?);
            }
            return Ok(0);
        }
        let body = std::fs::read_to_string(&path)
            .with_context(|| format!("cannot read {}", path.display()))?;
        let config: Config = serde_json::from_str(&body)
            .with_context(|| format!("invalid config in {}", path.display()))?;
        if !args.json {
            println!("# {}", path.display());
        }
        config
    } else {
        let config = load_config(cwd, &CliOverrides::default())?;
        if !args.json {
            println!("# merged: defaults <- global <- project");
        }
        config
    };

    println!("{}", serde_json::to_string_pretty(&config.redacted())?);
    Ok(0)
}
