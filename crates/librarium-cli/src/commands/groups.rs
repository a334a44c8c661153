//! `librarium groups` — show or edit named provider groups.
//!
//! Groups live in the global config (the project file only overrides
//! `defaults`), so edits always write the global file.

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use librarium_core::ids::{canonical_id, is_builtin_id};
use librarium_settings::{
    CliOverrides, Config, global_config_path, load_config_from_paths, save_config,
};
use tracing::warn;

/// Arguments of `librarium groups`.
#[derive(Args, Debug)]
pub struct GroupsArgs {
    #[command(subcommand)]
    pub command: Option<GroupsCommand>,
}

#[derive(Subcommand, Debug)]
pub enum GroupsCommand {
    /// Create or replace a group.
    Add {
        /// Group name.
        name: String,
        /// Member provider ids.
        #[arg(required = true)]
        ids: Vec<String>,
    },
    /// Delete a group.
    Remove {
        /// Group name.
        name: String,
    },
}

pub fn run(args: GroupsArgs) -> Result<i32> {
    let global_path = global_config_path();

    match args.command {
        None => {
            // Listing reads the fully merged view (migrations applied)
            let config = load_config_from_paths(
                &global_path,
                std::path::Path::new("/nonexistent"),
                &CliOverrides::default(),
            )?;
            if config.groups.is_empty() {
                println!("no groups defined; add one with `librarium groups add <name> <ids...>`");
                return Ok(0);
            }
            for (name, members) in &config.groups {
                println!("{name}: {}", members.join(", "));
            }
            Ok(0)
        }
        Some(GroupsCommand::Add { name, ids }) => {
            let mut config = load_global_only(&global_path)?;
            for id in &ids {
                let known = is_builtin_id(id)
                    || canonical_id(id).is_some()
                    || config.custom_providers.contains_key(id);
                if !known {
                    warn!(provider = %id, "group member is not a known provider id");
                }
            }
            let _ = config.groups.insert(name.clone(), ids.clone());
            save_config(&global_path, &config)
                .with_context(|| format!("cannot write {}", global_path.display()))?;
            println!("group \"{name}\" = {}", ids.join(", "));
            Ok(0)
        }
        Some(GroupsCommand::Remove { name }) => {
            let mut config = load_global_only(&global_path)?;
            if config.groups.remove(&name).is_none() {
                eprintln!("error: unknown group \"{name}\"");
                return Ok(2);
            }
            save_config(&global_path, &config)
                .with_context(|| format!("cannot write {}", global_path.display()))?;
            println!("removed group \"{name}\"");
            Ok(0)
        }
    }
}

/// The global file alone (no project layer, no migrations), so edits
/// round-trip without rewriting unrelated entries.
fn load_global_only(path: &std::path::Path) -> Result<Config> {
    if !path.exists() {
        return Ok(Config::default());
    }
    let body = std::fs::read_to_string(path)
        .with_context(|| format!("cannot read {}", path.display()))?;
    serde_json::from_str(&body).with_context(|| format!("invalid config in {}", path.display()))
}
