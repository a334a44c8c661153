//! `librarium init` — create starter configuration.
//!
//! Writes a project `.librarium.json` carrying only `defaults`, and with
//! `--auto` also seeds the global config with entries for every built-in
//! provider whose API key is already present in the environment.

use std::path::Path;

use anyhow::{Context, Result};
use clap::Args;
use librarium_core::ids::BUILTIN_PROVIDER_IDS;
use librarium_settings::{
    Config, Defaults, ProviderEntry, global_config_path, project_config_path, save_config,
};

/// Arguments of `librarium init`.
#[derive(Args, Debug)]
pub struct InitArgs {
    /// Also enable every built-in provider whose environment key is set.
    #[arg(long)]
    pub auto: bool,
}

/// The environment variable each built-in provider reads.
fn env_var_for(id: &str) -> &'static str {
    match id {
        "perplexity-sonar-pro" | "perplexity-deep-research" => "PERPLEXITY_API_KEY",
        "openai-deep-research" => "OPENAI_API_KEY",
        "anthropic-research" => "ANTHROPIC_API_KEY",
        "gemini-grounded" => "GEMINI_API_KEY",
        "brave-search" => "BRAVE_API_KEY",
        "tavily-search" => "TAVILY_API_KEY",
        "exa-search" => "EXA_API_KEY",
        _ => "",
    }
}

pub fn run(args: &InitArgs, cwd: &Path) -> Result<i32> {
    let project_path = project_config_path(cwd);
    if project_path.exists() {
        println!("{} already exists, leaving it alone", project_path.display());
    } else {
        let mut project = serde_json::Map::new();
        let _ = project.insert("version".into(), serde_json::json!(1));
        let _ = project.insert(
            "defaults".into(),
            serde_json::to_value(Defaults::default())?,
        );
        std::fs::write(
            &project_path,
            serde_json::to_string_pretty(&serde_json::Value::Object(project))?,
        )
        .with_context(|| format!("cannot write {}", project_path.display()))?;
        println!("wrote {}", project_path.display());
    }

    if args.auto {
        let global_path = global_config_path();
        let mut config: Config = if global_path.exists() {
            let body = std::fs::read_to_string(&global_path)
                .with_context(|| format!("cannot read {}", global_path.display()))?;
            serde_json::from_str(&body)
                .with_context(|| format!("invalid config in {}", global_path.display()))?
        } else {
            Config::default()
        };

        let mut detected = Vec::new();
        for id in BUILTIN_PROVIDER_IDS {
            let env_var = env_var_for(id);
            let present = !env_var.is_empty()
                && std::env::var(env_var).is_ok_and(|v| !v.is_empty());
            if present && !config.providers.contains_key(*id) {
                let _ = config
                    .providers
                    .insert((*id).to_string(), ProviderEntry::with_env_ref(env_var));
                detected.push(*id);
            }
        }

        if detected.is_empty() {
            println!("no new provider keys detected in the environment");
        } else {
            save_config(&global_path, &config)
                .with_context(|| format!("cannot write {}", global_path.display()))?;
            println!(
                "enabled {} provider(s) in {}: {}",
                detected.len(),
                global_path.display(),
                detected.join(", ")
            );
        }
    } else {
        println!("run `librarium init --auto` to enable providers from environment keys");
    }

    Ok(0)
}
