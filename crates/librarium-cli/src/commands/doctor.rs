//! `librarium doctor` — diagnose configuration, keys, and connectivity.

use std::path::Path;

use anyhow::Result;
use clap::Args;
use librarium_settings::{
    CliOverrides, global_config_path, project_config_path, resolve_api_key,
};

use crate::bootstrap;

/// Arguments of `librarium doctor`.
#[derive(Args, Debug)]
pub struct DoctorArgs {
    /// Skip provider self-tests (no network traffic).
    #[arg(long)]
    pub offline: bool,
}

pub async fn run(args: &DoctorArgs, cwd: &Path) -> Result<i32> {
    let boot = bootstrap::initialize(cwd, &CliOverrides::default()).await?;

    println!("install method: {} ({})", boot.install.label(), boot.install.upgrade_hint());

    let global = global_config_path();
    println!(
        "global config:  {} ({})",
        global.display(),
        if global.exists() { "present" } else { "missing" }
    );
    let project = project_config_path(cwd);
    println!(
        "project config: {} ({})",
        project.display(),
        if project.exists() { "present" } else { "missing" }
    );
    println!();

    println!("providers:");
    for id in boot.registry.ids() {
        let Some(provider) = boot.registry.get(id) else {
            continue;
        };
        let descriptor = provider.descriptor();
        let entry = boot.config.provider(&descriptor.id);

        let state = match entry {
            None => "not configured".to_string(),
            Some(entry) if !entry.enabled => "disabled".to_string(),
            Some(entry) => {
                let keyed = !descriptor.requires_api_key
                    || resolve_api_key(entry.api_key.as_deref(), &descriptor.env_var).is_some();
                if keyed {
                    "ready".to_string()
                } else {
                    format!("missing key ({})", descriptor.env_var)
                }
            }
        };

        let mut line = format!(
            "  {} [{}] ({}): {state}",
            descriptor.id,
            descriptor.tier,
            descriptor.source_label()
        );

        // Connectivity check only where it can possibly pass
        if !args.offline && state == "ready" && descriptor.capabilities.test {
            match provider.test().await {
                Ok(outcome) if outcome.ok => line.push_str(" — test passed"),
                Ok(outcome) => line.push_str(&format!(
                    " — test failed: {}",
                    outcome.error.unwrap_or_default()
                )),
                Err(error) => line.push_str(&format!(" — test failed: {error}")),
            }
        }
        println!("{line}");
    }

    if !boot.config.custom_providers.is_empty() {
        println!();
        println!("custom providers:");
        for (id, spec) in &boot.config.custom_providers {
            let trusted = boot.config.trusted_provider_ids.contains(id);
            let loaded = boot.registry.contains(id);
            println!(
                "  {id} ({:?}): {}",
                spec.kind,
                match (trusted, loaded) {
                    (false, _) => "untrusted (add to trustedProviderIds to load)",
                    (true, true) => "loaded",
                    (true, false) => "trusted but failed to load (see warnings)",
                }
            );
        }
    }

    Ok(0)
}

/// Human label for the descriptor source (avoids Debug formatting).
trait SourceLabel {
    fn source_label(&self) -> &'static str;
}

impl SourceLabel for librarium_core::ProviderDescriptor {
    fn source_label(&self) -> &'static str {
        match self.source {
            librarium_core::ProviderSource::Builtin => "builtin",
            librarium_core::ProviderSource::Npm => "npm",
            librarium_core::ProviderSource::Script => "script",
        }
    }
}
