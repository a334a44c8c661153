//! Custom-provider loading with the trust gate.
//!
//! Walks `customProviders`, skipping (with a warning, never an error)
//! anything untrusted, colliding with a built-in id, unresolvable, or
//! failing its `describe` call. What survives comes back as ready
//! [`ScriptProvider`]s for registration.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use librarium_core::ids::{canonical_id, is_builtin_id};
use librarium_core::{Capabilities, ProviderDescriptor, ProviderSource};
use librarium_providers::provider::Provider;
use librarium_settings::{Config, CustomProviderSpec, CustomProviderType};
use serde_json::Value;
use tracing::warn;

use crate::errors::PluginError;
use crate::install::InstallMethod;
use crate::ipc::{DEFAULT_OPERATION_TIMEOUT, IpcCommand, run_once};
use crate::node::{node_command, resolve_module};
use crate::protocol::{Operation, PluginRequest, parse_response, validate_describe};
use crate::script::ScriptProvider;

/// Load every trusted, valid custom provider from `config`.
///
/// Never fails: each problem entry is skipped with a warning so one bad
/// plugin cannot take down the run.
pub async fn load_custom_providers(
    config: &Config,
    project_dir: &Path,
    install: &InstallMethod,
) -> Vec<Arc<dyn Provider>> {
    let mut providers: Vec<Arc<dyn Provider>> = Vec::new();

    for (id, spec) in &config.custom_providers {
        if !config.trusted_provider_ids.contains(id) {
            warn!(provider = %id, "custom provider is not in trustedProviderIds, skipping");
            continue;
        }
        if is_builtin_id(id) || canonical_id(id).is_some() {
            warn!(provider = %id, "custom provider id collides with a built-in id, skipping");
            continue;
        }

        let Some(command) = spawn_recipe(id, spec, project_dir, install) else {
            continue;
        };

        match describe(id, spec, &command).await {
            Ok(descriptor) => {
                let provider_config = config
                    .providers
                    .get(id)
                    .and_then(|entry| serde_json::to_value(entry).ok());
                providers.push(Arc::new(ScriptProvider::new(
                    descriptor,
                    command,
                    provider_config,
                    spec.options.clone(),
                )));
            }
            Err(error) => {
                warn!(provider = %id, error = %error, "custom provider describe failed, skipping");
            }
        }
    }

    providers
}

/// Work out how to spawn this entry, or warn and skip.
fn spawn_recipe(
    id: &str,
    spec: &CustomProviderSpec,
    project_dir: &Path,
    install: &InstallMethod,
) -> Option<IpcCommand> {
    let cwd = spec.cwd.as_ref().map(|cwd| {
        let path = PathBuf::from(cwd);
        if path.is_absolute() {
            path
        } else {
            project_dir.join(path)
        }
    });

    match spec.kind {
        CustomProviderType::Script => {
            let Some(command) = spec.command.clone().filter(|c| !c.is_empty()) else {
                warn!(provider = %id, "script custom provider has no command, skipping");
                return None;
            };
            Some(IpcCommand {
                command,
                args: spec.args.clone(),
                env: spec.env.clone(),
                cwd,
            })
        }
        CustomProviderType::Npm => {
            if !install.allows_node_modules() {
                warn!(
                    provider = %id,
                    install = install.label(),
                    "npm custom providers are unavailable under this install method, skipping"
                );
                return None;
            }
            let Some(module) = spec.module.clone().filter(|m| !m.is_empty()) else {
                warn!(provider = %id, "npm custom provider has no module, skipping");
                return None;
            };
            let Some(entry) = resolve_module(&module, project_dir, install) else {
                warn!(provider = %id, module = %module, "cannot resolve module, skipping");
                return None;
            };
            Some(node_command(&entry, spec.env.clone(), cwd))
        }
    }
}

/// Run the one-time `describe` call and build the descriptor.
async fn describe(
    id: &str,
    spec: &CustomProviderSpec,
    command: &IpcCommand,
) -> Result<ProviderDescriptor, PluginError> {
    let request = PluginRequest {
        source_options: spec.options.clone(),
        ..PluginRequest::bare(Operation::Describe, id)
    };
    let body = serde_json::to_string(&request).map_err(|e| PluginError::Schema {
        message: format!("request serialization: {e}"),
    })?;
    let raw = run_once(command, "describe", &body, DEFAULT_OPERATION_TIMEOUT, None).await?;
    let data: Value = parse_response(&raw)?;
    let describe = validate_describe(id, &data)?;

    Ok(ProviderDescriptor {
        id: id.to_string(),
        display_name: describe.display_name,
        tier: describe.tier,
        env_var: describe.env_var.unwrap_or_default(),
        source: match spec.kind {
            CustomProviderType::Npm => ProviderSource::Npm,
            CustomProviderType::Script => ProviderSource::Script,
        },
        requires_api_key: describe.requires_api_key.unwrap_or(true),
        capabilities: Capabilities {
            execute: true,
            submit: describe.capabilities.submit,
            poll: describe.capabilities.poll,
            retrieve: describe.capabilities.retrieve,
            test: describe.capabilities.test,
        },
    })
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
