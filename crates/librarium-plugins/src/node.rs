//! Node-module custom providers.
//!
//! The `npm` loader variant does not embed a JavaScript engine. Instead
//! the configured module is resolved on disk (invoking project first,
//! then the runtime's own install tree) and driven through a generated
//! Node bootstrap that speaks the same stdio envelope as script
//! providers, one process per operation. The imported value may be a
//! provider object or a factory taking `{id, config, sourceOptions}`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::install::InstallMethod;
use crate::ipc::IpcCommand;

/// The bootstrap every `npm` provider operation runs through.
///
/// Reads one request envelope from stdin, imports the module given as
/// `process.argv[1]`, unwraps a default export or factory, dispatches the
/// operation, and writes one response envelope to stdout. `describe` is
/// synthesized from the provider object's fields and function presence.
const NODE_BOOTSTRAP: &str = r#"
import { pathToFileURL } from 'node:url';

const chunks = [];
for await (const chunk of process.stdin) chunks.push(chunk);
const req = JSON.parse(Buffer.concat(chunks).toString('utf8'));
const reply = (payload) => process.stdout.write(JSON.stringify(payload));

try {
  const mod = await import(pathToFileURL(process.argv[1]).href);
  let provider = mod.default ?? mod.provider ?? mod;
  if (typeof provider === 'function') {
    provider = await provider({
      id: req.providerId,
      config: req.providerConfig,
      sourceOptions: req.sourceOptions,
    });
  }

  if (req.operation === 'describe') {
    reply({
      ok: true,
      data: {
        id: provider.id,
        displayName: provider.displayName ?? req.providerId,
        tier: provider.tier ?? 'raw-search',
        envVar: provider.envVar,
        requiresApiKey: provider.requiresApiKey,
        capabilities: {
          execute: typeof provider.execute === 'function',
          submit: typeof provider.submit === 'function',
          poll: typeof provider.poll === 'function',
          retrieve: typeof provider.retrieve === 'function',
          test: typeof provider.test === 'function',
        },
      },
    });
  } else {
    const operation = provider[req.operation];
    if (typeof operation !== 'function') {
      throw new Error(`operation ${req.operation} not implemented`);
    }
    const args =
      req.operation === 'poll' || req.operation === 'retrieve'
        ? [req.handle]
        : req.operation === 'test'
          ? []
          : [req.query, { ...(req.options ?? {}), config: req.providerConfig, sourceOptions: req.sourceOptions }];
    const data = await operation.call(provider, ...args);
    reply({ ok: true, data });
  }
} catch (err) {
  reply({ ok: false, error: String(err?.message ?? err) });
}
"#;

/// Resolve a module specifier to an importable entry file.
///
/// Relative and absolute specifiers resolve against the project
/// directory. Bare specifiers walk `node_modules` directories upward
/// from the invoking project, then try the runtime's npm install tree
/// when there is one. Returns `None` when nothing matches.
#[must_use]
pub fn resolve_module(
    specifier: &str,
    project_dir: &Path,
    install: &InstallMethod,
) -> Option<PathBuf> {
    // Path specifiers bypass node_modules entirely
    if specifier.starts_with("./") || specifier.starts_with("../") || specifier.starts_with('/') {
        let candidate = if Path::new(specifier).is_absolute() {
            PathBuf::from(specifier)
        } else {
            project_dir.join(specifier)
        };
        return candidate.exists().then_some(candidate);
    }

    // Invoking project first
    let mut dir = Some(project_dir);
    while let Some(current) = dir {
        if let Some(entry) = package_entry(&current.join("node_modules").join(specifier)) {
            return Some(entry);
        }
        dir = current.parent();
    }

    // Then the runtime's own install tree
    if let InstallMethod::Npm { package_root } = install {
        if let Some(entry) = package_entry(&package_root.join("node_modules").join(specifier)) {
            return Some(entry);
        }
        // Sibling packages in the same global tree
        if let Some(parent) = package_root.parent() {
            if let Some(entry) = package_entry(&parent.join(specifier)) {
                return Some(entry);
            }
        }
    }

    None
}

/// The entry file of a package directory: `package.json`'s `main`, else
/// `index.js`.
fn package_entry(package_dir: &Path) -> Option<PathBuf> {
    if !package_dir.is_dir() {
        return None;
    }
    let manifest_path = package_dir.join("package.json");
    let main = std::fs::read_to_string(&manifest_path)
        .ok()
        .and_then(|body| serde_json::from_str::<serde_json::Value>(&body).ok())
        .and_then(|manifest| {
            manifest
                .get("main")
                .and_then(serde_json::Value::as_str)
                .map(String::from)
        })
        .unwrap_or_else(|| "index.js".into());

    let entry = package_dir.join(main);
    entry.exists().then_some(entry)
}

/// The spawn recipe driving `entry` through the Node bootstrap.
#[must_use]
pub fn node_command(entry: &Path, env: BTreeMap<String, String>, cwd: Option<PathBuf>) -> IpcCommand {
    IpcCommand {
        command: "node".into(),
        args: vec![
            "--input-type=module".into(),
            "-e".into(),
            NODE_BOOTSTRAP.into(),
            entry.to_string_lossy().into_owned(),
        ],
        env,
        cwd,
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
