//! Legacy provider-id migration and fallback validation.
//!
//! Both run as part of config loading and only ever warn: a stale id or a
//! dubious fallback reference must not stop a run.

use librarium_core::ids::{LEGACY_PROVIDER_IDS, canonical_id, is_builtin_id};
use tracing::warn;

use crate::types::Config;

/// Rewrite known legacy provider ids to their canonical forms.
///
/// Provider keys, group members, and fallback targets are rewritten; each
/// rewrite emits one warning. When both a legacy and its canonical id are
/// configured, the canonical entry wins and the legacy entry is dropped.
///
/// Returns the warning messages for callers that surface them.
pub fn migrate_legacy_ids(config: &mut Config) -> Vec<String> {
    let mut warnings = Vec::new();

    for (legacy, canonical) in LEGACY_PROVIDER_IDS {
        // Provider keys
        if let Some(entry) = config.providers.remove(*legacy) {
            if config.providers.contains_key(*canonical) {
                push_warning(
                    &mut warnings,
                    format!(
                        "both \"{legacy}\" and \"{canonical}\" are configured; using \"{canonical}\""
                    ),
                );
            } else {
                let _ = config.providers.insert((*canonical).to_string(), entry);
                push_warning(
                    &mut warnings,
                    format!("provider id \"{legacy}\" is deprecated; migrated to \"{canonical}\""),
                );
            }
        }

        // Fallback targets
        for (id, entry) in &mut config.providers {
            if entry.fallback.as_deref() == Some(*legacy) {
                entry.fallback = Some((*canonical).to_string());
                push_warning(
                    &mut warnings,
                    format!(
                        "fallback \"{legacy}\" for \"{id}\" is deprecated; migrated to \"{canonical}\""
                    ),
                );
            }
        }
    }

    // Group members (one warning per rewritten group)
    for (name, members) in &mut config.groups {
        let mut rewritten = false;
        for member in members.iter_mut() {
            if let Some(canonical) = canonical_id(member) {
                *member = canonical.to_string();
                rewritten = true;
            }
        }
        if rewritten {
            // Collapse duplicates introduced by the rewrite
            let mut seen = std::collections::BTreeSet::new();
            members.retain(|m| seen.insert(m.clone()));
            push_warning(
                &mut warnings,
                format!("group \"{name}\" contained deprecated provider ids; migrated"),
            );
        }
    }

    warnings
}

/// Validate fallback references, warning (never failing) on:
/// self-reference, unknown target, and a target that itself has a
/// fallback (chains are not followed).
pub fn validate_fallbacks(config: &Config) -> Vec<String> {
    let mut warnings = Vec::new();

    for (id, entry) in &config.providers {
        let Some(fallback) = entry.fallback.as_deref() else {
            continue;
        };

        if fallback == id {
            push_warning(
                &mut warnings,
                format!("provider \"{id}\" lists itself as fallback"),
            );
            continue;
        }

        let known = is_builtin_id(fallback)
            || canonical_id(fallback).is_some()
            || config.custom_providers.contains_key(fallback);
        if !known {
            push_warning(
                &mut warnings,
                format!("provider \"{id}\" has unknown fallback \"{fallback}\""),
            );
            continue;
        }

        if config
            .providers
            .get(fallback)
            .is_some_and(|target| target.fallback.is_some())
        {
            push_warning(
                &mut warnings,
                format!(
                    "fallback \"{fallback}\" of \"{id}\" has its own fallback, which will not be followed"
                ),
            );
        }
    }

    warnings
}

fn push_warning(warnings: &mut Vec<String>, message: String) {
    warn!("{message}");
    warnings.push(message);
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
