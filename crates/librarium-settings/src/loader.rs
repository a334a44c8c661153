//! Config loading: layer merge, env-ref resolution, atomic-ish save.
//!
//! Layering:
//! 1. Compiled [`Config::default()`]
//! 2. Global file (full schema, deep-merged over defaults)
//! 3. Project file `.librarium.json` (its `defaults` section only)
//! 4. CLI overrides (`defaults` fields only)
//!
//! Deep merge rules (objects merge per-key, arrays and primitives are
//! replaced, nulls preserve the target) match the rest of the on-disk
//! JSON in this system.

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::debug;

use librarium_core::DispatchMode;

use crate::errors::SettingsError;
use crate::migrate::{migrate_legacy_ids, validate_fallbacks};
use crate::types::Config;

/// Project config file name, looked up in the working directory.
pub const PROJECT_CONFIG_FILE: &str = ".librarium.json";

/// CLI-level overrides applied on top of the file layers.
#[derive(Clone, Debug, Default)]
pub struct CliOverrides {
    /// `-o/--output`.
    pub output_dir: Option<String>,
    /// `--parallel`.
    pub max_parallel: Option<usize>,
    /// `--timeout` (seconds).
    pub timeout: Option<u64>,
    /// `-m/--mode`.
    pub mode: Option<DispatchMode>,
}

/// Resolve the global config path
/// (`$XDG_CONFIG_HOME/librarium/config.json`, else
/// `~/.config/librarium/config.json`).
#[must_use]
pub fn global_config_path() -> PathBuf {
    let base = std::env::var("XDG_CONFIG_HOME")
        .ok()
        .filter(|v| !v.is_empty())
        .map_or_else(
            || {
                let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
                PathBuf::from(home).join(".config")
            },
            PathBuf::from,
        );
    base.join("librarium").join("config.json")
}

/// Resolve the project config path in `cwd`.
#[must_use]
pub fn project_config_path(cwd: &Path) -> PathBuf {
    cwd.join(PROJECT_CONFIG_FILE)
}

/// Load configuration from the default locations.
pub fn load_config(cwd: &Path, overrides: &CliOverrides) -> Result<Config, SettingsError> {
    load_config_from_paths(&global_config_path(), &project_config_path(cwd), overrides)
}

/// Load configuration from explicit file locations.
///
/// Missing files are fine (that layer contributes nothing); present but
/// invalid files fail with an error naming the offending path. Legacy
/// provider ids are rewritten and fallback references validated as part
/// of loading, both with warnings only.
pub fn load_config_from_paths(
    global_path: &Path,
    project_path: &Path,
    overrides: &CliOverrides,
) -> Result<Config, SettingsError> {
    let defaults = serde_json::to_value(Config::default())?;

    let mut merged = match read_json(global_path)? {
        Some(global) => {
            debug!(path = %global_path.display(), "loading global config");
            deep_merge(defaults, global)
        }
        None => defaults,
    };

    if let Some(project) = read_json(project_path)? {
        debug!(path = %project_path.display(), "loading project config");
        // Project files override the defaults section only
        if let Some(project_defaults) = project.get("defaults") {
            let base = merged
                .get("defaults")
                .cloned()
                .unwrap_or(Value::Object(serde_json::Map::new()));
            let merged_defaults = deep_merge(base, project_defaults.clone());
            if let Value::Object(map) = &mut merged {
                let _ = map.insert("defaults".into(), merged_defaults);
            }
        }
        // Validate the whole file anyway so schema errors surface with
        // the right path attached
        let _: Config = serde_json::from_value(project).map_err(|source| {
            SettingsError::Parse {
                path: project_path.to_path_buf(),
                source,
            }
        })?;
    }

    let mut config: Config =
        serde_json::from_value(merged).map_err(|source| SettingsError::Parse {
            path: global_path.to_path_buf(),
            source,
        })?;

    apply_overrides(&mut config, overrides);
    migrate_legacy_ids(&mut config);
    validate_fallbacks(&config);
    Ok(config)
}

/// Read and parse a JSON file, `None` when it does not exist.
fn read_json(path: &Path) -> Result<Option<Value>, SettingsError> {
    if !path.exists() {
        return Ok(None);
    }
    let content = std::fs::read_to_string(path).map_err(|source| SettingsError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let value = serde_json::from_str(&content).map_err(|source| SettingsError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(Some(value))
}

fn apply_overrides(config: &mut Config, overrides: &CliOverrides) {
    if let Some(output_dir) = &overrides.output_dir {
        config.defaults.output_dir.clone_from(output_dir);
    }
    if let Some(max_parallel) = overrides.max_parallel {
        config.defaults.max_parallel = max_parallel.max(1);
    }
    if let Some(timeout) = overrides.timeout {
        config.defaults.timeout = timeout.max(1);
    }
    if let Some(mode) = overrides.mode {
        config.defaults.mode = mode;
    }
}

/// Recursive deep merge of two JSON values.
///
/// - Objects are merged recursively (source overrides target per-key)
/// - Arrays and primitives are replaced entirely by source
/// - Null values in source are skipped (preserving target)
#[must_use]
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = if let Some(target_val) = target_map.remove(&key) {
                    deep_merge(target_val, source_val)
                } else {
                    source_val
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Write a config file with user-only permissions (`0600` on Unix),
/// creating parent directories as needed.
///
/// API keys configured as env-refs stay env-refs; this function never
/// resolves them.
pub fn save_config(path: &Path, config: &Config) -> Result<(), SettingsError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|source| SettingsError::Io {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    let body = serde_json::to_string_pretty(config)?;
    std::fs::write(path, body).map_err(|source| SettingsError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600)).map_err(
            |source| SettingsError::Io {
                path: path.to_path_buf(),
                source,
            },
        )?;
    }

    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Env-ref resolution
// ─────────────────────────────────────────────────────────────────────────────

/// Resolve an opaque key string: `$NAME` reads the environment, anything
/// else is a literal. Empty results count as missing.
#[must_use]
pub fn resolve_env_ref(raw: &str) -> Option<String> {
    resolve_env_ref_with(raw, |name| std::env::var(name).ok())
}

/// [`resolve_env_ref`] against an explicit environment lookup
/// (testable without touching the process environment).
#[must_use]
pub fn resolve_env_ref_with(
    raw: &str,
    lookup: impl Fn(&str) -> Option<String>,
) -> Option<String> {
    let resolved = match raw.strip_prefix('$') {
        Some(name) => lookup(name)?,
        None => raw.to_string(),
    };
    Some(resolved).filter(|v| !v.is_empty())
}

/// Resolve the API key for a provider: the configured `apiKey` entry
/// first, else the descriptor's environment variable.
#[must_use]
pub fn resolve_api_key(configured: Option<&str>, env_var: &str) -> Option<String> {
    resolve_api_key_with(configured, env_var, |name| std::env::var(name).ok())
}

/// [`resolve_api_key`] against an explicit environment lookup.
#[must_use]
pub fn resolve_api_key_with(
    configured: Option<&str>,
    env_var: &str,
    lookup: impl Fn(&str) -> Option<String>,
) -> Option<String> {
    match configured {
        Some(raw) => resolve_env_ref_with(raw, lookup),
        None if env_var.is_empty() => None,
        None => lookup(env_var).filter(|v| !v.is_empty()),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn write(dir: &Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, body).unwrap();
        path
    }

    fn missing() -> PathBuf {
        PathBuf::from("/nonexistent/config.json")
    }

    // ── layering ────────────────────────────────────────────────────

    #[test]
    fn no_files_yields_defaults() {
        let config =
            load_config_from_paths(&missing(), &missing(), &CliOverrides::default()).unwrap();
        assert_eq!(config.defaults.max_parallel, 4);
        assert!(config.providers.is_empty());
    }

    #[test]
    fn global_file_merges_over_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let global = write(
            dir.path(),
            "config.json",
            r#"{"defaults": {"maxParallel": 8}, "providers": {"brave-search": {"apiKey": "$BRAVE_API_KEY"}}}"#,
        );

        let config =
            load_config_from_paths(&global, &missing(), &CliOverrides::default()).unwrap();
        assert_eq!(config.defaults.max_parallel, 8);
        assert_eq!(config.defaults.timeout, 300);
        assert!(config.providers.contains_key("brave-search"));
    }

    #[test]
    fn project_file_overrides_defaults_only() {
        let dir = tempfile::tempdir().unwrap();
        let global = write(
            dir.path(),
            "config.json",
            r#"{"defaults": {"maxParallel": 8}, "providers": {"brave-search": {}}}"#,
        );
        let project = write(
            dir.path(),
            ".librarium.json",
            r#"{"defaults": {"maxParallel": 2, "outputDir": "./research"},
                "providers": {"exa-search": {}}}"#,
        );

        let config =
            load_config_from_paths(&global, &project, &CliOverrides::default()).unwrap();
        assert_eq!(config.defaults.max_parallel, 2);
        assert_eq!(config.defaults.output_dir, "./research");
        // Providers are global-only: the project's exa entry is ignored
        assert!(config.providers.contains_key("brave-search"));
        assert!(!config.providers.contains_key("exa-search"));
    }

    #[test]
    fn cli_overrides_win() {
        let dir = tempfile::tempdir().unwrap();
        let project = write(
            dir.path(),
            ".librarium.json",
            r#"{"defaults": {"maxParallel": 2}}"#,
        );

        let overrides = CliOverrides {
            max_parallel: Some(16),
            timeout: Some(60),
            mode: Some(DispatchMode::Sync),
            output_dir: Some("/tmp/out".into()),
        };
        let config = load_config_from_paths(&missing(), &project, &overrides).unwrap();
        assert_eq!(config.defaults.max_parallel, 16);
        assert_eq!(config.defaults.timeout, 60);
        assert_eq!(config.defaults.mode, DispatchMode::Sync);
        assert_eq!(config.defaults.output_dir, "/tmp/out");
    }

    #[test]
    fn parse_error_names_offending_file() {
        let dir = tempfile::tempdir().unwrap();
        let global = write(dir.path(), "config.json", "not json at all");

        let error = load_config_from_paths(&global, &missing(), &CliOverrides::default())
            .unwrap_err();
        assert_matches!(&error, SettingsError::Parse { path, .. } if path.ends_with("config.json"));
        assert!(error.to_string().contains("config.json"));
    }

    #[test]
    fn schema_violation_in_project_file_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let project = write(
            dir.path(),
            ".librarium.json",
            r#"{"defaults": {"maxParallell": 2}}"#,
        );

        let error = load_config_from_paths(&missing(), &project, &CliOverrides::default())
            .unwrap_err();
        assert_matches!(&error, SettingsError::Parse { path, .. } if path.ends_with(".librarium.json"));
    }

    // ── deep_merge ──────────────────────────────────────────────────

    #[test]
    fn merge_nested_override() {
        let target = serde_json::json!({"defaults": {"timeout": 300, "maxParallel": 4}});
        let source = serde_json::json!({"defaults": {"timeout": 60}});
        let merged = deep_merge(target, source);
        assert_eq!(merged["defaults"]["timeout"], 60);
        assert_eq!(merged["defaults"]["maxParallel"], 4);
    }

    #[test]
    fn merge_arrays_replace() {
        let target = serde_json::json!({"groups": {"fast": ["a", "b"]}});
        let source = serde_json::json!({"groups": {"fast": ["c"]}});
        let merged = deep_merge(target, source);
        assert_eq!(merged["groups"]["fast"], serde_json::json!(["c"]));
    }

    #[test]
    fn merge_null_preserves_target() {
        let target = serde_json::json!({"a": 1});
        let source = serde_json::json!({"a": null});
        assert_eq!(deep_merge(target, source)["a"], 1);
    }

    // ── save_config ─────────────────────────────────────────────────

    #[test]
    fn save_creates_parents_and_restricts_permissions() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");
        save_config(&path, &Config::default()).unwrap();

        assert!(path.exists());
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(&path).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o600);
        }

        // Round-trips through the loader
        let config =
            load_config_from_paths(&path, &missing(), &CliOverrides::default()).unwrap();
        assert_eq!(config.version, 1);
    }

    // ── env-ref resolution ──────────────────────────────────────────

    #[test]
    fn env_ref_resolution() {
        let env = |name: &str| match name {
            "SET_KEY" => Some("resolved".to_string()),
            "EMPTY_KEY" => Some(String::new()),
            _ => None,
        };

        // Literal keys pass through; empty literals count as missing
        assert_eq!(
            resolve_env_ref_with("literal-key", env),
            Some("literal-key".into())
        );
        assert_eq!(resolve_env_ref_with("", env), None);

        // Env refs read the environment; empty or unset count as missing
        assert_eq!(resolve_env_ref_with("$SET_KEY", env), Some("resolved".into()));
        assert_eq!(resolve_env_ref_with("$EMPTY_KEY", env), None);
        assert_eq!(resolve_env_ref_with("$UNSET_KEY", env), None);
    }

    #[test]
    fn api_key_falls_back_to_descriptor_env_var() {
        let env = |name: &str| (name == "SVC_KEY").then(|| "from-env".to_string());

        assert_eq!(
            resolve_api_key_with(None, "SVC_KEY", env),
            Some("from-env".into())
        );
        assert_eq!(
            resolve_api_key_with(Some("explicit"), "SVC_KEY", env),
            Some("explicit".into())
        );
        assert_eq!(
            resolve_api_key_with(Some("$SVC_KEY"), "OTHER", env),
            Some("from-env".into())
        );
        assert_eq!(resolve_api_key_with(None, "", env), None);
    }
}
