//! Configuration schema.
//!
//! Parsing is strict: unknown fields are rejected everywhere except the
//! free-form `options` values, so a typo in a config file fails loudly
//! instead of silently disabling a provider.

use std::collections::{BTreeMap, BTreeSet};

use librarium_core::DispatchMode;
use serde::{Deserialize, Serialize};

/// Current config schema version.
pub const CONFIG_VERSION: u32 = 1;

/// Root configuration record.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Config {
    /// Config schema version. Always 1.
    #[serde(default = "default_version")]
    pub version: u32,

    /// Tunable run defaults; the only section project files and CLI
    /// flags may override.
    #[serde(default)]
    pub defaults: Defaults,

    /// Per-provider settings keyed by provider id.
    #[serde(default)]
    pub providers: BTreeMap<String, ProviderEntry>,

    /// User-supplied provider plugins keyed by provider id.
    #[serde(default)]
    pub custom_providers: BTreeMap<String, CustomProviderSpec>,

    /// Ids of custom providers the user has explicitly trusted. Untrusted
    /// entries are skipped with a warning.
    #[serde(default)]
    pub trusted_provider_ids: BTreeSet<String>,

    /// Named provider groups for `run --group`.
    #[serde(default)]
    pub groups: BTreeMap<String, Vec<String>>,
}

fn default_version() -> u32 {
    CONFIG_VERSION
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            defaults: Defaults::default(),
            providers: BTreeMap::new(),
            custom_providers: BTreeMap::new(),
            trusted_provider_ids: BTreeSet::new(),
            groups: BTreeMap::new(),
        }
    }
}

impl Config {
    /// The config entry for `id`, when present.
    #[must_use]
    pub fn provider(&self, id: &str) -> Option<&ProviderEntry> {
        self.providers.get(id)
    }

    /// A copy safe to print: literal API keys are masked, env-refs are
    /// kept (they are just names).
    #[must_use]
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        for entry in copy.providers.values_mut() {
            if let Some(key) = &entry.api_key {
                if !key.starts_with('$') {
                    entry.api_key = Some("••••".into());
                }
            }
        }
        copy
    }
}

/// Tunable defaults for a run.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Defaults {
    /// Base output directory for run directories.
    #[serde(default = "default_output_dir")]
    pub output_dir: String,

    /// Bounded-parallelism width of the dispatcher.
    #[serde(default = "default_max_parallel")]
    pub max_parallel: usize,

    /// Per-provider execution timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout: u64,

    /// Overall `status --wait` budget in seconds.
    #[serde(default = "default_async_timeout")]
    pub async_timeout: u64,

    /// Sleep between async poll sweeps in seconds.
    #[serde(default = "default_async_poll_interval")]
    pub async_poll_interval: u64,

    /// Default dispatch mode.
    #[serde(default)]
    pub mode: DispatchMode,
}

fn default_output_dir() -> String {
    "./agents/librarium".into()
}
fn default_max_parallel() -> usize {
    4
}
fn default_timeout() -> u64 {
    300
}
fn default_async_timeout() -> u64 {
    3600
}
fn default_async_poll_interval() -> u64 {
    30
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            max_parallel: default_max_parallel(),
            timeout: default_timeout(),
            async_timeout: default_async_timeout(),
            async_poll_interval: default_async_poll_interval(),
            mode: DispatchMode::default(),
        }
    }
}

/// Per-provider configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ProviderEntry {
    /// Opaque env-ref string: `$NAME` resolves from the environment at
    /// use time, anything else is a literal key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Whether the provider participates in runs.
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Model override for adapters that honor one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    /// Free-form provider options (the one place unknown fields are
    /// accepted).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<serde_json::Value>,

    /// Single-level backup provider executed when this one throws.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback: Option<String>,
}

fn default_enabled() -> bool {
    true
}

impl Default for ProviderEntry {
    fn default() -> Self {
        Self {
            api_key: None,
            enabled: true,
            model: None,
            options: None,
            fallback: None,
        }
    }
}

impl ProviderEntry {
    /// An enabled entry with an env-ref key.
    #[must_use]
    pub fn with_env_ref(env_var: &str) -> Self {
        Self {
            api_key: Some(format!("${env_var}")),
            enabled: true,
            model: None,
            options: None,
            fallback: None,
        }
    }
}

/// How a custom provider is implemented.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CustomProviderType {
    /// Node module resolved from `node_modules`.
    Npm,
    /// Arbitrary executable speaking the stdio JSON envelope protocol.
    Script,
}

/// One `customProviders` entry.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CustomProviderSpec {
    /// Loader variant.
    #[serde(rename = "type")]
    pub kind: CustomProviderType,

    /// Node module specifier (`npm` only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub module: Option<String>,

    /// Executable to spawn (`script` only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,

    /// Arguments for `command`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,

    /// Extra environment merged over the process environment.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,

    /// Working directory, resolved against the invoking project.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cwd: Option<String>,

    /// Free-form options forwarded to the plugin as `sourceOptions`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<serde_json::Value>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let defaults = Defaults::default();
        assert_eq!(defaults.output_dir, "./agents/librarium");
        assert_eq!(defaults.max_parallel, 4);
        assert_eq!(defaults.timeout, 300);
        assert_eq!(defaults.async_timeout, 3600);
        assert_eq!(defaults.async_poll_interval, 30);
        assert_eq!(defaults.mode, DispatchMode::Mixed);
    }

    #[test]
    fn empty_json_parses_to_defaults() {
        let config: Config = serde_json::from_str("{}").unwrap();
        assert_eq!(config.version, CONFIG_VERSION);
        assert!(config.providers.is_empty());
        assert!(config.groups.is_empty());
    }

    #[test]
    fn unknown_top_level_field_rejected() {
        let result = serde_json::from_str::<Config>(r#"{"providres": {}}"#);
        assert!(result.is_err());
    }

    #[test]
    fn unknown_entry_field_rejected() {
        let result = serde_json::from_str::<Config>(
            r#"{"providers": {"brave-search": {"enabld": true}}}"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn unknown_fields_allowed_inside_options() {
        let config: Config = serde_json::from_str(
            r#"{"providers": {"brave-search": {"options": {"anything": {"goes": 1}}}}}"#,
        )
        .unwrap();
        let entry = config.provider("brave-search").unwrap();
        assert_eq!(entry.options.as_ref().unwrap()["anything"]["goes"], 1);
    }

    #[test]
    fn provider_entry_enabled_by_default() {
        let config: Config =
            serde_json::from_str(r#"{"providers": {"brave-search": {}}}"#).unwrap();
        assert!(config.provider("brave-search").unwrap().enabled);
    }

    #[test]
    fn custom_provider_spec_parses() {
        let config: Config = serde_json::from_str(
            r#"{
                "customProviders": {
                    "my-search": {
                        "type": "script",
                        "command": "./search.py",
                        "args": ["--fast"],
                        "env": {"SEARCH_DEBUG": "1"},
                        "options": {"region": "eu"}
                    }
                },
                "trustedProviderIds": ["my-search"]
            }"#,
        )
        .unwrap();
        let spec = &config.custom_providers["my-search"];
        assert_eq!(spec.kind, CustomProviderType::Script);
        assert_eq!(spec.command.as_deref(), Some("./search.py"));
        assert_eq!(spec.args, vec!["--fast"]);
        assert!(config.trusted_provider_ids.contains("my-search"));
    }

    #[test]
    fn redacted_masks_literal_keys_only() {
        let mut config = Config::default();
        let _ = config.providers.insert(
            "a".into(),
            ProviderEntry {
                api_key: Some("literal-secret".into()),
                ..ProviderEntry::default()
            },
        );
        let _ = config
            .providers
            .insert("b".into(), ProviderEntry::with_env_ref("B_KEY"));

        let redacted = config.redacted();
        assert_eq!(redacted.providers["a"].api_key.as_deref(), Some("••••"));
        assert_eq!(redacted.providers["b"].api_key.as_deref(), Some("$B_KEY"));
    }

    #[test]
    fn round_trip_preserves_shape() {
        let json = r#"{
            "version": 1,
            "defaults": {"maxParallel": 8, "mode": "sync"},
            "providers": {"exa-search": {"apiKey": "$EXA_API_KEY", "fallback": "brave-search"}},
            "groups": {"fast": ["brave-search", "exa-search"]}
        }"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert_eq!(config.defaults.max_parallel, 8);
        assert_eq!(config.defaults.mode, DispatchMode::Sync);
        assert_eq!(
            config.providers["exa-search"].fallback.as_deref(),
            Some("brave-search")
        );

        let back = serde_json::to_string(&config).unwrap();
        let reparsed: Config = serde_json::from_str(&back).unwrap();
        assert_eq!(reparsed.groups["fast"], vec!["brave-search", "exa-search"]);
    }
}
