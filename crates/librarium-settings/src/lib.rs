//! # librarium-settings
//!
//! Configuration management with layered sources for the research runner.
//!
//! Configuration is assembled from three layers (in priority order):
//! 1. **Compiled defaults** — [`Config::default()`]
//! 2. **Global file** — `$XDG_CONFIG_HOME/librarium/config.json`
//!    (deep-merged over defaults, written with mode `0600`)
//! 3. **Project file** — `.librarium.json` in the working directory,
//!    then **CLI overrides** — both override the `defaults` section only;
//!    `providers`, `customProviders`, `trustedProviderIds`, and `groups`
//!    are global-only
//!
//! Loading also rewrites known legacy provider ids to their canonical
//! forms ([`migrate`]) and validates fallback references, emitting
//! warnings rather than failing.
//!
//! API keys are opaque env-ref strings: `$NAME` is looked up in the
//! process environment at use time, anything else is a literal key. Keys
//! are never written to disk by this crate.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod migrate;
pub mod types;

pub use errors::SettingsError;
pub use loader::{
    CliOverrides, deep_merge, global_config_path, load_config, load_config_from_paths,
    project_config_path, resolve_api_key, resolve_api_key_with, resolve_env_ref,
    resolve_env_ref_with, save_config,
};
pub use types::{Config, CustomProviderSpec, CustomProviderType, Defaults, ProviderEntry};
