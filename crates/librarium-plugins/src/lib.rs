//! # librarium-plugins
//!
//! Trusted custom-provider loading.
//!
//! Two loader variants, selected by `customProviders.<id>.type`:
//!
//! - **`script`** — an arbitrary executable spawned once per operation,
//!   speaking one JSON request/response envelope over stdin/stdout
//!   ([`protocol`], [`ipc`], [`script`])
//! - **`npm`** — a Node module resolved on disk (invoking project first,
//!   then the runtime's install tree) and driven through a generated Node
//!   bootstrap that speaks the same envelope ([`node`])
//!
//! A custom provider loads only when its id appears in
//! `trustedProviderIds`; untrusted entries, built-in id collisions, and
//! `describe` failures are all skipped with warnings ([`loader`]).
//!
//! The install-method detector ([`install`]) feeds both the `npm` loader
//! (no module graph under standalone/Homebrew installs) and the `doctor`
//! command's upgrade guidance.

#![deny(unsafe_code)]

pub mod errors;
pub mod install;
pub mod ipc;
pub mod loader;
pub mod node;
pub mod protocol;
pub mod script;

pub use errors::PluginError;
pub use install::InstallMethod;
pub use loader::load_custom_providers;
pub use script::ScriptProvider;
