//! Id → provider map with legacy-id aliasing.
//!
//! Built once during startup, then read-only for the rest of the process.
//! Legacy ids from [`librarium_core::ids::LEGACY_PROVIDER_IDS`] resolve to
//! the same registered provider as their canonical id, so selections and
//! configs written before a rename keep working.

use std::collections::HashMap;
use std::sync::Arc;

use librarium_core::ids::LEGACY_PROVIDER_IDS;
use tracing::warn;

use crate::provider::Provider;

/// Registry of available providers for one process.
#[derive(Default)]
pub struct ProviderRegistry {
    providers: HashMap<String, Arc<dyn Provider>>,
    aliases: HashMap<String, String>,
    order: Vec<String>,
}

impl ProviderRegistry {
    /// An empty registry with the built-in legacy aliases installed.
    #[must_use]
    pub fn new() -> Self {
        let aliases = LEGACY_PROVIDER_IDS
            .iter()
            .map(|(legacy, canonical)| ((*legacy).to_string(), (*canonical).to_string()))
            .collect();
        Self {
            providers: HashMap::new(),
            aliases,
            order: Vec::new(),
        }
    }

    /// Register a provider under its descriptor id.
    ///
    /// Returns false (keeping the existing registration) when the id is
    /// already taken.
    pub fn register(&mut self, provider: Arc<dyn Provider>) -> bool {
        let id = provider.descriptor().id.clone();
        if self.providers.contains_key(&id) {
            warn!(provider = %id, "duplicate provider id, keeping existing registration");
            return false;
        }
        self.order.push(id.clone());
        let _ = self.providers.insert(id, provider);
        true
    }

    /// Look up a provider by id, following legacy aliases.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<Arc<dyn Provider>> {
        if let Some(provider) = self.providers.get(id) {
            return Some(Arc::clone(provider));
        }
        let canonical = self.aliases.get(id)?;
        self.providers.get(canonical).map(Arc::clone)
    }

    /// Whether `id` (or its canonical form) is registered.
    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    /// Registered ids in registration order.
    #[must_use]
    pub fn ids(&self) -> &[String] {
        &self.order
    }

    /// Number of registered providers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.providers.len()
    }

    /// Whether the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    /// Drop all registrations (legacy aliases are kept); used when the
    /// registry is rebuilt after a config change.
    pub fn clear(&mut self) {
        self.providers.clear();
        self.order.clear();
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
