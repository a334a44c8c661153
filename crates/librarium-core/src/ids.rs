//! Reserved built-in provider ids and the legacy-id migration table.
//!
//! Shared between the settings layer (config key migration) and the
//! provider registry (aliasing), so the two can never disagree.

/// Ids reserved by built-in providers. A custom-provider entry with one of
/// these ids is ignored with a warning.
pub const BUILTIN_PROVIDER_IDS: &[&str] = &[
    "perplexity-sonar-pro",
    "perplexity-deep-research",
    "openai-deep-research",
    "anthropic-research",
    "gemini-grounded",
    "brave-search",
    "tavily-search",
    "exa-search",
];

/// Known legacy ids and their canonical replacements.
pub const LEGACY_PROVIDER_IDS: &[(&str, &str)] = &[
    ("perplexity-sonar", "perplexity-sonar-pro"),
    ("perplexity-deep", "perplexity-deep-research"),
    ("brave", "brave-search"),
    ("tavily", "tavily-search"),
    ("exa", "exa-search"),
];

/// Whether `id` is reserved by a built-in provider.
#[must_use]
pub fn is_builtin_id(id: &str) -> bool {
    BUILTIN_PROVIDER_IDS.contains(&id)
}

/// Canonicalize a possibly-legacy provider id.
///
/// Returns `Some(canonical)` when `id` is a known legacy id, `None` when
/// it is already canonical (or unknown).
#[must_use]
pub fn canonical_id(id: &str) -> Option<&'static str> {
    LEGACY_PROVIDER_IDS
        .iter()
        .find(|(legacy, _)| *legacy == id)
        .map(|(_, canonical)| *canonical)
}
