//! Wires settings, built-in adapters, and custom plugins into a ready
//! provider registry.
//!
//! Built-ins are always registered (keyless ones simply get skipped at
//! dispatch time); the two blocking deep-research services are wrapped
//! in [`SyntheticAsyncProvider`] so every deep-research provider shares
//! the submit/poll/retrieve code path. Trusted custom providers are
//! appended last so a plugin can never shadow a built-in id.

use std::path::Path;
use std::sync::Arc;

use librarium_http::HttpClient;
use librarium_plugins::{InstallMethod, load_custom_providers};
use librarium_providers::adapters::{
    AnthropicResearch, BraveSearch, ExaSearch, GeminiGrounded, OpenAiDeepResearch,
    PerplexityDeepResearch, PerplexitySonarPro, TavilySearch,
};
use librarium_providers::{ProviderRegistry, SyntheticAsyncProvider};
use librarium_settings::{Config, resolve_api_key};

/// Everything a command needs to talk to providers.
pub struct Bootstrap {
    /// Resolved layered configuration.
    pub config: Arc<Config>,
    /// Registry of built-in + trusted custom providers.
    pub registry: Arc<ProviderRegistry>,
    /// How this binary was installed.
    pub install: InstallMethod,
}

/// Build the registry for `config`.
pub async fn initialize_providers(
    config: &Config,
    project_dir: &Path,
    install: &InstallMethod,
) -> ProviderRegistry {
    let http = HttpClient::new();
    let key = |id: &str, env_var: &str| {
        resolve_api_key(
            config.provider(id).and_then(|e| e.api_key.as_deref()),
            env_var,
        )
    };

    let mut registry = ProviderRegistry::new();

    let _ = registry.register(Arc::new(PerplexitySonarPro::new(
        http.clone(),
        key(PerplexitySonarPro::ID, "PERPLEXITY_API_KEY"),
    )));
    let _ = registry.register(Arc::new(SyntheticAsyncProvider::new(Arc::new(
        PerplexityDeepResearch::new(
            http.clone(),
            key(PerplexityDeepResearch::ID, "PERPLEXITY_API_KEY"),
        ),
    ))));
    let _ = registry.register(Arc::new(OpenAiDeepResearch::new(
        http.clone(),
        key(OpenAiDeepResearch::ID, "OPENAI_API_KEY"),
    )));
    let _ = registry.register(Arc::new(SyntheticAsyncProvider::new(Arc::new(
        AnthropicResearch::new(
            http.clone(),
            key(AnthropicResearch::ID, "ANTHROPIC_API_KEY"),
        ),
    ))));
    let _ = registry.register(Arc::new(GeminiGrounded::new(
        http.clone(),
        key(GeminiGrounded::ID, "GEMINI_API_KEY"),
    )));
    let _ = registry.register(Arc::new(BraveSearch::new(
        http.clone(),
        key(BraveSearch::ID, "BRAVE_API_KEY"),
    )));
    let _ = registry.register(Arc::new(TavilySearch::new(
        http.clone(),
        key(TavilySearch::ID, "TAVILY_API_KEY"),
    )));
    let _ = registry.register(Arc::new(ExaSearch::new(
        http,
        key(ExaSearch::ID, "EXA_API_KEY"),
    )));

    for provider in load_custom_providers(config, project_dir, install).await {
        let _ = registry.register(provider);
    }

    registry
}

/// Load config with CLI overrides and build the registry.
pub async fn initialize(
    cwd: &Path,
    overrides: &librarium_settings::CliOverrides,
) -> anyhow::Result<Bootstrap> {
    let config = librarium_settings::load_config(cwd, overrides)?;
    let install = InstallMethod::detect();
    let registry = initialize_providers(&config, cwd, &install).await;
    Ok(Bootstrap {
        config: Arc::new(config),
        registry: Arc::new(registry),
        install,
    })
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use librarium_core::ids::BUILTIN_PROVIDER_IDS;
    use librarium_core::{ProviderSource, ProviderTier};

    #[tokio::test]
    async fn all_builtins_register() {
        let registry = initialize_providers(
            &Config::default(),
            Path::new("/tmp"),
            &InstallMethod::Standalone,
        )
        .await;

        assert_eq!(registry.len(), BUILTIN_PROVIDER_IDS.len());
        for id in BUILTIN_PROVIDER_IDS {
            assert!(registry.contains(id), "missing builtin {id}");
        }
    }

    #[tokio::test]
    async fn legacy_ids_resolve_after_bootstrap() {
        let registry = initialize_providers(
            &Config::default(),
            Path::new("/tmp"),
            &InstallMethod::Standalone,
        )
        .await;
        assert!(registry.contains("perplexity-sonar"));
        assert!(registry.contains("brave"));
    }

    #[tokio::test]
    async fn deep_research_builtins_expose_async_lifecycle() {
        let registry = initialize_providers(
            &Config::default(),
            Path::new("/tmp"),
            &InstallMethod::Standalone,
        )
        .await;

        for id in [
            "perplexity-deep-research",
            "openai-deep-research",
            "anthropic-research",
        ] {
            let descriptor = registry.get(id).unwrap().descriptor().clone();
            assert_eq!(descriptor.tier, ProviderTier::DeepResearch);
            assert!(descriptor.capabilities.submit, "{id} cannot submit");
            assert!(descriptor.capabilities.retrieve, "{id} cannot retrieve");
        }
    }

    #[tokio::test]
    async fn empty_trust_set_keeps_registry_builtin_only() {
        let config: Config = serde_json::from_str(
            r#"{
                "customProviders": {
                    "my-plugin": {"type": "script", "command": "./plugin.sh"}
                }
            }"#,
        )
        .unwrap();

        let registry = initialize_providers(
            &config,
            Path::new("/tmp"),
            &InstallMethod::Standalone,
        )
        .await;

        assert_eq!(registry.len(), BUILTIN_PROVIDER_IDS.len());
        for id in registry.ids() {
            let source = registry.get(id).unwrap().descriptor().source;
            assert_eq!(source, ProviderSource::Builtin);
        }
    }
}
