//! Built-in provider adapters, one module per remote service.
//!
//! Adapters are pure I/O + shape mapping: build the service request, fold
//! failures through [`crate::base`], and map the response body onto the
//! uniform [`ProviderResponse`](librarium_core::ProviderResponse) shape.
//! They hold no state beyond their HTTP client and resolved API key, and
//! they never touch the filesystem.

pub mod anthropic;
pub mod brave;
pub mod exa;
pub mod gemini;
pub mod openai;
pub mod perplexity;
pub mod tavily;

pub use anthropic::AnthropicResearch;
pub use brave::BraveSearch;
pub use exa::ExaSearch;
pub use gemini::GeminiGrounded;
pub use openai::OpenAiDeepResearch;
pub use perplexity::{PerplexityDeepResearch, PerplexitySonarPro};
pub use tavily::TavilySearch;
