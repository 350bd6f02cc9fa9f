//! `deepsearch` crate (library surface).
//!
//! The primary entrypoint is the `deepsearch` binary (CLI + MCP stdio). This library
//! wires the reqwest adapters from `deepsearch-local` into a research engine, so the
//! binary's subcommands and the MCP server build it the same way.

pub use deepsearch_core as core;
pub use deepsearch_research as research;

use deepsearch_core::Result;
use deepsearch_local::{search::provider_from_env, LocalExtractor, OpenAiCompatClient};
use deepsearch_research::{DeepSearch, ResearchConfig};
use std::sync::Arc;

/// Caller-side overrides on top of the environment.
#[derive(Debug, Clone, Default)]
pub struct EngineOptions {
    /// `auto|bing|brave|tavily|searxng`; `None` reads `DEEPSEARCH_SEARCH_PROVIDER` (default auto).
    pub provider: Option<String>,
    pub max_iterations: Option<usize>,
    pub model: Option<String>,
}

pub fn http_client() -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(concat!("deepsearch/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| deepsearch_core::Error::NotConfigured(format!("http client: {e}")))
}

pub fn search_provider_name(opts: &EngineOptions) -> String {
    opts.provider
        .clone()
        .or_else(|| deepsearch_local::env_first(&["DEEPSEARCH_SEARCH_PROVIDER"]))
        .unwrap_or_else(|| "auto".to_string())
}

/// Language model, search provider and extractor from the environment.
///
/// Fails with `NotConfigured` when no LM endpoint or no search provider is set up.
pub fn engine_from_env(opts: &EngineOptions) -> Result<DeepSearch> {
    let mut cfg = ResearchConfig::from_env();
    if let Some(model) = opts.model.as_deref() {
        cfg = cfg.with_model(model);
    }
    if let Some(n) = opts.max_iterations {
        cfg = cfg.with_max_iterations(n);
    }

    let client = http_client()?;
    let lm = OpenAiCompatClient::from_env(client.clone(), Some(cfg.model.clone()))?;
    let provider = provider_from_env(client, &search_provider_name(opts))?;
    let extractor = LocalExtractor::from_env()?;
    tracing::debug!(
        provider = provider.name(),
        model = %cfg.model,
        max_iterations = cfg.max_iterations,
        "engine ready"
    );
    Ok(DeepSearch::new(
        Arc::new(lm),
        provider,
        Arc::new(extractor),
        cfg,
    ))
}
