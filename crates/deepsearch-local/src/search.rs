use deepsearch_core::{Error, Result, SearchProvider, SearchQuery, SearchResponse, SearchResult};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::env_first;

/// `DEEPSEARCH_SEARCH_TIMEOUT_MS`, clamped to [1s, 60s]; 20s when unset or unparseable.
fn search_timeout() -> Duration {
    // Provider requests can hang indefinitely without an explicit timeout.
    let ms = env_first(&["DEEPSEARCH_SEARCH_TIMEOUT_MS"])
        .and_then(|s| s.parse::<u64>().ok())
        .unwrap_or(20_000);
    Duration::from_millis(ms.clamp(1_000, 60_000))
}

/// Split a market such as "en-US" (or "en_US") into language and country parts.
fn market_parts(market: &str) -> (Option<&str>, Option<&str>) {
    let market = market.trim();
    let (lang, country) = match market.split_once(['-', '_']) {
        Some((l, c)) => (l, Some(c)),
        None => (market, None),
    };
    let lang = Some(lang).filter(|s| !s.is_empty());
    (lang, country.filter(|s| !s.is_empty()))
}

fn bing_api_key_from_env() -> Option<String> {
    env_first(&["DEEPSEARCH_BING_API_KEY", "BING_API_KEY", "Bing_API_KEY"])
}

fn brave_api_key_from_env() -> Option<String> {
    env_first(&["DEEPSEARCH_BRAVE_API_KEY", "BRAVE_SEARCH_API_KEY"])
}

fn tavily_api_key_from_env() -> Option<String> {
    env_first(&["DEEPSEARCH_TAVILY_API_KEY", "TAVILY_API_KEY"])
}

/// Comma/whitespace-separated `DEEPSEARCH_SEARXNG_ENDPOINTS` plus the single
/// `DEEPSEARCH_SEARXNG_ENDPOINT`, deduplicated in order.
pub fn searxng_endpoints_from_env() -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    let list = env_first(&["DEEPSEARCH_SEARXNG_ENDPOINTS"]).unwrap_or_default();
    let single = env_first(&["DEEPSEARCH_SEARXNG_ENDPOINT"]).unwrap_or_default();
    for raw in list
        .split(|c: char| c == ',' || c.is_whitespace())
        .chain(std::iter::once(single.as_str()))
    {
        let s = raw.trim();
        if !s.is_empty() && !out.iter().any(|e| e == s) {
            out.push(s.to_string());
        }
    }
    out
}

/// Which providers have credentials/endpoints configured (booleans only).
pub fn configured_providers() -> BTreeMap<&'static str, bool> {
    BTreeMap::from([
        ("bing", bing_api_key_from_env().is_some()),
        ("brave", brave_api_key_from_env().is_some()),
        ("tavily", tavily_api_key_from_env().is_some()),
        ("searxng", !searxng_endpoints_from_env().is_empty()),
    ])
}

/// Build a provider by name: `auto|bing|brave|tavily|searxng`.
///
/// `auto` picks the first configured provider in that order.
pub fn provider_from_env(client: reqwest::Client, name: &str) -> Result<Arc<dyn SearchProvider>> {
    match name.trim().to_ascii_lowercase().as_str() {
        "bing" => Ok(Arc::new(BingSearchProvider::from_env(client)?)),
        "brave" => Ok(Arc::new(BraveSearchProvider::from_env(client)?)),
        "tavily" => Ok(Arc::new(TavilySearchProvider::from_env(client)?)),
        "searxng" => Ok(Arc::new(SearxngSearchProvider::from_env(client)?)),
        "auto" | "" => {
            for candidate in ["bing", "brave", "tavily", "searxng"] {
                if configured_providers().get(candidate).copied().unwrap_or(false) {
                    return provider_from_env(client, candidate);
                }
            }
            Err(Error::NotConfigured(
                "no search provider configured (set DEEPSEARCH_BING_API_KEY, DEEPSEARCH_BRAVE_API_KEY, DEEPSEARCH_TAVILY_API_KEY or DEEPSEARCH_SEARXNG_ENDPOINT)"
                    .to_string(),
            ))
        }
        other => Err(Error::NotSupported(format!(
            "unknown search provider: {other} (allowed: auto, bing, brave, tavily, searxng)"
        ))),
    }
}

fn timings(t0: Instant) -> BTreeMap<String, u128> {
    BTreeMap::from([("search".to_string(), t0.elapsed().as_millis())])
}

// ---- Bing ----

#[derive(Debug, Clone)]
pub struct BingSearchProvider {
    client: reqwest::Client,
    api_key: String,
    endpoint: String,
}

impl BingSearchProvider {
    pub fn from_env(client: reqwest::Client) -> Result<Self> {
        let api_key = bing_api_key_from_env().ok_or_else(|| {
            Error::NotConfigured("missing DEEPSEARCH_BING_API_KEY (or BING_API_KEY)".to_string())
        })?;
        let endpoint = env_first(&["DEEPSEARCH_BING_ENDPOINT"])
            .unwrap_or_else(|| "https://api.bing.microsoft.com/v7.0/search".to_string());
        Ok(Self {
            client,
            api_key,
            endpoint,
        })
    }
}

#[derive(Debug, Deserialize)]
struct BingSearchResponse {
    #[serde(rename = "webPages")]
    web_pages: Option<BingWebPages>,
}

#[derive(Debug, Deserialize)]
struct BingWebPages {
    #[serde(default)]
    value: Vec<BingWebPage>,
}

#[derive(Debug, Deserialize)]
struct BingWebPage {
    url: String,
    name: Option<String>,
    snippet: Option<String>,
}

#[async_trait::async_trait]
impl SearchProvider for BingSearchProvider {
    fn name(&self) -> &'static str {
        "bing"
    }

    async fn search(&self, q: &SearchQuery) -> Result<SearchResponse> {
        let t0 = Instant::now();
        let mut req = self
            .client
            .get(&self.endpoint)
            .header("Ocp-Apim-Subscription-Key", &self.api_key)
            .query(&[("q", q.query.as_str())]);
        if let Some(n) = q.max_results {
            req = req.query(&[("count", n.to_string())]);
        }
        if let Some(mkt) = q.market.as_deref() {
            req = req.query(&[("mkt", mkt)]);
        }

        let resp = req
            .timeout(search_timeout())
            .send()
            .await
            .map_err(|e| Error::Search(e.to_string()))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(Error::Search(format!("bing search HTTP {status}")));
        }
        let parsed: BingSearchResponse = resp
            .json()
            .await
            .map_err(|e| Error::Search(e.to_string()))?;

        let results = parsed
            .web_pages
            .map(|w| w.value)
            .unwrap_or_default()
            .into_iter()
            .map(|p| SearchResult {
                url: p.url,
                title: p.name,
                snippet: p.snippet,
                source: "bing".to_string(),
            })
            .collect();

        Ok(SearchResponse {
            results,
            provider: "bing".to_string(),
            timings_ms: timings(t0),
        })
    }
}

// ---- Brave ----

#[derive(Debug, Clone)]
pub struct BraveSearchProvider {
    client: reqwest::Client,
    api_key: String,
}

impl BraveSearchProvider {
    pub fn from_env(client: reqwest::Client) -> Result<Self> {
        let api_key = brave_api_key_from_env().ok_or_else(|| {
            Error::NotConfigured(
                "missing DEEPSEARCH_BRAVE_API_KEY (or BRAVE_SEARCH_API_KEY)".to_string(),
            )
        })?;
        Ok(Self { client, api_key })
    }

    fn endpoint() -> String {
        env_first(&["DEEPSEARCH_BRAVE_ENDPOINT"])
            .unwrap_or_else(|| "https://api.search.brave.com/res/v1/web/search".to_string())
    }
}

#[derive(Debug, Deserialize)]
struct BraveWebSearchResponse {
    web: Option<BraveWeb>,
}

#[derive(Debug, Deserialize)]
struct BraveWeb {
    results: Option<Vec<BraveWebResult>>,
}

#[derive(Debug, Deserialize)]
struct BraveWebResult {
    url: String,
    title: Option<String>,
    description: Option<String>,
}

#[async_trait::async_trait]
impl SearchProvider for BraveSearchProvider {
    fn name(&self) -> &'static str {
        "brave"
    }

    async fn search(&self, q: &SearchQuery) -> Result<SearchResponse> {
        let t0 = Instant::now();
        let mut req = self
            .client
            .get(Self::endpoint())
            .header("X-Subscription-Token", &self.api_key)
            .query(&[("q", q.query.as_str())]);
        if let Some(n) = q.max_results {
            // Brave caps `count` at 20.
            req = req.query(&[("count", n.min(20).to_string())]);
        }
        let (lang, country) = q.market.as_deref().map(market_parts).unwrap_or_default();
        if let Some(lang) = lang {
            req = req.query(&[("search_lang", lang)]);
        }
        if let Some(country) = country {
            req = req.query(&[("country", country)]);
        }

        let resp = req
            .timeout(search_timeout())
            .send()
            .await
            .map_err(|e| Error::Search(e.to_string()))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(Error::Search(format!("brave search HTTP {status}")));
        }
        let parsed: BraveWebSearchResponse = resp
            .json()
            .await
            .map_err(|e| Error::Search(e.to_string()))?;

        let results = parsed
            .web
            .and_then(|w| w.results)
            .unwrap_or_default()
            .into_iter()
            .map(|r| SearchResult {
                url: r.url,
                title: r.title,
                snippet: r.description,
                source: "brave".to_string(),
            })
            .collect();

        Ok(SearchResponse {
            results,
            provider: "brave".to_string(),
            timings_ms: timings(t0),
        })
    }
}

// ---- Tavily ----

#[derive(Debug, Clone)]
pub struct TavilySearchProvider {
    client: reqwest::Client,
    api_key: String,
}

impl TavilySearchProvider {
    pub fn from_env(client: reqwest::Client) -> Result<Self> {
        let api_key = tavily_api_key_from_env().ok_or_else(|| {
            Error::NotConfigured(
                "missing DEEPSEARCH_TAVILY_API_KEY (or TAVILY_API_KEY)".to_string(),
            )
        })?;
        Ok(Self { client, api_key })
    }

    fn endpoint() -> String {
        env_first(&["DEEPSEARCH_TAVILY_ENDPOINT"])
            .unwrap_or_else(|| "https://api.tavily.com/search".to_string())
    }
}

#[derive(Debug, Deserialize)]
struct TavilySearchResponse {
    results: Vec<TavilyResult>,
}

#[derive(Debug, Deserialize)]
struct TavilyResult {
    url: String,
    title: Option<String>,
    content: Option<String>,
}

#[async_trait::async_trait]
impl SearchProvider for TavilySearchProvider {
    fn name(&self) -> &'static str {
        "tavily"
    }

    async fn search(&self, q: &SearchQuery) -> Result<SearchResponse> {
        let t0 = Instant::now();
        let body = serde_json::json!({
            "query": q.query,
            "max_results": q.max_results.unwrap_or(10).min(20),
            "include_answer": false,
            "include_raw_content": false,
            "search_depth": "basic",
        });

        let resp = self
            .client
            .post(Self::endpoint())
            .header(
                reqwest::header::AUTHORIZATION,
                format!("Bearer {}", self.api_key),
            )
            .json(&body)
            .timeout(search_timeout())
            .send()
            .await
            .map_err(|e| Error::Search(e.to_string()))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(Error::Search(format!("tavily search HTTP {status}")));
        }
        let parsed: TavilySearchResponse = resp
            .json()
            .await
            .map_err(|e| Error::Search(e.to_string()))?;

        let results = parsed
            .results
            .into_iter()
            .map(|r| SearchResult {
                url: r.url,
                title: r.title,
                snippet: r.content,
                source: "tavily".to_string(),
            })
            .collect();

        Ok(SearchResponse {
            results,
            provider: "tavily".to_string(),
            timings_ms: timings(t0),
        })
    }
}

// ---- SearXNG ----

#[derive(Debug, Clone)]
pub struct SearxngSearchProvider {
    client: reqwest::Client,
    endpoints: Vec<String>,
}

impl SearxngSearchProvider {
    pub fn from_env(client: reqwest::Client) -> Result<Self> {
        Self::new(client, searxng_endpoints_from_env())
    }

    pub fn new(client: reqwest::Client, endpoints: Vec<String>) -> Result<Self> {
        if endpoints.is_empty() {
            return Err(Error::NotConfigured(
                "missing DEEPSEARCH_SEARXNG_ENDPOINT (or DEEPSEARCH_SEARXNG_ENDPOINTS)".to_string(),
            ));
        }
        Ok(Self { client, endpoints })
    }

    /// Accept either a base URL or a full `/search` endpoint.
    fn search_url_for(base_endpoint: &str) -> String {
        let mut base = base_endpoint.trim().trim_end_matches('/').to_string();
        if !base.ends_with("/search") {
            base.push_str("/search");
        }
        base
    }

    fn pick_endpoint_index(&self, q: &SearchQuery) -> usize {
        // FNV-1a over query and market; stable across runs unlike RandomState.
        let mut h: u64 = 1469598103934665603;
        let routing = [q.query.as_str(), q.market.as_deref().unwrap_or("")];
        for b in routing.iter().flat_map(|s| s.bytes()) {
            h ^= b as u64;
            h = h.wrapping_mul(1099511628211);
        }
        (h as usize) % self.endpoints.len().max(1)
    }
}

#[derive(Debug, Deserialize)]
struct SearxngSearchResponse {
    results: Option<Vec<SearxngResult>>,
}

#[derive(Debug, Deserialize)]
struct SearxngResult {
    url: Option<String>,
    title: Option<String>,
    content: Option<String>,
}

#[async_trait::async_trait]
impl SearchProvider for SearxngSearchProvider {
    fn name(&self) -> &'static str {
        "searxng"
    }

    async fn search(&self, q: &SearchQuery) -> Result<SearchResponse> {
        let t0 = Instant::now();
        let max_results = q.max_results.unwrap_or(10).min(20);
        let base = self
            .endpoints
            .get(self.pick_endpoint_index(q))
            .map(String::as_str)
            .unwrap_or("");

        let mut req = self
            .client
            .get(Self::search_url_for(base))
            .query(&[("q", q.query.as_str()), ("format", "json")]);
        if let Some(market) = q.market.as_deref() {
            req = req.query(&[("language", market)]);
        }

        let resp = req
            .timeout(search_timeout())
            .send()
            .await
            .map_err(|e| Error::Search(e.to_string()))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(Error::Search(format!("searxng search HTTP {status}")));
        }
        let parsed: SearxngSearchResponse = resp
            .json()
            .await
            .map_err(|e| Error::Search(e.to_string()))?;

        let results = parsed
            .results
            .unwrap_or_default()
            .into_iter()
            .filter_map(|r| {
                Some(SearchResult {
                    url: r.url?,
                    title: r.title,
                    snippet: r.content,
                    source: "searxng".to_string(),
                })
            })
            .take(max_results)
            .collect();

        Ok(SearchResponse {
            results,
            provider: "searxng".to_string(),
            timings_ms: timings(t0),
        })
    }
}
