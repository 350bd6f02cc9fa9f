use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("invalid url: {0}")]
    InvalidUrl(String),
    #[error("fetch failed: {0}")]
    Fetch(String),
    #[error("search failed: {0}")]
    Search(String),
    #[error("llm failed: {0}")]
    Llm(String),
    #[error("plan parse failed: {0}")]
    PlanParse(String),
    #[error("not configured: {0}")]
    NotConfigured(String),
    #[error("not supported: {0}")]
    NotSupported(String),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Parse an absolute http(s) URL.
pub fn parse_http_url(raw: &str) -> Result<url::Url> {
    let u = url::Url::parse(raw.trim()).map_err(|e| Error::InvalidUrl(e.to_string()))?;
    match u.scheme() {
        "http" | "https" => Ok(u),
        other => Err(Error::InvalidUrl(format!("unsupported scheme: {other}"))),
    }
}

// ---- Language model ----

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CompletionRequest {
    pub messages: Vec<ChatMessage>,
    /// Model identifier; adapters fall back to their configured default when unset.
    pub model: Option<String>,
    pub temperature: Option<f64>,
    pub max_tokens: Option<u64>,
}

impl CompletionRequest {
    pub fn new(messages: Vec<ChatMessage>) -> Self {
        Self {
            messages,
            ..Default::default()
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_temperature(mut self, t: Option<f64>) -> Self {
        self.temperature = t;
        self
    }
}

#[async_trait::async_trait]
pub trait LanguageModel: Send + Sync {
    fn name(&self) -> &'static str;
    /// Single text completion for the given message sequence.
    async fn complete(&self, req: &CompletionRequest) -> Result<String>;
}

// ---- Search ----

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchQuery {
    pub query: String,
    pub max_results: Option<usize>,
    /// Market/locale hint (e.g. "en-US"); providers that lack the notion ignore it.
    pub market: Option<String>,
}

impl SearchQuery {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            max_results: None,
            market: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    pub url: String,
    pub title: Option<String>,
    pub snippet: Option<String>,
    pub source: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResponse {
    pub results: Vec<SearchResult>,
    pub provider: String,
    pub timings_ms: BTreeMap<String, u128>,
}

impl SearchResponse {
    /// Split into parallel (urls, titles) lists; a missing title becomes the url.
    pub fn urls_and_titles(&self) -> (Vec<String>, Vec<String>) {
        self.results
            .iter()
            .map(|r| {
                let title = r
                    .title
                    .as_deref()
                    .map(str::trim)
                    .filter(|t| !t.is_empty())
                    .unwrap_or(&r.url)
                    .to_string();
                (r.url.clone(), title)
            })
            .unzip()
    }
}

#[async_trait::async_trait]
pub trait SearchProvider: Send + Sync {
    fn name(&self) -> &'static str;
    async fn search(&self, q: &SearchQuery) -> Result<SearchResponse>;
}

// ---- Fetch / extract ----

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchRequest {
    pub url: String,
    /// Timeout for the operation (network + processing).
    pub timeout_ms: Option<u64>,
    /// Hard cap on bytes read from the response body.
    pub max_bytes: Option<u64>,
}

impl FetchRequest {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            timeout_ms: None,
            max_bytes: None,
        }
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchResponse {
    pub url: String,
    pub final_url: String,
    pub status: u16,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
    pub truncated: bool,
    pub timings_ms: BTreeMap<String, u128>,
}

impl FetchResponse {
    pub fn text_lossy(&self) -> String {
        String::from_utf8_lossy(&self.bytes).to_string()
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

#[async_trait::async_trait]
pub trait FetchBackend: Send + Sync {
    async fn fetch(&self, req: &FetchRequest) -> Result<FetchResponse>;
}

/// Best-effort url -> plain text.
///
/// Implementations must not fail: any network or parse problem yields an empty string.
#[async_trait::async_trait]
pub trait ContentExtractor: Send + Sync {
    async fn extract(&self, url: &str) -> String;
}
