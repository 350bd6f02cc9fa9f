use deepsearch_core::{Error, FetchBackend, FetchRequest, FetchResponse, Result};
use std::collections::BTreeMap;
use std::time::Duration;

pub mod extract;
pub mod openai_compat;
pub mod search;

pub use extract::LocalExtractor;
pub use openai_compat::OpenAiCompatClient;

/// First non-empty (trimmed) value among `keys`.
pub fn env_first(keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|k| {
        std::env::var(k)
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    })
}

#[derive(Debug, Clone)]
pub struct LocalFetcher {
    client: reqwest::Client,
}

impl LocalFetcher {
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent("deepsearch-local/0.1")
            .redirect(reqwest::redirect::Policy::limited(10))
            // Per-request timeouts (FetchRequest.timeout_ms) still override these.
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| Error::Fetch(e.to_string()))?;
        Ok(Self { client })
    }
}

#[async_trait::async_trait]
impl FetchBackend for LocalFetcher {
    async fn fetch(&self, req: &FetchRequest) -> Result<FetchResponse> {
        let t_req = std::time::Instant::now();
        let url = deepsearch_core::parse_http_url(&req.url)?;

        let mut rb = self.client.get(url);
        if let Some(to) = req.timeout() {
            rb = rb.timeout(to);
        }
        let resp = rb.send().await.map_err(|e| Error::Fetch(e.to_string()))?;
        let final_url = resp.url().to_string();
        let status = resp.status().as_u16();
        let content_type = resp
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());

        let max_bytes = req.max_bytes.unwrap_or(u64::MAX) as usize;
        let mut truncated = false;
        let mut bytes = Vec::new();
        let mut stream = resp.bytes_stream();
        use futures_util::StreamExt;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| Error::Fetch(e.to_string()))?;
            if bytes.len().saturating_add(chunk.len()) > max_bytes {
                let can_take = max_bytes.saturating_sub(bytes.len());
                bytes.extend_from_slice(&chunk[..can_take]);
                truncated = true;
                break;
            }
            bytes.extend_from_slice(&chunk);
        }

        let mut timings_ms = BTreeMap::new();
        timings_ms.insert("network_fetch".to_string(), t_req.elapsed().as_millis());
        tracing::debug!(
            url = %req.url,
            status,
            bytes = bytes.len(),
            truncated,
            "fetched"
        );

        Ok(FetchResponse {
            url: req.url.clone(),
            final_url,
            status,
            content_type,
            bytes,
            truncated,
            timings_ms,
        })
    }
}
