use deepsearch_core::{ContentExtractor, SearchProvider, SearchQuery};
use futures_util::{stream, StreamExt};
use std::sync::Arc;

use crate::config::ResearchConfig;
use crate::error::ResearchError;
use crate::model::{Reference, ReferenceMap};
use crate::rerank::Reranker;

/// Concurrent extractions for `selected` urls: `max(1, selected / page_count)`.
pub fn worker_width(selected: usize, page_count: usize) -> usize {
    (selected / page_count.max(1)).max(1)
}

/// Character-count filter applied to every extracted text.
pub fn within_bounds(text: &str, min_chars: usize, max_chars: usize) -> bool {
    let n = text.chars().count();
    n >= min_chars && n < max_chars
}

/// Zip selected hits with their extracted texts, keeping only in-bounds texts, in order.
pub fn build_reference_map(
    hits: &[(String, String)],
    texts: Vec<String>,
    min_chars: usize,
    max_chars: usize,
) -> ReferenceMap {
    let mut map = ReferenceMap::new();
    for ((url, title), content) in hits.iter().zip(texts) {
        if within_bounds(&content, min_chars, max_chars) {
            map.push(Reference {
                title: title.clone(),
                url: url.clone(),
                content,
            });
        }
    }
    map
}

/// search -> rerank -> parallel extract -> length filter.
#[derive(Clone)]
pub struct SearchPipeline {
    provider: Arc<dyn SearchProvider>,
    extractor: Arc<dyn ContentExtractor>,
    reranker: Reranker,
    result_count: usize,
    page_count: usize,
    market: String,
    min_chars: usize,
    max_chars: usize,
}

impl SearchPipeline {
    pub fn new(
        provider: Arc<dyn SearchProvider>,
        extractor: Arc<dyn ContentExtractor>,
        reranker: Reranker,
        cfg: &ResearchConfig,
    ) -> Self {
        Self {
            provider,
            extractor,
            reranker,
            result_count: cfg.result_count(),
            page_count: cfg.page_count.max(1),
            market: cfg.market.clone(),
            min_chars: cfg.min_content_chars,
            max_chars: cfg.max_content_chars,
        }
    }

    /// Provider failures and empty result lists yield an empty map; only a failing
    /// reranker call is an error.
    pub async fn research(
        &self,
        keyword: &str,
        question: &str,
    ) -> Result<ReferenceMap, ResearchError> {
        let mut q = SearchQuery::new(keyword);
        q.max_results = Some(self.result_count);
        q.market = Some(self.market.clone());

        let resp = match self.provider.search(&q).await {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(
                    provider = self.provider.name(),
                    keyword,
                    error = %e,
                    "search failed; continuing without results"
                );
                return Ok(ReferenceMap::new());
            }
        };
        let (urls, titles) = resp.urls_and_titles();
        if urls.is_empty() {
            tracing::info!(keyword, "no search results");
            return Ok(ReferenceMap::new());
        }

        let sel = self
            .reranker
            .rerank(question, &titles)
            .await
            .map_err(|source| ResearchError::Rerank {
                keyword: keyword.to_string(),
                source,
            })?;
        let hits: Vec<(String, String)> = sel
            .indices
            .iter()
            .map(|&i| (urls[i].clone(), titles[i].clone()))
            .collect();

        let texts = self.extract_all(&hits).await;
        let map = build_reference_map(&hits, texts, self.min_chars, self.max_chars);
        tracing::info!(
            keyword,
            results = urls.len(),
            selected = hits.len(),
            kept = map.len(),
            "search pass done"
        );
        Ok(map)
    }

    /// One task per url; results come back in input order. A panicking extraction
    /// contributes an empty string.
    async fn extract_all(&self, hits: &[(String, String)]) -> Vec<String> {
        let width = worker_width(hits.len(), self.page_count);
        // Owned inputs keep the stream free of borrows, so the whole run stays `Send`.
        let urls: Vec<String> = hits.iter().map(|(url, _)| url.clone()).collect();
        let extractor = Arc::clone(&self.extractor);
        stream::iter(urls)
            .map(move |url| {
                let extractor = Arc::clone(&extractor);
                async move {
                    let task_url = url.clone();
                    match tokio::spawn(async move { extractor.extract(&task_url).await }).await {
                        Ok(text) => text,
                        Err(e) => {
                            tracing::warn!(url = %url, error = %e, "extraction task failed");
                            String::new()
                        }
                    }
                }
            })
            .buffered(width)
            .collect()
            .await
    }
}
