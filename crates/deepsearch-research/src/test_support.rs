//! Scripted collaborators for research tests.

use deepsearch_core::{
    CompletionRequest, ContentExtractor, Error, LanguageModel, Result, SearchProvider,
    SearchQuery, SearchResponse, SearchResult,
};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::prompts;

/// Which prompt a request carries, judged by its system message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Plan,
    Keywords,
    Rerank,
    Summarize,
    Judge,
    Unknown,
}

fn head(template: &str) -> &str {
    let t = template.trim_start();
    &t[..t.find('{').unwrap_or(t.len()).min(24)]
}

pub fn stage_of(req: &CompletionRequest) -> Stage {
    let system = req
        .messages
        .first()
        .map(|m| m.content.trim_start())
        .unwrap_or("");
    if system.starts_with(head(prompts::PLANNING_SYSTEM)) {
        Stage::Plan
    } else if system.starts_with(head(prompts::KEYWORD_SYSTEM)) {
        Stage::Keywords
    } else if system.starts_with(head(prompts::RERANK_SYSTEM)) {
        Stage::Rerank
    } else if system.starts_with(head(prompts::SUMMARY_SYSTEM)) {
        Stage::Summarize
    } else if system.starts_with(head(prompts::JUDGE_SYSTEM)) {
        Stage::Judge
    } else {
        Stage::Unknown
    }
}

type Responder = dyn Fn(Stage, &CompletionRequest) -> Result<String> + Send + Sync;

/// Answers each request through a closure keyed on the prompt stage, recording every call.
pub struct ScriptedLm {
    responder: Box<Responder>,
    calls: Mutex<Vec<(Stage, CompletionRequest)>>,
}

impl ScriptedLm {
    pub fn new(
        responder: impl Fn(Stage, &CompletionRequest) -> Result<String> + Send + Sync + 'static,
    ) -> Self {
        Self {
            responder: Box::new(responder),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<(Stage, CompletionRequest)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, stage: Stage) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(s, _)| *s == stage)
            .count()
    }
}

#[async_trait::async_trait]
impl LanguageModel for ScriptedLm {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn complete(&self, req: &CompletionRequest) -> Result<String> {
        let stage = stage_of(req);
        self.calls.lock().unwrap().push((stage, req.clone()));
        (self.responder)(stage, req)
    }
}

/// Returns queued responses in order; panics when the queue runs dry.
pub struct SequentialLm {
    responses: Mutex<Vec<Result<String>>>,
}

impl SequentialLm {
    pub fn new(responses: Vec<Result<String>>) -> Self {
        Self {
            responses: Mutex::new(responses),
        }
    }

    pub fn texts(responses: &[&str]) -> Self {
        Self::new(responses.iter().map(|s| Ok(s.to_string())).collect())
    }
}

#[async_trait::async_trait]
impl LanguageModel for SequentialLm {
    fn name(&self) -> &'static str {
        "sequential"
    }

    async fn complete(&self, _req: &CompletionRequest) -> Result<String> {
        let mut responses = self.responses.lock().unwrap();
        if responses.is_empty() {
            panic!("SequentialLm: no more responses");
        }
        responses.remove(0)
    }
}

/// Keyword -> (url, title) hits. Unknown keywords return no results.
#[derive(Default)]
pub struct StaticProvider {
    hits: HashMap<String, Vec<(String, String)>>,
    pub queries: Mutex<Vec<SearchQuery>>,
}

impl StaticProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_hits(mut self, keyword: &str, hits: &[(&str, &str)]) -> Self {
        self.hits.insert(
            keyword.to_string(),
            hits.iter()
                .map(|(u, t)| (u.to_string(), t.to_string()))
                .collect(),
        );
        self
    }
}

#[async_trait::async_trait]
impl SearchProvider for StaticProvider {
    fn name(&self) -> &'static str {
        "static"
    }

    async fn search(&self, q: &SearchQuery) -> Result<SearchResponse> {
        self.queries.lock().unwrap().push(q.clone());
        let results = self
            .hits
            .get(&q.query)
            .cloned()
            .unwrap_or_default()
            .into_iter()
            .map(|(url, title)| SearchResult {
                url,
                title: Some(title),
                snippet: None,
                source: "static".to_string(),
            })
            .collect();
        Ok(SearchResponse {
            results,
            provider: "static".to_string(),
            timings_ms: BTreeMap::new(),
        })
    }
}

pub struct FailingProvider;

#[async_trait::async_trait]
impl SearchProvider for FailingProvider {
    fn name(&self) -> &'static str {
        "failing"
    }

    async fn search(&self, _q: &SearchQuery) -> Result<SearchResponse> {
        Err(Error::Search("HTTP 401 Unauthorized".to_string()))
    }
}

/// url -> text. Unknown urls extract to "", and `panic_on` urls panic inside the task.
/// Tracks how many extractions overlap.
#[derive(Default)]
pub struct MapExtractor {
    pages: HashMap<String, String>,
    panic_on: Vec<String>,
    delay_ms: u64,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

impl MapExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page(mut self, url: &str, text: impl Into<String>) -> Self {
        self.pages.insert(url.to_string(), text.into());
        self
    }

    pub fn panicking_on(mut self, url: &str) -> Self {
        self.panic_on.push(url.to_string());
        self
    }

    pub fn with_delay_ms(mut self, ms: u64) -> Self {
        self.delay_ms = ms;
        self
    }

    pub fn peak_in_flight(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl ContentExtractor for MapExtractor {
    async fn extract(&self, url: &str) -> String {
        if self.panic_on.iter().any(|u| u == url) {
            panic!("extractor blew up on {url}");
        }
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        if self.delay_ms > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(self.delay_ms)).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.pages.get(url).cloned().unwrap_or_default()
    }
}

/// A page body that passes the default length filter.
pub fn page(tag: &str) -> String {
    format!("{tag}: {}", "lorem ipsum dolor sit amet ".repeat(4))
}
