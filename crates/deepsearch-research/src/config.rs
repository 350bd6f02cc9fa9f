/// Tunables for one research run.
#[derive(Debug, Clone, PartialEq)]
pub struct ResearchConfig {
    /// Model identifier sent with every completion request.
    pub model: String,
    /// Plan/execute/judge passes before the run stops with whatever it has.
    pub max_iterations: usize,
    /// Search result pages per keyword (10 results per page).
    pub page_count: usize,
    pub market: String,
    /// Extracted texts shorter than this are treated as failed extractions.
    pub min_content_chars: usize,
    /// Extracted texts at or above this length are dropped.
    pub max_content_chars: usize,
    pub rerank_temperature: f64,
    /// Rethink replans allowed per run; further rethink steps are skipped.
    pub max_rethinks: usize,
}

pub const RESULTS_PER_PAGE: usize = 10;

impl Default for ResearchConfig {
    fn default() -> Self {
        Self {
            model: "gpt-4.1".to_string(),
            max_iterations: 3,
            page_count: 1,
            market: "en-US".to_string(),
            min_content_chars: 50,
            max_content_chars: 10_000,
            rerank_temperature: 0.7,
            max_rethinks: 3,
        }
    }
}

fn env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn env_usize(key: &str) -> Option<usize> {
    let raw = env(key)?;
    match raw.parse::<usize>() {
        Ok(n) => Some(n),
        Err(_) => {
            tracing::warn!(key, value = %raw, "ignoring non-numeric env override");
            None
        }
    }
}

impl ResearchConfig {
    /// Defaults overridden by `DEEPSEARCH_LLM_MODEL`, `DEEPSEARCH_MAX_ITERATIONS`,
    /// `DEEPSEARCH_PAGE_COUNT`, `DEEPSEARCH_MARKET`.
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            model: env("DEEPSEARCH_LLM_MODEL").unwrap_or(d.model),
            max_iterations: env_usize("DEEPSEARCH_MAX_ITERATIONS")
                .unwrap_or(d.max_iterations)
                .clamp(1, 10),
            page_count: env_usize("DEEPSEARCH_PAGE_COUNT")
                .unwrap_or(d.page_count)
                .clamp(1, 5),
            market: env("DEEPSEARCH_MARKET").unwrap_or(d.market),
            ..d
        }
    }

    pub fn with_max_iterations(mut self, n: usize) -> Self {
        self.max_iterations = n.max(1);
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn result_count(&self) -> usize {
        self.page_count.max(1) * RESULTS_PER_PAGE
    }
}
