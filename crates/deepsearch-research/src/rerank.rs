use deepsearch_core::{ChatMessage, CompletionRequest, LanguageModel, Result};
use std::sync::Arc;

use crate::parse::{selection_or_identity, Selection};
use crate::prompts::render_rerank;

/// Asks the model which search-result titles are relevant to a question.
#[derive(Clone)]
pub struct Reranker {
    lm: Arc<dyn LanguageModel>,
    model: String,
    temperature: f64,
}

impl Reranker {
    pub fn new(lm: Arc<dyn LanguageModel>, model: impl Into<String>, temperature: f64) -> Self {
        Self {
            lm,
            model: model.into(),
            temperature,
        }
    }

    /// Indices into `titles`. Malformed output keeps every title.
    pub async fn rerank(&self, question: &str, titles: &[String]) -> Result<Selection> {
        let req = CompletionRequest::new(vec![ChatMessage::system(render_rerank(
            titles, question,
        ))])
        .with_model(&self.model)
        .with_temperature(Some(self.temperature));

        let raw = self.lm.complete(&req).await?;
        let sel = selection_or_identity(&raw, titles.len());
        if sel.fell_back {
            tracing::warn!(
                titles = titles.len(),
                "reranker output unusable; keeping all results"
            );
        } else {
            tracing::debug!(kept = sel.indices.len(), of = titles.len(), "reranked");
        }
        Ok(sel)
    }
}
