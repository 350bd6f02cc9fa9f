use deepsearch_core::{ChatMessage, CompletionRequest, LanguageModel, Result};
use std::sync::Arc;

use crate::parse::parse_keywords;
use crate::prompts::{render, KEYWORD_SYSTEM};

/// Derives search keyword strings for one sub-question.
#[derive(Clone)]
pub struct KeywordGenerator {
    lm: Arc<dyn LanguageModel>,
    model: String,
}

impl KeywordGenerator {
    pub fn new(lm: Arc<dyn LanguageModel>, model: impl Into<String>) -> Self {
        Self {
            lm,
            model: model.into(),
        }
    }

    /// `known` is the research gathered so far, so the model can skip covered facets.
    ///
    /// Never empty: unparseable output becomes a single keyword (the raw text, or the
    /// sub-question itself when the model returned nothing).
    pub async fn keywords(&self, sub_question: &str, known: &str) -> Result<Vec<String>> {
        let req = CompletionRequest::new(vec![
            ChatMessage::system(render(KEYWORD_SYSTEM, sub_question, known)),
            ChatMessage::user(sub_question),
        ])
        .with_model(&self.model);

        let raw = self.lm.complete(&req).await?;
        match parse_keywords(&raw) {
            Some(kws) => {
                tracing::debug!(count = kws.len(), "keywords");
                Ok(kws)
            }
            None => {
                let fallback = match raw.trim() {
                    "" => sub_question.trim(),
                    t => t,
                };
                tracing::warn!(
                    raw_len = raw.len(),
                    "keyword output had no bracketed list; using raw response"
                );
                Ok(vec![fallback.to_string()])
            }
        }
    }
}
