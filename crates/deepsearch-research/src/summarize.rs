use deepsearch_core::{ChatMessage, CompletionRequest, LanguageModel, Result};
use std::sync::Arc;

use crate::model::ReferenceMap;
use crate::prompts::{render, SUMMARY_SYSTEM};

/// Turns a reference map into a cited answer for one sub-question.
#[derive(Clone)]
pub struct Summarizer {
    lm: Arc<dyn LanguageModel>,
    model: String,
}

impl Summarizer {
    pub fn new(lm: Arc<dyn LanguageModel>, model: impl Into<String>) -> Self {
        Self {
            lm,
            model: model.into(),
        }
    }

    pub async fn summarize(&self, refs: &ReferenceMap, sub_question: &str) -> Result<String> {
        let ref_content = serde_json::to_string_pretty(refs).unwrap_or_else(|_| "{}".to_string());
        let req = CompletionRequest::new(vec![
            ChatMessage::system(render(SUMMARY_SYSTEM, sub_question, &ref_content)),
            ChatMessage::user(sub_question),
        ])
        .with_model(&self.model);

        let summary = self.lm.complete(&req).await?;
        tracing::debug!(
            references = refs.len(),
            summary_len = summary.len(),
            "summarized"
        );
        Ok(summary)
    }
}
