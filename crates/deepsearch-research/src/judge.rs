use deepsearch_core::{ChatMessage, CompletionRequest, LanguageModel, Result};
use std::sync::Arc;

use crate::model::ResearchState;
use crate::parse::judge_says_complete;
use crate::prompts::{render, JUDGE_SYSTEM};

/// Binary gate: do the accumulated summaries answer the original query?
#[derive(Clone)]
pub struct CompletionJudge {
    lm: Arc<dyn LanguageModel>,
    model: String,
}

impl CompletionJudge {
    pub fn new(lm: Arc<dyn LanguageModel>, model: impl Into<String>) -> Self {
        Self {
            lm,
            model: model.into(),
        }
    }

    pub async fn is_complete(&self, query: &str, state: &ResearchState) -> Result<bool> {
        let req = CompletionRequest::new(vec![ChatMessage::system(render(
            JUDGE_SYSTEM,
            query,
            &state.to_prompt_text(),
        ))])
        .with_model(&self.model);

        let raw = self.lm.complete(&req).await?;
        let done = judge_says_complete(&raw);
        tracing::info!(done, entries = state.len(), "judged");
        Ok(done)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::SequentialLm;

    #[tokio::test]
    async fn ambiguous_answers_mean_keep_going() {
        let lm = Arc::new(SequentialLm::texts(&["True", "False", "", "maybe?", "It is True."]));
        let j = CompletionJudge::new(lm, "m");
        let st = ResearchState::new();
        let mut got = Vec::new();
        for _ in 0..5 {
            got.push(j.is_complete("q", &st).await.unwrap());
        }
        assert_eq!(got, vec![true, false, false, false, true]);
    }
}
