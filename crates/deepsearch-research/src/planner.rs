use deepsearch_core::{ChatMessage, CompletionRequest, LanguageModel, Result};
use std::sync::Arc;

use crate::model::{Plan, ResearchState};
use crate::parse::parse_plan;
use crate::prompts::{PLANNING_SYSTEM, REPLAN_SUFFIX};

/// Produces and revises the TODO list.
#[derive(Clone)]
pub struct Planner {
    lm: Arc<dyn LanguageModel>,
    model: String,
}

impl Planner {
    pub fn new(lm: Arc<dyn LanguageModel>, model: impl Into<String>) -> Self {
        Self {
            lm,
            model: model.into(),
        }
    }

    /// Initial plan when `prior` is `None`; a revision carrying the research so far otherwise.
    pub async fn plan(&self, query: &str, prior: Option<&ResearchState>) -> Result<Plan> {
        let user = match prior {
            None => query.to_string(),
            Some(state) => format!("{query}{REPLAN_SUFFIX}{}", state.to_prompt_text()),
        };
        let req = CompletionRequest::new(vec![
            ChatMessage::system(PLANNING_SYSTEM),
            ChatMessage::user(user),
        ])
        .with_model(&self.model);

        let raw = self.lm.complete(&req).await?;
        let plan = parse_plan(&raw)?;
        tracing::info!(
            steps = plan.len(),
            rethink = plan.has_rethink(),
            replan = prior.is_some(),
            "plan ready"
        );
        Ok(plan)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{ScriptedLm, SequentialLm, Stage};
    use deepsearch_core::{Error, Role};

    #[tokio::test]
    async fn initial_plan_sends_query_alone() {
        let lm = Arc::new(ScriptedLm::new(|_, _| {
            Ok(r#"[{"step":"1","sub_question":"a"}]"#.to_string())
        }));
        let planner = Planner::new(lm.clone(), "gpt-test");
        let plan = planner.plan("what is rust?", None).await.unwrap();
        assert_eq!(plan.len(), 1);

        let calls = lm.calls();
        assert_eq!(calls.len(), 1);
        let (stage, req) = &calls[0];
        assert_eq!(*stage, Stage::Plan);
        assert_eq!(req.model.as_deref(), Some("gpt-test"));
        assert_eq!(req.messages[1].role, Role::User);
        assert_eq!(req.messages[1].content, "what is rust?");
    }

    #[tokio::test]
    async fn replan_appends_serialized_state() {
        let lm = Arc::new(ScriptedLm::new(|_, _| {
            Ok(r#"[{"step":1,"sub_question":"b"}]"#.to_string())
        }));
        let planner = Planner::new(lm.clone(), "m");
        let mut st = ResearchState::new();
        st.insert("a", "summary of a");
        planner.plan("q", Some(&st)).await.unwrap();

        let (_, req) = &lm.calls()[0];
        assert_eq!(
            req.messages[1].content,
            "q\n\nTODO List completed but task not finished, please continue planning: {\"a\":\"summary of a\"}"
        );
    }

    #[tokio::test]
    async fn unparseable_output_is_plan_parse_error() {
        let lm = Arc::new(SequentialLm::texts(&["I'd rather not."]));
        let planner = Planner::new(lm, "m");
        assert!(matches!(
            planner.plan("q", None).await,
            Err(Error::PlanParse(_))
        ));
    }
}
