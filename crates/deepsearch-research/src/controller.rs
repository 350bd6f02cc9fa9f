use deepsearch_core::{ContentExtractor, LanguageModel, SearchProvider};
use serde::Serialize;
use std::sync::Arc;

use crate::config::ResearchConfig;
use crate::error::ResearchError;
use crate::judge::CompletionJudge;
use crate::keywords::KeywordGenerator;
use crate::model::{Plan, ReferenceMap, ResearchState, Step};
use crate::pipeline::SearchPipeline;
use crate::planner::Planner;
use crate::prompts::contextualized_question;
use crate::rerank::Reranker;
use crate::summarize::Summarizer;

/// How a run that produced a result ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// The judge declared the research complete.
    Done,
    /// The iteration bound was hit first.
    Exhausted,
}

#[derive(Debug, Clone)]
pub struct ResearchReport {
    pub state: ResearchState,
    pub outcome: Outcome,
    /// Completed plan/execute/judge passes.
    pub iterations: usize,
    pub steps_executed: usize,
    pub rethinks: usize,
}

/// Per-run counters; never outlive one `run`.
#[derive(Debug, Default)]
struct IterationContext {
    iteration: usize,
    steps_executed: usize,
    rethinks: usize,
}

enum Phase {
    Planning,
    Executing(Plan),
    Judging,
}

/// The research loop: plan, execute each step, judge, replan.
#[derive(Clone)]
pub struct DeepSearch {
    planner: Planner,
    keywords: KeywordGenerator,
    pipeline: SearchPipeline,
    summarizer: Summarizer,
    judge: CompletionJudge,
    cfg: ResearchConfig,
}

impl DeepSearch {
    pub fn new(
        lm: Arc<dyn LanguageModel>,
        provider: Arc<dyn SearchProvider>,
        extractor: Arc<dyn ContentExtractor>,
        cfg: ResearchConfig,
    ) -> Self {
        let reranker = Reranker::new(lm.clone(), cfg.model.clone(), cfg.rerank_temperature);
        Self {
            planner: Planner::new(lm.clone(), cfg.model.clone()),
            keywords: KeywordGenerator::new(lm.clone(), cfg.model.clone()),
            pipeline: SearchPipeline::new(provider, extractor, reranker, &cfg),
            summarizer: Summarizer::new(lm.clone(), cfg.model.clone()),
            judge: CompletionJudge::new(lm, cfg.model.clone()),
            cfg,
        }
    }

    pub async fn run(&self, query: &str) -> Result<ResearchReport, ResearchError> {
        let mut state = ResearchState::new();
        let mut ctx = IterationContext::default();
        let mut phase = Phase::Planning;
        tracing::info!(max_iterations = self.cfg.max_iterations, "research started");

        loop {
            phase = match phase {
                Phase::Planning => {
                    // The very first plan sees only the query; every later one sees the state.
                    let prior = (ctx.iteration > 0 || ctx.rethinks > 0).then_some(&state);
                    let plan = self
                        .planner
                        .plan(query, prior)
                        .await
                        .map_err(ResearchError::Plan)?;
                    Phase::Executing(plan)
                }
                Phase::Executing(plan) => self.execute_plan(&plan, &mut state, &mut ctx).await?,
                Phase::Judging => {
                    ctx.iteration += 1;
                    let done = self
                        .judge
                        .is_complete(query, &state)
                        .await
                        .map_err(ResearchError::Judge)?;
                    if done || ctx.iteration >= self.cfg.max_iterations {
                        let outcome = if done {
                            Outcome::Done
                        } else {
                            Outcome::Exhausted
                        };
                        tracing::info!(
                            ?outcome,
                            iterations = ctx.iteration,
                            steps = ctx.steps_executed,
                            entries = state.len(),
                            "research finished"
                        );
                        return Ok(ResearchReport {
                            state,
                            outcome,
                            iterations: ctx.iteration,
                            steps_executed: ctx.steps_executed,
                            rethinks: ctx.rethinks,
                        });
                    }
                    Phase::Planning
                }
            };
        }
    }

    /// Runs steps in order. A rethink step abandons the rest of the plan.
    async fn execute_plan(
        &self,
        plan: &Plan,
        state: &mut ResearchState,
        ctx: &mut IterationContext,
    ) -> Result<Phase, ResearchError> {
        for step in plan.steps() {
            if step.is_rethink() {
                if ctx.rethinks < self.cfg.max_rethinks {
                    ctx.rethinks += 1;
                    tracing::info!(step = %step.step, rethinks = ctx.rethinks, "rethink; replanning");
                    return Ok(Phase::Planning);
                }
                tracing::warn!(step = %step.step, "rethink budget spent; skipping step");
                continue;
            }
            let summary = self.execute_step(step, state).await?;
            state.insert(step.sub_question.clone(), summary);
            ctx.steps_executed += 1;
        }
        Ok(Phase::Judging)
    }

    async fn execute_step(
        &self,
        step: &Step,
        state: &ResearchState,
    ) -> Result<String, ResearchError> {
        let sub_question = step.sub_question.as_str();
        tracing::info!(step = %step.step, sub_question, "executing step");

        let keywords = self
            .keywords
            .keywords(sub_question, &state.to_prompt_text())
            .await
            .map_err(|source| ResearchError::Keywords {
                sub_question: sub_question.to_string(),
                source,
            })?;

        let mut refs = ReferenceMap::new();
        for keyword in &keywords {
            let question = contextualized_question(sub_question, keyword);
            refs.extend(self.pipeline.research(keyword, &question).await?);
        }

        self.summarizer
            .summarize(&refs, sub_question)
            .await
            .map_err(|source| ResearchError::Summarize {
                sub_question: sub_question.to_string(),
                source,
            })
    }

    /// Tool-boundary form of [`DeepSearch::run`]: the state as a JSON object, or
    /// `{"error": ...}`. Never fails.
    pub async fn web_deep_search(&self, query: &str) -> serde_json::Value {
        match self.run(query).await {
            Ok(report) => report.state.to_json(),
            Err(e) => {
                tracing::error!(stage = e.stage(), error = %e, "research failed");
                serde_json::json!({ "error": e.to_string() })
            }
        }
    }
}
