//! Iterative web research: plan sub-questions, search and extract sources, summarize with
//! citations, and judge completeness, replanning until done or out of iterations.
//!
//! All collaborators (language model, search provider, content extractor) arrive as
//! `Arc<dyn _>` trait objects from `deepsearch-core`; this crate performs no I/O of its own.

pub mod config;
pub mod controller;
pub mod error;
pub mod judge;
pub mod keywords;
pub mod model;
pub mod parse;
pub mod pipeline;
pub mod planner;
pub mod prompts;
pub mod rerank;
pub mod summarize;

#[cfg(test)]
mod test_support;

pub use config::ResearchConfig;
pub use controller::{DeepSearch, Outcome, ResearchReport};
pub use error::ResearchError;
pub use model::{Plan, Reference, ReferenceMap, ResearchState, Step, StepId, RETHINK_MARKER};
