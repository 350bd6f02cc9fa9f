use deepsearch_core::Error;

/// A failure that aborts a research run, tagged with the stage that raised it.
#[derive(thiserror::Error, Debug)]
pub enum ResearchError {
    #[error("planning failed: {0}")]
    Plan(#[source] Error),
    #[error("keyword generation failed for {sub_question:?}: {source}")]
    Keywords {
        sub_question: String,
        #[source]
        source: Error,
    },
    #[error("relevance reranking failed for {keyword:?}: {source}")]
    Rerank {
        keyword: String,
        #[source]
        source: Error,
    },
    #[error("summarization failed for {sub_question:?}: {source}")]
    Summarize {
        sub_question: String,
        #[source]
        source: Error,
    },
    #[error("completion judgment failed: {0}")]
    Judge(#[source] Error),
}

impl ResearchError {
    pub fn stage(&self) -> &'static str {
        match self {
            ResearchError::Plan(_) => "plan",
            ResearchError::Keywords { .. } => "keywords",
            ResearchError::Rerank { .. } => "rerank",
            ResearchError::Summarize { .. } => "summarize",
            ResearchError::Judge(_) => "judge",
        }
    }
}
