use rmcp::{
    handler::server::router::tool::ToolRouter as RmcpToolRouter,
    handler::server::wrapper::Parameters,
    model::{CallToolResult, Content, ServerCapabilities, ServerInfo},
    tool, tool_handler, tool_router,
    transport::stdio,
    ErrorData as McpError, ServiceExt,
};
use schemars::JsonSchema;
use serde::Deserialize;
use std::sync::Arc;

use deepsearch_core::ContentExtractor;
use deepsearch_local::LocalExtractor;
use deepsearch_mcp::{engine_from_env, EngineOptions};

use crate::envelope::ErrorCode;

fn tool_result(payload: serde_json::Value) -> CallToolResult {
    // Structured content for machine consumers plus a text copy for clients that only
    // read `content[0].text`.
    let mut r = CallToolResult::structured(payload.clone());
    r.content = vec![Content::text(payload.to_string())];
    r
}

#[derive(Debug, Deserialize, JsonSchema, Default)]
pub(crate) struct WebDeepSearchArgs {
    /// The research question.
    #[serde(default)]
    pub(crate) query: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema, Default)]
pub(crate) struct GetWebContentArgs {
    /// Absolute http(s) URL to fetch.
    #[serde(default)]
    pub(crate) url: Option<String>,
}

#[derive(Clone)]
pub(crate) struct DeepSearchMcp {
    tool_router: RmcpToolRouter<Self>,
    extractor: Arc<LocalExtractor>,
}

#[tool_router]
impl DeepSearchMcp {
    pub(crate) fn new() -> Result<Self, McpError> {
        let extractor =
            LocalExtractor::from_env().map_err(|e| McpError::internal_error(e.to_string(), None))?;
        Ok(Self {
            tool_router: Self::tool_router(),
            extractor: Arc::new(extractor),
        })
    }

    #[tool(
        description = "Research a question on the web: plans sub-questions, searches, reads pages and returns {sub_question: cited summary}, or {error}"
    )]
    async fn web_deep_search(
        &self,
        params: Parameters<Option<WebDeepSearchArgs>>,
    ) -> Result<CallToolResult, McpError> {
        let args = params.0.unwrap_or_default();
        let query = args.query.unwrap_or_default();
        let query = query.trim();
        if query.is_empty() {
            return Ok(tool_result(
                serde_json::json!({ "error": "query must be non-empty" }),
            ));
        }

        let engine = match engine_from_env(&EngineOptions::default()) {
            Ok(engine) => engine,
            Err(e) => {
                tracing::warn!(code = ErrorCode::from(&e).as_str(), error = %e, "research engine unavailable");
                return Ok(tool_result(serde_json::json!({ "error": e.to_string() })));
            }
        };
        Ok(tool_result(engine.web_deep_search(query).await))
    }

    #[tool(description = "Fetch a URL and return its readable text (empty when the page cannot be read)")]
    async fn get_web_content(
        &self,
        params: Parameters<Option<GetWebContentArgs>>,
    ) -> Result<CallToolResult, McpError> {
        let args = params.0.unwrap_or_default();
        let url = args.url.unwrap_or_default();
        let text = self.extractor.extract(url.trim()).await;
        Ok(CallToolResult::success(vec![Content::text(text)]))
    }
}

#[tool_handler]
impl rmcp::ServerHandler for DeepSearchMcp {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            instructions: Some(
                "Deep web research. web_deep_search runs a multi-step plan/search/summarize loop and can take minutes; get_web_content returns one page's text."
                    .to_string(),
            ),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }
}

pub(crate) async fn serve_stdio() -> Result<(), McpError> {
    let svc = DeepSearchMcp::new()?;
    let running = svc
        .serve(stdio())
        .await
        .map_err(|e| McpError::internal_error(e.to_string(), None))?;
    running
        .waiting()
        .await
        .map_err(|e| McpError::internal_error(e.to_string(), None))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    static ENV_LOCK: Mutex<()> = Mutex::new(());

    fn p<T>(v: T) -> Parameters<Option<T>> {
        Parameters(Some(v))
    }

    fn payload(r: &CallToolResult) -> serde_json::Value {
        if let Some(v) = r.structured_content.clone() {
            return v;
        }
        let s = r
            .content
            .first()
            .and_then(|c| c.as_text())
            .map(|t| t.text.clone())
            .unwrap_or_default();
        serde_json::from_str(&s).unwrap_or_else(|_| serde_json::json!({}))
    }

    #[tokio::test]
    async fn empty_query_is_an_error_object() {
        let svc = DeepSearchMcp::new().unwrap();
        let r = svc
            .web_deep_search(p(WebDeepSearchArgs {
                query: Some("   ".to_string()),
            }))
            .await
            .unwrap();
        let v = payload(&r);
        assert_eq!(v.as_object().map(|o| o.len()), Some(1));
        assert!(v["error"].as_str().unwrap().contains("non-empty"));
    }

    #[tokio::test]
    #[allow(clippy::await_holding_lock)]
    async fn unconfigured_model_is_an_error_object() {
        let _lock = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        for k in [
            "DEEPSEARCH_LLM_API_KEY",
            "OPENAI_API_KEY",
            "OPEN_AI_KEY",
            "DEEPSEARCH_LLM_BASE_URL",
            "BASE_URL",
        ] {
            std::env::remove_var(k);
        }
        let svc = DeepSearchMcp::new().unwrap();
        let r = svc
            .web_deep_search(p(WebDeepSearchArgs {
                query: Some("what is rust?".to_string()),
            }))
            .await
            .unwrap();
        let v = payload(&r);
        assert!(v["error"].as_str().unwrap().contains("not configured"));
    }

    #[tokio::test]
    async fn get_web_content_on_bad_url_is_empty_text() {
        let svc = DeepSearchMcp::new().unwrap();
        let r = svc
            .get_web_content(p(GetWebContentArgs {
                url: Some("ftp://example.com/x".to_string()),
            }))
            .await
            .unwrap();
        let text = r
            .content
            .first()
            .and_then(|c| c.as_text())
            .map(|t| t.text.clone());
        assert_eq!(text.as_deref(), Some(""));
    }
}
