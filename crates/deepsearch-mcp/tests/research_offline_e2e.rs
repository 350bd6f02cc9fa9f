//! Full research loop against local stubs: an OpenAI-compatible `/v1/chat/completions`
//! that answers by system prompt, a SearXNG `/search`, and one article page.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

const QUESTION: &str = "What is the Rust programming language?";
const SUB_QUESTION: &str = "What is Rust designed for?";
const SUMMARY: &str = "Rust is a systems language focused on memory safety [Reference 0].";

const PROVIDER_KEYS: [&str; 8] = [
    "DEEPSEARCH_BING_API_KEY",
    "BING_API_KEY",
    "Bing_API_KEY",
    "DEEPSEARCH_BRAVE_API_KEY",
    "BRAVE_SEARCH_API_KEY",
    "DEEPSEARCH_TAVILY_API_KEY",
    "TAVILY_API_KEY",
    "DEEPSEARCH_SEARXNG_ENDPOINTS",
];

fn completion(system: &str) -> String {
    if system.contains("Task Planning Agent") {
        format!("Plan:\n```json\n[{{\"step\": 1, \"sub_question\": \"{SUB_QUESTION}\"}}]\n```")
    } else if system.contains("web search keywords") {
        r#"["rust language"]"#.to_string()
    } else if system.starts_with("You are a search engine") {
        r#"{"relevant_titles": [0]}"#.to_string()
    } else if system.contains("Process the following input") {
        assert!(system.contains("/article"), "summary prompt lacks the reference url");
        SUMMARY.to_string()
    } else if system.contains("task-completion assessor") {
        "True".to_string()
    } else {
        String::new()
    }
}

async fn serve_stubs(lm_calls: Arc<AtomicUsize>) -> std::io::Result<SocketAddr> {
    use axum::{
        extract::Query,
        http::{header, HeaderMap, StatusCode},
        routing::{get, post},
        Json, Router,
    };
    use std::collections::HashMap;

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let page_url = format!("http://{addr}/article");

    let app = Router::new()
        .route(
            "/v1/chat/completions",
            post(move |headers: HeaderMap, Json(body): Json<serde_json::Value>| {
                let lm_calls = lm_calls.clone();
                async move {
                    lm_calls.fetch_add(1, Ordering::SeqCst);
                    let auth = headers
                        .get(header::AUTHORIZATION)
                        .and_then(|v| v.to_str().ok())
                        .unwrap_or("");
                    if auth != "Bearer sk-test" {
                        return (StatusCode::UNAUTHORIZED, Json(serde_json::json!({})));
                    }
                    let system = body["messages"][0]["content"].as_str().unwrap_or("");
                    let content = completion(system.trim_start());
                    (
                        StatusCode::OK,
                        Json(serde_json::json!({
                            "choices": [{"message": {"role": "assistant", "content": content}}]
                        })),
                    )
                }
            }),
        )
        .route(
            "/search",
            get(move |Query(q): Query<HashMap<String, String>>| {
                let page_url = page_url.clone();
                async move {
                    assert_eq!(q.get("format").map(String::as_str), Some("json"));
                    Json(serde_json::json!({
                        "results": [
                            {"url": page_url, "title": "The Rust Programming Language", "content": "rust"}
                        ]
                    }))
                }
            }),
        )
        .route(
            "/article",
            get(|| async {
                (
                    [(header::CONTENT_TYPE, "text/html")],
                    "<html><body><article><h1>Rust</h1><p>Rust is a general-purpose language that \
                     offers memory safety without garbage collection, using an ownership model \
                     checked at compile time.</p></article></body></html>",
                )
            }),
        );
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("axum serve");
    });
    Ok(addr)
}

fn configure_env(cmd: &mut tokio::process::Command, addr: SocketAddr) {
    cmd.env_remove("DEEPSEARCH_ENV_FILE");
    cmd.env_remove("DEEPSEARCH_LLM_MODEL");
    cmd.env_remove("DEEPSEARCH_SEARCH_PROVIDER");
    cmd.env_remove("DEEPSEARCH_MAX_ITERATIONS");
    for k in PROVIDER_KEYS {
        cmd.env_remove(k);
    }
    cmd.env("DEEPSEARCH_LLM_BASE_URL", format!("http://{addr}/v1"));
    cmd.env("DEEPSEARCH_LLM_API_KEY", "sk-test");
    cmd.env("DEEPSEARCH_SEARXNG_ENDPOINT", format!("http://{addr}"));
    cmd.env("NO_PROXY", "127.0.0.1,localhost");
    cmd.env("RUST_LOG", "error");
}

#[test]
fn research_cli_returns_summary_map() {
    let rt = tokio::runtime::Runtime::new().expect("tokio runtime");
    rt.block_on(async {
        let lm_calls = Arc::new(AtomicUsize::new(0));
        let addr = serve_stubs(lm_calls.clone()).await?;

        let bin = assert_cmd::cargo::cargo_bin!("deepsearch");
        let mut cmd = tokio::process::Command::new(bin);
        cmd.args(["research", QUESTION]);
        configure_env(&mut cmd, addr);
        let out = cmd.output().await?;

        let stdout = String::from_utf8_lossy(&out.stdout);
        assert!(out.status.success(), "stdout={stdout}");
        let v: serde_json::Value = serde_json::from_str(&stdout)?;
        let obj = v.as_object().expect("object payload");
        assert_eq!(obj.len(), 1, "{v}");
        assert_eq!(v[SUB_QUESTION].as_str(), Some(SUMMARY));

        // plan, keywords, rerank, summarize, judge
        assert_eq!(lm_calls.load(Ordering::SeqCst), 5);
        Ok::<(), Box<dyn std::error::Error>>(())
    })
    .expect("research cli e2e");
}

#[test]
fn research_cli_reports_error_and_exit_code_when_unconfigured() {
    use assert_cmd::Command;
    use predicates::prelude::*;

    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("deepsearch"));
    cmd.args(["research", QUESTION])
        .env_remove("DEEPSEARCH_ENV_FILE")
        .env_remove("DEEPSEARCH_LLM_API_KEY")
        .env_remove("OPENAI_API_KEY")
        .env_remove("OPEN_AI_KEY")
        .env_remove("DEEPSEARCH_LLM_BASE_URL")
        .env_remove("BASE_URL");
    cmd.assert()
        .code(2)
        .stdout(predicate::str::contains("\"error\""));
}

#[test]
fn mcp_web_deep_search_returns_summary_map() {
    let rt = tokio::runtime::Runtime::new().expect("tokio runtime");
    rt.block_on(async {
        use rmcp::{
            model::CallToolRequestParam,
            service::ServiceExt,
            transport::{ConfigureCommandExt, TokioChildProcess},
        };

        let lm_calls = Arc::new(AtomicUsize::new(0));
        let addr = serve_stubs(lm_calls.clone()).await?;

        let bin = assert_cmd::cargo::cargo_bin!("deepsearch");
        let service = ()
            .serve(TokioChildProcess::new(
                tokio::process::Command::new(bin).configure(|cmd| {
                    cmd.args(["mcp-stdio"]);
                    configure_env(cmd, addr);
                }),
            )?)
            .await?;

        let r = service
            .call_tool(CallToolRequestParam {
                name: "web_deep_search".into(),
                arguments: Some(
                    serde_json::json!({ "query": QUESTION })
                        .as_object()
                        .cloned()
                        .unwrap(),
                ),
            })
            .await?;
        let s = r
            .content
            .get(0)
            .and_then(|c| c.as_text())
            .map(|t| t.text.clone())
            .unwrap_or_default();
        let v: serde_json::Value = serde_json::from_str(&s)?;
        assert!(v.get("error").is_none(), "{v}");
        assert_eq!(v[SUB_QUESTION].as_str(), Some(SUMMARY));

        service.cancel().await?;
        Ok::<(), Box<dyn std::error::Error>>(())
    })
    .expect("mcp web_deep_search e2e");
}
