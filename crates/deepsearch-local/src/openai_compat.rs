use deepsearch_core::{ChatMessage, CompletionRequest, Error, LanguageModel, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::env_first;

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "gpt-4.1";

fn base_url_from_env() -> Option<String> {
    env_first(&["DEEPSEARCH_LLM_BASE_URL", "BASE_URL"])
}

fn api_key_from_env() -> Option<String> {
    env_first(&["DEEPSEARCH_LLM_API_KEY", "OPENAI_API_KEY", "OPEN_AI_KEY"])
}

fn model_from_env() -> Option<String> {
    env_first(&["DEEPSEARCH_LLM_MODEL"])
}

fn timeout_ms_from_env() -> u64 {
    env_first(&["DEEPSEARCH_LLM_TIMEOUT_MS"])
        .and_then(|s| s.parse::<u64>().ok())
        .unwrap_or(120_000)
        .clamp(1_000, 600_000)
}

/// True when either an API key or an explicit base URL is present.
pub fn configured() -> bool {
    api_key_from_env().is_some() || base_url_from_env().is_some()
}

/// Chat-completions client for any OpenAI-compatible endpoint.
#[derive(Debug, Clone)]
pub struct OpenAiCompatClient {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
    timeout_ms: u64,
}

impl OpenAiCompatClient {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            api_key,
            model: DEFAULT_MODEL.to_string(),
            timeout_ms: 120_000,
        }
    }

    /// Keyless local endpoints are allowed, but at least one of key or base URL must be set.
    pub fn from_env(client: reqwest::Client, model_override: Option<String>) -> Result<Self> {
        let api_key = api_key_from_env();
        let base_url = base_url_from_env();
        if api_key.is_none() && base_url.is_none() {
            return Err(Error::NotConfigured(
                "missing DEEPSEARCH_LLM_API_KEY (or OPENAI_API_KEY) and DEEPSEARCH_LLM_BASE_URL"
                    .to_string(),
            ));
        }
        let model = model_override
            .or_else(model_from_env)
            .unwrap_or_else(|| DEFAULT_MODEL.to_string());
        Ok(Self {
            client,
            base_url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            api_key,
            model,
            timeout_ms: timeout_ms_from_env(),
        })
    }

    fn endpoint_chat_completions(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }
}

#[async_trait::async_trait]
impl LanguageModel for OpenAiCompatClient {
    fn name(&self) -> &'static str {
        "openai_compat"
    }

    async fn complete(&self, req: &CompletionRequest) -> Result<String> {
        let body = ChatCompletionsRequest {
            model: req.model.as_deref().unwrap_or(&self.model),
            messages: &req.messages,
            max_tokens: req.max_tokens,
            temperature: req.temperature,
            stream: Some(false),
        };

        let mut rb = self
            .client
            .post(self.endpoint_chat_completions())
            .timeout(Duration::from_millis(self.timeout_ms))
            .header(reqwest::header::CONTENT_TYPE, "application/json");
        if let Some(k) = &self.api_key {
            rb = rb.header(reqwest::header::AUTHORIZATION, format!("Bearer {k}"));
        }

        let t0 = std::time::Instant::now();
        let resp = rb
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::Llm(e.to_string()))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(Error::Llm(format!(
                "openai_compat chat.completions HTTP {status}"
            )));
        }

        let parsed: ChatCompletionsResponse =
            resp.json().await.map_err(|e| Error::Llm(e.to_string()))?;
        tracing::debug!(
            model = body.model,
            messages = req.messages.len(),
            elapsed_ms = t0.elapsed().as_millis() as u64,
            "chat completion"
        );
        Ok(parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default())
    }
}

#[derive(Debug, Serialize)]
struct ChatCompletionsRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream: Option<bool>,
}

#[derive(Debug, Clone, Deserialize)]
struct ChatCompletionsResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Clone, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Clone, Deserialize)]
struct ChoiceMessage {
    // Some servers send `null` content for tool-call turns.
    content: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{http::HeaderMap, http::StatusCode, routing::post, Json, Router};
    use std::net::SocketAddr;

    async fn serve(app: Router) -> SocketAddr {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr: SocketAddr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        addr
    }

    #[tokio::test]
    async fn sends_full_message_list_model_and_temperature() {
        let app = Router::new().route(
            "/v1/chat/completions",
            post(|headers: HeaderMap, Json(body): Json<serde_json::Value>| async move {
                let auth = headers
                    .get("authorization")
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("")
                    .to_string();
                let roles: Vec<String> = body["messages"]
                    .as_array()
                    .map(|ms| {
                        ms.iter()
                            .map(|m| m["role"].as_str().unwrap_or("").to_string())
                            .collect()
                    })
                    .unwrap_or_default();
                let content = format!(
                    "model={} temp={} roles={} auth={}",
                    body["model"].as_str().unwrap_or(""),
                    body["temperature"],
                    roles.join(","),
                    auth
                );
                Json(serde_json::json!({
                    "choices": [{"message": {"role": "assistant", "content": content}}]
                }))
            }),
        );
        let addr = serve(app).await;

        let lm = OpenAiCompatClient::new(
            reqwest::Client::new(),
            format!("http://{addr}/v1/"),
            Some("sk-test".to_string()),
        );
        let req = CompletionRequest::new(vec![
            ChatMessage::system("sys"),
            ChatMessage::user("q"),
            ChatMessage {
                role: deepsearch_core::Role::Assistant,
                content: "a".to_string(),
            },
            ChatMessage::user("again"),
        ])
        .with_model("gpt-test")
        .with_temperature(Some(0.7));

        let out = lm.complete(&req).await.unwrap();
        assert_eq!(
            out,
            "model=gpt-test temp=0.7 roles=system,user,assistant,user auth=Bearer sk-test"
        );
    }

    #[tokio::test]
    async fn default_model_applies_and_null_content_is_empty() {
        let app = Router::new().route(
            "/chat/completions",
            post(|Json(body): Json<serde_json::Value>| async move {
                assert_eq!(body["model"], "gpt-4.1");
                assert!(body.get("temperature").is_none());
                Json(serde_json::json!({"choices": [{"message": {"content": null}}]}))
            }),
        );
        let addr = serve(app).await;

        let lm = OpenAiCompatClient::new(reqwest::Client::new(), format!("http://{addr}"), None);
        let out = lm
            .complete(&CompletionRequest::new(vec![ChatMessage::user("hi")]))
            .await
            .unwrap();
        assert_eq!(out, "");
    }

    #[tokio::test]
    async fn http_error_status_is_an_llm_error() {
        let app = Router::new().route(
            "/chat/completions",
            post(|| async { (StatusCode::TOO_MANY_REQUESTS, "slow down") }),
        );
        let addr = serve(app).await;

        let lm = OpenAiCompatClient::new(reqwest::Client::new(), format!("http://{addr}"), None);
        let err = lm
            .complete(&CompletionRequest::new(vec![ChatMessage::user("hi")]))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Llm(ref m) if m.contains("429")), "{err}");
    }

    #[tokio::test]
    async fn from_env_reads_endpoint_and_model_and_override_wins() {
        const KEYS: [&str; 7] = [
            "DEEPSEARCH_LLM_BASE_URL",
            "BASE_URL",
            "DEEPSEARCH_LLM_API_KEY",
            "OPENAI_API_KEY",
            "OPEN_AI_KEY",
            "DEEPSEARCH_LLM_MODEL",
            "DEEPSEARCH_LLM_TIMEOUT_MS",
        ];
        let app = Router::new().route(
            "/v1/chat/completions",
            post(|Json(body): Json<serde_json::Value>| async move {
                Json(serde_json::json!({
                    "choices": [{"message": {"content": body["model"].as_str().unwrap_or("")}}]
                }))
            }),
        );
        let addr = serve(app).await;

        let saved: Vec<(&str, Option<String>)> =
            KEYS.iter().map(|k| (*k, std::env::var(k).ok())).collect();
        for k in KEYS {
            std::env::remove_var(k);
        }
        assert!(!configured());
        assert!(matches!(
            OpenAiCompatClient::from_env(reqwest::Client::new(), None),
            Err(Error::NotConfigured(_))
        ));

        std::env::set_var("DEEPSEARCH_LLM_BASE_URL", format!("http://{addr}/v1"));
        std::env::set_var("DEEPSEARCH_LLM_MODEL", "env-model");
        let req = CompletionRequest::new(vec![ChatMessage::user("hi")]);

        let lm = OpenAiCompatClient::from_env(reqwest::Client::new(), None).unwrap();
        assert_eq!(lm.complete(&req).await.unwrap(), "env-model");

        let lm = OpenAiCompatClient::from_env(reqwest::Client::new(), Some("flag-model".into()))
            .unwrap();
        assert_eq!(lm.complete(&req).await.unwrap(), "flag-model");

        for (k, v) in saved {
            match v {
                Some(val) => std::env::set_var(k, val),
                None => std::env::remove_var(k),
            }
        }
    }
}
