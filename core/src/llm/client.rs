use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, error};

use super::completion::{Completion, CompletionError};
use crate::{Result, TutorError};

/// Configuration for ChatCompletionClient loaded from environment variables
#[derive(Debug, Clone)]
pub struct LlmClientConfig {
    pub base_url: String, // e.g., http://localhost:8000/v1
    pub model: String,
    pub api_key: Option<String>,
    pub request_timeout_ms: u64,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for LlmClientConfig {
    fn default() -> Self {
        Self {
            base_url: std::env::var("TUTOR_LLM_BASE_URL")
                .ok()
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| "http://localhost:8000/v1".to_string()),
            model: std::env::var("TUTOR_LLM_MODEL")
                .ok()
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| "qwen2.5-7b-instruct".to_string()),
            api_key: std::env::var("TUTOR_LLM_API_KEY")
                .ok()
                .filter(|s| !s.is_empty()),
            request_timeout_ms: std::env::var("REQUEST_TIMEOUT_MS")
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(60_000),
            temperature: std::env::var("TUTOR_LLM_TEMPERATURE")
                .ok()
                .and_then(|v| v.parse::<f32>().ok())
                .unwrap_or(0.7),
            max_tokens: 1024,
        }
    }
}

/// HTTP client for an OpenAI-compatible Chat Completions endpoint.
///
/// The rendered prompt goes out as a single user message.
#[derive(Clone)]
pub struct ChatCompletionClient {
    http: Client,
    cfg: LlmClientConfig,
}

impl ChatCompletionClient {
    pub fn new(cfg: LlmClientConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_millis(cfg.request_timeout_ms))
            .build()
            .map_err(|e| TutorError::Completion(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self { http, cfg })
    }

    pub fn from_env() -> Result<Self> {
        Self::new(LlmClientConfig::default())
    }

    pub fn config(&self) -> &LlmClientConfig {
        &self.cfg
    }
}

#[async_trait]
impl Completion for ChatCompletionClient {
    async fn complete(&self, prompt: &str) -> std::result::Result<String, CompletionError> {
        let url = format!(
            "{}/chat/completions",
            self.cfg.base_url.trim_end_matches('/')
        );
        debug!(target: "llm_client", url = %url, prompt_chars = prompt.len(), "POST chat completion");

        let mut req = self
            .http
            .post(&url)
            .header("content-type", "application/json");
        if let Some(key) = &self.cfg.api_key {
            req = req.bearer_auth(key);
        }

        let body = json!({
            "model": self.cfg.model,
            "messages": [{"role": "user", "content": prompt}],
            "max_tokens": self.cfg.max_tokens,
            "temperature": self.cfg.temperature,
        });

        let resp = req
            .json(&body)
            .send()
            .await
            .map_err(|e| CompletionError::Request(e.to_string()))?;
        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            error!(target: "llm_client", status = status, body = %body, "Chat Completions error");
            return Err(CompletionError::Status { status, body });
        }

        let val: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| CompletionError::Decode(e.to_string()))?;
        extract_text_from_chat_completions(&val).ok_or(CompletionError::Empty)
    }
}

fn extract_text_from_chat_completions(v: &serde_json::Value) -> Option<String> {
    v.get("choices")?
        .get(0)?
        .get("message")?
        .get("content")?
        .as_str()
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
}
