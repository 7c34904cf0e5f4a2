// src/llm/client.rs
// OpenAI-compatible chat completions client

use async_trait::async_trait;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::warn;

use super::LlmBackend;
use crate::config::{ApiKeys, BackendConfig};
use crate::error::{EngineError, Result};

/// Request timeout for blocking completions
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    stream: bool,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StreamChunk {
    choices: Vec<StreamChoice>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    delta: StreamDelta,
}

#[derive(Debug, Deserialize)]
struct StreamDelta {
    content: Option<String>,
}

/// OpenAI-compatible chat client
pub struct OpenAiChat {
    api_key: String,
    url: String,
    model: String,
    http_client: reqwest::Client,
}

impl OpenAiChat {
    /// Create a client from pre-loaded configuration. Returns None when no
    /// API key is available.
    pub fn from_config(api_keys: &ApiKeys, config: &BackendConfig) -> Option<Self> {
        let api_key = api_keys.api_key.clone()?;
        Some(Self {
            api_key,
            url: config.chat_url.clone(),
            model: config.chat_model.clone(),
            http_client: reqwest::Client::builder()
                .timeout(REQUEST_TIMEOUT)
                .build()
                .unwrap_or_else(|_| reqwest::Client::new()),
        })
    }

    /// Create a client from environment configuration.
    pub fn from_env() -> Option<Self> {
        Self::from_config(&ApiKeys::from_env(), &BackendConfig::from_env())
    }

    fn request_body<'a>(&'a self, prompt: &'a str, stream: bool) -> ChatRequest<'a> {
        ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            stream,
        }
    }
}

#[async_trait]
impl LlmBackend for OpenAiChat {
    async fn complete(&self, prompt: &str) -> Result<String> {
        let response = self
            .http_client
            .post(&self.url)
            .bearer_auth(&self.api_key)
            .json(&self.request_body(prompt, false))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(EngineError::Llm(format!("HTTP {status}: {body}")));
        }

        let parsed: ChatResponse = response.json().await?;
        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| EngineError::Llm("empty completion".to_string()))
    }

    async fn complete_stream(&self, prompt: &str, tx: mpsc::Sender<String>) -> Result<()> {
        let response = self
            .http_client
            .post(&self.url)
            .bearer_auth(&self.api_key)
            .json(&self.request_body(prompt, true))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            return Err(EngineError::Llm(format!("HTTP {status}")));
        }

        // SSE framing: lines of "data: {json}", terminated by "data: [DONE]"
        let mut buffer = String::new();
        let mut body = response.bytes_stream();
        while let Some(chunk) = body.next().await {
            let chunk = chunk?;
            buffer.push_str(&String::from_utf8_lossy(&chunk));

            while let Some(newline) = buffer.find('\n') {
                let line = buffer[..newline].trim().to_string();
                buffer.drain(..=newline);

                let Some(data) = line.strip_prefix("data: ") else {
                    continue;
                };
                if data == "[DONE]" {
                    return Ok(());
                }
                match serde_json::from_str::<StreamChunk>(data) {
                    Ok(parsed) => {
                        let content = parsed
                            .choices
                            .into_iter()
                            .next()
                            .and_then(|c| c.delta.content)
                            .unwrap_or_default();
                        if !content.is_empty() && tx.send(content).await.is_err() {
                            // Consumer hung up: stop streaming, no side effects
                            return Ok(());
                        }
                    }
                    Err(e) => warn!(error = %e, "Skipping unparseable stream chunk"),
                }
            }
        }
        Ok(())
    }
}
