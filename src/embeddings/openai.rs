// src/embeddings/openai.rs
// OpenAI-compatible embeddings API client

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

use super::EmbeddingBackend;
use crate::config::{ApiKeys, BackendConfig};
use crate::error::{EngineError, Result};

/// Max input tokens accepted by the embedding models
const MAX_INPUT_TOKENS: usize = 8192;

/// Approximate chars per token (conservative estimate)
const CHARS_PER_TOKEN: usize = 4;

/// Max characters to embed (based on token limit)
const MAX_TEXT_CHARS: usize = MAX_INPUT_TOKENS * CHARS_PER_TOKEN;

/// Max texts per batch request
const MAX_BATCH_SIZE: usize = 256;

/// Retry attempts for transient failures
const RETRY_ATTEMPTS: usize = 2;

/// Request timeout
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Supported embedding models
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum OpenAiEmbeddingModel {
    /// text-embedding-3-small: 1536 default dims
    #[default]
    TextEmbedding3Small,
    /// text-embedding-3-large: 3072 default dims
    TextEmbedding3Large,
}

impl OpenAiEmbeddingModel {
    pub fn model_name(&self) -> &'static str {
        match self {
            Self::TextEmbedding3Small => "text-embedding-3-small",
            Self::TextEmbedding3Large => "text-embedding-3-large",
        }
    }

    pub fn default_dimensions(&self) -> usize {
        match self {
            Self::TextEmbedding3Small => 1536,
            Self::TextEmbedding3Large => 3072,
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "text-embedding-3-small" => Some(Self::TextEmbedding3Small),
            "text-embedding-3-large" => Some(Self::TextEmbedding3Large),
            _ => None,
        }
    }
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: Vec<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    message: String,
}

/// OpenAI-compatible embeddings client
pub struct OpenAiEmbeddings {
    api_key: String,
    url: String,
    model: String,
    dimensions: usize,
    http_client: reqwest::Client,
}

impl OpenAiEmbeddings {
    /// Create a client from pre-loaded configuration. Returns None when no
    /// API key is available.
    pub fn from_config(api_keys: &ApiKeys, config: &BackendConfig) -> Option<Self> {
        let api_key = api_keys.api_key.clone()?;

        let dimensions = config.dimensions.unwrap_or_else(|| {
            OpenAiEmbeddingModel::from_name(&config.embedding_model)
                .unwrap_or_default()
                .default_dimensions()
        });

        Some(Self {
            api_key,
            url: config.embeddings_url.clone(),
            model: config.embedding_model.clone(),
            dimensions,
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

    async fn request(&self, inputs: Vec<&str>) -> Result<Vec<Vec<f32>>> {
        let body = EmbeddingRequest {
            model: &self.model,
            input: inputs,
            dimensions: Some(self.dimensions),
        };

        let mut last_error = None;
        for attempt in 0..=RETRY_ATTEMPTS {
            if attempt > 0 {
                tokio::time::sleep(Duration::from_millis(500 * attempt as u64)).await;
                debug!(attempt, "Retrying embedding request");
            }

            let response = match self
                .http_client
                .post(&self.url)
                .bearer_auth(&self.api_key)
                .json(&body)
                .send()
                .await
            {
                Ok(r) => r,
                Err(e) => {
                    warn!(error = %e, "Embedding request failed");
                    last_error = Some(EngineError::EmbeddingUnavailable(e.to_string()));
                    continue;
                }
            };

            if !response.status().is_success() {
                let status = response.status();
                let message = response
                    .json::<ErrorResponse>()
                    .await
                    .map(|e| e.error.message)
                    .unwrap_or_else(|_| format!("HTTP {status}"));
                // Client errors won't improve on retry
                if status.is_client_error() {
                    return Err(EngineError::EmbeddingUnavailable(message));
                }
                last_error = Some(EngineError::EmbeddingUnavailable(message));
                continue;
            }

            let parsed: EmbeddingResponse = response.json().await?;
            return Ok(parsed.data.into_iter().map(|d| d.embedding).collect());
        }

        Err(last_error
            .unwrap_or_else(|| EngineError::EmbeddingUnavailable("request failed".to_string())))
    }
}

#[async_trait]
impl EmbeddingBackend for OpenAiEmbeddings {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let truncated = truncate_at_boundary(text, MAX_TEXT_CHARS);
        let mut vectors = self.request(vec![truncated]).await?;
        vectors
            .pop()
            .ok_or_else(|| EngineError::EmbeddingUnavailable("empty response".to_string()))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut out = Vec::with_capacity(texts.len());
        for chunk in texts.chunks(MAX_BATCH_SIZE) {
            let inputs: Vec<&str> = chunk
                .iter()
                .map(|t| truncate_at_boundary(t, MAX_TEXT_CHARS))
                .collect();
            out.extend(self.request(inputs).await?);
        }
        Ok(out)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn provider_id(&self) -> &'static str {
        "openai"
    }
}

/// Truncate to at most `max_chars` without splitting a UTF-8 character.
fn truncate_at_boundary(text: &str, max_chars: usize) -> &str {
    if text.len() <= max_chars {
        return text;
    }
    let mut end = max_chars;
    while end > 0 && !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}
