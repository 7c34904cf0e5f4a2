// src/config/env.rs
// Environment-based configuration - single source of truth for all env vars

use tracing::{debug, info, warn};

/// API keys loaded from environment variables
#[derive(Debug, Clone, Default)]
pub struct ApiKeys {
    /// Key for the embeddings/chat API (HINDSIGHT_API_KEY or OPENAI_API_KEY)
    pub api_key: Option<String>,
}

impl ApiKeys {
    /// Load API keys from environment variables.
    ///
    /// Set `HINDSIGHT_DISABLE_LLM=1` to suppress all keys (forces the
    /// deterministic classifier and lexical-only retrieval fallbacks).
    pub fn from_env() -> Self {
        if parse_bool_env("HINDSIGHT_DISABLE_LLM").unwrap_or(false) {
            info!("HINDSIGHT_DISABLE_LLM is set - backends disabled, using fallbacks");
            return Self { api_key: None };
        }

        let api_key =
            Self::read_key("HINDSIGHT_API_KEY").or_else(|| Self::read_key("OPENAI_API_KEY"));

        let keys = Self { api_key };
        keys.log_status();
        keys
    }

    /// Read a single API key from environment, filtering empty values
    fn read_key(name: &str) -> Option<String> {
        std::env::var(name).ok().filter(|k| !k.trim().is_empty())
    }

    /// Check if any remote backend is usable
    pub fn has_backend(&self) -> bool {
        self.api_key.is_some()
    }

    /// Log which API keys are available (without exposing values)
    fn log_status(&self) {
        if self.api_key.is_some() {
            debug!("API key loaded");
        } else {
            warn!("No API key configured - embedding and LLM features will be unavailable");
        }
    }
}

/// Backend endpoint configuration from environment variables
#[derive(Debug, Clone)]
pub struct BackendConfig {
    /// Embeddings endpoint (HINDSIGHT_EMBEDDINGS_URL)
    pub embeddings_url: String,
    /// Chat completions endpoint (HINDSIGHT_CHAT_URL)
    pub chat_url: String,
    /// Embedding model name (HINDSIGHT_EMBEDDING_MODEL)
    pub embedding_model: String,
    /// Chat model name (HINDSIGHT_CHAT_MODEL)
    pub chat_model: String,
    /// Embedding dimensions override (HINDSIGHT_EMBEDDING_DIMENSIONS)
    pub dimensions: Option<usize>,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            embeddings_url: "https://api.openai.com/v1/embeddings".to_string(),
            chat_url: "https://api.openai.com/v1/chat/completions".to_string(),
            embedding_model: "text-embedding-3-small".to_string(),
            chat_model: "gpt-4o-mini".to_string(),
            dimensions: None,
        }
    }
}

impl BackendConfig {
    /// Load backend configuration from environment variables
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let dimensions = std::env::var("HINDSIGHT_EMBEDDING_DIMENSIONS")
            .ok()
            .and_then(|d| d.parse().ok());

        if let Some(dims) = dimensions {
            debug!(dimensions = dims, "Custom embedding dimensions configured");
        }

        Self {
            embeddings_url: std::env::var("HINDSIGHT_EMBEDDINGS_URL")
                .unwrap_or(defaults.embeddings_url),
            chat_url: std::env::var("HINDSIGHT_CHAT_URL").unwrap_or(defaults.chat_url),
            embedding_model: std::env::var("HINDSIGHT_EMBEDDING_MODEL")
                .unwrap_or(defaults.embedding_model),
            chat_model: std::env::var("HINDSIGHT_CHAT_MODEL").unwrap_or(defaults.chat_model),
            dimensions,
        }
    }
}

/// Parse a boolean environment variable ("1", "true", "yes" are truthy)
fn parse_bool_env(name: &str) -> Option<bool> {
    std::env::var(name)
        .ok()
        .map(|v| matches!(v.trim().to_lowercase().as_str(), "1" | "true" | "yes"))
}
