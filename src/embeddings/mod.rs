// src/embeddings/mod.rs
// Embedding provider seam

mod openai;

pub use self::openai::{OpenAiEmbeddingModel, OpenAiEmbeddings};

use async_trait::async_trait;
use std::sync::Arc;

use crate::error::{EngineError, Result};

/// The boundary to the embedding model: deterministic for identical input,
/// fixed dimensionality per deployment.
#[async_trait]
pub trait EmbeddingBackend: Send + Sync {
    /// Embed a single text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Embed multiple texts in batch. Implementations may override with a
    /// real batch call; the default loops.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            out.push(self.embed(text).await?);
        }
        Ok(out)
    }

    /// Fixed output dimensionality.
    fn dimensions(&self) -> usize;

    /// Provider identifier for change detection and logging.
    fn provider_id(&self) -> &'static str;
}

/// Dimension-enforcing wrapper around whichever backend is configured.
///
/// Every vector that reaches storage has passed through here, so a backend
/// that misbehaves (wrong length) surfaces as an error instead of a corrupt
/// index.
pub struct EmbeddingClient {
    inner: Arc<dyn EmbeddingBackend>,
}

impl EmbeddingClient {
    pub fn new(inner: Arc<dyn EmbeddingBackend>) -> Self {
        Self { inner }
    }

    pub fn dimensions(&self) -> usize {
        self.inner.dimensions()
    }

    pub fn provider_id(&self) -> &'static str {
        self.inner.provider_id()
    }

    pub async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let vector = self.inner.embed(text).await?;
        self.check(&vector)?;
        Ok(vector)
    }

    pub async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let vectors = self.inner.embed_batch(texts).await?;
        for vector in &vectors {
            self.check(vector)?;
        }
        Ok(vectors)
    }

    fn check(&self, vector: &[f32]) -> Result<()> {
        let expected = self.inner.dimensions();
        if vector.len() != expected {
            return Err(EngineError::EmbeddingUnavailable(format!(
                "backend '{}' returned {} dimensions, expected {}",
                self.inner.provider_id(),
                vector.len(),
                expected
            )));
        }
        Ok(())
    }
}
