// src/llm/mod.rs
// LLM provider seam

mod client;
mod stream;

pub use client::OpenAiChat;
pub use stream::{CompletionStream, spawn_completion};

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::Result;

/// Boundary to the completion model. The engine only ever needs
/// `complete(prompt) -> text`; streaming is an optional refinement.
#[async_trait]
pub trait LlmBackend: Send + Sync {
    /// Run a completion to the end and return the full text.
    async fn complete(&self, prompt: &str) -> Result<String>;

    /// Stream ordered chunks of the completion into `tx`. The default
    /// implementation degrades to a single chunk.
    async fn complete_stream(&self, prompt: &str, tx: mpsc::Sender<String>) -> Result<()> {
        let text = self.complete(prompt).await?;
        // Receiver may already be gone; that's a cancellation, not an error
        let _ = tx.send(text).await;
        Ok(())
    }
}
