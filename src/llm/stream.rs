// src/llm/stream.rs
// Cancellable streaming completions
//
// A completion is a spawned task producing an ordered sequence of text
// chunks. Consumers may cancel (or just drop the stream) at any point with
// no side effects on the memory store: the store is only written when a
// consumer explicitly submits final content through `ingest`.

use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use super::LlmBackend;

/// Channel depth between producer task and consumer.
const CHUNK_BUFFER: usize = 32;

/// Handle to an in-flight streaming completion.
pub struct CompletionStream {
    rx: mpsc::Receiver<String>,
    cancel: CancellationToken,
}

impl CompletionStream {
    /// Next chunk, in order. `None` when the completion finished or was
    /// cancelled.
    pub async fn next_chunk(&mut self) -> Option<String> {
        self.rx.recv().await
    }

    /// Stop the producer task. Already-buffered chunks remain readable.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Drain the stream to completion and return the concatenated text.
    pub async fn collect(mut self) -> String {
        let mut out = String::new();
        while let Some(chunk) = self.next_chunk().await {
            out.push_str(&chunk);
        }
        out
    }
}

impl Drop for CompletionStream {
    fn drop(&mut self) {
        // Dropping the consumer cancels the producer
        self.cancel.cancel();
    }
}

/// Spawn a streaming completion against `backend`.
pub fn spawn_completion(backend: Arc<dyn LlmBackend>, prompt: String) -> CompletionStream {
    let cancel = CancellationToken::new();
    let (tx, rx) = mpsc::channel(CHUNK_BUFFER);

    let task_cancel = cancel.clone();
    tokio::spawn(async move {
        tokio::select! {
            _ = task_cancel.cancelled() => {
                // Consumer walked away; nothing to clean up
            }
            result = backend.complete_stream(&prompt, tx) => {
                if let Err(e) = result {
                    warn!(error = %e, "Streaming completion failed");
                }
            }
        }
    });

    CompletionStream { rx, cancel }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;
    use async_trait::async_trait;
    use std::time::Duration;

    /// Emits `count` numbered chunks with a small delay between them.
    struct SlowBackend {
        count: usize,
    }

    #[async_trait]
    impl LlmBackend for SlowBackend {
        async fn complete(&self, _prompt: &str) -> Result<String> {
            Ok((0..self.count).map(|i| i.to_string()).collect())
        }

        async fn complete_stream(
            &self,
            _prompt: &str,
            tx: mpsc::Sender<String>,
        ) -> Result<()> {
            for i in 0..self.count {
                tokio::time::sleep(Duration::from_millis(5)).await;
                if tx.send(i.to_string()).await.is_err() {
                    return Ok(());
                }
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_chunks_arrive_in_order() {
        let stream = spawn_completion(Arc::new(SlowBackend { count: 5 }), "p".to_string());
        assert_eq!(stream.collect().await, "01234");
    }

    #[tokio::test]
    async fn test_cancel_stops_stream() {
        let mut stream = spawn_completion(Arc::new(SlowBackend { count: 1000 }), "p".to_string());
        let first = stream.next_chunk().await;
        assert!(first.is_some());

        stream.cancel();
        // Drain whatever was buffered; the stream must terminate
        let mut remaining = 0;
        while stream.next_chunk().await.is_some() {
            remaining += 1;
        }
        assert!(remaining < 1000);
    }

    #[tokio::test]
    async fn test_default_stream_sends_single_chunk() {
        struct Plain;

        #[async_trait]
        impl LlmBackend for Plain {
            async fn complete(&self, _prompt: &str) -> Result<String> {
                Ok("whole answer".to_string())
            }
        }

        let stream = spawn_completion(Arc::new(Plain), "p".to_string());
        assert_eq!(stream.collect().await, "whole answer");
    }
}
