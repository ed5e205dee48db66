// Embeddings module
// Provider abstraction for text embeddings plus the Ollama HTTP client

pub mod ollama;

use async_trait::async_trait;

use crate::Result;

pub use ollama::{EmbeddingResult, OllamaClient};

/// External capability turning text into a fixed-length vector.
///
/// Implementations must be deterministic for identical input and report
/// failures as `TicketError::EmbeddingUnavailable`. The engine never retries.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Length of every vector returned by [`embed`](Self::embed)
    fn dimension(&self) -> usize;

    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
}
