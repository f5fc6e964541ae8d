// Embedding provider interface and the Ollama-backed implementation.

pub mod ollama;

use async_trait::async_trait;

use crate::Result;

/// Maps a batch of strings to fixed-length vectors.
///
/// Implementations must return exactly one vector per input, in input
/// order, and fail with `EmbeddingUnavailable` on backend errors. Vectors
/// from different providers or models are not comparable.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

pub use ollama::OllamaEmbedder;
