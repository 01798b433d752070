//! Embedding generation services
//!
//! The engine consumes embeddings through [`EmbeddingService`] and never
//! retries internally; retry policy belongs to the implementation.

pub mod hashing;
pub mod remote;

pub use hashing::HashingEmbeddingService;
pub use remote::{RemoteEmbeddingService, DEFAULT_EMBEDDING_DIM};

use crate::error::Result;
use async_trait::async_trait;

/// Embedding service trait defining required operations
#[async_trait]
pub trait EmbeddingService: Send + Sync {
    /// Generate embedding for a single text
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Generate embeddings for multiple texts
    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        let mut embeddings = Vec::with_capacity(texts.len());
        for text in texts {
            embeddings.push(self.embed(text).await?);
        }
        Ok(embeddings)
    }

    /// Get embedding dimensionality
    fn dimensions(&self) -> usize;

    /// Get model name
    fn model_name(&self) -> &str;
}
