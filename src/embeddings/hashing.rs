//! Deterministic offline embedder
//!
//! Feature-hashes lowercase word tokens into a fixed number of buckets and
//! L2-normalizes the counts. Texts sharing vocabulary land close together,
//! identical texts get identical vectors. No network, no model files.

use super::EmbeddingService;
use crate::error::{MnemoError, Result};
use async_trait::async_trait;
use sha2::{Digest, Sha256};

/// Default number of hash buckets
pub const DEFAULT_HASHING_DIM: usize = 256;

/// Bag-of-words embedder using the hashing trick
#[derive(Debug, Clone)]
pub struct HashingEmbeddingService {
    dimensions: usize,
    model: String,
}

impl HashingEmbeddingService {
    pub fn new(dimensions: usize) -> Result<Self> {
        if dimensions == 0 {
            return Err(MnemoError::Validation(
                "Embedding dimensions must be positive".to_string(),
            ));
        }

        Ok(Self {
            dimensions,
            model: format!("hashing-bow-{}", dimensions),
        })
    }

    fn bucket(&self, token: &str) -> (usize, f32) {
        let digest = Sha256::digest(token.as_bytes());
        let mut raw = [0u8; 8];
        raw.copy_from_slice(&digest[..8]);
        let value = u64::from_le_bytes(raw);

        // Signed hashing keeps collisions from only ever adding up
        let sign = if digest[8] & 1 == 0 { 1.0 } else { -1.0 };
        ((value % self.dimensions as u64) as usize, sign)
    }

    /// Compute the embedding synchronously
    pub fn embed_sync(&self, text: &str) -> Result<Vec<f32>> {
        let mut vector = vec![0.0f32; self.dimensions];
        let mut tokens = 0usize;

        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let (index, sign) = self.bucket(&token.to_lowercase());
            vector[index] += sign;
            tokens += 1;
        }

        if tokens == 0 {
            return Err(MnemoError::Embedding(
                "Text has no tokens to embed".to_string(),
            ));
        }

        let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            vector.iter_mut().for_each(|x| *x /= norm);
        }

        Ok(vector)
    }
}

impl Default for HashingEmbeddingService {
    fn default() -> Self {
        Self {
            dimensions: DEFAULT_HASHING_DIM,
            model: format!("hashing-bow-{}", DEFAULT_HASHING_DIM),
        }
    }
}

#[async_trait]
impl EmbeddingService for HashingEmbeddingService {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_sync(text)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
