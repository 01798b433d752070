//! Threshold-and-rank similarity search over an embedded corpus
//!
//! [`BruteForceIndex`] is an exact O(n) scan per query. An approximate
//! nearest-neighbor index can replace it by implementing [`SimilarityIndex`];
//! callers only depend on the trait.

use super::math::cosine_similarity;
use crate::error::Result;
use crate::types::MemoryId;
use serde::{Deserialize, Serialize};

/// Corpus entry: a memory id and its embedding
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddedMemory {
    pub id: MemoryId,
    pub embedding: Vec<f32>,
}

impl EmbeddedMemory {
    pub fn new(id: MemoryId, embedding: Vec<f32>) -> Self {
        Self { id, embedding }
    }
}

/// Query result: a corpus id and its similarity to the query
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SimilarMemory {
    pub id: MemoryId,
    pub similarity: f32,
}

/// Similarity search contract
///
/// Implementations must:
/// - never return `exclude`
/// - only return entries with similarity >= `threshold`
/// - order results by similarity descending, ties in corpus order
/// - return at most `limit` results when `limit > 0` (0 means uncapped)
pub trait SimilarityIndex: Send + Sync {
    fn find_similar(
        &self,
        query: &[f32],
        corpus: &[EmbeddedMemory],
        exclude: Option<MemoryId>,
        threshold: f32,
        limit: usize,
    ) -> Result<Vec<SimilarMemory>>;
}

/// Exact brute-force index
#[derive(Debug, Clone, Copy, Default)]
pub struct BruteForceIndex;

impl SimilarityIndex for BruteForceIndex {
    fn find_similar(
        &self,
        query: &[f32],
        corpus: &[EmbeddedMemory],
        exclude: Option<MemoryId>,
        threshold: f32,
        limit: usize,
    ) -> Result<Vec<SimilarMemory>> {
        find_similar(query, corpus, exclude, threshold, limit)
    }
}

/// Find corpus entries similar to `query`, best first
pub fn find_similar(
    query: &[f32],
    corpus: &[EmbeddedMemory],
    exclude: Option<MemoryId>,
    threshold: f32,
    limit: usize,
) -> Result<Vec<SimilarMemory>> {
    let mut matches = Vec::new();

    for candidate in corpus {
        if Some(candidate.id) == exclude {
            continue;
        }

        let similarity = cosine_similarity(query, &candidate.embedding)?;
        if similarity >= threshold {
            matches.push(SimilarMemory {
                id: candidate.id,
                similarity,
            });
        }
    }

    // sort_by is stable, so equal similarities keep corpus order
    matches.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));

    if limit > 0 {
        matches.truncate(limit);
    }

    Ok(matches)
}
