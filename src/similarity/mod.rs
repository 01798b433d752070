//! Vector similarity primitives
//!
//! - math: cosine similarity and Euclidean distance
//! - index: threshold-and-rank search over an embedded corpus

pub mod index;
pub mod math;

pub use index::{find_similar, BruteForceIndex, EmbeddedMemory, SimilarMemory, SimilarityIndex};
pub use math::{cosine_similarity, euclidean_distance};
