//! mnemo-evolve - Memory evolution engine for agent memory stores
//!
//! Keeps an agent memory corpus healthy over time:
//! - Importance decay with archival and conservative purging
//! - Consolidation of near-duplicate memories into one representative
//! - A SEMANTIC similarity graph maintained between active memories
//! - Deduplicated knowledge transfer between agents
//!
//! # Architecture
//!
//! - **Similarity**: cosine/Euclidean math and a pluggable brute-force index
//! - **Embeddings**: text → vector providers (remote API or local hashing)
//! - **Storage**: `MemoryStore` / `LinkStore` traits with in-memory and SQLite adapters
//! - **Evolution**: the engine, its phases and the background scheduler
//! - **Services**: memory CRUD, recall and search around the engine
//!
//! # Example
//!
//! ```ignore
//! use mnemo_evolve::{EvolutionEngine, EvolutionParams, HashingEmbeddingService, InMemoryStore};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> mnemo_evolve::Result<()> {
//!     let store = Arc::new(InMemoryStore::new());
//!     let engine = EvolutionEngine::new(
//!         store.clone(),
//!         store,
//!         Arc::new(HashingEmbeddingService::default()),
//!         EvolutionParams::default(),
//!     );
//!
//!     let report = engine.run_evolution_cycle().await?;
//!     println!("{} links created", report.links_created());
//!     Ok(())
//! }
//! ```

pub mod embeddings;
pub mod error;
pub mod evolution;
pub mod services;
pub mod similarity;
pub mod storage;
pub mod types;

// Re-export commonly used types
pub use embeddings::{EmbeddingService, HashingEmbeddingService, RemoteEmbeddingService};
pub use error::{MnemoError, Result};
pub use evolution::{
    BackgroundScheduler, EvolutionConfig, EvolutionCycleReport, EvolutionEngine, EvolutionParams,
};
pub use services::{MemoryService, MemoryUpdates, NewMemory};
pub use similarity::{cosine_similarity, euclidean_distance, BruteForceIndex, SimilarityIndex};
pub use storage::{InMemoryStore, LinkStore, MemoryStore, SqliteStore};
pub use types::{AgentId, LinkId, LinkType, Memory, MemoryId, MemoryLink, MemoryType};
