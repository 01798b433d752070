//! Storage layer for the mnemo-evolve memory system
//!
//! The evolution engine consumes storage only through [`MemoryStore`] and
//! [`LinkStore`]. Each write is atomic at the single-record level; no
//! operation spans a cross-record transaction.

pub mod filter;
pub mod memory;
pub mod sqlite;

pub use filter::{LinkFilter, LinkPatch, MemoryFilter, MemoryOrder, MemoryPatch};
pub use memory::InMemoryStore;
pub use sqlite::SqliteStore;

use crate::error::Result;
use crate::similarity::EmbeddedMemory;
use crate::types::{LinkId, Memory, MemoryId, MemoryLink, MemoryType};
use async_trait::async_trait;

/// Memory persistence operations
#[async_trait]
pub trait MemoryStore: Send + Sync {
    /// Store a new memory
    async fn create(&self, memory: &Memory) -> Result<Memory>;

    /// Retrieve a memory by ID
    async fn get(&self, id: MemoryId) -> Result<Option<Memory>>;

    /// Apply a partial update, failing with `MemoryNotFound` if absent
    async fn update(&self, id: MemoryId, patch: MemoryPatch) -> Result<Memory>;

    /// Add `delta` to the importance of every match, clamped to [0, 1]
    async fn bulk_adjust_importance(&self, filter: &MemoryFilter, delta: f32) -> Result<usize>;

    /// Set the type of every match
    async fn bulk_set_type(&self, filter: &MemoryFilter, memory_type: MemoryType)
        -> Result<usize>;

    /// Delete every match
    async fn delete_many(&self, filter: &MemoryFilter) -> Result<usize>;

    /// List matching memories
    async fn find_many(
        &self,
        filter: &MemoryFilter,
        order: MemoryOrder,
        limit: Option<usize>,
    ) -> Result<Vec<Memory>>;

    /// Ids and embeddings of matching memories that have an embedding
    async fn find_embeddings(
        &self,
        filter: &MemoryFilter,
        order: MemoryOrder,
    ) -> Result<Vec<EmbeddedMemory>>;

    /// Count matching memories
    async fn count(&self, filter: &MemoryFilter) -> Result<usize>;
}

/// Link persistence operations, keyed by (source, target, link type)
#[async_trait]
pub trait LinkStore: Send + Sync {
    /// Store a new link, failing with `AlreadyExists` on a duplicate key
    async fn create(&self, link: &MemoryLink) -> Result<MemoryLink>;

    /// Store several links; duplicates are skipped or rejected
    async fn create_many(&self, links: &[MemoryLink], skip_duplicates: bool) -> Result<usize>;

    async fn find_one(&self, filter: &LinkFilter) -> Result<Option<MemoryLink>>;

    async fn find_many(&self, filter: &LinkFilter) -> Result<Vec<MemoryLink>>;

    /// Apply a partial update, failing with `LinkNotFound` if absent
    async fn update(&self, id: LinkId, patch: LinkPatch) -> Result<MemoryLink>;

    async fn delete_many(&self, filter: &LinkFilter) -> Result<usize>;

    async fn count(&self, filter: &LinkFilter) -> Result<usize>;
}
