//! Services layer for the mnemo-evolve memory system
//!
//! Memory creation, recall, editing and search on top of the stores and
//! the embedding provider.

pub mod memory;

pub use memory::{MemoryService, MemoryUpdates, NewMemory, SearchHit};
