//! Query filters and partial updates shared by all store adapters
//!
//! Every set field of a filter must hold (conjunction). `matches` is the
//! reference semantics; SQL adapters translate the same fields.

use crate::types::{
    clamp_importance, AgentId, LinkType, Memory, MemoryId, MemoryLink, MemoryType, Metadata,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Memory selection criteria
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MemoryFilter {
    pub agent_id: Option<AgentId>,
    /// Type must be one of these
    pub memory_types: Option<Vec<MemoryType>>,
    /// Type must not equal this
    pub exclude_type: Option<MemoryType>,
    pub has_embedding: Option<bool>,
    /// Id must be in this set
    pub ids: Option<Vec<MemoryId>>,
    /// Id must not be in this set
    pub exclude_ids: Option<Vec<MemoryId>>,
    /// created_at strictly before
    pub created_before: Option<DateTime<Utc>>,
    /// last_accessed strictly before
    pub last_accessed_before: Option<DateTime<Utc>>,
    /// access_count <= value
    pub max_access_count: Option<u64>,
    /// importance > value
    pub importance_above: Option<f32>,
    /// importance >= value
    pub importance_at_least: Option<f32>,
    /// importance <= value
    pub importance_at_most: Option<f32>,
}

impl MemoryFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Non-archived memories that have an embedding
    pub fn active_embedded() -> Self {
        Self::new().exclude_type(MemoryType::Archived).has_embedding(true)
    }

    pub fn agent(mut self, agent_id: &AgentId) -> Self {
        self.agent_id = Some(agent_id.clone());
        self
    }

    pub fn agent_opt(self, agent_id: Option<&AgentId>) -> Self {
        match agent_id {
            Some(agent_id) => self.agent(agent_id),
            None => self,
        }
    }

    pub fn memory_types(mut self, types: &[MemoryType]) -> Self {
        self.memory_types = Some(types.to_vec());
        self
    }

    pub fn memory_type(self, memory_type: MemoryType) -> Self {
        self.memory_types(&[memory_type])
    }

    pub fn exclude_type(mut self, memory_type: MemoryType) -> Self {
        self.exclude_type = Some(memory_type);
        self
    }

    pub fn has_embedding(mut self, present: bool) -> Self {
        self.has_embedding = Some(present);
        self
    }

    pub fn ids(mut self, ids: &[MemoryId]) -> Self {
        self.ids = Some(ids.to_vec());
        self
    }

    pub fn exclude_ids(mut self, ids: &[MemoryId]) -> Self {
        self.exclude_ids = Some(ids.to_vec());
        self
    }

    pub fn created_before(mut self, at: DateTime<Utc>) -> Self {
        self.created_before = Some(at);
        self
    }

    pub fn last_accessed_before(mut self, at: DateTime<Utc>) -> Self {
        self.last_accessed_before = Some(at);
        self
    }

    pub fn max_access_count(mut self, count: u64) -> Self {
        self.max_access_count = Some(count);
        self
    }

    pub fn importance_above(mut self, value: f32) -> Self {
        self.importance_above = Some(value);
        self
    }

    pub fn importance_at_least(mut self, value: f32) -> Self {
        self.importance_at_least = Some(value);
        self
    }

    pub fn importance_at_most(mut self, value: f32) -> Self {
        self.importance_at_most = Some(value);
        self
    }

    /// Whether `memory` satisfies every set criterion
    pub fn matches(&self, memory: &Memory) -> bool {
        if let Some(agent_id) = &self.agent_id {
            if &memory.agent_id != agent_id {
                return false;
            }
        }
        if let Some(types) = &self.memory_types {
            if !types.contains(&memory.memory_type) {
                return false;
            }
        }
        if let Some(excluded) = self.exclude_type {
            if memory.memory_type == excluded {
                return false;
            }
        }
        if let Some(present) = self.has_embedding {
            if memory.embedding.is_some() != present {
                return false;
            }
        }
        if let Some(ids) = &self.ids {
            if !ids.contains(&memory.id) {
                return false;
            }
        }
        if let Some(ids) = &self.exclude_ids {
            if ids.contains(&memory.id) {
                return false;
            }
        }
        if let Some(at) = self.created_before {
            if memory.created_at >= at {
                return false;
            }
        }
        if let Some(at) = self.last_accessed_before {
            if memory.last_accessed >= at {
                return false;
            }
        }
        if let Some(count) = self.max_access_count {
            if memory.access_count > count {
                return false;
            }
        }
        if let Some(value) = self.importance_above {
            if memory.importance <= value {
                return false;
            }
        }
        if let Some(value) = self.importance_at_least {
            if memory.importance < value {
                return false;
            }
        }
        if let Some(value) = self.importance_at_most {
            if memory.importance > value {
                return false;
            }
        }
        true
    }
}

/// Sort order for listing memories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MemoryOrder {
    /// Order of creation in the store
    #[default]
    Insertion,
    /// Highest importance first, ties in insertion order
    ImportanceDesc,
    /// Newest first
    CreatedAtDesc,
}

/// Partial update applied to a single memory
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MemoryPatch {
    pub content: Option<String>,
    pub memory_type: Option<MemoryType>,
    /// `Some(None)` clears the embedding
    pub embedding: Option<Option<Vec<f32>>>,
    /// Clamped to [0, 1] on apply
    pub importance: Option<f32>,
    pub access_count: Option<u64>,
    /// Added to the stored count while the store holds its write lock
    pub access_count_delta: Option<u64>,
    pub last_accessed: Option<DateTime<Utc>>,
    /// Entries merged key by key into the existing metadata
    pub metadata: Option<Metadata>,
}

impl MemoryPatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }

    pub fn memory_type(mut self, memory_type: MemoryType) -> Self {
        self.memory_type = Some(memory_type);
        self
    }

    pub fn embedding(mut self, embedding: Option<Vec<f32>>) -> Self {
        self.embedding = Some(embedding);
        self
    }

    pub fn importance(mut self, importance: f32) -> Self {
        self.importance = Some(importance);
        self
    }

    pub fn access_count(mut self, count: u64) -> Self {
        self.access_count = Some(count);
        self
    }

    pub fn increment_access_count(mut self, delta: u64) -> Self {
        self.access_count_delta = Some(delta);
        self
    }

    pub fn last_accessed(mut self, at: DateTime<Utc>) -> Self {
        self.last_accessed = Some(at);
        self
    }

    pub fn metadata(mut self, entries: Metadata) -> Self {
        self.metadata = Some(entries);
        self
    }

    /// Apply the patch in place and bump `updated_at`
    pub fn apply(&self, memory: &mut Memory, now: DateTime<Utc>) {
        if let Some(content) = &self.content {
            memory.content = content.clone();
        }
        if let Some(memory_type) = self.memory_type {
            memory.memory_type = memory_type;
        }
        if let Some(embedding) = &self.embedding {
            memory.embedding = embedding.clone();
        }
        if let Some(importance) = self.importance {
            memory.importance = clamp_importance(importance);
        }
        if let Some(count) = self.access_count {
            memory.access_count = count;
        }
        if let Some(delta) = self.access_count_delta {
            memory.access_count = memory.access_count.saturating_add(delta);
        }
        if let Some(at) = self.last_accessed {
            memory.last_accessed = at;
        }
        if let Some(entries) = &self.metadata {
            for (key, value) in entries {
                memory.metadata.insert(key.clone(), value.clone());
            }
        }
        memory.updated_at = now;
    }
}

/// Link selection criteria
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LinkFilter {
    pub source_id: Option<MemoryId>,
    pub target_id: Option<MemoryId>,
    pub link_type: Option<LinkType>,
    /// Source or target is in this set
    pub touching: Option<Vec<MemoryId>>,
}

impl LinkFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Exact (source, target, type) key
    pub fn between(source_id: MemoryId, target_id: MemoryId, link_type: LinkType) -> Self {
        Self {
            source_id: Some(source_id),
            target_id: Some(target_id),
            link_type: Some(link_type),
            touching: None,
        }
    }

    pub fn link_type(mut self, link_type: LinkType) -> Self {
        self.link_type = Some(link_type);
        self
    }

    pub fn touching(mut self, ids: &[MemoryId]) -> Self {
        self.touching = Some(ids.to_vec());
        self
    }

    pub fn matches(&self, link: &MemoryLink) -> bool {
        if let Some(id) = self.source_id {
            if link.source_id != id {
                return false;
            }
        }
        if let Some(id) = self.target_id {
            if link.target_id != id {
                return false;
            }
        }
        if let Some(link_type) = self.link_type {
            if link.link_type != link_type {
                return false;
            }
        }
        if let Some(ids) = &self.touching {
            if !ids.iter().any(|id| link.touches(*id)) {
                return false;
            }
        }
        true
    }
}

/// Partial update applied to a single link
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LinkPatch {
    pub strength: Option<f32>,
    pub similarity: Option<f32>,
}

impl LinkPatch {
    pub fn apply(&self, link: &mut MemoryLink, now: DateTime<Utc>) {
        if let Some(strength) = self.strength {
            link.strength = strength;
        }
        if let Some(similarity) = self.similarity {
            link.similarity = similarity;
        }
        link.updated_at = now;
    }
}
