//! Memory lifecycle operations around the evolution core
//!
//! Creation and content edits embed synchronously before anything is
//! written, so an embedder failure leaves the store untouched.

use crate::embeddings::EmbeddingService;
use crate::error::{MnemoError, Result};
use crate::similarity::{BruteForceIndex, SimilarityIndex};
use crate::storage::{LinkFilter, LinkStore, MemoryFilter, MemoryOrder, MemoryPatch, MemoryStore};
use crate::types::{AgentId, LinkType, Memory, MemoryId, MemoryLink, MemoryType, Metadata};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info};

/// Input for a new memory
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewMemory {
    pub agent_id: AgentId,
    pub session_id: Option<String>,
    pub content: String,
    pub memory_type: MemoryType,
    pub importance: Option<f32>,
    #[serde(default)]
    pub metadata: Metadata,
}

impl NewMemory {
    pub fn new(agent_id: AgentId, content: impl Into<String>, memory_type: MemoryType) -> Self {
        Self {
            agent_id,
            session_id: None,
            content: content.into(),
            memory_type,
            importance: None,
            metadata: Metadata::new(),
        }
    }

    pub fn with_importance(mut self, importance: f32) -> Self {
        self.importance = Some(importance);
        self
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}

/// Partial update for an existing memory
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MemoryUpdates {
    pub content: Option<String>,
    pub memory_type: Option<MemoryType>,
    pub importance: Option<f32>,
    pub metadata: Option<Metadata>,
}

/// A memory matched by a similarity search
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub memory: Memory,
    pub similarity: f32,
}

/// CRUD, recall and search over a memory store
pub struct MemoryService {
    memories: Arc<dyn MemoryStore>,
    links: Arc<dyn LinkStore>,
    embeddings: Arc<dyn EmbeddingService>,
    index: Arc<dyn SimilarityIndex>,
}

impl MemoryService {
    pub fn new(
        memories: Arc<dyn MemoryStore>,
        links: Arc<dyn LinkStore>,
        embeddings: Arc<dyn EmbeddingService>,
    ) -> Self {
        Self {
            memories,
            links,
            embeddings,
            index: Arc::new(BruteForceIndex),
        }
    }

    pub fn with_index(mut self, index: Arc<dyn SimilarityIndex>) -> Self {
        self.index = index;
        self
    }

    /// Embed and store a new memory
    pub async fn create_memory(&self, input: NewMemory) -> Result<Memory> {
        if input.content.trim().is_empty() {
            return Err(MnemoError::Validation(
                "Memory content cannot be empty".to_string(),
            ));
        }

        let embedding = self.embeddings.embed(&input.content).await?;

        let mut memory = Memory::new(input.agent_id, input.content, input.memory_type)
            .with_embedding(embedding);
        if let Some(importance) = input.importance {
            memory = memory.with_importance(importance);
        }
        memory.session_id = input.session_id;
        memory.metadata = input.metadata;

        let stored = self.memories.create(&memory).await?;
        info!("Created memory {} for agent {}", stored.id, stored.agent_id);
        Ok(stored)
    }

    /// Read a memory without touching its access statistics
    pub async fn get_memory(&self, id: MemoryId) -> Result<Memory> {
        self.memories
            .get(id)
            .await?
            .ok_or_else(|| MnemoError::MemoryNotFound(id.to_string()))
    }

    /// Read a memory and record the access
    pub async fn recall(&self, id: MemoryId) -> Result<Memory> {
        self.memories
            .update(
                id,
                MemoryPatch::new()
                    .increment_access_count(1)
                    .last_accessed(Utc::now()),
            )
            .await
    }

    /// Apply updates; a content change re-embeds and drops SEMANTIC links
    pub async fn update_memory(&self, id: MemoryId, updates: MemoryUpdates) -> Result<Memory> {
        let current = self.get_memory(id).await?;
        let mut patch = MemoryPatch::new();

        let content_changed = matches!(&updates.content, Some(c) if *c != current.content);
        if content_changed {
            if let Some(content) = updates.content {
                if content.trim().is_empty() {
                    return Err(MnemoError::Validation(
                        "Memory content cannot be empty".to_string(),
                    ));
                }
                let embedding = self.embeddings.embed(&content).await?;
                patch = patch.content(content).embedding(Some(embedding));
            }
        }
        if let Some(memory_type) = updates.memory_type {
            patch = patch.memory_type(memory_type);
        }
        if let Some(importance) = updates.importance {
            patch = patch.importance(importance);
        }
        if let Some(metadata) = updates.metadata {
            patch = patch.metadata(metadata);
        }

        let updated = self.memories.update(id, patch).await?;

        if content_changed {
            let removed = self
                .links
                .delete_many(&LinkFilter::new().link_type(LinkType::Semantic).touching(&[id]))
                .await?;
            debug!("Content of {} changed, dropped {} semantic links", id, removed);
        }

        Ok(updated)
    }

    /// Delete a memory and every link touching it
    pub async fn delete_memory(&self, id: MemoryId) -> Result<()> {
        self.get_memory(id).await?;

        let removed = self
            .links
            .delete_many(&LinkFilter::new().touching(&[id]))
            .await?;
        self.memories
            .delete_many(&MemoryFilter::new().ids(&[id]))
            .await?;

        info!("Deleted memory {} and {} links", id, removed);
        Ok(())
    }

    /// List an agent's memories, most important first
    ///
    /// Archived memories are only listed when asked for by type.
    pub async fn list_memories(
        &self,
        agent_id: &AgentId,
        memory_type: Option<MemoryType>,
        limit: Option<usize>,
    ) -> Result<Vec<Memory>> {
        let filter = match memory_type {
            Some(memory_type) => MemoryFilter::new().agent(agent_id).memory_type(memory_type),
            None => MemoryFilter::new()
                .agent(agent_id)
                .exclude_type(MemoryType::Archived),
        };

        self.memories
            .find_many(&filter, MemoryOrder::ImportanceDesc, limit)
            .await
    }

    /// Semantic search over an agent's active memories
    pub async fn search(
        &self,
        agent_id: &AgentId,
        query: &str,
        threshold: f32,
        limit: usize,
    ) -> Result<Vec<SearchHit>> {
        let embedding = self.embeddings.embed(query).await?;

        let filter = MemoryFilter::active_embedded().agent(agent_id);
        let corpus = self
            .memories
            .find_embeddings(&filter, MemoryOrder::Insertion)
            .await?;
        let matches = self
            .index
            .find_similar(&embedding, &corpus, None, threshold, limit)?;

        let ids: Vec<MemoryId> = matches.iter().map(|m| m.id).collect();
        let memories = self
            .memories
            .find_many(&MemoryFilter::new().ids(&ids), MemoryOrder::Insertion, None)
            .await?;

        Ok(matches
            .into_iter()
            .filter_map(|m| {
                memories
                    .iter()
                    .find(|memory| memory.id == m.id)
                    .map(|memory| SearchHit {
                        memory: memory.clone(),
                        similarity: m.similarity,
                    })
            })
            .collect())
    }

    /// Links touching a memory, strongest first
    pub async fn related(&self, id: MemoryId) -> Result<Vec<MemoryLink>> {
        self.get_memory(id).await?;

        let mut links = self
            .links
            .find_many(&LinkFilter::new().touching(&[id]))
            .await?;
        links.sort_by(|a, b| b.strength.total_cmp(&a.strength));
        Ok(links)
    }
}
