//! In-process store backed by vectors behind tokio RwLocks
//!
//! Preserves insertion order, which makes it the reference adapter for
//! deterministic tests.

use super::filter::{LinkFilter, LinkPatch, MemoryFilter, MemoryOrder, MemoryPatch};
use super::{LinkStore, MemoryStore};
use crate::error::{MnemoError, Result};
use crate::similarity::EmbeddedMemory;
use crate::types::{clamp_importance, LinkId, Memory, MemoryId, MemoryLink, MemoryType};
use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

/// Memory and link store held entirely in process memory
#[derive(Debug, Default)]
pub struct InMemoryStore {
    memories: RwLock<Vec<Memory>>,
    links: RwLock<Vec<MemoryLink>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn sorted<'a>(mut memories: Vec<&'a Memory>, order: MemoryOrder) -> Vec<&'a Memory> {
    match order {
        MemoryOrder::Insertion => {}
        MemoryOrder::ImportanceDesc => {
            memories.sort_by(|a, b| b.importance.total_cmp(&a.importance));
        }
        MemoryOrder::CreatedAtDesc => {
            memories.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        }
    }
    memories
}

fn same_key(a: &MemoryLink, b: &MemoryLink) -> bool {
    a.source_id == b.source_id && a.target_id == b.target_id && a.link_type == b.link_type
}

#[async_trait]
impl MemoryStore for InMemoryStore {
    async fn create(&self, memory: &Memory) -> Result<Memory> {
        let mut memories = self.memories.write().await;
        if memories.iter().any(|m| m.id == memory.id) {
            return Err(MnemoError::AlreadyExists(format!("memory {}", memory.id)));
        }

        let mut stored = memory.clone();
        stored.importance = clamp_importance(stored.importance);
        memories.push(stored.clone());
        Ok(stored)
    }

    async fn get(&self, id: MemoryId) -> Result<Option<Memory>> {
        let memories = self.memories.read().await;
        Ok(memories.iter().find(|m| m.id == id).cloned())
    }

    async fn update(&self, id: MemoryId, patch: MemoryPatch) -> Result<Memory> {
        let mut memories = self.memories.write().await;
        let memory = memories
            .iter_mut()
            .find(|m| m.id == id)
            .ok_or_else(|| MnemoError::MemoryNotFound(id.to_string()))?;

        patch.apply(memory, Utc::now());
        Ok(memory.clone())
    }

    async fn bulk_adjust_importance(&self, filter: &MemoryFilter, delta: f32) -> Result<usize> {
        let now = Utc::now();
        let mut memories = self.memories.write().await;
        let mut count = 0;

        for memory in memories.iter_mut().filter(|m| filter.matches(m)) {
            memory.importance = clamp_importance(memory.importance + delta);
            memory.updated_at = now;
            count += 1;
        }

        Ok(count)
    }

    async fn bulk_set_type(
        &self,
        filter: &MemoryFilter,
        memory_type: MemoryType,
    ) -> Result<usize> {
        let now = Utc::now();
        let mut memories = self.memories.write().await;
        let mut count = 0;

        for memory in memories.iter_mut().filter(|m| filter.matches(m)) {
            memory.memory_type = memory_type;
            memory.updated_at = now;
            count += 1;
        }

        Ok(count)
    }

    async fn delete_many(&self, filter: &MemoryFilter) -> Result<usize> {
        let mut memories = self.memories.write().await;
        let before = memories.len();
        memories.retain(|m| !filter.matches(m));
        Ok(before - memories.len())
    }

    async fn find_many(
        &self,
        filter: &MemoryFilter,
        order: MemoryOrder,
        limit: Option<usize>,
    ) -> Result<Vec<Memory>> {
        let memories = self.memories.read().await;
        let matched = memories.iter().filter(|m| filter.matches(m)).collect();

        Ok(sorted(matched, order)
            .into_iter()
            .take(limit.unwrap_or(usize::MAX))
            .cloned()
            .collect())
    }

    async fn find_embeddings(
        &self,
        filter: &MemoryFilter,
        order: MemoryOrder,
    ) -> Result<Vec<EmbeddedMemory>> {
        let memories = self.memories.read().await;
        let matched = memories.iter().filter(|m| filter.matches(m)).collect();

        Ok(sorted(matched, order)
            .into_iter()
            .filter_map(|m| {
                m.embedding
                    .as_ref()
                    .map(|embedding| EmbeddedMemory::new(m.id, embedding.clone()))
            })
            .collect())
    }

    async fn count(&self, filter: &MemoryFilter) -> Result<usize> {
        let memories = self.memories.read().await;
        Ok(memories.iter().filter(|m| filter.matches(m)).count())
    }
}

#[async_trait]
impl LinkStore for InMemoryStore {
    async fn create(&self, link: &MemoryLink) -> Result<MemoryLink> {
        let mut links = self.links.write().await;
        if links.iter().any(|l| same_key(l, link)) {
            return Err(MnemoError::AlreadyExists(format!(
                "{} link {} -> {}",
                link.link_type, link.source_id, link.target_id
            )));
        }

        links.push(link.clone());
        Ok(link.clone())
    }

    async fn create_many(&self, new_links: &[MemoryLink], skip_duplicates: bool) -> Result<usize> {
        let mut links = self.links.write().await;

        if !skip_duplicates {
            for (i, link) in new_links.iter().enumerate() {
                let duplicate = links.iter().any(|l| same_key(l, link))
                    || new_links[..i].iter().any(|l| same_key(l, link));
                if duplicate {
                    return Err(MnemoError::AlreadyExists(format!(
                        "{} link {} -> {}",
                        link.link_type, link.source_id, link.target_id
                    )));
                }
            }
        }

        let mut created = 0;
        for link in new_links {
            if links.iter().any(|l| same_key(l, link)) {
                continue;
            }
            links.push(link.clone());
            created += 1;
        }

        Ok(created)
    }

    async fn find_one(&self, filter: &LinkFilter) -> Result<Option<MemoryLink>> {
        let links = self.links.read().await;
        Ok(links.iter().find(|l| filter.matches(l)).cloned())
    }

    async fn find_many(&self, filter: &LinkFilter) -> Result<Vec<MemoryLink>> {
        let links = self.links.read().await;
        Ok(links.iter().filter(|l| filter.matches(l)).cloned().collect())
    }

    async fn update(&self, id: LinkId, patch: LinkPatch) -> Result<MemoryLink> {
        let mut links = self.links.write().await;
        let link = links
            .iter_mut()
            .find(|l| l.id == id)
            .ok_or_else(|| MnemoError::LinkNotFound(id.to_string()))?;

        patch.apply(link, Utc::now());
        Ok(link.clone())
    }

    async fn delete_many(&self, filter: &LinkFilter) -> Result<usize> {
        let mut links = self.links.write().await;
        let before = links.len();
        links.retain(|l| !filter.matches(l));
        Ok(before - links.len())
    }

    async fn count(&self, filter: &LinkFilter) -> Result<usize> {
        let links = self.links.read().await;
        Ok(links.iter().filter(|l| filter.matches(l)).count())
    }
}
