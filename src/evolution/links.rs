// Semantic Link Maintenance
//
// Rebuilds the SEMANTIC similarity graph over active embedded memories.
// Links are keyed on the unordered pair: existing links are refreshed in
// place, missing ones are created with the lower id as source.

use super::engine::{EvolutionEngine, PhaseKind};
use crate::error::Result;
use crate::storage::{LinkFilter, LinkPatch, MemoryFilter, MemoryOrder};
use crate::types::{canonical_pair, LinkType, MemoryId, MemoryLink};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{debug, info};

/// Outcome of a link update run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkUpdateReport {
    /// Active embedded memories scanned
    pub memories_scanned: usize,

    pub links_created: usize,
    pub links_updated: usize,
}

impl EvolutionEngine {
    /// Create or refresh SEMANTIC links between similar memories
    pub async fn update_memory_links(&self) -> Result<LinkUpdateReport> {
        let _guard = self.locks.try_acquire(PhaseKind::LinkUpdate)?;

        info!(
            "Starting link update (threshold: {}, max per memory: {})",
            self.params.similarity_threshold, self.params.max_links_per_memory
        );

        let corpus = self
            .memories
            .find_embeddings(&MemoryFilter::active_embedded(), MemoryOrder::Insertion)
            .await?;

        let mut report = LinkUpdateReport {
            memories_scanned: corpus.len(),
            ..Default::default()
        };
        let mut seen: HashSet<(MemoryId, MemoryId)> = HashSet::new();

        for entry in &corpus {
            let peers = self.index.find_similar(
                &entry.embedding,
                &corpus,
                Some(entry.id),
                self.params.similarity_threshold,
                self.params.max_links_per_memory,
            )?;

            for peer in peers {
                let pair = canonical_pair(entry.id, peer.id);
                if !seen.insert(pair) {
                    continue;
                }

                self.ensure_active(PhaseKind::LinkUpdate)?;
                if self.upsert_semantic_link(pair, peer.similarity).await? {
                    report.links_created += 1;
                } else {
                    report.links_updated += 1;
                }
            }
        }

        info!(
            "Link update complete: {} created, {} updated over {} memories",
            report.links_created, report.links_updated, report.memories_scanned
        );

        Ok(report)
    }

    /// Returns true when a new link was created
    async fn upsert_semantic_link(
        &self,
        (source, target): (MemoryId, MemoryId),
        similarity: f32,
    ) -> Result<bool> {
        match self.find_semantic_link(source, target).await? {
            Some(link) => {
                debug!(
                    "Refreshing link {} ({} -> {}): {}",
                    link.id, link.source_id, link.target_id, similarity
                );
                self.links
                    .update(
                        link.id,
                        LinkPatch {
                            strength: Some(similarity),
                            similarity: Some(similarity),
                        },
                    )
                    .await?;
                Ok(false)
            }
            None => {
                debug!("Linking {} -> {}: {}", source, target, similarity);
                self.links
                    .create(&MemoryLink::semantic(source, target, similarity))
                    .await?;
                Ok(true)
            }
        }
    }

    /// SEMANTIC link between two memories in either direction
    async fn find_semantic_link(&self, a: MemoryId, b: MemoryId) -> Result<Option<MemoryLink>> {
        if let Some(link) = self
            .links
            .find_one(&LinkFilter::between(a, b, LinkType::Semantic))
            .await?
        {
            return Ok(Some(link));
        }

        self.links
            .find_one(&LinkFilter::between(b, a, LinkType::Semantic))
            .await
    }
}
