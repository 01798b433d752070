// Evolution Engine
//
// Holds the injected collaborators (stores, embedder, similarity index,
// merge strategy) and the per-phase locks. The phases themselves live in
// decay.rs, consolidation.rs, links.rs and transfer.rs.

use super::config::EvolutionParams;
use super::consolidation::ConsolidationReport;
use super::decay::DecayReport;
use super::links::LinkUpdateReport;
use super::merge::{ContentMerger, NewlineJoinMerger};
use crate::embeddings::EmbeddingService;
use crate::error::{MnemoError, Result};
use crate::similarity::{BruteForceIndex, SimilarityIndex};
use crate::storage::{LinkFilter, LinkStore, MemoryFilter, MemoryOrder, MemoryStore};
use crate::types::{AgentId, LinkType, MemoryType};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Kinds of evolution work; at most one of each runs at a time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PhaseKind {
    Decay,
    Consolidation,
    LinkUpdate,
    Transfer,
    Cycle,
}

impl PhaseKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PhaseKind::Decay => "decay",
            PhaseKind::Consolidation => "consolidation",
            PhaseKind::LinkUpdate => "link_update",
            PhaseKind::Transfer => "transfer",
            PhaseKind::Cycle => "cycle",
        }
    }
}

impl fmt::Display for PhaseKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One named mutex per phase kind
#[derive(Debug, Default)]
pub struct PhaseLocks {
    decay: Arc<Mutex<()>>,
    consolidation: Arc<Mutex<()>>,
    link_update: Arc<Mutex<()>>,
    transfer: Arc<Mutex<()>>,
    cycle: Arc<Mutex<()>>,
}

impl PhaseLocks {
    fn lock_for(&self, kind: PhaseKind) -> &Arc<Mutex<()>> {
        match kind {
            PhaseKind::Decay => &self.decay,
            PhaseKind::Consolidation => &self.consolidation,
            PhaseKind::LinkUpdate => &self.link_update,
            PhaseKind::Transfer => &self.transfer,
            PhaseKind::Cycle => &self.cycle,
        }
    }

    /// Take the lock for `kind`, failing at once if it is held
    pub fn try_acquire(&self, kind: PhaseKind) -> Result<OwnedMutexGuard<()>> {
        self.lock_for(kind)
            .clone()
            .try_lock_owned()
            .map_err(|_| MnemoError::PhaseInProgress(kind.to_string()))
    }

    pub fn is_busy(&self, kind: PhaseKind) -> bool {
        self.lock_for(kind).try_lock().is_err()
    }
}

/// Orchestrates decay, consolidation, link maintenance and transfer
pub struct EvolutionEngine {
    pub(super) memories: Arc<dyn MemoryStore>,
    pub(super) links: Arc<dyn LinkStore>,
    pub(super) embeddings: Arc<dyn EmbeddingService>,
    pub(super) index: Arc<dyn SimilarityIndex>,
    pub(super) merger: Arc<dyn ContentMerger>,
    pub(super) params: EvolutionParams,
    pub(super) cancel: CancellationToken,
    pub(super) locks: PhaseLocks,
}

impl EvolutionEngine {
    pub fn new(
        memories: Arc<dyn MemoryStore>,
        links: Arc<dyn LinkStore>,
        embeddings: Arc<dyn EmbeddingService>,
        params: EvolutionParams,
    ) -> Self {
        Self {
            memories,
            links,
            embeddings,
            index: Arc::new(BruteForceIndex),
            merger: Arc::new(NewlineJoinMerger),
            params,
            cancel: CancellationToken::new(),
            locks: PhaseLocks::default(),
        }
    }

    /// Replace the brute-force similarity index
    pub fn with_index(mut self, index: Arc<dyn SimilarityIndex>) -> Self {
        self.index = index;
        self
    }

    /// Replace the content merge strategy used by consolidation
    pub fn with_merger<M: ContentMerger + 'static>(mut self, merger: M) -> Self {
        self.merger = Arc::new(merger);
        self
    }

    /// Observe an external cancellation token
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn params(&self) -> &EvolutionParams {
        &self.params
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn is_running(&self, kind: PhaseKind) -> bool {
        self.locks.is_busy(kind)
    }

    /// Fail with `Cancelled` if cancellation was requested
    pub(super) fn ensure_active(&self, kind: PhaseKind) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(MnemoError::Cancelled(kind.to_string()));
        }
        Ok(())
    }

    /// Decay, then consolidate, then update links
    ///
    /// A failure in any phase aborts the phases after it.
    pub async fn run_evolution_cycle(&self) -> Result<EvolutionCycleReport> {
        let _guard = self.locks.try_acquire(PhaseKind::Cycle)?;
        info!("Starting evolution cycle");

        let decay = self.decay_memories().await?;
        let consolidation = self.consolidate_similar_memories(None).await?;
        let links = self.update_memory_links().await?;

        let report = EvolutionCycleReport {
            decay,
            consolidation,
            links,
        };

        info!(
            "Evolution cycle complete: {} decayed, {} archived, {} deleted, {} groups consolidated, {} links created, {} links updated",
            report.decayed(),
            report.archived(),
            report.deleted(),
            report.consolidated_groups(),
            report.links_created(),
            report.links_updated()
        );

        Ok(report)
    }

    /// Summary of the corpus, optionally scoped to one agent
    pub async fn stats(&self, agent_id: Option<&AgentId>) -> Result<EvolutionStats> {
        let memories = self
            .memories
            .find_many(&MemoryFilter::new().agent_opt(agent_id), MemoryOrder::Insertion, None)
            .await?;

        let mut by_type = BTreeMap::new();
        for memory_type in MemoryType::ALL {
            by_type.insert(memory_type, 0);
        }
        for memory in &memories {
            *by_type.entry(memory.memory_type).or_insert(0) += 1;
        }

        let average_importance = if memories.is_empty() {
            0.0
        } else {
            memories.iter().map(|m| m.importance).sum::<f32>() / memories.len() as f32
        };

        let scope = match agent_id {
            Some(_) => {
                let ids: Vec<_> = memories.iter().map(|m| m.id).collect();
                LinkFilter::new().touching(&ids)
            }
            None => LinkFilter::new(),
        };

        let mut links_by_type = BTreeMap::new();
        for link_type in LinkType::ALL {
            let count = self
                .links
                .count(&scope.clone().link_type(link_type))
                .await?;
            links_by_type.insert(link_type, count);
        }

        Ok(EvolutionStats {
            total_memories: memories.len(),
            with_embeddings: memories.iter().filter(|m| m.embedding.is_some()).count(),
            average_importance,
            total_links: links_by_type.values().sum(),
            by_type,
            links_by_type,
        })
    }
}

/// Combined result of a full evolution cycle
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EvolutionCycleReport {
    pub decay: DecayReport,
    pub consolidation: ConsolidationReport,
    pub links: LinkUpdateReport,
}

impl EvolutionCycleReport {
    pub fn decayed(&self) -> usize {
        self.decay.decayed
    }

    pub fn archived(&self) -> usize {
        self.decay.archived
    }

    pub fn deleted(&self) -> usize {
        self.decay.deleted
    }

    pub fn consolidated_groups(&self) -> usize {
        self.consolidation.consolidated_groups
    }

    pub fn links_created(&self) -> usize {
        self.links.links_created
    }

    pub fn links_updated(&self) -> usize {
        self.links.links_updated
    }

    /// Records touched across all phases
    pub fn total_changes(&self) -> usize {
        self.decay.decayed
            + self.decay.archived
            + self.decay.deleted
            + self.consolidation.memories_archived
            + self.links.links_created
            + self.links.links_updated
    }
}

/// Corpus summary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvolutionStats {
    pub total_memories: usize,
    pub by_type: BTreeMap<MemoryType, usize>,
    pub with_embeddings: usize,
    pub average_importance: f32,
    pub total_links: usize,
    pub links_by_type: BTreeMap<LinkType, usize>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_phase_lock_rejects_second_holder() {
        let locks = PhaseLocks::default();

        let guard = locks.try_acquire(PhaseKind::Decay).unwrap();
        assert!(locks.is_busy(PhaseKind::Decay));
        assert!(matches!(
            locks.try_acquire(PhaseKind::Decay),
            Err(MnemoError::PhaseInProgress(kind)) if kind == "decay"
        ));

        // Other kinds are independent
        assert!(locks.try_acquire(PhaseKind::LinkUpdate).is_ok());

        drop(guard);
        assert!(locks.try_acquire(PhaseKind::Decay).is_ok());
    }

    #[test]
    fn test_cycle_report_accessors() {
        let mut report = EvolutionCycleReport::default();
        report.decay.decayed = 3;
        report.decay.archived = 1;
        report.consolidation.consolidated_groups = 2;
        report.consolidation.memories_archived = 2;
        report.links.links_created = 4;

        assert_eq!(report.decayed(), 3);
        assert_eq!(report.consolidated_groups(), 2);
        assert_eq!(report.links_created(), 4);
        assert_eq!(report.total_changes(), 10);
    }
}
