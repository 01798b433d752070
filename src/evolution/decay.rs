// Importance Decay
//
// Lowers every live memory's importance by a fixed rate, archives memories
// that fall to the archive threshold, and purges memories that are old,
// unused and unimportant. Purged memories take their links with them.

use super::engine::{EvolutionEngine, PhaseKind};
use crate::error::{MnemoError, Result};
use crate::storage::{LinkFilter, MemoryFilter, MemoryOrder};
use crate::types::{MemoryId, MemoryType};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Outcome of a decay run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecayReport {
    /// Memories whose importance was lowered
    pub decayed: usize,

    /// Memories newly set to ARCHIVED
    pub archived: usize,

    /// Memories purged
    pub deleted: usize,

    /// Links removed along with purged memories
    pub links_removed: usize,
}

impl EvolutionEngine {
    /// Run one decay pass over the whole store
    pub async fn decay_memories(&self) -> Result<DecayReport> {
        let _guard = self.locks.try_acquire(PhaseKind::Decay)?;
        let params = &self.params;

        info!(
            "Starting memory decay (rate: {}, archive at: {}, purge at: {})",
            params.decay_rate, params.archive_threshold, params.purge_threshold
        );

        // Resolve the purge cutoff before any write
        let cutoff = Duration::try_days(params.max_memory_age_days as i64)
            .and_then(|age| Utc::now().checked_sub_signed(age))
            .ok_or_else(|| {
                MnemoError::Validation(format!(
                    "max_memory_age_days {} is out of range",
                    params.max_memory_age_days
                ))
            })?;

        self.ensure_active(PhaseKind::Decay)?;
        let decayed = self
            .memories
            .bulk_adjust_importance(
                &MemoryFilter::new().importance_above(0.0),
                -params.decay_rate,
            )
            .await?;
        debug!("Decayed importance of {} memories", decayed);

        self.ensure_active(PhaseKind::Decay)?;
        let archived = self
            .memories
            .bulk_set_type(
                &MemoryFilter::new()
                    .exclude_type(MemoryType::Archived)
                    .importance_at_most(params.archive_threshold),
                MemoryType::Archived,
            )
            .await?;
        debug!("Archived {} memories", archived);

        let (deleted, links_removed) = self.purge_stale(cutoff).await?;

        let report = DecayReport {
            decayed,
            archived,
            deleted,
            links_removed,
        };

        info!(
            "Memory decay complete: {} decayed, {} archived, {} deleted",
            report.decayed, report.archived, report.deleted
        );

        Ok(report)
    }

    /// Delete memories that are old, at most once accessed and below the
    /// purge threshold, plus every link touching them
    async fn purge_stale(&self, cutoff: DateTime<Utc>) -> Result<(usize, usize)> {
        let stale = MemoryFilter::new()
            .created_before(cutoff)
            .last_accessed_before(cutoff)
            .max_access_count(1)
            .importance_at_most(self.params.purge_threshold);

        let doomed: Vec<MemoryId> = self
            .memories
            .find_many(&stale, MemoryOrder::Insertion, None)
            .await?
            .into_iter()
            .map(|m| m.id)
            .collect();

        if doomed.is_empty() {
            return Ok((0, 0));
        }

        debug!("Purging {} stale memories", doomed.len());

        self.ensure_active(PhaseKind::Decay)?;
        let links_removed = self
            .links
            .delete_many(&LinkFilter::new().touching(&doomed))
            .await?;

        // Re-apply the criteria so a memory recalled meanwhile survives
        let deleted = self.memories.delete_many(&stale.ids(&doomed)).await?;

        Ok((deleted, links_removed))
    }
}
