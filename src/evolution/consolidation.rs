// Memory Consolidation
//
// Greedy grouping of near-duplicate memories. Memories are visited in
// importance-descending order; each unclaimed memory seeds a group with the
// unclaimed memories after it that reach the consolidation threshold.
// Every group folds into its best-retained member, the rest are archived
// and linked from it.

use super::engine::{EvolutionEngine, PhaseKind};
use super::merge::distinct_contents;
use crate::error::{MnemoError, Result};
use crate::similarity::{EmbeddedMemory, SimilarityIndex};
use crate::storage::{MemoryFilter, MemoryOrder, MemoryPatch};
use crate::types::{AgentId, Memory, MemoryLink, MemoryType, Metadata};
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

/// Outcome of a consolidation run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsolidationReport {
    /// Groups folded into a primary
    pub consolidated_groups: usize,

    /// Active embedded memories examined
    pub memories_processed: usize,

    /// Secondaries archived into a primary
    pub memories_archived: usize,

    /// Groups skipped after a failure (only with isolated failures)
    pub failed_groups: usize,
}

/// A group member and its similarity to the group's seed
#[derive(Debug, Clone)]
pub struct GroupMember {
    pub memory: Memory,
    pub similarity: f32,
}

/// Partition `memories` (already importance-descending) into groups
///
/// Only groups with at least two members are returned. A memory belongs to
/// at most one group.
pub fn group_similar(
    memories: &[Memory],
    index: &dyn SimilarityIndex,
    threshold: f32,
) -> Result<Vec<Vec<GroupMember>>> {
    let positions: Vec<usize> = (0..memories.len())
        .filter(|&i| memories[i].embedding.is_some())
        .collect();
    let corpus: Vec<EmbeddedMemory> = positions
        .iter()
        .filter_map(|&i| {
            memories[i]
                .embedding
                .as_ref()
                .map(|e| EmbeddedMemory::new(memories[i].id, e.clone()))
        })
        .collect();

    let mut claimed = vec![false; corpus.len()];
    let mut groups = Vec::new();

    for seed in 0..corpus.len() {
        if claimed[seed] {
            continue;
        }
        claimed[seed] = true;

        let tail = &corpus[seed + 1..];
        let matches = index.find_similar(&corpus[seed].embedding, tail, None, threshold, 0)?;

        let mut group = vec![GroupMember {
            memory: memories[positions[seed]].clone(),
            similarity: 1.0,
        }];

        for found in matches {
            let Some(offset) = tail.iter().position(|entry| entry.id == found.id) else {
                continue;
            };
            let slot = seed + 1 + offset;
            if claimed[slot] {
                continue;
            }
            claimed[slot] = true;
            group.push(GroupMember {
                memory: memories[positions[slot]].clone(),
                similarity: found.similarity,
            });
        }

        if group.len() > 1 {
            groups.push(group);
        }
    }

    Ok(groups)
}

impl EvolutionEngine {
    /// Fold near-duplicate memories together, optionally for one agent
    pub async fn consolidate_similar_memories(
        &self,
        agent_id: Option<&AgentId>,
    ) -> Result<ConsolidationReport> {
        let _guard = self.locks.try_acquire(PhaseKind::Consolidation)?;

        info!(
            "Starting memory consolidation (threshold: {}, agent: {})",
            self.params.consolidation_threshold,
            agent_id.map(|a| a.as_str()).unwrap_or("all")
        );

        let memories = self
            .memories
            .find_many(
                &MemoryFilter::active_embedded().agent_opt(agent_id),
                MemoryOrder::ImportanceDesc,
                None,
            )
            .await?;

        let groups = group_similar(
            &memories,
            self.index.as_ref(),
            self.params.consolidation_threshold,
        )?;

        let mut report = ConsolidationReport {
            memories_processed: memories.len(),
            ..Default::default()
        };

        for group in groups {
            self.ensure_active(PhaseKind::Consolidation)?;
            let size = group.len();

            match self.consolidate_group(group).await {
                Ok(()) => {
                    report.consolidated_groups += 1;
                    report.memories_archived += size - 1;
                }
                Err(e) if self.params.isolate_group_failures && !is_fatal(&e) => {
                    warn!("Skipping consolidation group of {} memories: {}", size, e);
                    report.failed_groups += 1;
                }
                Err(e) => return Err(e),
            }
        }

        info!(
            "Memory consolidation complete: {} groups from {} memories",
            report.consolidated_groups, report.memories_processed
        );

        Ok(report)
    }

    async fn consolidate_group(&self, mut group: Vec<GroupMember>) -> Result<()> {
        // Stable: equal scores keep seed-first order
        group.sort_by(|a, b| {
            b.memory
                .retention_score()
                .total_cmp(&a.memory.retention_score())
        });

        let primary = &group[0].memory;
        let secondaries = &group[1..];

        let contents = distinct_contents(group.iter().map(|m| m.memory.content.as_str()));
        let content = if contents.len() == 1 {
            primary.content.clone()
        } else {
            self.merger.merge(&contents)
        };

        let importance = (group.iter().map(|m| m.memory.importance).sum::<f32>()
            / group.len() as f32)
            .min(1.0);
        let access_count = group.iter().map(|m| m.memory.access_count).sum::<u64>();
        let consolidated_at = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);

        debug!(
            "Consolidating {} memories into {}",
            group.len(),
            primary.id
        );

        let mut flags = Metadata::new();
        flags.insert("consolidated".to_string(), Value::Bool(true));
        flags.insert("originalCount".to_string(), Value::from(group.len()));
        flags.insert(
            "consolidatedAt".to_string(),
            Value::String(consolidated_at.clone()),
        );

        self.memories
            .update(
                primary.id,
                MemoryPatch::new()
                    .content(content)
                    .importance(importance)
                    .access_count(access_count)
                    .metadata(flags),
            )
            .await?;

        let links: Vec<MemoryLink> = secondaries
            .iter()
            .map(|m| MemoryLink::hierarchical(primary.id, m.memory.id, m.similarity))
            .collect();
        self.links.create_many(&links, true).await?;

        for secondary in secondaries {
            let mut absorbed = Metadata::new();
            absorbed.insert(
                "consolidatedInto".to_string(),
                Value::String(primary.id.to_string()),
            );
            absorbed.insert(
                "consolidatedAt".to_string(),
                Value::String(consolidated_at.clone()),
            );

            self.memories
                .update(
                    secondary.memory.id,
                    MemoryPatch::new()
                        .memory_type(MemoryType::Archived)
                        .metadata(absorbed),
                )
                .await?;
        }

        Ok(())
    }
}

/// Errors that end a run even when group failures are isolated
fn is_fatal(err: &MnemoError) -> bool {
    matches!(
        err,
        MnemoError::Cancelled(_) | MnemoError::PhaseInProgress(_)
    )
}
