// Knowledge Transfer
//
// Copies a source agent's important memories to a target agent, skipping
// anything the target already knows (a same-type memory at or above the
// similarity threshold). The source memories are left untouched.

use super::config::default_transfer_types;
use super::engine::{EvolutionEngine, PhaseKind};
use crate::error::{MnemoError, Result};
use crate::storage::{MemoryFilter, MemoryOrder};
use crate::types::{clamp_importance, AgentId, Memory, MemoryType, Metadata};
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

/// Outcome of a transfer run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferReport {
    /// New memories created for the target agent
    pub transferred: usize,

    /// Source memories that qualified for transfer
    pub total_source_memories: usize,

    /// Candidates the target already knew
    pub already_known: usize,
}

impl EvolutionEngine {
    /// Copy qualifying memories from `source` to `target`
    ///
    /// An empty `memory_types` selects SEMANTIC and PROCEDURAL.
    pub async fn transfer_knowledge(
        &self,
        source: &AgentId,
        target: &AgentId,
        memory_types: &[MemoryType],
    ) -> Result<TransferReport> {
        if source == target {
            return Err(MnemoError::Validation(format!(
                "Agent {} cannot transfer knowledge to itself",
                source
            )));
        }
        if memory_types.contains(&MemoryType::Archived) {
            return Err(MnemoError::Validation(
                "ARCHIVED memories cannot be transferred".to_string(),
            ));
        }

        let _guard = self.locks.try_acquire(PhaseKind::Transfer)?;

        let types = if memory_types.is_empty() {
            default_transfer_types()
        } else {
            memory_types.to_vec()
        };

        info!(
            "Starting knowledge transfer {} -> {} (types: {:?})",
            source, target, types
        );

        let candidates = self
            .memories
            .find_many(
                &MemoryFilter::new()
                    .agent(source)
                    .memory_types(&types)
                    .importance_at_least(self.params.transfer_min_importance),
                MemoryOrder::ImportanceDesc,
                None,
            )
            .await?;

        let mut report = TransferReport {
            total_source_memories: candidates.len(),
            ..Default::default()
        };

        for candidate in &candidates {
            let known = self
                .memories
                .find_embeddings(
                    &MemoryFilter::new()
                        .agent(target)
                        .memory_type(candidate.memory_type),
                    MemoryOrder::Insertion,
                )
                .await?;

            let embedding = match &candidate.embedding {
                Some(embedding) => embedding.clone(),
                None => self.embeddings.embed(&candidate.content).await?,
            };

            let duplicates = self.index.find_similar(
                &embedding,
                &known,
                None,
                self.params.similarity_threshold,
                1,
            )?;

            if let Some(existing) = duplicates.first() {
                debug!(
                    "Skipping {}: target already knows {} ({})",
                    candidate.id, existing.id, existing.similarity
                );
                report.already_known += 1;
                continue;
            }

            self.ensure_active(PhaseKind::Transfer)?;
            let copy = self.transferred_copy(candidate, target, embedding);
            debug!("Transferring {} to {} as {}", candidate.id, target, copy.id);
            self.memories.create(&copy).await?;
            report.transferred += 1;
        }

        info!(
            "Knowledge transfer complete: {} of {} memories transferred",
            report.transferred, report.total_source_memories
        );

        Ok(report)
    }

    fn transferred_copy(&self, source: &Memory, target: &AgentId, embedding: Vec<f32>) -> Memory {
        let mut metadata = Metadata::new();
        metadata.insert("transferred".to_string(), Value::Bool(true));
        metadata.insert(
            "sourceAgentId".to_string(),
            Value::String(source.agent_id.to_string()),
        );
        metadata.insert(
            "originalMemoryId".to_string(),
            Value::String(source.id.to_string()),
        );
        metadata.insert(
            "transferredAt".to_string(),
            Value::String(Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)),
        );

        let mut copy = Memory::new(target.clone(), source.content.clone(), source.memory_type)
            .with_embedding(embedding);
        copy.importance =
            clamp_importance(source.importance * self.params.transfer_importance_factor);
        copy.metadata = metadata;
        copy
    }
}
