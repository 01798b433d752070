// Scheduled Evolution Jobs
//
// Thin adapters exposing the engine's entry points to the scheduler. Each
// job names itself after its section in the evolution config.

use super::config::{JobConfig, TransferRoute};
use super::engine::EvolutionEngine;
use super::scheduler::{EvolutionJob, JobError, JobReport};
use crate::types::AgentId;
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;

fn report<T: Serialize>(
    details: &T,
    memories_processed: usize,
    changes_made: usize,
    started: Instant,
) -> Result<JobReport, JobError> {
    Ok(JobReport {
        memories_processed,
        changes_made,
        duration: started.elapsed(),
        errors: 0,
        error_message: None,
        details: serde_json::to_value(details)
            .map_err(|e| JobError::ExecutionError(e.to_string()))?,
    })
}

/// Importance decay, archival and purge
pub struct DecayJob {
    engine: Arc<EvolutionEngine>,
}

impl DecayJob {
    pub fn new(engine: Arc<EvolutionEngine>) -> Self {
        Self { engine }
    }
}

#[async_trait]
impl EvolutionJob for DecayJob {
    fn name(&self) -> &str {
        "decay"
    }

    async fn run(&self, _config: &JobConfig) -> Result<JobReport, JobError> {
        let start = Instant::now();
        let result = self.engine.decay_memories().await?;
        report(
            &result,
            result.decayed,
            result.decayed + result.archived + result.deleted,
            start,
        )
    }
}

/// Store-wide consolidation
pub struct ConsolidationJob {
    engine: Arc<EvolutionEngine>,
}

impl ConsolidationJob {
    pub fn new(engine: Arc<EvolutionEngine>) -> Self {
        Self { engine }
    }
}

#[async_trait]
impl EvolutionJob for ConsolidationJob {
    fn name(&self) -> &str {
        "consolidation"
    }

    async fn run(&self, _config: &JobConfig) -> Result<JobReport, JobError> {
        let start = Instant::now();
        let result = self.engine.consolidate_similar_memories(None).await?;

        let mut job_report = report(
            &result,
            result.memories_processed,
            result.consolidated_groups + result.memories_archived,
            start,
        )?;
        job_report.errors = result.failed_groups;
        Ok(job_report)
    }
}

/// SEMANTIC link maintenance
pub struct LinkUpdateJob {
    engine: Arc<EvolutionEngine>,
}

impl LinkUpdateJob {
    pub fn new(engine: Arc<EvolutionEngine>) -> Self {
        Self { engine }
    }
}

#[async_trait]
impl EvolutionJob for LinkUpdateJob {
    fn name(&self) -> &str {
        "link_update"
    }

    async fn run(&self, _config: &JobConfig) -> Result<JobReport, JobError> {
        let start = Instant::now();
        let result = self.engine.update_memory_links().await?;
        report(
            &result,
            result.memories_scanned,
            result.links_created + result.links_updated,
            start,
        )
    }
}

/// Decay, consolidation and link update in sequence
pub struct FullCycleJob {
    engine: Arc<EvolutionEngine>,
}

impl FullCycleJob {
    pub fn new(engine: Arc<EvolutionEngine>) -> Self {
        Self { engine }
    }
}

#[async_trait]
impl EvolutionJob for FullCycleJob {
    fn name(&self) -> &str {
        "full_cycle"
    }

    async fn run(&self, _config: &JobConfig) -> Result<JobReport, JobError> {
        let start = Instant::now();
        let result = self.engine.run_evolution_cycle().await?;
        report(
            &result,
            result.consolidation.memories_processed,
            result.total_changes(),
            start,
        )
    }
}

/// Knowledge transfer along configured agent routes
pub struct TransferJob {
    engine: Arc<EvolutionEngine>,
    routes: Vec<TransferRoute>,
}

impl TransferJob {
    pub fn new(engine: Arc<EvolutionEngine>, routes: Vec<TransferRoute>) -> Self {
        Self { engine, routes }
    }
}

#[async_trait]
impl EvolutionJob for TransferJob {
    fn name(&self) -> &str {
        "transfer"
    }

    async fn run(&self, _config: &JobConfig) -> Result<JobReport, JobError> {
        let start = Instant::now();
        let mut results = Vec::with_capacity(self.routes.len());
        let mut processed = 0;
        let mut transferred = 0;

        // A failing route aborts the remaining routes
        for route in &self.routes {
            let source = AgentId::new(route.source_agent.clone());
            let target = AgentId::new(route.target_agent.clone());

            let result = self
                .engine
                .transfer_knowledge(&source, &target, &route.memory_types)
                .await?;

            processed += result.total_source_memories;
            transferred += result.transferred;
            results.push(result);
        }

        report(&results, processed, transferred, start)
    }

    async fn should_run(&self) -> Result<bool, JobError> {
        Ok(!self.routes.is_empty())
    }
}

/// All engine-backed jobs, ready for registration
pub fn engine_jobs(
    engine: Arc<EvolutionEngine>,
    routes: Vec<TransferRoute>,
) -> Vec<Arc<dyn EvolutionJob>> {
    vec![
        Arc::new(DecayJob::new(engine.clone())),
        Arc::new(ConsolidationJob::new(engine.clone())),
        Arc::new(LinkUpdateJob::new(engine.clone())),
        Arc::new(FullCycleJob::new(engine.clone())),
        Arc::new(TransferJob::new(engine, routes)),
    ]
}
