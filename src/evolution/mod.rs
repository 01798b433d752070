// Evolution Module - Memory maintenance over the similarity graph
//
// Components:
// - engine: collaborators, per-phase locks, full cycle and stats
// - decay: importance decay, archival and purge
// - consolidation: greedy grouping and folding of near-duplicates
// - links: SEMANTIC link discovery and refresh
// - transfer: deduplicated copy of knowledge between agents
// - merge: pluggable content merge strategy
// - config, jobs, scheduler: periodic execution

pub mod config;
pub mod consolidation;
pub mod decay;
pub mod engine;
pub mod jobs;
pub mod links;
pub mod merge;
pub mod scheduler;
pub mod transfer;

pub use config::{ConfigError, EvolutionConfig, EvolutionParams, JobConfig, TransferRoute};
pub use consolidation::ConsolidationReport;
pub use decay::DecayReport;
pub use engine::{EvolutionCycleReport, EvolutionEngine, EvolutionStats, PhaseKind, PhaseLocks};
pub use jobs::{
    engine_jobs, ConsolidationJob, DecayJob, FullCycleJob, LinkUpdateJob, TransferJob,
};
pub use links::LinkUpdateReport;
pub use merge::{ContentMerger, NewlineJoinMerger};
pub use scheduler::{
    BackgroundScheduler, EvolutionJob, JobError, JobReport, JobRun, JobStatus, SchedulerError,
};
pub use transfer::TransferReport;
