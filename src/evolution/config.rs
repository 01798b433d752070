// Evolution Configuration
//
// Thresholds used by the evolution phases plus per-job scheduling
// (interval, timeout) and the agent routes for scheduled knowledge transfer.

use crate::error::MnemoError;
use crate::types::MemoryType;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

impl From<ConfigError> for MnemoError {
    fn from(err: ConfigError) -> Self {
        MnemoError::Config(err.to_string())
    }
}

/// Main evolution configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EvolutionConfig {
    /// How often the scheduler looks for due jobs (in seconds)
    #[serde(with = "serde_duration")]
    pub tick_interval: Duration,

    /// Thresholds shared by all phases
    pub params: EvolutionParams,

    /// Importance decay, archival and purge
    pub decay: JobConfig,

    /// Near-duplicate consolidation
    pub consolidation: JobConfig,

    /// SEMANTIC link maintenance
    pub link_update: JobConfig,

    /// Decay, consolidation and link update in sequence
    pub full_cycle: JobConfig,

    /// Knowledge transfer over `transfer_routes`
    pub transfer: JobConfig,

    pub transfer_routes: Vec<TransferRoute>,
}

/// Thresholds and rates for the evolution phases
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvolutionParams {
    /// Importance subtracted per decay run
    pub decay_rate: f32,

    /// Importance at or below which a memory is archived
    pub archive_threshold: f32,

    /// Importance at or below which an old, unused memory is purged
    pub purge_threshold: f32,

    /// Age after which a memory becomes a purge candidate
    pub max_memory_age_days: u32,

    /// Minimum similarity for two memories to be consolidated
    pub consolidation_threshold: f32,

    /// Minimum similarity for a SEMANTIC link, and for transfer dedup
    pub similarity_threshold: f32,

    /// Peers considered per memory during link update
    pub max_links_per_memory: usize,

    /// Source importance floor for knowledge transfer
    pub transfer_min_importance: f32,

    /// Importance multiplier applied to transferred copies
    pub transfer_importance_factor: f32,

    /// Skip failing consolidation groups instead of aborting the run
    pub isolate_group_failures: bool,
}

impl Default for EvolutionParams {
    fn default() -> Self {
        Self {
            decay_rate: 0.01,
            archive_threshold: 0.1,
            purge_threshold: 0.05,
            max_memory_age_days: 365,
            consolidation_threshold: 0.7,
            similarity_threshold: 0.8,
            max_links_per_memory: 10,
            transfer_min_importance: 0.5,
            transfer_importance_factor: 0.8,
            isolate_group_failures: false,
        }
    }
}

/// Upper bound for `max_memory_age_days` (about 100 years)
pub const MAX_MEMORY_AGE_DAYS: u32 = 36_500;

impl EvolutionParams {
    /// Validate thresholds
    pub fn validate(&self) -> Result<(), ConfigError> {
        let unit = [
            ("decay_rate", self.decay_rate),
            ("archive_threshold", self.archive_threshold),
            ("purge_threshold", self.purge_threshold),
            ("consolidation_threshold", self.consolidation_threshold),
            ("similarity_threshold", self.similarity_threshold),
            ("transfer_min_importance", self.transfer_min_importance),
            ("transfer_importance_factor", self.transfer_importance_factor),
        ];

        for (name, value) in unit {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::ValidationError(format!(
                    "params.{}: must be between 0.0 and 1.0",
                    name
                )));
            }
        }

        if self.decay_rate <= 0.0 {
            return Err(ConfigError::ValidationError(
                "params.decay_rate: must be greater than 0".to_string(),
            ));
        }

        if self.purge_threshold > self.archive_threshold {
            return Err(ConfigError::ValidationError(
                "params.purge_threshold: must not exceed archive_threshold".to_string(),
            ));
        }

        if self.max_links_per_memory == 0 {
            return Err(ConfigError::ValidationError(
                "params.max_links_per_memory: must be at least 1".to_string(),
            ));
        }

        if !(1..=MAX_MEMORY_AGE_DAYS).contains(&self.max_memory_age_days) {
            return Err(ConfigError::ValidationError(format!(
                "params.max_memory_age_days: must be between 1 and {}",
                MAX_MEMORY_AGE_DAYS
            )));
        }

        Ok(())
    }
}

/// Configuration for individual evolution jobs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobConfig {
    /// Enable/disable this specific job
    pub enabled: bool,

    /// Interval between job runs (in seconds)
    #[serde(with = "serde_duration")]
    pub interval: Duration,

    /// Maximum duration for job execution (in seconds)
    #[serde(with = "serde_duration")]
    pub max_duration: Duration,
}

impl JobConfig {
    fn every(hours: u64) -> Self {
        Self {
            enabled: true,
            interval: Duration::from_secs(hours * 3600),
            max_duration: Duration::from_secs(600), // 10 minutes
        }
    }
}

/// Scheduled transfer from one agent to another
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferRoute {
    pub source_agent: String,
    pub target_agent: String,

    #[serde(default = "default_transfer_types")]
    pub memory_types: Vec<MemoryType>,
}

/// Memory types transferred when none are named
pub fn default_transfer_types() -> Vec<MemoryType> {
    vec![MemoryType::Semantic, MemoryType::Procedural]
}

// Custom serde module for Duration (serialize/deserialize as seconds)
mod serde_duration {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

impl Default for EvolutionConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(300), // 5 minutes
            params: EvolutionParams::default(),
            decay: JobConfig::every(6),
            consolidation: JobConfig::every(24),
            link_update: JobConfig::every(4),
            full_cycle: JobConfig {
                max_duration: Duration::from_secs(3600), // 1 hour
                ..JobConfig::every(24 * 7)
            },
            transfer: JobConfig {
                enabled: false,
                ..JobConfig::every(24)
            },
            transfer_routes: Vec::new(),
        }
    }
}

impl EvolutionConfig {
    /// Load configuration from TOML file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    /// Load configuration from TOML string
    pub fn from_toml(toml_str: &str) -> Result<Self, ConfigError> {
        let config: EvolutionConfig = toml::from_str(toml_str)?;
        config.validate()?;
        Ok(config)
    }

    /// Look up a job's configuration by its scheduler name
    pub fn job_config(&self, job_name: &str) -> Option<&JobConfig> {
        match job_name {
            "decay" => Some(&self.decay),
            "consolidation" => Some(&self.consolidation),
            "link_update" => Some(&self.link_update),
            "full_cycle" => Some(&self.full_cycle),
            "transfer" => Some(&self.transfer),
            _ => None,
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.params.validate()?;

        if self.tick_interval < Duration::from_secs(1) {
            return Err(ConfigError::ValidationError(
                "tick_interval must be at least 1 second".to_string(),
            ));
        }

        self.validate_job_config("decay", &self.decay)?;
        self.validate_job_config("consolidation", &self.consolidation)?;
        self.validate_job_config("link_update", &self.link_update)?;
        self.validate_job_config("full_cycle", &self.full_cycle)?;
        self.validate_job_config("transfer", &self.transfer)?;

        for route in &self.transfer_routes {
            if route.source_agent.is_empty() || route.target_agent.is_empty() {
                return Err(ConfigError::ValidationError(
                    "transfer_routes: agent ids must not be empty".to_string(),
                ));
            }
            if route.source_agent == route.target_agent {
                return Err(ConfigError::ValidationError(format!(
                    "transfer_routes: {} cannot transfer to itself",
                    route.source_agent
                )));
            }
            if route.memory_types.contains(&MemoryType::Archived) {
                return Err(ConfigError::ValidationError(
                    "transfer_routes: ARCHIVED memories cannot be transferred".to_string(),
                ));
            }
        }

        Ok(())
    }

    fn validate_job_config(&self, name: &str, config: &JobConfig) -> Result<(), ConfigError> {
        // Interval must be at least 1 minute
        if config.interval < Duration::from_secs(60) {
            return Err(ConfigError::ValidationError(format!(
                "{}: interval must be at least 1 minute",
                name
            )));
        }

        // Max duration must be at least 1 minute and at most 2 hours
        if config.max_duration < Duration::from_secs(60)
            || config.max_duration > Duration::from_secs(7200)
        {
            return Err(ConfigError::ValidationError(format!(
                "{}: max_duration must be between 1 minute and 2 hours",
                name
            )));
        }

        Ok(())
    }

    /// Save configuration to TOML file
    pub fn to_file(&self, path: &Path) -> Result<(), ConfigError> {
        let toml_str = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::ValidationError(e.to_string()))?;
        std::fs::write(path, toml_str)?;
        Ok(())
    }
}
