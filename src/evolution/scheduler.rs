// Background Job Scheduler
//
// Registry of named evolution jobs with an explicit start/stop lifecycle.
// Each tick runs the enabled jobs whose interval has elapsed, bounded by
// their max_duration, and keeps a short in-memory run history.

use super::config::{EvolutionConfig, JobConfig};
use crate::error::MnemoError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::{Mutex, Notify};
use tokio::time::{sleep, timeout};

/// Runs kept per scheduler
const MAX_HISTORY: usize = 200;

#[derive(Error, Debug)]
pub enum JobError {
    #[error("Job execution timed out after {0:?}")]
    Timeout(Duration),

    #[error("Job execution failed: {0}")]
    ExecutionError(String),

    #[error("Engine error: {0}")]
    EngineError(MnemoError),

    #[error("Job is already running")]
    AlreadyRunning,

    #[error("Job configuration invalid: {0}")]
    ConfigError(String),
}

impl From<MnemoError> for JobError {
    fn from(err: MnemoError) -> Self {
        match err {
            MnemoError::PhaseInProgress(_) => JobError::AlreadyRunning,
            other => JobError::EngineError(other),
        }
    }
}

#[derive(Error, Debug)]
pub enum SchedulerError {
    #[error("Scheduler is already running")]
    AlreadyRunning,

    #[error("Unknown job: {0}")]
    UnknownJob(String),

    #[error("Job {0} is already registered")]
    DuplicateJob(String),

    #[error("Job error: {0}")]
    JobError(#[from] JobError),
}

/// Report generated after job execution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobReport {
    /// Number of memories processed
    pub memories_processed: usize,

    /// Number of changes made
    pub changes_made: usize,

    /// Duration of job execution
    #[serde(with = "serde_duration_millis")]
    pub duration: Duration,

    /// Number of errors encountered
    pub errors: usize,

    /// Optional error message if job failed
    pub error_message: Option<String>,

    /// Phase report the job produced
    #[serde(default)]
    pub details: serde_json::Value,
}

impl JobReport {
    fn failure(duration: Duration, message: String) -> Self {
        Self {
            memories_processed: 0,
            changes_made: 0,
            duration,
            errors: 1,
            error_message: Some(message),
            details: serde_json::Value::Null,
        }
    }
}

// Custom serde module for Duration (serialize/deserialize as milliseconds)
mod serde_duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

/// Trait for evolution jobs
#[async_trait]
pub trait EvolutionJob: Send + Sync {
    /// Job name (for logging, tracking and config lookup)
    fn name(&self) -> &str;

    /// Run the job with given configuration
    async fn run(&self, config: &JobConfig) -> Result<JobReport, JobError>;

    /// Whether the job has work to do, checked once its interval elapsed
    async fn should_run(&self) -> Result<bool, JobError> {
        Ok(true)
    }
}

/// Job execution record for tracking history
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRun {
    pub id: String,
    pub job_name: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub status: JobStatus,
    pub report: Option<JobReport>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum JobStatus {
    Running,
    Success,
    Failed,
    Timeout,
}

struct ScheduledJob {
    job: Arc<dyn EvolutionJob>,
    config: JobConfig,
    last_run: Mutex<Option<Instant>>,
}

impl ScheduledJob {
    async fn is_due(&self, now: Instant) -> bool {
        match *self.last_run.lock().await {
            Some(last) => now.duration_since(last) >= self.config.interval,
            None => true,
        }
    }
}

/// Background job scheduler
pub struct BackgroundScheduler {
    config: EvolutionConfig,
    jobs: Vec<ScheduledJob>,
    running: Arc<AtomicBool>,
    wake: Notify,
    history: Mutex<VecDeque<JobRun>>,
}

impl BackgroundScheduler {
    /// Create a new scheduler with configuration
    pub fn new(config: EvolutionConfig) -> Self {
        Self {
            config,
            jobs: Vec::new(),
            running: Arc::new(AtomicBool::new(false)),
            wake: Notify::new(),
            history: Mutex::new(VecDeque::new()),
        }
    }

    /// Register a job under the configuration matching its name
    pub fn register_job(&mut self, job: Arc<dyn EvolutionJob>) -> Result<(), SchedulerError> {
        let config = self
            .config
            .job_config(job.name())
            .cloned()
            .ok_or_else(|| SchedulerError::UnknownJob(job.name().to_string()))?;
        self.register_job_with_config(job, config)
    }

    /// Register a job with an explicit configuration
    pub fn register_job_with_config(
        &mut self,
        job: Arc<dyn EvolutionJob>,
        config: JobConfig,
    ) -> Result<(), SchedulerError> {
        if self.jobs.iter().any(|s| s.job.name() == job.name()) {
            return Err(SchedulerError::DuplicateJob(job.name().to_string()));
        }

        tracing::debug!(
            "Registered job {} (enabled: {}, interval: {:?})",
            job.name(),
            config.enabled,
            config.interval
        );

        self.jobs.push(ScheduledJob {
            job,
            config,
            last_run: Mutex::new(None),
        });
        Ok(())
    }

    /// Names of registered jobs, in registration order
    pub fn job_names(&self) -> Vec<&str> {
        self.jobs.iter().map(|s| s.job.name()).collect()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Start the scheduler (runs until stopped)
    pub async fn start(&self) -> Result<(), SchedulerError> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(SchedulerError::AlreadyRunning);
        }

        tracing::info!(
            "Starting background evolution scheduler ({} jobs, tick: {:?})",
            self.jobs.len(),
            self.config.tick_interval
        );

        while self.running.load(Ordering::SeqCst) {
            self.run_due_jobs().await;

            tokio::select! {
                _ = sleep(self.config.tick_interval) => {}
                _ = self.wake.notified() => {}
            }
        }

        tracing::info!("Stopped background evolution scheduler");
        Ok(())
    }

    /// Stop the scheduler
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        self.wake.notify_one();
    }

    /// Run every enabled job whose interval has elapsed
    ///
    /// Returns the runs performed during this pass.
    pub async fn run_due_jobs(&self) -> Vec<JobRun> {
        let mut runs = Vec::new();

        for scheduled in &self.jobs {
            let name = scheduled.job.name();

            if !scheduled.config.enabled {
                tracing::debug!("Job {} is disabled", name);
                continue;
            }

            if !scheduled.is_due(Instant::now()).await {
                tracing::debug!("Job {} not due yet", name);
                continue;
            }

            match scheduled.job.should_run().await {
                Ok(true) => {
                    tracing::info!("Running evolution job: {}", name);
                    runs.push(self.run_scheduled(scheduled).await);
                }
                Ok(false) => {
                    tracing::debug!("Job {} has nothing to do", name);
                    *scheduled.last_run.lock().await = Some(Instant::now());
                }
                Err(e) => {
                    tracing::error!("Failed to check if job {} should run: {}", name, e);
                }
            }
        }

        runs
    }

    /// Run one job immediately, regardless of its interval
    pub async fn run_job_now(&self, job_name: &str) -> Result<JobRun, SchedulerError> {
        let scheduled = self
            .jobs
            .iter()
            .find(|s| s.job.name() == job_name)
            .ok_or_else(|| SchedulerError::UnknownJob(job_name.to_string()))?;

        if !scheduled.config.enabled {
            return Err(SchedulerError::JobError(JobError::ConfigError(format!(
                "Job {} is disabled",
                job_name
            ))));
        }

        Ok(self.run_scheduled(scheduled).await)
    }

    /// Run a specific job with timeout and record the outcome
    async fn run_scheduled(&self, scheduled: &ScheduledJob) -> JobRun {
        let job_name = scheduled.job.name();
        let job_config = &scheduled.config;

        let started_at = Utc::now();
        let clock = Instant::now();
        let job_id = uuid::Uuid::new_v4().to_string();

        tracing::info!("Starting job {} (id: {})", job_name, job_id);

        let result = timeout(job_config.max_duration, scheduled.job.run(job_config)).await;

        let (status, report) = match result {
            Ok(Ok(report)) => {
                tracing::info!(
                    "Job {} completed successfully: {} changes in {:?}",
                    job_name,
                    report.changes_made,
                    report.duration
                );
                (JobStatus::Success, report)
            }
            Ok(Err(JobError::AlreadyRunning)) => {
                tracing::warn!("Job {} skipped: same phase already running", job_name);
                (
                    JobStatus::Failed,
                    JobReport::failure(clock.elapsed(), JobError::AlreadyRunning.to_string()),
                )
            }
            Ok(Err(e)) => {
                tracing::error!("Job {} failed: {}", job_name, e);
                (
                    JobStatus::Failed,
                    JobReport::failure(clock.elapsed(), e.to_string()),
                )
            }
            Err(_) => {
                tracing::error!(
                    "Job {} timed out after {:?}",
                    job_name,
                    job_config.max_duration
                );
                (
                    JobStatus::Timeout,
                    JobReport::failure(
                        job_config.max_duration,
                        JobError::Timeout(job_config.max_duration).to_string(),
                    ),
                )
            }
        };

        *scheduled.last_run.lock().await = Some(Instant::now());

        let job_run = JobRun {
            id: job_id,
            job_name: job_name.to_string(),
            started_at,
            completed_at: Some(Utc::now()),
            status,
            report: Some(report),
        };

        self.record_job_run(&job_run).await;
        job_run
    }

    /// Record job run in the bounded history
    async fn record_job_run(&self, job_run: &JobRun) {
        tracing::debug!(
            "Job run recorded: {} - {:?}",
            job_run.job_name,
            job_run.status
        );

        let mut history = self.history.lock().await;
        if history.len() == MAX_HISTORY {
            history.pop_front();
        }
        history.push_back(job_run.clone());
    }

    /// Get history of job runs, newest first
    pub async fn get_job_history(&self, job_name: Option<&str>, limit: usize) -> Vec<JobRun> {
        let history = self.history.lock().await;
        history
            .iter()
            .rev()
            .filter(|run| job_name.map_or(true, |name| run.job_name == name))
            .take(limit)
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    struct TestJob {
        name: String,
        should_run: bool,
        will_fail: bool,
        delay: Duration,
        runs: AtomicUsize,
    }

    impl TestJob {
        fn new(name: &str) -> Self {
            Self {
                name: name.to_string(),
                should_run: true,
                will_fail: false,
                delay: Duration::ZERO,
                runs: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl EvolutionJob for TestJob {
        fn name(&self) -> &str {
            &self.name
        }

        async fn run(&self, _config: &JobConfig) -> Result<JobReport, JobError> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                sleep(self.delay).await;
            }

            if self.will_fail {
                return Err(JobError::ExecutionError("Test failure".to_string()));
            }

            Ok(JobReport {
                memories_processed: 100,
                changes_made: 10,
                duration: Duration::from_millis(500),
                errors: 0,
                error_message: None,
                details: serde_json::Value::Null,
            })
        }

        async fn should_run(&self) -> Result<bool, JobError> {
            Ok(self.should_run)
        }
    }

    fn job_config(enabled: bool) -> JobConfig {
        JobConfig {
            enabled,
            interval: Duration::from_secs(3600),
            max_duration: Duration::from_secs(60),
        }
    }

    #[test]
    fn test_job_report_serialization() {
        let report = JobReport {
            memories_processed: 100,
            changes_made: 10,
            duration: Duration::from_millis(500),
            errors: 0,
            error_message: None,
            details: serde_json::json!({"decayed": 3}),
        };

        let json = serde_json::to_string(&report).unwrap();
        let deserialized: JobReport = serde_json::from_str(&json).unwrap();

        assert_eq!(report.memories_processed, deserialized.memories_processed);
        assert_eq!(deserialized.duration, Duration::from_millis(500));
        assert_eq!(deserialized.details["decayed"], 3);
    }

    #[test]
    fn test_register_requires_known_name() {
        let mut scheduler = BackgroundScheduler::new(EvolutionConfig::default());

        let result = scheduler.register_job(Arc::new(TestJob::new("mystery")));
        assert!(matches!(result, Err(SchedulerError::UnknownJob(_))));

        scheduler.register_job(Arc::new(TestJob::new("decay"))).unwrap();
        assert!(matches!(
            scheduler.register_job(Arc::new(TestJob::new("decay"))),
            Err(SchedulerError::DuplicateJob(_))
        ));
        assert_eq!(scheduler.job_names(), vec!["decay"]);
    }

    #[tokio::test]
    async fn test_due_jobs_run_once_per_interval() {
        let mut scheduler = BackgroundScheduler::new(EvolutionConfig::default());
        let job = Arc::new(TestJob::new("test_job"));
        scheduler
            .register_job_with_config(job.clone(), job_config(true))
            .unwrap();

        let runs = scheduler.run_due_jobs().await;
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].status, JobStatus::Success);

        // Interval has not elapsed yet
        assert!(scheduler.run_due_jobs().await.is_empty());
        assert_eq!(job.runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_disabled_job_never_runs() {
        let mut scheduler = BackgroundScheduler::new(EvolutionConfig::default());
        let job = Arc::new(TestJob::new("test_job"));
        scheduler
            .register_job_with_config(job.clone(), job_config(false))
            .unwrap();

        assert!(scheduler.run_due_jobs().await.is_empty());
        assert!(scheduler.run_job_now("test_job").await.is_err());
        assert_eq!(job.runs.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_should_run_false_skips() {
        let mut scheduler = BackgroundScheduler::new(EvolutionConfig::default());
        let job = Arc::new(TestJob {
            should_run: false,
            ..TestJob::new("test_job")
        });
        scheduler
            .register_job_with_config(job.clone(), job_config(true))
            .unwrap();

        assert!(scheduler.run_due_jobs().await.is_empty());
        assert_eq!(job.runs.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_failing_job_is_recorded() {
        let mut scheduler = BackgroundScheduler::new(EvolutionConfig::default());
        let job = Arc::new(TestJob {
            will_fail: true,
            ..TestJob::new("test_job")
        });
        scheduler
            .register_job_with_config(job, job_config(true))
            .unwrap();

        let run = scheduler.run_job_now("test_job").await.unwrap();
        assert_eq!(run.status, JobStatus::Failed);

        let report = run.report.unwrap();
        assert_eq!(report.errors, 1);
        assert!(report.error_message.unwrap().contains("Test failure"));

        let history = scheduler.get_job_history(Some("test_job"), 10).await;
        assert_eq!(history.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_job_timeout() {
        let mut scheduler = BackgroundScheduler::new(EvolutionConfig::default());
        let job = Arc::new(TestJob {
            delay: Duration::from_secs(120),
            ..TestJob::new("test_job")
        });
        scheduler
            .register_job_with_config(job, job_config(true))
            .unwrap();

        let run = scheduler.run_job_now("test_job").await.unwrap();
        assert_eq!(run.status, JobStatus::Timeout);
    }

    #[tokio::test]
    async fn test_history_is_newest_first_and_filtered() {
        let mut scheduler = BackgroundScheduler::new(EvolutionConfig::default());
        scheduler
            .register_job_with_config(Arc::new(TestJob::new("test_a")), job_config(true))
            .unwrap();
        scheduler
            .register_job_with_config(Arc::new(TestJob::new("test_b")), job_config(true))
            .unwrap();

        scheduler.run_job_now("test_a").await.unwrap();
        scheduler.run_job_now("test_b").await.unwrap();
        scheduler.run_job_now("test_a").await.unwrap();

        let all = scheduler.get_job_history(None, 10).await;
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].job_name, "test_a");
        assert_eq!(all[1].job_name, "test_b");

        assert_eq!(scheduler.get_job_history(Some("test_b"), 10).await.len(), 1);
        assert_eq!(scheduler.get_job_history(None, 2).await.len(), 2);
    }

    #[tokio::test]
    async fn test_start_twice_and_stop() {
        let mut config = EvolutionConfig::default();
        config.tick_interval = Duration::from_secs(3600);
        let scheduler = Arc::new(BackgroundScheduler::new(config));

        let runner = {
            let scheduler = scheduler.clone();
            tokio::spawn(async move { scheduler.start().await })
        };

        while !scheduler.is_running() {
            tokio::task::yield_now().await;
        }
        assert!(matches!(
            scheduler.start().await,
            Err(SchedulerError::AlreadyRunning)
        ));

        scheduler.stop();
        let result = tokio::time::timeout(Duration::from_secs(5), runner)
            .await
            .unwrap()
            .unwrap();
        assert!(result.is_ok());
        assert!(!scheduler.is_running());
    }
}
