//! mnemo-evolve - memory evolution engine
//!
//! Command-line entry point: runs individual evolution phases against a
//! SQLite memory store, or keeps the background scheduler running.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use mnemo_evolve::{
    embeddings::{EmbeddingService, HashingEmbeddingService, RemoteEmbeddingService},
    evolution::{engine_jobs, BackgroundScheduler, EvolutionConfig, EvolutionEngine},
    services::{MemoryService, NewMemory},
    storage::SqliteStore,
    types::{AgentId, MemoryType},
};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, Level};
use tracing_subscriber::EnvFilter;

/// Get the default database path using XDG_DATA_HOME standard
fn get_default_db_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("mnemo-evolve")
        .join("memories.db")
}

/// Get the database path from CLI arg, env var, or default
fn get_db_path(cli_path: Option<String>) -> PathBuf {
    cli_path
        .or_else(|| std::env::var("MNEMO_EVOLVE_DB_PATH").ok())
        .map(PathBuf::from)
        .unwrap_or_else(get_default_db_path)
}

/// Load the evolution config from CLI arg, env var, or defaults
fn load_config(cli_path: Option<String>) -> Result<EvolutionConfig> {
    match cli_path.or_else(|| std::env::var("MNEMO_EVOLVE_CONFIG").ok()) {
        Some(path) => {
            debug!("Loading evolution config from {}", path);
            EvolutionConfig::from_file(Path::new(&path))
                .with_context(|| format!("Failed to load config from {}", path))
        }
        None => Ok(EvolutionConfig::default()),
    }
}

fn build_embedder(offline: bool) -> Result<Arc<dyn EmbeddingService>> {
    if offline {
        return Ok(Arc::new(HashingEmbeddingService::default()));
    }

    let api_key = std::env::var("OPENAI_API_KEY")
        .context("OPENAI_API_KEY is not set (use --offline-embeddings to embed locally)")?;
    let dimensions = match std::env::var("MNEMO_EVOLVE_EMBEDDING_DIM") {
        Ok(raw) => Some(
            raw.parse::<usize>()
                .context("MNEMO_EVOLVE_EMBEDDING_DIM must be a positive integer")?,
        ),
        Err(_) => None,
    };

    let service = RemoteEmbeddingService::new(
        api_key,
        std::env::var("MNEMO_EVOLVE_EMBEDDING_MODEL").ok(),
        std::env::var("MNEMO_EVOLVE_EMBEDDING_URL").ok(),
        dimensions,
    )?;
    Ok(Arc::new(service))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[derive(Parser)]
#[command(name = "mnemo-evolve")]
#[command(about = "Decay, consolidate, link and transfer agent memories", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Set log level
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Database path (overrides MNEMO_EVOLVE_DB_PATH env var and default)
    #[arg(long)]
    db_path: Option<String>,

    /// Evolution config file (overrides MNEMO_EVOLVE_CONFIG env var)
    #[arg(long)]
    config: Option<String>,

    /// Embed with the local hashing embedder instead of the remote API
    #[arg(long)]
    offline_embeddings: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the database and optionally write a default config file
    Init {
        /// Where to write the default evolution config
        #[arg(long)]
        write_config: Option<PathBuf>,
    },

    /// Store a new memory
    Add {
        /// Owning agent
        #[arg(long)]
        agent: String,

        /// Memory type
        #[arg(long = "type", default_value = "SEMANTIC")]
        memory_type: MemoryType,

        /// Importance (0.0 - 1.0)
        #[arg(long)]
        importance: Option<f32>,

        /// Memory content
        content: String,
    },

    /// Search an agent's memories by meaning
    Search {
        #[arg(long)]
        agent: String,

        /// Minimum similarity
        #[arg(long, default_value = "0.5")]
        threshold: f32,

        /// Maximum results (0 for no limit)
        #[arg(long, default_value = "10")]
        limit: usize,

        query: String,
    },

    /// Decay importance, archive and purge
    Decay,

    /// Consolidate near-duplicate memories
    Consolidate {
        /// Restrict to one agent
        #[arg(long)]
        agent: Option<String>,
    },

    /// Create or refresh semantic links
    Links,

    /// Copy knowledge from one agent to another
    Transfer {
        #[arg(long)]
        from: String,

        #[arg(long)]
        to: String,

        /// Memory types to transfer (comma-separated)
        #[arg(
            long,
            value_delimiter = ',',
            default_values_t = [MemoryType::Semantic, MemoryType::Procedural]
        )]
        types: Vec<MemoryType>,
    },

    /// Run decay, consolidation and link update in sequence
    Cycle,

    /// Show corpus statistics
    Stats {
        #[arg(long)]
        agent: Option<String>,
    },

    /// Run the background scheduler until interrupted
    Schedule,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let level = match cli.log_level.as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    // Use the requested level for this crate, WARN for noisy dependencies
    let filter = EnvFilter::new(format!(
        "mnemo_evolve={},reqwest=warn,hyper=warn",
        level.as_str().to_lowercase()
    ));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr) // Write logs to stderr, not stdout
        .init();

    debug!("mnemo-evolve v{} starting...", env!("CARGO_PKG_VERSION"));

    let config = load_config(cli.config.clone())?;
    let db_path = get_db_path(cli.db_path.clone());

    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
    }

    let embeddings = build_embedder(cli.offline_embeddings)?;
    let store = Arc::new(SqliteStore::open(&db_path, Some(embeddings.dimensions())).await?);
    let engine = Arc::new(EvolutionEngine::new(
        store.clone(),
        store.clone(),
        embeddings.clone(),
        config.params.clone(),
    ));

    match cli.command {
        Commands::Init { write_config } => {
            info!("Database ready at {}", db_path.display());
            if let Some(path) = write_config {
                config.to_file(&path)?;
                info!("Wrote evolution config to {}", path.display());
            }
            println!("{}", db_path.display());
        }
        Commands::Add {
            agent,
            memory_type,
            importance,
            content,
        } => {
            let service = MemoryService::new(store.clone(), store, embeddings);
            let mut input = NewMemory::new(AgentId::new(agent), content, memory_type);
            if let Some(importance) = importance {
                input = input.with_importance(importance);
            }
            let mut memory = service.create_memory(input).await?;
            memory.embedding = None;
            print_json(&memory)?;
        }
        Commands::Search {
            agent,
            threshold,
            limit,
            query,
        } => {
            let service = MemoryService::new(store.clone(), store, embeddings);
            let mut hits = service
                .search(&AgentId::new(agent), &query, threshold, limit)
                .await?;
            for hit in &mut hits {
                hit.memory.embedding = None;
            }
            print_json(&hits)?;
        }
        Commands::Decay => print_json(&engine.decay_memories().await?)?,
        Commands::Consolidate { agent } => {
            let agent = agent.map(AgentId::new);
            print_json(&engine.consolidate_similar_memories(agent.as_ref()).await?)?;
        }
        Commands::Links => print_json(&engine.update_memory_links().await?)?,
        Commands::Transfer { from, to, types } => {
            let report = engine
                .transfer_knowledge(&AgentId::new(from), &AgentId::new(to), &types)
                .await?;
            print_json(&report)?;
        }
        Commands::Cycle => print_json(&engine.run_evolution_cycle().await?)?,
        Commands::Stats { agent } => {
            let agent = agent.map(AgentId::new);
            print_json(&engine.stats(agent.as_ref()).await?)?;
        }
        Commands::Schedule => run_scheduler(engine, config).await?,
    }

    Ok(())
}

async fn run_scheduler(engine: Arc<EvolutionEngine>, config: EvolutionConfig) -> Result<()> {
    let routes = config.transfer_routes.clone();
    let mut scheduler = BackgroundScheduler::new(config);
    for job in engine_jobs(engine.clone(), routes) {
        scheduler.register_job(job)?;
    }

    let scheduler = Arc::new(scheduler);
    let runner = {
        let scheduler = scheduler.clone();
        tokio::spawn(async move { scheduler.start().await })
    };

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;
    info!("Interrupted, stopping scheduler");

    engine.cancellation_token().cancel();
    scheduler.stop();
    runner.await??;

    Ok(())
}
