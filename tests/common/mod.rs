//! Common test utilities and helpers

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{Duration, Utc};
use mnemo_evolve::{
    evolution::{EvolutionEngine, EvolutionParams},
    storage::{InMemoryStore, MemoryStore},
    types::{AgentId, Memory, MemoryType},
    EmbeddingService, MnemoError, Result,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

/// Embedder returning preset vectors per text, and `fallback` otherwise
pub struct StubEmbedder {
    vectors: HashMap<String, Vec<f32>>,
    fallback: Vec<f32>,
    pub calls: AtomicUsize,
}

impl StubEmbedder {
    pub fn new(fallback: Vec<f32>) -> Self {
        Self {
            vectors: HashMap::new(),
            fallback,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with(mut self, text: &str, vector: Vec<f32>) -> Self {
        self.vectors.insert(text.to_string(), vector);
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EmbeddingService for StubEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if text.trim().is_empty() {
            return Err(MnemoError::Embedding("Text cannot be empty".to_string()));
        }
        Ok(self
            .vectors
            .get(text)
            .cloned()
            .unwrap_or_else(|| self.fallback.clone()))
    }

    fn dimensions(&self) -> usize {
        self.fallback.len()
    }

    fn model_name(&self) -> &str {
        "stub"
    }
}

/// Embedder whose provider is always unreachable
pub struct FailingEmbedder;

#[async_trait]
impl EmbeddingService for FailingEmbedder {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        Err(MnemoError::Network("connection refused".to_string()))
    }

    fn dimensions(&self) -> usize {
        2
    }

    fn model_name(&self) -> &str {
        "failing"
    }
}

/// Embedder that blocks inside `embed` until released
pub struct GatedEmbedder {
    pub entered: Notify,
    pub gate: Notify,
}

impl GatedEmbedder {
    pub fn new() -> Self {
        Self {
            entered: Notify::new(),
            gate: Notify::new(),
        }
    }
}

#[async_trait]
impl EmbeddingService for GatedEmbedder {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        self.entered.notify_one();
        self.gate.notified().await;
        Ok(vec![1.0, 0.0])
    }

    fn dimensions(&self) -> usize {
        2
    }

    fn model_name(&self) -> &str {
        "gated"
    }
}

/// Build a memory with an explicit importance and embedding
pub fn memory(agent: &str, content: &str, importance: f32, embedding: Vec<f32>) -> Memory {
    Memory::new(AgentId::from(agent), content, MemoryType::Semantic)
        .with_importance(importance)
        .with_embedding(embedding)
}

/// Backdate a memory's creation and last access
pub fn aged(mut memory: Memory, days: i64) -> Memory {
    let at = Utc::now() - Duration::days(days);
    memory.created_at = at;
    memory.updated_at = at;
    memory.last_accessed = at;
    memory
}

/// Unit vector at `cos` similarity to [1, 0]
pub fn at_similarity(cos: f32) -> Vec<f32> {
    vec![cos, (1.0 - cos * cos).sqrt()]
}

/// Insert memories into a store, returning them as stored
pub async fn seed(store: &dyn MemoryStore, memories: Vec<Memory>) -> Vec<Memory> {
    let mut stored = Vec::with_capacity(memories.len());
    for memory in memories {
        stored.push(store.create(&memory).await.unwrap());
    }
    stored
}

/// Engine over a fresh in-memory store
pub fn in_memory_engine(
    params: EvolutionParams,
    embeddings: Arc<dyn EmbeddingService>,
) -> (Arc<InMemoryStore>, EvolutionEngine) {
    let store = Arc::new(InMemoryStore::new());
    let engine = EvolutionEngine::new(store.clone(), store.clone(), embeddings, params);
    (store, engine)
}

/// Engine with default params and a stub embedder
pub fn default_engine() -> (Arc<InMemoryStore>, EvolutionEngine) {
    in_memory_engine(
        EvolutionParams::default(),
        Arc::new(StubEmbedder::new(vec![1.0, 0.0])),
    )
}
