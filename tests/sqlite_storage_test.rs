//! SQLite store behavior, including the evolution phases running on it

mod common;

use common::{aged, at_similarity, memory, seed, StubEmbedder};
use mnemo_evolve::{
    evolution::{EvolutionEngine, EvolutionParams},
    services::{MemoryService, NewMemory},
    storage::{
        LinkFilter, LinkPatch, LinkStore, MemoryFilter, MemoryOrder, MemoryPatch, MemoryStore,
        SqliteStore,
    },
    types::{AgentId, LinkType, Memory, MemoryId, MemoryLink, MemoryType},
    MnemoError,
};
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;

async fn open_store(dimensions: Option<usize>) -> (TempDir, PathBuf, Arc<SqliteStore>) {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("memories.db");
    let store = SqliteStore::open(&path, dimensions).await.unwrap();
    (dir, path, Arc::new(store))
}

#[tokio::test]
async fn test_memory_round_trip() {
    let (_dir, _path, store) = open_store(Some(2)).await;

    let original = memory("agent-a", "Borrowing rules", 0.7, vec![0.25, -1.5])
        .with_session("session-1")
        .with_metadata("source", json!("docs"));
    MemoryStore::create(store.as_ref(), &original).await.unwrap();

    let loaded = store.get(original.id).await.unwrap().unwrap();
    assert_eq!(loaded.agent_id, original.agent_id);
    assert_eq!(loaded.session_id.as_deref(), Some("session-1"));
    assert_eq!(loaded.content, original.content);
    assert_eq!(loaded.memory_type, MemoryType::Semantic);
    assert_eq!(loaded.embedding, Some(vec![0.25, -1.5]));
    assert!((loaded.importance - 0.7).abs() < 1e-6);
    assert_eq!(loaded.metadata.get("source"), Some(&json!("docs")));
    assert_eq!(
        loaded.created_at.timestamp_micros(),
        original.created_at.timestamp_micros()
    );
}

#[tokio::test]
async fn test_reopen_keeps_data() {
    let (_dir, path, store) = open_store(None).await;
    let stored = seed(store.as_ref(), vec![memory("a", "durable", 0.5, vec![1.0, 0.0])]).await;
    drop(store);

    let reopened = SqliteStore::open(&path, None).await.unwrap();
    assert!(reopened.get(stored[0].id).await.unwrap().is_some());
}

#[tokio::test]
async fn test_duplicate_memory_id_rejected() {
    let (_dir, _path, store) = open_store(None).await;
    let m = memory("a", "once", 0.5, vec![1.0, 0.0]);
    MemoryStore::create(store.as_ref(), &m).await.unwrap();

    let err = MemoryStore::create(store.as_ref(), &m).await.unwrap_err();
    assert!(matches!(err, MnemoError::AlreadyExists(_)));
}

#[tokio::test]
async fn test_configured_dimension_enforced() {
    let (_dir, _path, store) = open_store(Some(3)).await;

    let err = MemoryStore::create(store.as_ref(), &memory("a", "short", 0.5, vec![1.0, 0.0]))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        MnemoError::DimensionMismatch {
            expected: 3,
            actual: 2
        }
    ));
    assert_eq!(
        MemoryStore::count(store.as_ref(), &MemoryFilter::new())
            .await
            .unwrap(),
        0
    );
}

#[tokio::test]
async fn test_first_embedding_fixes_dimension() {
    let (_dir, _path, store) = open_store(None).await;
    let stored = seed(store.as_ref(), vec![memory("a", "first", 0.5, vec![1.0, 0.0])]).await;

    let err = MemoryStore::create(
        store.as_ref(),
        &memory("a", "second", 0.5, vec![1.0, 0.0, 0.0]),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, MnemoError::DimensionMismatch { .. }));

    // The only embedded memory may change its own dimension
    MemoryStore::update(
        store.as_ref(),
        stored[0].id,
        MemoryPatch::new().embedding(Some(vec![0.0, 0.0, 1.0])),
    )
    .await
    .unwrap();
}

#[tokio::test]
async fn test_corrupt_embedding_is_reported() {
    let (_dir, path, store) = open_store(None).await;
    let stored = seed(store.as_ref(), vec![memory("a", "x", 0.5, vec![1.0, 0.0])]).await;

    let conn = rusqlite::Connection::open(&path).unwrap();
    conn.execute("UPDATE memories SET embedding_dim = 3", [])
        .unwrap();
    drop(conn);

    let err = store.get(stored[0].id).await.unwrap_err();
    assert!(matches!(err, MnemoError::Database(_)));
}

#[tokio::test]
async fn test_filters_and_order() {
    let (_dir, _path, store) = open_store(None).await;

    let mut archived = memory("a", "old", 0.9, vec![0.0, 1.0]);
    archived.memory_type = MemoryType::Archived;
    let plain = Memory::new(AgentId::from("a"), "unembedded", MemoryType::Working)
        .with_importance(0.8);

    seed(
        store.as_ref(),
        vec![
            memory("a", "low", 0.2, vec![1.0, 0.0]),
            memory("a", "high", 0.6, vec![1.0, 0.0]),
            memory("b", "other agent", 0.7, vec![1.0, 0.0]),
            archived,
            plain,
        ],
    )
    .await;

    let active = MemoryStore::find_many(
        store.as_ref(),
        &MemoryFilter::active_embedded().agent(&AgentId::from("a")),
        MemoryOrder::ImportanceDesc,
        None,
    )
    .await
    .unwrap();
    let contents: Vec<&str> = active.iter().map(|m| m.content.as_str()).collect();
    assert_eq!(contents, vec!["high", "low"]);

    let limited = MemoryStore::find_many(
        store.as_ref(),
        &MemoryFilter::new(),
        MemoryOrder::Insertion,
        Some(2),
    )
    .await
    .unwrap();
    assert_eq!(limited[0].content, "low");
    assert_eq!(limited.len(), 2);

    let embedded = store
        .find_embeddings(&MemoryFilter::new(), MemoryOrder::Insertion)
        .await
        .unwrap();
    assert_eq!(embedded.len(), 4);

    let none = MemoryStore::count(store.as_ref(), &MemoryFilter::new().ids(&[]))
        .await
        .unwrap();
    assert_eq!(none, 0);
}

#[tokio::test]
async fn test_bulk_updates_clamp() {
    let (_dir, _path, store) = open_store(None).await;
    let stored = seed(
        store.as_ref(),
        vec![
            memory("a", "tiny", 0.005, vec![1.0, 0.0]),
            memory("a", "big", 0.5, vec![1.0, 0.0]),
        ],
    )
    .await;

    let adjusted = store
        .bulk_adjust_importance(&MemoryFilter::new().importance_above(0.0), -0.01)
        .await
        .unwrap();
    assert_eq!(adjusted, 2);
    assert_eq!(store.get(stored[0].id).await.unwrap().unwrap().importance, 0.0);

    let archived = store
        .bulk_set_type(
            &MemoryFilter::new().importance_at_most(0.1),
            MemoryType::Archived,
        )
        .await
        .unwrap();
    assert_eq!(archived, 1);
}

#[tokio::test]
async fn test_link_uniqueness_and_touching() {
    let (_dir, _path, store) = open_store(None).await;
    let stored = seed(
        store.as_ref(),
        vec![
            memory("a", "one", 0.5, vec![1.0, 0.0]),
            memory("a", "two", 0.5, vec![1.0, 0.0]),
            memory("a", "three", 0.5, vec![1.0, 0.0]),
        ],
    )
    .await;
    let (one, two, three) = (stored[0].id, stored[1].id, stored[2].id);

    let link = MemoryLink::semantic(one, two, 0.9);
    LinkStore::create(store.as_ref(), &link).await.unwrap();
    let err = LinkStore::create(store.as_ref(), &MemoryLink::semantic(two, one, 0.8))
        .await
        .unwrap_err();
    assert!(matches!(err, MnemoError::AlreadyExists(_)));

    let created = store
        .create_many(
            &[
                MemoryLink::semantic(one, two, 0.9),
                MemoryLink::hierarchical(two, three, 0.8),
            ],
            true,
        )
        .await
        .unwrap();
    assert_eq!(created, 1);

    let updated = LinkStore::update(
        store.as_ref(),
        link.id,
        LinkPatch {
            strength: Some(0.95),
            similarity: Some(0.95),
        },
    )
    .await
    .unwrap();
    assert!((updated.strength - 0.95).abs() < 1e-6);

    assert_eq!(
        LinkStore::count(store.as_ref(), &LinkFilter::new().touching(&[three]))
            .await
            .unwrap(),
        1
    );
    assert_eq!(
        LinkStore::count(
            store.as_ref(),
            &LinkFilter::new().link_type(LinkType::Semantic)
        )
        .await
        .unwrap(),
        1
    );

    let removed = LinkStore::delete_many(store.as_ref(), &LinkFilter::new().touching(&[two]))
        .await
        .unwrap();
    assert_eq!(removed, 2);
}

#[tokio::test]
async fn test_evolution_cycle_on_sqlite() {
    let (_dir, _path, store) = open_store(Some(2)).await;
    let engine = EvolutionEngine::new(
        store.clone(),
        store.clone(),
        Arc::new(StubEmbedder::new(vec![1.0, 0.0])),
        EvolutionParams::default(),
    );

    let stored = seed(
        store.as_ref(),
        vec![
            memory("a", "tokio runtime", 0.9, vec![1.0, 0.0]),
            memory("a", "tokio runtime basics", 0.8, at_similarity(0.95)),
            memory("a", "sqlite pragmas", 0.6, vec![0.0, 1.0]),
            memory("a", "wal journaling", 0.5, vec![-1.0, 0.0]),
            aged(memory("a", "ancient", 0.03, vec![0.6, 0.8]), 400),
        ],
    )
    .await;

    let report = engine.run_evolution_cycle().await.unwrap();
    assert_eq!(report.decayed(), 5);
    assert_eq!(report.deleted(), 1);
    assert_eq!(report.consolidated_groups(), 1);

    let primary = store.get(stored[0].id).await.unwrap().unwrap();
    assert_eq!(primary.content, "tokio runtime\ntokio runtime basics");
    assert_eq!(
        store.get(stored[1].id).await.unwrap().unwrap().memory_type,
        MemoryType::Archived
    );
    assert!(store.get(stored[4].id).await.unwrap().is_none());

    let hierarchical = LinkStore::count(
        store.as_ref(),
        &LinkFilter::between(stored[0].id, stored[1].id, LinkType::Hierarchical),
    )
    .await
    .unwrap();
    assert_eq!(hierarchical, 1);

    // Second link pass only refreshes
    let links = engine.update_memory_links().await.unwrap();
    assert_eq!(links.links_created, 0);
    assert_eq!(links.links_updated, report.links_created());
}

#[tokio::test]
async fn test_decay_purges_large_stale_set() {
    let (_dir, path, store) = open_store(Some(2)).await;
    let engine = EvolutionEngine::new(
        store.clone(),
        store.clone(),
        Arc::new(StubEmbedder::new(vec![1.0, 0.0])),
        EvolutionParams::default(),
    );

    let stored = seed(
        store.as_ref(),
        vec![
            aged(memory("a", "stale", 0.02, vec![1.0, 0.0]), 400),
            memory("a", "fresh", 0.9, vec![0.0, 1.0]),
        ],
    )
    .await;
    let (template, fresh) = (stored[0].id, stored[1].id);

    // Clone the stale row well past SQLite's bound-variable limit
    let mut clones = Vec::new();
    let mut conn = rusqlite::Connection::open(&path).unwrap();
    let tx = conn.transaction().unwrap();
    {
        let mut insert = tx
            .prepare(
                "INSERT INTO memories (id, agent_id, session_id, content, memory_type,
                    embedding, embedding_dim, importance, access_count, created_at,
                    updated_at, last_accessed, metadata)
                 SELECT ?1, agent_id, session_id, content, memory_type, embedding,
                    embedding_dim, importance, access_count, created_at, updated_at,
                    last_accessed, metadata
                 FROM memories WHERE id = ?2",
            )
            .unwrap();
        for _ in 0..19_999 {
            let id = MemoryId::new();
            insert
                .execute([id.to_string(), template.to_string()])
                .unwrap();
            clones.push(id);
        }
    }
    tx.commit().unwrap();
    drop(conn);

    LinkStore::create(store.as_ref(), &MemoryLink::semantic(template, fresh, 0.9))
        .await
        .unwrap();
    LinkStore::create(
        store.as_ref(),
        &MemoryLink::hierarchical(fresh, clones[19_000], 0.8),
    )
    .await
    .unwrap();

    let report = engine.decay_memories().await.unwrap();
    assert_eq!(report.deleted, 20_000);
    assert_eq!(report.links_removed, 2);

    assert_eq!(
        MemoryStore::count(store.as_ref(), &MemoryFilter::new())
            .await
            .unwrap(),
        1
    );
    assert!(store.get(fresh).await.unwrap().is_some());

    // Large id sets also work for reads
    let mut ids = clones.clone();
    ids.push(fresh);
    let found = MemoryStore::find_many(
        store.as_ref(),
        &MemoryFilter::new().ids(&ids),
        MemoryOrder::Insertion,
        None,
    )
    .await
    .unwrap();
    assert_eq!(found.len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_recalls_on_sqlite() {
    let (_dir, _path, store) = open_store(Some(2)).await;
    let service = Arc::new(MemoryService::new(
        store.clone(),
        store.clone(),
        Arc::new(StubEmbedder::new(vec![1.0, 0.0])),
    ));
    let memory = service
        .create_memory(NewMemory::new(AgentId::from("a"), "shared", MemoryType::Semantic))
        .await
        .unwrap();

    let handles: Vec<_> = (0..16)
        .map(|_| {
            let service = service.clone();
            tokio::spawn(async move { service.recall(memory.id).await.unwrap() })
        })
        .collect();
    for handle in handles {
        handle.await.unwrap();
    }

    assert_eq!(store.get(memory.id).await.unwrap().unwrap().access_count, 16);
}
