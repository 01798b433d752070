//! Memory service operations over the in-memory store

mod common;

use common::{FailingEmbedder, StubEmbedder};
use mnemo_evolve::{
    services::{MemoryService, MemoryUpdates, NewMemory},
    storage::{InMemoryStore, LinkFilter, LinkStore, MemoryFilter, MemoryStore},
    types::{AgentId, LinkType, MemoryLink, MemoryType},
    MnemoError,
};
use serde_json::json;
use std::sync::Arc;

fn service_with(embedder: StubEmbedder) -> (Arc<InMemoryStore>, MemoryService) {
    let store = Arc::new(InMemoryStore::new());
    let service = MemoryService::new(store.clone(), store.clone(), Arc::new(embedder));
    (store, service)
}

fn embedder() -> StubEmbedder {
    StubEmbedder::new(vec![0.0, 1.0])
        .with("tokio tasks", vec![1.0, 0.0])
        .with("tokio spawn", vec![0.9, 0.1])
        .with("async runtime", vec![0.95, 0.05])
        .with("sourdough starter", vec![0.0, 1.0])
}

#[tokio::test]
async fn test_create_with_metadata_and_session() {
    let (_store, service) = service_with(embedder());

    let memory = service
        .create_memory(
            NewMemory::new(AgentId::from("a"), "tokio tasks", MemoryType::Procedural)
                .with_session("s-1")
                .with_metadata("origin", json!("chat")),
        )
        .await
        .unwrap();

    assert_eq!(memory.importance, 0.5);
    assert_eq!(memory.session_id.as_deref(), Some("s-1"));
    assert_eq!(memory.embedding, Some(vec![1.0, 0.0]));
    assert_eq!(memory.metadata.get("origin"), Some(&json!("chat")));
}

#[tokio::test]
async fn test_embedder_failure_writes_nothing() {
    let store = Arc::new(InMemoryStore::new());
    let service = MemoryService::new(store.clone(), store.clone(), Arc::new(FailingEmbedder));

    let err = service
        .create_memory(NewMemory::new(AgentId::from("a"), "x", MemoryType::Semantic))
        .await
        .unwrap_err();
    assert!(matches!(err, MnemoError::Network(_)));
    assert_eq!(
        MemoryStore::count(store.as_ref(), &MemoryFilter::new())
            .await
            .unwrap(),
        0
    );
}

#[tokio::test]
async fn test_search_ranks_by_similarity() {
    let (_store, service) = service_with(embedder());
    let agent = AgentId::from("a");

    for content in ["tokio tasks", "tokio spawn", "sourdough starter"] {
        service
            .create_memory(NewMemory::new(agent.clone(), content, MemoryType::Semantic))
            .await
            .unwrap();
    }
    service
        .create_memory(NewMemory::new(
            AgentId::from("b"),
            "tokio tasks",
            MemoryType::Semantic,
        ))
        .await
        .unwrap();

    let hits = service
        .search(&agent, "async runtime", 0.8, 10)
        .await
        .unwrap();
    let contents: Vec<&str> = hits.iter().map(|h| h.memory.content.as_str()).collect();
    assert_eq!(contents, vec!["tokio tasks", "tokio spawn"]);
    assert!(hits[0].similarity >= hits[1].similarity);

    let top = service.search(&agent, "async runtime", 0.8, 1).await.unwrap();
    assert_eq!(top.len(), 1);
}

#[tokio::test]
async fn test_search_skips_archived() {
    let (_store, service) = service_with(embedder());
    let agent = AgentId::from("a");

    let memory = service
        .create_memory(NewMemory::new(agent.clone(), "tokio tasks", MemoryType::Semantic))
        .await
        .unwrap();
    service
        .update_memory(
            memory.id,
            MemoryUpdates {
                memory_type: Some(MemoryType::Archived),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    assert!(service
        .search(&agent, "tokio tasks", 0.5, 10)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_content_change_reembeds_and_drops_semantic_links() {
    let (store, service) = service_with(embedder());
    let agent = AgentId::from("a");

    let first = service
        .create_memory(NewMemory::new(agent.clone(), "tokio tasks", MemoryType::Semantic))
        .await
        .unwrap();
    let second = service
        .create_memory(NewMemory::new(agent.clone(), "tokio spawn", MemoryType::Semantic))
        .await
        .unwrap();

    LinkStore::create(store.as_ref(), &MemoryLink::semantic(first.id, second.id, 0.99))
        .await
        .unwrap();
    LinkStore::create(
        store.as_ref(),
        &MemoryLink::hierarchical(first.id, second.id, 0.99),
    )
    .await
    .unwrap();

    let updated = service
        .update_memory(
            first.id,
            MemoryUpdates {
                content: Some("sourdough starter".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(updated.embedding, Some(vec![0.0, 1.0]));

    let remaining = LinkStore::find_many(store.as_ref(), &LinkFilter::new())
        .await
        .unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].link_type, LinkType::Hierarchical);
}

#[tokio::test]
async fn test_metadata_only_update_keeps_links() {
    let (store, service) = service_with(embedder());
    let agent = AgentId::from("a");

    let first = service
        .create_memory(NewMemory::new(agent.clone(), "tokio tasks", MemoryType::Semantic))
        .await
        .unwrap();
    let second = service
        .create_memory(NewMemory::new(agent, "tokio spawn", MemoryType::Semantic))
        .await
        .unwrap();
    LinkStore::create(store.as_ref(), &MemoryLink::semantic(first.id, second.id, 0.99))
        .await
        .unwrap();

    let mut metadata = serde_json::Map::new();
    metadata.insert("pinned".to_string(), json!(true));
    let updated = service
        .update_memory(
            first.id,
            MemoryUpdates {
                content: Some("tokio tasks".to_string()),
                importance: Some(1.7),
                metadata: Some(metadata),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    assert_eq!(updated.importance, 1.0);
    assert_eq!(updated.metadata.get("pinned"), Some(&json!(true)));
    assert_eq!(
        LinkStore::count(store.as_ref(), &LinkFilter::new())
            .await
            .unwrap(),
        1
    );
}

#[tokio::test]
async fn test_delete_removes_links() {
    let (store, service) = service_with(embedder());
    let agent = AgentId::from("a");

    let first = service
        .create_memory(NewMemory::new(agent.clone(), "tokio tasks", MemoryType::Semantic))
        .await
        .unwrap();
    let second = service
        .create_memory(NewMemory::new(agent, "tokio spawn", MemoryType::Semantic))
        .await
        .unwrap();
    LinkStore::create(store.as_ref(), &MemoryLink::semantic(first.id, second.id, 0.99))
        .await
        .unwrap();

    assert_eq!(service.related(second.id).await.unwrap().len(), 1);

    service.delete_memory(first.id).await.unwrap();
    assert!(service.get_memory(first.id).await.unwrap_err().is_not_found());
    assert!(service.related(second.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_list_hides_archived_unless_asked() {
    let (_store, service) = service_with(embedder());
    let agent = AgentId::from("a");

    let keep = service
        .create_memory(
            NewMemory::new(agent.clone(), "tokio tasks", MemoryType::Semantic).with_importance(0.3),
        )
        .await
        .unwrap();
    let top = service
        .create_memory(
            NewMemory::new(agent.clone(), "tokio spawn", MemoryType::Episodic).with_importance(0.9),
        )
        .await
        .unwrap();
    let gone = service
        .create_memory(NewMemory::new(agent.clone(), "sourdough starter", MemoryType::Semantic))
        .await
        .unwrap();
    service
        .update_memory(
            gone.id,
            MemoryUpdates {
                memory_type: Some(MemoryType::Archived),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let listed = service.list_memories(&agent, None, None).await.unwrap();
    let ids: Vec<_> = listed.iter().map(|m| m.id).collect();
    assert_eq!(ids, vec![top.id, keep.id]);

    let archived = service
        .list_memories(&agent, Some(MemoryType::Archived), None)
        .await
        .unwrap();
    assert_eq!(archived.len(), 1);

    let limited = service.list_memories(&agent, None, Some(1)).await.unwrap();
    assert_eq!(limited[0].id, top.id);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_recalls_all_count() {
    let (_store, service) = service_with(embedder());
    let service = Arc::new(service);
    let memory = service
        .create_memory(NewMemory::new(AgentId::from("a"), "tokio tasks", MemoryType::Semantic))
        .await
        .unwrap();

    let handles: Vec<_> = (0..32)
        .map(|_| {
            let service = service.clone();
            tokio::spawn(async move { service.recall(memory.id).await.unwrap() })
        })
        .collect();
    for handle in handles {
        handle.await.unwrap();
    }

    assert_eq!(
        service.get_memory(memory.id).await.unwrap().access_count,
        32
    );
}
