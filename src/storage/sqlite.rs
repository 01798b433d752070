//! SQLite store built on a deadpool-sqlite connection pool
//!
//! Embeddings are stored as little-endian f32 BLOBs next to an
//! `embedding_dim` column. This adapter is the only place where vectors
//! are serialized; every read validates the blob against its dimension.

use super::filter::{LinkFilter, LinkPatch, MemoryFilter, MemoryOrder, MemoryPatch};
use super::{LinkStore, MemoryStore};
use crate::error::{MnemoError, Result};
use crate::similarity::EmbeddedMemory;
use crate::types::{
    clamp_importance, AgentId, LinkId, LinkType, Memory, MemoryId, MemoryLink, MemoryType,
    Metadata,
};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use deadpool_sqlite::{Config, Pool, Runtime};
use rusqlite::types::Value;
use rusqlite::{
    params_from_iter, Connection, ErrorCode, OptionalExtension, Row, TransactionBehavior,
};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const SCHEMA: &str = "
    PRAGMA journal_mode = WAL;

    CREATE TABLE IF NOT EXISTS memories (
        seq INTEGER PRIMARY KEY AUTOINCREMENT,
        id TEXT NOT NULL UNIQUE,
        agent_id TEXT NOT NULL,
        session_id TEXT,
        content TEXT NOT NULL,
        memory_type TEXT NOT NULL,
        embedding BLOB,
        embedding_dim INTEGER,
        importance REAL NOT NULL,
        access_count INTEGER NOT NULL DEFAULT 0,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL,
        last_accessed TEXT NOT NULL,
        metadata TEXT NOT NULL DEFAULT '{}'
    );

    CREATE INDEX IF NOT EXISTS idx_memories_agent ON memories(agent_id);
    CREATE INDEX IF NOT EXISTS idx_memories_type ON memories(memory_type);
    CREATE INDEX IF NOT EXISTS idx_memories_importance ON memories(importance);

    CREATE TABLE IF NOT EXISTS memory_links (
        seq INTEGER PRIMARY KEY AUTOINCREMENT,
        id TEXT NOT NULL UNIQUE,
        source_id TEXT NOT NULL,
        target_id TEXT NOT NULL,
        link_type TEXT NOT NULL,
        strength REAL NOT NULL,
        similarity REAL NOT NULL,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL,
        UNIQUE (source_id, target_id, link_type)
    );

    CREATE INDEX IF NOT EXISTS idx_links_source ON memory_links(source_id);
    CREATE INDEX IF NOT EXISTS idx_links_target ON memory_links(target_id);
";

const MEMORY_COLUMNS: &str = "id, agent_id, session_id, content, memory_type, embedding, \
     embedding_dim, importance, access_count, created_at, updated_at, last_accessed, metadata";

const LINK_COLUMNS: &str =
    "id, source_id, target_id, link_type, strength, similarity, created_at, updated_at";

/// Memory and link store persisted in a SQLite database file
pub struct SqliteStore {
    pool: Pool,
    dimensions: Option<usize>,
}

impl SqliteStore {
    /// Open (or create) the database at `db_path`
    ///
    /// # Arguments
    /// * `db_path` - Path to the SQLite database file
    /// * `dimensions` - Required embedding length; when `None` the first
    ///   stored embedding fixes the corpus dimension
    pub async fn open<P: AsRef<Path>>(db_path: P, dimensions: Option<usize>) -> Result<Self> {
        let path_str = db_path.as_ref().to_string_lossy().to_string();
        info!("Opening SQLite store at: {}", path_str);

        let config = Config::new(path_str);
        let pool = config.create_pool(Runtime::Tokio1).map_err(|e| {
            MnemoError::Database(format!("Failed to create connection pool: {}", e))
        })?;

        let store = Self { pool, dimensions };
        store
            .interact(|conn| {
                conn.execute_batch(SCHEMA)?;
                Ok(())
            })
            .await?;

        info!("SQLite store ready");
        Ok(store)
    }

    /// Embedding length enforced on write, if configured
    pub fn dimensions(&self) -> Option<usize> {
        self.dimensions
    }

    async fn interact<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.pool.get().await.map_err(|e| {
            MnemoError::Database(format!("Failed to get connection from pool: {}", e))
        })?;

        conn.interact(move |conn| {
            conn.busy_timeout(BUSY_TIMEOUT)?;
            f(conn)
        })
        .await
        .map_err(|e| MnemoError::Database(format!("Pool interaction failed: {}", e)))?
    }
}

fn format_time(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_time(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| MnemoError::Database(format!("Invalid timestamp '{}': {}", raw, e)))
}

fn encode_embedding(embedding: &[f32]) -> Vec<u8> {
    embedding.iter().flat_map(|x| x.to_le_bytes()).collect()
}

fn decode_embedding(id: &str, blob: &[u8], dim: usize) -> Result<Vec<f32>> {
    if blob.len() != dim * 4 {
        return Err(MnemoError::Database(format!(
            "Corrupt embedding for memory {}: {} bytes for {} dimensions",
            id,
            blob.len(),
            dim
        )));
    }

    Ok(blob
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect())
}

fn parse_memory_id(raw: &str) -> Result<MemoryId> {
    MemoryId::from_string(raw)
        .map_err(|e| MnemoError::Database(format!("Invalid memory id '{}': {}", raw, e)))
}

fn read_embedding(row: &Row, id: &str) -> Result<Option<Vec<f32>>> {
    let blob: Option<Vec<u8>> = row.get("embedding")?;
    let dim: Option<i64> = row.get("embedding_dim")?;

    match (blob, dim) {
        (Some(blob), Some(dim)) if dim >= 0 => decode_embedding(id, &blob, dim as usize).map(Some),
        (None, None) => Ok(None),
        _ => Err(MnemoError::Database(format!(
            "Embedding and dimension out of sync for memory {}",
            id
        ))),
    }
}

fn read_memory(row: &Row) -> Result<Memory> {
    let id: String = row.get("id")?;
    let memory_type: String = row.get("memory_type")?;
    let metadata: String = row.get("metadata")?;
    let importance: f64 = row.get("importance")?;
    let access_count: i64 = row.get("access_count")?;

    Ok(Memory {
        id: parse_memory_id(&id)?,
        agent_id: AgentId(row.get("agent_id")?),
        session_id: row.get("session_id")?,
        content: row.get("content")?,
        memory_type: memory_type
            .parse()
            .map_err(|_| MnemoError::Database(format!("Unknown memory type '{}'", memory_type)))?,
        embedding: read_embedding(row, &id)?,
        importance: clamp_importance(importance as f32),
        access_count: access_count.max(0) as u64,
        created_at: parse_time(&row.get::<_, String>("created_at")?)?,
        updated_at: parse_time(&row.get::<_, String>("updated_at")?)?,
        last_accessed: parse_time(&row.get::<_, String>("last_accessed")?)?,
        metadata: serde_json::from_str::<Metadata>(&metadata)?,
    })
}

fn read_link(row: &Row) -> Result<MemoryLink> {
    let id: String = row.get("id")?;
    let source: String = row.get("source_id")?;
    let target: String = row.get("target_id")?;
    let link_type: String = row.get("link_type")?;
    let strength: f64 = row.get("strength")?;
    let similarity: f64 = row.get("similarity")?;

    Ok(MemoryLink {
        id: LinkId::from_string(&id)
            .map_err(|e| MnemoError::Database(format!("Invalid link id '{}': {}", id, e)))?,
        source_id: parse_memory_id(&source)?,
        target_id: parse_memory_id(&target)?,
        link_type: link_type
            .parse::<LinkType>()
            .map_err(|_| MnemoError::Database(format!("Unknown link type '{}'", link_type)))?,
        strength: strength as f32,
        similarity: similarity as f32,
        created_at: parse_time(&row.get::<_, String>("created_at")?)?,
        updated_at: parse_time(&row.get::<_, String>("updated_at")?)?,
    })
}

fn memory_params(memory: &Memory) -> Result<Vec<Value>> {
    let (blob, dim) = match &memory.embedding {
        Some(embedding) => (
            Value::Blob(encode_embedding(embedding)),
            Value::Integer(embedding.len() as i64),
        ),
        None => (Value::Null, Value::Null),
    };

    Ok(vec![
        Value::Text(memory.id.to_string()),
        Value::Text(memory.agent_id.to_string()),
        memory.session_id.clone().map(Value::Text).unwrap_or(Value::Null),
        Value::Text(memory.content.clone()),
        Value::Text(memory.memory_type.as_str().to_string()),
        blob,
        dim,
        Value::Real(clamp_importance(memory.importance) as f64),
        Value::Integer(memory.access_count as i64),
        Value::Text(format_time(&memory.created_at)),
        Value::Text(format_time(&memory.updated_at)),
        Value::Text(format_time(&memory.last_accessed)),
        Value::Text(serde_json::to_string(&memory.metadata)?),
    ])
}

fn link_params(link: &MemoryLink) -> Vec<Value> {
    vec![
        Value::Text(link.id.to_string()),
        Value::Text(link.source_id.to_string()),
        Value::Text(link.target_id.to_string()),
        Value::Text(link.link_type.as_str().to_string()),
        Value::Real(link.strength as f64),
        Value::Real(link.similarity as f64),
        Value::Text(format_time(&link.created_at)),
        Value::Text(format_time(&link.updated_at)),
    ]
}

/// Reject an embedding whose length differs from the corpus dimension
fn check_dimension(
    conn: &Connection,
    configured: Option<usize>,
    embedding: &[f32],
    own_id: &str,
) -> Result<()> {
    let expected = match configured {
        Some(dim) => Some(dim),
        None => conn
            .query_row(
                "SELECT embedding_dim FROM memories
                 WHERE embedding_dim IS NOT NULL AND id != ?1 LIMIT 1",
                [own_id],
                |row| row.get::<_, i64>(0),
            )
            .optional()?
            .map(|dim| dim as usize),
    };

    match expected {
        Some(expected) if expected != embedding.len() => Err(MnemoError::DimensionMismatch {
            expected,
            actual: embedding.len(),
        }),
        _ => Ok(()),
    }
}

fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

/// Bind an id set as one JSON array parameter, read back with `json_each`
///
/// Keeps statements under SQLite's bound-variable limit for any set size.
fn id_list(ids: &[MemoryId]) -> Value {
    let array: Vec<String> = ids.iter().map(|id| id.to_string()).collect();
    Value::Text(serde_json::Value::from(array).to_string())
}

const ID_LIST: &str = "(SELECT value FROM json_each(?))";

fn where_clause(conditions: Vec<String>) -> String {
    if conditions.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", conditions.join(" AND "))
    }
}

/// Translate a memory filter into a WHERE clause and its parameters
fn memory_where(filter: &MemoryFilter) -> (String, Vec<Value>) {
    let mut conditions = Vec::new();
    let mut params = Vec::new();

    if let Some(agent_id) = &filter.agent_id {
        conditions.push("agent_id = ?".to_string());
        params.push(Value::Text(agent_id.to_string()));
    }
    if let Some(types) = &filter.memory_types {
        if types.is_empty() {
            conditions.push("0".to_string());
        } else {
            conditions.push(format!("memory_type IN ({})", placeholders(types.len())));
            params.extend(types.iter().map(|t| Value::Text(t.as_str().to_string())));
        }
    }
    if let Some(excluded) = filter.exclude_type {
        conditions.push("memory_type != ?".to_string());
        params.push(Value::Text(excluded.as_str().to_string()));
    }
    if let Some(present) = filter.has_embedding {
        conditions.push(if present {
            "embedding IS NOT NULL".to_string()
        } else {
            "embedding IS NULL".to_string()
        });
    }
    if let Some(ids) = &filter.ids {
        if ids.is_empty() {
            conditions.push("0".to_string());
        } else {
            conditions.push(format!("id IN {ID_LIST}"));
            params.push(id_list(ids));
        }
    }
    if let Some(ids) = &filter.exclude_ids {
        if !ids.is_empty() {
            conditions.push(format!("id NOT IN {ID_LIST}"));
            params.push(id_list(ids));
        }
    }
    if let Some(at) = &filter.created_before {
        conditions.push("created_at < ?".to_string());
        params.push(Value::Text(format_time(at)));
    }
    if let Some(at) = &filter.last_accessed_before {
        conditions.push("last_accessed < ?".to_string());
        params.push(Value::Text(format_time(at)));
    }
    if let Some(count) = filter.max_access_count {
        conditions.push("access_count <= ?".to_string());
        params.push(Value::Integer(count as i64));
    }
    if let Some(value) = filter.importance_above {
        conditions.push("importance > ?".to_string());
        params.push(Value::Real(value as f64));
    }
    if let Some(value) = filter.importance_at_least {
        conditions.push("importance >= ?".to_string());
        params.push(Value::Real(value as f64));
    }
    if let Some(value) = filter.importance_at_most {
        conditions.push("importance <= ?".to_string());
        params.push(Value::Real(value as f64));
    }

    (where_clause(conditions), params)
}

/// Translate a link filter into a WHERE clause and its parameters
fn link_where(filter: &LinkFilter) -> (String, Vec<Value>) {
    let mut conditions = Vec::new();
    let mut params = Vec::new();

    if let Some(id) = filter.source_id {
        conditions.push("source_id = ?".to_string());
        params.push(Value::Text(id.to_string()));
    }
    if let Some(id) = filter.target_id {
        conditions.push("target_id = ?".to_string());
        params.push(Value::Text(id.to_string()));
    }
    if let Some(link_type) = filter.link_type {
        conditions.push("link_type = ?".to_string());
        params.push(Value::Text(link_type.as_str().to_string()));
    }
    if let Some(ids) = &filter.touching {
        if ids.is_empty() {
            conditions.push("0".to_string());
        } else {
            conditions.push(format!(
                "(source_id IN {ID_LIST} OR target_id IN {ID_LIST})"
            ));
            params.push(id_list(ids));
            params.push(id_list(ids));
        }
    }

    (where_clause(conditions), params)
}

fn order_clause(order: MemoryOrder) -> &'static str {
    match order {
        MemoryOrder::Insertion => " ORDER BY seq ASC",
        MemoryOrder::ImportanceDesc => " ORDER BY importance DESC, seq ASC",
        MemoryOrder::CreatedAtDesc => " ORDER BY created_at DESC, seq ASC",
    }
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.code == ErrorCode::ConstraintViolation
    )
}

fn insert_link(conn: &Connection, link: &MemoryLink, or_ignore: bool) -> Result<usize> {
    let sql = format!(
        "INSERT {} INTO memory_links ({}) VALUES ({})",
        if or_ignore { "OR IGNORE" } else { "" },
        LINK_COLUMNS,
        placeholders(8)
    );

    conn.execute(&sql, params_from_iter(link_params(link)))
        .map_err(|e| {
            if is_unique_violation(&e) {
                MnemoError::AlreadyExists(format!(
                    "{} link {} -> {}",
                    link.link_type, link.source_id, link.target_id
                ))
            } else {
                MnemoError::from(e)
            }
        })
}

fn select_memories(conn: &Connection, sql: &str, params: Vec<Value>) -> Result<Vec<Memory>> {
    let mut stmt = conn.prepare(sql)?;
    let mut rows = stmt.query(params_from_iter(params))?;
    let mut memories = Vec::new();
    while let Some(row) = rows.next()? {
        memories.push(read_memory(row)?);
    }
    Ok(memories)
}

fn select_links(conn: &Connection, sql: &str, params: Vec<Value>) -> Result<Vec<MemoryLink>> {
    let mut stmt = conn.prepare(sql)?;
    let mut rows = stmt.query(params_from_iter(params))?;
    let mut links = Vec::new();
    while let Some(row) = rows.next()? {
        links.push(read_link(row)?);
    }
    Ok(links)
}

#[async_trait]
impl MemoryStore for SqliteStore {
    async fn create(&self, memory: &Memory) -> Result<Memory> {
        debug!("Storing memory: {}", memory.id);

        let mut stored = memory.clone();
        stored.importance = clamp_importance(stored.importance);
        let row = stored.clone();
        let configured = self.dimensions;

        self.interact(move |conn| {
            let id = row.id.to_string();
            if let Some(embedding) = &row.embedding {
                check_dimension(conn, configured, embedding, &id)?;
            }

            let sql = format!(
                "INSERT INTO memories ({}) VALUES ({})",
                MEMORY_COLUMNS,
                placeholders(13)
            );
            conn.execute(&sql, params_from_iter(memory_params(&row)?))
                .map_err(|e| {
                    if is_unique_violation(&e) {
                        MnemoError::AlreadyExists(format!("memory {}", id))
                    } else {
                        MnemoError::from(e)
                    }
                })?;
            Ok(())
        })
        .await?;

        Ok(stored)
    }

    async fn get(&self, id: MemoryId) -> Result<Option<Memory>> {
        self.interact(move |conn| {
            let sql = format!("SELECT {} FROM memories WHERE id = ?", MEMORY_COLUMNS);
            let mut found = select_memories(conn, &sql, vec![Value::Text(id.to_string())])?;
            Ok(found.pop())
        })
        .await
    }

    async fn update(&self, id: MemoryId, patch: MemoryPatch) -> Result<Memory> {
        let configured = self.dimensions;

        self.interact(move |conn| {
            // Write lock up front; concurrent read-modify-write updates serialize
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

            let sql = format!("SELECT {} FROM memories WHERE id = ?", MEMORY_COLUMNS);
            let mut memory = select_memories(&tx, &sql, vec![Value::Text(id.to_string())])?
                .pop()
                .ok_or_else(|| MnemoError::MemoryNotFound(id.to_string()))?;

            patch.apply(&mut memory, Utc::now());
            if let Some(Some(embedding)) = &patch.embedding {
                check_dimension(&tx, configured, embedding, &id.to_string())?;
            }

            let mut params = memory_params(&memory)?;
            // id binds last, in the WHERE clause
            let key = params.remove(0);
            params.push(key);

            tx.execute(
                "UPDATE memories SET agent_id = ?, session_id = ?, content = ?,
                    memory_type = ?, embedding = ?, embedding_dim = ?, importance = ?,
                    access_count = ?, created_at = ?, updated_at = ?, last_accessed = ?,
                    metadata = ?
                 WHERE id = ?",
                params_from_iter(params),
            )?;
            tx.commit()?;

            Ok(memory)
        })
        .await
    }

    async fn bulk_adjust_importance(&self, filter: &MemoryFilter, delta: f32) -> Result<usize> {
        let (clause, where_params) = memory_where(filter);

        self.interact(move |conn| {
            let sql = format!(
                "UPDATE memories
                 SET importance = MIN(1.0, MAX(0.0, importance + ?)), updated_at = ?{}",
                clause
            );
            let mut params = vec![
                Value::Real(delta as f64),
                Value::Text(format_time(&Utc::now())),
            ];
            params.extend(where_params);

            Ok(conn.execute(&sql, params_from_iter(params))?)
        })
        .await
    }

    async fn bulk_set_type(
        &self,
        filter: &MemoryFilter,
        memory_type: MemoryType,
    ) -> Result<usize> {
        let (clause, where_params) = memory_where(filter);

        self.interact(move |conn| {
            let sql = format!(
                "UPDATE memories SET memory_type = ?, updated_at = ?{}",
                clause
            );
            let mut params = vec![
                Value::Text(memory_type.as_str().to_string()),
                Value::Text(format_time(&Utc::now())),
            ];
            params.extend(where_params);

            Ok(conn.execute(&sql, params_from_iter(params))?)
        })
        .await
    }

    async fn delete_many(&self, filter: &MemoryFilter) -> Result<usize> {
        let (clause, params) = memory_where(filter);

        self.interact(move |conn| {
            let sql = format!("DELETE FROM memories{}", clause);
            Ok(conn.execute(&sql, params_from_iter(params))?)
        })
        .await
    }

    async fn find_many(
        &self,
        filter: &MemoryFilter,
        order: MemoryOrder,
        limit: Option<usize>,
    ) -> Result<Vec<Memory>> {
        let (clause, mut params) = memory_where(filter);

        self.interact(move |conn| {
            let mut sql = format!(
                "SELECT {} FROM memories{}{}",
                MEMORY_COLUMNS,
                clause,
                order_clause(order)
            );
            if let Some(limit) = limit {
                sql.push_str(" LIMIT ?");
                params.push(Value::Integer(limit as i64));
            }

            select_memories(conn, &sql, params)
        })
        .await
    }

    async fn find_embeddings(
        &self,
        filter: &MemoryFilter,
        order: MemoryOrder,
    ) -> Result<Vec<EmbeddedMemory>> {
        let (clause, params) = memory_where(filter);

        self.interact(move |conn| {
            let sql = format!(
                "SELECT id, embedding, embedding_dim FROM memories{}{}",
                clause,
                order_clause(order)
            );

            let mut stmt = conn.prepare(&sql)?;
            let mut rows = stmt.query(params_from_iter(params))?;
            let mut corpus = Vec::new();
            while let Some(row) = rows.next()? {
                let id: String = row.get("id")?;
                if let Some(embedding) = read_embedding(row, &id)? {
                    corpus.push(EmbeddedMemory::new(parse_memory_id(&id)?, embedding));
                }
            }
            Ok(corpus)
        })
        .await
    }

    async fn count(&self, filter: &MemoryFilter) -> Result<usize> {
        let (clause, params) = memory_where(filter);

        self.interact(move |conn| {
            let sql = format!("SELECT COUNT(*) FROM memories{}", clause);
            let count: i64 = conn.query_row(&sql, params_from_iter(params), |row| row.get(0))?;
            Ok(count as usize)
        })
        .await
    }
}

#[async_trait]
impl LinkStore for SqliteStore {
    async fn create(&self, link: &MemoryLink) -> Result<MemoryLink> {
        let row = link.clone();
        self.interact(move |conn| insert_link(conn, &row, false))
            .await?;
        Ok(link.clone())
    }

    async fn create_many(&self, links: &[MemoryLink], skip_duplicates: bool) -> Result<usize> {
        let rows = links.to_vec();

        self.interact(move |conn| {
            let tx = conn.transaction()?;
            let mut created = 0;
            for link in &rows {
                created += insert_link(&tx, link, skip_duplicates)?;
            }
            tx.commit()?;
            Ok(created)
        })
        .await
    }

    async fn find_one(&self, filter: &LinkFilter) -> Result<Option<MemoryLink>> {
        let (clause, params) = link_where(filter);

        self.interact(move |conn| {
            let sql = format!(
                "SELECT {} FROM memory_links{} ORDER BY seq ASC LIMIT 1",
                LINK_COLUMNS, clause
            );
            Ok(select_links(conn, &sql, params)?.pop())
        })
        .await
    }

    async fn find_many(&self, filter: &LinkFilter) -> Result<Vec<MemoryLink>> {
        let (clause, params) = link_where(filter);

        self.interact(move |conn| {
            let sql = format!(
                "SELECT {} FROM memory_links{} ORDER BY seq ASC",
                LINK_COLUMNS, clause
            );
            select_links(conn, &sql, params)
        })
        .await
    }

    async fn update(&self, id: LinkId, patch: LinkPatch) -> Result<MemoryLink> {
        self.interact(move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

            let sql = format!("SELECT {} FROM memory_links WHERE id = ?", LINK_COLUMNS);
            let mut link = select_links(&tx, &sql, vec![Value::Text(id.to_string())])?
                .pop()
                .ok_or_else(|| MnemoError::LinkNotFound(id.to_string()))?;

            patch.apply(&mut link, Utc::now());
            tx.execute(
                "UPDATE memory_links SET strength = ?, similarity = ?, updated_at = ?
                 WHERE id = ?",
                params_from_iter(vec![
                    Value::Real(link.strength as f64),
                    Value::Real(link.similarity as f64),
                    Value::Text(format_time(&link.updated_at)),
                    Value::Text(id.to_string()),
                ]),
            )?;
            tx.commit()?;

            Ok(link)
        })
        .await
    }

    async fn delete_many(&self, filter: &LinkFilter) -> Result<usize> {
        let (clause, params) = link_where(filter);

        self.interact(move |conn| {
            let sql = format!("DELETE FROM memory_links{}", clause);
            Ok(conn.execute(&sql, params_from_iter(params))?)
        })
        .await
    }

    async fn count(&self, filter: &LinkFilter) -> Result<usize> {
        let (clause, params) = link_where(filter);

        self.interact(move |conn| {
            let sql = format!("SELECT COUNT(*) FROM memory_links{}", clause);
            let count: i64 = conn.query_row(&sql, params_from_iter(params), |row| row.get(0))?;
            Ok(count as usize)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embedding_blob_layout() {
        let blob = encode_embedding(&[1.0, -2.5]);
        assert_eq!(blob.len(), 8);
        assert_eq!(decode_embedding("m", &blob, 2).unwrap(), vec![1.0, -2.5]);
        assert!(decode_embedding("m", &blob, 3).is_err());
    }

    #[test]
    fn test_timestamps_sort_lexicographically() {
        let earlier = DateTime::parse_from_rfc3339("2024-01-01T09:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let later = DateTime::parse_from_rfc3339("2024-01-01T10:00:00.5Z")
            .unwrap()
            .with_timezone(&Utc);

        assert!(format_time(&earlier) < format_time(&later));
        assert_eq!(parse_time(&format_time(&later)).unwrap(), later);
    }

    #[test]
    fn test_memory_where_translation() {
        let (clause, params) = memory_where(&MemoryFilter::new());
        assert!(clause.is_empty());
        assert!(params.is_empty());

        let filter = MemoryFilter::active_embedded()
            .agent(&AgentId::from("a"))
            .importance_at_most(0.1);
        let (clause, params) = memory_where(&filter);
        assert_eq!(
            clause,
            " WHERE agent_id = ? AND memory_type != ? AND embedding IS NOT NULL AND importance <= ?"
        );
        assert_eq!(params.len(), 3);
    }

    #[test]
    fn test_empty_id_set_matches_nothing() {
        let (clause, _) = memory_where(&MemoryFilter::new().ids(&[]));
        assert_eq!(clause, " WHERE 0");

        let id = MemoryId::new();
        let (clause, params) = link_where(&LinkFilter::new().touching(&[id]));
        assert_eq!(
            clause,
            " WHERE (source_id IN (SELECT value FROM json_each(?)) \
             OR target_id IN (SELECT value FROM json_each(?)))"
        );
        assert_eq!(params.len(), 2);
        assert_eq!(params[0], Value::Text(format!("[\"{}\"]", id)));
    }

    #[test]
    fn test_large_id_set_binds_one_parameter() {
        let ids: Vec<MemoryId> = (0..40_000).map(|_| MemoryId::new()).collect();
        let (_, params) = memory_where(&MemoryFilter::new().ids(&ids).exclude_ids(&ids));
        assert_eq!(params.len(), 2);
    }
}
