//! Core data types for the mnemo-evolve memory system
//!
//! Memories belong to an agent, optionally to a session, and carry an
//! embedding used for similarity computations. Links form a typed, weighted
//! graph between memories.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::MnemoError;

/// Open key-value metadata attached to a memory
pub type Metadata = Map<String, Value>;

/// Unique identifier for memories
///
/// Wraps a UUID to provide type safety and prevent mixing memory IDs
/// with other UUID-based identifiers in the system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MemoryId(pub Uuid);

impl MemoryId {
    /// Create a new random memory ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse a memory ID from a string
    pub fn from_string(s: &str) -> Result<Self, uuid::Error> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

impl Default for MemoryId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MemoryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for links
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LinkId(pub Uuid);

impl LinkId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_string(s: &str) -> Result<Self, uuid::Error> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

impl Default for LinkId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for LinkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of the agent owning a memory
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AgentId(pub String);

impl AgentId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AgentId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Memory type classification
///
/// `Archived` is a terminal state rather than a content category: archived
/// memories are excluded from similarity, linking and consolidation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MemoryType {
    /// Events and experiences
    Episodic,

    /// Facts and general knowledge
    Semantic,

    /// How-to knowledge and skills
    Procedural,

    /// Short-lived task context
    Working,

    /// Retired by decay or absorbed by consolidation
    Archived,
}

impl MemoryType {
    pub const ALL: [MemoryType; 5] = [
        MemoryType::Episodic,
        MemoryType::Semantic,
        MemoryType::Procedural,
        MemoryType::Working,
        MemoryType::Archived,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MemoryType::Episodic => "EPISODIC",
            MemoryType::Semantic => "SEMANTIC",
            MemoryType::Procedural => "PROCEDURAL",
            MemoryType::Working => "WORKING",
            MemoryType::Archived => "ARCHIVED",
        }
    }
}

impl fmt::Display for MemoryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MemoryType {
    type Err = MnemoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "EPISODIC" => Ok(MemoryType::Episodic),
            "SEMANTIC" => Ok(MemoryType::Semantic),
            "PROCEDURAL" => Ok(MemoryType::Procedural),
            "WORKING" => Ok(MemoryType::Working),
            "ARCHIVED" => Ok(MemoryType::Archived),
            other => Err(MnemoError::Validation(format!(
                "Unknown memory type: {}",
                other
            ))),
        }
    }
}

/// Relationship types between memories
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LinkType {
    /// Embedding similarity above threshold (undirected)
    Semantic,

    /// Close in time
    Temporal,

    /// Source led to target
    Causal,

    /// Shared context
    Contextual,

    /// Consolidation primary to absorbed secondary (directed)
    Hierarchical,
}

impl LinkType {
    pub const ALL: [LinkType; 5] = [
        LinkType::Semantic,
        LinkType::Temporal,
        LinkType::Causal,
        LinkType::Contextual,
        LinkType::Hierarchical,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            LinkType::Semantic => "SEMANTIC",
            LinkType::Temporal => "TEMPORAL",
            LinkType::Causal => "CAUSAL",
            LinkType::Contextual => "CONTEXTUAL",
            LinkType::Hierarchical => "HIERARCHICAL",
        }
    }

    /// Undirected link types are stored with the lower memory id as source
    pub fn is_undirected(&self) -> bool {
        matches!(self, LinkType::Semantic)
    }
}

impl fmt::Display for LinkType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LinkType {
    type Err = MnemoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "SEMANTIC" => Ok(LinkType::Semantic),
            "TEMPORAL" => Ok(LinkType::Temporal),
            "CAUSAL" => Ok(LinkType::Causal),
            "CONTEXTUAL" => Ok(LinkType::Contextual),
            "HIERARCHICAL" => Ok(LinkType::Hierarchical),
            other => Err(MnemoError::Validation(format!(
                "Unknown link type: {}",
                other
            ))),
        }
    }
}

/// Complete memory record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Memory {
    // === Identity ===
    /// Unique identifier
    pub id: MemoryId,

    /// Owning agent
    pub agent_id: AgentId,

    /// Session the memory was recorded in, if any
    pub session_id: Option<String>,

    // === Content ===
    pub content: String,

    #[serde(rename = "type")]
    pub memory_type: MemoryType,

    /// Embedding vector, absent until generated
    pub embedding: Option<Vec<f32>>,

    // === Lifecycle ===
    /// Importance in [0, 1]
    pub importance: f32,

    /// Number of times this memory has been recalled
    pub access_count: u64,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_accessed: DateTime<Utc>,

    pub metadata: Metadata,
}

impl Memory {
    /// Default importance for freshly created memories
    pub const DEFAULT_IMPORTANCE: f32 = 0.5;

    /// Create a memory with default importance and all timestamps set to now
    pub fn new(agent_id: AgentId, content: impl Into<String>, memory_type: MemoryType) -> Self {
        let now = Utc::now();
        Self {
            id: MemoryId::new(),
            agent_id,
            session_id: None,
            content: content.into(),
            memory_type,
            embedding: None,
            importance: Self::DEFAULT_IMPORTANCE,
            access_count: 0,
            created_at: now,
            updated_at: now,
            last_accessed: now,
            metadata: Metadata::new(),
        }
    }

    pub fn with_importance(mut self, importance: f32) -> Self {
        self.importance = clamp_importance(importance);
        self
    }

    pub fn with_embedding(mut self, embedding: Vec<f32>) -> Self {
        self.embedding = Some(embedding);
        self
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    pub fn is_archived(&self) -> bool {
        self.memory_type == MemoryType::Archived
    }

    /// Score used to pick the primary of a consolidation group
    pub fn retention_score(&self) -> f32 {
        self.importance * ((self.access_count as f32) + 1.0).ln()
    }
}

/// Clamp an importance value into [0, 1], mapping NaN to 0
pub fn clamp_importance(value: f32) -> f32 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

/// Typed, weighted relationship between two memories
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryLink {
    pub id: LinkId,
    pub source_id: MemoryId,
    pub target_id: MemoryId,
    pub link_type: LinkType,

    /// Link strength (0.0 - 1.0)
    pub strength: f32,

    /// Similarity between the endpoints at the time of the last update
    pub similarity: f32,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl MemoryLink {
    /// Create a link with the given endpoints exactly as passed
    pub fn new(
        source_id: MemoryId,
        target_id: MemoryId,
        link_type: LinkType,
        strength: f32,
        similarity: f32,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: LinkId::new(),
            source_id,
            target_id,
            link_type,
            strength,
            similarity,
            created_at: now,
            updated_at: now,
        }
    }

    /// Create a SEMANTIC link with canonical endpoint order
    pub fn semantic(a: MemoryId, b: MemoryId, similarity: f32) -> Self {
        let (source, target) = canonical_pair(a, b);
        Self::new(source, target, LinkType::Semantic, similarity, similarity)
    }

    /// Create a HIERARCHICAL link from a consolidation primary to a secondary
    pub fn hierarchical(parent: MemoryId, child: MemoryId, similarity: f32) -> Self {
        Self::new(parent, child, LinkType::Hierarchical, 1.0, similarity)
    }

    /// Whether the link has `id` at either end
    pub fn touches(&self, id: MemoryId) -> bool {
        self.source_id == id || self.target_id == id
    }
}

/// Order an unordered pair so the lower id comes first
pub fn canonical_pair(a: MemoryId, b: MemoryId) -> (MemoryId, MemoryId) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}
