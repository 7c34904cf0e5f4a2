// src/types.rs
// Core domain types shared across the engine

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};

/// Closed set of semantic labels assigned to a record at ingestion.
///
/// The set is deliberately closed: retrieval targeting, conflict detection,
/// and scoring all key off it, so adding a value means touching the pattern
/// table and the intent mapping, not subclassing anything.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Category {
    Question,
    Task,
    Fact,
    Concept,
    Code,
    Procedure,
    Workflow,
    Conversation,
    Greeting,
    Document,
    Image,
    Reference,
    Event,
    Preference,
    Error,
}

impl Category {
    /// Categories whose content asserts something about the world and can
    /// therefore contradict an earlier record (conflict level 2).
    pub fn is_fact_like(&self) -> bool {
        matches!(self, Category::Fact | Category::Procedure)
    }
}

/// Coarse recency/usage bucket governing retrieval weighting.
///
/// Ordering matters: transitions are forward-only (`Working < ShortTerm <
/// LongTerm`) and the tier manager relies on the derived `Ord`.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Tier {
    Working,
    ShortTerm,
    LongTerm,
}

impl Tier {
    /// The next tier in the promotion order, if any.
    pub fn next(&self) -> Option<Tier> {
        match self {
            Tier::Working => Some(Tier::ShortTerm),
            Tier::ShortTerm => Some(Tier::LongTerm),
            Tier::LongTerm => None,
        }
    }
}

/// Query-time intent, used to pick target categories for retrieval.
/// Never assigned at ingestion time.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Intent {
    RetrieveFact,
    FindProcedure,
    SearchConversation,
    LocateCode,
    FindDocument,
    GetTasks,
    GeneralSearch,
}

/// Result of classifying a piece of free text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Classification {
    pub category: Category,
    /// Confidence in [0, 1].
    pub confidence: f32,
    /// Names of the patterns that matched, for inspection/debugging.
    pub matched: Vec<String>,
}

/// The atomic persisted unit. Embeddings are stored separately in the
/// vector table; `has_embedding` tracks whether one exists.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryRecord {
    pub id: i64,
    pub content: String,
    pub category: Category,
    pub tier: Tier,
    /// Classifier confidence at creation time.
    pub confidence: f32,
    pub created_at: DateTime<Utc>,
    pub last_accessed_at: DateTime<Utc>,
    pub access_count: i64,
    /// Id of the record this one replaced, if any.
    pub supersedes: Option<i64>,
    /// Id of the record that replaced this one. A record with this set is
    /// excluded from default retrieval but retained for audit.
    pub superseded_by: Option<i64>,
    pub has_embedding: bool,
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl MemoryRecord {
    /// True when the record should appear in default retrieval.
    pub fn is_live(&self) -> bool {
        self.superseded_by.is_none()
    }
}

/// Outcome of conflict resolution for a candidate record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "target")]
pub enum ConflictDecision {
    /// No neighbor cleared any similarity threshold; insert as new.
    Accept,
    /// Near-duplicate of an existing record; fold into it instead of inserting.
    Merge(i64),
    /// Contradicts an existing fact-like record; insert and mark the old one replaced.
    Supersede(i64),
    /// Ambiguous overlap; insert but tag for later inspection.
    Flag,
}

/// A retrieval result with its fused score and per-list ranks.
#[derive(Debug, Clone)]
pub struct ScoredRecord {
    pub record: MemoryRecord,
    /// Final score after rank fusion and weight adjustments.
    pub score: f32,
    /// 1-based rank in the vector-similarity list, if present there.
    pub vector_rank: Option<usize>,
    /// 1-based rank in the keyword list, if present there.
    pub keyword_rank: Option<usize>,
}

/// One turn of live conversation handed to the context assembler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryTurn {
    pub role: String,
    pub content: String,
}

impl HistoryTurn {
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
        }
    }
}

/// One entry in an assembled context payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum ContextItem {
    /// A live conversation turn (always included up to the reserved minimum).
    History { role: String, content: String },
    /// A retrieved memory record.
    Memory {
        record_id: i64,
        category: Category,
        tier: Tier,
        content: String,
        score: f32,
    },
}

/// Token-bounded prompt payload: structured items for programmatic use plus
/// a single formatted string for direct LLM injection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextPayload {
    pub items: Vec<ContextItem>,
    pub formatted_text: String,
    pub token_estimate: usize,
    /// Set when retrieval ran lexical-only because the embedding backend
    /// was unavailable.
    pub degraded: bool,
}

/// What `ingest` did with an observation.
#[derive(Debug, Clone)]
pub struct IngestOutcome {
    /// The id the content lives under afterwards (the merge target for
    /// `Merge`, the freshly inserted record otherwise).
    pub record_id: i64,
    pub decision: ConflictDecision,
    pub classification: Classification,
}
