// src/engine.rs
// Public entry points: ingest() and query(), wired over the classifier,
// conflict resolver, tier manager, retriever, and assembler

use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::classify::Classifier;
use crate::config::EngineConfig;
use crate::conflict::{ConflictCandidate, ConflictResolver, Neighbor};
use crate::context::ContextAssembler;
use crate::db::{Database, NewRecord, TierCounts};
use crate::embeddings::{EmbeddingClient, OpenAiEmbeddings};
use crate::error::{EngineError, Result};
use crate::llm::{LlmBackend, OpenAiChat};
use crate::search::{HybridRetriever, SearchOutcome, query_terms};
use crate::tier::{SweepReport, TierManager};
use crate::types::{
    Category, ConflictDecision, ContextPayload, HistoryTurn, IngestOutcome, Intent, MemoryRecord,
};

/// Records re-embedded per maintenance pass.
const BACKFILL_BATCH: usize = 64;

/// Engine-level counters for observability.
#[derive(Debug, Clone)]
pub struct EngineStats {
    pub total_records: i64,
    pub tier_counts: TierCounts,
    pub superseded: i64,
    pub pending_embeddings: i64,
    pub classification_cache_entries: u64,
}

/// Outcome of an explicit maintenance pass.
#[derive(Debug, Clone, Copy)]
pub struct MaintenanceReport {
    pub sweep: SweepReport,
    /// Records that received a backfilled embedding.
    pub embedded: usize,
}

/// The memory engine. One instance owns one data directory; ingestion is
/// serialized internally (single-writer), reads run concurrently.
pub struct MemoryEngine {
    config: EngineConfig,
    db: Arc<Database>,
    classifier: Arc<Classifier>,
    tiers: Arc<TierManager>,
    conflicts: ConflictResolver,
    retriever: HybridRetriever,
    assembler: ContextAssembler,
    embeddings: Option<Arc<EmbeddingClient>>,
    /// Serializes classify -> conflict-check -> insert so the neighbor
    /// search stays consistent with the write it guards.
    ingest_lock: tokio::sync::Mutex<()>,
}

impl MemoryEngine {
    /// Build an engine over an already-open database with explicit backends.
    pub fn new(
        config: EngineConfig,
        db: Database,
        embeddings: Option<Arc<EmbeddingClient>>,
        llm: Option<Arc<dyn LlmBackend>>,
    ) -> Result<Self> {
        if let Some(client) = &embeddings {
            db.ensure_vec_dimensions(client.dimensions())?;
            info!(
                provider = client.provider_id(),
                dimensions = client.dimensions(),
                "Embedding backend configured"
            );
        } else {
            warn!("No embedding backend - retrieval will be lexical-only");
        }

        let db = Arc::new(db);
        let classifier = Arc::new(Classifier::new(
            &config.classifier,
            config.retrieval.category_weights.clone(),
            llm,
        ));
        let tiers = Arc::new(TierManager::new(config.tiers.clone()));
        let conflicts = ConflictResolver::new(config.conflict.clone());
        let retriever = HybridRetriever::new(
            db.clone(),
            embeddings.clone(),
            classifier.clone(),
            tiers.clone(),
            config.retrieval.clone(),
        );
        let assembler = ContextAssembler::new(config.context.clone());

        Ok(Self {
            config,
            db,
            classifier,
            tiers,
            conflicts,
            retriever,
            assembler,
            embeddings,
            ingest_lock: tokio::sync::Mutex::new(()),
        })
    }

    /// Open an engine from config: database at the configured path,
    /// backends from the environment.
    pub fn open(config: EngineConfig) -> Result<Self> {
        let db = Database::open(&config.db_path())?;
        let embeddings = OpenAiEmbeddings::from_env()
            .map(|backend| Arc::new(EmbeddingClient::new(Arc::new(backend))));
        let llm: Option<Arc<dyn LlmBackend>> = OpenAiChat::from_env()
            .map(|client| Arc::new(client) as Arc<dyn LlmBackend>);
        Self::new(config, db, embeddings, llm)
    }

    // ===== PRIMARY PUBLIC API =====

    /// Ingest one observation: classify, embed, check for conflicts against
    /// its nearest same-category records, and apply the resulting decision.
    ///
    /// Fails explicitly rather than silently dropping the observation. Not
    /// cancellable once conflict resolution has produced a decision.
    pub async fn ingest(
        &self,
        content: &str,
        metadata: serde_json::Map<String, serde_json::Value>,
    ) -> Result<IngestOutcome> {
        let content = content.trim();
        if content.is_empty() {
            return Err(EngineError::InvalidInput(
                "cannot ingest empty content".to_string(),
            ));
        }

        let _guard = self.ingest_lock.lock().await;
        let now = Utc::now();
        let mut metadata = metadata;
        // Each submission gets its own id for audit; on merge the surviving
        // record keeps the original one.
        metadata
            .entry("observation_id".to_string())
            .or_insert_with(|| serde_json::json!(uuid::Uuid::new_v4().to_string()));

        let classification = self
            .classifier
            .classify_full(content, self.config.classifier.use_llm)
            .await;

        // Embed now if we can; otherwise insert unembedded and let
        // maintenance backfill later.
        let embedding = match &self.embeddings {
            Some(client) => match client.embed(content).await {
                Ok(vector) => Some(vector),
                Err(e) => {
                    warn!(error = %e, "Embedding unavailable at ingest, queuing for backfill");
                    metadata.insert("embedding_pending".to_string(), serde_json::json!(true));
                    None
                }
            },
            None => None,
        };

        let neighbors = self.conflict_neighbors(content, classification.category, &embedding)?;
        let candidate = ConflictCandidate {
            content,
            category: classification.category,
            embedding: embedding.as_deref(),
        };
        let decision = self.conflicts.resolve(&candidate, &neighbors);

        // A decision exists; from here the ingestion runs to completion.
        let record_id = match decision {
            ConflictDecision::Merge(target) => {
                self.db.merge_into(target, &metadata, now)?;
                debug!(target, "Merged duplicate observation");
                target
            }
            ConflictDecision::Supersede(target) => {
                let id = self.insert(content, &classification, metadata, embedding, now)?;
                self.db.link_supersession(target, id)?;
                info!(old = target, new = id, "Superseded contradicted record");
                id
            }
            ConflictDecision::Flag => {
                metadata.insert("conflict_flag".to_string(), serde_json::json!(true));
                let id = self.insert(content, &classification, metadata, embedding, now)?;
                debug!(id, "Flagged ambiguous overlap");
                id
            }
            ConflictDecision::Accept => {
                self.insert(content, &classification, metadata, embedding, now)?
            }
        };

        Ok(IngestOutcome {
            record_id,
            decision,
            classification,
        })
    }

    /// Answer-context retrieval: lazy tier sweep, hybrid search, access
    /// bookkeeping, token-bounded assembly.
    ///
    /// Read-only and abandonable: a caller that drops this future (e.g. a
    /// newer query superseded it) leaves no partial state behind.
    pub async fn query(
        &self,
        question: &str,
        history: &[HistoryTurn],
    ) -> Result<ContextPayload> {
        let question = question.trim();
        if question.is_empty() {
            return Err(EngineError::InvalidInput("empty query".to_string()));
        }

        let now = Utc::now();
        // Sweep and bookkeeping failures degrade a read-only path; they
        // must not fail it.
        if let Err(e) = self.tiers.maybe_sweep(&self.db, now) {
            warn!(error = %e, "Opportunistic tier sweep failed");
        }

        let outcome = self
            .retriever
            .search(question, None, self.config.context.max_items)
            .await?;

        let payload = self.assembler.build_context(
            question,
            history,
            outcome.results,
            self.config.context.max_tokens,
            outcome.degraded,
        );

        let ids = ContextAssembler::included_record_ids(&payload);
        if let Err(e) = self.db.touch_records(&ids, now) {
            warn!(error = %e, "Access bookkeeping failed");
        }

        Ok(payload)
    }

    // ===== SECONDARY API =====

    /// Raw scored search results, without context assembly or bookkeeping.
    pub async fn search(
        &self,
        query: &str,
        category_hint: Option<Intent>,
        k: usize,
    ) -> Result<SearchOutcome> {
        self.retriever.search(query, category_hint, k).await
    }

    /// Explicit reclassification — the only path that changes a record's
    /// category after creation.
    pub fn reclassify(&self, id: i64, category: Category) -> Result<()> {
        self.db.set_category(id, category)
    }

    /// Fetch a record by id.
    pub fn record(&self, id: i64) -> Result<Option<MemoryRecord>> {
        self.db.get_record(id)
    }

    /// Run due tier transitions and embedding backfill.
    pub async fn maintenance(&self) -> Result<MaintenanceReport> {
        let sweep = self.tiers.sweep(&self.db, Utc::now())?;

        let mut embedded = 0;
        if let Some(client) = &self.embeddings {
            let pending = self.db.find_records_without_embeddings(BACKFILL_BATCH)?;
            if !pending.is_empty() {
                let texts: Vec<String> = pending.iter().map(|r| r.content.clone()).collect();
                match client.embed_batch(&texts).await {
                    Ok(vectors) => {
                        for (record, vector) in pending.iter().zip(vectors.iter()) {
                            match self.db.store_record_embedding(record.id, vector) {
                                Ok(()) => embedded += 1,
                                Err(e) => {
                                    warn!(record = record.id, error = %e, "Backfill store failed")
                                }
                            }
                        }
                        info!(embedded, "Embedding backfill complete");
                    }
                    Err(e) => warn!(error = %e, "Embedding backfill skipped, backend unavailable"),
                }
            }
        }

        Ok(MaintenanceReport { sweep, embedded })
    }

    /// Engine counters.
    pub fn stats(&self) -> Result<EngineStats> {
        Ok(EngineStats {
            total_records: self.db.count_records()?,
            tier_counts: self.db.tier_counts()?,
            superseded: self.db.count_superseded()?,
            pending_embeddings: self.db.count_pending_embeddings()?,
            classification_cache_entries: self.classifier.cache_entries(),
        })
    }

    /// Drop all cached classifications.
    pub fn classification_cache_clear(&self) {
        self.classifier.cache_clear();
    }

    /// The underlying store (for inspection and tests).
    pub fn db(&self) -> &Arc<Database> {
        &self.db
    }

    // ===== INTERNAL =====

    /// Top-K most similar live records in the candidate's category: by
    /// vector when an embedding exists, by keyword overlap otherwise.
    fn conflict_neighbors(
        &self,
        content: &str,
        category: Category,
        embedding: &Option<Vec<f32>>,
    ) -> Result<Vec<Neighbor>> {
        let cats = [category];
        let k = self.conflicts.neighbor_k();

        let records: Vec<MemoryRecord> = match embedding {
            Some(vector) => self
                .db
                .vector_candidates(Some(&cats), vector, k)?
                .into_iter()
                .map(|(record, _)| record)
                .collect(),
            None => self
                .db
                .keyword_candidates(Some(&cats), &query_terms(content), k)?
                .into_iter()
                .map(|(record, _)| record)
                .collect(),
        };

        let mut neighbors = Vec::with_capacity(records.len());
        for record in records {
            let embedding = self.db.get_record_embedding(record.id)?;
            neighbors.push(Neighbor { record, embedding });
        }
        Ok(neighbors)
    }

    fn insert(
        &self,
        content: &str,
        classification: &crate::types::Classification,
        metadata: serde_json::Map<String, serde_json::Value>,
        embedding: Option<Vec<f32>>,
        now: chrono::DateTime<Utc>,
    ) -> Result<i64> {
        self.db.insert_record(&NewRecord {
            content: content.to_string(),
            category: classification.category,
            confidence: classification.confidence,
            metadata,
            embedding,
            now,
        })
    }
}
