// src/search/mod.rs
// Hybrid retrieval: category-targeted vector + keyword search with rank fusion

mod fusion;

pub use fusion::reciprocal_rank_fusion;

use std::sync::Arc;
use tracing::{debug, warn};

use crate::classify::Classifier;
use crate::config::RetrievalConfig;
use crate::db::Database;
use crate::embeddings::EmbeddingClient;
use crate::error::Result;
use crate::tier::TierManager;
use crate::types::{Category, Intent, ScoredRecord};

/// Result of a hybrid search. `degraded` marks that the embedding backend
/// was unavailable and only the lexical pass ran.
pub struct SearchOutcome {
    pub results: Vec<ScoredRecord>,
    pub degraded: bool,
    pub intent: Intent,
}

/// Map a query intent to its target categories. Restricting the search
/// space this way is the primary latency/precision lever; `GeneralSearch`
/// leaves it unrestricted.
pub fn intent_categories(intent: Intent) -> Option<&'static [Category]> {
    match intent {
        Intent::RetrieveFact => Some(&[Category::Fact, Category::Concept]),
        Intent::FindProcedure => Some(&[Category::Procedure, Category::Workflow, Category::Task]),
        Intent::SearchConversation => Some(&[Category::Conversation, Category::Greeting]),
        Intent::LocateCode => Some(&[Category::Code]),
        Intent::FindDocument => Some(&[Category::Document, Category::Reference]),
        Intent::GetTasks => Some(&[Category::Task, Category::Event]),
        Intent::GeneralSearch => None,
    }
}

/// Function words dropped from the keyword pass.
const QUERY_STOPWORDS: &[&str] = &[
    "the", "a", "an", "is", "are", "was", "were", "do", "did", "does", "i", "we", "you", "to",
    "of", "at", "in", "on", "my", "me", "it", "for", "and", "or", "what", "when", "where", "who",
    "how", "why",
];

/// Lowercased, deduplicated content words of a query.
pub fn query_terms(query: &str) -> Vec<String> {
    let mut terms: Vec<String> = Vec::new();
    for raw in query.to_lowercase().split_whitespace() {
        let token: String = raw
            .trim_matches(|c: char| !c.is_ascii_alphanumeric() && c != '/' && c != '.')
            .to_string();
        if token.len() < 2 || QUERY_STOPWORDS.contains(&token.as_str()) {
            continue;
        }
        if !terms.contains(&token) {
            terms.push(token);
        }
    }
    terms
}

pub struct HybridRetriever {
    db: Arc<Database>,
    embeddings: Option<Arc<EmbeddingClient>>,
    classifier: Arc<Classifier>,
    tiers: Arc<TierManager>,
    config: RetrievalConfig,
}

impl HybridRetriever {
    pub fn new(
        db: Arc<Database>,
        embeddings: Option<Arc<EmbeddingClient>>,
        classifier: Arc<Classifier>,
        tiers: Arc<TierManager>,
        config: RetrievalConfig,
    ) -> Self {
        Self {
            db,
            embeddings,
            classifier,
            tiers,
            config,
        }
    }

    /// Hybrid search for `query`, restricted by `category_hint` (or the
    /// classified intent when no hint is given), returning the top `k` by
    /// fused and weighted score.
    ///
    /// When the embedding backend is unavailable the search degrades to
    /// lexical-only rather than failing the query.
    pub async fn search(
        &self,
        query: &str,
        category_hint: Option<Intent>,
        k: usize,
    ) -> Result<SearchOutcome> {
        let intent = category_hint.unwrap_or_else(|| self.classifier.classify_intent(query));
        let categories = intent_categories(intent);
        let pool = self.config.candidate_pool.max(k);

        // Vector pass, tolerating backend unavailability
        let mut degraded = false;
        let vector_list = match &self.embeddings {
            Some(client) => match client.embed(query).await {
                Ok(vector) => self
                    .db
                    .vector_candidates(categories, &vector, pool)?
                    .into_iter()
                    .map(|(record, _distance)| record)
                    .collect(),
                Err(e) => {
                    warn!(error = %e, "Embedding backend unavailable, degrading to lexical search");
                    degraded = true;
                    Vec::new()
                }
            },
            None => {
                degraded = true;
                Vec::new()
            }
        };

        // Independent keyword pass over the same candidate space
        let terms = query_terms(query);
        let keyword_list = self
            .db
            .keyword_candidates(categories, &terms, pool)?
            .into_iter()
            .map(|(record, _score)| record)
            .collect();

        // Fuse, then apply category/tier/confidence weights
        let mut results = reciprocal_rank_fusion(vector_list, keyword_list, self.config.rrf_c);
        for scored in &mut results {
            let category_weight = self.config.category_weight(scored.record.category);
            let tier_weight = self.tiers.weight(scored.record.tier);
            let confidence_weight = 0.9 + 0.2 * scored.record.confidence.clamp(0.0, 1.0);
            scored.score *= category_weight * tier_weight * confidence_weight;
        }

        // Top-k by score, ties broken by more recent access
        results.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| b.record.last_accessed_at.cmp(&a.record.last_accessed_at))
        });
        results.truncate(k);

        debug!(
            query = %query,
            intent = %intent,
            results = results.len(),
            degraded,
            "Hybrid search complete"
        );

        Ok(SearchOutcome {
            results,
            degraded,
            intent,
        })
    }
}
