// src/classify/mod.rs
// Input classification: deterministic pattern matching with an optional
// LLM-assisted path that can never fail ingestion

mod cache;
mod llm;
mod patterns;

pub use cache::ClassificationCache;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::config::ClassifierConfig;
use crate::llm::LlmBackend;
use crate::types::{Category, Classification, Intent};

/// Confidence reported for the catch-all result when nothing matched.
const FALLBACK_CONFIDENCE: f32 = 0.3;

pub struct Classifier {
    cache: ClassificationCache,
    /// Same per-category weights the retriever uses; here they break ties.
    category_weights: BTreeMap<String, f32>,
    llm: Option<Arc<dyn LlmBackend>>,
    llm_timeout: Duration,
}

impl Classifier {
    pub fn new(
        config: &ClassifierConfig,
        category_weights: BTreeMap<String, f32>,
        llm: Option<Arc<dyn LlmBackend>>,
    ) -> Self {
        Self {
            cache: ClassificationCache::new(
                config.cache_capacity,
                Duration::from_secs(config.cache_ttl_secs),
            ),
            category_weights,
            llm,
            llm_timeout: Duration::from_secs(config.llm_timeout_secs),
        }
    }

    /// Deterministic classification. Identical input always yields the
    /// identical category and confidence; results are cached.
    pub fn classify(&self, text: &str) -> Classification {
        if let Some(hit) = self.cache.get(text) {
            return hit;
        }
        let result = self.classify_uncached(text);
        self.cache.insert(text.to_string(), result.clone());
        result
    }

    /// Classification with the optional LLM path. Falls back to the
    /// deterministic result on any backend failure, timeout, or
    /// unparseable reply.
    pub async fn classify_full(&self, text: &str, use_llm: bool) -> Classification {
        let deterministic = self.classify(text);
        match (&self.llm, use_llm) {
            (Some(backend), true) => {
                llm::classify_with_llm(backend.as_ref(), text, deterministic, self.llm_timeout)
                    .await
            }
            _ => deterministic,
        }
    }

    /// Query-time intent detection. Never used at ingestion time.
    pub fn classify_intent(&self, query: &str) -> Intent {
        let haystack = query.to_lowercase();

        let mut best: Option<(Intent, f32)> = None;
        for (intent, pats) in patterns::INTENT_PATTERNS.iter() {
            let score: f32 = pats
                .iter()
                .filter(|p| p.regex.is_match(&haystack))
                .map(|p| p.weight)
                .sum();
            if score > 0.0 {
                let replace = match best {
                    Some((_, best_score)) => score > best_score,
                    None => true,
                };
                if replace {
                    best = Some((*intent, score));
                }
            }
        }

        let intent = best.map(|(i, _)| i).unwrap_or(Intent::GeneralSearch);
        debug!(query = %query, intent = %intent, "Classified query intent");
        intent
    }

    /// Drop all cached classifications.
    pub fn cache_clear(&self) {
        self.cache.clear();
    }

    /// Approximate cache entry count, for stats.
    pub fn cache_entries(&self) -> u64 {
        self.cache.entry_count()
    }

    fn classify_uncached(&self, text: &str) -> Classification {
        let haystack = text.to_lowercase();

        // Score every category; remember matched pattern names as we go
        let mut scored: Vec<(usize, Category, f32, Vec<String>)> = Vec::new();
        for (index, (category, pats)) in patterns::CATEGORY_PATTERNS.iter().enumerate() {
            let mut score = 0.0f32;
            let mut matched = Vec::new();
            for p in pats {
                if p.regex.is_match(&haystack) {
                    score += p.weight;
                    matched.push(p.name.to_string());
                }
            }
            if score > 0.0 {
                scored.push((index, *category, score, matched));
            }
        }

        if scored.is_empty() {
            // Nothing matched: conversation is the catch-all
            return Classification {
                category: Category::Conversation,
                confidence: FALLBACK_CONFIDENCE,
                matched: Vec::new(),
            };
        }

        // Highest score wins; equal scores prefer the higher configured
        // category weight, then conversation, then declaration order.
        scored.sort_by(|a, b| {
            b.2.partial_cmp(&a.2)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| {
                    self.weight(b.1)
                        .partial_cmp(&self.weight(a.1))
                        .unwrap_or(std::cmp::Ordering::Equal)
                })
                .then_with(|| {
                    (b.1 == Category::Conversation).cmp(&(a.1 == Category::Conversation))
                })
                .then_with(|| a.0.cmp(&b.0))
        });

        let (_, category, score, matched) = scored.into_iter().next().expect("non-empty");
        Classification {
            category,
            // Monotonic in the raw score, saturating toward 1.0
            confidence: (score / (score + 2.0)).clamp(0.0, 1.0),
            matched,
        }
    }

    fn weight(&self, category: Category) -> f32 {
        self.category_weights
            .get(&category.to_string())
            .copied()
            .unwrap_or(1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RetrievalConfig;

    fn classifier() -> Classifier {
        Classifier::new(
            &ClassifierConfig::default(),
            RetrievalConfig::default().category_weights,
            None,
        )
    }

    #[test]
    fn test_classify_task() {
        let c = classifier();
        let result = c.classify("Remember to submit the report by Friday");
        assert_eq!(result.category, Category::Task);
        assert!(result.confidence > 0.5);
        assert!(!result.matched.is_empty());
    }

    #[test]
    fn test_classify_fact_with_location() {
        let c = classifier();
        let result = c.classify("The deploy script is at /opt/deploy.sh");
        assert_eq!(result.category, Category::Fact);
    }

    #[test]
    fn test_classify_fact_copula() {
        let c = classifier();
        assert_eq!(
            c.classify("Python is a programming language").category,
            Category::Fact
        );
        assert_eq!(c.classify("Python is a snake").category, Category::Fact);
    }

    #[test]
    fn test_classify_question() {
        let c = classifier();
        let result = c.classify("Where did we leave the migration plan?");
        assert_eq!(result.category, Category::Question);
    }

    #[test]
    fn test_classify_greeting() {
        let c = classifier();
        assert_eq!(c.classify("hello there").category, Category::Greeting);
    }

    #[test]
    fn test_classify_code() {
        let c = classifier();
        let result = c.classify("fn main() { println!(\"hi\"); }");
        assert_eq!(result.category, Category::Code);
    }

    #[test]
    fn test_classify_error_text() {
        let c = classifier();
        let result = c.classify("Error: connection refused while syncing");
        assert_eq!(result.category, Category::Error);
    }

    #[test]
    fn test_unmatched_falls_back_to_conversation() {
        let c = classifier();
        let result = c.classify("zxqv plumbus grumbo");
        assert_eq!(result.category, Category::Conversation);
        assert_eq!(result.confidence, FALLBACK_CONFIDENCE);
    }

    #[test]
    fn test_classification_is_deterministic() {
        let c = classifier();
        for text in [
            "Remember to submit the report by Friday",
            "The deploy script is at /opt/deploy.sh",
            "hello there",
            "zxqv plumbus grumbo",
        ] {
            let first = c.classify(text);
            let second = c.classify(text);
            assert_eq!(first.category, second.category);
            assert_eq!(first.confidence, second.confidence);
        }
    }

    #[test]
    fn test_cache_roundtrip_and_clear() {
        let c = classifier();
        c.classify("hello there");
        assert!(c.cache_entries() >= 1);
        c.cache_clear();
        assert_eq!(c.cache_entries(), 0);
    }

    #[test]
    fn test_intent_get_tasks() {
        let c = classifier();
        assert_eq!(c.classify_intent("what do I need to do"), Intent::GetTasks);
    }

    #[test]
    fn test_intent_find_procedure() {
        let c = classifier();
        assert_eq!(
            c.classify_intent("how do I restart the indexing service"),
            Intent::FindProcedure
        );
    }

    #[test]
    fn test_intent_retrieve_fact() {
        let c = classifier();
        assert_eq!(
            c.classify_intent("where is the staging database"),
            Intent::RetrieveFact
        );
    }

    #[test]
    fn test_intent_fallback_general() {
        let c = classifier();
        assert_eq!(c.classify_intent("deploy script"), Intent::GeneralSearch);
    }

    #[tokio::test]
    async fn test_classify_full_without_llm_matches_deterministic() {
        let c = classifier();
        let a = c.classify("Remember to submit the report by Friday");
        let b = c
            .classify_full("Remember to submit the report by Friday", true)
            .await;
        // No backend configured: use_llm is a no-op
        assert_eq!(a.category, b.category);
        assert_eq!(a.confidence, b.confidence);
    }
}
