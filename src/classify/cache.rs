// src/classify/cache.rs
// Bounded, TTL'd classification cache with an explicit lifecycle

use moka::sync::Cache;
use std::time::Duration;

use crate::types::Classification;

/// Classification cache: created with the engine, cleared on demand.
/// Bounded by entry count and per-entry TTL.
pub struct ClassificationCache {
    inner: Cache<String, Classification>,
}

impl ClassificationCache {
    pub fn new(capacity: u64, ttl: Duration) -> Self {
        Self {
            inner: Cache::builder()
                .max_capacity(capacity)
                .time_to_live(ttl)
                .build(),
        }
    }

    pub fn get(&self, text: &str) -> Option<Classification> {
        self.inner.get(text)
    }

    pub fn insert(&self, text: String, classification: Classification) {
        self.inner.insert(text, classification);
    }

    /// Drop all entries.
    pub fn clear(&self) {
        self.inner.invalidate_all();
    }

    /// Approximate number of cached entries.
    pub fn entry_count(&self) -> u64 {
        self.inner.run_pending_tasks();
        self.inner.entry_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Category;

    fn classification() -> Classification {
        Classification {
            category: Category::Fact,
            confidence: 0.8,
            matched: vec![],
        }
    }

    #[test]
    fn test_insert_and_get() {
        let cache = ClassificationCache::new(16, Duration::from_secs(60));
        cache.insert("hello".to_string(), classification());
        assert!(cache.get("hello").is_some());
        assert!(cache.get("other").is_none());
    }

    #[test]
    fn test_clear() {
        let cache = ClassificationCache::new(16, Duration::from_secs(60));
        cache.insert("hello".to_string(), classification());
        cache.clear();
        assert!(cache.get("hello").is_none());
    }
}
