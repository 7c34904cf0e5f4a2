// src/tier.rs
// Tiered memory management: working -> short_term -> long_term
//
// Transitions are forward-only and evaluated lazily — on a maintenance
// sweep or opportunistically at query time — never by a background timer.
// A record that stops being accessed simply ages through tiers; there is
// no demotion path.

use chrono::{DateTime, Utc};
use std::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::TierConfig;
use crate::db::Database;
use crate::error::Result;
use crate::types::Tier;

/// Outcome of one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Records promoted working -> short_term.
    pub promoted_short_term: usize,
    /// Records promoted short_term -> long_term.
    pub promoted_long_term: usize,
    /// Per-record failures that were logged and skipped.
    pub failed: usize,
}

impl SweepReport {
    pub fn is_noop(&self) -> bool {
        self.promoted_short_term == 0 && self.promoted_long_term == 0 && self.failed == 0
    }
}

pub struct TierManager {
    config: TierConfig,
    /// Completion time of the last sweep, for query-time throttling.
    last_sweep: Mutex<Option<DateTime<Utc>>>,
}

impl TierManager {
    pub fn new(config: TierConfig) -> Self {
        Self {
            config,
            last_sweep: Mutex::new(None),
        }
    }

    /// Retrieval weight for a tier. Working records carry the "current
    /// context" boost; long-term records surface on relevance alone.
    pub fn weight(&self, tier: Tier) -> f32 {
        self.config.weight(tier)
    }

    /// Run a sweep only if enough time has passed since the last one.
    /// Called from the query path so hot loops don't hammer the store.
    pub fn maybe_sweep(&self, db: &Database, now: DateTime<Utc>) -> Result<SweepReport> {
        {
            let last = self.last_sweep.lock().expect("last_sweep mutex poisoned");
            if let Some(at) = *last
                && now - at < self.config.min_sweep_interval()
            {
                return Ok(SweepReport::default());
            }
        }
        self.sweep(db, now)
    }

    /// Evaluate all due transitions as of `now`.
    ///
    /// A failure to update one record is logged and skipped; the sweep
    /// always runs to completion over the remaining records.
    pub fn sweep(&self, db: &Database, now: DateTime<Utc>) -> Result<SweepReport> {
        let mut report = SweepReport::default();

        // working -> short_term: age past the working threshold, and the
        // record has not been superseded.
        let cutoff = now - self.config.working_max_age();
        let due = db.records_due_for_promotion(Tier::Working, cutoff, true)?;
        for id in due {
            match db.set_tier(id, Tier::ShortTerm) {
                Ok(()) => report.promoted_short_term += 1,
                Err(e) => {
                    warn!(record = id, error = %e, "Tier promotion failed, continuing sweep");
                    report.failed += 1;
                }
            }
        }

        // short_term -> long_term: age past the short-term threshold.
        let cutoff = now - self.config.short_term_max_age();
        let due = db.records_due_for_promotion(Tier::ShortTerm, cutoff, false)?;
        for id in due {
            match db.set_tier(id, Tier::LongTerm) {
                Ok(()) => report.promoted_long_term += 1,
                Err(e) => {
                    warn!(record = id, error = %e, "Tier promotion failed, continuing sweep");
                    report.failed += 1;
                }
            }
        }

        *self.last_sweep.lock().expect("last_sweep mutex poisoned") = Some(now);

        if report.is_noop() {
            debug!("Tier sweep: nothing due");
        } else {
            info!(
                to_short_term = report.promoted_short_term,
                to_long_term = report.promoted_long_term,
                failed = report.failed,
                "Tier sweep complete"
            );
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::NewRecord;
    use crate::types::Category;
    use chrono::Duration;

    fn db() -> Database {
        let db = Database::open_in_memory().unwrap();
        db.ensure_vec_dimensions(4).unwrap();
        db
    }

    fn insert(db: &Database, content: &str) -> i64 {
        db.insert_record(&NewRecord {
            content: content.to_string(),
            category: Category::Fact,
            confidence: 0.8,
            metadata: serde_json::Map::new(),
            embedding: None,
            now: Utc::now(),
        })
        .unwrap()
    }

    #[test]
    fn test_sweep_noop_when_nothing_due() {
        let db = db();
        insert(&db, "fresh");
        let manager = TierManager::new(TierConfig::default());

        let report = manager.sweep(&db, Utc::now()).unwrap();
        assert!(report.is_noop());
    }

    #[test]
    fn test_sweep_promotes_aged_working_record() {
        let db = db();
        let id = insert(&db, "aging");
        let manager = TierManager::new(TierConfig::default());

        // Two hours from now the 1-hour working threshold has passed
        let later = Utc::now() + Duration::hours(2);
        let report = manager.sweep(&db, later).unwrap();
        assert_eq!(report.promoted_short_term, 1);
        assert_eq!(db.get_record(id).unwrap().unwrap().tier, Tier::ShortTerm);
    }

    #[test]
    fn test_sweep_promotes_through_to_long_term() {
        let db = db();
        let id = insert(&db, "ancient");
        let manager = TierManager::new(TierConfig::default());

        // First sweep moves it to short_term, second (past 7 days) to long_term
        manager.sweep(&db, Utc::now() + Duration::hours(2)).unwrap();
        let report = manager
            .sweep(&db, Utc::now() + Duration::days(8))
            .unwrap();
        assert_eq!(report.promoted_long_term, 1);
        assert_eq!(db.get_record(id).unwrap().unwrap().tier, Tier::LongTerm);
    }

    #[test]
    fn test_superseded_record_not_promoted_from_working() {
        let db = db();
        let old = insert(&db, "old");
        let new = insert(&db, "new");
        db.link_supersession(old, new).unwrap();

        let manager = TierManager::new(TierConfig::default());
        manager.sweep(&db, Utc::now() + Duration::hours(2)).unwrap();

        assert_eq!(db.get_record(old).unwrap().unwrap().tier, Tier::Working);
        assert_eq!(db.get_record(new).unwrap().unwrap().tier, Tier::ShortTerm);
    }

    #[test]
    fn test_tier_sequence_is_monotonic() {
        let db = db();
        let id = insert(&db, "monotonic");
        let manager = TierManager::new(TierConfig::default());

        let mut seen = vec![db.get_record(id).unwrap().unwrap().tier];
        for hours in [2, 26, 24 * 8, 24 * 30] {
            manager
                .sweep(&db, Utc::now() + Duration::hours(hours))
                .unwrap();
            seen.push(db.get_record(id).unwrap().unwrap().tier);
        }
        for pair in seen.windows(2) {
            assert!(pair[0] <= pair[1], "tier regressed: {:?}", seen);
        }
    }

    #[test]
    fn test_maybe_sweep_throttles() {
        let db = db();
        insert(&db, "record");
        let manager = TierManager::new(TierConfig::default());

        let now = Utc::now();
        manager.maybe_sweep(&db, now).unwrap();

        // Within the interval the sweep is skipped even though a record
        // would be due by age
        let report = manager.maybe_sweep(&db, now + Duration::seconds(30)).unwrap();
        assert!(report.is_noop());

        // Past the interval it runs again
        let report = manager.maybe_sweep(&db, now + Duration::hours(2)).unwrap();
        assert_eq!(report.promoted_short_term, 1);
    }

    #[test]
    fn test_working_weight_exceeds_long_term() {
        let manager = TierManager::new(TierConfig::default());
        assert!(manager.weight(Tier::Working) > manager.weight(Tier::LongTerm));
    }
}
