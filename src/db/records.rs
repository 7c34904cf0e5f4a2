// src/db/records.rs
// Memory record storage and retrieval operations

use chrono::{DateTime, Utc};
use rusqlite::params;
use std::collections::HashMap;
use std::str::FromStr;

use super::{Database, bytes_to_embedding, embedding_to_bytes};
use crate::error::{EngineError, Result};
use crate::types::{Category, MemoryRecord, Tier};

/// Column list matching `parse_record_row`.
pub const RECORD_COLUMNS: &str = "id, content, category, tier, confidence, created_at, \
     last_accessed_at, access_count, supersedes, superseded_by, has_embedding, metadata";

/// Parse a MemoryRecord from a rusqlite Row with the standard column order
/// (see `RECORD_COLUMNS`).
pub fn parse_record_row(row: &rusqlite::Row) -> rusqlite::Result<MemoryRecord> {
    let category_raw: String = row.get(2)?;
    let category = Category::from_str(&category_raw).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(
            2,
            rusqlite::types::Type::Text,
            Box::new(e),
        )
    })?;

    let tier_raw: String = row.get(3)?;
    let tier = Tier::from_str(&tier_raw).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(3, rusqlite::types::Type::Text, Box::new(e))
    })?;

    let metadata_raw: String = row.get(11)?;
    let metadata = serde_json::from_str(&metadata_raw).unwrap_or_default();

    Ok(MemoryRecord {
        id: row.get(0)?,
        content: row.get(1)?,
        category,
        tier,
        confidence: row.get(4)?,
        created_at: row.get(5)?,
        last_accessed_at: row.get(6)?,
        access_count: row.get(7)?,
        supersedes: row.get(8)?,
        superseded_by: row.get(9)?,
        has_embedding: row.get::<_, i64>(10)? != 0,
        metadata,
    })
}

/// A record about to be inserted.
pub struct NewRecord {
    pub content: String,
    pub category: Category,
    pub confidence: f32,
    pub metadata: serde_json::Map<String, serde_json::Value>,
    pub embedding: Option<Vec<f32>>,
    pub now: DateTime<Utc>,
}

/// Live record counts per tier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TierCounts {
    pub working: i64,
    pub short_term: i64,
    pub long_term: i64,
}

impl Database {
    /// Insert a record, atomically with its embedding when one is supplied.
    ///
    /// Either the record row and its vector row both land, or neither does —
    /// a storage failure never leaves a half-written record behind.
    pub fn insert_record(&self, new: &NewRecord) -> Result<i64> {
        if let Some(ref embedding) = new.embedding {
            self.check_embedding_dims(embedding)?;
        }

        let conn = self.conn();
        let tx = conn.unchecked_transaction()?;

        let metadata_json = serde_json::to_string(&new.metadata)?;
        tx.execute(
            "INSERT INTO memory_records
                 (content, category, tier, confidence, created_at, last_accessed_at,
                  access_count, has_embedding, metadata)
             VALUES (?, ?, ?, ?, ?, ?, 0, ?, ?)",
            params![
                new.content,
                new.category.to_string(),
                Tier::Working.to_string(),
                new.confidence,
                new.now,
                new.now,
                new.embedding.is_some() as i64,
                metadata_json,
            ],
        )?;
        let id = tx.last_insert_rowid();

        if let Some(ref embedding) = new.embedding {
            tx.execute(
                "INSERT INTO vec_records (rowid, embedding, record_id) VALUES (?, ?, ?)",
                params![id, embedding_to_bytes(embedding), id],
            )?;
        }

        tx.commit()?;
        Ok(id)
    }

    /// Fetch a single record by id.
    pub fn get_record(&self, id: i64) -> Result<Option<MemoryRecord>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {RECORD_COLUMNS} FROM memory_records WHERE id = ?"
        ))?;
        let record = stmt.query_row([id], parse_record_row);
        match record {
            Ok(r) => Ok(Some(r)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Fetch the stored embedding for a record, if one exists.
    pub fn get_record_embedding(&self, id: i64) -> Result<Option<Vec<f32>>> {
        let conn = self.conn();
        let result: rusqlite::Result<Vec<u8>> = conn.query_row(
            "SELECT embedding FROM vec_records WHERE record_id = ?",
            [id],
            |row| row.get(0),
        );
        match result {
            Ok(bytes) => Ok(Some(bytes_to_embedding(&bytes))),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Access bookkeeping: bump access_count and last_accessed_at.
    pub fn touch_records(&self, ids: &[i64], now: DateTime<Utc>) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "UPDATE memory_records
             SET access_count = access_count + 1, last_accessed_at = ?
             WHERE id = ?",
        )?;
        for id in ids {
            stmt.execute(params![now, id])?;
        }
        Ok(())
    }

    /// Fold a near-duplicate candidate into an existing record: bump the
    /// access counter and extend metadata with the candidate's new keys.
    /// Existing keys win — the surviving record keeps its identity.
    pub fn merge_into(
        &self,
        target: i64,
        extra_metadata: &serde_json::Map<String, serde_json::Value>,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let existing = self
            .get_record(target)?
            .ok_or_else(|| EngineError::InvalidInput(format!("no record {target} to merge into")))?;

        let mut metadata = existing.metadata;
        for (key, value) in extra_metadata {
            metadata.entry(key.clone()).or_insert_with(|| value.clone());
        }

        let conn = self.conn();
        conn.execute(
            "UPDATE memory_records
             SET access_count = access_count + 1, last_accessed_at = ?, metadata = ?
             WHERE id = ?",
            params![now, serde_json::to_string(&metadata)?, target],
        )?;
        Ok(())
    }

    /// Move a record to a new tier. Transitions are owned by the tier
    /// manager; nothing else calls this.
    pub fn set_tier(&self, id: i64, tier: Tier) -> Result<()> {
        let conn = self.conn();
        let updated = conn.execute(
            "UPDATE memory_records SET tier = ? WHERE id = ?",
            params![tier.to_string(), id],
        )?;
        if updated == 0 {
            return Err(EngineError::InvalidInput(format!("no record {id}")));
        }
        Ok(())
    }

    /// Explicit reclassification — the only path that changes a category
    /// after creation.
    pub fn set_category(&self, id: i64, category: Category) -> Result<()> {
        let conn = self.conn();
        let updated = conn.execute(
            "UPDATE memory_records SET category = ? WHERE id = ?",
            params![category.to_string(), id],
        )?;
        if updated == 0 {
            return Err(EngineError::InvalidInput(format!("no record {id}")));
        }
        Ok(())
    }

    /// Mark `old_id` as replaced by `new_id`.
    ///
    /// Rejects self-links, unknown ids, double supersession, and any edge
    /// that would close a supersession cycle — the offending records are
    /// left untouched.
    pub fn link_supersession(&self, old_id: i64, new_id: i64) -> Result<()> {
        if old_id == new_id {
            return Err(EngineError::InvariantViolation(format!(
                "record {old_id} cannot supersede itself"
            )));
        }

        let old = self.get_record(old_id)?.ok_or_else(|| {
            EngineError::InvalidInput(format!("supersession target {old_id} does not exist"))
        })?;
        self.get_record(new_id)?.ok_or_else(|| {
            EngineError::InvalidInput(format!("superseding record {new_id} does not exist"))
        })?;

        if old.superseded_by.is_some() {
            return Err(EngineError::InvariantViolation(format!(
                "record {old_id} is already superseded"
            )));
        }

        // Walk the chain from the new record; reaching old_id means the new
        // edge would close a loop.
        let mut cursor = new_id;
        let mut hops = 0usize;
        while let Some(next) = self
            .get_record(cursor)?
            .and_then(|r| r.superseded_by)
        {
            if next == old_id {
                return Err(EngineError::InvariantViolation(format!(
                    "supersession of {old_id} by {new_id} would create a cycle"
                )));
            }
            cursor = next;
            hops += 1;
            if hops > 10_000 {
                return Err(EngineError::InvariantViolation(
                    "supersession chain too long".to_string(),
                ));
            }
        }

        let conn = self.conn();
        let tx = conn.unchecked_transaction()?;
        tx.execute(
            "UPDATE memory_records SET superseded_by = ? WHERE id = ?",
            params![new_id, old_id],
        )?;
        tx.execute(
            "UPDATE memory_records SET supersedes = ? WHERE id = ?",
            params![old_id, new_id],
        )?;
        tx.commit()?;
        Ok(())
    }

    /// Ids of records in `from` tier created at or before `cutoff`.
    /// `require_live` additionally skips superseded records.
    pub fn records_due_for_promotion(
        &self,
        from: Tier,
        cutoff: DateTime<Utc>,
        require_live: bool,
    ) -> Result<Vec<i64>> {
        let conn = self.conn();
        let sql = if require_live {
            "SELECT id FROM memory_records
             WHERE tier = ? AND superseded_by IS NULL AND datetime(created_at) <= datetime(?)
             ORDER BY id"
        } else {
            "SELECT id FROM memory_records
             WHERE tier = ? AND datetime(created_at) <= datetime(?)
             ORDER BY id"
        };
        let mut stmt = conn.prepare(sql)?;
        let ids = stmt
            .query_map(params![from.to_string(), cutoff], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<i64>>>()?;
        Ok(ids)
    }

    /// Vector-similarity candidates, optionally restricted to categories.
    /// Superseded records never appear. Returns (record, cosine distance),
    /// closest first.
    pub fn vector_candidates(
        &self,
        categories: Option<&[Category]>,
        embedding: &[f32],
        limit: usize,
    ) -> Result<Vec<(MemoryRecord, f32)>> {
        self.check_embedding_dims(embedding)?;
        let conn = self.conn();

        let mut sql = "SELECT r.id, r.content, r.category, r.tier, r.confidence, r.created_at, \
                    r.last_accessed_at, r.access_count, r.supersedes, r.superseded_by, \
                    r.has_embedding, r.metadata, \
                    vec_distance_cosine(v.embedding, ?) AS distance
             FROM memory_records r JOIN vec_records v ON r.id = v.record_id
             WHERE r.superseded_by IS NULL"
            .to_string();
        let mut sql_params: Vec<Box<dyn rusqlite::ToSql>> =
            vec![Box::new(embedding_to_bytes(embedding))];

        if let Some(cats) = categories
            && !cats.is_empty()
        {
            let placeholders = vec!["?"; cats.len()].join(", ");
            sql.push_str(&format!(" AND r.category IN ({placeholders})"));
            for cat in cats {
                sql_params.push(Box::new(cat.to_string()));
            }
        }

        sql.push_str(" ORDER BY distance LIMIT ?");
        sql_params.push(Box::new(limit as i64));

        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(rusqlite::params_from_iter(sql_params), |row| {
            let record = parse_record_row(row)?;
            let distance: f32 = row.get(12)?;
            Ok((record, distance))
        })?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Into::into)
    }

    /// Keyword candidates: records matching any of the given lowercase terms,
    /// scored by the fraction of terms matched, recency as tiebreak.
    /// Superseded records never appear.
    pub fn keyword_candidates(
        &self,
        categories: Option<&[Category]>,
        terms: &[String],
        limit: usize,
    ) -> Result<Vec<(MemoryRecord, f32)>> {
        if terms.is_empty() {
            return Ok(Vec::new());
        }

        let mut matches: HashMap<i64, usize> = HashMap::new();
        {
            let conn = self.conn();
            for term in terms {
                // Escape SQL LIKE wildcards to prevent pattern injection
                let escaped = term
                    .replace('\\', "\\\\")
                    .replace('%', "\\%")
                    .replace('_', "\\_");
                let pattern = format!("%{escaped}%");

                let mut sql = "SELECT id FROM memory_records
                     WHERE superseded_by IS NULL AND LOWER(content) LIKE ? ESCAPE '\\'"
                    .to_string();
                let mut sql_params: Vec<Box<dyn rusqlite::ToSql>> = vec![Box::new(pattern)];

                if let Some(cats) = categories
                    && !cats.is_empty()
                {
                    let placeholders = vec!["?"; cats.len()].join(", ");
                    sql.push_str(&format!(" AND category IN ({placeholders})"));
                    for cat in cats {
                        sql_params.push(Box::new(cat.to_string()));
                    }
                }

                let mut stmt = conn.prepare(&sql)?;
                let ids = stmt
                    .query_map(rusqlite::params_from_iter(sql_params), |row| row.get(0))?
                    .collect::<rusqlite::Result<Vec<i64>>>()?;
                for id in ids {
                    *matches.entry(id).or_insert(0) += 1;
                }
            }
        }

        let mut scored: Vec<(MemoryRecord, f32)> = Vec::with_capacity(matches.len());
        for (id, count) in matches {
            if let Some(record) = self.get_record(id)? {
                scored.push((record, count as f32 / terms.len() as f32));
            }
        }

        scored.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| b.0.last_accessed_at.cmp(&a.0.last_accessed_at))
        });
        scored.truncate(limit);
        Ok(scored)
    }

    /// Find records that lack embeddings (for backfill processing)
    pub fn find_records_without_embeddings(&self, limit: usize) -> Result<Vec<MemoryRecord>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {RECORD_COLUMNS} FROM memory_records
             WHERE has_embedding = 0
             ORDER BY datetime(created_at) ASC
             LIMIT ?"
        ))?;
        let rows = stmt.query_map([limit as i64], parse_record_row)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Into::into)
    }

    /// Store an embedding for an existing record and mark it embedded.
    pub fn store_record_embedding(&self, id: i64, embedding: &[f32]) -> Result<()> {
        self.check_embedding_dims(embedding)?;

        let conn = self.conn();
        let tx = conn.unchecked_transaction()?;
        tx.execute(
            "INSERT OR REPLACE INTO vec_records (rowid, embedding, record_id) VALUES (?, ?, ?)",
            params![id, embedding_to_bytes(embedding), id],
        )?;
        tx.execute(
            "UPDATE memory_records SET has_embedding = 1 WHERE id = ?",
            [id],
        )?;
        tx.commit()?;
        Ok(())
    }

    /// Live record counts per tier.
    pub fn tier_counts(&self) -> Result<TierCounts> {
        let conn = self.conn();
        let mut counts = TierCounts::default();
        let mut stmt = conn.prepare(
            "SELECT tier, COUNT(*) FROM memory_records
             WHERE superseded_by IS NULL GROUP BY tier",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;
        for row in rows {
            let (tier, count) = row?;
            match Tier::from_str(&tier) {
                Ok(Tier::Working) => counts.working = count,
                Ok(Tier::ShortTerm) => counts.short_term = count,
                Ok(Tier::LongTerm) => counts.long_term = count,
                Err(_) => {}
            }
        }
        Ok(counts)
    }

    /// Total number of records, superseded included.
    pub fn count_records(&self) -> Result<i64> {
        let conn = self.conn();
        let count =
            conn.query_row("SELECT COUNT(*) FROM memory_records", [], |row| row.get(0))?;
        Ok(count)
    }

    /// Number of superseded (audit-only) records.
    pub fn count_superseded(&self) -> Result<i64> {
        let conn = self.conn();
        let count = conn.query_row(
            "SELECT COUNT(*) FROM memory_records WHERE superseded_by IS NOT NULL",
            [],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Number of records awaiting embedding backfill.
    pub fn count_pending_embeddings(&self) -> Result<i64> {
        let conn = self.conn();
        let count = conn.query_row(
            "SELECT COUNT(*) FROM memory_records WHERE has_embedding = 0",
            [],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Reject embeddings whose dimensionality does not match the index.
    fn check_embedding_dims(&self, embedding: &[f32]) -> Result<()> {
        match self.vec_dims() {
            Some(dims) if dims == embedding.len() => Ok(()),
            Some(dims) => Err(EngineError::InvariantViolation(format!(
                "embedding dimensionality {} does not match index dimensionality {}",
                embedding.len(),
                dims
            ))),
            None => Err(EngineError::InvariantViolation(
                "vector index not initialized".to_string(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;

    fn db_with_vec(dims: usize) -> Database {
        let db = Database::open_in_memory().unwrap();
        db.ensure_vec_dimensions(dims).unwrap();
        db
    }

    fn record(content: &str, category: Category, embedding: Option<Vec<f32>>) -> NewRecord {
        NewRecord {
            content: content.to_string(),
            category,
            confidence: 0.8,
            metadata: serde_json::Map::new(),
            embedding,
            now: Utc::now(),
        }
    }

    #[test]
    fn test_insert_and_get() {
        let db = db_with_vec(4);
        let id = db
            .insert_record(&record("hello", Category::Fact, Some(vec![1.0, 0.0, 0.0, 0.0])))
            .unwrap();

        let fetched = db.get_record(id).unwrap().unwrap();
        assert_eq!(fetched.content, "hello");
        assert_eq!(fetched.category, Category::Fact);
        assert_eq!(fetched.tier, Tier::Working);
        assert!(fetched.has_embedding);
        assert!(fetched.superseded_by.is_none());

        let embedding = db.get_record_embedding(id).unwrap().unwrap();
        assert_eq!(embedding, vec![1.0, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_insert_without_embedding_is_pending() {
        let db = db_with_vec(4);
        let id = db.insert_record(&record("x", Category::Task, None)).unwrap();
        let fetched = db.get_record(id).unwrap().unwrap();
        assert!(!fetched.has_embedding);
        assert_eq!(db.count_pending_embeddings().unwrap(), 1);
        assert_eq!(db.get_record_embedding(id).unwrap(), None);
    }

    #[test]
    fn test_insert_wrong_dims_rejected() {
        let db = db_with_vec(4);
        let err = db
            .insert_record(&record("x", Category::Fact, Some(vec![1.0, 2.0])))
            .unwrap_err();
        assert!(matches!(err, EngineError::InvariantViolation(_)));
        // Atomicity: nothing was inserted
        assert_eq!(db.count_records().unwrap(), 0);
    }

    #[test]
    fn test_touch_records() {
        let db = db_with_vec(4);
        let id = db.insert_record(&record("x", Category::Fact, None)).unwrap();
        db.touch_records(&[id], Utc::now()).unwrap();
        db.touch_records(&[id], Utc::now()).unwrap();
        let fetched = db.get_record(id).unwrap().unwrap();
        assert_eq!(fetched.access_count, 2);
    }

    #[test]
    fn test_merge_into_extends_metadata() {
        let db = db_with_vec(4);
        let id = db.insert_record(&record("x", Category::Fact, None)).unwrap();

        let mut extra = serde_json::Map::new();
        extra.insert("source".to_string(), serde_json::json!("ocr"));
        db.merge_into(id, &extra, Utc::now()).unwrap();

        let fetched = db.get_record(id).unwrap().unwrap();
        assert_eq!(fetched.access_count, 1);
        assert_eq!(fetched.metadata.get("source"), Some(&serde_json::json!("ocr")));
    }

    #[test]
    fn test_link_supersession() {
        let db = db_with_vec(4);
        let old = db.insert_record(&record("old", Category::Fact, None)).unwrap();
        let new = db.insert_record(&record("new", Category::Fact, None)).unwrap();

        db.link_supersession(old, new).unwrap();

        let old_rec = db.get_record(old).unwrap().unwrap();
        let new_rec = db.get_record(new).unwrap().unwrap();
        assert_eq!(old_rec.superseded_by, Some(new));
        assert_eq!(new_rec.supersedes, Some(old));
        assert_eq!(db.count_superseded().unwrap(), 1);
    }

    #[test]
    fn test_supersession_cycle_rejected() {
        let db = db_with_vec(4);
        let a = db.insert_record(&record("a", Category::Fact, None)).unwrap();
        let b = db.insert_record(&record("b", Category::Fact, None)).unwrap();
        let c = db.insert_record(&record("c", Category::Fact, None)).unwrap();

        db.link_supersession(a, b).unwrap();
        db.link_supersession(b, c).unwrap();

        // Closing the loop c -> a must be rejected, records untouched
        let err = db.link_supersession(c, a).unwrap_err();
        assert!(matches!(err, EngineError::InvariantViolation(_)));
        let c_rec = db.get_record(c).unwrap().unwrap();
        assert_eq!(c_rec.superseded_by, None);
    }

    #[test]
    fn test_self_supersession_rejected() {
        let db = db_with_vec(4);
        let a = db.insert_record(&record("a", Category::Fact, None)).unwrap();
        let err = db.link_supersession(a, a).unwrap_err();
        assert!(matches!(err, EngineError::InvariantViolation(_)));
    }

    #[test]
    fn test_double_supersession_rejected() {
        let db = db_with_vec(4);
        let a = db.insert_record(&record("a", Category::Fact, None)).unwrap();
        let b = db.insert_record(&record("b", Category::Fact, None)).unwrap();
        let c = db.insert_record(&record("c", Category::Fact, None)).unwrap();

        db.link_supersession(a, b).unwrap();
        let err = db.link_supersession(a, c).unwrap_err();
        assert!(matches!(err, EngineError::InvariantViolation(_)));
    }

    #[test]
    fn test_vector_candidates_excludes_superseded() {
        let db = db_with_vec(4);
        let old = db
            .insert_record(&record("old fact", Category::Fact, Some(vec![1.0, 0.0, 0.0, 0.0])))
            .unwrap();
        let new = db
            .insert_record(&record("new fact", Category::Fact, Some(vec![1.0, 0.1, 0.0, 0.0])))
            .unwrap();
        db.link_supersession(old, new).unwrap();

        let results = db
            .vector_candidates(None, &[1.0, 0.0, 0.0, 0.0], 10)
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].0.id, new);
    }

    #[test]
    fn test_vector_candidates_category_restriction() {
        let db = db_with_vec(4);
        db.insert_record(&record("a fact", Category::Fact, Some(vec![1.0, 0.0, 0.0, 0.0])))
            .unwrap();
        db.insert_record(&record("a task", Category::Task, Some(vec![1.0, 0.0, 0.0, 0.0])))
            .unwrap();

        let results = db
            .vector_candidates(Some(&[Category::Task]), &[1.0, 0.0, 0.0, 0.0], 10)
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].0.category, Category::Task);
    }

    #[test]
    fn test_keyword_candidates_scores_by_terms_matched() {
        let db = db_with_vec(4);
        db.insert_record(&record("the deploy script lives here", Category::Fact, None))
            .unwrap();
        db.insert_record(&record("deploy notes", Category::Fact, None))
            .unwrap();
        db.insert_record(&record("unrelated", Category::Fact, None))
            .unwrap();

        let terms = vec!["deploy".to_string(), "script".to_string()];
        let results = db.keyword_candidates(None, &terms, 10).unwrap();
        assert_eq!(results.len(), 2);
        // Both terms matched beats one term matched
        assert!(results[0].0.content.contains("script"));
        assert!(results[0].1 > results[1].1);
    }

    #[test]
    fn test_keyword_candidates_escapes_wildcards() {
        let db = db_with_vec(4);
        db.insert_record(&record("literal percent 100% done", Category::Fact, None))
            .unwrap();
        db.insert_record(&record("nothing to see", Category::Fact, None))
            .unwrap();

        let results = db
            .keyword_candidates(None, &["100%".to_string()], 10)
            .unwrap();
        assert_eq!(results.len(), 1);
    }

    #[test]
    fn test_embedding_backfill_flow() {
        let db = db_with_vec(4);
        let id = db.insert_record(&record("pending", Category::Fact, None)).unwrap();

        let pending = db.find_records_without_embeddings(10).unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, id);

        db.store_record_embedding(id, &[0.0, 1.0, 0.0, 0.0]).unwrap();
        assert_eq!(db.count_pending_embeddings().unwrap(), 0);
        assert!(db.get_record(id).unwrap().unwrap().has_embedding);
    }

    #[test]
    fn test_records_due_for_promotion() {
        let db = db_with_vec(4);
        let id = db.insert_record(&record("x", Category::Fact, None)).unwrap();

        // Nothing due at insert time
        let due = db
            .records_due_for_promotion(Tier::Working, Utc::now() - chrono::Duration::hours(2), true)
            .unwrap();
        assert!(due.is_empty());

        // Due when the cutoff has moved past the creation time
        let due = db
            .records_due_for_promotion(Tier::Working, Utc::now() + chrono::Duration::hours(2), true)
            .unwrap();
        assert_eq!(due, vec![id]);
    }

    #[test]
    fn test_tier_counts() {
        let db = db_with_vec(4);
        let a = db.insert_record(&record("a", Category::Fact, None)).unwrap();
        db.insert_record(&record("b", Category::Task, None)).unwrap();
        db.set_tier(a, Tier::ShortTerm).unwrap();

        let counts = db.tier_counts().unwrap();
        assert_eq!(counts.working, 1);
        assert_eq!(counts.short_term, 1);
        assert_eq!(counts.long_term, 0);
    }

    #[test]
    fn test_set_category() {
        let db = db_with_vec(4);
        let id = db.insert_record(&record("x", Category::Conversation, None)).unwrap();
        db.set_category(id, Category::Fact).unwrap();
        assert_eq!(db.get_record(id).unwrap().unwrap().category, Category::Fact);

        let err = db.set_category(9999, Category::Fact).unwrap_err();
        assert!(matches!(err, EngineError::InvalidInput(_)));
    }
}
