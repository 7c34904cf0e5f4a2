// src/db/schema.rs
// Schema and vector-table migrations

use anyhow::Result;
use rusqlite::Connection;

/// Base schema. The vector table is created separately once the embedding
/// dimensionality is known (see `ensure_vec_table_dimensions`).
pub const SCHEMA: &str = "
-- =======================================
-- MEMORY RECORDS
-- =======================================
CREATE TABLE IF NOT EXISTS memory_records (
    id INTEGER PRIMARY KEY,
    content TEXT NOT NULL,
    category TEXT NOT NULL,
    tier TEXT NOT NULL DEFAULT 'working',
    confidence REAL NOT NULL DEFAULT 0.5,
    created_at TEXT NOT NULL,
    last_accessed_at TEXT NOT NULL,
    access_count INTEGER NOT NULL DEFAULT 0,
    supersedes INTEGER REFERENCES memory_records(id),
    superseded_by INTEGER REFERENCES memory_records(id),
    has_embedding INTEGER NOT NULL DEFAULT 0,  -- 1 if record has a row in vec_records
    metadata TEXT NOT NULL DEFAULT '{}'
);
CREATE INDEX IF NOT EXISTS idx_records_category ON memory_records(category);
CREATE INDEX IF NOT EXISTS idx_records_tier ON memory_records(tier);
CREATE INDEX IF NOT EXISTS idx_records_superseded ON memory_records(superseded_by);
CREATE INDEX IF NOT EXISTS idx_records_no_embedding ON memory_records(has_embedding) WHERE has_embedding = 0;
";

/// Parse the current dimension of vec_records from its schema SQL.
pub fn current_vec_dims(conn: &Connection) -> Option<usize> {
    conn.query_row(
        "SELECT sql FROM sqlite_master WHERE type='table' AND name='vec_records'",
        [],
        |row| {
            let sql: String = row.get(0)?;
            // Parse dimension from SQL like "embedding float[1536]"
            if let Some(start) = sql.find("float[") {
                let rest = &sql[start + 6..];
                if let Some(end) = rest.find(']')
                    && let Ok(dim) = rest[..end].parse::<usize>()
                {
                    return Ok(Some(dim));
                }
            }
            Ok(None)
        },
    )
    .unwrap_or(None)
}

fn vec_table_create_sql(dims: usize) -> String {
    format!(
        "CREATE VIRTUAL TABLE IF NOT EXISTS vec_records USING vec0(\
             embedding float[{dims}],\
             +record_id INTEGER\
         )"
    )
}

/// Ensure the vec_records table dimensions match the active embedding backend.
///
/// If the table dimensions don't match `target_dims`, drops and recreates
/// vec_records with the correct dimensions, then resets has_embedding flags
/// so records are queued for re-embedding.
pub fn ensure_vec_table_dimensions(conn: &Connection, target_dims: usize) -> Result<()> {
    let current = current_vec_dims(conn);

    match current {
        Some(dim) if dim == target_dims => {
            // Already correct
            Ok(())
        }
        Some(dim) => {
            tracing::info!(
                "vec_records dimensions mismatch ({} -> {}), recreating table",
                dim,
                target_dims
            );
            let tx = conn.unchecked_transaction()?;
            tx.execute_batch("DROP TABLE IF EXISTS vec_records")?;
            tx.execute_batch(&vec_table_create_sql(target_dims))?;
            tx.execute("UPDATE memory_records SET has_embedding = 0", [])?;
            tx.commit()?;
            Ok(())
        }
        None => {
            tracing::info!("Creating vec_records with {} dimensions", target_dims);
            conn.execute_batch(&vec_table_create_sql(target_dims))?;
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::ensure_sqlite_vec_registered;

    fn bare_conn() -> Connection {
        ensure_sqlite_vec_registered();
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(SCHEMA).unwrap();
        conn
    }

    #[test]
    fn test_vec_table_create_sql_embeds_given_dim() {
        assert!(vec_table_create_sql(768).contains("float[768]"));
    }

    #[test]
    fn test_current_vec_dims_absent_returns_none() {
        let conn = bare_conn();
        assert_eq!(current_vec_dims(&conn), None);
    }

    #[test]
    fn test_ensure_dims_creates_table() {
        let conn = bare_conn();
        ensure_vec_table_dimensions(&conn, 16).unwrap();
        assert_eq!(current_vec_dims(&conn), Some(16));
    }

    #[test]
    fn test_ensure_dims_match_is_noop() {
        let conn = bare_conn();
        ensure_vec_table_dimensions(&conn, 16).unwrap();
        ensure_vec_table_dimensions(&conn, 16).unwrap();
        assert_eq!(current_vec_dims(&conn), Some(16));
    }

    #[test]
    fn test_ensure_dims_mismatch_recreates_and_resets_flags() {
        let conn = bare_conn();
        ensure_vec_table_dimensions(&conn, 16).unwrap();
        conn.execute(
            "INSERT INTO memory_records (content, category, tier, created_at, last_accessed_at, has_embedding)
             VALUES ('x', 'fact', 'working', '2026-01-01T00:00:00+00:00', '2026-01-01T00:00:00+00:00', 1)",
            [],
        )
        .unwrap();

        ensure_vec_table_dimensions(&conn, 32).unwrap();
        assert_eq!(current_vec_dims(&conn), Some(32));

        let pending: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM memory_records WHERE has_embedding = 0",
                [],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(pending, 1);
    }
}
