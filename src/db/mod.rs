// src/db/mod.rs
// Record store: rusqlite + sqlite-vec behind a single connection

mod records;
mod schema;

pub use records::{NewRecord, TierCounts, parse_record_row};
pub use schema::current_vec_dims;

use anyhow::{Context, Result};
use rusqlite::Connection;
use sqlite_vec::sqlite3_vec_init;
use std::path::Path;
use std::sync::{Mutex, Once};

/// Registers sqlite-vec extension globally (once per process).
/// Must be called before any SQLite connections are opened.
static SQLITE_VEC_INIT: Once = Once::new();

#[allow(clippy::missing_transmute_annotations)]
pub(crate) fn ensure_sqlite_vec_registered() {
    SQLITE_VEC_INIT.call_once(|| {
        // SAFETY: sqlite3_vec_init has the signature expected by
        // sqlite3_auto_extension; the pointer targets a statically-linked
        // symbol and stays valid for the process lifetime.
        unsafe {
            rusqlite::ffi::sqlite3_auto_extension(Some(std::mem::transmute(
                sqlite3_vec_init as *const (),
            )));
        }
        tracing::debug!("sqlite-vec extension registered globally");
    });
}

/// Convert an embedding to the little-endian byte layout sqlite-vec expects.
pub fn embedding_to_bytes(embedding: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(embedding.len() * 4);
    for value in embedding {
        bytes.extend_from_slice(&value.to_le_bytes());
    }
    bytes
}

/// Inverse of [`embedding_to_bytes`].
pub fn bytes_to_embedding(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Database wrapper with sqlite-vec support
pub struct Database {
    conn: Mutex<Connection>,
    /// Dimension of the vector index, once known. All embeddings must match.
    vec_dims: Mutex<Option<usize>>,
}

impl Database {
    /// Open database at path, creating if needed
    pub fn open(path: &Path) -> Result<Self> {
        ensure_sqlite_vec_registered();

        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database at {:?}", path))?;

        // Enable WAL mode for better concurrency
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;

        let db = Self {
            conn: Mutex::new(conn),
            vec_dims: Mutex::new(None),
        };
        db.init_schema()?;
        Ok(db)
    }

    /// Open in-memory database (for testing)
    pub fn open_in_memory() -> Result<Self> {
        ensure_sqlite_vec_registered();

        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;

        let db = Self {
            conn: Mutex::new(conn),
            vec_dims: Mutex::new(None),
        };
        db.init_schema()?;
        Ok(db)
    }

    /// Get a lock on the connection
    pub fn conn(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().expect("Database mutex poisoned")
    }

    /// Initialize schema (idempotent)
    fn init_schema(&self) -> Result<()> {
        let conn = self.conn();
        conn.execute_batch(schema::SCHEMA)?;

        // Pick up the dimension of an existing vector index, if any
        let dims = schema::current_vec_dims(&conn);
        drop(conn);
        *self.vec_dims.lock().expect("vec_dims mutex poisoned") = dims;
        Ok(())
    }

    /// Ensure the vector index exists with the given dimensions.
    ///
    /// Called at startup once the embedding backend (and thus the deployment
    /// dimensionality) is known. A dimension change drops and recreates the
    /// index and resets `has_embedding` flags so records get re-embedded.
    pub fn ensure_vec_dimensions(&self, target_dims: usize) -> Result<()> {
        let conn = self.conn();
        schema::ensure_vec_table_dimensions(&conn, target_dims)?;
        drop(conn);
        *self.vec_dims.lock().expect("vec_dims mutex poisoned") = Some(target_dims);
        Ok(())
    }

    /// Dimension of the vector index, if one has been created.
    pub fn vec_dims(&self) -> Option<usize> {
        *self.vec_dims.lock().expect("vec_dims mutex poisoned")
    }
}
