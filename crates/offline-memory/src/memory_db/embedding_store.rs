//! Embedding storage: raw f32 vectors bound to message ids.
//!
//! Vectors are stored as the raw little-endian f32 byte array with no header
//! or length prefix; the dimension is store configuration, not part of the
//! record. Every write bumps a process-local version counter that the vector
//! index compares against to detect staleness.

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::params;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

use crate::error::{MemoryError, Result};

pub struct EmbeddingStore {
    pool: Arc<Pool<SqliteConnectionManager>>,
    dim: usize,
    version: AtomicU64,
}

impl EmbeddingStore {
    pub fn new(pool: Arc<Pool<SqliteConnectionManager>>, dim: usize) -> Self {
        Self {
            pool,
            dim,
            version: AtomicU64::new(0),
        }
    }

    fn get_conn(&self) -> Result<r2d2::PooledConnection<SqliteConnectionManager>> {
        Ok(self.pool.get()?)
    }

    /// The configured embedding dimension.
    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Monotonic write counter; the index snapshot records the value it was
    /// built from and rebuilds when the two diverge.
    pub fn version(&self) -> u64 {
        self.version.load(Ordering::Acquire)
    }

    /// Append one embedding row bound to `message_id`.
    ///
    /// The vector length is validated before the database is touched, so a
    /// `DimensionMismatch` leaves no partial row. The message id itself is
    /// not validated; embeddings may be written out of order relative to
    /// their messages.
    pub fn add_embedding(&self, message_id: i64, vector: &[f32]) -> Result<()> {
        if vector.len() != self.dim {
            return Err(MemoryError::DimensionMismatch {
                expected: self.dim,
                actual: vector.len(),
            });
        }
        let conn = self.get_conn()?;
        conn.execute(
            "INSERT INTO embeddings (message_id, vector) VALUES (?1, ?2)",
            params![message_id, vector_to_blob(vector)],
        )?;
        self.version.fetch_add(1, Ordering::Release);
        debug!("Stored embedding for message {}", message_id);
        Ok(())
    }

    /// Full scan in insertion (rowid) order, used by the index rebuild.
    pub fn all_embeddings(&self) -> Result<Vec<(i64, Vec<f32>)>> {
        let conn = self.get_conn()?;
        let mut stmt =
            conn.prepare("SELECT message_id, vector FROM embeddings ORDER BY rowid ASC")?;
        let mut rows = stmt.query([])?;

        let mut embeddings = Vec::new();
        while let Some(row) = rows.next()? {
            let message_id: i64 = row.get(0)?;
            let blob: Vec<u8> = row.get(1)?;
            embeddings.push((message_id, blob_to_vector(&blob, self.dim)?));
        }
        Ok(embeddings)
    }

    pub fn count(&self) -> Result<usize> {
        let conn = self.get_conn()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM embeddings", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}

fn vector_to_blob(vector: &[f32]) -> Vec<u8> {
    let mut blob = Vec::with_capacity(vector.len() * 4);
    for v in vector {
        blob.extend_from_slice(&v.to_le_bytes());
    }
    blob
}

fn blob_to_vector(blob: &[u8], dim: usize) -> Result<Vec<f32>> {
    if blob.len() != dim * 4 {
        // Wrong byte length is corruption, not a recoverable mismatch
        return Err(MemoryError::Storage(rusqlite::Error::FromSqlConversionFailure(
            blob.len(),
            rusqlite::types::Type::Blob,
            format!("embedding blob holds {} bytes, expected {}", blob.len(), dim * 4).into(),
        )));
    }
    let mut vector = Vec::with_capacity(dim);
    for chunk in blob.chunks_exact(4) {
        vector.push(f32::from_le_bytes(chunk.try_into().unwrap()));
    }
    Ok(vector)
}
