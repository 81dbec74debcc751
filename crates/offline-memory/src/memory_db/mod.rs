//! The memory ledger: SQLite-backed storage for messages, summaries, and
//! embeddings. Single source of truth; everything the vector index holds is
//! derived from here.

pub mod embedding_store;
pub mod message_store;
pub mod migration;
pub mod schema;
pub mod summary_store;

pub use embedding_store::EmbeddingStore;
pub use message_store::MessageStore;
pub use migration::MigrationManager;
pub use schema::{DatabaseStats, Role, StoredMessage, StoredSummary};
pub use summary_store::SummaryStore;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

use crate::error::Result;

/// Handle to the durable store: one pool, three table-scoped stores.
///
/// Open once and reuse; each store checks a connection out of the shared
/// pool per call. Writes commit before the call returns.
pub struct MemoryDatabase {
    pub messages: MessageStore,
    pub summaries: SummaryStore,
    pub embeddings: EmbeddingStore,
    pool: Arc<Pool<SqliteConnectionManager>>,
}

impl MemoryDatabase {
    /// Open (or create) a file-backed ledger at `db_path`.
    pub fn open(db_path: &Path, embedding_dim: usize) -> Result<Self> {
        info!("Opening memory database at: {}", db_path.display());
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let manager = SqliteConnectionManager::file(db_path).with_flags(
            rusqlite::OpenFlags::SQLITE_OPEN_READ_WRITE
                | rusqlite::OpenFlags::SQLITE_OPEN_CREATE
                | rusqlite::OpenFlags::SQLITE_OPEN_FULL_MUTEX,
        );
        let pool = Pool::builder().max_size(10).build(manager)?;

        {
            let mut conn = pool.get()?;
            conn.execute_batch(
                "PRAGMA journal_mode = WAL;
                 PRAGMA synchronous = NORMAL;
                 PRAGMA busy_timeout = 5000;",
            )?;
            MigrationManager::new(&mut conn).initialize_database()?;
        }

        Ok(Self::from_pool(Arc::new(pool), embedding_dim))
    }

    /// An in-memory ledger for tests and scratch sessions.
    ///
    /// The pool is capped at one connection: pooled `:memory:` handles do
    /// not share state.
    pub fn open_in_memory(embedding_dim: usize) -> Result<Self> {
        let manager = SqliteConnectionManager::memory();
        let pool = Pool::builder().max_size(1).build(manager)?;
        {
            let mut conn = pool.get()?;
            MigrationManager::new(&mut conn).initialize_database()?;
        }
        Ok(Self::from_pool(Arc::new(pool), embedding_dim))
    }

    fn from_pool(pool: Arc<Pool<SqliteConnectionManager>>, embedding_dim: usize) -> Self {
        Self {
            messages: MessageStore::new(Arc::clone(&pool)),
            summaries: SummaryStore::new(Arc::clone(&pool)),
            embeddings: EmbeddingStore::new(Arc::clone(&pool), embedding_dim),
            pool,
        }
    }

    pub fn stats(&self) -> Result<DatabaseStats> {
        let conn = self.pool.get()?;
        Ok(migration::database_stats(&conn)?)
    }
}

impl Drop for MemoryDatabase {
    fn drop(&mut self) {
        if let Ok(conn) = self.pool.get() {
            let _ = conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_creates_parent_directories_and_reopens() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("nested/memory.sqlite");

        {
            let db = MemoryDatabase::open(&db_path, 3).unwrap();
            db.messages.add_message("s1", Role::User, "persisted").unwrap();
            db.embeddings.add_embedding(1, &[1.0, 0.0, 0.0]).unwrap();
        }

        // Reopen and confirm durability across the close
        let db = MemoryDatabase::open(&db_path, 3).unwrap();
        let recent = db.messages.recent_messages("s1", 10).unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].content, "persisted");
        assert_eq!(db.embeddings.count().unwrap(), 1);
    }

    #[test]
    fn test_stats_reflect_inserted_rows() {
        let db = MemoryDatabase::open_in_memory(2).unwrap();
        db.messages.add_message("s1", Role::User, "a").unwrap();
        db.messages.add_message("s1", Role::Assistant, "b").unwrap();
        db.summaries.add_summary("s1", "so far").unwrap();
        db.embeddings.add_embedding(1, &[1.0, 0.0]).unwrap();

        let stats = db.stats().unwrap();
        assert_eq!(stats.total_messages, 2);
        assert_eq!(stats.total_summaries, 1);
        assert_eq!(stats.total_embeddings, 1);
    }

    #[test]
    fn test_message_without_embedding_is_a_valid_state() {
        let db = MemoryDatabase::open_in_memory(2).unwrap();
        let id = db.messages.add_message("s1", Role::User, "no vector yet").unwrap();
        assert_eq!(db.embeddings.count().unwrap(), 0);
        assert_eq!(db.messages.fetch_messages_by_id(&[id]).unwrap().len(), 1);
    }
}
