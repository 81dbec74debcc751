//! Summary storage and retrieval.

use chrono::Utc;
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::params;
use std::sync::Arc;
use tracing::debug;

use crate::error::{MemoryError, Result};
use crate::memory_db::schema::{parse_datetime_or_now, StoredSummary};

pub struct SummaryStore {
    pool: Arc<Pool<SqliteConnectionManager>>,
}

impl SummaryStore {
    pub fn new(pool: Arc<Pool<SqliteConnectionManager>>) -> Self {
        Self { pool }
    }

    fn get_conn(&self) -> Result<r2d2::PooledConnection<SqliteConnectionManager>> {
        Ok(self.pool.get()?)
    }

    /// Append a summary row. The only validation is a non-empty session id.
    pub fn add_summary(&self, session_id: &str, summary: &str) -> Result<()> {
        if session_id.is_empty() {
            return Err(MemoryError::EmptySessionId);
        }
        let conn = self.get_conn()?;
        conn.execute(
            "INSERT INTO summaries (session_id, summary, created_at) VALUES (?1, ?2, ?3)",
            params![session_id, summary, Utc::now().to_rfc3339()],
        )?;
        debug!("Stored summary for session {}", session_id);
        Ok(())
    }

    /// The most recent `limit` summaries, newest first.
    ///
    /// Intentionally the inverse ordering of `recent_messages`: summaries
    /// are read most-relevant-first, not replayed chronologically.
    pub fn summaries(&self, session_id: &str, limit: i64) -> Result<Vec<String>> {
        if limit <= 0 {
            // A negative SQLite LIMIT means "unlimited"; guard it out.
            return Ok(Vec::new());
        }
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            "SELECT summary FROM summaries WHERE session_id = ?1 ORDER BY id DESC LIMIT ?2",
        )?;
        let mut rows = stmt.query(params![session_id, limit])?;

        let mut summaries = Vec::new();
        while let Some(row) = rows.next()? {
            summaries.push(row.get(0)?);
        }
        Ok(summaries)
    }

    /// Full summary rows for a session, newest first.
    pub fn session_summaries(&self, session_id: &str, limit: i64) -> Result<Vec<StoredSummary>> {
        if limit <= 0 {
            return Ok(Vec::new());
        }
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, session_id, summary, created_at
             FROM summaries WHERE session_id = ?1 ORDER BY id DESC LIMIT ?2",
        )?;
        let mut rows = stmt.query(params![session_id, limit])?;

        let mut summaries = Vec::new();
        while let Some(row) = rows.next()? {
            let created_at: String = row.get(3)?;
            summaries.push(StoredSummary {
                id: row.get(0)?,
                session_id: row.get(1)?,
                summary: row.get(2)?,
                created_at: parse_datetime_or_now(&created_at, "summaries.created_at"),
            });
        }
        Ok(summaries)
    }
}

#[cfg(test)]
mod tests {
    use crate::error::MemoryError;
    use crate::memory_db::MemoryDatabase;

    fn db() -> MemoryDatabase {
        MemoryDatabase::open_in_memory(4).unwrap()
    }

    #[test]
    fn test_summaries_returned_newest_first() {
        let db = db();
        for i in 0..4 {
            db.summaries.add_summary("s1", &format!("summary {i}")).unwrap();
        }

        let latest = db.summaries.summaries("s1", 2).unwrap();
        assert_eq!(latest, vec!["summary 3", "summary 2"]);
    }

    #[test]
    fn test_summaries_caps_at_available_count() {
        let db = db();
        db.summaries.add_summary("s1", "only").unwrap();
        assert_eq!(db.summaries.summaries("s1", 5).unwrap().len(), 1);
    }

    #[test]
    fn test_summaries_zero_or_negative_limit_is_empty() {
        let db = db();
        db.summaries.add_summary("s1", "a").unwrap();
        assert!(db.summaries.summaries("s1", 0).unwrap().is_empty());
        assert!(db.summaries.summaries("s1", -1).unwrap().is_empty());
    }

    #[test]
    fn test_empty_session_id_is_rejected() {
        let db = db();
        let err = db.summaries.add_summary("", "text").unwrap_err();
        assert!(matches!(err, MemoryError::EmptySessionId));
    }

    #[test]
    fn test_session_summaries_carry_ids_and_session() {
        let db = db();
        db.summaries.add_summary("s1", "first").unwrap();
        db.summaries.add_summary("s1", "second").unwrap();

        let rows = db.summaries.session_summaries("s1", 10).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].summary, "second");
        assert!(rows[0].id > rows[1].id);
        assert_eq!(rows[1].session_id, "s1");
    }
}
