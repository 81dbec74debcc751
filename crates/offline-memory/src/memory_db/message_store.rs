//! Message storage: the append-only conversational record.

use chrono::Utc;
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, OptionalExtension, Row};
use std::sync::Arc;
use tracing::debug;

use crate::error::Result;
use crate::memory_db::schema::{parse_datetime_or_now, Role, StoredMessage};

pub struct MessageStore {
    pool: Arc<Pool<SqliteConnectionManager>>,
}

impl MessageStore {
    pub fn new(pool: Arc<Pool<SqliteConnectionManager>>) -> Self {
        Self { pool }
    }

    fn get_conn(&self) -> Result<r2d2::PooledConnection<SqliteConnectionManager>> {
        Ok(self.pool.get()?)
    }

    /// Append a message and return its ledger-assigned id.
    ///
    /// Ids are monotonically increasing and never reused, even across
    /// failed writes (SQLite AUTOINCREMENT).
    pub fn add_message(&self, session_id: &str, role: Role, content: &str) -> Result<i64> {
        let conn = self.get_conn()?;
        let now = Utc::now();
        conn.execute(
            "INSERT INTO messages (session_id, role, content, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![session_id, role, content, now.to_rfc3339()],
        )?;
        let id = conn.last_insert_rowid();
        debug!("Stored {} message {} for session {}", role, id, session_id);
        Ok(id)
    }

    /// The most recent `limit` messages for a session, oldest first.
    ///
    /// Storage is queried newest-first and the page reversed, so the result
    /// concatenates directly into a prompt. `limit <= 0` returns an empty vec.
    pub fn recent_messages(&self, session_id: &str, limit: i64) -> Result<Vec<StoredMessage>> {
        if limit <= 0 {
            return Ok(Vec::new());
        }
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, session_id, role, content, created_at
             FROM messages WHERE session_id = ?1 ORDER BY id DESC LIMIT ?2",
        )?;
        let mut rows = stmt.query(params![session_id, limit])?;

        let mut messages = Vec::new();
        while let Some(row) = rows.next()? {
            messages.push(row_to_message(row)?);
        }
        messages.reverse();
        Ok(messages)
    }

    /// Resolve ids to message bodies, preserving input order.
    ///
    /// Ids with no matching row are silently skipped.
    pub fn fetch_messages_by_id(&self, ids: &[i64]) -> Result<Vec<StoredMessage>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, session_id, role, content, created_at FROM messages WHERE id = ?1",
        )?;

        let mut messages = Vec::with_capacity(ids.len());
        for id in ids {
            let message = stmt
                .query_row([id], |row| {
                    // Defer datetime parsing out of the rusqlite closure
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, Role>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, String>(4)?,
                    ))
                })
                .optional()?;
            if let Some((id, session_id, role, content, created_at)) = message {
                messages.push(StoredMessage {
                    id,
                    session_id,
                    role,
                    content,
                    created_at: parse_datetime_or_now(&created_at, "messages.created_at"),
                });
            }
        }
        Ok(messages)
    }

    pub fn message_count(&self, session_id: &str) -> Result<usize> {
        let conn = self.get_conn()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM messages WHERE session_id = ?1",
            [session_id],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }
}

fn row_to_message(row: &Row) -> Result<StoredMessage> {
    let created_at: String = row.get(4)?;
    Ok(StoredMessage {
        id: row.get(0)?,
        session_id: row.get(1)?,
        role: row.get(2)?,
        content: row.get(3)?,
        created_at: parse_datetime_or_now(&created_at, "messages.created_at"),
    })
}
