//! Row types and SQL conversions for the memory ledger.

use chrono::{DateTime, NaiveDateTime, Utc};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSqlOutput, ValueRef};
use rusqlite::ToSql;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::warn;

/// Conversational role, closed at the storage boundary.
///
/// Unknown role strings read from disk fail the row conversion instead of
/// leaking through as free-form text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }

    pub fn parse(s: &str) -> Option<Role> {
        match s {
            "system" => Some(Role::System),
            "user" => Some(Role::User),
            "assistant" => Some(Role::Assistant),
            _ => None,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ToSql for Role {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for Role {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let text = value.as_str()?;
        Role::parse(text)
            .ok_or_else(|| FromSqlError::Other(format!("unknown role: {text}").into()))
    }
}

/// A durably stored conversational turn. Append-only; never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredMessage {
    pub id: i64,
    pub session_id: String,
    pub role: Role,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// A condensed slice of session history, written by an external summarizer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredSummary {
    pub id: i64,
    pub session_id: String,
    pub summary: String,
    pub created_at: DateTime<Utc>,
}

/// Table totals and on-disk size, for operator visibility.
#[derive(Debug, Clone, Serialize)]
pub struct DatabaseStats {
    pub total_messages: i64,
    pub total_summaries: i64,
    pub total_embeddings: i64,
    pub database_size_bytes: i64,
}

/// Timestamps are written as RFC 3339 but older databases may carry other
/// SQLite datetime spellings; try the common ones before giving up.
pub(crate) fn parse_datetime_safe(datetime_str: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(datetime_str) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(datetime_str, "%Y-%m-%d %H:%M:%S") {
        return Some(DateTime::from_naive_utc_and_offset(dt, Utc));
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(datetime_str, "%Y-%m-%d %H:%M:%S%.f") {
        return Some(DateTime::from_naive_utc_and_offset(dt, Utc));
    }
    None
}

pub(crate) fn parse_datetime_or_now(datetime_str: &str, column: &str) -> DateTime<Utc> {
    parse_datetime_safe(datetime_str).unwrap_or_else(|| {
        warn!("failed to parse {column} timestamp '{datetime_str}', substituting now");
        Utc::now()
    })
}
