//! Database migration system.

use rusqlite::{Connection, Result};
use tracing::{error, info};

use crate::memory_db::schema::DatabaseStats;

/// Applies numbered schema migrations, tracked in a `schema_version` table.
pub struct MigrationManager<'a> {
    conn: &'a mut Connection,
}

impl<'a> MigrationManager<'a> {
    pub fn new(conn: &'a mut Connection) -> Self {
        Self { conn }
    }

    /// Bring the database up to the current schema version.
    pub fn initialize_database(&mut self) -> Result<()> {
        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS schema_version (
                version INTEGER PRIMARY KEY,
                applied_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
            )",
            [],
        )?;

        let current_version = self.current_version()?;
        self.apply_migrations(current_version)?;
        Ok(())
    }

    fn apply_migrations(&mut self, current_version: i32) -> Result<()> {
        for (version, migration_sql) in migrations() {
            if version > current_version {
                info!("Applying schema migration {}", version);

                let tx = self.conn.transaction()?;
                if let Err(e) = tx.execute_batch(migration_sql) {
                    error!("Failed to apply migration {}: {}", version, e);
                    return Err(e);
                }
                tx.execute("INSERT INTO schema_version (version) VALUES (?)", [version])?;
                tx.commit()?;
            }
        }
        Ok(())
    }

    pub fn current_version(&self) -> Result<i32> {
        self.conn.query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_version",
            [],
            |row| row.get(0),
        )
    }
}

fn migrations() -> Vec<(i32, &'static str)> {
    vec![(1, include_str!("migrations/001_initial.sql"))]
}

/// Read-only table totals plus on-disk size.
pub fn database_stats(conn: &Connection) -> Result<DatabaseStats> {
    fn table_count(conn: &Connection, table: &str) -> Result<i64> {
        conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))
    }

    let total_messages = table_count(conn, "messages")?;
    let total_summaries = table_count(conn, "summaries")?;
    let total_embeddings = table_count(conn, "embeddings")?;

    let database_size_bytes: i64 = conn
        .query_row(
            "SELECT page_count * page_size FROM pragma_page_count(), pragma_page_size()",
            [],
            |row| row.get(0),
        )
        .unwrap_or(0);

    Ok(DatabaseStats {
        total_messages,
        total_summaries,
        total_embeddings,
        database_size_bytes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn migrated_conn() -> Connection {
        let mut conn = Connection::open_in_memory().unwrap();
        MigrationManager::new(&mut conn).initialize_database().unwrap();
        conn
    }

    #[test]
    fn test_fresh_database_lands_on_latest_version() {
        let conn = migrated_conn();
        let version: i32 = conn
            .query_row("SELECT MAX(version) FROM schema_version", [], |row| row.get(0))
            .unwrap();
        assert_eq!(version, 1);
    }

    #[test]
    fn test_migration_is_idempotent() {
        let mut conn = migrated_conn();
        MigrationManager::new(&mut conn).initialize_database().unwrap();
        let applied: i64 = conn
            .query_row("SELECT COUNT(*) FROM schema_version", [], |row| row.get(0))
            .unwrap();
        assert_eq!(applied, 1);
    }

    #[test]
    fn test_all_three_tables_exist_after_migration() {
        let conn = migrated_conn();
        for table in ["messages", "summaries", "embeddings"] {
            let count: i64 = conn
                .query_row(
                    "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
                    [table],
                    |row| row.get(0),
                )
                .unwrap();
            assert_eq!(count, 1, "missing table {table}");
        }
    }

    #[test]
    fn test_database_stats_on_empty_database() {
        let conn = migrated_conn();
        let stats = database_stats(&conn).unwrap();
        assert_eq!(stats.total_messages, 0);
        assert_eq!(stats.total_summaries, 0);
        assert_eq!(stats.total_embeddings, 0);
    }
}
