//! Schema definitions and migration runner for the metadata store.
//!
//! Migrations are plain SQL strings applied in order; the SQLite
//! `user_version` pragma tracks which have already been applied.

use rusqlite::Connection;
use tracing::{debug, info};

use crate::errors::StoreError;

/// All migrations, in order. Each entry is `(version, description, sql)`.
static MIGRATIONS: &[(u32, &str, &str)] = &[(
    1,
    "initial schema",
    r#"
    CREATE TABLE IF NOT EXISTS file_records (
        path             TEXT PRIMARY KEY,
        content_hash     TEXT    NOT NULL DEFAULT '',
        revision         INTEGER NOT NULL DEFAULT 0,
        parent_revision  INTEGER NOT NULL DEFAULT 0,
        size             INTEGER NOT NULL DEFAULT 0,
        last_synced_at   TEXT    NOT NULL DEFAULT '',
        device_id        TEXT    NOT NULL DEFAULT ''
    );

    CREATE TABLE IF NOT EXISTS conflict_log (
        id                       TEXT PRIMARY KEY,
        path                     TEXT    NOT NULL,
        server_revision          INTEGER NOT NULL,
        claimed_parent_revision  INTEGER NOT NULL,
        outcome                  TEXT    NOT NULL,
        backup_path              TEXT,
        created_at               TEXT    NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_conflict_log_path ON conflict_log (path);
    CREATE INDEX IF NOT EXISTS idx_conflict_log_created_at ON conflict_log (created_at);

    CREATE TABLE IF NOT EXISTS kv_state (
        key         TEXT PRIMARY KEY,
        value       TEXT NOT NULL,
        updated_at  TEXT NOT NULL
    );
    "#,
)];

/// Apply all outstanding migrations.
pub fn run_migrations(conn: &Connection) -> Result<(), StoreError> {
    let current: u32 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;

    for (version, description, sql) in MIGRATIONS {
        if *version <= current {
            debug!(version, "migration already applied");
            continue;
        }
        info!(version, description, "applying store migration");
        conn.execute_batch(sql)?;
        conn.execute_batch(&format!("PRAGMA user_version = {version}"))?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migrations_are_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();
        run_migrations(&conn).unwrap();

        let version: u32 = conn.query_row("PRAGMA user_version", [], |row| row.get(0)).unwrap();
        assert_eq!(version, MIGRATIONS.last().unwrap().0);
    }

    #[test]
    fn test_tables_exist_after_migration() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();

        for table in ["file_records", "conflict_log", "kv_state"] {
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
}
