//! SQLite-backed metadata store.
//!
//! Provides a [`MetaStore`] handle with WAL-mode journaling, automatic
//! schema migrations, and typed query helpers for the per-path sync records
//! the reconciliation engine depends on.
//!
//! Every mutation runs as a single autocommit statement, so each call is
//! durably flushed before it returns: a crash mid-reconciliation leaves the
//! store consistent with the last completed action.

pub mod queries;
pub mod schema;

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use rusqlite::Connection;
use tracing::{debug, info, warn};

use crate::errors::StoreError;

/// Metadata store handle wrapping a SQLite connection.
///
/// The inner connection is wrapped in a `Mutex` so that `MetaStore` is
/// `Send + Sync` and per-path writes from concurrent single-file operations
/// serialize.
pub struct MetaStore {
    conn: Mutex<Connection>,
}

impl MetaStore {
    /// Open (or create) the store at `path` and run migrations.
    ///
    /// A malformed on-disk database is treated as an empty store: the
    /// unreadable file is moved aside to `<path>.corrupt` with a warning
    /// and a fresh store is created in its place. Only a second consecutive
    /// failure is surfaced as an error.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let path = path.as_ref();
        info!(path = %path.display(), "opening metadata store");

        match Self::try_open(path) {
            Ok(store) => Ok(store),
            Err(e) => {
                warn!(
                    path = %path.display(),
                    error = %e,
                    "metadata store unreadable, starting from an empty store"
                );
                let quarantine = path.with_extension("corrupt");
                std::fs::rename(path, &quarantine)?;
                Self::try_open(path).map_err(|e| StoreError::Unrecoverable {
                    path: path.display().to_string(),
                    detail: e.to_string(),
                })
            }
        }
    }

    fn try_open(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode = WAL;")?;
        conn.execute_batch("PRAGMA synchronous = FULL;")?;
        conn.execute_batch("PRAGMA busy_timeout = 5000;")?;
        schema::run_migrations(&conn)?;
        debug!("metadata store opened with WAL mode");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open an in-memory store (useful for testing).
    pub fn in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        schema::run_migrations(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Obtain a lock on the underlying connection.
    ///
    /// Prefer the typed query methods over raw SQL. If the mutex is
    /// poisoned (a previous holder panicked), the lock is recovered rather
    /// than propagating the panic.
    pub(crate) fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|poisoned| {
            warn!("metadata store mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_in_memory_store() {
        MetaStore::in_memory().expect("failed to create in-memory store");
    }

    #[test]
    fn test_file_store() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("meta.db");
        MetaStore::open(&path).expect("failed to create file store");
        assert!(path.exists());
    }

    #[test]
    fn test_corrupt_store_is_treated_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("meta.db");
        std::fs::write(&path, "this is not a sqlite database, not even close").unwrap();

        let store = MetaStore::open(&path).expect("corrupt store should recover");
        assert!(store.get("anything.md").unwrap().is_none());
        assert!(path.with_extension("corrupt").exists());
    }

    #[test]
    fn test_reopen_preserves_records() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("meta.db");
        {
            let store = MetaStore::open(&path).unwrap();
            store
                .upsert(
                    "a.md",
                    crate::models::FileRecordPatch {
                        revision: Some(3),
                        ..Default::default()
                    },
                )
                .unwrap();
        }
        let store = MetaStore::open(&path).unwrap();
        assert_eq!(store.get("a.md").unwrap().unwrap().revision, 3);
    }
}
