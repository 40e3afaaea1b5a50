//! Typed query helpers for the metadata store.

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};
use tracing::debug;

use super::MetaStore;
use crate::errors::StoreError;
use crate::models::{ConflictOutcomeKind, ConflictRecord, FileRecord, FileRecordPatch};

fn record_from_row(row: &Row<'_>) -> rusqlite::Result<FileRecord> {
    let last_synced_at: String = row.get(5)?;
    Ok(FileRecord {
        path: row.get(0)?,
        content_hash: row.get(1)?,
        revision: row.get(2)?,
        parent_revision: row.get(3)?,
        size: row.get(4)?,
        last_synced_at: DateTime::parse_from_rfc3339(&last_synced_at)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_default(),
        device_id: row.get(6)?,
    })
}

const RECORD_COLUMNS: &str =
    "path, content_hash, revision, parent_revision, size, last_synced_at, device_id";

impl MetaStore {
    // -- file_records -------------------------------------------------------

    /// Fetch the sync record for a path, if any.
    pub fn get(&self, path: &str) -> Result<Option<FileRecord>, StoreError> {
        let conn = self.conn();
        let record = conn
            .query_row(
                &format!("SELECT {RECORD_COLUMNS} FROM file_records WHERE path = ?1"),
                params![path],
                record_from_row,
            )
            .optional()?;
        Ok(record)
    }

    /// Merge partial fields into the record for `path`, creating one with
    /// zero defaults if absent. The row is durably written before return.
    pub fn upsert(&self, path: &str, patch: FileRecordPatch) -> Result<FileRecord, StoreError> {
        let existing = self.get(path)?;
        let base = existing.unwrap_or(FileRecord {
            path: path.to_string(),
            content_hash: String::new(),
            revision: 0,
            parent_revision: 0,
            size: 0,
            last_synced_at: DateTime::<Utc>::default(),
            device_id: String::new(),
        });

        let merged = FileRecord {
            path: base.path,
            content_hash: patch.content_hash.unwrap_or(base.content_hash),
            revision: patch.revision.unwrap_or(base.revision),
            parent_revision: patch.parent_revision.unwrap_or(base.parent_revision),
            size: patch.size.unwrap_or(base.size),
            last_synced_at: patch.last_synced_at.unwrap_or(base.last_synced_at),
            device_id: patch.device_id.unwrap_or(base.device_id),
        };

        let conn = self.conn();
        conn.execute(
            "INSERT INTO file_records
                 (path, content_hash, revision, parent_revision, size, last_synced_at, device_id)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(path) DO UPDATE SET
                 content_hash = excluded.content_hash,
                 revision = excluded.revision,
                 parent_revision = excluded.parent_revision,
                 size = excluded.size,
                 last_synced_at = excluded.last_synced_at,
                 device_id = excluded.device_id",
            params![
                merged.path,
                merged.content_hash,
                merged.revision,
                merged.parent_revision,
                merged.size,
                merged.last_synced_at.to_rfc3339(),
                merged.device_id,
            ],
        )?;
        debug!(path, revision = merged.revision, "upserted file record");
        Ok(merged)
    }

    /// Remove the record for a path. No-op if absent.
    pub fn delete(&self, path: &str) -> Result<(), StoreError> {
        let conn = self.conn();
        let affected = conn.execute("DELETE FROM file_records WHERE path = ?1", params![path])?;
        debug!(path, affected, "deleted file record");
        Ok(())
    }

    /// Move the record from `old_path` to `new_path`, preserving all other
    /// fields. No-op if `old_path` is absent.
    pub fn rename(&self, old_path: &str, new_path: &str) -> Result<(), StoreError> {
        let conn = self.conn();
        let affected = conn.execute(
            "UPDATE file_records SET path = ?2 WHERE path = ?1",
            params![old_path, new_path],
        )?;
        debug!(old_path, new_path, affected, "renamed file record");
        Ok(())
    }

    /// All records, ordered by path.
    pub fn list_records(&self) -> Result<Vec<FileRecord>, StoreError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {RECORD_COLUMNS} FROM file_records ORDER BY path"
        ))?;
        let rows = stmt.query_map([], record_from_row)?;
        let mut records = Vec::new();
        for row in rows {
            records.push(row?);
        }
        Ok(records)
    }

    /// Number of tracked paths.
    pub fn count_records(&self) -> Result<i64, StoreError> {
        let conn = self.conn();
        let count = conn.query_row("SELECT COUNT(*) FROM file_records", [], |row| row.get(0))?;
        Ok(count)
    }

    // -- conflict_log -------------------------------------------------------

    /// Persist a conflict-resolution record.
    pub fn insert_conflict(&self, record: &ConflictRecord) -> Result<(), StoreError> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO conflict_log
                 (id, path, server_revision, claimed_parent_revision, outcome, backup_path, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                record.id,
                record.path,
                record.server_revision,
                record.claimed_parent_revision,
                record.outcome.to_string(),
                record.backup_path,
                record.created_at.to_rfc3339(),
            ],
        )?;
        debug!(path = %record.path, outcome = %record.outcome, "recorded conflict");
        Ok(())
    }

    /// All recorded conflicts, newest first.
    pub fn list_conflicts(&self) -> Result<Vec<ConflictRecord>, StoreError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT id, path, server_revision, claimed_parent_revision, outcome, backup_path, created_at
             FROM conflict_log ORDER BY created_at DESC",
        )?;
        let rows = stmt.query_map([], |row| {
            let outcome: String = row.get(4)?;
            let created_at: String = row.get(6)?;
            Ok(ConflictRecord {
                id: row.get(0)?,
                path: row.get(1)?,
                server_revision: row.get(2)?,
                claimed_parent_revision: row.get(3)?,
                outcome: if outcome == "auto_merged" {
                    ConflictOutcomeKind::AutoMerged
                } else {
                    ConflictOutcomeKind::Manual
                },
                backup_path: row.get(5)?,
                created_at: DateTime::parse_from_rfc3339(&created_at)
                    .map(|dt| dt.with_timezone(&Utc))
                    .unwrap_or_default(),
            })
        })?;
        let mut records = Vec::new();
        for row in rows {
            records.push(row?);
        }
        Ok(records)
    }

    // -- kv_state -----------------------------------------------------------

    /// Set an engine-level state value.
    pub fn set_state(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO kv_state (key, value, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            params![key, value, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    /// Get an engine-level state value.
    pub fn get_state(&self, key: &str) -> Result<Option<String>, StoreError> {
        let conn = self.conn();
        let value = conn
            .query_row(
                "SELECT value FROM kv_state WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    /// The stable device identifier for this store, generated on first use.
    pub fn device_id(&self) -> Result<String, StoreError> {
        if let Some(id) = self.get_state("device_id")? {
            return Ok(id);
        }
        let id = uuid::Uuid::new_v4().to_string();
        self.set_state("device_id", &id)?;
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ConflictContext;

    fn store() -> MetaStore {
        MetaStore::in_memory().unwrap()
    }

    #[test]
    fn test_get_absent() {
        assert!(store().get("missing.md").unwrap().is_none());
    }

    #[test]
    fn test_upsert_creates_with_zero_defaults() {
        let s = store();
        let rec = s
            .upsert(
                "a.md",
                FileRecordPatch {
                    revision: Some(2),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(rec.revision, 2);
        assert_eq!(rec.parent_revision, 0);
        assert_eq!(rec.content_hash, "");
        assert_eq!(rec.size, 0);
    }

    #[test]
    fn test_upsert_merges_partial_fields() {
        let s = store();
        s.upsert(
            "a.md",
            FileRecordPatch {
                revision: Some(2),
                parent_revision: Some(2),
                content_hash: Some("abc".into()),
                ..Default::default()
            },
        )
        .unwrap();

        // A later patch touching only the size leaves the rest intact.
        let rec = s
            .upsert(
                "a.md",
                FileRecordPatch {
                    size: Some(42),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(rec.revision, 2);
        assert_eq!(rec.parent_revision, 2);
        assert_eq!(rec.content_hash, "abc");
        assert_eq!(rec.size, 42);
    }

    #[test]
    fn test_delete_is_noop_when_absent() {
        let s = store();
        s.delete("missing.md").unwrap();

        s.upsert("a.md", FileRecordPatch::default()).unwrap();
        s.delete("a.md").unwrap();
        assert!(s.get("a.md").unwrap().is_none());
    }

    #[test]
    fn test_rename_preserves_fields() {
        let s = store();
        s.upsert(
            "old.md",
            FileRecordPatch {
                revision: Some(7),
                device_id: Some("dev-1".into()),
                ..Default::default()
            },
        )
        .unwrap();

        s.rename("old.md", "new.md").unwrap();
        assert!(s.get("old.md").unwrap().is_none());
        let rec = s.get("new.md").unwrap().unwrap();
        assert_eq!(rec.revision, 7);
        assert_eq!(rec.device_id, "dev-1");

        // Renaming an absent path is a no-op.
        s.rename("missing.md", "elsewhere.md").unwrap();
        assert!(s.get("elsewhere.md").unwrap().is_none());
    }

    #[test]
    fn test_conflict_log_roundtrip() {
        let s = store();
        let ctx = ConflictContext {
            current_revision: 5,
            your_parent_revision: 3,
        };
        let mut rec = ConflictRecord::new("a.md".into(), ctx, ConflictOutcomeKind::Manual);
        rec.backup_path = Some("a (conflicted copy).md".into());
        s.insert_conflict(&rec).unwrap();

        let listed = s.list_conflicts().unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].path, "a.md");
        assert_eq!(listed[0].server_revision, 5);
        assert_eq!(listed[0].outcome, ConflictOutcomeKind::Manual);
        assert_eq!(
            listed[0].backup_path.as_deref(),
            Some("a (conflicted copy).md")
        );
    }

    #[test]
    fn test_device_id_is_stable() {
        let s = store();
        let first = s.device_id().unwrap();
        assert_eq!(first, s.device_id().unwrap());
        assert_eq!(first.len(), 36);
    }
}
