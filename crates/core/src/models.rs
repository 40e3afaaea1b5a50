//! Domain model types used throughout VaultSync.
//!
//! These types bridge the reconciliation engine, the metadata store, and the
//! remote transport.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

// ---------------------------------------------------------------------------
// File sync record
// ---------------------------------------------------------------------------

/// Per-path sync state, owned exclusively by the metadata store.
///
/// `parent_revision` is the revision this local copy was based on when it
/// was last uploaded or downloaded: the merge base for the *next* conflict,
/// never a description of the current server state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileRecord {
    /// Unique key, stable identity of a file within the tree.
    pub path: String,
    /// Hex SHA-256 of the content at last successful sync.
    pub content_hash: String,
    /// Revision last confirmed from the remote store.
    pub revision: i64,
    /// Revision this copy was based on at last upload/download.
    pub parent_revision: i64,
    /// Byte size at last sync, informational.
    pub size: i64,
    /// Timestamp of the last sync-attributable write (local or remote).
    pub last_synced_at: DateTime<Utc>,
    /// Device that performed the last sync action on this record.
    pub device_id: String,
}

/// Partial update for a [`FileRecord`], merged into the existing row by
/// `MetaStore::upsert`. Absent fields are left unchanged (or zero-defaulted
/// when the record is being created).
#[derive(Debug, Clone, Default)]
pub struct FileRecordPatch {
    pub content_hash: Option<String>,
    pub revision: Option<i64>,
    pub parent_revision: Option<i64>,
    pub size: Option<i64>,
    pub last_synced_at: Option<DateTime<Utc>>,
    pub device_id: Option<String>,
}

// ---------------------------------------------------------------------------
// Remote snapshot
// ---------------------------------------------------------------------------

/// One entry in a point-in-time remote directory snapshot.
///
/// Ephemeral: rebuilt at the start of every reconciliation pass and never
/// persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteEntry {
    pub path: String,
    pub revision: i64,
    pub content_hash: String,
    pub size: i64,
}

/// A downloaded remote file: its snapshot entry plus content.
#[derive(Debug, Clone)]
pub struct RemoteContent {
    pub entry: RemoteEntry,
    pub content: String,
}

// ---------------------------------------------------------------------------
// Conflict context
// ---------------------------------------------------------------------------

/// Produced by an upload rejected for a stale parent revision.
///
/// Used only within one conflict-resolution attempt; never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictContext {
    /// The server's authoritative revision at rejection time.
    pub current_revision: i64,
    /// The revision the rejected upload claimed as its base.
    pub your_parent_revision: i64,
}

// ---------------------------------------------------------------------------
// Sync summary
// ---------------------------------------------------------------------------

/// Statistics from a single reconciliation pass.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncSummary {
    pub downloaded: usize,
    pub uploaded: usize,
    pub failed: usize,
    pub conflicts_resolved: usize,
    pub conflicts_manual: usize,
    pub started_at: String,
    pub completed_at: Option<String>,
}

impl SyncSummary {
    /// `true` if the pass neither transferred anything nor hit a failure.
    pub fn is_noop(&self) -> bool {
        self.downloaded == 0
            && self.uploaded == 0
            && self.failed == 0
            && self.conflicts_resolved == 0
            && self.conflicts_manual == 0
    }
}

// ---------------------------------------------------------------------------
// Conflict record (sidecar audit artifact)
// ---------------------------------------------------------------------------

/// How a conflict ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictOutcomeKind {
    /// The three-way merge was clean and the merged content was re-uploaded.
    AutoMerged,
    /// Both versions were written into a marked document; the server version
    /// was preserved in a backup file for manual resolution.
    Manual,
}

impl std::fmt::Display for ConflictOutcomeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AutoMerged => write!(f, "auto_merged"),
            Self::Manual => write!(f, "manual"),
        }
    }
}

/// Persisted record of one conflict-resolution attempt.
///
/// This is the structured sidecar next to the human-readable marked file:
/// both versions stay recoverable and the backup path is discoverable even
/// if the marked file is edited.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConflictRecord {
    pub id: String,
    pub path: String,
    pub server_revision: i64,
    pub claimed_parent_revision: i64,
    pub outcome: ConflictOutcomeKind,
    /// Path of the backup holding the server's version (manual only).
    pub backup_path: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl ConflictRecord {
    pub fn new(path: String, ctx: ConflictContext, outcome: ConflictOutcomeKind) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            path,
            server_revision: ctx.current_revision,
            claimed_parent_revision: ctx.your_parent_revision,
            outcome,
            backup_path: None,
            created_at: Utc::now(),
        }
    }
}

// ---------------------------------------------------------------------------
// Content hashing
// ---------------------------------------------------------------------------

/// Hex SHA-256 fingerprint of file content.
pub fn content_hash(content: &str) -> String {
    hex::encode(Sha256::digest(content.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_hash_is_stable_hex() {
        let h = content_hash("hello\n");
        assert_eq!(h.len(), 64);
        assert_eq!(h, content_hash("hello\n"));
        assert_ne!(h, content_hash("hello"));
    }

    #[test]
    fn test_summary_noop() {
        let mut s = SyncSummary::default();
        assert!(s.is_noop());
        s.downloaded = 1;
        assert!(!s.is_noop());
    }

    #[test]
    fn test_conflict_record_carries_context() {
        let ctx = ConflictContext {
            current_revision: 5,
            your_parent_revision: 3,
        };
        let rec = ConflictRecord::new("a.md".into(), ctx, ConflictOutcomeKind::Manual);
        assert_eq!(rec.server_revision, 5);
        assert_eq!(rec.claimed_parent_revision, 3);
        assert_eq!(rec.outcome.to_string(), "manual");
    }
}
