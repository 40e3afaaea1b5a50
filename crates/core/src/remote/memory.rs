//! In-process remote store.
//!
//! A mutex-guarded map of versioned files enforcing the same
//! optimistic-concurrency rules as a real server: every accepted write bumps
//! the revision, and a write claiming a stale parent revision is rejected
//! with a conflict context. Used by the integration tests and by offline
//! demos; it keeps full revision history so ancestor fetches work.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use tracing::debug;

use crate::errors::TransportError;
use crate::merge::{has_conflict_markers, Merger};
use crate::models::{content_hash, ConflictContext, RemoteContent, RemoteEntry};

use super::{DeleteOutcome, MergeVerdict, RemoteStore, UploadOutcome};

/// Full revision history of one remote file.
#[derive(Debug, Clone, Default)]
struct History {
    /// `(revision, content)` pairs in ascending revision order.
    revisions: Vec<(i64, String)>,
}

impl History {
    fn current(&self) -> Option<&(i64, String)> {
        self.revisions.last()
    }

    fn at(&self, revision: i64) -> Option<&str> {
        self.revisions
            .iter()
            .find(|(rev, _)| *rev == revision)
            .map(|(_, content)| content.as_str())
    }
}

/// In-memory [`RemoteStore`] implementation.
#[derive(Default)]
pub struct MemoryRemote {
    files: Mutex<HashMap<String, History>>,
    /// When set, `attempt_auto_merge` fails as if the service were
    /// unreachable. Lets tests exercise the manual-resolution fallback.
    merge_unavailable: AtomicBool,
}

impl MemoryRemote {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `attempt_auto_merge` fail with a transport error.
    pub fn set_merge_unavailable(&self, unavailable: bool) {
        self.merge_unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Write a file server-side, bypassing concurrency checks. Returns the
    /// new revision. This is how tests simulate edits from other devices.
    pub fn put_server_side(&self, path: &str, content: &str) -> i64 {
        let mut files = self.files.lock().unwrap();
        let history = files.entry(path.to_string()).or_default();
        let next = history.current().map_or(1, |(rev, _)| rev + 1);
        history.revisions.push((next, content.to_string()));
        next
    }

    /// Current revision of a file, if it exists.
    pub fn current_revision(&self, path: &str) -> Option<i64> {
        let files = self.files.lock().unwrap();
        files.get(path).and_then(|h| h.current().map(|(rev, _)| *rev))
    }

    /// Current content of a file, if it exists.
    pub fn current_content(&self, path: &str) -> Option<String> {
        let files = self.files.lock().unwrap();
        files
            .get(path)
            .and_then(|h| h.current().map(|(_, content)| content.clone()))
    }
}

#[async_trait]
impl RemoteStore for MemoryRemote {
    fn authenticated(&self) -> bool {
        true
    }

    async fn list_files(&self) -> Result<Vec<RemoteEntry>, TransportError> {
        let files = self.files.lock().unwrap();
        let mut entries: Vec<RemoteEntry> = files
            .iter()
            .filter_map(|(path, history)| {
                history.current().map(|(revision, content)| RemoteEntry {
                    path: path.clone(),
                    revision: *revision,
                    content_hash: content_hash(content),
                    size: content.len() as i64,
                })
            })
            .collect();
        entries.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(entries)
    }

    async fn download(
        &self,
        path: &str,
        revision: Option<i64>,
    ) -> Result<RemoteContent, TransportError> {
        let files = self.files.lock().unwrap();
        let history = files.get(path).ok_or_else(|| TransportError::NotFound {
            path: path.to_string(),
            revision: revision.unwrap_or(0),
        })?;

        let (rev, content) = match revision {
            Some(rev) => (
                rev,
                history
                    .at(rev)
                    .ok_or_else(|| TransportError::NotFound {
                        path: path.to_string(),
                        revision: rev,
                    })?
                    .to_string(),
            ),
            None => {
                let (rev, content) = history.current().ok_or_else(|| TransportError::NotFound {
                    path: path.to_string(),
                    revision: 0,
                })?;
                (*rev, content.clone())
            }
        };

        Ok(RemoteContent {
            entry: RemoteEntry {
                path: path.to_string(),
                revision: rev,
                content_hash: content_hash(&content),
                size: content.len() as i64,
            },
            content,
        })
    }

    async fn upload(
        &self,
        path: &str,
        content: &str,
        parent_revision: i64,
        _device_id: &str,
    ) -> Result<UploadOutcome, TransportError> {
        let mut files = self.files.lock().unwrap();
        let history = files.entry(path.to_string()).or_default();
        let current = history.current().map_or(0, |(rev, _)| *rev);

        if parent_revision != current {
            debug!(
                path,
                current, claimed = parent_revision, "rejecting stale upload"
            );
            return Ok(UploadOutcome::Conflict(ConflictContext {
                current_revision: current,
                your_parent_revision: parent_revision,
            }));
        }

        let revision = current + 1;
        history.revisions.push((revision, content.to_string()));
        Ok(UploadOutcome::Accepted {
            revision,
            content_hash: content_hash(content),
        })
    }

    async fn delete(
        &self,
        path: &str,
        parent_revision: i64,
        _device_id: &str,
    ) -> Result<DeleteOutcome, TransportError> {
        let mut files = self.files.lock().unwrap();
        let Some(history) = files.get(path) else {
            return Ok(DeleteOutcome::Deleted);
        };
        let current = history.current().map_or(0, |(rev, _)| *rev);
        files.remove(path);

        if parent_revision != current {
            Ok(DeleteOutcome::DeletedWithConflict)
        } else {
            Ok(DeleteOutcome::Deleted)
        }
    }

    async fn attempt_auto_merge(
        &self,
        path: &str,
        our_content: &str,
        ancestor_revision: i64,
        their_revision: i64,
    ) -> Result<MergeVerdict, TransportError> {
        if self.merge_unavailable.load(Ordering::SeqCst) {
            return Err(TransportError::ProtocolError(
                "merge service unavailable".into(),
            ));
        }

        let files = self.files.lock().unwrap();
        let history = files.get(path).ok_or_else(|| TransportError::NotFound {
            path: path.to_string(),
            revision: their_revision,
        })?;
        let Some(ancestor) = history.at(ancestor_revision) else {
            // No ancestor available: the service cannot merge.
            return Ok(MergeVerdict {
                clean: false,
                merged: None,
            });
        };
        let theirs = history
            .at(their_revision)
            .ok_or_else(|| TransportError::NotFound {
                path: path.to_string(),
                revision: their_revision,
            })?;

        let result = Merger::three_way_merge(ancestor, our_content, theirs);
        if result.has_conflicts || has_conflict_markers(&result.merged_content) {
            return Ok(MergeVerdict {
                clean: false,
                merged: None,
            });
        }
        Ok(MergeVerdict {
            clean: true,
            merged: Some(result.merged_content),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_upload_assigns_monotonic_revisions() {
        let remote = MemoryRemote::new();
        let first = remote.upload("a.md", "one", 0, "dev").await.unwrap();
        let UploadOutcome::Accepted { revision: r1, .. } = first else {
            panic!("expected accept");
        };
        assert_eq!(r1, 1);

        let second = remote.upload("a.md", "two", 1, "dev").await.unwrap();
        let UploadOutcome::Accepted { revision: r2, .. } = second else {
            panic!("expected accept");
        };
        assert_eq!(r2, 2);
    }

    #[tokio::test]
    async fn test_stale_upload_is_rejected_with_context() {
        let remote = MemoryRemote::new();
        remote.put_server_side("a.md", "one");
        remote.put_server_side("a.md", "two");

        let outcome = remote.upload("a.md", "mine", 1, "dev").await.unwrap();
        assert_eq!(
            outcome,
            UploadOutcome::Conflict(ConflictContext {
                current_revision: 2,
                your_parent_revision: 1,
            })
        );
    }

    #[tokio::test]
    async fn test_download_specific_revision() {
        let remote = MemoryRemote::new();
        remote.put_server_side("a.md", "one");
        remote.put_server_side("a.md", "two");

        let old = remote.download("a.md", Some(1)).await.unwrap();
        assert_eq!(old.content, "one");
        let latest = remote.download("a.md", None).await.unwrap();
        assert_eq!(latest.content, "two");
        assert_eq!(latest.entry.revision, 2);

        assert!(remote.download("a.md", Some(9)).await.is_err());
    }

    #[tokio::test]
    async fn test_delete_reports_conflict_but_deletes() {
        let remote = MemoryRemote::new();
        remote.put_server_side("a.md", "one");
        remote.put_server_side("a.md", "two");

        let outcome = remote.delete("a.md", 1, "dev").await.unwrap();
        assert_eq!(outcome, DeleteOutcome::DeletedWithConflict);
        assert!(remote.current_revision("a.md").is_none());
    }

    #[tokio::test]
    async fn test_merge_unavailable_errors() {
        let remote = MemoryRemote::new();
        remote.put_server_side("a.md", "base");
        remote.set_merge_unavailable(true);
        assert!(remote.attempt_auto_merge("a.md", "x", 1, 1).await.is_err());
    }
}
