//! The reconciliation engine.
//!
//! [`SyncEngine`] orchestrates a full sync pass:
//!
//! 1. Fetch the remote directory snapshot (failure aborts the pass with no
//!    mutation).
//! 2. **Downward phase**: download every remote file that is new locally or
//!    ahead of the stored revision.
//! 3. **Upward phase**: upload every policy-eligible local file modified
//!    since its last sync, claiming the stored revision as parent.
//! 4. Route rejected uploads through the conflict resolver.
//! 5. Report a [`SyncSummary`]; per-file failures never abort the pass.
//!
//! Downward runs to completion before upward begins, so a file downloaded
//! in the same pass carries a fresh `last_synced_at` and is not immediately
//! re-uploaded. An atomic in-flight flag rejects concurrent passes, and a
//! cancellation flag is honored at each per-file iteration boundary (never
//! mid-transfer).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::errors::{SyncError, TransportError};
use crate::models::{FileRecordPatch, RemoteEntry, SyncSummary};
use crate::notify::Notifier;
use crate::policy::SyncPolicy;
use crate::remote::{DeleteOutcome, RemoteStore, UploadOutcome};
use crate::resolver::{is_unresolved_conflict_document, ConflictOutcome, ConflictResolver};
use crate::store::MetaStore;
use crate::vfs::FileTree;

/// Result of a single-file upload, after any conflict handling.
#[derive(Debug, Clone, PartialEq)]
pub enum UploadResult {
    /// The server accepted the content at this revision.
    Uploaded { revision: i64 },
    /// A conflict was auto-merged and the merged content accepted.
    Merged { revision: i64 },
    /// A conflict was written out for manual resolution.
    Manual { backup_path: String },
    /// The file still carries conflict markers from an earlier manual
    /// fallback; nothing was sent.
    PendingResolution,
}

/// The reconciliation engine.
pub struct SyncEngine<R: RemoteStore, T: FileTree> {
    store: Arc<MetaStore>,
    remote: R,
    tree: T,
    policy: SyncPolicy,
    notifier: Arc<Notifier>,
    device_id: String,
    network_timeout: Duration,
    /// Atomic flag preventing concurrent reconciliation passes.
    running: Arc<AtomicBool>,
    /// Cooperative cancellation, checked at per-file boundaries.
    cancelled: Arc<AtomicBool>,
}

impl<R: RemoteStore, T: FileTree> SyncEngine<R, T> {
    pub fn new(
        store: Arc<MetaStore>,
        remote: R,
        tree: T,
        policy: SyncPolicy,
        notifier: Arc<Notifier>,
        device_id: String,
        network_timeout: Duration,
    ) -> Self {
        info!(device_id = %device_id, "initializing sync engine");
        Self {
            store,
            remote,
            tree,
            policy,
            notifier,
            device_id,
            network_timeout,
            running: Arc::new(AtomicBool::new(false)),
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Reference to the metadata store.
    pub fn store(&self) -> &MetaStore {
        &self.store
    }

    /// `true` if a reconciliation pass is currently running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Request cancellation of the in-flight pass. Takes effect at the next
    /// per-file iteration boundary.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    fn check_cancelled(&self) -> Result<(), SyncError> {
        if self.cancelled.load(Ordering::SeqCst) {
            Err(SyncError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Run a remote call under the configured per-call timeout.
    async fn with_timeout<F, O>(&self, fut: F) -> Result<O, TransportError>
    where
        F: std::future::Future<Output = Result<O, TransportError>>,
    {
        match timeout(self.network_timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(TransportError::Timeout(self.network_timeout.as_secs())),
        }
    }

    // -----------------------------------------------------------------------
    // Full reconciliation pass
    // -----------------------------------------------------------------------

    /// Execute one full reconciliation pass.
    ///
    /// Returns the pass summary, or an error for pass-scoped failures (a
    /// concurrent pass in flight, a missing credential, or an unobtainable
    /// remote snapshot), all of which occur before any mutation. Per-file
    /// failures are counted in the summary and never abort the pass.
    ///
    /// The in-flight flag is released via a drop guard, so it is freed even
    /// if the pass panics.
    pub async fn reconcile(&self, silent: bool) -> Result<SyncSummary, SyncError> {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("reconciliation already in progress, rejecting");
            return Err(SyncError::AlreadyRunning {
                started_at: self
                    .store
                    .get_state("last_pass_started_at")
                    .ok()
                    .flatten()
                    .unwrap_or_else(|| "unknown".into()),
            });
        }
        let _guard = PassGuard(self.running.clone());
        self.cancelled.store(false, Ordering::SeqCst);

        if !self.remote.authenticated() {
            if !silent {
                self.notifier
                    .sync_error(None, "reconcile", "remote store is not authenticated")
                    .await;
            }
            return Err(SyncError::NotAuthenticated);
        }

        let mut summary = SyncSummary {
            started_at: Utc::now().to_rfc3339(),
            ..Default::default()
        };
        let _ = self
            .store
            .set_state("last_pass_started_at", &summary.started_at);
        if !silent {
            self.notifier.sync_started().await;
        }

        // 1. Remote snapshot. Failure aborts the pass with no mutation.
        let snapshot = match self.with_timeout(self.remote.list_files()).await {
            Ok(entries) => entries,
            Err(e) => {
                if !silent {
                    self.notifier
                        .sync_error(None, "snapshot", &e.to_string())
                        .await;
                }
                return Err(SyncError::SnapshotFailed(e));
            }
        };
        debug!(count = snapshot.len(), "remote snapshot fetched");

        // 2. Downward phase: remote -> local.
        self.sync_downward(&snapshot, &mut summary, silent).await?;

        // 3. Upward phase: local -> remote.
        self.sync_upward(&mut summary, silent).await?;

        summary.completed_at = Some(Utc::now().to_rfc3339());
        let _ = self
            .store
            .set_state("last_pass_completed_at", summary.completed_at.as_deref().unwrap_or(""));

        info!(
            downloaded = summary.downloaded,
            uploaded = summary.uploaded,
            failed = summary.failed,
            "reconciliation pass completed"
        );
        if !silent {
            self.notifier.sync_completed(&summary).await;
        }
        Ok(summary)
    }

    // -----------------------------------------------------------------------
    // Downward phase
    // -----------------------------------------------------------------------

    async fn sync_downward(
        &self,
        snapshot: &[RemoteEntry],
        summary: &mut SyncSummary,
        silent: bool,
    ) -> Result<(), SyncError> {
        for entry in snapshot {
            self.check_cancelled()?;

            let local_revision = self
                .store
                .get(&entry.path)?
                .map(|record| record.revision)
                .unwrap_or(0);

            // Strict '>' keeps the phase idempotent: equal revisions are
            // already synchronized regardless of content hash, and the
            // local copy never regresses to an older revision.
            if entry.revision <= local_revision {
                continue;
            }

            match self.download_entry(&entry.path, Some(entry.revision)).await {
                Ok(()) => summary.downloaded += 1,
                Err(e) => {
                    warn!(path = %entry.path, error = %e, "download failed");
                    summary.failed += 1;
                    if !silent {
                        self.notifier
                            .sync_error(Some(&entry.path), "download", &e.to_string())
                            .await;
                    }
                }
            }
        }
        Ok(())
    }

    /// Download one file and commit its metadata after the local write.
    async fn download_entry(&self, path: &str, revision: Option<i64>) -> Result<(), SyncError> {
        let remote_file = self
            .with_timeout(self.remote.download(path, revision))
            .await?;

        self.tree.modify(path, &remote_file.content)?;

        // Metadata commits only after the content write succeeded, and its
        // fresh last_synced_at excludes the file from immediate re-upload.
        self.store.upsert(
            path,
            FileRecordPatch {
                content_hash: Some(remote_file.entry.content_hash.clone()),
                revision: Some(remote_file.entry.revision),
                parent_revision: Some(remote_file.entry.revision),
                size: Some(remote_file.entry.size),
                last_synced_at: Some(Utc::now()),
                device_id: Some(self.device_id.clone()),
            },
        )?;
        debug!(path, revision = remote_file.entry.revision, "downloaded");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Upward phase
    // -----------------------------------------------------------------------

    async fn sync_upward(&self, summary: &mut SyncSummary, silent: bool) -> Result<(), SyncError> {
        let entries = self.tree.list()?;

        for entry in entries {
            self.check_cancelled()?;

            let decision = self
                .policy
                .evaluate(&entry.path, &entry.extension, entry.size);
            if !decision.should_upload() {
                debug!(path = %entry.path, decision = decision.label(), "skipping upload");
                continue;
            }

            let record = self.store.get(&entry.path)?;
            let needs_upload = match &record {
                None => true,
                Some(record) => entry.modified_at > record.last_synced_at,
            };
            if !needs_upload {
                continue;
            }

            match self.upload_path(&entry.path).await {
                Ok(UploadResult::Uploaded { .. }) => summary.uploaded += 1,
                Ok(UploadResult::Merged { .. }) => {
                    summary.uploaded += 1;
                    summary.conflicts_resolved += 1;
                }
                Ok(UploadResult::Manual { backup_path }) => {
                    summary.conflicts_manual += 1;
                    if !silent {
                        self.notifier.conflict(&entry.path, &backup_path).await;
                    }
                }
                // Already reported when the conflict was first written out.
                Ok(UploadResult::PendingResolution) => {}
                Err(e) => {
                    warn!(path = %entry.path, error = %e, "upload failed");
                    summary.failed += 1;
                    if !silent {
                        self.notifier
                            .sync_error(Some(&entry.path), "upload", &e.to_string())
                            .await;
                    }
                }
            }
        }
        Ok(())
    }

    /// Upload one file, claiming the stored revision (or 0) as parent, and
    /// route a rejection through the conflict resolver.
    async fn upload_path(&self, path: &str) -> Result<UploadResult, SyncError> {
        let content = self.tree.read(path)?;

        // A marked conflict document from an earlier manual fallback must
        // not go up as a resolved version; it would re-conflict and mint a
        // fresh backup on every attempt.
        if is_unresolved_conflict_document(&content) {
            warn!(path, "conflict markers still present, skipping upload");
            return Ok(UploadResult::PendingResolution);
        }

        let parent_revision = self
            .store
            .get(path)?
            .map(|record| record.revision)
            .unwrap_or(0);

        let outcome = self
            .with_timeout(
                self.remote
                    .upload(path, &content, parent_revision, &self.device_id),
            )
            .await?;

        match outcome {
            UploadOutcome::Accepted {
                revision,
                content_hash,
            } => {
                // The just-accepted state becomes the next merge base.
                self.store.upsert(
                    path,
                    FileRecordPatch {
                        content_hash: Some(content_hash),
                        revision: Some(revision),
                        parent_revision: Some(revision),
                        size: Some(content.len() as i64),
                        last_synced_at: Some(Utc::now()),
                        device_id: Some(self.device_id.clone()),
                    },
                )?;
                debug!(path, revision, "upload accepted");
                Ok(UploadResult::Uploaded { revision })
            }
            UploadOutcome::Conflict(ctx) => {
                let resolver =
                    ConflictResolver::new(&self.remote, &self.tree, &self.store, &self.device_id);
                match resolver.resolve(path, &content, ctx).await {
                    Ok(ConflictOutcome::AutoMerged { revision }) => {
                        Ok(UploadResult::Merged { revision })
                    }
                    Ok(ConflictOutcome::ManualFallback { backup_path }) => {
                        Ok(UploadResult::Manual { backup_path })
                    }
                    Err(e) => {
                        warn!(path, error = %e, "conflict resolution failed");
                        Err(SyncError::ConflictError(e))
                    }
                }
            }
        }
    }

    // -----------------------------------------------------------------------
    // Single-file operations (for watcher-driven hosts)
    // -----------------------------------------------------------------------

    /// Upload a single file now, following the same per-file rules as a
    /// full pass (including conflict handling).
    pub async fn upload_file(&self, path: &str) -> Result<UploadResult, SyncError> {
        self.upload_path(path).await
    }

    /// Download a single file now, at a specific revision or the latest.
    pub async fn download_file(&self, path: &str, revision: Option<i64>) -> Result<(), SyncError> {
        self.download_entry(path, revision).await
    }

    /// Delete a file remotely, claiming the locally known parent revision.
    ///
    /// A delete conflict (the remote changed after the claimed parent) is
    /// downgraded to a warning, since the last delete wins, and the local
    /// metadata record is removed unconditionally, even if the request
    /// failed.
    pub async fn delete_file(&self, path: &str) -> Result<(), SyncError> {
        let parent_revision = self
            .store
            .get(path)?
            .map(|record| record.revision)
            .unwrap_or(0);

        let result = self
            .with_timeout(
                self.remote
                    .delete(path, parent_revision, &self.device_id),
            )
            .await;

        self.store.delete(path)?;

        match result {
            Ok(DeleteOutcome::Deleted) => {
                debug!(path, "remote delete confirmed");
                Ok(())
            }
            Ok(DeleteOutcome::DeletedWithConflict) => {
                warn!(path, "delete conflicted with a newer remote edit, deletion wins");
                self.notifier
                    .sync_error(
                        Some(path),
                        "delete",
                        "remote was modified after the claimed parent revision",
                    )
                    .await;
                Ok(())
            }
            Err(e) => Err(SyncError::TransportError(e)),
        }
    }

    /// Move the metadata record for a renamed file. The host performs the
    /// actual file rename; this keeps the store keyed by the new path.
    pub fn rename_file(&self, old_path: &str, new_path: &str) -> Result<(), SyncError> {
        self.store.rename(old_path, new_path)?;
        debug!(old_path, new_path, "metadata record renamed");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Pass lock RAII guard
// ---------------------------------------------------------------------------

/// Drop guard that resets the in-flight flag, even if the pass panics.
struct PassGuard(Arc<AtomicBool>);

impl Drop for PassGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pass_guard_releases_flag() {
        let flag = Arc::new(AtomicBool::new(true));
        {
            let _guard = PassGuard(flag.clone());
        }
        assert!(!flag.load(Ordering::SeqCst));
    }
}
