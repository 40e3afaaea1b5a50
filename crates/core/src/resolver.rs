//! Conflict resolution for rejected uploads.
//!
//! Invoked exactly when an upload comes back with a [`ConflictContext`].
//! Every invocation ends in one of two terminal outcomes:
//!
//! - **Auto-merged**: the merge service combined both edits cleanly; the
//!   merged content is written locally and re-uploaded claiming the
//!   server's revision as its parent, which is how `parent_revision`
//!   advances past the conflict.
//! - **Manual fallback**: the server's version is preserved in a backup
//!   file, the local file is overwritten with a marked document carrying
//!   both versions, and the metadata record is left untouched so the file
//!   stays dirty until the user resolves it and it is re-uploaded.
//!
//! Any network failure during the merge attempt downgrades directly to the
//! manual fallback; the resolver never leaves a conflict half-done.

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::errors::ConflictError;
use crate::merge::has_conflict_markers;
use crate::models::{ConflictContext, ConflictOutcomeKind, ConflictRecord, FileRecordPatch};
use crate::remote::{RemoteStore, UploadOutcome};
use crate::store::MetaStore;
use crate::vfs::FileTree;

/// Conflict delimiters written into the manual-resolution document.
const LOCAL_MARKER: &str = "<<<<<<< local (this device)";
const SEPARATOR: &str = "=======";

/// Terminal outcome of a conflict-resolution attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum ConflictOutcome {
    /// The merge was clean and the merged content was accepted by the
    /// server at `revision`.
    AutoMerged { revision: i64 },
    /// Both versions were written into the local file for manual
    /// resolution; the server's version lives at `backup_path`.
    ManualFallback { backup_path: String },
}

/// Resolves one upload conflict at a time, borrowing the engine's
/// collaborators.
pub struct ConflictResolver<'a, R: RemoteStore, T: FileTree> {
    remote: &'a R,
    tree: &'a T,
    store: &'a MetaStore,
    device_id: &'a str,
}

impl<'a, R: RemoteStore, T: FileTree> ConflictResolver<'a, R, T> {
    pub fn new(remote: &'a R, tree: &'a T, store: &'a MetaStore, device_id: &'a str) -> Self {
        Self {
            remote,
            tree,
            store,
            device_id,
        }
    }

    /// Resolve a rejected upload of `path` whose local content is
    /// `local_content`.
    pub async fn resolve(
        &self,
        path: &str,
        local_content: &str,
        ctx: ConflictContext,
    ) -> Result<ConflictOutcome, ConflictError> {
        info!(
            path,
            current = ctx.current_revision,
            claimed = ctx.your_parent_revision,
            "resolving upload conflict"
        );

        // Without an ancestor there is no merge base; go straight to the
        // manual fallback.
        if ctx.your_parent_revision > 0 {
            match self
                .remote
                .attempt_auto_merge(
                    path,
                    local_content,
                    ctx.your_parent_revision,
                    ctx.current_revision,
                )
                .await
            {
                Ok(verdict) if verdict.clean => {
                    let merged = verdict.merged.unwrap_or_default();
                    if !merged.is_empty() && !has_conflict_markers(&merged) {
                        match self.commit_merged(path, &merged, ctx).await {
                            Ok(outcome) => return Ok(outcome),
                            Err(RecommitFailure::Conflict(new_ctx)) => {
                                // The server moved on while we merged; the
                                // local file now holds the merged content.
                                return self.manual_fallback(path, &merged, new_ctx).await;
                            }
                            Err(RecommitFailure::Fatal(e)) => return Err(e),
                            Err(RecommitFailure::Transport(detail)) => {
                                warn!(path, detail = %detail, "merged re-upload failed, falling back");
                                return self.manual_fallback(path, &merged, ctx).await;
                            }
                        }
                    }
                    debug!(path, "merge verdict unusable, falling back to manual");
                }
                Ok(_) => {
                    debug!(path, "merge service reported residual conflict");
                }
                Err(e) => {
                    warn!(path, error = %e, "merge attempt failed, falling back to manual");
                }
            }
        } else {
            debug!(path, "no ancestor revision, skipping merge attempt");
        }

        self.manual_fallback(path, local_content, ctx).await
    }

    /// Write merged content locally and re-upload it claiming the server's
    /// revision as parent.
    async fn commit_merged(
        &self,
        path: &str,
        merged: &str,
        ctx: ConflictContext,
    ) -> Result<ConflictOutcome, RecommitFailure> {
        self.tree
            .modify(path, merged)
            .map_err(|source| {
                RecommitFailure::Fatal(ConflictError::WriteFailed {
                    path: path.to_string(),
                    source,
                })
            })?;

        let outcome = self
            .remote
            .upload(path, merged, ctx.current_revision, self.device_id)
            .await
            .map_err(|e| RecommitFailure::Transport(e.to_string()))?;

        match outcome {
            UploadOutcome::Accepted {
                revision,
                content_hash: hash,
            } => {
                self.store
                    .upsert(
                        path,
                        FileRecordPatch {
                            content_hash: Some(hash),
                            revision: Some(revision),
                            parent_revision: Some(revision),
                            size: Some(merged.len() as i64),
                            last_synced_at: Some(Utc::now()),
                            device_id: Some(self.device_id.to_string()),
                        },
                    )
                    .map_err(|e| RecommitFailure::Fatal(e.into()))?;

                let record =
                    ConflictRecord::new(path.to_string(), ctx, ConflictOutcomeKind::AutoMerged);
                if let Err(e) = self.store.insert_conflict(&record) {
                    warn!(path, error = %e, "could not record auto-merged conflict");
                }

                info!(path, revision, "conflict auto-merged and re-uploaded");
                Ok(ConflictOutcome::AutoMerged { revision })
            }
            UploadOutcome::Conflict(new_ctx) => Err(RecommitFailure::Conflict(new_ctx)),
        }
    }

    /// Preserve the server's version in a backup file and overwrite the
    /// local file with a marked document embedding both versions.
    async fn manual_fallback(
        &self,
        path: &str,
        local_content: &str,
        ctx: ConflictContext,
    ) -> Result<ConflictOutcome, ConflictError> {
        let server = self
            .remote
            .download(path, Some(ctx.current_revision))
            .await
            .map_err(|e| ConflictError::ServerContentUnavailable {
                path: path.to_string(),
                detail: e.to_string(),
            })?;

        let backup_path = self.write_backup(path, &server.content)?;

        let document = render_conflict_document(
            local_content,
            &server.content,
            ctx.current_revision,
            &backup_path,
        );
        self.tree
            .modify(path, &document)
            .map_err(|source| ConflictError::WriteFailed {
                path: path.to_string(),
                source,
            })?;

        let mut record = ConflictRecord::new(path.to_string(), ctx, ConflictOutcomeKind::Manual);
        record.backup_path = Some(backup_path.clone());
        self.store.insert_conflict(&record)?;

        // The metadata record is deliberately untouched: the file stays
        // dirty until the user resolves it and the normal upload path runs.
        info!(path, backup = %backup_path, "conflict written out for manual resolution");
        Ok(ConflictOutcome::ManualFallback { backup_path })
    }

    fn write_backup(&self, path: &str, server_content: &str) -> Result<String, ConflictError> {
        let timestamp = Utc::now().format("%Y%m%d-%H%M%S%.3f").to_string();
        let preferred = conflicted_copy_name(path, &timestamp);

        match self.tree.create(&preferred, server_content) {
            Ok(()) => Ok(preferred),
            Err(first) => {
                // One retry with a flattened name, for collisions and paths
                // whose directory part cannot be materialized.
                let fallback = format!("conflict-{}-{timestamp}.txt", path.replace('/', "_"));
                warn!(
                    path,
                    preferred = %preferred,
                    error = %first,
                    fallback = %fallback,
                    "backup creation failed, retrying with flattened name"
                );
                self.tree
                    .create(&fallback, server_content)
                    .map_err(|e| ConflictError::BackupFailed {
                        path: path.to_string(),
                        detail: e.to_string(),
                    })?;
                Ok(fallback)
            }
        }
    }
}

/// Failure modes of the merged re-upload, internal to the resolver.
enum RecommitFailure {
    /// The server rejected even the merged content.
    Conflict(ConflictContext),
    /// Transport failure; downgrade to manual.
    Transport(String),
    /// Local write or store failure that the fallback cannot fix either.
    Fatal(ConflictError),
}

/// `dir/stem (conflicted copy <timestamp>).ext`, preserving the directory.
fn conflicted_copy_name(path: &str, timestamp: &str) -> String {
    let (dir, file) = match path.rfind('/') {
        Some(idx) => (&path[..=idx], &path[idx + 1..]),
        None => ("", path),
    };
    let (stem, ext) = match file.rfind('.') {
        Some(idx) if idx > 0 => (&file[..idx], &file[idx..]),
        _ => (file, ""),
    };
    format!("{dir}{stem} (conflicted copy {timestamp}){ext}")
}

/// Render the manual-resolution document: both versions between explicit
/// delimiters, plus a trailing line naming the backup file.
fn render_conflict_document(
    local: &str,
    server: &str,
    server_revision: i64,
    backup_path: &str,
) -> String {
    format!(
        "{LOCAL_MARKER}\n{local}\n{SEPARATOR}\n{server}\n>>>>>>> remote (revision {server_revision})\n\n[vaultsync: server version preserved at {backup_path}]\n"
    )
}

/// `true` if `content` looks like an unresolved manual-resolution document.
pub fn is_unresolved_conflict_document(content: &str) -> bool {
    has_conflict_markers(content)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conflicted_copy_name_preserves_directory_and_extension() {
        assert_eq!(
            conflicted_copy_name("notes/a.md", "20260101-000000.000"),
            "notes/a (conflicted copy 20260101-000000.000).md"
        );
        assert_eq!(
            conflicted_copy_name("plain", "t"),
            "plain (conflicted copy t)"
        );
        assert_eq!(
            conflicted_copy_name(".hidden", "t"),
            ".hidden (conflicted copy t)"
        );
    }

    #[test]
    fn test_render_conflict_document() {
        let doc = render_conflict_document("mine", "theirs", 5, "a (conflicted copy x).md");
        assert!(doc.contains(LOCAL_MARKER));
        assert!(doc.contains("mine"));
        assert!(doc.contains("theirs"));
        assert!(doc.contains(">>>>>>> remote (revision 5)"));
        assert!(doc.contains("a (conflicted copy x).md"));
        assert!(is_unresolved_conflict_document(&doc));
    }
}
