//! Remote store transport abstraction.
//!
//! The engine talks to the remote through the [`RemoteStore`] trait, which
//! encodes the optimistic-concurrency protocol: every write carries the
//! parent revision the client believes is current, and the server either
//! accepts it (assigning a new revision) or rejects it with a
//! [`ConflictContext`]. A rejection is an expected outcome, not a transport
//! error.

pub mod http;
pub mod memory;

use std::sync::Arc;

use async_trait::async_trait;

use crate::errors::TransportError;
use crate::models::{ConflictContext, RemoteContent, RemoteEntry};

pub use http::HttpRemote;
pub use memory::MemoryRemote;

/// Outcome of an upload attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum UploadOutcome {
    /// The server accepted the write and assigned a new revision.
    Accepted { revision: i64, content_hash: String },
    /// The server rejected the write: its current revision differs from
    /// the claimed parent revision.
    Conflict(ConflictContext),
}

/// Outcome of a delete request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    /// The file was deleted.
    Deleted,
    /// The file was deleted, but the remote had been modified after the
    /// claimed parent revision (last-delete-wins).
    DeletedWithConflict,
}

/// Verdict from the auto-merge service.
#[derive(Debug, Clone, PartialEq)]
pub struct MergeVerdict {
    /// `true` if the merge completed without residual conflicts.
    pub clean: bool,
    /// The merged content, present when `clean`.
    pub merged: Option<String>,
}

/// Contract for the remote sync transport.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// `true` if a credential is configured. The engine short-circuits a
    /// pass before any network call when this is `false`.
    fn authenticated(&self) -> bool;

    /// Fetch a point-in-time listing of all remote files.
    async fn list_files(&self) -> Result<Vec<RemoteEntry>, TransportError>;

    /// Download a file's content, at a specific revision or the latest.
    async fn download(
        &self,
        path: &str,
        revision: Option<i64>,
    ) -> Result<RemoteContent, TransportError>;

    /// Upload content, claiming `parent_revision` as the base.
    async fn upload(
        &self,
        path: &str,
        content: &str,
        parent_revision: i64,
        device_id: &str,
    ) -> Result<UploadOutcome, TransportError>;

    /// Delete a file, claiming `parent_revision` as the base.
    async fn delete(
        &self,
        path: &str,
        parent_revision: i64,
        device_id: &str,
    ) -> Result<DeleteOutcome, TransportError>;

    /// Ask the merge service to combine the local content with the server's
    /// revision, using the given ancestor revision as the merge base.
    async fn attempt_auto_merge(
        &self,
        path: &str,
        our_content: &str,
        ancestor_revision: i64,
        their_revision: i64,
    ) -> Result<MergeVerdict, TransportError>;
}

// Lets hosts hand the engine a shared remote while keeping their own handle.
#[async_trait]
impl<R: RemoteStore + ?Sized> RemoteStore for Arc<R> {
    fn authenticated(&self) -> bool {
        (**self).authenticated()
    }

    async fn list_files(&self) -> Result<Vec<RemoteEntry>, TransportError> {
        (**self).list_files().await
    }

    async fn download(
        &self,
        path: &str,
        revision: Option<i64>,
    ) -> Result<RemoteContent, TransportError> {
        (**self).download(path, revision).await
    }

    async fn upload(
        &self,
        path: &str,
        content: &str,
        parent_revision: i64,
        device_id: &str,
    ) -> Result<UploadOutcome, TransportError> {
        (**self).upload(path, content, parent_revision, device_id).await
    }

    async fn delete(
        &self,
        path: &str,
        parent_revision: i64,
        device_id: &str,
    ) -> Result<DeleteOutcome, TransportError> {
        (**self).delete(path, parent_revision, device_id).await
    }

    async fn attempt_auto_merge(
        &self,
        path: &str,
        our_content: &str,
        ancestor_revision: i64,
        their_revision: i64,
    ) -> Result<MergeVerdict, TransportError> {
        (**self)
            .attempt_auto_merge(path, our_content, ancestor_revision, their_revision)
            .await
    }
}
