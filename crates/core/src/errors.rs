//! Error types for the VaultSync core library.
//!
//! Each subsystem has its own error type derived with `thiserror`, and a
//! top-level [`CoreError`] enum unifies them all for callers that want a
//! single error type.

use thiserror::Error;

// ---------------------------------------------------------------------------
// Top-level error
// ---------------------------------------------------------------------------

/// Unified error type for the entire core library.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Sync(#[from] SyncError),

    #[error(transparent)]
    Conflict(#[from] ConflictError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Notify(#[from] NotifyError),
}

// ---------------------------------------------------------------------------
// Metadata store errors
// ---------------------------------------------------------------------------

/// Errors from the SQLite metadata store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Underlying rusqlite error.
    #[error("store error: {0}")]
    SqliteError(#[from] rusqlite::Error),

    /// The on-disk store was unreadable and could not be recovered.
    #[error("store at '{path}' is corrupt and could not be recovered: {detail}")]
    Unrecoverable { path: String, detail: String },

    /// A record was not found.
    #[error("no metadata record for path '{0}'")]
    RecordNotFound(String),

    /// Generic I/O error (e.g. file permissions).
    #[error("store I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// Transport errors
// ---------------------------------------------------------------------------

/// Errors from the remote-store transport.
#[derive(Debug, Error)]
pub enum TransportError {
    /// HTTP-level transport error (network, TLS, etc.).
    #[error("transport HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    /// The remote returned a non-success status code.
    #[error("remote error (HTTP {status}): {body}")]
    ApiError { status: u16, body: String },

    /// The network call exceeded the configured timeout.
    #[error("remote call timed out after {0}s")]
    Timeout(u64),

    /// The requested remote file or revision does not exist.
    #[error("remote file not found: '{path}' at revision {revision}")]
    NotFound { path: String, revision: i64 },

    /// The remote response could not be interpreted.
    #[error("remote protocol error: {0}")]
    ProtocolError(String),
}

// ---------------------------------------------------------------------------
// Sync engine errors
// ---------------------------------------------------------------------------

/// Errors from the reconciliation engine.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Another reconciliation pass is already running. This is a busy
    /// signal, not a failure: the concurrent invocation performed no work.
    #[error("reconciliation already in progress (started at {started_at})")]
    AlreadyRunning { started_at: String },

    /// No credential is configured; the pass short-circuits before any
    /// network call.
    #[error("remote store is not authenticated, skipping sync")]
    NotAuthenticated,

    /// The remote snapshot could not be obtained; the pass aborts with no
    /// mutation.
    #[error("failed to obtain remote snapshot: {0}")]
    SnapshotFailed(TransportError),

    /// The pass was cancelled at an iteration boundary.
    #[error("reconciliation cancelled")]
    Cancelled,

    /// Underlying transport error during a per-file operation.
    #[error("sync transport error: {0}")]
    TransportError(#[from] TransportError),

    /// Metadata store error during sync.
    #[error("sync store error: {0}")]
    StoreError(#[from] StoreError),

    /// Local file tree error during sync.
    #[error("sync file-tree error: {0}")]
    TreeError(#[from] std::io::Error),

    /// Conflict resolution failed beyond the manual fallback.
    #[error("conflict resolution failed: {0}")]
    ConflictError(#[from] ConflictError),
}

// ---------------------------------------------------------------------------
// Conflict errors
// ---------------------------------------------------------------------------

/// Errors from the conflict resolution subsystem.
///
/// The resolver converts merge failures and residual conflicts into the
/// manual fallback internally; these errors cover only the cases where even
/// the fallback could not be completed.
#[derive(Debug, Error)]
pub enum ConflictError {
    /// The server's version could not be fetched for backup.
    #[error("could not fetch server version of '{path}': {detail}")]
    ServerContentUnavailable { path: String, detail: String },

    /// The backup file could not be created, even with the fallback name.
    #[error("could not create conflict backup for '{path}': {detail}")]
    BackupFailed { path: String, detail: String },

    /// The marked conflict document could not be written locally.
    #[error("could not write conflict document for '{path}': {source}")]
    WriteFailed {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Store error while persisting the conflict record.
    #[error("conflict store error: {0}")]
    StoreError(#[from] StoreError),
}

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

/// Errors from configuration loading and validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file not found.
    #[error("configuration file not found: {0}")]
    FileNotFound(String),

    /// TOML parse error.
    #[error("configuration parse error: {0}")]
    ParseError(String),

    /// A required environment variable is not set.
    #[error("required environment variable '{var}' is not set (referenced by config field '{field}')")]
    EnvVarMissing { var: String, field: String },

    /// A config value is invalid.
    #[error("invalid configuration value for '{field}': {detail}")]
    InvalidValue { field: String, detail: String },

    /// Generic I/O error reading the config file.
    #[error("configuration I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// Notification errors
// ---------------------------------------------------------------------------

/// Errors from the notification subsystem.
#[derive(Debug, Error)]
pub enum NotifyError {
    /// Slack webhook delivery failed.
    #[error("Slack notification failed: {0}")]
    SlackError(String),

    /// HTTP error during notification delivery.
    #[error("notification HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_messages() {
        let err = TransportError::NotFound {
            path: "notes/a.md".into(),
            revision: 7,
        };
        assert_eq!(
            err.to_string(),
            "remote file not found: 'notes/a.md' at revision 7"
        );

        let err = SyncError::NotAuthenticated;
        assert!(err.to_string().contains("not authenticated"));

        let err = ConfigError::EnvVarMissing {
            var: "VAULTSYNC_TOKEN".into(),
            field: "remote.token_env".into(),
        };
        assert!(err.to_string().contains("VAULTSYNC_TOKEN"));
    }

    #[test]
    fn test_core_error_from_subsystem() {
        let sync_err = SyncError::NotAuthenticated;
        let core_err: CoreError = sync_err.into();
        assert!(matches!(core_err, CoreError::Sync(_)));

        let store_err = StoreError::RecordNotFound("a.md".into());
        let core_err: CoreError = store_err.into();
        assert!(matches!(core_err, CoreError::Store(_)));
    }
}
