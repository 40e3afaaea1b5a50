//! VaultSync core library.
//!
//! This crate provides the foundational components for bidirectional file
//! synchronization against a revisioned remote store: configuration, the
//! SQLite metadata store, the local file tree abstraction, upload policy,
//! three-way merging, conflict resolution, and the reconciliation engine.

pub mod config;
pub mod engine;
pub mod errors;
pub mod merge;
pub mod models;
pub mod notify;
pub mod policy;
pub mod remote;
pub mod resolver;
pub mod store;
pub mod vfs;

// Re-exports for convenience.
pub use config::AppConfig;
pub use engine::SyncEngine;
pub use models::{ConflictContext, FileRecord, SyncSummary};
pub use remote::{HttpRemote, MemoryRemote, RemoteStore};
pub use store::MetaStore;
pub use vfs::{FileTree, LocalFileTree};
