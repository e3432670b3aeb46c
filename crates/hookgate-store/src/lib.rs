//! # hookgate-store
//!
//! Scoped key-value state with per-entry expiry, backed by one of:
//!
//! - **memory**: nothing persisted
//! - **file**: whole-snapshot JSON, rewritten atomically on every mutation
//! - **embedded-db**: `SQLite` table keyed by `(scope, key)`
//!
//! Storage faults never reach callers; see [`StateStore`].

#![deny(unsafe_code)]

pub mod backend;
pub mod error;
mod schema;
pub mod snapshot;
pub mod store;

pub use backend::{BackendKind, FileBackend, MemoryBackend, Mutation, SqliteBackend, StateBackend};
pub use error::StoreError;
pub use snapshot::{SCHEMA_VERSION, Snapshot, StateEntry};
pub use store::{StateStore, StoreConfig, StoreStats};
