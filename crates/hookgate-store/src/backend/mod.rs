//! Persistence backends for the state store.
//!
//! A backend only ever sees finished mutations: the store applies each change
//! to its in-memory [`Snapshot`] first, then hands the backend both the
//! mutation and the resulting snapshot. Row-oriented backends apply the
//! mutation; whole-file backends rewrite the snapshot.

mod file;
mod memory;
mod sqlite;

pub use file::FileBackend;
pub use memory::MemoryBackend;
pub use sqlite::SqliteBackend;

use std::path::PathBuf;

use hookgate_settings::StateBackendSettings;

use crate::error::StoreError;
use crate::snapshot::{Snapshot, StateEntry};

/// A single change to persist.
#[derive(Clone, Copy, Debug)]
pub enum Mutation<'a> {
    /// Insert or replace one entry.
    Upsert {
        /// Scope name.
        scope: &'a str,
        /// Entry key.
        key: &'a str,
        /// New entry.
        entry: &'a StateEntry,
    },
    /// Remove specific keys from a scope.
    Remove {
        /// Scope name.
        scope: &'a str,
        /// Keys removed.
        keys: &'a [String],
    },
    /// Remove a whole scope.
    ClearScope {
        /// Scope name.
        scope: &'a str,
    },
    /// Persist the snapshot as a whole (bulk sweeps).
    Replace,
}

/// Durable storage behind a [`StateStore`](crate::StateStore).
pub trait StateBackend: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// Read the persisted snapshot. Called at most once per store.
    fn load(&self) -> Result<Snapshot, StoreError>;

    /// Persist one mutation. `snapshot` already reflects it.
    fn apply(&self, mutation: Mutation<'_>, snapshot: &Snapshot) -> Result<(), StoreError>;
}

/// Closed set of backend choices, selected once at startup.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BackendKind {
    /// No persistence.
    Memory,
    /// Whole-snapshot JSON file.
    File(PathBuf),
    /// Embedded `SQLite` database.
    EmbeddedDb(PathBuf),
}

impl BackendKind {
    /// Construct the backend. Never touches the disk; I/O is deferred to first use.
    pub fn build(self) -> Box<dyn StateBackend> {
        match self {
            Self::Memory => Box::new(MemoryBackend),
            Self::File(path) => Box::new(FileBackend::new(path)),
            Self::EmbeddedDb(path) => Box::new(SqliteBackend::new(path)),
        }
    }
}

impl From<&StateBackendSettings> for BackendKind {
    fn from(settings: &StateBackendSettings) -> Self {
        match settings {
            StateBackendSettings::Memory => Self::Memory,
            StateBackendSettings::File { path } => Self::File(path.clone()),
            StateBackendSettings::EmbeddedDb { path } => Self::EmbeddedDb(path.clone()),
        }
    }
}
