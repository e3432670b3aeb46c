/// Backing-storage faults.
///
/// These never escape [`StateStore`](crate::StateStore): every public store
/// operation logs them and carries on with the in-memory view.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// `SQLite` open, query or write failure.
    #[error("database error: {0}")]
    Database(String),

    /// Snapshot or stored value could not be (de)serialized.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Filesystem failure in the file backend.
    #[error("IO error: {0}")]
    Io(String),

    /// Persisted state was written by an incompatible version.
    #[error("snapshot schema version {found} does not match expected {expected}")]
    SchemaMismatch {
        /// Version read from storage.
        found: u32,
        /// Version this build writes.
        expected: u32,
    },
}

impl StoreError {
    /// Short classification string for logging/metrics.
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::Database(_) => "database",
            Self::Serialization(_) => "serialization",
            Self::Io(_) => "io",
            Self::SchemaMismatch { .. } => "schema_mismatch",
        }
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        StoreError::Database(e.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Serialization(e.to_string())
    }
}

impl From<std::io::Error> for StoreError {
    fn from(e: std::io::Error) -> Self {
        StoreError::Io(e.to_string())
    }
}
