//! DDL for the embedded-db backend.
//! WAL mode is enabled at connection time.

pub use crate::snapshot::SCHEMA_VERSION;

pub const CREATE_TABLES: &str = r"
CREATE TABLE IF NOT EXISTS state_entries (
    scope TEXT NOT NULL,
    key TEXT NOT NULL,
    value TEXT NOT NULL,
    expires_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL,
    PRIMARY KEY (scope, key)
);

CREATE INDEX IF NOT EXISTS idx_state_entries_expiry ON state_entries(scope, expires_at);

CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER NOT NULL
);
";

pub const PRAGMAS: &str = r"
PRAGMA journal_mode = WAL;
PRAGMA busy_timeout = 5000;
PRAGMA synchronous = NORMAL;
";

pub const UPSERT_ENTRY: &str = "INSERT INTO state_entries (scope, key, value, expires_at, updated_at)
     VALUES (?1, ?2, ?3, ?4, ?5)
     ON CONFLICT(scope, key) DO UPDATE SET
        value = excluded.value,
        expires_at = excluded.expires_at,
        updated_at = excluded.updated_at";
