use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension, params};
use serde_json::Value;
use tracing::{info, warn};

use crate::backend::{Mutation, StateBackend};
use crate::error::StoreError;
use crate::schema;
use crate::snapshot::{Snapshot, StateEntry};

/// Embedded `SQLite` table keyed by `(scope, key)`.
///
/// The connection is opened on first use; construction never touches disk.
pub struct SqliteBackend {
    path: PathBuf,
    conn: Mutex<Option<Connection>>,
}

impl SqliteBackend {
    /// Backend for the database at `path`. `:memory:` opens a private in-memory db.
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            conn: Mutex::new(None),
        }
    }

    /// Database location.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn with_conn<F, T>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&mut Connection) -> Result<T, StoreError>,
    {
        let mut guard = self.conn.lock();
        let conn = match guard.take() {
            Some(conn) => conn,
            None => open(&self.path)?,
        };
        f(guard.insert(conn))
    }
}

fn open(path: &Path) -> Result<Connection, StoreError> {
    let conn = if path == Path::new(":memory:") {
        Connection::open_in_memory()?
    } else {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| StoreError::Io(format!("create dir: {e}")))?;
            }
        }
        Connection::open(path)?
    };

    conn.execute_batch(schema::PRAGMAS)
        .map_err(|e| StoreError::Database(format!("pragmas: {e}")))?;
    conn.execute_batch(schema::CREATE_TABLES)
        .map_err(|e| StoreError::Database(format!("schema: {e}")))?;

    let version: Option<u32> = conn
        .query_row("SELECT version FROM schema_version LIMIT 1", [], |row| {
            row.get(0)
        })
        .optional()
        .map_err(|e| StoreError::Database(format!("schema version: {e}")))?;

    match version {
        Some(found) if found == schema::SCHEMA_VERSION => {}
        Some(found) => {
            warn!(
                path = %path.display(),
                found,
                expected = schema::SCHEMA_VERSION,
                "state database schema mismatch, discarding stored entries"
            );
            conn.execute_batch("DELETE FROM state_entries; DELETE FROM schema_version;")?;
            let _ = conn.execute(
                "INSERT INTO schema_version (version) VALUES (?1)",
                [schema::SCHEMA_VERSION],
            )?;
        }
        None => {
            let _ = conn.execute(
                "INSERT INTO schema_version (version) VALUES (?1)",
                [schema::SCHEMA_VERSION],
            )?;
        }
    }

    info!(path = %path.display(), "state database opened");
    Ok(conn)
}

fn upsert(conn: &Connection, scope: &str, key: &str, entry: &StateEntry) -> Result<(), StoreError> {
    let value = serde_json::to_string(&entry.value)?;
    let _ = conn.execute(
        schema::UPSERT_ENTRY,
        params![scope, key, value, entry.expires_at, entry.updated_at],
    )?;
    Ok(())
}

impl StateBackend for SqliteBackend {
    fn name(&self) -> &'static str {
        "embedded-db"
    }

    fn load(&self) -> Result<Snapshot, StoreError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT scope, key, value, expires_at, updated_at FROM state_entries",
            )?;
            let rows = stmt.query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, i64>(3)?,
                    row.get::<_, i64>(4)?,
                ))
            })?;

            let mut snapshot = Snapshot::default();
            for row in rows {
                let (scope, key, raw, expires_at, updated_at) = row?;
                let value: Value = match serde_json::from_str(&raw) {
                    Ok(value) => value,
                    Err(e) => {
                        warn!(scope, key, error = %e, "skipping unreadable state row");
                        continue;
                    }
                };
                let _ = snapshot.scopes.entry(scope).or_default().insert(
                    key,
                    StateEntry {
                        value,
                        expires_at,
                        updated_at,
                    },
                );
            }
            Ok(snapshot)
        })
    }

    fn apply(&self, mutation: Mutation<'_>, snapshot: &Snapshot) -> Result<(), StoreError> {
        self.with_conn(|conn| {
            match mutation {
                Mutation::Upsert { scope, key, entry } => upsert(conn, scope, key, entry)?,
                Mutation::Remove { scope, keys } => {
                    let tx = conn.transaction()?;
                    {
                        let mut stmt =
                            tx.prepare("DELETE FROM state_entries WHERE scope = ?1 AND key = ?2")?;
                        for key in keys {
                            let _ = stmt.execute(params![scope, key])?;
                        }
                    }
                    tx.commit()?;
                }
                Mutation::ClearScope { scope } => {
                    let _ = conn.execute("DELETE FROM state_entries WHERE scope = ?1", [scope])?;
                }
                Mutation::Replace => {
                    let tx = conn.transaction()?;
                    let _ = tx.execute("DELETE FROM state_entries", [])?;
                    for (scope, entries) in &snapshot.scopes {
                        for (key, entry) in entries {
                            upsert(&tx, scope, key, entry)?;
                        }
                    }
                    tx.commit()?;
                }
            }
            Ok(())
        })
    }
}
