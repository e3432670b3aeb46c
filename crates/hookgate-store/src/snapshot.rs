//! In-memory state model and its persisted form.
//!
//! The persisted layout is
//! `{ "version": 1, "scopes": { name: { key: { value, expiresAt, updatedAt } } } }`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::StoreError;

/// Schema version written into every snapshot.
pub const SCHEMA_VERSION: u32 = 1;

/// Maximum scope name length, in characters.
pub const MAX_SCOPE_LEN: usize = 64;

/// Maximum key length, in characters.
pub const MAX_KEY_LEN: usize = 256;

/// One stored value with its expiry.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateEntry {
    /// Opaque payload.
    pub value: Value,
    /// Epoch ms at or after which the entry is dead.
    pub expires_at: i64,
    /// Epoch ms of the last write; eviction order.
    pub updated_at: i64,
}

impl StateEntry {
    /// Whether the entry is dead at `now`.
    pub fn is_expired(&self, now: i64) -> bool {
        self.expires_at <= now
    }
}

/// Entries of one scope, keyed by entry key.
pub type Scope = BTreeMap<String, StateEntry>;

/// Versioned aggregate of every scope.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Schema version this snapshot was written with.
    pub version: u32,
    /// Scopes by name. Empty scopes are never kept.
    #[serde(default)]
    pub scopes: BTreeMap<String, Scope>,
}

impl Default for Snapshot {
    fn default() -> Self {
        Self {
            version: SCHEMA_VERSION,
            scopes: BTreeMap::new(),
        }
    }
}

#[derive(Deserialize)]
struct Header {
    version: Option<u32>,
}

impl Snapshot {
    /// Parse a persisted snapshot.
    ///
    /// The version is checked before the body is trusted: a mismatch fails
    /// with [`StoreError::SchemaMismatch`] even if the body would parse.
    pub fn from_json(raw: &str) -> Result<Self, StoreError> {
        let value: Value = serde_json::from_str(raw)?;
        let header: Header = serde_json::from_value(value.clone())?;
        let found = header.version.unwrap_or(0);
        if found != SCHEMA_VERSION {
            return Err(StoreError::SchemaMismatch {
                found,
                expected: SCHEMA_VERSION,
            });
        }
        let mut snapshot: Snapshot = serde_json::from_value(value)?;
        snapshot.scopes.retain(|_, scope| !scope.is_empty());
        Ok(snapshot)
    }

    /// Serialize for a file write.
    pub fn to_json(&self) -> Result<String, StoreError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Total entries across scopes.
    pub fn entry_count(&self) -> usize {
        self.scopes.values().map(BTreeMap::len).sum()
    }

    /// Drop `scope` if it has no entries left.
    pub(crate) fn drop_if_empty(&mut self, scope: &str) {
        if self.scopes.get(scope).is_some_and(BTreeMap::is_empty) {
            let _ = self.scopes.remove(scope);
        }
    }
}

/// Clamp `s` to at most `max` characters.
pub fn bounded(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
