use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use hookgate_core::{Clock, SystemClock};
use hookgate_settings::StateSettings;
use metrics::counter;
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::backend::{BackendKind, Mutation, StateBackend};
use crate::error::StoreError;
use crate::snapshot::{MAX_KEY_LEN, MAX_SCOPE_LEN, Snapshot, StateEntry, bounded};

/// Default minimum gap between whole-scope expiry sweeps.
pub const DEFAULT_PRUNE_INTERVAL_MS: u64 = 1_000;

/// Store tuning that is not backend-specific.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoreConfig {
    /// Sweep throttle applied to scopes without an override.
    pub prune_interval_ms: u64,
    /// Per-scope sweep throttles.
    pub scope_prune_intervals: HashMap<String, u64>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            prune_interval_ms: DEFAULT_PRUNE_INTERVAL_MS,
            scope_prune_intervals: HashMap::new(),
        }
    }
}

impl From<&StateSettings> for StoreConfig {
    fn from(settings: &StateSettings) -> Self {
        Self {
            prune_interval_ms: settings.prune_interval_ms,
            scope_prune_intervals: settings.scope_prune_intervals.clone(),
        }
    }
}

impl StoreConfig {
    fn interval_for(&self, scope: &str) -> i64 {
        let ms = self
            .scope_prune_intervals
            .get(scope)
            .copied()
            .unwrap_or(self.prune_interval_ms);
        i64::try_from(ms).unwrap_or(i64::MAX)
    }
}

/// Point-in-time view of store contents.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreStats {
    /// Backend name.
    pub backend: &'static str,
    /// Live entry count per scope (expired-but-unswept entries included).
    pub scopes: BTreeMap<String, usize>,
    /// Sum over all scopes.
    pub total_entries: usize,
}

#[derive(Default)]
struct Inner {
    /// `None` until the first access triggers a backend load.
    snapshot: Option<Snapshot>,
    last_prune: HashMap<String, i64>,
}

/// Scoped key-value store with per-entry expiry.
///
/// The in-memory snapshot is authoritative for the life of the process. Every
/// mutation is forwarded to the backend after it is applied in memory; a
/// backend failure is logged and counted, never returned.
pub struct StateStore {
    backend: Box<dyn StateBackend>,
    clock: Arc<dyn Clock>,
    config: StoreConfig,
    inner: Mutex<Inner>,
}

impl std::fmt::Debug for StateStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateStore")
            .field("backend", &self.backend.name())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl StateStore {
    /// Store over one of the built-in backends.
    pub fn new(kind: BackendKind, config: StoreConfig, clock: Arc<dyn Clock>) -> Self {
        Self::with_backend(kind.build(), config, clock)
    }

    /// Store over a caller-supplied backend.
    pub fn with_backend(
        backend: Box<dyn StateBackend>,
        config: StoreConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            backend,
            clock,
            config,
            inner: Mutex::new(Inner::default()),
        }
    }

    /// Store configured from settings, on the system clock.
    pub fn from_settings(settings: &StateSettings) -> Self {
        Self::new(
            BackendKind::from(&settings.backend),
            StoreConfig::from(settings),
            SystemClock::shared(),
        )
    }

    /// Non-persistent store with default tuning.
    pub fn in_memory(clock: Arc<dyn Clock>) -> Self {
        Self::new(BackendKind::Memory, StoreConfig::default(), clock)
    }

    /// Name of the active backend.
    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// Look up a live entry.
    ///
    /// An expired entry under `key` is removed and reported absent. The rest
    /// of the scope is swept at most once per prune interval.
    pub fn load(&self, scope: &str, key: &str, now: i64) -> Option<Value> {
        let scope = bounded(scope, MAX_SCOPE_LEN);
        let key = bounded(key, MAX_KEY_LEN);

        let mut inner = self.inner.lock();
        self.ensure_loaded(&mut inner);
        self.maybe_prune(&mut inner, scope, now);

        let Inner { snapshot, .. } = &mut *inner;
        let snapshot = snapshot.get_or_insert_with(Snapshot::default);
        let entries = snapshot.scopes.get_mut(scope)?;
        let entry = entries.get(key)?;
        if !entry.is_expired(now) {
            return Some(entry.value.clone());
        }

        let _ = entries.remove(key);
        snapshot.drop_if_empty(scope);
        let keys = [key.to_string()];
        self.persist(Mutation::Remove { scope, keys: &keys }, snapshot);
        None
    }

    /// Insert or replace an entry.
    ///
    /// With `max_entries`, the scope is trimmed afterwards by evicting the
    /// least recently written entries. `Some(0)` is treated as unbounded.
    pub fn save(
        &self,
        scope: &str,
        key: &str,
        value: Value,
        expires_at: i64,
        max_entries: Option<usize>,
    ) {
        let scope = bounded(scope, MAX_SCOPE_LEN);
        let key = bounded(key, MAX_KEY_LEN);
        let entry = StateEntry {
            value,
            expires_at,
            updated_at: self.clock.now_ms(),
        };

        let mut inner = self.inner.lock();
        self.ensure_loaded(&mut inner);
        let snapshot = inner.snapshot.get_or_insert_with(Snapshot::default);
        let entries = snapshot.scopes.entry(scope.to_string()).or_default();
        let _ = entries.insert(key.to_string(), entry.clone());

        let evicted = match max_entries {
            Some(max) if max > 0 && entries.len() > max => evict_oldest(entries, max),
            _ => Vec::new(),
        };

        self.persist(
            Mutation::Upsert {
                scope,
                key,
                entry: &entry,
            },
            snapshot,
        );
        if !evicted.is_empty() {
            debug!(scope, evicted = evicted.len(), "evicted oldest state entries");
            self.persist(
                Mutation::Remove {
                    scope,
                    keys: &evicted,
                },
                snapshot,
            );
        }
    }

    /// Remove one entry. Missing keys are a no-op.
    pub fn delete(&self, scope: &str, key: &str) {
        let scope = bounded(scope, MAX_SCOPE_LEN);
        let key = bounded(key, MAX_KEY_LEN);

        let mut inner = self.inner.lock();
        self.ensure_loaded(&mut inner);
        let snapshot = inner.snapshot.get_or_insert_with(Snapshot::default);
        let removed = snapshot
            .scopes
            .get_mut(scope)
            .and_then(|entries| entries.remove(key))
            .is_some();
        if removed {
            snapshot.drop_if_empty(scope);
            let keys = [key.to_string()];
            self.persist(Mutation::Remove { scope, keys: &keys }, snapshot);
        }
    }

    /// Remove every entry in a scope.
    pub fn clear_scope(&self, scope: &str) {
        let scope = bounded(scope, MAX_SCOPE_LEN);

        let mut inner = self.inner.lock();
        self.ensure_loaded(&mut inner);
        let _ = inner.last_prune.remove(scope);
        let snapshot = inner.snapshot.get_or_insert_with(Snapshot::default);
        if snapshot.scopes.remove(scope).is_some() {
            self.persist(Mutation::ClearScope { scope }, snapshot);
        }
    }

    /// Sweep every scope for expired entries, ignoring the prune throttle.
    ///
    /// Returns how many entries were removed.
    pub fn purge_expired(&self, now: i64) -> usize {
        let mut inner = self.inner.lock();
        self.ensure_loaded(&mut inner);
        let Inner {
            snapshot,
            last_prune,
        } = &mut *inner;
        let snapshot = snapshot.get_or_insert_with(Snapshot::default);

        let before = snapshot.entry_count();
        for (scope, entries) in &mut snapshot.scopes {
            entries.retain(|_, entry| !entry.is_expired(now));
            let _ = last_prune.insert(scope.clone(), now);
        }
        snapshot.scopes.retain(|_, entries| !entries.is_empty());
        let removed = before - snapshot.entry_count();

        if removed > 0 {
            debug!(removed, "purged expired state entries");
            self.persist(Mutation::Replace, snapshot);
        }
        removed
    }

    /// Entry counts per scope.
    pub fn stats(&self) -> StoreStats {
        let mut inner = self.inner.lock();
        self.ensure_loaded(&mut inner);
        let scopes: BTreeMap<String, usize> = inner
            .snapshot
            .as_ref()
            .map(|s| {
                s.scopes
                    .iter()
                    .map(|(name, entries)| (name.clone(), entries.len()))
                    .collect()
            })
            .unwrap_or_default();
        let total_entries = scopes.values().sum();
        StoreStats {
            backend: self.backend.name(),
            scopes,
            total_entries,
        }
    }

    fn ensure_loaded(&self, inner: &mut Inner) {
        if inner.snapshot.is_some() {
            return;
        }
        let snapshot = match self.backend.load() {
            Ok(snapshot) => {
                debug!(
                    backend = self.backend.name(),
                    entries = snapshot.entry_count(),
                    "state snapshot loaded"
                );
                snapshot
            }
            Err(e) => {
                warn!(
                    backend = self.backend.name(),
                    error = %e,
                    kind = e.error_kind(),
                    "state load failed, starting empty"
                );
                counter!("state_load_errors_total", "kind" => e.error_kind()).increment(1);
                Snapshot::default()
            }
        };
        inner.snapshot = Some(snapshot);
    }

    fn maybe_prune(&self, inner: &mut Inner, scope: &str, now: i64) {
        let interval = self.config.interval_for(scope);
        if let Some(&last) = inner.last_prune.get(scope) {
            if now.saturating_sub(last) < interval {
                return;
            }
        }
        let _ = inner.last_prune.insert(scope.to_string(), now);

        let Some(snapshot) = inner.snapshot.as_mut() else {
            return;
        };
        let Some(entries) = snapshot.scopes.get_mut(scope) else {
            return;
        };
        let expired: Vec<String> = entries
            .iter()
            .filter(|(_, entry)| entry.is_expired(now))
            .map(|(key, _)| key.clone())
            .collect();
        if expired.is_empty() {
            return;
        }
        for key in &expired {
            let _ = entries.remove(key);
        }
        snapshot.drop_if_empty(scope);
        debug!(scope, removed = expired.len(), "pruned expired state entries");
        self.persist(
            Mutation::Remove {
                scope,
                keys: &expired,
            },
            snapshot,
        );
    }

    fn persist(&self, mutation: Mutation<'_>, snapshot: &Snapshot) {
        if let Err(e) = self.backend.apply(mutation, snapshot) {
            log_persist_failure(self.backend.name(), &e);
        }
    }
}

fn log_persist_failure(backend: &'static str, error: &StoreError) {
    warn!(
        backend,
        error = %error,
        kind = error.error_kind(),
        "state write failed, keeping in-memory view"
    );
    counter!(
        "state_persist_errors_total",
        "backend" => backend,
        "kind" => error.error_kind()
    )
    .increment(1);
}

/// Drop the oldest entries by `updated_at` (key order breaks ties) until
/// `max` remain. Returns the evicted keys.
fn evict_oldest(entries: &mut BTreeMap<String, StateEntry>, max: usize) -> Vec<String> {
    let mut by_age: Vec<(i64, String)> = entries
        .iter()
        .map(|(key, entry)| (entry.updated_at, key.clone()))
        .collect();
    by_age.sort();
    let excess = entries.len().saturating_sub(max);
    by_age
        .into_iter()
        .take(excess)
        .map(|(_, key)| {
            let _ = entries.remove(&key);
            key
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use hookgate_core::ManualClock;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tracing::Level;

    fn manual() -> (Arc<ManualClock>, Arc<dyn Clock>) {
        let clock = Arc::new(ManualClock::new(1_000));
        let dyn_clock: Arc<dyn Clock> = clock.clone();
        (clock, dyn_clock)
    }

    struct FailingBackend {
        writes: Arc<AtomicUsize>,
    }

    impl StateBackend for FailingBackend {
        fn name(&self) -> &'static str {
            "failing"
        }

        fn load(&self) -> Result<Snapshot, StoreError> {
            Err(StoreError::Io("disk unavailable".into()))
        }

        fn apply(&self, _: Mutation<'_>, _: &Snapshot) -> Result<(), StoreError> {
            let _ = self.writes.fetch_add(1, Ordering::SeqCst);
            Err(StoreError::Io("disk full".into()))
        }
    }

    struct CountingLoads {
        loads: Arc<AtomicUsize>,
    }

    impl StateBackend for CountingLoads {
        fn name(&self) -> &'static str {
            "counting"
        }

        fn load(&self) -> Result<Snapshot, StoreError> {
            let _ = self.loads.fetch_add(1, Ordering::SeqCst);
            Ok(Snapshot::default())
        }

        fn apply(&self, _: Mutation<'_>, _: &Snapshot) -> Result<(), StoreError> {
            Ok(())
        }
    }

    #[test]
    fn save_then_load() {
        let (_, clock) = manual();
        let store = StateStore::in_memory(clock);
        store.save("s", "k", json!({"a": 1}), 5_000, None);
        assert_eq!(store.load("s", "k", 2_000), Some(json!({"a": 1})));
        assert_eq!(store.load("s", "missing", 2_000), None);
        assert_eq!(store.load("other", "k", 2_000), None);
    }

    #[test]
    fn expired_entry_is_absent_and_removed() {
        let (_, clock) = manual();
        let store = StateStore::in_memory(clock);
        store.save("s", "k", json!(1), 5_000, None);
        assert_eq!(store.load("s", "k", 5_000), None);
        assert_eq!(store.stats().total_entries, 0);
    }

    #[test]
    fn scope_sweep_is_throttled() {
        let (_, clock) = manual();
        let store = StateStore::in_memory(clock);
        store.save("s", "a", json!(1), 1_500, None);
        store.save("s", "b", json!(2), 1_500, None);
        store.save("s", "live", json!(3), 100_000, None);

        // first access sweeps nothing (a and b are still live)
        assert!(store.load("s", "live", 1_200).is_some());
        // inside the throttle window: only the requested key is touched
        assert_eq!(store.load("s", "a", 1_600), None);
        assert_eq!(store.stats().scopes["s"], 2);
        // past the window the sweep catches b
        assert!(store.load("s", "live", 2_300).is_some());
        assert_eq!(store.stats().scopes["s"], 1);
    }

    #[test]
    fn per_scope_prune_interval() {
        let (_, clock) = manual();
        let config = StoreConfig {
            prune_interval_ms: 1_000,
            scope_prune_intervals: HashMap::from([("hot".to_string(), 0)]),
        };
        let store = StateStore::new(BackendKind::Memory, config, clock);
        store.save("hot", "a", json!(1), 1_500, None);
        store.save("hot", "b", json!(1), 1_500, None);
        assert!(store.load("hot", "none", 1_100).is_none());
        assert!(store.load("hot", "none", 1_600).is_none());
        assert_eq!(store.stats().total_entries, 0);
    }

    #[test]
    fn eviction_drops_oldest_by_updated_at() {
        let (time, clock) = manual();
        let store = StateStore::in_memory(clock);
        for key in ["c", "a", "b"] {
            store.save("s", key, json!(key), 100_000, Some(2));
            time.advance(10);
        }
        assert_eq!(store.load("s", "c", 1_100), None);
        assert!(store.load("s", "a", 1_100).is_some());
        assert!(store.load("s", "b", 1_100).is_some());
    }

    #[test]
    fn rewrite_refreshes_recency() {
        let (time, clock) = manual();
        let store = StateStore::in_memory(clock);
        store.save("s", "a", json!(1), 100_000, Some(2));
        time.advance(10);
        store.save("s", "b", json!(1), 100_000, Some(2));
        time.advance(10);
        store.save("s", "a", json!(2), 100_000, Some(2));
        time.advance(10);
        store.save("s", "c", json!(1), 100_000, Some(2));
        assert!(store.load("s", "a", 1_100).is_some());
        assert!(store.load("s", "b", 1_100).is_none());
    }

    #[test]
    fn zero_max_entries_is_unbounded() {
        let (_, clock) = manual();
        let store = StateStore::in_memory(clock);
        for n in 0..5 {
            store.save("s", &n.to_string(), json!(n), 100_000, Some(0));
        }
        assert_eq!(store.stats().total_entries, 5);
    }

    #[test]
    fn delete_and_clear_scope() {
        let (_, clock) = manual();
        let store = StateStore::in_memory(clock);
        store.save("a", "1", json!(1), 100_000, None);
        store.save("a", "2", json!(2), 100_000, None);
        store.save("b", "1", json!(1), 100_000, None);

        store.delete("a", "1");
        store.delete("a", "nope");
        assert_eq!(store.load("a", "1", 1_000), None);
        assert!(store.load("a", "2", 1_000).is_some());

        store.clear_scope("a");
        assert_eq!(store.load("a", "2", 1_000), None);
        assert!(store.load("b", "1", 1_000).is_some());
    }

    #[test]
    fn overlong_scope_and_key_are_truncated() {
        let (_, clock) = manual();
        let store = StateStore::in_memory(clock);
        let scope = "s".repeat(100);
        let key = "k".repeat(400);
        store.save(&scope, &key, json!(1), 100_000, None);
        assert!(store.load(&scope, &key, 1_000).is_some());
        let stats = store.stats();
        assert!(stats.scopes.contains_key(&"s".repeat(MAX_SCOPE_LEN)));
        // a key differing only past the limit aliases the same entry
        let alias = format!("{}x", "k".repeat(MAX_KEY_LEN));
        assert!(store.load(&scope, &alias, 1_000).is_some());
    }

    #[test]
    fn purge_expired_sweeps_every_scope() {
        let (_, clock) = manual();
        let store = StateStore::in_memory(clock);
        store.save("a", "old", json!(1), 1_100, None);
        store.save("b", "old", json!(1), 1_100, None);
        store.save("b", "live", json!(1), 9_000, None);
        assert_eq!(store.purge_expired(2_000), 2);
        let stats = store.stats();
        assert_eq!(stats.total_entries, 1);
        assert!(!stats.scopes.contains_key("a"));
    }

    #[test]
    fn backend_loaded_once() {
        let (_, clock) = manual();
        let loads = Arc::new(AtomicUsize::new(0));
        let store = StateStore::with_backend(
            Box::new(CountingLoads {
                loads: loads.clone(),
            }),
            StoreConfig::default(),
            clock,
        );
        store.save("s", "k", json!(1), 100_000, None);
        let _ = store.load("s", "k", 1_000);
        let _ = store.stats();
        assert_eq!(loads.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn backend_failures_are_swallowed() {
        let (logs, _guard) = hookgate_logging::capture_logs();
        let (_, clock) = manual();
        let writes = Arc::new(AtomicUsize::new(0));
        let store = StateStore::with_backend(
            Box::new(FailingBackend {
                writes: writes.clone(),
            }),
            StoreConfig::default(),
            clock,
        );

        store.save("s", "k", json!(1), 100_000, None);
        assert_eq!(store.load("s", "k", 1_000), Some(json!(1)));
        store.delete("s", "k");

        assert_eq!(writes.load(Ordering::SeqCst), 2);
        assert!(logs.has_event(Level::WARN, "state load failed"));
        assert!(logs.has_event(Level::WARN, "state write failed"));
    }

    #[test]
    fn file_backend_survives_restart() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        let (_, clock) = manual();

        let first = StateStore::new(
            BackendKind::File(path.clone()),
            StoreConfig::default(),
            clock.clone(),
        );
        first.save("dedupe", "abc", json!(true), 50_000, None);
        first.save("dedupe", "gone", json!(true), 60_000, None);
        first.delete("dedupe", "gone");

        let second = StateStore::new(BackendKind::File(path), StoreConfig::default(), clock);
        assert_eq!(second.load("dedupe", "abc", 2_000), Some(json!(true)));
        assert_eq!(second.load("dedupe", "gone", 2_000), None);
    }

    #[test]
    fn file_with_wrong_version_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        std::fs::write(
            &path,
            r#"{"version":7,"scopes":{"s":{"k":{"value":1,"expiresAt":99999,"updatedAt":1}}}}"#,
        )
        .unwrap();
        let (_, clock) = manual();
        let store = StateStore::new(BackendKind::File(path), StoreConfig::default(), clock);
        assert_eq!(store.load("s", "k", 1_000), None);
    }

    #[test]
    fn corrupt_file_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        std::fs::write(&path, "not json").unwrap();
        let (_, clock) = manual();
        let store = StateStore::new(BackendKind::File(path), StoreConfig::default(), clock);
        store.save("s", "k", json!(1), 100_000, None);
        assert_eq!(store.load("s", "k", 1_000), Some(json!(1)));
    }

    #[test]
    fn sqlite_backend_survives_restart() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.db");
        let (_, clock) = manual();

        {
            let store = StateStore::new(
                BackendKind::EmbeddedDb(path.clone()),
                StoreConfig::default(),
                clock.clone(),
            );
            store.save("rate-limit", "repo", json!({"count": 3}), 70_000, None);
            store.save("rate-limit", "evicted", json!({"count": 1}), 70_000, None);
            store.clear_scope("nothing-here");
            store.delete("rate-limit", "evicted");
        }

        let store = StateStore::new(BackendKind::EmbeddedDb(path), StoreConfig::default(), clock);
        assert_eq!(
            store.load("rate-limit", "repo", 2_000),
            Some(json!({"count": 3}))
        );
        assert_eq!(store.stats().total_entries, 1);
    }
}
