use std::sync::Arc;

use hookgate_core::{Clock, fingerprint};
use hookgate_settings::DedupSettings;
use hookgate_store::StateStore;
use metrics::counter;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

/// Store scope holding accepted fingerprints.
pub const DEDUP_SCOPE: &str = "dedupe";

/// Caller classes with distinct suppression windows.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DedupCategory {
    /// Interactive re-requests (short window).
    Retrigger,
    /// Terminal lifecycle events such as "closed" or "merged" (long window).
    Lifecycle,
    /// Raw webhook redeliveries keyed by delivery id.
    Delivery,
}

impl DedupCategory {
    /// Label used in logs and metrics.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Retrigger => "retrigger",
            Self::Lifecycle => "lifecycle",
            Self::Delivery => "delivery",
        }
    }
}

/// Suppresses repeat deliveries of the same identity within a window.
///
/// The check-then-record sequence is not atomic: two near-simultaneous calls
/// with the same identity can both be admitted.
#[derive(Clone)]
pub struct DedupGuard {
    store: Arc<StateStore>,
    clock: Arc<dyn Clock>,
    windows: DedupSettings,
}

impl DedupGuard {
    /// Guard over `store`, with per-category windows from `windows`.
    pub fn new(store: Arc<StateStore>, clock: Arc<dyn Clock>, windows: DedupSettings) -> Self {
        Self {
            store,
            clock,
            windows,
        }
    }

    /// Whether `identity` was already accepted within `window_ms`.
    ///
    /// On a miss the identity is recorded with `expiresAt = now + window_ms`.
    /// A hit leaves the stored entry untouched, so the window is measured from
    /// the first acceptance.
    pub fn is_duplicate(&self, identity: &str, window_ms: u64) -> bool {
        let key = fingerprint(identity);
        let now = self.clock.now_ms();

        if self.store.load(DEDUP_SCOPE, &key, now).is_some() {
            debug!(key, "duplicate identity suppressed");
            counter!("dedup_hits_total").increment(1);
            return true;
        }

        let window = i64::try_from(window_ms).unwrap_or(i64::MAX);
        self.store.save(
            DEDUP_SCOPE,
            &key,
            json!({ "seenAt": now }),
            now.saturating_add(window),
            None,
        );
        false
    }

    /// [`is_duplicate`](Self::is_duplicate) with the window configured for `category`.
    pub fn is_duplicate_in(&self, category: DedupCategory, identity: &str) -> bool {
        let duplicate = self.is_duplicate(identity, self.window_for(category));
        if duplicate {
            counter!("dedup_category_hits_total", "category" => category.as_str()).increment(1);
        }
        duplicate
    }

    /// Configured window for `category`.
    pub fn window_for(&self, category: DedupCategory) -> u64 {
        match category {
            DedupCategory::Retrigger => self.windows.retrigger_window_ms,
            DedupCategory::Lifecycle => self.windows.lifecycle_window_ms,
            DedupCategory::Delivery => self.windows.delivery_window_ms,
        }
    }

    /// Drop the record for `identity` so the next delivery is admitted.
    pub fn forget(&self, identity: &str) {
        self.store.delete(DEDUP_SCOPE, &fingerprint(identity));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hookgate_core::ManualClock;
    use hookgate_store::{BackendKind, Mutation, Snapshot, StateBackend, StoreConfig, StoreError};

    fn guard() -> (Arc<ManualClock>, DedupGuard) {
        let clock = Arc::new(ManualClock::new(10_000));
        let store = Arc::new(StateStore::in_memory(clock.clone()));
        let guard = DedupGuard::new(store, clock.clone(), DedupSettings::default());
        (clock, guard)
    }

    #[test]
    fn first_sighting_is_not_duplicate() {
        let (_, guard) = guard();
        assert!(!guard.is_duplicate("acme/widgets#42:opened:abc123", 60_000));
        assert!(guard.is_duplicate("acme/widgets#42:opened:abc123", 60_000));
        assert!(!guard.is_duplicate("acme/widgets#42:opened:def456", 60_000));
    }

    #[test]
    fn window_expiry_readmits() {
        let (clock, guard) = guard();
        assert!(!guard.is_duplicate("id", 1_000));
        clock.advance(999);
        assert!(guard.is_duplicate("id", 1_000));
        clock.advance(1);
        assert!(!guard.is_duplicate("id", 1_000));
    }

    #[test]
    fn hit_does_not_extend_window() {
        let (clock, guard) = guard();
        assert!(!guard.is_duplicate("id", 1_000));
        clock.advance(800);
        assert!(guard.is_duplicate("id", 1_000));
        clock.advance(300);
        assert!(!guard.is_duplicate("id", 1_000));
    }

    #[test]
    fn categories_use_configured_windows() {
        let clock = Arc::new(ManualClock::new(0));
        let store = Arc::new(StateStore::in_memory(clock.clone()));
        let windows = DedupSettings {
            retrigger_window_ms: 100,
            lifecycle_window_ms: 10_000,
            delivery_window_ms: 1_000,
        };
        let guard = DedupGuard::new(store, clock.clone(), windows);

        assert!(!guard.is_duplicate_in(DedupCategory::Retrigger, "retry"));
        assert!(!guard.is_duplicate_in(DedupCategory::Lifecycle, "closed"));
        clock.advance(500);
        assert!(!guard.is_duplicate_in(DedupCategory::Retrigger, "retry"));
        assert!(guard.is_duplicate_in(DedupCategory::Lifecycle, "closed"));
        assert_eq!(guard.window_for(DedupCategory::Delivery), 1_000);
    }

    #[test]
    fn forget_readmits_immediately() {
        let (_, guard) = guard();
        assert!(!guard.is_duplicate("id", 60_000));
        guard.forget("id");
        assert!(!guard.is_duplicate("id", 60_000));
    }

    #[test]
    fn stored_under_fingerprint_key() {
        let clock = Arc::new(ManualClock::new(0));
        let store = Arc::new(StateStore::in_memory(clock.clone()));
        let guard = DedupGuard::new(store.clone(), clock, DedupSettings::default());
        let _ = guard.is_duplicate("some identity", 5_000);
        let value = store.load(DEDUP_SCOPE, &fingerprint("some identity"), 1);
        assert_eq!(value, Some(json!({ "seenAt": 0 })));
    }

    struct BrokenBackend;

    impl StateBackend for BrokenBackend {
        fn name(&self) -> &'static str {
            "broken"
        }

        fn load(&self) -> Result<Snapshot, StoreError> {
            Err(StoreError::Io("offline".into()))
        }

        fn apply(&self, _: Mutation<'_>, _: &Snapshot) -> Result<(), StoreError> {
            Err(StoreError::Io("offline".into()))
        }
    }

    #[test]
    fn storage_outage_fails_open() {
        let clock = Arc::new(ManualClock::new(0));
        let store = Arc::new(StateStore::with_backend(
            Box::new(BrokenBackend),
            StoreConfig::default(),
            clock.clone(),
        ));
        let guard = DedupGuard::new(store, clock, DedupSettings::default());
        assert!(!guard.is_duplicate("id", 1_000));
    }

    #[test]
    fn survives_restart_with_file_backend() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        let clock = Arc::new(ManualClock::new(0));

        let open = || {
            Arc::new(StateStore::new(
                BackendKind::File(path.clone()),
                StoreConfig::default(),
                clock.clone(),
            ))
        };

        let first = DedupGuard::new(open(), clock.clone(), DedupSettings::default());
        assert!(!first.is_duplicate("delivery-1", 60_000));

        let second = DedupGuard::new(open(), clock.clone(), DedupSettings::default());
        assert!(second.is_duplicate("delivery-1", 60_000));
    }
}
