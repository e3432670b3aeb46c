use std::sync::Arc;

use hookgate_core::Clock;
use hookgate_settings::RateLimitSettings;
use hookgate_store::StateStore;
use metrics::counter;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Store scope holding per-key counters.
pub const RATE_LIMIT_SCOPE: &str = "rate-limit";

/// Persisted counter for one fixed window.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WindowCounter {
    count: u32,
    expires_at: i64,
}

/// Fixed-window action counter.
///
/// The first call in a window stamps `expiresAt = now + window`; later calls
/// increment without moving it. Calls over the limit still count, so a caller
/// hammering the limiter cannot reset its own window.
#[derive(Clone)]
pub struct RateLimiter {
    store: Arc<StateStore>,
    clock: Arc<dyn Clock>,
    defaults: RateLimitSettings,
}

impl RateLimiter {
    /// Limiter over `store`; `defaults` backs [`check`](Self::check).
    pub fn new(store: Arc<StateStore>, clock: Arc<dyn Clock>, defaults: RateLimitSettings) -> Self {
        Self {
            store,
            clock,
            defaults,
        }
    }

    /// Count one action for `scope_key` and report whether it exceeds `max_count`.
    pub fn is_rate_limited(&self, scope_key: &str, max_count: u32, window_ms: u64) -> bool {
        let now = self.clock.now_ms();
        let next = match self.current(scope_key, now) {
            Some(counter) => WindowCounter {
                count: counter.count.saturating_add(1),
                expires_at: counter.expires_at,
            },
            None => WindowCounter {
                count: 1,
                expires_at: now.saturating_add(i64::try_from(window_ms).unwrap_or(i64::MAX)),
            },
        };

        let value = match serde_json::to_value(next) {
            Ok(value) => value,
            Err(e) => {
                warn!(scope_key, error = %e, "rate-limit counter not serializable");
                return false;
            }
        };
        self.store
            .save(RATE_LIMIT_SCOPE, scope_key, value, next.expires_at, None);

        let limited = next.count > max_count;
        if limited {
            debug!(scope_key, count = next.count, max_count, "rate limited");
            counter!("rate_limited_total").increment(1);
        }
        limited
    }

    /// [`is_rate_limited`](Self::is_rate_limited) with the configured limits.
    pub fn check(&self, scope_key: &str) -> bool {
        self.is_rate_limited(scope_key, self.defaults.max_count, self.defaults.window_ms)
    }

    /// Actions left in the current window at `now`. Never increments.
    pub fn remaining(&self, scope_key: &str, max_count: u32, now: i64) -> u32 {
        self.current(scope_key, now)
            .map_or(max_count, |counter| max_count.saturating_sub(counter.count))
    }

    fn current(&self, scope_key: &str, now: i64) -> Option<WindowCounter> {
        let value = self.store.load(RATE_LIMIT_SCOPE, scope_key, now)?;
        match serde_json::from_value::<WindowCounter>(value) {
            Ok(counter) if counter.expires_at > now => Some(counter),
            Ok(_) => None,
            Err(e) => {
                debug!(scope_key, error = %e, "malformed rate-limit counter, starting fresh window");
                None
            }
        }
    }
}
