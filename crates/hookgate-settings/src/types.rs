//! Settings type definitions.
//!
//! All types use `#[serde(rename_all = "camelCase")]` and `#[serde(default)]`
//! so a settings file only needs the fields it overrides.

use std::collections::HashMap;
use std::path::PathBuf;

use hookgate_core::retry::RetryPolicy;
use serde::{Deserialize, Serialize};

/// Root settings type.
///
/// # JSON Format
///
/// ```json
/// {
///   "dispatch": { "maxConcurrent": 8 },
///   "state": { "backend": { "kind": "file", "path": "/var/lib/hookgate/state.json" } }
/// }
/// ```
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HookgateSettings {
    /// Idempotency windows per event category.
    pub dedup: DedupSettings,
    /// Fixed-window rate limit defaults.
    pub rate_limit: RateLimitSettings,
    /// Concurrency bound for compute-provider calls.
    pub dispatch: DispatchSettings,
    /// Outbound HTTP retry policy.
    pub retry: RetryPolicy,
    /// Diff budget and snippet shape.
    pub patch: PatchSettings,
    /// State store backend and pruning.
    pub state: StateSettings,
    /// Log output.
    pub logging: LoggingSettings,
}

/// Dedup windows, in milliseconds.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DedupSettings {
    /// Interactive retriggers (comment commands, re-requested reviews).
    pub retrigger_window_ms: u64,
    /// Terminal lifecycle events (opened, closed, merged).
    pub lifecycle_window_ms: u64,
    /// Raw webhook delivery ids.
    pub delivery_window_ms: u64,
}

impl Default for DedupSettings {
    fn default() -> Self {
        Self {
            retrigger_window_ms: 10 * 60 * 1000,
            lifecycle_window_ms: 24 * 60 * 60 * 1000,
            delivery_window_ms: 60 * 60 * 1000,
        }
    }
}

/// Rate limit defaults.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RateLimitSettings {
    /// Actions allowed per window.
    pub max_count: u32,
    /// Window length in milliseconds.
    pub window_ms: u64,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            max_count: 10,
            window_ms: 60_000,
        }
    }
}

/// Dispatch controller settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DispatchSettings {
    /// Slots that may be held at once.
    pub max_concurrent: usize,
    /// How long shutdown waits for in-flight work.
    pub drain_timeout_ms: u64,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            max_concurrent: 4,
            drain_timeout_ms: 30_000,
        }
    }
}

/// Patch analysis settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PatchSettings {
    /// Character budget for a prioritized diff.
    pub max_chars: usize,
    /// Lines of context around a snippet range.
    pub snippet_context_lines: u32,
}

impl Default for PatchSettings {
    fn default() -> Self {
        Self {
            max_chars: 60_000,
            snippet_context_lines: 3,
        }
    }
}

/// Which persistence backend the state store uses.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum StateBackendSettings {
    /// Process-local only.
    #[default]
    Memory,
    /// Whole-snapshot JSON file.
    File {
        /// Snapshot file location.
        path: PathBuf,
    },
    /// Embedded `SQLite` database.
    EmbeddedDb {
        /// Database file location.
        path: PathBuf,
    },
}

/// State store settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StateSettings {
    /// Backend selection.
    pub backend: StateBackendSettings,
    /// Minimum gap between full-scope expiry sweeps.
    pub prune_interval_ms: u64,
    /// Per-scope overrides of `prune_interval_ms`.
    pub scope_prune_intervals: HashMap<String, u64>,
}

impl Default for StateSettings {
    fn default() -> Self {
        Self {
            backend: StateBackendSettings::Memory,
            prune_interval_ms: 1_000,
            scope_prune_intervals: HashMap::new(),
        }
    }
}

/// Logging settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default filter when `RUST_LOG` is unset.
    pub level: String,
    /// Emit JSON lines instead of compact text.
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}
