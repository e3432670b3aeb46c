//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`HookgateSettings::default()`]
//! 2. If the settings file exists, deep-merge user values over defaults
//! 3. Apply `HOOKGATE_*` environment overrides (highest priority)
//! 4. Validate
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::{Result, SettingsError};
use crate::types::{HookgateSettings, StateBackendSettings};

/// Resolve the path to the settings file (`~/.hookgate/settings.json`).
///
/// `HOOKGATE_SETTINGS` replaces the default location when set.
pub fn settings_path() -> PathBuf {
    if let Some(path) = read_env_string("HOOKGATE_SETTINGS") {
        return PathBuf::from(path);
    }
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".hookgate").join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<HookgateSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// A missing file yields defaults; a malformed file is an error.
pub fn load_settings_from_path(path: &Path) -> Result<HookgateSettings> {
    let defaults = serde_json::to_value(HookgateSettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    let mut settings: HookgateSettings = serde_json::from_value(merged)?;
    apply_overrides(&mut settings, read_env_string);
    validate(&settings)?;
    Ok(settings)
}

/// Recursive deep merge of two JSON values.
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = match target_map.remove(&key) {
                    Some(target_val) => deep_merge(target_val, source_val),
                    None => source_val,
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Apply overrides from `lookup` (the process environment in production).
///
/// Invalid values are logged and ignored.
pub fn apply_overrides<F>(settings: &mut HookgateSettings, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let read_u64 = |name: &str, min: u64, max: u64| -> Option<u64> {
        let raw = lookup(name)?;
        let parsed = parse_u64_range(&raw, min, max);
        if parsed.is_none() {
            warn!(key = name, value = %raw, "invalid integer env var, ignoring");
        }
        parsed
    };

    // ── Dedup / rate limit ──────────────────────────────────────────
    if let Some(v) = read_u64("HOOKGATE_RETRIGGER_WINDOW_MS", 1, u64::MAX) {
        settings.dedup.retrigger_window_ms = v;
    }
    if let Some(v) = read_u64("HOOKGATE_LIFECYCLE_WINDOW_MS", 1, u64::MAX) {
        settings.dedup.lifecycle_window_ms = v;
    }
    if let Some(v) = read_u64("HOOKGATE_RATE_LIMIT_MAX", 0, u64::from(u32::MAX)) {
        settings.rate_limit.max_count = v as u32;
    }
    if let Some(v) = read_u64("HOOKGATE_RATE_LIMIT_WINDOW_MS", 1, u64::MAX) {
        settings.rate_limit.window_ms = v;
    }

    // ── Dispatch / retry / patch ────────────────────────────────────
    if let Some(v) = read_u64("HOOKGATE_MAX_CONCURRENT", 1, 10_000) {
        settings.dispatch.max_concurrent = v as usize;
    }
    if let Some(v) = read_u64("HOOKGATE_DRAIN_TIMEOUT_MS", 0, 3_600_000) {
        settings.dispatch.drain_timeout_ms = v;
    }
    if let Some(v) = read_u64("HOOKGATE_RETRIES", 0, 20) {
        settings.retry.retries = v as u32;
    }
    if let Some(v) = read_u64("HOOKGATE_BACKOFF_MS", 0, 600_000) {
        settings.retry.backoff_ms = v;
    }
    if let Some(v) = read_u64("HOOKGATE_TIMEOUT_MS", 1, 3_600_000) {
        settings.retry.timeout_ms = v;
    }
    if let Some(v) = read_u64("HOOKGATE_PATCH_MAX_CHARS", 1, 100_000_000) {
        settings.patch.max_chars = v as usize;
    }

    // ── State backend ───────────────────────────────────────────────
    if let Some(kind) = lookup("HOOKGATE_STATE_BACKEND") {
        let path = lookup("HOOKGATE_STATE_PATH").map(PathBuf::from);
        match parse_backend(&kind, path) {
            Some(backend) => settings.state.backend = backend,
            None => warn!(value = %kind, "invalid HOOKGATE_STATE_BACKEND, ignoring"),
        }
    }
    if let Some(v) = read_u64("HOOKGATE_PRUNE_INTERVAL_MS", 0, 86_400_000) {
        settings.state.prune_interval_ms = v;
    }

    // ── Logging ─────────────────────────────────────────────────────
    if let Some(v) = lookup("HOOKGATE_LOG_LEVEL") {
        settings.logging.level = v;
    }
    if let Some(raw) = lookup("HOOKGATE_LOG_JSON") {
        match parse_bool(&raw) {
            Some(v) => settings.logging.json = v,
            None => warn!(value = %raw, "invalid HOOKGATE_LOG_JSON, ignoring"),
        }
    }
}

/// Reject settings no component could run with.
pub fn validate(settings: &HookgateSettings) -> Result<()> {
    if settings.dispatch.max_concurrent == 0 {
        return Err(SettingsError::InvalidValue(
            "dispatch.maxConcurrent must be at least 1".into(),
        ));
    }
    if settings.rate_limit.window_ms == 0 {
        return Err(SettingsError::InvalidValue(
            "rateLimit.windowMs must be at least 1".into(),
        ));
    }
    if settings.patch.max_chars == 0 {
        return Err(SettingsError::InvalidValue(
            "patch.maxChars must be at least 1".into(),
        ));
    }
    if !(0.0..=1.0).contains(&settings.retry.jitter_factor) {
        return Err(SettingsError::InvalidValue(
            "retry.jitterFactor must be within 0.0..=1.0".into(),
        ));
    }
    Ok(())
}

// ── Pure parsing functions (testable without env vars) ──────────────────────

/// Parse a backend kind plus optional path into a backend selection.
///
/// `file` and `embedded-db` require a path.
pub fn parse_backend(kind: &str, path: Option<PathBuf>) -> Option<StateBackendSettings> {
    match kind.to_lowercase().as_str() {
        "memory" => Some(StateBackendSettings::Memory),
        "file" => path.map(|path| StateBackendSettings::File { path }),
        "embedded-db" | "embeddeddb" | "sqlite" => {
            path.map(|path| StateBackendSettings::EmbeddedDb { path })
        }
        _ => None,
    }
}

/// Parse a string as a boolean.
///
/// Accepts (case-insensitive): `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`.
pub fn parse_bool(val: &str) -> Option<bool> {
    match val.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Parse a string as a `u64` within an inclusive range.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.trim().parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

fn read_env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}
