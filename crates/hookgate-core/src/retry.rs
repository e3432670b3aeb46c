//! Retry policy and backoff calculation.
//!
//! Portable, sync-only building blocks. The async retry loop lives in
//! `hookgate-transport`:
//!
//! - [`RetryPolicy`]: retry count, base backoff, delay cap, per-attempt timeout, retryable statuses
//! - [`backoff_delay_ms`]: exponential backoff with additive jitter
//! - [`parse_retry_after_header`]: parse an HTTP `Retry-After` value

use serde::{Deserialize, Serialize};

// ─────────────────────────────────────────────────────────────────────────────
// Policy
// ─────────────────────────────────────────────────────────────────────────────

/// Default number of retries after the first attempt.
pub const DEFAULT_RETRIES: u32 = 2;
/// Default base backoff in milliseconds.
pub const DEFAULT_BACKOFF_MS: u64 = 500;
/// Default per-attempt timeout in milliseconds.
pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;
/// Default ceiling for any single wait between attempts, in milliseconds.
pub const DEFAULT_MAX_DELAY_MS: u64 = 60_000;
/// Default jitter factor: up to 20% extra delay.
pub const DEFAULT_JITTER_FACTOR: f64 = 0.2;
/// Statuses retried by default.
pub const DEFAULT_RETRY_ON_STATUSES: [u16; 6] = [408, 429, 500, 502, 503, 504];

/// Retry parameters for one outbound call.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RetryPolicy {
    /// Retries after the first attempt (total attempts = `retries + 1`).
    pub retries: u32,
    /// Base delay for attempt 0; doubles on each subsequent attempt.
    pub backoff_ms: u64,
    /// Timeout applied to each attempt independently.
    pub timeout_ms: u64,
    /// HTTP statuses that trigger a retry. Anything else is returned as-is.
    pub retry_on_statuses: Vec<u16>,
    /// Upper bound of the random extra delay, as a fraction of the backoff.
    pub jitter_factor: f64,
    /// Longest wait between attempts, server `Retry-After` hints included.
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retries: DEFAULT_RETRIES,
            backoff_ms: DEFAULT_BACKOFF_MS,
            timeout_ms: DEFAULT_TIMEOUT_MS,
            retry_on_statuses: DEFAULT_RETRY_ON_STATUSES.to_vec(),
            jitter_factor: DEFAULT_JITTER_FACTOR,
            max_delay_ms: DEFAULT_MAX_DELAY_MS,
        }
    }
}

impl RetryPolicy {
    /// Whether `status` is in the retryable set.
    pub fn is_retryable_status(&self, status: u16) -> bool {
        self.retry_on_statuses.contains(&status)
    }

    /// Total attempts this policy allows.
    pub fn max_attempts(&self) -> u32 {
        self.retries.saturating_add(1)
    }

    /// Backoff before the retry that follows attempt `attempt` (0-indexed).
    ///
    /// `random` must be in `[0.0, 1.0]`.
    pub fn delay_for(&self, attempt: u32, random: f64) -> u64 {
        backoff_delay_ms(attempt, self.backoff_ms, self.jitter_factor, random)
    }

    /// Clamp a wait to [`max_delay_ms`](Self::max_delay_ms).
    pub fn cap_delay(&self, delay_ms: u64) -> u64 {
        delay_ms.min(self.max_delay_ms)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Backoff calculation
// ─────────────────────────────────────────────────────────────────────────────

/// Exponential backoff with additive jitter.
///
/// Formula: `base * 2^attempt + base * 2^attempt * jitter_factor * random`
///
/// Jitter only ever lengthens the delay: with the default factor of 0.2 the
/// result lies in `[exp, exp * 1.2]`.
pub fn backoff_delay_ms(attempt: u32, base_ms: u64, jitter_factor: f64, random: f64) -> u64 {
    let exponential = base_ms.saturating_mul(1u64 << attempt.min(31));
    let random = random.clamp(0.0, 1.0);
    let jitter = (exponential as f64) * jitter_factor.max(0.0) * random;
    exponential.saturating_add(jitter.round() as u64)
}

// ─────────────────────────────────────────────────────────────────────────────
// Retry-After header parsing
// ─────────────────────────────────────────────────────────────────────────────

/// Parse a `Retry-After` HTTP header value into milliseconds.
///
/// Accepts integer seconds (`"120"`) or an HTTP-date. Dates in the past yield 0.
pub fn parse_retry_after_header(value: &str) -> Option<u64> {
    let value = value.trim();
    if let Ok(seconds) = value.parse::<u64>() {
        return Some(seconds.saturating_mul(1000));
    }

    if let Ok(date) = chrono::DateTime::parse_from_rfc2822(value) {
        let delay_ms = date
            .signed_duration_since(chrono::Utc::now())
            .num_milliseconds();
        return Some(delay_ms.max(0) as u64);
    }

    None
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
