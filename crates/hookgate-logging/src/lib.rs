//! # hookgate-logging
//!
//! Structured logging setup built on `tracing`.
//!
//! - [`init_subscriber`]: compact, human-readable stderr output
//! - [`init_json_subscriber`]: one JSON object per line, for log shippers
//! - [`capture_logs`]: thread-local capture for asserting on log output in tests
//!
//! Both initializers honor `RUST_LOG` when it is set and fall back to the
//! supplied level otherwise. Calling either more than once is a no-op.

#![deny(unsafe_code)]

pub mod capture;

pub use capture::{CapturedEvent, CapturedLogs, capture_logs};

use tracing_subscriber::EnvFilter;

fn env_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
}

/// Install a compact stderr subscriber.
pub fn init_subscriber(level: &str) {
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(env_filter(level))
        .with_target(true)
        .with_writer(std::io::stderr)
        .compact();

    // try_init fails if a global subscriber already exists
    let _ = subscriber.try_init();
}

/// Install a JSON stderr subscriber.
pub fn init_json_subscriber(level: &str) {
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(env_filter(level))
        .with_target(true)
        .with_writer(std::io::stderr)
        .json()
        .with_span_list(true);

    let _ = subscriber.try_init();
}

/// Install whichever subscriber the `json` flag selects.
pub fn init(level: &str, json: bool) {
    if json {
        init_json_subscriber(level);
    } else {
        init_subscriber(level);
    }
}
