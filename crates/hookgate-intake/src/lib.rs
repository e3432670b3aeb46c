//! # hookgate-intake
//!
//! Admission checks run before any expensive work is scheduled:
//!
//! - [`DedupGuard`]: "have I already accepted this identity inside window W?"
//! - [`RateLimiter`]: "has this scope exceeded N actions inside window W?"
//!
//! Both sit on a shared [`StateStore`](hookgate_store::StateStore) and fail
//! open: a storage outage admits traffic rather than blocking it.

#![deny(unsafe_code)]

pub mod dedup;
pub mod rate_limit;

pub use dedup::{DEDUP_SCOPE, DedupCategory, DedupGuard};
pub use rate_limit::{RATE_LIMIT_SCOPE, RateLimiter};
