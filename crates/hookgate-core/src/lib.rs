//! # hookgate-core
//!
//! Foundation types and utilities shared by the hookgate crates.
//!
//! - **Clock**: [`Clock`] trait with a wall-clock and a manually driven implementation
//! - **Fingerprint**: FNV-1a 64-bit hashing for short, fixed-size dedup keys
//! - **Retry**: backoff math with injectable jitter
//! - **Shutdown**: [`ShutdownSignal`], the cooperative stop flag observed by
//!   dispatch and transport

#![deny(unsafe_code)]

pub mod clock;
pub mod fingerprint;
pub mod retry;
pub mod shutdown;

pub use clock::{Clock, ManualClock, SystemClock};
pub use fingerprint::{fingerprint, fnv1a64};
pub use shutdown::ShutdownSignal;
