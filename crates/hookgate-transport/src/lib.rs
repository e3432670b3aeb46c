//! # hookgate-transport
//!
//! Outbound HTTP with a bounded retry budget. Each attempt carries its own
//! timeout; retryable statuses and transport-level failures back off
//! exponentially with jitter; a triggered
//! [`ShutdownSignal`](hookgate_core::ShutdownSignal) stops new attempts.

#![deny(unsafe_code)]

pub mod errors;
pub mod transport;

pub use errors::TransportError;
pub use transport::{FetchOptions, RetryingTransport};
