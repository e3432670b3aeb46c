//! # hookgate-dispatch
//!
//! Caps how many calls to the external compute provider run at once.
//! Waiters are admitted in arrival order; once shutdown begins, new and
//! queued callers are turned away while in-flight work is allowed to drain.

#![deny(unsafe_code)]

pub mod controller;
pub mod errors;

pub use controller::{DispatchController, DispatchStats, Slot};
pub use errors::DispatchError;
