//! Cooperative shutdown flag.
//!
//! A [`ShutdownSignal`] is cloned into every component that must stop
//! admitting new work. Triggering it never aborts work already in flight.

use tokio_util::sync::CancellationToken;

/// Process-wide stop flag shared by dispatch and transport.
#[derive(Clone, Debug, Default)]
pub struct ShutdownSignal {
    token: CancellationToken,
}

impl ShutdownSignal {
    /// Create an untriggered signal.
    pub fn new() -> Self {
        Self::default()
    }

    /// Flip the flag. Idempotent.
    pub fn trigger(&self) {
        self.token.cancel();
    }

    /// Whether shutdown has begun.
    pub fn is_triggered(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Resolves once the signal is triggered.
    pub async fn triggered(&self) {
        self.token.cancelled().await;
    }
}
