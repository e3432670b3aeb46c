/// Admission failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DispatchError {
    /// Shutdown has begun; the caller was not (and will not be) admitted.
    #[error("dispatcher is shutting down")]
    ShuttingDown,
}

impl DispatchError {
    /// Whether this rejection only means the process is stopping.
    pub fn is_shutdown(&self) -> bool {
        matches!(self, Self::ShuttingDown)
    }
}
