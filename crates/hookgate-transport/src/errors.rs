/// Outbound call failures. Never swallowed: every variant reaches the caller.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Shutdown has begun; no attempt was started.
    #[error("transport is shutting down")]
    ShuttingDown,

    /// Every attempt failed with a retryable status or a transport error.
    #[error("request failed after {attempts} attempts: {last_error}")]
    RetriesExhausted {
        /// Attempts made, the first included.
        attempts: u32,
        /// Status of the final attempt, if it got a response at all.
        status: Option<u16>,
        /// Description of the final failure.
        last_error: String,
    },

    /// The server answered with an error status outside the retryable set.
    #[error("request rejected with HTTP {status}")]
    Status {
        /// Response status.
        status: u16,
        /// Response body, empty if it could not be read.
        body: String,
    },

    /// The request could not be built (bad URL, header or method).
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl TransportError {
    /// Whether this error only means the process is stopping.
    pub fn is_shutdown(&self) -> bool {
        matches!(self, Self::ShuttingDown)
    }

    /// Whether the same request could succeed if sent again later.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RetriesExhausted { .. })
    }

    /// Short classification string for logging/metrics.
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::ShuttingDown => "shutting_down",
            Self::RetriesExhausted { status: Some(_), .. } => "status",
            Self::RetriesExhausted { status: None, .. } => "network",
            Self::Status { .. } => "rejected",
            Self::InvalidRequest(_) => "invalid_request",
        }
    }
}
