use std::sync::Arc;
use std::time::Duration;

use hookgate_core::ShutdownSignal;
use hookgate_core::retry::{RetryPolicy, parse_retry_after_header};
use metrics::counter;
use reqwest::header::RETRY_AFTER;
use reqwest::{Client, Method, Response};
use tracing::{debug, warn};

use crate::errors::TransportError;

/// Request shape, reused verbatim for every attempt.
#[derive(Clone, Debug)]
pub struct FetchOptions {
    /// HTTP method.
    pub method: Method,
    /// Extra request headers.
    pub headers: Vec<(String, String)>,
    /// Request body, if any.
    pub body: Option<String>,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            method: Method::GET,
            headers: Vec::new(),
            body: None,
        }
    }
}

impl FetchOptions {
    /// POST with a JSON body.
    pub fn post_json(body: impl Into<String>) -> Self {
        Self {
            method: Method::POST,
            headers: vec![("content-type".into(), "application/json".into())],
            body: Some(body.into()),
        }
    }

    /// Add a header.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}

type JitterSource = Arc<dyn Fn() -> f64 + Send + Sync>;

/// Why an attempt is being retried.
enum Failure {
    Status { status: u16, retry_after_ms: Option<u64> },
    Transport { message: String, timeout: bool },
}

impl Failure {
    fn reason(&self) -> &'static str {
        match self {
            Self::Status { .. } => "status",
            Self::Transport { timeout: true, .. } => "timeout",
            Self::Transport { .. } => "network",
        }
    }

    fn describe(&self) -> String {
        match self {
            Self::Status { status, .. } => format!("HTTP {status}"),
            Self::Transport { message, .. } => message.clone(),
        }
    }
}

/// HTTP client that retries retryable failures with exponential backoff.
#[derive(Clone)]
pub struct RetryingTransport {
    client: Client,
    shutdown: ShutdownSignal,
    jitter: JitterSource,
}

impl std::fmt::Debug for RetryingTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryingTransport")
            .field("shutting_down", &self.shutdown.is_triggered())
            .finish_non_exhaustive()
    }
}

impl RetryingTransport {
    /// Transport over a default client.
    pub fn new(shutdown: ShutdownSignal) -> Self {
        Self::with_client(Client::new(), shutdown)
    }

    /// Transport over a caller-configured client.
    pub fn with_client(client: Client, shutdown: ShutdownSignal) -> Self {
        Self {
            client,
            shutdown,
            jitter: Arc::new(rand::random::<f64>),
        }
    }

    /// Replace the jitter source. Values are clamped to `[0, 1]`.
    #[must_use]
    pub fn with_jitter(mut self, jitter: impl Fn() -> f64 + Send + Sync + 'static) -> Self {
        self.jitter = Arc::new(jitter);
        self
    }

    /// Send a request, retrying per `policy`.
    ///
    /// A status outside `policy.retry_on_statuses` ends the call at once:
    /// 4xx and 5xx become [`TransportError::Status`], anything else is
    /// returned as `Ok`. The shutdown flag is checked before every attempt
    /// and during every backoff sleep; an attempt already in flight runs to
    /// completion or its own timeout.
    pub async fn fetch_with_retry(
        &self,
        url: &str,
        options: &FetchOptions,
        policy: &RetryPolicy,
    ) -> Result<Response, TransportError> {
        let max_attempts = policy.max_attempts();
        let mut attempt: u32 = 0;

        loop {
            if self.shutdown.is_triggered() {
                debug!(url, attempt, "shutdown set, not starting attempt");
                return Err(TransportError::ShuttingDown);
            }

            let failure = match self.send_once(url, options, policy).await {
                Ok(response) => {
                    let status = response.status().as_u16();
                    if !policy.is_retryable_status(status) {
                        let code = response.status();
                        if code.is_client_error() || code.is_server_error() {
                            let body = response.text().await.unwrap_or_default();
                            debug!(url, status, "non-retryable status");
                            return Err(TransportError::Status { status, body });
                        }
                        return Ok(response);
                    }
                    let retry_after_ms = response
                        .headers()
                        .get(RETRY_AFTER)
                        .and_then(|v| v.to_str().ok())
                        .and_then(parse_retry_after_header);
                    Failure::Status {
                        status,
                        retry_after_ms,
                    }
                }
                Err(e) if e.is_builder() => {
                    return Err(TransportError::InvalidRequest(e.to_string()));
                }
                Err(e) => Failure::Transport {
                    message: e.to_string(),
                    timeout: e.is_timeout(),
                },
            };

            attempt += 1;
            if attempt >= max_attempts {
                warn!(url, attempts = attempt, error = %failure.describe(), "retries exhausted");
                return Err(TransportError::RetriesExhausted {
                    attempts: attempt,
                    status: match failure {
                        Failure::Status { status, .. } => Some(status),
                        Failure::Transport { .. } => None,
                    },
                    last_error: failure.describe(),
                });
            }

            let delay_ms = self.delay_ms(policy, attempt - 1, &failure);
            warn!(
                url,
                attempt,
                max_attempts,
                delay_ms,
                reason = failure.reason(),
                error = %failure.describe(),
                "retrying request"
            );
            counter!("transport_retries_total", "reason" => failure.reason()).increment(1);

            tokio::select! {
                biased;
                () = self.shutdown.triggered() => {
                    debug!(url, "shutdown during backoff");
                    return Err(TransportError::ShuttingDown);
                }
                () = tokio::time::sleep(Duration::from_millis(delay_ms)) => {}
            }
        }
    }

    async fn send_once(
        &self,
        url: &str,
        options: &FetchOptions,
        policy: &RetryPolicy,
    ) -> Result<Response, reqwest::Error> {
        let mut request = self
            .client
            .request(options.method.clone(), url)
            .timeout(Duration::from_millis(policy.timeout_ms));
        for (name, value) in &options.headers {
            request = request.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &options.body {
            request = request.body(body.clone());
        }
        request.send().await
    }

    /// Backoff after the `failed_attempt`-th attempt (0-indexed), stretched to
    /// any server-provided `Retry-After`, capped at `policy.max_delay_ms`.
    fn delay_ms(&self, policy: &RetryPolicy, failed_attempt: u32, failure: &Failure) -> u64 {
        let backoff = policy.delay_for(failed_attempt, (self.jitter)());
        let delay = match failure {
            Failure::Status {
                retry_after_ms: Some(hint),
                ..
            } => backoff.max(*hint),
            _ => backoff,
        };
        policy.cap_delay(delay)
    }
}
