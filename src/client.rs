use log::{debug, error, warn};
use serde::de::DeserializeOwned;
use std::time::Duration;

use crate::config::ClientConfig;
use crate::error::{CropError, Result};
use crate::transport::{ApiRequest, HttpTransport, RawResponse, Transport};

/// How a single failed attempt should be treated.
enum AttemptError {
    /// Worth another try; carries the message reported on exhaustion.
    Retryable(String),
    /// Returned to the caller immediately.
    Terminal(CropError),
}

/// HTTP helper with bounded retry and linear backoff.
///
/// Every request path is appended to the configured base endpoint. A failed
/// attempt `n` (1-based) is followed by a `backoff_unit * n` wait. Once
/// `max_attempts` attempts have failed the request reports
/// [`CropError::RequestExhausted`].
///
/// # Example
/// ```no_run
/// use batch_crop::{ApiRequest, ClientConfig, ImageDescriptor, RetryingHttpClient};
///
/// # async fn example() -> batch_crop::Result<()> {
/// let client = RetryingHttpClient::new(ClientConfig::default());
/// let images: Vec<ImageDescriptor> = client.request_json(&ApiRequest::get("/images")).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct RetryingHttpClient<T = HttpTransport> {
    transport: T,
    config: ClientConfig,
}

impl RetryingHttpClient<HttpTransport> {
    /// Create a client that talks HTTP through `reqwest`.
    pub fn new(config: ClientConfig) -> Self {
        Self::with_transport(HttpTransport::new(), config)
    }
}

impl<T: Transport> RetryingHttpClient<T> {
    /// Create a client over a custom transport.
    pub fn with_transport(transport: T, config: ClientConfig) -> Self {
        Self { transport, config }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Full request target for `path`.
    pub fn url_for(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    /// Wait applied after failed attempt `attempt` (1-based).
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        self.config.backoff_unit * attempt
    }

    /// Send `request` with the configured number of attempts and return the
    /// successful response without decoding it.
    pub async fn request(&self, request: &ApiRequest) -> Result<RawResponse> {
        self.request_with_attempts(request, self.config.max_attempts)
            .await
    }

    /// Like [`request`](Self::request) with an explicit attempt budget.
    pub async fn request_with_attempts(
        &self,
        request: &ApiRequest,
        max_attempts: u32,
    ) -> Result<RawResponse> {
        self.run(request, max_attempts, Ok).await
    }

    /// Send `request` and decode the JSON body as `R`.
    ///
    /// A body that does not decode counts as a failed attempt.
    pub async fn request_json<R: DeserializeOwned>(&self, request: &ApiRequest) -> Result<R> {
        self.run(request, self.config.max_attempts, |resp| {
            resp.json::<R>()
                .map_err(|e| format!("Invalid JSON response: {}", e))
        })
        .await
    }

    async fn run<R, F>(&self, request: &ApiRequest, max_attempts: u32, decode: F) -> Result<R>
    where
        F: Fn(RawResponse) -> std::result::Result<R, String>,
    {
        let attempts = max_attempts.max(1);
        let url = self.url_for(&request.path);
        let mut last_error = String::new();

        for attempt in 1..=attempts {
            debug!(
                "{:?} {} (attempt {}/{})",
                request.method, url, attempt, attempts
            );

            match self.attempt(&url, request, &decode).await {
                Ok(value) => return Ok(value),
                Err(AttemptError::Terminal(e)) => return Err(e),
                Err(AttemptError::Retryable(msg)) => {
                    warn!(
                        "Fetch failed (attempt {}/{}) for {}: {}",
                        attempt, attempts, request.path, msg
                    );
                    last_error = msg;
                }
            }

            if attempt < attempts {
                tokio::time::sleep(self.backoff_delay(attempt)).await;
            }
        }

        error!(
            "Giving up on {} after {} attempts: {}",
            request.path, attempts, last_error
        );
        Err(CropError::RequestExhausted {
            path: request.path.clone(),
            attempts,
            last_error,
        })
    }

    async fn attempt<R, F>(
        &self,
        url: &str,
        request: &ApiRequest,
        decode: &F,
    ) -> std::result::Result<R, AttemptError>
    where
        F: Fn(RawResponse) -> std::result::Result<R, String>,
    {
        let resp = self
            .transport
            .send(url, request, self.config.timeout)
            .await
            .map_err(AttemptError::Retryable)?;

        if !resp.is_success() {
            return Err(self.classify_status(&request.path, resp));
        }

        decode(resp).map_err(AttemptError::Retryable)
    }

    fn classify_status(&self, path: &str, resp: RawResponse) -> AttemptError {
        let status = resp.status;
        if self.config.retry_client_errors || is_retryable_status(status) {
            return AttemptError::Retryable(format!("HTTP error! status: {}", status));
        }
        if status == 404 {
            AttemptError::Terminal(CropError::NotFound(path.to_string()))
        } else {
            AttemptError::Terminal(CropError::Http {
                status,
                body: resp.text(),
            })
        }
    }
}

/// Server errors, request timeouts, and rate limiting are transient.
/// Remaining client errors will fail the same way on every attempt.
fn is_retryable_status(status: u16) -> bool {
    !(400..500).contains(&status) || status == 408 || status == 429
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_status() {
        assert!(is_retryable_status(500));
        assert!(is_retryable_status(502));
        assert!(is_retryable_status(503));
        assert!(is_retryable_status(408));
        assert!(is_retryable_status(429));
        assert!(!is_retryable_status(400));
        assert!(!is_retryable_status(401));
        assert!(!is_retryable_status(404));
        assert!(!is_retryable_status(422));
    }

    #[test]
    fn test_url_for() {
        let client = RetryingHttpClient::new(
            ClientConfig::builder()
                .with_base_url("http://localhost:3000/")
                .build(),
        );
        assert_eq!(client.url_for("/images"), "http://localhost:3000/images");
        assert_eq!(
            client.url_for("/mark-processed/a"),
            "http://localhost:3000/mark-processed/a"
        );
    }

    #[test]
    fn test_backoff_is_linear() {
        let client = RetryingHttpClient::new(
            ClientConfig::builder()
                .with_backoff_unit(Duration::from_millis(250))
                .build(),
        );
        assert_eq!(client.backoff_delay(1), Duration::from_millis(250));
        assert_eq!(client.backoff_delay(2), Duration::from_millis(500));
        assert_eq!(client.backoff_delay(3), Duration::from_millis(750));
    }
}
