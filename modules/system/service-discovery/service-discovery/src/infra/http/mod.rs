//! Outbound HTTP shared by health probes and update pushes.

use std::future::Future;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue};

use crate::config::{HttpClientConfig, MAX_RETRY_BACKOFF};
use crate::domain::error::DomainError;

/// Header carrying the shared registry credential.
pub const API_KEY_HEADER: &str = "x-api-key";

/// Builds the client every outbound request goes through. The credential is
/// attached to each request as [`API_KEY_HEADER`].
///
/// # Errors
/// [`DomainError::InvalidConfig`] when the key is not a valid header value or
/// the TLS backend cannot be initialised.
pub fn build_client(
    api_key: &str,
    config: &HttpClientConfig,
) -> Result<reqwest::Client, DomainError> {
    let mut key = HeaderValue::from_str(api_key).map_err(|_| {
        DomainError::InvalidConfig("api_key is not a valid header value".to_owned())
    })?;
    key.set_sensitive(true);

    let mut headers = HeaderMap::new();
    headers.insert(API_KEY_HEADER, key);

    reqwest::Client::builder()
        .default_headers(headers)
        .timeout(config.request_timeout)
        .build()
        .map_err(|e| DomainError::InvalidConfig(format!("failed to build http client: {e}")))
}

/// Exponential backoff retry for transport failures.
///
/// Only errors raised before a response arrives are retried. A response with
/// a failure status is returned as is, so the caller classifies it at once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the initial attempt; total attempts = 1 + `max_retries`.
    pub max_retries: usize,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl RetryPolicy {
    #[must_use]
    pub fn from_config(config: &HttpClientConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            initial_backoff: config.retry_backoff,
            max_backoff: MAX_RETRY_BACKOFF,
        }
    }

    /// Delay before retry number `retry` (0-based).
    #[must_use]
    pub fn backoff(&self, retry: usize) -> Duration {
        let factor = 2u32.saturating_pow(u32::try_from(retry).unwrap_or(u32::MAX));
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }

    /// Runs `attempt` until it yields a response, a non-retryable error, or
    /// the retry budget is spent. Dropping the returned future aborts the
    /// loop, including a pending backoff sleep.
    ///
    /// # Errors
    /// The error of the last attempt.
    pub async fn execute<F, Fut>(&self, mut attempt: F) -> reqwest::Result<reqwest::Response>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = reqwest::Result<reqwest::Response>>,
    {
        let mut retry = 0;
        loop {
            match attempt().await {
                Ok(response) => return Ok(response),
                Err(e) if retry < self.max_retries && is_transport_error(&e) => {
                    let delay = self.backoff(retry);
                    tracing::trace!(retry, delay = ?delay, error = %e, "retrying request");
                    tokio::time::sleep(delay).await;
                    retry += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

fn is_transport_error(e: &reqwest::Error) -> bool {
    !e.is_builder() && !e.is_status() && !e.is_decode()
}
