//! Configuration for the discovery engine.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::domain::error::DomainError;

/// Discovery engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServiceDiscoveryConfig {
    /// Shared credential. Sent as `X-Api-Key` on probes and pushes and
    /// required on every inbound registry call.
    pub api_key: String,

    /// How long a node may stay `Down` before it is evicted.
    #[serde(with = "humantime_serde")]
    pub eviction_grace: Duration,

    /// Health probe sweep interval.
    #[serde(with = "humantime_serde")]
    pub healthcheck_interval: Duration,

    /// Number of gateway delivery workers.
    pub gateway_workers: usize,

    /// Capacity of the gateway task queue.
    pub gateway_queue_size: usize,

    /// Capacity of the extractor output channel.
    pub extractor_buffer: usize,

    /// Maximum number of health probes in flight during one sweep.
    pub probe_concurrency: usize,

    pub http: HttpClientConfig,
}

/// Outbound HTTP settings shared by probes and pushes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HttpClientConfig {
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,

    /// Retries after the first attempt, transport errors only.
    pub max_retries: usize,

    /// First retry delay; doubled per attempt up to [`MAX_RETRY_BACKOFF`].
    #[serde(with = "humantime_serde")]
    pub retry_backoff: Duration,
}

pub const MAX_RETRY_BACKOFF: Duration = Duration::from_secs(1);

fn default_workers() -> usize {
    std::thread::available_parallelism().map_or(4, std::num::NonZeroUsize::get)
}

impl Default for ServiceDiscoveryConfig {
    fn default() -> Self {
        let workers = default_workers();
        Self {
            api_key: String::new(),
            eviction_grace: Duration::from_secs(3),
            healthcheck_interval: Duration::from_secs(1),
            gateway_workers: workers,
            gateway_queue_size: workers,
            extractor_buffer: 100,
            probe_concurrency: 16,
            http: HttpClientConfig::default(),
        }
    }
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(5),
            max_retries: 3,
            retry_backoff: Duration::from_millis(50),
        }
    }
}

impl ServiceDiscoveryConfig {
    /// Rejects settings no component can run with.
    ///
    /// # Errors
    /// Returns [`DomainError::InvalidConfig`] naming the first offending field.
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.api_key.trim().is_empty() {
            return Err(DomainError::InvalidConfig("api_key must be set".to_owned()));
        }
        let durations = [
            ("eviction_grace", self.eviction_grace),
            ("healthcheck_interval", self.healthcheck_interval),
            ("http.request_timeout", self.http.request_timeout),
        ];
        for (name, value) in durations {
            if value.is_zero() {
                return Err(DomainError::InvalidConfig(format!(
                    "{name} must be greater than zero"
                )));
            }
        }
        let sizes = [
            ("gateway_workers", self.gateway_workers),
            ("gateway_queue_size", self.gateway_queue_size),
            ("extractor_buffer", self.extractor_buffer),
            ("probe_concurrency", self.probe_concurrency),
        ];
        for (name, value) in sizes {
            if value == 0 {
                return Err(DomainError::InvalidConfig(format!(
                    "{name} must be greater than zero"
                )));
            }
        }
        Ok(())
    }
}
