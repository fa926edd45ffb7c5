//! Configuration for the telemetry pipeline.
//!
//! [`TelemetryConfig`] identifies the service and the collector.
//! [`ExportConfig`] carries the batching and retry knobs; its defaults are the
//! ones the exporter was tuned with (100 records, 5s interval, 3 retries
//! starting at 1s).

use crate::error::ConfigError;
use crate::retry::RetryConfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Environment variable holding the service name.
pub const ENV_SERVICE_NAME: &str = "OTEL_SERVICE_NAME";
/// Environment variable holding the collector base URL.
pub const ENV_ENDPOINT: &str = "OTEL_EXPORTER_OTLP_ENDPOINT";

/// Service identity and collector location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Reported as the `service.name` resource attribute.
    pub service_name: String,
    /// Collector base URL, e.g. `http://localhost:4318`.
    /// Signal paths (`/v1/traces`, ...) are appended to it.
    pub endpoint: String,
}

impl TelemetryConfig {
    pub fn new(service_name: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            endpoint: endpoint.into(),
        }
    }

    /// Reads `OTEL_SERVICE_NAME` and `OTEL_EXPORTER_OTLP_ENDPOINT`.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup(
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let service_name = lookup(ENV_SERVICE_NAME).ok_or(ConfigError::MissingEnv(ENV_SERVICE_NAME))?;
        let endpoint = lookup(ENV_ENDPOINT).ok_or(ConfigError::MissingEnv(ENV_ENDPOINT))?;
        let config = Self::new(service_name, endpoint);
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.service_name.trim().is_empty() {
            return Err(ConfigError::EmptyServiceName);
        }

        let url = reqwest::Url::parse(&self.endpoint).map_err(|e| ConfigError::InvalidEndpoint {
            endpoint: self.endpoint.clone(),
            reason: e.to_string(),
        })?;

        match url.scheme() {
            "http" | "https" => Ok(()),
            other => Err(ConfigError::InvalidEndpoint {
                endpoint: self.endpoint.clone(),
                reason: format!("unsupported scheme {other:?}"),
            }),
        }
    }

    /// Endpoint without a trailing slash, ready for path suffixing.
    pub fn base_endpoint(&self) -> &str {
        self.endpoint.trim_end_matches('/')
    }
}

/// Batching, scheduling and retry configuration for the exporter.
#[derive(Debug, Clone)]
pub struct ExportConfig {
    /// Buffer size at which a signal is flushed immediately.
    ///
    /// Default: 100
    pub batch_size_limit: usize,

    /// Period of the time-based flush of all three signals.
    ///
    /// Default: 5s
    pub flush_interval: Duration,

    /// Backoff policy for failed sends.
    pub retry: RetryConfig,

    /// Timeout applied to each HTTP request.
    ///
    /// Default: 10s
    pub request_timeout: Duration,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            batch_size_limit: 100,
            flush_interval: Duration::from_secs(5),
            retry: RetryConfig::default(),
            request_timeout: Duration::from_secs(10),
        }
    }
}

impl ExportConfig {
    /// Sets the batch size limit.
    pub fn with_batch_size_limit(mut self, limit: usize) -> Self {
        self.batch_size_limit = limit;
        self
    }

    /// Sets the periodic flush interval.
    pub fn with_flush_interval(mut self, interval: Duration) -> Self {
        self.flush_interval = interval;
        self
    }

    /// Sets the retry policy.
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Sets the per-request HTTP timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.batch_size_limit == 0 {
            return Err(ConfigError::ZeroBatchSize);
        }
        if self.flush_interval.is_zero() {
            return Err(ConfigError::ZeroFlushInterval);
        }
        Ok(())
    }
}

/// Which backend the facade runs on, chosen once at startup.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// Buffered OTLP/HTTP export.
    #[default]
    Otlp,
    /// Emit every signal as a local `tracing` event, export nothing.
    Console,
}
