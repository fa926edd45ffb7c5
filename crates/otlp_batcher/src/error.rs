//! Error types for exporter construction.
//!
//! Errors only surface when an exporter or backend is being built. Once
//! running, nothing on the producer path fails: flush problems are logged and
//! reported as [`FlushOutcome`](crate::FlushOutcome) values instead.

use thiserror::Error;

/// Invalid or unusable configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// Service name is empty.
    #[error("service name must not be empty")]
    EmptyServiceName,

    /// Endpoint is not an absolute http(s) URL.
    #[error("invalid endpoint {endpoint:?}: {reason}")]
    InvalidEndpoint { endpoint: String, reason: String },

    /// A required environment variable is unset.
    #[error("environment variable {0} is not set")]
    MissingEnv(&'static str),

    /// Batch size limit of zero would flush on every add.
    #[error("batch size limit must be greater than zero")]
    ZeroBatchSize,

    /// Flush interval of zero would spin the periodic task.
    #[error("flush interval must be greater than zero")]
    ZeroFlushInterval,

    /// Exporter constructed outside a tokio runtime.
    #[error("no tokio runtime available: {0}")]
    NoRuntime(String),
}

/// Errors raised while initializing the telemetry facade.
#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    /// The HTTP client could not be built.
    #[error("transport initialization failed: {0}")]
    Transport(String),
}
