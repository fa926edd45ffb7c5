//! Buffered OTLP/HTTP Telemetry Exporter
//!
//! A client-side pipeline that accumulates trace spans, log records and metric
//! points, groups them into batches and ships them to an OpenTelemetry
//! collector over HTTP/protobuf. Memory is bounded by the batch size limit,
//! latency by the flush interval, and transient collector failures are
//! absorbed by bounded exponential backoff.
//!
//! # Architecture
//!
//! ```text
//! producers ──add_*──► SignalBuffer (traces) ─┐
//!                      SignalBuffer (logs)   ─┼─ size / interval / shutdown
//!                      SignalBuffer (metrics)─┘            │
//!                                                          ▼
//!                                    drain ─► Encoder ─► RetryingClient ─► Transport
//!                                                                          POST /v1/{signal}
//! ```
//!
//! Producer calls never block on I/O and never fail. Each signal is flushed
//! independently: a collector rejecting traces does not delay logs or metrics.
//!
//! # Quick Start
//!
//! ```ignore
//! use otlp_batcher::{BackendKind, ExportConfig, LogLevel, Telemetry, TelemetryConfig};
//!
//! let telemetry = Telemetry::init(
//!     TelemetryConfig::from_env()?,
//!     ExportConfig::default(),
//!     BackendKind::Otlp,
//! )?;
//!
//! let span = telemetry.span("handle_request", &Attributes::empty());
//! span.log(LogLevel::Info, "request accepted", &Attributes::empty());
//! span.end();
//!
//! telemetry.shutdown().await;
//! ```

pub mod attributes;
pub mod batch_exporter;
pub mod buffer;
pub mod codec;
pub mod config;
pub mod error;
pub mod metrics;
pub mod records;
pub mod resource;
pub mod retry;
pub mod signal;
pub mod telemetry;
pub mod transport;

// Re-export main types
pub use attributes::{AttributeValue, Attributes, AttributesBuilder};
pub use batch_exporter::{BatchExporter, ExporterState, FlushOutcome, FlushReport};
pub use buffer::{AddOutcome, SignalBuffer};
pub use codec::{key_values, Encoder, OtlpEncoder};
pub use config::{BackendKind, ExportConfig, TelemetryConfig, ENV_ENDPOINT, ENV_SERVICE_NAME};
pub use error::{ConfigError, TelemetryError};
pub use metrics::{ExportMetrics, SignalMetrics};
pub use records::{
    counter_metric, gauge_metric, histogram_metric, log_record, span_record, FinishedSpan,
    LogLevel, SpanId, SpanKind, SpanStatus, TraceContext, TraceId,
};
pub use resource::{Resource, SERVICE_NAME};
pub use retry::{RetryConfig, RetryingClient};
pub use signal::{Endpoints, Signal};
pub use telemetry::{BufferedOtlpBackend, ConsoleBackend, SpanGuard, Telemetry, TelemetryBackend};
pub use transport::{HttpTransport, Transport, TransportError, PROTOBUF_CONTENT_TYPE};
