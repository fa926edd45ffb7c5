//! Codec boundary between buffered records and transport payloads.
//!
//! The exporter never looks inside records. It hands each drained batch plus
//! the frozen [`Resource`] to an [`Encoder`] and ships whatever bytes come
//! back. [`OtlpEncoder`] is the production codec: records are the generated
//! OTLP protobuf messages and payloads are `Export*ServiceRequest` bytes.
//!
//! # OTLP Structure
//!
//! ```text
//! ExportTraceServiceRequest
//! └── ResourceSpans[1]
//!     ├── Resource (service.name + common attributes)
//!     └── ScopeSpans[1]
//!         ├── Scope (otlp_batcher, crate version)
//!         └── Spans[] (the drained batch, in order)
//! ```
//!
//! Logs and metrics use the same single-resource, single-scope shape.

use crate::attributes::{AttributeValue, Attributes};
use crate::resource::Resource;
use opentelemetry_proto::tonic::collector::logs::v1::ExportLogsServiceRequest;
use opentelemetry_proto::tonic::collector::metrics::v1::ExportMetricsServiceRequest;
use opentelemetry_proto::tonic::collector::trace::v1::ExportTraceServiceRequest;
use opentelemetry_proto::tonic::common::v1::{any_value, AnyValue, InstrumentationScope, KeyValue};
use opentelemetry_proto::tonic::logs::v1::{LogRecord, ResourceLogs, ScopeLogs};
use opentelemetry_proto::tonic::metrics::v1::{Metric, ResourceMetrics, ScopeMetrics};
use opentelemetry_proto::tonic::resource::v1::Resource as ProtoResource;
use opentelemetry_proto::tonic::trace::v1::{ResourceSpans, ScopeSpans, Span};
use prost::Message;

/// Turns batches of records into transport payloads.
///
/// Encoding is expected to be total and side-effect free. An empty payload
/// for a non-empty batch is treated by the exporter as "nothing to send".
pub trait Encoder: Send + Sync + 'static {
    type Span: Send + 'static;
    type Log: Send + 'static;
    type Metric: Send + 'static;

    fn encode_traces(&self, spans: &[Self::Span], resource: &Resource) -> Vec<u8>;

    fn encode_logs(&self, logs: &[Self::Log], resource: &Resource) -> Vec<u8>;

    fn encode_metrics(&self, metrics: &[Self::Metric], resource: &Resource) -> Vec<u8>;
}

/// OTLP/protobuf encoder over `opentelemetry-proto` message types.
#[derive(Debug, Clone)]
pub struct OtlpEncoder {
    scope: InstrumentationScope,
}

impl Default for OtlpEncoder {
    fn default() -> Self {
        Self::with_scope(env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"))
    }
}

impl OtlpEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Uses a custom instrumentation scope name/version.
    pub fn with_scope(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            scope: InstrumentationScope {
                name: name.into(),
                version: version.into(),
                ..Default::default()
            },
        }
    }

    fn resource(resource: &Resource) -> ProtoResource {
        ProtoResource {
            attributes: key_values(resource.attributes()),
            ..Default::default()
        }
    }
}

impl Encoder for OtlpEncoder {
    type Span = Span;
    type Log = LogRecord;
    type Metric = Metric;

    fn encode_traces(&self, spans: &[Span], resource: &Resource) -> Vec<u8> {
        ExportTraceServiceRequest {
            resource_spans: vec![ResourceSpans {
                resource: Some(Self::resource(resource)),
                scope_spans: vec![ScopeSpans {
                    scope: Some(self.scope.clone()),
                    spans: spans.to_vec(),
                    ..Default::default()
                }],
                ..Default::default()
            }],
        }
        .encode_to_vec()
    }

    fn encode_logs(&self, logs: &[LogRecord], resource: &Resource) -> Vec<u8> {
        ExportLogsServiceRequest {
            resource_logs: vec![ResourceLogs {
                resource: Some(Self::resource(resource)),
                scope_logs: vec![ScopeLogs {
                    scope: Some(self.scope.clone()),
                    log_records: logs.to_vec(),
                    ..Default::default()
                }],
                ..Default::default()
            }],
        }
        .encode_to_vec()
    }

    fn encode_metrics(&self, metrics: &[Metric], resource: &Resource) -> Vec<u8> {
        ExportMetricsServiceRequest {
            resource_metrics: vec![ResourceMetrics {
                resource: Some(Self::resource(resource)),
                scope_metrics: vec![ScopeMetrics {
                    scope: Some(self.scope.clone()),
                    metrics: metrics.to_vec(),
                    ..Default::default()
                }],
                ..Default::default()
            }],
        }
        .encode_to_vec()
    }
}

/// Converts attributes into OTLP key/values.
pub fn key_values(attributes: &Attributes) -> Vec<KeyValue> {
    attributes
        .iter()
        .map(|(key, value)| KeyValue {
            key: key.to_string(),
            value: Some(to_any_value(value)),
        })
        .collect()
}

fn to_any_value(value: &AttributeValue) -> AnyValue {
    let value = match value {
        AttributeValue::String(v) => any_value::Value::StringValue(v.clone()),
        AttributeValue::Int(v) => any_value::Value::IntValue(*v),
        AttributeValue::Double(v) => any_value::Value::DoubleValue(*v),
        AttributeValue::Bool(v) => any_value::Value::BoolValue(*v),
    };
    AnyValue { value: Some(value) }
}
