//! Instrumentation-side mapping into OTLP records.
//!
//! The exporter treats records as opaque; this module is where
//! application-level spans, log lines and metric observations become the
//! `opentelemetry-proto` messages that [`OtlpEncoder`](crate::OtlpEncoder)
//! batches. All timestamps are Unix nanoseconds.

use crate::attributes::Attributes;
use crate::codec::key_values;
use opentelemetry_proto::tonic::common::v1::{any_value, AnyValue};
use opentelemetry_proto::tonic::logs::v1::{LogRecord, SeverityNumber};
use opentelemetry_proto::tonic::metrics::v1::{
    metric, number_data_point, AggregationTemporality, Gauge, Histogram, HistogramDataPoint,
    Metric, NumberDataPoint, Sum,
};
use opentelemetry_proto::tonic::trace::v1::{span, status, Span, Status};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// 16-byte trace identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TraceId(pub [u8; 16]);

/// 8-byte span identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SpanId(pub [u8; 8]);

impl TraceId {
    /// A random, non-zero id.
    pub fn random() -> Self {
        loop {
            let bytes: [u8; 16] = rand::random();
            if bytes != [0; 16] {
                return Self(bytes);
            }
        }
    }
}

impl SpanId {
    /// A random, non-zero id.
    pub fn random() -> Self {
        loop {
            let bytes: [u8; 8] = rand::random();
            if bytes != [0; 8] {
                return Self(bytes);
            }
        }
    }
}

fn write_hex(f: &mut fmt::Formatter<'_>, bytes: &[u8]) -> fmt::Result {
    bytes.iter().try_for_each(|b| write!(f, "{:02x}", b))
}

impl fmt::Display for TraceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_hex(f, &self.0)
    }
}

impl fmt::Display for SpanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_hex(f, &self.0)
    }
}

/// Span kind, following OpenTelemetry semantics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SpanKind {
    #[default]
    Internal,
    Server,
    Client,
    Producer,
    Consumer,
}

/// Span completion status
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SpanStatus {
    #[default]
    Unset,
    Ok,
    Error { message: String },
}

/// A completed span, ready to be mapped and buffered.
#[derive(Debug, Clone, PartialEq)]
pub struct FinishedSpan {
    pub trace_id: TraceId,
    pub span_id: SpanId,
    pub parent_span_id: Option<SpanId>,
    pub name: String,
    pub kind: SpanKind,
    pub start: SystemTime,
    pub end: SystemTime,
    pub attributes: Attributes,
    pub status: SpanStatus,
}

/// Trace/span pair used to correlate a log line with a span.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TraceContext {
    pub trace_id: TraceId,
    pub span_id: SpanId,
}

/// Log severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn severity_number(self) -> SeverityNumber {
        match self {
            LogLevel::Trace => SeverityNumber::Trace,
            LogLevel::Debug => SeverityNumber::Debug,
            LogLevel::Info => SeverityNumber::Info,
            LogLevel::Warn => SeverityNumber::Warn,
            LogLevel::Error => SeverityNumber::Error,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Trace => "TRACE",
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warn => "WARN",
            LogLevel::Error => "ERROR",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Nanoseconds since the Unix epoch; clamps pre-epoch times to zero.
pub fn unix_nanos(time: SystemTime) -> u64 {
    time.duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_nanos()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}

pub fn span_record(finished: FinishedSpan) -> Span {
    let kind = match finished.kind {
        SpanKind::Internal => span::SpanKind::Internal,
        SpanKind::Server => span::SpanKind::Server,
        SpanKind::Client => span::SpanKind::Client,
        SpanKind::Producer => span::SpanKind::Producer,
        SpanKind::Consumer => span::SpanKind::Consumer,
    };
    let status = match finished.status {
        SpanStatus::Unset => Status::default(),
        SpanStatus::Ok => Status {
            code: status::StatusCode::Ok as i32,
            ..Default::default()
        },
        SpanStatus::Error { message } => Status {
            message,
            code: status::StatusCode::Error as i32,
        },
    };

    Span {
        trace_id: finished.trace_id.0.to_vec(),
        span_id: finished.span_id.0.to_vec(),
        parent_span_id: finished
            .parent_span_id
            .map(|id| id.0.to_vec())
            .unwrap_or_default(),
        name: finished.name,
        kind: kind as i32,
        start_time_unix_nano: unix_nanos(finished.start),
        end_time_unix_nano: unix_nanos(finished.end),
        attributes: key_values(&finished.attributes),
        status: Some(status),
        ..Default::default()
    }
}

pub fn log_record(
    level: LogLevel,
    message: impl Into<String>,
    attributes: &Attributes,
    context: Option<TraceContext>,
    time: SystemTime,
) -> LogRecord {
    let nanos = unix_nanos(time);
    let (trace_id, span_id) = context
        .map(|ctx| (ctx.trace_id.0.to_vec(), ctx.span_id.0.to_vec()))
        .unwrap_or_default();

    LogRecord {
        time_unix_nano: nanos,
        observed_time_unix_nano: nanos,
        severity_number: level.severity_number() as i32,
        severity_text: level.as_str().to_string(),
        body: Some(AnyValue {
            value: Some(any_value::Value::StringValue(message.into())),
        }),
        attributes: key_values(attributes),
        trace_id,
        span_id,
        ..Default::default()
    }
}

fn number_point(value: number_data_point::Value, attributes: &Attributes, time: SystemTime) -> NumberDataPoint {
    let nanos = unix_nanos(time);
    NumberDataPoint {
        attributes: key_values(attributes),
        start_time_unix_nano: nanos,
        time_unix_nano: nanos,
        value: Some(value),
        ..Default::default()
    }
}

/// Monotonic delta sum carrying one integer increment.
pub fn counter_metric(name: impl Into<String>, value: i64, attributes: &Attributes, time: SystemTime) -> Metric {
    Metric {
        name: name.into(),
        data: Some(metric::Data::Sum(Sum {
            data_points: vec![number_point(number_data_point::Value::AsInt(value), attributes, time)],
            aggregation_temporality: AggregationTemporality::Delta as i32,
            is_monotonic: true,
        })),
        ..Default::default()
    }
}

/// Gauge with one double observation.
pub fn gauge_metric(name: impl Into<String>, value: f64, attributes: &Attributes, time: SystemTime) -> Metric {
    Metric {
        name: name.into(),
        data: Some(metric::Data::Gauge(Gauge {
            data_points: vec![number_point(number_data_point::Value::AsDouble(value), attributes, time)],
        })),
        ..Default::default()
    }
}

/// Delta histogram holding a single observation in one unbounded bucket.
pub fn histogram_metric(name: impl Into<String>, value: f64, attributes: &Attributes, time: SystemTime) -> Metric {
    let nanos = unix_nanos(time);
    Metric {
        name: name.into(),
        data: Some(metric::Data::Histogram(Histogram {
            data_points: vec![HistogramDataPoint {
                attributes: key_values(attributes),
                start_time_unix_nano: nanos,
                time_unix_nano: nanos,
                count: 1,
                sum: Some(value),
                bucket_counts: vec![1],
                min: Some(value),
                max: Some(value),
                ..Default::default()
            }],
            aggregation_temporality: AggregationTemporality::Delta as i32,
        })),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn at(secs: u64) -> SystemTime {
        UNIX_EPOCH + Duration::from_secs(secs)
    }

    #[test]
    fn test_span_record_fields() {
        let trace_id = TraceId::random();
        let parent = SpanId::random();
        let span = span_record(FinishedSpan {
            trace_id,
            span_id: SpanId([1; 8]),
            parent_span_id: Some(parent),
            name: "checkout".into(),
            kind: SpanKind::Server,
            start: at(1),
            end: at(2),
            attributes: Attributes::builder().put("http.method", "POST").build(),
            status: SpanStatus::Error {
                message: "card declined".into(),
            },
        });

        assert_eq!(span.trace_id, trace_id.0.to_vec());
        assert_eq!(span.span_id, vec![1; 8]);
        assert_eq!(span.parent_span_id, parent.0.to_vec());
        assert_eq!(span.kind, span::SpanKind::Server as i32);
        assert_eq!(span.start_time_unix_nano, 1_000_000_000);
        assert_eq!(span.end_time_unix_nano, 2_000_000_000);
        assert_eq!(span.attributes.len(), 1);

        let status = span.status.unwrap();
        assert_eq!(status.code, status::StatusCode::Error as i32);
        assert_eq!(status.message, "card declined");
    }

    #[test]
    fn test_root_span_has_no_parent() {
        let span = span_record(FinishedSpan {
            trace_id: TraceId::random(),
            span_id: SpanId::random(),
            parent_span_id: None,
            name: "root".into(),
            kind: SpanKind::default(),
            start: at(5),
            end: at(5),
            attributes: Attributes::empty(),
            status: SpanStatus::Unset,
        });

        assert!(span.parent_span_id.is_empty());
        assert_eq!(span.kind, span::SpanKind::Internal as i32);
        assert_eq!(span.status.unwrap().code, status::StatusCode::Unset as i32);
    }

    #[test]
    fn test_log_severity_and_correlation() {
        let numbers: Vec<i32> = [
            LogLevel::Trace,
            LogLevel::Debug,
            LogLevel::Info,
            LogLevel::Warn,
            LogLevel::Error,
        ]
        .iter()
        .map(|level| level.severity_number() as i32)
        .collect();
        assert_eq!(numbers, vec![1, 5, 9, 13, 17]);

        let ctx = TraceContext {
            trace_id: TraceId([7; 16]),
            span_id: SpanId([8; 8]),
        };
        let record = log_record(LogLevel::Warn, "low stock", &Attributes::empty(), Some(ctx), at(3));
        assert_eq!(record.severity_text, "WARN");
        assert_eq!(record.trace_id, vec![7; 16]);
        assert_eq!(record.span_id, vec![8; 8]);
        assert_eq!(record.time_unix_nano, 3_000_000_000);
        assert_eq!(
            record.body.and_then(|b| b.value),
            Some(any_value::Value::StringValue("low stock".into()))
        );

        let uncorrelated = log_record(LogLevel::Info, "hi", &Attributes::empty(), None, at(3));
        assert!(uncorrelated.trace_id.is_empty());
    }

    #[test]
    fn test_metric_shapes() {
        let attrs = Attributes::builder().put("route", "/cart").build();

        match counter_metric("requests", 3, &attrs, at(1)).data {
            Some(metric::Data::Sum(sum)) => {
                assert!(sum.is_monotonic);
                assert_eq!(sum.aggregation_temporality, AggregationTemporality::Delta as i32);
                assert_eq!(sum.data_points[0].value, Some(number_data_point::Value::AsInt(3)));
            }
            other => panic!("expected sum, got {:?}", other),
        }

        match gauge_metric("queue.depth", 4.5, &attrs, at(1)).data {
            Some(metric::Data::Gauge(gauge)) => {
                assert_eq!(gauge.data_points[0].value, Some(number_data_point::Value::AsDouble(4.5)));
            }
            other => panic!("expected gauge, got {:?}", other),
        }

        match histogram_metric("latency", 12.0, &attrs, at(1)).data {
            Some(metric::Data::Histogram(hist)) => {
                let point = &hist.data_points[0];
                assert_eq!(point.count, 1);
                assert_eq!(point.sum, Some(12.0));
                assert_eq!(point.min, Some(12.0));
                assert_eq!(point.max, Some(12.0));
                assert_eq!(point.bucket_counts, vec![1]);
            }
            other => panic!("expected histogram, got {:?}", other),
        }
    }

    #[test]
    fn test_ids_are_nonzero_hex() {
        let id = SpanId([0xab, 0, 0, 0, 0, 0, 0, 1]);
        assert_eq!(id.to_string(), "ab00000000000001");
        assert_ne!(TraceId::random().0, [0; 16]);
    }
}
