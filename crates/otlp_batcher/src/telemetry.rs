//! Telemetry Facade
//!
//! Application code talks to [`Telemetry`], which forwards to one
//! [`TelemetryBackend`] picked at startup from [`BackendKind`]:
//!
//! - [`BufferedOtlpBackend`]: maps calls into OTLP records and feeds a
//!   [`BatchExporter`]
//! - [`ConsoleBackend`]: emits every call as a local `tracing` event
//!
//! Common attributes are merged into every span, log and metric point at
//! record time; attributes passed to the call win on key collisions.

use crate::attributes::{AttributeValue, Attributes};
use crate::batch_exporter::BatchExporter;
use crate::codec::OtlpEncoder;
use crate::config::{BackendKind, ExportConfig, TelemetryConfig};
use crate::error::TelemetryError;
use crate::records::{
    counter_metric, gauge_metric, histogram_metric, log_record, span_record, FinishedSpan,
    LogLevel, SpanId, SpanKind, SpanStatus, TraceContext, TraceId,
};
use crate::transport::{HttpTransport, Transport};
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::SystemTime;
use tracing::{debug, error, info, trace, warn};

/// Capability set every backend provides.
///
/// Object-safe so the facade can hold `Arc<dyn TelemetryBackend>`;
/// `shutdown` therefore returns a boxed future.
pub trait TelemetryBackend: Send + Sync {
    fn record_span(&self, span: FinishedSpan);

    fn log(
        &self,
        level: LogLevel,
        message: &str,
        attributes: &Attributes,
        context: Option<TraceContext>,
    );

    fn counter(&self, name: &str, value: i64, attributes: &Attributes);

    fn histogram(&self, name: &str, value: f64, attributes: &Attributes);

    fn gauge(&self, name: &str, value: f64, attributes: &Attributes);

    fn set_common_attributes(&self, attributes: Attributes);

    fn shutdown(&self) -> Pin<Box<dyn Future<Output = ()> + Send + '_>>;

    /// Returns the backend name for debugging.
    fn name(&self) -> &str;
}

/// Backend that buffers OTLP records and exports them over HTTP.
pub struct BufferedOtlpBackend<T: Transport = HttpTransport> {
    exporter: BatchExporter<OtlpEncoder, T>,
}

impl BufferedOtlpBackend<HttpTransport> {
    /// Builds the HTTP exporter and starts its periodic flush.
    pub fn init(
        config: TelemetryConfig,
        export_config: ExportConfig,
        initial_attributes: Attributes,
    ) -> Result<Self, TelemetryError> {
        let exporter = BatchExporter::new(config, export_config, initial_attributes)?;
        Ok(Self::with_exporter(exporter))
    }
}

impl<T: Transport> BufferedOtlpBackend<T> {
    /// Wraps an exporter, starting it if it is idle.
    pub fn with_exporter(exporter: BatchExporter<OtlpEncoder, T>) -> Self {
        exporter.start();
        Self { exporter }
    }

    pub fn exporter(&self) -> &BatchExporter<OtlpEncoder, T> {
        &self.exporter
    }

    fn with_common(&self, attributes: &Attributes) -> Attributes {
        Attributes::merge(&self.exporter.common_attributes(), attributes)
    }
}

impl<T: Transport> TelemetryBackend for BufferedOtlpBackend<T> {
    fn record_span(&self, mut span: FinishedSpan) {
        span.attributes = self.with_common(&span.attributes);
        self.exporter.add_span(span_record(span));
    }

    fn log(
        &self,
        level: LogLevel,
        message: &str,
        attributes: &Attributes,
        context: Option<TraceContext>,
    ) {
        let attributes = self.with_common(attributes);
        self.exporter
            .add_log(log_record(level, message, &attributes, context, SystemTime::now()));
    }

    fn counter(&self, name: &str, value: i64, attributes: &Attributes) {
        let attributes = self.with_common(attributes);
        self.exporter
            .add_metric(counter_metric(name, value, &attributes, SystemTime::now()));
    }

    fn histogram(&self, name: &str, value: f64, attributes: &Attributes) {
        let attributes = self.with_common(attributes);
        self.exporter
            .add_metric(histogram_metric(name, value, &attributes, SystemTime::now()));
    }

    fn gauge(&self, name: &str, value: f64, attributes: &Attributes) {
        let attributes = self.with_common(attributes);
        self.exporter
            .add_metric(gauge_metric(name, value, &attributes, SystemTime::now()));
    }

    fn set_common_attributes(&self, attributes: Attributes) {
        self.exporter.set_common_attributes(attributes);
    }

    fn shutdown(&self) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        Box::pin(self.exporter.shutdown())
    }

    fn name(&self) -> &str {
        "otlp"
    }
}

/// Backend that writes every signal as a `tracing` event under the
/// `telemetry` target. Nothing leaves the process.
pub struct ConsoleBackend {
    service_name: String,
    common: RwLock<Attributes>,
}

impl ConsoleBackend {
    pub fn init(config: &TelemetryConfig, initial_attributes: Attributes) -> Self {
        Self {
            service_name: config.service_name.clone(),
            common: RwLock::new(initial_attributes),
        }
    }

    fn with_common(&self, attributes: &Attributes) -> Attributes {
        let common = self.common.read().unwrap_or_else(PoisonError::into_inner);
        Attributes::merge(&common, attributes)
    }

    pub fn common_attributes(&self) -> Attributes {
        self.common
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

fn format_attributes(attributes: &Attributes) -> String {
    let pairs: Vec<String> = attributes
        .iter()
        .map(|(key, value)| format!("{}={}", key, value))
        .collect();
    pairs.join(" ")
}

impl TelemetryBackend for ConsoleBackend {
    fn record_span(&self, span: FinishedSpan) {
        let duration = span.end.duration_since(span.start).unwrap_or_default();
        info!(
            target: "telemetry",
            service = %self.service_name,
            trace_id = %span.trace_id,
            span_id = %span.span_id,
            parent_span_id = ?span.parent_span_id.map(|id| id.to_string()),
            name = %span.name,
            kind = ?span.kind,
            status = ?span.status,
            ?duration,
            attributes = %format_attributes(&self.with_common(&span.attributes)),
            "span"
        );
    }

    fn log(
        &self,
        level: LogLevel,
        message: &str,
        attributes: &Attributes,
        context: Option<TraceContext>,
    ) {
        let attributes = format_attributes(&self.with_common(attributes));
        let trace_id = context.map(|ctx| ctx.trace_id.to_string());
        match level {
            LogLevel::Trace => {
                trace!(target: "telemetry", service = %self.service_name, ?trace_id, %attributes, "{}", message)
            }
            LogLevel::Debug => {
                debug!(target: "telemetry", service = %self.service_name, ?trace_id, %attributes, "{}", message)
            }
            LogLevel::Info => {
                info!(target: "telemetry", service = %self.service_name, ?trace_id, %attributes, "{}", message)
            }
            LogLevel::Warn => {
                warn!(target: "telemetry", service = %self.service_name, ?trace_id, %attributes, "{}", message)
            }
            LogLevel::Error => {
                error!(target: "telemetry", service = %self.service_name, ?trace_id, %attributes, "{}", message)
            }
        }
    }

    fn counter(&self, name: &str, value: i64, attributes: &Attributes) {
        info!(
            target: "telemetry",
            service = %self.service_name,
            metric = name,
            value,
            attributes = %format_attributes(&self.with_common(attributes)),
            "counter"
        );
    }

    fn histogram(&self, name: &str, value: f64, attributes: &Attributes) {
        info!(
            target: "telemetry",
            service = %self.service_name,
            metric = name,
            value,
            attributes = %format_attributes(&self.with_common(attributes)),
            "histogram"
        );
    }

    fn gauge(&self, name: &str, value: f64, attributes: &Attributes) {
        info!(
            target: "telemetry",
            service = %self.service_name,
            metric = name,
            value,
            attributes = %format_attributes(&self.with_common(attributes)),
            "gauge"
        );
    }

    fn set_common_attributes(&self, attributes: Attributes) {
        *self.common.write().unwrap_or_else(PoisonError::into_inner) = attributes;
    }

    fn shutdown(&self) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        Box::pin(async {})
    }

    fn name(&self) -> &str {
        "console"
    }
}

/// Application-facing handle. Cheap to clone; all clones share one backend.
///
/// # Example
///
/// ```ignore
/// let telemetry = Telemetry::init(config, ExportConfig::default(), BackendKind::Otlp)?;
///
/// let mut span = telemetry.span("load_cart", &Attributes::empty());
/// span.set_attribute("cart.items", 3);
/// telemetry.counter("cart.loads", 1, &Attributes::empty());
/// span.end();
///
/// telemetry.shutdown().await;
/// ```
#[derive(Clone)]
pub struct Telemetry {
    backend: Arc<dyn TelemetryBackend>,
}

impl Telemetry {
    /// Builds the backend selected by `kind`. Must be called inside a tokio
    /// runtime when `kind` is [`BackendKind::Otlp`].
    pub fn init(
        config: TelemetryConfig,
        export_config: ExportConfig,
        kind: BackendKind,
    ) -> Result<Self, TelemetryError> {
        Self::init_with_attributes(config, export_config, kind, Attributes::empty())
    }

    /// Like [`init`](Self::init), with common attributes known up front.
    /// These also become part of the exported resource.
    pub fn init_with_attributes(
        config: TelemetryConfig,
        export_config: ExportConfig,
        kind: BackendKind,
        initial_attributes: Attributes,
    ) -> Result<Self, TelemetryError> {
        let backend: Arc<dyn TelemetryBackend> = match kind {
            BackendKind::Otlp => Arc::new(BufferedOtlpBackend::init(
                config,
                export_config,
                initial_attributes,
            )?),
            BackendKind::Console => {
                config.validate()?;
                Arc::new(ConsoleBackend::init(&config, initial_attributes))
            }
        };
        info!(backend = backend.name(), "telemetry initialized");
        Ok(Self { backend })
    }

    pub fn from_backend(backend: Arc<dyn TelemetryBackend>) -> Self {
        Self { backend }
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    /// Starts a root span. It is recorded when the guard ends or drops.
    pub fn span(&self, name: impl Into<String>, attributes: &Attributes) -> SpanGuard {
        SpanGuard::start(
            Arc::clone(&self.backend),
            TraceId::random(),
            None,
            name.into(),
            attributes.clone(),
        )
    }

    pub fn log(&self, level: LogLevel, message: &str, attributes: &Attributes) {
        self.backend.log(level, message, attributes, None);
    }

    pub fn counter(&self, name: &str, value: i64, attributes: &Attributes) {
        self.backend.counter(name, value, attributes);
    }

    pub fn histogram(&self, name: &str, value: f64, attributes: &Attributes) {
        self.backend.histogram(name, value, attributes);
    }

    pub fn gauge(&self, name: &str, value: f64, attributes: &Attributes) {
        self.backend.gauge(name, value, attributes);
    }

    /// Replaces the attributes merged into every later record.
    pub fn set_common_attributes(&self, attributes: Attributes) {
        self.backend.set_common_attributes(attributes);
    }

    /// Flushes and releases the backend. Later calls are no-ops.
    pub async fn shutdown(&self) {
        self.backend.shutdown().await;
    }
}

/// An open span. Ends explicitly with [`end`](Self::end), or implicitly on
/// drop with `Unset` status.
pub struct SpanGuard {
    backend: Arc<dyn TelemetryBackend>,
    trace_id: TraceId,
    span_id: SpanId,
    parent_span_id: Option<SpanId>,
    name: String,
    kind: SpanKind,
    start: SystemTime,
    attributes: Attributes,
    status: SpanStatus,
    finished: bool,
}

impl SpanGuard {
    fn start(
        backend: Arc<dyn TelemetryBackend>,
        trace_id: TraceId,
        parent_span_id: Option<SpanId>,
        name: String,
        attributes: Attributes,
    ) -> Self {
        Self {
            backend,
            trace_id,
            span_id: SpanId::random(),
            parent_span_id,
            name,
            kind: SpanKind::Internal,
            start: SystemTime::now(),
            attributes,
            status: SpanStatus::Unset,
            finished: false,
        }
    }

    /// Starts a span in the same trace with this span as parent.
    pub fn child(&self, name: impl Into<String>) -> SpanGuard {
        SpanGuard::start(
            Arc::clone(&self.backend),
            self.trace_id,
            Some(self.span_id),
            name.into(),
            Attributes::empty(),
        )
    }

    pub fn context(&self) -> TraceContext {
        TraceContext {
            trace_id: self.trace_id,
            span_id: self.span_id,
        }
    }

    pub fn set_kind(&mut self, kind: SpanKind) {
        self.kind = kind;
    }

    pub fn set_attribute(&mut self, key: impl Into<String>, value: impl Into<AttributeValue>) {
        self.attributes = Attributes::builder()
            .put_all(&self.attributes)
            .put(key, value)
            .build();
    }

    /// Marks the span failed. The last recorded error wins.
    pub fn record_error(&mut self, message: impl Into<String>) {
        self.status = SpanStatus::Error {
            message: message.into(),
        };
    }

    /// Emits a log line correlated with this span.
    pub fn log(&self, level: LogLevel, message: &str, attributes: &Attributes) {
        self.backend
            .log(level, message, attributes, Some(self.context()));
    }

    /// Ends the span: `Ok` unless an error was recorded.
    pub fn end(mut self) {
        let status = match std::mem::take(&mut self.status) {
            SpanStatus::Unset => SpanStatus::Ok,
            other => other,
        };
        self.finish(status);
    }

    fn finish(&mut self, status: SpanStatus) {
        if self.finished {
            return;
        }
        self.finished = true;

        self.backend.record_span(FinishedSpan {
            trace_id: self.trace_id,
            span_id: self.span_id,
            parent_span_id: self.parent_span_id,
            name: std::mem::take(&mut self.name),
            kind: self.kind,
            start: self.start,
            end: SystemTime::now(),
            attributes: std::mem::take(&mut self.attributes),
            status,
        });
    }
}

impl Drop for SpanGuard {
    fn drop(&mut self) {
        let status = std::mem::take(&mut self.status);
        self.finish(status);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retry::RetryConfig;
    use crate::transport::RecordingTransport;
    use opentelemetry_proto::tonic::collector::logs::v1::ExportLogsServiceRequest;
    use opentelemetry_proto::tonic::collector::metrics::v1::ExportMetricsServiceRequest;
    use opentelemetry_proto::tonic::collector::trace::v1::ExportTraceServiceRequest;
    use opentelemetry_proto::tonic::common::v1::{any_value, KeyValue};
    use opentelemetry_proto::tonic::trace::v1::{status, Span};
    use prost::Message;
    use std::sync::Mutex;
    use std::time::Duration;

    fn otlp_backend() -> Arc<BufferedOtlpBackend<RecordingTransport>> {
        let exporter = BatchExporter::with_parts(
            TelemetryConfig::new("shop", "http://collector:4318"),
            ExportConfig::default().with_retry(RetryConfig::new(0, Duration::from_millis(1))),
            Attributes::builder().put("env", "test").build(),
            OtlpEncoder::new(),
            RecordingTransport::new(),
        )
        .unwrap();
        Arc::new(BufferedOtlpBackend::with_exporter(exporter))
    }

    fn attr<'a>(attrs: &'a [KeyValue], key: &str) -> Option<&'a any_value::Value> {
        attrs
            .iter()
            .find(|kv| kv.key == key)
            .and_then(|kv| kv.value.as_ref())
            .and_then(|v| v.value.as_ref())
    }

    fn exported_spans(backend: &BufferedOtlpBackend<RecordingTransport>) -> Vec<Span> {
        backend
            .exporter()
            .client()
            .transport()
            .sent_to("/v1/traces")
            .iter()
            .flat_map(|bytes| {
                ExportTraceServiceRequest::decode(bytes.as_ref())
                    .unwrap()
                    .resource_spans
            })
            .flat_map(|rs| rs.scope_spans)
            .flat_map(|ss| ss.spans)
            .collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_span_tree_exported_with_statuses() {
        let backend = otlp_backend();
        let telemetry = Telemetry::from_backend(backend.clone());

        let mut root = telemetry.span("checkout", &Attributes::builder().put("cart.id", "c-9").build());
        root.set_kind(SpanKind::Server);
        root.set_attribute("items", 2);

        let mut child = root.child("charge_card");
        child.record_error("declined");
        child.end();

        let dropped = root.child("audit");
        drop(dropped);

        root.end();
        telemetry.shutdown().await;

        let spans = exported_spans(&backend);
        assert_eq!(spans.len(), 3);

        let by_name = |name: &str| spans.iter().find(|s| s.name == name).unwrap();
        let root = by_name("checkout");
        let child = by_name("charge_card");
        let audit = by_name("audit");

        assert!(root.parent_span_id.is_empty());
        assert_eq!(child.parent_span_id, root.span_id);
        assert_eq!(child.trace_id, root.trace_id);

        assert_eq!(root.status.as_ref().unwrap().code, status::StatusCode::Ok as i32);
        assert_eq!(child.status.as_ref().unwrap().code, status::StatusCode::Error as i32);
        assert_eq!(child.status.as_ref().unwrap().message, "declined");
        assert_eq!(audit.status.as_ref().unwrap().code, status::StatusCode::Unset as i32);

        assert_eq!(attr(&root.attributes, "items"), Some(&any_value::Value::IntValue(2)));
        // Initial attributes are common attributes too
        assert_eq!(
            attr(&root.attributes, "env"),
            Some(&any_value::Value::StringValue("test".into()))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_call_attributes_override_common() {
        let backend = otlp_backend();
        let telemetry = Telemetry::from_backend(backend.clone());

        telemetry.set_common_attributes(
            Attributes::builder()
                .put("region", "eu")
                .put("tier", "free")
                .build(),
        );
        telemetry.log(
            LogLevel::Info,
            "upgraded",
            &Attributes::builder().put("tier", "pro").build(),
        );
        telemetry.shutdown().await;

        let payloads = backend.exporter().client().transport().sent_to("/v1/logs");
        let request = ExportLogsServiceRequest::decode(payloads[0].as_ref()).unwrap();
        let record = &request.resource_logs[0].scope_logs[0].log_records[0];

        assert_eq!(attr(&record.attributes, "tier"), Some(&any_value::Value::StringValue("pro".into())));
        assert_eq!(attr(&record.attributes, "region"), Some(&any_value::Value::StringValue("eu".into())));
        // The replaced set no longer carries the initial attributes
        assert_eq!(attr(&record.attributes, "env"), None);

        // Resource stays frozen at the initial attributes
        let resource_attrs = &request.resource_logs[0].resource.as_ref().unwrap().attributes;
        assert_eq!(attr(resource_attrs, "region"), None);
        assert_eq!(
            attr(resource_attrs, "service.name"),
            Some(&any_value::Value::StringValue("shop".into()))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_metrics_land_in_one_batch() {
        let backend = otlp_backend();
        let telemetry = Telemetry::from_backend(backend.clone());

        telemetry.counter("orders", 1, &Attributes::empty());
        telemetry.histogram("latency_ms", 42.0, &Attributes::empty());
        telemetry.gauge("queue", 3.0, &Attributes::empty());
        telemetry.shutdown().await;

        let payloads = backend.exporter().client().transport().sent_to("/v1/metrics");
        assert_eq!(payloads.len(), 1);
        let request = ExportMetricsServiceRequest::decode(payloads[0].as_ref()).unwrap();
        let names: Vec<&str> = request.resource_metrics[0].scope_metrics[0]
            .metrics
            .iter()
            .map(|m| m.name.as_str())
            .collect();
        assert_eq!(names, vec!["orders", "latency_ms", "queue"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_span_log_is_correlated() {
        let backend = otlp_backend();
        let telemetry = Telemetry::from_backend(backend.clone());

        let span = telemetry.span("work", &Attributes::empty());
        span.log(LogLevel::Warn, "slow", &Attributes::empty());
        let ctx = span.context();
        span.end();
        telemetry.shutdown().await;

        let payloads = backend.exporter().client().transport().sent_to("/v1/logs");
        let request = ExportLogsServiceRequest::decode(payloads[0].as_ref()).unwrap();
        let record = &request.resource_logs[0].scope_logs[0].log_records[0];
        assert_eq!(record.trace_id, ctx.trace_id.0.to_vec());
        assert_eq!(record.span_id, ctx.span_id.0.to_vec());
    }

    /// Backend double that keeps finished spans in memory.
    #[derive(Default)]
    struct CapturingBackend {
        spans: Mutex<Vec<FinishedSpan>>,
    }

    impl TelemetryBackend for CapturingBackend {
        fn record_span(&self, span: FinishedSpan) {
            self.spans.lock().unwrap().push(span);
        }
        fn log(&self, _: LogLevel, _: &str, _: &Attributes, _: Option<TraceContext>) {}
        fn counter(&self, _: &str, _: i64, _: &Attributes) {}
        fn histogram(&self, _: &str, _: f64, _: &Attributes) {}
        fn gauge(&self, _: &str, _: f64, _: &Attributes) {}
        fn set_common_attributes(&self, _: Attributes) {}
        fn shutdown(&self) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
            Box::pin(async {})
        }
        fn name(&self) -> &str {
            "capturing"
        }
    }

    #[test]
    fn test_guard_records_exactly_once() {
        let backend = Arc::new(CapturingBackend::default());
        let telemetry = Telemetry::from_backend(backend.clone());

        let mut failed = telemetry.span("a", &Attributes::empty());
        failed.record_error("boom");
        drop(failed);
        telemetry.span("b", &Attributes::empty()).end();

        let spans = backend.spans.lock().unwrap();
        assert_eq!(spans.len(), 2);
        // An error recorded before drop is kept
        assert_eq!(
            spans[0].status,
            SpanStatus::Error {
                message: "boom".into()
            }
        );
        assert_eq!(spans[1].status, SpanStatus::Ok);
        assert!(spans[0].end >= spans[0].start);
    }

    /// Collects formatted tracing output in memory.
    #[derive(Clone, Default)]
    struct CapturedOutput(Arc<std::sync::Mutex<Vec<u8>>>);

    impl std::io::Write for CapturedOutput {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl CapturedOutput {
        fn line_containing(&self, needle: &str) -> String {
            let text = String::from_utf8(self.0.lock().unwrap().clone()).unwrap();
            text.lines()
                .find(|line| line.contains(needle))
                .map(str::to_owned)
                .unwrap_or_else(|| panic!("no line with {:?} in:\n{}", needle, text))
        }
    }

    #[test]
    fn test_console_backend_emits_tracing_events() {
        let output = CapturedOutput::default();
        let writer = output.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .without_time()
            .with_max_level(tracing::Level::TRACE)
            .finish();

        let trace_id = tracing::subscriber::with_default(subscriber, || {
            let telemetry = Telemetry::init_with_attributes(
                TelemetryConfig::new("shop", "http://collector:4318"),
                ExportConfig::default(),
                BackendKind::Console,
                Attributes::builder().put("env", "dev").build(),
            )
            .unwrap();
            assert_eq!(telemetry.backend_name(), "console");

            let span = telemetry.span("checkout", &Attributes::builder().put("cart", "c-42").build());
            let trace_id = span.context().trace_id.to_string();
            span.log(LogLevel::Error, "card declined", &Attributes::empty());
            span.end();
            telemetry.gauge("mem", 1.5, &Attributes::empty());
            trace_id
        });

        let span = output.line_containing("name=checkout");
        assert!(span.contains("INFO telemetry: span"), "{}", span);
        assert!(span.contains("service=shop"), "{}", span);
        assert!(span.contains(&format!("trace_id={}", trace_id)), "{}", span);
        assert!(span.contains("attributes=cart=c-42 env=dev"), "{}", span);

        let log = output.line_containing("card declined");
        assert!(log.contains("ERROR telemetry:"), "{}", log);
        assert!(log.contains(&format!("trace_id=Some(\"{}\")", trace_id)), "{}", log);
        assert!(log.contains("attributes=env=dev"), "{}", log);

        let gauge = output.line_containing("gauge");
        assert!(gauge.contains("metric=\"mem\""), "{}", gauge);
        assert!(gauge.contains("value=1.5"), "{}", gauge);
        assert!(gauge.contains("attributes=env=dev"), "{}", gauge);
    }

    #[test]
    fn test_console_backend_common_attributes() {
        let backend = ConsoleBackend::init(
            &TelemetryConfig::new("shop", "http://collector:4318"),
            Attributes::builder().put("env", "dev").build(),
        );
        backend.set_common_attributes(Attributes::builder().put("user", "u1").build());

        let merged = backend.with_common(&Attributes::builder().put("user", "u2").build());
        assert_eq!(merged.get_str("user"), Some("u2"));
        assert_eq!(backend.common_attributes().get_str("env"), None);
    }

    #[test]
    fn test_init_rejects_bad_config() {
        let result = Telemetry::init(
            TelemetryConfig::new("", "http://collector:4318"),
            ExportConfig::default(),
            BackendKind::Console,
        );
        assert!(matches!(
            result,
            Err(TelemetryError::Config(crate::error::ConfigError::EmptyServiceName))
        ));
    }
}
