//! Export Orchestrator
//!
//! [`BatchExporter`] owns one [`SignalBuffer`] per signal, a periodic flush
//! task, and the retrying transport client. It decides *when* a batch leaves:
//!
//! - **size trigger**: an add that brings a buffer to the batch size limit
//!   schedules a flush of that signal only
//! - **interval trigger**: every `flush_interval` all three signals are
//!   flushed, whatever their size
//! - **shutdown**: one final drain of everything
//!
//! # Concurrency Model
//!
//! Producer calls (`add_*`) are synchronous and O(1): they take the signal's
//! buffer lock for a push and, at most, spawn a background flush. All network
//! I/O happens on tokio tasks tracked in a `JoinSet`.
//!
//! Each signal also has an async *flush lock*, held from drain to the end of
//! the send. Producers never touch it. It serializes flushes of one signal so
//! batches leave in the order their records were added, while the three
//! signals flush fully independently of each other.
//!
//! A flush that has been scheduled but has not started draining yet absorbs
//! further triggers for the same signal, so a burst of adds past the limit
//! queues one task, not one per add.
//!
//! # Shutdown Sequence
//!
//! ```text
//! shutdown()
//!   1. state -> ShuttingDown, close buffers      (adds now rejected)
//!   2. stop periodic task, await it
//!   3. final flush of all signals                (waits for in-flight flushes)
//!   4. close transport                           (release pooled connections)
//!   5. abort remaining background tasks, await them
//!   6. state -> Stopped
//! ```
//!
//! Once step 1 has happened, no flush sends except the final one.

use crate::attributes::Attributes;
use crate::buffer::{AddOutcome, SignalBuffer};
use crate::codec::{Encoder, OtlpEncoder};
use crate::config::{ExportConfig, TelemetryConfig};
use crate::error::{ConfigError, TelemetryError};
use crate::metrics::ExportMetrics;
use crate::resource::Resource;
use crate::retry::RetryingClient;
use crate::signal::{Endpoints, Signal};
use crate::transport::{HttpTransport, Transport};
use bytes::Bytes;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError, RwLock};
use tokio::runtime::Handle;
use tokio::sync::{oneshot, watch};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, trace, warn};

const IDLE: u8 = 0;
const RUNNING: u8 = 1;
const SHUTTING_DOWN: u8 = 2;
const STOPPED: u8 = 3;

/// Lifecycle of a [`BatchExporter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExporterState {
    /// Constructed; periodic task not started. Adds are accepted.
    Idle,
    /// Periodic task active.
    Running,
    /// `shutdown()` in progress. Adds are ignored.
    ShuttingDown,
    /// Terminal.
    Stopped,
}

impl ExporterState {
    fn from_u8(value: u8) -> Self {
        match value {
            IDLE => ExporterState::Idle,
            RUNNING => ExporterState::Running,
            SHUTTING_DOWN => ExporterState::ShuttingDown,
            _ => ExporterState::Stopped,
        }
    }

    /// `true` once shutdown has begun.
    pub fn is_terminal(self) -> bool {
        matches!(self, ExporterState::ShuttingDown | ExporterState::Stopped)
    }
}

/// What happened to one flush of one signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushOutcome {
    /// Buffer was empty; no network call.
    Empty,
    /// Batch accepted by the collector.
    Sent { records: usize },
    /// Batch dropped after exhausting retries.
    Dropped { records: usize },
    /// Encoder produced no bytes; batch consumed without sending.
    EncodingFailed { records: usize },
    /// Shutdown has begun; only the final flush may send.
    Skipped,
}

/// Outcomes of a flush of all three signals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlushReport {
    pub traces: FlushOutcome,
    pub logs: FlushOutcome,
    pub metrics: FlushOutcome,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FlushReason {
    Manual,
    SizeLimit,
    Interval,
    Final,
}

struct PeriodicTask {
    stop: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

/// State shared between the exporter handle and its background tasks.
struct Shared<E: Encoder, T: Transport> {
    config: TelemetryConfig,
    export_config: ExportConfig,
    endpoints: Endpoints,
    initial_attributes: Attributes,
    resource: OnceLock<Resource>,
    common_attributes: RwLock<Attributes>,
    state: AtomicU8,
    /// Flips to `true` once shutdown has fully drained.
    stopped: watch::Sender<bool>,
    spans: SignalBuffer<E::Span>,
    logs: SignalBuffer<E::Log>,
    metric_points: SignalBuffer<E::Metric>,
    flush_locks: [tokio::sync::Mutex<()>; 3],
    scheduled: [AtomicBool; 3],
    encoder: E,
    client: RetryingClient<T>,
    metrics: ExportMetrics,
    runtime: Handle,
    tasks: Mutex<JoinSet<()>>,
}

impl<E: Encoder, T: Transport> Shared<E, T> {
    fn state(&self) -> ExporterState {
        ExporterState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn is_terminal(&self) -> bool {
        self.state().is_terminal()
    }

    /// Moves Idle/Running to ShuttingDown. Only the first caller wins.
    fn begin_shutdown(&self) -> bool {
        self.state
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |s| {
                (s < SHUTTING_DOWN).then_some(SHUTTING_DOWN)
            })
            .is_ok()
    }

    fn resource(&self) -> &Resource {
        self.resource
            .get_or_init(|| Resource::build(&self.config, &self.initial_attributes))
    }

    fn tasks(&self) -> MutexGuard<'_, JoinSet<()>> {
        self.tasks.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn close_buffers(&self) {
        self.spans.close();
        self.logs.close();
        self.metric_points.close();
    }

    /// Spawns a background flush of `signal` unless one is already queued.
    fn schedule_flush(self: &Arc<Self>, signal: Signal, reason: FlushReason) {
        if self.scheduled[signal.index()].swap(true, Ordering::AcqRel) {
            trace!(%signal, "flush already queued");
            return;
        }

        let shared = Arc::clone(self);
        let mut tasks = self.tasks();
        // Reap finished flushes so the set only holds live tasks
        while tasks.try_join_next().is_some() {}
        tasks.spawn_on(
            async move {
                shared.flush(signal, reason).await;
            },
            &self.runtime,
        );
    }

    /// Drains and encodes a signal's buffer without holding any lock across
    /// the encode. Returns the record count and payload.
    fn drain_and_encode(&self, signal: Signal) -> Option<(usize, Vec<u8>)> {
        let resource = self.resource();
        match signal {
            Signal::Traces => self
                .spans
                .drain()
                .map(|batch| (batch.len(), self.encoder.encode_traces(&batch, resource))),
            Signal::Logs => self
                .logs
                .drain()
                .map(|batch| (batch.len(), self.encoder.encode_logs(&batch, resource))),
            Signal::Metrics => self
                .metric_points
                .drain()
                .map(|batch| (batch.len(), self.encoder.encode_metrics(&batch, resource))),
        }
    }

    async fn flush(&self, signal: Signal, reason: FlushReason) -> FlushOutcome {
        let _flush_guard = self.flush_locks[signal.index()].lock().await;
        // Triggers from here on must queue a new flush; this one may already
        // have drained past their records.
        self.scheduled[signal.index()].store(false, Ordering::Release);

        if reason != FlushReason::Final && self.is_terminal() {
            trace!(%signal, ?reason, "skipping flush, exporter is shutting down");
            return FlushOutcome::Skipped;
        }

        let Some((records, payload)) = self.drain_and_encode(signal) else {
            return FlushOutcome::Empty;
        };

        let metrics = self.metrics.signal(signal);
        if payload.is_empty() {
            warn!(%signal, records, "encoder produced an empty payload, batch not sent");
            metrics.record_empty_encoding();
            return FlushOutcome::EncodingFailed { records };
        }

        debug!(%signal, records, bytes = payload.len(), ?reason, "exporting batch");
        let url = self.endpoints.url(signal);
        if self.client.send_with_retries(url, Bytes::from(payload)).await {
            metrics.record_sent(records as u64);
            FlushOutcome::Sent { records }
        } else {
            metrics.record_dropped(records as u64);
            FlushOutcome::Dropped { records }
        }
    }

    async fn flush_all(&self, reason: FlushReason) -> FlushReport {
        let (traces, logs, metrics) = tokio::join!(
            self.flush(Signal::Traces, reason),
            self.flush(Signal::Logs, reason),
            self.flush(Signal::Metrics, reason),
        );
        FlushReport {
            traces,
            logs,
            metrics,
        }
    }
}

/// Buffers spans, logs and metrics and exports them in batches.
///
/// # Example
///
/// ```ignore
/// let exporter = BatchExporter::new(
///     TelemetryConfig::new("checkout", "http://localhost:4318"),
///     ExportConfig::default(),
///     Attributes::empty(),
/// )?;
/// exporter.start();
///
/// exporter.add_span(span);     // never blocks on I/O
/// exporter.add_log(record);
///
/// exporter.shutdown().await;   // drains everything, then closes the transport
/// ```
pub struct BatchExporter<E: Encoder = OtlpEncoder, T: Transport = HttpTransport> {
    shared: Arc<Shared<E, T>>,
    periodic: Mutex<Option<PeriodicTask>>,
}

impl BatchExporter<OtlpEncoder, HttpTransport> {
    /// Creates an OTLP/protobuf exporter over HTTP.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(
        config: TelemetryConfig,
        export_config: ExportConfig,
        initial_attributes: Attributes,
    ) -> Result<Self, TelemetryError> {
        let transport = HttpTransport::new(export_config.request_timeout)
            .map_err(|e| TelemetryError::Transport(e.to_string()))?;
        let exporter = Self::with_parts(
            config,
            export_config,
            initial_attributes,
            OtlpEncoder::new(),
            transport,
        )?;
        Ok(exporter)
    }
}

impl<E: Encoder, T: Transport> BatchExporter<E, T> {
    /// Creates an exporter from an explicit encoder and transport.
    ///
    /// Must be called from within a tokio runtime; background flushes run on it.
    pub fn with_parts(
        config: TelemetryConfig,
        export_config: ExportConfig,
        initial_attributes: Attributes,
        encoder: E,
        transport: T,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        export_config.validate()?;
        let runtime = Handle::try_current().map_err(|e| ConfigError::NoRuntime(e.to_string()))?;

        let limit = export_config.batch_size_limit;
        let client = RetryingClient::new(transport, export_config.retry.clone());

        let shared = Shared {
            endpoints: Endpoints::new(&config),
            config,
            export_config,
            common_attributes: RwLock::new(initial_attributes.clone()),
            initial_attributes,
            resource: OnceLock::new(),
            state: AtomicU8::new(IDLE),
            stopped: watch::Sender::new(false),
            spans: SignalBuffer::new(limit),
            logs: SignalBuffer::new(limit),
            metric_points: SignalBuffer::new(limit),
            flush_locks: std::array::from_fn(|_| tokio::sync::Mutex::new(())),
            scheduled: std::array::from_fn(|_| AtomicBool::new(false)),
            encoder,
            client,
            metrics: ExportMetrics::default(),
            runtime,
            tasks: Mutex::new(JoinSet::new()),
        };

        Ok(Self {
            shared: Arc::new(shared),
            periodic: Mutex::new(None),
        })
    }

    fn periodic(&self) -> MutexGuard<'_, Option<PeriodicTask>> {
        self.periodic.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Starts the periodic flush task.
    ///
    /// No-op if already running or shut down.
    pub fn start(&self) {
        // Held across the state change and the spawn so shutdown() cannot
        // miss the task handle.
        let mut periodic = self.periodic();

        let started = self
            .shared
            .state
            .compare_exchange(IDLE, RUNNING, Ordering::AcqRel, Ordering::Acquire);
        if let Err(state) = started {
            if ExporterState::from_u8(state).is_terminal() {
                debug!("exporter is shut down, not starting");
            }
            return;
        }

        let (stop, mut stop_rx) = oneshot::channel();
        let shared = Arc::clone(&self.shared);
        let period = self.shared.export_config.flush_interval;

        let handle = self.shared.runtime.spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = &mut stop_rx => break,
                    _ = ticker.tick() => {
                        trace!("interval flush");
                        for signal in Signal::ALL {
                            shared.schedule_flush(signal, FlushReason::Interval);
                        }
                    }
                }
            }
        });

        *periodic = Some(PeriodicTask { stop, handle });

        info!(
            service = %self.shared.config.service_name,
            endpoint = %self.shared.config.base_endpoint(),
            batch_size_limit = self.shared.export_config.batch_size_limit,
            flush_interval = ?period,
            "batch exporter started"
        );
    }

    /// Buffers a span. Ignored once shutdown has begun.
    pub fn add_span(&self, span: E::Span) {
        if self.shared.is_terminal() {
            return;
        }
        let outcome = self.shared.spans.add(span);
        self.on_added(Signal::Traces, outcome);
    }

    /// Buffers a log record. Ignored once shutdown has begun.
    pub fn add_log(&self, log: E::Log) {
        if self.shared.is_terminal() {
            return;
        }
        let outcome = self.shared.logs.add(log);
        self.on_added(Signal::Logs, outcome);
    }

    /// Buffers a metric point. Ignored once shutdown has begun.
    pub fn add_metric(&self, metric: E::Metric) {
        if self.shared.is_terminal() {
            return;
        }
        let outcome = self.shared.metric_points.add(metric);
        self.on_added(Signal::Metrics, outcome);
    }

    fn on_added(&self, signal: Signal, outcome: AddOutcome) {
        if outcome.needs_flush() {
            self.shared.schedule_flush(signal, FlushReason::SizeLimit);
        }
    }

    /// Drains and exports pending spans.
    pub async fn flush_spans(&self) -> FlushOutcome {
        self.shared.flush(Signal::Traces, FlushReason::Manual).await
    }

    /// Drains and exports pending log records.
    pub async fn flush_logs(&self) -> FlushOutcome {
        self.shared.flush(Signal::Logs, FlushReason::Manual).await
    }

    /// Drains and exports pending metric points.
    pub async fn flush_metrics(&self) -> FlushOutcome {
        self.shared.flush(Signal::Metrics, FlushReason::Manual).await
    }

    /// Flushes all three signals concurrently.
    pub async fn flush_all(&self) -> FlushReport {
        self.shared.flush_all(FlushReason::Manual).await
    }

    /// Drains everything and releases the transport.
    ///
    /// Idempotent: only the first call drains, and every other call waits
    /// until that drain has finished. When any call returns, every record
    /// added before shutdown began was either exported or dropped by the
    /// retry policy, and no further network activity will be started by
    /// this exporter.
    pub async fn shutdown(&self) {
        if !self.shared.begin_shutdown() {
            let mut stopped = self.shared.stopped.subscribe();
            let _ = stopped.wait_for(|done| *done).await;
            return;
        }
        info!("batch exporter shutting down");
        self.shared.close_buffers();

        let periodic = self.periodic().take();
        if let Some(task) = periodic {
            let _ = task.stop.send(());
            if let Err(e) = task.handle.await {
                warn!(error = %e, "periodic flush task ended abnormally");
            }
        }

        let report = self.shared.flush_all(FlushReason::Final).await;
        debug!(?report, "final flush complete");

        self.shared.client.shutdown();

        let mut outstanding = std::mem::take(&mut *self.shared.tasks());
        outstanding.shutdown().await;

        self.shared.state.store(STOPPED, Ordering::Release);
        self.shared.stopped.send_replace(true);
        info!(
            records_sent = self.shared.metrics.total_records_sent(),
            records_dropped = self.shared.metrics.total_records_dropped(),
            "batch exporter shut down"
        );
    }

    /// Replaces the common attributes. The frozen [`Resource`] is not
    /// affected; only records built after this call see the new set.
    pub fn set_common_attributes(&self, attributes: Attributes) {
        *self
            .shared
            .common_attributes
            .write()
            .unwrap_or_else(PoisonError::into_inner) = attributes;
    }

    pub fn common_attributes(&self) -> Attributes {
        self.shared
            .common_attributes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// The resource attached to every batch, computed on first use.
    pub fn resource(&self) -> &Resource {
        self.shared.resource()
    }

    pub fn state(&self) -> ExporterState {
        self.shared.state()
    }

    /// Records currently waiting in a signal's buffer.
    pub fn pending(&self, signal: Signal) -> usize {
        match signal {
            Signal::Traces => self.shared.spans.len(),
            Signal::Logs => self.shared.logs.len(),
            Signal::Metrics => self.shared.metric_points.len(),
        }
    }

    pub fn metrics(&self) -> &ExportMetrics {
        &self.shared.metrics
    }

    pub fn client(&self) -> &RetryingClient<T> {
        &self.shared.client
    }

    pub fn endpoints(&self) -> &Endpoints {
        &self.shared.endpoints
    }
}

impl<E: Encoder, T: Transport> Drop for BatchExporter<E, T> {
    fn drop(&mut self) {
        // Background tasks hold the shared state; stop them so it is released
        if let Some(task) = self.periodic().take() {
            task.handle.abort();
        }
        self.shared.tasks().abort_all();
    }
}
