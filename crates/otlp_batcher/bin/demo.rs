//! # Buffered OTLP Export Demo
//!
//! Drives the telemetry pipeline against a real collector (or the console
//! backend) from several concurrent producer tasks, then shuts down and
//! prints the exporter counters.
//!
//! ## Running
//!
//! ```bash
//! # Against a local OpenTelemetry collector (OTLP/HTTP on 4318)
//! cargo run -p otlp_batcher --bin demo -- --endpoint http://localhost:4318
//!
//! # Small batches, fast interval, chatty logs
//! cargo run -p otlp_batcher --bin demo -- --batch-size 10 --interval-ms 500 --log-level debug
//!
//! # No collector: print every signal locally
//! cargo run -p otlp_batcher --bin demo -- --console
//! ```

use anyhow::Result;
use clap::Parser;
use otlp_batcher::{
    Attributes, BackendKind, BufferedOtlpBackend, ExportConfig, ExportMetrics, LogLevel,
    SpanKind, Telemetry, TelemetryConfig,
};
use rand::Rng;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Emits spans, logs and metrics through the buffered OTLP exporter
#[derive(Parser, Debug)]
#[command(name = "demo")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Collector base URL; `/v1/{traces,logs,metrics}` is appended
    #[arg(long, default_value = "http://localhost:4318")]
    endpoint: String,

    /// Value of the `service.name` resource attribute
    #[arg(long, default_value = "otlp-batcher-demo")]
    service_name: String,

    /// Spans to emit in total (each also produces a log line and metrics)
    #[arg(long, default_value_t = 200)]
    records: usize,

    /// Number of concurrent producer tasks
    #[arg(long, default_value_t = 4)]
    producers: usize,

    /// Batch size limit per signal
    #[arg(long, default_value_t = 50)]
    batch_size: usize,

    /// Periodic flush interval in milliseconds
    #[arg(long, default_value_t = 1000)]
    interval_ms: u64,

    /// Print signals locally instead of exporting them
    #[arg(long)]
    console: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

const OPERATIONS: [&str; 5] = [
    "GET /cart",
    "POST /checkout",
    "GET /products",
    "PUT /cart/items",
    "GET /orders",
];

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level)?;

    let config = TelemetryConfig::new(&cli.service_name, &cli.endpoint);
    let export_config = ExportConfig::default()
        .with_batch_size_limit(cli.batch_size)
        .with_flush_interval(Duration::from_millis(cli.interval_ms));
    let initial = Attributes::builder()
        .put("deployment.environment", "demo")
        .put("service.instance.id", format!("pid-{}", std::process::id()))
        .build();

    // Keep a typed handle to the OTLP backend so counters can be read at the end
    let (telemetry, otlp) = if cli.console {
        let telemetry =
            Telemetry::init_with_attributes(config, export_config, BackendKind::Console, initial)?;
        (telemetry, None)
    } else {
        let backend = Arc::new(BufferedOtlpBackend::init(config, export_config, initial)?);
        (Telemetry::from_backend(backend.clone()), Some(backend))
    };

    let producers = cli.producers.max(1);
    let per_producer = cli.records.div_ceil(producers);
    println!(
        "emitting {} spans from {} producers to {} ({} backend)",
        per_producer * producers,
        producers,
        cli.endpoint,
        telemetry.backend_name()
    );

    let started = Instant::now();
    let handles: Vec<_> = (0..producers)
        .map(|id| {
            let telemetry = telemetry.clone();
            tokio::spawn(produce(telemetry, id, per_producer))
        })
        .collect();
    for handle in handles {
        handle.await?;
    }
    let produced_in = started.elapsed();

    telemetry.set_common_attributes(Attributes::builder().put("demo.phase", "shutdown").build());
    telemetry.log(LogLevel::Info, "demo finished producing", &Attributes::empty());

    let shutdown_started = Instant::now();
    telemetry.shutdown().await;

    println!("produced in {:?}, shutdown drained in {:?}", produced_in, shutdown_started.elapsed());
    if let Some(backend) = otlp {
        let exporter = backend.exporter();
        print_metrics(exporter.metrics());
        println!(
            "retries: {} (recovered sends: {})",
            exporter.client().total_retries(),
            exporter.client().recovered_sends()
        );
    }

    Ok(())
}

async fn produce(telemetry: Telemetry, producer: usize, count: usize) {
    for seq in 0..count {
        let (operation, latency_ms, failed) = {
            let mut rng = rand::thread_rng();
            (
                OPERATIONS[rng.gen_range(0..OPERATIONS.len())],
                rng.gen_range(1.0..250.0),
                rng.gen_bool(0.1),
            )
        };
        let route = Attributes::builder().put("http.route", operation).build();

        let mut span = telemetry.span(operation, &route);
        span.set_kind(SpanKind::Server);
        span.set_attribute("producer.id", producer as i64);
        span.set_attribute("request.seq", seq as i64);

        let mut db = span.child("db.query");
        db.set_kind(SpanKind::Client);
        db.set_attribute("db.system", "postgresql");
        tokio::time::sleep(Duration::from_millis(1)).await;
        db.end();

        if failed {
            span.record_error("upstream timeout");
            span.log(LogLevel::Error, "request failed", &route);
        } else {
            span.log(LogLevel::Info, "request served", &route);
        }
        span.end();

        telemetry.counter("http.requests", 1, &route);
        telemetry.histogram("http.latency_ms", latency_ms, &route);
        if seq % 10 == 0 {
            telemetry.gauge("producer.progress", seq as f64 / count as f64, &Attributes::empty());
        }
    }
}

fn print_metrics(metrics: &ExportMetrics) {
    println!();
    print!("{}", metrics_table(metrics));
}

fn metrics_table(metrics: &ExportMetrics) -> String {
    let mut table = format!(
        "{:<8} {:>12} {:>12} {:>15} {:>15} {:>7}\n",
        "signal", "batches sent", "records sent", "batches dropped", "records dropped", "empty"
    );
    for (name, signal) in [
        ("traces", metrics.traces()),
        ("logs", metrics.logs()),
        ("metrics", metrics.metrics()),
    ] {
        table.push_str(&format!(
            "{:<8} {:>12} {:>12} {:>15} {:>15} {:>7}\n",
            name,
            signal.batches_sent(),
            signal.records_sent(),
            signal.batches_dropped(),
            signal.records_dropped(),
            signal.empty_encodings()
        ));
    }
    table.push_str(&format!(
        "total: {} sent, {} dropped\n",
        metrics.total_records_sent(),
        metrics.total_records_dropped()
    ));
    table
}

fn init_logging(level: &str) -> Result<()> {
    let filter = EnvFilter::try_new(level)
        .or_else(|_| EnvFilter::try_new("info"))
        .map_err(|e| anyhow::anyhow!("invalid log level: {}", e))?;

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_thread_ids(false))
        .with(filter)
        .init();

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::Ordering;

    #[test]
    fn test_metrics_table_labels_each_counter() {
        let metrics = ExportMetrics::default();
        metrics.logs().batches_sent.store(2, Ordering::Relaxed);
        metrics.logs().records_sent.store(40, Ordering::Relaxed);
        metrics.logs().batches_dropped.store(1, Ordering::Relaxed);
        metrics.logs().records_dropped.store(7, Ordering::Relaxed);
        metrics.logs().empty_encodings.store(3, Ordering::Relaxed);

        let table = metrics_table(&metrics);
        let mut lines = table.lines();

        assert_eq!(
            lines.next().unwrap(),
            "signal   batches sent records sent batches dropped records dropped   empty"
        );

        let _traces = lines.next().unwrap();
        let logs: Vec<&str> = lines.next().unwrap().split_whitespace().collect();
        assert_eq!(logs, ["logs", "2", "40", "1", "7", "3"]);
        assert!(table.ends_with("total: 40 sent, 7 dropped\n"));
    }
}
