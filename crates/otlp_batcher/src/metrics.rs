use crate::signal::Signal;
use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe counters for one signal's export outcomes.
#[derive(Debug, Default)]
pub struct SignalMetrics {
    /// Batches accepted by the collector
    pub batches_sent: AtomicU64,
    /// Records in accepted batches
    pub records_sent: AtomicU64,
    /// Batches dropped after exhausting retries
    pub batches_dropped: AtomicU64,
    /// Records in dropped batches
    pub records_dropped: AtomicU64,
    /// Non-empty batches the encoder turned into zero bytes
    pub empty_encodings: AtomicU64,
}

impl SignalMetrics {
    pub fn batches_sent(&self) -> u64 {
        self.batches_sent.load(Ordering::Relaxed)
    }

    pub fn records_sent(&self) -> u64 {
        self.records_sent.load(Ordering::Relaxed)
    }

    pub fn batches_dropped(&self) -> u64 {
        self.batches_dropped.load(Ordering::Relaxed)
    }

    pub fn records_dropped(&self) -> u64 {
        self.records_dropped.load(Ordering::Relaxed)
    }

    pub fn empty_encodings(&self) -> u64 {
        self.empty_encodings.load(Ordering::Relaxed)
    }

    pub(crate) fn record_sent(&self, records: u64) {
        self.records_sent.fetch_add(records, Ordering::Relaxed);
        self.batches_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_dropped(&self, records: u64) {
        self.records_dropped.fetch_add(records, Ordering::Relaxed);
        self.batches_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_empty_encoding(&self) {
        self.empty_encodings.fetch_add(1, Ordering::Relaxed);
    }
}

/// Export counters for all three signals.
#[derive(Debug, Default)]
pub struct ExportMetrics {
    signals: [SignalMetrics; 3],
}

impl ExportMetrics {
    pub fn signal(&self, signal: Signal) -> &SignalMetrics {
        &self.signals[signal.index()]
    }

    pub fn traces(&self) -> &SignalMetrics {
        self.signal(Signal::Traces)
    }

    pub fn logs(&self) -> &SignalMetrics {
        self.signal(Signal::Logs)
    }

    pub fn metrics(&self) -> &SignalMetrics {
        self.signal(Signal::Metrics)
    }

    /// Records sent across every signal.
    pub fn total_records_sent(&self) -> u64 {
        self.signals.iter().map(SignalMetrics::records_sent).sum()
    }

    /// Records dropped across every signal.
    pub fn total_records_dropped(&self) -> u64 {
        self.signals.iter().map(SignalMetrics::records_dropped).sum()
    }
}
