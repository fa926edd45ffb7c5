//! Signal Buffer - Per-Signal Append/Drain Storage
//!
//! Each signal type owns one [`SignalBuffer`]. Producers append with
//! [`SignalBuffer::add`]; the exporter takes whole batches out with
//! [`SignalBuffer::drain`].
//!
//! # Locking
//!
//! Every buffer has its own `std::sync::Mutex`. The lock is held only for an
//! in-memory push or a `Vec` swap, never across I/O or an `.await`, so a slow
//! export of one signal never blocks producers of another, and producers of
//! the same signal wait at most for one swap.
//!
//! # Guarantees
//!
//! - A drain takes its snapshot and clears the buffer under one lock
//!   acquisition, so a record lands in exactly one drained batch.
//! - Adds racing a drain either make it into that snapshot (if they locked
//!   first) or wait and land in the next one. Nothing is lost in between.
//! - Records come out in the order they were added.
//! - After [`SignalBuffer::close`], adds are rejected under the same lock, so a
//!   record is either visible to the final drain or refused.

use std::sync::{Mutex, MutexGuard, PoisonError};

/// Result of [`SignalBuffer::add`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
    /// Stored; buffer still below the batch size limit.
    Buffered,
    /// Stored; buffer is now at or above the limit and should be flushed.
    ThresholdReached,
    /// Buffer closed by shutdown; the record was dropped.
    Closed,
}

impl AddOutcome {
    /// `true` iff the add crossed the batch size limit.
    pub fn needs_flush(self) -> bool {
        matches!(self, AddOutcome::ThresholdReached)
    }
}

struct Slots<R> {
    records: Vec<R>,
    closed: bool,
}

/// Mutex-guarded, append-only list of records for a single signal.
pub struct SignalBuffer<R> {
    slots: Mutex<Slots<R>>,
    limit: usize,
}

impl<R> SignalBuffer<R> {
    /// Creates an empty buffer that reports a flush once `limit` records are held.
    pub fn new(limit: usize) -> Self {
        debug_assert!(limit > 0, "batch size limit must be positive");
        Self {
            slots: Mutex::new(Slots {
                records: Vec::new(),
                closed: false,
            }),
            limit,
        }
    }

    // A panic while holding the lock leaves the Vec in a valid state,
    // so poisoning is not treated as fatal.
    fn lock(&self) -> MutexGuard<'_, Slots<R>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Appends a record. O(1) amortized, never blocks on I/O.
    pub fn add(&self, record: R) -> AddOutcome {
        let mut slots = self.lock();
        if slots.closed {
            return AddOutcome::Closed;
        }

        slots.records.push(record);
        if slots.records.len() >= self.limit {
            AddOutcome::ThresholdReached
        } else {
            AddOutcome::Buffered
        }
    }

    /// Takes all pending records as one batch.
    ///
    /// Returns `None` if nothing is pending.
    pub fn drain(&self) -> Option<Vec<R>> {
        let mut slots = self.lock();
        if slots.records.is_empty() {
            return None;
        }

        let batch = std::mem::take(&mut slots.records);
        debug_assert!(slots.records.is_empty());
        Some(batch)
    }

    /// Stops accepting records. Pending records stay until drained.
    pub fn close(&self) {
        self.lock().closed = true;
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Number of records currently pending.
    pub fn len(&self) -> usize {
        self.lock().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().records.is_empty()
    }

    pub fn limit(&self) -> usize {
        self.limit
    }
}
