use crate::domain::errors::OutcomeError;
use crate::domain::types::OutcomeRecord;
use std::collections::{HashSet, VecDeque};
use tokio::sync::{Mutex, Notify};
use uuid::Uuid;

/// References remembered for duplicate rejection. Matches the service's
/// issued-prediction ledger bound: once a reference has aged out of the
/// ledger a report for it is rejected upstream as `UnknownPrediction`, so
/// remembering it here buys nothing.
const DEDUP_CAPACITY: usize = 10_000;

struct BufferInner {
    records: Vec<OutcomeRecord>,
    /// References accepted, kept across drains so a late duplicate is
    /// still rejected after its record has been consumed by training.
    /// FIFO-bounded at `DEDUP_CAPACITY`.
    seen: HashSet<Uuid>,
    seen_order: VecDeque<Uuid>,
}

/// Accumulates (prediction, actual) pairs until retraining drains them.
///
/// Append and drain are serialized behind one lock, so a record lands in
/// exactly one drain. Reaching capacity wakes the retraining loop.
pub struct OutcomeBuffer {
    inner: Mutex<BufferInner>,
    capacity: usize,
    notify: Notify,
}

impl OutcomeBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(BufferInner {
                records: Vec::new(),
                seen: HashSet::new(),
                seen_order: VecDeque::new(),
            }),
            capacity,
            notify: Notify::new(),
        }
    }

    /// Appends one record. Returns `true` when the buffer has reached
    /// capacity. A reference that was ever reported before is rejected.
    pub async fn append(&self, record: OutcomeRecord) -> Result<bool, OutcomeError> {
        let mut inner = self.inner.lock().await;
        let reference = record.prediction.reference;
        if !inner.seen.insert(reference) {
            return Err(OutcomeError::DuplicateReport { reference });
        }
        inner.seen_order.push_back(reference);
        while inner.seen_order.len() > DEDUP_CAPACITY {
            if let Some(oldest) = inner.seen_order.pop_front() {
                inner.seen.remove(&oldest);
            }
        }
        inner.records.push(record);
        let full = inner.records.len() >= self.capacity;
        drop(inner);
        if full {
            self.notify.notify_one();
        }
        Ok(full)
    }

    /// Atomically takes the contents iff the buffer is at capacity.
    /// Returns an empty vector otherwise, which lets the retraining loop
    /// treat spurious wakeups as no-ops.
    pub async fn drain_if_full(&self) -> Vec<OutcomeRecord> {
        let mut inner = self.inner.lock().await;
        if inner.records.len() >= self.capacity {
            std::mem::take(&mut inner.records)
        } else {
            Vec::new()
        }
    }

    /// Takes everything regardless of fill level. Used by manual triggers.
    pub async fn drain_all(&self) -> Vec<OutcomeRecord> {
        let mut inner = self.inner.lock().await;
        std::mem::take(&mut inner.records)
    }

    /// Resolves when capacity has been reached since the last call.
    pub async fn wait_full(&self) {
        self.notify.notified().await;
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.records.len()
    }
}
