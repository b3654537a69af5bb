//! In-memory record source
//!
//! Used by tests and dry runs. Supports injected failures, artificial
//! latency and call accounting so the poller's resilience and reentrancy
//! rules can be observed.

use super::error::{ConnectionError, QueryError, SourceResult};
use super::RecordSource;
use async_trait::async_trait;
use parking_lot::Mutex;
use shared::Record;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

#[derive(Debug, Default)]
struct Counters {
    last_record_calls: AtomicUsize,
    recent_calls: AtomicUsize,
    update_calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

/// Record source backed by a vector
#[derive(Debug, Default)]
pub struct MemoryRecordSource {
    records: Mutex<Vec<Record>>,
    pending_failures: AtomicUsize,
    delay: Mutex<Option<Duration>>,
    counters: Counters,
}

struct InFlight<'a>(&'a Counters);

impl<'a> InFlight<'a> {
    fn enter(counters: &'a Counters) -> Self {
        let now = counters.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        counters.max_in_flight.fetch_max(now, Ordering::SeqCst);
        Self(counters)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

impl MemoryRecordSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records(records: Vec<Record>) -> Self {
        let source = Self::new();
        *source.records.lock() = records;
        source
    }

    /// Append a record as the measurement equipment would
    pub fn push(&self, record: Record) {
        self.records.lock().push(record);
    }

    /// Replace the record with the same key
    pub fn replace(&self, record: Record) {
        let mut records = self.records.lock();
        if let Some(slot) = records.iter_mut().find(|r| r.key == record.key) {
            *slot = record;
        }
    }

    pub fn clear(&self) {
        self.records.lock().clear();
    }

    /// Make the next `n` calls fail with a connection error
    pub fn fail_next(&self, n: usize) {
        self.pending_failures.store(n, Ordering::SeqCst);
    }

    /// Delay every read by `delay`
    pub fn set_delay(&self, delay: Option<Duration>) {
        *self.delay.lock() = delay;
    }

    pub fn print_count(&self, key: i64) -> Option<i64> {
        self.records
            .lock()
            .iter()
            .find(|r| r.key == key)
            .map(|r| r.print_count)
    }

    pub fn last_record_calls(&self) -> usize {
        self.counters.last_record_calls.load(Ordering::SeqCst)
    }

    pub fn recent_calls(&self) -> usize {
        self.counters.recent_calls.load(Ordering::SeqCst)
    }

    pub fn update_calls(&self) -> usize {
        self.counters.update_calls.load(Ordering::SeqCst)
    }

    /// Highest number of concurrently running reads observed
    pub fn max_in_flight(&self) -> usize {
        self.counters.max_in_flight.load(Ordering::SeqCst)
    }

    fn take_failure(&self) -> SourceResult<()> {
        let injected = self
            .pending_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            return Err(ConnectionError::Lost {
                strategy: "memory".to_string(),
                reason: "injected failure".to_string(),
            }
            .into());
        }
        Ok(())
    }

    async fn pause(&self) {
        let delay = *self.delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }

    fn newest_first(&self) -> Vec<Record> {
        let mut records = self.records.lock().clone();
        records.sort_by(|a, b| (b.timestamp, b.key).cmp(&(a.timestamp, a.key)));
        records
    }
}

#[async_trait]
impl RecordSource for MemoryRecordSource {
    async fn probe(&self) -> SourceResult<()> {
        self.take_failure()
    }

    async fn get_last_record(&self) -> SourceResult<Option<Record>> {
        self.counters.last_record_calls.fetch_add(1, Ordering::SeqCst);
        let _guard = InFlight::enter(&self.counters);
        self.pause().await;
        self.take_failure()?;
        Ok(self.newest_first().into_iter().next())
    }

    async fn get_recent_records(&self, limit: usize) -> SourceResult<Vec<Record>> {
        self.counters.recent_calls.fetch_add(1, Ordering::SeqCst);
        let _guard = InFlight::enter(&self.counters);
        self.take_failure()?;
        Ok(self.newest_first().into_iter().take(limit).collect())
    }

    async fn get_record(&self, key: i64) -> SourceResult<Option<Record>> {
        self.take_failure()?;
        Ok(self.records.lock().iter().find(|r| r.key == key).cloned())
    }

    async fn update_record_print_count(&self, key: i64) -> SourceResult<()> {
        self.counters.update_calls.fetch_add(1, Ordering::SeqCst);
        self.take_failure()?;
        let mut records = self.records.lock();
        let record = records
            .iter_mut()
            .find(|r| r.key == key)
            .ok_or(QueryError::RecordNotFound(key))?;
        record.print_count += 1;
        Ok(())
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}
