//! Monitor session: timer-driven poll loop over a [`RecordSource`]
//!
//! ```text
//! start() ──► Connecting ──probe ok──► Monitoring ──stop()──► Stopped
//!                 │                        │
//!             probe err              budget exhausted
//!                 ▼                        ▼
//!               Error ───────────────► Stopped
//! ```
//!
//! Each tick compares the store's last record against the baseline held by
//! the [`ChangeDetector`]. Ticks never overlap: a tick arriving while another
//! is running is skipped, not queued.

use super::detector::{BaselineComparison, ChangeDetector, Comparison};
use super::retry::{DEFAULT_FAILURE_THRESHOLD, RetryBudget, RetryVerdict};
use crate::core::config::{Config, DEFAULT_POLL_INTERVAL_MS, clamp_poll_interval_ms};
use crate::core::error::{MonitorError, MonitorResult};
use crate::events::{EventBus, MonitorEvent};
use crate::source::{RecordSource, SourceResult};
use parking_lot::Mutex;
use shared::{DataUpdate, MonitorState, Record, RECORD_UPDATED};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// Records fetched when a change is detected
pub const DEFAULT_RECENT_WINDOW: usize = 50;

/// Poller settings, passed in explicitly
#[derive(Debug, Clone)]
pub struct MonitorSettings {
    pub poll_interval: Duration,
    pub recent_window: usize,
    pub comparison: BaselineComparison,
    pub failure_threshold: u32,
}

impl MonitorSettings {
    /// Set the poll interval, clamped to 500..=60000 ms
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        let ms = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX);
        self.poll_interval = Duration::from_millis(clamp_poll_interval_ms(ms));
        self
    }

    pub fn with_recent_window(mut self, window: usize) -> Self {
        self.recent_window = window.max(1);
        self
    }

    pub fn with_comparison(mut self, comparison: BaselineComparison) -> Self {
        self.comparison = comparison;
        self
    }

    pub fn with_failure_threshold(mut self, threshold: u32) -> Self {
        self.failure_threshold = threshold.max(1);
        self
    }
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            recent_window: DEFAULT_RECENT_WINDOW,
            comparison: BaselineComparison::default(),
            failure_threshold: DEFAULT_FAILURE_THRESHOLD,
        }
    }
}

impl From<&Config> for MonitorSettings {
    fn from(config: &Config) -> Self {
        Self::default()
            .with_poll_interval(Duration::from_millis(config.poll_interval_ms))
            .with_recent_window(config.recent_window)
            .with_comparison(config.baseline_comparison)
    }
}

/// What a single tick did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Another tick was still running
    Skipped,
    /// First record seen, cached silently
    Bootstrapped,
    Unchanged,
    /// Change published for the given key
    Changed { key: i64 },
    /// Store became empty, baseline dropped
    Cleared,
    /// Store empty and no baseline held
    Empty,
    /// Source error counted against the budget
    Failed { consecutive: u32 },
    /// Budget exhausted, session stopped
    Fatal,
}

struct Session {
    cancel: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

struct Inner {
    source: Arc<dyn RecordSource>,
    bus: EventBus,
    settings: MonitorSettings,
    state: watch::Sender<MonitorState>,
    detector: Mutex<ChangeDetector>,
    retry: Mutex<RetryBudget>,
    busy: AtomicBool,
    session: Mutex<Option<Session>>,
}

/// Change-detection poller
///
/// Cheap to clone; clones share one session.
#[derive(Clone)]
pub struct RecordMonitor {
    inner: Arc<Inner>,
}

/// Clears the reentrancy flag when a tick ends, including on cancellation
struct BusyGuard<'a>(&'a AtomicBool);

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl RecordMonitor {
    pub fn new(source: Arc<dyn RecordSource>, bus: EventBus, settings: MonitorSettings) -> Self {
        let (state, _) = watch::channel(MonitorState::Stopped);
        Self {
            inner: Arc::new(Inner {
                detector: Mutex::new(ChangeDetector::new(settings.comparison)),
                retry: Mutex::new(RetryBudget::new(settings.failure_threshold)),
                source,
                bus,
                settings,
                state,
                busy: AtomicBool::new(false),
                session: Mutex::new(None),
            }),
        }
    }

    pub fn state(&self) -> MonitorState {
        *self.inner.state.borrow()
    }

    pub fn settings(&self) -> &MonitorSettings {
        &self.inner.settings
    }

    pub fn bus(&self) -> &EventBus {
        &self.inner.bus
    }

    /// Key of the cached baseline record
    pub fn baseline_key(&self) -> Option<i64> {
        self.inner.detector.lock().baseline().map(|r| r.key)
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.inner.retry.lock().consecutive_failures()
    }

    /// Connect and start the poll timer
    ///
    /// The baseline and failure counter start fresh, so the first tick
    /// after a restart bootstraps silently.
    pub async fn start(&self) -> MonitorResult<()> {
        let claimed = self.inner.state.send_if_modified(|state| {
            if *state == MonitorState::Stopped {
                *state = MonitorState::Connecting;
                true
            } else {
                false
            }
        });
        if !claimed {
            return Err(MonitorError::AlreadyRunning);
        }

        let location = self.inner.source.describe();
        self.status(format!("Connecting to {}", location));
        self.inner.detector.lock().clear();
        self.inner.retry.lock().reset();

        if let Err(e) = self.inner.source.probe().await {
            tracing::error!(source = %location, error = %e, "Failed to connect to data store");
            self.inner.state.send_replace(MonitorState::Error);
            self.inner
                .bus
                .publish(MonitorEvent::MonitoringError(format!("Connection failed: {}", e)));
            self.set_stopped();
            return Err(e.into());
        }

        let cancel = CancellationToken::new();
        *self.inner.session.lock() = Some(Session {
            cancel: cancel.clone(),
            handle: None,
        });
        self.inner.state.send_replace(MonitorState::Monitoring);
        self.status(format!("Monitoring {}", location));
        tracing::info!(
            source = %location,
            interval_ms = self.inner.settings.poll_interval.as_millis() as u64,
            window = self.inner.settings.recent_window,
            comparison = %self.inner.settings.comparison,
            "Monitoring started"
        );

        let handle = tokio::spawn(self.clone().run(cancel));
        if let Some(session) = self.inner.session.lock().as_mut() {
            session.handle = Some(handle);
        }
        Ok(())
    }

    /// Stop the timer; an in-flight tick runs to completion
    pub async fn stop(&self) {
        let session = self.inner.session.lock().take();
        if let Some(session) = session {
            session.cancel.cancel();
            if let Some(handle) = session.handle
                && let Err(e) = handle.await
            {
                tracing::error!(error = ?e, "Poll loop ended abnormally");
            }
        }
        if self.state() != MonitorState::Stopped {
            self.set_stopped();
        }
    }

    /// Resolve once the session is back in `Stopped`
    pub async fn wait_stopped(&self) {
        let mut rx = self.inner.state.subscribe();
        let _ = rx.wait_for(|state| *state == MonitorState::Stopped).await;
    }

    async fn run(self, cancel: CancellationToken) {
        let period = self.inner.settings.poll_interval;
        let mut interval = tokio::time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = interval.tick() => {
                    if self.tick().await == TickOutcome::Fatal {
                        break;
                    }
                }
            }
        }
        tracing::debug!("Poll loop exited");
    }

    /// Run one poll tick
    pub async fn tick(&self) -> TickOutcome {
        if self
            .inner
            .busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            tracing::debug!("Previous tick still running, skipping");
            return TickOutcome::Skipped;
        }
        let _busy = BusyGuard(&self.inner.busy);

        match self.poll_once().await {
            Ok(outcome) => {
                let ended = self.inner.retry.lock().record_success();
                if ended > 0 {
                    tracing::info!(failures = ended, "Data store reachable again");
                }
                outcome
            }
            Err(e) => {
                let verdict = self.inner.retry.lock().record_failure();
                match verdict {
                    RetryVerdict::Retry { consecutive } => {
                        tracing::warn!(
                            consecutive,
                            threshold = self.inner.settings.failure_threshold,
                            error = %e,
                            "Poll tick failed, retrying at next interval"
                        );
                        TickOutcome::Failed { consecutive }
                    }
                    RetryVerdict::Exhausted { consecutive } => {
                        self.fail_fatally(MonitorError::Fatal {
                            failures: consecutive,
                            cause: e.to_string(),
                        });
                        TickOutcome::Fatal
                    }
                }
            }
        }
    }

    async fn poll_once(&self) -> SourceResult<TickOutcome> {
        let inner = &self.inner;

        let Some(current) = inner.source.get_last_record().await? else {
            if inner.detector.lock().clear() {
                tracing::info!("Data store is empty, baseline cleared");
                return Ok(TickOutcome::Cleared);
            }
            return Ok(TickOutcome::Empty);
        };

        let comparison = inner.detector.lock().compare(&current);
        match comparison {
            Comparison::Missing => {
                tracing::debug!(key = current.key, "Baseline established");
                inner.detector.lock().advance(current);
                Ok(TickOutcome::Bootstrapped)
            }
            Comparison::Same => Ok(TickOutcome::Unchanged),
            Comparison::Differs => {
                let recent_records = inner
                    .source
                    .get_recent_records(inner.settings.recent_window)
                    .await?;
                let previous = inner.detector.lock().advance(current.clone());
                let detail = describe_change(previous.as_ref(), &current);
                let key = current.key;
                tracing::info!(key, window = recent_records.len(), "{}", detail);

                inner.bus.publish(MonitorEvent::DataUpdated(DataUpdate {
                    last_record: current.clone(),
                    recent_records,
                    update_type: RECORD_UPDATED.to_string(),
                    detail,
                }));
                inner.bus.publish(MonitorEvent::NewRecordFound(current));
                Ok(TickOutcome::Changed { key })
            }
        }
    }

    /// Move to `Error`, raise the single error event, then stop
    fn fail_fatally(&self, err: MonitorError) {
        let entered = self.inner.state.send_if_modified(|state| {
            if matches!(*state, MonitorState::Monitoring | MonitorState::Connecting) {
                *state = MonitorState::Error;
                true
            } else {
                false
            }
        });
        if !entered {
            tracing::warn!(error = %err, "Retry budget exhausted outside an active session");
            return;
        }

        tracing::error!(error = %err, "Monitoring stopped");
        self.inner
            .bus
            .publish(MonitorEvent::MonitoringError(err.to_string()));

        // 仅取消定时器，循环任务自行退出
        if let Some(session) = self.inner.session.lock().take() {
            session.cancel.cancel();
        }
        self.set_stopped();
    }

    fn set_stopped(&self) {
        self.inner.state.send_replace(MonitorState::Stopped);
        self.status("Monitoring stopped".to_string());
    }

    fn status(&self, text: String) {
        self.inner.bus.publish(MonitorEvent::StatusChanged(text));
    }
}

fn describe_change(previous: Option<&Record>, current: &Record) -> String {
    let serial = current.serial.as_deref().unwrap_or("-");
    match previous {
        Some(prev) if prev.key == current.key => {
            format!("Record {} (serial {}) was modified", current.key, serial)
        }
        Some(prev) => format!(
            "New record {} (serial {}), previous {}",
            current.key, serial, prev.key
        ),
        None => format!("New record {} (serial {})", current.key, serial),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventSubscriber;
    use crate::source::MemoryRecordSource;
    use chrono::NaiveDate;

    fn rec(key: i64) -> Record {
        let ts = NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(8, 0, 0)
            .unwrap()
            + chrono::Duration::seconds(key);
        Record::new(key)
            .with_serial(format!("SN{key:05}"))
            .with_timestamp(ts)
            .with_measurement("Voltage", Some(key as f64 / 10.0))
    }

    fn setup(records: Vec<Record>) -> (RecordMonitor, Arc<MemoryRecordSource>, EventSubscriber) {
        let source = Arc::new(MemoryRecordSource::with_records(records));
        let bus = EventBus::new(1024);
        let events = bus.subscribe();
        let settings = MonitorSettings::default().with_poll_interval(Duration::from_secs(60));
        let monitor = RecordMonitor::new(source.clone(), bus, settings);
        (monitor, source, events)
    }

    fn errors(events: &mut EventSubscriber) -> usize {
        events
            .drain()
            .iter()
            .filter(|e| matches!(e.as_ref(), MonitorEvent::MonitoringError(_)))
            .count()
    }

    #[tokio::test(start_paused = true)]
    async fn test_change_publishes_window_of_fifty() {
        let (monitor, source, mut events) = setup((1..=100).map(rec).collect());
        monitor.start().await.unwrap();

        assert_eq!(monitor.tick().await, TickOutcome::Bootstrapped);
        assert_eq!(monitor.baseline_key(), Some(100));
        events.drain();

        source.push(rec(101));
        assert_eq!(monitor.tick().await, TickOutcome::Changed { key: 101 });

        let received = events.drain();
        assert_eq!(received.len(), 2);
        match received[0].as_ref() {
            MonitorEvent::DataUpdated(update) => {
                assert_eq!(update.last_record.key, 101);
                assert_eq!(update.update_type, RECORD_UPDATED);
                assert_eq!(update.recent_records.len(), 50);
                assert_eq!(update.recent_records.first().map(|r| r.key), Some(101));
                assert_eq!(update.recent_records.last().map(|r| r.key), Some(52));
            }
            other => panic!("unexpected event {other:?}"),
        }
        assert!(matches!(received[1].as_ref(), MonitorEvent::NewRecordFound(r) if r.key == 101));

        monitor.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_bootstrap_is_silent_and_unchanged_is_quiet() {
        let (monitor, _source, mut events) = setup(vec![rec(1)]);
        monitor.start().await.unwrap();
        events.drain();

        assert_eq!(monitor.tick().await, TickOutcome::Bootstrapped);
        assert_eq!(monitor.tick().await, TickOutcome::Unchanged);
        assert!(events.drain().is_empty());
        monitor.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_baseline_key_never_decreases() {
        let (monitor, source, _events) = setup(vec![rec(1)]);
        monitor.start().await.unwrap();

        let mut last = i64::MIN;
        for key in 2..30 {
            if key % 3 == 0 {
                source.push(rec(key));
                source.push(rec(key + 100));
                source.replace(rec(key + 100).with_print_count(1));
            } else {
                source.push(rec(key));
            }
            monitor.tick().await;
            let current = monitor.baseline_key().unwrap();
            assert!(current >= last, "baseline went from {last} to {current}");
            last = current;
        }
        monitor.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_store_clears_then_rebootstraps() {
        let (monitor, source, mut events) = setup(vec![rec(1)]);
        monitor.start().await.unwrap();
        assert_eq!(monitor.tick().await, TickOutcome::Bootstrapped);

        source.clear();
        assert_eq!(monitor.tick().await, TickOutcome::Cleared);
        assert_eq!(monitor.tick().await, TickOutcome::Empty);

        source.push(rec(2));
        events.drain();
        assert_eq!(monitor.tick().await, TickOutcome::Bootstrapped);
        assert!(events.drain().is_empty());
        monitor.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_in_place_rewrite_detected() {
        let (monitor, source, mut events) = setup(vec![rec(7)]);
        monitor.start().await.unwrap();
        monitor.tick().await;
        events.drain();

        source.replace(rec(7).with_measurement("Current", Some(1.5)));
        assert_eq!(monitor.tick().await, TickOutcome::Changed { key: 7 });
        let received = events.drain();
        assert!(matches!(
            received[0].as_ref(),
            MonitorEvent::DataUpdated(u) if u.detail.contains("was modified")
        ));
        monitor.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_budget_stops_with_one_error() {
        let (monitor, source, mut events) = setup(vec![rec(1)]);
        monitor.start().await.unwrap();
        events.drain();

        source.fail_next(100);
        for expected in 1..5 {
            assert_eq!(
                monitor.tick().await,
                TickOutcome::Failed {
                    consecutive: expected
                }
            );
            assert_eq!(monitor.state(), MonitorState::Monitoring);
        }
        assert_eq!(monitor.tick().await, TickOutcome::Fatal);
        assert_eq!(monitor.state(), MonitorState::Stopped);

        // 停止后继续失败也不会再发错误事件
        monitor.tick().await;
        assert_eq!(errors(&mut events), 1);
        monitor.wait_stopped().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_resets_failure_streak() {
        let (monitor, source, mut events) = setup(vec![rec(1)]);
        monitor.start().await.unwrap();

        source.fail_next(4);
        for _ in 0..4 {
            monitor.tick().await;
        }
        assert_eq!(monitor.consecutive_failures(), 4);
        assert_eq!(monitor.tick().await, TickOutcome::Bootstrapped);
        assert_eq!(monitor.consecutive_failures(), 0);

        source.fail_next(4);
        for _ in 0..4 {
            monitor.tick().await;
        }
        assert_eq!(monitor.state(), MonitorState::Monitoring);
        assert_eq!(errors(&mut events), 0);
        monitor.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_ticks_do_not_overlap() {
        let (monitor, source, _events) = setup(vec![rec(1)]);
        monitor.start().await.unwrap();
        source.set_delay(Some(Duration::from_millis(200)));

        let outcomes = futures::future::join_all((0..8).map(|_| monitor.tick())).await;

        let ran = outcomes
            .iter()
            .filter(|o| **o != TickOutcome::Skipped)
            .count();
        assert_eq!(ran, 1);
        assert_eq!(source.max_in_flight(), 1);
        monitor.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_store_with_fast_timer() {
        let source = Arc::new(MemoryRecordSource::with_records(vec![rec(1)]));
        source.set_delay(Some(Duration::from_millis(1_700)));
        let settings = MonitorSettings::default().with_poll_interval(Duration::from_millis(500));
        let monitor = RecordMonitor::new(source.clone(), EventBus::default(), settings);

        monitor.start().await.unwrap();
        for key in 2..6 {
            source.push(rec(key));
            tokio::time::sleep(Duration::from_millis(2_000)).await;
        }
        monitor.stop().await;

        assert!(source.last_record_calls() >= 2);
        assert_eq!(source.max_in_flight(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_drives_ticks() {
        let source = Arc::new(MemoryRecordSource::with_records(vec![rec(1)]));
        let bus = EventBus::default();
        let mut events = bus.subscribe();
        let settings = MonitorSettings::default().with_poll_interval(Duration::from_millis(1_000));
        let monitor = RecordMonitor::new(source.clone(), bus, settings);

        monitor.start().await.unwrap();
        tokio::time::sleep(Duration::from_millis(1_500)).await;
        assert_eq!(monitor.baseline_key(), Some(1));

        source.push(rec(2));
        tokio::time::sleep(Duration::from_millis(1_000)).await;
        monitor.stop().await;

        let updates: Vec<i64> = events
            .drain()
            .iter()
            .filter_map(|e| match e.as_ref() {
                MonitorEvent::DataUpdated(u) => Some(u.last_record.key),
                _ => None,
            })
            .collect();
        assert_eq!(updates, vec![2]);
        assert_eq!(monitor.state(), MonitorState::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_stops_after_fatal() {
        let source = Arc::new(MemoryRecordSource::with_records(vec![rec(1)]));
        let bus = EventBus::default();
        let mut events = bus.subscribe();
        let settings = MonitorSettings::default().with_poll_interval(Duration::from_millis(500));
        let monitor = RecordMonitor::new(source.clone(), bus, settings);

        monitor.start().await.unwrap();
        source.fail_next(1_000);
        monitor.wait_stopped().await;
        let calls = source.last_record_calls();
        assert_eq!(calls, 5);

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(source.last_record_calls(), calls);
        assert_eq!(errors(&mut events), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_twice_and_failed_probe() {
        let (monitor, source, mut events) = setup(vec![rec(1)]);
        monitor.start().await.unwrap();
        assert!(matches!(
            monitor.start().await,
            Err(MonitorError::AlreadyRunning)
        ));
        monitor.stop().await;
        assert_eq!(monitor.state(), MonitorState::Stopped);
        events.drain();

        source.fail_next(1);
        assert!(matches!(
            monitor.start().await,
            Err(MonitorError::Connection(_))
        ));
        assert_eq!(monitor.state(), MonitorState::Stopped);
        assert_eq!(errors(&mut events), 1);

        monitor.start().await.unwrap();
        assert_eq!(monitor.state(), MonitorState::Monitoring);
        monitor.stop().await;
    }
}
