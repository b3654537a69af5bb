//! Event Dispatcher
//!
//! Typed publish/subscribe over a tokio broadcast channel.
//!
//! ```text
//! RecordMonitor tick ──publish──► EventBus
//!                                   ├──► AutoPrintWorker (DataUpdated)
//!                                   ├──► log_events      (all)
//!                                   └──► UI / other subscribers
//! ```
//!
//! Publishing never blocks the poller. Events raised within one tick reach
//! every subscriber in publish order; subscribers run on their own tasks.

use shared::{DataUpdate, Record};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

/// Events surfaced by the monitor
#[derive(Debug, Clone, PartialEq)]
pub enum MonitorEvent {
    StatusChanged(String),
    MonitoringError(String),
    DataUpdated(DataUpdate),
    /// Legacy single-record notification, raised after `DataUpdated`
    NewRecordFound(Record),
}

impl MonitorEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            MonitorEvent::StatusChanged(_) => "status_changed",
            MonitorEvent::MonitoringError(_) => "monitoring_error",
            MonitorEvent::DataUpdated(_) => "data_updated",
            MonitorEvent::NewRecordFound(_) => "new_record_found",
        }
    }
}

/// Broadcast bus shared by the monitor and its subscribers
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<Arc<MonitorEvent>>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Publish to every current subscriber
    ///
    /// Returns the number of subscribers reached.
    pub fn publish(&self, event: MonitorEvent) -> usize {
        let kind = event.kind();
        match self.tx.send(Arc::new(event)) {
            Ok(n) => n,
            Err(_) => {
                tracing::trace!(kind, "No subscribers, event dropped");
                0
            }
        }
    }

    pub fn subscribe(&self) -> EventSubscriber {
        EventSubscriber {
            rx: self.tx.subscribe(),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

/// Receiving end of the bus
pub struct EventSubscriber {
    rx: broadcast::Receiver<Arc<MonitorEvent>>,
}

impl EventSubscriber {
    /// Next event, `None` once the bus is gone
    ///
    /// A subscriber that falls behind loses the oldest events; the gap is
    /// logged and reception continues.
    pub async fn recv(&mut self) -> Option<Arc<MonitorEvent>> {
        loop {
            match self.rx.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!(skipped = n, "Event subscriber lagged, events skipped");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Non-blocking receive of an already published event
    pub fn try_recv(&mut self) -> Option<Arc<MonitorEvent>> {
        loop {
            match self.rx.try_recv() {
                Ok(event) => return Some(event),
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    tracing::warn!(skipped = n, "Event subscriber lagged, events skipped");
                }
                Err(_) => return None,
            }
        }
    }

    /// Drain everything published so far
    pub fn drain(&mut self) -> Vec<Arc<MonitorEvent>> {
        std::iter::from_fn(|| self.try_recv()).collect()
    }
}

/// Logging subscriber: writes every event to the tracing output
pub async fn log_events(mut events: EventSubscriber, shutdown: CancellationToken) {
    tracing::debug!("Event logger started");
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            event = events.recv() => {
                let Some(event) = event else { break };
                match event.as_ref() {
                    MonitorEvent::StatusChanged(text) => tracing::info!(status = %text, "Status changed"),
                    MonitorEvent::MonitoringError(text) => tracing::error!(error = %text, "Monitoring error"),
                    MonitorEvent::DataUpdated(update) => tracing::info!(
                        key = update.last_record.key,
                        serial = ?update.last_record.serial,
                        window = update.recent_records.len(),
                        detail = %update.detail,
                        "Data updated"
                    ),
                    MonitorEvent::NewRecordFound(record) => {
                        tracing::debug!(key = record.key, "New record found")
                    }
                }
            }
        }
    }
    tracing::debug!("Event logger stopped");
}
