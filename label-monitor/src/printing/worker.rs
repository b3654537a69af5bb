//! Automatic print worker
//!
//! 监听 DataUpdated 事件并打印最新记录。
//! 不经过 ReprintGuard。

use super::dispatcher::PrintDispatcher;
use crate::events::{EventSubscriber, MonitorEvent};
use shared::OutputFormat;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub struct AutoPrintWorker {
    dispatcher: Arc<PrintDispatcher>,
    format: OutputFormat,
    template: Option<String>,
}

impl AutoPrintWorker {
    pub fn new(dispatcher: Arc<PrintDispatcher>, format: OutputFormat, template: Option<String>) -> Self {
        Self {
            dispatcher,
            format,
            template,
        }
    }

    /// Run until shutdown or until the bus closes
    ///
    /// Updates already queued when shutdown arrives are still printed.
    pub async fn run(self, mut events: EventSubscriber, shutdown: CancellationToken) {
        tracing::info!(format = %self.format, "Auto-print worker started");

        loop {
            tokio::select! {
                biased;
                event = events.recv() => {
                    let Some(event) = event else {
                        tracing::info!("Event bus closed, auto-print worker stopping");
                        break;
                    };
                    self.handle(&event).await;
                }
                _ = shutdown.cancelled() => {
                    tracing::info!("Auto-print worker received shutdown signal");
                    while let Some(event) = events.try_recv() {
                        self.handle(&event).await;
                    }
                    break;
                }
            }
        }
    }

    async fn handle(&self, event: &MonitorEvent) {
        let MonitorEvent::DataUpdated(update) = event else {
            return;
        };
        let record = &update.last_record;
        let result = self
            .dispatcher
            .print_record(record, self.format, self.template.as_deref())
            .await;
        if result.success {
            tracing::debug!(key = record.key, printer = ?result.printer_used, "Auto-print done");
        } else {
            tracing::error!(
                key = record.key,
                kind = ?result.error_kind,
                error = result.error_message.as_deref().unwrap_or_default(),
                "Auto-print failed"
            );
        }
    }
}
