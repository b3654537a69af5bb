//! Reprint guard
//!
//! Manual prints of a record that was already printed need an explicit
//! confirmation. Only applies while print counting is enabled; the
//! automatic path never goes through here.

use super::dispatcher::PrintDispatcher;
use async_trait::async_trait;
use shared::{OutputFormat, PrintJobResult, Record};
use std::sync::Arc;

/// Asks the operator whether a record may be printed again
#[async_trait]
pub trait ReprintConfirmation: Send + Sync {
    async fn confirm(&self, record: &Record) -> bool;
}

/// Confirms every reprint
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysConfirm;

#[async_trait]
impl ReprintConfirmation for AlwaysConfirm {
    async fn confirm(&self, _record: &Record) -> bool {
        true
    }
}

/// Outcome of a manual print request
#[derive(Debug, Clone, PartialEq)]
pub enum ManualPrint {
    Printed(PrintJobResult),
    /// Operator refused the reprint; nothing was sent
    Declined,
}

pub struct ReprintGuard {
    dispatcher: Arc<PrintDispatcher>,
    confirmation: Arc<dyn ReprintConfirmation>,
}

impl ReprintGuard {
    pub fn new(dispatcher: Arc<PrintDispatcher>, confirmation: Arc<dyn ReprintConfirmation>) -> Self {
        Self {
            dispatcher,
            confirmation,
        }
    }

    /// Print on operator request
    pub async fn print_interactive(
        &self,
        record: &Record,
        format: OutputFormat,
        template_name: Option<&str>,
    ) -> ManualPrint {
        if self.dispatcher.settings().print_count_enabled && record.is_printed() {
            tracing::info!(key = record.key, print_count = record.print_count, "Record already printed, asking for confirmation");
            if !self.confirmation.confirm(record).await {
                tracing::info!(key = record.key, "Reprint declined");
                return ManualPrint::Declined;
            }
        }
        ManualPrint::Printed(
            self.dispatcher
                .print_record(record, format, template_name)
                .await,
        )
    }
}
