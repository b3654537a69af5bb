//! 服务状态
//!
//! Wires the store, printer host, template catalogue and event bus
//! together from one [`Config`], and runs the monitor with its background
//! subscribers.

use super::config::Config;
use super::error::MonitorError;
use super::tasks::SubscriberTasks;
use crate::events::{EventBus, log_events};
use crate::monitor::{MonitorSettings, RecordMonitor};
use crate::printing::{
    AutoPrintWorker, CatalogError, DispatchSettings, PrintDispatcher, PrinterHost, ReprintConfirmation,
    ReprintGuard, SystemPrinterHost, TemplateCatalog,
};
use crate::source::{ConnectionError, ConnectionStrategy, RecordSource, SourceError, SqliteRecordSource};
use label_printer::{NetworkPrinter, PrintError};
use std::future::Future;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StartupError {
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    #[error("Print count migration failed: {0}")]
    Migration(#[from] SourceError),

    #[error(transparent)]
    Templates(#[from] CatalogError),

    #[error("Invalid printer configuration: {0}")]
    Printer(#[from] PrintError),
}

/// How a monitoring run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunExit {
    /// Shutdown requested by the caller
    Interrupted,
    /// The session stopped on its own (retry budget exhausted)
    MonitoringStopped,
}

/// Printer host for the configured network printers and the local spooler
pub fn system_printer_host(config: &Config) -> Result<SystemPrinterHost, PrintError> {
    let mut host = SystemPrinterHost::new();
    for entry in &config.network_printers {
        host = host.with_network_printer(&entry.name, NetworkPrinter::from_addr(&entry.addr)?);
    }
    Ok(host)
}

/// Template catalogue from `TEMPLATES_FILE`, or the built-ins alone
pub fn load_catalog(config: &Config) -> Result<TemplateCatalog, CatalogError> {
    match &config.templates_file {
        Some(path) => TemplateCatalog::load(path, &config.column_measurements),
        None => Ok(TemplateCatalog::builtin(&config.column_measurements)),
    }
}

/// Open the configured SQLite store, migrating the print-count column when enabled
pub async fn open_store(config: &Config) -> Result<SqliteRecordSource, StartupError> {
    let source =
        SqliteRecordSource::connect(&config.store_path, config.schema(), &ConnectionStrategy::defaults())
            .await?;
    if config.print_count_enabled && source.ensure_print_count_column().await? {
        tracing::info!(column = %config.column_print_count, "Print count column added");
    }
    Ok(source)
}

pub struct ServiceState {
    config: Config,
    source: Arc<dyn RecordSource>,
    dispatcher: Arc<PrintDispatcher>,
    bus: EventBus,
}

impl ServiceState {
    pub fn new(
        config: Config,
        source: Arc<dyn RecordSource>,
        host: Arc<dyn PrinterHost>,
        catalog: TemplateCatalog,
    ) -> Self {
        let settings: DispatchSettings = config.dispatch_settings();
        let dispatcher = Arc::new(PrintDispatcher::new(
            host,
            source.clone(),
            Arc::new(catalog),
            settings,
        ));
        Self {
            config,
            source,
            dispatcher,
            bus: EventBus::default(),
        }
    }

    /// Connect the store and build the printing side from configuration
    pub async fn initialize(config: Config, host: Arc<dyn PrinterHost>) -> Result<Self, StartupError> {
        let source = open_store(&config).await?;
        let catalog = load_catalog(&config)?;
        Ok(Self::new(config, Arc::new(source), host, catalog))
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn source(&self) -> &Arc<dyn RecordSource> {
        &self.source
    }

    pub fn dispatcher(&self) -> &Arc<PrintDispatcher> {
        &self.dispatcher
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    /// Manual printing through the reprint guard
    pub fn reprint_guard(&self, confirmation: Arc<dyn ReprintConfirmation>) -> ReprintGuard {
        ReprintGuard::new(self.dispatcher.clone(), confirmation)
    }

    /// Monitor until `shutdown` resolves or the session stops by itself
    pub async fn run(&self, shutdown: impl Future<Output = ()>) -> Result<RunExit, MonitorError> {
        let monitor = RecordMonitor::new(
            self.source.clone(),
            self.bus.clone(),
            MonitorSettings::from(&self.config),
        );

        // 先订阅再启动，避免丢失首批事件
        let mut tasks = SubscriberTasks::new();
        tasks.spawn("event_logger", log_events(self.bus.subscribe(), tasks.shutdown_token()));
        if self.config.auto_print {
            let worker = AutoPrintWorker::new(
                self.dispatcher.clone(),
                self.config.print_format,
                Some(self.config.default_template.clone()),
            );
            tasks.spawn("auto_print", worker.run(self.bus.subscribe(), tasks.shutdown_token()));
        } else {
            tracing::info!("Auto-print disabled, records are only reported");
        }

        if let Err(e) = monitor.start().await {
            tasks.shutdown().await;
            return Err(e);
        }

        let exit = tokio::select! {
            _ = shutdown => {
                tracing::info!("Shutdown requested");
                RunExit::Interrupted
            }
            _ = monitor.wait_stopped() => RunExit::MonitoringStopped,
        };

        monitor.stop().await;
        if tasks.reap_finished() > 0 {
            tracing::warn!("Some subscribers stopped during the run");
        }
        tasks.shutdown().await;
        Ok(exit)
    }
}
