//! Print dispatcher
//!
//! Turns a record into a delivered print job:
//!
//! ```text
//! record ─► printer selection ─► template ─► render ─┬─ Text ─► PageDocument ─► draw_page
//!                                                    └─ raw  ─► encode_text  ─► spool_raw
//! ```
//!
//! Every failure is returned as a [`PrintJobResult`]; nothing is raised past
//! this boundary. Jobs for the same printer are serialized.

use super::host::PrinterHost;
use super::renderer;
use super::templates::{DEFAULT_TEMPLATE_NAME, TemplateCatalog};
use crate::source::RecordSource;
use crate::utils::PRINT_AUDIT_TARGET;
use dashmap::DashMap;
use label_printer::{Codepage, PageDocument, PageLayout, encode_text};
use parking_lot::Mutex;
use shared::{OutputFormat, PrintErrorKind, PrintJobResult, PrintMethod, Record, TemplateLayout};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::instrument;

/// Dispatcher settings, passed in explicitly
#[derive(Debug, Clone)]
pub struct DispatchSettings {
    /// Preferred printer; `None` uses the host default
    pub printer_name: Option<String>,
    pub default_template: String,
    /// Increment the store's print count after each successful job
    pub print_count_enabled: bool,
    pub codepage: Codepage,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            printer_name: None,
            default_template: DEFAULT_TEMPLATE_NAME.to_string(),
            print_count_enabled: false,
            codepage: Codepage::default(),
        }
    }
}

pub struct PrintDispatcher {
    host: Arc<dyn PrinterHost>,
    source: Arc<dyn RecordSource>,
    catalog: Arc<TemplateCatalog>,
    settings: DispatchSettings,
    device_locks: DashMap<String, Arc<tokio::sync::Mutex<()>>>,
    count_updates: Mutex<Vec<JoinHandle<()>>>,
}

impl PrintDispatcher {
    pub fn new(
        host: Arc<dyn PrinterHost>,
        source: Arc<dyn RecordSource>,
        catalog: Arc<TemplateCatalog>,
        settings: DispatchSettings,
    ) -> Self {
        Self {
            host,
            source,
            catalog,
            settings,
            device_locks: DashMap::new(),
            count_updates: Mutex::new(Vec::new()),
        }
    }

    pub fn settings(&self) -> &DispatchSettings {
        &self.settings
    }

    pub fn catalog(&self) -> &TemplateCatalog {
        &self.catalog
    }

    /// Print one record
    #[instrument(skip(self, record), fields(key = record.key, format = %format))]
    pub async fn print_record(
        &self,
        record: &Record,
        format: OutputFormat,
        template_name: Option<&str>,
    ) -> PrintJobResult {
        let printer = match self.select_printer().await {
            Ok(name) => name,
            Err(result) => {
                tracing::warn!(
                    kind = ?result.error_kind,
                    error = result.error_message.as_deref().unwrap_or_default(),
                    "No printer available"
                );
                return result;
            }
        };

        let template = self
            .catalog
            .resolve(template_name, &self.settings.default_template, format);

        let rendered = renderer::render(&template, record);
        if rendered.trim().is_empty() {
            return PrintJobResult::failed(
                PrintErrorKind::Render,
                format!("Template '{}' rendered no content", template.name),
            )
            .with_printer(printer);
        }

        let method = if format.is_raw() {
            PrintMethod::RawSpool
        } else {
            PrintMethod::PageDocument
        };

        let lock = self
            .device_locks
            .entry(printer.clone())
            .or_default()
            .clone();
        let delivered = {
            let _device = lock.lock().await;
            match method {
                PrintMethod::PageDocument => {
                    let page = PageDocument::from_text(
                        job_title(record),
                        &rendered,
                        page_layout(&template.layout),
                    );
                    self.host.draw_page(&printer, &page).await
                }
                PrintMethod::RawSpool => {
                    let data = encode_text(&rendered, self.settings.codepage);
                    self.host.spool_raw(&printer, &data).await
                }
            }
        };

        if let Err(e) = delivered {
            tracing::error!(printer = %printer, method = %method, error = %e, "Print job failed");
            return PrintJobResult::failed(PrintErrorKind::Transport, e.to_string())
                .with_method(method)
                .with_printer(printer);
        }

        tracing::info!(
            target: PRINT_AUDIT_TARGET,
            key = record.key,
            serial = record.serial.as_deref().unwrap_or_default(),
            print_count = record.print_count,
            printer = %printer,
            method = %method,
            template = %template.name,
            "Label printed"
        );
        if self.settings.print_count_enabled {
            self.spawn_count_update(record.key);
        }
        PrintJobResult::succeeded(method, printer)
    }

    /// Configured printer if installed, else the host default, else the first one
    async fn select_printer(&self) -> Result<String, PrintJobResult> {
        let installed = self.host.installed_printers().await.map_err(|e| {
            PrintJobResult::failed(
                PrintErrorKind::Transport,
                format!("Cannot enumerate printers: {}", e),
            )
        })?;
        if installed.is_empty() {
            return Err(PrintJobResult::failed(
                PrintErrorKind::NoPrinter,
                "No printer is installed on this computer",
            ));
        }

        if let Some(name) = &self.settings.printer_name {
            return if installed.iter().any(|p| p == name) {
                Ok(name.clone())
            } else {
                Err(PrintJobResult::failed(
                    PrintErrorKind::PrinterNotFound,
                    format!("Printer '{}' is not installed", name),
                ))
            };
        }

        match self.host.default_printer().await {
            Ok(Some(default)) if installed.contains(&default) => return Ok(default),
            Ok(_) => {}
            Err(e) => tracing::warn!(error = %e, "Cannot read default printer"),
        }
        Ok(installed.into_iter().next().unwrap_or_default())
    }

    /// Best-effort increment, not tied to the job
    fn spawn_count_update(&self, key: i64) {
        let source = self.source.clone();
        let handle = tokio::spawn(async move {
            match source.update_record_print_count(key).await {
                Ok(()) => tracing::debug!(key, "Print count incremented"),
                Err(e) => tracing::warn!(key, error = %e, "Failed to update print count"),
            }
        });
        let mut pending = self.count_updates.lock();
        pending.retain(|h| !h.is_finished());
        pending.push(handle);
    }

    /// Wait for outstanding print-count updates (before process exit)
    pub async fn flush_count_updates(&self) {
        let pending = std::mem::take(&mut *self.count_updates.lock());
        for handle in pending {
            let _ = handle.await;
        }
    }
}

fn job_title(record: &Record) -> String {
    match &record.serial {
        Some(serial) => format!("Label {}", serial),
        None => format!("Label #{}", record.key),
    }
}

fn page_layout(layout: &TemplateLayout) -> PageLayout {
    PageLayout {
        font_family: layout.font_family.clone(),
        font_size_pt: layout.font_size,
        line_spacing: layout.line_spacing,
        margin_left_mm: layout.margin_left_mm,
        margin_top_mm: layout.margin_top_mm,
        width_mm: layout.width_mm,
        height_mm: layout.height_mm,
    }
}
