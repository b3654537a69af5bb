//! Printing pipeline
//!
//! - [`renderer`] - `{Placeholder}` substitution
//! - [`templates`] - template catalogue with built-ins
//! - [`host`] - printer enumeration and delivery
//! - [`dispatcher`] - record → delivered job
//! - [`guard`] - reprint confirmation for manual prints
//! - [`worker`] - automatic printing of new records

pub mod dispatcher;
pub mod guard;
pub mod host;
pub mod renderer;
pub mod templates;
pub mod worker;

pub use dispatcher::{DispatchSettings, PrintDispatcher};
pub use guard::{AlwaysConfirm, ManualPrint, ReprintConfirmation, ReprintGuard};
pub use host::{CapturedJob, MemoryPrinterHost, PrinterHost, SystemPrinterHost};
pub use renderer::{NOT_AVAILABLE, TemplateRenderError, render, render_preview, validate};
pub use templates::{CatalogError, DEFAULT_TEMPLATE_NAME, TemplateCatalog};
pub use worker::AutoPrintWorker;
