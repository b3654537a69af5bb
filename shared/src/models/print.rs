//! Print Job Result Model

use serde::{Deserialize, Serialize};
use std::fmt;

/// Delivery transport used for a job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrintMethod {
    /// Lines drawn onto a page through the driver
    PageDocument,
    /// Pre-formatted bytes copied straight to the device
    RawSpool,
}

impl fmt::Display for PrintMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PrintMethod::PageDocument => write!(f, "page_document"),
            PrintMethod::RawSpool => write!(f, "raw_spool"),
        }
    }
}

/// Failure classification of a print job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PrintErrorKind {
    /// The host has no printer registered at all
    NoPrinter,
    /// A printer was configured by name but is not installed
    PrinterNotFound,
    /// Spooler or transport failure while sending
    Transport,
    /// The payload could not be produced
    Render,
}

impl fmt::Display for PrintErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PrintErrorKind::NoPrinter => write!(f, "NoPrinter"),
            PrintErrorKind::PrinterNotFound => write!(f, "PrinterNotFound"),
            PrintErrorKind::Transport => write!(f, "Transport"),
            PrintErrorKind::Render => write!(f, "Render"),
        }
    }
}

/// Outcome of one print job, returned synchronously to the caller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrintJobResult {
    pub success: bool,
    pub method: Option<PrintMethod>,
    pub printer_used: Option<String>,
    pub error_message: Option<String>,
    pub error_kind: Option<PrintErrorKind>,
}

impl PrintJobResult {
    pub fn succeeded(method: PrintMethod, printer: impl Into<String>) -> Self {
        Self {
            success: true,
            method: Some(method),
            printer_used: Some(printer.into()),
            error_message: None,
            error_kind: None,
        }
    }

    pub fn failed(kind: PrintErrorKind, message: impl Into<String>) -> Self {
        Self {
            success: false,
            method: None,
            printer_used: None,
            error_message: Some(message.into()),
            error_kind: Some(kind),
        }
    }

    pub fn with_method(mut self, method: PrintMethod) -> Self {
        self.method = Some(method);
        self
    }

    pub fn with_printer(mut self, printer: impl Into<String>) -> Self {
        self.printer_used = Some(printer.into());
        self
    }

    /// True when the host had no printer at all
    pub fn is_no_printer(&self) -> bool {
        self.error_kind == Some(PrintErrorKind::NoPrinter)
    }
}
