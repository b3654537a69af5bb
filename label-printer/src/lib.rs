//! # label-printer
//!
//! Label printer transport library - low-level printing capabilities only.
//!
//! ## Scope
//!
//! This crate handles HOW to print:
//! - Raw spooling of printer-control payloads (ZPL)
//! - Page drawing of plain text labels through the driver
//! - Codepage encoding of raw payloads
//! - Network printing (TCP port 9100)
//! - Windows driver printing
//!
//! Business logic (WHAT to print, WHEN) stays in `label-monitor`.
//!
//! ## Example
//!
//! ```ignore
//! use label_printer::{NetworkPrinter, Printer, ZplBuilder};
//!
//! let mut zpl = ZplBuilder::new();
//! zpl.utf8();
//! zpl.field_origin(30, 30).font(40, 40).text("SN-0001");
//! zpl.field_origin(30, 90).code128("SN-0001", 80);
//!
//! let printer = NetworkPrinter::new("192.168.1.50", 9100)?;
//! printer.print_raw(zpl.build().as_bytes()).await?;
//! ```

mod encoding;
mod error;
mod page;
mod printer;
mod zpl;

// Re-exports
pub use encoding::{Codepage, encode_text, text_width};
pub use error::{PrintError, PrintResult};
pub use page::{PageDocument, PageLayout, PageLine};
pub use printer::{NetworkPrinter, Printer, RAW_PORT};
pub use zpl::{ZplBuilder, escape_field_data};

#[cfg(windows)]
pub use printer::WindowsPrinter;
