//! Data models

pub mod monitor;
pub mod print;
pub mod record;
pub mod template;

pub use monitor::{DataUpdate, MonitorState, RECORD_UPDATED};
pub use print::{PrintErrorKind, PrintJobResult, PrintMethod};
pub use record::{FieldValue, Measurement, Record};
pub use template::{OutputFormat, ParseFormatError, Template, TemplateLayout};
