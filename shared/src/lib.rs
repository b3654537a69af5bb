//! Shared types for the label monitor workspace
//!
//! Data model used by both the printer crate consumers and the monitor
//! service: measurement records, label templates, print results and the
//! monitor session state.

pub mod models;

// Re-exports
pub use models::{
    DataUpdate, FieldValue, Measurement, MonitorState, OutputFormat, ParseFormatError, PrintErrorKind,
    PrintJobResult, PrintMethod, Record, RECORD_UPDATED, Template, TemplateLayout,
};
pub use serde::{Deserialize, Serialize};
