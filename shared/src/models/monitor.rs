//! Monitor Session Model

use super::record::Record;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Update type carried by every change notification
pub const RECORD_UPDATED: &str = "record updated";

/// Monitor session state
///
/// ```text
/// Stopped → Connecting → Monitoring → Error → Stopped
///                                   ↘ Stopped
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum MonitorState {
    #[default]
    Stopped,
    Connecting,
    Monitoring,
    Error,
}

impl fmt::Display for MonitorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MonitorState::Stopped => write!(f, "Stopped"),
            MonitorState::Connecting => write!(f, "Connecting"),
            MonitorState::Monitoring => write!(f, "Monitoring"),
            MonitorState::Error => write!(f, "Error"),
        }
    }
}

/// Payload of a data-update notification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataUpdate {
    pub last_record: Record,
    /// Newest-first window fetched after the change
    pub recent_records: Vec<Record>,
    pub update_type: String,
    /// Human-readable change description
    pub detail: String,
}
