//! 监控会话错误

use crate::source::{ConnectionError, SourceError};
use thiserror::Error;

/// Failure of a monitor session as a whole
///
/// Tick-level source errors are counted by the retry budget and never
/// surface here; only connecting and budget exhaustion do.
#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("Monitoring is already running")]
    AlreadyRunning,

    #[error("Cannot connect to data store: {0}")]
    Connection(#[from] ConnectionError),

    #[error("Data store check failed: {0}")]
    Source(SourceError),

    /// Retry budget exhausted
    #[error("Monitoring stopped after {failures} consecutive failures: {cause}")]
    Fatal { failures: u32, cause: String },
}

impl From<SourceError> for MonitorError {
    fn from(err: SourceError) -> Self {
        match err {
            SourceError::Connection(e) => MonitorError::Connection(e),
            other => MonitorError::Source(other),
        }
    }
}

pub type MonitorResult<T> = Result<T, MonitorError>;
