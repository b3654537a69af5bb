//! Transport errors

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PrintError {
    /// TCP connect refused or reset
    #[error("Cannot reach printer {0}")]
    Connection(String),

    #[error("Printer I/O failed: {0}")]
    Io(#[from] std::io::Error),

    /// Spooler or device reports the printer offline
    #[error("Printer offline: {0}")]
    Offline(String),

    #[error("Printer timed out: {0}")]
    Timeout(String),

    /// Bad printer address or name in configuration
    #[error("Invalid printer configuration: {0}")]
    InvalidConfig(String),

    /// No transport for this printer on the current platform
    #[error("Unsupported printer: {0}")]
    Unsupported(String),

    #[cfg(windows)]
    #[error("Spooler error: {0}")]
    WindowsPrinter(String),
}

pub type PrintResult<T> = Result<T, PrintError>;
