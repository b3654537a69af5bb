//! Data source error types

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// One failed connection attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StrategyFailure {
    pub strategy: String,
    pub reason: String,
}

impl fmt::Display for StrategyFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.strategy, self.reason)
    }
}

/// The store could not be opened
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("Store file not found: {}", .0.display())]
    StoreNotFound(PathBuf),

    #[error("No connection strategy configured")]
    NoStrategies,

    #[error("{}", describe_attempts(.path, .attempts))]
    AllStrategiesFailed {
        path: PathBuf,
        attempts: Vec<StrategyFailure>,
    },

    /// A short-lived connection failed after the store was opened once
    #[error("Connection lost ({strategy}): {reason}")]
    Lost { strategy: String, reason: String },
}

impl ConnectionError {
    /// Operator guidance derived from the recorded failure reasons
    pub fn hint(&self) -> Option<&'static str> {
        let reasons: Vec<&str> = match self {
            ConnectionError::StoreNotFound(_) => {
                return Some("check STORE_PATH and that the share holding the store is mounted");
            }
            ConnectionError::NoStrategies => return None,
            ConnectionError::AllStrategiesFailed { attempts, .. } => {
                attempts.iter().map(|a| a.reason.as_str()).collect()
            }
            ConnectionError::Lost { reason, .. } => vec![reason.as_str()],
        };

        let any = |needle: &str| reasons.iter().any(|r| r.to_lowercase().contains(needle));
        if any("not a database") {
            Some("STORE_PATH does not point to a SQLite store")
        } else if any("locked") || any("busy") {
            Some("the measurement software holds an exclusive lock; enable shared access or retry later")
        } else if any("no such table") {
            Some("STORE_TABLE does not exist in the store")
        } else if any("unable to open") || any("permission") || any("readonly") {
            Some("check file permissions of the store and its directory")
        } else {
            None
        }
    }
}

fn describe_attempts(path: &std::path::Path, attempts: &[StrategyFailure]) -> String {
    let mut msg = format!(
        "All {} connection strategies failed for {}",
        attempts.len(),
        path.display()
    );
    for attempt in attempts {
        msg.push_str("\n  ");
        msg.push_str(&attempt.to_string());
    }
    msg
}

/// A query against an open store failed
#[derive(Debug, Error)]
pub enum QueryError {
    /// Configured table/column names do not match the store
    #[error("Schema mismatch: {0}")]
    Schema(String),

    #[error("Record not found: {0}")]
    RecordNotFound(i64),

    #[error("Database error: {0}")]
    Database(String),
}

impl From<sqlx::Error> for QueryError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::ColumnNotFound(col) => QueryError::Schema(format!("no such column: {col}")),
            sqlx::Error::ColumnDecode { index, source } => {
                QueryError::Schema(format!("column {index} has an unexpected type: {source}"))
            }
            sqlx::Error::Database(db) => {
                let msg = db.message().to_string();
                if msg.contains("no such column") || msg.contains("no such table") {
                    QueryError::Schema(msg)
                } else {
                    QueryError::Database(msg)
                }
            }
            other => QueryError::Database(other.to_string()),
        }
    }
}

/// Anything a poll tick can fail with
#[derive(Debug, Error)]
pub enum SourceError {
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    #[error(transparent)]
    Query(#[from] QueryError),
}

/// Result type for data source operations
pub type SourceResult<T> = Result<T, SourceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aggregated_message_names_every_strategy() {
        let err = ConnectionError::AllStrategiesFailed {
            path: PathBuf::from("/data/results.db"),
            attempts: vec![
                StrategyFailure {
                    strategy: "sqlite-read-write".into(),
                    reason: "database is locked".into(),
                },
                StrategyFailure {
                    strategy: "sqlite-read-only".into(),
                    reason: "unable to open database file".into(),
                },
            ],
        };

        let msg = err.to_string();
        assert!(msg.contains("All 2 connection strategies failed for /data/results.db"));
        assert!(msg.contains("[sqlite-read-write] database is locked"));
        assert!(msg.contains("[sqlite-read-only] unable to open database file"));
        assert!(err.hint().unwrap().contains("exclusive lock"));
    }

    #[test]
    fn test_hint_for_missing_store() {
        let err = ConnectionError::StoreNotFound(PathBuf::from("x.db"));
        assert!(err.hint().unwrap().contains("STORE_PATH"));
        assert!(ConnectionError::NoStrategies.hint().is_none());
    }
}
