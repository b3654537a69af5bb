//! Data Source Connector
//!
//! Access to the external measurement store:
//! - [`RecordSource`] - operations the poller and dispatcher rely on
//! - [`SqliteRecordSource`] - SQLite store opened through ordered strategies
//! - [`MemoryRecordSource`] - in-memory store for tests and dry runs

pub mod error;
pub mod memory;
pub mod schema;
pub mod sqlite;
pub mod strategy;

pub use error::{ConnectionError, QueryError, SourceError, SourceResult, StrategyFailure};
pub use memory::MemoryRecordSource;
pub use schema::StoreSchema;
pub use sqlite::SqliteRecordSource;
pub use strategy::ConnectionStrategy;

use async_trait::async_trait;
use shared::Record;

/// Operations on the monitored table
///
/// Implementations carry no timeout: a hung store stalls the caller.
#[async_trait]
pub trait RecordSource: Send + Sync {
    /// Liveness check run while a monitor session is connecting
    async fn probe(&self) -> SourceResult<()>;

    /// Most recent record by timestamp, `None` for an empty table
    async fn get_last_record(&self) -> SourceResult<Option<Record>>;

    /// Up to `limit` records, newest first
    async fn get_recent_records(&self, limit: usize) -> SourceResult<Vec<Record>>;

    /// Single record by primary key
    async fn get_record(&self, key: i64) -> SourceResult<Option<Record>>;

    /// Increment the stored print count (NULL counts as zero)
    ///
    /// Advisory: not tied to the print job by any transaction.
    async fn update_record_print_count(&self, key: i64) -> SourceResult<()>;

    /// Human-readable location for status messages
    fn describe(&self) -> String;
}
