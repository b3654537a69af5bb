//! Connection strategies
//!
//! The store belongs to the measurement software: its journal mode and
//! locking are left as they are. Strategies only differ in how much access
//! they ask for. They are tried in order and the first one that passes the
//! liveness probe is kept.

use sqlx::ConnectOptions;
use sqlx::sqlite::{SqliteConnectOptions, SqliteConnection};
use std::path::Path;
use std::time::Duration;

/// How to open the store
#[derive(Debug, Clone)]
pub struct ConnectionStrategy {
    name: String,
    read_only: bool,
    /// Skip SQLite file locking entirely (read-only media, shares without locks)
    immutable: bool,
    busy_timeout: Duration,
}

impl ConnectionStrategy {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            read_only: false,
            immutable: false,
            busy_timeout: Duration::from_secs(5),
        }
    }

    /// Normal shared access; print counts can be written
    pub fn read_write() -> Self {
        Self::new("sqlite-read-write")
    }

    /// Monitoring only, print-count updates will fail
    pub fn read_only() -> Self {
        Self::new("sqlite-read-only").with_read_only(true)
    }

    /// Last resort for shares where SQLite locking does not work.
    /// Each query opens a fresh connection, so new rows are still seen.
    pub fn immutable() -> Self {
        Self::new("sqlite-immutable").with_read_only(true).with_immutable(true)
    }

    /// Default order: read-write, read-only, immutable
    pub fn defaults() -> Vec<Self> {
        vec![Self::read_write(), Self::read_only(), Self::immutable()]
    }

    pub fn with_read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    pub fn with_immutable(mut self, immutable: bool) -> Self {
        self.immutable = immutable;
        self
    }

    pub fn with_busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = timeout;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    fn options(&self, path: &Path) -> SqliteConnectOptions {
        // journal_mode 不设置：沿用库文件已有的模式
        SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(false)
            .read_only(self.read_only)
            .immutable(self.immutable)
            .busy_timeout(self.busy_timeout)
            .disable_statement_logging()
    }

    /// Open a fresh connection to the store
    pub async fn open(&self, path: &Path) -> Result<SqliteConnection, sqlx::Error> {
        self.options(path).connect().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::{Connection, Row};

    async fn journal_mode(conn: &mut SqliteConnection) -> String {
        sqlx::query("PRAGMA journal_mode")
            .fetch_one(conn)
            .await
            .unwrap()
            .get(0)
    }

    #[test]
    fn test_default_order() {
        let names: Vec<String> = ConnectionStrategy::defaults()
            .iter()
            .map(|s| s.name().to_string())
            .collect();
        assert_eq!(names, vec!["sqlite-read-write", "sqlite-read-only", "sqlite-immutable"]);
        assert!(!ConnectionStrategy::read_write().is_read_only());
        assert!(ConnectionStrategy::read_only().is_read_only());
        assert!(ConnectionStrategy::immutable().is_read_only());
    }

    #[tokio::test]
    async fn test_open_missing_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.db");
        assert!(ConnectionStrategy::read_write().open(&path).await.is_err());
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_journal_mode_left_alone() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.db");
        let plain = SqliteConnectOptions::new().filename(&path).create_if_missing(true);
        let mut setup = plain.connect().await.unwrap();
        sqlx::query("CREATE TABLE t (id INTEGER)")
            .execute(&mut setup)
            .await
            .unwrap();
        setup.close().await.unwrap();

        for strategy in ConnectionStrategy::defaults() {
            let mut conn = strategy.open(&path).await.unwrap();
            sqlx::query("SELECT 1 FROM t LIMIT 1")
                .fetch_optional(&mut conn)
                .await
                .unwrap();
            conn.close().await.unwrap();
        }

        let mut conn = plain.connect().await.unwrap();
        assert_eq!(journal_mode(&mut conn).await, "delete");
        conn.close().await.unwrap();
        assert!(!dir.path().join("store.db-wal").exists());
        assert!(!dir.path().join("store.db-shm").exists());
    }
}
