//! SQLite record source against a real store file

use label_monitor::source::{
    ConnectionError, ConnectionStrategy, QueryError, RecordSource, SourceError, SqliteRecordSource, StoreSchema,
};
use sqlx::sqlite::SqliteConnectOptions;
use sqlx::{ConnectOptions, Connection};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

async fn exec(path: &Path, statements: &[&str]) {
    let mut conn = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true)
        .connect()
        .await
        .unwrap();
    for sql in statements {
        sqlx::query(sql).execute(&mut conn).await.unwrap();
    }
    conn.close().await.unwrap();
}

/// Store laid out like the bench software writes it
async fn create_store(dir: &TempDir, with_print_count: bool) -> PathBuf {
    let path = dir.path().join("results.db");
    let print_count = if with_print_count { ", PrintCount INTEGER" } else { "" };
    let create = format!(
        "CREATE TABLE TestResults (ID INTEGER PRIMARY KEY, SerialNumber TEXT, TestTime TEXT, \
         Resistance REAL, Voltage REAL, Current REAL, Leakage REAL{print_count})"
    );
    exec(&path, &[&create]).await;
    path
}

async fn insert(path: &Path, id: i64, serial: &str, time: &str) {
    let sql = format!(
        "INSERT INTO TestResults (ID, SerialNumber, TestTime, Resistance, Voltage, Current, Leakage) \
         VALUES ({id}, '{serial}', '{time}', 1.25, 3.3, NULL, 0.0002)"
    );
    exec(path, &[&sql]).await;
}

async fn connect(path: &Path, schema: StoreSchema) -> Result<SqliteRecordSource, ConnectionError> {
    SqliteRecordSource::connect(path, schema, &ConnectionStrategy::defaults()).await
}

#[tokio::test]
async fn test_connects_with_first_strategy() {
    let dir = tempfile::tempdir().unwrap();
    let path = create_store(&dir, false).await;

    let source = connect(&path, StoreSchema::default()).await.unwrap();
    assert_eq!(source.strategy().name(), "sqlite-read-write");
    assert!(!source.strategy().is_read_only());
    assert!(source.describe().contains("TestResults"));
    assert!(source.probe().await.is_ok());
}

#[tokio::test]
async fn test_missing_store_file() {
    let dir = tempfile::tempdir().unwrap();
    let result = connect(&dir.path().join("nope.db"), StoreSchema::default()).await;
    assert!(matches!(result, Err(ConnectionError::StoreNotFound(_))));
}

#[tokio::test]
async fn test_wrong_table_lists_every_strategy() {
    let dir = tempfile::tempdir().unwrap();
    let path = create_store(&dir, false).await;

    let err = connect(&path, StoreSchema::default().with_table("Results2"))
        .await
        .unwrap_err();
    let ConnectionError::AllStrategiesFailed { attempts, .. } = &err else {
        panic!("unexpected error: {err}");
    };
    assert_eq!(attempts.len(), 3);

    let message = err.to_string();
    for name in ["sqlite-read-write", "sqlite-read-only", "sqlite-immutable"] {
        assert!(message.contains(name), "{message}");
    }
    assert!(message.contains("no such table"));
    assert_eq!(err.hint(), Some("STORE_TABLE does not exist in the store"));
}

#[tokio::test]
async fn test_records_newest_first() {
    let dir = tempfile::tempdir().unwrap();
    let path = create_store(&dir, false).await;
    insert(&path, 1, "SN-1", "2024-05-01 10:00:00").await;
    insert(&path, 2, "SN-2", "2024-05-01 10:05:00").await;
    insert(&path, 3, "SN-3", "2024-05-01 10:05:00").await;

    let source = connect(&path, StoreSchema::default()).await.unwrap();

    let last = source.get_last_record().await.unwrap().unwrap();
    assert_eq!(last.key, 3);
    assert_eq!(last.serial.as_deref(), Some("SN-3"));
    assert_eq!(
        last.timestamp.map(|t| t.to_string()),
        Some("2024-05-01 10:05:00".to_string())
    );
    assert_eq!(last.measurement("Resistance").unwrap().value, Some(1.25));
    assert_eq!(last.measurement("Current").unwrap().value, None);
    assert_eq!(last.print_count, 0);

    let keys: Vec<i64> = source
        .get_recent_records(2)
        .await
        .unwrap()
        .iter()
        .map(|r| r.key)
        .collect();
    assert_eq!(keys, vec![3, 2]);

    assert_eq!(source.get_record(1).await.unwrap().unwrap().serial.as_deref(), Some("SN-1"));
    assert!(source.get_record(42).await.unwrap().is_none());
}

#[tokio::test]
async fn test_empty_table() {
    let dir = tempfile::tempdir().unwrap();
    let path = create_store(&dir, false).await;
    let source = connect(&path, StoreSchema::default()).await.unwrap();

    assert!(source.get_last_record().await.unwrap().is_none());
    assert!(source.get_recent_records(50).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_unknown_measurement_column_is_schema_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = create_store(&dir, false).await;
    insert(&path, 1, "SN-1", "2024-05-01 10:00:00").await;

    let mut schema = StoreSchema::default();
    schema.measurement_columns.push("Capacitance".into());
    let source = connect(&path, schema).await.unwrap();

    assert!(matches!(
        source.get_last_record().await,
        Err(SourceError::Query(QueryError::Schema(_)))
    ));
}

#[tokio::test]
async fn test_print_count_column_added_once() {
    let dir = tempfile::tempdir().unwrap();
    let path = create_store(&dir, false).await;
    insert(&path, 1, "SN-1", "2024-05-01 10:00:00").await;

    let source = connect(&path, StoreSchema::default().with_print_count(true))
        .await
        .unwrap();
    assert!(source.ensure_print_count_column().await.unwrap());
    assert!(!source.ensure_print_count_column().await.unwrap());

    assert_eq!(source.get_record(1).await.unwrap().unwrap().print_count, 0);
    source.update_record_print_count(1).await.unwrap();
    source.update_record_print_count(1).await.unwrap();
    assert_eq!(source.get_record(1).await.unwrap().unwrap().print_count, 2);
}

#[tokio::test]
async fn test_null_print_count_counts_as_zero() {
    let dir = tempfile::tempdir().unwrap();
    let path = create_store(&dir, true).await;
    insert(&path, 7, "SN-7", "2024-05-01 10:00:00").await;

    let source = connect(&path, StoreSchema::default().with_print_count(true))
        .await
        .unwrap();
    let record = source.get_record(7).await.unwrap().unwrap();
    assert_eq!(record.print_count, 0);
    assert!(!record.is_printed());

    source.update_record_print_count(7).await.unwrap();
    assert_eq!(source.get_record(7).await.unwrap().unwrap().print_count, 1);
}

#[tokio::test]
async fn test_update_unknown_record() {
    let dir = tempfile::tempdir().unwrap();
    let path = create_store(&dir, true).await;
    let source = connect(&path, StoreSchema::default().with_print_count(true))
        .await
        .unwrap();

    assert!(matches!(
        source.update_record_print_count(999).await,
        Err(SourceError::Query(QueryError::RecordNotFound(999)))
    ));
}
