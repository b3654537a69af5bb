//! SQLite-backed record source
//!
//! Every query opens a short-lived connection with the strategy chosen at
//! connect time and closes it afterwards, so the measurement software is
//! never blocked by a connection held open between ticks.

use super::error::{ConnectionError, QueryError, SourceResult, StrategyFailure};
use super::schema::StoreSchema;
use super::strategy::ConnectionStrategy;
use super::RecordSource;
use async_trait::async_trait;
use chrono::NaiveDateTime;
use shared::Record;
use shared::models::Measurement;
use sqlx::sqlite::{SqliteConnection, SqliteRow};
use sqlx::{Connection, Row};
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument, warn};

/// Record source reading one table of a SQLite store
#[derive(Debug, Clone)]
pub struct SqliteRecordSource {
    path: PathBuf,
    schema: StoreSchema,
    strategy: ConnectionStrategy,
}

impl SqliteRecordSource {
    /// Open the store with the first strategy that passes the liveness probe
    ///
    /// When every strategy fails the error lists each attempt with its reason.
    #[instrument(skip_all, fields(path = %path.as_ref().display(), table = %schema.table))]
    pub async fn connect(
        path: impl AsRef<Path>,
        schema: StoreSchema,
        strategies: &[ConnectionStrategy],
    ) -> Result<Self, ConnectionError> {
        let path = path.as_ref().to_path_buf();
        if !path.exists() {
            return Err(ConnectionError::StoreNotFound(path));
        }
        if strategies.is_empty() {
            return Err(ConnectionError::NoStrategies);
        }

        let mut attempts = Vec::with_capacity(strategies.len());
        for strategy in strategies {
            match probe(strategy, &path, &schema).await {
                Ok(()) => {
                    info!(strategy = strategy.name(), "Store connection established");
                    return Ok(Self {
                        path,
                        schema,
                        strategy: strategy.clone(),
                    });
                }
                Err(reason) => {
                    warn!(strategy = strategy.name(), %reason, "Connection strategy failed");
                    attempts.push(StrategyFailure {
                        strategy: strategy.name().to_string(),
                        reason,
                    });
                }
            }
        }

        Err(ConnectionError::AllStrategiesFailed { path, attempts })
    }

    /// Strategy that passed the probe
    pub fn strategy(&self) -> &ConnectionStrategy {
        &self.strategy
    }

    pub fn schema(&self) -> &StoreSchema {
        &self.schema
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn open(&self) -> Result<SqliteConnection, ConnectionError> {
        self.strategy
            .open(&self.path)
            .await
            .map_err(|e| ConnectionError::Lost {
                strategy: self.strategy.name().to_string(),
                reason: e.to_string(),
            })
    }

    /// Add the print-count column when it is missing
    ///
    /// Existing rows start at zero. Returns `true` when the column was added.
    #[instrument(skip(self), fields(table = %self.schema.table))]
    pub async fn ensure_print_count_column(&self) -> SourceResult<bool> {
        let mut conn = self.open().await?;
        let result = self.migrate_print_count(&mut conn).await;
        let _ = conn.close().await;
        result
    }

    async fn migrate_print_count(&self, conn: &mut SqliteConnection) -> SourceResult<bool> {
        let columns = sqlx::query(&self.schema.table_info_sql())
            .fetch_all(&mut *conn)
            .await
            .map_err(QueryError::from)?;

        if columns.is_empty() {
            return Err(QueryError::Schema(format!("no such table: {}", self.schema.table)).into());
        }

        let wanted = &self.schema.print_count_column;
        let exists = columns.iter().any(|row| {
            row.try_get::<String, _>("name")
                .map(|name| name.eq_ignore_ascii_case(wanted))
                .unwrap_or(false)
        });
        if exists {
            debug!(column = %wanted, "Print count column present");
            return Ok(false);
        }

        sqlx::query(&self.schema.add_print_count_column_sql())
            .execute(&mut *conn)
            .await
            .map_err(QueryError::from)?;
        sqlx::query(&self.schema.zero_null_print_counts_sql())
            .execute(&mut *conn)
            .await
            .map_err(QueryError::from)?;

        info!(column = %wanted, "Added print count column");
        Ok(true)
    }

    fn decode(&self, row: &SqliteRow) -> Result<Record, QueryError> {
        let key: i64 = row.try_get(0)?;
        let serial = decode_serial(row, 1)?;
        let timestamp: Option<NaiveDateTime> = row.try_get_unchecked(2)?;

        let offset = 3;
        let measurements = self
            .schema
            .measurement_columns
            .iter()
            .enumerate()
            .map(|(i, name)| {
                let value: Option<f64> = row.try_get_unchecked(offset + i)?;
                Ok(Measurement::new(name.clone(), value))
            })
            .collect::<Result<Vec<_>, sqlx::Error>>()?;

        let print_count = if self.schema.track_print_count {
            let idx = offset + self.schema.measurement_columns.len();
            row.try_get_unchecked::<Option<i64>, _>(idx)?.unwrap_or(0)
        } else {
            0
        };

        Ok(Record {
            key,
            serial,
            timestamp,
            measurements,
            print_count,
        })
    }

    async fn fetch(&self, sql: &str, bind: Option<i64>) -> SourceResult<Vec<Record>> {
        let mut conn = self.open().await?;
        let mut query = sqlx::query(sql);
        if let Some(value) = bind {
            query = query.bind(value);
        }
        let rows = query.fetch_all(&mut conn).await;
        let _ = conn.close().await;

        let rows = rows.map_err(QueryError::from)?;
        let records = rows
            .iter()
            .map(|row| self.decode(row))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(records)
    }
}

/// Serial numbers are text in most stores but plain integers in some
fn decode_serial(row: &SqliteRow, idx: usize) -> Result<Option<String>, sqlx::Error> {
    match row.try_get::<Option<String>, _>(idx) {
        Ok(serial) => Ok(serial),
        Err(sqlx::Error::ColumnDecode { .. }) => {
            let number: Option<i64> = row.try_get_unchecked(idx)?;
            Ok(number.map(|n| n.to_string()))
        }
        Err(e) => Err(e),
    }
}

async fn probe(
    strategy: &ConnectionStrategy,
    path: &Path,
    schema: &StoreSchema,
) -> Result<(), String> {
    let mut conn = strategy.open(path).await.map_err(|e| e.to_string())?;
    let result = sqlx::query(&schema.probe_sql())
        .fetch_optional(&mut conn)
        .await
        .map(|_| ())
        .map_err(|e| e.to_string());
    let _ = conn.close().await;
    result
}

#[async_trait]
impl RecordSource for SqliteRecordSource {
    async fn probe(&self) -> SourceResult<()> {
        probe(&self.strategy, &self.path, &self.schema)
            .await
            .map_err(|reason| {
                ConnectionError::Lost {
                    strategy: self.strategy.name().to_string(),
                    reason,
                }
                .into()
            })
    }

    async fn get_last_record(&self) -> SourceResult<Option<Record>> {
        let records = self.fetch(&self.schema.last_record_sql(), None).await?;
        Ok(records.into_iter().next())
    }

    async fn get_recent_records(&self, limit: usize) -> SourceResult<Vec<Record>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        self.fetch(&self.schema.recent_records_sql(), Some(limit)).await
    }

    async fn get_record(&self, key: i64) -> SourceResult<Option<Record>> {
        let records = self.fetch(&self.schema.record_by_key_sql(), Some(key)).await?;
        Ok(records.into_iter().next())
    }

    #[instrument(skip(self), fields(table = %self.schema.table))]
    async fn update_record_print_count(&self, key: i64) -> SourceResult<()> {
        let mut conn = self.open().await?;
        let result = sqlx::query(&self.schema.increment_print_count_sql())
            .bind(key)
            .execute(&mut conn)
            .await;
        let _ = conn.close().await;

        let affected = result.map_err(QueryError::from)?.rows_affected();
        if affected == 0 {
            return Err(QueryError::RecordNotFound(key).into());
        }
        debug!(key, "Print count incremented");
        Ok(())
    }

    fn describe(&self) -> String {
        format!(
            "{}#{} ({})",
            self.path.display(),
            self.schema.table,
            self.strategy.name()
        )
    }
}
