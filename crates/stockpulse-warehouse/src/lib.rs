//! # StockPulse Warehouse
//!
//! DuckDB-backed [`Store`] for normalized daily series.
//!
//! ## Overview
//!
//! - **Idempotent upserts**: `INSERT OR REPLACE` keyed by `(symbol, date)`, one
//!   transaction per series
//! - **Fetch log**: one row per `(symbol, fetch_date)` so reruns on the same day skip
//!   symbols already fetched
//! - **Connection pooling**: connections cloned from one database instance
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use stockpulse_core::Store;
//! use stockpulse_warehouse::{Warehouse, WarehouseConfig};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let warehouse = Warehouse::open(WarehouseConfig::new("/tmp/stockpulse.duckdb"))?;
//!
//!     if let Some(context) = warehouse.get_context("2330.TW", 20)? {
//!         println!("latest close {}", context.latest.close);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Tables
//!
//! | Table | Description |
//! |-------|-------------|
//! | `daily_bars` | Standard daily rows, primary key `(symbol, date)` |
//! | `fetch_log` | Successful fetches, primary key `(symbol, fetch_date)` |
//! | `schema_migrations` | Applied migration versions |

pub mod duckdb;
pub mod migrations;

use std::fs;
use std::path::{Path, PathBuf};

use ::duckdb::{params, Connection};
use stockpulse_core::{
    parse_date, AnalysisContext, AppConfig, DailyFetchRecord, NormalizedSeries, StandardRow,
    Store, StoreError,
};
use thiserror::Error;
use time::Date;
use tracing::{debug, info};

pub use duckdb::{DuckDbConnectionManager, PooledConnection};

const BAR_COLUMNS: &str =
    "CAST(date AS VARCHAR), open, high, low, close, volume, amount, pct_chg, ma5, ma10, ma20, volume_ratio";

#[derive(Debug, Error)]
pub enum WarehouseError {
    /// The database could not be opened or a connection could not be created.
    #[error("database connection failed: {0}")]
    Connection(#[source] ::duckdb::Error),

    #[error(transparent)]
    DuckDb(#[from] ::duckdb::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// A stored value could not be read back.
    #[error("invalid stored data: {0}")]
    InvalidData(String),
}

impl From<WarehouseError> for StoreError {
    fn from(error: WarehouseError) -> Self {
        match error {
            WarehouseError::Connection(_) | WarehouseError::Io(_) => {
                StoreError::Unavailable(error.to_string())
            }
            WarehouseError::DuckDb(_) | WarehouseError::InvalidData(_) => {
                StoreError::Rejected(error.to_string())
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct WarehouseConfig {
    pub db_path: PathBuf,
    /// Maximum number of idle connections kept in the pool.
    pub max_pool_size: usize,
}

impl WarehouseConfig {
    pub fn new(db_path: impl Into<PathBuf>) -> Self {
        Self {
            db_path: db_path.into(),
            max_pool_size: 4,
        }
    }

    /// Uses the configured database path, sized for the configured worker count.
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            db_path: config.db_path.clone(),
            max_pool_size: config.max_workers.max(1),
        }
    }
}

impl Default for WarehouseConfig {
    fn default() -> Self {
        Self::from_app_config(&AppConfig::default())
    }
}

/// Daily bar warehouse.
#[derive(Clone)]
pub struct Warehouse {
    manager: DuckDbConnectionManager,
}

impl Warehouse {
    /// Opens (creating when needed) the database and applies pending migrations.
    pub fn open(config: WarehouseConfig) -> Result<Self, WarehouseError> {
        if let Some(parent) = config.db_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let manager = DuckDbConnectionManager::open(config.db_path, config.max_pool_size)
            .map_err(WarehouseError::Connection)?;
        let warehouse = Self { manager };
        warehouse.initialize()?;
        info!(db_path = %warehouse.db_path().display(), "warehouse opened");
        Ok(warehouse)
    }

    pub fn initialize(&self) -> Result<(), WarehouseError> {
        let connection = self.connection()?;
        migrations::apply_migrations(&connection)?;
        Ok(())
    }

    pub fn db_path(&self) -> &Path {
        self.manager.db_path()
    }

    pub fn schema_versions(&self) -> Result<Vec<String>, WarehouseError> {
        let connection = self.connection()?;
        Ok(migrations::applied_versions(&connection)?)
    }

    /// Writes every row in one transaction and logs the fetch. Returns the number of
    /// `(symbol, date)` keys that were new.
    pub fn upsert_series(
        &self,
        series: &NormalizedSeries,
        symbol: &str,
        source_name: &str,
        fetched_on: Date,
    ) -> Result<usize, WarehouseError> {
        let connection = self.connection()?;
        connection.execute_batch("BEGIN TRANSACTION")?;
        let result = write_series(&connection, series, symbol, source_name, fetched_on);
        let written = finalize_transaction(&connection, result)?;

        debug!(symbol, source = source_name, rows = series.len(), written, "series upserted");
        Ok(written)
    }

    /// Last `limit` rows for `symbol`, ascending by date.
    pub fn recent_rows(&self, symbol: &str, limit: usize) -> Result<Vec<StandardRow>, WarehouseError> {
        let connection = self.connection()?;
        let sql = format!(
            "SELECT {BAR_COLUMNS} FROM (\
             SELECT * FROM daily_bars WHERE symbol = ? ORDER BY date DESC LIMIT {limit}\
             ) ORDER BY date ASC"
        );

        let mut statement = connection.prepare(sql.as_str())?;
        let mut rows = statement.query(params![symbol])?;
        let mut output = Vec::new();
        while let Some(row) = rows.next()? {
            output.push(read_bar(row)?);
        }
        Ok(output)
    }

    pub fn fetch_log_entry(&self, symbol: &str, date: Date) -> Result<Option<DailyFetchRecord>, WarehouseError> {
        let connection = self.connection()?;
        let mut statement = connection.prepare(
            "SELECT source_name FROM fetch_log WHERE symbol = ? AND fetch_date = CAST(? AS DATE)",
        )?;
        let mut rows = statement.query(params![symbol, date.to_string()])?;

        match rows.next()? {
            Some(row) => Ok(Some(DailyFetchRecord {
                symbol: symbol.to_owned(),
                date,
                source_name: row.get(0)?,
            })),
            None => Ok(None),
        }
    }

    pub fn bar_count(&self, symbol: &str) -> Result<usize, WarehouseError> {
        let connection = self.connection()?;
        let count: i64 = connection.query_row(
            "SELECT COUNT(*) FROM daily_bars WHERE symbol = ?",
            params![symbol],
            |row| row.get(0),
        )?;
        Ok(usize::try_from(count).unwrap_or_default())
    }

    fn connection(&self) -> Result<PooledConnection, WarehouseError> {
        self.manager.acquire().map_err(WarehouseError::Connection)
    }
}

impl Store for Warehouse {
    fn has_record(&self, symbol: &str, date: Date) -> Result<bool, StoreError> {
        Ok(self.fetch_log_entry(symbol, date)?.is_some())
    }

    fn upsert(
        &self,
        series: &NormalizedSeries,
        symbol: &str,
        source_name: &str,
        fetched_on: Date,
    ) -> Result<usize, StoreError> {
        Ok(self.upsert_series(series, symbol, source_name, fetched_on)?)
    }

    fn get_context(&self, symbol: &str, limit: usize) -> Result<Option<AnalysisContext>, StoreError> {
        let rows = self.recent_rows(symbol, limit)?;
        Ok(AnalysisContext::from_rows(symbol, rows, limit))
    }

    fn fetch_record(&self, symbol: &str, date: Date) -> Result<Option<DailyFetchRecord>, StoreError> {
        Ok(self.fetch_log_entry(symbol, date)?)
    }
}

fn write_series(
    connection: &Connection,
    series: &NormalizedSeries,
    symbol: &str,
    source_name: &str,
    fetched_on: Date,
) -> Result<usize, WarehouseError> {
    let mut exists = connection.prepare(
        "SELECT COUNT(*) FROM daily_bars WHERE symbol = ? AND date = CAST(? AS DATE)",
    )?;
    let mut insert = connection.prepare(
        "INSERT OR REPLACE INTO daily_bars \
         (symbol, date, open, high, low, close, volume, amount, pct_chg, ma5, ma10, ma20, \
         volume_ratio, source_name, updated_at) \
         VALUES (?, CAST(? AS DATE), ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, CURRENT_TIMESTAMP)",
    )?;

    let mut written = 0;
    for row in series.rows() {
        let date = row.date.to_string();
        let existing: i64 = exists.query_row(params![symbol, date], |found| found.get(0))?;
        if existing == 0 {
            written += 1;
        }

        insert.execute(params![
            symbol,
            date,
            row.open,
            row.high,
            row.low,
            row.close,
            row.volume,
            row.amount,
            row.pct_chg,
            row.ma5,
            row.ma10,
            row.ma20,
            row.volume_ratio,
            source_name,
        ])?;
    }

    let rows_written = i64::try_from(written).unwrap_or(i64::MAX);
    connection.execute(
        "INSERT OR REPLACE INTO fetch_log (symbol, fetch_date, source_name, rows_written, fetched_at) \
         VALUES (?, CAST(? AS DATE), ?, ?, CURRENT_TIMESTAMP)",
        params![symbol, fetched_on.to_string(), source_name, rows_written],
    )?;

    Ok(written)
}

fn read_bar(row: &::duckdb::Row<'_>) -> Result<StandardRow, WarehouseError> {
    let raw_date: String = row.get(0)?;
    let date = parse_date(raw_date.as_str())
        .map_err(|_| WarehouseError::InvalidData(format!("bad bar date '{raw_date}'")))?;

    Ok(StandardRow {
        date,
        open: row.get(1)?,
        high: row.get(2)?,
        low: row.get(3)?,
        close: row.get(4)?,
        volume: row.get(5)?,
        amount: row.get(6)?,
        pct_chg: row.get(7)?,
        ma5: row.get(8)?,
        ma10: row.get(9)?,
        ma20: row.get(10)?,
        volume_ratio: row.get(11)?,
    })
}

/// Commits on success, rolls back on failure.
fn finalize_transaction<T>(
    connection: &Connection,
    result: Result<T, WarehouseError>,
) -> Result<T, WarehouseError> {
    match result {
        Ok(value) => {
            connection.execute_batch("COMMIT")?;
            Ok(value)
        }
        Err(error) => {
            let _ = connection.execute_batch("ROLLBACK");
            Err(error)
        }
    }
}
