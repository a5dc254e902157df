//! Persistence contract used by the orchestrator, plus an in-memory implementation.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use time::Date;

use crate::domain::{iso_date, NormalizedSeries, StandardRow};
use crate::DataError;

/// Store failure. Only [`StoreError::Unavailable`] is systemic.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("store rejected the write: {0}")]
    Rejected(String),
}

impl StoreError {
    pub const fn is_unavailable(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }

    /// Systemic failures map to [`DataError::StoreUnavailable`]; the rest fail only the
    /// symbol that caused them.
    pub fn into_data_error(self, symbol: &str) -> DataError {
        match self {
            Self::Unavailable(message) => DataError::StoreUnavailable { message },
            Self::Rejected(message) => DataError::SymbolJobFailed {
                symbol: symbol.to_owned(),
                reason: format!("store rejected the write: {message}"),
                cause: None,
            },
        }
    }
}

/// Marker that `symbol` was fetched on `date` and which source answered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyFetchRecord {
    pub symbol: String,
    #[serde(with = "iso_date")]
    pub date: Date,
    pub source_name: String,
}

/// Recent history handed to analysis consumers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisContext {
    pub symbol: String,
    pub latest: StandardRow,
    pub previous: Option<StandardRow>,
    /// Ascending by date.
    pub raw_series: Vec<StandardRow>,
}

impl AnalysisContext {
    /// Builds a context from ascending rows, keeping the last `limit`.
    pub fn from_rows(symbol: impl Into<String>, mut rows: Vec<StandardRow>, limit: usize) -> Option<Self> {
        if rows.len() > limit {
            rows.drain(..rows.len() - limit);
        }
        let latest = rows.last()?.clone();
        let previous = rows.len().checked_sub(2).and_then(|index| rows.get(index)).cloned();
        Some(Self {
            symbol: symbol.into(),
            latest,
            previous,
            raw_series: rows,
        })
    }
}

/// Idempotent daily-bar persistence keyed by `(symbol, date)`.
///
/// Calls are blocking; async callers go through `spawn_blocking`.
pub trait Store: Send + Sync {
    /// Whether `symbol` was already fetched on `date`.
    fn has_record(&self, symbol: &str, date: Date) -> Result<bool, StoreError>;

    /// Writes every row of `series` (last write wins) and records the fetch for
    /// `fetched_on`. Returns the number of rows whose key did not exist before.
    fn upsert(
        &self,
        series: &NormalizedSeries,
        symbol: &str,
        source_name: &str,
        fetched_on: Date,
    ) -> Result<usize, StoreError>;

    fn get_context(&self, symbol: &str, limit: usize) -> Result<Option<AnalysisContext>, StoreError>;

    fn fetch_record(&self, symbol: &str, date: Date) -> Result<Option<DailyFetchRecord>, StoreError>;
}

#[derive(Debug, Default)]
struct MemoryInner {
    bars: HashMap<String, BTreeMap<Date, StandardRow>>,
    fetches: HashMap<(String, Date), DailyFetchRecord>,
}

/// Mutex-guarded in-memory [`Store`]. Can be switched offline to exercise systemic
/// failures.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<MemoryInner>,
    unavailable: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Marks `symbol` as fetched on `date` without writing bars.
    pub fn seed_fetch(&self, symbol: &str, date: Date, source_name: &str) {
        self.lock().fetches.insert(
            (symbol.to_owned(), date),
            DailyFetchRecord {
                symbol: symbol.to_owned(),
                date,
                source_name: source_name.to_owned(),
            },
        );
    }

    pub fn bar_count(&self, symbol: &str) -> usize {
        self.lock().bars.get(symbol).map_or(0, BTreeMap::len)
    }

    fn lock(&self) -> MutexGuard<'_, MemoryInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn ensure_available(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable(String::from("memory store is offline")));
        }
        Ok(())
    }
}

impl Store for MemoryStore {
    fn has_record(&self, symbol: &str, date: Date) -> Result<bool, StoreError> {
        self.ensure_available()?;
        Ok(self.lock().fetches.contains_key(&(symbol.to_owned(), date)))
    }

    fn upsert(
        &self,
        series: &NormalizedSeries,
        symbol: &str,
        source_name: &str,
        fetched_on: Date,
    ) -> Result<usize, StoreError> {
        self.ensure_available()?;
        let mut inner = self.lock();

        let bars = inner.bars.entry(symbol.to_owned()).or_default();
        let mut written = 0;
        for row in series.rows() {
            if bars.insert(row.date, row.clone()).is_none() {
                written += 1;
            }
        }

        inner.fetches.insert(
            (symbol.to_owned(), fetched_on),
            DailyFetchRecord {
                symbol: symbol.to_owned(),
                date: fetched_on,
                source_name: source_name.to_owned(),
            },
        );
        Ok(written)
    }

    fn get_context(&self, symbol: &str, limit: usize) -> Result<Option<AnalysisContext>, StoreError> {
        self.ensure_available()?;
        let inner = self.lock();
        let rows = inner
            .bars
            .get(symbol)
            .map(|bars| bars.values().cloned().collect::<Vec<_>>())
            .unwrap_or_default();
        Ok(AnalysisContext::from_rows(symbol, rows, limit))
    }

    fn fetch_record(&self, symbol: &str, date: Date) -> Result<Option<DailyFetchRecord>, StoreError> {
        self.ensure_available()?;
        Ok(self.lock().fetches.get(&(symbol.to_owned(), date)).cloned())
    }
}
