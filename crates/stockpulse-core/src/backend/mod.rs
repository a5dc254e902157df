//! Market-data backend and the process-wide lock that guards it.
//!
//! The backend keeps session state (cookies, crumbs, per-ticker caches) that is not
//! safe under concurrent use, so every call made through [`SharedBackend`] holds one
//! global mutex for the duration of that single call. Providers and the market
//! overview only ever see [`SharedBackend`].

mod yahoo;

use std::sync::Arc;

use serde_json::Value;
use time::Date;
use tokio::sync::Mutex;
use tracing::trace;

use crate::domain::{FetchRange, StagedRow};
use crate::http_client::HttpClient;
use crate::{BackendError, BoxFuture};

pub use yahoo::YahooChartBackend;

static BACKEND_LOCK: Mutex<()> = Mutex::const_new(());

/// Provider-native tabular result. Column names are backend specific.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawFrame {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl RawFrame {
    pub fn new<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
        }
    }

    pub fn push_row(&mut self, row: Vec<Value>) {
        self.rows.push(row);
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns
            .iter()
            .position(|column| column.eq_ignore_ascii_case(name))
    }
}

/// Native request shape of the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadRequest {
    pub ticker: String,
    pub start: Date,
    /// First date NOT included in the result.
    pub end_exclusive: Date,
    pub auto_adjust: bool,
}

impl DownloadRequest {
    /// Daily request covering `range`, translated to an exclusive upper bound.
    pub fn daily(ticker: impl Into<String>, range: FetchRange, auto_adjust: bool) -> Self {
        Self {
            ticker: ticker.into(),
            start: range.start(),
            end_exclusive: range.exclusive_end(),
            auto_adjust,
        }
    }
}

/// Third-party market-data library contract.
pub trait MarketBackend: Send + Sync {
    fn download<'a>(&'a self, request: DownloadRequest) -> BoxFuture<'a, Result<RawFrame, BackendError>>;

    /// Display name of a ticker, if the backend knows one.
    fn lookup_name<'a>(&'a self, ticker: &'a str) -> BoxFuture<'a, Result<Option<String>, BackendError>>;
}

/// Serialized handle to a [`MarketBackend`].
#[derive(Clone)]
pub struct SharedBackend {
    inner: Arc<dyn MarketBackend>,
}

impl std::fmt::Debug for SharedBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedBackend").finish_non_exhaustive()
    }
}

impl SharedBackend {
    pub fn new(inner: Arc<dyn MarketBackend>) -> Self {
        Self { inner }
    }

    pub fn yahoo(http_client: Arc<dyn HttpClient>, timeout_ms: u64) -> Self {
        Self::new(Arc::new(YahooChartBackend::new(http_client, timeout_ms)))
    }

    pub async fn download(&self, request: DownloadRequest) -> Result<RawFrame, BackendError> {
        let _guard = BACKEND_LOCK.lock().await;
        trace!(ticker = %request.ticker, start = %request.start, end_exclusive = %request.end_exclusive, "backend download");
        self.inner.download(request).await
    }

    pub async fn lookup_name(&self, ticker: &str) -> Result<Option<String>, BackendError> {
        let _guard = BACKEND_LOCK.lock().await;
        self.inner.lookup_name(ticker).await
    }
}

/// Column names of the backend's daily frame.
pub const DATE_COLUMN: &str = "Date";
pub const OPEN_COLUMN: &str = "Open";
pub const HIGH_COLUMN: &str = "High";
pub const LOW_COLUMN: &str = "Low";
pub const CLOSE_COLUMN: &str = "Close";
pub const VOLUME_COLUMN: &str = "Volume";

/// Renames the backend's daily columns onto the standard row layout.
///
/// Fails when one of the required columns is absent.
pub fn frame_to_staged(frame: &RawFrame) -> Result<Vec<StagedRow>, BackendError> {
    let required = |name: &str| {
        frame
            .column_index(name)
            .ok_or_else(|| BackendError::Malformed(format!("missing column '{name}'")))
    };
    let date = required(DATE_COLUMN)?;
    let open = required(OPEN_COLUMN)?;
    let high = required(HIGH_COLUMN)?;
    let low = required(LOW_COLUMN)?;
    let close = required(CLOSE_COLUMN)?;
    let volume = required(VOLUME_COLUMN)?;
    let amount = frame.column_index("Amount");

    let cell = |row: &[Value], index: usize| row.get(index).cloned().unwrap_or(Value::Null);

    Ok(frame
        .rows
        .iter()
        .map(|row| StagedRow {
            date: cell(row, date),
            open: cell(row, open),
            high: cell(row, high),
            low: cell(row, low),
            close: cell(row, close),
            volume: cell(row, volume),
            amount: amount.map(|index| cell(row, index)),
            pct_chg: None,
        })
        .collect())
}
