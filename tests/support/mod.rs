//! Scripted fakes shared by the behavior tests.
#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use serde_json::{json, Value};
use stockpulse_core::{
    BackendError, BoxFuture, DataError, DownloadRequest, FetchRange, HttpClient, HttpError,
    HttpRequest, HttpResponse, MarketBackend, Provider, ProviderDescriptor, RawFrame,
    RetryPolicy, StagedRow, Symbol,
};

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Backend frame with the daily columns and one row per date.
pub fn daily_frame(dates: &[&str], close: f64) -> RawFrame {
    let mut frame = RawFrame::new(["Date", "Open", "High", "Low", "Close", "Volume"]);
    for date in dates {
        frame.push_row(vec![
            json!(date),
            json!(close - 1.0),
            json!(close + 1.0),
            json!(close - 2.0),
            json!(close),
            json!(10_000),
        ]);
    }
    frame
}

/// Staged rows with complete OHLCV values.
pub fn staged_rows(dates: &[&str], close: f64) -> Vec<StagedRow> {
    dates
        .iter()
        .map(|date| StagedRow {
            date: json!(date),
            open: json!(close),
            high: json!(close + 1.0),
            low: json!(close - 1.0),
            close: json!(close),
            volume: json!(1_000),
            amount: None,
            pct_chg: None,
        })
        .collect()
}

// =============================================================================
// Market backend
// =============================================================================

#[derive(Debug, Clone)]
pub enum BackendReply {
    Frame(RawFrame),
    Transient,
    Rejected,
}

/// Backend answering per ticker from a queue, falling back to a default reply.
pub struct ScriptedBackend {
    replies: Mutex<HashMap<String, VecDeque<BackendReply>>>,
    default_reply: BackendReply,
    names: HashMap<String, String>,
    requests: Mutex<Vec<DownloadRequest>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    delay: Duration,
}

impl ScriptedBackend {
    pub fn new(default_reply: BackendReply) -> Self {
        Self {
            replies: Mutex::new(HashMap::new()),
            default_reply,
            names: HashMap::new(),
            requests: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            delay: Duration::ZERO,
        }
    }

    /// Every ticker answers with a frame for `dates`.
    pub fn serving(dates: &[&str], close: f64) -> Self {
        Self::new(BackendReply::Frame(daily_frame(dates, close)))
    }

    /// Queues `replies` for `ticker`; once drained the default reply is used.
    pub fn with_replies(self, ticker: &str, replies: Vec<BackendReply>) -> Self {
        lock(&self.replies).insert(ticker.to_owned(), replies.into());
        self
    }

    pub fn with_name(mut self, ticker: &str, name: &str) -> Self {
        self.names.insert(ticker.to_owned(), name.to_owned());
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn requests(&self) -> Vec<DownloadRequest> {
        lock(&self.requests).clone()
    }

    pub fn tickers(&self) -> Vec<String> {
        self.requests().into_iter().map(|request| request.ticker).collect()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn next_reply(&self, ticker: &str) -> BackendReply {
        lock(&self.replies)
            .get_mut(ticker)
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(|| self.default_reply.clone())
    }
}

impl MarketBackend for ScriptedBackend {
    fn download<'a>(&'a self, request: DownloadRequest) -> BoxFuture<'a, Result<RawFrame, BackendError>> {
        Box::pin(async move {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            let reply = self.next_reply(&request.ticker);
            lock(&self.requests).push(request);
            match reply {
                BackendReply::Frame(frame) => Ok(frame),
                BackendReply::Transient => Err(BackendError::Transient(String::from("connection reset"))),
                BackendReply::Rejected => Err(BackendError::Rejected(String::from("status 400"))),
            }
        })
    }

    fn lookup_name<'a>(&'a self, ticker: &'a str) -> BoxFuture<'a, Result<Option<String>, BackendError>> {
        Box::pin(async move { Ok(self.names.get(ticker).cloned()) })
    }
}

// =============================================================================
// Provider
// =============================================================================

#[derive(Debug, Clone)]
pub enum ProviderReply {
    Rows(Vec<StagedRow>),
    Transient,
    Failed,
    Empty,
    Panic,
}

/// Provider whose answers are scripted per symbol.
pub struct ScriptedProvider {
    name: &'static str,
    priority: u32,
    supported: Option<Vec<String>>,
    default_reply: ProviderReply,
    per_symbol: HashMap<String, ProviderReply>,
    retry: RetryPolicy,
    delay: Duration,
    calls: Mutex<Vec<String>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ScriptedProvider {
    pub fn new(name: &'static str, priority: u32, default_reply: ProviderReply) -> Self {
        Self {
            name,
            priority,
            supported: None,
            default_reply,
            per_symbol: HashMap::new(),
            retry: RetryPolicy::immediate(1),
            delay: Duration::ZERO,
            calls: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn always_ok(name: &'static str, priority: u32) -> Self {
        Self::new(
            name,
            priority,
            ProviderReply::Rows(staged_rows(&["2024-01-08", "2024-01-09"], 100.0)),
        )
    }

    pub fn always_failing(name: &'static str, priority: u32) -> Self {
        Self::new(name, priority, ProviderReply::Failed)
    }

    pub fn with_symbol(mut self, symbol: &str, reply: ProviderReply) -> Self {
        self.per_symbol.insert(symbol.to_owned(), reply);
        self
    }

    /// Restricts `supports` to the listed symbols.
    pub fn supporting(mut self, symbols: &[&str]) -> Self {
        self.supported = Some(symbols.iter().map(|symbol| (*symbol).to_owned()).collect());
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Number of `fetch_raw` calls, retries included.
    pub fn calls(&self) -> usize {
        lock(&self.calls).len()
    }

    pub fn calls_for(&self, symbol: &str) -> usize {
        lock(&self.calls).iter().filter(|called| called.as_str() == symbol).count()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

impl ProviderDescriptor for ScriptedProvider {
    fn name(&self) -> &'static str {
        self.name
    }

    fn priority(&self) -> u32 {
        self.priority
    }

    fn canonicalize(&self, symbol: &Symbol) -> Symbol {
        symbol.clone()
    }

    fn supports(&self, symbol: &Symbol) -> bool {
        self.supported
            .as_ref()
            .map_or(true, |supported| supported.iter().any(|item| item == symbol.as_str()))
    }
}

impl Provider for ScriptedProvider {
    type Raw = Vec<StagedRow>;

    fn fetch_raw<'a>(
        &'a self,
        symbol: &'a Symbol,
        _range: FetchRange,
    ) -> BoxFuture<'a, Result<Self::Raw, DataError>> {
        Box::pin(async move {
            lock(&self.calls).push(symbol.to_string());
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            let reply = self
                .per_symbol
                .get(symbol.as_str())
                .unwrap_or(&self.default_reply)
                .clone();
            let provider = self.name.to_owned();
            let symbol = symbol.to_string();
            match reply {
                ProviderReply::Rows(rows) => Ok(rows),
                ProviderReply::Empty => Err(DataError::NoData { provider, symbol }),
                ProviderReply::Transient => Err(DataError::TransientTransport {
                    provider,
                    symbol,
                    message: String::from("timed out"),
                }),
                ProviderReply::Failed => Err(DataError::FetchFailed {
                    provider,
                    symbol,
                    cause: String::from("upstream rejected the request"),
                }),
                ProviderReply::Panic => panic!("scripted provider panicked for {symbol}"),
            }
        })
    }

    fn normalize(&self, raw: Self::Raw, _symbol: &Symbol) -> Result<Vec<StagedRow>, DataError> {
        Ok(raw)
    }

    fn retry_policy(&self) -> RetryPolicy {
        self.retry.clone()
    }
}

// =============================================================================
// HTTP
// =============================================================================

/// HTTP client answering by URL substring, recording every request.
pub struct ScriptedHttpClient {
    routes: Vec<(String, Result<HttpResponse, HttpError>)>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl ScriptedHttpClient {
    pub fn new() -> Self {
        Self {
            routes: Vec::new(),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn route(mut self, url_fragment: &str, response: HttpResponse) -> Self {
        self.routes.push((url_fragment.to_owned(), Ok(response)));
        self
    }

    pub fn route_error(mut self, url_fragment: &str, error: HttpError) -> Self {
        self.routes.push((url_fragment.to_owned(), Err(error)));
        self
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        lock(&self.requests).clone()
    }

    pub fn request_count(&self) -> usize {
        lock(&self.requests).len()
    }
}

impl HttpClient for ScriptedHttpClient {
    fn execute<'a>(&'a self, request: HttpRequest) -> BoxFuture<'a, Result<HttpResponse, HttpError>> {
        Box::pin(async move {
            let reply = self
                .routes
                .iter()
                .find(|(fragment, _)| request.url.contains(fragment.as_str()))
                .map(|(_, reply)| reply.clone())
                .unwrap_or_else(|| Ok(HttpResponse::with_status(404, "")));
            lock(&self.requests).push(request);
            reply
        })
    }
}

/// TWSE T86 payload containing one row per `(code, foreign_shares)`.
pub fn twse_report(rows: &[(&str, &str, i64)]) -> String {
    let data: Vec<Value> = rows
        .iter()
        .map(|(code, name, foreign)| {
            let mut row = vec![json!(*code), json!(*name)];
            row.extend((2..19).map(|_| json!("0")));
            row[4] = json!(foreign.to_string());
            row[18] = json!(foreign.to_string());
            Value::Array(row)
        })
        .collect();
    json!({ "stat": "OK", "data": data }).to_string()
}

/// TPEx payload containing one row per `(code, foreign_shares)`.
pub fn tpex_report(rows: &[(&str, &str, i64)]) -> String {
    let data: Vec<Value> = rows
        .iter()
        .map(|(code, name, foreign)| {
            let mut row = vec![json!(*code), json!(*name)];
            row.extend((2..10).map(|_| json!("0")));
            row[4] = json!(foreign.to_string());
            row[9] = json!(foreign.to_string());
            Value::Array(row)
        })
        .collect();
    json!({ "aaData": data }).to_string()
}
