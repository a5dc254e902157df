use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;
use time::{Date, OffsetDateTime};
use tracing::debug;

use super::{
    DownloadRequest, MarketBackend, RawFrame, CLOSE_COLUMN, DATE_COLUMN, HIGH_COLUMN, LOW_COLUMN,
    OPEN_COLUMN, VOLUME_COLUMN,
};
use crate::http_client::{HttpClient, HttpRequest, HttpResponse};
use crate::{BackendError, BoxFuture};

const CHART_ENDPOINT: &str = "https://query1.finance.yahoo.com/v8/finance/chart";
const REFERER: &str = "https://finance.yahoo.com/";

/// Yahoo Finance v8 chart API used as the shared daily-price backend.
pub struct YahooChartBackend {
    http_client: Arc<dyn HttpClient>,
    timeout_ms: u64,
}

impl YahooChartBackend {
    pub fn new(http_client: Arc<dyn HttpClient>, timeout_ms: u64) -> Self {
        Self {
            http_client,
            timeout_ms,
        }
    }

    async fn get_chart(&self, endpoint: String) -> Result<Option<YahooChartResult>, BackendError> {
        let request = HttpRequest::get(endpoint)
            .with_header("referer", REFERER)
            .with_timeout_ms(self.timeout_ms);

        let response = self.http_client.execute(request).await?;
        let Some(body) = accept_response(response)? else {
            return Ok(None);
        };

        let chart: YahooChartResponse = serde_json::from_str(&body)
            .map_err(|e| BackendError::Malformed(format!("failed to parse yahoo chart: {e}")))?;

        if let Some(error) = chart.chart.error.filter(|error| !error.is_null()) {
            let code = error
                .get("code")
                .and_then(Value::as_str)
                .unwrap_or_default();
            if code.eq_ignore_ascii_case("not found") {
                return Ok(None);
            }
            return Err(BackendError::Rejected(format!("yahoo chart API error: {error}")));
        }

        Ok(chart.chart.result.and_then(|results| results.into_iter().next()))
    }
}

impl MarketBackend for YahooChartBackend {
    fn download<'a>(&'a self, request: DownloadRequest) -> BoxFuture<'a, Result<RawFrame, BackendError>> {
        Box::pin(async move {
            let endpoint = format!(
                "{CHART_ENDPOINT}/{}?period1={}&period2={}&interval=1d&events=history&includeAdjustedClose=true",
                urlencoding::encode(&request.ticker),
                unix_midnight(request.start),
                unix_midnight(request.end_exclusive),
            );

            let frame = match self.get_chart(endpoint).await? {
                Some(result) => chart_to_frame(result, request.auto_adjust)?,
                None => RawFrame::new(FRAME_COLUMNS),
            };
            debug!(ticker = %request.ticker, rows = frame.len(), "yahoo chart downloaded");
            Ok(frame)
        })
    }

    fn lookup_name<'a>(&'a self, ticker: &'a str) -> BoxFuture<'a, Result<Option<String>, BackendError>> {
        Box::pin(async move {
            let endpoint = format!(
                "{CHART_ENDPOINT}/{}?range=5d&interval=1d",
                urlencoding::encode(ticker)
            );

            Ok(self.get_chart(endpoint).await?.and_then(|result| {
                let meta = result.meta?;
                meta.long_name
                    .or(meta.short_name)
                    .map(|name| name.trim().to_owned())
                    .filter(|name| !name.is_empty())
            }))
        })
    }
}

const FRAME_COLUMNS: [&str; 6] = [
    DATE_COLUMN,
    OPEN_COLUMN,
    HIGH_COLUMN,
    LOW_COLUMN,
    CLOSE_COLUMN,
    VOLUME_COLUMN,
];

/// Success body, `None` for 404, error otherwise.
fn accept_response(response: HttpResponse) -> Result<Option<String>, BackendError> {
    if response.is_success() {
        return Ok(Some(response.body));
    }
    if response.status == 404 {
        return Ok(None);
    }
    if response.is_transient_status() {
        return Err(BackendError::Transient(format!(
            "yahoo returned status {}",
            response.status
        )));
    }
    Err(BackendError::Rejected(format!(
        "yahoo returned status {}",
        response.status
    )))
}

fn unix_midnight(date: Date) -> i64 {
    date.midnight().assume_utc().unix_timestamp()
}

fn chart_to_frame(result: YahooChartResult, auto_adjust: bool) -> Result<RawFrame, BackendError> {
    let mut frame = RawFrame::new(FRAME_COLUMNS);
    let Some(timestamps) = result.timestamp else {
        return Ok(frame);
    };
    let Some(quote) = result.indicators.quote.into_iter().next() else {
        return Ok(frame);
    };
    let adjusted = result
        .indicators
        .adjclose
        .and_then(|series| series.into_iter().next())
        .map(|series| series.adjclose);
    let gmt_offset = result.meta.as_ref().and_then(|meta| meta.gmtoffset).unwrap_or(0);

    let value_at = |series: &[Option<f64>], index: usize| series.get(index).copied().flatten();

    for (index, timestamp) in timestamps.into_iter().enumerate() {
        let date = OffsetDateTime::from_unix_timestamp(timestamp + gmt_offset)
            .map_err(|e| BackendError::Malformed(format!("invalid timestamp {timestamp}: {e}")))?
            .date();

        let close = value_at(&quote.close, index);
        let factor = match (auto_adjust, close, adjusted.as_deref()) {
            (true, Some(close), Some(adjusted)) if close != 0.0 => {
                value_at(adjusted, index).map(|adj| adj / close)
            }
            _ => None,
        }
        .unwrap_or(1.0);

        let price = |series: &[Option<f64>]| {
            value_at(series, index).map_or(Value::Null, |value| Value::from(value * factor))
        };
        let volume = value_at(&quote.volume, index).map_or(Value::Null, Value::from);

        frame.push_row(vec![
            Value::from(date.to_string()),
            price(&quote.open),
            price(&quote.high),
            price(&quote.low),
            price(&quote.close),
            volume,
        ]);
    }

    Ok(frame)
}

#[derive(Debug, Clone, Deserialize)]
struct YahooChartResponse {
    chart: YahooChartData,
}

#[derive(Debug, Clone, Deserialize)]
struct YahooChartData {
    #[serde(default)]
    result: Option<Vec<YahooChartResult>>,
    #[serde(default)]
    error: Option<Value>,
}

#[derive(Debug, Clone, Deserialize)]
struct YahooChartResult {
    #[serde(default)]
    meta: Option<YahooChartMeta>,
    #[serde(default)]
    timestamp: Option<Vec<i64>>,
    indicators: YahooChartIndicators,
}

#[derive(Debug, Clone, Deserialize)]
struct YahooChartMeta {
    #[serde(default)]
    gmtoffset: Option<i64>,
    #[serde(rename = "longName", default)]
    long_name: Option<String>,
    #[serde(rename = "shortName", default)]
    short_name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct YahooChartIndicators {
    #[serde(default)]
    quote: Vec<YahooChartQuote>,
    #[serde(default)]
    adjclose: Option<Vec<YahooAdjClose>>,
}

#[derive(Debug, Clone, Deserialize)]
struct YahooChartQuote {
    #[serde(default)]
    open: Vec<Option<f64>>,
    #[serde(default)]
    high: Vec<Option<f64>>,
    #[serde(default)]
    low: Vec<Option<f64>>,
    #[serde(default)]
    close: Vec<Option<f64>>,
    #[serde(default)]
    volume: Vec<Option<f64>>,
}

#[derive(Debug, Clone, Deserialize)]
struct YahooAdjClose {
    #[serde(default)]
    adjclose: Vec<Option<f64>>,
}
