//! Institutional investor net flow for domestic listings.
//!
//! Records come from the primary exchange's daily T86 report and, when the code is not
//! listed there, the secondary venue's daily report. Nothing here participates in OHLCV
//! failover: every failure is logged and reported as "not found".

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::Date;
use tracing::{debug, info, warn};

use crate::cache::FlowCache;
use crate::domain::{iso_date, latest_weekday, market_today, Market, Symbol};
use crate::http_client::{HttpClient, HttpRequest};
use crate::pacing::RequestPacer;
use crate::policy::ProviderPolicy;
use crate::provider::DEFAULT_MARKET_UTC_OFFSET_HOURS;
use crate::retry::RetryPolicy;
use crate::{BackendError, DataError};

const TWSE_T86_URL: &str = "https://www.twse.com.tw/rwd/zh/fund/T86";
const TPEX_DAILY_URL: &str =
    "https://www.tpex.org.tw/web/stock/3insti/daily_trade/3itrade_hedge_result.php";

/// Net buy/sell of the three institutional investor classes, in lots of 1000 shares.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstitutionalFlow {
    #[serde(with = "iso_date")]
    pub date: Date,
    pub stock_code: String,
    pub stock_name: String,
    pub foreign_net: i64,
    pub trust_net: i64,
    pub dealer_net: i64,
    pub total_net: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Venue {
    Twse,
    Tpex,
}

impl Venue {
    const fn name(self) -> &'static str {
        match self {
            Self::Twse => "TWSE",
            Self::Tpex => "TPEx",
        }
    }

    fn url(self, date: Date) -> String {
        match self {
            Self::Twse => format!(
                "{TWSE_T86_URL}?date={:04}{:02}{:02}&selectType=ALLBUT0999&response=json",
                date.year(),
                u8::from(date.month()),
                date.day()
            ),
            Self::Tpex => format!(
                "{TPEX_DAILY_URL}?l=zh-tw&d={}/{:02}/{:02}&se=EW&t=D&o=json",
                date.year() - 1911,
                u8::from(date.month()),
                date.day()
            ),
        }
    }

    /// Rows of the report, or `None` when the venue has no report for the day.
    fn rows(self, payload: &Value) -> Option<&Vec<Value>> {
        match self {
            Self::Twse => {
                if payload.get("stat").and_then(Value::as_str) != Some("OK") {
                    return None;
                }
                payload.get("data")?.as_array()
            }
            Self::Tpex => payload.get("aaData")?.as_array(),
        }
    }

    fn parse_row(self, row: &[Value], date: Date) -> InstitutionalFlow {
        let shares = |index: usize| row.get(index).map_or(0, parse_shares);
        let (foreign, trust, dealer, total_index) = match self {
            Self::Twse => (shares(4) + shares(7), shares(10), shares(11), 18),
            Self::Tpex => (shares(4), shares(7), shares(8), 9),
        };
        let total = if row.len() > total_index {
            shares(total_index)
        } else {
            foreign + trust + dealer
        };

        InstitutionalFlow {
            date,
            stock_code: text_cell(row, 0),
            stock_name: text_cell(row, 1),
            foreign_net: to_lots(foreign),
            trust_net: to_lots(trust),
            dealer_net: to_lots(dealer),
            total_net: to_lots(total),
        }
    }
}

fn text_cell(row: &[Value], index: usize) -> String {
    match row.get(index) {
        Some(Value::String(text)) => text.trim().to_owned(),
        Some(other) if !other.is_null() => other.to_string(),
        _ => String::new(),
    }
}

/// Share counts arrive as `"1,234,000"`, `" -5,000"` or plain numbers. Anything else is 0.
fn parse_shares(value: &Value) -> i64 {
    match value {
        Value::Number(number) => number
            .as_i64()
            .or_else(|| number.as_f64().map(|float| float.trunc() as i64))
            .unwrap_or(0),
        Value::String(text) => text
            .chars()
            .filter(|ch| *ch != ',' && !ch.is_whitespace())
            .collect::<String>()
            .parse()
            .unwrap_or(0),
        _ => 0,
    }
}

const fn to_lots(shares: i64) -> i64 {
    shares.div_euclid(1000)
}

/// Cached, paced client for the two exchange endpoints.
#[derive(Clone)]
pub struct InstitutionalFlowClient {
    http_client: Arc<dyn HttpClient>,
    pacer: RequestPacer,
    retry: RetryPolicy,
    timeout_ms: u64,
    utc_offset_hours: i8,
    cache: FlowCache,
}

impl std::fmt::Debug for InstitutionalFlowClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstitutionalFlowClient")
            .field("timeout_ms", &self.timeout_ms)
            .field("utc_offset_hours", &self.utc_offset_hours)
            .finish_non_exhaustive()
    }
}

impl InstitutionalFlowClient {
    pub fn new(http_client: Arc<dyn HttpClient>, policy: &ProviderPolicy) -> Self {
        Self {
            http_client,
            pacer: RequestPacer::from_policy(&policy.pacing),
            retry: policy.retry.clone(),
            timeout_ms: policy.auxiliary_timeout_ms(),
            utc_offset_hours: DEFAULT_MARKET_UTC_OFFSET_HOURS,
            cache: FlowCache::new(),
        }
    }

    pub fn with_utc_offset(mut self, utc_offset_hours: i8) -> Self {
        self.utc_offset_hours = utc_offset_hours;
        self
    }

    pub fn cache(&self) -> &FlowCache {
        &self.cache
    }

    /// Flow record for `symbol` on `date`, defaulting to the latest weekday.
    ///
    /// Non-domestic symbols return `None` without any I/O.
    pub async fn get(&self, symbol: &Symbol, date: Option<Date>) -> Option<InstitutionalFlow> {
        if symbol.market() != Market::Domestic {
            debug!(symbol = %symbol, "institutional flow only covers domestic listings");
            return None;
        }

        let code = symbol.code();
        let date = date.unwrap_or_else(|| latest_weekday(market_today(self.utc_offset_hours)));

        if let Some(cached) = self.cache.get(date, code).await {
            debug!(symbol = code, %date, "institutional flow cache hit");
            return Some(cached);
        }

        for venue in [Venue::Twse, Venue::Tpex] {
            match self.fetch_venue(venue, code, date).await {
                Ok(Some(flow)) => {
                    info!(
                        symbol = code,
                        venue = venue.name(),
                        foreign_net = flow.foreign_net,
                        trust_net = flow.trust_net,
                        dealer_net = flow.dealer_net,
                        "institutional flow loaded"
                    );
                    self.cache.put(date, code, flow.clone()).await;
                    return Some(flow);
                }
                Ok(None) => debug!(symbol = code, venue = venue.name(), %date, "symbol not in report"),
                Err(error) => warn!(symbol = code, venue = venue.name(), error = %error, "institutional flow request failed"),
            }
        }

        None
    }

    async fn fetch_venue(
        &self,
        venue: Venue,
        code: &str,
        date: Date,
    ) -> Result<Option<InstitutionalFlow>, DataError> {
        let body = self
            .retry
            .run(venue.name(), code, |_| self.request_report(venue, code, date))
            .await?;

        let payload: Value = match serde_json::from_str(&body) {
            Ok(payload) => payload,
            Err(error) => {
                return Err(BackendError::Malformed(format!("invalid JSON report: {error}"))
                    .into_data_error(venue.name(), code))
            }
        };

        let Some(rows) = venue.rows(&payload) else {
            return Ok(None);
        };

        Ok(rows
            .iter()
            .filter_map(Value::as_array)
            .find(|row| row.first().and_then(Value::as_str).map(str::trim) == Some(code))
            .map(|row| venue.parse_row(row, date)))
    }

    async fn request_report(&self, venue: Venue, code: &str, date: Date) -> Result<String, DataError> {
        self.pacer.pace().await;

        let request = HttpRequest::get(venue.url(date))
            .with_header("accept", "application/json")
            .with_timeout_ms(self.timeout_ms);

        let response = self
            .http_client
            .execute(request)
            .await
            .map_err(|error| BackendError::from(error).into_data_error(venue.name(), code))?;

        if response.is_success() {
            return Ok(response.body);
        }

        let message = format!("{} returned status {}", venue.name(), response.status);
        let error = if response.is_transient_status() {
            BackendError::Transient(message)
        } else {
            BackendError::Rejected(message)
        };
        Err(error.into_data_error(venue.name(), code))
    }
}
