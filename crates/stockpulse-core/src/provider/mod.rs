//! Provider capability contract and the shared `get_daily_data` pipeline.
//!
//! A provider implements four primitives (`canonicalize`, `supports`, `fetch_raw`,
//! `normalize`). Everything else a daily fetch needs (range defaults, retry, clean,
//! enrich) lives once in [`get_daily_data`] and is reached through the object-safe
//! [`DailySource`] trait that every [`Provider`] gets for free.

mod generic;
mod taiwan;
mod us;

use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use time::Date;
use tracing::{debug, info};

use crate::backend::{frame_to_staged, DownloadRequest, RawFrame, SharedBackend};
use crate::domain::{
    clean, enrich, market_today, FetchRange, Market, NormalizedSeries, StagedRow, Symbol,
};
use crate::pacing::RequestPacer;
use crate::retry::RetryPolicy;
use crate::{BoxFuture, DataError, ValidationError};

pub use generic::GenericYahooProvider;
pub use taiwan::TaiwanStockProvider;
pub use us::UsStockProvider;

/// Days of history requested when the caller gives no explicit range.
pub const DEFAULT_LOOKBACK_DAYS: u32 = 30;
/// Offset used to compute "today" when no reference date is supplied.
pub const DEFAULT_MARKET_UTC_OFFSET_HOURS: i8 = 8;

/// Built-in provider identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderId {
    Taiwan,
    Us,
    Generic,
}

impl ProviderId {
    pub const ALL: [Self; 3] = [Self::Taiwan, Self::Us, Self::Generic];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Taiwan => "taiwan",
            Self::Us => "us",
            Self::Generic => "generic",
        }
    }
}

impl Display for ProviderId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderId {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "taiwan" | "tw" => Ok(Self::Taiwan),
            "us" => Ok(Self::Us),
            "generic" | "yahoo" => Ok(Self::Generic),
            other => Err(ValidationError::InvalidProvider {
                value: other.to_owned(),
            }),
        }
    }
}

/// Parameters of one daily fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DailyQuery {
    /// Explicit range. When absent the range ends at `as_of` and spans
    /// `lookback_days * 2` calendar days.
    pub range: Option<FetchRange>,
    pub lookback_days: u32,
    /// Reference "today". Defaults to the current date in the market time zone.
    pub as_of: Option<Date>,
}

impl Default for DailyQuery {
    fn default() -> Self {
        Self {
            range: None,
            lookback_days: DEFAULT_LOOKBACK_DAYS,
            as_of: None,
        }
    }
}

impl DailyQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_range(mut self, range: FetchRange) -> Self {
        self.range = Some(range);
        self
    }

    pub fn with_lookback_days(mut self, lookback_days: u32) -> Self {
        self.lookback_days = lookback_days;
        self
    }

    pub fn as_of(mut self, today: Date) -> Self {
        self.as_of = Some(today);
        self
    }

    pub fn resolve(&self) -> FetchRange {
        self.range.unwrap_or_else(|| {
            let end = self
                .as_of
                .unwrap_or_else(|| market_today(DEFAULT_MARKET_UTC_OFFSET_HOURS));
            FetchRange::lookback(end, self.lookback_days)
        })
    }
}

/// Identity and symbol rules of a provider. Object safe.
pub trait ProviderDescriptor: Send + Sync {
    /// Static name used in logs and as the winning source name.
    fn name(&self) -> &'static str;

    /// Lower is tried first.
    fn priority(&self) -> u32;

    /// Must be idempotent.
    fn canonicalize(&self, symbol: &Symbol) -> Symbol;

    fn supports(&self, symbol: &Symbol) -> bool;

    /// Human-readable name. Providers without a lookup keep the default.
    fn symbol_name<'a>(&'a self, _symbol: &'a Symbol) -> BoxFuture<'a, Option<String>> {
        Box::pin(async { None })
    }
}

/// One external data source.
pub trait Provider: ProviderDescriptor {
    /// Provider-native result; never leaves the provider.
    type Raw: Send;

    /// Fetches the raw result for an already canonical symbol.
    ///
    /// Transport failures that may succeed on retry are reported as
    /// [`DataError::TransientTransport`]; an empty result as [`DataError::NoData`].
    fn fetch_raw<'a>(
        &'a self,
        symbol: &'a Symbol,
        range: FetchRange,
    ) -> BoxFuture<'a, Result<Self::Raw, DataError>>;

    /// Maps the raw result onto the standard column names.
    fn normalize(&self, raw: Self::Raw, symbol: &Symbol) -> Result<Vec<StagedRow>, DataError>;

    fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::default()
    }
}

/// Object-safe daily fetch used by the registry.
pub trait DailySource: ProviderDescriptor {
    fn get_daily_data<'a>(
        &'a self,
        symbol: &'a Symbol,
        query: &'a DailyQuery,
    ) -> BoxFuture<'a, Result<NormalizedSeries, DataError>>;
}

impl<P> DailySource for P
where
    P: Provider,
{
    fn get_daily_data<'a>(
        &'a self,
        symbol: &'a Symbol,
        query: &'a DailyQuery,
    ) -> BoxFuture<'a, Result<NormalizedSeries, DataError>> {
        Box::pin(get_daily_data(self, symbol, query))
    }
}

/// Fetch, normalize, clean and enrich one symbol through `provider`.
///
/// Never returns an empty series: an empty raw or cleaned result is [`DataError::NoData`].
pub async fn get_daily_data<P>(
    provider: &P,
    symbol: &Symbol,
    query: &DailyQuery,
) -> Result<NormalizedSeries, DataError>
where
    P: Provider + ?Sized,
{
    let name = provider.name();
    if !provider.supports(symbol) {
        return Err(DataError::UnsupportedSymbol {
            provider: name.to_owned(),
            symbol: symbol.to_string(),
        });
    }

    let canonical = provider.canonicalize(symbol);
    let range = query.resolve();
    debug!(provider = name, symbol = %canonical, %range, "fetching daily data");

    let raw = provider
        .retry_policy()
        .run(name, canonical.as_str(), |_| {
            provider.fetch_raw(&canonical, range)
        })
        .await?;

    let staged = provider.normalize(raw, &canonical)?;
    let rows = clean(staged);
    if rows.is_empty() {
        return Err(DataError::NoData {
            provider: name.to_owned(),
            symbol: canonical.to_string(),
        });
    }

    let series = NormalizedSeries::from_rows(canonical, enrich(rows)).map_err(|error| {
        DataError::FetchFailed {
            provider: name.to_owned(),
            symbol: symbol.to_string(),
            cause: error.to_string(),
        }
    })?;

    info!(provider = name, symbol = %series.symbol(), rows = series.len(), "daily data ready");
    Ok(series)
}

/// Paced, serialized backend download shared by the Yahoo-backed providers.
pub(crate) async fn download_frame(
    backend: &SharedBackend,
    pacer: &RequestPacer,
    provider: &'static str,
    symbol: &Symbol,
    request: DownloadRequest,
) -> Result<RawFrame, DataError> {
    pacer.pace().await;
    let frame = backend
        .download(request)
        .await
        .map_err(|error| error.into_data_error(provider, symbol.as_str()))?;

    if frame.is_empty() {
        return Err(DataError::NoData {
            provider: provider.to_owned(),
            symbol: symbol.to_string(),
        });
    }
    Ok(frame)
}

pub(crate) fn stage_frame(
    frame: &RawFrame,
    provider: &'static str,
    symbol: &Symbol,
) -> Result<Vec<StagedRow>, DataError> {
    frame_to_staged(frame).map_err(|error| error.into_data_error(provider, symbol.as_str()))
}

/// Ticker as the backend spells it. Foreign share classes use `-` (`BRK.B` is
/// `BRK-B`); venue suffixes such as `.TW` or `.HK` are kept.
pub(crate) fn backend_ticker(symbol: &Symbol) -> String {
    match symbol.market() {
        Market::Foreign => symbol.as_str().replace('.', "-"),
        _ => symbol.as_str().to_owned(),
    }
}

/// Backend name lookup whose failures are logged and reported as "no name".
pub(crate) async fn lookup_name(
    backend: &SharedBackend,
    pacer: &RequestPacer,
    provider: &'static str,
    ticker: &str,
) -> Option<String> {
    pacer.pace().await;
    match backend.lookup_name(ticker).await {
        Ok(name) => name,
        Err(error) => {
            debug!(provider, ticker, error = %error, "name lookup failed");
            None
        }
    }
}
