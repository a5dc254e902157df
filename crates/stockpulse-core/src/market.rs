//! Market-wide snapshot: headline indices, sample advance/decline counts and breadth.
//!
//! Every download goes through [`SharedBackend`], so these calls queue behind the same
//! process-wide lock as the providers.

use serde::Serialize;
use time::Date;
use tracing::{debug, info, warn};

use crate::backend::{frame_to_staged, DownloadRequest, SharedBackend};
use crate::domain::{clean, iso_date, market_today, round_to, FetchRange, StandardRow};
use crate::pacing::RequestPacer;
use crate::provider::DEFAULT_MARKET_UTC_OFFSET_HOURS;

/// Headline tickers and their display names.
pub const MAIN_INDICES: [(&str, &str); 4] = [
    ("^TWII", "TAIEX"),
    ("0050.TW", "Yuanta Taiwan 50"),
    ("0056.TW", "Yuanta High Dividend"),
    ("2330.TW", "TSMC"),
];

/// Large caps used to approximate market-wide advance/decline counts.
pub const SAMPLE_STOCKS: [&str; 20] = [
    "2330.TW", "2317.TW", "2454.TW", "2412.TW", "2881.TW", "2882.TW", "2303.TW", "1301.TW",
    "2891.TW", "3008.TW", "2308.TW", "1303.TW", "2886.TW", "2884.TW", "3711.TW", "2357.TW",
    "2382.TW", "2892.TW", "5880.TW", "2912.TW",
];

/// Sample counts are multiplied by this to estimate whole-market counts. The sample is
/// roughly 2% of listings; this is a rough heuristic, not a statistical estimator.
pub const SAMPLE_SCALE_FACTOR: u32 = 50;

/// Moves within ±0.1% count as flat.
const FLAT_BAND_PCT: f64 = 0.1;

const BREADTH_WINDOW: usize = 200;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MarketIndex {
    pub code: String,
    pub name: String,
    pub current: f64,
    pub change: f64,
    pub change_pct: f64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub prev_close: f64,
    pub volume: f64,
    /// `(high - low) / prev_close` in percent.
    pub amplitude: f64,
}

impl MarketIndex {
    /// Built from the last two rows; a single row is its own previous close.
    fn from_rows(code: &str, name: &str, rows: &[StandardRow]) -> Option<Self> {
        let latest = rows.last()?;
        let prev = rows.len().checked_sub(2).and_then(|index| rows.get(index)).unwrap_or(latest);

        let change = latest.close - prev.close;
        let pct = |value: f64| {
            if prev.close > 0.0 {
                round_to(value / prev.close * 100.0, 2)
            } else {
                0.0
            }
        };

        Some(Self {
            code: code.to_owned(),
            name: name.to_owned(),
            current: latest.close,
            change: round_to(change, 2),
            change_pct: pct(change),
            open: latest.open,
            high: latest.high,
            low: latest.low,
            prev_close: prev.close,
            volume: latest.volume,
            amplitude: pct(latest.high - latest.low),
        })
    }
}

/// Advance/decline counts over [`SAMPLE_STOCKS`] and their scaled estimates.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SampleStatistics {
    /// Sample tickers with at least two rows.
    pub sampled: usize,
    pub up: u32,
    pub down: u32,
    pub flat: u32,
    pub scale_factor: u32,
    pub estimated_up: u32,
    pub estimated_down: u32,
    pub estimated_flat: u32,
    /// Estimated turnover in units of 100 million.
    pub estimated_turnover: f64,
}

impl SampleStatistics {
    fn record(&mut self, previous_close: f64, close: f64) {
        let change_pct = if previous_close > 0.0 {
            (close - previous_close) / previous_close * 100.0
        } else {
            0.0
        };

        self.sampled += 1;
        if change_pct > FLAT_BAND_PCT {
            self.up += 1;
        } else if change_pct < -FLAT_BAND_PCT {
            self.down += 1;
        } else {
            self.flat += 1;
        }
    }

    fn finish(mut self, total_volume: f64) -> Self {
        self.scale_factor = SAMPLE_SCALE_FACTOR;
        self.estimated_up = self.up * SAMPLE_SCALE_FACTOR;
        self.estimated_down = self.down * SAMPLE_SCALE_FACTOR;
        self.estimated_flat = self.flat * SAMPLE_SCALE_FACTOR;
        self.estimated_turnover =
            round_to(total_volume * 500.0 / 1e9 * f64::from(SAMPLE_SCALE_FACTOR), 2);
        self
    }
}

/// Share of a universe trading above its 200-day simple moving average.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Breadth {
    pub universe: usize,
    /// Tickers with at least 200 rows.
    pub valid: usize,
    pub above: usize,
    /// Percent, one decimal. `None` when no ticker is valid.
    pub pct_above_200dma: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MarketOverview {
    #[serde(with = "iso_date")]
    pub date: Date,
    pub indices: Vec<MarketIndex>,
    pub statistics: SampleStatistics,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub breadth: Option<Breadth>,
}

#[derive(Debug, Clone)]
pub struct MarketOverviewCollector {
    backend: SharedBackend,
    pacer: RequestPacer,
    today: Option<Date>,
    utc_offset_hours: i8,
}

impl MarketOverviewCollector {
    pub fn new(backend: SharedBackend, pacer: RequestPacer) -> Self {
        Self {
            backend,
            pacer,
            today: None,
            utc_offset_hours: DEFAULT_MARKET_UTC_OFFSET_HOURS,
        }
    }

    pub fn with_today(mut self, today: Date) -> Self {
        self.today = Some(today);
        self
    }

    pub fn with_utc_offset(mut self, utc_offset_hours: i8) -> Self {
        self.utc_offset_hours = utc_offset_hours;
        self
    }

    fn today(&self) -> Date {
        self.today
            .unwrap_or_else(|| market_today(self.utc_offset_hours))
    }

    /// Daily rows for `ticker` over `lookback_days * 2` calendar days. Failures are
    /// logged and yield no rows.
    async fn history(&self, ticker: &str, lookback_days: u32) -> Vec<StandardRow> {
        self.pacer.pace().await;
        let range = FetchRange::lookback(self.today(), lookback_days);
        let request = DownloadRequest::daily(ticker, range, true);

        let frame = match self.backend.download(request).await {
            Ok(frame) => frame,
            Err(error) => {
                warn!(ticker, error = %error, "market history download failed");
                return Vec::new();
            }
        };
        match frame_to_staged(&frame) {
            Ok(staged) => clean(staged),
            Err(error) => {
                warn!(ticker, error = %error, "market history malformed");
                Vec::new()
            }
        }
    }

    pub async fn indices(&self) -> Vec<MarketIndex> {
        let mut indices = Vec::with_capacity(MAIN_INDICES.len());
        for (code, name) in MAIN_INDICES {
            let rows = self.history(code, 5).await;
            match MarketIndex::from_rows(code, name, &rows) {
                Some(index) => {
                    debug!(code, current = index.current, change_pct = index.change_pct, "index loaded");
                    indices.push(index);
                }
                None => warn!(code, "no rows for index"),
            }
        }
        info!(loaded = indices.len(), "market indices collected");
        indices
    }

    pub async fn sample_statistics(&self) -> SampleStatistics {
        let mut statistics = SampleStatistics::default();
        let mut total_volume = 0.0;

        for ticker in SAMPLE_STOCKS {
            let rows = self.history(ticker, 5).await;
            if let [.., previous, latest] = rows.as_slice() {
                statistics.record(previous.close, latest.close);
                total_volume += latest.volume;
            }
        }

        let statistics = statistics.finish(total_volume);
        info!(
            up = statistics.up,
            down = statistics.down,
            flat = statistics.flat,
            sampled = statistics.sampled,
            "sample statistics collected"
        );
        statistics
    }

    pub async fn breadth(&self, universe: &[String]) -> Breadth {
        let mut closes = Vec::with_capacity(universe.len());
        for ticker in universe {
            let rows = self.history(ticker, 183).await;
            closes.push(rows.iter().map(|row| row.close).collect::<Vec<_>>());
        }
        breadth_from_closes(&closes)
    }

    pub async fn overview(&self, breadth_universe: Option<&[String]>) -> MarketOverview {
        let indices = self.indices().await;
        let statistics = self.sample_statistics().await;
        let breadth = match breadth_universe {
            Some(universe) if !universe.is_empty() => Some(self.breadth(universe).await),
            _ => None,
        };

        MarketOverview {
            date: self.today(),
            indices,
            statistics,
            breadth,
        }
    }
}

fn breadth_from_closes(closes: &[Vec<f64>]) -> Breadth {
    let mut breadth = Breadth {
        universe: closes.len(),
        ..Breadth::default()
    };

    for series in closes {
        if series.len() < BREADTH_WINDOW {
            continue;
        }
        let window = &series[series.len() - BREADTH_WINDOW..];
        let average = window.iter().sum::<f64>() / BREADTH_WINDOW as f64;
        breadth.valid += 1;
        if series.last().is_some_and(|close| *close > average) {
            breadth.above += 1;
        }
    }

    if breadth.valid > 0 {
        breadth.pct_above_200dma =
            Some(round_to(breadth.above as f64 / breadth.valid as f64 * 100.0, 1));
    }
    breadth
}
