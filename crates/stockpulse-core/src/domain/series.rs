use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::Date;

use super::range::{iso_date, parse_calendar_date};
use super::symbol::Symbol;
use crate::ValidationError;

/// Standard-named row produced by a provider's `normalize`, before coercion.
///
/// Cells keep their provider-native JSON form; `clean` parses and validates them.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct StagedRow {
    pub date: Value,
    pub open: Value,
    pub high: Value,
    pub low: Value,
    pub close: Value,
    pub volume: Value,
    /// Traded value, when the provider reports it.
    pub amount: Option<Value>,
    /// Percentage change, when the provider reports it.
    pub pct_chg: Option<Value>,
}

/// Canonical daily row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardRow {
    #[serde(with = "iso_date")]
    pub date: Date,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    pub amount: f64,
    pub pct_chg: f64,
    pub ma5: f64,
    pub ma10: f64,
    pub ma20: f64,
    pub volume_ratio: f64,
}

impl StandardRow {
    /// Row with derived fields at their defaults.
    pub fn new(date: Date, open: f64, high: f64, low: f64, close: f64, volume: f64) -> Self {
        Self {
            date,
            open,
            high,
            low,
            close,
            volume,
            amount: round_to(volume * close, 0),
            pct_chg: 0.0,
            ma5: close,
            ma10: close,
            ma20: close,
            volume_ratio: 1.0,
        }
    }
}

/// Daily rows for one symbol, ascending by date with no duplicate dates.
///
/// Never empty.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NormalizedSeries {
    symbol: Symbol,
    rows: Vec<StandardRow>,
}

impl NormalizedSeries {
    /// Sorts `rows` by date and keeps the last row for each duplicated date.
    pub fn from_rows(symbol: Symbol, rows: Vec<StandardRow>) -> Result<Self, ValidationError> {
        let rows = sort_dedup(rows, |row| row.date);
        if rows.is_empty() {
            return Err(ValidationError::EmptySeries {
                symbol: symbol.to_string(),
            });
        }
        Ok(Self { symbol, rows })
    }

    pub fn symbol(&self) -> &Symbol {
        &self.symbol
    }

    pub fn rows(&self) -> &[StandardRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn first(&self) -> Option<&StandardRow> {
        self.rows.first()
    }

    pub fn latest(&self) -> Option<&StandardRow> {
        self.rows.last()
    }

    pub fn into_rows(self) -> Vec<StandardRow> {
        self.rows
    }
}

struct CoercedRow {
    date: Date,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    volume: f64,
    amount: Option<f64>,
    pct_chg: Option<f64>,
}

/// Parses dates, coerces numerics, drops incomplete rows, sorts ascending and
/// deduplicates by date (last occurrence wins).
///
/// Missing `amount` becomes `round(volume * close)`; missing `pct_chg` is the
/// close-to-close change in percent, `0` on the first row.
pub fn clean(staged: Vec<StagedRow>) -> Vec<StandardRow> {
    let coerced = staged.into_iter().filter_map(coerce_row).collect::<Vec<_>>();
    let coerced = sort_dedup(coerced, |row| row.date);

    let mut previous_close: Option<f64> = None;
    coerced
        .into_iter()
        .map(|row| {
            let pct_chg = row.pct_chg.unwrap_or_else(|| match previous_close {
                Some(previous) if previous != 0.0 => {
                    round_to((row.close - previous) / previous * 100.0, 2)
                }
                _ => 0.0,
            });
            previous_close = Some(row.close);

            StandardRow {
                amount: row.amount.unwrap_or_else(|| round_to(row.volume * row.close, 0)),
                pct_chg,
                ..StandardRow::new(row.date, row.open, row.high, row.low, row.close, row.volume)
            }
        })
        .collect()
}

/// Fills the moving averages and the volume ratio.
///
/// Moving averages accept partial windows at the start of the series. The volume ratio
/// divides today's volume by the mean of up to five preceding volumes; it is `1.0` when
/// no preceding volume exists or the mean is not positive.
pub fn enrich(mut rows: Vec<StandardRow>) -> Vec<StandardRow> {
    let closes = rows.iter().map(|row| row.close).collect::<Vec<_>>();
    let volumes = rows.iter().map(|row| row.volume).collect::<Vec<_>>();

    for (index, row) in rows.iter_mut().enumerate() {
        row.ma5 = round_to(trailing_mean(&closes, index, 5), 2);
        row.ma10 = round_to(trailing_mean(&closes, index, 10), 2);
        row.ma20 = round_to(trailing_mean(&closes, index, 20), 2);
        row.volume_ratio = volume_ratio(&volumes, index);
    }

    rows
}

fn trailing_mean(values: &[f64], index: usize, window: usize) -> f64 {
    let start = (index + 1).saturating_sub(window);
    let slice = &values[start..=index];
    slice.iter().sum::<f64>() / slice.len() as f64
}

fn volume_ratio(volumes: &[f64], index: usize) -> f64 {
    if index == 0 {
        return 1.0;
    }

    let preceding = &volumes[index.saturating_sub(5)..index];
    let average = preceding.iter().sum::<f64>() / preceding.len() as f64;
    if average > 0.0 && average.is_finite() {
        let ratio = round_to(volumes[index] / average, 2);
        if ratio.is_finite() {
            return ratio;
        }
    }
    1.0
}

fn coerce_row(row: StagedRow) -> Option<CoercedRow> {
    Some(CoercedRow {
        date: coerce_date(&row.date)?,
        open: coerce_number(&row.open)?,
        high: coerce_number(&row.high)?,
        low: coerce_number(&row.low)?,
        close: coerce_number(&row.close)?,
        volume: coerce_number(&row.volume)?,
        amount: row.amount.as_ref().and_then(coerce_number),
        pct_chg: row.pct_chg.as_ref().and_then(coerce_number),
    })
}

fn coerce_date(value: &Value) -> Option<Date> {
    match value {
        Value::String(raw) => parse_calendar_date(raw),
        _ => None,
    }
}

/// Numeric cell to a finite float. Strings may carry thousands separators.
pub(crate) fn coerce_number(value: &Value) -> Option<f64> {
    let number = match value {
        Value::Number(number) => number.as_f64()?,
        Value::String(raw) => {
            let cleaned = raw.trim().replace([',', ' '], "");
            cleaned.parse::<f64>().ok()?
        }
        _ => return None,
    };
    number.is_finite().then_some(number)
}

/// Stable sort by key, then keep the last entry of each run of equal keys.
fn sort_dedup<T, K, F>(mut items: Vec<T>, key: F) -> Vec<T>
where
    K: Ord,
    F: Fn(&T) -> K,
{
    items.sort_by(|left, right| key(left).cmp(&key(right)));

    let mut output: Vec<T> = Vec::with_capacity(items.len());
    for item in items {
        match output.last_mut() {
            Some(last) if key(last) == key(&item) => *last = item,
            _ => output.push(item),
        }
    }
    output
}

pub(crate) fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10_f64.powi(decimals);
    (value * factor).round() / factor
}
