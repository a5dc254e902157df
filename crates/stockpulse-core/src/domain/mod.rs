//! # Domain Models
//!
//! Canonical types shared by every provider and consumer.
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Symbol`] | Normalized ticker with a derived [`Market`] |
//! | [`FetchRange`] | Inclusive calendar-date range |
//! | [`StagedRow`] | Provider output renamed to the standard columns, not yet coerced |
//! | [`StandardRow`] | Coerced daily row with moving averages and volume ratio |
//! | [`NormalizedSeries`] | Sorted, deduplicated, non-empty rows for one symbol |

mod range;
mod series;
mod symbol;

pub use range::{iso_date, latest_weekday, market_today, parse_date, FetchRange};
pub(crate) use range::parse_calendar_date;
pub use series::{clean, enrich, NormalizedSeries, StagedRow, StandardRow};
pub(crate) use series::{coerce_number, round_to};
pub use symbol::{classify, Market, Symbol, DOMESTIC_SUFFIXES};
