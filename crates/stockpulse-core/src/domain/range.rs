use std::fmt::{Display, Formatter};

use serde::Serialize;
use time::format_description::BorrowedFormatItem;
use time::macros::format_description;
use time::{Date, Duration, OffsetDateTime, UtcOffset, Weekday};

use crate::ValidationError;

/// Inclusive calendar-date range for a daily fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FetchRange {
    #[serde(with = "iso_date")]
    start: Date,
    #[serde(with = "iso_date")]
    end: Date,
}

impl FetchRange {
    pub fn new(start: Date, end: Date) -> Result<Self, ValidationError> {
        if start > end {
            return Err(ValidationError::InvertedRange { start, end });
        }
        Ok(Self { start, end })
    }

    /// Range ending at `end` that spans twice `lookback_days` calendar days, so that
    /// weekends and holidays still leave roughly `lookback_days` trading sessions.
    pub fn lookback(end: Date, lookback_days: u32) -> Self {
        let span = Duration::days(i64::from(lookback_days) * 2);
        let start = end.checked_sub(span).unwrap_or(Date::MIN);
        Self { start, end }
    }

    pub const fn start(&self) -> Date {
        self.start
    }

    pub const fn end(&self) -> Date {
        self.end
    }

    /// Upper bound for backends that treat the end date as exclusive.
    pub fn exclusive_end(&self) -> Date {
        self.end.next_day().unwrap_or(self.end)
    }
}

impl Display for FetchRange {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}..={}", self.start, self.end)
    }
}

/// Parses `YYYY-MM-DD`, `YYYY/MM/DD` or `YYYYMMDD`; anything after the date part
/// (a time of day, a timezone) is ignored.
pub fn parse_date(value: &str) -> Result<Date, ValidationError> {
    parse_calendar_date(value).ok_or_else(|| ValidationError::InvalidDate {
        value: value.to_owned(),
    })
}

const DASHED: &[BorrowedFormatItem<'static>] = format_description!("[year]-[month]-[day]");
const SLASHED: &[BorrowedFormatItem<'static>] = format_description!("[year]/[month]/[day]");
const COMPACT: &[BorrowedFormatItem<'static>] = format_description!("[year][month][day]");

pub(crate) fn parse_calendar_date(value: &str) -> Option<Date> {
    let value = value.trim();
    // Years are unsigned four-digit values.
    if !value.starts_with(|ch: char| ch.is_ascii_digit()) {
        return None;
    }

    let head = value.get(..10).unwrap_or(value);
    [DASHED, SLASHED]
        .into_iter()
        .find_map(|layout| Date::parse(head, layout).ok())
        .or_else(|| Date::parse(value, COMPACT).ok())
}

/// Rolls weekends back to the preceding Friday. Holidays are not considered.
pub fn latest_weekday(date: Date) -> Date {
    let back = match date.weekday() {
        Weekday::Saturday => 1,
        Weekday::Sunday => 2,
        _ => 0,
    };
    date.checked_sub(Duration::days(back)).unwrap_or(date)
}

/// Current calendar date at the given UTC offset.
pub fn market_today(utc_offset_hours: i8) -> Date {
    let offset = UtcOffset::from_hms(utc_offset_hours, 0, 0).unwrap_or(UtcOffset::UTC);
    OffsetDateTime::now_utc().to_offset(offset).date()
}

// Serde helpers reading and writing dates as `YYYY-MM-DD` strings.
time::serde::format_description!(pub iso_date, Date, "[year]-[month]-[day]");

#[cfg(test)]
mod tests {
    use super::*;
    use time::Month;

    fn date(year: i32, month: Month, day: u8) -> Date {
        Date::from_calendar_date(year, month, day).expect("valid date")
    }

    #[test]
    fn exclusive_end_is_next_day() {
        let range = FetchRange::new(date(2024, Month::January, 1), date(2024, Month::January, 10))
            .expect("valid range");

        assert_eq!(range.exclusive_end(), date(2024, Month::January, 11));
        assert_eq!(range.end(), date(2024, Month::January, 10));
    }

    #[test]
    fn exclusive_end_crosses_year_boundary() {
        let range = FetchRange::new(date(2023, Month::December, 1), date(2023, Month::December, 31))
            .expect("valid range");

        assert_eq!(range.exclusive_end(), date(2024, Month::January, 1));
    }

    #[test]
    fn inverted_range_is_rejected() {
        let err = FetchRange::new(date(2024, Month::March, 2), date(2024, Month::March, 1))
            .expect_err("start after end");
        assert!(matches!(err, ValidationError::InvertedRange { .. }));
    }

    #[test]
    fn lookback_doubles_calendar_days() {
        let range = FetchRange::lookback(date(2024, Month::March, 31), 30);

        assert_eq!(range.start(), date(2024, Month::January, 31));
        assert_eq!(range.end(), date(2024, Month::March, 31));
    }

    #[test]
    fn parses_common_date_layouts() {
        let expected = date(2024, Month::January, 10);

        assert_eq!(parse_date("2024-01-10"), Ok(expected));
        assert_eq!(parse_date("2024/01/10"), Ok(expected));
        assert_eq!(parse_date("20240110"), Ok(expected));
        assert_eq!(parse_date("2024-01-10T00:00:00+08:00"), Ok(expected));
        assert!(parse_date("2024-13-01").is_err());
        assert!(parse_date("10/01/2024").is_err());
        assert!(parse_date("").is_err());
    }

    #[test]
    fn signed_and_short_years_are_rejected() {
        assert!(parse_date("+024-01-05").is_err());
        assert!(parse_date("-2024-01-05").is_err());
        assert!(parse_date("+2024-01-05").is_err());
        assert!(parse_date("024-01-05").is_err());
        assert!(parse_date("2024-1-5").is_err());
    }

    #[test]
    fn iso_date_round_trips_through_serde() {
        #[derive(Debug, PartialEq, Serialize, serde::Deserialize)]
        struct Row {
            #[serde(with = "iso_date")]
            date: Date,
        }

        let row = Row {
            date: date(2024, Month::January, 5),
        };
        let json = serde_json::to_string(&row).expect("serializes");

        assert_eq!(json, r#"{"date":"2024-01-05"}"#);
        assert_eq!(serde_json::from_str::<Row>(&json).expect("deserializes"), row);
        assert!(serde_json::from_str::<Row>(r#"{"date":"2024/01/05"}"#).is_err());
    }

    #[test]
    fn weekends_roll_back_to_friday() {
        // 2024-01-13 is a Saturday.
        assert_eq!(latest_weekday(date(2024, Month::January, 13)), date(2024, Month::January, 12));
        assert_eq!(latest_weekday(date(2024, Month::January, 14)), date(2024, Month::January, 12));
        assert_eq!(latest_weekday(date(2024, Month::January, 15)), date(2024, Month::January, 15));
    }
}
