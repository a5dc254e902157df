//! Environment configuration.
//!
//! | Key | Default |
//! |-----|---------|
//! | `STOCK_LIST` | empty |
//! | `MAX_WORKERS` | `3` (minimum 1) |
//! | `LOOKBACK_DAYS` | `30` |
//! | `STOCKPULSE_DB_PATH` | `$STOCKPULSE_HOME/warehouse.duckdb` |
//! | `STOCKPULSE_HOME` | `~/.stockpulse` |
//! | `HTTP_TIMEOUT_MS` | `20000` |
//! | `AUX_TIMEOUT_MS` | `10000` |
//! | `JITTER_MIN_MS` / `JITTER_MAX_MS` | `1000` / `3000` |
//! | `RETRY_MAX_ATTEMPTS` | `3` |
//! | `MARKET_UTC_OFFSET_HOURS` | `8` |
//! | `BREADTH_UNIVERSE` | empty |

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use time::UtcOffset;

use crate::pacing::JitterRange;
use crate::pipeline::{PipelineConfig, DEFAULT_MAX_WORKERS};
use crate::policy::ProviderPolicy;
use crate::provider::{DEFAULT_LOOKBACK_DAYS, DEFAULT_MARKET_UTC_OFFSET_HOURS};
use crate::retry::RetryPolicy;
use crate::ValidationError;

#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub stock_list: Vec<String>,
    pub max_workers: usize,
    pub lookback_days: u32,
    pub db_path: PathBuf,
    pub http_timeout_ms: u64,
    pub aux_timeout_ms: u64,
    pub jitter_min_ms: u64,
    pub jitter_max_ms: u64,
    pub retry_max_attempts: u32,
    pub utc_offset_hours: i8,
    pub breadth_universe: Vec<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            stock_list: Vec::new(),
            max_workers: DEFAULT_MAX_WORKERS,
            lookback_days: DEFAULT_LOOKBACK_DAYS,
            db_path: default_home().join("warehouse.duckdb"),
            http_timeout_ms: 20_000,
            aux_timeout_ms: 10_000,
            jitter_min_ms: 1_000,
            jitter_max_ms: 3_000,
            retry_max_attempts: 3,
            utc_offset_hours: DEFAULT_MARKET_UTC_OFFSET_HOURS,
            breadth_universe: Vec::new(),
        }
    }
}

impl AppConfig {
    /// Reads the process environment after loading `.env` when present.
    pub fn from_env() -> Result<Self, ValidationError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ValidationError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let read = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_owned())
                .filter(|value| !value.is_empty())
        };

        let home = read("STOCKPULSE_HOME").map_or_else(default_home, PathBuf::from);
        let db_path = read("STOCKPULSE_DB_PATH")
            .map_or_else(|| home.join("warehouse.duckdb"), PathBuf::from);

        let max_workers: usize = parse_or("MAX_WORKERS", read("MAX_WORKERS"), defaults.max_workers)?;
        if max_workers == 0 {
            return Err(ValidationError::InvalidConfig {
                key: "MAX_WORKERS",
                value: String::from("0"),
            });
        }

        let utc_offset_hours: i8 = parse_or(
            "MARKET_UTC_OFFSET_HOURS",
            read("MARKET_UTC_OFFSET_HOURS"),
            defaults.utc_offset_hours,
        )?;
        if UtcOffset::from_hms(utc_offset_hours, 0, 0).is_err() {
            return Err(ValidationError::InvalidConfig {
                key: "MARKET_UTC_OFFSET_HOURS",
                value: utc_offset_hours.to_string(),
            });
        }

        Ok(Self {
            stock_list: read("STOCK_LIST").map(|value| split_list(&value)).unwrap_or_default(),
            max_workers,
            lookback_days: parse_or("LOOKBACK_DAYS", read("LOOKBACK_DAYS"), defaults.lookback_days)?,
            db_path,
            http_timeout_ms: parse_or("HTTP_TIMEOUT_MS", read("HTTP_TIMEOUT_MS"), defaults.http_timeout_ms)?,
            aux_timeout_ms: parse_or("AUX_TIMEOUT_MS", read("AUX_TIMEOUT_MS"), defaults.aux_timeout_ms)?,
            jitter_min_ms: parse_or("JITTER_MIN_MS", read("JITTER_MIN_MS"), defaults.jitter_min_ms)?,
            jitter_max_ms: parse_or("JITTER_MAX_MS", read("JITTER_MAX_MS"), defaults.jitter_max_ms)?,
            retry_max_attempts: parse_or(
                "RETRY_MAX_ATTEMPTS",
                read("RETRY_MAX_ATTEMPTS"),
                defaults.retry_max_attempts,
            )?,
            utc_offset_hours,
            breadth_universe: read("BREADTH_UNIVERSE")
                .map(|value| split_list(&value))
                .unwrap_or_default(),
        })
    }

    pub fn provider_policy(&self) -> ProviderPolicy {
        let mut policy = ProviderPolicy {
            retry: RetryPolicy::exponential(self.retry_max_attempts.max(1)),
            request_timeout: Duration::from_millis(self.http_timeout_ms),
            auxiliary_timeout: Duration::from_millis(self.aux_timeout_ms),
            ..ProviderPolicy::default()
        };
        policy.pacing.jitter = (self.jitter_max_ms > 0).then(|| {
            JitterRange::new(
                Duration::from_millis(self.jitter_min_ms),
                Duration::from_millis(self.jitter_max_ms),
            )
        });
        policy
    }

    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            max_workers: self.max_workers,
            lookback_days: self.lookback_days,
            today: None,
            utc_offset_hours: self.utc_offset_hours,
        }
    }
}

fn default_home() -> PathBuf {
    env::var_os("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".stockpulse")
}

/// Comma-separated list, trimmed, upper-cased, empties dropped.
pub fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|item| item.trim().to_ascii_uppercase())
        .filter(|item| !item.is_empty())
        .collect()
}

fn parse_or<T: FromStr>(key: &'static str, value: Option<String>, default: T) -> Result<T, ValidationError> {
    match value {
        None => Ok(default),
        Some(raw) => raw
            .parse()
            .map_err(|_| ValidationError::InvalidConfig { key, value: raw }),
    }
}
