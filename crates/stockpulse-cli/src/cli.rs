//! CLI argument definitions for stockpulse.
//!
//! # Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `run` | Batch fetch-and-store for a list of symbols |
//! | `fetch` | Fetch one symbol through the provider registry |
//! | `name` | Resolve a symbol's display name |
//! | `flow` | Institutional investor net flow for a domestic symbol |
//! | `context` | Recent stored rows for a symbol |
//! | `market` | Market overview: indices, sample statistics, breadth |
//!
//! # Global Options
//!
//! | Option | Default | Description |
//! |--------|---------|-------------|
//! | `--db-path` | `STOCKPULSE_DB_PATH` | DuckDB warehouse location |
//! | `--log-level` | `info` | Used when `RUST_LOG` is unset |
//! | `--log-json` | `false` | JSON log lines on stderr |
//! | `--pretty` | `false` | Pretty-print JSON output |
//!
//! # Examples
//!
//! ```bash
//! stockpulse run --stocks 2330,AAPL,0050 --workers 3
//! stockpulse fetch 2330 --days 10 --pretty
//! stockpulse flow 2330 --date 2024-01-17
//! ```

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

/// Daily stock data ingestion with provider failover.
#[derive(Debug, Parser)]
#[command(
    name = "stockpulse",
    author,
    version,
    about = "Daily stock data ingestion with provider failover",
    long_about = "stockpulse fetches daily OHLCV series through an ordered list of providers, \
falls back when one fails, and stores the results in a local DuckDB warehouse.\n\
\n\
Configuration is read from the environment (and a .env file when present); \
command-line flags override it."
)]
pub struct Cli {
    /// Warehouse database file. Overrides STOCKPULSE_DB_PATH.
    #[arg(long, global = true)]
    pub db_path: Option<PathBuf>,

    /// Log level used when RUST_LOG is not set.
    #[arg(long, global = true, value_enum, default_value_t = LogLevel::Info)]
    pub log_level: LogLevel,

    /// Emit log lines as JSON.
    #[arg(long, global = true, default_value_t = false)]
    pub log_json: bool,

    /// Pretty-print JSON output with indentation.
    #[arg(long, global = true, default_value_t = false)]
    pub pretty: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Warn => "warn",
            Self::Info => "info",
            Self::Debug => "debug",
            Self::Trace => "trace",
        }
    }
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Fetch and store daily data for a batch of symbols.
    ///
    /// Symbols already fetched today are skipped unless --force-refresh is given.
    /// Exits with code 3 when any symbol failed.
    ///
    /// # Examples
    ///
    ///   stockpulse run
    ///   stockpulse run --stocks 2330,AAPL --workers 2 --dry-run
    Run(RunArgs),

    /// Fetch one symbol's daily series through the provider registry.
    ///
    /// # Examples
    ///
    ///   stockpulse fetch 2330
    ///   stockpulse fetch AAPL --start 2024-01-01 --end 2024-01-31
    Fetch(FetchArgs),

    /// Resolve a symbol's display name.
    Name(SymbolArgs),

    /// Institutional investor net flow for a domestic symbol, in lots.
    Flow(FlowArgs),

    /// Recent stored rows for a symbol.
    Context(ContextArgs),

    /// Market overview: headline indices, sample statistics and breadth.
    Market(MarketArgs),
}

#[derive(Debug, Args)]
pub struct RunArgs {
    /// Comma-separated symbols. Overrides STOCK_LIST.
    #[arg(long, value_delimiter = ',')]
    pub stocks: Option<Vec<String>>,

    /// Concurrent fetch workers. Overrides MAX_WORKERS.
    #[arg(long, value_parser = clap::value_parser!(u16).range(1..))]
    pub workers: Option<u16>,

    /// Fetch symbols even when already fetched today.
    #[arg(long, default_value_t = false)]
    pub force_refresh: bool,

    /// Report counts only; no series are handed downstream.
    #[arg(long, default_value_t = false)]
    pub dry_run: bool,
}

#[derive(Debug, Args)]
pub struct FetchArgs {
    /// Market symbol (e.g. 2330, 6488.TWO, AAPL).
    pub symbol: String,

    /// First day, YYYY-MM-DD.
    #[arg(long)]
    pub start: Option<String>,

    /// Last day, YYYY-MM-DD. Defaults to today.
    #[arg(long)]
    pub end: Option<String>,

    /// Lookback in calendar days when --start is not given. Overrides LOOKBACK_DAYS.
    #[arg(long)]
    pub days: Option<u32>,
}

#[derive(Debug, Args)]
pub struct SymbolArgs {
    pub symbol: String,
}

#[derive(Debug, Args)]
pub struct FlowArgs {
    pub symbol: String,

    /// Trading day, YYYY-MM-DD. Defaults to the latest weekday.
    #[arg(long)]
    pub date: Option<String>,
}

#[derive(Debug, Args)]
pub struct ContextArgs {
    pub symbol: String,

    /// Number of most recent rows to include.
    #[arg(long, default_value_t = 60)]
    pub limit: usize,
}

#[derive(Debug, Args)]
pub struct MarketArgs {
    /// Include 200-day breadth over BREADTH_UNIVERSE.
    #[arg(long, default_value_t = false)]
    pub breadth: bool,
}
