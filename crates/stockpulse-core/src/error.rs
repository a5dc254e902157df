use serde::Serialize;
use thiserror::Error;
use time::Date;

use crate::http_client::HttpError;

/// Validation errors for symbols, ranges and configuration values.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("symbol cannot be empty")]
    EmptySymbol,
    #[error("symbol length {len} exceeds max {max}")]
    SymbolTooLong { len: usize, max: usize },
    #[error("symbol contains invalid character '{ch}' at index {index}")]
    SymbolInvalidChar { ch: char, index: usize },

    #[error("invalid date '{value}', expected YYYY-MM-DD")]
    InvalidDate { value: String },
    #[error("range start {start} is after end {end}")]
    InvertedRange { start: Date, end: Date },

    #[error("invalid provider '{value}', expected one of taiwan, us, generic")]
    InvalidProvider { value: String },
    #[error("invalid value '{value}' for {key}")]
    InvalidConfig { key: &'static str, value: String },

    #[error("series for {symbol} has no rows")]
    EmptySeries { symbol: String },
}

/// Failure reported by the market-data backend or an HTTP endpoint.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BackendError {
    /// Timeouts, connection resets and overloaded upstreams.
    #[error("transient transport error: {0}")]
    Transient(String),
    #[error("request rejected: {0}")]
    Rejected(String),
    #[error("malformed payload: {0}")]
    Malformed(String),
}

impl BackendError {
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }

    pub fn message(&self) -> &str {
        match self {
            Self::Transient(message) | Self::Rejected(message) | Self::Malformed(message) => {
                message
            }
        }
    }

    /// Classifies a backend failure at the provider boundary.
    pub fn into_data_error(self, provider: &str, symbol: &str) -> DataError {
        match self {
            Self::Transient(message) => DataError::TransientTransport {
                provider: provider.to_owned(),
                symbol: symbol.to_owned(),
                message,
            },
            other => DataError::FetchFailed {
                provider: provider.to_owned(),
                symbol: symbol.to_owned(),
                cause: other.to_string(),
            },
        }
    }
}

impl From<HttpError> for BackendError {
    fn from(error: HttpError) -> Self {
        if error.retryable() {
            Self::Transient(error.message().to_owned())
        } else {
            Self::Rejected(error.message().to_owned())
        }
    }
}

/// One provider's failure inside an aggregate error.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProviderFailure {
    pub provider: String,
    pub error: DataError,
}

/// Acquisition error taxonomy.
///
/// Provider-local variants are recovered by the registry, symbol-local variants by the
/// orchestrator. Only [`DataError::StoreUnavailable`] may abort a batch.
#[derive(Debug, Error, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DataError {
    #[error("{provider} does not serve symbol {symbol}")]
    UnsupportedSymbol { provider: String, symbol: String },

    #[error("{provider} returned no data for {symbol}")]
    NoData { provider: String, symbol: String },

    #[error("{provider} transport error for {symbol}: {message}")]
    TransientTransport {
        provider: String,
        symbol: String,
        message: String,
    },

    #[error("{provider} failed to fetch {symbol}: {cause}")]
    FetchFailed {
        provider: String,
        symbol: String,
        cause: String,
    },

    #[error("all providers failed for {symbol}: {}", summarize_failures(.failures))]
    AllProvidersFailed {
        symbol: String,
        failures: Vec<ProviderFailure>,
    },

    #[error("store unavailable: {message}")]
    StoreUnavailable { message: String },

    #[error("job for {symbol} failed: {reason}")]
    SymbolJobFailed {
        symbol: String,
        reason: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        cause: Option<Box<DataError>>,
    },
}

impl DataError {
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::UnsupportedSymbol { .. } => "unsupported_symbol",
            Self::NoData { .. } => "no_data",
            Self::TransientTransport { .. } => "transient_transport",
            Self::FetchFailed { .. } => "fetch_failed",
            Self::AllProvidersFailed { .. } => "all_providers_failed",
            Self::StoreUnavailable { .. } => "store_unavailable",
            Self::SymbolJobFailed { .. } => "symbol_job_failed",
        }
    }

    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::TransientTransport { .. })
    }

    /// Wraps any error raised inside one symbol's job.
    pub fn into_job_failure(self, symbol: &str) -> Self {
        match self {
            Self::SymbolJobFailed { .. } => self,
            other => Self::SymbolJobFailed {
                symbol: symbol.to_owned(),
                reason: other.to_string(),
                cause: Some(Box::new(other)),
            },
        }
    }

    /// Per-provider failures carried by this error, looking through a job wrapper.
    pub fn provider_failures(&self) -> &[ProviderFailure] {
        match self {
            Self::AllProvidersFailed { failures, .. } => failures,
            Self::SymbolJobFailed {
                cause: Some(cause), ..
            } => cause.provider_failures(),
            _ => &[],
        }
    }
}

fn summarize_failures(failures: &[ProviderFailure]) -> String {
    if failures.is_empty() {
        return String::from("no providers registered");
    }

    failures
        .iter()
        .map(|failure| format!("[{}] {}", failure.provider, failure.error.kind()))
        .collect::<Vec<_>>()
        .join(", ")
}
