//! Bounded-concurrency batch orchestrator.
//!
//! One fetch-and-store job per symbol runs under a semaphore with `max_workers`
//! permits. A job's failure (including a panic) becomes that symbol's `Failed`
//! result; only an unavailable store stops the batch, and even then the results
//! collected so far are returned with the error.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use serde::Serialize;
use thiserror::Error;
use time::Date;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::domain::{iso_date, market_today, NormalizedSeries, Symbol};
use crate::provider::{DailyQuery, DEFAULT_LOOKBACK_DAYS, DEFAULT_MARKET_UTC_OFFSET_HOURS};
use crate::registry::ProviderRegistry;
use crate::store::{Store, StoreError};
use crate::DataError;

pub const DEFAULT_MAX_WORKERS: usize = 3;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    pub max_workers: usize,
    pub lookback_days: u32,
    /// Fixed "today"; defaults to the current market date.
    pub today: Option<Date>,
    pub utc_offset_hours: i8,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_workers: DEFAULT_MAX_WORKERS,
            lookback_days: DEFAULT_LOOKBACK_DAYS,
            today: None,
            utc_offset_hours: DEFAULT_MARKET_UTC_OFFSET_HOURS,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunOptions {
    /// Fetch even when today's record already exists.
    pub force_refresh: bool,
    /// Report counts only; stored series are not handed back.
    pub dry_run: bool,
}

/// Lifecycle of one symbol's job. `Stored`, `SkippedCached` and `Failed` are final.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Pending,
    Fetching,
    Stored,
    SkippedCached,
    Failed,
}

impl JobState {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Fetching => "fetching",
            Self::Stored => "stored",
            Self::SkippedCached => "skipped_cached",
            Self::Failed => "failed",
        }
    }

    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Stored | Self::SkippedCached | Self::Failed)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum JobStatus {
    Stored {
        source_name: String,
        rows_written: usize,
        /// `None` in dry runs.
        #[serde(skip)]
        series: Option<NormalizedSeries>,
    },
    SkippedCached,
    Failed {
        reason: DataError,
    },
}

impl JobStatus {
    pub const fn state(&self) -> JobState {
        match self {
            Self::Stored { .. } => JobState::Stored,
            Self::SkippedCached => JobState::SkippedCached,
            Self::Failed { .. } => JobState::Failed,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobResult {
    pub symbol: String,
    #[serde(flatten)]
    pub status: JobStatus,
}

impl JobResult {
    fn failed(symbol: impl Into<String>, reason: DataError) -> Self {
        let symbol = symbol.into();
        let reason = reason.into_job_failure(&symbol);
        Self {
            symbol,
            status: JobStatus::Failed { reason },
        }
    }
}

/// Outcome of one batch run. Results are in completion order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    #[serde(with = "iso_date")]
    pub today: Date,
    pub dry_run: bool,
    pub results: Vec<JobResult>,
    pub elapsed_ms: u64,
}

impl RunReport {
    fn count(&self, state: JobState) -> usize {
        self.results
            .iter()
            .filter(|result| result.status.state() == state)
            .count()
    }

    pub fn stored(&self) -> usize {
        self.count(JobState::Stored)
    }

    pub fn skipped(&self) -> usize {
        self.count(JobState::SkippedCached)
    }

    pub fn failed(&self) -> usize {
        self.count(JobState::Failed)
    }

    pub fn has_failures(&self) -> bool {
        self.failed() > 0
    }

    /// Series of every stored job. Empty for dry runs.
    pub fn stored_series(&self) -> Vec<&NormalizedSeries> {
        self.results
            .iter()
            .filter_map(|result| match &result.status {
                JobStatus::Stored {
                    series: Some(series),
                    ..
                } => Some(series),
                _ => None,
            })
            .collect()
    }

    pub fn failures(&self) -> impl Iterator<Item = (&str, &DataError)> + '_ {
        self.results.iter().filter_map(|result| match &result.status {
            JobStatus::Failed { reason } => Some((result.symbol.as_str(), reason)),
            _ => None,
        })
    }

    pub fn result_for(&self, symbol: &str) -> Option<&JobResult> {
        self.results.iter().find(|result| result.symbol == symbol)
    }
}

/// A batch stopped by a systemic store failure.
#[derive(Debug, Clone, Error)]
#[error("batch {} aborted: {error}", .partial.run_id)]
pub struct BatchAborted {
    pub error: DataError,
    /// Jobs that completed before and while the batch was stopping.
    pub partial: RunReport,
}

/// First systemic error of a run; once tripped no further job starts.
#[derive(Debug, Default)]
struct AbortSignal {
    tripped: AtomicBool,
    error: Mutex<Option<DataError>>,
}

impl AbortSignal {
    /// Returns `true` for the first trip only.
    fn trip(&self, error: DataError) -> bool {
        let first = !self.tripped.swap(true, Ordering::SeqCst);
        if first {
            *self.error.lock().unwrap_or_else(PoisonError::into_inner) = Some(error);
        }
        first
    }

    fn is_tripped(&self) -> bool {
        self.tripped.load(Ordering::SeqCst)
    }

    fn take(&self) -> Option<DataError> {
        self.error.lock().unwrap_or_else(PoisonError::into_inner).take()
    }
}

pub struct BatchOrchestrator {
    registry: Arc<ProviderRegistry>,
    store: Arc<dyn Store>,
    config: PipelineConfig,
}

impl std::fmt::Debug for BatchOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchOrchestrator")
            .field("registry", &self.registry)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl BatchOrchestrator {
    pub fn new(registry: Arc<ProviderRegistry>, store: Arc<dyn Store>, config: PipelineConfig) -> Self {
        Self {
            registry,
            store,
            config,
        }
    }

    pub fn registry(&self) -> &Arc<ProviderRegistry> {
        &self.registry
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn today(&self) -> Date {
        self.config
            .today
            .unwrap_or_else(|| market_today(self.config.utc_offset_hours))
    }

    /// Runs one job per symbol. Submission follows `symbols` order.
    pub async fn run(&self, symbols: &[String], options: RunOptions) -> Result<RunReport, BatchAborted> {
        let started = Instant::now();
        let run_id = Uuid::new_v4();
        let today = self.today();
        let workers = self.config.max_workers.max(1);
        let query = DailyQuery::new()
            .with_lookback_days(self.config.lookback_days)
            .as_of(today);

        info!(
            %run_id,
            %today,
            symbols = symbols.len(),
            workers,
            force_refresh = options.force_refresh,
            dry_run = options.dry_run,
            "batch run started"
        );

        let semaphore = Arc::new(Semaphore::new(workers));
        let abort = Arc::new(AbortSignal::default());
        let mut tasks = JoinSet::new();

        for raw in symbols {
            let job = SymbolJob {
                registry: Arc::clone(&self.registry),
                store: Arc::clone(&self.store),
                abort: Arc::clone(&abort),
                raw: raw.clone(),
                today,
                query,
                options,
            };
            let semaphore = Arc::clone(&semaphore);

            tasks.spawn(async move {
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    return None;
                };
                if job.abort.is_tripped() {
                    debug!(symbol = %job.raw, "batch stopping, job not started");
                    return None;
                }

                let symbol = job.raw.clone();
                // Inner task so a panic surfaces as a JoinError for this symbol only.
                match tokio::spawn(job.execute()).await {
                    Ok(result) => Some(result),
                    Err(join_error) => {
                        error!(symbol = %symbol, error = %join_error, "symbol job panicked");
                        Some(JobResult::failed(
                            symbol.clone(),
                            DataError::SymbolJobFailed {
                                symbol,
                                reason: format!("job panicked: {join_error}"),
                                cause: None,
                            },
                        ))
                    }
                }
            });
        }

        let mut results = Vec::with_capacity(symbols.len());
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Some(result)) => results.push(result),
                Ok(None) => {}
                Err(join_error) => error!(error = %join_error, "batch worker failed"),
            }
        }

        let report = RunReport {
            run_id,
            today,
            dry_run: options.dry_run,
            results,
            elapsed_ms: started.elapsed().as_millis().min(u128::from(u64::MAX)) as u64,
        };

        info!(
            %run_id,
            stored = report.stored(),
            skipped = report.skipped(),
            failed = report.failed(),
            elapsed_ms = report.elapsed_ms,
            "batch run finished"
        );

        match abort.take() {
            Some(error) => Err(BatchAborted {
                error,
                partial: report,
            }),
            None => Ok(report),
        }
    }
}

struct SymbolJob {
    registry: Arc<ProviderRegistry>,
    store: Arc<dyn Store>,
    abort: Arc<AbortSignal>,
    raw: String,
    today: Date,
    query: DailyQuery,
    options: RunOptions,
}

impl SymbolJob {
    async fn execute(self) -> JobResult {
        let symbol = match Symbol::parse(&self.raw) {
            Ok(symbol) => symbol,
            Err(error) => {
                warn!(symbol = %self.raw, error = %error, "invalid symbol");
                return JobResult::failed(
                    self.raw.clone(),
                    DataError::SymbolJobFailed {
                        symbol: self.raw.clone(),
                        reason: error.to_string(),
                        cause: None,
                    },
                );
            }
        };
        let key = symbol.to_string();
        transition(&key, JobState::Pending);

        if !self.options.force_refresh {
            let today = self.today;
            let lookup_key = key.clone();
            match self
                .with_store(move |store| store.has_record(&lookup_key, today))
                .await
            {
                Ok(true) => {
                    transition(&key, JobState::SkippedCached);
                    return JobResult {
                        symbol: key,
                        status: JobStatus::SkippedCached,
                    };
                }
                Ok(false) => {}
                Err(error) => return self.store_failure(key, error),
            }
        }

        transition(&key, JobState::Fetching);
        let outcome = match self.registry.get_daily_data(&symbol, &self.query).await {
            Ok(outcome) => outcome,
            Err(error) => {
                transition(&key, JobState::Failed);
                warn!(symbol = %key, error = %error, "symbol job failed");
                return JobResult::failed(key, error);
            }
        };

        let source_name = outcome.source_name;
        let series = outcome.series;
        let today = self.today;
        let upsert_key = key.clone();
        let upsert_source = source_name.clone();
        let stored = self
            .with_store(move |store| {
                store
                    .upsert(&series, &upsert_key, &upsert_source, today)
                    .map(|written| (written, series))
            })
            .await;

        match stored {
            Ok((rows_written, series)) => {
                transition(&key, JobState::Stored);
                info!(symbol = %key, provider = %source_name, rows = rows_written, "symbol stored");
                JobResult {
                    symbol: key,
                    status: JobStatus::Stored {
                        source_name,
                        rows_written,
                        series: (!self.options.dry_run).then_some(series),
                    },
                }
            }
            Err(error) => self.store_failure(key, error),
        }
    }

    async fn with_store<T, F>(&self, operation: F) -> Result<T, StoreError>
    where
        F: FnOnce(&dyn Store) -> Result<T, StoreError> + Send + 'static,
        T: Send + 'static,
    {
        let store = Arc::clone(&self.store);
        tokio::task::spawn_blocking(move || operation(store.as_ref()))
            .await
            .map_err(|error| StoreError::Rejected(format!("store task failed: {error}")))?
    }

    fn store_failure(&self, symbol: String, error: StoreError) -> JobResult {
        let data_error = error.into_data_error(&symbol);
        if matches!(data_error, DataError::StoreUnavailable { .. }) {
            if self.abort.trip(data_error.clone()) {
                error!(symbol = %symbol, error = %data_error, "store unavailable, stopping batch");
            }
        } else {
            warn!(symbol = %symbol, error = %data_error, "store rejected symbol");
        }
        transition(&symbol, JobState::Failed);
        JobResult::failed(symbol, data_error)
    }
}

fn transition(symbol: &str, state: JobState) {
    debug!(symbol, state = state.as_str(), terminal = state.is_terminal(), "job state");
}
