//! # StockPulse Core
//!
//! Resilient daily price acquisition for a portfolio of equities.
//!
//! ## Overview
//!
//! - **Provider contract** with three built-in providers (domestic, US, generic fallback)
//! - **Failover registry** trying providers in priority order
//! - **Batch orchestrator** running one fetch-and-store job per symbol on a bounded pool
//! - **Institutional flow client** for supplementary per-symbol data
//! - **Market overview** collector for indices, sample statistics and breadth
//!
//! ## Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`backend`] | Market backend contract, Yahoo chart backend, process-wide call lock |
//! | [`cache`] | Institutional flow cache |
//! | [`config`] | Environment configuration |
//! | [`domain`] | Symbol, FetchRange, StandardRow, NormalizedSeries |
//! | [`error`] | Validation, backend and acquisition errors |
//! | [`http_client`] | HTTP client abstraction |
//! | [`institutional`] | Institutional net flow from the two exchange endpoints |
//! | [`market`] | Market overview collector |
//! | [`pacing`] | Rate budget and jitter before upstream calls |
//! | [`pipeline`] | Batch orchestrator |
//! | [`policy`] | Retry, pacing and timeout settings |
//! | [`provider`] | Provider traits and implementations |
//! | [`registry`] | Priority failover registry |
//! | [`retry`] | Retry with exponential backoff |
//! | [`store`] | Persistence contract and in-memory store |
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────┐
//! │  BatchOrchestrator   │──────────────┐
//! └──────────┬───────────┘              │
//!            │ per symbol (Semaphore)   ▼
//!            ▼                    ┌───────────┐
//! ┌──────────────────────┐        │   Store   │
//! │  ProviderRegistry    │        └───────────┘
//! └──────────┬───────────┘
//!            │ priority order
//!            ▼
//! ┌──────────────────────┐     ┌──────────────────┐
//! │ Provider             │────▶│ SharedBackend    │
//! │ (retry + pacing)     │     │ (global lock)    │
//! └──────────────────────┘     └──────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use stockpulse_core::{BatchOrchestrator, MemoryStore, PipelineConfig, RegistryBuilder, RunOptions};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let registry = Arc::new(RegistryBuilder::new().build());
//!     let orchestrator = BatchOrchestrator::new(registry, Arc::new(MemoryStore::new()), PipelineConfig::default());
//!
//!     let report = orchestrator.run(&["2330".into(), "AAPL".into()], RunOptions::default()).await?;
//!     println!("stored {} failed {}", report.stored(), report.failed());
//!     Ok(())
//! }
//! ```

pub mod backend;
pub mod cache;
pub mod config;
pub mod domain;
pub mod error;
pub mod http_client;
pub mod institutional;
pub mod market;
pub mod pacing;
pub mod pipeline;
pub mod policy;
pub mod provider;
pub mod registry;
pub mod retry;
pub mod store;

use std::future::Future;
use std::pin::Pin;

/// Boxed, sendable future used at trait seams.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

// Backend
pub use backend::{DownloadRequest, MarketBackend, RawFrame, SharedBackend, YahooChartBackend};

pub use cache::FlowCache;
pub use config::AppConfig;

// Domain models
pub use domain::{
    classify, latest_weekday, market_today, parse_date, FetchRange, Market, NormalizedSeries,
    StagedRow, StandardRow, Symbol,
};

// Error types
pub use error::{BackendError, DataError, ProviderFailure, ValidationError};

// HTTP client types
pub use http_client::{HttpClient, HttpError, HttpRequest, HttpResponse, ReqwestHttpClient};

pub use institutional::{InstitutionalFlow, InstitutionalFlowClient};
pub use market::{Breadth, MarketIndex, MarketOverview, MarketOverviewCollector, SampleStatistics};
pub use pacing::{JitterRange, PacingPolicy, RequestPacer};

// Orchestration
pub use pipeline::{
    BatchAborted, BatchOrchestrator, JobResult, JobState, JobStatus, PipelineConfig, RunOptions,
    RunReport,
};

pub use policy::ProviderPolicy;

// Providers
pub use provider::{
    DailyQuery, DailySource, GenericYahooProvider, Provider, ProviderDescriptor, ProviderId,
    TaiwanStockProvider, UsStockProvider,
};

pub use registry::{FetchOutcome, ProviderRegistry, RegistryBuilder};
pub use retry::{Backoff, RetryPolicy};
pub use store::{AnalysisContext, DailyFetchRecord, MemoryStore, Store, StoreError};
