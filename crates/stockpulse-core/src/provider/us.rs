use crate::backend::{DownloadRequest, RawFrame, SharedBackend};
use crate::domain::{FetchRange, Market, StagedRow, Symbol};
use crate::pacing::RequestPacer;
use crate::policy::ProviderPolicy;
use crate::retry::RetryPolicy;
use crate::{BoxFuture, DataError};

use super::{
    backend_ticker, download_frame, lookup_name, stage_frame, Provider, ProviderDescriptor,
};

/// Suffixes that are stripped before a symbol is judged as a US ticker.
const FOREIGN_VENUE_SUFFIXES: [&str; 5] = ["TW", "TWO", "SS", "SZ", "SH"];

/// NYSE/NASDAQ tickers (`AAPL`, `BRK.B`) through the shared backend.
#[derive(Debug, Clone)]
pub struct UsStockProvider {
    backend: SharedBackend,
    pacer: RequestPacer,
    retry: RetryPolicy,
}

impl UsStockProvider {
    pub const NAME: &'static str = "UsStockProvider";
    pub const PRIORITY: u32 = 2;

    pub fn new(backend: SharedBackend, policy: &ProviderPolicy) -> Self {
        Self {
            backend,
            pacer: RequestPacer::from_policy(&policy.pacing),
            retry: policy.retry.clone(),
        }
    }
}

impl ProviderDescriptor for UsStockProvider {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn priority(&self) -> u32 {
        Self::PRIORITY
    }

    fn canonicalize(&self, symbol: &Symbol) -> Symbol {
        symbol.without_suffix(&FOREIGN_VENUE_SUFFIXES)
    }

    fn supports(&self, symbol: &Symbol) -> bool {
        self.canonicalize(symbol).market() == Market::Foreign
    }

    fn symbol_name<'a>(&'a self, symbol: &'a Symbol) -> BoxFuture<'a, Option<String>> {
        Box::pin(async move {
            if !self.supports(symbol) {
                return None;
            }
            let ticker = backend_ticker(&self.canonicalize(symbol));
            lookup_name(&self.backend, &self.pacer, Self::NAME, &ticker).await
        })
    }
}

impl Provider for UsStockProvider {
    type Raw = RawFrame;

    fn fetch_raw<'a>(
        &'a self,
        symbol: &'a Symbol,
        range: FetchRange,
    ) -> BoxFuture<'a, Result<RawFrame, DataError>> {
        Box::pin(async move {
            let request = DownloadRequest::daily(backend_ticker(symbol), range, true);
            download_frame(&self.backend, &self.pacer, Self::NAME, symbol, request).await
        })
    }

    fn normalize(&self, raw: RawFrame, symbol: &Symbol) -> Result<Vec<StagedRow>, DataError> {
        stage_frame(&raw, Self::NAME, symbol)
    }

    fn retry_policy(&self) -> RetryPolicy {
        self.retry.clone()
    }
}
