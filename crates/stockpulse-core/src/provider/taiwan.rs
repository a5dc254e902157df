use crate::backend::{DownloadRequest, RawFrame, SharedBackend};
use crate::domain::{FetchRange, Market, StagedRow, Symbol};
use crate::pacing::RequestPacer;
use crate::policy::ProviderPolicy;
use crate::retry::RetryPolicy;
use crate::{BoxFuture, DataError};

use super::{download_frame, stage_frame, Provider, ProviderDescriptor};

/// Domestic listings (`2330`, `2330.TW`, `4956.TWO`) through the shared backend.
#[derive(Debug, Clone)]
pub struct TaiwanStockProvider {
    backend: SharedBackend,
    pacer: RequestPacer,
    retry: RetryPolicy,
}

impl TaiwanStockProvider {
    pub const NAME: &'static str = "TaiwanStockProvider";
    pub const PRIORITY: u32 = 1;

    pub fn new(backend: SharedBackend, policy: &ProviderPolicy) -> Self {
        Self {
            backend,
            pacer: RequestPacer::from_policy(&policy.pacing),
            retry: policy.retry.clone(),
        }
    }
}

impl ProviderDescriptor for TaiwanStockProvider {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn priority(&self) -> u32 {
        Self::PRIORITY
    }

    /// Bare codes are listed on the primary venue.
    fn canonicalize(&self, symbol: &Symbol) -> Symbol {
        symbol.with_default_suffix("TW")
    }

    fn supports(&self, symbol: &Symbol) -> bool {
        symbol.market() == Market::Domestic
    }
}

impl Provider for TaiwanStockProvider {
    type Raw = RawFrame;

    fn fetch_raw<'a>(
        &'a self,
        symbol: &'a Symbol,
        range: FetchRange,
    ) -> BoxFuture<'a, Result<RawFrame, DataError>> {
        Box::pin(async move {
            let request = DownloadRequest::daily(symbol.as_str(), range, true);
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
