use crate::backend::{DownloadRequest, RawFrame, SharedBackend};
use crate::domain::{FetchRange, Market, StagedRow, Symbol};
use crate::pacing::RequestPacer;
use crate::policy::ProviderPolicy;
use crate::retry::RetryPolicy;
use crate::{BoxFuture, DataError};

use super::{
    backend_ticker, download_frame, lookup_name, stage_frame, Provider, ProviderDescriptor,
};

/// Last-resort provider for anything the backend can quote, including international
/// listings such as `0700.HK` or `7203.T`.
#[derive(Debug, Clone)]
pub struct GenericYahooProvider {
    backend: SharedBackend,
    pacer: RequestPacer,
    retry: RetryPolicy,
}

impl GenericYahooProvider {
    pub const NAME: &'static str = "GenericYahooProvider";
    pub const PRIORITY: u32 = 5;

    pub fn new(backend: SharedBackend, policy: &ProviderPolicy) -> Self {
        Self {
            backend,
            pacer: RequestPacer::from_policy(&policy.pacing),
            retry: policy.retry.clone(),
        }
    }
}

/// `CODE.SUFFIX` with a 1–10 character alphanumeric code and a 1–3 letter exchange suffix.
fn is_international(symbol: &Symbol) -> bool {
    let code = symbol.code();
    let Some(suffix) = symbol.suffix() else {
        return false;
    };

    (1..=10).contains(&code.len())
        && code.chars().all(|ch| ch.is_ascii_alphanumeric())
        && (1..=3).contains(&suffix.len())
        && suffix.chars().all(|ch| ch.is_ascii_uppercase())
}

impl ProviderDescriptor for GenericYahooProvider {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn priority(&self) -> u32 {
        Self::PRIORITY
    }

    /// Domestic codes still need a venue suffix on the backend.
    fn canonicalize(&self, symbol: &Symbol) -> Symbol {
        match symbol.market() {
            Market::Domestic => symbol.with_default_suffix("TW"),
            _ => symbol.clone(),
        }
    }

    fn supports(&self, symbol: &Symbol) -> bool {
        symbol.market() != Market::Unknown || is_international(symbol)
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

impl Provider for GenericYahooProvider {
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

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    use crate::backend::MarketBackend;
    use crate::BackendError;

    #[derive(Default)]
    struct RecordingBackend {
        tickers: Mutex<Vec<String>>,
    }

    impl RecordingBackend {
        fn tickers(&self) -> Vec<String> {
            self.tickers
                .lock()
                .expect("ticker log should not be poisoned")
                .clone()
        }
    }

    impl MarketBackend for RecordingBackend {
        fn download<'a>(
            &'a self,
            request: DownloadRequest,
        ) -> BoxFuture<'a, Result<RawFrame, BackendError>> {
            self.tickers
                .lock()
                .expect("ticker log should not be poisoned")
                .push(request.ticker);
            Box::pin(async { Ok(RawFrame::default()) })
        }

        fn lookup_name<'a>(
            &'a self,
            ticker: &'a str,
        ) -> BoxFuture<'a, Result<Option<String>, BackendError>> {
            self.tickers
                .lock()
                .expect("ticker log should not be poisoned")
                .push(ticker.to_owned());
            Box::pin(async { Ok(None) })
        }
    }

    fn symbol(raw: &str) -> Symbol {
        Symbol::parse(raw).expect("valid symbol")
    }

    #[test]
    fn recognizes_international_listings() {
        assert!(is_international(&symbol("0700.HK")));
        assert!(is_international(&symbol("7203.T")));
        assert!(is_international(&symbol("SAP.DE")));
        assert!(!is_international(&symbol("1234567")));
        assert!(!is_international(&symbol("0700.HKEX")));
        assert!(!is_international(&symbol("ABCDEFGHIJK.HK")));
    }

    #[test]
    fn canonicalization_is_idempotent() {
        let backend = SharedBackend::yahoo(
            std::sync::Arc::new(crate::http_client::ReqwestHttpClient::new()),
            1_000,
        );
        let provider = GenericYahooProvider::new(backend, &ProviderPolicy::immediate());

        for raw in ["2330", "AAPL", "0700.HK", "4956.TWO"] {
            let once = provider.canonicalize(&symbol(raw));
            assert_eq!(provider.canonicalize(&once), once);
        }
        assert_eq!(provider.canonicalize(&symbol("2330")).as_str(), "2330.TW");
        assert!(!provider.supports(&symbol("1234567")));
        assert!(provider.supports(&symbol("AAPL")));
    }

    #[tokio::test]
    async fn backend_tickers_follow_backend_spelling() {
        let backend = Arc::new(RecordingBackend::default());
        let provider = GenericYahooProvider::new(
            SharedBackend::new(backend.clone()),
            &ProviderPolicy::immediate(),
        );
        let range = FetchRange::lookback(
            time::Date::from_calendar_date(2024, time::Month::January, 10).expect("valid date"),
            5,
        );

        for raw in ["BRK.B", "0700.HK", "2330"] {
            let canonical = provider.canonicalize(&symbol(raw));
            let error = provider
                .fetch_raw(&canonical, range)
                .await
                .expect_err("empty frame");
            assert!(matches!(error, DataError::NoData { .. }));
        }
        assert_eq!(provider.symbol_name(&symbol("BRK.B")).await, None);

        assert_eq!(backend.tickers(), vec!["BRK-B", "0700.HK", "2330.TW", "BRK-B"]);
    }
}
