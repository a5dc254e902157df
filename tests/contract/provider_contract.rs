use std::sync::Arc;

use stockpulse_core::{
    DailyQuery, DailySource, DataError, FetchRange, GenericYahooProvider, ProviderDescriptor,
    ProviderPolicy, SharedBackend, Symbol, TaiwanStockProvider, UsStockProvider,
};
use time::{Date, Month};

#[path = "../support/mod.rs"]
mod support;

use support::{daily_frame, BackendReply, ScriptedBackend};

struct ProviderCase {
    source: Arc<dyn DailySource>,
    supported: &'static [&'static str],
    unsupported: &'static [&'static str],
}

fn provider_cases(backend: &Arc<ScriptedBackend>) -> Vec<ProviderCase> {
    let shared = SharedBackend::new(backend.clone());
    let policy = ProviderPolicy::immediate();
    vec![
        ProviderCase {
            source: Arc::new(TaiwanStockProvider::new(shared.clone(), &policy)),
            supported: &["2330", "2330.TW", "6488.TWO"],
            unsupported: &["AAPL", "7203.T"],
        },
        ProviderCase {
            source: Arc::new(UsStockProvider::new(shared.clone(), &policy)),
            supported: &["AAPL", "BRK.B", "MSFT"],
            unsupported: &["2330", "2330.TW"],
        },
        ProviderCase {
            source: Arc::new(GenericYahooProvider::new(shared, &policy)),
            supported: &["2330", "AAPL", "7203.T"],
            unsupported: &["^TWII-X.LONGSFX"],
        },
    ]
}

fn day(day: u8) -> Date {
    Date::from_calendar_date(2024, Month::January, day).expect("valid date")
}

fn query() -> DailyQuery {
    DailyQuery::new().with_range(FetchRange::new(day(1), day(10)).expect("valid range"))
}

fn symbol(value: &str) -> Symbol {
    Symbol::parse(value).expect("valid symbol")
}

#[tokio::test]
async fn supported_symbols_yield_sorted_unique_non_empty_series() {
    // Unsorted with a duplicated date on purpose.
    let backend = Arc::new(ScriptedBackend::new(BackendReply::Frame(daily_frame(
        &["2024-01-09", "2024-01-08", "2024-01-09"],
        50.0,
    ))));

    for case in provider_cases(&backend) {
        for raw in case.supported {
            let series = case
                .source
                .get_daily_data(&symbol(raw), &query())
                .await
                .unwrap_or_else(|error| panic!("provider '{}' failed for {raw}: {error}", case.source.name()));

            let dates: Vec<Date> = series.rows().iter().map(|row| row.date).collect();
            assert_eq!(dates, vec![day(8), day(9)], "provider '{}': {raw}", case.source.name());
            assert!(
                series.rows().iter().all(|row| row.close > 0.0 && row.volume >= 0.0),
                "provider '{}': values",
                case.source.name()
            );
        }
    }
}

#[tokio::test]
async fn unsupported_symbols_fail_without_touching_the_backend() {
    let backend = Arc::new(ScriptedBackend::serving(&["2024-01-08"], 10.0));

    for case in provider_cases(&backend) {
        for raw in case.unsupported {
            assert!(!case.source.supports(&symbol(raw)), "provider '{}': {raw}", case.source.name());
            let error = case
                .source
                .get_daily_data(&symbol(raw), &query())
                .await
                .expect_err("unsupported symbol must fail");
            assert!(
                matches!(error, DataError::UnsupportedSymbol { .. }),
                "provider '{}': {raw} gave {error}",
                case.source.name()
            );
        }
    }

    assert!(backend.requests().is_empty());
}

#[tokio::test]
async fn canonicalize_is_idempotent_for_all_providers() {
    let backend = Arc::new(ScriptedBackend::serving(&["2024-01-08"], 10.0));

    for case in provider_cases(&backend) {
        for raw in case.supported.iter().chain(case.unsupported) {
            let once = case.source.canonicalize(&symbol(raw));
            let twice = case.source.canonicalize(&once);
            assert_eq!(once, twice, "provider '{}': {raw}", case.source.name());
        }
    }
}

#[tokio::test]
async fn empty_frames_are_no_data_for_all_providers() {
    let backend = Arc::new(ScriptedBackend::new(BackendReply::Frame(daily_frame(&[], 0.0))));

    for case in provider_cases(&backend) {
        let raw = case.supported[0];
        let error = case
            .source
            .get_daily_data(&symbol(raw), &query())
            .await
            .expect_err("empty frame must fail");
        assert_eq!(error.kind(), "no_data", "provider '{}'", case.source.name());
    }
}

#[tokio::test]
async fn transient_failures_are_retried_within_the_provider() {
    let backend = Arc::new(
        ScriptedBackend::serving(&["2024-01-08", "2024-01-09"], 10.0).with_replies(
            "2330.TW",
            vec![BackendReply::Transient, BackendReply::Transient],
        ),
    );
    let provider = TaiwanStockProvider::new(
        SharedBackend::new(backend.clone()),
        &ProviderPolicy::immediate(),
    );

    let series = provider
        .get_daily_data(&symbol("2330"), &query())
        .await
        .expect("third attempt succeeds");

    assert_eq!(series.symbol().as_str(), "2330.TW");
    assert_eq!(backend.tickers(), vec!["2330.TW"; 3]);
}

#[tokio::test]
async fn rejected_requests_are_not_retried() {
    let backend = Arc::new(
        ScriptedBackend::serving(&["2024-01-08"], 10.0)
            .with_replies("AAPL", vec![BackendReply::Rejected]),
    );
    let provider = UsStockProvider::new(
        SharedBackend::new(backend.clone()),
        &ProviderPolicy::immediate(),
    );

    let error = provider
        .get_daily_data(&symbol("AAPL"), &query())
        .await
        .expect_err("rejected request fails");

    assert_eq!(error.kind(), "fetch_failed");
    assert_eq!(backend.requests().len(), 1);
}
