//! Behavior-driven tests for provider failover
//!
//! These tests verify how the registry walks its providers: priority order, fallback
//! on failure, skipping of unsupported providers and the aggregated error when nothing
//! answers.

use std::sync::Arc;

use stockpulse_core::{
    DailyQuery, DailySource, DataError, FetchRange, ProviderId, ProviderPolicy,
    ProviderRegistry, RegistryBuilder, RetryPolicy, SharedBackend, Symbol,
};
use time::{Date, Month};

mod support;

use support::{ProviderReply, ScriptedBackend, ScriptedProvider};

fn query() -> DailyQuery {
    let start = Date::from_calendar_date(2024, Month::January, 1).expect("valid date");
    let end = Date::from_calendar_date(2024, Month::January, 10).expect("valid date");
    DailyQuery::new().with_range(FetchRange::new(start, end).expect("valid range"))
}

fn symbol(value: &str) -> Symbol {
    Symbol::parse(value).expect("valid symbol")
}

fn registry(providers: &[&Arc<ScriptedProvider>]) -> ProviderRegistry {
    ProviderRegistry::new(
        providers
            .iter()
            .map(|provider| Arc::clone(provider) as Arc<dyn DailySource>)
            .collect(),
    )
}

// =============================================================================
// Registry: Priority and fallback
// =============================================================================

#[tokio::test]
async fn when_the_first_provider_fails_the_next_one_answers() {
    // Given: A failing primary and a healthy secondary, registered out of order
    let primary = Arc::new(ScriptedProvider::always_failing("Primary", 1));
    let secondary = Arc::new(ScriptedProvider::always_ok("Secondary", 2));
    let registry = registry(&[&secondary, &primary]);

    // When: A symbol is fetched
    let outcome = registry
        .get_daily_data(&symbol("2330"), &query())
        .await
        .expect("secondary answers");

    // Then: The primary was tried first and its failure is reported alongside the data
    assert_eq!(registry.provider_names(), vec!["Primary", "Secondary"]);
    assert_eq!(outcome.source_name, "Secondary");
    assert_eq!(outcome.failures.len(), 1);
    assert_eq!(outcome.failures[0].provider, "Primary");
    assert_eq!(primary.calls(), 1);
    assert!(!outcome.series.is_empty());
}

#[tokio::test]
async fn when_the_first_provider_answers_later_providers_are_not_called() {
    // Given: Two healthy providers
    let primary = Arc::new(ScriptedProvider::always_ok("Primary", 1));
    let secondary = Arc::new(ScriptedProvider::always_ok("Secondary", 2));
    let registry = registry(&[&primary, &secondary]);

    // When: A symbol is fetched
    let outcome = registry
        .get_daily_data(&symbol("AAPL"), &query())
        .await
        .expect("primary answers");

    // Then: Only the primary did any work
    assert_eq!(outcome.source_name, "Primary");
    assert!(outcome.failures.is_empty());
    assert_eq!(secondary.calls(), 0);
}

#[tokio::test]
async fn when_every_provider_fails_each_failure_is_reported_in_order() {
    // Given: Three providers that fail in different ways
    let empty = Arc::new(ScriptedProvider::new("Empty", 1, ProviderReply::Empty));
    let broken = Arc::new(ScriptedProvider::always_failing("Broken", 2));
    let narrow = Arc::new(ScriptedProvider::always_ok("Narrow", 3).supporting(&["MSFT"]));
    let registry = registry(&[&narrow, &broken, &empty]);

    // When: A symbol nobody can serve is fetched
    let error = registry
        .get_daily_data(&symbol("AAPL"), &query())
        .await
        .expect_err("every provider fails");

    // Then: The aggregated error lists every provider's cause by priority
    let DataError::AllProvidersFailed { symbol, failures } = &error else {
        panic!("expected AllProvidersFailed, got {error:?}");
    };
    assert_eq!(symbol, "AAPL");
    let kinds: Vec<(&str, &str)> = failures
        .iter()
        .map(|failure| (failure.provider.as_str(), failure.error.kind()))
        .collect();
    assert_eq!(
        kinds,
        vec![
            ("Empty", "no_data"),
            ("Broken", "fetch_failed"),
            ("Narrow", "unsupported_symbol"),
        ]
    );
    assert_eq!(narrow.calls(), 0);
    assert!(error.to_string().contains("[Broken] fetch_failed"));
}

#[tokio::test]
async fn when_a_provider_exhausts_its_retries_the_registry_moves_on() {
    // Given: A primary that times out on every attempt with three attempts allowed
    let flaky = Arc::new(
        ScriptedProvider::new("Flaky", 1, ProviderReply::Transient)
            .with_retry(RetryPolicy::immediate(3)),
    );
    let fallback = Arc::new(ScriptedProvider::always_ok("Fallback", 2));
    let registry = registry(&[&flaky, &fallback]);

    // When: A symbol is fetched
    let outcome = registry
        .get_daily_data(&symbol("2330"), &query())
        .await
        .expect("fallback answers");

    // Then: Retries stayed inside the primary and the fallback answered once
    assert_eq!(flaky.calls(), 3);
    assert_eq!(fallback.calls(), 1);
    assert_eq!(outcome.failures[0].error.kind(), "fetch_failed");
}

#[tokio::test]
async fn when_no_providers_are_registered_the_fetch_fails_cleanly() {
    // Given: An empty registry
    let registry = ProviderRegistry::new(Vec::new());

    // When: A symbol is fetched
    let error = registry
        .get_daily_data(&symbol("2330"), &query())
        .await
        .expect_err("nothing can answer");

    // Then: The error carries no provider failures
    assert!(registry.is_empty());
    assert!(error.provider_failures().is_empty());
    assert!(error.to_string().contains("no providers registered"));
}

#[tokio::test]
async fn when_a_provider_is_added_at_runtime_it_takes_its_priority_slot() {
    // Given: A registry with a failing low-priority provider
    let late = Arc::new(ScriptedProvider::always_failing("Late", 9));
    let registry = registry(&[&late]);

    // When: A higher-priority provider is added afterwards
    let early = Arc::new(ScriptedProvider::always_ok("Early", 1));
    registry.add_provider(Arc::clone(&early) as Arc<dyn DailySource>);
    let outcome = registry
        .get_daily_data(&symbol("AAPL"), &query())
        .await
        .expect("early provider answers");

    // Then: It is tried first
    assert_eq!(registry.provider_names(), vec!["Early", "Late"]);
    assert_eq!(outcome.source_name, "Early");
    assert_eq!(late.calls(), 0);
}

// =============================================================================
// Registry: Built-in providers
// =============================================================================

#[tokio::test]
async fn when_built_with_defaults_domestic_us_and_generic_are_ordered_by_priority() {
    // Given: The default builder over a scripted backend
    let backend = Arc::new(ScriptedBackend::serving(&["2024-01-08", "2024-01-09"], 600.0));
    let registry = RegistryBuilder::new()
        .with_backend(SharedBackend::new(backend.clone()))
        .with_policy(ProviderPolicy::immediate())
        .with_auxiliary(false)
        .build();

    // When: A domestic code is fetched
    let outcome = registry
        .get_daily_data(&symbol("2330"), &query())
        .await
        .expect("domestic provider answers");

    // Then: The domestic provider answered with the venue suffix appended
    assert_eq!(
        registry.provider_names(),
        vec!["TaiwanStockProvider", "UsStockProvider", "GenericYahooProvider"]
    );
    assert_eq!(outcome.source_name, "TaiwanStockProvider");
    assert_eq!(outcome.symbol.as_str(), "2330.TW");
    assert_eq!(backend.tickers(), vec!["2330.TW"]);
}

#[tokio::test]
async fn when_the_domestic_venue_has_no_data_the_generic_provider_answers() {
    // Given: Only the domestic and generic providers, and a first download that is empty
    let backend = Arc::new(
        ScriptedBackend::serving(&["2024-01-08"], 30.0).with_replies(
            "6488.TWO",
            vec![support::BackendReply::Frame(support::daily_frame(&[], 0.0))],
        ),
    );
    let registry = RegistryBuilder::new()
        .with_backend(SharedBackend::new(backend.clone()))
        .with_policy(ProviderPolicy::immediate())
        .with_only(&[ProviderId::Taiwan, ProviderId::Generic])
        .with_auxiliary(false)
        .build();

    // When: A secondary-venue symbol is fetched
    let outcome = registry
        .get_daily_data(&symbol("6488.TWO"), &query())
        .await
        .expect("generic provider answers");

    // Then: The domestic attempt is recorded as no data and the generic provider won
    assert_eq!(outcome.source_name, "GenericYahooProvider");
    assert_eq!(outcome.failures[0].error.kind(), "no_data");
    assert_eq!(backend.tickers(), vec!["6488.TWO", "6488.TWO"]);
}

#[tokio::test]
async fn when_a_name_is_requested_the_first_provider_that_knows_it_wins() {
    // Given: A backend that knows the US name only
    let backend = Arc::new(
        ScriptedBackend::serving(&["2024-01-08"], 10.0).with_name("BRK-B", "Berkshire Hathaway Inc."),
    );
    let registry = RegistryBuilder::new()
        .with_backend(SharedBackend::new(backend.clone()))
        .with_policy(ProviderPolicy::immediate())
        .with_auxiliary(false)
        .build();

    // When: Names are requested
    let known = registry.get_symbol_name(&symbol("BRK.B")).await;
    let unknown = registry.get_symbol_name(&symbol("2330")).await;

    // Then: The US lookup answers and an unknown name is absent rather than an error
    assert_eq!(known.as_deref(), Some("Berkshire Hathaway Inc."));
    assert_eq!(unknown, None);
}

#[tokio::test]
async fn when_a_symbol_has_an_unknown_shape_every_built_in_provider_declines_it() {
    // Given: The default providers over a backend that would answer anything
    let backend = Arc::new(ScriptedBackend::serving(&["2024-01-08"], 10.0));
    let registry = RegistryBuilder::new()
        .with_backend(SharedBackend::new(backend.clone()))
        .with_policy(ProviderPolicy::immediate())
        .with_auxiliary(false)
        .build();

    // When: A seven-digit code is fetched
    let error = registry
        .get_daily_data(&symbol("1234567"), &query())
        .await
        .expect_err("no provider serves it");

    // Then: Each provider reports the symbol as unsupported and nothing was downloaded
    let kinds: Vec<&str> = error
        .provider_failures()
        .iter()
        .map(|failure| failure.error.kind())
        .collect();
    assert_eq!(kinds, vec!["unsupported_symbol"; 3]);
    assert!(backend.requests().is_empty());
}
