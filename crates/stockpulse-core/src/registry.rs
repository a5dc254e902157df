//! Priority-ordered failover across daily-data providers.

use std::collections::HashSet;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Instant;

use serde::Serialize;
use time::Date;
use tracing::{debug, error, info, warn};

use crate::backend::SharedBackend;
use crate::domain::{NormalizedSeries, Symbol};
use crate::http_client::{HttpClient, ReqwestHttpClient};
use crate::institutional::{InstitutionalFlow, InstitutionalFlowClient};
use crate::policy::ProviderPolicy;
use crate::provider::{
    DailyQuery, DailySource, GenericYahooProvider, ProviderId, TaiwanStockProvider,
    UsStockProvider,
};
use crate::{DataError, ProviderFailure};

/// Successful registry fetch. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FetchOutcome {
    pub symbol: Symbol,
    pub series: NormalizedSeries,
    /// Name of the provider that answered.
    pub source_name: String,
    /// Failures of higher-priority providers tried first.
    pub failures: Vec<ProviderFailure>,
    pub latency_ms: u64,
}

type ProviderList = Arc<Vec<Arc<dyn DailySource>>>;

/// Providers sorted by ascending priority, registration order breaking ties.
///
/// Iteration works on a snapshot of the list, so [`ProviderRegistry::add_provider`]
/// never races a fetch in progress.
pub struct ProviderRegistry {
    providers: RwLock<ProviderList>,
    auxiliary: Option<InstitutionalFlowClient>,
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("providers", &self.provider_names())
            .field("auxiliary", &self.auxiliary.is_some())
            .finish()
    }
}

impl ProviderRegistry {
    pub fn new(providers: Vec<Arc<dyn DailySource>>) -> Self {
        let mut providers = providers;
        // Stable: equal priorities keep registration order.
        providers.sort_by_key(|provider| provider.priority());

        info!(
            providers = ?providers.iter().map(|provider| provider.name()).collect::<Vec<_>>(),
            "provider registry initialized"
        );

        Self {
            providers: RwLock::new(Arc::new(providers)),
            auxiliary: None,
        }
    }

    pub fn with_auxiliary(mut self, client: InstitutionalFlowClient) -> Self {
        self.auxiliary = Some(client);
        self
    }

    /// Registers a provider and re-sorts. Fetches already running keep their snapshot.
    pub fn add_provider(&self, provider: Arc<dyn DailySource>) {
        let mut guard = self.providers.write().unwrap_or_else(PoisonError::into_inner);
        let mut next = guard.as_ref().clone();
        next.push(provider);
        next.sort_by_key(|provider| provider.priority());
        *guard = Arc::new(next);
    }

    pub fn provider_names(&self) -> Vec<&'static str> {
        self.snapshot().iter().map(|provider| provider.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshot().is_empty()
    }

    fn snapshot(&self) -> ProviderList {
        self.providers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Tries each provider in priority order and returns the first non-empty series.
    ///
    /// Fails with [`DataError::AllProvidersFailed`] carrying every provider's error.
    pub async fn get_daily_data(
        &self,
        symbol: &Symbol,
        query: &DailyQuery,
    ) -> Result<FetchOutcome, DataError> {
        let started = Instant::now();
        let providers = self.snapshot();
        let mut failures = Vec::with_capacity(providers.len());

        for provider in providers.iter() {
            debug!(provider = provider.name(), symbol = %symbol, "trying provider");
            match provider.get_daily_data(symbol, query).await {
                Ok(series) if !series.is_empty() => {
                    if !failures.is_empty() {
                        info!(
                            provider = provider.name(),
                            symbol = %symbol,
                            failed = failures.len(),
                            "provider fallback succeeded"
                        );
                    }
                    return Ok(FetchOutcome {
                        symbol: series.symbol().clone(),
                        series,
                        source_name: provider.name().to_owned(),
                        failures,
                        latency_ms: elapsed_ms(started),
                    });
                }
                Ok(_) => failures.push(ProviderFailure {
                    provider: provider.name().to_owned(),
                    error: DataError::NoData {
                        provider: provider.name().to_owned(),
                        symbol: symbol.to_string(),
                    },
                }),
                Err(error) => {
                    if matches!(error, DataError::UnsupportedSymbol { .. }) {
                        debug!(provider = provider.name(), symbol = %symbol, "provider skipped symbol");
                    } else {
                        warn!(provider = provider.name(), symbol = %symbol, error = %error, "provider failed");
                    }
                    failures.push(ProviderFailure {
                        provider: provider.name().to_owned(),
                        error,
                    });
                }
            }
        }

        let error = DataError::AllProvidersFailed {
            symbol: symbol.to_string(),
            failures,
        };
        error!(symbol = %symbol, error = %error, "all providers failed");
        Err(error)
    }

    /// First non-empty name any provider reports.
    pub async fn get_symbol_name(&self, symbol: &Symbol) -> Option<String> {
        for provider in self.snapshot().iter() {
            if let Some(name) = provider.symbol_name(symbol).await {
                let name = name.trim();
                if !name.is_empty() {
                    return Some(name.to_owned());
                }
            }
        }
        None
    }

    /// Supplementary institutional flow. Never an error: missing data is `None`.
    pub async fn get_auxiliary_data(
        &self,
        symbol: &Symbol,
        date: Option<Date>,
    ) -> Option<InstitutionalFlow> {
        match &self.auxiliary {
            Some(client) => client.get(symbol, date).await,
            None => None,
        }
    }
}

/// Builds a registry of the built-in providers over one shared backend.
#[derive(Default)]
pub struct RegistryBuilder {
    http_client: Option<Arc<dyn HttpClient>>,
    backend: Option<SharedBackend>,
    policy: ProviderPolicy,
    disabled: HashSet<ProviderId>,
    auxiliary: bool,
    utc_offset_hours: Option<i8>,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self {
            auxiliary: true,
            ..Self::default()
        }
    }

    pub fn with_http_client(mut self, http_client: Arc<dyn HttpClient>) -> Self {
        self.http_client = Some(http_client);
        self
    }

    /// Overrides the market backend. Defaults to Yahoo over the configured HTTP client.
    pub fn with_backend(mut self, backend: SharedBackend) -> Self {
        self.backend = Some(backend);
        self
    }

    pub fn with_policy(mut self, policy: ProviderPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_provider_enabled(mut self, provider: ProviderId, enabled: bool) -> Self {
        if enabled {
            self.disabled.remove(&provider);
        } else {
            self.disabled.insert(provider);
        }
        self
    }

    /// Enables exactly the listed providers.
    pub fn with_only(mut self, providers: &[ProviderId]) -> Self {
        self.disabled = ProviderId::ALL
            .into_iter()
            .filter(|id| !providers.contains(id))
            .collect();
        self
    }

    pub fn with_auxiliary(mut self, enabled: bool) -> Self {
        self.auxiliary = enabled;
        self
    }

    pub fn with_utc_offset(mut self, utc_offset_hours: i8) -> Self {
        self.utc_offset_hours = Some(utc_offset_hours);
        self
    }

    pub fn build(self) -> ProviderRegistry {
        let http_client = self
            .http_client
            .unwrap_or_else(|| Arc::new(ReqwestHttpClient::new()));
        let backend = self.backend.unwrap_or_else(|| {
            SharedBackend::yahoo(http_client.clone(), self.policy.request_timeout_ms())
        });

        let mut providers: Vec<Arc<dyn DailySource>> = Vec::new();
        for id in ProviderId::ALL {
            if self.disabled.contains(&id) {
                continue;
            }
            providers.push(match id {
                ProviderId::Taiwan => Arc::new(TaiwanStockProvider::new(backend.clone(), &self.policy)),
                ProviderId::Us => Arc::new(UsStockProvider::new(backend.clone(), &self.policy)),
                ProviderId::Generic => {
                    Arc::new(GenericYahooProvider::new(backend.clone(), &self.policy))
                }
            });
        }

        let registry = ProviderRegistry::new(providers);
        if !self.auxiliary {
            return registry;
        }

        let mut client = InstitutionalFlowClient::new(http_client, &self.policy);
        if let Some(offset) = self.utc_offset_hours {
            client = client.with_utc_offset(offset);
        }
        registry.with_auxiliary(client)
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis().min(u128::from(u64::MAX)) as u64
}
