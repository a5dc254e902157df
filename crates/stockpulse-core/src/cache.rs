//! Process-lifetime cache for institutional flow records.

use std::collections::HashMap;
use std::sync::Arc;

use time::Date;

use crate::institutional::InstitutionalFlow;

type FlowKey = (Date, String);

#[derive(Debug, Default)]
struct FlowCacheInner {
    map: HashMap<FlowKey, InstitutionalFlow>,
    hits: u64,
}

/// Shared `(date, stock code)` → record map.
///
/// Entries never expire: the pipeline runs once per day per process. Clones share the
/// same map.
#[derive(Debug, Clone, Default)]
pub struct FlowCache {
    inner: Arc<tokio::sync::RwLock<FlowCacheInner>>,
}

impl FlowCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, date: Date, code: &str) -> Option<InstitutionalFlow> {
        let found = {
            let store = self.inner.read().await;
            store.map.get(&(date, code.to_owned())).cloned()
        };
        if found.is_some() {
            self.inner.write().await.hits += 1;
        }
        found
    }

    pub async fn put(&self, date: Date, code: impl Into<String>, flow: InstitutionalFlow) {
        let mut store = self.inner.write().await;
        store.map.insert((date, code.into()), flow);
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.map.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Lookups answered from the cache so far.
    pub async fn hits(&self) -> u64 {
        self.inner.read().await.hits
    }

    pub async fn clear(&self) {
        let mut store = self.inner.write().await;
        store.map.clear();
        store.hits = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::Month;

    fn flow(code: &str, date: Date, total_net: i64) -> InstitutionalFlow {
        InstitutionalFlow {
            date,
            stock_code: code.to_owned(),
            stock_name: String::from("test"),
            foreign_net: total_net,
            trust_net: 0,
            dealer_net: 0,
            total_net,
        }
    }

    #[tokio::test]
    async fn entries_are_keyed_by_date_and_code() {
        let cache = FlowCache::new();
        let monday = Date::from_calendar_date(2024, Month::January, 8).expect("valid date");
        let tuesday = monday.next_day().expect("valid date");

        cache.put(monday, "2330", flow("2330", monday, 5)).await;

        assert_eq!(cache.get(monday, "2330").await.map(|f| f.total_net), Some(5));
        assert!(cache.get(tuesday, "2330").await.is_none());
        assert!(cache.get(monday, "2317").await.is_none());
        assert_eq!(cache.hits().await, 1);
    }

    #[tokio::test]
    async fn clones_share_entries() {
        let cache = FlowCache::new();
        let shared = cache.clone();
        let day = Date::from_calendar_date(2024, Month::January, 8).expect("valid date");

        shared.put(day, "4956", flow("4956", day, -3)).await;

        assert_eq!(cache.len().await, 1);
        cache.clear().await;
        assert!(shared.is_empty().await);
    }
}
