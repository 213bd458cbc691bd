//! `MetricsCache` (spec §4.9, C8): process-local, best-effort rolling
//! counters for the HTTP read path. Not authoritative — rebuilt from
//! nothing on restart, same as the teacher's `TokenCache` is rebuilt from
//! nothing once tokens expire.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CounterKind {
    Total,
    Receivers,
    AppOpenedCounter,
}

impl CounterKind {
    fn as_str(self) -> &'static str {
        match self {
            CounterKind::Total => "total",
            CounterKind::Receivers => "receivers",
            CounterKind::AppOpenedCounter => "appOpenedCounter",
        }
    }
}

fn cache_key(app_id: &str, kind: CounterKind) -> String {
    format!("{app_id}:{}", kind.as_str())
}

/// `(appId + ":" + kind) -> integer` counters (spec §4.9).
pub struct MetricsCache {
    counters: RwLock<HashMap<String, Arc<AtomicI64>>>,
}

impl MetricsCache {
    pub fn new() -> Self {
        Self {
            counters: RwLock::new(HashMap::new()),
        }
    }

    async fn counter(&self, app_id: &str, kind: CounterKind) -> Arc<AtomicI64> {
        let key = cache_key(app_id, kind);
        if let Some(existing) = self.counters.read().await.get(&key) {
            return existing.clone();
        }
        let mut counters = self.counters.write().await;
        counters
            .entry(key)
            .or_insert_with(|| Arc::new(AtomicI64::new(0)))
            .clone()
    }

    pub async fn get(&self, app_id: &str, kind: CounterKind) -> i64 {
        self.counter(app_id, kind).await.load(Ordering::Relaxed)
    }

    pub async fn add(&self, app_id: &str, kind: CounterKind, delta: i64) {
        self.counter(app_id, kind).await.fetch_add(delta, Ordering::Relaxed);
    }

    /// Best-effort update hook for one genuinely new `VariantMetricInformation`
    /// arrival (§4.7 step 2, §4.9). `receivers_delta` is the count carried by
    /// *that* message, not the job's running total — the collector calls this
    /// exactly once per incoming metric, so `Total` and `Receivers` both
    /// advance by the message's own contribution. Spawns the async counter
    /// bump rather than blocking the collector on a cache write.
    pub fn record_update(self: &Arc<Self>, app_id: &str, receivers_delta: u64) {
        let cache = self.clone();
        let app_id = app_id.to_string();
        let receivers_delta = receivers_delta as i64;
        tokio::spawn(async move {
            cache.add(&app_id, CounterKind::Total, 1).await;
            cache.add(&app_id, CounterKind::Receivers, receivers_delta).await;
        });
    }

    pub async fn record_app_opened(&self, app_id: &str) {
        self.add(app_id, CounterKind::AppOpenedCounter, 1).await;
    }
}

impl Default for MetricsCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn record_update_increments_total_and_receivers() {
        let cache = Arc::new(MetricsCache::new());

        cache.record_update("app-1", 5);
        // record_update fires a detached task; give it a chance to run.
        tokio::task::yield_now().await;
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;

        assert_eq!(cache.get("app-1", CounterKind::Total).await, 1);
        assert_eq!(cache.get("app-1", CounterKind::Receivers).await, 5);
    }

    #[tokio::test]
    async fn record_update_accumulates_per_call_deltas_not_running_totals() {
        let cache = Arc::new(MetricsCache::new());

        cache.record_update("app-1", 3);
        cache.record_update("app-1", 4);
        tokio::task::yield_now().await;
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;

        assert_eq!(cache.get("app-1", CounterKind::Total).await, 2);
        assert_eq!(cache.get("app-1", CounterKind::Receivers).await, 7);
    }

    #[tokio::test]
    async fn app_opened_counter_is_independent_per_app() {
        let cache = MetricsCache::new();
        cache.record_app_opened("app-1").await;
        cache.record_app_opened("app-1").await;
        cache.record_app_opened("app-2").await;

        assert_eq!(cache.get("app-1", CounterKind::AppOpenedCounter).await, 2);
        assert_eq!(cache.get("app-2", CounterKind::AppOpenedCounter).await, 1);
    }
}
