//! Per-provider call/cost accounting and probabilistic throttling.
//!
//! Counters live behind the injected [`CounterStore`] so that multiple
//! processes serving the same billing quota share one atomic count — an
//! in-process counter undercounts under multi-instance deployment. Keys
//! are bucketed per provider by day and by month.
//!
//! Admission is probabilistic rather than a hard cutoff: once monthly
//! usage crosses the 80% high-water mark, roughly half of further calls
//! are shed at random, spreading the remaining quota across the rest of
//! the billing period instead of failing abruptly at 100%.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use rand::Rng as _;

use crate::StoreError;

/// Monthly usage fraction above which calls are shed probabilistically.
const THROTTLE_THRESHOLD_PERCENT: f64 = 80.0;

/// Admission probability while throttled.
const THROTTLE_ADMIT_PROBABILITY: f64 = 0.5;

/// Shared atomic counter store.
///
/// Implementations must make `increment` atomic across concurrent
/// callers (and across processes for shared deployments, e.g. a Redis
/// `INCRBYFLOAT` or a database upsert).
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Atomically adds `by` to the counter and returns the new value.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the underlying store fails.
    async fn increment(&self, key: &str, by: f64) -> Result<f64, StoreError>;

    /// Reads the current counter value (0 if never incremented).
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the underlying store fails.
    async fn get(&self, key: &str) -> Result<f64, StoreError>;
}

/// In-memory counter store for tests and single-process deployments.
#[derive(Debug, Default)]
pub struct InMemoryCounterStore {
    counters: Mutex<BTreeMap<String, f64>>,
}

impl InMemoryCounterStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CounterStore for InMemoryCounterStore {
    async fn increment(&self, key: &str, by: f64) -> Result<f64, StoreError> {
        let mut counters = self
            .counters
            .lock()
            .map_err(|_| StoreError::new("counter store mutex poisoned"))?;
        let value = counters.entry(key.to_string()).or_insert(0.0);
        *value += by;
        Ok(*value)
    }

    async fn get(&self, key: &str) -> Result<f64, StoreError> {
        let counters = self
            .counters
            .lock()
            .map_err(|_| StoreError::new("counter store mutex poisoned"))?;
        Ok(counters.get(key).copied().unwrap_or(0.0))
    }
}

/// Per-provider quota configuration.
#[derive(Debug, Clone, Copy, Default)]
pub struct QuotaLimits {
    /// Monthly call quota; `None` means unlimited (never throttled).
    pub monthly_quota: Option<u64>,
    /// Accounted cost per call in USD.
    pub cost_per_call_usd: f64,
}

/// Current usage snapshot for one provider, exposed for alerting.
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuotaUsage {
    /// Provider name.
    pub provider: String,
    /// Calls recorded today.
    pub daily_calls: u64,
    /// Calls recorded this month.
    pub monthly_calls: u64,
    /// Configured monthly quota, if any.
    pub monthly_quota: Option<u64>,
    /// Accumulated cost this month in USD.
    pub monthly_cost_usd: f64,
    /// Monthly usage as a percentage of the quota (0 when unlimited).
    pub usage_percent: f64,
    /// Whether calls are currently shed probabilistically.
    pub throttled: bool,
}

/// Tracks per-provider usage and performs pre-flight admission.
pub struct QuotaManager {
    store: Arc<dyn CounterStore>,
    limits: BTreeMap<String, QuotaLimits>,
}

impl QuotaManager {
    /// Creates a manager over the injected counter store.
    #[must_use]
    pub fn new(store: Arc<dyn CounterStore>, limits: BTreeMap<String, QuotaLimits>) -> Self {
        Self {
            store,
            limits,
        }
    }

    /// Records one call against the provider's daily and monthly buckets
    /// and accumulates its cost.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the counter store fails.
    pub async fn record_call(&self, provider: &str) -> Result<(), StoreError> {
        self.record_calls(provider, 1).await
    }

    /// Records `calls` billable requests at once. Retried attempts
    /// within one logical call are each billable, so callers report the
    /// actual request count rather than one per logical call.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the counter store fails.
    pub async fn record_calls(&self, provider: &str, calls: u64) -> Result<(), StoreError> {
        if calls == 0 {
            return Ok(());
        }
        #[allow(clippy::cast_precision_loss)]
        let count = calls as f64;
        let cost = self
            .limits
            .get(provider)
            .map_or(0.0, |l| l.cost_per_call_usd)
            * count;

        self.store
            .increment(&calls_key(provider, &day_bucket()), count)
            .await?;
        self.store
            .increment(&calls_key(provider, &month_bucket()), count)
            .await?;
        if cost > 0.0 {
            self.store
                .increment(&cost_key(provider, &month_bucket()), cost)
                .await?;
        }
        Ok(())
    }

    /// Current usage snapshot for a provider.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the counter store fails.
    pub async fn usage(&self, provider: &str) -> Result<QuotaUsage, StoreError> {
        let daily = self.store.get(&calls_key(provider, &day_bucket())).await?;
        let monthly = self.store.get(&calls_key(provider, &month_bucket())).await?;
        let cost = self.store.get(&cost_key(provider, &month_bucket())).await?;

        let monthly_quota = self.limits.get(provider).and_then(|l| l.monthly_quota);
        #[allow(clippy::cast_precision_loss)]
        let usage_percent = monthly_quota.map_or(0.0, |quota| {
            if quota == 0 {
                100.0
            } else {
                monthly / quota as f64 * 100.0
            }
        });

        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        Ok(QuotaUsage {
            provider: provider.to_string(),
            daily_calls: daily.max(0.0) as u64,
            monthly_calls: monthly.max(0.0) as u64,
            monthly_quota,
            monthly_cost_usd: cost,
            usage_percent,
            throttled: usage_percent >= THROTTLE_THRESHOLD_PERCENT,
        })
    }

    /// Usage snapshots for every provider with configured limits.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the counter store fails.
    pub async fn usage_all(&self) -> Result<Vec<QuotaUsage>, StoreError> {
        let mut snapshots = Vec::with_capacity(self.limits.len());
        for provider in self.limits.keys() {
            snapshots.push(self.usage(provider).await?);
        }
        Ok(snapshots)
    }

    /// Pre-flight admission for one call.
    ///
    /// Below the high-water mark every call is admitted. At or above it
    /// the call is admitted with probability 0.5, so the remaining quota
    /// stretches over the rest of the billing period.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the counter store fails.
    pub async fn admit(&self, provider: &str) -> Result<bool, StoreError> {
        let usage = self.usage(provider).await?;
        if !usage.throttled {
            return Ok(true);
        }

        let admitted = rand::rng().random_bool(THROTTLE_ADMIT_PROBABILITY);
        if !admitted {
            log::warn!(
                "{provider}: call shed (monthly usage {:.1}% >= {THROTTLE_THRESHOLD_PERCENT}%)",
                usage.usage_percent
            );
        }
        Ok(admitted)
    }
}

fn day_bucket() -> String {
    Utc::now().format("%Y-%m-%d").to_string()
}

fn month_bucket() -> String {
    Utc::now().format("%Y-%m").to_string()
}

fn calls_key(provider: &str, bucket: &str) -> String {
    format!("quota:{provider}:calls:{bucket}")
}

fn cost_key(provider: &str, bucket: &str) -> String {
    format!("quota:{provider}:cost:{bucket}")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager(quota: Option<u64>, cost: f64) -> QuotaManager {
        let mut limits = BTreeMap::new();
        limits.insert(
            "osrm".to_string(),
            QuotaLimits {
                monthly_quota: quota,
                cost_per_call_usd: cost,
            },
        );
        QuotaManager::new(Arc::new(InMemoryCounterStore::new()), limits)
    }

    async fn record_n(manager: &QuotaManager, n: u64) {
        for _ in 0..n {
            manager.record_call("osrm").await.unwrap();
        }
    }

    #[tokio::test]
    async fn counts_calls_and_cost() {
        let manager = manager(Some(1000), 0.005);
        record_n(&manager, 3).await;

        let usage = manager.usage("osrm").await.unwrap();
        assert_eq!(usage.daily_calls, 3);
        assert_eq!(usage.monthly_calls, 3);
        assert!((usage.monthly_cost_usd - 0.015).abs() < 1e-9);
        assert!(!usage.throttled);
    }

    #[tokio::test]
    async fn bulk_recording_counts_every_request() {
        let manager = manager(Some(1000), 0.005);
        manager.record_calls("osrm", 3).await.unwrap();

        let usage = manager.usage("osrm").await.unwrap();
        assert_eq!(usage.daily_calls, 3);
        assert_eq!(usage.monthly_calls, 3);
        assert!((usage.monthly_cost_usd - 0.015).abs() < 1e-9);
    }

    #[tokio::test]
    async fn throttles_at_exactly_eighty_percent() {
        let manager = manager(Some(1000), 0.0);
        record_n(&manager, 800).await;

        let usage = manager.usage("osrm").await.unwrap();
        assert!((usage.usage_percent - 80.0).abs() < 1e-9);
        assert!(usage.throttled);
    }

    #[tokio::test]
    async fn does_not_throttle_just_below_the_mark() {
        let manager = manager(Some(1000), 0.0);
        record_n(&manager, 799).await;

        let usage = manager.usage("osrm").await.unwrap();
        assert!((usage.usage_percent - 79.9).abs() < 1e-9);
        assert!(!usage.throttled);
        assert!(manager.admit("osrm").await.unwrap());
    }

    #[tokio::test]
    async fn unlimited_providers_are_never_throttled() {
        let manager = manager(None, 0.0);
        record_n(&manager, 10_000).await;

        let usage = manager.usage("osrm").await.unwrap();
        assert!(!usage.throttled);
        assert!(manager.admit("osrm").await.unwrap());
    }

    #[tokio::test]
    async fn throttled_admission_is_probabilistic() {
        let manager = manager(Some(100), 0.0);
        record_n(&manager, 90).await;

        let mut admitted = 0u32;
        let mut shed = 0u32;
        for _ in 0..200 {
            if manager.admit("osrm").await.unwrap() {
                admitted += 1;
            } else {
                shed += 1;
            }
        }
        // With p=0.5 over 200 trials, both outcomes occur in practice.
        assert!(admitted > 0, "no calls admitted while throttled");
        assert!(shed > 0, "no calls shed while throttled");
    }

    #[tokio::test]
    async fn unknown_provider_has_no_quota() {
        let manager = manager(Some(10), 0.0);
        let usage = manager.usage("mystery").await.unwrap();
        assert_eq!(usage.monthly_quota, None);
        assert!(!usage.throttled);
        assert!(manager.admit("mystery").await.unwrap());
    }
}
