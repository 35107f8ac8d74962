//! Provider fallback orchestration.
//!
//! [`ResilientRouter`] owns the ordered provider chain and sequences
//! every contract call through it: quota admission first, then the
//! retry policy against one provider, then the next provider in line.
//! The last provider that answered successfully is remembered and tried
//! first on subsequent calls, so a healthy fallback keeps serving
//! traffic instead of re-probing a dead primary on every request.
//!
//! Two error kinds break the chain early: a definitive "no route
//! exists" answer is trusted from any provider, and store failures are
//! surfaced rather than masked. Everything else moves on to the next
//! provider.

use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use saferoute_geo::Coordinates;
use saferoute_routing_models::{
    GeocodedAddress, ProviderError, Route, RouteOptions, TrafficData,
};

use crate::cache::GeocodeCache;
use crate::quota::{QuotaManager, QuotaUsage};
use crate::retry::RetryPolicy;
use crate::{RouteProvider, RoutingError};

/// Sequences an ordered provider chain with quota admission, bounded
/// retry, and geocode caching.
pub struct ResilientRouter {
    providers: Vec<Arc<dyn RouteProvider>>,
    quota: QuotaManager,
    retry: RetryPolicy,
    cache: GeocodeCache,
    preferred: Mutex<Option<String>>,
}

impl ResilientRouter {
    /// Creates a router over providers in fallback order.
    #[must_use]
    pub fn new(
        providers: Vec<Arc<dyn RouteProvider>>,
        quota: QuotaManager,
        cache: GeocodeCache,
    ) -> Self {
        Self {
            providers,
            quota,
            retry: RetryPolicy::default(),
            cache,
            preferred: Mutex::new(None),
        }
    }

    /// Replaces the per-provider retry policy.
    #[must_use]
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// The provider currently tried first, if any call has succeeded.
    #[must_use]
    pub fn preferred_provider(&self) -> Option<String> {
        self.preferred.lock().ok().and_then(|p| p.clone())
    }

    /// Clears the sticky preference so the configured order applies
    /// again.
    pub fn reset_preferred(&self) {
        if let Ok(mut preferred) = self.preferred.lock() {
            *preferred = None;
        }
    }

    /// Calculates a single route through the fallback chain.
    ///
    /// # Errors
    ///
    /// Returns [`RoutingError::NoRouteFound`] as soon as any provider
    /// answers definitively, or [`RoutingError::AllProvidersFailed`]
    /// once the chain is exhausted.
    pub async fn calculate_route(
        &self,
        origin: Coordinates,
        destination: Coordinates,
        options: RouteOptions,
    ) -> Result<Route, RoutingError> {
        self.with_fallback("calculate_route", |provider| async move {
            provider.calculate_route(origin, destination, options).await
        })
        .await
    }

    /// Calculates up to `count` alternative routes through the chain.
    ///
    /// # Errors
    ///
    /// Same taxonomy as [`Self::calculate_route`].
    pub async fn calculate_alternative_routes(
        &self,
        origin: Coordinates,
        destination: Coordinates,
        count: usize,
        options: RouteOptions,
    ) -> Result<Vec<Route>, RoutingError> {
        self.with_fallback("calculate_alternative_routes", |provider| async move {
            provider
                .calculate_alternative_routes(origin, destination, count, options)
                .await
        })
        .await
    }

    /// Geocodes an address, serving from cache when possible and from
    /// the long-lived fallback tier when every live provider fails.
    ///
    /// # Errors
    ///
    /// Returns the chain's terminal error only when the fallback cache
    /// tier has no entry either.
    pub async fn geocode(&self, address: &str) -> Result<Vec<GeocodedAddress>, RoutingError> {
        if let Some(hit) = self.cache.geocode_hit(address).await? {
            return Ok(hit);
        }

        let outcome = self
            .with_fallback("geocode", |provider| async move {
                provider.geocode(address).await
            })
            .await;

        match outcome {
            Ok(results) => {
                self.cache.store_geocode(address, &results).await?;
                Ok(results)
            }
            Err(e @ (RoutingError::AllProvidersFailed { .. } | RoutingError::QuotaThrottled)) => {
                match self.cache.geocode_fallback(address).await? {
                    Some(stale) => {
                        log::warn!("Serving stale geocode for '{address}' after provider outage");
                        Ok(stale)
                    }
                    None => Err(e),
                }
            }
            Err(e) => Err(e),
        }
    }

    /// Reverse-geocodes coordinates with the same cache tiering as
    /// [`Self::geocode`].
    ///
    /// # Errors
    ///
    /// Returns the chain's terminal error only when the fallback cache
    /// tier has no entry either.
    pub async fn reverse_geocode(
        &self,
        coords: Coordinates,
    ) -> Result<GeocodedAddress, RoutingError> {
        if let Some(hit) = self.cache.reverse_hit(coords).await? {
            if let Some(first) = hit.into_iter().next() {
                return Ok(first);
            }
        }

        let outcome = self
            .with_fallback("reverse_geocode", |provider| async move {
                provider.reverse_geocode(coords).await
            })
            .await;

        match outcome {
            Ok(result) => {
                self.cache.store_reverse(coords, &result).await?;
                Ok(result)
            }
            Err(e @ (RoutingError::AllProvidersFailed { .. } | RoutingError::QuotaThrottled)) => {
                match self
                    .cache
                    .reverse_fallback(coords)
                    .await?
                    .and_then(|results| results.into_iter().next())
                {
                    Some(stale) => {
                        log::warn!("Serving stale reverse geocode after provider outage");
                        Ok(stale)
                    }
                    None => Err(e),
                }
            }
            Err(e) => Err(e),
        }
    }

    /// Live vs. typical travel time for a route, through the chain.
    ///
    /// # Errors
    ///
    /// Same taxonomy as [`Self::calculate_route`].
    pub async fn traffic_data(&self, route: &Route) -> Result<TrafficData, RoutingError> {
        self.with_fallback("traffic_data", |provider| async move {
            provider.traffic_data(route).await
        })
        .await
    }

    /// Usage snapshots for every quota-managed provider.
    ///
    /// # Errors
    ///
    /// Returns [`RoutingError::Store`] if the counter store fails.
    pub async fn quota_usage(&self) -> Result<Vec<QuotaUsage>, RoutingError> {
        Ok(self.quota.usage_all().await?)
    }

    /// Runs `f` against each provider in preference order until one
    /// succeeds. Each provider is visited at most once per call.
    async fn with_fallback<T, F, Fut>(&self, op_name: &str, f: F) -> Result<T, RoutingError>
    where
        F: Fn(Arc<dyn RouteProvider>) -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        let order = self.provider_order();
        if order.is_empty() {
            return Err(RoutingError::NoProvidersConfigured);
        }

        let mut last: Option<ProviderError> = None;
        let mut shed = 0usize;

        for provider in order {
            let name = provider.name().to_string();

            if !self.quota.admit(&name).await? {
                shed += 1;
                continue;
            }

            // Every retry attempt is a billable request; count them
            // individually rather than one per logical call.
            let attempts = AtomicU32::new(0);
            let outcome = self
                .retry
                .run(op_name, || {
                    attempts.fetch_add(1, Ordering::SeqCst);
                    f(Arc::clone(&provider))
                })
                .await;
            self.quota
                .record_calls(&name, u64::from(attempts.load(Ordering::SeqCst)))
                .await?;

            match outcome {
                Ok(value) => {
                    self.remember_preferred(&name);
                    return Ok(value);
                }
                // Any provider's definitive answer is trusted.
                Err(ProviderError::NoRouteFound) => return Err(RoutingError::NoRouteFound),
                Err(e) => {
                    log::warn!("{op_name} via {name} failed: {e}");
                    last = Some(e);
                }
            }
        }

        match last {
            Some(last) => Err(RoutingError::AllProvidersFailed { last }),
            None if shed > 0 => Err(RoutingError::QuotaThrottled),
            None => Err(RoutingError::NoProvidersConfigured),
        }
    }

    /// Configured order with the sticky preferred provider moved to the
    /// front.
    fn provider_order(&self) -> Vec<Arc<dyn RouteProvider>> {
        let preferred = self.preferred_provider();
        let mut order: Vec<Arc<dyn RouteProvider>> = Vec::with_capacity(self.providers.len());
        if let Some(ref name) = preferred {
            if let Some(p) = self.providers.iter().find(|p| p.name() == name) {
                order.push(Arc::clone(p));
            }
        }
        for provider in &self.providers {
            if preferred.as_deref() != Some(provider.name()) {
                order.push(Arc::clone(provider));
            }
        }
        order
    }

    fn remember_preferred(&self, name: &str) {
        if let Ok(mut preferred) = self.preferred.lock() {
            if preferred.as_deref() != Some(name) {
                log::info!("Preferred routing provider is now '{name}'");
                *preferred = Some(name.to_string());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicU32, Ordering};

    use async_trait::async_trait;

    use crate::cache::InMemoryCacheStore;
    use crate::quota::{InMemoryCounterStore, QuotaLimits};

    #[derive(Clone, Copy)]
    enum Behavior {
        Succeed,
        NoRoute,
        RateLimited,
        AuthFailed,
    }

    struct FakeProvider {
        name: &'static str,
        behavior: Behavior,
        calls: AtomicU32,
    }

    impl FakeProvider {
        fn new(name: &'static str, behavior: Behavior) -> Arc<Self> {
            Arc::new(Self {
                name,
                behavior,
                calls: AtomicU32::new(0),
            })
        }

        fn call_count(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }

        fn outcome<T>(&self, value: T) -> Result<T, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.behavior {
                Behavior::Succeed => Ok(value),
                Behavior::NoRoute => Err(ProviderError::NoRouteFound),
                Behavior::RateLimited => Err(ProviderError::RateLimited {
                    provider: self.name.to_string(),
                }),
                Behavior::AuthFailed => Err(ProviderError::AuthenticationFailed {
                    provider: self.name.to_string(),
                }),
            }
        }

        fn route(&self) -> Route {
            Route {
                id: format!("{}-route", self.name),
                origin: Coordinates::new(41.88, -87.63),
                destination: Coordinates::new(41.89, -87.64),
                waypoints: Vec::new(),
                distance_m: 1000.0,
                duration_s: 120.0,
                encoded_path: String::new(),
                provider: self.name.to_string(),
            }
        }

        fn address(&self) -> GeocodedAddress {
            GeocodedAddress {
                latitude: 41.88,
                longitude: -87.63,
                formatted: format!("{} result", self.name),
                provider: self.name.to_string(),
            }
        }
    }

    #[async_trait]
    impl RouteProvider for FakeProvider {
        fn name(&self) -> &str {
            self.name
        }

        async fn calculate_route(
            &self,
            _origin: Coordinates,
            _destination: Coordinates,
            _options: RouteOptions,
        ) -> Result<Route, ProviderError> {
            self.outcome(self.route())
        }

        async fn calculate_alternative_routes(
            &self,
            _origin: Coordinates,
            _destination: Coordinates,
            _count: usize,
            _options: RouteOptions,
        ) -> Result<Vec<Route>, ProviderError> {
            self.outcome(vec![self.route()])
        }

        async fn geocode(&self, _address: &str) -> Result<Vec<GeocodedAddress>, ProviderError> {
            self.outcome(vec![self.address()])
        }

        async fn reverse_geocode(
            &self,
            _coords: Coordinates,
        ) -> Result<GeocodedAddress, ProviderError> {
            self.outcome(self.address())
        }

        async fn traffic_data(&self, route: &Route) -> Result<TrafficData, ProviderError> {
            self.outcome(TrafficData {
                current_duration_s: route.duration_s,
                typical_duration_s: route.duration_s,
            })
        }

        async fn is_available(&self) -> bool {
            true
        }
    }

    fn chain(providers: &[&Arc<FakeProvider>]) -> Vec<Arc<dyn RouteProvider>> {
        providers
            .iter()
            .map(|p| Arc::clone(p) as Arc<dyn RouteProvider>)
            .collect()
    }

    fn router(providers: Vec<Arc<dyn RouteProvider>>) -> ResilientRouter {
        let quota = QuotaManager::new(Arc::new(InMemoryCounterStore::new()), BTreeMap::new());
        let cache = GeocodeCache::new(Arc::new(InMemoryCacheStore::new()));
        ResilientRouter::new(providers, quota, cache)
            .with_retry_policy(RetryPolicy::immediate(1))
    }

    fn points() -> (Coordinates, Coordinates) {
        (
            Coordinates::new(41.88, -87.63),
            Coordinates::new(41.89, -87.64),
        )
    }

    #[tokio::test]
    async fn first_healthy_provider_serves_the_call() {
        let primary = FakeProvider::new("primary", Behavior::Succeed);
        let backup = FakeProvider::new("backup", Behavior::Succeed);
        let router = router(chain(&[&primary, &backup]));
        let (origin, destination) = points();

        let route = router
            .calculate_route(origin, destination, RouteOptions::default())
            .await
            .unwrap();

        assert_eq!(route.provider, "primary");
        assert_eq!(primary.call_count(), 1);
        assert_eq!(backup.call_count(), 0);
    }

    #[tokio::test]
    async fn rate_limited_primary_falls_through_and_backup_becomes_preferred() {
        let primary = FakeProvider::new("primary", Behavior::RateLimited);
        let backup = FakeProvider::new("backup", Behavior::Succeed);
        let router = router(chain(&[&primary, &backup]));
        let (origin, destination) = points();

        let route = router
            .calculate_route(origin, destination, RouteOptions::default())
            .await
            .unwrap();
        assert_eq!(route.provider, "backup");
        assert_eq!(primary.call_count(), 1);
        assert_eq!(router.preferred_provider().as_deref(), Some("backup"));

        // The next call goes straight to the backup.
        router
            .calculate_route(origin, destination, RouteOptions::default())
            .await
            .unwrap();
        assert_eq!(backup.call_count(), 2);
        assert_eq!(primary.call_count(), 1);
    }

    #[tokio::test]
    async fn auth_failure_moves_to_the_next_provider() {
        let primary = FakeProvider::new("primary", Behavior::AuthFailed);
        let backup = FakeProvider::new("backup", Behavior::Succeed);
        let router = router(chain(&[&primary, &backup]));
        let (origin, destination) = points();

        let route = router
            .calculate_route(origin, destination, RouteOptions::default())
            .await
            .unwrap();
        assert_eq!(route.provider, "backup");
        assert_eq!(primary.call_count(), 1);
    }

    #[tokio::test]
    async fn no_route_found_is_trusted_and_stops_the_chain() {
        let primary = FakeProvider::new("primary", Behavior::NoRoute);
        let backup = FakeProvider::new("backup", Behavior::Succeed);
        let router = router(chain(&[&primary, &backup]));
        let (origin, destination) = points();

        let result = router
            .calculate_route(origin, destination, RouteOptions::default())
            .await;
        assert!(matches!(result, Err(RoutingError::NoRouteFound)));
        assert_eq!(backup.call_count(), 0);
    }

    #[tokio::test]
    async fn exhausted_chain_reports_the_last_error() {
        let primary = FakeProvider::new("primary", Behavior::RateLimited);
        let backup = FakeProvider::new("backup", Behavior::AuthFailed);
        let router = router(chain(&[&primary, &backup]));
        let (origin, destination) = points();

        let result = router
            .calculate_route(origin, destination, RouteOptions::default())
            .await;
        assert!(matches!(
            result,
            Err(RoutingError::AllProvidersFailed {
                last: ProviderError::AuthenticationFailed { .. }
            })
        ));
    }

    #[tokio::test]
    async fn empty_chain_is_a_configuration_error() {
        let router = router(Vec::new());
        let (origin, destination) = points();

        let result = router
            .calculate_route(origin, destination, RouteOptions::default())
            .await;
        assert!(matches!(result, Err(RoutingError::NoProvidersConfigured)));
    }

    #[tokio::test]
    async fn reset_preferred_restores_the_configured_order() {
        let primary = FakeProvider::new("primary", Behavior::Succeed);
        let backup = FakeProvider::new("backup", Behavior::Succeed);
        let router = router(chain(&[&primary, &backup]));
        let (origin, destination) = points();

        router
            .calculate_route(origin, destination, RouteOptions::default())
            .await
            .unwrap();
        assert_eq!(router.preferred_provider().as_deref(), Some("primary"));

        router.reset_preferred();
        assert!(router.preferred_provider().is_none());
    }

    #[tokio::test]
    async fn every_retry_attempt_is_billed_against_quota() {
        let primary = FakeProvider::new("primary", Behavior::RateLimited);
        let mut limits = BTreeMap::new();
        limits.insert(
            "primary".to_string(),
            QuotaLimits {
                monthly_quota: Some(1000),
                cost_per_call_usd: 0.01,
            },
        );
        let quota = QuotaManager::new(Arc::new(InMemoryCounterStore::new()), limits);
        let cache = GeocodeCache::new(Arc::new(InMemoryCacheStore::new()));
        let router = ResilientRouter::new(chain(&[&primary]), quota, cache)
            .with_retry_policy(RetryPolicy::immediate(3));
        let (origin, destination) = points();

        let result = router
            .calculate_route(origin, destination, RouteOptions::default())
            .await;
        assert!(result.is_err());

        // Three HTTP requests went out, so three calls are billed.
        assert_eq!(primary.call_count(), 3);
        let usage = router.quota_usage().await.unwrap();
        assert_eq!(usage[0].monthly_calls, 3);
        assert!((usage[0].monthly_cost_usd - 0.03).abs() < 1e-9);
    }

    #[tokio::test]
    async fn geocode_hits_the_cache_on_repeat_lookups() {
        let provider = FakeProvider::new("primary", Behavior::Succeed);
        let router = router(chain(&[&provider]));

        let first = router.geocode("100 N State St").await.unwrap();
        let second = router.geocode("100 N State St").await.unwrap();

        assert_eq!(first[0].formatted, second[0].formatted);
        assert_eq!(provider.call_count(), 1);
    }

    #[tokio::test]
    async fn stale_fallback_entry_survives_a_total_outage() {
        let store = Arc::new(InMemoryCacheStore::new());
        let stale = vec![GeocodedAddress {
            latitude: 41.88,
            longitude: -87.63,
            formatted: "stale result".to_string(),
            provider: "primary".to_string(),
        }];
        // Only the long-lived tier holds the entry, as after a primary
        // TTL expiry.
        use crate::cache::CacheStore as _;
        store
            .set(
                "geocode_fallback:100 n state st",
                &serde_json::to_string(&stale).unwrap(),
                std::time::Duration::from_secs(3600),
            )
            .await
            .unwrap();

        let dead = FakeProvider::new("primary", Behavior::RateLimited);
        let quota = QuotaManager::new(Arc::new(InMemoryCounterStore::new()), BTreeMap::new());
        let router = ResilientRouter::new(chain(&[&dead]), quota, GeocodeCache::new(store))
            .with_retry_policy(RetryPolicy::immediate(1));

        let results = router.geocode("100 N State St").await.unwrap();
        assert_eq!(results[0].formatted, "stale result");
    }
}
