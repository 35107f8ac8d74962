//! Risk-ranked route selection under a detour budget.
//!
//! The selector asks the resilient routing layer for alternatives,
//! risk-analyzes each, and picks the least risky candidate that does
//! not stray too far beyond the shortest option. Safety never costs
//! more than a bounded detour: a candidate 20% longer than the shortest
//! alternative is the most the selector will trade for lower risk.

use std::sync::Arc;

use saferoute_geo::Coordinates;
use saferoute_routing::{ResilientRouter, RoutingError};
use saferoute_routing_models::RouteOptions;

use crate::analyzer::{RouteRiskAnalyzer, RouteWithRisk};
use crate::NavigationResult;

/// Alternatives requested per safe-route query.
pub const MAX_ALTERNATIVES: usize = 3;

/// Detour budget relative to the shortest alternative.
pub const MAX_DETOUR_FACTOR: f64 = 1.20;

/// Selects the safest acceptable route among provider alternatives.
pub struct SafeRouteSelector {
    router: Arc<ResilientRouter>,
    analyzer: Arc<RouteRiskAnalyzer>,
}

impl SafeRouteSelector {
    /// Creates a selector over the shared router and analyzer.
    #[must_use]
    pub fn new(router: Arc<ResilientRouter>, analyzer: Arc<RouteRiskAnalyzer>) -> Self {
        Self { router, analyzer }
    }

    /// Calculates the safest route within the detour budget.
    ///
    /// Falls back to a single risk-analyzed route when the provider
    /// offers no alternatives.
    ///
    /// # Errors
    ///
    /// Returns [`crate::NavigationError::Routing`] when the routing
    /// chain fails, or [`crate::NavigationError::Risk`] when risk
    /// resolution fails.
    pub async fn calculate_safe_route(
        &self,
        origin: Coordinates,
        destination: Coordinates,
        options: RouteOptions,
    ) -> NavigationResult<RouteWithRisk> {
        let alternatives = self
            .router
            .calculate_alternative_routes(origin, destination, MAX_ALTERNATIVES, options)
            .await?;

        if alternatives.is_empty() {
            log::debug!("No alternatives offered; falling back to a single route");
            let route = self.router.calculate_route(origin, destination, options).await?;
            let analysis = self.analyzer.analyze(&route).await?;
            return Ok(RouteWithRisk { route, analysis });
        }

        let mut candidates = Vec::with_capacity(alternatives.len());
        for route in alternatives {
            let analysis = self.analyzer.analyze(&route).await?;
            candidates.push(RouteWithRisk { route, analysis });
        }

        let shortest = candidates
            .iter()
            .map(|c| c.route.distance_m)
            .fold(f64::INFINITY, f64::min);
        let budget = shortest * MAX_DETOUR_FACTOR;

        let within_budget: Vec<RouteWithRisk> = candidates
            .iter()
            .filter(|c| c.route.distance_m <= budget)
            .cloned()
            .collect();
        let pool = if within_budget.is_empty() {
            // Degenerate distances can empty the filter; rank everything
            // rather than fail.
            candidates
        } else {
            within_budget
        };

        let Some(selected) = pool.into_iter().min_by(|a, b| {
            a.analysis
                .max_risk_index
                .total_cmp(&b.analysis.max_risk_index)
                .then_with(|| {
                    a.analysis
                        .average_risk_index
                        .total_cmp(&b.analysis.average_risk_index)
                })
                .then_with(|| a.route.distance_m.total_cmp(&b.route.distance_m))
        }) else {
            return Err(RoutingError::NoRouteFound.into());
        };

        log::info!(
            "Selected route {} via {} (peak risk {:.0}, {:.0}m)",
            selected.route.id,
            selected.route.provider,
            selected.analysis.max_risk_index,
            selected.route.distance_m,
        );
        Ok(selected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Utc;
    use saferoute_geo::region::{Region, RegionIndex, RegionKind};
    use saferoute_risk::{
        InMemoryOccurrenceStore, InMemoryRiskIndexStore, RiskEngine, RiskIndexStore,
    };
    use saferoute_risk_models::{CrimeTypeCatalog, RiskFactors, RiskIndex};
    use saferoute_routing::cache::{GeocodeCache, InMemoryCacheStore};
    use saferoute_routing::quota::QuotaManager;
    use saferoute_routing::{InMemoryCounterStore, RetryPolicy, RouteProvider};
    use saferoute_routing_models::{
        GeocodedAddress, ProviderError, Route, TrafficData,
    };
    use std::collections::BTreeMap;
    use std::sync::Mutex;

    struct ScriptedProvider {
        alternatives: Mutex<Vec<Route>>,
        single: Mutex<Option<Route>>,
    }

    impl ScriptedProvider {
        fn new(alternatives: Vec<Route>, single: Option<Route>) -> Arc<Self> {
            Arc::new(Self {
                alternatives: Mutex::new(alternatives),
                single: Mutex::new(single),
            })
        }
    }

    #[async_trait]
    impl RouteProvider for ScriptedProvider {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn calculate_route(
            &self,
            _origin: Coordinates,
            _destination: Coordinates,
            _options: RouteOptions,
        ) -> Result<Route, ProviderError> {
            self.single
                .lock()
                .unwrap()
                .clone()
                .ok_or(ProviderError::NoRouteFound)
        }

        async fn calculate_alternative_routes(
            &self,
            _origin: Coordinates,
            _destination: Coordinates,
            _count: usize,
            _options: RouteOptions,
        ) -> Result<Vec<Route>, ProviderError> {
            Ok(self.alternatives.lock().unwrap().clone())
        }

        async fn geocode(&self, _address: &str) -> Result<Vec<GeocodedAddress>, ProviderError> {
            Ok(Vec::new())
        }

        async fn reverse_geocode(
            &self,
            _coords: Coordinates,
        ) -> Result<GeocodedAddress, ProviderError> {
            Err(ProviderError::NoRouteFound)
        }

        async fn traffic_data(&self, route: &Route) -> Result<TrafficData, ProviderError> {
            Ok(TrafficData {
                current_duration_s: route.duration_s,
                typical_duration_s: route.duration_s,
            })
        }

        async fn is_available(&self) -> bool {
            true
        }
    }

    fn square_region(id: &str, min_lng: f64, min_lat: f64) -> Region {
        let (w, s) = (min_lng, min_lat);
        let (e, n) = (min_lng + 1.0, min_lat + 1.0);
        let geojson = format!(
            r#"{{"type":"Polygon","coordinates":[[[{w},{s}],[{e},{s}],[{e},{n}],[{w},{n}],[{w},{s}]]]}}"#
        );
        Region::from_geojson(id, id.to_uppercase(), RegionKind::Neighborhood, &geojson).unwrap()
    }

    fn index(region_id: &str, value: f64) -> RiskIndex {
        RiskIndex {
            region_id: region_id.to_string(),
            value,
            factors: RiskFactors {
                frequency: value,
                recency: value,
                severity: value,
                confidence: value,
            },
            occurrence_count: 1,
            dominant_crime_type_id: None,
            calculated_at: Utc::now(),
        }
    }

    // Three 1x1-degree regions side by side along the equator, scored
    // 80 / 20 / 5.
    async fn analyzer() -> Arc<RouteRiskAnalyzer> {
        let index_store = Arc::new(InMemoryRiskIndexStore::new());
        for idx in [index("r80", 80.0), index("r20", 20.0), index("r5", 5.0)] {
            index_store.upsert(&idx).await.unwrap();
        }
        let regions = vec![
            square_region("r80", 0.0, 0.0),
            square_region("r20", 2.0, 0.0),
            square_region("r5", 4.0, 0.0),
        ];
        let engine = RiskEngine::new(
            Arc::new(InMemoryOccurrenceStore::new()),
            index_store,
            Arc::new(RegionIndex::new(regions)),
            CrimeTypeCatalog::default(),
        );
        Arc::new(RouteRiskAnalyzer::new(Arc::new(engine)))
    }

    fn route_via(id: &str, distance_m: f64, lng: f64) -> Route {
        // Origin and destination sit outside any region; the midpoint
        // waypoint places the route inside one scored region.
        Route {
            id: id.to_string(),
            origin: Coordinates::new(10.0, 10.0),
            destination: Coordinates::new(10.0, 11.0),
            waypoints: vec![Coordinates::new(0.5, lng)],
            distance_m,
            duration_s: distance_m / 10.0,
            encoded_path: String::new(),
            provider: "scripted".to_string(),
        }
    }

    fn router_over(provider: Arc<ScriptedProvider>) -> Arc<ResilientRouter> {
        let quota = QuotaManager::new(Arc::new(InMemoryCounterStore::new()), BTreeMap::new());
        let cache = GeocodeCache::new(Arc::new(InMemoryCacheStore::new()));
        Arc::new(
            ResilientRouter::new(vec![provider as Arc<dyn RouteProvider>], quota, cache)
                .with_retry_policy(RetryPolicy::immediate(1)),
        )
    }

    #[tokio::test]
    async fn picks_the_safer_route_within_the_detour_budget() {
        // Shortest route crosses the 80-risk region; a 15% longer one
        // crosses the 20-risk region; a 30% longer one crosses the
        // 5-risk region and busts the budget.
        let provider = ScriptedProvider::new(
            vec![
                route_via("risky", 1000.0, 0.5),
                route_via("balanced", 1150.0, 2.5),
                route_via("long", 1300.0, 4.5),
            ],
            None,
        );
        let selector = SafeRouteSelector::new(router_over(provider), analyzer().await);

        let selected = selector
            .calculate_safe_route(
                Coordinates::new(10.0, 10.0),
                Coordinates::new(10.0, 11.0),
                RouteOptions::default(),
            )
            .await
            .unwrap();

        assert_eq!(selected.route.id, "balanced");
        assert!((selected.analysis.max_risk_index - 20.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn distance_breaks_a_full_risk_tie() {
        // Both candidates cross the same region; the shorter one wins.
        let provider = ScriptedProvider::new(
            vec![
                route_via("longer", 1100.0, 2.5),
                route_via("shorter", 1000.0, 2.5),
            ],
            None,
        );
        let selector = SafeRouteSelector::new(router_over(provider), analyzer().await);

        let selected = selector
            .calculate_safe_route(
                Coordinates::new(10.0, 10.0),
                Coordinates::new(10.0, 11.0),
                RouteOptions::default(),
            )
            .await
            .unwrap();

        assert_eq!(selected.route.id, "shorter");
    }

    #[tokio::test]
    async fn falls_back_to_a_single_route_without_alternatives() {
        let provider = ScriptedProvider::new(Vec::new(), Some(route_via("only", 900.0, 0.5)));
        let selector = SafeRouteSelector::new(router_over(provider), analyzer().await);

        let selected = selector
            .calculate_safe_route(
                Coordinates::new(10.0, 10.0),
                Coordinates::new(10.0, 11.0),
                RouteOptions::default(),
            )
            .await
            .unwrap();

        assert_eq!(selected.route.id, "only");
        assert!((selected.analysis.max_risk_index - 80.0).abs() < 1e-9);
        assert!(selected.analysis.requires_warning);
    }

    #[tokio::test]
    async fn never_exceeds_the_detour_budget_when_a_candidate_satisfies_it() {
        // The lowest-risk route is excluded by the budget; the selector
        // must not pick it.
        let provider = ScriptedProvider::new(
            vec![
                route_via("short", 1000.0, 2.5),
                route_via("too_long", 1201.0, 4.5),
            ],
            None,
        );
        let selector = SafeRouteSelector::new(router_over(provider), analyzer().await);

        let selected = selector
            .calculate_safe_route(
                Coordinates::new(10.0, 10.0),
                Coordinates::new(10.0, 11.0),
                RouteOptions::default(),
            )
            .await
            .unwrap();

        assert_eq!(selected.route.id, "short");
    }
}
