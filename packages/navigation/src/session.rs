//! Active navigation sessions and traffic-driven recalculation.
//!
//! A session pins the route a user is driving together with its risk
//! analysis and the duration estimated when navigation started. Each
//! recalculation request refreshes the live travel time; only when the
//! trip has slowed more than 10% beyond the original estimate is a new
//! route computed from the user's current position, with the risk delta
//! reported alongside the time delta.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use saferoute_geo::Coordinates;
use saferoute_routing::ResilientRouter;
use saferoute_routing_models::{Route, RouteOptions};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

use crate::analyzer::{RouteRiskAnalysis, RouteRiskAnalyzer, RouteWithRisk};
use crate::store::SessionStore;
use crate::{NavigationError, NavigationResult};

/// Travel-time growth (percent over the original estimate) that
/// triggers a reroute. Exactly this value does not.
pub const REROUTE_THRESHOLD_PERCENT: f64 = 10.0;

/// Absolute risk-index delta considered a reportable change.
pub const RISK_CHANGE_THRESHOLD: f64 = 5.0;

/// Lifecycle status of a navigation session.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionStatus {
    /// Navigation in progress; recalculation allowed.
    Active,
    /// Destination reached.
    Completed,
    /// Abandoned by the user.
    Cancelled,
}

/// One user's active or past navigation run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NavigationSession {
    /// Unique session identifier.
    pub id: String,
    /// The navigating user, when known.
    pub user_id: Option<String>,
    /// The route currently being driven.
    pub route: Route,
    /// Risk analysis of that route.
    pub analysis: RouteRiskAnalysis,
    /// Where the user was last reported, set by recalculation.
    pub current_position: Option<Coordinates>,
    /// Lifecycle status.
    pub status: SessionStatus,
    /// Duration estimated when navigation started, in seconds.
    pub original_duration_s: f64,
    /// Most recent live duration estimate, in seconds.
    pub current_duration_s: f64,
    /// Peak risk index of the route currently being driven.
    pub max_risk_index: f64,
    /// When navigation started.
    pub started_at: DateTime<Utc>,
    /// When the session was last touched.
    pub updated_at: DateTime<Utc>,
}

/// Outcome of one recalculation request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteRecalculation {
    /// The session this recalculation belongs to.
    pub session_id: String,
    /// The route the user was on, with its analysis.
    pub original: RouteWithRisk,
    /// The replacement route, present only when a reroute happened.
    pub updated: Option<RouteWithRisk>,
    /// Whether a new route was issued.
    pub route_changed: bool,
    /// Whether the peak risk moved by at least
    /// [`RISK_CHANGE_THRESHOLD`].
    pub risk_changed: bool,
    /// Live duration relative to the original estimate, in percent.
    pub time_change_percent: f64,
    /// Human-readable summary of what changed.
    pub message: String,
}

/// Creates, recalculates, and closes navigation sessions.
pub struct NavigationManager {
    sessions: Arc<dyn SessionStore>,
    router: Arc<ResilientRouter>,
    analyzer: Arc<RouteRiskAnalyzer>,
}

impl NavigationManager {
    /// Creates a manager over the injected session store.
    #[must_use]
    pub fn new(
        sessions: Arc<dyn SessionStore>,
        router: Arc<ResilientRouter>,
        analyzer: Arc<RouteRiskAnalyzer>,
    ) -> Self {
        Self {
            sessions,
            router,
            analyzer,
        }
    }

    /// Starts an active session for a selected route.
    ///
    /// # Errors
    ///
    /// Returns [`NavigationError::Store`] if the session store fails.
    pub async fn start_session(
        &self,
        selected: RouteWithRisk,
        user_id: Option<&str>,
    ) -> NavigationResult<NavigationSession> {
        let now = Utc::now();
        let session = NavigationSession {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.map(str::to_string),
            status: SessionStatus::Active,
            original_duration_s: selected.route.duration_s,
            current_duration_s: selected.route.duration_s,
            max_risk_index: selected.analysis.max_risk_index,
            route: selected.route,
            analysis: selected.analysis,
            current_position: None,
            started_at: now,
            updated_at: now,
        };
        self.sessions.insert(&session).await?;
        log::info!("Started navigation session {}", session.id);
        Ok(session)
    }

    /// Refreshes live travel time for a session and reroutes when the
    /// trip has slowed past the threshold.
    ///
    /// # Errors
    ///
    /// Returns [`NavigationError::SessionNotFound`] for unknown ids,
    /// [`NavigationError::SessionNotActive`] for terminal sessions, and
    /// routing or store errors otherwise.
    pub async fn recalculate(
        &self,
        session_id: &str,
        current_position: Coordinates,
    ) -> NavigationResult<RouteRecalculation> {
        let mut session = self.require_active(session_id).await?;

        let traffic = self.router.traffic_data(&session.route).await?;
        session.current_duration_s = traffic.current_duration_s;
        session.current_position = Some(current_position);
        session.updated_at = Utc::now();

        let time_change_percent = if session.original_duration_s > 0.0 {
            (session.current_duration_s - session.original_duration_s)
                / session.original_duration_s
                * 100.0
        } else {
            0.0
        };

        let original = RouteWithRisk {
            route: session.route.clone(),
            analysis: session.analysis.clone(),
        };

        if time_change_percent <= REROUTE_THRESHOLD_PERCENT {
            self.sessions.update(&session).await?;
            return Ok(RouteRecalculation {
                session_id: session.id,
                original,
                updated: None,
                route_changed: false,
                risk_changed: false,
                time_change_percent,
                message: format!(
                    "Current route is still best (travel time {time_change_percent:+.0}% vs. original estimate)."
                ),
            });
        }

        log::info!(
            "Session {session_id}: travel time up {time_change_percent:.0}%, rerouting from current position"
        );
        let new_route = self
            .router
            .calculate_route(
                current_position,
                session.route.destination,
                RouteOptions::default(),
            )
            .await?;
        let new_analysis = self.analyzer.analyze(&new_route).await?;

        let old_max = session.max_risk_index;
        let new_max = new_analysis.max_risk_index;
        let risk_changed = (new_max - old_max).abs() >= RISK_CHANGE_THRESHOLD;

        let mut message = format!(
            "Travel time is up {time_change_percent:.0}%; rerouted from your current position."
        );
        if risk_changed {
            if new_max > old_max {
                message.push_str(" Caution: the new route passes through higher-risk areas.");
            } else {
                message.push_str(" The new route also passes through lower-risk areas.");
            }
        }

        session.route = new_route.clone();
        session.analysis = new_analysis.clone();
        session.current_duration_s = new_route.duration_s;
        session.max_risk_index = new_max;
        self.sessions.update(&session).await?;

        Ok(RouteRecalculation {
            session_id: session.id,
            original,
            updated: Some(RouteWithRisk {
                route: new_route,
                analysis: new_analysis,
            }),
            route_changed: true,
            risk_changed,
            time_change_percent,
            message,
        })
    }

    /// Marks a session cancelled.
    ///
    /// # Errors
    ///
    /// Returns [`NavigationError::SessionNotFound`] or
    /// [`NavigationError::SessionNotActive`] for unknown/terminal
    /// sessions.
    pub async fn cancel_session(&self, session_id: &str) -> NavigationResult<NavigationSession> {
        self.close(session_id, SessionStatus::Cancelled).await
    }

    /// Marks a session completed.
    ///
    /// # Errors
    ///
    /// Returns [`NavigationError::SessionNotFound`] or
    /// [`NavigationError::SessionNotActive`] for unknown/terminal
    /// sessions.
    pub async fn complete_session(&self, session_id: &str) -> NavigationResult<NavigationSession> {
        self.close(session_id, SessionStatus::Completed).await
    }

    async fn close(
        &self,
        session_id: &str,
        status: SessionStatus,
    ) -> NavigationResult<NavigationSession> {
        let mut session = self.require_active(session_id).await?;
        session.status = status;
        session.updated_at = Utc::now();
        self.sessions.update(&session).await?;
        Ok(session)
    }

    async fn require_active(&self, session_id: &str) -> NavigationResult<NavigationSession> {
        let session = self.sessions.get(session_id).await?.ok_or_else(|| {
            NavigationError::SessionNotFound {
                session_id: session_id.to_string(),
            }
        })?;
        if session.status != SessionStatus::Active {
            return Err(NavigationError::SessionNotActive {
                session_id: session_id.to_string(),
            });
        }
        Ok(session)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use saferoute_geo::region::RegionIndex;
    use saferoute_risk::{InMemoryOccurrenceStore, InMemoryRiskIndexStore, RiskEngine};
    use saferoute_risk_models::CrimeTypeCatalog;
    use saferoute_routing::cache::{GeocodeCache, InMemoryCacheStore};
    use saferoute_routing::quota::QuotaManager;
    use saferoute_routing::{InMemoryCounterStore, RetryPolicy, RouteProvider};
    use saferoute_routing_models::{GeocodedAddress, ProviderError, TrafficData};
    use std::collections::BTreeMap;
    use std::sync::Mutex;

    use crate::store::InMemorySessionStore;

    /// Provider whose live duration and reroute result are set by the
    /// test.
    struct ScriptedProvider {
        live_duration_s: Mutex<f64>,
        reroute: Mutex<Route>,
    }

    impl ScriptedProvider {
        fn new(live_duration_s: f64, reroute: Route) -> Arc<Self> {
            Arc::new(Self {
                live_duration_s: Mutex::new(live_duration_s),
                reroute: Mutex::new(reroute),
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
            Ok(self.reroute.lock().unwrap().clone())
        }

        async fn calculate_alternative_routes(
            &self,
            _origin: Coordinates,
            _destination: Coordinates,
            _count: usize,
            _options: RouteOptions,
        ) -> Result<Vec<Route>, ProviderError> {
            Ok(vec![self.reroute.lock().unwrap().clone()])
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
                current_duration_s: *self.live_duration_s.lock().unwrap(),
                typical_duration_s: route.duration_s,
            })
        }

        async fn is_available(&self) -> bool {
            true
        }
    }

    fn route(id: &str, duration_s: f64) -> Route {
        Route {
            id: id.to_string(),
            origin: Coordinates::new(41.88, -87.63),
            destination: Coordinates::new(41.95, -87.70),
            waypoints: Vec::new(),
            distance_m: duration_s * 10.0,
            duration_s,
            encoded_path: String::new(),
            provider: "scripted".to_string(),
        }
    }

    fn analysis(max: f64) -> RouteRiskAnalysis {
        RouteRiskAnalysis {
            max_risk_index: max,
            average_risk_index: max,
            high_risk_region_count: usize::from(max >= 70.0),
            requires_warning: max >= 50.0,
            dominant_crime_type: None,
            regions: Vec::new(),
            message: None,
        }
    }

    fn manager_with(provider: Arc<ScriptedProvider>) -> NavigationManager {
        let quota = QuotaManager::new(Arc::new(InMemoryCounterStore::new()), BTreeMap::new());
        let cache = GeocodeCache::new(Arc::new(InMemoryCacheStore::new()));
        let router = Arc::new(
            ResilientRouter::new(vec![provider as Arc<dyn RouteProvider>], quota, cache)
                .with_retry_policy(RetryPolicy::immediate(1)),
        );

        // An empty region index scores every route at zero risk.
        let engine = RiskEngine::new(
            Arc::new(InMemoryOccurrenceStore::new()),
            Arc::new(InMemoryRiskIndexStore::new()),
            Arc::new(RegionIndex::new(Vec::new())),
            CrimeTypeCatalog::default(),
        );
        let analyzer = Arc::new(RouteRiskAnalyzer::new(Arc::new(engine)));

        NavigationManager::new(Arc::new(InMemorySessionStore::new()), router, analyzer)
    }

    fn position() -> Coordinates {
        Coordinates::new(41.90, -87.65)
    }

    async fn started(manager: &NavigationManager, max_risk: f64) -> NavigationSession {
        manager
            .start_session(
                RouteWithRisk {
                    route: route("original", 1000.0),
                    analysis: analysis(max_risk),
                },
                Some("user-1"),
            )
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn start_session_pins_the_original_duration() {
        let manager = manager_with(ScriptedProvider::new(1000.0, route("reroute", 950.0)));
        let session = started(&manager, 12.0).await;

        assert_eq!(session.status, SessionStatus::Active);
        assert_eq!(session.user_id.as_deref(), Some("user-1"));
        assert!(session.current_position.is_none());
        assert!((session.original_duration_s - 1000.0).abs() < 1e-9);
        assert!((session.current_duration_s - 1000.0).abs() < 1e-9);
        assert!((session.max_risk_index - 12.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn fifteen_percent_slowdown_triggers_a_reroute() {
        let manager = manager_with(ScriptedProvider::new(1150.0, route("reroute", 950.0)));
        let session = started(&manager, 0.0).await;

        let result = manager.recalculate(&session.id, position()).await.unwrap();

        assert!(result.route_changed);
        assert!((result.time_change_percent - 15.0).abs() < 1e-9);
        assert_eq!(result.updated.unwrap().route.id, "reroute");
    }

    #[tokio::test]
    async fn nine_percent_slowdown_keeps_the_route() {
        let manager = manager_with(ScriptedProvider::new(1090.0, route("reroute", 950.0)));
        let session = started(&manager, 0.0).await;

        let result = manager.recalculate(&session.id, position()).await.unwrap();

        assert!(!result.route_changed);
        assert!(result.updated.is_none());
        assert!((result.time_change_percent - 9.0).abs() < 1e-9);
        assert_eq!(result.original.route.id, "original");
    }

    #[tokio::test]
    async fn exactly_ten_percent_does_not_reroute() {
        let manager = manager_with(ScriptedProvider::new(1100.0, route("reroute", 950.0)));
        let session = started(&manager, 0.0).await;

        let result = manager.recalculate(&session.id, position()).await.unwrap();

        assert!(!result.route_changed);
        assert!((result.time_change_percent - 10.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn recalculation_records_the_reported_position() {
        // Even without a reroute, the session remembers where the user
        // last checked in.
        let manager = manager_with(ScriptedProvider::new(1090.0, route("reroute", 950.0)));
        let session = started(&manager, 0.0).await;

        manager.recalculate(&session.id, position()).await.unwrap();

        let after = manager.sessions.get(&session.id).await.unwrap().unwrap();
        assert_eq!(after.current_position, Some(position()));
    }

    #[tokio::test]
    async fn risk_drop_of_five_or_more_is_reported() {
        // Old route pinned at risk 40; the reroute scores 0 (no scored
        // regions), a 40-point drop.
        let manager = manager_with(ScriptedProvider::new(1200.0, route("reroute", 950.0)));
        let session = started(&manager, 40.0).await;

        let result = manager.recalculate(&session.id, position()).await.unwrap();

        assert!(result.route_changed);
        assert!(result.risk_changed);
        assert!(result.message.contains("lower-risk"));

        // The session tracks the new route's risk and the reported
        // position from here on.
        let after = manager.sessions.get(&session.id).await.unwrap().unwrap();
        assert!((after.max_risk_index - 0.0).abs() < f64::EPSILON);
        assert_eq!(after.current_position, Some(position()));
    }

    #[tokio::test]
    async fn small_risk_delta_is_not_reported() {
        let manager = manager_with(ScriptedProvider::new(1200.0, route("reroute", 950.0)));
        let session = started(&manager, 4.0).await;

        let result = manager.recalculate(&session.id, position()).await.unwrap();

        assert!(result.route_changed);
        assert!(!result.risk_changed);
    }

    #[tokio::test]
    async fn unknown_session_is_not_found() {
        let manager = manager_with(ScriptedProvider::new(1000.0, route("reroute", 950.0)));

        let result = manager.recalculate("missing", position()).await;
        assert!(matches!(
            result,
            Err(NavigationError::SessionNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn cancelled_session_rejects_recalculation() {
        let manager = manager_with(ScriptedProvider::new(1150.0, route("reroute", 950.0)));
        let session = started(&manager, 0.0).await;

        manager.cancel_session(&session.id).await.unwrap();

        let result = manager.recalculate(&session.id, position()).await;
        assert!(matches!(
            result,
            Err(NavigationError::SessionNotActive { .. })
        ));
    }

    #[tokio::test]
    async fn completing_twice_is_rejected() {
        let manager = manager_with(ScriptedProvider::new(1000.0, route("reroute", 950.0)));
        let session = started(&manager, 0.0).await;

        manager.complete_session(&session.id).await.unwrap();
        let result = manager.complete_session(&session.id).await;
        assert!(matches!(
            result,
            Err(NavigationError::SessionNotActive { .. })
        ));
    }
}
