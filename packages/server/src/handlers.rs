//! HTTP handler functions for the routing API.

use actix_web::{HttpResponse, web};
use chrono::{Duration, Utc};
use saferoute_geo::Coordinates;
use saferoute_navigation::{NavigationError, RouteRiskAnalysis, RouteWithRisk};
use saferoute_risk::OccurrenceStore;
use saferoute_risk_models::{Occurrence, OccurrenceStatus};
use saferoute_routing::RoutingError;
use saferoute_routing_models::RouteOptions;
use saferoute_server_models::{
    ApiHealth, ApiRouteOptions, CalculateRouteRequest, CalculateRouteResponse,
    RecalculateRouteRequest,
};

use crate::AppState;

/// How far back the incidents overlay looks, matching the scoring
/// window.
const INCIDENT_WINDOW_DAYS: i64 = 30;

/// `GET /api/health`
pub async fn health() -> HttpResponse {
    HttpResponse::Ok().json(ApiHealth {
        healthy: true,
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// `POST /api/routes`
///
/// Calculates a route (risk-ranked when `preferSafeRoute` is set),
/// returns it with its risk analysis and recent incidents along the
/// way, and optionally starts a navigation session.
pub async fn calculate_route(
    state: web::Data<AppState>,
    body: web::Json<CalculateRouteRequest>,
) -> HttpResponse {
    let request = body.into_inner();

    let (origin, destination) =
        match (request.origin.validate(), request.destination.validate()) {
            (Ok(origin), Ok(destination)) => (origin, destination),
            (Err(e), _) | (_, Err(e)) => {
                return HttpResponse::BadRequest().json(serde_json::json!({
                    "error": e.to_string()
                }));
            }
        };

    let options = to_route_options(request.options);
    let selected = if request.prefer_safe_route {
        state
            .selector
            .calculate_safe_route(origin, destination, options)
            .await
    } else {
        plain_route(&state, origin, destination, options).await
    };
    let selected = match selected {
        Ok(selected) => selected,
        Err(e) => return error_response(&e),
    };

    let incidents = match recent_incidents(state.occurrences.as_ref(), &selected.analysis).await {
        Ok(incidents) => incidents,
        Err(e) => {
            log::error!("Failed to load incidents along route: {e}");
            return HttpResponse::InternalServerError().json(serde_json::json!({
                "error": "Failed to load incidents along route"
            }));
        }
    };

    let session_id = if request.start_navigation {
        let user_id = request.user_id.as_deref();
        match state.navigation.start_session(selected.clone(), user_id).await {
            Ok(session) => Some(session.id),
            Err(e) => return error_response(&e),
        }
    } else {
        None
    };

    HttpResponse::Ok().json(CalculateRouteResponse {
        route: selected,
        incidents,
        session_id,
    })
}

/// `POST /api/routes/recalculate`
///
/// Refreshes live travel time for an active navigation session and
/// reroutes from the user's current position when the trip has slowed
/// past the threshold.
pub async fn recalculate_route(
    state: web::Data<AppState>,
    body: web::Json<RecalculateRouteRequest>,
) -> HttpResponse {
    let request = body.into_inner();

    let current_position = match request.current_position.validate() {
        Ok(position) => position,
        Err(e) => {
            return HttpResponse::BadRequest().json(serde_json::json!({
                "error": e.to_string()
            }));
        }
    };

    match state
        .navigation
        .recalculate(&request.session_id, current_position)
        .await
    {
        Ok(recalculation) => HttpResponse::Ok().json(recalculation),
        Err(e) => error_response(&e),
    }
}

/// `GET /api/quota`
///
/// Current per-provider quota usage, for dashboards and alerting.
pub async fn quota(state: web::Data<AppState>) -> HttpResponse {
    match state.router.quota_usage().await {
        Ok(usage) => HttpResponse::Ok().json(usage),
        Err(e) => {
            log::error!("Failed to read quota usage: {e}");
            HttpResponse::InternalServerError().json(serde_json::json!({
                "error": "Failed to read quota usage"
            }))
        }
    }
}

/// Calculates the provider's first route and analyzes its risk.
async fn plain_route(
    state: &AppState,
    origin: Coordinates,
    destination: Coordinates,
    options: RouteOptions,
) -> Result<RouteWithRisk, NavigationError> {
    let route = state
        .router
        .calculate_route(origin, destination, options)
        .await?;
    let analysis = state.analyzer.analyze(&route).await?;
    Ok(RouteWithRisk { route, analysis })
}

/// Active occurrences from the last [`INCIDENT_WINDOW_DAYS`] days in
/// every region the analyzed route traverses.
async fn recent_incidents(
    occurrences: &dyn OccurrenceStore,
    analysis: &RouteRiskAnalysis,
) -> Result<Vec<Occurrence>, saferoute_risk::StoreError> {
    let cutoff = Utc::now() - Duration::days(INCIDENT_WINDOW_DAYS);
    let mut incidents = Vec::new();
    for region in &analysis.regions {
        let all = occurrences.occurrences_for_region(&region.region_id).await?;
        incidents.extend(
            all.into_iter()
                .filter(|o| o.status == OccurrenceStatus::Active && o.occurred_at >= cutoff),
        );
    }
    Ok(incidents)
}

const fn to_route_options(options: ApiRouteOptions) -> RouteOptions {
    RouteOptions {
        avoid_tolls: options.avoid_tolls,
        avoid_highways: options.avoid_highways,
        mode: options.mode,
        departure_time: None,
    }
}

/// Maps a navigation-layer error to its HTTP status.
fn error_response(e: &NavigationError) -> HttpResponse {
    let body = serde_json::json!({ "error": e.to_string() });
    match e {
        NavigationError::SessionNotFound { .. } => HttpResponse::NotFound().json(body),
        NavigationError::SessionNotActive { .. } => HttpResponse::Conflict().json(body),
        NavigationError::Routing(RoutingError::NoRouteFound) => {
            HttpResponse::NotFound().json(body)
        }
        NavigationError::Routing(RoutingError::QuotaThrottled) => {
            HttpResponse::TooManyRequests().json(body)
        }
        NavigationError::Routing(
            RoutingError::AllProvidersFailed { .. } | RoutingError::NoProvidersConfigured,
        ) => {
            log::error!("Routing unavailable: {e}");
            HttpResponse::ServiceUnavailable().json(body)
        }
        NavigationError::Routing(RoutingError::Store(_))
        | NavigationError::Risk(_)
        | NavigationError::Store(_) => {
            log::error!("Internal failure: {e}");
            HttpResponse::InternalServerError().json(body)
        }
    }
}
