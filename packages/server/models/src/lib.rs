#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! API request and response types for the routing server.
//!
//! These types are serialized to JSON for the REST API. They are
//! separate from the core domain types to allow independent evolution
//! of the API contract; domain types that already define their JSON
//! shape ([`RouteWithRisk`], [`RouteRecalculation`], quota usage) are
//! embedded directly.

use saferoute_geo::Coordinates;
use saferoute_navigation::{RouteRecalculation, RouteWithRisk};
use saferoute_risk_models::Occurrence;
use saferoute_routing_models::TravelMode;
use serde::{Deserialize, Serialize};

/// Service health, reported by `GET /api/health`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiHealth {
    /// Whether the service is up.
    pub healthy: bool,
    /// Server version.
    pub version: String,
}

/// Routing preferences accepted on route calculation.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiRouteOptions {
    /// Travel mode; driving when omitted.
    #[serde(default)]
    pub mode: Option<TravelMode>,
    /// Avoid toll roads.
    #[serde(default)]
    pub avoid_tolls: Option<bool>,
    /// Avoid highways/motorways.
    #[serde(default)]
    pub avoid_highways: Option<bool>,
}

/// Body of `POST /api/routes`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalculateRouteRequest {
    /// Start of the trip.
    pub origin: Coordinates,
    /// End of the trip.
    pub destination: Coordinates,
    /// Rank alternatives by risk instead of taking the provider's
    /// first route.
    #[serde(default)]
    pub prefer_safe_route: bool,
    /// Start a navigation session for the returned route.
    #[serde(default)]
    pub start_navigation: bool,
    /// User the navigation session belongs to.
    #[serde(default)]
    pub user_id: Option<String>,
    /// Routing preferences.
    #[serde(default)]
    pub options: ApiRouteOptions,
}

/// Response of `POST /api/routes`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalculateRouteResponse {
    /// The selected route with its risk analysis.
    pub route: RouteWithRisk,
    /// Recent active incidents in the regions the route traverses.
    pub incidents: Vec<Occurrence>,
    /// Session id, present when navigation was started.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

/// Body of `POST /api/routes/recalculate`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecalculateRouteRequest {
    /// The active navigation session.
    pub session_id: String,
    /// Where the user currently is.
    pub current_position: Coordinates,
}

/// Response of `POST /api/routes/recalculate` — the recalculation
/// outcome as produced by the navigation manager.
pub type RecalculateRouteResponse = RouteRecalculation;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn calculate_request_defaults_optional_flags() {
        let request: CalculateRouteRequest = serde_json::from_value(serde_json::json!({
            "origin": { "latitude": 41.88, "longitude": -87.63 },
            "destination": { "latitude": 41.95, "longitude": -87.70 }
        }))
        .unwrap();

        assert!(!request.prefer_safe_route);
        assert!(!request.start_navigation);
        assert!(request.options.mode.is_none());
    }

    #[test]
    fn session_id_is_omitted_when_absent() {
        let response = CalculateRouteResponse {
            route: RouteWithRisk {
                route: saferoute_routing_models::Route {
                    id: "r".to_string(),
                    origin: Coordinates::new(41.88, -87.63),
                    destination: Coordinates::new(41.95, -87.70),
                    waypoints: Vec::new(),
                    distance_m: 1.0,
                    duration_s: 1.0,
                    encoded_path: String::new(),
                    provider: "osrm".to_string(),
                },
                analysis: saferoute_navigation::RouteRiskAnalysis {
                    max_risk_index: 0.0,
                    average_risk_index: 0.0,
                    high_risk_region_count: 0,
                    requires_warning: false,
                    dominant_crime_type: None,
                    regions: Vec::new(),
                    message: None,
                },
            },
            incidents: Vec::new(),
            session_id: None,
        };

        let json = serde_json::to_value(&response).unwrap();
        assert!(json.get("sessionId").is_none());
        assert!(json["route"]["analysis"]["maxRiskIndex"].is_number());
    }
}
