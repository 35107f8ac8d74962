//! GraphHopper Directions API adapter. Requires an API key.
//!
//! Alternatives come from the `alternative_route` algorithm in flexible
//! mode. Points are requested un-encoded so step endpoints can feed the
//! risk analyzer directly.
//!
//! See <https://docs.graphhopper.com/#tag/Routing-API>

use async_trait::async_trait;
use saferoute_geo::Coordinates;
use saferoute_routing_models::{
    GeocodedAddress, ProviderError, Route, RouteOptions, TrafficData, TravelMode,
};

use super::{invalid, map_status, map_transport_error, probe, route_id};
use crate::{MAX_GEOCODE_RESULTS, RouteProvider};

/// Stable adapter name.
pub const PROVIDER_NAME: &str = "graphhopper";

/// GraphHopper routing + geocoding adapter.
pub struct GraphHopperProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl GraphHopperProvider {
    /// Creates the adapter with an API key.
    #[must_use]
    pub fn new(
        client: reqwest::Client,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            api_key: api_key.into(),
        }
    }

    async fn fetch_routes(
        &self,
        origin: Coordinates,
        destination: Coordinates,
        count: usize,
        options: RouteOptions,
    ) -> Result<Vec<Route>, ProviderError> {
        let profile = match options.mode {
            Some(TravelMode::Walking) => "foot",
            Some(TravelMode::Cycling) => "bike",
            _ => "car",
        };

        let mut query: Vec<(&str, String)> = vec![
            ("point", format!("{},{}", origin.latitude, origin.longitude)),
            (
                "point",
                format!("{},{}", destination.latitude, destination.longitude),
            ),
            ("profile", profile.to_string()),
            ("points_encoded", "false".to_string()),
            ("instructions", "true".to_string()),
            ("key", self.api_key.clone()),
        ];
        if count > 1 {
            query.push(("algorithm", "alternative_route".to_string()));
            query.push(("alternative_route.max_paths", count.to_string()));
        }
        let avoids = avoid_classes(options);
        if !avoids.is_empty() {
            query.push(("avoid", avoids.join(";")));
        }
        // Both alternatives and avoidance need the flexible engine.
        if count > 1 || !avoids.is_empty() {
            query.push(("ch.disable", "true".to_string()));
        }

        let response = self
            .client
            .get(format!("{}/route", self.base_url))
            .query(&query)
            .send()
            .await
            .map_err(|e| map_transport_error(PROVIDER_NAME, &e))?;

        let status = response.status();
        if let Some(err) = map_status(PROVIDER_NAME, status) {
            return Err(err);
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| map_transport_error(PROVIDER_NAME, &e))?;

        if status.is_client_error() {
            return Err(parse_error(&body));
        }

        parse_routes(&body, origin, destination)
    }
}

#[async_trait]
impl RouteProvider for GraphHopperProvider {
    fn name(&self) -> &str {
        PROVIDER_NAME
    }

    async fn calculate_route(
        &self,
        origin: Coordinates,
        destination: Coordinates,
        options: RouteOptions,
    ) -> Result<Route, ProviderError> {
        self.fetch_routes(origin, destination, 1, options)
            .await?
            .into_iter()
            .next()
            .ok_or(ProviderError::NoRouteFound)
    }

    async fn calculate_alternative_routes(
        &self,
        origin: Coordinates,
        destination: Coordinates,
        count: usize,
        options: RouteOptions,
    ) -> Result<Vec<Route>, ProviderError> {
        let mut routes = self.fetch_routes(origin, destination, count, options).await?;
        routes.truncate(count);
        Ok(routes)
    }

    async fn geocode(&self, address: &str) -> Result<Vec<GeocodedAddress>, ProviderError> {
        let response = self
            .client
            .get(format!("{}/geocode", self.base_url))
            .query(&[
                ("q", address),
                ("limit", &MAX_GEOCODE_RESULTS.to_string()),
                ("key", &self.api_key),
            ])
            .send()
            .await
            .map_err(|e| map_transport_error(PROVIDER_NAME, &e))?;

        if let Some(err) = map_status(PROVIDER_NAME, response.status()) {
            return Err(err);
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| map_transport_error(PROVIDER_NAME, &e))?;

        parse_geocode(&body)
    }

    async fn reverse_geocode(&self, coords: Coordinates) -> Result<GeocodedAddress, ProviderError> {
        let response = self
            .client
            .get(format!("{}/geocode", self.base_url))
            .query(&[
                ("reverse", "true".to_string()),
                ("point", format!("{},{}", coords.latitude, coords.longitude)),
                ("key", self.api_key.clone()),
            ])
            .send()
            .await
            .map_err(|e| map_transport_error(PROVIDER_NAME, &e))?;

        if let Some(err) = map_status(PROVIDER_NAME, response.status()) {
            return Err(err);
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| map_transport_error(PROVIDER_NAME, &e))?;

        parse_geocode(&body)?
            .into_iter()
            .next()
            .ok_or_else(|| invalid(PROVIDER_NAME, "no address found for coordinates"))
    }

    async fn traffic_data(&self, route: &Route) -> Result<TrafficData, ProviderError> {
        // GraphHopper has no live traffic on the standard plan.
        Ok(TrafficData {
            current_duration_s: route.duration_s,
            typical_duration_s: route.duration_s,
        })
    }

    async fn is_available(&self) -> bool {
        probe(&self.client, &format!("{}/route", self.base_url)).await
    }
}

fn avoid_classes(options: RouteOptions) -> Vec<&'static str> {
    let mut avoids = Vec::new();
    if options.avoid_tolls == Some(true) {
        avoids.push("toll");
    }
    if options.avoid_highways == Some(true) {
        avoids.push("motorway");
    }
    avoids
}

/// Maps a GraphHopper error body (`{"message": ...}`) into the taxonomy.
fn parse_error(body: &serde_json::Value) -> ProviderError {
    let message = body["message"].as_str().unwrap_or("unknown error");
    if message.contains("Cannot find point") || message.contains("Connection between locations") {
        ProviderError::NoRouteFound
    } else {
        invalid(PROVIDER_NAME, message)
    }
}

/// Parses a GraphHopper `/route` response into canonical routes.
fn parse_routes(
    body: &serde_json::Value,
    origin: Coordinates,
    destination: Coordinates,
) -> Result<Vec<Route>, ProviderError> {
    let paths = body["paths"]
        .as_array()
        .ok_or_else(|| invalid(PROVIDER_NAME, "missing paths array"))?;

    if paths.is_empty() {
        return Err(ProviderError::NoRouteFound);
    }

    paths
        .iter()
        .map(|path| {
            let distance_m = path["distance"]
                .as_f64()
                .ok_or_else(|| invalid(PROVIDER_NAME, "missing path distance"))?;
            let duration_s = path["time"]
                .as_f64()
                .map(|ms| ms / 1000.0)
                .ok_or_else(|| invalid(PROVIDER_NAME, "missing path time"))?;

            let coordinates = path["points"]["coordinates"]
                .as_array()
                .cloned()
                .unwrap_or_default();

            // Instruction intervals index into the coordinate list; the
            // start of each instruction is a step endpoint.
            let mut waypoints = Vec::new();
            if let Some(instructions) = path["instructions"].as_array() {
                for instruction in instructions {
                    let Some(start) = instruction["interval"][0]
                        .as_u64()
                        .and_then(|i| usize::try_from(i).ok())
                    else {
                        continue;
                    };
                    let Some(coord) = coordinates.get(start) else {
                        continue;
                    };
                    if let (Some(lng), Some(lat)) = (coord[0].as_f64(), coord[1].as_f64()) {
                        waypoints.push(Coordinates::new(lat, lng));
                    }
                }
            }

            let encoded_path = serde_json::to_string(&coordinates).unwrap_or_default();

            Ok(Route {
                id: route_id(PROVIDER_NAME),
                origin,
                destination,
                waypoints,
                distance_m,
                duration_s,
                encoded_path,
                provider: PROVIDER_NAME.to_string(),
            })
        })
        .collect()
}

/// Parses a GraphHopper geocoding response (`{"hits": [...]}`).
fn parse_geocode(body: &serde_json::Value) -> Result<Vec<GeocodedAddress>, ProviderError> {
    let hits = body["hits"]
        .as_array()
        .ok_or_else(|| invalid(PROVIDER_NAME, "missing hits array"))?;

    hits.iter()
        .take(MAX_GEOCODE_RESULTS)
        .map(|hit| {
            let latitude = hit["point"]["lat"]
                .as_f64()
                .ok_or_else(|| invalid(PROVIDER_NAME, "missing point.lat in hit"))?;
            let longitude = hit["point"]["lng"]
                .as_f64()
                .ok_or_else(|| invalid(PROVIDER_NAME, "missing point.lng in hit"))?;

            let formatted = ["name", "city", "state", "country"]
                .iter()
                .filter_map(|field| hit[*field].as_str())
                .collect::<Vec<_>>()
                .join(", ");

            Ok(GeocodedAddress {
                latitude,
                longitude,
                formatted,
                provider: PROVIDER_NAME.to_string(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_paths_with_instruction_waypoints() {
        let body = serde_json::json!({
            "paths": [{
                "distance": 8201.3,
                "time": 721_000,
                "points": {
                    "coordinates": [
                        [-87.6278, 41.8827],
                        [-87.6290, 41.8850],
                        [-87.6301, 41.8890]
                    ]
                },
                "instructions": [
                    { "text": "Head north", "interval": [0, 1] },
                    { "text": "Turn left", "interval": [1, 2] },
                    { "text": "Arrive", "interval": [2, 2] }
                ]
            }]
        });

        let origin = Coordinates::new(41.8827, -87.6278);
        let destination = Coordinates::new(41.8890, -87.6301);
        let routes = parse_routes(&body, origin, destination).unwrap();

        assert_eq!(routes.len(), 1);
        assert!((routes[0].duration_s - 721.0).abs() < 1e-9);
        assert_eq!(routes[0].waypoints.len(), 3);
        assert!((routes[0].waypoints[1].latitude - 41.8850).abs() < 1e-9);
    }

    #[test]
    fn connection_not_found_maps_to_no_route() {
        let body = serde_json::json!({
            "message": "Connection between locations not found"
        });
        assert!(matches!(parse_error(&body), ProviderError::NoRouteFound));
    }

    #[test]
    fn other_errors_are_invalid_response() {
        let body = serde_json::json!({ "message": "Too many points" });
        assert!(matches!(
            parse_error(&body),
            ProviderError::InvalidResponse { .. }
        ));
    }

    #[test]
    fn parses_geocode_hits() {
        let body = serde_json::json!({
            "hits": [{
                "point": { "lat": 41.8827, "lng": -87.6278 },
                "name": "100 North State Street",
                "city": "Chicago",
                "state": "Illinois",
                "country": "United States"
            }]
        });

        let results = parse_geocode(&body).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(
            results[0].formatted,
            "100 North State Street, Chicago, Illinois, United States"
        );
    }

    #[test]
    fn empty_paths_is_no_route() {
        let body = serde_json::json!({ "paths": [] });
        let p = Coordinates::new(0.0, 0.0);
        assert!(matches!(
            parse_routes(&body, p, p),
            Err(ProviderError::NoRouteFound)
        ));
    }
}
