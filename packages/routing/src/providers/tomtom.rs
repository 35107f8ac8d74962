//! TomTom Routing + Search adapter. Requires an API key.
//!
//! Routing is requested with `traffic=true`, so every summary carries
//! both a live travel time and a free-flow baseline. That makes TomTom
//! usable for [`TrafficData`] without a second request.
//!
//! See <https://developer.tomtom.com/routing-api/documentation>

use async_trait::async_trait;
use saferoute_geo::Coordinates;
use saferoute_routing_models::{
    GeocodedAddress, ProviderError, Route, RouteOptions, TrafficData, TravelMode,
};

use super::{invalid, map_status, map_transport_error, probe, route_id};
use crate::{MAX_GEOCODE_RESULTS, RouteProvider};

/// Stable adapter name.
pub const PROVIDER_NAME: &str = "tomtom";

/// TomTom routing + geocoding adapter.
pub struct TomTomProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl TomTomProvider {
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
        let travel_mode = match options.mode {
            Some(TravelMode::Walking) => "pedestrian",
            Some(TravelMode::Cycling) => "bicycle",
            _ => "car",
        };
        let url = format!(
            "{}/routing/1/calculateRoute/{},{}:{},{}/json",
            self.base_url,
            origin.latitude,
            origin.longitude,
            destination.latitude,
            destination.longitude,
        );

        let mut query: Vec<(&str, String)> = vec![
            ("key", self.api_key.clone()),
            ("travelMode", travel_mode.to_string()),
            ("traffic", "true".to_string()),
            ("instructionsType", "coded".to_string()),
        ];
        if count > 1 {
            query.push(("maxAlternatives", (count - 1).to_string()));
        }
        for avoid in avoid_values(options) {
            query.push(("avoid", avoid.to_string()));
        }
        if let Some(departure) = options.departure_time {
            query.push(("departAt", departure.to_rfc3339()));
        }

        let response = self
            .client
            .get(&url)
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
impl RouteProvider for TomTomProvider {
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
        let url = format!("{}/search/2/geocode/{address}.json", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&[
                ("key", self.api_key.as_str()),
                ("limit", &MAX_GEOCODE_RESULTS.to_string()),
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
        let url = format!(
            "{}/search/2/reverseGeocode/{},{}.json",
            self.base_url, coords.latitude, coords.longitude
        );
        let response = self
            .client
            .get(&url)
            .query(&[("key", self.api_key.as_str())])
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

        parse_reverse(&body, coords)
    }

    async fn traffic_data(&self, route: &Route) -> Result<TrafficData, ProviderError> {
        // Re-run the route; with traffic=true the summary carries both
        // live and free-flow travel times.
        let url = format!(
            "{}/routing/1/calculateRoute/{},{}:{},{}/json",
            self.base_url,
            route.origin.latitude,
            route.origin.longitude,
            route.destination.latitude,
            route.destination.longitude,
        );
        let response = self
            .client
            .get(&url)
            .query(&[
                ("key", self.api_key.as_str()),
                ("traffic", "true"),
                ("computeTravelTimeFor", "all"),
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

        parse_traffic(&body)
    }

    async fn is_available(&self) -> bool {
        probe(&self.client, &format!("{}/routing/1", self.base_url)).await
    }
}

fn avoid_values(options: RouteOptions) -> Vec<&'static str> {
    let mut avoids = Vec::new();
    if options.avoid_tolls == Some(true) {
        avoids.push("tollRoads");
    }
    if options.avoid_highways == Some(true) {
        avoids.push("motorways");
    }
    avoids
}

/// Maps a TomTom error body into the taxonomy.
fn parse_error(body: &serde_json::Value) -> ProviderError {
    let description = body["detailedError"]["message"]
        .as_str()
        .or_else(|| body["error"]["description"].as_str())
        .unwrap_or("unknown error");
    let code = body["detailedError"]["code"].as_str().unwrap_or_default();
    if code == "NO_ROUTE_FOUND" || description.contains("No route found") {
        ProviderError::NoRouteFound
    } else {
        invalid(PROVIDER_NAME, description)
    }
}

/// Parses a `calculateRoute` response into canonical routes.
fn parse_routes(
    body: &serde_json::Value,
    origin: Coordinates,
    destination: Coordinates,
) -> Result<Vec<Route>, ProviderError> {
    let routes = body["routes"]
        .as_array()
        .ok_or_else(|| invalid(PROVIDER_NAME, "missing routes array"))?;

    if routes.is_empty() {
        return Err(ProviderError::NoRouteFound);
    }

    routes
        .iter()
        .map(|route| {
            let summary = &route["summary"];
            let distance_m = summary["lengthInMeters"]
                .as_f64()
                .ok_or_else(|| invalid(PROVIDER_NAME, "missing lengthInMeters"))?;
            let duration_s = summary["travelTimeInSeconds"]
                .as_f64()
                .ok_or_else(|| invalid(PROVIDER_NAME, "missing travelTimeInSeconds"))?;

            // Leg points are already lat/lng objects; keep them all as
            // the path and sample leg boundaries as waypoints.
            let mut path = Vec::new();
            let mut waypoints = Vec::new();
            if let Some(legs) = route["legs"].as_array() {
                for leg in legs {
                    let Some(points) = leg["points"].as_array() else {
                        continue;
                    };
                    for (i, point) in points.iter().enumerate() {
                        let (Some(lat), Some(lng)) =
                            (point["latitude"].as_f64(), point["longitude"].as_f64())
                        else {
                            continue;
                        };
                        if i == 0 || i == points.len() - 1 {
                            waypoints.push(Coordinates::new(lat, lng));
                        }
                        path.push([lng, lat]);
                    }
                }
            }

            let encoded_path = serde_json::to_string(&path).unwrap_or_default();

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

/// Pulls live and free-flow travel times out of a traffic-aware summary.
fn parse_traffic(body: &serde_json::Value) -> Result<TrafficData, ProviderError> {
    let summary = &body["routes"][0]["summary"];
    let current = summary["travelTimeInSeconds"]
        .as_f64()
        .ok_or_else(|| invalid(PROVIDER_NAME, "missing travelTimeInSeconds"))?;
    let typical = summary["noTrafficTravelTimeInSeconds"]
        .as_f64()
        .unwrap_or(current);

    Ok(TrafficData {
        current_duration_s: current,
        typical_duration_s: typical,
    })
}

/// Parses a Search API geocode response (`{"results": [...]}`).
fn parse_geocode(body: &serde_json::Value) -> Result<Vec<GeocodedAddress>, ProviderError> {
    let results = body["results"]
        .as_array()
        .ok_or_else(|| invalid(PROVIDER_NAME, "missing results array"))?;

    results
        .iter()
        .take(MAX_GEOCODE_RESULTS)
        .map(|result| {
            let position = &result["position"];
            let (Some(latitude), Some(longitude)) =
                (position["lat"].as_f64(), position["lon"].as_f64())
            else {
                return Err(invalid(PROVIDER_NAME, "missing position in result"));
            };
            let formatted = result["address"]["freeformAddress"]
                .as_str()
                .unwrap_or_default()
                .to_string();

            Ok(GeocodedAddress {
                latitude,
                longitude,
                formatted,
                provider: PROVIDER_NAME.to_string(),
            })
        })
        .collect()
}

/// Parses a reverseGeocode response (`{"addresses": [...]}`).
fn parse_reverse(
    body: &serde_json::Value,
    coords: Coordinates,
) -> Result<GeocodedAddress, ProviderError> {
    let address = body["addresses"][0]["address"]["freeformAddress"]
        .as_str()
        .ok_or_else(|| invalid(PROVIDER_NAME, "no address found for coordinates"))?;

    Ok(GeocodedAddress {
        latitude: coords.latitude,
        longitude: coords.longitude,
        formatted: address.to_string(),
        provider: PROVIDER_NAME.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn route_body() -> serde_json::Value {
        serde_json::json!({
            "routes": [{
                "summary": {
                    "lengthInMeters": 5312.0,
                    "travelTimeInSeconds": 612.0,
                    "noTrafficTravelTimeInSeconds": 540.0
                },
                "legs": [{
                    "points": [
                        { "latitude": 41.8827, "longitude": -87.6278 },
                        { "latitude": 41.8850, "longitude": -87.6290 },
                        { "latitude": 41.8890, "longitude": -87.6301 }
                    ]
                }]
            }]
        })
    }

    #[test]
    fn parses_calculate_route_response() {
        let origin = Coordinates::new(41.8827, -87.6278);
        let destination = Coordinates::new(41.8890, -87.6301);
        let routes = parse_routes(&route_body(), origin, destination).unwrap();

        assert_eq!(routes.len(), 1);
        assert!((routes[0].distance_m - 5312.0).abs() < 1e-9);
        // First and last leg point only.
        assert_eq!(routes[0].waypoints.len(), 2);
    }

    #[test]
    fn traffic_summary_splits_live_and_free_flow() {
        let traffic = parse_traffic(&route_body()).unwrap();
        assert!((traffic.current_duration_s - 612.0).abs() < 1e-9);
        assert!((traffic.typical_duration_s - 540.0).abs() < 1e-9);
    }

    #[test]
    fn no_route_found_code_maps_to_no_route() {
        let body = serde_json::json!({
            "detailedError": {
                "code": "NO_ROUTE_FOUND",
                "message": "No route found between the given points"
            }
        });
        assert!(matches!(parse_error(&body), ProviderError::NoRouteFound));
    }

    #[test]
    fn parses_search_geocode_results() {
        let body = serde_json::json!({
            "results": [{
                "position": { "lat": 41.8827, "lon": -87.6278 },
                "address": { "freeformAddress": "100 N State St, Chicago, IL 60602" }
            }]
        });

        let results = parse_geocode(&body).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].formatted, "100 N State St, Chicago, IL 60602");
    }

    #[test]
    fn reverse_geocode_uses_first_address() {
        let body = serde_json::json!({
            "addresses": [
                { "address": { "freeformAddress": "200 W Madison St, Chicago" } }
            ]
        });
        let coords = Coordinates::new(41.8822, -87.6340);
        let result = parse_reverse(&body, coords).unwrap();
        assert_eq!(result.formatted, "200 W Madison St, Chicago");
        assert!((result.latitude - 41.8822).abs() < 1e-9);
    }
}
