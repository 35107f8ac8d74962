//! OpenRouteService adapter. Requires an API key.
//!
//! Directions use the GeoJSON endpoint so step endpoints arrive as plain
//! coordinates. Geocoding is the Pelias-based `geocode/search` API.
//!
//! See <https://openrouteservice.org/dev/#/api-docs>

use async_trait::async_trait;
use saferoute_geo::Coordinates;
use saferoute_routing_models::{
    GeocodedAddress, ProviderError, Route, RouteOptions, TrafficData, TravelMode,
};

use super::{invalid, map_status, map_transport_error, probe, route_id};
use crate::{MAX_GEOCODE_RESULTS, RouteProvider};

/// Stable adapter name.
pub const PROVIDER_NAME: &str = "openrouteservice";

/// ORS error codes that mean "no route exists between these points".
const NO_ROUTE_CODES: [i64; 2] = [2009, 2010];

/// OpenRouteService routing + geocoding adapter.
pub struct OpenRouteServiceProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl OpenRouteServiceProvider {
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
            Some(TravelMode::Walking) => "foot-walking",
            Some(TravelMode::Cycling) => "cycling-regular",
            _ => "driving-car",
        };
        let url = format!("{}/v2/directions/{profile}/geojson", self.base_url);

        let mut payload = serde_json::json!({
            "coordinates": [
                [origin.longitude, origin.latitude],
                [destination.longitude, destination.latitude]
            ],
            "instructions": true,
        });
        if count > 1 {
            payload["alternative_routes"] = serde_json::json!({ "target_count": count });
        }
        let avoids = avoid_features(options);
        if !avoids.is_empty() {
            payload["options"] = serde_json::json!({ "avoid_features": avoids });
        }

        let response = self
            .client
            .post(&url)
            .header("Authorization", &self.api_key)
            .json(&payload)
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
impl RouteProvider for OpenRouteServiceProvider {
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
            .get(format!("{}/geocode/search", self.base_url))
            .query(&[
                ("api_key", self.api_key.as_str()),
                ("text", address),
                ("size", &MAX_GEOCODE_RESULTS.to_string()),
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
            .get(format!("{}/geocode/reverse", self.base_url))
            .query(&[
                ("api_key", self.api_key.clone()),
                ("point.lat", coords.latitude.to_string()),
                ("point.lon", coords.longitude.to_string()),
                ("size", "1".to_string()),
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
        // ORS has no live traffic feed.
        Ok(TrafficData {
            current_duration_s: route.duration_s,
            typical_duration_s: route.duration_s,
        })
    }

    async fn is_available(&self) -> bool {
        probe(&self.client, &format!("{}/v2/health", self.base_url)).await
    }
}

fn avoid_features(options: RouteOptions) -> Vec<&'static str> {
    let mut avoids = Vec::new();
    if options.avoid_tolls == Some(true) {
        avoids.push("tollways");
    }
    if options.avoid_highways == Some(true) {
        avoids.push("highways");
    }
    avoids
}

/// Maps an ORS error body (`{"error": {"code": ..}}`) into the taxonomy.
fn parse_error(body: &serde_json::Value) -> ProviderError {
    let code = body["error"]["code"].as_i64().unwrap_or(0);
    if NO_ROUTE_CODES.contains(&code) {
        ProviderError::NoRouteFound
    } else {
        let message = body["error"]["message"].as_str().unwrap_or("unknown error");
        invalid(PROVIDER_NAME, format!("error {code}: {message}"))
    }
}

/// Parses an ORS GeoJSON directions response into canonical routes.
fn parse_routes(
    body: &serde_json::Value,
    origin: Coordinates,
    destination: Coordinates,
) -> Result<Vec<Route>, ProviderError> {
    let features = body["features"]
        .as_array()
        .ok_or_else(|| invalid(PROVIDER_NAME, "missing features array"))?;

    if features.is_empty() {
        return Err(ProviderError::NoRouteFound);
    }

    features
        .iter()
        .map(|feature| {
            let summary = &feature["properties"]["summary"];
            let distance_m = summary["distance"]
                .as_f64()
                .ok_or_else(|| invalid(PROVIDER_NAME, "missing summary distance"))?;
            let duration_s = summary["duration"]
                .as_f64()
                .ok_or_else(|| invalid(PROVIDER_NAME, "missing summary duration"))?;

            let coordinates = feature["geometry"]["coordinates"]
                .as_array()
                .cloned()
                .unwrap_or_default();

            // Step way_points index into the geometry; each step start is
            // a step endpoint for the risk analyzer.
            let mut waypoints = Vec::new();
            if let Some(segments) = feature["properties"]["segments"].as_array() {
                for segment in segments {
                    let Some(steps) = segment["steps"].as_array() else {
                        continue;
                    };
                    for step in steps {
                        let Some(start) = step["way_points"][0]
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

/// Parses a Pelias-style geocoding response.
fn parse_geocode(body: &serde_json::Value) -> Result<Vec<GeocodedAddress>, ProviderError> {
    let features = body["features"]
        .as_array()
        .ok_or_else(|| invalid(PROVIDER_NAME, "missing features array"))?;

    features
        .iter()
        .take(MAX_GEOCODE_RESULTS)
        .map(|feature| {
            let coords = &feature["geometry"]["coordinates"];
            let (Some(longitude), Some(latitude)) = (coords[0].as_f64(), coords[1].as_f64())
            else {
                return Err(invalid(PROVIDER_NAME, "missing coordinates in feature"));
            };
            let formatted = feature["properties"]["label"]
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_geojson_directions() {
        let body = serde_json::json!({
            "features": [{
                "geometry": {
                    "coordinates": [
                        [-87.6278, 41.8827],
                        [-87.6290, 41.8850],
                        [-87.6301, 41.8890]
                    ]
                },
                "properties": {
                    "summary": { "distance": 6120.0, "duration": 540.0 },
                    "segments": [{
                        "steps": [
                            { "way_points": [0, 1] },
                            { "way_points": [1, 2] }
                        ]
                    }]
                }
            }]
        });

        let origin = Coordinates::new(41.8827, -87.6278);
        let destination = Coordinates::new(41.8890, -87.6301);
        let routes = parse_routes(&body, origin, destination).unwrap();

        assert_eq!(routes.len(), 1);
        assert!((routes[0].distance_m - 6120.0).abs() < 1e-9);
        assert_eq!(routes[0].waypoints.len(), 2);
    }

    #[test]
    fn route_not_found_codes_map_to_no_route() {
        for code in [2009, 2010] {
            let body = serde_json::json!({
                "error": { "code": code, "message": "Route could not be found" }
            });
            assert!(matches!(parse_error(&body), ProviderError::NoRouteFound));
        }
    }

    #[test]
    fn other_error_codes_are_invalid_response() {
        let body = serde_json::json!({
            "error": { "code": 2003, "message": "Parameter value invalid" }
        });
        assert!(matches!(
            parse_error(&body),
            ProviderError::InvalidResponse { .. }
        ));
    }

    #[test]
    fn parses_pelias_geocode_features() {
        let body = serde_json::json!({
            "features": [{
                "geometry": { "coordinates": [-87.6278, 41.8827] },
                "properties": { "label": "100 N State St, Chicago, IL, USA" }
            }]
        });

        let results = parse_geocode(&body).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].formatted, "100 N State St, Chicago, IL, USA");
    }
}
