//! Mapbox Directions + Geocoding adapter. Requires an access token.
//!
//! The `driving-traffic` profile carries live traffic, which makes this
//! the preferred provider for [`TrafficData`] during active navigation:
//! `duration` reflects current conditions and `duration_typical` the
//! free-flow baseline.
//!
//! See <https://docs.mapbox.com/api/navigation/directions/>

use async_trait::async_trait;
use saferoute_geo::Coordinates;
use saferoute_routing_models::{
    GeocodedAddress, ProviderError, Route, RouteOptions, TrafficData, TravelMode,
};

use super::{invalid, map_status, map_transport_error, probe, route_id};
use crate::{MAX_GEOCODE_RESULTS, RouteProvider};

/// Stable adapter name.
pub const PROVIDER_NAME: &str = "mapbox";

/// Mapbox routing + geocoding adapter.
pub struct MapboxProvider {
    client: reqwest::Client,
    base_url: String,
    access_token: String,
}

impl MapboxProvider {
    /// Creates the adapter with an access token.
    #[must_use]
    pub fn new(
        client: reqwest::Client,
        base_url: impl Into<String>,
        access_token: impl Into<String>,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            access_token: access_token.into(),
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
            Some(TravelMode::Walking) => "walking",
            Some(TravelMode::Cycling) => "cycling",
            _ => "driving-traffic",
        };
        let url = format!(
            "{}/directions/v5/mapbox/{profile}/{},{};{},{}",
            self.base_url,
            origin.longitude,
            origin.latitude,
            destination.longitude,
            destination.latitude,
        );

        let mut query: Vec<(&str, String)> = vec![
            ("access_token", self.access_token.clone()),
            ("geometries", "polyline".to_string()),
            ("overview", "full".to_string()),
            ("steps", "true".to_string()),
            ("alternatives", (count > 1).to_string()),
        ];
        let excludes = exclude_classes(options);
        if !excludes.is_empty() {
            query.push(("exclude", excludes.join(",")));
        }
        if let Some(departure) = options.departure_time {
            query.push(("depart_at", departure.format("%Y-%m-%dT%H:%M").to_string()));
        }

        let response = self
            .client
            .get(&url)
            .query(&query)
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

        parse_routes(&body, origin, destination)
    }
}

#[async_trait]
impl RouteProvider for MapboxProvider {
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
        let url = format!(
            "{}/geocoding/v5/mapbox.places/{address}.json",
            self.base_url
        );
        let response = self
            .client
            .get(&url)
            .query(&[
                ("access_token", self.access_token.as_str()),
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
            "{}/geocoding/v5/mapbox.places/{},{}.json",
            self.base_url, coords.longitude, coords.latitude
        );
        let response = self
            .client
            .get(&url)
            .query(&[("access_token", self.access_token.as_str()), ("limit", "1")])
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
        // Re-run the route on the traffic profile; `duration` reflects
        // live conditions and `duration_typical` the baseline.
        let refreshed = self
            .fetch_routes(route.origin, route.destination, 1, RouteOptions::default())
            .await?;
        let current = refreshed
            .first()
            .map_or(route.duration_s, |r| r.duration_s);

        Ok(TrafficData {
            current_duration_s: current,
            typical_duration_s: route.duration_s,
        })
    }

    async fn is_available(&self) -> bool {
        probe(
            &self.client,
            &format!("{}/directions/v5/mapbox/driving-traffic", self.base_url),
        )
        .await
    }
}

fn exclude_classes(options: RouteOptions) -> Vec<&'static str> {
    let mut excludes = Vec::new();
    if options.avoid_tolls == Some(true) {
        excludes.push("toll");
    }
    if options.avoid_highways == Some(true) {
        excludes.push("motorway");
    }
    excludes
}

/// Parses a Mapbox Directions response into canonical routes.
fn parse_routes(
    body: &serde_json::Value,
    origin: Coordinates,
    destination: Coordinates,
) -> Result<Vec<Route>, ProviderError> {
    let code = body["code"]
        .as_str()
        .ok_or_else(|| invalid(PROVIDER_NAME, "missing code in directions response"))?;

    match code {
        "Ok" => {}
        "NoRoute" | "NoSegment" => return Err(ProviderError::NoRouteFound),
        other => {
            return Err(invalid(PROVIDER_NAME, format!("directions error {other}")));
        }
    }

    let routes = body["routes"]
        .as_array()
        .ok_or_else(|| invalid(PROVIDER_NAME, "missing routes array"))?;

    routes
        .iter()
        .map(|route| {
            let distance_m = route["distance"]
                .as_f64()
                .ok_or_else(|| invalid(PROVIDER_NAME, "missing route distance"))?;
            let duration_s = route["duration"]
                .as_f64()
                .ok_or_else(|| invalid(PROVIDER_NAME, "missing route duration"))?;
            let encoded_path = route["geometry"].as_str().unwrap_or_default().to_string();

            let mut waypoints = Vec::new();
            if let Some(legs) = route["legs"].as_array() {
                for leg in legs {
                    let Some(steps) = leg["steps"].as_array() else {
                        continue;
                    };
                    for step in steps {
                        let location = &step["maneuver"]["location"];
                        if let (Some(lng), Some(lat)) =
                            (location[0].as_f64(), location[1].as_f64())
                        {
                            waypoints.push(Coordinates::new(lat, lng));
                        }
                    }
                }
            }

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

/// Parses a Mapbox geocoding response (`{"features": [...]}`).
fn parse_geocode(body: &serde_json::Value) -> Result<Vec<GeocodedAddress>, ProviderError> {
    let features = body["features"]
        .as_array()
        .ok_or_else(|| invalid(PROVIDER_NAME, "missing features array"))?;

    features
        .iter()
        .take(MAX_GEOCODE_RESULTS)
        .map(|feature| {
            let center = &feature["center"];
            let (Some(longitude), Some(latitude)) = (center[0].as_f64(), center[1].as_f64())
            else {
                return Err(invalid(PROVIDER_NAME, "missing center in feature"));
            };
            let formatted = feature["place_name"].as_str().unwrap_or_default().to_string();

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
    fn parses_directions_response() {
        let body = serde_json::json!({
            "code": "Ok",
            "routes": [{
                "distance": 4102.2,
                "duration": 780.5,
                "duration_typical": 610.0,
                "geometry": "polyline~string",
                "legs": [{
                    "steps": [
                        { "maneuver": { "location": [-87.6278, 41.8827] } }
                    ]
                }]
            }]
        });

        let origin = Coordinates::new(41.8827, -87.6278);
        let destination = Coordinates::new(41.8890, -87.6301);
        let routes = parse_routes(&body, origin, destination).unwrap();

        assert_eq!(routes.len(), 1);
        assert!((routes[0].duration_s - 780.5).abs() < 1e-9);
        assert_eq!(routes[0].waypoints.len(), 1);
    }

    #[test]
    fn no_route_code_maps_to_no_route_found() {
        let body = serde_json::json!({ "code": "NoRoute" });
        let p = Coordinates::new(0.0, 0.0);
        assert!(matches!(
            parse_routes(&body, p, p),
            Err(ProviderError::NoRouteFound)
        ));
    }

    #[test]
    fn parses_geocoding_features() {
        let body = serde_json::json!({
            "features": [
                {
                    "center": [-87.6278, 41.8827],
                    "place_name": "100 N State St, Chicago, Illinois 60602, United States"
                },
                { "center": [-87.65, 41.90], "place_name": "Other" }
            ]
        });

        let results = parse_geocode(&body).unwrap();
        assert_eq!(results.len(), 2);
        assert!((results[0].latitude - 41.8827).abs() < 1e-9);
        assert!((results[0].longitude - -87.6278).abs() < 1e-9);
    }

    #[test]
    fn feature_without_center_is_invalid() {
        let body = serde_json::json!({ "features": [ { "place_name": "nowhere" } ] });
        assert!(matches!(
            parse_geocode(&body),
            Err(ProviderError::InvalidResponse { .. })
        ));
    }
}
