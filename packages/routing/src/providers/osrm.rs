//! OSRM + Nominatim adapter — the free, keyless baseline provider.
//!
//! Routing goes to an OSRM instance (`router.project-osrm.org` by
//! default) and geocoding to Nominatim. Neither requires credentials,
//! so this adapter always remains usable as the fallback of last
//! resort. The public Nominatim instance is rate limited to roughly one
//! request per second; the quota configuration reflects that.
//!
//! See <http://project-osrm.org/docs/v5.24.0/api/> and
//! <https://nominatim.org/release-docs/develop/api/Search/>

use async_trait::async_trait;
use saferoute_geo::Coordinates;
use saferoute_routing_models::{
    GeocodedAddress, ProviderError, Route, RouteOptions, TrafficData, TravelMode,
};

use super::{invalid, map_status, map_transport_error, probe, route_id};
use crate::{MAX_GEOCODE_RESULTS, RouteProvider};

/// Stable adapter name.
pub const PROVIDER_NAME: &str = "osrm";

/// OSRM routing + Nominatim geocoding adapter.
pub struct OsrmProvider {
    client: reqwest::Client,
    routing_url: String,
    geocoding_url: String,
}

impl OsrmProvider {
    /// Creates the adapter against explicit base URLs.
    #[must_use]
    pub fn new(
        client: reqwest::Client,
        routing_url: impl Into<String>,
        geocoding_url: impl Into<String>,
    ) -> Self {
        Self {
            client,
            routing_url: routing_url.into(),
            geocoding_url: geocoding_url.into(),
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
            _ => "driving",
        };
        let url = format!(
            "{}/route/v1/{profile}/{},{};{},{}",
            self.routing_url,
            origin.longitude,
            origin.latitude,
            destination.longitude,
            destination.latitude,
        );

        let mut query: Vec<(&str, String)> = vec![
            ("overview", "full".to_string()),
            ("steps", "true".to_string()),
        ];
        if count > 1 {
            query.push(("alternatives", count.to_string()));
        }
        let excludes = exclude_classes(options);
        if !excludes.is_empty() {
            query.push(("exclude", excludes.join(",")));
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
impl RouteProvider for OsrmProvider {
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
        let url = format!("{}/search", self.geocoding_url);
        let response = self
            .client
            .get(&url)
            .query(&[
                ("q", address),
                ("format", "jsonv2"),
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
        let url = format!("{}/reverse", self.geocoding_url);
        let response = self
            .client
            .get(&url)
            .query(&[
                ("lat", coords.latitude.to_string()),
                ("lon", coords.longitude.to_string()),
                ("format", "jsonv2".to_string()),
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

        parse_reverse(&body)
    }

    async fn traffic_data(&self, route: &Route) -> Result<TrafficData, ProviderError> {
        // OSRM carries no live traffic feed; report the static estimate
        // for both values so drift never triggers from this provider.
        Ok(TrafficData {
            current_duration_s: route.duration_s,
            typical_duration_s: route.duration_s,
        })
    }

    async fn is_available(&self) -> bool {
        let url = format!(
            "{}/route/v1/driving/13.38886,52.517037;13.397634,52.529407?overview=false",
            self.routing_url
        );
        probe(&self.client, &url).await
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

/// Parses an OSRM `/route` response into canonical routes.
fn parse_routes(
    body: &serde_json::Value,
    origin: Coordinates,
    destination: Coordinates,
) -> Result<Vec<Route>, ProviderError> {
    let code = body["code"]
        .as_str()
        .ok_or_else(|| invalid(PROVIDER_NAME, "missing code in OSRM response"))?;

    match code {
        "Ok" => {}
        "NoRoute" | "NoSegment" | "NoMatch" => return Err(ProviderError::NoRouteFound),
        other => {
            return Err(invalid(PROVIDER_NAME, format!("OSRM error code {other}")));
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

            // Step endpoints become the waypoints the risk analyzer walks.
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

/// Parses a Nominatim search response (array of string-typed lat/lon).
fn parse_geocode(body: &serde_json::Value) -> Result<Vec<GeocodedAddress>, ProviderError> {
    let results = body
        .as_array()
        .ok_or_else(|| invalid(PROVIDER_NAME, "Nominatim response is not an array"))?;

    results
        .iter()
        .take(MAX_GEOCODE_RESULTS)
        .map(|entry| {
            let latitude = entry["lat"]
                .as_str()
                .and_then(|s| s.parse::<f64>().ok())
                .ok_or_else(|| invalid(PROVIDER_NAME, "missing lat in Nominatim response"))?;
            let longitude = entry["lon"]
                .as_str()
                .and_then(|s| s.parse::<f64>().ok())
                .ok_or_else(|| invalid(PROVIDER_NAME, "missing lon in Nominatim response"))?;
            let formatted = entry["display_name"].as_str().unwrap_or_default().to_string();

            Ok(GeocodedAddress {
                latitude,
                longitude,
                formatted,
                provider: PROVIDER_NAME.to_string(),
            })
        })
        .collect()
}

/// Parses a Nominatim reverse response (single object).
fn parse_reverse(body: &serde_json::Value) -> Result<GeocodedAddress, ProviderError> {
    if let Some(error) = body["error"].as_str() {
        return Err(invalid(PROVIDER_NAME, format!("Nominatim: {error}")));
    }

    let latitude = body["lat"]
        .as_str()
        .and_then(|s| s.parse::<f64>().ok())
        .ok_or_else(|| invalid(PROVIDER_NAME, "missing lat in Nominatim reverse response"))?;
    let longitude = body["lon"]
        .as_str()
        .and_then(|s| s.parse::<f64>().ok())
        .ok_or_else(|| invalid(PROVIDER_NAME, "missing lon in Nominatim reverse response"))?;
    let formatted = body["display_name"].as_str().unwrap_or_default().to_string();

    Ok(GeocodedAddress {
        latitude,
        longitude,
        formatted,
        provider: PROVIDER_NAME.to_string(),
    })
}
