#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Canonical route, geocoding, and provider error types.
//!
//! Every concrete provider adapter normalizes its wire responses into
//! these types and maps its native failures into [`ProviderError`]. The
//! retry and fallback layers only ever look at the canonical taxonomy.

use chrono::{DateTime, Utc};
use saferoute_geo::Coordinates;
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// A computed route, immutable once produced by an adapter.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Route {
    /// Provider-scoped route identifier.
    pub id: String,
    /// Requested origin.
    pub origin: Coordinates,
    /// Requested destination.
    pub destination: Coordinates,
    /// Ordered intermediate waypoints (step endpoints).
    pub waypoints: Vec<Coordinates>,
    /// Total distance in meters.
    pub distance_m: f64,
    /// Estimated travel time in seconds.
    pub duration_s: f64,
    /// Provider-encoded path geometry (opaque to the core).
    pub encoded_path: String,
    /// Name of the provider that produced the route.
    pub provider: String,
}

/// Travel mode for a routing request.
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
pub enum TravelMode {
    /// Car routing.
    Driving,
    /// Pedestrian routing.
    Walking,
    /// Bicycle routing.
    Cycling,
}

/// Optional routing preferences; absence means provider default.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteOptions {
    /// Avoid toll roads.
    pub avoid_tolls: Option<bool>,
    /// Avoid highways.
    pub avoid_highways: Option<bool>,
    /// Travel mode.
    pub mode: Option<TravelMode>,
    /// Desired departure time.
    pub departure_time: Option<DateTime<Utc>>,
}

/// A geocoding result with coordinates and the matched address.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeocodedAddress {
    /// Latitude (WGS84).
    pub latitude: f64,
    /// Longitude (WGS84).
    pub longitude: f64,
    /// The matched/canonical address returned by the geocoder.
    pub formatted: String,
    /// Which provider resolved this address.
    pub provider: String,
}

/// Live vs. baseline travel time estimate for a route.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrafficData {
    /// Current travel time estimate in seconds.
    pub current_duration_s: f64,
    /// Typical (no live traffic) travel time in seconds.
    pub typical_duration_s: f64,
}

/// Canonical provider failure taxonomy.
///
/// Every adapter maps its native wire errors into exactly one of these
/// variants; the retry policy decides retryability with
/// [`ProviderError::is_retryable`] instead of matching provider-specific
/// error codes.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// The provider could not find any route between the points.
    #[error("no route found")]
    NoRouteFound,

    /// Credentials were rejected or missing.
    #[error("{provider}: authentication failed")]
    AuthenticationFailed {
        /// Provider that rejected the credentials.
        provider: String,
    },

    /// The provider rate-limited the call (HTTP 429 class).
    #[error("{provider}: rate limited")]
    RateLimited {
        /// Provider that applied the limit.
        provider: String,
    },

    /// The provider was unreachable or failed server-side.
    #[error("{provider}: unavailable: {message}")]
    Unavailable {
        /// Provider that failed.
        provider: String,
        /// Description of the failure (timeout, HTTP 5xx, ...).
        message: String,
    },

    /// The provider answered with a payload the adapter cannot interpret.
    #[error("{provider}: invalid response: {message}")]
    InvalidResponse {
        /// Provider that produced the payload.
        provider: String,
        /// Description of the parse failure.
        message: String,
    },
}

impl ProviderError {
    /// Whether the retry policy may re-attempt the call.
    ///
    /// Only transient faults qualify: rate limiting and unavailability.
    /// Authentication failures, invalid payloads, and "no route" answers
    /// are terminal for the provider that produced them.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::RateLimited { .. } | Self::Unavailable { .. })
    }

    /// Name of the provider the error originated from, if attributable.
    #[must_use]
    pub fn provider(&self) -> Option<&str> {
        match self {
            Self::NoRouteFound => None,
            Self::AuthenticationFailed { provider }
            | Self::RateLimited { provider }
            | Self::Unavailable { provider, .. }
            | Self::InvalidResponse { provider, .. } => Some(provider),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p() -> String {
        "osrm".to_string()
    }

    #[test]
    fn retryable_variants() {
        assert!(ProviderError::RateLimited { provider: p() }.is_retryable());
        assert!(
            ProviderError::Unavailable {
                provider: p(),
                message: "HTTP 503".to_string(),
            }
            .is_retryable()
        );
    }

    #[test]
    fn terminal_variants() {
        assert!(!ProviderError::NoRouteFound.is_retryable());
        assert!(!ProviderError::AuthenticationFailed { provider: p() }.is_retryable());
        assert!(
            !ProviderError::InvalidResponse {
                provider: p(),
                message: "missing geometry".to_string(),
            }
            .is_retryable()
        );
    }

    #[test]
    fn travel_mode_serde_roundtrip() {
        let json = serde_json::to_string(&TravelMode::Driving).unwrap();
        assert_eq!(json, "\"DRIVING\"");
        let back: TravelMode = serde_json::from_str(&json).unwrap();
        assert_eq!(back, TravelMode::Driving);
    }
}
