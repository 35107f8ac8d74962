//! Concrete provider adapters.
//!
//! One module per external service. Each adapter translates its own wire
//! protocol into the canonical route/geocode types and maps its native
//! failures into the [`ProviderError`] taxonomy. Response parsing is
//! done by pure functions over [`serde_json::Value`] so it can be unit
//! tested against canned fixtures without HTTP.

pub mod graphhopper;
pub mod mapbox;
pub mod openrouteservice;
pub mod osrm;
pub mod tomtom;

use saferoute_routing_models::ProviderError;

/// Maps a reqwest transport error into the canonical taxonomy.
///
/// Timeouts and connection failures are transient unavailability; a
/// body that cannot be decoded is an invalid response.
pub(crate) fn map_transport_error(provider: &str, e: &reqwest::Error) -> ProviderError {
    if e.is_decode() {
        ProviderError::InvalidResponse {
            provider: provider.to_string(),
            message: e.to_string(),
        }
    } else {
        ProviderError::Unavailable {
            provider: provider.to_string(),
            message: e.to_string(),
        }
    }
}

/// Maps an HTTP status shared across providers into the taxonomy.
///
/// Returns `None` for statuses the caller must interpret itself (2xx
/// success payloads, provider-specific 4xx error bodies).
pub(crate) fn map_status(provider: &str, status: reqwest::StatusCode) -> Option<ProviderError> {
    use reqwest::StatusCode;

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            Some(ProviderError::AuthenticationFailed {
                provider: provider.to_string(),
            })
        }
        StatusCode::TOO_MANY_REQUESTS => Some(ProviderError::RateLimited {
            provider: provider.to_string(),
        }),
        s if s.is_server_error() => Some(ProviderError::Unavailable {
            provider: provider.to_string(),
            message: format!("HTTP {s}"),
        }),
        _ => None,
    }
}

/// Shorthand for the "field missing from response" parse failure.
pub(crate) fn invalid(provider: &str, message: impl Into<String>) -> ProviderError {
    ProviderError::InvalidResponse {
        provider: provider.to_string(),
        message: message.into(),
    }
}

/// Probes a URL and reports whether the service answers HTTP at all.
///
/// Any HTTP response counts as reachable (even an error status);
/// only transport failures mean unavailable.
pub(crate) async fn probe(client: &reqwest::Client, url: &str) -> bool {
    match client.get(url).send().await {
        Ok(_) => true,
        Err(e) => {
            log::debug!("Availability probe for {url} failed: {e}");
            false
        }
    }
}

/// Fresh provider-scoped route id.
pub(crate) fn route_id(provider: &str) -> String {
    format!("{provider}-{}", uuid::Uuid::new_v4())
}
