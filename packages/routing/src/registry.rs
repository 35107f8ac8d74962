//! Compile-time registry of routing service configurations.
//!
//! Each provider is defined in a TOML file under `services/`. The
//! registry embeds these at compile time, exposes them via
//! [`all_services`] and [`enabled_services`], and instantiates the
//! concrete adapters with [`build_providers`]. Keyed providers whose
//! environment variable is unset are skipped at startup; the keyless
//! OSRM baseline is always usable.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Deserialize;

use crate::RouteProvider;
use crate::providers::{
    graphhopper::GraphHopperProvider, mapbox::MapboxProvider,
    openrouteservice::OpenRouteServiceProvider, osrm::OsrmProvider, tomtom::TomTomProvider,
};
use crate::quota::QuotaLimits;

/// A routing service configuration loaded from TOML.
#[derive(Debug, Clone, Deserialize)]
pub struct RoutingService {
    /// Unique identifier (e.g., `"osrm"`, `"mapbox"`).
    pub id: String,
    /// Human-readable name.
    pub name: String,
    /// Whether this service participates in the fallback chain.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Fallback order — lower values are tried first.
    pub priority: u32,
    /// Monthly call allowance; `None` means unmetered.
    #[serde(default)]
    pub monthly_quota: Option<u64>,
    /// Estimated cost per API call in USD.
    #[serde(default)]
    pub cost_per_call_usd: f64,
    /// Provider-specific configuration.
    pub provider: ProviderConfig,
}

/// Provider-specific configuration, tagged by `type` in TOML.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProviderConfig {
    /// Keyless OSRM routing paired with Nominatim geocoding.
    Osrm {
        /// Routing API base URL.
        routing_url: String,
        /// Nominatim base URL.
        geocoding_url: String,
    },
    /// GraphHopper Directions API.
    Graphhopper {
        /// API base URL.
        base_url: String,
        /// Environment variable holding the API key.
        api_key_env: String,
    },
    /// Mapbox Directions + Geocoding.
    Mapbox {
        /// API base URL.
        base_url: String,
        /// Environment variable holding the access token.
        access_token_env: String,
    },
    /// OpenRouteService directions + Pelias geocoding.
    OpenRouteService {
        /// API base URL.
        base_url: String,
        /// Environment variable holding the API key.
        api_key_env: String,
    },
    /// TomTom Routing + Search.
    TomTom {
        /// API base URL.
        base_url: String,
        /// Environment variable holding the API key.
        api_key_env: String,
    },
}

const fn default_true() -> bool {
    true
}

impl RoutingService {
    /// Quota limits for this service, keyed into the quota manager.
    #[must_use]
    pub const fn quota_limits(&self) -> QuotaLimits {
        QuotaLimits {
            monthly_quota: self.monthly_quota,
            cost_per_call_usd: self.cost_per_call_usd,
        }
    }

    /// Builds the concrete adapter, or `None` when a required credential
    /// environment variable is unset.
    #[must_use]
    pub fn build(&self, client: &reqwest::Client) -> Option<Arc<dyn RouteProvider>> {
        match &self.provider {
            ProviderConfig::Osrm {
                routing_url,
                geocoding_url,
            } => Some(Arc::new(OsrmProvider::new(
                client.clone(),
                routing_url,
                geocoding_url,
            ))),
            ProviderConfig::Graphhopper {
                base_url,
                api_key_env,
            } => {
                let key = credential(&self.id, api_key_env)?;
                Some(Arc::new(GraphHopperProvider::new(
                    client.clone(),
                    base_url,
                    key,
                )))
            }
            ProviderConfig::Mapbox {
                base_url,
                access_token_env,
            } => {
                let token = credential(&self.id, access_token_env)?;
                Some(Arc::new(MapboxProvider::new(
                    client.clone(),
                    base_url,
                    token,
                )))
            }
            ProviderConfig::OpenRouteService {
                base_url,
                api_key_env,
            } => {
                let key = credential(&self.id, api_key_env)?;
                Some(Arc::new(OpenRouteServiceProvider::new(
                    client.clone(),
                    base_url,
                    key,
                )))
            }
            ProviderConfig::TomTom {
                base_url,
                api_key_env,
            } => {
                let key = credential(&self.id, api_key_env)?;
                Some(Arc::new(TomTomProvider::new(client.clone(), base_url, key)))
            }
        }
    }
}

fn credential(service_id: &str, env_var: &str) -> Option<String> {
    match std::env::var(env_var) {
        Ok(value) if !value.is_empty() => Some(value),
        _ => {
            log::info!("Skipping provider '{service_id}': {env_var} is not set");
            None
        }
    }
}

// Compile-time embedded TOML files.

const SERVICE_TOMLS: &[(&str, &str)] = &[
    ("osrm", include_str!("../services/osrm.toml")),
    ("graphhopper", include_str!("../services/graphhopper.toml")),
    ("mapbox", include_str!("../services/mapbox.toml")),
    (
        "openrouteservice",
        include_str!("../services/openrouteservice.toml"),
    ),
    ("tomtom", include_str!("../services/tomtom.toml")),
];

#[cfg(test)]
const EXPECTED_SERVICE_COUNT: usize = 5;

/// Returns all routing service configurations (enabled and disabled).
///
/// # Panics
///
/// Panics if any TOML config is malformed (this is a compile-time guarantee
/// since the configs are embedded).
#[must_use]
pub fn all_services() -> Vec<RoutingService> {
    SERVICE_TOMLS
        .iter()
        .map(|(name, toml_str)| {
            toml::de::from_str(toml_str)
                .unwrap_or_else(|e| panic!("Failed to parse routing service '{name}': {e}"))
        })
        .collect()
}

/// Returns only enabled services, sorted by priority (ascending).
#[must_use]
pub fn enabled_services() -> Vec<RoutingService> {
    let mut services: Vec<RoutingService> =
        all_services().into_iter().filter(|s| s.enabled).collect();
    services.sort_by_key(|s| s.priority);
    services
}

/// Instantiates adapters for every enabled service with credentials
/// available, in fallback order.
#[must_use]
pub fn build_providers(client: &reqwest::Client) -> Vec<Arc<dyn RouteProvider>> {
    enabled_services()
        .iter()
        .filter_map(|service| service.build(client))
        .collect()
}

/// Quota limits for every enabled service, keyed by service id.
#[must_use]
pub fn quota_limits() -> BTreeMap<String, QuotaLimits> {
    enabled_services()
        .into_iter()
        .map(|service| {
            let limits = service.quota_limits();
            (service.id, limits)
        })
        .collect()
}
