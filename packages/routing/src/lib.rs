#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Provider adapters and resilience layer for routing and geocoding.
//!
//! Every external map provider implements the [`RouteProvider`] contract
//! and maps its native failures into the canonical
//! [`saferoute_routing_models::ProviderError`] taxonomy. Resilience is
//! layered on top by composition rather than inheritance:
//!
//! 1. [`retry::RetryPolicy`] — bounded retry of transient faults.
//! 2. [`quota::QuotaManager`] — pre-flight admission with probabilistic
//!    shedding near the billing quota.
//! 3. [`fallback::ResilientRouter`] — sequences providers, remembers the
//!    last one that worked, and serves geocodes from a long-lived
//!    fallback cache when every live provider is down.
//!
//! Providers are configured via TOML files under `services/`, embedded
//! at compile time (see [`registry`]).

pub mod cache;
pub mod fallback;
pub mod providers;
pub mod quota;
pub mod registry;
pub mod retry;

use std::time::Duration;

use async_trait::async_trait;
use saferoute_geo::Coordinates;
use saferoute_routing_models::{GeocodedAddress, ProviderError, Route, RouteOptions, TrafficData};

pub use fallback::ResilientRouter;
pub use quota::{CounterStore, InMemoryCounterStore, QuotaManager, QuotaUsage};
pub use retry::RetryPolicy;

/// Maximum geocoding results any provider returns for one query.
pub const MAX_GEOCODE_RESULTS: usize = 5;

/// Per-request HTTP timeout. Sized to tolerate long-distance route
/// computation on slow providers.
pub const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// The uniform operation set every routing/geocoding provider implements.
///
/// Implementations translate their own wire protocols and error codes
/// into the canonical types; they carry no retry, quota, or caching
/// logic of their own.
#[async_trait]
pub trait RouteProvider: Send + Sync {
    /// Stable provider name (e.g., `"osrm"`), recorded on every route.
    fn name(&self) -> &str;

    /// Calculates a single route between two points.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError`] mapped from the provider's native
    /// failure.
    async fn calculate_route(
        &self,
        origin: Coordinates,
        destination: Coordinates,
        options: RouteOptions,
    ) -> Result<Route, ProviderError>;

    /// Calculates up to `count` alternative routes between two points.
    ///
    /// Providers that cannot produce alternatives return a single route.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError`] mapped from the provider's native
    /// failure.
    async fn calculate_alternative_routes(
        &self,
        origin: Coordinates,
        destination: Coordinates,
        count: usize,
        options: RouteOptions,
    ) -> Result<Vec<Route>, ProviderError>;

    /// Geocodes a free-form address to up to [`MAX_GEOCODE_RESULTS`]
    /// candidates.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError`] mapped from the provider's native
    /// failure.
    async fn geocode(&self, address: &str) -> Result<Vec<GeocodedAddress>, ProviderError>;

    /// Resolves coordinates to a single address.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError`] mapped from the provider's native
    /// failure.
    async fn reverse_geocode(&self, coords: Coordinates) -> Result<GeocodedAddress, ProviderError>;

    /// Live vs. typical travel time for an existing route.
    ///
    /// Providers without live traffic report the route's own duration
    /// for both values.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError`] mapped from the provider's native
    /// failure.
    async fn traffic_data(&self, route: &Route) -> Result<TrafficData, ProviderError>;

    /// Whether the provider currently answers HTTP at all.
    async fn is_available(&self) -> bool;
}

/// Error surfaced by an injected counter or cache store.
#[derive(Debug, thiserror::Error)]
#[error("{message}")]
pub struct StoreError {
    /// Description of the store failure.
    pub message: String,
}

impl StoreError {
    /// Creates a store error from any displayable cause.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Errors from the resilient routing layer.
#[derive(Debug, thiserror::Error)]
pub enum RoutingError {
    /// A provider answered definitively that no route exists.
    #[error("no route found")]
    NoRouteFound,

    /// Every admitted provider failed; carries the last provider error.
    #[error("all providers failed: {last}")]
    AllProvidersFailed {
        /// The final error encountered before giving up.
        #[source]
        last: ProviderError,
    },

    /// Every provider's call was shed by quota throttling.
    #[error("call shed by quota throttling")]
    QuotaThrottled,

    /// No providers are configured at all.
    #[error("no providers configured")]
    NoProvidersConfigured,

    /// A counter or cache store failed.
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

/// Builds the shared HTTP client used by all adapters.
///
/// # Panics
///
/// Panics if the TLS backend cannot be initialized — nothing works
/// without an HTTP client, so this is a startup failure.
#[must_use]
pub fn default_http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(HTTP_TIMEOUT)
        .user_agent(concat!("saferoute/", env!("CARGO_PKG_VERSION")))
        .build()
        .expect("Failed to build HTTP client")
}
