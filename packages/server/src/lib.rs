#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Actix-Web API server for risk-aware routing.
//!
//! Wires the provider registry, quota manager, geocode cache, risk
//! engine, and navigation manager into one HTTP surface. All stores are
//! in-memory in this deployment; the store traits are the seams where a
//! shared database would be plugged in.

mod handlers;

use std::sync::Arc;

use actix_cors::Cors;
use actix_web::{App, HttpServer, middleware, web};
use saferoute_geo::region::{Region, RegionIndex, regions_from_feature_collection};
use saferoute_navigation::{
    InMemorySessionStore, NavigationManager, RouteRiskAnalyzer, SafeRouteSelector,
};
use saferoute_risk::{InMemoryOccurrenceStore, InMemoryRiskIndexStore, OccurrenceStore, RiskEngine};
use saferoute_risk_models::{CrimeType, CrimeTypeCatalog};
use saferoute_routing::cache::{GeocodeCache, InMemoryCacheStore};
use saferoute_routing::{InMemoryCounterStore, QuotaManager, ResilientRouter, registry};

/// Shared application state.
pub struct AppState {
    /// Resilient routing layer over every configured provider.
    pub router: Arc<ResilientRouter>,
    /// Risk-ranked route selection.
    pub selector: Arc<SafeRouteSelector>,
    /// Per-route risk analysis.
    pub analyzer: Arc<RouteRiskAnalyzer>,
    /// Navigation session lifecycle and recalculation.
    pub navigation: Arc<NavigationManager>,
    /// External incident store, read for the incidents overlay.
    pub occurrences: Arc<dyn OccurrenceStore>,
}

/// Default crime type weights used when no catalog is configured.
fn default_crime_types() -> CrimeTypeCatalog {
    let entry = |id: i32, label: &str, weight: f64| CrimeType {
        id,
        label: label.to_string(),
        weight,
    };
    CrimeTypeCatalog::new(vec![
        entry(1, "Homicide", 1.0),
        entry(2, "Robbery", 1.0),
        entry(3, "Assault", 0.9),
        entry(4, "Burglary", 0.7),
        entry(5, "Vehicle Theft", 0.6),
        entry(6, "Theft", 0.5),
        entry(7, "Harassment", 0.4),
        entry(8, "Vandalism", 0.3),
    ])
}

/// Loads region boundaries from the GeoJSON file named by
/// `REGION_DATA_PATH`, or none when the variable is unset.
///
/// # Panics
///
/// Panics if the file cannot be read or parsed — a server with a broken
/// region configuration should not start.
fn load_regions() -> Vec<Region> {
    let Ok(path) = std::env::var("REGION_DATA_PATH") else {
        log::warn!("REGION_DATA_PATH not set; risk analysis will see no regions");
        return Vec::new();
    };

    let raw = std::fs::read_to_string(&path)
        .unwrap_or_else(|e| panic!("Failed to read region data from {path}: {e}"));
    let regions = regions_from_feature_collection(&raw)
        .unwrap_or_else(|e| panic!("Failed to parse region data from {path}: {e}"));
    log::info!("Loaded {} regions from {path}", regions.len());
    regions
}

/// Starts the routing API server.
///
/// Builds every provider adapter with credentials available, layers the
/// quota manager and geocode cache on top, constructs the risk engine
/// over the configured region boundaries, and starts the Actix-Web HTTP
/// server. This is a regular async function — the caller is responsible
/// for providing the async runtime (e.g. via `#[actix_web::main]`).
///
/// # Errors
///
/// Returns an `std::io::Result` error if the HTTP server fails to bind
/// or encounters a runtime error.
///
/// # Panics
///
/// Panics if `REGION_DATA_PATH` points at a file that cannot be read or
/// parsed.
#[allow(clippy::future_not_send)]
pub async fn run_server() -> std::io::Result<()> {
    pretty_env_logger::init_custom_env("RUST_LOG");

    let client = saferoute_routing::default_http_client();
    let providers = registry::build_providers(&client);
    log::info!(
        "Configured {} routing providers: {}",
        providers.len(),
        providers
            .iter()
            .map(|p| p.name().to_string())
            .collect::<Vec<_>>()
            .join(", ")
    );

    let quota = QuotaManager::new(
        Arc::new(InMemoryCounterStore::new()),
        registry::quota_limits(),
    );
    let cache = GeocodeCache::new(Arc::new(InMemoryCacheStore::new()));
    let router = Arc::new(ResilientRouter::new(providers, quota, cache));

    let occurrences: Arc<dyn OccurrenceStore> = Arc::new(InMemoryOccurrenceStore::new());
    let engine = Arc::new(RiskEngine::new(
        Arc::clone(&occurrences),
        Arc::new(InMemoryRiskIndexStore::new()),
        Arc::new(RegionIndex::new(load_regions())),
        default_crime_types(),
    ));

    let analyzer = Arc::new(RouteRiskAnalyzer::new(engine));
    let selector = Arc::new(SafeRouteSelector::new(
        Arc::clone(&router),
        Arc::clone(&analyzer),
    ));
    let navigation = Arc::new(NavigationManager::new(
        Arc::new(InMemorySessionStore::new()),
        Arc::clone(&router),
        Arc::clone(&analyzer),
    ));

    let state = web::Data::new(AppState {
        router,
        selector,
        analyzer,
        navigation,
        occurrences,
    });

    let bind_addr = std::env::var("BIND_ADDR").unwrap_or_else(|_| "127.0.0.1".to_string());
    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(8080);

    log::info!("Starting server on {bind_addr}:{port}");

    HttpServer::new(move || {
        let cors = Cors::permissive();

        App::new()
            .wrap(cors)
            .wrap(middleware::Logger::default())
            .app_data(state.clone())
            .service(
                web::scope("/api")
                    .route("/health", web::get().to(handlers::health))
                    .route("/routes", web::post().to(handlers::calculate_route))
                    .route(
                        "/routes/recalculate",
                        web::post().to(handlers::recalculate_route),
                    )
                    .route("/quota", web::get().to(handlers::quota)),
            )
    })
    .bind((bind_addr, port))?
    .run()
    .await
}
