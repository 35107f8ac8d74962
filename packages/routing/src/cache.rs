//! Geocoding result cache with a degraded-operation fallback tier.
//!
//! Results are cached twice under the same fingerprint: a short-TTL
//! primary entry for normal operation, and a long-lived fallback mirror
//! consulted only after every live provider has failed. That keeps
//! geocoding functional (if stale) through provider outages.
//!
//! Fingerprints are the normalized address, or the coordinate pair
//! rounded to 5 decimal places (~1 meter) for reverse lookups.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use saferoute_geo::Coordinates;
use saferoute_routing_models::GeocodedAddress;

use crate::StoreError;

/// Primary entry lifetime.
const PRIMARY_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Fallback mirror lifetime.
const FALLBACK_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Shared key-value store with per-entry expiry.
///
/// Implementations return `None` for expired entries. A shared
/// deployment would back this with Redis `SET ... EX`; the in-memory
/// implementation serves tests and single-process use.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Fetches an unexpired entry.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the underlying store fails.
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Stores an entry that expires after `ttl`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the underlying store fails.
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError>;
}

/// In-memory cache store for tests and single-process deployments.
#[derive(Debug, Default)]
pub struct InMemoryCacheStore {
    entries: Mutex<BTreeMap<String, (String, Instant)>>,
}

impl InMemoryCacheStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CacheStore for InMemoryCacheStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| StoreError::new("cache store mutex poisoned"))?;
        match entries.get(key) {
            Some((value, expires_at)) if *expires_at > Instant::now() => Ok(Some(value.clone())),
            Some(_) => {
                entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| StoreError::new("cache store mutex poisoned"))?;
        entries.insert(key.to_string(), (value.to_string(), Instant::now() + ttl));
        Ok(())
    }
}

/// Two-tier cache for geocode and reverse-geocode results.
pub struct GeocodeCache {
    store: Arc<dyn CacheStore>,
}

impl GeocodeCache {
    /// Creates a cache over the injected store.
    #[must_use]
    pub fn new(store: Arc<dyn CacheStore>) -> Self {
        Self {
            store,
        }
    }

    /// Primary-tier lookup for a forward geocode.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the store fails.
    pub async fn geocode_hit(&self, address: &str) -> Result<Option<Vec<GeocodedAddress>>, StoreError> {
        self.read(&primary_key(&address_fingerprint(address))).await
    }

    /// Fallback-tier lookup for a forward geocode, consulted only after
    /// every live provider has failed.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the store fails.
    pub async fn geocode_fallback(
        &self,
        address: &str,
    ) -> Result<Option<Vec<GeocodedAddress>>, StoreError> {
        self.read(&fallback_key(&address_fingerprint(address))).await
    }

    /// Stores a successful forward geocode in both tiers.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the store fails.
    pub async fn store_geocode(
        &self,
        address: &str,
        results: &[GeocodedAddress],
    ) -> Result<(), StoreError> {
        let fingerprint = address_fingerprint(address);
        self.write(&fingerprint, results).await
    }

    /// Primary-tier lookup for a reverse geocode.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the store fails.
    pub async fn reverse_hit(
        &self,
        coords: Coordinates,
    ) -> Result<Option<Vec<GeocodedAddress>>, StoreError> {
        self.read(&primary_key(&coords_fingerprint(coords))).await
    }

    /// Fallback-tier lookup for a reverse geocode.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the store fails.
    pub async fn reverse_fallback(
        &self,
        coords: Coordinates,
    ) -> Result<Option<Vec<GeocodedAddress>>, StoreError> {
        self.read(&fallback_key(&coords_fingerprint(coords))).await
    }

    /// Stores a successful reverse geocode in both tiers.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the store fails.
    pub async fn store_reverse(
        &self,
        coords: Coordinates,
        result: &GeocodedAddress,
    ) -> Result<(), StoreError> {
        let fingerprint = coords_fingerprint(coords);
        self.write(&fingerprint, std::slice::from_ref(result)).await
    }

    async fn read(&self, key: &str) -> Result<Option<Vec<GeocodedAddress>>, StoreError> {
        let Some(raw) = self.store.get(key).await? else {
            return Ok(None);
        };
        match serde_json::from_str(&raw) {
            Ok(results) => Ok(Some(results)),
            Err(e) => {
                // A corrupt entry is treated as a miss rather than an error.
                log::warn!("Dropping corrupt geocode cache entry {key}: {e}");
                Ok(None)
            }
        }
    }

    async fn write(&self, fingerprint: &str, results: &[GeocodedAddress]) -> Result<(), StoreError> {
        let raw = serde_json::to_string(results)
            .map_err(|e| StoreError::new(format!("serialize geocode cache entry: {e}")))?;
        self.store
            .set(&primary_key(fingerprint), &raw, PRIMARY_TTL)
            .await?;
        self.store
            .set(&fallback_key(fingerprint), &raw, FALLBACK_TTL)
            .await?;
        Ok(())
    }
}

/// Normalizes an address into a cache fingerprint: lowercased with
/// whitespace runs collapsed.
fn address_fingerprint(address: &str) -> String {
    address
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Rounds coordinates to 5 decimal places (~1 meter) so nearby reverse
/// lookups share an entry.
fn coords_fingerprint(coords: Coordinates) -> String {
    format!("{:.5},{:.5}", coords.latitude, coords.longitude)
}

fn primary_key(fingerprint: &str) -> String {
    format!("geocode:{fingerprint}")
}

fn fallback_key(fingerprint: &str) -> String {
    format!("geocode_fallback:{fingerprint}")
}
