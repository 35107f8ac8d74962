//! The risk scoring engine.
//!
//! `riskIndex = 0.30*frequency + 0.25*recency + 0.25*severity +
//! 0.20*confidence`, each factor independently clamped to [0, 100].
//! Only `Active` occurrences within the last 30 days qualify. Computed
//! indexes are persisted one-per-region and served through a short TTL
//! read cache.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration as StdDuration, Instant};

use chrono::{DateTime, Duration, Utc};
use saferoute_geo::Coordinates;
use saferoute_geo::region::RegionIndex;
use saferoute_risk_models::{
    CrimeTypeCatalog, Occurrence, OccurrenceStatus, RiskFactors, RiskIndex,
};

use crate::store::{OccurrenceStore, RiskIndexStore};
use crate::{RiskResult, StoreError};

/// Rolling window of occurrences that qualify for scoring.
const SCORING_WINDOW_DAYS: i64 = 30;

/// Incident count that saturates half of the frequency scale.
const FREQUENCY_BASELINE: f64 = 10.0;

/// Recency decay constant in days (a ~7-day half-life feel).
const RECENCY_DECAY_DAYS: f64 = 7.0;

/// Maximum confidence score an occurrence can carry.
const MAX_CONFIDENCE: f64 = 5.0;

/// How long a computed index may be served from the read cache.
const CACHE_TTL: StdDuration = StdDuration::from_secs(5 * 60);

struct CachedIndex {
    index: RiskIndex,
    cached_at: Instant,
}

/// Computes and serves per-region risk indexes.
pub struct RiskEngine {
    occurrences: Arc<dyn OccurrenceStore>,
    indexes: Arc<dyn RiskIndexStore>,
    regions: Arc<RegionIndex>,
    catalog: CrimeTypeCatalog,
    cache: Mutex<BTreeMap<String, CachedIndex>>,
}

impl RiskEngine {
    /// Creates an engine over the injected stores and region index.
    #[must_use]
    pub fn new(
        occurrences: Arc<dyn OccurrenceStore>,
        indexes: Arc<dyn RiskIndexStore>,
        regions: Arc<RegionIndex>,
        catalog: CrimeTypeCatalog,
    ) -> Self {
        Self {
            occurrences,
            indexes,
            regions,
            catalog,
            cache: Mutex::new(BTreeMap::new()),
        }
    }

    /// The crime type catalog the engine scores against.
    #[must_use]
    pub const fn catalog(&self) -> &CrimeTypeCatalog {
        &self.catalog
    }

    /// Computes the current risk index value for a region.
    ///
    /// Regions with zero qualifying occurrences score exactly 0. The
    /// result is always within [0, 100].
    ///
    /// # Errors
    ///
    /// Returns [`crate::RiskError`] if the occurrence store fails.
    pub async fn calculate_risk_index(&self, region_id: &str) -> RiskResult<f64> {
        let now = Utc::now();
        let qualifying = self.qualifying_occurrences(region_id, now).await?;

        if qualifying.is_empty() {
            return Ok(0.0);
        }

        let factors = compute_factors(&qualifying, now, &self.catalog);
        Ok(factors.weighted_total().clamp(0.0, 100.0))
    }

    /// Recomputes and persists the risk index for a region.
    ///
    /// Overwrites any previous index for the region and invalidates the
    /// read cache so the fresh value is visible immediately.
    ///
    /// # Errors
    ///
    /// Returns [`crate::RiskError`] if a store operation fails.
    pub async fn recalculate_region_risk(&self, region_id: &str) -> RiskResult<RiskIndex> {
        let now = Utc::now();
        let qualifying = self.qualifying_occurrences(region_id, now).await?;

        let factors = compute_factors(&qualifying, now, &self.catalog);
        let index = RiskIndex {
            region_id: region_id.to_string(),
            value: factors.weighted_total().clamp(0.0, 100.0),
            factors,
            occurrence_count: qualifying.len(),
            dominant_crime_type_id: dominant_crime_type(&qualifying),
            calculated_at: now,
        };

        self.indexes.upsert(&index).await?;
        self.cache_insert(index.clone())?;

        log::debug!(
            "Recalculated risk for region {region_id}: {:.2} ({} occurrences)",
            index.value,
            index.occurrence_count
        );

        Ok(index)
    }

    /// Returns the persisted risk index for the most specific region
    /// containing the coordinates.
    ///
    /// `None` means either no region contains the point or no index has
    /// been computed yet — callers must treat it as *unknown* risk, not
    /// zero risk.
    ///
    /// # Errors
    ///
    /// Returns [`crate::RiskError`] if the index store fails.
    pub async fn get_risk_for_coordinates(
        &self,
        coords: Coordinates,
    ) -> RiskResult<Option<RiskIndex>> {
        let Some(region) = self.regions.locate_most_specific(coords) else {
            return Ok(None);
        };
        let region_id = region.id.clone();
        self.get_risk_for_region(&region_id).await
    }

    /// Returns one risk index per unique region visited by the ordered
    /// waypoint list, preserving waypoint order.
    ///
    /// Regions without a computed index are skipped (unknown, not zero).
    ///
    /// # Errors
    ///
    /// Returns [`crate::RiskError`] if the index store fails.
    pub async fn get_risk_along_route(
        &self,
        waypoints: &[Coordinates],
    ) -> RiskResult<Vec<RiskIndex>> {
        let mut seen: Vec<String> = Vec::new();
        let mut results = Vec::new();

        for waypoint in waypoints {
            let Some(region) = self.regions.locate_most_specific(*waypoint) else {
                continue;
            };
            if seen.iter().any(|id| id == &region.id) {
                continue;
            }
            seen.push(region.id.clone());

            let region_id = region.id.clone();
            if let Some(index) = self.get_risk_for_region(&region_id).await? {
                results.push(index);
            }
        }

        Ok(results)
    }

    /// Cached lookup of the persisted index for a region.
    ///
    /// # Errors
    ///
    /// Returns [`crate::RiskError`] if the index store fails.
    pub async fn get_risk_for_region(&self, region_id: &str) -> RiskResult<Option<RiskIndex>> {
        if let Some(index) = self.cache_get(region_id)? {
            return Ok(Some(index));
        }

        let Some(index) = self.indexes.get(region_id).await? else {
            return Ok(None);
        };
        self.cache_insert(index.clone())?;
        Ok(Some(index))
    }

    async fn qualifying_occurrences(
        &self,
        region_id: &str,
        now: DateTime<Utc>,
    ) -> RiskResult<Vec<Occurrence>> {
        let window_start = now - Duration::days(SCORING_WINDOW_DAYS);
        let all = self.occurrences.occurrences_for_region(region_id).await?;
        Ok(all
            .into_iter()
            .filter(|o| {
                o.status == OccurrenceStatus::Active
                    && o.occurred_at >= window_start
                    && o.occurred_at <= now
            })
            .collect())
    }

    fn cache_get(&self, region_id: &str) -> Result<Option<RiskIndex>, StoreError> {
        let mut cache = self
            .cache
            .lock()
            .map_err(|_| StoreError::new("risk cache mutex poisoned"))?;

        match cache.get(region_id) {
            Some(cached) if cached.cached_at.elapsed() < CACHE_TTL => {
                Ok(Some(cached.index.clone()))
            }
            Some(_) => {
                cache.remove(region_id);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    fn cache_insert(&self, index: RiskIndex) -> Result<(), StoreError> {
        let mut cache = self
            .cache
            .lock()
            .map_err(|_| StoreError::new("risk cache mutex poisoned"))?;
        cache.insert(
            index.region_id.clone(),
            CachedIndex {
                index,
                cached_at: Instant::now(),
            },
        );
        Ok(())
    }
}

/// Computes the four factor contributions for a set of qualifying
/// occurrences. Each factor is clamped to [0, 100] independently.
///
/// Empty input yields all-zero factors.
#[must_use]
pub fn compute_factors(
    occurrences: &[Occurrence],
    now: DateTime<Utc>,
    catalog: &CrimeTypeCatalog,
) -> RiskFactors {
    if occurrences.is_empty() {
        return RiskFactors {
            frequency: 0.0,
            recency: 0.0,
            severity: 0.0,
            confidence: 0.0,
        };
    }

    #[allow(clippy::cast_precision_loss)]
    let count = occurrences.len() as f64;

    let frequency = (count / FREQUENCY_BASELINE * 50.0).min(100.0);

    let recency_sum: f64 = occurrences
        .iter()
        .map(|o| {
            let days_ago = days_between(o.occurred_at, now).max(0.0);
            (-days_ago / RECENCY_DECAY_DAYS).exp()
        })
        .sum();
    let recency = recency_sum / count * 100.0;

    let severity_sum: f64 = occurrences
        .iter()
        .map(|o| o.severity.multiplier() * catalog.weight(o.crime_type_id))
        .sum();
    let severity = severity_sum / count * 100.0;

    let confidence_sum: f64 = occurrences
        .iter()
        .map(|o| o.confidence_score.clamp(0.0, MAX_CONFIDENCE))
        .sum();
    let confidence = confidence_sum / (count * MAX_CONFIDENCE) * 100.0;

    RiskFactors {
        frequency: frequency.clamp(0.0, 100.0),
        recency: recency.clamp(0.0, 100.0),
        severity: severity.clamp(0.0, 100.0),
        confidence: confidence.clamp(0.0, 100.0),
    }
}

/// Most frequent crime type among the occurrences.
///
/// Equal counts resolve to the lowest crime type id so repeated
/// recalculations are deterministic.
#[must_use]
pub fn dominant_crime_type(occurrences: &[Occurrence]) -> Option<i32> {
    let mut counts: BTreeMap<i32, usize> = BTreeMap::new();
    for occurrence in occurrences {
        *counts.entry(occurrence.crime_type_id).or_insert(0) += 1;
    }

    // Equal counts compare by descending id so `max_by` lands on the
    // lowest id.
    counts
        .iter()
        .max_by(|a, b| a.1.cmp(b.1).then_with(|| b.0.cmp(a.0)))
        .map(|(id, _)| *id)
}

fn days_between(earlier: DateTime<Utc>, later: DateTime<Utc>) -> f64 {
    #[allow(clippy::cast_precision_loss)]
    let seconds = (later - earlier).num_seconds() as f64;
    seconds / 86_400.0
}
