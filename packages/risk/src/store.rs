//! Injected store traits for occurrences and persisted risk indexes.
//!
//! The engine never owns incident ingestion — it reads occurrences from
//! whatever store the deployment wires in. The in-memory implementations
//! back unit tests and single-process deployments.

use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;
use saferoute_risk_models::{Occurrence, RiskIndex};

use crate::{StoreError, StoreResult};

/// Read access to the external incident store.
#[async_trait]
pub trait OccurrenceStore: Send + Sync {
    /// Returns every occurrence attributed to the region, regardless of
    /// status or age. The engine applies the active-status and 30-day
    /// window qualification itself.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the underlying store fails.
    async fn occurrences_for_region(&self, region_id: &str) -> StoreResult<Vec<Occurrence>>;
}

/// Persistence for computed risk indexes, one row per region.
#[async_trait]
pub trait RiskIndexStore: Send + Sync {
    /// Inserts or overwrites the index for its region.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the underlying store fails.
    async fn upsert(&self, index: &RiskIndex) -> StoreResult<()>;

    /// Fetches the persisted index for a region, if one was computed.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the underlying store fails.
    async fn get(&self, region_id: &str) -> StoreResult<Option<RiskIndex>>;
}

/// In-memory occurrence store for tests and single-process deployments.
#[derive(Debug, Default)]
pub struct InMemoryOccurrenceStore {
    occurrences: Mutex<Vec<Occurrence>>,
}

impl InMemoryOccurrenceStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an occurrence.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn insert(&self, occurrence: Occurrence) {
        self.occurrences
            .lock()
            .expect("occurrence store mutex poisoned")
            .push(occurrence);
    }
}

#[async_trait]
impl OccurrenceStore for InMemoryOccurrenceStore {
    async fn occurrences_for_region(&self, region_id: &str) -> StoreResult<Vec<Occurrence>> {
        let occurrences = self
            .occurrences
            .lock()
            .map_err(|_| StoreError::new("occurrence store mutex poisoned"))?;
        Ok(occurrences
            .iter()
            .filter(|o| o.region_id == region_id)
            .cloned()
            .collect())
    }
}

/// In-memory risk index store for tests and single-process deployments.
#[derive(Debug, Default)]
pub struct InMemoryRiskIndexStore {
    indexes: Mutex<BTreeMap<String, RiskIndex>>,
}

impl InMemoryRiskIndexStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RiskIndexStore for InMemoryRiskIndexStore {
    async fn upsert(&self, index: &RiskIndex) -> StoreResult<()> {
        let mut indexes = self
            .indexes
            .lock()
            .map_err(|_| StoreError::new("risk index store mutex poisoned"))?;
        indexes.insert(index.region_id.clone(), index.clone());
        Ok(())
    }

    async fn get(&self, region_id: &str) -> StoreResult<Option<RiskIndex>> {
        let indexes = self
            .indexes
            .lock()
            .map_err(|_| StoreError::new("risk index store mutex poisoned"))?;
        Ok(indexes.get(region_id).cloned())
    }
}
