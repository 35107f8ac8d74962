#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Per-region crime risk scoring engine.
//!
//! Converts recent occurrences into a bounded 0-100 [`RiskIndex`] per
//! region and serves risk lookups for coordinates and routes. Occurrence
//! data and persisted indexes live behind injected store traits so the
//! engine works identically against an in-memory store in tests and a
//! shared database in deployment.

pub mod scoring;
pub mod store;

pub use scoring::RiskEngine;
pub use store::{InMemoryOccurrenceStore, InMemoryRiskIndexStore, OccurrenceStore, RiskIndexStore};

/// Errors from risk scoring operations.
#[derive(Debug, thiserror::Error)]
pub enum RiskError {
    /// An injected store failed.
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

/// Error surfaced by an injected occurrence or risk index store.
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

/// Convenience alias for store results.
pub type StoreResult<T> = Result<T, StoreError>;

/// Convenience alias for engine results.
pub type RiskResult<T> = Result<T, RiskError>;
