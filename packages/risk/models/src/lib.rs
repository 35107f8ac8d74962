#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Occurrence and risk index types for the safe routing core.
//!
//! An [`Occurrence`] is a single deduplicated, classified incident
//! produced by the external ingestion pipeline — the routing core only
//! reads them. A [`RiskIndex`] is the 0-100 score the scoring engine
//! derives per region from recent occurrences.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// Severity of a reported occurrence.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum OccurrenceSeverity {
    /// Minor offenses.
    Low,
    /// Moderate offenses.
    Medium,
    /// Serious offenses.
    High,
    /// Most severe offenses.
    Critical,
}

impl OccurrenceSeverity {
    /// Scoring multiplier for this severity level.
    #[must_use]
    pub const fn multiplier(self) -> f64 {
        match self {
            Self::Low => 0.25,
            Self::Medium => 0.50,
            Self::High => 0.75,
            Self::Critical => 1.00,
        }
    }
}

/// Lifecycle status of an occurrence in the external incident store.
///
/// Only [`Active`](Self::Active) occurrences contribute to risk scoring.
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
pub enum OccurrenceStatus {
    /// Visible and counted by the scoring engine.
    Active,
    /// Aged out of the reporting window.
    Expired,
    /// Merged into another occurrence by deduplication.
    Merged,
    /// Rejected by moderation.
    Rejected,
}

/// A single classified incident, read-only input to the scoring engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Occurrence {
    /// Unique occurrence identifier.
    pub id: i64,
    /// Canonical crime type identifier.
    pub crime_type_id: i32,
    /// Severity classification.
    pub severity: OccurrenceSeverity,
    /// Reporter/moderation confidence, 0 to 5.
    pub confidence_score: f64,
    /// Region the occurrence was attributed to.
    pub region_id: String,
    /// Lifecycle status.
    pub status: OccurrenceStatus,
    /// When the incident occurred.
    pub occurred_at: DateTime<Utc>,
}

/// A canonical crime type with its externally configured scoring weight.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrimeType {
    /// Canonical identifier.
    pub id: i32,
    /// Human-readable label (e.g., "Robbery").
    pub label: String,
    /// Scoring weight in [0, 1].
    pub weight: f64,
}

/// Lookup table of crime types, keyed by id.
#[derive(Debug, Clone, Default)]
pub struct CrimeTypeCatalog {
    types: BTreeMap<i32, CrimeType>,
}

impl CrimeTypeCatalog {
    /// Builds a catalog from a list of crime types.
    #[must_use]
    pub fn new(types: Vec<CrimeType>) -> Self {
        Self {
            types: types.into_iter().map(|t| (t.id, t)).collect(),
        }
    }

    /// Scoring weight for a crime type; unknown ids weigh 0.
    #[must_use]
    pub fn weight(&self, crime_type_id: i32) -> f64 {
        self.types.get(&crime_type_id).map_or(0.0, |t| t.weight)
    }

    /// Display label for a crime type; unknown ids are `"unknown"`.
    #[must_use]
    pub fn label(&self, crime_type_id: i32) -> &str {
        self.types
            .get(&crime_type_id)
            .map_or("unknown", |t| t.label.as_str())
    }
}

/// Weight of the frequency contribution.
pub const FREQUENCY_WEIGHT: f64 = 0.30;
/// Weight of the recency contribution.
pub const RECENCY_WEIGHT: f64 = 0.25;
/// Weight of the severity contribution.
pub const SEVERITY_WEIGHT: f64 = 0.25;
/// Weight of the confidence contribution.
pub const CONFIDENCE_WEIGHT: f64 = 0.20;

/// The four weighted contributions behind a risk index value.
///
/// Each factor is independently clamped to [0, 100] before weighting.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskFactors {
    /// Incident count pressure against a 10/month baseline.
    pub frequency: f64,
    /// Exponential-decay recency score (7-day half-life feel).
    pub recency: f64,
    /// Severity x crime-type-weight score.
    pub severity: f64,
    /// Mean reporter confidence score.
    pub confidence: f64,
}

impl RiskFactors {
    /// Combines the four factors with their fixed weights.
    #[must_use]
    pub fn weighted_total(&self) -> f64 {
        FREQUENCY_WEIGHT * self.frequency
            + RECENCY_WEIGHT * self.recency
            + SEVERITY_WEIGHT * self.severity
            + CONFIDENCE_WEIGHT * self.confidence
    }
}

/// The persisted per-region risk score.
///
/// Owned and mutated only by the scoring engine; one row per region.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskIndex {
    /// Region this index belongs to (unique key).
    pub region_id: String,
    /// Combined score in [0, 100].
    pub value: f64,
    /// Factor breakdown behind the value.
    pub factors: RiskFactors,
    /// Number of qualifying occurrences in the scoring window.
    pub occurrence_count: usize,
    /// Most frequent crime type in the window, if any occurrences exist.
    pub dominant_crime_type_id: Option<i32>,
    /// When this index was computed.
    pub calculated_at: DateTime<Utc>,
}
