//! Per-route risk aggregation.
//!
//! A route's exposure is the set of regions it traverses. The analyzer
//! builds the waypoint list (origin, each step endpoint, destination),
//! resolves each unique region's risk index through the scoring engine,
//! and aggregates into maximum and mean. Regions without a computed
//! index contribute nothing — unknown is not the same as safe, and it
//! is not the same as dangerous either.

use std::sync::Arc;

use saferoute_geo::Coordinates;
use saferoute_risk::RiskEngine;
use saferoute_risk_models::RiskIndex;
use saferoute_routing_models::Route;
use serde::{Deserialize, Serialize};

use crate::NavigationResult;

/// Routes whose peak risk reaches this value carry a warning.
pub const WARNING_THRESHOLD: f64 = 50.0;

/// Peak risk at or above this value is reported as high rather than
/// moderate.
pub const HIGH_RISK_THRESHOLD: f64 = 70.0;

/// Aggregated risk of one route.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteRiskAnalysis {
    /// Highest risk index among traversed regions.
    pub max_risk_index: f64,
    /// Mean risk index across traversed regions.
    pub average_risk_index: f64,
    /// Number of traversed regions at or above [`HIGH_RISK_THRESHOLD`].
    pub high_risk_region_count: usize,
    /// Whether the peak reaches [`WARNING_THRESHOLD`].
    pub requires_warning: bool,
    /// Label of the dominant crime type in the riskiest region, when
    /// known.
    pub dominant_crime_type: Option<String>,
    /// Risk indexes of the unique regions traversed, in traversal order.
    pub regions: Vec<RiskIndex>,
    /// Composed warning, present only when a warning is required.
    pub message: Option<String>,
}

/// A route paired with its risk analysis.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteWithRisk {
    /// The route itself.
    pub route: Route,
    /// Aggregated risk along it.
    pub analysis: RouteRiskAnalysis,
}

/// Resolves and aggregates risk along routes.
pub struct RouteRiskAnalyzer {
    engine: Arc<RiskEngine>,
}

impl RouteRiskAnalyzer {
    /// Creates an analyzer over the shared scoring engine.
    #[must_use]
    pub fn new(engine: Arc<RiskEngine>) -> Self {
        Self { engine }
    }

    /// Analyzes the risk of every region `route` traverses.
    ///
    /// # Errors
    ///
    /// Returns [`crate::NavigationError::Risk`] if the scoring engine's
    /// store fails.
    pub async fn analyze(&self, route: &Route) -> NavigationResult<RouteRiskAnalysis> {
        let mut waypoints = Vec::with_capacity(route.waypoints.len() + 2);
        waypoints.push(route.origin);
        waypoints.extend_from_slice(&route.waypoints);
        waypoints.push(route.destination);

        let regions = self.engine.get_risk_along_route(&waypoints).await?;
        Ok(self.aggregate(regions))
    }

    fn aggregate(&self, regions: Vec<RiskIndex>) -> RouteRiskAnalysis {
        let max_risk_index = regions.iter().map(|r| r.value).fold(0.0, f64::max);
        #[allow(clippy::cast_precision_loss)]
        let average_risk_index = if regions.is_empty() {
            0.0
        } else {
            regions.iter().map(|r| r.value).sum::<f64>() / regions.len() as f64
        };

        let high_risk_region_count = regions
            .iter()
            .filter(|r| r.value >= HIGH_RISK_THRESHOLD)
            .count();
        let dominant_crime_type = regions
            .iter()
            .max_by(|a, b| a.value.total_cmp(&b.value))
            .and_then(|r| r.dominant_crime_type_id)
            .map(|id| self.engine.catalog().label(id).to_string());

        let requires_warning = max_risk_index >= WARNING_THRESHOLD;
        let message = requires_warning
            .then(|| warning_message(max_risk_index, dominant_crime_type.as_deref()));

        RouteRiskAnalysis {
            max_risk_index,
            average_risk_index,
            high_risk_region_count,
            requires_warning,
            dominant_crime_type,
            regions,
            message,
        }
    }

    /// Resolves the risk index at a single position, if the position
    /// falls inside a scored region.
    ///
    /// # Errors
    ///
    /// Returns [`crate::NavigationError::Risk`] if the scoring engine's
    /// store fails.
    pub async fn risk_at(&self, position: Coordinates) -> NavigationResult<Option<RiskIndex>> {
        Ok(self.engine.get_risk_for_coordinates(position).await?)
    }
}

fn warning_message(max_risk_index: f64, dominant_crime_type: Option<&str>) -> String {
    let tier = if max_risk_index >= HIGH_RISK_THRESHOLD {
        "high"
    } else {
        "moderate"
    };
    let mut message =
        format!("This route passes through a {tier}-risk area (risk index {max_risk_index:.0}).");

    if let Some(label) = dominant_crime_type {
        message.push_str(&format!(" Most reported incident type there: {label}."));
    }

    message
}
