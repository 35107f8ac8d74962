#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Risk-aware route selection and active-navigation recalculation.
//!
//! Ties the risk scoring engine and the resilient routing layer
//! together:
//!
//! - [`analyzer::RouteRiskAnalyzer`] resolves the risk of every region
//!   a route traverses and aggregates it into a per-route analysis.
//! - [`selector::SafeRouteSelector`] ranks alternative routes by risk
//!   within a bounded detour budget.
//! - [`session::NavigationManager`] tracks active navigation sessions
//!   and decides when worsening traffic justifies a reroute.

pub mod analyzer;
pub mod selector;
pub mod session;
pub mod store;

pub use analyzer::{RouteRiskAnalysis, RouteRiskAnalyzer, RouteWithRisk};
pub use selector::SafeRouteSelector;
pub use session::{NavigationManager, NavigationSession, RouteRecalculation, SessionStatus};
pub use store::{InMemorySessionStore, SessionStore};

use saferoute_risk::RiskError;
use saferoute_routing::RoutingError;

/// Error surfaced by an injected session store.
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

/// Errors from the navigation layer.
#[derive(Debug, thiserror::Error)]
pub enum NavigationError {
    /// No session exists with the given id.
    #[error("navigation session '{session_id}' not found")]
    SessionNotFound {
        /// The unknown session id.
        session_id: String,
    },

    /// The session exists but is no longer active.
    #[error("navigation session '{session_id}' is not active")]
    SessionNotActive {
        /// The terminal session's id.
        session_id: String,
    },

    /// The routing layer failed.
    #[error(transparent)]
    Routing(#[from] RoutingError),

    /// The risk scoring engine failed.
    #[error(transparent)]
    Risk(#[from] RiskError),

    /// The session store failed.
    #[error("session store error: {0}")]
    Store(#[from] StoreError),
}

/// Convenience result alias for navigation operations.
pub type NavigationResult<T> = Result<T, NavigationError>;
