//! Error types for the navigation engine.

use thiserror::Error;

/// Navigation engine error type.
///
/// None of these halt a running session. Errors raised while processing
/// a single fix are logged and contained to that fix.
#[derive(Error, Debug)]
pub enum NavError {
    /// The location source refused the subscription (permission denied,
    /// no provider, timeout). Navigation cannot start.
    #[error("Position unavailable: {0}")]
    PositionUnavailable(String),

    /// A reroute request failed. The stale route stays in force.
    #[error("Route fetch failed: {0}")]
    RouteFetch(String),

    #[error("Invalid fix: {0}")]
    InvalidFix(String),

    #[error("Stale fix: {age_ms} ms old")]
    StaleFix { age_ms: u64 },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, NavError>;
