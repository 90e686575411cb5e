//! Unified error handling for the route-planner library.
//!
//! Every component boundary converts its failures into one of these variants.
//! Callers generally turn them into an observable status (a failed
//! recalculation keeps the previous route, a lost GPS signal keeps the last
//! known position) rather than aborting.

use thiserror::Error;

/// Failure reported by a routing provider.
///
/// All provider-specific failure modes collapse into this single type so the
/// recalculation controller can treat them uniformly.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RoutingFailure {
    /// The provider could not connect the requested stops
    #[error("no route found between the requested stops")]
    NoRoute,
    /// One or more stops were rejected by the provider
    #[error("invalid coordinates: {0}")]
    InvalidCoordinates(String),
    /// The provider asked us to slow down and retries were exhausted
    #[error("rate limited by routing provider")]
    RateLimited,
    /// Network or transport level failure
    #[error("transport error: {0}")]
    Transport(String),
    /// The provider answered with something we could not interpret
    #[error("invalid response from routing provider: {0}")]
    InvalidResponse(String),
}

/// Failure emitted by a position stream. Never terminates the stream.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PositionStreamError {
    #[error("location permission denied")]
    PermissionDenied,
    #[error("GPS signal lost")]
    SignalLost,
    #[error("position request timed out")]
    Timeout,
    #[error("position unavailable: {0}")]
    Unavailable(String),
}

impl PositionStreamError {
    /// Whether this error means there is currently no usable position fix.
    pub fn is_signal_loss(&self) -> bool {
        matches!(
            self,
            PositionStreamError::PermissionDenied
                | PositionStreamError::SignalLost
                | PositionStreamError::Unavailable(_)
        )
    }
}

/// Unified error type for route-planner operations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PlannerError {
    /// Routing provider failed; the previous route stays valid
    #[error("routing failed: {0}")]
    Routing(#[from] RoutingFailure),
    /// User-correctable input problem
    #[error("validation error: {message}")]
    Validation { message: String },
    /// Degraded position tracking
    #[error("position stream error: {0}")]
    PositionStream(#[from] PositionStreamError),
    /// Persistence lookup miss
    #[error("route '{id}' not found")]
    NotFound { id: String },
    /// Tracker state machine misuse
    #[error("cannot {action} while {from}")]
    InvalidTransition { from: String, action: String },
    /// Storage backend failure
    #[error("persistence error: {message}")]
    Persistence { message: String },
    /// Configuration error
    #[error("configuration error: {message}")]
    Config { message: String },
}

impl PlannerError {
    pub fn validation(message: impl Into<String>) -> Self {
        PlannerError::Validation {
            message: message.into(),
        }
    }

    pub fn persistence(message: impl Into<String>) -> Self {
        PlannerError::Persistence {
            message: message.into(),
        }
    }

    /// Whether the caller can recover by retrying or correcting input.
    pub fn is_recoverable(&self) -> bool {
        !matches!(
            self,
            PlannerError::Persistence { .. } | PlannerError::Config { .. }
        )
    }
}

impl From<serde_json::Error> for PlannerError {
    fn from(err: serde_json::Error) -> Self {
        PlannerError::persistence(format!("JSON: {}", err))
    }
}

#[cfg(feature = "persistence")]
impl From<rusqlite::Error> for PlannerError {
    fn from(err: rusqlite::Error) -> Self {
        PlannerError::persistence(format!("SQLite: {}", err))
    }
}

#[cfg(feature = "persistence")]
impl From<rmp_serde::encode::Error> for PlannerError {
    fn from(err: rmp_serde::encode::Error) -> Self {
        PlannerError::persistence(format!("MessagePack encode: {}", err))
    }
}

#[cfg(feature = "persistence")]
impl From<rmp_serde::decode::Error> for PlannerError {
    fn from(err: rmp_serde::decode::Error) -> Self {
        PlannerError::persistence(format!("MessagePack decode: {}", err))
    }
}

/// Result type alias for route-planner operations.
pub type Result<T> = std::result::Result<T, PlannerError>;

/// Extension trait for converting Option to PlannerError.
pub trait OptionExt<T> {
    /// Convert Option to Result with a not-found error for the given id.
    fn ok_or_not_found(self, id: &str) -> Result<T>;

    /// Convert Option to Result with a validation error.
    fn ok_or_invalid(self, message: &str) -> Result<T>;
}

impl<T> OptionExt<T> for Option<T> {
    fn ok_or_not_found(self, id: &str) -> Result<T> {
        self.ok_or_else(|| PlannerError::NotFound { id: id.to_string() })
    }

    fn ok_or_invalid(self, message: &str) -> Result<T> {
        self.ok_or_else(|| PlannerError::validation(message))
    }
}
