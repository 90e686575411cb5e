//! Configuration for the planner components.
//!
//! All structs deserialize from JSON with every field optional; anything
//! missing falls back to the [`Default`] values documented on each field.

use serde::{Deserialize, Serialize};

use crate::error::{PlannerError, Result};
use crate::geo_utils::GEO_EPSILON_DEGREES;
use crate::routing::TravelMode;
use crate::Bounds;

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlannerConfig {
    pub routing: RoutingConfig,
    pub tracking: TrackerConfig,

    /// Tolerance for deciding that a dragged path did not actually change.
    /// Default: 1e-5 degrees (~1 meter)
    pub drag_epsilon_degrees: f64,

    /// Area AI route proposals must start and end in.
    /// Default: Tuxtla Gutiérrez, Chiapas
    pub service_area: Bounds,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            routing: RoutingConfig::default(),
            tracking: TrackerConfig::default(),
            drag_epsilon_degrees: GEO_EPSILON_DEGREES,
            service_area: Bounds {
                min_lat: 16.65,
                max_lat: 16.82,
                min_lng: -93.18,
                max_lng: -93.05,
            },
        }
    }
}

impl PlannerConfig {
    /// Parse configuration from a JSON document.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: PlannerConfig = serde_json::from_str(json).map_err(|e| PlannerError::Config {
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values that would make the components misbehave.
    pub fn validate(&self) -> Result<()> {
        if !(self.drag_epsilon_degrees > 0.0) {
            return Err(PlannerError::Config {
                message: "drag_epsilon_degrees must be positive".to_string(),
            });
        }
        if self.tracking.reroute_every_points == 0 {
            return Err(PlannerError::Config {
                message: "tracking.reroute_every_points must be at least 1".to_string(),
            });
        }
        if !(self.routing.fallback_speed_kmh > 0.0) {
            return Err(PlannerError::Config {
                message: "routing.fallback_speed_kmh must be positive".to_string(),
            });
        }
        Ok(())
    }
}

/// Routing provider configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutingConfig {
    /// Base URL of an OSRM-compatible routing service.
    /// Default: "https://router.project-osrm.org"
    pub base_url: String,

    /// Travel mode requested from the provider.
    /// Default: Bicycling
    pub travel_mode: TravelMode,

    /// Per-request timeout. Default: 30 seconds
    pub timeout_secs: u64,

    /// Retries on HTTP 429 or transport errors before giving up. Default: 3
    pub max_retries: u32,

    /// Cruising speed assumed by the straight-line fallback router.
    /// Default: 15.0 km/h
    pub fallback_speed_kmh: f64,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            base_url: "https://router.project-osrm.org".to_string(),
            travel_mode: TravelMode::Bicycling,
            timeout_secs: 30,
            max_retries: 3,
            fallback_speed_kmh: 15.0,
        }
    }
}

/// Live tracking configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Forward the track to the routing provider every N accepted points.
    /// Default: 1 (every GPS update)
    pub reroute_every_points: usize,

    /// Ask the position source for high-accuracy fixes. Default: true
    pub high_accuracy: bool,

    /// Maximum age of a cached fix the source may return. Default: 0
    pub maximum_age_ms: u64,

    /// Time the source may take to produce a fix. Default: 5000
    pub timeout_ms: u64,

    /// Elapsed-time tick period. Default: 1000 ms
    pub tick_interval_ms: u64,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            reroute_every_points: 1,
            high_accuracy: true,
            maximum_age_ms: 0,
            timeout_ms: 5000,
            tick_interval_ms: 1000,
        }
    }
}
