//! # Route Planner
//!
//! Route construction and live GPS tracking engine for cycling.
//!
//! This library provides:
//! - An ordered waypoint store with change-origin tagging
//! - Route recalculation through a pluggable routing provider, with
//!   out-of-order responses resolved by request sequence number
//! - Reconciliation of dragged route edits without recalculation echoes
//! - Live activity recording with incremental distance/speed
//! - Saved-route persistence (in memory or SQLite)
//!
//! ## Features
//!
//! - **`persistence`** - Enable SQLite storage for saved routes
//! - **`http`** - Enable the OSRM-compatible HTTP routing provider
//! - **`full`** - Enable all features
//!
//! ## Quick Start
//!
//! ```rust
//! use route_planner::{GeoPoint, RouteEditor, StraightLineRouter};
//!
//! # tokio_test_block(async {
//! let mut editor = RouteEditor::default();
//! editor.click(GeoPoint::new(16.7516, -93.1029)).unwrap();
//! editor.click(GeoPoint::new(16.7600, -93.1100)).unwrap();
//!
//! let router = StraightLineRouter::default();
//! editor.sync(&router).await;
//!
//! let snapshot = editor.snapshot().expect("route computed");
//! println!("{:.2} km", snapshot.distance_meters / 1000.0);
//! # });
//! # fn tokio_test_block<F: std::future::Future<Output = ()>>(f: F) {
//! #     tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(f)
//! # }
//! ```

use serde::{Deserialize, Serialize};

// Unified error handling
pub mod error;
pub use error::{OptionExt, PlannerError, PositionStreamError, Result, RoutingFailure};

// Geographic utilities (distance, equality, bounds)
pub mod geo_utils;
pub use geo_utils::{haversine_distance, points_approximately_equal, GEO_EPSILON_DEGREES};

// Configuration
pub mod config;
pub use config::{PlannerConfig, RoutingConfig, TrackerConfig};

// Ordered waypoint sequence
pub mod waypoints;
pub use waypoints::{ChangeOrigin, Waypoint, WaypointChange, WaypointStore};

// Routing provider seam and route snapshots
pub mod routing;
pub use routing::{
    RouteLeg, RouteRequest, RouteSnapshot, RoutedPath, RoutingProvider, StraightLineRouter,
    TravelMode,
};

// Sequenced route recalculation
pub mod controller;
pub use controller::{ApplyOutcome, RouteRecalculationController, RouteStatus, Trigger};

// Drag reconciliation
pub mod drag;
pub use drag::{DragOutcome, DragReconciler};

// Editing session tying store, controller and reconciler together
pub mod editor;
pub use editor::{EditorEffect, RouteEditor, SaveRequest};

// AI route proposals
pub mod proposal;
pub use proposal::{ProposalResponse, RouteProposal};

// Live activity tracking
pub mod tracker;
pub use tracker::{
    ActivitySummary, LiveStats, LiveTracker, PositionSample, PositionUpdate, SignalStatus,
    TrackedActivity, TrackerState,
};

// Async recording driver
pub mod recording;
pub use recording::{
    PositionOptions, PositionSource, PositionStream, RecordingCommand, RecordingOutcome,
    RecordingSession,
};

// Saved routes
pub mod persistence;
pub use persistence::{
    InMemoryRouteRepository, RouteMetadata, RoutePersistence, RouteRepository, SavedRoute,
};
#[cfg(feature = "persistence")]
pub use persistence::SqliteRouteRepository;

// HTTP routing provider
#[cfg(feature = "http")]
pub mod http;
#[cfg(feature = "http")]
pub use http::OsrmRouter;

// ============================================================================
// Core Types
// ============================================================================

/// A geographic coordinate in degrees.
///
/// # Example
/// ```
/// use route_planner::GeoPoint;
/// let point = GeoPoint::new(16.7516, -93.1029); // Tuxtla Gutiérrez
/// assert!(point.is_valid());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

impl GeoPoint {
    /// Create a new point.
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// Check if the point has valid coordinates.
    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lng.is_finite()
            && self.lat >= -90.0
            && self.lat <= 90.0
            && self.lng >= -180.0
            && self.lng <= 180.0
    }

    /// Distance to another point in meters.
    pub fn distance_to(&self, other: &GeoPoint) -> f64 {
        haversine_distance(self, other)
    }

    /// Approximate equality within [`GEO_EPSILON_DEGREES`].
    pub fn approx_eq(&self, other: &GeoPoint) -> bool {
        points_approximately_equal(self, other, GEO_EPSILON_DEGREES)
    }
}

/// Bounding box for a set of points.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lng: f64,
    pub max_lng: f64,
}

impl Bounds {
    /// Create bounds from points.
    pub fn from_points(points: &[GeoPoint]) -> Option<Self> {
        if points.is_empty() {
            return None;
        }
        let mut min_lat = f64::MAX;
        let mut max_lat = f64::MIN;
        let mut min_lng = f64::MAX;
        let mut max_lng = f64::MIN;

        for p in points {
            min_lat = min_lat.min(p.lat);
            max_lat = max_lat.max(p.lat);
            min_lng = min_lng.min(p.lng);
            max_lng = max_lng.max(p.lng);
        }

        Some(Self {
            min_lat,
            max_lat,
            min_lng,
            max_lng,
        })
    }

    /// Get the center point of the bounds.
    pub fn center(&self) -> GeoPoint {
        GeoPoint::new(
            (self.min_lat + self.max_lat) / 2.0,
            (self.min_lng + self.max_lng) / 2.0,
        )
    }

    /// Inclusive containment check.
    pub fn contains(&self, point: &GeoPoint) -> bool {
        point.lat >= self.min_lat
            && point.lat <= self.max_lat
            && point.lng >= self.min_lng
            && point.lng <= self.max_lng
    }
}
