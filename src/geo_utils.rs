//! # Geographic Utilities
//!
//! Pure distance and comparison helpers on [`GeoPoint`]s.
//!
//! - **Haversine Distance**: Great-circle distance between two points
//! - **Approximate Equality**: Epsilon comparison used to detect no-op edits
//! - **Polyline Length**: Total distance along a path
//! - **Bounds Computation**: Bounding box for a point sequence

use crate::{Bounds, GeoPoint};

/// Mean Earth radius used by all distance calculations.
pub const EARTH_RADIUS_METERS: f64 = 6_371_000.0;

/// Degrees below which two coordinates are treated as the same place (~1m).
pub const GEO_EPSILON_DEGREES: f64 = 1e-5;

/// Great-circle distance between two points in meters.
///
/// # Example
/// ```
/// use route_planner::{GeoPoint, geo_utils::haversine_distance};
/// let a = GeoPoint::new(16.7516, -93.1029);
/// let b = GeoPoint::new(16.7600, -93.1100);
/// let d = haversine_distance(&a, &b);
/// assert!(d > 1000.0 && d < 1300.0);
/// ```
pub fn haversine_distance(a: &GeoPoint, b: &GeoPoint) -> f64 {
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();
    let d_lat = (b.lat - a.lat).to_radians();
    let d_lng = (b.lng - a.lng).to_radians();

    let h = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lng / 2.0).sin().powi(2);
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());

    EARTH_RADIUS_METERS * c
}

/// Check whether two points are within `epsilon_degrees` on both axes.
pub fn points_approximately_equal(a: &GeoPoint, b: &GeoPoint, epsilon_degrees: f64) -> bool {
    (a.lat - b.lat).abs() <= epsilon_degrees && (a.lng - b.lng).abs() <= epsilon_degrees
}

/// Same length, same order, and pairwise approximately equal.
pub fn sequences_approximately_equal(a: &[GeoPoint], b: &[GeoPoint], epsilon_degrees: f64) -> bool {
    a.len() == b.len()
        && a
            .iter()
            .zip(b)
            .all(|(p, q)| points_approximately_equal(p, q, epsilon_degrees))
}

/// Sum of haversine distances between consecutive points.
pub fn polyline_length(points: &[GeoPoint]) -> f64 {
    points
        .windows(2)
        .map(|w| haversine_distance(&w[0], &w[1]))
        .sum()
}

/// Bounding box of a point sequence, `None` when empty.
pub fn compute_bounds(points: &[GeoPoint]) -> Option<Bounds> {
    Bounds::from_points(points)
}

/// Average speed in km/h, zero until any time has elapsed.
pub fn speed_kmh(distance_meters: f64, elapsed_seconds: f64) -> f64 {
    if elapsed_seconds <= 0.0 {
        return 0.0;
    }
    (distance_meters / 1000.0) / (elapsed_seconds / 3600.0)
}
