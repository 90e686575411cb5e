//! # Routing
//!
//! The seam between the planner and whatever service turns a list of stops
//! into a road-following path. Providers implement [`RoutingProvider`]; the
//! recalculation controller never sees anything provider-specific except the
//! opaque encoded path, which it passes through untouched.

use std::future::Future;
use std::str::FromStr;

use geo::LineString;
use serde::{Deserialize, Serialize};

use crate::config::RoutingConfig;
use crate::error::RoutingFailure;
use crate::geo_utils::haversine_distance;
use crate::GeoPoint;

/// Travel profile requested from the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TravelMode {
    #[default]
    Bicycling,
    Driving,
    Walking,
}

impl TravelMode {
    /// Stored/serialized name.
    pub fn as_str(&self) -> &'static str {
        match self {
            TravelMode::Bicycling => "BICYCLING",
            TravelMode::Driving => "DRIVING",
            TravelMode::Walking => "WALKING",
        }
    }

    /// OSRM profile name.
    pub fn profile(&self) -> &'static str {
        match self {
            TravelMode::Bicycling => "bike",
            TravelMode::Driving => "car",
            TravelMode::Walking => "foot",
        }
    }
}

impl FromStr for TravelMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "BICYCLING" => Ok(TravelMode::Bicycling),
            "DRIVING" => Ok(TravelMode::Driving),
            "WALKING" => Ok(TravelMode::Walking),
            other => Err(format!("unknown travel mode '{}'", other)),
        }
    }
}

/// One routed segment between two consecutive stops.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RouteLeg {
    pub start: GeoPoint,
    pub end: GeoPoint,
    pub distance_meters: f64,
    pub duration_seconds: f64,
}

/// A provider's answer for a whole request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutedPath {
    pub legs: Vec<RouteLeg>,
    /// Opaque provider-specific geometry
    pub encoded_path: Option<String>,
}

impl RoutedPath {
    pub fn total_distance_meters(&self) -> f64 {
        self.legs.iter().map(|l| l.distance_meters).sum()
    }

    pub fn total_duration_seconds(&self) -> f64 {
        self.legs.iter().map(|l| l.duration_seconds).sum()
    }
}

/// A sequenced request for one waypoint sequence.
///
/// The first stop is the origin, the last the destination, and every stop in
/// between is a stopover visited in the given order.
#[derive(Debug, Clone, PartialEq)]
pub struct RouteRequest {
    pub seq: u64,
    pub stops: Vec<GeoPoint>,
    pub travel_mode: TravelMode,
    /// Always false: user-specified order is honored.
    pub optimize_waypoints: bool,
}

impl RouteRequest {
    pub fn new(seq: u64, stops: Vec<GeoPoint>, travel_mode: TravelMode) -> Self {
        Self {
            seq,
            stops,
            travel_mode,
            optimize_waypoints: false,
        }
    }

    pub fn origin(&self) -> Option<&GeoPoint> {
        self.stops.first()
    }

    pub fn destination(&self) -> Option<&GeoPoint> {
        self.stops.last()
    }

    /// Stops strictly between origin and destination.
    pub fn intermediate(&self) -> &[GeoPoint] {
        if self.stops.len() <= 2 {
            &[]
        } else {
            &self.stops[1..self.stops.len() - 1]
        }
    }
}

/// The routed state of a waypoint sequence, replaced wholesale on every
/// successful recalculation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteSnapshot {
    pub waypoints: Vec<GeoPoint>,
    pub distance_meters: f64,
    pub duration_seconds: f64,
    pub encoded_path: Option<String>,
    pub legs: Vec<RouteLeg>,
}

impl RouteSnapshot {
    /// Build a snapshot from a complete provider answer.
    pub fn from_path(waypoints: Vec<GeoPoint>, path: RoutedPath) -> Self {
        Self {
            distance_meters: path.total_distance_meters(),
            duration_seconds: path.total_duration_seconds(),
            waypoints,
            encoded_path: path.encoded_path,
            legs: path.legs,
        }
    }
}

/// Anything that can route an ordered list of stops.
pub trait RoutingProvider {
    fn route(
        &self,
        request: &RouteRequest,
    ) -> impl Future<Output = Result<RoutedPath, RoutingFailure>>;
}

/// Encode points as a Google polyline (precision 5).
pub fn encode_path(points: &[GeoPoint]) -> Option<String> {
    if points.is_empty() {
        return None;
    }
    // geo expects (x, y) = (lng, lat)
    let line: LineString<f64> = points.iter().map(|p| (p.lng, p.lat)).collect();
    polyline::encode_coordinates(line, 5).ok()
}

/// Decode a Google polyline (precision 5) into points.
pub fn decode_path(encoded: &str) -> Vec<GeoPoint> {
    if encoded.is_empty() {
        return Vec::new();
    }
    polyline::decode_polyline(encoded, 5)
        .map(|line| line.coords().map(|c| GeoPoint::new(c.y, c.x)).collect())
        .unwrap_or_default()
}

/// Offline provider that connects stops with straight segments.
///
/// Useful when no routing service is reachable and as a deterministic
/// provider in tests.
#[derive(Debug, Clone)]
pub struct StraightLineRouter {
    speed_kmh: f64,
}

impl StraightLineRouter {
    pub fn new(speed_kmh: f64) -> Self {
        Self { speed_kmh }
    }

    /// Route synchronously.
    pub fn route_now(&self, request: &RouteRequest) -> Result<RoutedPath, RoutingFailure> {
        if request.stops.len() < 2 {
            return Err(RoutingFailure::InvalidCoordinates(format!(
                "need at least 2 stops, got {}",
                request.stops.len()
            )));
        }
        if let Some(bad) = request.stops.iter().find(|p| !p.is_valid()) {
            return Err(RoutingFailure::InvalidCoordinates(format!(
                "({}, {})",
                bad.lat, bad.lng
            )));
        }

        let meters_per_second = self.speed_kmh / 3.6;
        let legs = request
            .stops
            .windows(2)
            .map(|w| {
                let distance = haversine_distance(&w[0], &w[1]);
                RouteLeg {
                    start: w[0],
                    end: w[1],
                    distance_meters: distance,
                    duration_seconds: distance / meters_per_second,
                }
            })
            .collect();

        Ok(RoutedPath {
            legs,
            encoded_path: encode_path(&request.stops),
        })
    }
}

impl From<&RoutingConfig> for StraightLineRouter {
    fn from(config: &RoutingConfig) -> Self {
        Self::new(config.fallback_speed_kmh)
    }
}

impl Default for StraightLineRouter {
    fn default() -> Self {
        Self::new(15.0)
    }
}

impl RoutingProvider for StraightLineRouter {
    fn route(
        &self,
        request: &RouteRequest,
    ) -> impl Future<Output = Result<RoutedPath, RoutingFailure>> {
        std::future::ready(self.route_now(request))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stops() -> Vec<GeoPoint> {
        vec![
            GeoPoint::new(16.7516, -93.1029),
            GeoPoint::new(16.7550, -93.1060),
            GeoPoint::new(16.7600, -93.1100),
        ]
    }

    #[test]
    fn test_request_parts() {
        let request = RouteRequest::new(1, stops(), TravelMode::Bicycling);
        assert_eq!(request.origin(), Some(&stops()[0]));
        assert_eq!(request.destination(), Some(&stops()[2]));
        assert_eq!(request.intermediate(), &stops()[1..2]);
        assert!(!request.optimize_waypoints);

        let short = RouteRequest::new(2, stops()[..2].to_vec(), TravelMode::Bicycling);
        assert!(short.intermediate().is_empty());
    }

    #[test]
    fn test_straight_line_legs_follow_stop_order() {
        let router = StraightLineRouter::new(18.0);
        let request = RouteRequest::new(1, stops(), TravelMode::Bicycling);
        let path = router.route_now(&request).unwrap();

        assert_eq!(path.legs.len(), 2);
        assert_eq!(path.legs[0].start, stops()[0]);
        assert_eq!(path.legs[0].end, stops()[1]);
        assert_eq!(path.legs[1].end, stops()[2]);

        // 18 km/h = 5 m/s
        let leg = path.legs[0];
        assert!((leg.duration_seconds - leg.distance_meters / 5.0).abs() < 1e-9);
        assert!(path.encoded_path.is_some());
    }

    #[test]
    fn test_straight_line_rejects_single_stop() {
        let router = StraightLineRouter::default();
        let request = RouteRequest::new(1, stops()[..1].to_vec(), TravelMode::Bicycling);
        assert!(matches!(
            router.route_now(&request),
            Err(RoutingFailure::InvalidCoordinates(_))
        ));
    }

    #[test]
    fn test_polyline_encoding() {
        let encoded = encode_path(&stops()).unwrap();
        let decoded = decode_path(&encoded);
        assert_eq!(decoded.len(), 3);
        for (a, b) in decoded.iter().zip(stops()) {
            assert!((a.lat - b.lat).abs() < 1e-5);
            assert!((a.lng - b.lng).abs() < 1e-5);
        }
        assert!(encode_path(&[]).is_none());
        assert!(decode_path("").is_empty());
    }

    #[test]
    fn test_snapshot_totals() {
        let router = StraightLineRouter::default();
        let request = RouteRequest::new(1, stops(), TravelMode::Bicycling);
        let path = router.route_now(&request).unwrap();
        let total = path.total_distance_meters();
        let snapshot = RouteSnapshot::from_path(stops(), path);
        assert_eq!(snapshot.distance_meters, total);
        assert_eq!(snapshot.waypoints, stops());
    }

    #[test]
    fn test_travel_mode_serialization() {
        let json = serde_json::to_string(&TravelMode::Bicycling).unwrap();
        assert_eq!(json, "\"BICYCLING\"");
        assert_eq!(TravelMode::Walking.profile(), "foot");
        for mode in [TravelMode::Bicycling, TravelMode::Driving, TravelMode::Walking] {
            assert_eq!(mode.as_str().parse::<TravelMode>(), Ok(mode));
        }
        assert!("SKATING".parse::<TravelMode>().is_err());
    }
}
