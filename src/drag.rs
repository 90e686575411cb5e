//! # Drag Reconciliation
//!
//! When the user drags the rendered route, the provider reports a new
//! leg-by-leg breakdown. The reconciler turns the leg boundaries back into a
//! stop sequence and writes it into the [`WaypointStore`] tagged
//! [`ChangeOrigin::DragSync`], together with a snapshot built from the leg
//! data the drag event already carries. The controller recognises that tag
//! and does not route the same sequence a second time.

use log::debug;

use crate::error::Result;
use crate::geo_utils::{sequences_approximately_equal, GEO_EPSILON_DEGREES};
use crate::routing::{RouteLeg, RouteSnapshot};
use crate::waypoints::{ChangeOrigin, WaypointChange, WaypointStore};
use crate::GeoPoint;

/// Result of reconciling one drag event.
#[derive(Debug, Clone, PartialEq)]
pub enum DragOutcome {
    /// Leg boundaries already match the store; nothing was touched
    Unchanged,
    /// Store replaced; install `snapshot` instead of recalculating
    Applied {
        change: WaypointChange,
        snapshot: RouteSnapshot,
    },
}

/// Folds dragged route edits back into a waypoint store.
#[derive(Debug, Clone)]
pub struct DragReconciler {
    epsilon_degrees: f64,
}

impl Default for DragReconciler {
    fn default() -> Self {
        Self::new(GEO_EPSILON_DEGREES)
    }
}

impl DragReconciler {
    pub fn new(epsilon_degrees: f64) -> Self {
        Self { epsilon_degrees }
    }

    /// Stops implied by a leg breakdown: first leg's start, every leg's end.
    pub fn reconstruct_waypoints(legs: &[RouteLeg]) -> Vec<GeoPoint> {
        let Some(first) = legs.first() else {
            return Vec::new();
        };
        let mut points = Vec::with_capacity(legs.len() + 1);
        points.push(first.start);
        points.extend(legs.iter().map(|leg| leg.end));
        points
    }

    /// Reconcile a drag event against the store.
    pub fn reconcile(
        &self,
        store: &mut WaypointStore,
        legs: &[RouteLeg],
        encoded_path: Option<String>,
    ) -> Result<DragOutcome> {
        let reconstructed = Self::reconstruct_waypoints(legs);
        if reconstructed.is_empty()
            || sequences_approximately_equal(&reconstructed, store.points(), self.epsilon_degrees)
        {
            return Ok(DragOutcome::Unchanged);
        }

        let change = store.replace_all(reconstructed.clone(), ChangeOrigin::DragSync)?;
        let snapshot = RouteSnapshot {
            waypoints: reconstructed,
            distance_meters: legs.iter().map(|l| l.distance_meters).sum(),
            duration_seconds: legs.iter().map(|l| l.duration_seconds).sum(),
            encoded_path,
            legs: legs.to_vec(),
        };
        debug!(
            "[DragReconciler] Store now has {} stops ({:.0}m)",
            change.len, snapshot.distance_meters
        );

        Ok(DragOutcome::Applied { change, snapshot })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leg(a: (f64, f64), b: (f64, f64), dist: f64, dur: f64) -> RouteLeg {
        RouteLeg {
            start: GeoPoint::new(a.0, a.1),
            end: GeoPoint::new(b.0, b.1),
            distance_meters: dist,
            duration_seconds: dur,
        }
    }

    fn store_with(points: &[(f64, f64)]) -> WaypointStore {
        let mut store = WaypointStore::new();
        for &(lat, lng) in points {
            store.append(GeoPoint::new(lat, lng)).unwrap();
        }
        store
    }

    #[test]
    fn test_reconstruct_from_leg_boundaries() {
        let legs = vec![
            leg((1.0, 1.0), (2.0, 2.0), 10.0, 1.0),
            leg((2.0, 2.0), (3.0, 3.0), 20.0, 2.0),
            leg((3.0, 3.0), (4.0, 4.0), 30.0, 3.0),
        ];
        let points = DragReconciler::reconstruct_waypoints(&legs);
        assert_eq!(
            points,
            vec![
                GeoPoint::new(1.0, 1.0),
                GeoPoint::new(2.0, 2.0),
                GeoPoint::new(3.0, 3.0),
                GeoPoint::new(4.0, 4.0),
            ]
        );
        assert!(DragReconciler::reconstruct_waypoints(&[]).is_empty());
    }

    #[test]
    fn test_identical_sequence_makes_no_mutation() {
        let mut store = store_with(&[(1.0, 1.0), (2.0, 2.0), (3.0, 3.0)]);
        let revision = store.revision();

        // Within epsilon of the stored stops
        let legs = vec![
            leg((1.000001, 1.0), (2.0, 2.000001), 10.0, 1.0),
            leg((2.0, 2.000001), (3.0, 3.0), 20.0, 2.0),
        ];
        let outcome = DragReconciler::default()
            .reconcile(&mut store, &legs, None)
            .unwrap();

        assert_eq!(outcome, DragOutcome::Unchanged);
        assert_eq!(store.revision(), revision);
    }

    #[test]
    fn test_dragged_midpoint_is_written_back() {
        let mut store = store_with(&[(1.0, 1.0), (3.0, 3.0)]);

        // User dragged the line, provider inserted a via point
        let legs = vec![
            leg((1.0, 1.0), (2.5, 1.5), 1200.0, 240.0),
            leg((2.5, 1.5), (3.0, 3.0), 800.0, 160.0),
        ];
        let outcome = DragReconciler::default()
            .reconcile(&mut store, &legs, Some("abc".to_string()))
            .unwrap();

        match outcome {
            DragOutcome::Applied { change, snapshot } => {
                assert_eq!(change.origin, ChangeOrigin::DragSync);
                assert_eq!(change.len, 3);
                assert_eq!(snapshot.distance_meters, 2000.0);
                assert_eq!(snapshot.duration_seconds, 400.0);
                assert_eq!(snapshot.encoded_path.as_deref(), Some("abc"));
                assert_eq!(snapshot.waypoints, store.points());
            }
            other => panic!("expected Applied, got {:?}", other),
        }
        assert_eq!(store.points()[1], GeoPoint::new(2.5, 1.5));
    }

    #[test]
    fn test_empty_legs_are_ignored() {
        let mut store = store_with(&[(1.0, 1.0), (2.0, 2.0)]);
        let outcome = DragReconciler::default()
            .reconcile(&mut store, &[], None)
            .unwrap();
        assert_eq!(outcome, DragOutcome::Unchanged);
        assert_eq!(store.len(), 2);
    }
}
