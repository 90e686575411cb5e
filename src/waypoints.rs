//! # Waypoint Store
//!
//! Ordered, mutable sequence of stops that makes up a route skeleton.
//!
//! Every effective mutation returns a [`WaypointChange`] carrying the
//! [`ChangeOrigin`] and a new revision number. The editor hands that change
//! to the recalculation controller, which is how drag write-backs are told
//! apart from user clicks without any timing tricks.

use serde::{Deserialize, Serialize};

use crate::error::{PlannerError, Result};
use crate::GeoPoint;

/// Who caused a store mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChangeOrigin {
    /// Map click or undo
    UserClick,
    /// Write-back from a dragged rendered path
    DragSync,
    /// Saved route loaded back into the editor
    Load,
    /// Accepted AI route proposal
    AiProposal,
    /// Explicit clear
    Clear,
}

/// A stop with its explicit position in the route.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Waypoint {
    pub lat: f64,
    pub lng: f64,
    pub order: u32,
}

impl Waypoint {
    pub fn point(&self) -> GeoPoint {
        GeoPoint::new(self.lat, self.lng)
    }
}

/// Notification describing one applied mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaypointChange {
    pub origin: ChangeOrigin,
    pub revision: u64,
    /// Number of points after the mutation
    pub len: usize,
}

/// Ordered sequence of route stops.
#[derive(Debug, Clone, Default)]
pub struct WaypointStore {
    points: Vec<GeoPoint>,
    revision: u64,
}

impl WaypointStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current stops in order.
    pub fn points(&self) -> &[GeoPoint] {
        &self.points
    }

    /// Stops with contiguous zero-based `order` values.
    pub fn waypoints(&self) -> Vec<Waypoint> {
        self.points
            .iter()
            .enumerate()
            .map(|(i, p)| Waypoint {
                lat: p.lat,
                lng: p.lng,
                order: i as u32,
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Revision of the last applied mutation (0 before any).
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Append a clicked point.
    pub fn append(&mut self, point: GeoPoint) -> Result<WaypointChange> {
        if !point.is_valid() {
            return Err(PlannerError::validation(format!(
                "invalid coordinate ({}, {})",
                point.lat, point.lng
            )));
        }
        self.points.push(point);
        Ok(self.bump(ChangeOrigin::UserClick))
    }

    /// Remove the most recent point. No-op on an empty store.
    pub fn remove_last(&mut self) -> Option<WaypointChange> {
        self.points.pop()?;
        Some(self.bump(ChangeOrigin::UserClick))
    }

    /// Remove every point. No-op on an empty store.
    pub fn clear(&mut self) -> Option<WaypointChange> {
        if self.points.is_empty() {
            return None;
        }
        self.points.clear();
        Some(self.bump(ChangeOrigin::Clear))
    }

    /// Replace the whole sequence atomically.
    ///
    /// Fails without touching the store if any point is invalid or the origin
    /// is one reserved for clicks/clears.
    pub fn replace_all(
        &mut self,
        points: Vec<GeoPoint>,
        origin: ChangeOrigin,
    ) -> Result<WaypointChange> {
        if matches!(origin, ChangeOrigin::UserClick | ChangeOrigin::Clear) {
            return Err(PlannerError::validation(format!(
                "replace_all cannot be tagged {:?}",
                origin
            )));
        }
        if let Some(bad) = points.iter().find(|p| !p.is_valid()) {
            return Err(PlannerError::validation(format!(
                "invalid coordinate ({}, {})",
                bad.lat, bad.lng
            )));
        }
        self.points = points;
        Ok(self.bump(origin))
    }

    fn bump(&mut self, origin: ChangeOrigin) -> WaypointChange {
        self.revision += 1;
        WaypointChange {
            origin,
            revision: self.revision,
            len: self.points.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(lat: f64, lng: f64) -> GeoPoint {
        GeoPoint::new(lat, lng)
    }

    #[test]
    fn test_append_and_order() {
        let mut store = WaypointStore::new();
        store.append(p(16.75, -93.10)).unwrap();
        store.append(p(16.76, -93.11)).unwrap();
        let change = store.append(p(16.77, -93.12)).unwrap();

        assert_eq!(change.origin, ChangeOrigin::UserClick);
        assert_eq!(change.len, 3);
        assert_eq!(change.revision, 3);

        let orders: Vec<u32> = store.waypoints().iter().map(|w| w.order).collect();
        assert_eq!(orders, vec![0, 1, 2]);
        assert_eq!(store.waypoints()[1].point(), p(16.76, -93.11));
    }

    #[test]
    fn test_remove_last_past_empty() {
        let mut store = WaypointStore::new();
        store.append(p(1.0, 1.0)).unwrap();
        store.append(p(2.0, 2.0)).unwrap();

        let mut changes = 0;
        for _ in 0..5 {
            if store.remove_last().is_some() {
                changes += 1;
            }
        }
        assert_eq!(changes, 2);
        assert!(store.is_empty());
        assert_eq!(store.revision(), 4);
    }

    #[test]
    fn test_clear_empty_is_noop() {
        let mut store = WaypointStore::new();
        assert!(store.clear().is_none());
        store.append(p(1.0, 1.0)).unwrap();
        assert_eq!(store.clear().unwrap().origin, ChangeOrigin::Clear);
        assert!(store.is_empty());
    }

    #[test]
    fn test_replace_all_is_atomic() {
        let mut store = WaypointStore::new();
        store.append(p(1.0, 1.0)).unwrap();

        let result = store.replace_all(vec![p(2.0, 2.0), p(95.0, 0.0)], ChangeOrigin::Load);
        assert!(matches!(result, Err(PlannerError::Validation { .. })));
        assert_eq!(store.points(), &[p(1.0, 1.0)]);
        assert_eq!(store.revision(), 1);

        let change = store
            .replace_all(vec![p(2.0, 2.0), p(3.0, 3.0)], ChangeOrigin::DragSync)
            .unwrap();
        assert_eq!(change.origin, ChangeOrigin::DragSync);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_replace_all_rejects_click_origin() {
        let mut store = WaypointStore::new();
        assert!(store
            .replace_all(vec![p(1.0, 1.0)], ChangeOrigin::UserClick)
            .is_err());
        assert!(store.is_empty());
    }

    #[test]
    fn test_append_rejects_invalid() {
        let mut store = WaypointStore::new();
        assert!(store.append(p(f64::NAN, 0.0)).is_err());
        assert!(store.is_empty());
        assert_eq!(store.revision(), 0);
    }
}
