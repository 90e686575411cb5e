//! # Route Recalculation Controller
//!
//! Keeps a [`RouteSnapshot`] in step with a waypoint sequence.
//!
//! ## Ordering
//!
//! Every request gets a monotonically increasing sequence number. Responses
//! may come back in any order; a response is only applied if its sequence
//! number is higher than the highest one already resolved. Failed responses
//! also count as resolved so that an older success arriving afterwards cannot
//! replace the route with a path for a stale waypoint sequence.
//!
//! ## Echo suppression
//!
//! A change tagged [`ChangeOrigin::DragSync`] whose points already match the
//! current snapshot does not issue a request: the drag reconciler installed
//! that snapshot itself from the provider's leg data.

use std::collections::BTreeMap;

use log::{debug, info, warn};
use tokio::sync::watch;

use crate::error::{PlannerError, Result, RoutingFailure};
use crate::geo_utils::{sequences_approximately_equal, GEO_EPSILON_DEGREES};
use crate::routing::{RouteRequest, RouteSnapshot, RoutedPath, RoutingProvider, TravelMode};
use crate::waypoints::{ChangeOrigin, WaypointChange};
use crate::GeoPoint;

/// Observable controller status.
#[derive(Debug, Clone, PartialEq)]
pub enum RouteStatus {
    /// No route (fewer than 2 stops)
    Empty,
    /// At least one request newer than the applied route is in flight
    Calculating,
    /// Snapshot reflects the latest issued request
    Ready,
    /// The latest resolved request failed; any previous snapshot is kept
    Failed(RoutingFailure),
}

impl RouteStatus {
    pub fn is_calculating(&self) -> bool {
        matches!(self, RouteStatus::Calculating)
    }
}

/// What a store change asked of the controller.
#[derive(Debug, Clone, PartialEq)]
pub enum Trigger {
    /// A request was issued and must be sent to the provider
    Issued(RouteRequest),
    /// Fewer than 2 stops; snapshot cleared, nothing issued
    Cleared,
    /// Drag echo; nothing issued
    Suppressed,
}

/// Result of feeding a provider response back.
#[derive(Debug, Clone, PartialEq)]
pub enum ApplyOutcome {
    /// Snapshot replaced
    Applied,
    /// Response was older than one already resolved and was dropped
    Stale,
    /// Provider failed; previous snapshot retained
    Failed(RoutingFailure),
}

/// Sequenced recalculation state for one waypoint store.
#[derive(Debug)]
pub struct RouteRecalculationController {
    travel_mode: TravelMode,
    epsilon_degrees: f64,

    /// Highest sequence number handed out
    issued_seq: u64,
    /// Highest sequence number resolved (applied, failed, or superseded)
    resolved_seq: u64,
    /// Stops of requests still awaiting a response, keyed by sequence
    pending: BTreeMap<u64, Vec<GeoPoint>>,

    snapshot: Option<RouteSnapshot>,
    last_error: Option<RoutingFailure>,
    status: watch::Sender<RouteStatus>,
}

impl Default for RouteRecalculationController {
    fn default() -> Self {
        Self::new(TravelMode::Bicycling, GEO_EPSILON_DEGREES)
    }
}

impl RouteRecalculationController {
    pub fn new(travel_mode: TravelMode, epsilon_degrees: f64) -> Self {
        let (status, _) = watch::channel(RouteStatus::Empty);
        Self {
            travel_mode,
            epsilon_degrees,
            issued_seq: 0,
            resolved_seq: 0,
            pending: BTreeMap::new(),
            snapshot: None,
            last_error: None,
            status,
        }
    }

    // ========================================================================
    // Queries
    // ========================================================================

    pub fn snapshot(&self) -> Option<&RouteSnapshot> {
        self.snapshot.as_ref()
    }

    pub fn status(&self) -> RouteStatus {
        self.status.borrow().clone()
    }

    /// Receiver that observes every status change.
    pub fn subscribe_status(&self) -> watch::Receiver<RouteStatus> {
        self.status.subscribe()
    }

    pub fn last_error(&self) -> Option<&RoutingFailure> {
        self.last_error.as_ref()
    }

    pub fn is_calculating(&self) -> bool {
        self.issued_seq > self.resolved_seq
    }

    /// Number of issued requests whose responses are still expected.
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn latest_issued_seq(&self) -> u64 {
        self.issued_seq
    }

    pub fn travel_mode(&self) -> TravelMode {
        self.travel_mode
    }

    /// Whether the snapshot was routed through exactly these stops.
    pub fn is_current_for(&self, points: &[GeoPoint]) -> bool {
        self.snapshot.as_ref().is_some_and(|snapshot| {
            sequences_approximately_equal(&snapshot.waypoints, points, self.epsilon_degrees)
        })
    }

    // ========================================================================
    // Triggering
    // ========================================================================

    /// React to a waypoint store change.
    pub fn on_waypoints_changed(
        &mut self,
        points: &[GeoPoint],
        change: &WaypointChange,
    ) -> Trigger {
        if points.len() < 2 {
            self.clear();
            return Trigger::Cleared;
        }

        if change.origin == ChangeOrigin::DragSync {
            if let Some(snapshot) = &self.snapshot {
                let epsilon = self.epsilon_degrees;
                if sequences_approximately_equal(&snapshot.waypoints, points, epsilon) {
                    debug!(
                        "[RouteController] Suppressed drag echo at revision {}",
                        change.revision
                    );
                    return Trigger::Suppressed;
                }
            }
        }

        Trigger::Issued(self.issue(points.to_vec()))
    }

    /// Issue a new request for the given stops.
    pub fn issue(&mut self, stops: Vec<GeoPoint>) -> RouteRequest {
        self.issued_seq += 1;
        let seq = self.issued_seq;
        self.pending.insert(seq, stops.clone());
        debug!(
            "[RouteController] Issued request #{} with {} stops",
            seq,
            stops.len()
        );
        self.publish(RouteStatus::Calculating);
        RouteRequest::new(seq, stops, self.travel_mode)
    }

    /// Drop the route and invalidate everything in flight.
    pub fn clear(&mut self) {
        self.resolved_seq = self.issued_seq;
        self.pending.clear();
        self.snapshot = None;
        self.last_error = None;
        self.publish(RouteStatus::Empty);
    }

    // ========================================================================
    // Applying responses
    // ========================================================================

    /// Feed back the provider's answer for request `seq`.
    pub fn apply(
        &mut self,
        seq: u64,
        result: std::result::Result<RoutedPath, RoutingFailure>,
    ) -> ApplyOutcome {
        let stops = match self.pending.remove(&seq) {
            Some(stops) if seq > self.resolved_seq => stops,
            _ => {
                debug!(
                    "[RouteController] Dropping stale response #{} (resolved #{})",
                    seq, self.resolved_seq
                );
                return ApplyOutcome::Stale;
            }
        };

        // Anything issued before this response can no longer win
        self.resolved_seq = seq;
        self.pending.retain(|&pending_seq, _| pending_seq > seq);

        let outcome = match result {
            Ok(path) => {
                let snapshot = RouteSnapshot::from_path(stops, path);
                info!(
                    "[RouteController] Applied #{}: {:.0}m, {:.0}s",
                    seq, snapshot.distance_meters, snapshot.duration_seconds
                );
                self.snapshot = Some(snapshot);
                self.last_error = None;
                ApplyOutcome::Applied
            }
            Err(failure) => {
                warn!("[RouteController] Request #{} failed: {}", seq, failure);
                self.last_error = Some(failure.clone());
                ApplyOutcome::Failed(failure)
            }
        };

        self.publish_resolved();
        outcome
    }

    /// Install a snapshot computed elsewhere (drag leg data).
    ///
    /// Consumes a sequence number so every older in-flight response becomes
    /// stale. Returns that sequence number.
    pub fn install_external(&mut self, snapshot: RouteSnapshot) -> u64 {
        self.issued_seq += 1;
        self.resolved_seq = self.issued_seq;
        self.pending.clear();
        debug!(
            "[RouteController] Installed external snapshot as #{} ({:.0}m)",
            self.issued_seq, snapshot.distance_meters
        );
        self.snapshot = Some(snapshot);
        self.last_error = None;
        self.publish(RouteStatus::Ready);
        self.issued_seq
    }

    /// Show a previously computed snapshot until pending requests resolve.
    ///
    /// In-flight requests stay valid: a later success replaces the seed and
    /// a failure keeps it.
    pub fn seed(&mut self, snapshot: RouteSnapshot) {
        debug!(
            "[RouteController] Seeded snapshot ({:.0}m, {} pending)",
            snapshot.distance_meters,
            self.pending.len()
        );
        self.snapshot = Some(snapshot);
        self.publish_resolved();
    }

    // ========================================================================
    // Async helpers
    // ========================================================================

    /// Send an issued request to the provider and apply the answer.
    pub async fn run<P: RoutingProvider>(
        &mut self,
        provider: &P,
        request: RouteRequest,
    ) -> ApplyOutcome {
        let result = provider.route(&request).await;
        self.apply(request.seq, result)
    }

    /// Issue, route and apply in one step.
    ///
    /// Fewer than 2 stops clears the snapshot and reports a validation error
    /// without calling the provider.
    pub async fn recalculate<P: RoutingProvider>(
        &mut self,
        provider: &P,
        points: &[GeoPoint],
    ) -> Result<ApplyOutcome> {
        if points.len() < 2 {
            self.clear();
            return Err(PlannerError::validation(format!(
                "need at least 2 waypoints to route, got {}",
                points.len()
            )));
        }
        let request = self.issue(points.to_vec());
        Ok(self.run(provider, request).await)
    }

    fn publish_resolved(&self) {
        let status = if self.is_calculating() {
            RouteStatus::Calculating
        } else if let Some(err) = &self.last_error {
            RouteStatus::Failed(err.clone())
        } else if self.snapshot.is_some() {
            RouteStatus::Ready
        } else {
            RouteStatus::Empty
        };
        self.publish(status);
    }

    fn publish(&self, status: RouteStatus) {
        self.status.send_replace(status);
    }
}
