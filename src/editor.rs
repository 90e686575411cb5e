//! # Route Editor
//!
//! One route-building session. The editor owns the waypoint store, the
//! recalculation controller and the drag reconciler, and routes every store
//! change to the controller so that the two never drift apart.
//!
//! The editor is sans-IO: mutations return an [`EditorEffect`] and the host
//! decides when to call the routing provider. [`RouteEditor::sync`] is a
//! shortcut for hosts that just want to await the latest request.

use log::{debug, info};
use tokio::sync::watch;

use crate::config::PlannerConfig;
use crate::controller::{ApplyOutcome, RouteRecalculationController, RouteStatus, Trigger};
use crate::drag::{DragOutcome, DragReconciler};
use crate::error::{OptionExt, PlannerError, Result, RoutingFailure};
use crate::persistence::{RouteMetadata, SavedRoute};
use crate::proposal::RouteProposal;
use crate::routing::{RouteLeg, RouteRequest, RouteSnapshot, RoutedPath, RoutingProvider};
use crate::waypoints::{ChangeOrigin, WaypointChange, WaypointStore};
use crate::{Bounds, GeoPoint};

/// What the host has to do after an editor mutation.
#[derive(Debug, Clone, PartialEq)]
pub enum EditorEffect {
    /// Send this request to the routing provider
    Recalculate(RouteRequest),
    /// Route dropped (fewer than 2 stops)
    Cleared,
    /// Store changed but the route is already current
    Suppressed,
    /// Nothing changed
    None,
}

impl From<Trigger> for EditorEffect {
    fn from(trigger: Trigger) -> Self {
        match trigger {
            Trigger::Issued(request) => EditorEffect::Recalculate(request),
            Trigger::Cleared => EditorEffect::Cleared,
            Trigger::Suppressed => EditorEffect::Suppressed,
        }
    }
}

/// Everything needed to persist the current route.
#[derive(Debug, Clone, PartialEq)]
pub struct SaveRequest {
    pub waypoints: Vec<GeoPoint>,
    pub metadata: RouteMetadata,
    pub encoded_path: Option<String>,
}

/// A single route-editing session.
#[derive(Debug)]
pub struct RouteEditor {
    store: WaypointStore,
    controller: RouteRecalculationController,
    reconciler: DragReconciler,
    service_area: Bounds,
    /// Most recent request not yet answered
    latest_request: Option<RouteRequest>,
}

impl Default for RouteEditor {
    fn default() -> Self {
        Self::from_config(&PlannerConfig::default())
    }
}

impl RouteEditor {
    pub fn from_config(config: &PlannerConfig) -> Self {
        Self {
            store: WaypointStore::new(),
            controller: RouteRecalculationController::new(
                config.routing.travel_mode,
                config.drag_epsilon_degrees,
            ),
            reconciler: DragReconciler::new(config.drag_epsilon_degrees),
            service_area: config.service_area,
            latest_request: None,
        }
    }

    // ========================================================================
    // Queries
    // ========================================================================

    pub fn points(&self) -> &[GeoPoint] {
        self.store.points()
    }

    pub fn store(&self) -> &WaypointStore {
        &self.store
    }

    pub fn snapshot(&self) -> Option<&RouteSnapshot> {
        self.controller.snapshot()
    }

    pub fn status(&self) -> RouteStatus {
        self.controller.status()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<RouteStatus> {
        self.controller.subscribe_status()
    }

    pub fn last_error(&self) -> Option<&RoutingFailure> {
        self.controller.last_error()
    }

    // ========================================================================
    // Mutations
    // ========================================================================

    /// Append a clicked point.
    pub fn click(&mut self, point: GeoPoint) -> Result<EditorEffect> {
        let change = self.store.append(point)?;
        Ok(self.dispatch(change))
    }

    /// Remove the last point. No-op on an empty route.
    pub fn undo(&mut self) -> EditorEffect {
        match self.store.remove_last() {
            Some(change) => self.dispatch(change),
            None => EditorEffect::None,
        }
    }

    pub fn clear(&mut self) -> EditorEffect {
        match self.store.clear() {
            Some(change) => self.dispatch(change),
            None => EditorEffect::None,
        }
    }

    /// Replace the route with an assistant proposal after checking it lies in
    /// the service area.
    pub fn accept_proposal(&mut self, proposal: &RouteProposal) -> Result<EditorEffect> {
        proposal.validate(&self.service_area)?;
        let change = self
            .store
            .replace_all(proposal.points(), ChangeOrigin::AiProposal)?;
        info!(
            "[RouteEditor] Accepted proposal '{}' ({} stops)",
            proposal.name, change.len
        );
        Ok(self.dispatch(change))
    }

    /// Load a saved route back for editing.
    ///
    /// The stored figures and path are shown right away and stay in place
    /// until the fresh recalculation succeeds.
    pub fn load_saved(&mut self, route: &SavedRoute) -> Result<EditorEffect> {
        let change = self.store.replace_all(route.points(), ChangeOrigin::Load)?;
        info!("[RouteEditor] Loaded '{}' ({} stops)", route.name, change.len);
        let effect = self.dispatch(change);
        if self.store.len() >= 2 {
            self.controller.seed(RouteSnapshot {
                waypoints: self.store.points().to_vec(),
                distance_meters: route.metadata.distance_meters(),
                duration_seconds: route.metadata.duration_seconds(),
                encoded_path: route.encoded_path.clone(),
                legs: Vec::new(),
            });
        }
        Ok(effect)
    }

    /// The rendered path was dragged and the provider reported new legs.
    pub fn on_path_dragged(
        &mut self,
        legs: &[RouteLeg],
        encoded_path: Option<String>,
    ) -> Result<EditorEffect> {
        match self.reconciler.reconcile(&mut self.store, legs, encoded_path)? {
            DragOutcome::Unchanged => Ok(EditorEffect::None),
            DragOutcome::Applied { change, snapshot } => {
                self.controller.install_external(snapshot);
                self.latest_request = None;
                Ok(self.dispatch(change))
            }
        }
    }

    // ========================================================================
    // Responses
    // ========================================================================

    /// Feed back a provider answer for request `seq`.
    pub fn apply_response(
        &mut self,
        seq: u64,
        result: std::result::Result<RoutedPath, RoutingFailure>,
    ) -> ApplyOutcome {
        if self.latest_request.as_ref().is_some_and(|r| r.seq <= seq) {
            self.latest_request = None;
        }
        self.controller.apply(seq, result)
    }

    /// Route the latest pending request, if any, and apply the answer.
    ///
    /// Older pending requests are superseded and never sent.
    pub async fn sync<P: RoutingProvider>(&mut self, provider: &P) -> Option<ApplyOutcome> {
        let request = self.latest_request.take()?;
        Some(self.controller.run(provider, request).await)
    }

    // ========================================================================
    // Saving
    // ========================================================================

    /// Waypoints and figures of the current route, ready to persist.
    ///
    /// Fails while the route is missing, still being recalculated, or left
    /// behind by a failed recalculation, so the saved metadata always belongs
    /// to the waypoints currently in the store.
    pub fn to_save_request(&self) -> Result<SaveRequest> {
        if self.controller.is_calculating() {
            return Err(PlannerError::validation("route is still being calculated"));
        }
        if let RouteStatus::Failed(failure) = self.controller.status() {
            return Err(PlannerError::validation(format!(
                "last recalculation failed: {}",
                failure
            )));
        }
        let snapshot = self.controller.snapshot().ok_or_invalid("no route to save")?;
        if !self.controller.is_current_for(self.store.points()) {
            return Err(PlannerError::validation(
                "route does not match the current waypoints",
            ));
        }
        Ok(SaveRequest {
            waypoints: snapshot.waypoints.clone(),
            metadata: RouteMetadata::from_snapshot(snapshot, self.controller.travel_mode()),
            encoded_path: snapshot.encoded_path.clone(),
        })
    }

    fn dispatch(&mut self, change: WaypointChange) -> EditorEffect {
        let trigger = self.controller.on_waypoints_changed(self.store.points(), &change);
        debug!(
            "[RouteEditor] Revision {} from {:?}, {} stops",
            change.revision, change.origin, change.len
        );
        match &trigger {
            Trigger::Issued(request) => self.latest_request = Some(request.clone()),
            Trigger::Cleared => self.latest_request = None,
            Trigger::Suppressed => {}
        }
        trigger.into()
    }
}
