use std::collections::{HashMap, HashSet};

use crisis_shared::geo::require_placeable;
use crisis_shared::{GeoPoint, Incident, IncidentId, PopupContent};
use serde::Serialize;
use tracing::{debug, info};

use crate::camera::CameraTransition;
use crate::diagnostics::{Diagnostic, Diagnostics};
use crate::error::{ConsistencyError, EngineError, PlacementError};
use crate::surface::{
    ListenerId, MarkerId, MarkerKind, MarkerStyle, PopupId, PredictionOverlay, RenderSurface,
};
use crate::toggles::ToggleState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum EngineState {
    Uninitialized,
    Ready,
    Disposed,
}

/// Surface resources owned on behalf of one incident.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderHandle {
    pub marker: MarkerId,
    pub popup: PopupId,
    pub listener: ListenerId,
    pub position: GeoPoint,
    pub style: MarkerStyle,
    pub popup_content: PopupContent,
    pub popup_fingerprint: u32,
}

impl RenderHandle {
    /// Fingerprints short-circuit the common case; equal fingerprints still
    /// compare the text.
    fn popup_differs(&self, target: &MarkerTarget) -> bool {
        self.popup_fingerprint != target.popup_fingerprint || self.popup_content != target.popup
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct UserLocationHandle {
    marker: MarkerId,
    position: GeoPoint,
}

/// Immutable input of one reconciliation pass.
#[derive(Debug, Clone, Copy)]
pub struct Scene<'a> {
    /// The full incident list, not the list panel's filtered view.
    pub incidents: &'a [Incident],
    pub toggles: ToggleState,
    pub selected: Option<&'a IncidentId>,
    pub user_location: Option<GeoPoint>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MarkerTarget {
    pub position: GeoPoint,
    pub style: MarkerStyle,
    pub popup: PopupContent,
    pub popup_fingerprint: u32,
}

impl MarkerTarget {
    fn for_incident(incident: &Incident, position: GeoPoint, emphasized: bool) -> Self {
        let popup = PopupContent::for_incident(incident);
        Self {
            position,
            style: MarkerStyle::for_incident(incident, emphasized),
            popup_fingerprint: popup.fingerprint(),
            popup,
        }
    }
}

/// One surface mutation decided by [`MapSyncEngine::plan`].
#[derive(Debug, Clone, PartialEq)]
pub enum SurfaceOp {
    CreateMarker {
        id: IncidentId,
        target: MarkerTarget,
    },
    UpdateMarker {
        id: IncidentId,
        position: Option<GeoPoint>,
        style: Option<MarkerStyle>,
        popup: Option<(PopupContent, u32)>,
    },
    RemoveMarker {
        id: IncidentId,
    },
    SetPredictionsVisible(bool),
    PlaceUserLocation(GeoPoint),
    MoveUserLocation(GeoPoint),
    RemoveUserLocation,
    FlyTo(CameraTransition),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum IssueKind {
    Placement,
    Duplicate,
}

/// Everything a pass will do, computed without touching the surface.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReconcilePlan {
    pub ops: Vec<SurfaceOp>,
    pub issues: Vec<Diagnostic>,
    selection: Option<IncidentId>,
    visible: HashSet<IncidentId>,
}

impl ReconcilePlan {
    pub fn is_noop(&self) -> bool {
        self.ops.is_empty()
    }

    /// Ids that will hold a handle once this plan is applied.
    pub fn visible(&self) -> &HashSet<IncidentId> {
        &self.visible
    }

    pub fn count(&self, matches: impl Fn(&SurfaceOp) -> bool) -> usize {
        self.ops.iter().filter(|op| matches(op)).count()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    pub created: usize,
    pub updated: usize,
    pub removed: usize,
    pub skipped: usize,
    pub layer_flips: usize,
    pub camera_moved: bool,
    pub live_handles: usize,
    pub user_location_shown: bool,
}

/// Keeps surface markers, popups and overlay layers in step with the
/// incident list, toggles, selection and user location.
///
/// Every pass diffs by incident id against the handle table. Handles are
/// created on first appearance, mutated in place while present and
/// released when their id leaves the visible set.
pub struct MapSyncEngine<S> {
    surface: S,
    diagnostics: Diagnostics,
    state: EngineState,
    overlay: PredictionOverlay,
    handles: HashMap<IncidentId, RenderHandle>,
    by_marker: HashMap<MarkerId, IncidentId>,
    user_marker: Option<UserLocationHandle>,
    predictions_visible: Option<bool>,
    last_selection: Option<IncidentId>,
    reported: HashMap<(IssueKind, IncidentId), Diagnostic>,
}

impl<S: RenderSurface> MapSyncEngine<S> {
    pub fn new(surface: S, diagnostics: Diagnostics) -> Self {
        Self {
            surface,
            diagnostics,
            state: EngineState::Uninitialized,
            overlay: PredictionOverlay::wildfire(),
            handles: HashMap::new(),
            by_marker: HashMap::new(),
            user_marker: None,
            predictions_visible: None,
            last_selection: None,
            reported: HashMap::new(),
        }
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    pub fn handle(&self, id: &IncidentId) -> Option<&RenderHandle> {
        self.handles.get(id)
    }

    pub fn live_ids(&self) -> HashSet<&IncidentId> {
        self.handles.keys().collect()
    }

    pub fn emphasized(&self) -> Vec<&IncidentId> {
        self.handles
            .iter()
            .filter(|(_, handle)| handle.style.is_emphasized())
            .map(|(id, _)| id)
            .collect()
    }

    pub fn has_user_location(&self) -> bool {
        self.user_marker.is_some()
    }

    pub fn incident_for_marker(&self, marker: MarkerId) -> Option<&IncidentId> {
        self.by_marker.get(&marker)
    }

    /// One-time setup: installs the static prediction overlay.
    pub fn mount(&mut self) -> Result<(), EngineError> {
        match self.state {
            EngineState::Uninitialized => {}
            EngineState::Ready => return Err(EngineError::AlreadyMounted),
            EngineState::Disposed => return Err(EngineError::NotReady(EngineState::Disposed)),
        }
        self.surface.install_overlay(&self.overlay);
        self.state = EngineState::Ready;
        info!(source = self.overlay.source_id, "map engine mounted");
        Ok(())
    }

    /// Compute the pass for `scene` against the current handle table.
    pub fn plan(&self, scene: &Scene<'_>) -> ReconcilePlan {
        let mut plan = ReconcilePlan {
            selection: scene.selected.cloned(),
            ..ReconcilePlan::default()
        };

        let mut occurrences: HashMap<&IncidentId, usize> =
            HashMap::with_capacity(scene.incidents.len());
        for incident in scene.incidents {
            *occurrences.entry(&incident.id).or_default() += 1;
        }

        let mut duplicates_seen: HashSet<&IncidentId> = HashSet::new();
        let mut targets: Vec<(&IncidentId, MarkerTarget)> =
            Vec::with_capacity(scene.incidents.len());
        for incident in scene.incidents {
            let count = occurrences.get(&incident.id).copied().unwrap_or(0);
            if count > 1 {
                if duplicates_seen.insert(&incident.id) {
                    plan.issues.push(Diagnostic::Consistency(
                        ConsistencyError::DuplicateIncident {
                            id: incident.id.clone(),
                            occurrences: count,
                        },
                    ));
                }
                continue;
            }
            if !scene.toggles.admits_verified(incident.verified) {
                continue;
            }
            let position = match require_placeable(&incident.location) {
                Ok(position) => position,
                Err(reason) => {
                    plan.issues.push(Diagnostic::InvalidCoordinate(PlacementError {
                        id: incident.id.clone(),
                        reason,
                    }));
                    continue;
                }
            };
            let emphasized = scene.selected == Some(&incident.id);
            targets.push((
                &incident.id,
                MarkerTarget::for_incident(incident, position, emphasized),
            ));
        }

        for (id, target) in targets {
            plan.visible.insert(id.clone());
            match self.handles.get(id) {
                None => plan.ops.push(SurfaceOp::CreateMarker {
                    id: id.clone(),
                    target,
                }),
                Some(handle) => {
                    let position =
                        (handle.position != target.position).then_some(target.position);
                    let style = (handle.style != target.style).then_some(target.style);
                    let popup = handle
                        .popup_differs(&target)
                        .then(|| (target.popup.clone(), target.popup_fingerprint));
                    if position.is_some() || style.is_some() || popup.is_some() {
                        plan.ops.push(SurfaceOp::UpdateMarker {
                            id: id.clone(),
                            position,
                            style,
                            popup,
                        });
                    }
                }
            }
        }

        let mut stale: Vec<&IncidentId> = self
            .handles
            .keys()
            .filter(|id| !plan.visible.contains(*id))
            .collect();
        stale.sort();
        plan.ops.extend(
            stale
                .into_iter()
                .map(|id| SurfaceOp::RemoveMarker { id: id.clone() }),
        );

        if self.predictions_visible != Some(scene.toggles.show_predictions) {
            plan.ops
                .push(SurfaceOp::SetPredictionsVisible(scene.toggles.show_predictions));
        }

        let wanted = scene
            .user_location
            .filter(|_| scene.toggles.show_user_location)
            .filter(|point| crisis_shared::geo::validate_point(*point).is_ok());
        match (self.user_marker, wanted) {
            (None, Some(point)) => plan.ops.push(SurfaceOp::PlaceUserLocation(point)),
            (Some(current), Some(point)) if current.position != point => {
                plan.ops.push(SurfaceOp::MoveUserLocation(point));
            }
            (Some(_), None) => plan.ops.push(SurfaceOp::RemoveUserLocation),
            _ => {}
        }

        if scene.selected != self.last_selection.as_ref() {
            let focus = scene.selected.and_then(|selected| {
                scene
                    .incidents
                    .iter()
                    .find(|incident| &incident.id == selected)
                    .filter(|incident| occurrences.get(&incident.id).copied() == Some(1))
                    .and_then(|incident| require_placeable(&incident.location).ok())
            });
            if let Some(center) = focus {
                plan.ops.push(SurfaceOp::FlyTo(CameraTransition::focus(center)));
            }
        }

        plan
    }

    /// Run one reconciliation pass. Safe to call redundantly.
    pub fn reconcile(&mut self, scene: &Scene<'_>) -> Result<ReconcileReport, EngineError> {
        if self.state != EngineState::Ready {
            return Err(EngineError::NotReady(self.state));
        }
        let plan = self.plan(scene);
        self.report_issues(scene, &plan);
        Ok(self.apply(plan))
    }

    /// Emit each issue once. An entry is forgotten only when its record is
    /// corrected or leaves the snapshot; being hidden by a toggle is neither.
    /// A record that changes into a different invalid state is reported again.
    fn report_issues(&mut self, scene: &Scene<'_>, plan: &ReconcilePlan) {
        let mut duplicated: HashSet<&IncidentId> = HashSet::new();
        for issue in &plan.issues {
            let key = match issue {
                Diagnostic::InvalidCoordinate(err) => (IssueKind::Placement, err.id.clone()),
                Diagnostic::Consistency(ConsistencyError::DuplicateIncident { id, .. }) => {
                    duplicated.insert(id);
                    (IssueKind::Duplicate, id.clone())
                }
                _ => continue,
            };
            if self.reported.get(&key) != Some(issue) {
                self.diagnostics.emit(issue.clone());
                self.reported.insert(key, issue.clone());
            }
        }

        let present: HashSet<&IncidentId> =
            scene.incidents.iter().map(|incident| &incident.id).collect();
        self.reported.retain(|(kind, id), _| {
            present.contains(id)
                && match kind {
                    IssueKind::Duplicate => duplicated.contains(id),
                    IssueKind::Placement => !plan.visible.contains(id),
                }
        });
    }

    fn apply(&mut self, plan: ReconcilePlan) -> ReconcileReport {
        let mut report = ReconcileReport {
            skipped: plan.issues.len(),
            ..ReconcileReport::default()
        };

        for op in plan.ops {
            match op {
                SurfaceOp::CreateMarker { id, target } => {
                    if let Some(existing) = self.handles.remove(&id) {
                        self.diagnostics.emit(Diagnostic::Consistency(
                            ConsistencyError::HandleDivergence { id: id.clone() },
                        ));
                        self.release(existing);
                    }
                    let marker = self.surface.create_marker(
                        MarkerKind::Incident,
                        target.position,
                        &target.style,
                    );
                    let popup = self.surface.create_popup(marker, &target.popup);
                    let listener = self.surface.attach_listeners(marker);
                    self.by_marker.insert(marker, id.clone());
                    self.handles.insert(
                        id,
                        RenderHandle {
                            marker,
                            popup,
                            listener,
                            position: target.position,
                            style: target.style,
                            popup_content: target.popup,
                            popup_fingerprint: target.popup_fingerprint,
                        },
                    );
                    report.created += 1;
                }
                SurfaceOp::UpdateMarker {
                    id,
                    position,
                    style,
                    popup,
                } => {
                    let Some(handle) = self.handles.get_mut(&id) else {
                        continue;
                    };
                    if let Some(position) = position {
                        self.surface.move_marker(handle.marker, position);
                        handle.position = position;
                    }
                    if let Some(style) = style {
                        self.surface.restyle_marker(handle.marker, &style);
                        handle.style = style;
                    }
                    if let Some((content, fingerprint)) = popup {
                        self.surface.set_popup_content(handle.popup, &content);
                        handle.popup_content = content;
                        handle.popup_fingerprint = fingerprint;
                    }
                    report.updated += 1;
                }
                SurfaceOp::RemoveMarker { id } => {
                    if let Some(handle) = self.handles.remove(&id) {
                        self.release(handle);
                        report.removed += 1;
                    }
                }
                SurfaceOp::SetPredictionsVisible(visible) => {
                    for layer in self.overlay.layer_ids() {
                        self.surface.set_layer_visibility(layer, visible);
                    }
                    self.predictions_visible = Some(visible);
                    report.layer_flips += 1;
                }
                SurfaceOp::PlaceUserLocation(position) => {
                    let marker = self.surface.create_marker(
                        MarkerKind::UserLocation,
                        position,
                        &MarkerStyle::user_location(),
                    );
                    self.user_marker = Some(UserLocationHandle { marker, position });
                }
                SurfaceOp::MoveUserLocation(position) => {
                    if let Some(user) = self.user_marker.as_mut() {
                        self.surface.move_marker(user.marker, position);
                        user.position = position;
                    }
                }
                SurfaceOp::RemoveUserLocation => {
                    if let Some(user) = self.user_marker.take() {
                        self.surface.remove_marker(user.marker);
                    }
                }
                SurfaceOp::FlyTo(camera) => {
                    self.surface.fly_to(&camera);
                    report.camera_moved = true;
                }
            }
        }

        self.last_selection = plan.selection;
        self.repair_divergence(&plan.visible);

        report.live_handles = self.handles.len();
        report.user_location_shown = self.user_marker.is_some();
        debug!(
            created = report.created,
            updated = report.updated,
            removed = report.removed,
            skipped = report.skipped,
            live = report.live_handles,
            "reconcile pass"
        );
        report
    }

    /// Post-pass membership check. A handle outside the visible set is a bug;
    /// it is reported and released rather than left on the surface.
    fn repair_divergence(&mut self, visible: &HashSet<IncidentId>) {
        if self.handles.len() == visible.len() && self.handles.keys().all(|id| visible.contains(id))
        {
            return;
        }
        let strays: Vec<IncidentId> = self
            .handles
            .keys()
            .filter(|id| !visible.contains(*id))
            .cloned()
            .collect();
        for id in strays {
            if let Some(handle) = self.handles.remove(&id) {
                self.release(handle);
            }
            self.diagnostics
                .emit(Diagnostic::Consistency(ConsistencyError::HandleDivergence { id }));
        }
        for id in visible.iter().filter(|id| !self.handles.contains_key(*id)) {
            self.diagnostics
                .emit(Diagnostic::Consistency(ConsistencyError::HandleDivergence {
                    id: id.clone(),
                }));
        }
    }

    fn release(&mut self, handle: RenderHandle) {
        self.surface.detach_listeners(handle.listener);
        self.surface.remove_popup(handle.popup);
        self.surface.remove_marker(handle.marker);
        self.by_marker.remove(&handle.marker);
    }

    /// Open or close the popup of an incident marker on hover.
    pub fn set_hover(&mut self, marker: MarkerId, hovered: bool) -> bool {
        let Some(handle) = self
            .by_marker
            .get(&marker)
            .and_then(|id| self.handles.get(id))
        else {
            return false;
        };
        self.surface.set_popup_open(handle.popup, hovered);
        true
    }

    /// Explicit camera command, independent of selection.
    pub fn fly_home(&mut self) -> Result<(), EngineError> {
        if self.state != EngineState::Ready {
            return Err(EngineError::NotReady(self.state));
        }
        self.surface.fly_to(&CameraTransition::home());
        Ok(())
    }

    /// Release every handle and the surface itself. Idempotent.
    pub fn dispose(&mut self) {
        if self.state == EngineState::Disposed {
            return;
        }
        let handles: Vec<RenderHandle> = self.handles.drain().map(|(_, handle)| handle).collect();
        let released = handles.len();
        for handle in handles {
            self.release(handle);
        }
        if let Some(user) = self.user_marker.take() {
            self.surface.remove_marker(user.marker);
        }
        self.surface.teardown();
        self.state = EngineState::Disposed;
        self.last_selection = None;
        self.predictions_visible = None;
        info!(released, "map engine disposed");
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use crisis_shared::{
        CoordinateError, CrisisType, GeoPoint, Incident, IncidentId, IncidentLocation,
        PopupContent, Severity,
    };

    use super::{EngineState, MapSyncEngine, Scene, SurfaceOp};
    use crate::diagnostics::{Diagnostic, Diagnostics};
    use crate::error::{ConsistencyError, EngineError};
    use crate::surface::{MarkerKind, MemorySurface, RenderSurface};
    use crate::toggles::ToggleState;

    fn incident(id: &str, severity: Severity, verified: bool) -> Incident {
        let n: f64 = id.parse().unwrap_or(1.0);
        Incident {
            id: IncidentId::from(id),
            title: format!("Incident {id}"),
            description: String::new(),
            category: CrisisType::Wildfire,
            severity,
            location: IncidentLocation {
                name: format!("Site {id}"),
                coordinates: GeoPoint::new(39.0 + n * 0.001, -121.0 - n * 0.001),
            },
            timestamp: Utc.with_ymd_and_hms(2025, 4, 3, 14, 30, 0).unwrap(),
            source: "test".to_string(),
            verified,
            affected_population: None,
            resource_needs: Vec::new(),
        }
    }

    fn sample() -> Vec<Incident> {
        vec![
            incident("1", Severity::Critical, true),
            incident("2", Severity::High, true),
            incident("3", Severity::Medium, false),
            incident("9", Severity::Critical, false),
        ]
    }

    fn scene<'a>(
        incidents: &'a [Incident],
        toggles: ToggleState,
        selected: Option<&'a IncidentId>,
    ) -> Scene<'a> {
        Scene {
            incidents,
            toggles,
            selected,
            user_location: None,
        }
    }

    fn mounted() -> (MapSyncEngine<MemorySurface>, Diagnostics) {
        let diagnostics = Diagnostics::new(16);
        let mut engine = MapSyncEngine::new(MemorySurface::new(), diagnostics.clone());
        engine.mount().expect("fresh engine should mount");
        (engine, diagnostics)
    }

    fn ids<'a>(values: impl IntoIterator<Item = &'a IncidentId>) -> Vec<String> {
        let mut out: Vec<String> = values.into_iter().map(|id| id.to_string()).collect();
        out.sort();
        out
    }

    #[test]
    fn reconcile_requires_mount() {
        let mut engine = MapSyncEngine::new(MemorySurface::new(), Diagnostics::new(4));
        let incidents = sample();
        let result = engine.reconcile(&scene(&incidents, ToggleState::default(), None));
        assert_eq!(
            result,
            Err(EngineError::NotReady(EngineState::Uninitialized))
        );
        assert_eq!(engine.surface().stats().markers_created, 0);
    }

    #[test]
    fn mount_installs_overlay_once() {
        let (mut engine, _) = mounted();
        assert_eq!(engine.state(), EngineState::Ready);
        assert!(engine.surface().overlay_installed("wildfire-prediction"));
        assert_eq!(engine.mount(), Err(EngineError::AlreadyMounted));
    }

    #[test]
    fn handle_set_matches_visible_set() {
        let (mut engine, _) = mounted();
        let incidents = sample();
        let report = engine
            .reconcile(&scene(&incidents, ToggleState::default(), None))
            .expect("engine is ready");

        assert_eq!(report.created, 4);
        assert_eq!(ids(engine.live_ids()), vec!["1", "2", "3", "9"]);
        assert_eq!(engine.surface().incident_marker_count(), 4);
        assert_eq!(engine.surface().popups().len(), 4);
        assert_eq!(engine.surface().listener_count(), 4);
    }

    #[test]
    fn second_pass_without_changes_is_noop() {
        let (mut engine, _) = mounted();
        let incidents = sample();
        let selected = IncidentId::from("2");
        let input = scene(&incidents, ToggleState::default(), Some(&selected));
        engine.reconcile(&input).expect("engine is ready");
        let before = engine.surface().stats();

        assert!(engine.plan(&input).is_noop());
        let report = engine.reconcile(&input).expect("engine is ready");

        assert_eq!(report.created + report.removed + report.updated, 0);
        assert!(!report.camera_moved);
        assert_eq!(engine.surface().stats(), before);
    }

    #[test]
    fn hiding_resolved_removes_only_verified_handles() {
        let (mut engine, _) = mounted();
        let incidents = sample();
        engine
            .reconcile(&scene(&incidents, ToggleState::default(), None))
            .expect("engine is ready");
        let unverified_marker = engine
            .handle(&IncidentId::from("3"))
            .map(|handle| handle.marker)
            .expect("handle 3 exists");

        let report = engine
            .reconcile(&scene(&incidents, ToggleState::default().with_resolved(false), None))
            .expect("engine is ready");

        assert_eq!(report.removed, 2);
        assert_eq!(report.created, 0);
        assert_eq!(report.updated, 0);
        assert_eq!(ids(engine.live_ids()), vec!["3", "9"]);
        assert_eq!(
            engine.handle(&IncidentId::from("3")).map(|handle| handle.marker),
            Some(unverified_marker)
        );
        assert_eq!(engine.surface().popups().len(), 2);
        assert_eq!(engine.surface().listener_count(), 2);
    }

    #[test]
    fn moved_incident_updates_in_place() {
        let (mut engine, _) = mounted();
        let mut incidents = sample();
        engine
            .reconcile(&scene(&incidents, ToggleState::default(), None))
            .expect("engine is ready");
        let marker = engine.handle(&IncidentId::from("2")).map(|h| h.marker);

        incidents[1].location.coordinates = GeoPoint::new(40.0, -122.0);
        let before = engine.surface().stats();
        let report = engine
            .reconcile(&scene(&incidents, ToggleState::default(), None))
            .expect("engine is ready");

        assert_eq!((report.created, report.updated, report.removed), (0, 1, 0));
        assert_eq!(engine.handle(&IncidentId::from("2")).map(|h| h.marker), marker);
        let after = engine.surface().stats();
        assert_eq!(after.marker_moves, before.marker_moves + 1);
        assert_eq!(after.popup_updates, before.popup_updates);
    }

    #[test]
    fn popup_content_pushed_only_when_text_changes() {
        let (mut engine, _) = mounted();
        let mut incidents = sample();
        engine
            .reconcile(&scene(&incidents, ToggleState::default(), None))
            .expect("engine is ready");

        incidents[2].title = "Bridge closed".to_string();
        incidents[2].description = "updated description is not shown".to_string();
        engine
            .reconcile(&scene(&incidents, ToggleState::default(), None))
            .expect("engine is ready");

        assert_eq!(engine.surface().stats().popup_updates, 1);
        let handle = engine.handle(&IncidentId::from("3")).expect("handle exists");
        let popup = engine
            .surface()
            .popups()
            .get(&handle.popup)
            .expect("popup is live");
        assert_eq!(popup.content.title, "Bridge closed");
    }

    #[test]
    fn popup_text_is_compared_even_when_fingerprints_match() {
        let (mut engine, _) = mounted();
        let mut incidents = sample();
        incidents[2].title = "plumless".to_string();
        engine
            .reconcile(&scene(&incidents, ToggleState::default(), None))
            .expect("engine is ready");

        incidents[2].title = "buckeroo".to_string();
        let renamed = PopupContent::for_incident(&incidents[2]).fingerprint();
        // Stand in for a checksum collision between the old and new text.
        if let Some(handle) = engine.handles.get_mut(&IncidentId::from("3")) {
            handle.popup_fingerprint = renamed;
        }

        let report = engine
            .reconcile(&scene(&incidents, ToggleState::default(), None))
            .expect("engine is ready");

        assert_eq!(report.updated, 1);
        let handle = engine.handle(&IncidentId::from("3")).expect("handle exists");
        assert_eq!(handle.popup_content.title, "buckeroo");
        let popup = engine
            .surface()
            .popups()
            .get(&handle.popup)
            .expect("popup is live");
        assert_eq!(popup.content.title, "buckeroo");
    }

    #[test]
    fn emphasis_moves_with_selection_in_one_pass() {
        let (mut engine, _) = mounted();
        let incidents = sample();
        let first = IncidentId::from("1");
        let second = IncidentId::from("3");

        engine
            .reconcile(&scene(&incidents, ToggleState::default(), Some(&first)))
            .expect("engine is ready");
        assert_eq!(ids(engine.emphasized()), vec!["1"]);

        let report = engine
            .reconcile(&scene(&incidents, ToggleState::default(), Some(&second)))
            .expect("engine is ready");
        assert_eq!(report.updated, 2);
        assert_eq!(ids(engine.emphasized()), vec!["3"]);

        engine
            .reconcile(&scene(&incidents, ToggleState::default(), None))
            .expect("engine is ready");
        assert!(engine.emphasized().is_empty());
    }

    #[test]
    fn critical_pulse_survives_selection_changes() {
        let (mut engine, _) = mounted();
        let incidents = sample();
        let selected = IncidentId::from("9");
        engine
            .reconcile(&scene(&incidents, ToggleState::default(), Some(&selected)))
            .expect("engine is ready");
        engine
            .reconcile(&scene(&incidents, ToggleState::default(), None))
            .expect("engine is ready");

        for (id, pulse) in [("1", true), ("2", false), ("3", false), ("9", true)] {
            let handle = engine.handle(&IncidentId::from(id)).expect("handle exists");
            assert_eq!(handle.style.pulse, pulse, "pulse for {id}");
        }
    }

    #[test]
    fn camera_moves_only_when_selection_changes() {
        let (mut engine, _) = mounted();
        let incidents = sample();
        let selected = IncidentId::from("2");

        let first = engine
            .reconcile(&scene(&incidents, ToggleState::default(), Some(&selected)))
            .expect("engine is ready");
        assert!(first.camera_moved);
        let camera = engine.surface().camera_history()[0];
        assert_eq!(camera.center, incidents[1].location.coordinates);
        assert_eq!(camera.zoom, 10.0);

        let no_predictions = ToggleState::default().with_predictions(false);
        let toggled = engine
            .reconcile(&scene(&incidents, no_predictions, Some(&selected)))
            .expect("engine is ready");
        assert!(!toggled.camera_moved);

        let cleared = engine
            .reconcile(&scene(&incidents, ToggleState::default(), None))
            .expect("engine is ready");
        assert!(!cleared.camera_moved);
        assert_eq!(engine.surface().camera_history().len(), 1);
    }

    #[test]
    fn predictions_toggle_flips_layers_without_touching_markers() {
        let (mut engine, _) = mounted();
        let incidents: Vec<Incident> = (1..=500)
            .map(|n| incident(&n.to_string(), Severity::Medium, n % 2 == 0))
            .collect();
        engine
            .reconcile(&scene(&incidents, ToggleState::default(), None))
            .expect("engine is ready");
        assert_eq!(engine.live_ids().len(), 500);
        let before = engine.surface().stats();

        let report = engine
            .reconcile(&scene(&incidents, ToggleState::default().with_predictions(false), None))
            .expect("engine is ready");

        let after = engine.surface().stats();
        assert_eq!(report.layer_flips, 1);
        assert_eq!(after.markers_created, before.markers_created);
        assert_eq!(after.markers_removed, before.markers_removed);
        assert_eq!(after.marker_restyles, before.marker_restyles);
        assert_eq!(after.layer_flips, before.layer_flips + 2);
        assert_eq!(engine.surface().layer_visible("wildfire-prediction-area"), Some(false));
        assert_eq!(engine.surface().layer_visible("wildfire-prediction-outline"), Some(false));
    }

    #[test]
    fn invalid_coordinates_skip_one_record_and_report_once() {
        let (mut engine, diagnostics) = mounted();
        let mut rx = diagnostics.subscribe();
        let mut incidents = sample();
        incidents[1].location = IncidentLocation {
            name: String::new(),
            coordinates: GeoPoint::new(0.0, 0.0),
        };
        incidents[2].location.coordinates = GeoPoint::new(95.0, 0.0);

        let report = engine
            .reconcile(&scene(&incidents, ToggleState::default(), None))
            .expect("engine is ready");
        assert_eq!(report.skipped, 2);
        assert_eq!(ids(engine.live_ids()), vec!["1", "9"]);

        engine
            .reconcile(&scene(&incidents, ToggleState::default(), None))
            .expect("engine is ready");

        let mut reasons = Vec::new();
        while let Ok(Diagnostic::InvalidCoordinate(err)) = rx.try_recv() {
            reasons.push((err.id.to_string(), err.reason));
        }
        assert_eq!(reasons.len(), 2);
        assert_eq!(reasons[0], ("2".to_string(), CoordinateError::Unset));
        assert!(matches!(reasons[1].1, CoordinateError::OutOfRange { .. }));
        assert_eq!(diagnostics.snapshot().invalid_coordinates_total, 2);
    }

    #[test]
    fn hidden_invalid_incident_is_not_reported() {
        let (mut engine, diagnostics) = mounted();
        let mut incidents = sample();
        incidents[0].location.coordinates = GeoPoint::new(0.0, 200.0);

        engine
            .reconcile(&scene(&incidents, ToggleState::default().with_resolved(false), None))
            .expect("engine is ready");
        assert_eq!(diagnostics.snapshot().invalid_coordinates_total, 0);
    }

    #[test]
    fn toggling_resolved_does_not_repeat_placement_reports() {
        let (mut engine, diagnostics) = mounted();
        let mut incidents = sample();
        incidents[0].location.coordinates = GeoPoint::new(95.0, -121.6);

        for show_resolved in [true, false, true, false, true] {
            let toggles = ToggleState::default().with_resolved(show_resolved);
            engine
                .reconcile(&scene(&incidents, toggles, None))
                .expect("engine is ready");
        }
        assert_eq!(diagnostics.snapshot().invalid_coordinates_total, 1);
        assert!(!engine.live_ids().contains(&IncidentId::from("1")));
    }

    #[test]
    fn placement_report_resets_on_correction_or_change() {
        let (mut engine, diagnostics) = mounted();
        let mut incidents = sample();
        incidents[0].location.coordinates = GeoPoint::new(95.0, -121.6);
        let pass = |engine: &mut MapSyncEngine<MemorySurface>, incidents: &[Incident]| {
            engine
                .reconcile(&scene(incidents, ToggleState::default(), None))
                .expect("engine is ready");
        };

        pass(&mut engine, &incidents);
        incidents[0].location.coordinates = GeoPoint::new(96.0, -121.6);
        pass(&mut engine, &incidents);
        assert_eq!(diagnostics.snapshot().invalid_coordinates_total, 2);

        incidents[0].location.coordinates = GeoPoint::new(39.7, -121.6);
        pass(&mut engine, &incidents);
        incidents[0].location.coordinates = GeoPoint::new(96.0, -121.6);
        pass(&mut engine, &incidents);
        assert_eq!(diagnostics.snapshot().invalid_coordinates_total, 3);

        pass(&mut engine, &incidents[1..]);
        pass(&mut engine, &incidents);
        assert_eq!(diagnostics.snapshot().invalid_coordinates_total, 4);
    }

    #[test]
    fn duplicate_ids_are_excluded_and_reported_again_after_regression() {
        let (mut engine, diagnostics) = mounted();
        let mut incidents = sample();
        let mut copy = incident("2", Severity::Low, false);
        copy.title = "Conflicting record".to_string();
        incidents.push(copy);

        engine
            .reconcile(&scene(&incidents, ToggleState::default(), None))
            .expect("engine is ready");
        assert_eq!(ids(engine.live_ids()), vec!["1", "3", "9"]);
        engine
            .reconcile(&scene(&incidents, ToggleState::default(), None))
            .expect("engine is ready");
        assert_eq!(diagnostics.snapshot().consistency_errors_total, 1);

        let fixed = sample();
        engine
            .reconcile(&scene(&fixed, ToggleState::default(), None))
            .expect("engine is ready");
        assert_eq!(ids(engine.live_ids()), vec!["1", "2", "3", "9"]);

        engine
            .reconcile(&scene(&incidents, ToggleState::default(), None))
            .expect("engine is ready");
        assert_eq!(diagnostics.snapshot().consistency_errors_total, 2);
        assert_eq!(ids(engine.live_ids()), vec!["1", "3", "9"]);
    }

    #[test]
    fn duplicate_selection_does_not_move_camera() {
        let (mut engine, _) = mounted();
        let mut incidents = sample();
        incidents.push(incident("9", Severity::Low, true));
        let selected = IncidentId::from("9");

        let plan = engine.plan(&scene(&incidents, ToggleState::default(), Some(&selected)));
        assert_eq!(plan.count(|op| matches!(op, SurfaceOp::FlyTo(_))), 0);
        assert!(matches!(
            plan.issues.first(),
            Some(Diagnostic::Consistency(
                ConsistencyError::DuplicateIncident { occurrences: 2, .. }
            ))
        ));
    }

    #[test]
    fn user_location_handle_is_single_and_toggle_gated() {
        let (mut engine, _) = mounted();
        let incidents = sample();
        let on = ToggleState::default().with_user_location(true);
        let mut input = scene(&incidents, on, None);
        input.user_location = Some(GeoPoint::new(39.73, -121.84));

        engine.reconcile(&input).expect("engine is ready");
        engine.reconcile(&input).expect("engine is ready");
        assert!(engine.has_user_location());
        let markers = engine.surface().markers();
        assert_eq!(
            markers
                .values()
                .filter(|marker| marker.kind == MarkerKind::UserLocation)
                .count(),
            1
        );

        input.user_location = Some(GeoPoint::new(39.74, -121.85));
        let plan = engine.plan(&input);
        assert_eq!(plan.ops, vec![SurfaceOp::MoveUserLocation(GeoPoint::new(39.74, -121.85))]);
        engine.reconcile(&input).expect("engine is ready");

        input.toggles = ToggleState::default();
        let report = engine.reconcile(&input).expect("engine is ready");
        assert!(!report.user_location_shown);
        assert!(engine.surface().user_location_marker().is_none());
        assert_eq!(engine.live_ids().len(), 4);
    }

    #[test]
    fn marker_lookup_and_hover_follow_handles() {
        let (mut engine, _) = mounted();
        let incidents = sample();
        engine
            .reconcile(&scene(&incidents, ToggleState::default(), None))
            .expect("engine is ready");
        let handle = engine.handle(&IncidentId::from("9")).cloned().expect("handle exists");

        assert_eq!(
            engine.incident_for_marker(handle.marker),
            Some(&IncidentId::from("9"))
        );
        assert!(engine.set_hover(handle.marker, true));
        assert_eq!(
            engine.surface().popups().get(&handle.popup).map(|p| p.open),
            Some(true)
        );

        engine
            .reconcile(&scene(&incidents[..2], ToggleState::default(), None))
            .expect("engine is ready");
        assert!(engine.incident_for_marker(handle.marker).is_none());
        assert!(!engine.set_hover(handle.marker, false));
    }

    #[test]
    fn dispose_releases_everything_once() {
        let (mut engine, _) = mounted();
        let incidents = sample();
        let mut input = scene(&incidents, ToggleState::default().with_user_location(true), None);
        input.user_location = Some(GeoPoint::new(39.73, -121.84));
        engine.reconcile(&input).expect("engine is ready");

        engine.dispose();
        engine.dispose();

        let surface = engine.surface();
        assert!(surface.markers().is_empty());
        assert!(surface.popups().is_empty());
        assert_eq!(surface.listener_count(), 0);
        assert!(surface.is_torn_down());
        assert_eq!(engine.state(), EngineState::Disposed);
        assert_eq!(
            engine.reconcile(&input),
            Err(EngineError::NotReady(EngineState::Disposed))
        );
        assert_eq!(engine.mount(), Err(EngineError::NotReady(EngineState::Disposed)));
    }

    #[test]
    fn fly_home_is_explicit() {
        let (mut engine, _) = mounted();
        engine.fly_home().expect("engine is ready");
        let camera = engine.surface().camera_history()[0];
        assert_eq!(camera.zoom, 8.0);
        assert_eq!(camera.center, crate::config::HOME_CENTER);
    }

    #[test]
    fn memory_surface_is_a_render_surface() {
        fn assert_surface<S: RenderSurface>(_: &S) {}
        let (engine, _) = mounted();
        assert_surface(engine.surface());
    }
}
