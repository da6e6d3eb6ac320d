use chrono::Utc;
use crisis_shared::feed::FeedEvent;
use crisis_shared::{
    EventIndex, EventView, GeoPoint, Incident, IncidentId, RankedNeed, ReportDraft, ViewCounts,
    ranked_needs,
};
use futures::FutureExt;
use tokio::sync::watch;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::diagnostics::{Diagnostic, Diagnostics};
use crate::engine::{EngineState, MapSyncEngine, ReconcileReport, Scene};
use crate::error::{CapabilityError, EngineError};
use crate::location::{LocationFuture, LocationResult, LocationService};
use crate::selection::SelectionController;
use crate::surface::{MarkerId, RenderSurface};
use crate::toggles::ToggleState;

/// A location request started by turning the user location toggle on.
/// Its generation is checked when the result comes back.
pub struct PendingLocation {
    generation: u64,
    future: LocationFuture,
}

impl PendingLocation {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub async fn resolve(self) -> LocationOutcome {
        LocationOutcome {
            generation: self.generation,
            result: self.future.await,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LocationOutcome {
    pub generation: u64,
    pub result: LocationResult,
}

/// One operator session: the incident snapshot plus everything that is
/// derived from it or drawn for it.
pub struct Session<S> {
    incidents: Vec<Incident>,
    index: EventIndex,
    toggles: ToggleState,
    selection: SelectionController,
    engine: MapSyncEngine<S>,
    location: LocationService,
    user_location: Option<GeoPoint>,
    location_generation: u64,
    diagnostics: Diagnostics,
    last_report: ReconcileReport,
}

impl<S: RenderSurface> Session<S> {
    pub fn new(
        surface: S,
        location: LocationService,
        diagnostics: Diagnostics,
        toggles: ToggleState,
    ) -> Self {
        Self {
            incidents: Vec::new(),
            index: EventIndex::default(),
            toggles,
            selection: SelectionController::new(),
            engine: MapSyncEngine::new(surface, diagnostics.clone()),
            location,
            user_location: None,
            location_generation: 0,
            diagnostics,
            last_report: ReconcileReport::default(),
        }
    }

    pub fn engine(&self) -> &MapSyncEngine<S> {
        &self.engine
    }

    pub fn incidents(&self) -> &[Incident] {
        &self.incidents
    }

    pub fn toggles(&self) -> ToggleState {
        self.toggles
    }

    pub fn user_location(&self) -> Option<GeoPoint> {
        self.user_location
    }

    pub fn selected_id(&self) -> Option<IncidentId> {
        self.selection.current()
    }

    pub fn last_report(&self) -> ReconcileReport {
        self.last_report
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    /// Install static overlays and draw whatever is already loaded. When the
    /// session starts with the user location toggle on, the location request
    /// is started here like any other enable; the pass itself is available
    /// from [`Session::last_report`].
    pub fn mount(&mut self) -> Result<Option<PendingLocation>, EngineError> {
        self.engine.mount()?;
        if self.toggles.show_user_location {
            self.location_generation += 1;
            return self.show_user_location();
        }
        self.sync(self.selection.current())?;
        Ok(None)
    }

    /// Mutations after dispose fail before touching any state.
    fn ensure_live(&self) -> Result<(), EngineError> {
        match self.engine.state() {
            EngineState::Disposed => Err(EngineError::NotReady(EngineState::Disposed)),
            _ => Ok(()),
        }
    }

    /// One reconciliation pass for `next`, then publish `next` to selection
    /// observers. Before mount there is nothing to draw yet.
    fn sync(&mut self, next: Option<IncidentId>) -> Result<ReconcileReport, EngineError> {
        let report = match self.engine.state() {
            EngineState::Uninitialized => ReconcileReport::default(),
            _ => {
                let scene = Scene {
                    incidents: &self.incidents,
                    toggles: self.toggles,
                    selected: next.as_ref(),
                    user_location: self.user_location,
                };
                self.engine.reconcile(&scene)?
            }
        };
        self.last_report = report;
        self.selection.commit(next);
        Ok(report)
    }

    fn contains(&self, id: &IncidentId) -> bool {
        self.incidents.iter().any(|incident| &incident.id == id)
    }

    /// Replace the snapshot wholesale. A selection whose incident is gone is
    /// cleared in the same pass.
    pub fn replace_incidents(
        &mut self,
        incidents: Vec<Incident>,
    ) -> Result<ReconcileReport, EngineError> {
        self.ensure_live()?;
        self.incidents = incidents;
        self.index = EventIndex::build(&self.incidents);
        let next = self.selection.current().filter(|id| self.contains(id));
        if next.is_none()
            && let Some(gone) = self.selection.current()
        {
            info!(incident = %gone, "selected incident left the snapshot, clearing selection");
        }
        info!(count = self.incidents.len(), "incident snapshot replaced");
        self.sync(next)
    }

    pub fn apply_feed(&mut self, event: FeedEvent) -> Result<ReconcileReport, EngineError> {
        match event {
            FeedEvent::Snapshot { incidents, .. } => self.replace_incidents(incidents),
            FeedEvent::Submitted { incident } => self.prepend_and_select(incident),
        }
    }

    fn prepend_and_select(&mut self, incident: Incident) -> Result<ReconcileReport, EngineError> {
        self.ensure_live()?;
        let id = incident.id.clone();
        self.incidents.insert(0, incident);
        self.index = EventIndex::build(&self.incidents);
        self.sync(Some(id))
    }

    /// Validate a report, prepend the resulting incident and select it.
    pub fn submit_report(&mut self, draft: ReportDraft) -> Result<IncidentId, EngineError> {
        self.ensure_live()?;
        let id = IncidentId::new(format!("temp-{}", Uuid::new_v4()));
        let incident = draft.into_incident(id.clone(), Utc::now())?;
        info!(incident = %id, category = %incident.category, "report submitted");
        self.prepend_and_select(incident)?;
        Ok(id)
    }

    /// Returns whether the selection changed.
    pub fn select(&mut self, id: Option<IncidentId>) -> Result<bool, EngineError> {
        self.ensure_live()?;
        if let Some(id) = &id
            && !self.contains(id)
        {
            warn!(incident = %id, "ignoring selection of unknown incident");
            return Err(EngineError::UnknownIncident(id.clone()));
        }
        let changed = self.selection.current() != id;
        self.sync(id)?;
        Ok(changed)
    }

    pub fn marker_clicked(&mut self, marker: MarkerId) -> Result<bool, EngineError> {
        let Some(id) = self.engine.incident_for_marker(marker).cloned() else {
            debug!(?marker, "click on marker without an incident");
            return Ok(false);
        };
        self.select(Some(id))
    }

    pub fn marker_hovered(&mut self, marker: MarkerId, hovered: bool) -> bool {
        self.engine.set_hover(marker, hovered)
    }

    pub fn set_show_predictions(&mut self, on: bool) -> Result<ReconcileReport, EngineError> {
        self.ensure_live()?;
        self.toggles = self.toggles.with_predictions(on);
        self.sync(self.selection.current())
    }

    pub fn set_show_resolved(&mut self, on: bool) -> Result<ReconcileReport, EngineError> {
        self.ensure_live()?;
        self.toggles = self.toggles.with_resolved(on);
        self.sync(self.selection.current())
    }

    /// Turning the toggle on draws the session location right away when one
    /// is known, otherwise hands back a request to await and feed into
    /// [`Session::apply_location`]. Turning it off invalidates any such request.
    pub fn set_show_user_location(
        &mut self,
        on: bool,
    ) -> Result<Option<PendingLocation>, EngineError> {
        self.ensure_live()?;
        self.toggles = self.toggles.with_user_location(on);
        self.location_generation += 1;

        if !on {
            self.sync(self.selection.current())?;
            return Ok(None);
        }
        self.show_user_location()
    }

    fn show_user_location(&mut self) -> Result<Option<PendingLocation>, EngineError> {
        if self.user_location.is_none() {
            self.user_location = self.location.cached();
        }
        self.sync(self.selection.current())?;
        if self.user_location.is_some() {
            return Ok(None);
        }
        Ok(Some(PendingLocation {
            generation: self.location_generation,
            future: self.location.acquire(),
        }))
    }

    /// Apply a resolved request. Returns whether the location was drawn.
    /// Results from a superseded request, or arriving after the toggle went
    /// off, are dropped.
    pub fn apply_location(&mut self, outcome: LocationOutcome) -> Result<bool, EngineError> {
        self.ensure_live()?;
        if outcome.generation != self.location_generation || !self.toggles.show_user_location {
            debug!(
                generation = outcome.generation,
                current = self.location_generation,
                "discarding late location result"
            );
            return Ok(false);
        }
        match outcome.result {
            Ok(point) => {
                self.user_location = Some(point);
                self.sync(self.selection.current())?;
                Ok(true)
            }
            Err(err) => {
                self.diagnostics.emit(Diagnostic::LocationFailed(err));
                self.toggles = self.toggles.with_user_location(false);
                self.location_generation += 1;
                self.sync(self.selection.current())?;
                Ok(false)
            }
        }
    }

    /// Forced refresh for the report form. Never reuses the session fix and
    /// does not touch the drawn user location.
    pub fn detect_report_location(&self) -> LocationFuture {
        let diagnostics = self.diagnostics.clone();
        self.location
            .acquire_fresh()
            .inspect(move |result: &Result<GeoPoint, CapabilityError>| {
                if let Err(err) = result {
                    diagnostics.emit(Diagnostic::LocationFailed(err.clone()));
                }
            })
            .boxed()
    }

    pub fn recenter(&mut self) -> Result<(), EngineError> {
        self.engine.fly_home()
    }

    /// Incident list panel contents for `query` under `view`.
    pub fn list(&self, query: &str, view: EventView) -> Vec<&Incident> {
        self.index.filter(&self.incidents, query, view)
    }

    pub fn view_counts(&self) -> ViewCounts {
        crisis_shared::view_counts(&self.incidents)
    }

    /// Detail panel lookup. Always read from the current snapshot.
    pub fn selected_incident(&self) -> Option<&Incident> {
        let id = self.selection.current()?;
        self.incidents.iter().find(|incident| incident.id == id)
    }

    pub fn resource_needs(&self) -> Vec<RankedNeed<'_>> {
        ranked_needs(&self.incidents)
    }

    pub fn subscribe_selection(&self) -> watch::Receiver<Option<IncidentId>> {
        self.selection.subscribe()
    }

    pub fn dispose(&mut self) {
        self.location_generation += 1;
        self.engine.dispose();
        self.selection.commit(None);
    }
}
