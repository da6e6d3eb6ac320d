use std::collections::{BTreeMap, BTreeSet};

use crisis_shared::colors::{Rgb, crisis_type_color, hex_css};
use crisis_shared::{GeoPoint, Incident, PopupContent};
use serde::Serialize;
use tracing::debug;

use crate::camera::CameraTransition;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct MarkerId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct PopupId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ListenerId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MarkerKind {
    Incident,
    UserLocation,
}

const MARKER_DIAMETER_PX: u32 = 20;
const MARKER_BORDER_PX: u32 = 2;
const EMPHASIS_DIAMETER_PX: u32 = 30;
const EMPHASIS_BORDER_PX: u32 = 3;
const EMPHASIS_Z_INDEX: i32 = 10;
const USER_LOCATION_COLOR: Rgb = (0x3b, 0x82, 0xf6);

/// Visual state of one marker. Derived, never stored upstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MarkerStyle {
    pub color: Rgb,
    pub diameter_px: u32,
    pub border_px: u32,
    pub z_index: i32,
    /// Persistent pulse; set for critical incidents regardless of selection.
    pub pulse: bool,
}

impl MarkerStyle {
    pub fn for_incident(incident: &Incident, emphasized: bool) -> Self {
        let (diameter_px, border_px, z_index) = if emphasized {
            (EMPHASIS_DIAMETER_PX, EMPHASIS_BORDER_PX, EMPHASIS_Z_INDEX)
        } else {
            (MARKER_DIAMETER_PX, MARKER_BORDER_PX, 0)
        };
        Self {
            color: crisis_type_color(incident.category),
            diameter_px,
            border_px,
            z_index,
            pulse: incident.is_critical(),
        }
    }

    pub fn user_location() -> Self {
        Self {
            color: USER_LOCATION_COLOR,
            diameter_px: MARKER_DIAMETER_PX,
            border_px: MARKER_BORDER_PX,
            z_index: EMPHASIS_Z_INDEX + 1,
            pulse: false,
        }
    }

    pub fn is_emphasized(&self) -> bool {
        self.diameter_px == EMPHASIS_DIAMETER_PX
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LayerKind {
    Fill,
    DashedLine,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OverlayLayer {
    pub id: &'static str,
    pub kind: LayerKind,
    pub color: Rgb,
}

/// Static polygon overlay installed once at mount.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PredictionOverlay {
    pub source_id: &'static str,
    pub ring: Vec<GeoPoint>,
    pub layers: Vec<OverlayLayer>,
}

impl PredictionOverlay {
    /// Projected wildfire spread area north of Paradise, CA.
    pub fn wildfire() -> Self {
        let color = crisis_type_color(crisis_shared::CrisisType::Wildfire);
        Self {
            source_id: "wildfire-prediction",
            ring: vec![
                GeoPoint::new(39.7696, -121.6319),
                GeoPoint::new(39.7696, -121.5919),
                GeoPoint::new(39.7396, -121.5919),
                GeoPoint::new(39.7396, -121.6319),
                GeoPoint::new(39.7696, -121.6319),
            ],
            layers: vec![
                OverlayLayer {
                    id: "wildfire-prediction-area",
                    kind: LayerKind::Fill,
                    color,
                },
                OverlayLayer {
                    id: "wildfire-prediction-outline",
                    kind: LayerKind::DashedLine,
                    color,
                },
            ],
        }
    }

    pub fn layer_ids(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.layers.iter().map(|layer| layer.id)
    }
}

/// The imperative map widget. Owns markers, popups, listener registrations
/// and layers; the engine only ever holds the ids it hands back.
pub trait RenderSurface {
    fn install_overlay(&mut self, overlay: &PredictionOverlay);
    fn set_layer_visibility(&mut self, layer_id: &str, visible: bool);

    fn create_marker(
        &mut self,
        kind: MarkerKind,
        position: GeoPoint,
        style: &MarkerStyle,
    ) -> MarkerId;
    fn move_marker(&mut self, marker: MarkerId, position: GeoPoint);
    fn restyle_marker(&mut self, marker: MarkerId, style: &MarkerStyle);
    fn remove_marker(&mut self, marker: MarkerId);

    fn create_popup(&mut self, marker: MarkerId, content: &PopupContent) -> PopupId;
    fn set_popup_content(&mut self, popup: PopupId, content: &PopupContent);
    fn set_popup_open(&mut self, popup: PopupId, open: bool);
    fn remove_popup(&mut self, popup: PopupId);

    /// Register click and hover listeners for a marker.
    fn attach_listeners(&mut self, marker: MarkerId) -> ListenerId;
    fn detach_listeners(&mut self, listener: ListenerId);

    fn fly_to(&mut self, camera: &CameraTransition);

    /// Release the widget itself. Called once on dispose, after every handle
    /// has been released.
    fn teardown(&mut self);
}

/// Operation totals for a surface. Compare two snapshots to see what a pass did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SurfaceStats {
    pub markers_created: u64,
    pub markers_removed: u64,
    pub marker_moves: u64,
    pub marker_restyles: u64,
    pub popups_created: u64,
    pub popups_removed: u64,
    pub popup_updates: u64,
    pub listeners_attached: u64,
    pub listeners_detached: u64,
    pub layer_flips: u64,
    pub fly_tos: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MemoryMarker {
    pub kind: MarkerKind,
    pub position: GeoPoint,
    pub style: MarkerStyle,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MemoryPopup {
    pub marker: MarkerId,
    pub content: PopupContent,
    pub open: bool,
}

/// Headless surface that keeps its object graph in memory and traces every
/// call. Used by the driver binary and by tests.
#[derive(Debug, Default)]
pub struct MemorySurface {
    next_id: u64,
    markers: BTreeMap<MarkerId, MemoryMarker>,
    popups: BTreeMap<PopupId, MemoryPopup>,
    listeners: BTreeMap<ListenerId, MarkerId>,
    layers: BTreeMap<String, bool>,
    overlays: BTreeSet<&'static str>,
    camera_history: Vec<CameraTransition>,
    stats: SurfaceStats,
    torn_down: bool,
}

impl MemorySurface {
    pub fn new() -> Self {
        Self::default()
    }

    fn allocate(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    pub fn stats(&self) -> SurfaceStats {
        self.stats
    }

    pub fn markers(&self) -> &BTreeMap<MarkerId, MemoryMarker> {
        &self.markers
    }

    pub fn marker(&self, marker: MarkerId) -> Option<&MemoryMarker> {
        self.markers.get(&marker)
    }

    pub fn incident_marker_count(&self) -> usize {
        self.markers
            .values()
            .filter(|marker| marker.kind == MarkerKind::Incident)
            .count()
    }

    pub fn user_location_marker(&self) -> Option<&MemoryMarker> {
        self.markers
            .values()
            .find(|marker| marker.kind == MarkerKind::UserLocation)
    }

    pub fn popups(&self) -> &BTreeMap<PopupId, MemoryPopup> {
        &self.popups
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    pub fn layer_visible(&self, layer_id: &str) -> Option<bool> {
        self.layers.get(layer_id).copied()
    }

    pub fn overlay_installed(&self, source_id: &str) -> bool {
        self.overlays.contains(source_id)
    }

    pub fn camera_history(&self) -> &[CameraTransition] {
        &self.camera_history
    }

    pub fn is_torn_down(&self) -> bool {
        self.torn_down
    }
}

impl RenderSurface for MemorySurface {
    fn install_overlay(&mut self, overlay: &PredictionOverlay) {
        debug!(source = overlay.source_id, layers = overlay.layers.len(), "install overlay");
        self.overlays.insert(overlay.source_id);
        for layer in overlay.layer_ids() {
            self.layers.insert(layer.to_string(), true);
        }
    }

    fn set_layer_visibility(&mut self, layer_id: &str, visible: bool) {
        debug!(layer = layer_id, visible, "layer visibility");
        self.stats.layer_flips += 1;
        self.layers.insert(layer_id.to_string(), visible);
    }

    fn create_marker(
        &mut self,
        kind: MarkerKind,
        position: GeoPoint,
        style: &MarkerStyle,
    ) -> MarkerId {
        let marker = MarkerId(self.allocate());
        debug!(
            ?marker,
            ?kind,
            lat = position.lat,
            lng = position.lng,
            color = %hex_css(style.color),
            "create marker"
        );
        self.stats.markers_created += 1;
        self.markers.insert(
            marker,
            MemoryMarker {
                kind,
                position,
                style: *style,
            },
        );
        marker
    }

    fn move_marker(&mut self, marker: MarkerId, position: GeoPoint) {
        debug!(?marker, lat = position.lat, lng = position.lng, "move marker");
        self.stats.marker_moves += 1;
        if let Some(entry) = self.markers.get_mut(&marker) {
            entry.position = position;
        }
    }

    fn restyle_marker(&mut self, marker: MarkerId, style: &MarkerStyle) {
        debug!(?marker, emphasized = style.is_emphasized(), "restyle marker");
        self.stats.marker_restyles += 1;
        if let Some(entry) = self.markers.get_mut(&marker) {
            entry.style = *style;
        }
    }

    fn remove_marker(&mut self, marker: MarkerId) {
        debug!(?marker, "remove marker");
        self.stats.markers_removed += 1;
        self.markers.remove(&marker);
    }

    fn create_popup(&mut self, marker: MarkerId, content: &PopupContent) -> PopupId {
        let popup = PopupId(self.allocate());
        self.stats.popups_created += 1;
        self.popups.insert(
            popup,
            MemoryPopup {
                marker,
                content: content.clone(),
                open: false,
            },
        );
        popup
    }

    fn set_popup_content(&mut self, popup: PopupId, content: &PopupContent) {
        self.stats.popup_updates += 1;
        if let Some(entry) = self.popups.get_mut(&popup) {
            entry.content = content.clone();
        }
    }

    fn set_popup_open(&mut self, popup: PopupId, open: bool) {
        if let Some(entry) = self.popups.get_mut(&popup) {
            entry.open = open;
        }
    }

    fn remove_popup(&mut self, popup: PopupId) {
        self.stats.popups_removed += 1;
        self.popups.remove(&popup);
    }

    fn attach_listeners(&mut self, marker: MarkerId) -> ListenerId {
        let listener = ListenerId(self.allocate());
        self.stats.listeners_attached += 1;
        self.listeners.insert(listener, marker);
        listener
    }

    fn detach_listeners(&mut self, listener: ListenerId) {
        self.stats.listeners_detached += 1;
        self.listeners.remove(&listener);
    }

    fn fly_to(&mut self, camera: &CameraTransition) {
        debug!(
            lat = camera.center.lat,
            lng = camera.center.lng,
            zoom = camera.zoom,
            "fly to"
        );
        self.stats.fly_tos += 1;
        self.camera_history.push(*camera);
    }

    fn teardown(&mut self) {
        debug!("teardown surface");
        self.layers.clear();
        self.overlays.clear();
        self.torn_down = true;
    }
}
