use crisis_shared::GeoPoint;
use serde::Serialize;

use crate::config::{FLY_TO_DURATION_MS, FOCUS_ZOOM, HOME_CENTER, HOME_ZOOM};

/// A fly-to command for the map camera.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CameraTransition {
    pub center: GeoPoint,
    pub zoom: f64,
    pub duration_ms: f64,
}

impl CameraTransition {
    /// Focus on a selected incident.
    pub fn focus(center: GeoPoint) -> Self {
        Self {
            center,
            zoom: FOCUS_ZOOM,
            duration_ms: FLY_TO_DURATION_MS,
        }
    }

    /// Back to the configured home view.
    pub fn home() -> Self {
        Self {
            center: HOME_CENTER,
            zoom: HOME_ZOOM,
            duration_ms: FLY_TO_DURATION_MS,
        }
    }

    /// Eased progress in `0.0..=1.0`, or `None` once the transition is done.
    pub fn progress(&self, elapsed_ms: f64) -> Option<f64> {
        if self.duration_ms <= 0.0 || elapsed_ms >= self.duration_ms {
            return None;
        }
        Some(cubic_ease_out((elapsed_ms / self.duration_ms).max(0.0)))
    }

    /// Camera position and zoom at `elapsed_ms`, starting from `from`.
    /// Surfaces without native animation step this per frame.
    pub fn sample(&self, from: GeoPoint, from_zoom: f64, elapsed_ms: f64) -> (GeoPoint, f64) {
        let Some(t) = self.progress(elapsed_ms) else {
            return (self.center, self.zoom);
        };
        let center = GeoPoint::new(
            from.lat + (self.center.lat - from.lat) * t,
            from.lng + (self.center.lng - from.lng) * t,
        );
        (center, from_zoom + (self.zoom - from_zoom) * t)
    }
}

/// Cubic ease-out: decelerating to zero velocity.
fn cubic_ease_out(t: f64) -> f64 {
    let t = t - 1.0;
    t * t * t + 1.0
}
