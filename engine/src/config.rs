use std::path::PathBuf;
use std::time::Duration;

use crisis_shared::GeoPoint;

use crate::toggles::ToggleState;

// Paradise, CA
pub const HOME_CENTER: GeoPoint = GeoPoint::new(39.7596, -121.6219);
pub const HOME_ZOOM: f64 = 8.0;
pub const FOCUS_ZOOM: f64 = 10.0;
pub const FLY_TO_DURATION_MS: f64 = 1500.0;

pub const DEFAULT_LOCATION_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_DIAGNOSTICS_BUFFER: usize = 64;
pub const DEFAULT_FEED_DELAY_MS: u64 = 500;
pub const DEFAULT_INCIDENTS_PATH: &str = "data/incidents.json";

fn env_flag(name: &str, default: bool) -> bool {
    std::env::var(name)
        .map(|value| {
            let normalized = value.trim().to_ascii_lowercase();
            match normalized.as_str() {
                "1" | "true" | "yes" | "on" => true,
                "0" | "false" | "no" | "off" => false,
                _ => default,
            }
        })
        .unwrap_or(default)
}

pub fn location_timeout() -> Duration {
    std::env::var("LOCATION_TIMEOUT_SECS")
        .ok()
        .and_then(|value| value.parse::<u64>().ok())
        .filter(|value| *value > 0)
        .map(Duration::from_secs)
        .unwrap_or_else(|| Duration::from_secs(DEFAULT_LOCATION_TIMEOUT_SECS))
}

pub fn diagnostics_buffer() -> usize {
    std::env::var("DIAGNOSTICS_BUFFER")
        .ok()
        .and_then(|value| value.parse::<usize>().ok())
        .filter(|value| *value > 0)
        .unwrap_or(DEFAULT_DIAGNOSTICS_BUFFER)
}

pub fn feed_delay() -> Duration {
    std::env::var("FEED_DELAY_MS")
        .ok()
        .and_then(|value| value.parse::<u64>().ok())
        .map(Duration::from_millis)
        .unwrap_or_else(|| Duration::from_millis(DEFAULT_FEED_DELAY_MS))
}

pub fn incidents_path() -> PathBuf {
    std::env::var("INCIDENTS_PATH")
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_INCIDENTS_PATH))
}

/// Fixed position reported by the host location provider, as `lat,lng`.
/// Unset or malformed means the host has no location capability.
pub fn user_location() -> Option<GeoPoint> {
    let raw = std::env::var("USER_LOCATION").ok()?;
    let (lat, lng) = raw.split_once(',')?;
    let lat = lat.trim().parse::<f64>().ok()?;
    let lng = lng.trim().parse::<f64>().ok()?;
    crisis_shared::geo::validate(lat, lng).ok()?;
    Some(GeoPoint::new(lat, lng))
}

pub fn initial_toggles() -> ToggleState {
    let defaults = ToggleState::default();
    ToggleState {
        show_predictions: env_flag("SHOW_PREDICTIONS", defaults.show_predictions),
        show_resolved: env_flag("SHOW_RESOLVED", defaults.show_resolved),
        show_user_location: env_flag("SHOW_USER_LOCATION", defaults.show_user_location),
    }
}
