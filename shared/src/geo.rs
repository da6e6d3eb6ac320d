use thiserror::Error;

use crate::incident::{GeoPoint, IncidentLocation};

pub const MIN_LAT: f64 = -90.0;
pub const MAX_LAT: f64 = 90.0;
pub const MIN_LNG: f64 = -180.0;
pub const MAX_LNG: f64 = 180.0;

#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum CoordinateError {
    #[error("coordinate ({lat}, {lng}) is outside [-90, 90] x [-180, 180]")]
    OutOfRange { lat: f64, lng: f64 },
    #[error("coordinate is not a finite number")]
    NonFinite,
    #[error("coordinate is unset: (0, 0) with no location name")]
    Unset,
}

/// Outcome of checking a persisted location.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordinateStatus {
    Valid,
    /// `(0, 0)` paired with an empty name: a form default, not an equatorial point.
    Unset,
}

/// Range check on a raw latitude/longitude pair. Bounds are inclusive.
pub fn validate(lat: f64, lng: f64) -> Result<(), CoordinateError> {
    if !lat.is_finite() || !lng.is_finite() {
        return Err(CoordinateError::NonFinite);
    }
    if !(MIN_LAT..=MAX_LAT).contains(&lat) || !(MIN_LNG..=MAX_LNG).contains(&lng) {
        return Err(CoordinateError::OutOfRange { lat, lng });
    }
    Ok(())
}

pub fn validate_point(point: GeoPoint) -> Result<(), CoordinateError> {
    validate(point.lat, point.lng)
}

/// Classify a location. `Unset` is not an error here; callers decide.
pub fn classify(location: &IncidentLocation) -> Result<CoordinateStatus, CoordinateError> {
    validate_point(location.coordinates)?;
    if location.coordinates.is_origin() && location.name.trim().is_empty() {
        Ok(CoordinateStatus::Unset)
    } else {
        Ok(CoordinateStatus::Valid)
    }
}

/// Stricter check for anything that is about to be placed or submitted.
pub fn require_placeable(location: &IncidentLocation) -> Result<GeoPoint, CoordinateError> {
    match classify(location)? {
        CoordinateStatus::Valid => Ok(location.coordinates),
        CoordinateStatus::Unset => Err(CoordinateError::Unset),
    }
}
