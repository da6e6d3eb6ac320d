use crisis_shared::{CoordinateError, IncidentId};
use serde::Serialize;
use thiserror::Error;

use crate::engine::EngineState;

/// Host location capability failures. Expected; the toggle that asked for
/// the location reverts.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum CapabilityError {
    #[error("location is not supported on this host")]
    Unsupported,
    #[error("location permission denied")]
    Denied,
    #[error("location unavailable: {0}")]
    Unavailable(String),
}

/// Internal invariant violations. Never fatal: the offending record is
/// excluded from rendering and reported once.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ConsistencyError {
    #[error("incident id {id} appears {occurrences} times in the snapshot")]
    DuplicateIncident { id: IncidentId, occurrences: usize },
    #[error("render handle table diverged from visible set for {id}")]
    HandleDivergence { id: IncidentId },
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    #[error("map engine is {0:?}, expected Ready")]
    NotReady(EngineState),
    #[error("map engine already mounted")]
    AlreadyMounted,
    #[error("unknown incident {0}")]
    UnknownIncident(IncidentId),
    #[error(transparent)]
    Validation(#[from] crisis_shared::ValidationError),
}

/// Why a visible incident could not be placed.
#[derive(Debug, Clone, PartialEq, Error, Serialize)]
#[error("incident {id} has an unplaceable coordinate: {reason}")]
pub struct PlacementError {
    pub id: IncidentId,
    #[serde(serialize_with = "serialize_display")]
    pub reason: CoordinateError,
}

fn serialize_display<S: serde::Serializer, T: std::fmt::Display>(
    value: &T,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.collect_str(value)
}
