use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::incident::Incident;

/// Pushes from the incident data source.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum FeedEvent {
    /// Full replacement of the incident list.
    Snapshot {
        incidents: Vec<Incident>,
        timestamp: DateTime<Utc>,
    },
    /// A newly accepted report. Prepended to the list and selected.
    Submitted { incident: Incident },
}

/// Parse a snapshot payload. Accepts either a tagged [`FeedEvent::Snapshot`]
/// or a bare JSON array of incidents.
pub fn parse_snapshot(payload: &[u8]) -> Result<Vec<Incident>, serde_json::Error> {
    if let Ok(incidents) = serde_json::from_slice::<Vec<Incident>>(payload) {
        return Ok(incidents);
    }
    match serde_json::from_slice::<FeedEvent>(payload)? {
        FeedEvent::Snapshot { incidents, .. } => Ok(incidents),
        FeedEvent::Submitted { incident } => Ok(vec![incident]),
    }
}
