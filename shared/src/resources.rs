use serde::Serialize;

use crate::incident::{Incident, IncidentId, ResourceNeed};

/// A resource need flattened out of its incident for the needs panel.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RankedNeed<'a> {
    pub need: &'a ResourceNeed,
    pub incident_id: &'a IncidentId,
    pub incident_title: &'a str,
    pub location: &'a str,
}

/// All resource needs across `incidents`, most urgent first. Ties keep
/// incident order, then need order within the incident.
pub fn ranked_needs(incidents: &[Incident]) -> Vec<RankedNeed<'_>> {
    let mut needs: Vec<RankedNeed<'_>> = incidents
        .iter()
        .flat_map(|incident| {
            incident.resource_needs.iter().map(move |need| RankedNeed {
                need,
                incident_id: &incident.id,
                incident_title: &incident.title,
                location: &incident.location.name,
            })
        })
        .collect();
    needs.sort_by(|a, b| b.need.urgency.cmp(&a.need.urgency));
    needs
}
