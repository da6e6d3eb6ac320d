use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::geo::{CoordinateError, require_placeable};
use crate::incident::{CrisisType, Incident, IncidentId, IncidentLocation, Severity};

pub const USER_REPORT_SOURCE: &str = "User Report";

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("required field `{0}` is empty")]
    MissingField(&'static str),
    #[error(transparent)]
    Coordinate(#[from] CoordinateError),
}

/// Operator-submitted report payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportDraft {
    pub title: String,
    pub description: String,
    #[serde(rename = "type")]
    pub category: CrisisType,
    pub severity: Severity,
    pub location: IncidentLocation,
}

impl Default for ReportDraft {
    fn default() -> Self {
        Self {
            title: String::new(),
            description: String::new(),
            category: CrisisType::Wildfire,
            severity: Severity::Medium,
            location: IncidentLocation::default(),
        }
    }
}

impl ReportDraft {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.title.trim().is_empty() {
            return Err(ValidationError::MissingField("title"));
        }
        if self.description.trim().is_empty() {
            return Err(ValidationError::MissingField("description"));
        }
        if self.location.name.trim().is_empty() {
            return Err(ValidationError::MissingField("location.name"));
        }
        require_placeable(&self.location)?;
        Ok(())
    }

    /// Build the synthetic incident for a validated draft. Reports start
    /// unverified and carry no resource needs or population figure.
    pub fn into_incident(
        self,
        id: IncidentId,
        reported_at: DateTime<Utc>,
    ) -> Result<Incident, ValidationError> {
        self.validate()?;
        Ok(Incident {
            id,
            title: self.title,
            description: self.description,
            category: self.category,
            severity: self.severity,
            location: self.location,
            timestamp: reported_at,
            source: USER_REPORT_SOURCE.to_string(),
            verified: false,
            affected_population: None,
            resource_needs: Vec::new(),
        })
    }
}
