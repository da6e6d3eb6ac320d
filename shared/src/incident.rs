use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Stable incident identifier, used as the reconciliation key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IncidentId(String);

impl IncidentId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IncidentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for IncidentId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CrisisType {
    Earthquake,
    Flood,
    Wildfire,
    Hurricane,
    Tornado,
    Landslide,
    PowerOutage,
    Infrastructure,
    Medical,
}

impl CrisisType {
    pub const ALL: [CrisisType; 9] = [
        CrisisType::Earthquake,
        CrisisType::Flood,
        CrisisType::Wildfire,
        CrisisType::Hurricane,
        CrisisType::Tornado,
        CrisisType::Landslide,
        CrisisType::PowerOutage,
        CrisisType::Infrastructure,
        CrisisType::Medical,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            CrisisType::Earthquake => "earthquake",
            CrisisType::Flood => "flood",
            CrisisType::Wildfire => "wildfire",
            CrisisType::Hurricane => "hurricane",
            CrisisType::Tornado => "tornado",
            CrisisType::Landslide => "landslide",
            CrisisType::PowerOutage => "powerOutage",
            CrisisType::Infrastructure => "infrastructure",
            CrisisType::Medical => "medical",
        }
    }
}

impl fmt::Display for CrisisType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Severity ordering: `Critical > High > Medium > Low`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub const fn as_str(self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }

    pub const fn is_critical(self) -> bool {
        matches!(self, Severity::Critical)
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

impl GeoPoint {
    pub const fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    pub fn is_origin(&self) -> bool {
        self.lat == 0.0 && self.lng == 0.0
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct IncidentLocation {
    #[serde(default)]
    pub name: String,
    pub coordinates: GeoPoint,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceNeed {
    #[serde(rename = "type")]
    pub kind: String,
    pub description: String,
    pub urgency: Severity,
}

/// A single reported crisis event. Replaced wholesale on update, never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Incident {
    pub id: IncidentId,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "type")]
    pub category: CrisisType,
    pub severity: Severity,
    pub location: IncidentLocation,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub source: String,
    pub verified: bool,
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub affected_population: Option<u64>,
    #[serde(default)]
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub resource_needs: Vec<ResourceNeed>,
}

impl Incident {
    pub fn coordinates(&self) -> GeoPoint {
        self.location.coordinates
    }

    pub fn is_critical(&self) -> bool {
        self.severity.is_critical()
    }

    /// Highest urgency among the incident's resource needs, if any.
    pub fn peak_urgency(&self) -> Option<Severity> {
        self.resource_needs.iter().map(|need| need.urgency).max()
    }
}
