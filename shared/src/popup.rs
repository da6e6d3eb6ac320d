use serde::Serialize;

use crate::incident::Incident;

/// Text shown in an incident marker's popup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PopupContent {
    pub title: String,
    pub subtitle: String,
}

impl PopupContent {
    pub fn for_incident(incident: &Incident) -> Self {
        Self {
            title: incident.title.clone(),
            subtitle: format!("{} • {}", incident.category, incident.severity),
        }
    }

    /// CRC32 over the rendered text. Surfaces only receive new popup content
    /// when this changes.
    pub fn fingerprint(&self) -> u32 {
        let mut hasher = crc32fast::Hasher::new();
        hasher.update(self.title.as_bytes());
        hasher.update(&[0]);
        hasher.update(self.subtitle.as_bytes());
        hasher.finalize()
    }
}
