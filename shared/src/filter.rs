use serde::{Deserialize, Serialize};

use crate::incident::Incident;

/// Named category views of the incident list panel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventView {
    #[default]
    All,
    Critical,
    Verified,
    Unverified,
}

impl EventView {
    pub const ALL: [EventView; 4] = [
        EventView::All,
        EventView::Critical,
        EventView::Verified,
        EventView::Unverified,
    ];

    pub fn admits(self, incident: &Incident) -> bool {
        match self {
            EventView::All => true,
            EventView::Critical => incident.is_critical(),
            EventView::Verified => incident.verified,
            EventView::Unverified => !incident.verified,
        }
    }
}

/// Tab badge counts. Computed without the text query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct ViewCounts {
    pub all: usize,
    pub critical: usize,
    pub verified: usize,
    pub unverified: usize,
}

impl ViewCounts {
    pub fn get(&self, view: EventView) -> usize {
        match view {
            EventView::All => self.all,
            EventView::Critical => self.critical,
            EventView::Verified => self.verified,
            EventView::Unverified => self.unverified,
        }
    }
}

/// Pre-lowercased searchable text for one snapshot. Rebuilt only when the
/// incident list is replaced, so per-keystroke filtering allocates nothing
/// but the lowered query.
#[derive(Debug, Clone, Default)]
pub struct EventIndex {
    haystacks: Vec<[String; 3]>,
}

impl EventIndex {
    pub fn build(incidents: &[Incident]) -> Self {
        let haystacks = incidents
            .iter()
            .map(|incident| {
                [
                    incident.title.to_lowercase(),
                    incident.description.to_lowercase(),
                    incident.location.name.to_lowercase(),
                ]
            })
            .collect();
        Self { haystacks }
    }

    pub fn len(&self) -> usize {
        self.haystacks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.haystacks.is_empty()
    }

    /// Stable filter over `incidents`, which must be the slice this index was
    /// built from. Output keeps input order.
    pub fn filter<'a>(
        &self,
        incidents: &'a [Incident],
        query: &str,
        view: EventView,
    ) -> Vec<&'a Incident> {
        debug_assert_eq!(incidents.len(), self.haystacks.len());
        let query = query.to_lowercase();
        incidents
            .iter()
            .zip(&self.haystacks)
            .filter(|(incident, _)| view.admits(incident))
            .filter(|(_, haystack)| {
                query.is_empty() || haystack.iter().any(|field| field.contains(&query))
            })
            .map(|(incident, _)| incident)
            .collect()
    }
}

/// One-shot filter for callers that do not keep an index around.
pub fn filter_events<'a>(
    incidents: &'a [Incident],
    query: &str,
    view: EventView,
) -> Vec<&'a Incident> {
    EventIndex::build(incidents).filter(incidents, query, view)
}

pub fn view_counts(incidents: &[Incident]) -> ViewCounts {
    incidents.iter().fold(ViewCounts::default(), |mut counts, incident| {
        counts.all += 1;
        if incident.is_critical() {
            counts.critical += 1;
        }
        if incident.verified {
            counts.verified += 1;
        } else {
            counts.unverified += 1;
        }
        counts
    })
}
