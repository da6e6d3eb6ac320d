use crisis_shared::IncidentId;
use tokio::sync::watch;
use tracing::debug;

/// Single source of truth for the focused incident.
///
/// Observers hold a `watch::Receiver` and always see the latest value. The
/// session commits a new selection only after the map pass for it has run,
/// so no observer can see a selection the map has not caught up with.
#[derive(Debug)]
pub struct SelectionController {
    tx: watch::Sender<Option<IncidentId>>,
}

impl Default for SelectionController {
    fn default() -> Self {
        Self::new()
    }
}

impl SelectionController {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(None);
        Self { tx }
    }

    pub fn current(&self) -> Option<IncidentId> {
        self.tx.borrow().clone()
    }

    pub fn is_selected(&self, id: &IncidentId) -> bool {
        self.tx.borrow().as_ref() == Some(id)
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<IncidentId>> {
        self.tx.subscribe()
    }

    /// Publish `next`. Observers are woken only when the value changed.
    pub fn commit(&self, next: Option<IncidentId>) -> bool {
        let changed = self.tx.send_if_modified(|current| {
            if *current == next {
                return false;
            }
            *current = next;
            true
        });
        if changed {
            let selected = self.tx.borrow().as_ref().map(IncidentId::as_str).map(str::to_owned);
            debug!(?selected, "selection changed");
        }
        changed
    }
}
