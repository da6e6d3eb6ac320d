use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tracing::warn;

use crate::error::{CapabilityError, ConsistencyError, PlacementError};

/// Events for the notification surface. One per skipped incident or failed
/// location acquisition.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum Diagnostic {
    InvalidCoordinate(PlacementError),
    Consistency(ConsistencyError),
    LocationFailed(CapabilityError),
}

#[derive(Debug, Default)]
struct DiagnosticCounters {
    invalid_coordinates_total: AtomicU64,
    consistency_errors_total: AtomicU64,
    location_failures_total: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DiagnosticsSnapshot {
    pub invalid_coordinates_total: u64,
    pub consistency_errors_total: u64,
    pub location_failures_total: u64,
}

/// Broadcast side channel plus running totals. Cheap to clone.
#[derive(Debug, Clone)]
pub struct Diagnostics {
    tx: broadcast::Sender<Diagnostic>,
    counters: Arc<DiagnosticCounters>,
}

impl Default for Diagnostics {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_DIAGNOSTICS_BUFFER)
    }
}

impl Diagnostics {
    pub fn new(buffer: usize) -> Self {
        let (tx, _) = broadcast::channel(buffer.max(1));
        Self {
            tx,
            counters: Arc::new(DiagnosticCounters::default()),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Diagnostic> {
        self.tx.subscribe()
    }

    pub fn stream(&self) -> BroadcastStream<Diagnostic> {
        BroadcastStream::new(self.tx.subscribe())
    }

    pub fn emit(&self, diagnostic: Diagnostic) {
        match &diagnostic {
            Diagnostic::InvalidCoordinate(err) => {
                self.counters
                    .invalid_coordinates_total
                    .fetch_add(1, Ordering::Relaxed);
                warn!(
                    incident = %err.id,
                    reason = %err.reason,
                    "skipping incident with unplaceable coordinate"
                );
            }
            Diagnostic::Consistency(err) => {
                self.counters
                    .consistency_errors_total
                    .fetch_add(1, Ordering::Relaxed);
                warn!(error = %err, "consistency violation, record excluded from map");
            }
            Diagnostic::LocationFailed(err) => {
                self.counters
                    .location_failures_total
                    .fetch_add(1, Ordering::Relaxed);
                warn!(error = %err, "location acquisition failed");
            }
        }
        // No subscribers is fine; totals still move.
        let _ = self.tx.send(diagnostic);
    }

    pub fn snapshot(&self) -> DiagnosticsSnapshot {
        DiagnosticsSnapshot {
            invalid_coordinates_total: self
                .counters
                .invalid_coordinates_total
                .load(Ordering::Relaxed),
            consistency_errors_total: self
                .counters
                .consistency_errors_total
                .load(Ordering::Relaxed),
            location_failures_total: self.counters.location_failures_total.load(Ordering::Relaxed),
        }
    }
}
