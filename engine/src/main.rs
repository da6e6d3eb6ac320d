use std::sync::Arc;

use crisis_engine::location::{FixedLocationProvider, LocationProvider, UnsupportedProvider};
use crisis_engine::{Diagnostics, LocationService, MemorySurface, Session, config};
use crisis_shared::feed::parse_snapshot;
use crisis_shared::{EventView, Severity};
use serde_json::json;
use tokio_stream::StreamExt;
use tracing_subscriber::EnvFilter;

#[tokio::main(flavor = "current_thread")]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let diagnostics = Diagnostics::new(config::diagnostics_buffer());
    let mut diagnostic_stream = diagnostics.stream();
    let diagnostic_logger = tokio::spawn(async move {
        let mut received = 0u64;
        while let Some(event) = diagnostic_stream.next().await {
            match event {
                Ok(diagnostic) => {
                    received += 1;
                    match serde_json::to_string(&diagnostic) {
                        Ok(line) => tracing::info!(diagnostic = %line, "diagnostic"),
                        Err(e) => tracing::warn!(error = %e, "failed to encode diagnostic"),
                    }
                }
                Err(e) => tracing::warn!(error = %e, "diagnostic stream lagged"),
            }
        }
        received
    });

    let configured = config::user_location();
    let provider: Arc<dyn LocationProvider> = match configured {
        Some(point) => Arc::new(FixedLocationProvider(point)),
        None => Arc::new(UnsupportedProvider),
    };
    let location = LocationService::new(provider, config::location_timeout());
    let toggles = config::initial_toggles();

    let path = config::incidents_path();
    tokio::time::sleep(config::feed_delay()).await;
    let payload = match tokio::fs::read(&path).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::error!(path = %path.display(), error = %e, "failed to read incident snapshot");
            return;
        }
    };
    let incidents = match parse_snapshot(&payload) {
        Ok(incidents) => incidents,
        Err(e) => {
            tracing::error!(
                path = %path.display(),
                error = %e,
                "failed to parse incident snapshot"
            );
            return;
        }
    };
    tracing::info!(count = incidents.len(), path = %path.display(), "Loaded incident snapshot");

    let mut session = Session::new(MemorySurface::new(), location, diagnostics.clone(), toggles);
    if let Err(e) = session.replace_incidents(incidents) {
        tracing::error!(error = %e, "failed to load incidents");
        return;
    }
    let mut pending = match session.mount() {
        Ok(pending) => pending,
        Err(e) => {
            tracing::error!(error = %e, "failed to mount map");
            return;
        }
    };

    let first_critical = session
        .incidents()
        .iter()
        .find(|incident| incident.severity == Severity::Critical)
        .map(|incident| incident.id.clone());
    if let Some(id) = first_critical {
        match session.select(Some(id.clone())) {
            Ok(_) => tracing::info!(incident = %id, "Selected first critical incident"),
            Err(e) => tracing::warn!(error = %e, "selection failed"),
        }
    }

    for step in [
        session.set_show_predictions(!toggles.show_predictions),
        session.set_show_resolved(false),
    ] {
        if let Err(e) = step {
            tracing::warn!(error = %e, "toggle change failed");
        }
    }

    if pending.is_none() && configured.is_some() && !session.toggles().show_user_location {
        match session.set_show_user_location(true) {
            Ok(request) => pending = request,
            Err(e) => tracing::warn!(error = %e, "user location toggle failed"),
        }
    }
    if let Some(request) = pending {
        let outcome = request.resolve().await;
        if let Err(e) = session.apply_location(outcome) {
            tracing::warn!(error = %e, "failed to apply location");
        }
    }

    let counts = session.view_counts();
    let summary = json!({
        "toggles": session.toggles(),
        "selected": session.selected_incident().map(|incident| &incident.id),
        "userLocation": session.user_location(),
        "lastPass": session.last_report(),
        "liveHandles": session.engine().live_ids().len(),
        "surface": session.engine().surface().stats(),
        "diagnostics": diagnostics.snapshot(),
        "counts": counts,
        "criticalOpen": session.list("", EventView::Critical).len(),
        "topNeeds": session
            .resource_needs()
            .iter()
            .take(3)
            .map(|row| {
                json!({
                    "incident": row.incident_id,
                    "need": row.need.kind,
                    "urgency": row.need.urgency,
                })
            })
            .collect::<Vec<_>>(),
    });

    session.dispose();
    drop(session);
    drop(diagnostics);
    match diagnostic_logger.await {
        Ok(received) => tracing::info!(received, "diagnostic logger finished"),
        Err(e) => tracing::warn!(error = %e, "diagnostic logger task failed"),
    }

    match serde_json::to_string_pretty(&summary) {
        Ok(text) => println!("{text}"),
        Err(e) => tracing::error!(error = %e, "failed to encode summary"),
    }
}
