pub mod camera;
pub mod config;
pub mod diagnostics;
pub mod engine;
pub mod error;
pub mod location;
pub mod selection;
pub mod session;
pub mod surface;
pub mod toggles;

pub use diagnostics::{Diagnostic, Diagnostics, DiagnosticsSnapshot};
pub use engine::{EngineState, MapSyncEngine, ReconcileReport, Scene};
pub use error::{CapabilityError, ConsistencyError, EngineError, PlacementError};
pub use location::{LocationProvider, LocationService};
pub use session::{LocationOutcome, PendingLocation, Session};
pub use surface::{MemorySurface, RenderSurface};
pub use toggles::ToggleState;
