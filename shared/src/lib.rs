pub mod colors;
pub mod feed;
pub mod filter;
pub mod geo;
pub mod incident;
pub mod popup;
pub mod report;
pub mod resources;

pub use colors::crisis_type_color;
pub use feed::FeedEvent;
pub use filter::{EventIndex, EventView, ViewCounts, filter_events, view_counts};
pub use geo::{CoordinateError, CoordinateStatus};
pub use incident::*;
pub use popup::PopupContent;
pub use report::{ReportDraft, ValidationError};
pub use resources::{RankedNeed, ranked_needs};
