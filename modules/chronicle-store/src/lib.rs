pub mod migrate;
pub mod models;
pub mod store;

pub use migrate::migrate;
pub use models::{CanonicalEventInput, EventContext, EventSourceInfo, NewViewpointEvent};
pub use store::PgTimelineStore;
