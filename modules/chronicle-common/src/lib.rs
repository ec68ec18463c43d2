pub mod config;
pub mod dates;
pub mod error;
pub mod progress;
pub mod types;

pub use config::Config;
pub use dates::{DatePrecision, DateRange, ParsedDate};
pub use error::ChronicleError;
pub use progress::{ProgressEvent, ProgressReporter, ProgressSink};
pub use types::*;
