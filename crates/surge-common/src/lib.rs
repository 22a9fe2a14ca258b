//! Common types and utilities shared across all surge-services crates.

pub mod error;
pub mod slice;
pub mod status;
pub mod time;

pub use error::{SurgeError, SurgeResult};
pub use slice::{AxisCoords, VariableSlice};
pub use status::{ResponseStatus, SourceStatus};
pub use time::{TimeEncoding, TimeWindow};
