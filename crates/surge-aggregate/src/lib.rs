//! Response normalization and the orchestrating aggregator core.

pub mod aggregator;
pub mod normalize;

pub use aggregator::{
    AggregatedResponse, Aggregator, AggregatorConfig, RequestParams, RunInfo, SourceOutcome,
    VariableEntry,
};
pub use normalize::{canonical_name, canonical_unit, merge_canonical, normalize};
