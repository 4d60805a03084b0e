pub mod engine;
pub mod types;

pub use engine::{compare, synthesize_previous};
pub use types::{AccountFilter, ComparisonResult, DeltaPct, MetricDeltas, PreviousSource, DELTA_CEILING};
