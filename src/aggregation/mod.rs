pub mod engine;
pub mod types;

pub use engine::aggregate;
pub use types::{AggregatedAd, DerivedRatios, Totals};
