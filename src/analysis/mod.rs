//! Measure file naming and aggregation.

pub mod aggregator;
pub mod naming;

pub use aggregator::{aggregate, compute_scores, scores_by_bundle, Aggregator};
pub use naming::MeasureFileKey;
