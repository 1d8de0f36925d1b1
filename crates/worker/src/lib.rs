//! Background aggregation for the analytics pipeline.
//!
//! Tracking calls mark posts dirty on the [`AggregationQueue`]; a timer
//! periodically drains the dirty set and the [`Aggregator`] recomputes each
//! post's full aggregate row from raw session and event data.

pub mod aggregator;
pub mod queue;

pub use aggregator::{Aggregator, PostAggregator};
pub use queue::{AggregationQueue, QueueConfig};
