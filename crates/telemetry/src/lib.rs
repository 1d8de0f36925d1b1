//! Internal telemetry for the analytics pipeline.
//!
//! Metrics are collected in-process with atomics and periodically logged;
//! there is no external metrics backend.

pub mod health;
pub mod metrics;
pub mod tracing_setup;

pub use health::*;
pub use metrics::*;
pub use tracing_setup::*;
