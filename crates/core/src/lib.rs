//! Core types, classification, and aggregate computation for the blog
//! analytics pipeline.

pub mod analytics;
pub mod engagement;
pub mod error;
pub mod events;
pub mod limits;
pub mod session;
pub mod traffic;

pub use analytics::{EngagementWeights, PostAnalytics};
pub use engagement::{EngagementDelta, PostSession};
pub use error::{Error, Result};
pub use events::*;
pub use session::{Session, Visitor, SESSION_TIMEOUT_MINUTES};
pub use traffic::TrafficSource;
