//! HTTP API layer for the analytics pipeline.

pub mod extractors;
pub mod identity;
pub mod response;
pub mod routes;
pub mod state;

pub use routes::router;
pub use state::{AppState, CookieOptions};
