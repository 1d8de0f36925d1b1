//! Store connectivity checks.

use crate::pg::PgStore;
use crate::AnalyticsStore;

/// Checks that Postgres answers a trivial query.
pub async fn check_connection(store: &PgStore) -> bool {
    match store.ping().await {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!("Postgres health check failed: {}", e);
            false
        }
    }
}
