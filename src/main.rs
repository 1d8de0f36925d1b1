//! Blog visitor-analytics pipeline
//!
//! Single-process tracking service handling:
//! - Visitor/session identity resolution via cookies
//! - Engagement event ingestion with monotonic per-post snapshots
//! - Deferred, batched per-post aggregate recomputation

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::signal;
use tracing::{error, info};

use analytics_core::EngagementWeights;
use api::{router, AppState, CookieOptions};
use store::{AnalyticsStore, PgStore, StoreConfig};
use telemetry::{health, init_tracing_from_env, metrics};
use worker::{AggregationQueue, Aggregator, PostAggregator, QueueConfig};

/// Aggregation queue settings as configured (plain integers; converted to
/// [`QueueConfig`] at startup).
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
struct QueueSettings {
    #[serde(default = "default_flush_interval_secs")]
    flush_interval_secs: u64,
    #[serde(default = "default_batch_size")]
    batch_size: usize,
    #[serde(default = "default_concurrency")]
    concurrency: usize,
}

fn default_flush_interval_secs() -> u64 {
    30
}

fn default_batch_size() -> usize {
    50
}

fn default_concurrency() -> usize {
    5
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            flush_interval_secs: default_flush_interval_secs(),
            batch_size: default_batch_size(),
            concurrency: default_concurrency(),
        }
    }
}

impl From<&QueueSettings> for QueueConfig {
    fn from(settings: &QueueSettings) -> Self {
        Self {
            flush_interval: Duration::from_secs(settings.flush_interval_secs),
            batch_size: settings.batch_size,
            concurrency: settings.concurrency,
        }
    }
}

/// Application configuration.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
struct Config {
    #[serde(default = "default_host")]
    host: String,
    #[serde(default = "default_port")]
    port: u16,

    /// Set the Secure attribute on identity cookies (disable for local HTTP)
    #[serde(default = "default_secure_cookies")]
    secure_cookies: bool,

    #[serde(default)]
    store: StoreConfig,

    #[serde(default)]
    queue: QueueSettings,

    /// Engagement score weighting (heuristic, tunable per deployment)
    #[serde(default)]
    engagement_weights: EngagementWeights,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_secure_cookies() -> bool {
    true
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            secure_cookies: default_secure_cookies(),
            store: StoreConfig::default(),
            queue: QueueSettings::default(),
            engagement_weights: EngagementWeights::default(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    // Initialize tracing
    init_tracing_from_env();

    info!("Starting blog analytics pipeline v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config = load_config()?;

    // Connect Postgres and apply the schema
    let pg = PgStore::connect(&config.store)
        .await
        .context("Failed to connect to Postgres")?;
    store::schema::init_schema(pg.pool())
        .await
        .context("Failed to initialize schema")?;

    // Check health and update status
    if store::health::check_connection(&pg).await {
        health().store.set_healthy();
        info!("Postgres connection: healthy");
    } else {
        health().store.set_unhealthy("Connection failed");
        error!("Postgres connection: unhealthy");
    }

    let analytics_store: Arc<dyn AnalyticsStore> = Arc::new(pg);

    // Start the aggregation queue
    let aggregator: Arc<dyn PostAggregator> = Arc::new(Aggregator::new(
        analytics_store.clone(),
        config.engagement_weights.clone(),
    ));
    let queue = Arc::new(AggregationQueue::new(QueueConfig::from(&config.queue)));
    let queue_handle = queue.clone().start(aggregator.clone());

    // Periodic metrics snapshot
    let _metrics_handle = tokio::spawn(async {
        let mut ticker = tokio::time::interval(Duration::from_secs(60));
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let snapshot = metrics().snapshot();
            info!(snapshot = ?snapshot, "Metrics snapshot");
        }
    });

    // Create application state
    let state = AppState::new(
        analytics_store,
        queue.clone(),
        CookieOptions {
            secure: config.secure_cookies,
        },
    );

    // Create router
    let app = router(state);

    // Start HTTP server
    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .context("Invalid server address")?;

    info!("Listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;

    // Run server with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    // Cleanup
    info!("Shutting down...");

    // Stop the timer, then flush any remaining dirty posts synchronously
    queue_handle.abort();
    queue.drain_all(&aggregator).await;

    info!("Shutdown complete");
    Ok(())
}

/// Load configuration from files and environment.
fn load_config() -> Result<Config> {
    let config = config::Config::builder()
        // Start with defaults
        .add_source(config::Config::try_from(&Config::default())?)
        // Load from config file if exists
        .add_source(
            config::File::with_name("config/default")
                .required(false)
                .format(config::FileFormat::Toml),
        )
        // Override with environment variables
        .add_source(
            config::Environment::default()
                .separator("__")
                .prefix("ANALYTICS")
                .try_parsing(true),
        )
        .build()
        .context("Failed to build configuration")?;

    let mut config: Config = config
        .try_deserialize()
        .context("Failed to deserialize configuration")?;

    // DATABASE_URL is the conventional override for the store connection
    if let Ok(url) = std::env::var("DATABASE_URL") {
        config.store.url = url;
    }

    Ok(config)
}

/// Graceful shutdown signal handler.
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        }
        _ = terminate => {
            info!("Received terminate signal");
        }
    }
}
