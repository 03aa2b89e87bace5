//! Herald Server
//!
//! Run with: cargo run
//!
//! Environment variables:
//! - HERALD_HOST: Bind address (default: 0.0.0.0)
//! - HERALD_PORT: Port number (default: 8080)
//! - HERALD_QUEUE_CAPACITY: Buffered events for /events/async (default: 1024)
//! - HERALD_MAX_IN_FLIGHT: Queued events routed concurrently (default: 64)
//! - HERALD_DISPATCH_TIMEOUT_MS: Upper bound on one provider call (default: 15000)
//! - HERALD_RETRY_MAX_ATTEMPTS: Delivery attempts per event and rule (default: 5)
//! - HERALD_RETRY_INITIAL_BACKOFF_MS: First retry delay (default: 500)
//! - HERALD_RETRY_MAX_BACKOFF_MS: Retry delay cap (default: 30000)
//! - HERALD_RETRY_JITTER: Randomize retry delays (default: true)
//! - RUST_LOG: Log level (default: info)

use herald::api::{run_server, ServerConfig};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "herald=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = ServerConfig::from_env();

    tracing::info!("Herald configuration:");
    tracing::info!("  Host: {}:{}", config.host, config.port);
    tracing::info!("  Queue capacity: {}", config.queue_capacity);
    tracing::info!("  Max in flight: {}", config.max_in_flight);
    tracing::info!("  Dispatch timeout: {:?}", config.engine.dispatch_timeout);
    tracing::info!(
        "  Retry: {} attempts, backoff {:?}..{:?}, jitter {}",
        config.engine.retry.max_attempts,
        config.engine.retry.initial_backoff,
        config.engine.retry.max_backoff,
        config.engine.retry.jitter
    );

    run_server(config).await
}
