use axum::{
    routing::{get, post, put},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use super::handlers::{
    apply_rule, delete_provider, delete_rule, enqueue_event, get_rule, health_check,
    list_providers, list_rules, put_provider, reconcile_rule, resume_rule, route_event, stats,
    suspend_rule, AppState,
};
use crate::engine::{
    EngineConfig, EventRouter, RouterWorker, DEFAULT_MAX_IN_FLIGHT, DEFAULT_QUEUE_CAPACITY,
};
use crate::providers::ProviderRegistry;
use crate::rules::RuleStore;

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub queue_capacity: usize,
    pub max_in_flight: usize,
    pub engine: EngineConfig,
}

impl ServerConfig {
    /// Create a server config from environment variables
    /// HERALD_HOST=0.0.0.0
    /// HERALD_PORT=8080
    /// HERALD_QUEUE_CAPACITY=1024
    /// HERALD_MAX_IN_FLIGHT=64
    /// plus the engine variables read by [`EngineConfig::from_env`]
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let host = std::env::var("HERALD_HOST").unwrap_or(defaults.host);
        let port = std::env::var("HERALD_PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(defaults.port);
        let queue_capacity = std::env::var("HERALD_QUEUE_CAPACITY")
            .ok()
            .and_then(|c| c.parse().ok())
            .unwrap_or(defaults.queue_capacity);
        let max_in_flight = std::env::var("HERALD_MAX_IN_FLIGHT")
            .ok()
            .and_then(|c| c.parse().ok())
            .unwrap_or(defaults.max_in_flight);

        Self {
            host,
            port,
            queue_capacity,
            max_in_flight,
            engine: EngineConfig::from_env(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            max_in_flight: DEFAULT_MAX_IN_FLIGHT,
            engine: EngineConfig::default(),
        }
    }
}

/// Build the application router
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        // Health check
        .route("/health", get(health_check))
        // Rules
        .route("/rules", get(list_rules))
        .route(
            "/rules/:namespace/:name",
            get(get_rule).put(apply_rule).delete(delete_rule),
        )
        .route("/rules/:namespace/:name/suspend", post(suspend_rule))
        .route("/rules/:namespace/:name/resume", post(resume_rule))
        .route("/rules/:namespace/:name/reconcile", post(reconcile_rule))
        // Providers
        .route("/providers", get(list_providers))
        .route("/providers/:name", put(put_provider).delete(delete_provider))
        // Events
        .route("/events", post(route_event))
        .route("/events/async", post(enqueue_event))
        // Stats
        .route("/stats", get(stats))
        // Middleware
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

/// Run the HTTP server
pub async fn run_server(config: ServerConfig) -> Result<(), Box<dyn std::error::Error>> {
    let providers = Arc::new(ProviderRegistry::new());
    let store = Arc::new(RuleStore::new(Arc::clone(&providers)));
    let router = Arc::new(EventRouter::new(
        Arc::clone(&store),
        Arc::clone(&providers),
        config.engine.clone(),
    ));

    // Start background worker
    let (queue, worker) = RouterWorker::new(
        Arc::clone(&router),
        config.queue_capacity,
        config.max_in_flight,
    );
    let worker_handle = worker.start();

    let state = Arc::new(AppState {
        store,
        providers,
        router,
        queue: Some(queue),
    });

    let app = build_router(state);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    tracing::info!("Starting Herald server on {}", addr);

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // The app, and with it every queue handle, is gone; let the worker
    // finish what was accepted
    if let Err(e) = worker_handle.await {
        tracing::error!(error = %e, "Router worker failed");
    }

    tracing::info!("Herald server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        return;
    }

    tracing::info!("Shutdown signal received, stopping...");
}
