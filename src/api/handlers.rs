use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::engine::{EventQueue, EventRouter, QueueError, RouteReport, RouterStatsSnapshot};
use crate::events::IncomingEvent;
use crate::providers::{ProviderConfig, ProviderError, ProviderInfo, ProviderRegistry};
use crate::rules::{RuleDefinition, RuleKey, RuleStore, RuleView, StoreError};

/// Application state shared across handlers
pub struct AppState {
    pub store: Arc<RuleStore>,
    pub providers: Arc<ProviderRegistry>,
    pub router: Arc<EventRouter>,
    /// Present when the background worker runs
    pub queue: Option<EventQueue>,
}

// ============================================================================
// Health Check
// ============================================================================

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
    })
}

// ============================================================================
// Rules
// ============================================================================

#[derive(Serialize)]
pub struct RulesResponse {
    pub rules: Vec<RuleView>,
}

pub async fn list_rules(State(state): State<Arc<AppState>>) -> Json<RulesResponse> {
    Json(RulesResponse {
        rules: state.store.list(),
    })
}

pub async fn get_rule(
    State(state): State<Arc<AppState>>,
    Path((namespace, name)): Path<(String, String)>,
) -> Result<Json<RuleView>, ApiError> {
    let key = RuleKey::new(namespace, name);
    state
        .store
        .get(&key)
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("Rule '{}' not found", key)))
}

#[derive(Serialize)]
pub struct ApplyResponse {
    pub created: bool,
    pub changed: bool,
    pub rule: RuleView,
}

pub async fn apply_rule(
    State(state): State<Arc<AppState>>,
    Path((namespace, name)): Path<(String, String)>,
    Json(definition): Json<RuleDefinition>,
) -> Result<Json<ApplyResponse>, ApiError> {
    let outcome = state
        .store
        .apply(RuleKey::new(namespace, name), definition)
        .map_err(|e| ApiError::Invalid(e.to_string()))?;

    Ok(Json(ApplyResponse {
        created: outcome.created,
        changed: outcome.changed,
        rule: outcome.rule,
    }))
}

pub async fn delete_rule(
    State(state): State<Arc<AppState>>,
    Path((namespace, name)): Path<(String, String)>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let key = RuleKey::new(namespace, name);
    state.store.delete(&key)?;

    Ok(Json(serde_json::json!({ "deleted": key.to_string() })))
}

pub async fn suspend_rule(
    State(state): State<Arc<AppState>>,
    Path((namespace, name)): Path<(String, String)>,
) -> Result<Json<RuleView>, ApiError> {
    let outcome = state
        .store
        .set_suspend(&RuleKey::new(namespace, name), true)?;
    Ok(Json(outcome.rule))
}

pub async fn resume_rule(
    State(state): State<Arc<AppState>>,
    Path((namespace, name)): Path<(String, String)>,
) -> Result<Json<RuleView>, ApiError> {
    let outcome = state
        .store
        .set_suspend(&RuleKey::new(namespace, name), false)?;
    Ok(Json(outcome.rule))
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileRequest {
    #[serde(default)]
    pub requested_at: Option<String>,
}

pub async fn reconcile_rule(
    State(state): State<Arc<AppState>>,
    Path((namespace, name)): Path<(String, String)>,
    request: Option<Json<ReconcileRequest>>,
) -> Result<Json<RuleView>, ApiError> {
    let request = request.map(|Json(r)| r).unwrap_or_default();
    let requested_at = request
        .requested_at
        .unwrap_or_else(|| chrono::Utc::now().to_rfc3339());

    let view = state
        .store
        .reconcile(&RuleKey::new(namespace, name), Some(requested_at))?;
    Ok(Json(view))
}

// ============================================================================
// Providers
// ============================================================================

#[derive(Serialize)]
pub struct ProvidersResponse {
    pub providers: Vec<ProviderInfo>,
}

pub async fn list_providers(State(state): State<Arc<AppState>>) -> Json<ProvidersResponse> {
    Json(ProvidersResponse {
        providers: state.providers.list(),
    })
}

#[derive(Serialize)]
pub struct ProviderResponse {
    pub name: String,
    /// Rules re-validated against the new provider
    pub rules_reconciled: usize,
}

pub async fn put_provider(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    Json(config): Json<ProviderConfig>,
) -> Result<Json<ProviderResponse>, ApiError> {
    state.providers.register(&name, config)?;
    let rules_reconciled = state.store.reconcile_provider(&name);

    Ok(Json(ProviderResponse {
        name,
        rules_reconciled,
    }))
}

pub async fn delete_provider(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<Json<ProviderResponse>, ApiError> {
    state.providers.remove(&name)?;
    let rules_reconciled = state.store.reconcile_provider(&name);

    Ok(Json(ProviderResponse {
        name,
        rules_reconciled,
    }))
}

// ============================================================================
// Events
// ============================================================================

#[derive(Serialize)]
pub struct RouteResponse {
    pub dispatched: usize,
    pub reports: Vec<RouteReport>,
}

pub async fn route_event(
    State(state): State<Arc<AppState>>,
    Json(event): Json<IncomingEvent>,
) -> Json<RouteResponse> {
    let reports = state.router.route(&event).await;
    let dispatched = reports.iter().filter(|r| r.decision.is_dispatched()).count();

    Json(RouteResponse {
        dispatched,
        reports,
    })
}

pub async fn enqueue_event(
    State(state): State<Arc<AppState>>,
    Json(event): Json<IncomingEvent>,
) -> Result<impl IntoResponse, ApiError> {
    let queue = state
        .queue
        .as_ref()
        .ok_or_else(|| ApiError::Unavailable("Event queue is not running".to_string()))?;

    queue.submit(event)?;
    Ok((
        StatusCode::ACCEPTED,
        Json(serde_json::json!({ "queued": true })),
    ))
}

// ============================================================================
// Stats
// ============================================================================

#[derive(Serialize)]
pub struct StatsResponse {
    pub rules: usize,
    pub providers: usize,
    pub routing: RouterStatsSnapshot,
}

pub async fn stats(State(state): State<Arc<AppState>>) -> Json<StatsResponse> {
    Json(StatsResponse {
        rules: state.store.len(),
        providers: state.providers.list().len(),
        routing: state.router.stats(),
    })
}

// ============================================================================
// Error Handling
// ============================================================================

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    NotFound(String),
    Invalid(String),
    Unavailable(String),
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(_) => ApiError::NotFound(e.to_string()),
            StoreError::Config(_) => ApiError::Invalid(e.to_string()),
        }
    }
}

impl From<ProviderError> for ApiError {
    fn from(e: ProviderError) -> Self {
        match e {
            ProviderError::NotFound(_) => ApiError::NotFound(e.to_string()),
            ProviderError::EmptyName | ProviderError::InvalidAddress { .. } => {
                ApiError::BadRequest(e.to_string())
            }
        }
    }
}

impl From<QueueError> for ApiError {
    fn from(e: QueueError) -> Self {
        ApiError::Unavailable(e.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::Invalid(msg) => (StatusCode::UNPROCESSABLE_ENTITY, msg),
            ApiError::Unavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg),
        };

        let body = serde_json::json!({
            "error": message
        });

        (status, Json(body)).into_response()
    }
}
