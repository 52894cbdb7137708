#![forbid(unsafe_code)]
#![deny(rust_2018_idioms, future_incompatible)]

//! Authorization decision engine and approval workflow orchestrator for the
//! Xpress ops console.

use std::sync::Arc;

// Explicitly acknowledge dependencies wired in other binary/test targets
use anyhow as _;
use dotenvy as _;
use tracing_subscriber as _;

// Dev dependencies used in tests (acknowledged to prevent clippy warnings)
#[cfg(test)]
use futures as _;
#[cfg(test)]
use reqwest as _;

use axum::{
    http::{self},
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::CorsLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};

pub mod advisor;
pub mod audit;
pub mod cache;
pub mod config;
pub mod documentation;
pub mod engine;
pub mod errors;
pub mod handlers;
pub mod metrics;
pub mod models;
pub mod notifications;
pub mod regions;
pub mod registry;
pub mod workflow;

use audit::TracingAuditLogger;
use cache::DecisionCache;
use config::AppConfig;
use engine::AccessDecisionEngine;
use errors::AppError;
use metrics::access_metrics_middleware;
use notifications::{LoggingDispatcher, StubMfaService};
use regions::RegionStore;
use registry::PolicyRegistry;
use workflow::{ApprovalOrchestrator, TokenStore};

pub use documentation::ApiDoc;

/// Shared service state: the decision engine and the orchestrator, wired to
/// one token store and one decision cache so revocation reaches both sides.
pub struct AppState {
    pub engine: AccessDecisionEngine,
    pub orchestrator: Arc<ApprovalOrchestrator>,
    pub cache: Arc<DecisionCache>,
}

/// Build the state the service runs on. Fails only on a broken workflow
/// registry, which is a deployment defect.
pub fn build_state(config: &AppConfig) -> Result<Arc<AppState>, AppError> {
    let registry = Arc::new(PolicyRegistry::builtin()?);
    let regions = Arc::new(RegionStore::seeded());
    let cache = Arc::new(DecisionCache::new(config.cache.clone()));
    let tokens = Arc::new(TokenStore::new());
    let audit = Arc::new(TracingAuditLogger);

    let engine = AccessDecisionEngine::new(
        registry.clone(),
        regions,
        cache.clone(),
        tokens.clone(),
        audit.clone(),
    );
    let orchestrator = Arc::new(ApprovalOrchestrator::new(
        registry,
        tokens,
        cache.clone(),
        audit,
        Arc::new(LoggingDispatcher),
        Arc::new(StubMfaService),
    ));

    Ok(Arc::new(AppState { engine, orchestrator, cache }))
}

pub fn app(state: Arc<AppState>) -> Router {
    let cors = match std::env::var("ALLOWED_ORIGINS") {
        Ok(origins) if !origins.trim().is_empty() => {
            let mut layer = CorsLayer::new();
            for o in origins.split(',') {
                if let Ok(origin) = o.trim().parse::<http::HeaderValue>() {
                    layer = layer.allow_origin(origin);
                }
            }
            layer
        }
        // Default to no origins unless explicitly configured.
        _ => CorsLayer::new(),
    };

    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/metrics", get(handlers::get_metrics))
        .route("/v1/access/evaluate", post(handlers::evaluate_access))
        .route(
            "/v1/vehicles/permissions/validate",
            post(handlers::validate_vehicle_permissions),
        )
        .route(
            "/v1/vehicles/permissions/effective",
            post(handlers::effective_vehicle_permissions),
        )
        .route("/v1/approvals", post(handlers::create_approval_request))
        .route("/v1/approvals/:id", get(handlers::get_approval_request))
        .route("/v1/approvals/:id/approve", post(handlers::approve_request))
        .route("/v1/approvals/:id/reject", post(handlers::reject_request))
        .route("/v1/workflows", get(handlers::list_workflows))
        .route("/v1/workflows/:action/risk", get(handlers::workflow_risk))
        .route(
            "/v1/workflows/:action/notifications",
            get(handlers::workflow_notifications),
        )
        .route(
            "/v1/workflows/:action/template",
            get(handlers::workflow_template),
        )
        .route("/v1/tokens/:id/revoke", post(handlers::revoke_token))
        .layer(axum::middleware::from_fn(access_metrics_middleware))
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
