//! HTTP request handlers for the access service.

use std::str::FromStr;
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::advisor;
use crate::engine::VehiclePermissionCheck;
use crate::errors::AppError;
use crate::models::{
    AccessContext, AccessDecision, ApprovalRequest, NotificationSettings, Permission,
    RiskAssessment, Role, TemporaryAccessToken, User, WorkflowDefinition,
};
use crate::workflow::{ApprovalOutcome, Approver, CreateApprovalRequest};
use crate::AppState;

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct EvaluateAccessRequest {
    pub user: User,
    pub permission: String,
    #[serde(default)]
    pub context: AccessContext,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct VehiclePermissionRequest {
    pub user: User,
    #[serde(default)]
    pub required_permissions: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct RejectRequest {
    pub actor: Approver,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize, IntoParams)]
pub struct WorkflowsQuery {
    /// Approver authority level; with `role`, filters to approvable workflows.
    pub level: Option<u8>,
    pub role: Option<String>,
    /// Comma-separated permission names; defaults to the role's baseline.
    pub permissions: Option<String>,
}

/// Risk view of a workflow, with the human-facing approval time estimate.
#[derive(Debug, Clone, serde::Serialize, ToSchema)]
pub struct WorkflowRiskResponse {
    pub action: String,
    #[serde(flatten)]
    pub assessment: RiskAssessment,
    pub estimated_approval_time: String,
}

fn parse_permission(name: &str) -> Result<Permission, AppError> {
    Permission::from_str(name.trim()).map_err(AppError::InvalidInput)
}

#[utoipa::path(
    post,
    path = "/v1/access/evaluate",
    tag = "access",
    request_body = EvaluateAccessRequest,
    responses(
        (status = 200, description = "Access decision made", body = AccessDecision),
        (status = 400, description = "Invalid request parameters", body = crate::documentation::ErrorResponse)
    )
)]
/// Evaluate whether a user may exercise a permission under a context.
/// Denials come back as a 200 with `allowed: false`; only malformed input
/// is an error.
pub async fn evaluate_access(
    State(state): State<Arc<AppState>>,
    Json(body): Json<EvaluateAccessRequest>,
) -> Result<Json<AccessDecision>, AppError> {
    let permission = parse_permission(&body.permission)?;
    let decision = state
        .engine
        .evaluate_access(&body.user, permission, &body.context)
        .await;
    Ok(Json(decision))
}

#[utoipa::path(
    post,
    path = "/v1/vehicles/permissions/validate",
    tag = "access",
    request_body = VehiclePermissionRequest,
    responses(
        (status = 200, description = "Permission check result", body = VehiclePermissionCheck),
        (status = 400, description = "Invalid permission name", body = crate::documentation::ErrorResponse)
    )
)]
pub async fn validate_vehicle_permissions(
    State(state): State<Arc<AppState>>,
    Json(body): Json<VehiclePermissionRequest>,
) -> Result<Json<VehiclePermissionCheck>, AppError> {
    let required: Vec<Permission> = body
        .required_permissions
        .iter()
        .map(|p| parse_permission(p))
        .collect::<Result<_, _>>()?;
    Ok(Json(
        state.engine.validate_vehicle_permissions(&body.user, &required),
    ))
}

#[utoipa::path(
    post,
    path = "/v1/vehicles/permissions/effective",
    tag = "access",
    request_body = VehiclePermissionRequest,
    responses(
        (status = 200, description = "Effective permission set", body = Vec<Permission>)
    )
)]
pub async fn effective_vehicle_permissions(
    State(state): State<Arc<AppState>>,
    Json(body): Json<VehiclePermissionRequest>,
) -> Json<Vec<Permission>> {
    Json(state.engine.effective_vehicle_permissions(&body.user))
}

#[utoipa::path(
    post,
    path = "/v1/approvals",
    tag = "approvals",
    request_body = CreateApprovalRequest,
    responses(
        (status = 201, description = "Approval request created", body = ApprovalRequest),
        (status = 400, description = "Validation failed; errors itemized", body = crate::models::ValidationReport)
    )
)]
/// Open an approval request. Validation problems are itemized in the
/// response body rather than reported one at a time.
pub async fn create_approval_request(
    State(state): State<Arc<AppState>>,
    Json(body): Json<CreateApprovalRequest>,
) -> Response {
    match state.orchestrator.create_request(body) {
        Ok(request) => (StatusCode::CREATED, Json(request)).into_response(),
        Err(report) => (StatusCode::BAD_REQUEST, Json(report)).into_response(),
    }
}

#[utoipa::path(
    get,
    path = "/v1/approvals/{id}",
    tag = "approvals",
    params(("id" = Uuid, Path, description = "Approval request id")),
    responses(
        (status = 200, description = "Approval request", body = ApprovalRequest),
        (status = 404, description = "Unknown request", body = crate::documentation::ErrorResponse)
    )
)]
pub async fn get_approval_request(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApprovalRequest>, AppError> {
    state
        .orchestrator
        .get_request(id)
        .map(Json)
        .ok_or_else(|| AppError::RequestNotFound { id: id.to_string() })
}

#[utoipa::path(
    post,
    path = "/v1/approvals/{id}/approve",
    tag = "approvals",
    params(("id" = Uuid, Path, description = "Approval request id")),
    request_body = Approver,
    responses(
        (status = 200, description = "Approval recorded; token present once quorum is reached", body = ApprovalOutcome),
        (status = 403, description = "Approver not eligible", body = crate::documentation::ErrorResponse),
        (status = 404, description = "Unknown request", body = crate::documentation::ErrorResponse),
        (status = 409, description = "Request is no longer pending", body = crate::documentation::ErrorResponse)
    )
)]
pub async fn approve_request(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(approver): Json<Approver>,
) -> Result<Json<ApprovalOutcome>, AppError> {
    Ok(Json(state.orchestrator.approve(id, &approver)?))
}

#[utoipa::path(
    post,
    path = "/v1/approvals/{id}/reject",
    tag = "approvals",
    params(("id" = Uuid, Path, description = "Approval request id")),
    request_body = RejectRequest,
    responses(
        (status = 200, description = "Request rejected", body = ApprovalRequest),
        (status = 403, description = "Actor not eligible", body = crate::documentation::ErrorResponse),
        (status = 404, description = "Unknown request", body = crate::documentation::ErrorResponse),
        (status = 409, description = "Request is no longer pending", body = crate::documentation::ErrorResponse)
    )
)]
pub async fn reject_request(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(body): Json<RejectRequest>,
) -> Result<Json<ApprovalRequest>, AppError> {
    Ok(Json(state.orchestrator.reject(id, &body.actor, body.reason)?))
}

#[utoipa::path(
    get,
    path = "/v1/workflows",
    tag = "workflows",
    params(WorkflowsQuery),
    responses(
        (status = 200, description = "Workflow definitions", body = Vec<WorkflowDefinition>),
        (status = 400, description = "Invalid filter parameters", body = crate::documentation::ErrorResponse)
    )
)]
/// List workflow definitions. When `level` and `role` are supplied, the
/// list is filtered down to workflows that authority could approve.
pub async fn list_workflows(
    State(state): State<Arc<AppState>>,
    Query(query): Query<WorkflowsQuery>,
) -> Result<Json<Vec<WorkflowDefinition>>, AppError> {
    if let (Some(level), Some(role_name)) = (query.level, query.role.as_deref()) {
        let role = Role::from_str(role_name).map_err(AppError::InvalidInput)?;
        let permissions = match query.permissions.as_deref() {
            Some(names) => names
                .split(',')
                .filter(|s| !s.trim().is_empty())
                .map(parse_permission)
                .collect::<Result<Vec<_>, _>>()?,
            None => role.base_permissions().to_vec(),
        };
        return Ok(Json(state.orchestrator.user_approvable_workflows(
            level,
            role,
            &permissions,
        )));
    }

    let mut all: Vec<WorkflowDefinition> =
        state.engine.registry().iter().cloned().collect();
    all.sort_by_key(|def| def.action.as_str());
    Ok(Json(all))
}

#[utoipa::path(
    get,
    path = "/v1/workflows/{action}/risk",
    tag = "workflows",
    params(("action" = String, Path, description = "Workflow action name")),
    responses(
        (status = 200, description = "Risk assessment; unknown actions are assessed at medium risk", body = WorkflowRiskResponse)
    )
)]
pub async fn workflow_risk(
    State(state): State<Arc<AppState>>,
    Path(action): Path<String>,
) -> Json<WorkflowRiskResponse> {
    let def = state.engine.registry().get_by_name(&action);
    Json(WorkflowRiskResponse {
        action,
        assessment: advisor::risk_assessment(def),
        estimated_approval_time: advisor::estimated_approval_time(def).to_string(),
    })
}

#[utoipa::path(
    get,
    path = "/v1/workflows/{action}/notifications",
    tag = "workflows",
    params(("action" = String, Path, description = "Workflow action name")),
    responses(
        (status = 200, description = "Notification policy for the workflow", body = NotificationSettings)
    )
)]
pub async fn workflow_notifications(
    State(state): State<Arc<AppState>>,
    Path(action): Path<String>,
) -> Json<NotificationSettings> {
    let def = state.engine.registry().get_by_name(&action);
    Json(advisor::notification_settings(def))
}

#[utoipa::path(
    get,
    path = "/v1/workflows/{action}/template",
    tag = "workflows",
    params(("action" = String, Path, description = "Workflow action name")),
    responses(
        (status = 200, description = "Request skeleton with mandatory fields pre-filled"),
        (status = 404, description = "Unknown workflow", body = crate::documentation::ErrorResponse)
    )
)]
pub async fn workflow_template(
    State(state): State<Arc<AppState>>,
    Path(action): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    state
        .orchestrator
        .request_template(&action)
        .map(Json)
        .ok_or(AppError::WorkflowNotFound { action })
}

#[utoipa::path(
    post,
    path = "/v1/tokens/{id}/revoke",
    tag = "tokens",
    params(("id" = Uuid, Path, description = "Token id")),
    request_body = Approver,
    responses(
        (status = 200, description = "Token revoked", body = TemporaryAccessToken),
        (status = 403, description = "Insufficient authority", body = crate::documentation::ErrorResponse),
        (status = 404, description = "Unknown token", body = crate::documentation::ErrorResponse)
    )
)]
/// Revoke a temporary access token. Takes effect on the next decision:
/// the cache is dropped along with the grant.
pub async fn revoke_token(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(actor): Json<Approver>,
) -> Result<Json<TemporaryAccessToken>, AppError> {
    Ok(Json(state.orchestrator.revoke_token(id, &actor).await?))
}

#[utoipa::path(
    get,
    path = "/health",
    tag = "health",
    responses(
        (status = 200, description = "Service is healthy", body = crate::documentation::HealthCheckResponse)
    )
)]
pub async fn health_check() -> Json<crate::documentation::HealthCheckResponse> {
    Json(crate::documentation::HealthCheckResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}

#[utoipa::path(
    get,
    path = "/metrics",
    tag = "metrics",
    responses(
        (status = 200, description = "Prometheus metrics", content_type = "text/plain"),
        (status = 500, description = "Failed to gather metrics")
    )
)]
pub async fn get_metrics() -> impl IntoResponse {
    crate::metrics::access_metrics_handler().await
}
