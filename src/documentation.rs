#![allow(clippy::needless_for_each)]

use utoipa::{
    openapi::security::{ApiKey, ApiKeyValue, Http, HttpAuthScheme, SecurityScheme},
    Modify, OpenApi,
};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Xpress Access Service API",
        version = "1.0.0",
        description = "Authorization decision engine and approval workflow orchestrator for the Xpress ops console",
        contact(
            name = "Platform Security Team",
            email = "security@xpress.example.com"
        )
    ),
    servers(
        (url = "http://localhost:8082", description = "Local development server"),
        (url = "https://access.internal.example.com", description = "Internal production server")
    ),
    paths(
        crate::handlers::evaluate_access,
        crate::handlers::validate_vehicle_permissions,
        crate::handlers::effective_vehicle_permissions,
        crate::handlers::create_approval_request,
        crate::handlers::get_approval_request,
        crate::handlers::approve_request,
        crate::handlers::reject_request,
        crate::handlers::list_workflows,
        crate::handlers::workflow_risk,
        crate::handlers::workflow_notifications,
        crate::handlers::workflow_template,
        crate::handlers::revoke_token,
        crate::handlers::health_check,
        crate::handlers::get_metrics,
    ),
    components(
        schemas(
            crate::handlers::EvaluateAccessRequest,
            crate::handlers::VehiclePermissionRequest,
            crate::handlers::RejectRequest,
            crate::handlers::WorkflowRiskResponse,
            crate::engine::VehiclePermissionCheck,
            crate::models::AccessContext,
            crate::models::AccessDecision,
            crate::models::ApprovalRecord,
            crate::models::ApprovalRequest,
            crate::models::ApprovalStatus,
            crate::models::DataClass,
            crate::models::NotificationChannel,
            crate::models::NotificationSettings,
            crate::models::OwnershipAccessLevel,
            crate::models::OwnershipType,
            crate::models::Permission,
            crate::models::PiiScope,
            crate::models::RiskAssessment,
            crate::models::Role,
            crate::models::RoleAssignment,
            crate::models::SensitivityLevel,
            crate::models::TemporaryAccessToken,
            crate::models::User,
            crate::models::ValidationReport,
            crate::models::WorkflowAction,
            crate::models::WorkflowDefinition,
            crate::workflow::ApprovalOutcome,
            crate::workflow::Approver,
            crate::workflow::CreateApprovalRequest,
            HealthCheckResponse,
            ErrorResponse,
            ErrorDetails,
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "access", description = "Access decision operations"),
        (name = "approvals", description = "Approval request lifecycle"),
        (name = "workflows", description = "Workflow registry and advisors"),
        (name = "tokens", description = "Temporary access token management"),
        (name = "health", description = "Health check operations"),
        (name = "metrics", description = "Metrics operations")
    )
)]
pub struct ApiDoc;

pub struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "api_key",
                SecurityScheme::ApiKey(ApiKey::Header(ApiKeyValue::new("X-API-Key"))),
            );
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(Http::new(HttpAuthScheme::Bearer)),
            );
        }
    }
}

#[derive(serde::Serialize, serde::Deserialize, utoipa::ToSchema)]
pub struct HealthCheckResponse {
    pub status: String,
    pub version: String,
    pub timestamp: String,
}

#[derive(serde::Serialize, serde::Deserialize, utoipa::ToSchema)]
pub struct ErrorResponse {
    pub error: ErrorDetails,
}

#[derive(serde::Serialize, serde::Deserialize, utoipa::ToSchema)]
pub struct ErrorDetails {
    #[schema(example = "invalid_input")]
    pub r#type: String,
    #[schema(example = "The provided input is invalid")]
    pub message: String,
    #[schema(example = 400)]
    pub status: u16,
}
