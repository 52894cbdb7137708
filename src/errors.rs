use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Service error taxonomy. Authorization denials and request validation
/// failures are returned as data, never as these errors; what lands here is
/// either a caller defect (bad input, missing resource) or a deployment
/// defect (broken configuration).
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error in {field}: {reason}")]
    Config { field: String, reason: String },

    #[error("Workflow not found: {action}")]
    WorkflowNotFound { action: String },

    #[error("Approval request not found: {id}")]
    RequestNotFound { id: String },

    #[error("Token not found: {id}")]
    TokenNotFound { id: String },

    #[error("Invalid status transition from {current} to {attempted}")]
    InvalidStatusTransition { current: String, attempted: String },

    #[error("Actor not eligible: {reason}")]
    NotEligible { reason: String },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Internal error: {context}")]
    Internal { context: String },
}

impl AppError {
    pub fn config(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Config { field: field.into(), reason: reason.into() }
    }

    pub fn internal(context: impl Into<String>) -> Self {
        Self::Internal { context: context.into() }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::WorkflowNotFound { .. }
            | AppError::RequestNotFound { .. }
            | AppError::TokenNotFound { .. } => StatusCode::NOT_FOUND,
            AppError::InvalidStatusTransition { .. } => StatusCode::CONFLICT,
            AppError::NotEligible { .. } => StatusCode::FORBIDDEN,
            AppError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            AppError::Config { .. } | AppError::Internal { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    pub fn error_type(&self) -> &'static str {
        match self {
            AppError::Config { .. } => "configuration_error",
            AppError::WorkflowNotFound { .. } => "workflow_not_found",
            AppError::RequestNotFound { .. } => "request_not_found",
            AppError::TokenNotFound { .. } => "token_not_found",
            AppError::InvalidStatusTransition { .. } => "invalid_status_transition",
            AppError::NotEligible { .. } => "not_eligible",
            AppError::InvalidInput(_) => "invalid_input",
            AppError::Internal { .. } => "internal_error",
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(json!({
            "error": {
                "type": self.error_type(),
                "message": self.to_string(),
                "status": status.as_u16(),
            }
        }));
        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_follow_error_class() {
        assert_eq!(
            AppError::WorkflowNotFound { action: "x".into() }.status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            AppError::NotEligible { reason: "level".into() }.status_code(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            AppError::config("registry", "bad ttl").status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            AppError::InvalidStatusTransition {
                current: "approved".into(),
                attempted: "pending_approval".into()
            }
            .status_code(),
            StatusCode::CONFLICT
        );
    }
}
