//! Audit logging boundary.
//!
//! The console's audit pipeline is an external collaborator; in-process we
//! emit structured tracing events that the log shipper picks up. The trait
//! seam lets deployments plug in a real sink.

use crate::models::{AccessDecision, ApprovalRequest};

pub trait AuditLogger: Send + Sync {
    fn log_decision(&self, user_id: &str, permission: &str, decision: &AccessDecision);
    fn log_approval_action(&self, action: &str, request: &ApprovalRequest, actor_id: &str);
}

/// Default sink: structured tracing events with stable field names.
pub struct TracingAuditLogger;

impl AuditLogger for TracingAuditLogger {
    fn log_decision(&self, user_id: &str, permission: &str, decision: &AccessDecision) {
        tracing::info!(
            decision_id = %decision.decision_id,
            user_id = %user_id,
            permission = %permission,
            allowed = decision.allowed,
            reason = %decision.reason,
            requires_mfa = decision.requires_mfa,
            applied_policies = ?decision.applied_policies,
            "access decision"
        );
    }

    fn log_approval_action(&self, action: &str, request: &ApprovalRequest, actor_id: &str) {
        tracing::info!(
            request_id = %request.id,
            workflow = %request.action,
            status = ?request.status,
            actor_id = %actor_id,
            approvals = request.approvals.len(),
            "approval {action}"
        );
    }
}
