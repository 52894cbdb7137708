//! Approval Workflow Orchestrator: request lifecycle, dual approval, and
//! token minting.
//!
//! Requests live in a concurrent map and every status transition happens
//! under the map's exclusive entry guard, so two racing approvers cannot
//! both complete a request: exactly one observes the quorum being reached
//! and mints the token.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{info, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::advisor;
use crate::audit::AuditLogger;
use crate::cache::DecisionCache;
use crate::errors::AppError;
use crate::metrics::AccessMetricsHelper;
use crate::models::{
    ApprovalRecord, ApprovalRequest, ApprovalStatus, NotificationSettings, Permission, Role,
    TemporaryAccessToken, ValidationReport, WorkflowAction, WorkflowDefinition,
};
use crate::notifications::{MfaService, NotificationDispatcher};
use crate::registry::PolicyRegistry;

/// How long a request may sit unapproved before it lapses.
const PENDING_WINDOW: Duration = Duration::hours(72);

const JUSTIFICATION_MIN: usize = 10;
const JUSTIFICATION_MAX: usize = 1000;

/// Shared store of minted temporary access tokens and their revocation
/// state. The decision engine consults it on every evaluation, so a
/// revocation recorded here is visible to the next decision immediately.
pub struct TokenStore {
    tokens: DashMap<Uuid, TemporaryAccessToken>,
    revoked: DashMap<Uuid, DateTime<Utc>>,
}

impl TokenStore {
    pub fn new() -> Self {
        Self { tokens: DashMap::new(), revoked: DashMap::new() }
    }

    pub fn insert(&self, token: TemporaryAccessToken) {
        self.tokens.insert(token.id, token);
    }

    pub fn get(&self, id: Uuid) -> Option<TemporaryAccessToken> {
        self.tokens.get(&id).map(|t| t.clone())
    }

    pub fn is_revoked(&self, id: Uuid) -> bool {
        self.revoked.contains_key(&id)
    }

    pub fn mark_revoked(&self, id: Uuid) {
        let now = Utc::now();
        self.revoked.insert(id, now);
        if let Some(mut token) = self.tokens.get_mut(&id) {
            if token.revoked_at.is_none() {
                token.revoked_at = Some(now);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

impl Default for TokenStore {
    fn default() -> Self {
        Self::new()
    }
}

/// The authenticated identity acting on a request.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Approver {
    pub id: String,
    pub role: Role,
    pub level: u8,
    #[serde(default)]
    pub permissions: Vec<Permission>,
}

/// Payload for opening a new approval request.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CreateApprovalRequest {
    pub action: String,
    pub requested_by: String,
    pub justification: String,
    pub requested_action: Value,
    #[serde(default)]
    pub ttl_hours: Option<u32>,
    #[serde(default)]
    pub regions: Vec<String>,
}

/// What an approval call returns: the request as it now stands, plus the
/// token when this approval completed the quorum.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ApprovalOutcome {
    pub request: ApprovalRequest,
    pub token: Option<TemporaryAccessToken>,
}

pub struct ApprovalOrchestrator {
    registry: Arc<PolicyRegistry>,
    requests: DashMap<Uuid, ApprovalRequest>,
    tokens: Arc<TokenStore>,
    decision_cache: Arc<DecisionCache>,
    audit: Arc<dyn AuditLogger>,
    notifier: Arc<dyn NotificationDispatcher>,
    mfa: Arc<dyn MfaService>,
}

impl ApprovalOrchestrator {
    pub fn new(
        registry: Arc<PolicyRegistry>,
        tokens: Arc<TokenStore>,
        decision_cache: Arc<DecisionCache>,
        audit: Arc<dyn AuditLogger>,
        notifier: Arc<dyn NotificationDispatcher>,
        mfa: Arc<dyn MfaService>,
    ) -> Self {
        Self {
            registry,
            requests: DashMap::new(),
            tokens,
            decision_cache,
            audit,
            notifier,
            mfa,
        }
    }

    pub fn tokens(&self) -> &TokenStore {
        &self.tokens
    }

    /// Validate a request payload without creating anything. All problems
    /// are itemized; validation never throws.
    pub fn validate_request(&self, body: &CreateApprovalRequest) -> ValidationReport {
        let mut errors = Vec::new();

        if body.requested_by.trim().is_empty() {
            errors.push("requested_by must not be empty".to_string());
        }

        let justification = body.justification.trim();
        if justification.len() < JUSTIFICATION_MIN {
            errors.push(format!(
                "justification must be at least {JUSTIFICATION_MIN} characters"
            ));
        } else if justification.len() > JUSTIFICATION_MAX {
            errors.push(format!(
                "justification must not exceed {JUSTIFICATION_MAX} characters"
            ));
        }

        let Some(def) = self.registry.get_by_name(&body.action) else {
            errors.push(format!("unknown workflow action: {}", body.action));
            return ValidationReport::from_errors(errors);
        };

        match body.ttl_hours {
            Some(0) => errors.push("ttl_hours must be greater than zero".to_string()),
            Some(hours) if u64::from(hours) * 3600 > def.max_ttl_seconds => {
                errors.push(format!(
                    "ttl_hours exceeds the maximum of {} hours for {}",
                    def.max_ttl_seconds / 3600,
                    def.action
                ));
            }
            _ => {}
        }

        match body.requested_action.as_object() {
            None => errors.push("requested_action must be a JSON object".to_string()),
            Some(obj) => {
                if let Some(inner) = obj.get("action") {
                    if inner.as_str() != Some(def.action.as_str()) {
                        errors.push(
                            "requested_action.action must match the request action".to_string(),
                        );
                    }
                }
                for field in &def.required_fields {
                    if obj.get(field).map_or(true, Value::is_null) {
                        errors.push(format!("requested_action missing required field: {field}"));
                    }
                }
            }
        }

        ValidationReport::from_errors(errors)
    }

    /// Create a request and put it in front of approvers. Invalid payloads
    /// come back as the itemized report, not an error.
    pub fn create_request(
        &self,
        body: CreateApprovalRequest,
    ) -> Result<ApprovalRequest, ValidationReport> {
        let report = self.validate_request(&body);
        if !report.valid {
            return Err(report);
        }
        // Parse cannot fail: validation resolved the action.
        let action: WorkflowAction = body.action.parse().map_err(|_| report)?;
        let def = self.registry.get(action);

        let now = Utc::now();
        let request = ApprovalRequest {
            id: Uuid::new_v4(),
            action,
            requested_by: body.requested_by,
            justification: body.justification,
            requested_action: body.requested_action,
            ttl_hours: body.ttl_hours,
            regions: body.regions,
            status: ApprovalStatus::PendingApproval,
            approvals: Vec::new(),
            created_at: now,
            pending_until: now + PENDING_WINDOW,
            resolved_at: None,
            issued_token: None,
            rejection_reason: None,
        };
        self.requests.insert(request.id, request.clone());

        self.audit
            .log_approval_action("created", &request, &request.requested_by);
        AccessMetricsHelper::record_approval_transition(action.as_str(), "pending_approval");

        let settings = advisor::notification_settings(def);
        if settings.notify_on_request {
            self.dispatch(
                &settings,
                "approval_requested",
                json!({
                    "request_id": request.id,
                    "action": action.as_str(),
                    "requested_by": request.requested_by,
                }),
            );
        }
        info!(request_id = %request.id, workflow = %action, "approval request created");
        Ok(request)
    }

    pub fn get_request(&self, id: Uuid) -> Option<ApprovalRequest> {
        self.requests.get(&id).map(|r| r.clone())
    }

    /// Record one approval. Repeat calls by the same approver are
    /// idempotent; the transition to `Approved` and the token mint happen
    /// exactly once, under the request's exclusive entry guard.
    pub fn approve(&self, id: Uuid, approver: &Approver) -> Result<ApprovalOutcome, AppError> {
        let now = Utc::now();
        let mut entry = self
            .requests
            .get_mut(&id)
            .ok_or_else(|| AppError::RequestNotFound { id: id.to_string() })?;
        let request = entry.value_mut();

        if request.status == ApprovalStatus::PendingApproval && now >= request.pending_until {
            request.status = ApprovalStatus::Expired;
            request.resolved_at = Some(now);
            AccessMetricsHelper::record_approval_transition(request.action.as_str(), "expired");
        }
        if request.status != ApprovalStatus::PendingApproval {
            return Err(AppError::InvalidStatusTransition {
                current: status_label(request.status).to_string(),
                attempted: "approved".to_string(),
            });
        }

        let def = self
            .registry
            .get(request.action)
            .ok_or_else(|| AppError::WorkflowNotFound {
                action: request.action.to_string(),
            })?;

        if approver.id == request.requested_by {
            return Err(AppError::NotEligible {
                reason: "requester cannot approve their own request".to_string(),
            });
        }
        if !eligible(def, approver.level, approver.role, &approver.permissions) {
            return Err(AppError::NotEligible {
                reason: format!(
                    "approver does not meet the requirements for {}",
                    def.action
                ),
            });
        }

        if def.mfa_required_for_approval {
            let challenge =
                self.mfa
                    .create_challenge(&approver.id, "totp", def.action.as_str());
            info!(
                challenge_id = %challenge.id,
                approver_id = %approver.id,
                "mfa challenge required before approval takes effect"
            );
        }

        // Idempotent per approver: a repeated call changes nothing.
        if request
            .approvals
            .iter()
            .any(|a| a.approver_id == approver.id)
        {
            let snapshot = request.clone();
            drop(entry);
            let token = snapshot.issued_token.and_then(|tid| self.tokens.get(tid));
            return Ok(ApprovalOutcome { request: snapshot, token });
        }

        request.approvals.push(ApprovalRecord {
            approver_id: approver.id.clone(),
            approver_role: approver.role,
            approver_level: approver.level,
            approved_at: now,
        });

        let mut minted = None;
        if request.approvals.len() >= def.required_approvals() {
            request.status = ApprovalStatus::Approved;
            request.resolved_at = Some(now);

            let requested_secs = request
                .ttl_hours
                .map(|h| u64::from(h) * 3600)
                .unwrap_or(def.default_ttl_seconds);
            let ttl_secs = requested_secs.min(def.max_ttl_seconds);
            let token = TemporaryAccessToken {
                id: Uuid::new_v4(),
                workflow: request.action,
                granted_permissions: def.auto_grant_permissions.clone(),
                granted_regions: request.regions.clone(),
                requested_by: request.requested_by.clone(),
                justification: request.justification.clone(),
                granted_by_level: approver.level,
                issued_at: now,
                expires_at: now + Duration::seconds(ttl_secs as i64),
                revoked_at: None,
            };
            request.issued_token = Some(token.id);
            minted = Some(token);
        }

        let snapshot = request.clone();
        drop(entry);

        if let Some(token) = &minted {
            self.tokens.insert(token.clone());
            AccessMetricsHelper::record_token_issued(snapshot.action.as_str());
        }

        self.audit
            .log_approval_action("approved", &snapshot, &approver.id);
        let settings = advisor::notification_settings(Some(def));
        if snapshot.status == ApprovalStatus::Approved {
            AccessMetricsHelper::record_approval_transition(snapshot.action.as_str(), "approved");
            if settings.notify_on_approval {
                self.dispatch(
                    &settings,
                    "approval_granted",
                    json!({
                        "request_id": snapshot.id,
                        "action": snapshot.action.as_str(),
                        "token_id": snapshot.issued_token,
                    }),
                );
            }
        } else {
            self.dispatch(
                &settings,
                "approval_recorded",
                json!({
                    "request_id": snapshot.id,
                    "action": snapshot.action.as_str(),
                    "approvals": snapshot.approvals.len(),
                    "required": def.required_approvals(),
                }),
            );
        }

        Ok(ApprovalOutcome { request: snapshot, token: minted })
    }

    /// Reject a pending request. The requester may withdraw their own
    /// request; anyone else must be an eligible approver.
    pub fn reject(
        &self,
        id: Uuid,
        actor: &Approver,
        reason: Option<String>,
    ) -> Result<ApprovalRequest, AppError> {
        let now = Utc::now();
        let mut entry = self
            .requests
            .get_mut(&id)
            .ok_or_else(|| AppError::RequestNotFound { id: id.to_string() })?;
        let request = entry.value_mut();

        if request.status == ApprovalStatus::PendingApproval && now >= request.pending_until {
            request.status = ApprovalStatus::Expired;
            request.resolved_at = Some(now);
            AccessMetricsHelper::record_approval_transition(request.action.as_str(), "expired");
        }
        if request.status != ApprovalStatus::PendingApproval {
            return Err(AppError::InvalidStatusTransition {
                current: status_label(request.status).to_string(),
                attempted: "rejected".to_string(),
            });
        }

        let def = self
            .registry
            .get(request.action)
            .ok_or_else(|| AppError::WorkflowNotFound {
                action: request.action.to_string(),
            })?;
        let is_requester = actor.id == request.requested_by;
        if !is_requester && !eligible(def, actor.level, actor.role, &actor.permissions) {
            return Err(AppError::NotEligible {
                reason: format!("actor may not reject requests for {}", def.action),
            });
        }

        request.status = ApprovalStatus::Rejected;
        request.resolved_at = Some(now);
        request.rejection_reason = reason;

        let snapshot = request.clone();
        drop(entry);

        self.audit.log_approval_action("rejected", &snapshot, &actor.id);
        AccessMetricsHelper::record_approval_transition(snapshot.action.as_str(), "rejected");
        let settings = advisor::notification_settings(Some(def));
        if settings.notify_on_rejection {
            self.dispatch(
                &settings,
                "approval_rejected",
                json!({
                    "request_id": snapshot.id,
                    "action": snapshot.action.as_str(),
                    "rejected_by": actor.id,
                    "reason": snapshot.rejection_reason,
                }),
            );
        }
        Ok(snapshot)
    }

    /// Lapse every pending request whose window has passed. Returns how
    /// many were expired.
    pub fn expire_stale(&self, now: DateTime<Utc>) -> usize {
        let mut expired = 0;
        for mut entry in self.requests.iter_mut() {
            let request = entry.value_mut();
            if request.status == ApprovalStatus::PendingApproval && now >= request.pending_until {
                request.status = ApprovalStatus::Expired;
                request.resolved_at = Some(now);
                AccessMetricsHelper::record_approval_transition(
                    request.action.as_str(),
                    "expired",
                );
                warn!(request_id = %request.id, workflow = %request.action, "approval request expired");
                expired += 1;
            }
        }
        expired
    }

    /// Whether a user with the given authority could approve requests for
    /// `action`. Unknown actions are never approvable.
    pub fn can_user_approve_workflow(
        &self,
        level: u8,
        role: Role,
        permissions: &[Permission],
        action: &str,
    ) -> bool {
        self.registry
            .get_by_name(action)
            .is_some_and(|def| eligible(def, level, role, permissions))
    }

    /// Workflows the given authority could approve, sorted by action name.
    pub fn user_approvable_workflows(
        &self,
        level: u8,
        role: Role,
        permissions: &[Permission],
    ) -> Vec<WorkflowDefinition> {
        let mut out: Vec<WorkflowDefinition> = self
            .registry
            .iter()
            .filter(|def| eligible(def, level, role, permissions))
            .cloned()
            .collect();
        out.sort_by_key(|def| def.action.as_str());
        out
    }

    /// Pre-filled request skeleton for a workflow, with one placeholder per
    /// mandatory field.
    pub fn request_template(&self, action: &str) -> Option<Value> {
        let def = self.registry.get_by_name(action)?;
        let mut fields = serde_json::Map::new();
        fields.insert("action".to_string(), json!(def.action.as_str()));
        for field in &def.required_fields {
            fields.insert(field.clone(), field_placeholder(field));
        }
        Some(json!({
            "action": def.action.as_str(),
            "justification": "",
            "ttl_hours": Value::Null,
            "regions": [],
            "requested_action": Value::Object(fields),
        }))
    }

    /// Revoke a minted token. Requires authority at or above the level that
    /// granted it; takes effect immediately because the decision cache is
    /// dropped wholesale.
    pub async fn revoke_token(
        &self,
        token_id: Uuid,
        actor: &Approver,
    ) -> Result<TemporaryAccessToken, AppError> {
        let token = self
            .tokens
            .get(token_id)
            .ok_or_else(|| AppError::TokenNotFound { id: token_id.to_string() })?;
        if token.revoked_at.is_some() {
            return Ok(token);
        }
        if actor.level < token.granted_by_level {
            return Err(AppError::NotEligible {
                reason: format!(
                    "revocation requires authority level {} or higher",
                    token.granted_by_level
                ),
            });
        }

        self.tokens.mark_revoked(token_id);
        self.decision_cache.clear().await;

        let revoked = self
            .tokens
            .get(token_id)
            .ok_or_else(|| AppError::internal("token vanished during revocation"))?;
        info!(
            token_id = %token_id,
            workflow = %revoked.workflow,
            revoked_by = %actor.id,
            "temporary access token revoked"
        );
        Ok(revoked)
    }

    fn dispatch(&self, settings: &NotificationSettings, template: &str, payload: Value) {
        for channel in &settings.notification_channels {
            self.notifier.send(*channel, template, &payload);
        }
    }
}

fn eligible(def: &WorkflowDefinition, level: u8, role: Role, permissions: &[Permission]) -> bool {
    if level < def.required_level {
        return false;
    }
    let wildcard = permissions.contains(&Permission::Wildcard);
    let role_ok = def.required_roles.contains(&role) || wildcard;
    let permission_ok = wildcard
        || def
            .required_permissions
            .iter()
            .any(|p| permissions.contains(p));
    role_ok && permission_ok
}

fn status_label(status: ApprovalStatus) -> &'static str {
    match status {
        ApprovalStatus::Draft => "draft",
        ApprovalStatus::Validated => "validated",
        ApprovalStatus::PendingApproval => "pending_approval",
        ApprovalStatus::Approved => "approved",
        ApprovalStatus::Rejected => "rejected",
        ApprovalStatus::Expired => "expired",
    }
}

fn field_placeholder(field: &str) -> Value {
    if field.ends_with("_ids") {
        json!([])
    } else if field == "amount" {
        json!(0)
    } else if field == "time_range" {
        json!({ "from": "", "to": "" })
    } else {
        json!("")
    }
}

/// Periodic sweep lapsing stale pending requests.
pub async fn start_expiry_sweep(
    orchestrator: Arc<ApprovalOrchestrator>,
    interval: std::time::Duration,
) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        ticker.tick().await;
        let expired = orchestrator.expire_stale(Utc::now());
        if expired > 0 {
            info!(expired, "expired stale approval requests");
        }
    }
}
