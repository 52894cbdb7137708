//! Access Decision Engine: the central RBAC+ABAC policy evaluator.
//!
//! `evaluate_access` never fails for an ordinary denial; a denial is a
//! normal return value with a stable reason code. The engine operates on the
//! user snapshot taken at call entry, so permission changes mid-evaluation
//! cannot affect an in-flight decision. The public surface is async (real
//! deployments sit in front of remote stores); the policy math itself is
//! synchronous and separately testable.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::advisor;
use crate::audit::AuditLogger;
use crate::cache::{decision_fingerprint, DecisionCache};
use crate::metrics::AccessMetricsHelper;
use crate::models::{
    AccessContext, AccessDecision, DataClass, OwnershipAccessLevel, OwnershipType, Permission,
    PiiScope, Role, User,
};
use crate::regions::{self, RegionStore};
use crate::registry::PolicyRegistry;
use crate::workflow::TokenStore;

/// How long emergency access stays usable after it was granted.
const EMERGENCY_GRACE: Duration = Duration::hours(24);

/// Result of checking a caller against a set of required vehicle
/// permissions.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct VehiclePermissionCheck {
    pub valid: bool,
    pub missing_permissions: Vec<Permission>,
}

pub struct AccessDecisionEngine {
    registry: Arc<PolicyRegistry>,
    regions: Arc<RegionStore>,
    cache: Arc<DecisionCache>,
    tokens: Arc<TokenStore>,
    audit: Arc<dyn AuditLogger>,
}

impl AccessDecisionEngine {
    pub fn new(
        registry: Arc<PolicyRegistry>,
        regions: Arc<RegionStore>,
        cache: Arc<DecisionCache>,
        tokens: Arc<TokenStore>,
        audit: Arc<dyn AuditLogger>,
    ) -> Self {
        Self { registry, regions, cache, tokens, audit }
    }

    pub fn registry(&self) -> &PolicyRegistry {
        &self.registry
    }

    /// Evaluate whether `user` may exercise `permission` under `context`.
    pub async fn evaluate_access(
        &self,
        user: &User,
        permission: Permission,
        context: &AccessContext,
    ) -> AccessDecision {
        let started = Instant::now();
        let fingerprint = decision_fingerprint(user, permission, context);

        if let Some(decision) = self.cache.get(&fingerprint).await {
            AccessMetricsHelper::record_cache_lookup("hit");
            AccessMetricsHelper::record_decision(&decision, started.elapsed());
            self.audit.log_decision(&user.id, permission.as_str(), &decision);
            return decision;
        }
        AccessMetricsHelper::record_cache_lookup("miss");

        let decision = self.evaluate_policy(user, permission, context, Utc::now());
        self.cache.put(fingerprint, decision.clone()).await;

        AccessMetricsHelper::record_decision(&decision, started.elapsed());
        self.audit.log_decision(&user.id, permission.as_str(), &decision);
        decision
    }

    /// The synchronous evaluation pipeline. Each check either short-circuits
    /// to a denial or appends the policy it applied to the audit trail.
    pub(crate) fn evaluate_policy(
        &self,
        user: &User,
        permission: Permission,
        context: &AccessContext,
        now: DateTime<Utc>,
    ) -> AccessDecision {
        let mut applied = vec!["snapshot_permissions".to_string()];
        let mut requires_mfa = false;

        // 1. Role validity.
        if user.roles.is_empty() {
            return AccessDecision::denied("no_roles_assigned", applied);
        }
        let valid_roles: Vec<_> = user.valid_roles_at(now).collect();
        if valid_roles.is_empty() {
            let reason = if user.roles.iter().any(|r| r.is_expired_at(now)) {
                "role_expired"
            } else {
                "role_inactive"
            };
            return AccessDecision::denied(reason, applied);
        }
        applied.push("role_validity".to_string());

        // 2. Permission match: role permission sets, wildcard, or an active
        //    temporary token grant.
        let role_permissions: HashSet<Permission> = valid_roles
            .iter()
            .flat_map(|r| r.role.base_permissions().iter().copied())
            .collect();
        let token_permissions: HashSet<Permission> = user
            .active_tokens
            .iter()
            .filter(|t| t.is_active_at(now) && !self.tokens.is_revoked(t.id))
            .flat_map(|t| t.granted_permissions.iter().copied())
            .collect();

        if role_permissions.contains(&permission) {
            applied.push("rbac_permission_match".to_string());
        } else if role_permissions.contains(&Permission::Wildcard) {
            applied.push("wildcard_permission".to_string());
        } else if token_permissions.contains(&permission)
            || token_permissions.contains(&Permission::Wildcard)
        {
            applied.push("temporary_token_grant".to_string());
        } else {
            return AccessDecision::denied("permission_denied", applied);
        }

        // Emergency override: only valid with a well-formed case id and
        // inside the grace window.
        if context.emergency_override {
            let case_ok = context
                .case_id
                .as_deref()
                .is_some_and(is_valid_emergency_case_id);
            if !case_ok {
                return AccessDecision::denied("invalid_emergency_case", applied);
            }
            let Some(granted_at) = context.emergency_granted_at else {
                return AccessDecision::denied("invalid_emergency_case", applied);
            };
            if now - granted_at > EMERGENCY_GRACE {
                return AccessDecision::denied("emergency_access_expired", applied);
            }
            applied.push("emergency_override".to_string());
            requires_mfa = true;
        }

        // 3. Regional scoping.
        if let Some(region) = context.region.as_deref() {
            let resolution = regions::resolve(&self.regions, user, region, context, now);
            if !resolution.allowed {
                return AccessDecision::denied(resolution.reason, applied);
            }
            applied.push(format!("region:{}", resolution.reason));
            requires_mfa |= resolution.requires_mfa;
        }

        // 4. Ownership-type data partitioning.
        let mut ownership_access_level = OwnershipAccessLevel::None;
        if let Some(ownership) = context.ownership_type {
            ownership_access_level = valid_roles
                .iter()
                .map(|r| ownership_access(r.role, ownership))
                .max()
                .unwrap_or(OwnershipAccessLevel::None);
            if ownership_access_level == OwnershipAccessLevel::None {
                return AccessDecision::denied("ownership_access_denied", applied);
            }
            applied.push("ownership_scope".to_string());
        }

        // 5. PII / data classification.
        let mut masked_fields = Vec::new();
        if context.contains_pii {
            match user.pii_scope {
                PiiScope::None => {
                    return AccessDecision::denied("pii_access_denied", applied);
                }
                PiiScope::Masked => {
                    masked_fields = advisor::masked_fields(context.data_class, PiiScope::Masked);
                    applied.push("pii_masking".to_string());
                }
                PiiScope::Full => {
                    applied.push("pii_full_scope".to_string());
                }
            }
        }

        // 6. MFA determination. Asking to skip MFA is itself a violation.
        if context.skip_mfa {
            return AccessDecision::denied("mfa_bypass_attempt_detected", applied);
        }
        requires_mfa |=
            context.data_class == Some(DataClass::Restricted) || permission.requires_mfa();
        if requires_mfa {
            applied.push("mfa_required".to_string());
        }

        // 7. Audit obligations.
        applied.push("audit_required".to_string());
        if permission.is_sensitive()
            || context.data_class >= Some(DataClass::Confidential)
        {
            applied.push("enhanced_audit".to_string());
        }

        AccessDecision {
            allowed: true,
            reason: "access_granted".to_string(),
            applied_policies: applied,
            requires_mfa,
            masked_fields,
            ownership_access_level,
            audit_required: true,
            decision_id: Uuid::new_v4(),
        }
    }

    /// The union of role-derived and token-granted permissions, active at
    /// `now`. Wildcard is reported as-is, not expanded.
    pub fn effective_vehicle_permissions(&self, user: &User) -> Vec<Permission> {
        let now = Utc::now();
        let mut permissions: HashSet<Permission> = user
            .valid_roles_at(now)
            .flat_map(|r| r.role.base_permissions().iter().copied())
            .collect();
        permissions.extend(
            user.active_tokens
                .iter()
                .filter(|t| t.is_active_at(now) && !self.tokens.is_revoked(t.id))
                .flat_map(|t| t.granted_permissions.iter().copied()),
        );
        let mut sorted: Vec<Permission> = permissions.into_iter().collect();
        sorted.sort_by_key(|p| p.as_str());
        sorted
    }

    pub fn validate_vehicle_permissions(
        &self,
        user: &User,
        required: &[Permission],
    ) -> VehiclePermissionCheck {
        let effective: HashSet<Permission> =
            self.effective_vehicle_permissions(user).into_iter().collect();
        if effective.contains(&Permission::Wildcard) {
            return VehiclePermissionCheck { valid: true, missing_permissions: Vec::new() };
        }
        let missing_permissions: Vec<Permission> = required
            .iter()
            .copied()
            .filter(|p| !effective.contains(p))
            .collect();
        VehiclePermissionCheck { valid: missing_permissions.is_empty(), missing_permissions }
    }
}

/// Role-to-ownership access matrix: how deep each role sees into each
/// ownership partition.
fn ownership_access(role: Role, ownership: OwnershipType) -> OwnershipAccessLevel {
    use OwnershipAccessLevel as L;
    use OwnershipType as O;
    match (role, ownership) {
        (Role::Executive, O::XpressOwned) => L::Full,
        (Role::Executive, _) => L::Detailed,
        (Role::OpsManager, O::XpressOwned) => L::Detailed,
        (Role::OpsManager, O::DriverOwned) => L::Basic,
        (Role::OpsManager, O::Leased) => L::Detailed,
        (Role::FleetManager, O::XpressOwned) => L::Full,
        (Role::FleetManager, O::DriverOwned) => L::Basic,
        (Role::FleetManager, O::Leased) => L::Detailed,
        (Role::FinanceManager, O::XpressOwned) => L::Financial,
        (Role::FinanceManager, O::DriverOwned) => L::Basic,
        (Role::FinanceManager, O::Leased) => L::Financial,
        (Role::ComplianceOfficer, _) => L::Detailed,
        (Role::Support, _) => L::Basic,
        (Role::Analyst, O::DriverOwned) => L::None,
        (Role::Analyst, _) => L::Basic,
    }
}

/// Emergency case ids look like `EMRG-<year>-<seq>-<tag>`.
fn is_valid_emergency_case_id(case_id: &str) -> bool {
    let parts: Vec<&str> = case_id.split('-').collect();
    if parts.len() != 4 || parts[0] != "EMRG" {
        return false;
    }
    let year_ok = parts[1].len() == 4 && parts[1].chars().all(|c| c.is_ascii_digit());
    let seq_ok = !parts[2].is_empty() && parts[2].chars().all(|c| c.is_ascii_digit());
    let tag_ok = !parts[3].is_empty() && parts[3].chars().all(|c| c.is_ascii_alphanumeric());
    year_ok && seq_ok && tag_ok
}
