//! Domain model for the access decision engine and approval workflows.
//!
//! Roles, permissions, and workflow actions are closed enumerations parsed at
//! the API boundary; stringly-typed comparisons stop here.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Operator roles recognised by the console.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Executive,
    OpsManager,
    FleetManager,
    FinanceManager,
    ComplianceOfficer,
    Support,
    Analyst,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Executive => "executive",
            Role::OpsManager => "ops_manager",
            Role::FleetManager => "fleet_manager",
            Role::FinanceManager => "finance_manager",
            Role::ComplianceOfficer => "compliance_officer",
            Role::Support => "support",
            Role::Analyst => "analyst",
        }
    }

    /// Baseline permissions attached to the role, before any temporary
    /// grants.
    pub fn base_permissions(&self) -> &'static [Permission] {
        use Permission::*;
        match self {
            Role::Executive => &[
                ViewVehicles,
                ManageVehicles,
                ViewDrivers,
                ViewFinancials,
                ApproveRequests,
                ViewAuditLogs,
                DecommissionVehicle,
                ExportUserData,
                ManageRegionalSettings,
                ConfigureAlerts,
            ],
            Role::OpsManager => &[
                ViewVehicles,
                ManageVehicles,
                ViewDrivers,
                ApproveRequests,
                BulkReassignVehicles,
                ManageRegionalSettings,
                ConfigureAlerts,
            ],
            Role::FleetManager => &[
                ViewVehicles,
                ManageVehicles,
                ViewDrivers,
                ViewDriverDocuments,
                BulkReassignVehicles,
                DecommissionVehicle,
                ConfigureAlerts,
            ],
            Role::FinanceManager => &[
                ViewVehicles,
                ViewFinancials,
                ProcessPayouts,
                ApproveRequests,
                OverrideFareLimits,
                ConfigureAlerts,
            ],
            Role::ComplianceOfficer => &[
                ViewVehicles,
                ViewDrivers,
                ViewDriverDocuments,
                ViewAuditLogs,
                ApproveRequests,
                ExportUserData,
            ],
            Role::Support => &[ViewVehicles, ViewDrivers, CrossRegionOverride],
            Role::Analyst => &[ViewVehicles, ViewAuditLogs],
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "executive" => Ok(Role::Executive),
            "ops_manager" => Ok(Role::OpsManager),
            "fleet_manager" => Ok(Role::FleetManager),
            "finance_manager" => Ok(Role::FinanceManager),
            "compliance_officer" => Ok(Role::ComplianceOfficer),
            "support" => Ok(Role::Support),
            "analyst" => Ok(Role::Analyst),
            other => Err(format!("unknown role: {other}")),
        }
    }
}

/// Permissions evaluable by the decision engine. `Wildcard` (`"*"`) matches
/// any permission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    ViewVehicles,
    ManageVehicles,
    ViewDrivers,
    ViewFinancials,
    ProcessPayouts,
    ApproveRequests,
    ViewAuditLogs,
    CrossRegionOverride,
    UnmaskPiiWithMfa,
    ApprovePayoutBatch,
    AccessRawLocationData,
    DecommissionVehicle,
    OverrideFareLimits,
    EmergencyVehicleLockout,
    GrantTemporaryRole,
    ExportUserData,
    ViewDriverDocuments,
    BulkReassignVehicles,
    ManageRegionalSettings,
    ConfigureAlerts,
    #[serde(rename = "*")]
    Wildcard,
}

impl Permission {
    pub fn as_str(&self) -> &'static str {
        match self {
            Permission::ViewVehicles => "view_vehicles",
            Permission::ManageVehicles => "manage_vehicles",
            Permission::ViewDrivers => "view_drivers",
            Permission::ViewFinancials => "view_financials",
            Permission::ProcessPayouts => "process_payouts",
            Permission::ApproveRequests => "approve_requests",
            Permission::ViewAuditLogs => "view_audit_logs",
            Permission::CrossRegionOverride => "cross_region_override",
            Permission::UnmaskPiiWithMfa => "unmask_pii_with_mfa",
            Permission::ApprovePayoutBatch => "approve_payout_batch",
            Permission::AccessRawLocationData => "access_raw_location_data",
            Permission::DecommissionVehicle => "decommission_vehicle",
            Permission::OverrideFareLimits => "override_fare_limits",
            Permission::EmergencyVehicleLockout => "emergency_vehicle_lockout",
            Permission::GrantTemporaryRole => "grant_temporary_role",
            Permission::ExportUserData => "export_user_data",
            Permission::ViewDriverDocuments => "view_driver_documents",
            Permission::BulkReassignVehicles => "bulk_reassign_vehicles",
            Permission::ManageRegionalSettings => "manage_regional_settings",
            Permission::ConfigureAlerts => "configure_alerts",
            Permission::Wildcard => "*",
        }
    }

    /// Permissions whose nature forces an MFA obligation on every allowed
    /// decision (financial movement, decommissioning, cross-region override).
    pub fn requires_mfa(&self) -> bool {
        matches!(
            self,
            Permission::ProcessPayouts
                | Permission::ApprovePayoutBatch
                | Permission::OverrideFareLimits
                | Permission::DecommissionVehicle
                | Permission::CrossRegionOverride
        )
    }

    /// Permissions that carry the enhanced-audit obligation.
    pub fn is_sensitive(&self) -> bool {
        matches!(
            self,
            Permission::UnmaskPiiWithMfa
                | Permission::ApprovePayoutBatch
                | Permission::AccessRawLocationData
                | Permission::ProcessPayouts
                | Permission::DecommissionVehicle
                | Permission::EmergencyVehicleLockout
                | Permission::ExportUserData
        )
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Permission {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "view_vehicles" => Ok(Permission::ViewVehicles),
            "manage_vehicles" => Ok(Permission::ManageVehicles),
            "view_drivers" => Ok(Permission::ViewDrivers),
            "view_financials" => Ok(Permission::ViewFinancials),
            "process_payouts" => Ok(Permission::ProcessPayouts),
            "approve_requests" => Ok(Permission::ApproveRequests),
            "view_audit_logs" => Ok(Permission::ViewAuditLogs),
            "cross_region_override" => Ok(Permission::CrossRegionOverride),
            "unmask_pii_with_mfa" => Ok(Permission::UnmaskPiiWithMfa),
            "approve_payout_batch" => Ok(Permission::ApprovePayoutBatch),
            "access_raw_location_data" => Ok(Permission::AccessRawLocationData),
            "decommission_vehicle" => Ok(Permission::DecommissionVehicle),
            "override_fare_limits" => Ok(Permission::OverrideFareLimits),
            "emergency_vehicle_lockout" => Ok(Permission::EmergencyVehicleLockout),
            "grant_temporary_role" => Ok(Permission::GrantTemporaryRole),
            "export_user_data" => Ok(Permission::ExportUserData),
            "view_driver_documents" => Ok(Permission::ViewDriverDocuments),
            "bulk_reassign_vehicles" => Ok(Permission::BulkReassignVehicles),
            "manage_regional_settings" => Ok(Permission::ManageRegionalSettings),
            "configure_alerts" => Ok(Permission::ConfigureAlerts),
            "*" => Ok(Permission::Wildcard),
            other => Err(format!("unknown permission: {other}")),
        }
    }
}

/// Actions governed by the approval workflow registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowAction {
    UnmaskPiiWithMfa,
    ApprovePayoutBatch,
    AccessRawLocationData,
    DecommissionVehicle,
    OverrideFareLimits,
    EmergencyVehicleLockout,
    GrantTemporaryRole,
    ExportUserData,
    ViewDriverDocuments,
    BulkReassignVehicles,
    ManageRegionalSettings,
    ConfigureAlerts,
}

impl WorkflowAction {
    pub const ALL: [WorkflowAction; 12] = [
        WorkflowAction::UnmaskPiiWithMfa,
        WorkflowAction::ApprovePayoutBatch,
        WorkflowAction::AccessRawLocationData,
        WorkflowAction::DecommissionVehicle,
        WorkflowAction::OverrideFareLimits,
        WorkflowAction::EmergencyVehicleLockout,
        WorkflowAction::GrantTemporaryRole,
        WorkflowAction::ExportUserData,
        WorkflowAction::ViewDriverDocuments,
        WorkflowAction::BulkReassignVehicles,
        WorkflowAction::ManageRegionalSettings,
        WorkflowAction::ConfigureAlerts,
    ];

    pub fn as_str(&self) -> &'static str {
        self.as_permission().as_str()
    }

    /// Every workflow action doubles as the permission it grants.
    pub fn as_permission(&self) -> Permission {
        match self {
            WorkflowAction::UnmaskPiiWithMfa => Permission::UnmaskPiiWithMfa,
            WorkflowAction::ApprovePayoutBatch => Permission::ApprovePayoutBatch,
            WorkflowAction::AccessRawLocationData => Permission::AccessRawLocationData,
            WorkflowAction::DecommissionVehicle => Permission::DecommissionVehicle,
            WorkflowAction::OverrideFareLimits => Permission::OverrideFareLimits,
            WorkflowAction::EmergencyVehicleLockout => Permission::EmergencyVehicleLockout,
            WorkflowAction::GrantTemporaryRole => Permission::GrantTemporaryRole,
            WorkflowAction::ExportUserData => Permission::ExportUserData,
            WorkflowAction::ViewDriverDocuments => Permission::ViewDriverDocuments,
            WorkflowAction::BulkReassignVehicles => Permission::BulkReassignVehicles,
            WorkflowAction::ManageRegionalSettings => Permission::ManageRegionalSettings,
            WorkflowAction::ConfigureAlerts => Permission::ConfigureAlerts,
        }
    }
}

impl fmt::Display for WorkflowAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WorkflowAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "unmask_pii_with_mfa" => Ok(WorkflowAction::UnmaskPiiWithMfa),
            "approve_payout_batch" => Ok(WorkflowAction::ApprovePayoutBatch),
            "access_raw_location_data" => Ok(WorkflowAction::AccessRawLocationData),
            "decommission_vehicle" => Ok(WorkflowAction::DecommissionVehicle),
            "override_fare_limits" => Ok(WorkflowAction::OverrideFareLimits),
            "emergency_vehicle_lockout" => Ok(WorkflowAction::EmergencyVehicleLockout),
            "grant_temporary_role" => Ok(WorkflowAction::GrantTemporaryRole),
            "export_user_data" => Ok(WorkflowAction::ExportUserData),
            "view_driver_documents" => Ok(WorkflowAction::ViewDriverDocuments),
            "bulk_reassign_vehicles" => Ok(WorkflowAction::BulkReassignVehicles),
            "manage_regional_settings" => Ok(WorkflowAction::ManageRegionalSettings),
            "configure_alerts" => Ok(WorkflowAction::ConfigureAlerts),
            other => Err(format!("unknown workflow action: {other}")),
        }
    }
}

/// Vehicle ownership partitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum OwnershipType {
    XpressOwned,
    DriverOwned,
    Leased,
}

/// Data classification tiers driving masking and MFA obligations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum DataClass {
    Public,
    Internal,
    Confidential,
    Restricted,
}

/// How much PII a user may see.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum PiiScope {
    None,
    Masked,
    Full,
}

/// Workflow risk tiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum SensitivityLevel {
    Low,
    Medium,
    High,
    Critical,
}

/// Depth of vehicle data exposed for an ownership partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum OwnershipAccessLevel {
    None,
    Basic,
    Detailed,
    Financial,
    Full,
}

/// A role held by a user for a bounded validity window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct RoleAssignment {
    pub role: Role,
    /// Authority level; higher means more authority.
    pub level: u8,
    #[serde(default)]
    pub allowed_regions: Vec<String>,
    pub valid_from: DateTime<Utc>,
    #[serde(default)]
    pub valid_until: Option<DateTime<Utc>>,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

fn default_true() -> bool {
    true
}

impl RoleAssignment {
    /// Expiry is evaluated at decision time: the assignment is expired the
    /// instant `now >= valid_until`.
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        self.is_active
            && self.valid_from <= now
            && self.valid_until.map_or(true, |until| now < until)
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.valid_until.is_some_and(|until| now >= until)
    }
}

/// Time-boxed grant of permissions and regions minted by an approved
/// workflow request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct TemporaryAccessToken {
    pub id: Uuid,
    pub workflow: WorkflowAction,
    pub granted_permissions: Vec<Permission>,
    pub granted_regions: Vec<String>,
    pub requested_by: String,
    pub justification: String,
    /// Role level of the approver that completed the grant; revocation
    /// requires equal or higher authority.
    pub granted_by_level: u8,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    #[serde(default)]
    pub revoked_at: Option<DateTime<Utc>>,
}

impl TemporaryAccessToken {
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        self.revoked_at.is_none() && now < self.expires_at
    }
}

/// Snapshot of a user as seen by the identity subsystem. Referenced, never
/// mutated, by the decision engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct User {
    pub id: String,
    #[serde(default)]
    pub roles: Vec<RoleAssignment>,
    /// Region ids, or `"*"` for a wildcard grant.
    #[serde(default)]
    pub allowed_regions: Vec<String>,
    pub pii_scope: PiiScope,
    #[serde(default)]
    pub active_tokens: Vec<TemporaryAccessToken>,
}

impl User {
    pub fn has_wildcard_region(&self) -> bool {
        self.allowed_regions.iter().any(|r| r == "*")
    }

    /// Assignments that are active and unexpired at `now`.
    pub fn valid_roles_at(&self, now: DateTime<Utc>) -> impl Iterator<Item = &RoleAssignment> {
        self.roles.iter().filter(move |r| r.is_valid_at(now))
    }

    pub fn max_level_at(&self, now: DateTime<Utc>) -> u8 {
        self.valid_roles_at(now).map(|r| r.level).max().unwrap_or(0)
    }
}

/// Contextual attributes accompanying an access request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct AccessContext {
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub ownership_type: Option<OwnershipType>,
    #[serde(default)]
    pub data_class: Option<DataClass>,
    #[serde(default)]
    pub contains_pii: bool,
    /// Support case id used for cross-region overrides.
    #[serde(default)]
    pub case_id: Option<String>,
    #[serde(default)]
    pub emergency_override: bool,
    #[serde(default)]
    pub emergency_granted_at: Option<DateTime<Utc>>,
    /// A caller asking to skip MFA is treated as a bypass attempt.
    #[serde(default)]
    pub skip_mfa: bool,
    #[serde(default)]
    pub resource_id: Option<String>,
}

/// Outcome of a policy evaluation. Denial is a normal value, not an error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct AccessDecision {
    pub allowed: bool,
    /// Stable machine-readable reason code.
    pub reason: String,
    /// Audit trail of the rules that fired, in evaluation order.
    pub applied_policies: Vec<String>,
    pub requires_mfa: bool,
    pub masked_fields: Vec<String>,
    pub ownership_access_level: OwnershipAccessLevel,
    pub audit_required: bool,
    pub decision_id: Uuid,
}

impl AccessDecision {
    pub fn denied(reason: impl Into<String>, applied_policies: Vec<String>) -> Self {
        Self {
            allowed: false,
            reason: reason.into(),
            applied_policies,
            requires_mfa: false,
            masked_fields: Vec::new(),
            ownership_access_level: OwnershipAccessLevel::None,
            audit_required: true,
            decision_id: Uuid::new_v4(),
        }
    }
}

/// Registry entry describing one approval workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct WorkflowDefinition {
    pub action: WorkflowAction,
    pub description: String,
    pub required_roles: Vec<Role>,
    pub required_permissions: Vec<Permission>,
    pub required_level: u8,
    pub sensitivity_level: SensitivityLevel,
    pub dual_approval_required: bool,
    pub mfa_required_for_approval: bool,
    pub default_ttl_seconds: u64,
    pub max_ttl_seconds: u64,
    /// Must be non-empty and include the action's own permission.
    pub auto_grant_permissions: Vec<Permission>,
    /// Mandatory sub-fields of `requested_action` payloads.
    pub required_fields: Vec<String>,
}

impl WorkflowDefinition {
    pub fn required_approvals(&self) -> usize {
        if self.dual_approval_required {
            2
        } else {
            1
        }
    }
}

/// Approval request lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStatus {
    Draft,
    Validated,
    PendingApproval,
    Approved,
    Rejected,
    Expired,
}

/// One recorded approval, keyed by approver identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ApprovalRecord {
    pub approver_id: String,
    pub approver_role: Role,
    pub approver_level: u8,
    pub approved_at: DateTime<Utc>,
}

/// A request for time-boxed elevated access, tracked by the orchestrator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ApprovalRequest {
    pub id: Uuid,
    pub action: WorkflowAction,
    pub requested_by: String,
    pub justification: String,
    pub requested_action: serde_json::Value,
    #[serde(default)]
    pub ttl_hours: Option<u32>,
    #[serde(default)]
    pub regions: Vec<String>,
    pub status: ApprovalStatus,
    pub approvals: Vec<ApprovalRecord>,
    pub created_at: DateTime<Utc>,
    /// When a still-pending request lapses.
    pub pending_until: DateTime<Utc>,
    #[serde(default)]
    pub resolved_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub issued_token: Option<Uuid>,
    #[serde(default)]
    pub rejection_reason: Option<String>,
}

/// Risk assessment for a workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct RiskAssessment {
    pub risk_level: SensitivityLevel,
    pub risk_factors: Vec<String>,
    pub mitigation_measures: Vec<String>,
}

/// Notification channels used for approval traffic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum NotificationChannel {
    Email,
    Sms,
    Slack,
}

/// Per-workflow notification policy derived from sensitivity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct NotificationSettings {
    pub notify_on_request: bool,
    pub notify_on_approval: bool,
    pub notify_on_rejection: bool,
    pub escalation_hours: u32,
    pub notification_channels: Vec<NotificationChannel>,
}

/// Itemized validation outcome; never thrown.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ValidationReport {
    pub valid: bool,
    pub errors: Vec<String>,
}

impl ValidationReport {
    pub fn ok() -> Self {
        Self { valid: true, errors: Vec::new() }
    }

    pub fn from_errors(errors: Vec<String>) -> Self {
        Self { valid: errors.is_empty(), errors }
    }
}
