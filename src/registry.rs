//! Policy Registry: the immutable table of approval workflow definitions.
//!
//! Built once at process start, validated, and injected behind an `Arc`;
//! nothing mutates it at runtime.

use std::collections::HashMap;

use crate::errors::AppError;
use crate::models::{Permission, Role, SensitivityLevel, WorkflowAction, WorkflowDefinition};

#[derive(Debug)]
pub struct PolicyRegistry {
    workflows: HashMap<WorkflowAction, WorkflowDefinition>,
}

impl PolicyRegistry {
    /// Build the built-in registry. Fails with a `Config` error when any
    /// definition violates its invariants; that is a deployment defect and
    /// aborts startup.
    pub fn builtin() -> Result<Self, AppError> {
        Self::from_definitions(builtin_definitions())
    }

    pub fn from_definitions(definitions: Vec<WorkflowDefinition>) -> Result<Self, AppError> {
        let mut workflows = HashMap::with_capacity(definitions.len());
        for def in definitions {
            validate_definition(&def)?;
            if workflows.insert(def.action, def).is_some() {
                return Err(AppError::config("registry", "duplicate workflow action"));
            }
        }
        Ok(Self { workflows })
    }

    pub fn get(&self, action: WorkflowAction) -> Option<&WorkflowDefinition> {
        self.workflows.get(&action)
    }

    /// Lookup by the wire-format action name; unknown names resolve to
    /// `None` rather than erroring, so advisors can fall back to defaults.
    pub fn get_by_name(&self, action: &str) -> Option<&WorkflowDefinition> {
        action
            .parse::<WorkflowAction>()
            .ok()
            .and_then(|a| self.get(a))
    }

    pub fn iter(&self) -> impl Iterator<Item = &WorkflowDefinition> {
        self.workflows.values()
    }

    pub fn len(&self) -> usize {
        self.workflows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workflows.is_empty()
    }
}

fn validate_definition(def: &WorkflowDefinition) -> Result<(), AppError> {
    let field = || format!("workflow:{}", def.action);
    if def.required_level == 0 {
        return Err(AppError::config(field(), "required_level must be > 0"));
    }
    if def.default_ttl_seconds == 0 {
        return Err(AppError::config(field(), "default_ttl_seconds must be > 0"));
    }
    if def.max_ttl_seconds < def.default_ttl_seconds {
        return Err(AppError::config(
            field(),
            "max_ttl_seconds must be >= default_ttl_seconds",
        ));
    }
    if def.required_roles.is_empty() {
        return Err(AppError::config(field(), "required_roles must not be empty"));
    }
    if def.required_permissions.is_empty() {
        return Err(AppError::config(
            field(),
            "required_permissions must not be empty",
        ));
    }
    if def.auto_grant_permissions.is_empty() {
        return Err(AppError::config(
            field(),
            "auto_grant_permissions must not be empty",
        ));
    }
    if !def
        .auto_grant_permissions
        .contains(&def.action.as_permission())
    {
        return Err(AppError::config(
            field(),
            "auto_grant_permissions must include the workflow action itself",
        ));
    }
    Ok(())
}

struct WorkflowSpec {
    action: WorkflowAction,
    description: &'static str,
    required_roles: &'static [Role],
    required_permissions: &'static [Permission],
    required_level: u8,
    sensitivity_level: SensitivityLevel,
    dual_approval_required: bool,
    mfa_required_for_approval: bool,
    default_ttl_seconds: u64,
    max_ttl_seconds: u64,
    extra_grants: &'static [Permission],
    required_fields: &'static [&'static str],
}

impl WorkflowSpec {
    fn build(self) -> WorkflowDefinition {
        let mut auto_grant_permissions = vec![self.action.as_permission()];
        auto_grant_permissions.extend_from_slice(self.extra_grants);
        WorkflowDefinition {
            action: self.action,
            description: self.description.to_string(),
            required_roles: self.required_roles.to_vec(),
            required_permissions: self.required_permissions.to_vec(),
            required_level: self.required_level,
            sensitivity_level: self.sensitivity_level,
            dual_approval_required: self.dual_approval_required,
            mfa_required_for_approval: self.mfa_required_for_approval,
            default_ttl_seconds: self.default_ttl_seconds,
            max_ttl_seconds: self.max_ttl_seconds,
            auto_grant_permissions,
            required_fields: self.required_fields.iter().map(|s| s.to_string()).collect(),
        }
    }
}

fn builtin_definitions() -> Vec<WorkflowDefinition> {
    use Permission as P;
    use Role as R;
    use SensitivityLevel as S;
    use WorkflowAction as A;

    let specs = [
        WorkflowSpec {
            action: A::UnmaskPiiWithMfa,
            description: "Unmask user PII for an active investigation",
            required_roles: &[R::Executive, R::ComplianceOfficer],
            required_permissions: &[P::ApproveRequests, P::ViewAuditLogs],
            required_level: 50,
            sensitivity_level: S::Critical,
            dual_approval_required: true,
            mfa_required_for_approval: true,
            default_ttl_seconds: 3600,
            max_ttl_seconds: 14_400,
            extra_grants: &[P::ViewDrivers],
            required_fields: &["user_ids", "investigation_case"],
        },
        WorkflowSpec {
            action: A::ApprovePayoutBatch,
            description: "Release a settlement payout batch",
            required_roles: &[R::Executive, R::FinanceManager],
            required_permissions: &[P::ApproveRequests, P::ViewFinancials],
            required_level: 50,
            sensitivity_level: S::Critical,
            dual_approval_required: true,
            mfa_required_for_approval: true,
            default_ttl_seconds: 1800,
            max_ttl_seconds: 7200,
            extra_grants: &[P::ProcessPayouts],
            required_fields: &["batch_id", "amount", "region"],
        },
        WorkflowSpec {
            action: A::AccessRawLocationData,
            description: "Access unaggregated vehicle location traces",
            required_roles: &[R::Executive, R::ComplianceOfficer],
            required_permissions: &[P::ApproveRequests, P::ViewAuditLogs],
            required_level: 50,
            sensitivity_level: S::Critical,
            dual_approval_required: true,
            mfa_required_for_approval: true,
            default_ttl_seconds: 3600,
            max_ttl_seconds: 14_400,
            extra_grants: &[],
            required_fields: &["vehicle_ids", "time_range", "investigation_case"],
        },
        WorkflowSpec {
            action: A::DecommissionVehicle,
            description: "Permanently retire a vehicle from the fleet",
            required_roles: &[R::Executive, R::FleetManager],
            required_permissions: &[P::ApproveRequests, P::ManageVehicles],
            required_level: 40,
            sensitivity_level: S::High,
            dual_approval_required: false,
            mfa_required_for_approval: true,
            default_ttl_seconds: 7200,
            max_ttl_seconds: 28_800,
            extra_grants: &[P::ManageVehicles],
            required_fields: &["vehicle_id", "reason"],
        },
        WorkflowSpec {
            action: A::OverrideFareLimits,
            description: "Override regional fare limit configuration",
            required_roles: &[R::Executive, R::FinanceManager],
            required_permissions: &[P::ApproveRequests, P::ViewFinancials],
            required_level: 40,
            sensitivity_level: S::High,
            dual_approval_required: false,
            mfa_required_for_approval: true,
            default_ttl_seconds: 3600,
            max_ttl_seconds: 14_400,
            extra_grants: &[],
            required_fields: &["region", "fare_rule_id"],
        },
        WorkflowSpec {
            action: A::EmergencyVehicleLockout,
            description: "Remotely lock a vehicle out of service",
            required_roles: &[R::Executive, R::OpsManager],
            required_permissions: &[P::ApproveRequests, P::ManageVehicles],
            required_level: 40,
            sensitivity_level: S::High,
            dual_approval_required: false,
            mfa_required_for_approval: true,
            default_ttl_seconds: 1800,
            max_ttl_seconds: 7200,
            extra_grants: &[P::ManageVehicles],
            required_fields: &["vehicle_id", "incident_id"],
        },
        WorkflowSpec {
            action: A::GrantTemporaryRole,
            description: "Grant a role to a user for a bounded window",
            required_roles: &[R::Executive],
            required_permissions: &[P::ApproveRequests],
            required_level: 60,
            sensitivity_level: S::High,
            dual_approval_required: false,
            mfa_required_for_approval: true,
            default_ttl_seconds: 14_400,
            max_ttl_seconds: 86_400,
            extra_grants: &[],
            required_fields: &["target_user_id", "role"],
        },
        WorkflowSpec {
            action: A::ExportUserData,
            description: "Export user records for an offline process",
            required_roles: &[R::Executive, R::ComplianceOfficer],
            required_permissions: &[P::ApproveRequests],
            required_level: 40,
            sensitivity_level: S::Medium,
            dual_approval_required: false,
            mfa_required_for_approval: false,
            default_ttl_seconds: 7200,
            max_ttl_seconds: 28_800,
            extra_grants: &[],
            required_fields: &["user_ids", "export_format"],
        },
        WorkflowSpec {
            action: A::ViewDriverDocuments,
            description: "View a driver's submitted documents",
            required_roles: &[R::OpsManager, R::FleetManager, R::ComplianceOfficer],
            required_permissions: &[P::ApproveRequests, P::ViewDrivers],
            required_level: 30,
            sensitivity_level: S::Medium,
            dual_approval_required: false,
            mfa_required_for_approval: false,
            default_ttl_seconds: 14_400,
            max_ttl_seconds: 86_400,
            extra_grants: &[P::ViewDrivers],
            required_fields: &["driver_id"],
        },
        WorkflowSpec {
            action: A::BulkReassignVehicles,
            description: "Reassign a batch of vehicles across hubs",
            required_roles: &[R::OpsManager, R::FleetManager],
            required_permissions: &[P::ApproveRequests, P::ManageVehicles],
            required_level: 30,
            sensitivity_level: S::Medium,
            dual_approval_required: false,
            mfa_required_for_approval: false,
            default_ttl_seconds: 7200,
            max_ttl_seconds: 28_800,
            extra_grants: &[P::ManageVehicles],
            required_fields: &["vehicle_ids", "target_region"],
        },
        WorkflowSpec {
            action: A::ManageRegionalSettings,
            description: "Adjust operational settings for a region",
            required_roles: &[R::Executive, R::OpsManager],
            required_permissions: &[P::ApproveRequests],
            required_level: 30,
            sensitivity_level: S::Medium,
            dual_approval_required: false,
            mfa_required_for_approval: false,
            default_ttl_seconds: 14_400,
            max_ttl_seconds: 86_400,
            extra_grants: &[],
            required_fields: &["region"],
        },
        WorkflowSpec {
            action: A::ConfigureAlerts,
            description: "Change operational alert configuration",
            required_roles: &[R::OpsManager, R::FleetManager, R::FinanceManager],
            required_permissions: &[P::ApproveRequests],
            required_level: 20,
            sensitivity_level: S::Low,
            dual_approval_required: false,
            mfa_required_for_approval: false,
            default_ttl_seconds: 3600,
            max_ttl_seconds: 7200,
            extra_grants: &[],
            required_fields: &["alert_type"],
        },
    ];

    specs.into_iter().map(WorkflowSpec::build).collect()
}
