//! Risk & Audit Advisor: pure policy math over workflow definitions.
//!
//! Everything here is synchronous and side-effect free so it can be tested
//! without the engine or any I/O.

use crate::models::{
    DataClass, NotificationChannel, NotificationSettings, PiiScope, RiskAssessment,
    SensitivityLevel, WorkflowDefinition,
};

/// Risk assessment for a workflow. An unknown workflow id is assessed at
/// medium risk rather than rejected; callers asking about actions we do not
/// govern still deserve an answer.
pub fn risk_assessment(definition: Option<&WorkflowDefinition>) -> RiskAssessment {
    let Some(def) = definition else {
        return RiskAssessment {
            risk_level: SensitivityLevel::Medium,
            risk_factors: vec!["Unknown workflow: no registered policy".to_string()],
            mitigation_measures: vec!["Manual review required".to_string()],
        };
    };

    let mut risk_factors = Vec::new();
    let mut mitigation_measures = Vec::new();

    match def.sensitivity_level {
        SensitivityLevel::Critical => {
            risk_factors.push("Access to critical or regulated data".to_string());
            risk_factors.push("High impact if misused".to_string());
        }
        SensitivityLevel::High => {
            risk_factors.push("Operationally disruptive if misused".to_string());
        }
        SensitivityLevel::Medium => {
            risk_factors.push("Moderate data exposure".to_string());
        }
        SensitivityLevel::Low => {
            risk_factors.push("Limited blast radius".to_string());
        }
    }

    if def.dual_approval_required {
        mitigation_measures.push("Dual approval required".to_string());
    }
    if def.mfa_required_for_approval {
        mitigation_measures.push("MFA verification mandatory".to_string());
    }
    mitigation_measures.push(format!(
        "Time-boxed grant (max {} hours)",
        def.max_ttl_seconds / 3600
    ));
    mitigation_measures.push("Full audit trail retained".to_string());

    RiskAssessment {
        risk_level: def.sensitivity_level,
        risk_factors,
        mitigation_measures,
    }
}

/// Notification policy derived from a workflow's sensitivity.
pub fn notification_settings(definition: Option<&WorkflowDefinition>) -> NotificationSettings {
    use NotificationChannel::*;
    match definition.map(|d| d.sensitivity_level) {
        Some(SensitivityLevel::Critical) | Some(SensitivityLevel::High) => NotificationSettings {
            notify_on_request: true,
            notify_on_approval: true,
            notify_on_rejection: true,
            escalation_hours: 2,
            notification_channels: vec![Email, Sms, Slack],
        },
        Some(SensitivityLevel::Medium) => NotificationSettings {
            notify_on_request: true,
            notify_on_approval: true,
            notify_on_rejection: true,
            escalation_hours: 4,
            notification_channels: vec![Email, Slack],
        },
        Some(SensitivityLevel::Low) => NotificationSettings {
            notify_on_request: true,
            notify_on_approval: true,
            notify_on_rejection: false,
            escalation_hours: 8,
            notification_channels: vec![Email],
        },
        None => NotificationSettings {
            notify_on_request: true,
            notify_on_approval: true,
            notify_on_rejection: true,
            escalation_hours: 4,
            notification_channels: vec![Email],
        },
    }
}

/// Human-facing estimate of how long approvals usually take, as a function
/// of sensitivity and approval arity.
pub fn estimated_approval_time(definition: Option<&WorkflowDefinition>) -> &'static str {
    match definition {
        Some(def) => match (def.sensitivity_level, def.dual_approval_required) {
            (SensitivityLevel::Critical, true) => "8-12 hours",
            (SensitivityLevel::Critical, false) | (SensitivityLevel::High, _) => "2-4 hours",
            (SensitivityLevel::Medium, _) => "1-3 hours",
            (SensitivityLevel::Low, _) => "1-2 hours",
        },
        None => "2-4 hours",
    }
}

/// Field-mask list applied when a `Masked`-scope user touches classified
/// data. Data-driven in one place so product can adjust the lists without
/// touching the engine.
pub fn masked_fields(data_class: Option<DataClass>, pii_scope: PiiScope) -> Vec<String> {
    if pii_scope != PiiScope::Masked {
        return Vec::new();
    }
    let fields: &[&str] = match data_class {
        Some(DataClass::Restricted) => &[
            "phone_number",
            "email",
            "home_address",
            "government_id",
            "payment_account",
            "location_history",
        ],
        Some(DataClass::Confidential) => &["phone_number", "email", "home_address"],
        Some(DataClass::Internal) => &["phone_number", "email"],
        Some(DataClass::Public) | None => &[],
    };
    fields.iter().map(|f| f.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::WorkflowAction;
    use crate::registry::PolicyRegistry;

    fn registry() -> PolicyRegistry {
        PolicyRegistry::builtin().unwrap()
    }

    #[test]
    fn critical_dual_workflow_lists_mandatory_mitigations() {
        let registry = registry();
        let def = registry.get(WorkflowAction::UnmaskPiiWithMfa);
        let assessment = risk_assessment(def);
        assert_eq!(assessment.risk_level, SensitivityLevel::Critical);
        assert!(!assessment.risk_factors.is_empty());
        assert!(assessment
            .mitigation_measures
            .contains(&"Dual approval required".to_string()));
        assert!(assessment
            .mitigation_measures
            .contains(&"MFA verification mandatory".to_string()));
    }

    #[test]
    fn unknown_workflow_is_medium_risk() {
        let assessment = risk_assessment(None);
        assert_eq!(assessment.risk_level, SensitivityLevel::Medium);
        assert!(assessment
            .risk_factors
            .iter()
            .any(|f| f.contains("Unknown workflow")));
    }

    #[test]
    fn configure_alerts_notification_settings() {
        let registry = registry();
        let settings = notification_settings(registry.get(WorkflowAction::ConfigureAlerts));
        assert_eq!(settings.escalation_hours, 8);
        assert_eq!(settings.notification_channels, vec![NotificationChannel::Email]);
        assert!(!settings.notify_on_rejection);
    }

    #[test]
    fn critical_notification_settings_use_all_channels() {
        let registry = registry();
        let settings = notification_settings(registry.get(WorkflowAction::ApprovePayoutBatch));
        assert_eq!(settings.escalation_hours, 2);
        assert_eq!(settings.notification_channels.len(), 3);
        assert!(settings.notify_on_rejection);
    }

    #[test]
    fn unknown_workflow_notification_defaults() {
        let settings = notification_settings(None);
        assert!(settings.notify_on_request);
        assert!(settings.notify_on_approval);
        assert!(settings.notify_on_rejection);
        assert_eq!(settings.escalation_hours, 4);
        assert_eq!(settings.notification_channels, vec![NotificationChannel::Email]);
    }

    #[test]
    fn estimated_times_follow_sensitivity_and_arity() {
        let registry = registry();
        assert_eq!(
            estimated_approval_time(registry.get(WorkflowAction::UnmaskPiiWithMfa)),
            "8-12 hours"
        );
        assert_eq!(
            estimated_approval_time(registry.get(WorkflowAction::DecommissionVehicle)),
            "2-4 hours"
        );
        assert_eq!(
            estimated_approval_time(registry.get(WorkflowAction::ExportUserData)),
            "1-3 hours"
        );
        assert_eq!(
            estimated_approval_time(registry.get(WorkflowAction::ConfigureAlerts)),
            "1-2 hours"
        );
    }

    #[test]
    fn masking_applies_only_to_masked_scope() {
        assert!(masked_fields(Some(DataClass::Restricted), PiiScope::Full).is_empty());
        assert!(masked_fields(Some(DataClass::Restricted), PiiScope::None).is_empty());
        let fields = masked_fields(Some(DataClass::Restricted), PiiScope::Masked);
        assert!(fields.contains(&"location_history".to_string()));
        let fewer = masked_fields(Some(DataClass::Confidential), PiiScope::Masked);
        assert!(fewer.len() < fields.len());
        assert!(masked_fields(Some(DataClass::Public), PiiScope::Masked).is_empty());
    }
}
