//! Notification and MFA collaborator boundaries.
//!
//! Delivery transport (email/SMS/push) lives outside this service; what we
//! own is deciding who gets told what, per the advisor's per-sensitivity
//! settings. The default implementations log the would-be sends.

use chrono::{DateTime, Duration, Utc};
use serde_json::Value;
use uuid::Uuid;

use crate::models::NotificationChannel;

pub trait NotificationDispatcher: Send + Sync {
    fn send(&self, channel: NotificationChannel, template_id: &str, payload: &Value);
}

/// Default dispatcher: structured log lines in place of real delivery.
pub struct LoggingDispatcher;

impl NotificationDispatcher for LoggingDispatcher {
    fn send(&self, channel: NotificationChannel, template_id: &str, payload: &Value) {
        tracing::info!(
            channel = ?channel,
            template_id = %template_id,
            payload = %payload,
            "notification dispatched"
        );
    }
}

/// An MFA challenge handed to the caller to complete out of band.
#[derive(Debug, Clone)]
pub struct MfaChallenge {
    pub id: Uuid,
    pub user_id: String,
    pub method: String,
    pub expires_at: DateTime<Utc>,
}

pub trait MfaService: Send + Sync {
    fn create_challenge(&self, user_id: &str, method: &str, context: &str) -> MfaChallenge;
}

/// Stub MFA provider; real deployments wire the org's MFA backend in here.
pub struct StubMfaService;

impl MfaService for StubMfaService {
    fn create_challenge(&self, user_id: &str, method: &str, context: &str) -> MfaChallenge {
        let challenge = MfaChallenge {
            id: Uuid::new_v4(),
            user_id: user_id.to_string(),
            method: method.to_string(),
            expires_at: Utc::now() + Duration::minutes(5),
        };
        tracing::info!(
            challenge_id = %challenge.id,
            user_id = %user_id,
            method = %method,
            context = %context,
            "mfa challenge created"
        );
        challenge
    }
}
