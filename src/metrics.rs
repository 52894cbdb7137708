//! Observability metrics for the access service.
//!
//! Decision counters and latency, cache effectiveness, approval workflow
//! transitions, and HTTP request metrics with a 50ms authorization SLO.

use std::time::{Duration, Instant};

use axum::{
    extract::{MatchedPath, Request},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};
use once_cell::sync::Lazy;
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, Opts, Registry, TextEncoder,
};
use tracing::{debug, error};

use crate::models::AccessDecision;

pub struct AccessMetricsRegistry {
    pub registry: Registry,

    /// Access decisions by outcome and reason code.
    pub decisions_total: IntCounterVec,
    /// Decision latency by outcome.
    pub decision_duration: HistogramVec,
    /// Decision cache lookups by result.
    pub cache_lookups_total: IntCounterVec,
    /// Approval request transitions by workflow and resulting status.
    pub approval_transitions_total: IntCounterVec,
    /// Temporary access tokens issued, by workflow.
    pub tokens_issued_total: IntCounterVec,

    pub http_requests_total: IntCounterVec,
    pub http_request_duration: HistogramVec,
    pub http_requests_in_flight: IntGauge,
    /// Authorization calls that blew the 50ms latency target.
    pub slo_violations_total: IntCounterVec,
}

impl AccessMetricsRegistry {
    pub fn new() -> Self {
        let registry = Registry::new();

        let decisions_total = IntCounterVec::new(
            Opts::new("access_decisions_total", "Total access decisions"),
            &["decision", "reason"],
        )
        .expect("Failed to create decisions_total metric");

        let decision_duration = HistogramVec::new(
            HistogramOpts::new(
                "access_decision_duration_seconds",
                "Access decision latency in seconds",
            )
            .buckets(vec![0.0001, 0.0005, 0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25]),
            &["decision"],
        )
        .expect("Failed to create decision_duration metric");

        let cache_lookups_total = IntCounterVec::new(
            Opts::new("access_decision_cache_lookups_total", "Decision cache lookups"),
            &["result"],
        )
        .expect("Failed to create cache_lookups_total metric");

        let approval_transitions_total = IntCounterVec::new(
            Opts::new(
                "access_approval_transitions_total",
                "Approval request status transitions",
            ),
            &["workflow", "status"],
        )
        .expect("Failed to create approval_transitions_total metric");

        let tokens_issued_total = IntCounterVec::new(
            Opts::new("access_tokens_issued_total", "Temporary access tokens issued"),
            &["workflow"],
        )
        .expect("Failed to create tokens_issued_total metric");

        let http_requests_total = IntCounterVec::new(
            Opts::new("access_http_requests_total", "Total HTTP requests"),
            &["method", "endpoint", "status_code"],
        )
        .expect("Failed to create http_requests_total metric");

        let http_request_duration = HistogramVec::new(
            HistogramOpts::new(
                "access_http_request_duration_seconds",
                "HTTP request duration in seconds",
            )
            .buckets(vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0]),
            &["method", "endpoint"],
        )
        .expect("Failed to create http_request_duration metric");

        let http_requests_in_flight = IntGauge::new(
            "access_http_requests_in_flight",
            "HTTP requests currently being processed",
        )
        .expect("Failed to create http_requests_in_flight metric");

        let slo_violations_total = IntCounterVec::new(
            Opts::new("access_slo_violations_total", "Authorization latency SLO violations"),
            &["endpoint"],
        )
        .expect("Failed to create slo_violations_total metric");

        let collectors: Vec<Box<dyn prometheus::core::Collector>> = vec![
            Box::new(decisions_total.clone()),
            Box::new(decision_duration.clone()),
            Box::new(cache_lookups_total.clone()),
            Box::new(approval_transitions_total.clone()),
            Box::new(tokens_issued_total.clone()),
            Box::new(http_requests_total.clone()),
            Box::new(http_request_duration.clone()),
            Box::new(http_requests_in_flight.clone()),
            Box::new(slo_violations_total.clone()),
        ];
        for collector in collectors {
            if let Err(e) = registry.register(collector) {
                error!("Failed to register metric: {}", e);
            }
        }

        Self {
            registry,
            decisions_total,
            decision_duration,
            cache_lookups_total,
            approval_transitions_total,
            tokens_issued_total,
            http_requests_total,
            http_request_duration,
            http_requests_in_flight,
            slo_violations_total,
        }
    }

    pub fn gather_metrics(&self) -> Result<String, Box<dyn std::error::Error + Send + Sync>> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}

impl Default for AccessMetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}

pub static ACCESS_METRICS: Lazy<AccessMetricsRegistry> = Lazy::new(AccessMetricsRegistry::new);

pub struct AccessMetricsHelper;

impl AccessMetricsHelper {
    pub fn record_decision(decision: &AccessDecision, duration: Duration) {
        let outcome = if decision.allowed { "allow" } else { "deny" };
        ACCESS_METRICS
            .decisions_total
            .with_label_values(&[outcome, &decision.reason])
            .inc();
        ACCESS_METRICS
            .decision_duration
            .with_label_values(&[outcome])
            .observe(duration.as_secs_f64());
    }

    pub fn record_cache_lookup(result: &str) {
        ACCESS_METRICS
            .cache_lookups_total
            .with_label_values(&[result])
            .inc();
    }

    pub fn record_approval_transition(workflow: &str, status: &str) {
        ACCESS_METRICS
            .approval_transitions_total
            .with_label_values(&[workflow, status])
            .inc();
    }

    pub fn record_token_issued(workflow: &str) {
        ACCESS_METRICS
            .tokens_issued_total
            .with_label_values(&[workflow])
            .inc();
    }
}

/// HTTP middleware recording request counts, latency, and the 50ms
/// authorization SLO.
pub async fn access_metrics_middleware(req: Request, next: Next) -> Response {
    let start_time = Instant::now();
    let method = req.method().clone();
    let path = req
        .extensions()
        .get::<MatchedPath>()
        .map_or("unknown".to_string(), |p| p.as_str().to_string());

    ACCESS_METRICS.http_requests_in_flight.inc();
    let response = next.run(req).await;
    ACCESS_METRICS.http_requests_in_flight.dec();

    let duration = start_time.elapsed();
    let status_code = response.status();

    ACCESS_METRICS
        .http_requests_total
        .with_label_values(&[method.as_str(), &path, &status_code.as_u16().to_string()])
        .inc();
    ACCESS_METRICS
        .http_request_duration
        .with_label_values(&[method.as_str(), &path])
        .observe(duration.as_secs_f64());

    if duration.as_millis() > 50 && path.contains("/access/evaluate") {
        ACCESS_METRICS
            .slo_violations_total
            .with_label_values(&[&path])
            .inc();
    }

    debug!(
        method = %method,
        path = %path,
        status = %status_code,
        duration_ms = %duration.as_millis(),
        "HTTP request processed"
    );

    response
}

pub async fn access_metrics_handler() -> impl IntoResponse {
    match ACCESS_METRICS.gather_metrics() {
        Ok(metrics) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            metrics,
        )
            .into_response(),
        Err(e) => {
            error!("Failed to gather metrics: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Error gathering metrics: {e}"),
            )
                .into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::OwnershipAccessLevel;
    use uuid::Uuid;

    #[test]
    fn registry_exposes_collectors() {
        let metrics = AccessMetricsRegistry::new();
        assert!(!metrics.registry.gather().is_empty());
    }

    #[test]
    fn decision_recording_does_not_panic() {
        let decision = AccessDecision {
            allowed: true,
            reason: "access_granted".into(),
            applied_policies: vec![],
            requires_mfa: false,
            masked_fields: vec![],
            ownership_access_level: OwnershipAccessLevel::Basic,
            audit_required: true,
            decision_id: Uuid::new_v4(),
        };
        AccessMetricsHelper::record_decision(&decision, Duration::from_millis(2));
        AccessMetricsHelper::record_cache_lookup("hit");
        AccessMetricsHelper::record_approval_transition("configure_alerts", "approved");
    }
}
