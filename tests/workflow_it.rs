// Suppress unused dependency warnings
use futures as _;

use std::net::SocketAddr;
use std::time::Duration as StdDuration;

use serde_json::{json, Value};
use tokio::net::TcpListener;

use xpress_access_service::cache::DecisionCacheConfig;
use xpress_access_service::config::AppConfig;
use xpress_access_service::{app, build_state};

async fn spawn_service() -> SocketAddr {
    let config = AppConfig {
        bind_addr: "127.0.0.1:0".parse().unwrap(),
        cache: DecisionCacheConfig::default(),
        approval_sweep_interval: StdDuration::from_secs(60),
    };
    let state = build_state(&config).unwrap();
    let app = app(state);
    let listener = TcpListener::bind(("127.0.0.1", 0)).await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
    addr
}

fn approver(id: &str, role: &str, level: u8, permissions: &[&str]) -> Value {
    json!({
        "id": id,
        "role": role,
        "level": level,
        "permissions": permissions
    })
}

fn executive(id: &str) -> Value {
    approver(id, "executive", 60, &["approve_requests", "view_financials", "view_audit_logs", "manage_vehicles"])
}

fn decommission_body() -> Value {
    json!({
        "action": "decommission_vehicle",
        "requested_by": "fleet-ops-7",
        "justification": "vehicle written off after collision",
        "requested_action": {
            "action": "decommission_vehicle",
            "vehicle_id": "veh-1142",
            "reason": "total loss"
        },
        "regions": ["ncr"]
    })
}

#[tokio::test]
async fn ttl_above_the_workflow_maximum_fails_validation() {
    let addr = spawn_service().await;
    let response = reqwest::Client::new()
        .post(format!("http://{addr}/v1/approvals"))
        .json(&json!({
            "action": "configure_alerts",
            "requested_by": "ops-1",
            "justification": "tune the payout anomaly alert thresholds",
            "requested_action": {
                "action": "configure_alerts",
                "alert_type": "payout_anomaly"
            },
            "ttl_hours": 10
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);
    let report: Value = response.json().await.unwrap();
    assert_eq!(report["valid"], false);
    assert!(report["errors"]
        .as_array()
        .unwrap()
        .iter()
        .any(|e| e.as_str().unwrap().contains("exceeds the maximum of 2 hours")));
}

#[tokio::test]
async fn single_approval_lifecycle_mints_and_revokes_a_token() {
    let addr = spawn_service().await;
    let client = reqwest::Client::new();

    let created = client
        .post(format!("http://{addr}/v1/approvals"))
        .json(&decommission_body())
        .send()
        .await
        .unwrap();
    assert_eq!(created.status(), 201);
    let request: Value = created.json().await.unwrap();
    assert_eq!(request["status"], "pending_approval");
    let request_id = request["id"].as_str().unwrap().to_string();

    let fetched: Value = client
        .get(format!("http://{addr}/v1/approvals/{request_id}"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(fetched["id"].as_str().unwrap(), request_id);

    let outcome: Value = client
        .post(format!("http://{addr}/v1/approvals/{request_id}/approve"))
        .json(&executive("exec-1"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(outcome["request"]["status"], "approved");
    let token = &outcome["token"];
    assert!(token["granted_permissions"]
        .as_array()
        .unwrap()
        .iter()
        .any(|p| p == "decommission_vehicle"));
    let token_id = token["id"].as_str().unwrap().to_string();

    // Lower authority than the grantor cannot revoke.
    let forbidden = client
        .post(format!("http://{addr}/v1/tokens/{token_id}/revoke"))
        .json(&approver("ops-3", "ops_manager", 30, &["approve_requests"]))
        .send()
        .await
        .unwrap();
    assert_eq!(forbidden.status(), 403);

    let revoked = client
        .post(format!("http://{addr}/v1/tokens/{token_id}/revoke"))
        .json(&executive("exec-2"))
        .send()
        .await
        .unwrap();
    assert!(revoked.status().is_success());
    let revoked: Value = revoked.json().await.unwrap();
    assert!(!revoked["revoked_at"].is_null());
}

#[tokio::test]
async fn dual_approval_requires_two_distinct_approvers() {
    let addr = spawn_service().await;
    let client = reqwest::Client::new();
    let request: Value = client
        .post(format!("http://{addr}/v1/approvals"))
        .json(&json!({
            "action": "approve_payout_batch",
            "requested_by": "finance-ops-2",
            "justification": "weekly driver settlement run",
            "requested_action": {
                "action": "approve_payout_batch",
                "batch_id": "batch-2026-34",
                "amount": 1250000,
                "region": "ncr"
            },
            "ttl_hours": 1,
            "regions": ["ncr"]
        }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let request_id = request["id"].as_str().unwrap().to_string();

    let first: Value = client
        .post(format!("http://{addr}/v1/approvals/{request_id}/approve"))
        .json(&executive("exec-1"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(first["request"]["status"], "pending_approval");
    assert!(first["token"].is_null());

    // The same approver again does not advance the quorum.
    let repeat: Value = client
        .post(format!("http://{addr}/v1/approvals/{request_id}/approve"))
        .json(&executive("exec-1"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(repeat["request"]["approvals"].as_array().unwrap().len(), 1);

    let second: Value = client
        .post(format!("http://{addr}/v1/approvals/{request_id}/approve"))
        .json(&approver(
            "fin-9",
            "finance_manager",
            50,
            &["approve_requests", "view_financials"],
        ))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(second["request"]["status"], "approved");
    assert!(!second["token"].is_null());
}

#[tokio::test]
async fn self_approval_is_forbidden() {
    let addr = spawn_service().await;
    let client = reqwest::Client::new();
    let request: Value = client
        .post(format!("http://{addr}/v1/approvals"))
        .json(&decommission_body())
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let request_id = request["id"].as_str().unwrap();

    let response = client
        .post(format!("http://{addr}/v1/approvals/{request_id}/approve"))
        .json(&executive("fleet-ops-7"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 403);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"]["type"], "not_eligible");
}

#[tokio::test]
async fn rejection_closes_the_request_for_good() {
    let addr = spawn_service().await;
    let client = reqwest::Client::new();
    let request: Value = client
        .post(format!("http://{addr}/v1/approvals"))
        .json(&decommission_body())
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let request_id = request["id"].as_str().unwrap();

    let rejected: Value = client
        .post(format!("http://{addr}/v1/approvals/{request_id}/reject"))
        .json(&json!({
            "actor": executive("exec-1"),
            "reason": "duplicate of an earlier request"
        }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(rejected["status"], "rejected");

    let conflict = client
        .post(format!("http://{addr}/v1/approvals/{request_id}/approve"))
        .json(&executive("exec-2"))
        .send()
        .await
        .unwrap();
    assert_eq!(conflict.status(), 409);
}

#[tokio::test]
async fn approvable_workflow_listing_follows_authority() {
    let addr = spawn_service().await;
    let client = reqwest::Client::new();

    let for_exec: Value = client
        .get(format!(
            "http://{addr}/v1/workflows?level=60&role=executive&permissions=approve_requests,view_audit_logs"
        ))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let exec_actions: Vec<&str> = for_exec
        .as_array()
        .unwrap()
        .iter()
        .map(|d| d["action"].as_str().unwrap())
        .collect();
    assert!(exec_actions.contains(&"unmask_pii_with_mfa"));

    let for_ops: Value = client
        .get(format!("http://{addr}/v1/workflows?level=30&role=ops_manager"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let ops_actions: Vec<&str> = for_ops
        .as_array()
        .unwrap()
        .iter()
        .map(|d| d["action"].as_str().unwrap())
        .collect();
    assert!(!ops_actions.contains(&"unmask_pii_with_mfa"));
    assert!(ops_actions.contains(&"bulk_reassign_vehicles"));

    // Unfiltered listing returns the whole registry.
    let all: Value = client
        .get(format!("http://{addr}/v1/workflows"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(all.as_array().unwrap().len(), 12);
}

#[tokio::test]
async fn template_endpoint_prefills_mandatory_fields() {
    let addr = spawn_service().await;
    let client = reqwest::Client::new();

    let template: Value = client
        .get(format!("http://{addr}/v1/workflows/approve_payout_batch/template"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(template["requested_action"]["action"], "approve_payout_batch");
    assert!(template["requested_action"].get("batch_id").is_some());

    let missing = client
        .get(format!("http://{addr}/v1/workflows/mint_unicorns/template"))
        .send()
        .await
        .unwrap();
    assert_eq!(missing.status(), 404);
}

#[tokio::test]
async fn revoked_token_no_longer_grants_access() {
    let addr = spawn_service().await;
    let client = reqwest::Client::new();

    let request: Value = client
        .post(format!("http://{addr}/v1/approvals"))
        .json(&decommission_body())
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let request_id = request["id"].as_str().unwrap();
    let outcome: Value = client
        .post(format!("http://{addr}/v1/approvals/{request_id}/approve"))
        .json(&executive("exec-1"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let token = outcome["token"].clone();

    let user = json!({
        "id": "fleet-ops-7",
        "roles": [{
            "role": "support",
            "level": 10,
            "allowed_regions": ["ncr"],
            "valid_from": "2026-01-01T00:00:00Z",
            "valid_until": null,
            "is_active": true
        }],
        "allowed_regions": [],
        "pii_scope": "masked",
        "active_tokens": [token]
    });
    let body = json!({
        "user": user,
        "permission": "decommission_vehicle",
        "context": { "region": "ncr" }
    });

    let before: Value = client
        .post(format!("http://{addr}/v1/access/evaluate"))
        .json(&body)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(before["allowed"], true);

    let token_id = outcome["token"]["id"].as_str().unwrap();
    client
        .post(format!("http://{addr}/v1/tokens/{token_id}/revoke"))
        .json(&executive("exec-2"))
        .send()
        .await
        .unwrap()
        .error_for_status()
        .unwrap();

    // Revocation is immediate: the cached allow is gone too.
    let after: Value = client
        .post(format!("http://{addr}/v1/access/evaluate"))
        .json(&body)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(after["allowed"], false);
    assert_eq!(after["reason"], "permission_denied");
}
