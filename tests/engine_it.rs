// Suppress unused dependency warnings
use futures as _;

use std::net::SocketAddr;
use std::time::Duration as StdDuration;

use chrono::{Duration, Utc};
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

fn ops_manager_user(region: &str) -> Value {
    json!({
        "id": "ops-1",
        "roles": [{
            "role": "ops_manager",
            "level": 30,
            "allowed_regions": [region],
            "valid_from": (Utc::now() - Duration::days(30)).to_rfc3339(),
            "valid_until": null,
            "is_active": true
        }],
        "allowed_regions": [],
        "pii_scope": "masked",
        "active_tokens": []
    })
}

#[tokio::test]
async fn evaluate_allows_role_permission_in_region() {
    let addr = spawn_service().await;
    let response = reqwest::Client::new()
        .post(format!("http://{addr}/v1/access/evaluate"))
        .json(&json!({
            "user": ops_manager_user("ncr"),
            "permission": "view_vehicles",
            "context": { "region": "ncr" }
        }))
        .send()
        .await
        .unwrap();
    assert!(response.status().is_success());
    let decision: Value = response.json().await.unwrap();
    assert_eq!(decision["allowed"], true);
    assert_eq!(decision["reason"], "access_granted");
    let applied: Vec<&str> = decision["applied_policies"]
        .as_array()
        .unwrap()
        .iter()
        .map(|v| v.as_str().unwrap())
        .collect();
    assert!(applied.contains(&"rbac_permission_match"));
}

#[tokio::test]
async fn evaluate_denies_missing_permission_as_data() {
    let addr = spawn_service().await;
    let response = reqwest::Client::new()
        .post(format!("http://{addr}/v1/access/evaluate"))
        .json(&json!({
            "user": ops_manager_user("ncr"),
            "permission": "process_payouts",
            "context": { "region": "ncr" }
        }))
        .send()
        .await
        .unwrap();
    // A denial is a 200 with allowed=false, never an HTTP error.
    assert!(response.status().is_success());
    let decision: Value = response.json().await.unwrap();
    assert_eq!(decision["allowed"], false);
    assert_eq!(decision["reason"], "permission_denied");
}

#[tokio::test]
async fn unknown_permission_name_is_a_bad_request() {
    let addr = spawn_service().await;
    let response = reqwest::Client::new()
        .post(format!("http://{addr}/v1/access/evaluate"))
        .json(&json!({
            "user": ops_manager_user("ncr"),
            "permission": "drop_tables",
            "context": {}
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"]["type"], "invalid_input");
}

#[tokio::test]
async fn repeated_evaluation_is_served_from_cache() {
    let addr = spawn_service().await;
    let body = json!({
        "user": ops_manager_user("ncr"),
        "permission": "view_vehicles",
        "context": { "region": "ncr" }
    });
    let client = reqwest::Client::new();
    let first: Value = client
        .post(format!("http://{addr}/v1/access/evaluate"))
        .json(&body)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let second: Value = client
        .post(format!("http://{addr}/v1/access/evaluate"))
        .json(&body)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    // Identical inputs hit the cached decision, decision id included.
    assert_eq!(first["decision_id"], second["decision_id"]);
}

#[tokio::test]
async fn expired_role_assignment_is_denied_at_the_boundary() {
    let addr = spawn_service().await;
    let mut user = ops_manager_user("ncr");
    user["roles"][0]["valid_until"] = json!((Utc::now() - Duration::seconds(1)).to_rfc3339());
    let decision: Value = reqwest::Client::new()
        .post(format!("http://{addr}/v1/access/evaluate"))
        .json(&json!({
            "user": user,
            "permission": "view_vehicles",
            "context": { "region": "ncr" }
        }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(decision["allowed"], false);
    assert_eq!(decision["reason"], "role_expired");
}

#[tokio::test]
async fn wildcard_region_reaches_every_active_region() {
    let addr = spawn_service().await;
    let mut user = ops_manager_user("ncr");
    user["allowed_regions"] = json!(["*"]);
    let client = reqwest::Client::new();
    for region in ["ncr", "cebu", "davao"] {
        let decision: Value = client
            .post(format!("http://{addr}/v1/access/evaluate"))
            .json(&json!({
                "user": user,
                "permission": "view_vehicles",
                "context": { "region": region }
            }))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(decision["allowed"], true, "{region}");
    }
}

#[tokio::test]
async fn restricted_pii_decision_masks_fields_and_requires_mfa() {
    let addr = spawn_service().await;
    let decision: Value = reqwest::Client::new()
        .post(format!("http://{addr}/v1/access/evaluate"))
        .json(&json!({
            "user": ops_manager_user("ncr"),
            "permission": "view_drivers",
            "context": {
                "region": "ncr",
                "contains_pii": true,
                "data_class": "restricted"
            }
        }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(decision["allowed"], true);
    assert_eq!(decision["requires_mfa"], true);
    let masked = decision["masked_fields"].as_array().unwrap();
    assert!(masked.iter().any(|f| f == "location_history"));
}

#[tokio::test]
async fn vehicle_permission_validation_reports_missing() {
    let addr = spawn_service().await;
    let check: Value = reqwest::Client::new()
        .post(format!("http://{addr}/v1/vehicles/permissions/validate"))
        .json(&json!({
            "user": ops_manager_user("ncr"),
            "required_permissions": ["view_vehicles", "process_payouts"]
        }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(check["valid"], false);
    assert_eq!(check["missing_permissions"], json!(["process_payouts"]));
}

#[tokio::test]
async fn effective_permissions_cover_the_role_baseline() {
    let addr = spawn_service().await;
    let permissions: Value = reqwest::Client::new()
        .post(format!("http://{addr}/v1/vehicles/permissions/effective"))
        .json(&json!({ "user": ops_manager_user("ncr") }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let names: Vec<&str> = permissions
        .as_array()
        .unwrap()
        .iter()
        .map(|v| v.as_str().unwrap())
        .collect();
    assert!(names.contains(&"view_vehicles"));
    assert!(names.contains(&"bulk_reassign_vehicles"));
    assert!(!names.contains(&"process_payouts"));
}

#[tokio::test]
async fn health_and_openapi_advice_endpoints() {
    let addr = spawn_service().await;
    let client = reqwest::Client::new();

    let health: Value = client
        .get(format!("http://{addr}/health"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["status"], "ok");

    let risk: Value = client
        .get(format!("http://{addr}/v1/workflows/unmask_pii_with_mfa/risk"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(risk["risk_level"], "critical");
    assert_eq!(risk["estimated_approval_time"], "8-12 hours");

    // Unknown actions still get a (medium) assessment.
    let unknown: Value = client
        .get(format!("http://{addr}/v1/workflows/mint_unicorns/risk"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(unknown["risk_level"], "medium");

    let settings: Value = client
        .get(format!("http://{addr}/v1/workflows/configure_alerts/notifications"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(settings["escalation_hours"], 8);
    assert_eq!(settings["notification_channels"], json!(["email"]));
}
