//! Lead charge integration tests.

mod common;

use axum::http::StatusCode;
use common::{TestHarness, ADMIN_API_KEY, SERVICE_API_KEY};
use serde_json::{json, Value};

// ============================================================================
// Charging
// ============================================================================

#[tokio::test]
async fn charge_lead_accumulates_spend() {
    let harness = TestHarness::new();
    let assessor_id = harness.create_assessor("Acme EPC").await;

    let response = harness.charge(&assessor_id, "lead-001", 1500).await;

    response.assert_status(StatusCode::CREATED);
    let body: Value = response.json();
    assert_eq!(body["amount_pence"], 1500);
    assert_eq!(body["amount_formatted"], "£15.00");
    assert_eq!(body["accumulated_spend_pence"], 1500);
    assert_eq!(body["lead_count"], 1);
    assert!(body.get("invoice").is_none());
}

#[tokio::test]
async fn charge_uses_postcode_price_when_amount_omitted() {
    let harness = TestHarness::new();
    let assessor_id = harness.create_assessor("Acme EPC").await;

    let response = harness
        .server
        .post("/v1/leads/charges")
        .add_header("x-api-key", SERVICE_API_KEY)
        .json(&json!({
            "assessor_id": assessor_id,
            "lead_id": "lead-001",
            "postcode": "M1 1AE"
        }))
        .await;

    response.assert_status(StatusCode::CREATED);
    let body: Value = response.json();
    assert_eq!(body["amount_pence"], 1500);
}

#[tokio::test]
async fn reaching_threshold_issues_invoice() {
    let harness = TestHarness::new();
    let assessor_id = harness.create_assessor("Acme EPC").await;

    let invoice = harness.charge_until_invoiced(&assessor_id, "lead").await;

    assert_eq!(invoice["amount_pence"], 45_000);
    assert_eq!(invoice["lead_count"], 30);
    assert_eq!(invoice["status"], "pending");
    assert_eq!(invoice["close_reason"], "threshold");
    assert_eq!(invoice["auto_charge"], true);

    // The next lead opens a fresh period.
    let response = harness.charge(&assessor_id, "lead-next", 1500).await;
    response.assert_status(StatusCode::CREATED);
    let body: Value = response.json();
    assert_eq!(body["accumulated_spend_pence"], 1500);
    assert_ne!(body["period_id"], invoice["period_id"]);
}

#[tokio::test]
async fn duplicate_lead_is_rejected() {
    let harness = TestHarness::new();
    let assessor_id = harness.create_assessor("Acme EPC").await;

    harness
        .charge(&assessor_id, "lead-001", 1500)
        .await
        .assert_status(StatusCode::CREATED);
    let response = harness.charge(&assessor_id, "lead-001", 1500).await;

    response.assert_status(StatusCode::CONFLICT);
    let body: Value = response.json();
    assert_eq!(body["error"]["code"], "duplicate_lead_charge");
}

#[tokio::test]
async fn paused_assessor_cannot_be_charged() {
    let harness = TestHarness::new();
    let assessor_id = harness.create_assessor("Acme EPC").await;

    harness
        .server
        .post(&format!("/v1/admin/assessors/{assessor_id}/pause"))
        .add_header("x-admin-key", ADMIN_API_KEY)
        .await
        .assert_status_ok();

    let response = harness.charge(&assessor_id, "lead-001", 1500).await;
    response.assert_status(StatusCode::CONFLICT);
    let body: Value = response.json();
    assert_eq!(body["error"]["code"], "account_paused");
}

#[tokio::test]
async fn non_positive_amount_is_rejected() {
    let harness = TestHarness::new();
    let assessor_id = harness.create_assessor("Acme EPC").await;

    let response = harness.charge(&assessor_id, "lead-001", 0).await;

    response.assert_status(StatusCode::UNPROCESSABLE_ENTITY);
    let body: Value = response.json();
    assert_eq!(body["error"]["code"], "invalid_amount");
}

#[tokio::test]
async fn oversized_amount_is_rejected_without_touching_spend() {
    let harness = TestHarness::new();
    let assessor_id = harness.create_assessor("Acme EPC").await;
    harness
        .charge(&assessor_id, "lead-001", 1500)
        .await
        .assert_status(StatusCode::CREATED);

    let response = harness.charge(&assessor_id, "lead-002", i64::MAX).await;

    response.assert_status(StatusCode::UNPROCESSABLE_ENTITY);
    let body: Value = response.json();
    assert_eq!(body["error"]["code"], "invalid_amount");

    let response = harness
        .server
        .get(&format!("/v1/assessors/{assessor_id}/billing"))
        .add_header("x-api-key", SERVICE_API_KEY)
        .await;
    let body: Value = response.json();
    assert_eq!(body["current_period_spend_pence"], 1500);
}

#[tokio::test]
async fn unknown_assessor_is_not_found() {
    let harness = TestHarness::new();
    let assessor_id = epc_billing_core::AssessorId::generate().to_string();

    let response = harness.charge(&assessor_id, "lead-001", 1500).await;

    response.assert_status_not_found();
}

// ============================================================================
// Auth
// ============================================================================

#[tokio::test]
async fn charge_without_api_key_fails() {
    let harness = TestHarness::new();

    let response = harness
        .server
        .post("/v1/leads/charges")
        .json(&json!({
            "assessor_id": epc_billing_core::AssessorId::generate().to_string(),
            "lead_id": "lead-001",
            "postcode": "SW1A 1AA"
        }))
        .await;

    response.assert_status_unauthorized();
}

#[tokio::test]
async fn charge_with_wrong_api_key_fails() {
    let harness = TestHarness::new();
    let assessor_id = harness.create_assessor("Acme EPC").await;

    let response = harness
        .server
        .post("/v1/leads/charges")
        .add_header("x-api-key", "wrong-key")
        .json(&json!({
            "assessor_id": assessor_id,
            "lead_id": "lead-001",
            "postcode": "SW1A 1AA"
        }))
        .await;

    response.assert_status_unauthorized();
}

// ============================================================================
// Billing status for lead assignment
// ============================================================================

#[tokio::test]
async fn assessor_billing_status_reports_headroom() {
    let harness = TestHarness::new();
    let assessor_id = harness.create_assessor("Acme EPC").await;
    harness
        .charge(&assessor_id, "lead-001", 1500)
        .await
        .assert_status(StatusCode::CREATED);

    let response = harness
        .server
        .get(&format!("/v1/assessors/{assessor_id}/billing"))
        .add_header("x-api-key", SERVICE_API_KEY)
        .await;

    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["trust_level"], "bronze");
    assert_eq!(body["spending_threshold_pence"], 45_000);
    assert_eq!(body["remaining_before_threshold_pence"], 43_500);
    assert_eq!(body["account_paused"], false);
    assert_eq!(body["billing_blocked"], false);
}

#[tokio::test]
async fn malformed_assessor_id_is_bad_request() {
    let harness = TestHarness::new();

    let response = harness
        .server
        .get("/v1/assessors/not-an-id/billing")
        .add_header("x-api-key", SERVICE_API_KEY)
        .await;

    response.assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn concurrent_charges_are_all_counted() {
    let harness = TestHarness::new();
    let assessor_id = harness.create_assessor("Acme EPC").await;

    let lead_ids: Vec<String> = (0..20).map(|i| format!("lead-{i}")).collect();
    let charges = lead_ids
        .iter()
        .map(|lead_id| harness.charge(&assessor_id, lead_id, 1500));
    for response in futures::future::join_all(charges).await {
        response.assert_status(StatusCode::CREATED);
    }

    let response = harness
        .server
        .get(&format!("/v1/assessors/{assessor_id}/billing"))
        .add_header("x-api-key", SERVICE_API_KEY)
        .await;

    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["current_period_spend_pence"], 30_000);
    assert_eq!(body["current_period_lead_count"], 20);
}
