//! Payment gateway tests against a mock provider.

mod common;

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::json;
use wiremock::matchers::{body_string_contains, header, header_exists, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use common::{TestHarness, ADMIN_API_KEY};
use epc_billing_core::{
    AssessorId, CloseReason, Invoice, InvoiceId, InvoiceStatus, PeriodId,
};
use epc_billing_service::{GatewayError, PaymentGateway, StripeGateway};

fn invoice(amount_pence: i64) -> Invoice {
    let now = Utc::now();
    Invoice {
        id: InvoiceId::generate(),
        assessor_id: AssessorId::generate(),
        period_id: PeriodId::generate(),
        amount_pence,
        credit_applied_pence: 0,
        lead_count: 1,
        close_reason: CloseReason::Threshold,
        auto_charge: true,
        status: InvoiceStatus::Pending,
        issued_at: now,
        due_at: now + chrono::Duration::days(30),
        paid_at: None,
        payment_method_ref: None,
        resolved_at: None,
    }
}

#[tokio::test]
async fn charge_creates_payment_intent_for_amount_due() {
    let server = MockServer::start().await;
    let invoice = invoice(45_000);

    Mock::given(method("POST"))
        .and(path("/payment_intents"))
        .and(header("Idempotency-Key", format!("invoice-{}", invoice.id).as_str()))
        .and(header_exists("authorization"))
        .and(body_string_contains("amount=45000"))
        .and(body_string_contains("currency=gbp"))
        .and(body_string_contains(invoice.id.to_string().as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "pi_123",
            "amount": 45000,
            "currency": "gbp",
            "status": "processing"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let gateway = StripeGateway::with_base_url("sk_test_123", server.uri()).unwrap();
    let attempt = gateway.charge_invoice(&invoice).await.unwrap();

    assert!(attempt.success);
    assert_eq!(attempt.provider_ref.as_deref(), Some("pi_123"));
}

#[tokio::test]
async fn declined_card_is_not_a_success() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/payment_intents"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "pi_456",
            "status": "requires_payment_method"
        })))
        .mount(&server)
        .await;

    let gateway = StripeGateway::with_base_url("sk_test_123", server.uri()).unwrap();
    let attempt = gateway.charge_invoice(&invoice(1500)).await.unwrap();

    assert!(!attempt.success);
}

#[tokio::test]
async fn provider_error_is_surfaced() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/payment_intents"))
        .respond_with(ResponseTemplate::new(402).set_body_json(json!({
            "error": {
                "type": "card_error",
                "message": "Your card was declined.",
                "code": "card_declined"
            }
        })))
        .mount(&server)
        .await;

    let gateway = StripeGateway::with_base_url("sk_test_123", server.uri()).unwrap();
    let err = gateway.charge_invoice(&invoice(1500)).await.unwrap_err();

    match err {
        GatewayError::Api {
            error_type, code, ..
        } => {
            assert_eq!(error_type, "card_error");
            assert_eq!(code.as_deref(), Some("card_declined"));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn threshold_invoice_is_auto_charged() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/payment_intents"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "pi_789",
            "status": "processing"
        })))
        .mount(&server)
        .await;

    let gateway = StripeGateway::with_base_url("sk_test_123", server.uri()).unwrap();
    let harness = TestHarness::with_gateway(Some(Arc::new(gateway) as Arc<dyn PaymentGateway>));
    let assessor_id = harness.create_assessor("Acme EPC").await;

    let invoice = harness.charge_until_invoiced(&assessor_id, "lead").await;
    let invoice_id = invoice["id"].as_str().unwrap().to_string();

    let mut requests = Vec::new();
    for _ in 0..100 {
        requests = server.received_requests().await.unwrap_or_default();
        if !requests.is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    assert_eq!(requests.len(), 1);
    let body = String::from_utf8_lossy(&requests[0].body);
    assert!(body.contains("amount=45000"));
    assert!(body.contains(&invoice_id));

    // Collection is asynchronous; the invoice stays pending until the webhook.
    let response = harness
        .server
        .get(&format!("/v1/admin/invoices/{invoice_id}"))
        .add_header("x-admin-key", ADMIN_API_KEY)
        .await;
    let detail: serde_json::Value = response.json();
    assert_eq!(detail["invoice"]["status"], "pending");
}
