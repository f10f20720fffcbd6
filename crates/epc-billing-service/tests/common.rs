//! Common test utilities for epc-billing integration tests.

#![allow(dead_code)] // Some utilities are used by different test files

use std::sync::Arc;

use axum::Router;
use axum_test::{TestResponse, TestServer};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde_json::{json, Value};

use epc_billing_service::auth::JwtClaims;
use epc_billing_service::crypto::signature_header;
use epc_billing_service::{create_router, AppState, PaymentGateway, ServiceConfig};
use epc_billing_store::MemoryStore;

pub const SERVICE_API_KEY: &str = "test-service-key";
pub const ADMIN_API_KEY: &str = "test-admin-key";
pub const JWT_SECRET: &str = "test-jwt-secret";
pub const WEBHOOK_SECRET: &str = "whsec_test";

/// Test harness containing everything needed for integration tests.
pub struct TestHarness {
    /// The test server for making HTTP requests.
    pub server: TestServer,
    /// The backing store, for assertions that bypass the API.
    pub store: Arc<MemoryStore>,
}

impl TestHarness {
    /// Create a new test harness with a fresh in-memory store.
    pub fn new() -> Self {
        Self::with_gateway(None)
    }

    /// Create a harness whose engine collects through `gateway`.
    pub fn with_gateway(gateway: Option<Arc<dyn PaymentGateway>>) -> Self {
        let store = Arc::new(MemoryStore::new());
        let config = test_config();

        let state = AppState::with_gateway(store.clone(), config, gateway);
        let router: Router = create_router(state);

        let server = TestServer::new(router).expect("Failed to create test server");

        Self { server, store }
    }

    /// Bearer header for an assessor.
    pub fn assessor_auth_header(assessor_id: &str) -> String {
        let now = chrono::Utc::now().timestamp();
        let claims = JwtClaims {
            sub: assessor_id.to_string(),
            exp: now + 3600,
            iat: now,
        };
        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(JWT_SECRET.as_bytes()),
        )
        .expect("Failed to encode token");
        format!("Bearer {token}")
    }

    /// Register an assessor through the admin API and return its ID.
    pub async fn create_assessor(&self, name: &str) -> String {
        let response = self
            .server
            .post("/v1/admin/assessors")
            .add_header("x-admin-key", ADMIN_API_KEY)
            .json(&json!({ "display_name": name, "email": "billing@example.com" }))
            .await;
        response.assert_status(axum::http::StatusCode::CREATED);
        let body: Value = response.json();
        body["id"].as_str().expect("assessor id").to_string()
    }

    /// Charge a lead through the service API.
    pub async fn charge(&self, assessor_id: &str, lead_id: &str, amount_pence: i64) -> TestResponse {
        self.server
            .post("/v1/leads/charges")
            .add_header("x-api-key", SERVICE_API_KEY)
            .add_header("x-service-name", "lead-assignment")
            .json(&json!({
                "assessor_id": assessor_id,
                "lead_id": lead_id,
                "postcode": "SW1A 1AA",
                "amount_pence": amount_pence
            }))
            .await
    }

    /// Charge leads until the threshold closes the period; return the invoice.
    pub async fn charge_until_invoiced(&self, assessor_id: &str, prefix: &str) -> Value {
        for i in 0..1000 {
            let response = self.charge(assessor_id, &format!("{prefix}-{i}"), 1500).await;
            response.assert_status(axum::http::StatusCode::CREATED);
            let body: Value = response.json();
            if !body["invoice"].is_null() {
                return body["invoice"].clone();
            }
        }
        panic!("threshold never reached");
    }

    /// Charge one lead, close its period through the admin API and return
    /// the invoice.
    pub async fn invoice_for(&self, assessor_id: &str, lead_id: &str, amount_pence: i64) -> Value {
        let response = self.charge(assessor_id, lead_id, amount_pence).await;
        response.assert_status(axum::http::StatusCode::CREATED);
        let body: Value = response.json();
        let period_id = body["period_id"].as_str().expect("period id").to_string();

        let response = self
            .server
            .post(&format!("/v1/admin/periods/{period_id}/close"))
            .add_header("x-admin-key", ADMIN_API_KEY)
            .await;
        response.assert_status_ok();
        let body: Value = response.json();
        body["invoice"].clone()
    }

    /// Record a manual payment through the admin API.
    pub async fn pay(&self, invoice_id: &str) -> TestResponse {
        self.server
            .post(&format!("/v1/admin/invoices/{invoice_id}/payments"))
            .add_header("x-admin-key", ADMIN_API_KEY)
            .json(&json!({ "method": "bank_transfer" }))
            .await
    }

    /// Deliver a signed webhook.
    pub async fn webhook(&self, event: &Value) -> TestResponse {
        let payload = event.to_string();
        let header = signature_header(WEBHOOK_SECRET, chrono::Utc::now().timestamp(), &payload);
        self.server
            .post("/webhooks/payments")
            .add_header("stripe-signature", header)
            .text(payload)
            .await
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

/// Service configuration with every credential set and no real provider.
pub fn test_config() -> ServiceConfig {
    ServiceConfig {
        listen_addr: "127.0.0.1:0".into(),
        data_dir: String::new(),
        jwt_secret: Some(JWT_SECRET.into()),
        service_api_key: Some(SERVICE_API_KEY.into()),
        admin_api_key: Some(ADMIN_API_KEY.into()),
        stripe_api_key: None,
        stripe_webhook_secret: Some(WEBHOOK_SECRET.into()),
        ..ServiceConfig::default()
    }
}

/// A payment provider event about an invoice.
pub fn webhook_event(event_id: &str, event_type: &str, invoice_id: &str) -> Value {
    json!({
        "id": event_id,
        "type": event_type,
        "created": chrono::Utc::now().timestamp(),
        "data": {
            "object": {
                "id": "pi_test_123",
                "payment_method": "pm_card_visa",
                "metadata": { "invoice_id": invoice_id }
            }
        }
    })
}
