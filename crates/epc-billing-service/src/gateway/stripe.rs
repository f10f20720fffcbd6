//! Stripe payment gateway.

use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;

use epc_billing_core::Invoice;

use super::types::{PaymentIntent, StripeErrorResponse};
use super::{ChargeAttempt, GatewayError, PaymentGateway};
use crate::crypto::{constant_time_eq, hmac_sha256_hex};

/// Maximum age of a signed webhook, in seconds.
pub const WEBHOOK_TOLERANCE_SECONDS: i64 = 300;

/// Stripe API client used to collect invoices.
#[derive(Debug, Clone)]
pub struct StripeGateway {
    client: Client,
    api_key: String,
    base_url: String,
}

impl StripeGateway {
    /// Stripe API base URL.
    const BASE_URL: &'static str = "https://api.stripe.com/v1";

    /// Create a gateway against the live Stripe API.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(api_key: impl Into<String>) -> Result<Self, GatewayError> {
        Self::with_base_url(api_key, Self::BASE_URL)
    }

    /// Create a gateway against another base URL (test doubles, proxies).
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn with_base_url(
        api_key: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Result<Self, GatewayError> {
        let client = Client::builder().timeout(Duration::from_secs(30)).build()?;

        Ok(Self {
            client,
            api_key: api_key.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    /// Handle API response and convert errors.
    async fn handle_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, GatewayError> {
        let status = response.status();

        if status.is_success() {
            return Ok(response.json().await?);
        }

        match response.json::<StripeErrorResponse>().await {
            Ok(body) => Err(GatewayError::Api {
                error_type: body.error.error_type,
                message: body.error.message,
                code: body.error.code,
            }),
            Err(_) => Err(GatewayError::Api {
                error_type: "unknown".to_string(),
                message: format!("HTTP {status}"),
                code: None,
            }),
        }
    }
}

#[async_trait]
impl PaymentGateway for StripeGateway {
    async fn charge_invoice(&self, invoice: &Invoice) -> Result<ChargeAttempt, GatewayError> {
        let params = [
            ("amount", invoice.amount_due_pence().to_string()),
            ("currency", "gbp".to_string()),
            ("confirm", "true".to_string()),
            ("off_session", "true".to_string()),
            ("description", format!("EPC leads invoice {}", invoice.id)),
            ("metadata[invoice_id]", invoice.id.to_string()),
            ("metadata[assessor_id]", invoice.assessor_id.to_string()),
            ("metadata[period_id]", invoice.period_id.to_string()),
        ];

        tracing::debug!(
            invoice_id = %invoice.id,
            assessor_id = %invoice.assessor_id,
            amount_pence = invoice.amount_due_pence(),
            "Creating payment intent"
        );

        let response = self
            .client
            .post(format!("{}/payment_intents", self.base_url))
            .basic_auth(&self.api_key, Option::<&str>::None)
            .header("Idempotency-Key", format!("invoice-{}", invoice.id))
            .form(&params)
            .send()
            .await?;

        let intent: PaymentIntent = Self::handle_response(response).await?;

        Ok(ChargeAttempt {
            success: intent.status != "canceled" && intent.status != "requires_payment_method",
            provider_ref: Some(intent.id),
        })
    }
}

/// Verify a `t=<timestamp>,v1=<signature>[,v1=...]` webhook signature header.
///
/// The signature is HMAC-SHA256 over `"{timestamp}.{payload}"`. Signatures
/// older than [`WEBHOOK_TOLERANCE_SECONDS`] relative to `now_unix` are rejected.
///
/// # Errors
///
/// Returns `InvalidSignature` for a malformed, stale or mismatched header.
pub fn verify_webhook_signature(
    secret: &str,
    payload: &str,
    header: &str,
    now_unix: i64,
) -> Result<(), GatewayError> {
    let mut timestamp: Option<&str> = None;
    let mut signatures: Vec<&str> = Vec::new();

    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", ts)) => timestamp = Some(ts),
            Some(("v1", sig)) => signatures.push(sig),
            _ => {}
        }
    }

    let timestamp = timestamp.ok_or(GatewayError::InvalidSignature)?;
    let signed_at: i64 = timestamp
        .parse()
        .map_err(|_| GatewayError::InvalidSignature)?;
    if (now_unix - signed_at).abs() > WEBHOOK_TOLERANCE_SECONDS {
        return Err(GatewayError::InvalidSignature);
    }

    let expected = hmac_sha256_hex(secret, &format!("{timestamp}.{payload}"));
    if signatures.iter().any(|sig| constant_time_eq(&expected, sig)) {
        Ok(())
    } else {
        Err(GatewayError::InvalidSignature)
    }
}
