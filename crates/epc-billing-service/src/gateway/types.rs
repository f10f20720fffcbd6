//! Stripe API and webhook types.

use serde::Deserialize;

/// Stripe `PaymentIntent` object.
#[derive(Debug, Clone, Deserialize)]
pub struct PaymentIntent {
    /// Payment intent ID.
    pub id: String,
    /// Amount in pence.
    #[serde(default)]
    pub amount: i64,
    /// Currency (always "gbp" here).
    #[serde(default)]
    pub currency: String,
    /// Status (processing, succeeded, `requires_payment_method`, ...).
    #[serde(default)]
    pub status: String,
    /// Metadata; carries our `invoice_id`.
    #[serde(default)]
    pub metadata: serde_json::Value,
}

/// Stripe API error response.
#[derive(Debug, Clone, Deserialize)]
pub struct StripeErrorResponse {
    /// Error details.
    pub error: StripeErrorDetail,
}

/// Stripe error detail.
#[derive(Debug, Clone, Deserialize)]
pub struct StripeErrorDetail {
    /// Error type.
    #[serde(rename = "type")]
    pub error_type: String,
    /// Error message.
    #[serde(default)]
    pub message: String,
    /// Error code.
    #[serde(default)]
    pub code: Option<String>,
}

/// Webhook event envelope.
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookEvent {
    /// Event ID; the idempotency key for payment outcomes.
    pub id: String,
    /// Event type.
    #[serde(rename = "type")]
    pub event_type: String,
    /// Creation time (Unix seconds).
    #[serde(default)]
    pub created: Option<i64>,
    /// Event data.
    pub data: WebhookEventData,
}

/// Webhook event data container.
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookEventData {
    /// The payment intent, charge or dispute the event is about.
    pub object: WebhookObject,
}

/// The fields we read from a webhook's data object.
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookObject {
    /// Provider object ID.
    #[serde(default)]
    pub id: Option<String>,
    /// Payment method used, when present.
    #[serde(default)]
    pub payment_method: Option<String>,
    /// Metadata; carries our `invoice_id`.
    #[serde(default)]
    pub metadata: serde_json::Value,
}

impl WebhookObject {
    /// The invoice this object was created for.
    #[must_use]
    pub fn invoice_id(&self) -> Option<&str> {
        self.metadata.get("invoice_id").and_then(|v| v.as_str())
    }
}
