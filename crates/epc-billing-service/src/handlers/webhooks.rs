//! Payment provider webhook.

use std::sync::Arc;

use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Serialize;

use epc_billing_core::{BillingError, InvoiceId, PaymentOutcome};

use crate::engine::PaymentInput;
use crate::error::ApiError;
use crate::gateway::types::WebhookEvent;
use crate::gateway::verify_webhook_signature;
use crate::state::AppState;

/// Webhook response.
#[derive(Debug, Serialize)]
pub struct WebhookResponse {
    /// Whether the webhook was accepted.
    pub received: bool,
    /// The event had already been applied.
    pub duplicate: bool,
    /// The invoice the event applied to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub invoice_id: Option<InvoiceId>,
}

impl WebhookResponse {
    const fn ignored() -> Self {
        Self {
            received: true,
            duplicate: false,
            invoice_id: None,
        }
    }
}

/// Handle payment outcome webhooks.
pub async fn payment_webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: String,
) -> Result<Json<WebhookResponse>, ApiError> {
    if let Some(secret) = &state.config.stripe_webhook_secret {
        let signature = headers
            .get("stripe-signature")
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| ApiError::BadRequest("Missing webhook signature".into()))?;

        verify_webhook_signature(secret, &body, signature, Utc::now().timestamp()).map_err(
            |e| {
                tracing::warn!(error = %e, "Invalid webhook signature");
                ApiError::BadRequest("Invalid webhook signature".into())
            },
        )?;
    } else {
        tracing::warn!("Webhook secret not configured - skipping signature verification");
    }

    let event: WebhookEvent =
        serde_json::from_str(&body).map_err(|e| ApiError::BadRequest(e.to_string()))?;

    tracing::info!(
        event_type = %event.event_type,
        event_id = %event.id,
        "Received payment webhook"
    );

    let handled = matches!(
        event.event_type.as_str(),
        "payment_intent.succeeded" | "payment_intent.payment_failed" | "charge.dispute.created"
    );
    if !handled {
        tracing::debug!(event_type = %event.event_type, "Unhandled webhook event");
        return Ok(Json(WebhookResponse::ignored()));
    }

    let object = &event.data.object;
    let Some(invoice_id) = object.invoice_id().and_then(|id| id.parse::<InvoiceId>().ok())
    else {
        tracing::warn!(event_id = %event.id, "Webhook object has no usable invoice_id - ignoring");
        return Ok(Json(WebhookResponse::ignored()));
    };

    let (outcome, applied) = match event.event_type.as_str() {
        "payment_intent.succeeded" => {
            let method = object
                .payment_method
                .clone()
                .or_else(|| object.id.clone())
                .unwrap_or_else(|| "card".to_string());
            let paid_at = event
                .created
                .and_then(|ts| DateTime::from_timestamp(ts, 0))
                .unwrap_or_else(Utc::now);
            let applied = state
                .engine
                .record_payment(
                    invoice_id,
                    PaymentInput {
                        method,
                        event_id: event.id.clone(),
                        paid_at,
                    },
                )
                .await;
            (PaymentOutcome::Succeeded, applied)
        }
        "payment_intent.payment_failed" => {
            let applied = state
                .engine
                .record_payment_failure(invoice_id, &event.id)
                .await;
            (PaymentOutcome::Failed, applied)
        }
        _ => {
            let applied = state
                .engine
                .mark_disputed(invoice_id, Some(&event.id))
                .await;
            (PaymentOutcome::Disputed, applied)
        }
    };

    // Outcomes for paid or cancelled invoices are acknowledged so the
    // provider stops redelivering them.
    let update = match applied {
        Err(BillingError::InvalidTransition { from, .. }) if from.is_terminal() => {
            state
                .engine
                .acknowledge_stale_event(invoice_id, &event.id, outcome)
                .await?
        }
        other => other?,
    };

    Ok(Json(WebhookResponse {
        received: true,
        duplicate: update.duplicate,
        invoice_id: Some(invoice_id),
    }))
}
