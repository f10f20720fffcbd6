//! API error types and responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use epc_billing_core::BillingError;

/// API error type.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Unauthorized - missing or invalid credentials.
    #[error("unauthorized")]
    Unauthorized,

    /// Forbidden - valid credentials but insufficient permissions.
    #[error("forbidden")]
    Forbidden,

    /// Resource not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// Bad request - invalid input.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// A billing rule rejected the operation.
    #[error(transparent)]
    Billing(#[from] BillingError),

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

/// JSON error response body.
#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    code: String,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<serde_json::Value>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message, details) = match self {
            Self::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                "unauthorized",
                "unauthorized".to_string(),
                None,
            ),
            Self::Forbidden => (
                StatusCode::FORBIDDEN,
                "forbidden",
                "forbidden".to_string(),
                None,
            ),
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg, None),
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg, None),
            Self::Billing(err) => billing_error_parts(&err),
            Self::Internal(msg) => {
                tracing::error!(error = %msg, "Internal server error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "An internal error occurred".to_string(),
                    None,
                )
            }
        };

        let body = ErrorResponse {
            error: ErrorBody {
                code: code.to_string(),
                message,
                details,
            },
        };

        (status, Json(body)).into_response()
    }
}

fn billing_error_parts(
    err: &BillingError,
) -> (StatusCode, &'static str, String, Option<serde_json::Value>) {
    let message = err.to_string();
    match err {
        BillingError::AccountPaused { assessor_id } => (
            StatusCode::CONFLICT,
            "account_paused",
            message,
            Some(serde_json::json!({ "assessor_id": assessor_id })),
        ),
        BillingError::BillingBlocked {
            assessor_id,
            outstanding,
        } => (
            StatusCode::CONFLICT,
            "billing_blocked",
            message,
            Some(serde_json::json!({
                "assessor_id": assessor_id,
                "outstanding_invoices": outstanding
            })),
        ),
        BillingError::NoOpenPeriod { .. } => {
            (StatusCode::CONFLICT, "no_open_period", message, None)
        }
        BillingError::DuplicateLeadCharge { lead_id } => (
            StatusCode::CONFLICT,
            "duplicate_lead_charge",
            message,
            Some(serde_json::json!({ "lead_id": lead_id })),
        ),
        BillingError::DuplicatePaymentEvent {
            event_id,
            invoice_id,
        } => (
            StatusCode::CONFLICT,
            "duplicate_payment_event",
            message,
            Some(serde_json::json!({ "event_id": event_id, "invoice_id": invoice_id })),
        ),
        BillingError::InvalidTransition {
            invoice_id,
            from,
            action,
        } => (
            StatusCode::CONFLICT,
            "invalid_transition",
            message,
            Some(serde_json::json!({
                "invoice_id": invoice_id,
                "status": from.as_str(),
                "action": action
            })),
        ),
        BillingError::AssessorAlreadyExists { .. } => {
            (StatusCode::CONFLICT, "assessor_already_exists", message, None)
        }
        BillingError::OverCredit {
            invoice_amount,
            already_credited,
            requested,
            ..
        } => (
            StatusCode::UNPROCESSABLE_ENTITY,
            "over_credit",
            message,
            Some(serde_json::json!({
                "invoice_amount_pence": invoice_amount,
                "already_credited_pence": already_credited,
                "requested_pence": requested
            })),
        ),
        BillingError::InvalidLeadRef { lead_id, .. } => (
            StatusCode::UNPROCESSABLE_ENTITY,
            "invalid_lead_ref",
            message,
            Some(serde_json::json!({ "lead_id": lead_id })),
        ),
        BillingError::InvalidAmount(_) => {
            (StatusCode::UNPROCESSABLE_ENTITY, "invalid_amount", message, None)
        }
        BillingError::ThresholdNotAllowed { min, max, .. } => (
            StatusCode::UNPROCESSABLE_ENTITY,
            "threshold_not_allowed",
            message,
            Some(serde_json::json!({ "min_pence": min, "max_pence": max })),
        ),
        BillingError::InvoiceNotFound { .. } => {
            (StatusCode::NOT_FOUND, "invoice_not_found", message, None)
        }
        BillingError::AssessorNotFound { .. } => {
            (StatusCode::NOT_FOUND, "assessor_not_found", message, None)
        }
        BillingError::PeriodNotFound { .. } => {
            (StatusCode::NOT_FOUND, "period_not_found", message, None)
        }
        BillingError::InvalidId(_) => (StatusCode::BAD_REQUEST, "invalid_id", message, None),
        BillingError::Storage(_)
        | BillingError::Serialization(_)
        | BillingError::Configuration(_) => {
            tracing::error!(error = %err, "Billing backend failure");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal_error",
                "An internal error occurred".to_string(),
                None,
            )
        }
    }
}
