//! Billing admin handlers.
//!
//! Manual payment entry, dispute handling, credit notes and trust overrides.
//! Every mutation is logged with the acting admin.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use epc_billing_core::{
    Assessor, AssessorId, BillingSummary, CreditNote, CreditRequest, DisputeResolution, Invoice,
    InvoiceId, PeriodId, ResolutionReceipt, TrustLevel,
};

use super::{parse_id, ListParams, Page};
use crate::auth::AdminAuth;
use crate::engine::{NewAssessor, PaymentInput, PaymentUpdate, SweepReport, TrustOverride};
use crate::error::ApiError;
use crate::state::AppState;

/// Assessor with its billing state.
#[derive(Debug, Serialize)]
pub struct AssessorDetail {
    /// The assessor profile.
    pub assessor: Assessor,
    /// Derived billing state.
    pub summary: BillingSummary,
}

/// Trust level override request.
#[derive(Debug, Deserialize)]
pub struct TrustLevelRequest {
    /// Level to set.
    pub level: TrustLevel,
    /// Audit reason.
    pub reason: String,
}

/// Manually recorded payment (bank transfer, cheque).
#[derive(Debug, Deserialize)]
pub struct ManualPaymentRequest {
    /// Payment method or reference.
    pub method: String,
    /// Idempotency key; generated when absent.
    #[serde(default)]
    pub event_id: Option<String>,
    /// When the money arrived; defaults to now.
    #[serde(default)]
    pub paid_at: Option<DateTime<Utc>>,
}

/// Manually recorded failure or dispute.
#[derive(Debug, Default, Deserialize)]
pub struct PaymentEventRequest {
    /// Idempotency key; generated when absent.
    #[serde(default)]
    pub event_id: Option<String>,
}

/// Invoice with its credit notes.
#[derive(Debug, Serialize)]
pub struct InvoiceDetail {
    /// The invoice.
    pub invoice: Invoice,
    /// Credit notes issued against it.
    pub credit_notes: Vec<CreditNote>,
}

/// Result of a manual period close.
#[derive(Debug, Serialize)]
pub struct CloseResponse {
    /// False when the period was already closed.
    pub closed: bool,
    /// The issued invoice.
    pub invoice: Option<Invoice>,
}

fn manual_event_id(event_id: Option<String>) -> String {
    event_id.unwrap_or_else(|| format!("manual-{}", uuid::Uuid::new_v4()))
}

// =============================================================================
// Assessors
// =============================================================================

/// Register an assessor for billing.
pub async fn create_assessor(
    State(state): State<Arc<AppState>>,
    auth: AdminAuth,
    Json(body): Json<NewAssessor>,
) -> Result<(StatusCode, Json<Assessor>), ApiError> {
    if body.display_name.trim().is_empty() {
        return Err(ApiError::BadRequest("display_name is required".into()));
    }

    let assessor = state.engine.register_assessor(body).await?;
    tracing::info!(admin_id = %auth.admin_id, assessor_id = %assessor.id, "Assessor created by admin");
    Ok((StatusCode::CREATED, Json(assessor)))
}

/// Get an assessor and its billing state.
pub async fn get_assessor(
    State(state): State<Arc<AppState>>,
    _auth: AdminAuth,
    Path(assessor_id): Path<String>,
) -> Result<Json<AssessorDetail>, ApiError> {
    let assessor_id: AssessorId = parse_id(&assessor_id, "assessor ID")?;
    let assessor = state.engine.get_assessor(&assessor_id)?;
    let summary = state.engine.billing_summary(&assessor_id)?;
    Ok(Json(AssessorDetail { assessor, summary }))
}

/// Pause an assessor.
pub async fn pause_assessor(
    State(state): State<Arc<AppState>>,
    auth: AdminAuth,
    Path(assessor_id): Path<String>,
) -> Result<Json<BillingSummary>, ApiError> {
    let assessor_id: AssessorId = parse_id(&assessor_id, "assessor ID")?;
    tracing::info!(admin_id = %auth.admin_id, assessor_id = %assessor_id, "Admin pause");
    Ok(Json(state.engine.pause(assessor_id).await?))
}

/// Resume an assessor.
pub async fn resume_assessor(
    State(state): State<Arc<AppState>>,
    auth: AdminAuth,
    Path(assessor_id): Path<String>,
) -> Result<Json<BillingSummary>, ApiError> {
    let assessor_id: AssessorId = parse_id(&assessor_id, "assessor ID")?;
    tracing::info!(admin_id = %auth.admin_id, assessor_id = %assessor_id, "Admin resume");
    Ok(Json(state.engine.resume(assessor_id).await?))
}

/// Override an assessor's trust level.
pub async fn set_trust_level(
    State(state): State<Arc<AppState>>,
    auth: AdminAuth,
    Path(assessor_id): Path<String>,
    Json(body): Json<TrustLevelRequest>,
) -> Result<Json<TrustOverride>, ApiError> {
    let assessor_id: AssessorId = parse_id(&assessor_id, "assessor ID")?;
    if body.reason.trim().is_empty() {
        return Err(ApiError::BadRequest("reason is required".into()));
    }

    tracing::info!(
        admin_id = %auth.admin_id,
        assessor_id = %assessor_id,
        level = body.level.as_str(),
        "Admin trust override"
    );
    let result = state
        .engine
        .override_trust_level(assessor_id, body.level, &body.reason)
        .await?;
    Ok(Json(result))
}

/// List an assessor's invoices.
pub async fn list_assessor_invoices(
    State(state): State<Arc<AppState>>,
    _auth: AdminAuth,
    Path(assessor_id): Path<String>,
    Query(params): Query<ListParams>,
) -> Result<Json<Page<Invoice>>, ApiError> {
    let assessor_id: AssessorId = parse_id(&assessor_id, "assessor ID")?;
    let invoices = state
        .engine
        .list_invoices(&assessor_id, params.page_size(), params.offset)?;
    Ok(Json(Page::new(invoices, params)))
}

/// List an assessor's credit notes.
pub async fn list_assessor_credit_notes(
    State(state): State<Arc<AppState>>,
    _auth: AdminAuth,
    Path(assessor_id): Path<String>,
    Query(params): Query<ListParams>,
) -> Result<Json<Page<CreditNote>>, ApiError> {
    let assessor_id: AssessorId = parse_id(&assessor_id, "assessor ID")?;
    let notes = state
        .engine
        .list_credit_notes(&assessor_id, params.page_size(), params.offset)?;
    Ok(Json(Page::new(notes, params)))
}

// =============================================================================
// Invoices
// =============================================================================

/// Get an invoice and its credit notes.
pub async fn get_invoice(
    State(state): State<Arc<AppState>>,
    _auth: AdminAuth,
    Path(invoice_id): Path<String>,
) -> Result<Json<InvoiceDetail>, ApiError> {
    let invoice_id: InvoiceId = parse_id(&invoice_id, "invoice ID")?;
    let invoice = state.engine.get_invoice(&invoice_id)?;
    let credit_notes = state.engine.invoice_credit_notes(&invoice_id)?;
    Ok(Json(InvoiceDetail {
        invoice,
        credit_notes,
    }))
}

/// Record a manual payment.
pub async fn record_payment(
    State(state): State<Arc<AppState>>,
    auth: AdminAuth,
    Path(invoice_id): Path<String>,
    Json(body): Json<ManualPaymentRequest>,
) -> Result<Json<PaymentUpdate>, ApiError> {
    let invoice_id: InvoiceId = parse_id(&invoice_id, "invoice ID")?;
    if body.method.trim().is_empty() {
        return Err(ApiError::BadRequest("method is required".into()));
    }

    tracing::info!(admin_id = %auth.admin_id, invoice_id = %invoice_id, "Manual payment");
    let payment = PaymentInput {
        method: body.method,
        event_id: manual_event_id(body.event_id),
        paid_at: body.paid_at.unwrap_or_else(Utc::now),
    };
    Ok(Json(state.engine.record_payment(invoice_id, payment).await?))
}

/// Record a payment failure.
pub async fn record_failure(
    State(state): State<Arc<AppState>>,
    auth: AdminAuth,
    Path(invoice_id): Path<String>,
    body: Option<Json<PaymentEventRequest>>,
) -> Result<Json<PaymentUpdate>, ApiError> {
    let invoice_id: InvoiceId = parse_id(&invoice_id, "invoice ID")?;
    let body = body.map(|Json(b)| b).unwrap_or_default();
    let event_id = manual_event_id(body.event_id);

    tracing::info!(admin_id = %auth.admin_id, invoice_id = %invoice_id, "Manual payment failure");
    Ok(Json(
        state
            .engine
            .record_payment_failure(invoice_id, &event_id)
            .await?,
    ))
}

/// Mark an invoice disputed.
pub async fn dispute_invoice(
    State(state): State<Arc<AppState>>,
    auth: AdminAuth,
    Path(invoice_id): Path<String>,
    body: Option<Json<PaymentEventRequest>>,
) -> Result<Json<PaymentUpdate>, ApiError> {
    let invoice_id: InvoiceId = parse_id(&invoice_id, "invoice ID")?;
    let body = body.map(|Json(b)| b).unwrap_or_default();

    tracing::info!(admin_id = %auth.admin_id, invoice_id = %invoice_id, "Manual dispute");
    Ok(Json(
        state
            .engine
            .mark_disputed(invoice_id, body.event_id.as_deref())
            .await?,
    ))
}

/// Resolve a disputed invoice.
pub async fn resolve_dispute(
    State(state): State<Arc<AppState>>,
    auth: AdminAuth,
    Path(invoice_id): Path<String>,
    Json(body): Json<DisputeResolution>,
) -> Result<Json<ResolutionReceipt>, ApiError> {
    let invoice_id: InvoiceId = parse_id(&invoice_id, "invoice ID")?;

    tracing::info!(
        admin_id = %auth.admin_id,
        invoice_id = %invoice_id,
        resolution = ?body,
        "Resolving dispute"
    );
    Ok(Json(state.engine.resolve_dispute(invoice_id, body).await?))
}

/// Issue a credit note.
pub async fn issue_credit(
    State(state): State<Arc<AppState>>,
    auth: AdminAuth,
    Path(invoice_id): Path<String>,
    Json(body): Json<CreditRequest>,
) -> Result<(StatusCode, Json<CreditNote>), ApiError> {
    let invoice_id: InvoiceId = parse_id(&invoice_id, "invoice ID")?;
    if body.reason.trim().is_empty() {
        return Err(ApiError::BadRequest("reason is required".into()));
    }

    tracing::info!(admin_id = %auth.admin_id, invoice_id = %invoice_id, "Issuing credit note");
    let note = state.engine.issue_credit(invoice_id, body).await?;
    Ok((StatusCode::CREATED, Json(note)))
}

// =============================================================================
// Periods
// =============================================================================

/// Close a period early.
pub async fn close_period(
    State(state): State<Arc<AppState>>,
    auth: AdminAuth,
    Path(period_id): Path<String>,
) -> Result<Json<CloseResponse>, ApiError> {
    let period_id: PeriodId = parse_id(&period_id, "period ID")?;

    tracing::info!(admin_id = %auth.admin_id, period_id = %period_id, "Manual period close");
    let invoice = state.engine.close_period(period_id).await?;
    Ok(Json(CloseResponse {
        closed: invoice.is_some(),
        invoice,
    }))
}

/// Run the period-end sweep now.
pub async fn run_sweep(
    State(state): State<Arc<AppState>>,
    auth: AdminAuth,
) -> Result<Json<SweepReport>, ApiError> {
    tracing::info!(admin_id = %auth.admin_id, "Manual period sweep");
    Ok(Json(state.engine.sweep_all(Utc::now()).await?))
}
