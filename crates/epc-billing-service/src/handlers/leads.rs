//! Lead charge handlers for lead-assignment services.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;

use epc_billing_core::{format_pence, AssessorId, BillingSummary, Invoice, PeriodId};

use super::parse_id;
use crate::auth::ServiceAuth;
use crate::engine::LeadChargeRequest;
use crate::error::ApiError;
use crate::state::AppState;

/// Lead charge response.
#[derive(Debug, Serialize)]
pub struct ChargeResponse {
    /// The charged lead.
    pub lead_id: String,
    /// The billed assessor.
    pub assessor_id: AssessorId,
    /// Period the lead was charged into.
    pub period_id: PeriodId,
    /// Amount charged in pence.
    pub amount_pence: i64,
    /// Amount formatted as pounds.
    pub amount_formatted: String,
    /// Period spend after this charge.
    pub accumulated_spend_pence: i64,
    /// Leads in the period after this charge.
    pub lead_count: u32,
    /// Invoice issued because the threshold was reached.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub invoice: Option<Invoice>,
}

/// Charge a delivered lead.
pub async fn charge_lead(
    State(state): State<Arc<AppState>>,
    auth: ServiceAuth,
    Json(body): Json<LeadChargeRequest>,
) -> Result<(StatusCode, Json<ChargeResponse>), ApiError> {
    tracing::debug!(
        service = %auth.service_name,
        assessor_id = %body.assessor_id,
        lead_id = %body.lead_id,
        "Processing lead charge"
    );

    let lead_id = body.lead_id.clone();
    let assessor_id = body.assessor_id;
    let receipt = state.engine.record_lead_charge(body).await?;

    Ok((
        StatusCode::CREATED,
        Json(ChargeResponse {
            lead_id,
            assessor_id,
            period_id: receipt.period_id,
            amount_pence: receipt.amount_pence,
            amount_formatted: format_pence(receipt.amount_pence),
            accumulated_spend_pence: receipt.new_accumulated_spend_pence,
            lead_count: receipt.lead_count,
            invoice: receipt.invoice,
        }),
    ))
}

/// Billing status for lead assignment (paused, blocked, headroom).
pub async fn get_assessor_billing(
    State(state): State<Arc<AppState>>,
    _auth: ServiceAuth,
    Path(assessor_id): Path<String>,
) -> Result<Json<BillingSummary>, ApiError> {
    let assessor_id: AssessorId = parse_id(&assessor_id, "assessor ID")?;
    Ok(Json(state.engine.billing_summary(&assessor_id)?))
}
