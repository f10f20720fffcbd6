//! Assessor self-service billing handlers.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use epc_billing_core::{BillingSummary, CreditNote, Invoice, LimitEffect};

use super::{ListParams, Page};
use crate::auth::AssessorAuth;
use crate::error::ApiError;
use crate::state::AppState;

/// Spending limit selection.
#[derive(Debug, Deserialize)]
pub struct SpendingLimitRequest {
    /// New limit in pence.
    pub limit_pence: i64,
}

/// Spending limit response.
#[derive(Debug, Serialize)]
pub struct SpendingLimitResponse {
    /// Whether the limit applies now or after the next invoice.
    pub effect: LimitEffect,
    /// Billing state after the change.
    pub summary: BillingSummary,
}

/// Get the caller's billing summary.
pub async fn get_my_billing(
    State(state): State<Arc<AppState>>,
    auth: AssessorAuth,
) -> Result<Json<BillingSummary>, ApiError> {
    Ok(Json(state.engine.billing_summary(&auth.assessor_id)?))
}

/// Pause lead purchasing.
pub async fn pause_me(
    State(state): State<Arc<AppState>>,
    auth: AssessorAuth,
) -> Result<Json<BillingSummary>, ApiError> {
    Ok(Json(state.engine.pause(auth.assessor_id).await?))
}

/// Resume lead purchasing.
pub async fn resume_me(
    State(state): State<Arc<AppState>>,
    auth: AssessorAuth,
) -> Result<Json<BillingSummary>, ApiError> {
    Ok(Json(state.engine.resume(auth.assessor_id).await?))
}

/// Select a spending limit.
pub async fn set_my_limit(
    State(state): State<Arc<AppState>>,
    auth: AssessorAuth,
    Json(body): Json<SpendingLimitRequest>,
) -> Result<Json<SpendingLimitResponse>, ApiError> {
    let (effect, summary) = state
        .engine
        .set_spending_limit(auth.assessor_id, body.limit_pence)
        .await?;
    Ok(Json(SpendingLimitResponse { effect, summary }))
}

/// List the caller's invoices.
pub async fn list_my_invoices(
    State(state): State<Arc<AppState>>,
    auth: AssessorAuth,
    Query(params): Query<ListParams>,
) -> Result<Json<Page<Invoice>>, ApiError> {
    let invoices =
        state
            .engine
            .list_invoices(&auth.assessor_id, params.page_size(), params.offset)?;
    Ok(Json(Page::new(invoices, params)))
}

/// List the caller's credit notes.
pub async fn list_my_credit_notes(
    State(state): State<Arc<AppState>>,
    auth: AssessorAuth,
    Query(params): Query<ListParams>,
) -> Result<Json<Page<CreditNote>>, ApiError> {
    let notes =
        state
            .engine
            .list_credit_notes(&auth.assessor_id, params.page_size(), params.offset)?;
    Ok(Json(Page::new(notes, params)))
}
