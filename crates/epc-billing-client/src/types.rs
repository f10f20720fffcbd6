//! Request and response types for the EPC billing API.

use serde::{Deserialize, Serialize};

use epc_billing_core::{AssessorId, Invoice, PeriodId};

pub use epc_billing_core::{BillingSummary, TrustLevel};

/// A delivered lead to charge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeadCharge {
    /// Assessor receiving the lead.
    pub assessor_id: AssessorId,
    /// Marketplace lead ID; charging the same lead twice is rejected.
    pub lead_id: String,
    /// Property postcode, used for pricing.
    pub postcode: String,
    /// Price override in pence; the service prices by postcode when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount_pence: Option<i64>,
}

/// Result of a lead charge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeadChargeReceipt {
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
    #[serde(default)]
    pub invoice: Option<Invoice>,
}

/// API error response.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiErrorResponse {
    /// Error details.
    pub error: ApiErrorDetail,
}

/// API error detail.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiErrorDetail {
    /// Error code.
    pub code: String,
    /// Error message.
    pub message: String,
    /// Additional details.
    #[serde(default)]
    pub details: Option<serde_json::Value>,
}
