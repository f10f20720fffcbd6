//! Error types for EPC billing.

use crate::ids::IdError;

/// Result type for billing operations.
pub type Result<T> = std::result::Result<T, BillingError>;

/// Errors that can occur in billing operations.
///
/// Every variant except the storage/serialization/configuration group is a
/// recoverable condition; the caller decides how to present it.
#[derive(Debug, thiserror::Error)]
pub enum BillingError {
    /// Lead purchasing is paused for the assessor.
    #[error("account paused: {assessor_id}")]
    AccountPaused {
        /// The paused assessor.
        assessor_id: String,
    },

    /// No open billing period could be found or opened.
    #[error("no open billing period for assessor {assessor_id}")]
    NoOpenPeriod {
        /// The assessor whose book is inconsistent.
        assessor_id: String,
    },

    /// Billing is blocked until outstanding invoices are resolved.
    #[error("billing blocked for assessor {assessor_id}: {outstanding} failed or disputed invoice(s)")]
    BillingBlocked {
        /// The blocked assessor.
        assessor_id: String,
        /// Number of failed or disputed invoices.
        outstanding: usize,
    },

    /// A lead reference is not part of the invoice's billed leads.
    #[error("lead {lead_id} was not billed on invoice {invoice_id}")]
    InvalidLeadRef {
        /// The invoice being credited.
        invoice_id: String,
        /// The unknown lead.
        lead_id: String,
    },

    /// The credit would exceed the invoice's original amount.
    #[error(
        "over-credit on invoice {invoice_id}: amount={invoice_amount}, credited={already_credited}, requested={requested}"
    )]
    OverCredit {
        /// The invoice being credited.
        invoice_id: String,
        /// Original invoice amount in pence.
        invoice_amount: i64,
        /// Sum of credits already issued in pence.
        already_credited: i64,
        /// Requested credit in pence.
        requested: i64,
    },

    /// A payment event was already applied (idempotency guard).
    #[error("duplicate payment event {event_id} for invoice {invoice_id}")]
    DuplicatePaymentEvent {
        /// The repeated event ID.
        event_id: String,
        /// The invoice the event refers to.
        invoice_id: String,
    },

    /// A lead was already charged.
    #[error("lead already charged: {lead_id}")]
    DuplicateLeadCharge {
        /// The repeated lead ID.
        lead_id: String,
    },

    /// Invoice not found.
    #[error("invoice not found: {invoice_id}")]
    InvoiceNotFound {
        /// The invoice ID that was not found.
        invoice_id: String,
    },

    /// Assessor not found.
    #[error("assessor not found: {assessor_id}")]
    AssessorNotFound {
        /// The assessor ID that was not found.
        assessor_id: String,
    },

    /// Assessor already registered.
    #[error("assessor already exists: {assessor_id}")]
    AssessorAlreadyExists {
        /// The assessor ID that already exists.
        assessor_id: String,
    },

    /// Billing period not found.
    #[error("billing period not found: {period_id}")]
    PeriodNotFound {
        /// The period ID that was not found.
        period_id: String,
    },

    /// The invoice cannot make the requested transition from its current status.
    #[error("invalid transition on invoice {invoice_id}: cannot {action} from {from:?}")]
    InvalidTransition {
        /// The invoice.
        invoice_id: String,
        /// Current status.
        from: crate::InvoiceStatus,
        /// Attempted action.
        action: &'static str,
    },

    /// Invalid amount.
    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    /// The requested spending limit is not available at the assessor's tier.
    #[error("spending limit {requested} not allowed: must be between {min} and {max}")]
    ThresholdNotAllowed {
        /// Requested limit in pence.
        requested: i64,
        /// Smallest selectable limit in pence.
        min: i64,
        /// Largest limit for the current tier in pence.
        max: i64,
    },

    /// Invalid identifier.
    #[error("invalid identifier: {0}")]
    InvalidId(#[from] IdError),

    /// Storage error.
    #[error("storage error: {0}")]
    Storage(String),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Configuration(String),
}
