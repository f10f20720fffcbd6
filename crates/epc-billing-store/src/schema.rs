//! Database schema definitions and column families.
//!
//! Index column families hold empty values; the key carries the reference.

/// Column family names for the `RocksDB` database.
pub mod cf {
    /// Assessor profiles, keyed by `assessor_id`.
    pub const ASSESSORS: &str = "assessors";

    /// Billing periods, keyed by `period_id` (ULID).
    pub const PERIODS: &str = "periods";

    /// Index: open periods, keyed by `assessor_id || period_id`.
    pub const OPEN_PERIODS_BY_ASSESSOR: &str = "open_periods_by_assessor";

    /// Invoices, keyed by `invoice_id` (ULID).
    pub const INVOICES: &str = "invoices";

    /// Index: all invoices, keyed by `assessor_id || invoice_id`.
    pub const INVOICES_BY_ASSESSOR: &str = "invoices_by_assessor";

    /// Index: pending, failed and disputed invoices, keyed by `assessor_id || invoice_id`.
    pub const OUTSTANDING_BY_ASSESSOR: &str = "outstanding_by_assessor";

    /// Credit notes, keyed by `credit_note_id` (ULID).
    pub const CREDIT_NOTES: &str = "credit_notes";

    /// Index: all credit notes, keyed by `assessor_id || credit_note_id`.
    pub const CREDIT_NOTES_BY_ASSESSOR: &str = "credit_notes_by_assessor";

    /// Index: credit notes per invoice, keyed by `invoice_id || credit_note_id`.
    pub const CREDIT_NOTES_BY_INVOICE: &str = "credit_notes_by_invoice";

    /// Index: unconsumed future credit, keyed by `assessor_id || credit_note_id`.
    pub const AVAILABLE_CREDITS_BY_ASSESSOR: &str = "available_credits_by_assessor";

    /// Charged leads for duplicate detection, keyed by `lead_id`.
    /// Value is the `period_id` bytes.
    pub const LEAD_CHARGES: &str = "lead_charges";

    /// Applied payment events for webhook idempotency, keyed by `event_id`.
    pub const PAYMENT_EVENTS: &str = "payment_events";
}

/// Returns all column family names for database initialization.
#[must_use]
pub fn all_column_families() -> Vec<&'static str> {
    vec![
        cf::ASSESSORS,
        cf::PERIODS,
        cf::OPEN_PERIODS_BY_ASSESSOR,
        cf::INVOICES,
        cf::INVOICES_BY_ASSESSOR,
        cf::OUTSTANDING_BY_ASSESSOR,
        cf::CREDIT_NOTES,
        cf::CREDIT_NOTES_BY_ASSESSOR,
        cf::CREDIT_NOTES_BY_INVOICE,
        cf::AVAILABLE_CREDITS_BY_ASSESSOR,
        cf::LEAD_CHARGES,
        cf::PAYMENT_EVENTS,
    ]
}
