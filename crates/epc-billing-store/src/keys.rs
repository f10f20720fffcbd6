//! Key encoding utilities for `RocksDB`.
//!
//! Entity keys are the raw 16 ID bytes. Index keys concatenate the owner's
//! 16 bytes with the entity's ULID bytes so a prefix scan yields entities in
//! creation order.

use epc_billing_core::{AssessorId, CreditNoteId, InvoiceId, LeadId, PeriodId};

/// Create an assessor key.
#[must_use]
pub fn assessor_key(assessor_id: &AssessorId) -> Vec<u8> {
    assessor_id.as_bytes().to_vec()
}

/// Create a period key.
#[must_use]
pub fn period_key(period_id: &PeriodId) -> Vec<u8> {
    period_id.to_bytes().to_vec()
}

/// Create an invoice key.
#[must_use]
pub fn invoice_key(invoice_id: &InvoiceId) -> Vec<u8> {
    invoice_id.to_bytes().to_vec()
}

/// Create a credit note key.
#[must_use]
pub fn credit_note_key(credit_note_id: &CreditNoteId) -> Vec<u8> {
    credit_note_id.to_bytes().to_vec()
}

/// Create an owner index key.
///
/// Format: `owner (16 bytes) || entity (16 bytes)`
#[must_use]
pub fn index_key(owner: &[u8; 16], entity: [u8; 16]) -> Vec<u8> {
    let mut key = Vec::with_capacity(32);
    key.extend_from_slice(owner);
    key.extend_from_slice(&entity);
    key
}

/// Extract the entity bytes from an owner index key.
///
/// Returns `None` for malformed keys.
#[must_use]
pub fn entity_from_index_key(key: &[u8]) -> Option<[u8; 16]> {
    key.get(16..32)?.try_into().ok()
}

/// Create a lead charge key.
#[must_use]
pub fn lead_key(lead_id: &LeadId) -> Vec<u8> {
    lead_id.as_str().as_bytes().to_vec()
}

/// Create a payment event key.
#[must_use]
pub fn payment_event_key(event_id: &str) -> Vec<u8> {
    event_id.as_bytes().to_vec()
}
