//! Credit notes issued against invoices.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{AssessorId, CreditNoteId, InvoiceId, LeadId};

/// How a credit is settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CreditMode {
    /// Deducted from the assessor's next invoices, oldest credit first.
    ApplyToFuture,
    /// Reimbursed out-of-band by the payment provider.
    CashRefund,
}

/// Credit note status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CreditNoteStatus {
    /// Future credit not yet fully consumed.
    Issued,
    /// Future credit fully consumed by invoice closures.
    AppliedToFutureInvoice,
    /// Settled as a cash refund.
    RefundedCash,
}

/// A credit note against a prior invoice.
///
/// Never mutates the invoice; nets against the assessor's balance instead.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreditNote {
    /// Credit note ID.
    pub id: CreditNoteId,

    /// Credited assessor.
    pub assessor_id: AssessorId,

    /// The invoice being credited.
    pub related_invoice_id: InvoiceId,

    /// Credit amount in pence.
    pub amount_pence: i64,

    /// Future credit not yet consumed.
    pub remaining_pence: i64,

    /// Leads being credited.
    pub lead_refs: Vec<LeadId>,

    /// Settlement mode.
    pub mode: CreditMode,

    /// Current status.
    pub status: CreditNoteStatus,

    /// Free-text reason given by the admin.
    pub reason: String,

    /// Invoices that consumed this credit.
    pub applied_invoice_ids: Vec<InvoiceId>,

    /// Issue time.
    pub issued_at: DateTime<Utc>,

    /// When the credit was fully settled.
    pub resolved_at: Option<DateTime<Utc>>,
}

impl CreditNote {
    /// Create a credit note in the initial status for its mode.
    #[must_use]
    pub fn issue(
        assessor_id: AssessorId,
        related_invoice_id: InvoiceId,
        amount_pence: i64,
        lead_refs: Vec<LeadId>,
        reason: String,
        mode: CreditMode,
        now: DateTime<Utc>,
    ) -> Self {
        let (status, remaining_pence, resolved_at) = match mode {
            CreditMode::ApplyToFuture => (CreditNoteStatus::Issued, amount_pence, None),
            CreditMode::CashRefund => (CreditNoteStatus::RefundedCash, 0, Some(now)),
        };
        Self {
            id: CreditNoteId::generate(),
            assessor_id,
            related_invoice_id,
            amount_pence,
            remaining_pence,
            lead_refs,
            mode,
            status,
            reason,
            applied_invoice_ids: Vec::new(),
            issued_at: now,
            resolved_at,
        }
    }

    /// Whether future credit remains.
    #[must_use]
    pub fn is_available(&self) -> bool {
        self.status == CreditNoteStatus::Issued && self.remaining_pence > 0
    }

    /// Consume up to `wanted` pence for an invoice and return what was taken.
    pub fn consume(&mut self, wanted: i64, invoice_id: InvoiceId, now: DateTime<Utc>) -> i64 {
        if !self.is_available() || wanted <= 0 {
            return 0;
        }
        let taken = wanted.min(self.remaining_pence);
        self.remaining_pence -= taken;
        self.applied_invoice_ids.push(invoice_id);
        if self.remaining_pence == 0 {
            self.status = CreditNoteStatus::AppliedToFutureInvoice;
            self.resolved_at = Some(now);
        }
        taken
    }
}

/// Admin request to credit an invoice.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreditRequest {
    /// Leads to credit; must all be on the invoice.
    #[serde(default)]
    pub lead_refs: Vec<LeadId>,

    /// Reason shown in billing history.
    pub reason: String,

    /// Settlement mode.
    pub mode: CreditMode,

    /// Explicit amount for partial reversals; defaults to the leads' charges.
    #[serde(default)]
    pub amount_pence: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn future_credit(amount_pence: i64) -> CreditNote {
        CreditNote::issue(
            AssessorId::generate(),
            InvoiceId::generate(),
            amount_pence,
            Vec::new(),
            "duplicate lead".to_string(),
            CreditMode::ApplyToFuture,
            Utc::now(),
        )
    }

    #[test]
    fn cash_refund_is_settled_on_issue() {
        let note = CreditNote::issue(
            AssessorId::generate(),
            InvoiceId::generate(),
            1500,
            Vec::new(),
            "customer cancelled".to_string(),
            CreditMode::CashRefund,
            Utc::now(),
        );
        assert_eq!(note.status, CreditNoteStatus::RefundedCash);
        assert!(!note.is_available());
        assert!(note.resolved_at.is_some());
    }

    #[test]
    fn partial_consumption_keeps_note_open() {
        let mut note = future_credit(3000);
        assert_eq!(note.consume(1000, InvoiceId::generate(), Utc::now()), 1000);
        assert_eq!(note.remaining_pence, 2000);
        assert_eq!(note.status, CreditNoteStatus::Issued);
    }

    #[test]
    fn full_consumption_marks_applied() {
        let mut note = future_credit(3000);
        assert_eq!(note.consume(5000, InvoiceId::generate(), Utc::now()), 3000);
        assert_eq!(note.status, CreditNoteStatus::AppliedToFutureInvoice);
        assert_eq!(note.consume(100, InvoiceId::generate(), Utc::now()), 0);
    }
}
