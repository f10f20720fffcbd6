//! Credit note issuance.

use chrono::{DateTime, Utc};
use std::collections::HashSet;

use crate::credit_note::{CreditMode, CreditNote, CreditRequest};
use crate::error::{BillingError, Result};
use crate::invoice::Invoice;
use crate::period::BillingPeriod;
use crate::policy::MAX_AMOUNT_PENCE;
use crate::AssessorBook;

impl AssessorBook {
    /// Issue a credit note against an invoice.
    ///
    /// `period` must be the invoice's period and `existing` every credit note
    /// already issued against the invoice. Trust counters are not touched.
    ///
    /// # Errors
    ///
    /// - `InvoiceNotFound` for another assessor's invoice
    /// - `PeriodNotFound` if `period` is not the invoice's period
    /// - `InvalidLeadRef` if a lead was not billed on the invoice
    /// - `InvalidAmount` for a missing amount or one outside
    ///   `1..=MAX_AMOUNT_PENCE`
    /// - `OverCredit` if total credits would exceed the invoice amount
    pub fn issue_credit(
        &mut self,
        invoice: &Invoice,
        period: &BillingPeriod,
        existing: &[CreditNote],
        request: CreditRequest,
        now: DateTime<Utc>,
    ) -> Result<CreditNote> {
        if invoice.assessor_id != self.assessor.id {
            return Err(BillingError::InvoiceNotFound {
                invoice_id: invoice.id.to_string(),
            });
        }
        if period.id != invoice.period_id {
            return Err(BillingError::PeriodNotFound {
                period_id: invoice.period_id.to_string(),
            });
        }

        let mut seen = HashSet::new();
        let mut lead_refs = Vec::with_capacity(request.lead_refs.len());
        let mut leads_total: i64 = 0;
        for lead_id in request.lead_refs {
            let charge = period
                .charge_for(&lead_id)
                .ok_or_else(|| BillingError::InvalidLeadRef {
                    invoice_id: invoice.id.to_string(),
                    lead_id: lead_id.to_string(),
                })?;
            if seen.insert(lead_id.clone()) {
                leads_total = leads_total.saturating_add(charge.amount_pence);
                lead_refs.push(lead_id);
            }
        }

        let amount = match request.amount_pence {
            Some(amount) => amount,
            None if lead_refs.is_empty() => {
                return Err(BillingError::InvalidAmount(
                    "credit without lead references needs an explicit amount".to_string(),
                ))
            }
            None => leads_total,
        };
        if amount <= 0 || amount > MAX_AMOUNT_PENCE {
            return Err(BillingError::InvalidAmount(format!(
                "credit must be between 1 and {MAX_AMOUNT_PENCE} pence, got {amount}"
            )));
        }

        let already_credited = existing
            .iter()
            .fold(0_i64, |total, c| total.saturating_add(c.amount_pence));
        let within_invoice = already_credited
            .checked_add(amount)
            .is_some_and(|total| total <= invoice.amount_pence);
        if !within_invoice {
            return Err(BillingError::OverCredit {
                invoice_id: invoice.id.to_string(),
                invoice_amount: invoice.amount_pence,
                already_credited,
                requested: amount,
            });
        }

        let note = CreditNote::issue(
            self.assessor.id,
            invoice.id,
            amount,
            lead_refs,
            request.reason,
            request.mode,
            now,
        );
        if note.mode == CreditMode::ApplyToFuture {
            self.credits.push(note.clone());
        }
        self.changes.upsert_credit_note(note.clone());
        Ok(note)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credit_note::CreditNoteStatus;
    use crate::invoice::CloseReason;
    use crate::policy::BillingPolicy;
    use crate::tier::TrustTierTable;
    use crate::{Assessor, AssessorId, LeadId};

    struct Fixture {
        book: AssessorBook,
        invoice: Invoice,
        period: BillingPeriod,
    }

    /// A bronze book with one pending invoice for `prices.len()` leads.
    fn fixture(prices: &[i64]) -> Fixture {
        let policy = BillingPolicy::default();
        let now = Utc::now();
        let mut book = AssessorBook::register(Assessor::new(
            AssessorId::generate(),
            "Test Assessor",
            None,
            &TrustTierTable::default(),
            now,
        ));
        let mut period_id = None;
        for (n, price) in prices.iter().enumerate() {
            let receipt = book
                .record_lead_charge(lead(n), "M1 1AE", *price, &policy, now)
                .unwrap();
            period_id = Some(receipt.period_id);
        }
        let invoice = book
            .close_period(period_id.unwrap(), CloseReason::Manual, &policy, now)
            .unwrap()
            .unwrap();
        let period = book
            .take_changes()
            .periods
            .into_iter()
            .find(|p| p.id == invoice.period_id)
            .unwrap();
        Fixture { book, invoice, period }
    }

    fn lead(n: usize) -> LeadId {
        LeadId::new(format!("lead-{n}")).unwrap()
    }

    fn request(lead_refs: Vec<LeadId>, mode: CreditMode, amount_pence: Option<i64>) -> CreditRequest {
        CreditRequest {
            lead_refs,
            reason: "lead outside coverage".to_string(),
            mode,
            amount_pence,
        }
    }

    #[test]
    fn credit_defaults_to_referenced_lead_charges() {
        let mut f = fixture(&[1500, 2500, 1000]);
        let note = f
            .book
            .issue_credit(
                &f.invoice,
                &f.period,
                &[],
                request(vec![lead(1), lead(2)], CreditMode::ApplyToFuture, None),
                Utc::now(),
            )
            .unwrap();

        assert_eq!(note.amount_pence, 3500);
        assert_eq!(note.remaining_pence, 3500);
        assert_eq!(note.status, CreditNoteStatus::Issued);
        assert_eq!(f.book.credit_balance_pence(), 3500);
    }

    #[test]
    fn credit_above_invoice_amount_is_rejected() {
        let mut f = fixture(&[2500, 2500]);
        assert_eq!(f.invoice.amount_pence, 5000);

        let err = f
            .book
            .issue_credit(
                &f.invoice,
                &f.period,
                &[],
                request(vec![lead(0)], CreditMode::CashRefund, Some(6000)),
                Utc::now(),
            )
            .unwrap_err();

        assert!(matches!(
            err,
            BillingError::OverCredit { invoice_amount: 5000, requested: 6000, .. }
        ));
    }

    #[test]
    fn existing_credits_count_toward_bound() {
        let mut f = fixture(&[2500, 2500]);
        let first = f
            .book
            .issue_credit(
                &f.invoice,
                &f.period,
                &[],
                request(vec![lead(0)], CreditMode::CashRefund, None),
                Utc::now(),
            )
            .unwrap();

        let err = f
            .book
            .issue_credit(
                &f.invoice,
                &f.period,
                &[first],
                request(Vec::new(), CreditMode::CashRefund, Some(2600)),
                Utc::now(),
            )
            .unwrap_err();
        assert!(matches!(err, BillingError::OverCredit { already_credited: 2500, .. }));
    }

    #[test]
    fn huge_credit_is_rejected_without_wrapping() {
        let mut f = fixture(&[1500]);
        let first = f
            .book
            .issue_credit(
                &f.invoice,
                &f.period,
                &[],
                request(Vec::new(), CreditMode::CashRefund, Some(100)),
                Utc::now(),
            )
            .unwrap();

        let err = f
            .book
            .issue_credit(
                &f.invoice,
                &f.period,
                &[first.clone()],
                request(Vec::new(), CreditMode::CashRefund, Some(i64::MAX)),
                Utc::now(),
            )
            .unwrap_err();
        assert!(matches!(err, BillingError::InvalidAmount(_)));

        let err = f
            .book
            .issue_credit(
                &f.invoice,
                &f.period,
                &[first],
                request(Vec::new(), CreditMode::CashRefund, Some(MAX_AMOUNT_PENCE)),
                Utc::now(),
            )
            .unwrap_err();
        assert!(matches!(err, BillingError::OverCredit { already_credited: 100, .. }));
    }

    #[test]
    fn unknown_lead_is_rejected() {
        let mut f = fixture(&[1500]);
        let err = f
            .book
            .issue_credit(
                &f.invoice,
                &f.period,
                &[],
                request(vec![LeadId::new("not-billed").unwrap()], CreditMode::CashRefund, None),
                Utc::now(),
            )
            .unwrap_err();
        assert!(matches!(err, BillingError::InvalidLeadRef { .. }));
    }

    #[test]
    fn cash_refund_has_no_future_effect() {
        let mut f = fixture(&[1500]);
        let note = f
            .book
            .issue_credit(
                &f.invoice,
                &f.period,
                &[],
                request(vec![lead(0)], CreditMode::CashRefund, None),
                Utc::now(),
            )
            .unwrap();
        assert_eq!(note.status, CreditNoteStatus::RefundedCash);
        assert_eq!(f.book.credit_balance_pence(), 0);
    }

    #[test]
    fn credit_does_not_touch_invoice_or_trust() {
        let mut f = fixture(&[1500, 1500]);
        let before = f.book.assessor().clone();
        f.book
            .issue_credit(
                &f.invoice,
                &f.period,
                &[],
                request(vec![lead(0)], CreditMode::ApplyToFuture, None),
                Utc::now(),
            )
            .unwrap();

        let changes = f.book.take_changes();
        assert!(changes.invoices.is_empty());
        assert!(changes.assessor.is_none());
        assert_eq!(f.book.assessor().total_successful_payments, before.total_successful_payments);
        assert_eq!(f.invoice.amount_pence, 3000);
    }

    #[test]
    fn empty_refs_need_explicit_amount() {
        let mut f = fixture(&[1500]);
        let err = f
            .book
            .issue_credit(
                &f.invoice,
                &f.period,
                &[],
                request(Vec::new(), CreditMode::ApplyToFuture, None),
                Utc::now(),
            )
            .unwrap_err();
        assert!(matches!(err, BillingError::InvalidAmount(_)));
    }
}
