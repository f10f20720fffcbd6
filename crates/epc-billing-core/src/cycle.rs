//! Invoice cycle: period close, payment outcomes, disputes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::credit_note::{CreditMode, CreditNote};
use crate::error::{BillingError, Result};
use crate::invoice::{
    CloseReason, Invoice, InvoiceStatus, PaymentEvent, PaymentOutcome, CREDIT_BALANCE_METHOD,
};
use crate::period::BillingPeriod;
use crate::policy::BillingPolicy;
use crate::tier::TrustLevel;
use crate::{AssessorBook, InvoiceId, PeriodId};

/// Result of a successful payment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentReceipt {
    /// The paid invoice.
    pub invoice: Invoice,

    /// Whether payment arrived on or before the due date.
    pub on_time: bool,

    /// The new trust level if the payment earned a promotion.
    pub promoted_to: Option<TrustLevel>,
}

/// How an admin closes a dispute.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum DisputeResolution {
    /// The assessor paid after all.
    Paid {
        /// Payment method or reference.
        method: String,
    },
    /// Cancel the invoice and refund its uncredited remainder in cash.
    Cancel {
        /// Reason recorded on the credit note.
        reason: String,
    },
}

/// Result of resolving a dispute.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolutionReceipt {
    /// The resolved invoice.
    pub invoice: Invoice,

    /// The cash refund note issued on cancellation.
    pub credit_note: Option<CreditNote>,

    /// The new trust level if a paid resolution earned a promotion.
    pub promoted_to: Option<TrustLevel>,
}

impl AssessorBook {
    /// Close an open period into an invoice.
    ///
    /// Returns `None` if the period is not open in this book, which makes a
    /// second close of the same period a no-op. Future credit is consumed
    /// oldest first; an invoice fully covered by credit is settled at once.
    /// A pending lowered threshold takes effect, and a fresh period opens
    /// unless the account is paused or blocked.
    ///
    /// # Errors
    ///
    /// Does not currently fail.
    pub fn close_period(
        &mut self,
        period_id: PeriodId,
        reason: CloseReason,
        policy: &BillingPolicy,
        now: DateTime<Utc>,
    ) -> Result<Option<Invoice>> {
        let Some(idx) = self.open_periods.iter().position(|p| p.id == period_id) else {
            return Ok(None);
        };
        let mut period = self.open_periods.remove(idx);
        period.close(now);

        let mut invoice = Invoice {
            id: InvoiceId::generate(),
            assessor_id: self.assessor.id,
            period_id,
            amount_pence: period.accumulated_spend_pence,
            credit_applied_pence: 0,
            lead_count: period.lead_count,
            close_reason: reason,
            auto_charge: !self.assessor.net30_terms,
            status: InvoiceStatus::Pending,
            issued_at: now,
            due_at: now + policy.payment_terms(),
            paid_at: None,
            payment_method_ref: None,
            resolved_at: None,
        };
        invoice.credit_applied_pence = self.consume_future_credit(invoice.id, invoice.amount_pence, now);

        if invoice.amount_due_pence() == 0 {
            invoice.status = InvoiceStatus::Paid;
            invoice.paid_at = Some(now);
            invoice.payment_method_ref = Some(CREDIT_BALANCE_METHOD.to_string());
        } else {
            self.outstanding.push(invoice.clone());
        }

        self.changes.upsert_period(period);
        self.changes.upsert_invoice(invoice.clone());

        if let Some(pending) = self.assessor.pending_spending_threshold_pence.take() {
            self.assessor.spending_threshold_pence = pending;
        }
        self.sync_current_spend();
        self.touch_assessor(now);
        self.ensure_open_period(policy, now);

        Ok(Some(invoice))
    }

    /// Close every open period past its calendar end.
    ///
    /// Empty periods are rolled forward instead of producing zero invoices.
    ///
    /// # Errors
    ///
    /// Propagates errors from [`AssessorBook::close_period`].
    pub fn sweep_due(&mut self, policy: &BillingPolicy, now: DateTime<Utc>) -> Result<Vec<Invoice>> {
        let due: Vec<PeriodId> = self
            .open_periods
            .iter()
            .filter(|p| p.is_due(now))
            .map(|p| p.id)
            .collect();

        let mut issued = Vec::new();
        for period_id in due {
            let Some(period) = self.open_periods.iter_mut().find(|p| p.id == period_id) else {
                continue;
            };
            if period.lead_count == 0 {
                period.roll_forward(now, policy.period_length());
                let snapshot = period.clone();
                self.changes.upsert_period(snapshot);
            } else if let Some(invoice) =
                self.close_period(period_id, CloseReason::PeriodEnd, policy, now)?
            {
                issued.push(invoice);
            }
        }
        Ok(issued)
    }

    /// Record a successful payment.
    ///
    /// # Errors
    ///
    /// Returns `InvoiceNotFound` for another assessor's invoice,
    /// `DuplicatePaymentEvent` if already paid, or `InvalidTransition`.
    pub fn record_payment(
        &mut self,
        invoice: Invoice,
        method: &str,
        event_id: &str,
        paid_at: DateTime<Utc>,
        policy: &BillingPolicy,
        now: DateTime<Utc>,
    ) -> Result<PaymentReceipt> {
        let mut invoice = self.owned(invoice)?;
        invoice.mark_paid(method, paid_at, event_id)?;
        self.record_event(event_id, invoice.id, PaymentOutcome::Succeeded, now);
        Ok(self.settle_paid(invoice, paid_at, policy, now))
    }

    /// Record a terminal payment failure.
    ///
    /// Resets the on-time streak. Earlier invoices are untouched.
    ///
    /// # Errors
    ///
    /// Returns `InvoiceNotFound`, `DuplicatePaymentEvent` if already failed,
    /// or `InvalidTransition`.
    pub fn record_payment_failure(
        &mut self,
        invoice: Invoice,
        event_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Invoice> {
        let mut invoice = self.owned(invoice)?;
        invoice.mark_failed(event_id)?;
        self.assessor.consecutive_on_time_payments = 0;
        self.record_event(event_id, invoice.id, PaymentOutcome::Failed, now);
        self.replace_outstanding(&invoice);
        self.changes.upsert_invoice(invoice.clone());
        self.touch_assessor(now);
        Ok(invoice)
    }

    /// Mark an invoice disputed. Already disputed invoices are left alone.
    ///
    /// # Errors
    ///
    /// Returns `InvoiceNotFound` or `InvalidTransition`.
    pub fn mark_disputed(
        &mut self,
        invoice: Invoice,
        event_id: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Invoice> {
        let mut invoice = self.owned(invoice)?;
        if invoice.mark_disputed()? {
            self.replace_outstanding(&invoice);
            self.changes.upsert_invoice(invoice.clone());
        }
        if let Some(event_id) = event_id {
            self.record_event(event_id, invoice.id, PaymentOutcome::Disputed, now);
        }
        Ok(invoice)
    }

    /// Record a provider outcome that arrived after the invoice was settled.
    ///
    /// Only the event is stored, so redeliveries are recognised as
    /// duplicates. The invoice and trust counters are untouched; a chargeback
    /// on a paid invoice is left to an admin credit note.
    ///
    /// # Errors
    ///
    /// Returns `InvoiceNotFound` for another assessor's invoice, or
    /// `InvalidTransition` unless the invoice is paid or cancelled.
    pub fn record_stale_event(
        &mut self,
        invoice: &Invoice,
        event_id: &str,
        outcome: PaymentOutcome,
        now: DateTime<Utc>,
    ) -> Result<()> {
        if invoice.assessor_id != self.assessor.id {
            return Err(BillingError::InvoiceNotFound {
                invoice_id: invoice.id.to_string(),
            });
        }
        if !invoice.status.is_terminal() {
            return Err(BillingError::InvalidTransition {
                invoice_id: invoice.id.to_string(),
                from: invoice.status,
                action: "acknowledge",
            });
        }
        self.record_event(event_id, invoice.id, outcome, now);
        Ok(())
    }

    /// Resolve a disputed invoice.
    ///
    /// `Paid` follows the same accounting as [`AssessorBook::record_payment`].
    /// `Cancel` issues a cash refund for the leads not yet credited and
    /// cancels the invoice.
    ///
    /// # Errors
    ///
    /// Returns `InvoiceNotFound`, `PeriodNotFound` if `period` is not the
    /// invoice's period, or `InvalidTransition` unless disputed.
    pub fn resolve_dispute(
        &mut self,
        invoice: Invoice,
        period: &BillingPeriod,
        existing_credits: &[CreditNote],
        resolution: DisputeResolution,
        policy: &BillingPolicy,
        now: DateTime<Utc>,
    ) -> Result<ResolutionReceipt> {
        let mut invoice = self.owned(invoice)?;
        if period.id != invoice.period_id {
            return Err(BillingError::PeriodNotFound {
                period_id: invoice.period_id.to_string(),
            });
        }

        match resolution {
            DisputeResolution::Paid { method } => {
                invoice.resolve_paid(method, now)?;
                let receipt = self.settle_paid(invoice, now, policy, now);
                Ok(ResolutionReceipt {
                    invoice: receipt.invoice,
                    credit_note: None,
                    promoted_to: receipt.promoted_to,
                })
            }
            DisputeResolution::Cancel { reason } => {
                invoice.cancel(now)?;

                let credited = existing_credits
                    .iter()
                    .fold(0_i64, |total, c| total.saturating_add(c.amount_pence));
                let remainder = invoice.amount_pence - credited;
                let credit_note = (remainder > 0).then(|| {
                    let lead_refs = period
                        .charges
                        .iter()
                        .map(|c| c.lead_id.clone())
                        .filter(|lead| !existing_credits.iter().any(|c| c.lead_refs.contains(lead)))
                        .collect();
                    CreditNote::issue(
                        self.assessor.id,
                        invoice.id,
                        remainder,
                        lead_refs,
                        reason,
                        CreditMode::CashRefund,
                        now,
                    )
                });
                if let Some(note) = &credit_note {
                    self.changes.upsert_credit_note(note.clone());
                }

                self.replace_outstanding(&invoice);
                self.changes.upsert_invoice(invoice.clone());
                self.touch_assessor(now);
                self.ensure_open_period(policy, now);

                Ok(ResolutionReceipt {
                    invoice,
                    credit_note,
                    promoted_to: None,
                })
            }
        }
    }

    /// Apply trust accounting for an invoice that just moved to paid.
    fn settle_paid(
        &mut self,
        invoice: Invoice,
        paid_at: DateTime<Utc>,
        policy: &BillingPolicy,
        now: DateTime<Utc>,
    ) -> PaymentReceipt {
        let on_time = invoice.is_on_time(paid_at);
        let a = &mut self.assessor;
        a.total_successful_payments = a.total_successful_payments.saturating_add(1);
        a.lifetime_paid_pence = a.lifetime_paid_pence.saturating_add(invoice.amount_due_pence());
        a.consecutive_on_time_payments = if on_time {
            a.consecutive_on_time_payments.saturating_add(1)
        } else {
            0
        };

        let before = a.trust_level;
        let level = policy.tiers.evaluate(
            before,
            a.consecutive_on_time_payments,
            a.total_successful_payments,
        );
        let promoted_to = (level > before).then_some(level);
        if promoted_to.is_some() {
            a.apply_trust_level(level, &policy.tiers);
        }

        self.replace_outstanding(&invoice);
        self.changes.upsert_invoice(invoice.clone());
        self.touch_assessor(now);
        self.ensure_open_period(policy, now);

        PaymentReceipt {
            invoice,
            on_time,
            promoted_to,
        }
    }

    /// Consume future credit oldest first, up to `amount`.
    fn consume_future_credit(&mut self, invoice_id: InvoiceId, amount: i64, now: DateTime<Utc>) -> i64 {
        let mut applied = 0;
        for note in &mut self.credits {
            if applied >= amount {
                break;
            }
            let taken = note.consume(amount - applied, invoice_id, now);
            if taken > 0 {
                applied += taken;
                self.changes.upsert_credit_note(note.clone());
            }
        }
        self.credits.retain(CreditNote::is_available);
        applied
    }

    fn record_event(
        &mut self,
        event_id: &str,
        invoice_id: InvoiceId,
        outcome: PaymentOutcome,
        now: DateTime<Utc>,
    ) {
        self.changes.payment_events.push(PaymentEvent {
            event_id: event_id.to_string(),
            invoice_id,
            outcome,
            received_at: now,
        });
    }

    /// Check ownership and prefer the book's copy of an outstanding invoice.
    fn owned(&self, invoice: Invoice) -> Result<Invoice> {
        if invoice.assessor_id != self.assessor.id {
            return Err(BillingError::InvoiceNotFound {
                invoice_id: invoice.id.to_string(),
            });
        }
        Ok(self
            .outstanding
            .iter()
            .find(|i| i.id == invoice.id)
            .cloned()
            .unwrap_or(invoice))
    }
}
