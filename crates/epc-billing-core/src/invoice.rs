//! Invoices and payment events.
//!
//! An invoice is issued exactly once when a billing period closes. Its
//! `amount_pence` never changes afterwards; adjustments are separate credit
//! notes. Only status, payment and resolution fields move.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{BillingError, Result};
use crate::{AssessorId, InvoiceId, PeriodId};

/// Payment method recorded when future credit covers the full invoice.
pub const CREDIT_BALANCE_METHOD: &str = "credit_balance";

/// Invoice lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceStatus {
    /// Issued and awaiting payment.
    Pending,
    /// Collected.
    Paid,
    /// The payment provider reported a terminal failure.
    Failed,
    /// Under dispute; needs admin resolution.
    Disputed,
    /// Dispute closed by cancellation and a cash refund credit note.
    Cancelled,
}

impl InvoiceStatus {
    /// Whether the invoice still counts against the assessor.
    #[must_use]
    pub const fn is_outstanding(self) -> bool {
        matches!(self, Self::Pending | Self::Failed | Self::Disputed)
    }

    /// Whether no further payment outcome can change the invoice.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Paid | Self::Cancelled)
    }

    /// Get the status name as a string.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Paid => "paid",
            Self::Failed => "failed",
            Self::Disputed => "disputed",
            Self::Cancelled => "cancelled",
        }
    }
}

/// Why a period was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CloseReason {
    /// Spend reached the assessor's threshold.
    Threshold,
    /// The period reached its calendar end.
    PeriodEnd,
    /// Closed manually by an admin.
    Manual,
}

/// An invoice for one closed billing period.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Invoice {
    /// Invoice ID.
    pub id: InvoiceId,

    /// Billed assessor.
    pub assessor_id: AssessorId,

    /// The period this invoice closed (1:1).
    pub period_id: PeriodId,

    /// Period spend in pence. Immutable.
    pub amount_pence: i64,

    /// Future credit consumed when the invoice was issued.
    pub credit_applied_pence: i64,

    /// Number of leads billed.
    pub lead_count: u32,

    /// What triggered the close.
    pub close_reason: CloseReason,

    /// Whether the invoice is charged immediately rather than on NET-30 terms.
    pub auto_charge: bool,

    /// Current status.
    pub status: InvoiceStatus,

    /// Issue time.
    pub issued_at: DateTime<Utc>,

    /// Payment due date.
    pub due_at: DateTime<Utc>,

    /// When payment was recorded.
    pub paid_at: Option<DateTime<Utc>>,

    /// Payment method or provider reference.
    pub payment_method_ref: Option<String>,

    /// When a dispute was resolved.
    pub resolved_at: Option<DateTime<Utc>>,
}

impl Invoice {
    /// Amount still to collect after applied credit.
    #[must_use]
    pub const fn amount_due_pence(&self) -> i64 {
        self.amount_pence - self.credit_applied_pence
    }

    /// Whether the invoice still counts against the assessor.
    #[must_use]
    pub const fn is_outstanding(&self) -> bool {
        self.status.is_outstanding()
    }

    /// Whether payment at `paid_at` is on time.
    #[must_use]
    pub fn is_on_time(&self, paid_at: DateTime<Utc>) -> bool {
        paid_at <= self.due_at
    }

    /// Move to paid.
    ///
    /// # Errors
    ///
    /// Returns `DuplicatePaymentEvent` if already paid and `InvalidTransition`
    /// from disputed or cancelled (disputes resolve through admin action).
    pub fn mark_paid(
        &mut self,
        method: impl Into<String>,
        paid_at: DateTime<Utc>,
        event_id: &str,
    ) -> Result<()> {
        match self.status {
            InvoiceStatus::Pending | InvoiceStatus::Failed => {
                self.status = InvoiceStatus::Paid;
                self.paid_at = Some(paid_at);
                self.payment_method_ref = Some(method.into());
                Ok(())
            }
            InvoiceStatus::Paid => Err(BillingError::DuplicatePaymentEvent {
                event_id: event_id.to_string(),
                invoice_id: self.id.to_string(),
            }),
            from => Err(self.invalid("pay", from)),
        }
    }

    /// Move pending to failed.
    ///
    /// # Errors
    ///
    /// Returns `DuplicatePaymentEvent` if already failed and `InvalidTransition`
    /// from any other status.
    pub fn mark_failed(&mut self, event_id: &str) -> Result<()> {
        match self.status {
            InvoiceStatus::Pending => {
                self.status = InvoiceStatus::Failed;
                Ok(())
            }
            InvoiceStatus::Failed => Err(BillingError::DuplicatePaymentEvent {
                event_id: event_id.to_string(),
                invoice_id: self.id.to_string(),
            }),
            from => Err(self.invalid("fail", from)),
        }
    }

    /// Move pending or failed to disputed. Returns `false` if already disputed.
    ///
    /// # Errors
    ///
    /// Returns `InvalidTransition` from paid or cancelled.
    pub fn mark_disputed(&mut self) -> Result<bool> {
        match self.status {
            InvoiceStatus::Pending | InvoiceStatus::Failed => {
                self.status = InvoiceStatus::Disputed;
                Ok(true)
            }
            InvoiceStatus::Disputed => Ok(false),
            from => Err(self.invalid("dispute", from)),
        }
    }

    /// Resolve a dispute as paid.
    ///
    /// # Errors
    ///
    /// Returns `InvalidTransition` unless disputed.
    pub fn resolve_paid(&mut self, method: impl Into<String>, now: DateTime<Utc>) -> Result<()> {
        self.ensure_disputed("resolve")?;
        self.status = InvoiceStatus::Paid;
        self.paid_at = Some(now);
        self.payment_method_ref = Some(method.into());
        self.resolved_at = Some(now);
        Ok(())
    }

    /// Resolve a dispute by cancellation.
    ///
    /// # Errors
    ///
    /// Returns `InvalidTransition` unless disputed.
    pub fn cancel(&mut self, now: DateTime<Utc>) -> Result<()> {
        self.ensure_disputed("cancel")?;
        self.status = InvoiceStatus::Cancelled;
        self.resolved_at = Some(now);
        Ok(())
    }

    fn ensure_disputed(&self, action: &'static str) -> Result<()> {
        if self.status == InvoiceStatus::Disputed {
            Ok(())
        } else {
            Err(self.invalid(action, self.status))
        }
    }

    fn invalid(&self, action: &'static str, from: InvoiceStatus) -> BillingError {
        BillingError::InvalidTransition {
            invoice_id: self.id.to_string(),
            from,
            action,
        }
    }
}

/// Terminal payment outcome reported by the payment provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentOutcome {
    /// Payment collected.
    Succeeded,
    /// Payment failed after provider retries.
    Failed,
    /// Chargeback or dispute opened.
    Disputed,
}

/// Record of an applied payment event (idempotency key).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentEvent {
    /// Provider event ID.
    pub event_id: String,

    /// Invoice the event applied to.
    pub invoice_id: InvoiceId,

    /// Reported outcome.
    pub outcome: PaymentOutcome,

    /// When the event was applied.
    pub received_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn pending(amount_pence: i64) -> Invoice {
        let now = Utc::now();
        Invoice {
            id: InvoiceId::generate(),
            assessor_id: AssessorId::generate(),
            period_id: PeriodId::generate(),
            amount_pence,
            credit_applied_pence: 0,
            lead_count: 3,
            close_reason: CloseReason::Threshold,
            auto_charge: true,
            status: InvoiceStatus::Pending,
            issued_at: now,
            due_at: now + Duration::days(30),
            paid_at: None,
            payment_method_ref: None,
            resolved_at: None,
        }
    }

    #[test]
    fn paid_twice_is_duplicate() {
        let mut invoice = pending(4500);
        invoice.mark_paid("card", Utc::now(), "evt_1").unwrap();
        let err = invoice.mark_paid("card", Utc::now(), "evt_2").unwrap_err();
        assert!(matches!(err, BillingError::DuplicatePaymentEvent { .. }));
        assert_eq!(invoice.amount_pence, 4500);
    }

    #[test]
    fn failed_invoice_can_still_be_paid() {
        let mut invoice = pending(4500);
        invoice.mark_failed("evt_1").unwrap();
        assert!(invoice.is_outstanding());
        invoice.mark_paid("card", Utc::now(), "evt_2").unwrap();
        assert_eq!(invoice.status, InvoiceStatus::Paid);
    }

    #[test]
    fn dispute_is_idempotent_and_blocks_payment() {
        let mut invoice = pending(4500);
        assert!(invoice.mark_disputed().unwrap());
        assert!(!invoice.mark_disputed().unwrap());
        let err = invoice.mark_paid("card", Utc::now(), "evt_1").unwrap_err();
        assert!(matches!(
            err,
            BillingError::InvalidTransition { from: InvoiceStatus::Disputed, .. }
        ));
    }

    #[test]
    fn only_disputed_invoices_resolve() {
        let mut invoice = pending(4500);
        assert!(invoice.cancel(Utc::now()).is_err());
        invoice.mark_disputed().unwrap();
        invoice.cancel(Utc::now()).unwrap();
        assert_eq!(invoice.status, InvoiceStatus::Cancelled);
        assert!(!invoice.is_outstanding());
    }

    #[test]
    fn amount_due_subtracts_credit() {
        let mut invoice = pending(4500);
        invoice.credit_applied_pence = 1500;
        assert_eq!(invoice.amount_due_pence(), 3000);
    }
}
