//! Billing engine.
//!
//! Every mutation follows the same shape: take the assessor's lock, load the
//! [`AssessorBook`], run the pure transition, then commit the recorded
//! [`LedgerChanges`](epc_billing_core::LedgerChanges) in one store write.
//! A failed commit leaves the store untouched, and the in-memory book is
//! dropped with the request.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, OwnedMutexGuard};

use epc_billing_core::{
    Assessor, AssessorBook, AssessorId, BillingError, BillingPolicy, BillingSummary,
    ChargeReceipt, CloseReason, CreditNote, CreditRequest, DisputeResolution, Invoice, InvoiceId,
    InvoiceStatus, LeadId, LimitEffect, PaymentOutcome, PeriodId, PricingLookup,
    ResolutionReceipt, Result, TrustLevel,
};
use epc_billing_store::Store;

use crate::gateway::PaymentGateway;

/// Assessors swept concurrently.
const SWEEP_CONCURRENCY: usize = 16;

/// Admin or marketplace request to register an assessor.
#[derive(Debug, Clone, Deserialize)]
pub struct NewAssessor {
    /// Marketplace account ID; generated when absent.
    #[serde(default)]
    pub assessor_id: Option<AssessorId>,
    /// Name shown on invoices.
    pub display_name: String,
    /// Billing contact.
    #[serde(default)]
    pub email: Option<String>,
}

/// A lead delivered to an assessor.
#[derive(Debug, Clone, Deserialize)]
pub struct LeadChargeRequest {
    /// Assessor receiving the lead.
    pub assessor_id: AssessorId,
    /// Marketplace lead ID; the idempotency key.
    pub lead_id: String,
    /// Property postcode, used for pricing.
    pub postcode: String,
    /// Price override; defaults to the postcode price.
    #[serde(default)]
    pub amount_pence: Option<i64>,
}

/// A successful payment to apply.
#[derive(Debug, Clone)]
pub struct PaymentInput {
    /// Payment method or provider reference.
    pub method: String,
    /// Provider event ID.
    pub event_id: String,
    /// When the money was collected.
    pub paid_at: DateTime<Utc>,
}

/// Result of applying a payment outcome.
#[derive(Debug, Clone, Serialize)]
pub struct PaymentUpdate {
    /// The invoice after the update.
    pub invoice: Invoice,
    /// The event had already been applied; nothing changed.
    pub duplicate: bool,
    /// Whether a payment arrived by the due date.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub on_time: Option<bool>,
    /// New trust level earned by the payment.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub promoted_to: Option<TrustLevel>,
}

/// Result of an admin trust level override.
#[derive(Debug, Clone, Serialize)]
pub struct TrustOverride {
    /// Level before the override.
    pub previous: TrustLevel,
    /// Billing state after the override.
    pub summary: BillingSummary,
}

/// Result of a period-end sweep over all assessors.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SweepReport {
    /// Assessors visited.
    pub assessors_checked: usize,
    /// Invoices issued by period-end closes.
    pub invoices_issued: usize,
    /// Assessors whose sweep failed.
    pub failures: usize,
}

/// Lock-map size at which idle per-assessor locks are dropped.
const LOCK_PRUNE_THRESHOLD: usize = 1024;

/// Serializes billing operations per assessor and persists their effects.
pub struct BillingEngine {
    store: Arc<dyn Store>,
    policy: BillingPolicy,
    pricing: Arc<dyn PricingLookup>,
    gateway: Option<Arc<dyn PaymentGateway>>,
    locks: Mutex<HashMap<AssessorId, Arc<Mutex<()>>>>,
}

impl BillingEngine {
    /// Create an engine over a store.
    #[must_use]
    pub fn new(
        store: Arc<dyn Store>,
        policy: BillingPolicy,
        pricing: Arc<dyn PricingLookup>,
        gateway: Option<Arc<dyn PaymentGateway>>,
    ) -> Self {
        Self {
            store,
            policy,
            pricing,
            gateway,
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// The billing policy in force.
    #[must_use]
    pub const fn policy(&self) -> &BillingPolicy {
        &self.policy
    }

    async fn lock(&self, assessor_id: AssessorId) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().await;
            if locks.len() >= LOCK_PRUNE_THRESHOLD {
                // Only the map holds an idle entry; guards and waiters hold clones.
                locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            }
            Arc::clone(locks.entry(assessor_id).or_default())
        };
        lock.lock_owned().await
    }

    fn load_book(&self, assessor_id: &AssessorId) -> Result<AssessorBook> {
        self.store
            .load_book(assessor_id)?
            .ok_or_else(|| BillingError::AssessorNotFound {
                assessor_id: assessor_id.to_string(),
            })
    }

    fn commit(&self, book: &mut AssessorBook) -> Result<()> {
        let changes = book.take_changes();
        if changes.is_empty() {
            return Ok(());
        }
        self.store.commit(&changes)?;
        Ok(())
    }

    // =========================================================================
    // Assessors
    // =========================================================================

    /// Register a bronze assessor.
    ///
    /// # Errors
    ///
    /// Returns `AssessorAlreadyExists` or a storage error.
    pub async fn register_assessor(&self, request: NewAssessor) -> Result<Assessor> {
        let assessor_id = request.assessor_id.unwrap_or_else(AssessorId::generate);
        let _guard = self.lock(assessor_id).await;

        if self.store.get_assessor(&assessor_id)?.is_some() {
            return Err(BillingError::AssessorAlreadyExists {
                assessor_id: assessor_id.to_string(),
            });
        }

        let assessor = Assessor::new(
            assessor_id,
            request.display_name,
            request.email,
            &self.policy.tiers,
            Utc::now(),
        );
        let mut book = AssessorBook::register(assessor.clone());
        self.commit(&mut book)?;

        tracing::info!(
            assessor_id = %assessor_id,
            threshold_pence = assessor.spending_threshold_pence,
            "Assessor registered"
        );
        Ok(assessor)
    }

    /// Get an assessor profile.
    ///
    /// # Errors
    ///
    /// Returns `AssessorNotFound` or a storage error.
    pub fn get_assessor(&self, assessor_id: &AssessorId) -> Result<Assessor> {
        self.store
            .get_assessor(assessor_id)?
            .ok_or_else(|| BillingError::AssessorNotFound {
                assessor_id: assessor_id.to_string(),
            })
    }

    /// Build an assessor's billing summary.
    ///
    /// # Errors
    ///
    /// Returns `AssessorNotFound` or a storage error.
    pub fn billing_summary(&self, assessor_id: &AssessorId) -> Result<BillingSummary> {
        Ok(self.load_book(assessor_id)?.summary(&self.policy))
    }

    /// Pause lead purchasing. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns `AssessorNotFound` or a storage error.
    pub async fn pause(&self, assessor_id: AssessorId) -> Result<BillingSummary> {
        let _guard = self.lock(assessor_id).await;
        let mut book = self.load_book(&assessor_id)?;
        if book.pause(Utc::now()) {
            self.commit(&mut book)?;
            tracing::info!(assessor_id = %assessor_id, "Lead purchasing paused");
        }
        Ok(book.summary(&self.policy))
    }

    /// Resume lead purchasing. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns `AssessorNotFound` or a storage error.
    pub async fn resume(&self, assessor_id: AssessorId) -> Result<BillingSummary> {
        let _guard = self.lock(assessor_id).await;
        let mut book = self.load_book(&assessor_id)?;
        if book.resume(Utc::now()) {
            self.commit(&mut book)?;
            tracing::info!(assessor_id = %assessor_id, "Lead purchasing resumed");
        }
        Ok(book.summary(&self.policy))
    }

    /// Select a new spending limit.
    ///
    /// # Errors
    ///
    /// Returns `ThresholdNotAllowed`, `AssessorNotFound` or a storage error.
    pub async fn set_spending_limit(
        &self,
        assessor_id: AssessorId,
        limit_pence: i64,
    ) -> Result<(LimitEffect, BillingSummary)> {
        let _guard = self.lock(assessor_id).await;
        let mut book = self.load_book(&assessor_id)?;
        let effect = book.set_spending_limit(limit_pence, &self.policy, Utc::now())?;
        self.commit(&mut book)?;

        tracing::info!(
            assessor_id = %assessor_id,
            limit_pence,
            effect = ?effect,
            "Spending limit updated"
        );
        Ok((effect, book.summary(&self.policy)))
    }

    /// Set a trust level directly. The only way to demote.
    ///
    /// # Errors
    ///
    /// Returns `AssessorNotFound` or a storage error.
    pub async fn override_trust_level(
        &self,
        assessor_id: AssessorId,
        level: TrustLevel,
        reason: &str,
    ) -> Result<TrustOverride> {
        let _guard = self.lock(assessor_id).await;
        let mut book = self.load_book(&assessor_id)?;
        let previous = book.override_trust_level(level, &self.policy, Utc::now());
        self.commit(&mut book)?;

        tracing::info!(
            assessor_id = %assessor_id,
            from = previous.as_str(),
            to = level.as_str(),
            reason = %reason,
            "Trust level overridden"
        );
        Ok(TrustOverride {
            previous,
            summary: book.summary(&self.policy),
        })
    }

    // =========================================================================
    // Lead charges
    // =========================================================================

    /// Charge a delivered lead to the assessor's open period.
    ///
    /// # Errors
    ///
    /// Returns `AccountPaused`, `BillingBlocked`, `DuplicateLeadCharge`,
    /// `InvalidAmount`, `InvalidId`, `AssessorNotFound` or a storage error.
    pub async fn record_lead_charge(&self, request: LeadChargeRequest) -> Result<ChargeReceipt> {
        let lead_id = LeadId::new(request.lead_id)?;
        let assessor_id = request.assessor_id;
        let _guard = self.lock(assessor_id).await;
        let mut book = self.load_book(&assessor_id)?;

        if let Err(err) = book.ensure_chargeable(&self.policy) {
            if matches!(err, BillingError::AccountPaused { .. }) {
                tracing::info!(
                    assessor_id = %assessor_id,
                    lead_id = %lead_id,
                    "Lead delivered while paused; not billed"
                );
            }
            return Err(err);
        }
        if self.store.has_lead_charge(&lead_id)? {
            return Err(BillingError::DuplicateLeadCharge {
                lead_id: lead_id.to_string(),
            });
        }

        let amount_pence = request
            .amount_pence
            .unwrap_or_else(|| self.pricing.lead_price_pence(&request.postcode));
        let receipt = book.record_lead_charge(
            lead_id.clone(),
            &request.postcode,
            amount_pence,
            &self.policy,
            Utc::now(),
        )?;
        self.commit(&mut book)?;

        tracing::debug!(
            assessor_id = %assessor_id,
            lead_id = %lead_id,
            period_id = %receipt.period_id,
            amount_pence,
            accumulated_pence = receipt.new_accumulated_spend_pence,
            "Lead charged"
        );
        if let Some(invoice) = &receipt.invoice {
            self.invoice_issued(invoice);
        }
        Ok(receipt)
    }

    // =========================================================================
    // Periods
    // =========================================================================

    /// Close a period now. Returns `None` if it was already closed.
    ///
    /// # Errors
    ///
    /// Returns `PeriodNotFound` or a storage error.
    pub async fn close_period(&self, period_id: PeriodId) -> Result<Option<Invoice>> {
        let period = self
            .store
            .get_period(&period_id)?
            .ok_or_else(|| BillingError::PeriodNotFound {
                period_id: period_id.to_string(),
            })?;
        let _guard = self.lock(period.assessor_id).await;
        let mut book = self.load_book(&period.assessor_id)?;

        let invoice =
            book.close_period(period_id, CloseReason::Manual, &self.policy, Utc::now())?;
        self.commit(&mut book)?;

        match &invoice {
            Some(invoice) => self.invoice_issued(invoice),
            None => tracing::debug!(period_id = %period_id, "Period already closed"),
        }
        Ok(invoice)
    }

    /// Close one assessor's periods that have passed their calendar end.
    ///
    /// # Errors
    ///
    /// Returns `AssessorNotFound` or a storage error.
    pub async fn sweep_assessor(
        &self,
        assessor_id: AssessorId,
        now: DateTime<Utc>,
    ) -> Result<Vec<Invoice>> {
        let _guard = self.lock(assessor_id).await;
        let mut book = self.load_book(&assessor_id)?;
        let issued = book.sweep_due(&self.policy, now)?;
        self.commit(&mut book)?;

        for invoice in &issued {
            self.invoice_issued(invoice);
        }
        Ok(issued)
    }

    /// Sweep every assessor concurrently.
    ///
    /// Failures are logged and counted; they do not stop other assessors.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the assessor list cannot be read.
    pub async fn sweep_all(&self, now: DateTime<Utc>) -> Result<SweepReport> {
        let assessor_ids = self.store.list_assessor_ids()?;

        let results: Vec<(AssessorId, Result<Vec<Invoice>>)> = stream::iter(assessor_ids)
            .map(|assessor_id| async move {
                (assessor_id, self.sweep_assessor(assessor_id, now).await)
            })
            .buffer_unordered(SWEEP_CONCURRENCY)
            .collect()
            .await;

        let mut report = SweepReport {
            assessors_checked: results.len(),
            ..SweepReport::default()
        };
        for (assessor_id, result) in results {
            match result {
                Ok(issued) => report.invoices_issued += issued.len(),
                Err(e) => {
                    report.failures += 1;
                    tracing::error!(assessor_id = %assessor_id, error = %e, "Period sweep failed");
                }
            }
        }
        Ok(report)
    }

    // =========================================================================
    // Invoices
    // =========================================================================

    /// Get an invoice.
    ///
    /// # Errors
    ///
    /// Returns `InvoiceNotFound` or a storage error.
    pub fn get_invoice(&self, invoice_id: &InvoiceId) -> Result<Invoice> {
        self.store
            .get_invoice(invoice_id)?
            .ok_or_else(|| BillingError::InvoiceNotFound {
                invoice_id: invoice_id.to_string(),
            })
    }

    /// List an assessor's invoices, newest first.
    ///
    /// # Errors
    ///
    /// Returns `AssessorNotFound` or a storage error.
    pub fn list_invoices(
        &self,
        assessor_id: &AssessorId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Invoice>> {
        self.get_assessor(assessor_id)?;
        Ok(self
            .store
            .list_invoices_by_assessor(assessor_id, limit, offset)?)
    }

    /// List an assessor's credit notes, newest first.
    ///
    /// # Errors
    ///
    /// Returns `AssessorNotFound` or a storage error.
    pub fn list_credit_notes(
        &self,
        assessor_id: &AssessorId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<CreditNote>> {
        self.get_assessor(assessor_id)?;
        Ok(self
            .store
            .list_credit_notes_by_assessor(assessor_id, limit, offset)?)
    }

    /// List the credit notes issued against one invoice.
    ///
    /// # Errors
    ///
    /// Returns a storage error.
    pub fn invoice_credit_notes(&self, invoice_id: &InvoiceId) -> Result<Vec<CreditNote>> {
        Ok(self.store.list_credit_notes_by_invoice(invoice_id)?)
    }

    /// Apply a successful payment.
    ///
    /// Repeated event IDs and payments for already paid invoices come back
    /// with `duplicate` set and change nothing.
    ///
    /// # Errors
    ///
    /// Returns `InvoiceNotFound`, `InvalidTransition` or a storage error.
    pub async fn record_payment(
        &self,
        invoice_id: InvoiceId,
        payment: PaymentInput,
    ) -> Result<PaymentUpdate> {
        let assessor_id = self.get_invoice(&invoice_id)?.assessor_id;
        let _guard = self.lock(assessor_id).await;
        if self.store.get_payment_event(&payment.event_id)?.is_some() {
            return self.duplicate(&invoice_id, &payment.event_id);
        }

        let invoice = self.get_invoice(&invoice_id)?;
        let mut book = self.load_book(&assessor_id)?;
        let receipt = match book.record_payment(
            invoice,
            &payment.method,
            &payment.event_id,
            payment.paid_at,
            &self.policy,
            Utc::now(),
        ) {
            Err(BillingError::DuplicatePaymentEvent { .. }) => {
                return self.duplicate(&invoice_id, &payment.event_id)
            }
            other => other?,
        };
        self.commit(&mut book)?;

        tracing::info!(
            assessor_id = %assessor_id,
            invoice_id = %invoice_id,
            amount_pence = receipt.invoice.amount_due_pence(),
            on_time = receipt.on_time,
            "Invoice paid"
        );
        if let Some(level) = receipt.promoted_to {
            tracing::info!(assessor_id = %assessor_id, level = level.as_str(), "Assessor promoted");
        }

        Ok(PaymentUpdate {
            invoice: receipt.invoice,
            duplicate: false,
            on_time: Some(receipt.on_time),
            promoted_to: receipt.promoted_to,
        })
    }

    /// Apply a terminal payment failure.
    ///
    /// # Errors
    ///
    /// Returns `InvoiceNotFound`, `InvalidTransition` or a storage error.
    pub async fn record_payment_failure(
        &self,
        invoice_id: InvoiceId,
        event_id: &str,
    ) -> Result<PaymentUpdate> {
        let assessor_id = self.get_invoice(&invoice_id)?.assessor_id;
        let _guard = self.lock(assessor_id).await;
        if self.store.get_payment_event(event_id)?.is_some() {
            return self.duplicate(&invoice_id, event_id);
        }

        let invoice = self.get_invoice(&invoice_id)?;
        let mut book = self.load_book(&assessor_id)?;
        let invoice = match book.record_payment_failure(invoice, event_id, Utc::now()) {
            Err(BillingError::DuplicatePaymentEvent { .. }) => {
                return self.duplicate(&invoice_id, event_id)
            }
            other => other?,
        };
        self.commit(&mut book)?;

        tracing::warn!(
            assessor_id = %assessor_id,
            invoice_id = %invoice_id,
            amount_pence = invoice.amount_due_pence(),
            "Invoice payment failed"
        );
        Ok(PaymentUpdate {
            invoice,
            duplicate: false,
            on_time: None,
            promoted_to: None,
        })
    }

    /// Mark an invoice disputed.
    ///
    /// # Errors
    ///
    /// Returns `InvoiceNotFound`, `InvalidTransition` or a storage error.
    pub async fn mark_disputed(
        &self,
        invoice_id: InvoiceId,
        event_id: Option<&str>,
    ) -> Result<PaymentUpdate> {
        let assessor_id = self.get_invoice(&invoice_id)?.assessor_id;
        let _guard = self.lock(assessor_id).await;
        if let Some(event_id) = event_id {
            if self.store.get_payment_event(event_id)?.is_some() {
                return self.duplicate(&invoice_id, event_id);
            }
        }

        let invoice = self.get_invoice(&invoice_id)?;
        let already_disputed = invoice.status == InvoiceStatus::Disputed;
        let mut book = self.load_book(&assessor_id)?;
        let invoice = book.mark_disputed(invoice, event_id, Utc::now())?;
        self.commit(&mut book)?;

        if !already_disputed {
            tracing::warn!(
                assessor_id = %assessor_id,
                invoice_id = %invoice_id,
                "Invoice disputed"
            );
        }
        Ok(PaymentUpdate {
            invoice,
            duplicate: already_disputed,
            on_time: None,
            promoted_to: None,
        })
    }

    /// Acknowledge a provider outcome for an invoice that is already paid or
    /// cancelled.
    ///
    /// The event ID is stored so redeliveries short-circuit, and the invoice
    /// comes back unchanged with `duplicate` set.
    ///
    /// # Errors
    ///
    /// Returns `InvoiceNotFound`, `InvalidTransition` while the invoice is
    /// still open, or a storage error.
    pub async fn acknowledge_stale_event(
        &self,
        invoice_id: InvoiceId,
        event_id: &str,
        outcome: PaymentOutcome,
    ) -> Result<PaymentUpdate> {
        let assessor_id = self.get_invoice(&invoice_id)?.assessor_id;
        let _guard = self.lock(assessor_id).await;
        if self.store.get_payment_event(event_id)?.is_some() {
            return self.duplicate(&invoice_id, event_id);
        }

        let invoice = self.get_invoice(&invoice_id)?;
        let mut book = self.load_book(&assessor_id)?;
        book.record_stale_event(&invoice, event_id, outcome, Utc::now())?;
        self.commit(&mut book)?;

        tracing::warn!(
            assessor_id = %assessor_id,
            invoice_id = %invoice_id,
            event_id = %event_id,
            outcome = ?outcome,
            status = invoice.status.as_str(),
            "Payment outcome arrived after settlement - recorded, invoice unchanged"
        );
        Ok(PaymentUpdate {
            invoice,
            duplicate: true,
            on_time: None,
            promoted_to: None,
        })
    }

    /// Resolve a disputed invoice.
    ///
    /// # Errors
    ///
    /// Returns `InvoiceNotFound`, `PeriodNotFound`, `InvalidTransition` or a
    /// storage error.
    pub async fn resolve_dispute(
        &self,
        invoice_id: InvoiceId,
        resolution: DisputeResolution,
    ) -> Result<ResolutionReceipt> {
        let assessor_id = self.get_invoice(&invoice_id)?.assessor_id;
        let _guard = self.lock(assessor_id).await;

        let invoice = self.get_invoice(&invoice_id)?;
        let period = self
            .store
            .get_period(&invoice.period_id)?
            .ok_or_else(|| BillingError::PeriodNotFound {
                period_id: invoice.period_id.to_string(),
            })?;
        let existing = self.store.list_credit_notes_by_invoice(&invoice_id)?;
        let mut book = self.load_book(&assessor_id)?;
        let receipt = book.resolve_dispute(
            invoice,
            &period,
            &existing,
            resolution,
            &self.policy,
            Utc::now(),
        )?;
        self.commit(&mut book)?;

        tracing::info!(
            assessor_id = %assessor_id,
            invoice_id = %invoice_id,
            status = receipt.invoice.status.as_str(),
            refund_pence = receipt.credit_note.as_ref().map_or(0, |c| c.amount_pence),
            "Dispute resolved"
        );
        Ok(receipt)
    }

    /// Issue a credit note against an invoice.
    ///
    /// # Errors
    ///
    /// Returns `InvoiceNotFound`, `PeriodNotFound`, `InvalidLeadRef`,
    /// `InvalidAmount`, `OverCredit` or a storage error.
    pub async fn issue_credit(
        &self,
        invoice_id: InvoiceId,
        request: CreditRequest,
    ) -> Result<CreditNote> {
        let assessor_id = self.get_invoice(&invoice_id)?.assessor_id;
        let _guard = self.lock(assessor_id).await;

        let invoice = self.get_invoice(&invoice_id)?;
        let period = self
            .store
            .get_period(&invoice.period_id)?
            .ok_or_else(|| BillingError::PeriodNotFound {
                period_id: invoice.period_id.to_string(),
            })?;
        let existing = self.store.list_credit_notes_by_invoice(&invoice_id)?;
        let mut book = self.load_book(&assessor_id)?;
        let note = book.issue_credit(&invoice, &period, &existing, request, Utc::now())?;
        self.commit(&mut book)?;

        tracing::info!(
            assessor_id = %assessor_id,
            invoice_id = %invoice_id,
            credit_note_id = %note.id,
            amount_pence = note.amount_pence,
            mode = ?note.mode,
            "Credit note issued"
        );
        Ok(note)
    }

    fn duplicate(&self, invoice_id: &InvoiceId, event_id: &str) -> Result<PaymentUpdate> {
        tracing::info!(
            invoice_id = %invoice_id,
            event_id = %event_id,
            "Duplicate payment event ignored"
        );
        Ok(PaymentUpdate {
            invoice: self.get_invoice(invoice_id)?,
            duplicate: true,
            on_time: None,
            promoted_to: None,
        })
    }

    /// Log a new invoice and start collection when it is auto-charged.
    fn invoice_issued(&self, invoice: &Invoice) {
        tracing::info!(
            assessor_id = %invoice.assessor_id,
            invoice_id = %invoice.id,
            period_id = %invoice.period_id,
            amount_pence = invoice.amount_pence,
            credit_applied_pence = invoice.credit_applied_pence,
            reason = ?invoice.close_reason,
            "Invoice issued"
        );

        let Some(gateway) = self.gateway.clone() else {
            return;
        };
        if !invoice.auto_charge
            || invoice.status != InvoiceStatus::Pending
            || invoice.amount_due_pence() == 0
        {
            return;
        }

        let invoice = invoice.clone();
        tokio::spawn(async move {
            match gateway.charge_invoice(&invoice).await {
                Ok(attempt) if attempt.success => tracing::info!(
                    invoice_id = %invoice.id,
                    provider_ref = ?attempt.provider_ref,
                    "Invoice collection started"
                ),
                Ok(attempt) => tracing::warn!(
                    invoice_id = %invoice.id,
                    provider_ref = ?attempt.provider_ref,
                    "Payment provider declined invoice collection"
                ),
                Err(e) => tracing::warn!(
                    invoice_id = %invoice.id,
                    error = %e,
                    "Payment gateway charge failed"
                ),
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use epc_billing_core::{CreditMode, PostcodePricing};
    use epc_billing_store::MemoryStore;

    use crate::gateway::{ChargeAttempt, GatewayError};

    struct RecordingGateway {
        charged: std::sync::Mutex<Vec<InvoiceId>>,
    }

    #[async_trait]
    impl PaymentGateway for RecordingGateway {
        async fn charge_invoice(
            &self,
            invoice: &Invoice,
        ) -> std::result::Result<ChargeAttempt, GatewayError> {
            self.charged.lock().unwrap().push(invoice.id);
            Ok(ChargeAttempt {
                success: true,
                provider_ref: Some(format!("pi_{}", invoice.id)),
            })
        }
    }

    fn engine_with(store: Arc<MemoryStore>) -> BillingEngine {
        BillingEngine::new(
            store,
            BillingPolicy::default(),
            Arc::new(PostcodePricing::default()),
            None,
        )
    }

    async fn registered(engine: &BillingEngine) -> AssessorId {
        engine
            .register_assessor(NewAssessor {
                assessor_id: None,
                display_name: "Green Homes EPC".into(),
                email: None,
            })
            .await
            .unwrap()
            .id
    }

    fn lead(assessor_id: AssessorId, n: u32) -> LeadChargeRequest {
        LeadChargeRequest {
            assessor_id,
            lead_id: format!("lead-{n}"),
            postcode: "M1 1AE".into(),
            amount_pence: None,
        }
    }

    #[tokio::test]
    async fn thirty_default_leads_issue_one_invoice() {
        let engine = engine_with(Arc::new(MemoryStore::new()));
        let id = registered(&engine).await;

        let mut invoices = Vec::new();
        for n in 0..30 {
            let receipt = engine.record_lead_charge(lead(id, n)).await.unwrap();
            invoices.extend(receipt.invoice);
        }

        assert_eq!(invoices.len(), 1);
        assert_eq!(invoices[0].amount_pence, 45_000);
        assert_eq!(invoices[0].lead_count, 30);
        let summary = engine.billing_summary(&id).unwrap();
        assert_eq!(summary.current_period_spend_pence, 0);
        assert_eq!(summary.outstanding_invoice_count, 1);
    }

    #[tokio::test]
    async fn idle_assessor_locks_are_pruned() {
        let engine = engine_with(Arc::new(MemoryStore::new()));
        let held_id = AssessorId::generate();
        let held = engine.lock(held_id).await;

        for _ in 0..LOCK_PRUNE_THRESHOLD * 2 {
            drop(engine.lock(AssessorId::generate()).await);
        }

        let locks = engine.locks.lock().await;
        assert!(locks.len() <= LOCK_PRUNE_THRESHOLD);
        assert!(locks.contains_key(&held_id));
        drop(locks);
        drop(held);
    }

    #[tokio::test]
    async fn lead_charged_in_closed_period_is_duplicate() {
        let engine = engine_with(Arc::new(MemoryStore::new()));
        let id = registered(&engine).await;
        let receipt = engine.record_lead_charge(lead(id, 1)).await.unwrap();
        engine.close_period(receipt.period_id).await.unwrap().unwrap();

        let err = engine.record_lead_charge(lead(id, 1)).await.unwrap_err();
        assert!(matches!(err, BillingError::DuplicateLeadCharge { .. }));
    }

    #[tokio::test]
    async fn concurrent_charges_keep_spend_consistent() {
        let engine = Arc::new(engine_with(Arc::new(MemoryStore::new())));
        let id = registered(&engine).await;

        let handles: Vec<_> = (0..20)
            .map(|n| {
                let engine = Arc::clone(&engine);
                tokio::spawn(async move { engine.record_lead_charge(lead(id, n)).await })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let summary = engine.billing_summary(&id).unwrap();
        assert_eq!(summary.current_period_spend_pence, 20 * 1_500);
        assert_eq!(summary.current_period_lead_count, 20);
    }

    #[tokio::test]
    async fn failed_commit_leaves_no_trace() {
        let store = Arc::new(MemoryStore::new());
        let engine = engine_with(Arc::clone(&store));
        let id = registered(&engine).await;

        store.set_fail_commits(true);
        let err = engine.record_lead_charge(lead(id, 1)).await.unwrap_err();
        assert!(matches!(err, BillingError::Storage(_)));

        store.set_fail_commits(false);
        let summary = engine.billing_summary(&id).unwrap();
        assert_eq!(summary.current_period_spend_pence, 0);
        assert!(summary.current_period_id.is_none());
        engine.record_lead_charge(lead(id, 1)).await.unwrap();
    }

    #[tokio::test]
    async fn duplicate_payment_event_is_swallowed() {
        let engine = engine_with(Arc::new(MemoryStore::new()));
        let id = registered(&engine).await;
        let receipt = engine.record_lead_charge(lead(id, 1)).await.unwrap();
        let invoice = engine.close_period(receipt.period_id).await.unwrap().unwrap();

        let payment = PaymentInput {
            method: "card".into(),
            event_id: "evt_1".into(),
            paid_at: Utc::now(),
        };
        let first = engine.record_payment(invoice.id, payment.clone()).await.unwrap();
        let second = engine.record_payment(invoice.id, payment).await.unwrap();

        assert!(!first.duplicate);
        assert!(second.duplicate);
        assert_eq!(second.invoice.status, InvoiceStatus::Paid);
        let assessor = engine.get_assessor(&id).unwrap();
        assert_eq!(assessor.total_successful_payments, 1);
        assert_eq!(assessor.lifetime_paid_pence, 1_500);
    }

    #[tokio::test]
    async fn paid_invoice_with_new_event_is_duplicate() {
        let engine = engine_with(Arc::new(MemoryStore::new()));
        let id = registered(&engine).await;
        let receipt = engine.record_lead_charge(lead(id, 1)).await.unwrap();
        let invoice = engine.close_period(receipt.period_id).await.unwrap().unwrap();

        for event_id in ["evt_a", "evt_b"] {
            engine
                .record_payment(
                    invoice.id,
                    PaymentInput {
                        method: "card".into(),
                        event_id: event_id.into(),
                        paid_at: Utc::now(),
                    },
                )
                .await
                .unwrap();
        }
        assert_eq!(engine.get_assessor(&id).unwrap().total_successful_payments, 1);
    }

    #[tokio::test]
    async fn sweep_closes_due_periods_for_all_assessors() {
        let engine = engine_with(Arc::new(MemoryStore::new()));
        let with_leads = registered(&engine).await;
        let closed_early = registered(&engine).await;
        engine.record_lead_charge(lead(with_leads, 1)).await.unwrap();
        let receipt = engine.record_lead_charge(lead(closed_early, 2)).await.unwrap();
        engine.close_period(receipt.period_id).await.unwrap();

        let later = Utc::now() + chrono::Duration::days(31);
        let report = engine.sweep_all(later).await.unwrap();

        assert_eq!(report.assessors_checked, 2);
        assert_eq!(report.failures, 0);
        // The early close left an empty period, which rolls forward.
        assert_eq!(report.invoices_issued, 1);
        let summary = engine.billing_summary(&closed_early).unwrap();
        assert!(summary.current_period_ends_at.unwrap() > later);
    }

    #[tokio::test]
    async fn credit_then_cancel_refunds_only_remainder() {
        let engine = engine_with(Arc::new(MemoryStore::new()));
        let id = registered(&engine).await;
        engine.record_lead_charge(lead(id, 1)).await.unwrap();
        let receipt = engine.record_lead_charge(lead(id, 2)).await.unwrap();
        let invoice = engine.close_period(receipt.period_id).await.unwrap().unwrap();

        engine
            .issue_credit(
                invoice.id,
                CreditRequest {
                    lead_refs: vec![LeadId::new("lead-1").unwrap()],
                    reason: "Bad contact details".into(),
                    mode: CreditMode::ApplyToFuture,
                    amount_pence: None,
                },
            )
            .await
            .unwrap();
        engine.mark_disputed(invoice.id, Some("evt_dp")).await.unwrap();
        let resolved = engine
            .resolve_dispute(
                invoice.id,
                DisputeResolution::Cancel {
                    reason: "Chargeback accepted".into(),
                },
            )
            .await
            .unwrap();

        let refund = resolved.credit_note.unwrap();
        assert_eq!(refund.amount_pence, 1_500);
        assert_eq!(refund.lead_refs, vec![LeadId::new("lead-2").unwrap()]);
        assert_eq!(resolved.invoice.status, InvoiceStatus::Cancelled);
        assert_eq!(engine.invoice_credit_notes(&invoice.id).unwrap().len(), 2);
    }

    #[tokio::test]
    async fn auto_charge_invoice_is_sent_to_gateway() {
        let gateway = Arc::new(RecordingGateway {
            charged: std::sync::Mutex::new(Vec::new()),
        });
        let engine = BillingEngine::new(
            Arc::new(MemoryStore::new()),
            BillingPolicy::default(),
            Arc::new(PostcodePricing::default()),
            Some(gateway.clone() as Arc<dyn PaymentGateway>),
        );
        let id = registered(&engine).await;
        let receipt = engine.record_lead_charge(lead(id, 1)).await.unwrap();
        let invoice = engine.close_period(receipt.period_id).await.unwrap().unwrap();

        for _ in 0..50 {
            if !gateway.charged.lock().unwrap().is_empty() {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert_eq!(*gateway.charged.lock().unwrap(), vec![invoice.id]);
    }
}
