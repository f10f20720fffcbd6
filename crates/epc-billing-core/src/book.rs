//! Per-assessor billing aggregate.
//!
//! An [`AssessorBook`] is the unit of serialization: the assessor, its open
//! period, its outstanding invoices, and its unconsumed future credit. Every
//! operation mutates the book in memory and records the touched entities in
//! [`LedgerChanges`], which the store commits in a single atomic write.
//! Operations are pure; the caller supplies `now`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::credit_note::CreditNote;
use crate::invoice::{Invoice, InvoiceStatus, PaymentEvent};
use crate::period::BillingPeriod;
use crate::policy::BillingPolicy;
use crate::tier::TrustLevel;
use crate::{Assessor, AssessorId, LeadId, PeriodId};

/// Entities written by a book operation.
///
/// Each vector holds at most one entry per entity ID (latest state wins).
#[derive(Debug, Clone, Default)]
pub struct LedgerChanges {
    /// Updated assessor profile.
    pub assessor: Option<Assessor>,

    /// Opened, charged, rolled or closed periods.
    pub periods: Vec<BillingPeriod>,

    /// Issued or transitioned invoices.
    pub invoices: Vec<Invoice>,

    /// Issued or consumed credit notes.
    pub credit_notes: Vec<CreditNote>,

    /// Newly charged leads, for duplicate detection.
    pub lead_charges: Vec<(LeadId, PeriodId)>,

    /// Applied payment events, for webhook idempotency.
    pub payment_events: Vec<PaymentEvent>,
}

impl LedgerChanges {
    /// Whether nothing was changed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.assessor.is_none()
            && self.periods.is_empty()
            && self.invoices.is_empty()
            && self.credit_notes.is_empty()
            && self.lead_charges.is_empty()
            && self.payment_events.is_empty()
    }

    pub(crate) fn upsert_period(&mut self, period: BillingPeriod) {
        match self.periods.iter_mut().find(|p| p.id == period.id) {
            Some(existing) => *existing = period,
            None => self.periods.push(period),
        }
    }

    pub(crate) fn upsert_invoice(&mut self, invoice: Invoice) {
        match self.invoices.iter_mut().find(|i| i.id == invoice.id) {
            Some(existing) => *existing = invoice,
            None => self.invoices.push(invoice),
        }
    }

    pub(crate) fn upsert_credit_note(&mut self, note: CreditNote) {
        match self.credit_notes.iter_mut().find(|n| n.id == note.id) {
            Some(existing) => *existing = note,
            None => self.credit_notes.push(note),
        }
    }
}

/// The billing state of one assessor, loaded under that assessor's lock.
#[derive(Debug, Clone)]
pub struct AssessorBook {
    pub(crate) assessor: Assessor,
    pub(crate) open_periods: Vec<BillingPeriod>,
    pub(crate) outstanding: Vec<Invoice>,
    pub(crate) credits: Vec<CreditNote>,
    pub(crate) changes: LedgerChanges,
}

impl AssessorBook {
    /// Assemble a book from stored state.
    ///
    /// Closed periods, settled invoices and exhausted credits are ignored.
    /// Credits are ordered oldest first for FIFO consumption.
    #[must_use]
    pub fn new(
        assessor: Assessor,
        open_periods: Vec<BillingPeriod>,
        outstanding: Vec<Invoice>,
        credits: Vec<CreditNote>,
    ) -> Self {
        let mut open_periods: Vec<_> = open_periods.into_iter().filter(BillingPeriod::is_open).collect();
        open_periods.sort_by_key(|p| p.id);
        let mut outstanding: Vec<_> = outstanding.into_iter().filter(Invoice::is_outstanding).collect();
        outstanding.sort_by_key(|i| i.id);
        let mut credits: Vec<_> = credits.into_iter().filter(CreditNote::is_available).collect();
        credits.sort_by_key(|c| c.id);

        Self {
            assessor,
            open_periods,
            outstanding,
            credits,
            changes: LedgerChanges::default(),
        }
    }

    /// Start a book for a newly registered assessor.
    #[must_use]
    pub fn register(assessor: Assessor) -> Self {
        let mut book = Self::new(assessor, Vec::new(), Vec::new(), Vec::new());
        book.changes.assessor = Some(book.assessor.clone());
        book
    }

    /// The assessor profile.
    #[must_use]
    pub const fn assessor(&self) -> &Assessor {
        &self.assessor
    }

    /// The assessor ID.
    #[must_use]
    pub const fn assessor_id(&self) -> AssessorId {
        self.assessor.id
    }

    /// Open periods, oldest first.
    #[must_use]
    pub fn open_periods(&self) -> &[BillingPeriod] {
        &self.open_periods
    }

    /// Pending, failed and disputed invoices, oldest first.
    #[must_use]
    pub fn outstanding_invoices(&self) -> &[Invoice] {
        &self.outstanding
    }

    /// Unconsumed future credit notes, oldest first.
    #[must_use]
    pub fn available_credits(&self) -> &[CreditNote] {
        &self.credits
    }

    /// Total unconsumed future credit in pence.
    #[must_use]
    pub fn credit_balance_pence(&self) -> i64 {
        self.credits.iter().map(|c| c.remaining_pence).sum()
    }

    /// Outstanding invoices that are failed or disputed.
    #[must_use]
    pub fn unsettled_count(&self) -> usize {
        self.outstanding
            .iter()
            .filter(|i| matches!(i.status, InvoiceStatus::Failed | InvoiceStatus::Disputed))
            .count()
    }

    /// Whether outstanding invoices prevent new billing.
    ///
    /// Pending invoices never block. Single-invoice tiers are blocked by one
    /// failed or disputed invoice; multi-invoice tiers only once that count
    /// reaches the policy cap.
    #[must_use]
    pub fn is_blocked(&self, policy: &BillingPolicy) -> bool {
        let limit = if self.assessor.can_have_multiple_open_invoices {
            policy.max_outstanding_invoices.max(1)
        } else {
            1
        };
        self.unsettled_count() >= limit
    }

    /// Whether this book has uncommitted changes.
    #[must_use]
    pub fn has_changes(&self) -> bool {
        !self.changes.is_empty()
    }

    /// Take the recorded changes, leaving an empty set.
    pub fn take_changes(&mut self) -> LedgerChanges {
        std::mem::take(&mut self.changes)
    }

    /// Build the read model shown on billing dashboards.
    #[must_use]
    pub fn summary(&self, policy: &BillingPolicy) -> BillingSummary {
        let a = &self.assessor;
        let current = self.open_periods.last();
        BillingSummary {
            assessor_id: a.id,
            display_name: a.display_name.clone(),
            trust_level: a.trust_level,
            spending_threshold_pence: a.spending_threshold_pence,
            pending_spending_threshold_pence: a.pending_spending_threshold_pence,
            max_spending_limit_pence: policy.tiers.policy(a.trust_level).spending_threshold_pence,
            min_spending_limit_pence: policy.min_spending_limit_pence,
            auto_increase_threshold: a.auto_increase_threshold,
            current_period_spend_pence: a.current_period_spend_pence,
            remaining_before_threshold_pence: a.remaining_before_threshold_pence(),
            current_period_id: current.map(|p| p.id),
            current_period_lead_count: self.open_periods.iter().map(|p| p.lead_count).sum(),
            current_period_ends_at: current.map(|p| p.scheduled_end),
            account_paused: a.account_paused,
            billing_blocked: self.is_blocked(policy),
            credit_balance_pence: self.credit_balance_pence(),
            outstanding_invoice_count: self.outstanding.len(),
            consecutive_on_time_payments: a.consecutive_on_time_payments,
            total_successful_payments: a.total_successful_payments,
            next_trust_level: a.trust_level.next(),
            payments_to_next_level: policy.tiers.payments_to_next_level(
                a.trust_level,
                a.consecutive_on_time_payments,
                a.total_successful_payments,
            ),
            can_have_multiple_open_invoices: a.can_have_multiple_open_invoices,
            net30_terms: a.net30_terms,
        }
    }

    // ------------------------------------------------------------------------
    // Internal helpers shared by the operation modules
    // ------------------------------------------------------------------------

    pub(crate) fn touch_assessor(&mut self, now: DateTime<Utc>) {
        self.assessor.updated_at = now;
        self.changes.assessor = Some(self.assessor.clone());
    }

    /// Re-derive the mirrored spend from the open periods.
    pub(crate) fn sync_current_spend(&mut self) {
        self.assessor.current_period_spend_pence = self
            .open_periods
            .iter()
            .map(|p| p.accumulated_spend_pence)
            .sum();
    }

    pub(crate) fn can_open_period(&self, policy: &BillingPolicy) -> bool {
        !self.assessor.account_paused && !self.is_blocked(policy)
    }

    /// Open a period if none is open and billing is allowed.
    pub(crate) fn ensure_open_period(&mut self, policy: &BillingPolicy, now: DateTime<Utc>) -> bool {
        if !self.open_periods.is_empty() || !self.can_open_period(policy) {
            return false;
        }
        let period = BillingPeriod::open(self.assessor.id, now, policy.period_length());
        self.changes.upsert_period(period.clone());
        self.open_periods.push(period);
        true
    }

    pub(crate) fn replace_outstanding(&mut self, invoice: &Invoice) {
        self.outstanding.retain(|i| i.id != invoice.id);
        if invoice.is_outstanding() {
            self.outstanding.push(invoice.clone());
            self.outstanding.sort_by_key(|i| i.id);
        }
    }
}

/// Dashboard view of an assessor's billing state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BillingSummary {
    /// The assessor ID.
    pub assessor_id: AssessorId,
    /// Display name.
    pub display_name: String,
    /// Current trust level.
    pub trust_level: TrustLevel,
    /// Active threshold in pence.
    pub spending_threshold_pence: i64,
    /// Lowered threshold waiting for the next close.
    pub pending_spending_threshold_pence: Option<i64>,
    /// Largest selectable limit at the current tier.
    pub max_spending_limit_pence: i64,
    /// Smallest selectable limit.
    pub min_spending_limit_pence: i64,
    /// Whether the threshold follows tier promotions.
    pub auto_increase_threshold: bool,
    /// Spend in the open period.
    pub current_period_spend_pence: i64,
    /// Headroom before the next invoice.
    pub remaining_before_threshold_pence: i64,
    /// The open period, if any.
    pub current_period_id: Option<PeriodId>,
    /// Leads in the open period.
    pub current_period_lead_count: u32,
    /// Calendar end of the open period.
    pub current_period_ends_at: Option<DateTime<Utc>>,
    /// Whether lead purchasing is paused.
    pub account_paused: bool,
    /// Whether outstanding invoices block new charges.
    pub billing_blocked: bool,
    /// Unconsumed future credit in pence.
    pub credit_balance_pence: i64,
    /// Pending, failed or disputed invoices.
    pub outstanding_invoice_count: usize,
    /// Current on-time streak.
    pub consecutive_on_time_payments: u32,
    /// Lifetime successful payments.
    pub total_successful_payments: u32,
    /// The next tier, if any.
    pub next_trust_level: Option<TrustLevel>,
    /// On-time payments still needed for the next tier.
    pub payments_to_next_level: Option<u32>,
    /// Multi-invoice capability.
    pub can_have_multiple_open_invoices: bool,
    /// NET-30 terms.
    pub net30_terms: bool,
}
