//! Billing policy configuration.

use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::tier::TrustTierTable;

/// Default billing period length in days.
pub const DEFAULT_PERIOD_LENGTH_DAYS: u32 = 30;

/// Default payment terms in days (`due_at = issued_at + terms`).
pub const DEFAULT_PAYMENT_TERMS_DAYS: u32 = 30;

/// Default cap on failed or disputed invoices for multi-invoice tiers.
pub const DEFAULT_MAX_OUTSTANDING_INVOICES: usize = 3;

/// Smallest spending limit an assessor may select, in pence (£50).
pub const MIN_SPENDING_LIMIT_PENCE: i64 = 5_000;

/// Largest single lead charge or credit note, in pence (£100,000).
pub const MAX_AMOUNT_PENCE: i64 = 10_000_000;

/// Engine-wide billing policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillingPolicy {
    /// Calendar length of a billing period.
    pub period_length_days: u32,

    /// Days between invoice issue and due date.
    pub payment_terms_days: u32,

    /// Outstanding invoice cap for tiers that allow multiple invoices.
    pub max_outstanding_invoices: usize,

    /// Smallest selectable spending limit in pence.
    pub min_spending_limit_pence: i64,

    /// Per-tier thresholds and capabilities.
    pub tiers: TrustTierTable,
}

impl Default for BillingPolicy {
    fn default() -> Self {
        Self {
            period_length_days: DEFAULT_PERIOD_LENGTH_DAYS,
            payment_terms_days: DEFAULT_PAYMENT_TERMS_DAYS,
            max_outstanding_invoices: DEFAULT_MAX_OUTSTANDING_INVOICES,
            min_spending_limit_pence: MIN_SPENDING_LIMIT_PENCE,
            tiers: TrustTierTable::default(),
        }
    }
}

impl BillingPolicy {
    /// Period length as a duration.
    #[must_use]
    pub fn period_length(&self) -> Duration {
        Duration::days(i64::from(self.period_length_days.max(1)))
    }

    /// Payment terms as a duration.
    #[must_use]
    pub fn payment_terms(&self) -> Duration {
        Duration::days(i64::from(self.payment_terms_days))
    }
}
