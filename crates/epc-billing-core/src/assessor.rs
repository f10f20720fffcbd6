//! Assessor billing profile.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::tier::{TrustLevel, TrustTierTable};
use crate::AssessorId;

/// The billing-relevant view of an EPC assessor.
///
/// Owned by the billing engine and only mutated through [`crate::AssessorBook`]
/// operations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Assessor {
    /// The assessor ID.
    pub id: AssessorId,

    /// Display name (business or trading name).
    pub display_name: String,

    /// Contact email for invoices.
    pub email: Option<String>,

    /// Current trust level.
    pub trust_level: TrustLevel,

    /// Spend at which the open period is invoiced, in pence.
    pub spending_threshold_pence: i64,

    /// A lowered limit that takes effect after the next period close.
    pub pending_spending_threshold_pence: Option<i64>,

    /// Whether the threshold follows the tier maximum on promotion.
    pub auto_increase_threshold: bool,

    /// Sum of lead charges in the open period(s), in pence.
    pub current_period_spend_pence: i64,

    /// Whether new lead charges are refused.
    pub account_paused: bool,

    /// Consecutive invoices paid on or before their due date.
    pub consecutive_on_time_payments: u32,

    /// Lifetime successfully paid invoices.
    pub total_successful_payments: u32,

    /// Lifetime amount collected, in pence.
    pub lifetime_paid_pence: i64,

    /// Derived from the tier: more than one outstanding invoice allowed.
    pub can_have_multiple_open_invoices: bool,

    /// Derived from the tier: invoices are payable on NET-30 terms.
    pub net30_terms: bool,

    /// When the assessor was registered with billing.
    pub created_at: DateTime<Utc>,

    /// When the profile last changed.
    pub updated_at: DateTime<Utc>,
}

impl Assessor {
    /// Create a bronze assessor with the default bronze threshold.
    #[must_use]
    pub fn new(
        id: AssessorId,
        display_name: impl Into<String>,
        email: Option<String>,
        tiers: &TrustTierTable,
        now: DateTime<Utc>,
    ) -> Self {
        let bronze = tiers.policy(TrustLevel::Bronze);
        Self {
            id,
            display_name: display_name.into(),
            email,
            trust_level: TrustLevel::Bronze,
            spending_threshold_pence: bronze.spending_threshold_pence,
            pending_spending_threshold_pence: None,
            auto_increase_threshold: true,
            current_period_spend_pence: 0,
            account_paused: false,
            consecutive_on_time_payments: 0,
            total_successful_payments: 0,
            lifetime_paid_pence: 0,
            can_have_multiple_open_invoices: bronze.multi_invoice,
            net30_terms: bronze.net30_terms,
            created_at: now,
            updated_at: now,
        }
    }

    /// Apply a trust level and its derived capabilities.
    ///
    /// On promotion with `auto_increase_threshold`, the threshold follows the
    /// tier. The threshold is always clamped to the tier maximum.
    pub fn apply_trust_level(&mut self, level: TrustLevel, tiers: &TrustTierTable) {
        let policy = tiers.policy(level);
        let promoted = level > self.trust_level;

        self.trust_level = level;
        self.can_have_multiple_open_invoices = policy.multi_invoice;
        self.net30_terms = policy.net30_terms;

        if promoted && self.auto_increase_threshold {
            self.spending_threshold_pence = policy.spending_threshold_pence;
            self.pending_spending_threshold_pence = None;
        }

        self.spending_threshold_pence = self
            .spending_threshold_pence
            .min(policy.spending_threshold_pence);
        self.pending_spending_threshold_pence = self
            .pending_spending_threshold_pence
            .map(|p| p.min(policy.spending_threshold_pence));
    }

    /// Remaining headroom before the threshold triggers an invoice.
    #[must_use]
    pub fn remaining_before_threshold_pence(&self) -> i64 {
        (self.spending_threshold_pence - self.current_period_spend_pence).max(0)
    }
}

/// Format pence as pounds for display (`£450.00`).
#[must_use]
pub fn format_pence(pence: i64) -> String {
    let sign = if pence < 0 { "-" } else { "" };
    let abs = pence.unsigned_abs();
    format!("{sign}£{}.{:02}", abs / 100, abs % 100)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bronze() -> Assessor {
        Assessor::new(
            AssessorId::generate(),
            "Green Homes EPC",
            None,
            &TrustTierTable::default(),
            Utc::now(),
        )
    }

    #[test]
    fn new_assessor_is_bronze() {
        let assessor = bronze();
        assert_eq!(assessor.trust_level, TrustLevel::Bronze);
        assert_eq!(assessor.spending_threshold_pence, 45_000);
        assert!(!assessor.can_have_multiple_open_invoices);
        assert!(!assessor.account_paused);
    }

    #[test]
    fn promotion_raises_threshold_when_auto_increase() {
        let tiers = TrustTierTable::default();
        let mut assessor = bronze();
        assessor.apply_trust_level(TrustLevel::Gold, &tiers);
        assert_eq!(assessor.spending_threshold_pence, 90_000);
        assert!(assessor.can_have_multiple_open_invoices);
        assert!(assessor.net30_terms);
    }

    #[test]
    fn promotion_keeps_chosen_limit_without_auto_increase() {
        let tiers = TrustTierTable::default();
        let mut assessor = bronze();
        assessor.auto_increase_threshold = false;
        assessor.spending_threshold_pence = 25_000;
        assessor.apply_trust_level(TrustLevel::Silver, &tiers);
        assert_eq!(assessor.spending_threshold_pence, 25_000);
    }

    #[test]
    fn demotion_clamps_threshold() {
        let tiers = TrustTierTable::default();
        let mut assessor = bronze();
        assessor.apply_trust_level(TrustLevel::Gold, &tiers);
        assessor.apply_trust_level(TrustLevel::Bronze, &tiers);
        assert_eq!(assessor.spending_threshold_pence, 45_000);
        assert!(!assessor.can_have_multiple_open_invoices);
    }

    #[test]
    fn format_pence_as_pounds() {
        assert_eq!(format_pence(45_000), "£450.00");
        assert_eq!(format_pence(1_505), "£15.05");
        assert_eq!(format_pence(-250), "-£2.50");
    }
}
