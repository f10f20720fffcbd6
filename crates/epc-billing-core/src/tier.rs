//! Trust tiers and the trust-level evaluator.
//!
//! Assessors start at bronze and earn higher tiers through on-time invoice
//! payments. Tiers are monotonic: a late or failed payment resets the on-time
//! streak but never demotes. Only an admin override lowers a tier.

use serde::{Deserialize, Serialize};

// ============================================================================
// Constants
// ============================================================================

/// Bronze spending threshold in pence (£450).
pub const BRONZE_THRESHOLD_PENCE: i64 = 45_000;

/// Silver spending threshold in pence (£600).
pub const SILVER_THRESHOLD_PENCE: i64 = 60_000;

/// Gold spending threshold in pence (£900).
pub const GOLD_THRESHOLD_PENCE: i64 = 90_000;

/// Platinum spending threshold in pence (£1,200).
pub const PLATINUM_THRESHOLD_PENCE: i64 = 120_000;

/// Consecutive on-time payments required for silver.
pub const SILVER_ON_TIME_STREAK: u32 = 3;

/// Consecutive on-time payments required for gold (three more after silver).
pub const GOLD_ON_TIME_STREAK: u32 = 6;

/// Lifetime successful payments required for platinum.
pub const PLATINUM_TOTAL_PAYMENTS: u32 = 10;

/// Assessor trust level.
///
/// Ordering follows progression: `Bronze < Silver < Gold < Platinum`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrustLevel {
    /// Default tier for new assessors.
    Bronze,
    /// Unlocked after three consecutive on-time payments.
    Silver,
    /// Multi-invoice and NET-30 terms.
    Gold,
    /// Highest tier, gated on payment volume.
    Platinum,
}

impl TrustLevel {
    /// All levels, lowest first.
    pub const ALL: [Self; 4] = [Self::Bronze, Self::Silver, Self::Gold, Self::Platinum];

    /// The next level up, if any.
    #[must_use]
    pub const fn next(self) -> Option<Self> {
        match self {
            Self::Bronze => Some(Self::Silver),
            Self::Silver => Some(Self::Gold),
            Self::Gold => Some(Self::Platinum),
            Self::Platinum => None,
        }
    }

    /// Get the level name as a string.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Bronze => "bronze",
            Self::Silver => "silver",
            Self::Gold => "gold",
            Self::Platinum => "platinum",
        }
    }
}

/// Policy attached to a single trust level.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierPolicy {
    /// Spending threshold (and maximum selectable limit) in pence.
    pub spending_threshold_pence: i64,

    /// Consecutive on-time payments needed to hold this level.
    pub min_consecutive_on_time: u32,

    /// Lifetime successful payments needed to hold this level.
    pub min_total_payments: u32,

    /// Whether more than one invoice may be outstanding at a time.
    pub multi_invoice: bool,

    /// Whether invoices are payable on NET-30 terms rather than auto-charged.
    pub net30_terms: bool,
}

/// Static policy data for all trust levels.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrustTierTable {
    /// Bronze policy.
    pub bronze: TierPolicy,
    /// Silver policy.
    pub silver: TierPolicy,
    /// Gold policy.
    pub gold: TierPolicy,
    /// Platinum policy.
    pub platinum: TierPolicy,
}

impl Default for TrustTierTable {
    fn default() -> Self {
        Self {
            bronze: TierPolicy {
                spending_threshold_pence: BRONZE_THRESHOLD_PENCE,
                min_consecutive_on_time: 0,
                min_total_payments: 0,
                multi_invoice: false,
                net30_terms: false,
            },
            silver: TierPolicy {
                spending_threshold_pence: SILVER_THRESHOLD_PENCE,
                min_consecutive_on_time: SILVER_ON_TIME_STREAK,
                min_total_payments: 0,
                multi_invoice: false,
                net30_terms: false,
            },
            gold: TierPolicy {
                spending_threshold_pence: GOLD_THRESHOLD_PENCE,
                min_consecutive_on_time: GOLD_ON_TIME_STREAK,
                min_total_payments: 0,
                multi_invoice: true,
                net30_terms: true,
            },
            platinum: TierPolicy {
                spending_threshold_pence: PLATINUM_THRESHOLD_PENCE,
                min_consecutive_on_time: GOLD_ON_TIME_STREAK,
                min_total_payments: PLATINUM_TOTAL_PAYMENTS,
                multi_invoice: true,
                net30_terms: true,
            },
        }
    }
}

impl TrustTierTable {
    /// Get the policy for a level.
    #[must_use]
    pub const fn policy(&self, level: TrustLevel) -> &TierPolicy {
        match level {
            TrustLevel::Bronze => &self.bronze,
            TrustLevel::Silver => &self.silver,
            TrustLevel::Gold => &self.gold,
            TrustLevel::Platinum => &self.platinum,
        }
    }

    /// The highest level whose requirements are met by the given counters.
    #[must_use]
    pub fn qualifying_level(&self, consecutive_on_time: u32, total_payments: u32) -> TrustLevel {
        TrustLevel::ALL
            .iter()
            .rev()
            .copied()
            .find(|level| {
                let policy = self.policy(*level);
                consecutive_on_time >= policy.min_consecutive_on_time
                    && total_payments >= policy.min_total_payments
            })
            .unwrap_or(TrustLevel::Bronze)
    }

    /// Recompute a trust level after a payment.
    ///
    /// Pure function of the counters; never returns a level below `current`.
    #[must_use]
    pub fn evaluate(
        &self,
        current: TrustLevel,
        consecutive_on_time: u32,
        total_payments: u32,
    ) -> TrustLevel {
        current.max(self.qualifying_level(consecutive_on_time, total_payments))
    }

    /// Payments still needed to reach the next level, assuming all are on time.
    ///
    /// Returns `None` at the top level.
    #[must_use]
    pub fn payments_to_next_level(
        &self,
        current: TrustLevel,
        consecutive_on_time: u32,
        total_payments: u32,
    ) -> Option<u32> {
        let next = self.policy(current.next()?);
        let streak_gap = next
            .min_consecutive_on_time
            .saturating_sub(consecutive_on_time);
        let volume_gap = next.min_total_payments.saturating_sub(total_payments);
        Some(streak_gap.max(volume_gap))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn levels_are_ordered() {
        assert!(TrustLevel::Bronze < TrustLevel::Silver);
        assert!(TrustLevel::Silver < TrustLevel::Gold);
        assert!(TrustLevel::Gold < TrustLevel::Platinum);
    }

    #[test]
    fn three_on_time_payments_reach_silver() {
        let table = TrustTierTable::default();
        assert_eq!(table.evaluate(TrustLevel::Bronze, 2, 2), TrustLevel::Bronze);
        assert_eq!(table.evaluate(TrustLevel::Bronze, 3, 3), TrustLevel::Silver);
    }

    #[test]
    fn gold_needs_three_more_after_silver() {
        let table = TrustTierTable::default();
        assert_eq!(table.evaluate(TrustLevel::Silver, 5, 5), TrustLevel::Silver);
        assert_eq!(table.evaluate(TrustLevel::Silver, 6, 6), TrustLevel::Gold);
    }

    #[test]
    fn platinum_is_gated_on_volume() {
        let table = TrustTierTable::default();
        assert_eq!(table.evaluate(TrustLevel::Gold, 9, 9), TrustLevel::Gold);
        assert_eq!(table.evaluate(TrustLevel::Gold, 6, 10), TrustLevel::Platinum);
    }

    #[test]
    fn evaluation_never_demotes() {
        let table = TrustTierTable::default();
        assert_eq!(table.evaluate(TrustLevel::Gold, 0, 7), TrustLevel::Gold);
    }

    #[test]
    fn payments_to_next_level() {
        let table = TrustTierTable::default();
        assert_eq!(table.payments_to_next_level(TrustLevel::Bronze, 1, 1), Some(2));
        assert_eq!(table.payments_to_next_level(TrustLevel::Silver, 0, 4), Some(6));
        assert_eq!(table.payments_to_next_level(TrustLevel::Gold, 6, 7), Some(3));
        assert_eq!(table.payments_to_next_level(TrustLevel::Platinum, 9, 20), None);
    }

    #[test]
    fn only_gold_and_above_allow_multiple_invoices() {
        let table = TrustTierTable::default();
        assert!(!table.policy(TrustLevel::Silver).multi_invoice);
        assert!(table.policy(TrustLevel::Gold).multi_invoice);
        assert!(table.policy(TrustLevel::Platinum).net30_terms);
    }
}
