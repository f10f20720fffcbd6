//! Assessor-controlled settings: pause, spending limit, and admin tier override.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{BillingError, Result};
use crate::policy::BillingPolicy;
use crate::tier::TrustLevel;
use crate::AssessorBook;

/// When a spending limit change takes effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LimitEffect {
    /// Applied to the open period now.
    Immediate,
    /// Applied after the next period close.
    AfterNextInvoice,
}

impl AssessorBook {
    /// Pause lead purchasing. Returns `false` if already paused.
    ///
    /// Periods, invoices and coverage areas are untouched.
    pub fn pause(&mut self, now: DateTime<Utc>) -> bool {
        if self.assessor.account_paused {
            return false;
        }
        self.assessor.account_paused = true;
        self.touch_assessor(now);
        true
    }

    /// Resume lead purchasing. Returns `false` if not paused.
    pub fn resume(&mut self, now: DateTime<Utc>) -> bool {
        if !self.assessor.account_paused {
            return false;
        }
        self.assessor.account_paused = false;
        self.touch_assessor(now);
        true
    }

    /// Select a spending limit.
    ///
    /// Raising the limit, or lowering it while the current spend is still
    /// below it, applies immediately. Otherwise the limit waits for the next
    /// close. Choosing the tier maximum keeps the limit tracking future
    /// promotions.
    ///
    /// # Errors
    ///
    /// Returns `ThresholdNotAllowed` outside the policy minimum and the tier
    /// maximum.
    pub fn set_spending_limit(
        &mut self,
        limit_pence: i64,
        policy: &BillingPolicy,
        now: DateTime<Utc>,
    ) -> Result<LimitEffect> {
        let max = policy
            .tiers
            .policy(self.assessor.trust_level)
            .spending_threshold_pence;
        let min = policy.min_spending_limit_pence;
        if limit_pence < min || limit_pence > max {
            return Err(BillingError::ThresholdNotAllowed {
                requested: limit_pence,
                min,
                max,
            });
        }

        let a = &mut self.assessor;
        a.auto_increase_threshold = limit_pence == max;
        let effect = if limit_pence >= a.spending_threshold_pence
            || a.current_period_spend_pence < limit_pence
        {
            a.spending_threshold_pence = limit_pence;
            a.pending_spending_threshold_pence = None;
            LimitEffect::Immediate
        } else {
            a.pending_spending_threshold_pence = Some(limit_pence);
            LimitEffect::AfterNextInvoice
        };
        self.touch_assessor(now);
        Ok(effect)
    }

    /// Set the trust level by admin decision. Returns the previous level.
    ///
    /// This is the only path that lowers a tier. Counters are kept.
    pub fn override_trust_level(
        &mut self,
        level: TrustLevel,
        policy: &BillingPolicy,
        now: DateTime<Utc>,
    ) -> TrustLevel {
        let previous = self.assessor.trust_level;
        self.assessor.apply_trust_level(level, &policy.tiers);
        self.touch_assessor(now);
        previous
    }
}
