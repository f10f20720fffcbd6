//! Lead charge accumulation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{BillingError, Result};
use crate::invoice::{CloseReason, Invoice};
use crate::period::LeadCharge;
use crate::policy::{BillingPolicy, MAX_AMOUNT_PENCE};
use crate::{AssessorBook, LeadId, PeriodId};

/// Result of a recorded lead charge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChargeReceipt {
    /// The period the charge landed in.
    pub period_id: PeriodId,

    /// Period spend after the charge, in pence.
    pub new_accumulated_spend_pence: i64,

    /// Leads in the period after the charge.
    pub lead_count: u32,

    /// Charged amount in pence.
    pub amount_pence: i64,

    /// The invoice issued if the charge reached the threshold.
    pub invoice: Option<Invoice>,
}

impl AssessorBook {
    /// Check that new lead charges are accepted.
    ///
    /// # Errors
    ///
    /// Returns `AccountPaused` or `BillingBlocked`.
    pub fn ensure_chargeable(&self, policy: &BillingPolicy) -> Result<()> {
        if self.assessor.account_paused {
            return Err(BillingError::AccountPaused {
                assessor_id: self.assessor.id.to_string(),
            });
        }
        if self.is_blocked(policy) {
            return Err(BillingError::BillingBlocked {
                assessor_id: self.assessor.id.to_string(),
                outstanding: self.unsettled_count(),
            });
        }
        Ok(())
    }

    /// Add a lead charge to the open period, opening one if needed.
    ///
    /// When the period spend reaches the threshold the period is closed in
    /// the same operation and the receipt carries the invoice.
    ///
    /// Leads charged into earlier, closed periods must be rejected by the
    /// caller; this only checks the open period.
    ///
    /// # Errors
    ///
    /// Returns `AccountPaused`, `BillingBlocked`, `DuplicateLeadCharge`,
    /// `InvalidAmount`, or `NoOpenPeriod`.
    pub fn record_lead_charge(
        &mut self,
        lead_id: LeadId,
        postcode: &str,
        amount_pence: i64,
        policy: &BillingPolicy,
        now: DateTime<Utc>,
    ) -> Result<ChargeReceipt> {
        self.ensure_chargeable(policy)?;

        if self.open_periods.iter().any(|p| p.contains_lead(&lead_id)) {
            return Err(BillingError::DuplicateLeadCharge {
                lead_id: lead_id.to_string(),
            });
        }
        if amount_pence <= 0 || amount_pence > MAX_AMOUNT_PENCE {
            return Err(BillingError::InvalidAmount(format!(
                "lead charge must be between 1 and {MAX_AMOUNT_PENCE} pence, got {amount_pence}"
            )));
        }

        self.ensure_open_period(policy, now);
        let assessor_id = self.assessor.id;
        let period = self
            .open_periods
            .last_mut()
            .ok_or_else(|| BillingError::NoOpenPeriod {
                assessor_id: assessor_id.to_string(),
            })?;

        let new_spend = period.add_charge(LeadCharge {
            lead_id: lead_id.clone(),
            assessor_id,
            postcode: postcode.trim().to_string(),
            amount_pence,
            timestamp: now,
        })?;
        let period_id = period.id;
        let lead_count = period.lead_count;
        let snapshot = period.clone();

        self.changes.upsert_period(snapshot);
        self.changes.lead_charges.push((lead_id, period_id));
        self.sync_current_spend();
        self.touch_assessor(now);

        let invoice = if new_spend >= self.assessor.spending_threshold_pence {
            self.close_period(period_id, CloseReason::Threshold, policy, now)?
        } else {
            None
        };

        Ok(ChargeReceipt {
            period_id,
            new_accumulated_spend_pence: new_spend,
            lead_count,
            amount_pence,
            invoice,
        })
    }
}
