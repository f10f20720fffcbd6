//! Billing periods and lead charges.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{BillingError, Result};
use crate::{AssessorId, LeadId, PeriodId};

/// Status of a billing period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PeriodStatus {
    /// Accepting lead charges.
    Open,
    /// Closed into an invoice.
    Closed,
}

/// A single lead purchase appended to a billing period.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeadCharge {
    /// The lead that was assigned.
    pub lead_id: LeadId,

    /// The assessor who received the lead.
    pub assessor_id: AssessorId,

    /// Property postcode the lead belongs to.
    pub postcode: String,

    /// Price of the lead in pence.
    pub amount_pence: i64,

    /// When the charge was recorded.
    pub timestamp: DateTime<Utc>,
}

/// A span of lead charges that closes into exactly one invoice.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BillingPeriod {
    /// Period ID.
    pub id: PeriodId,

    /// Owning assessor.
    pub assessor_id: AssessorId,

    /// When the period opened.
    pub start_date: DateTime<Utc>,

    /// Calendar end at which the sweep closes the period.
    pub scheduled_end: DateTime<Utc>,

    /// When the period actually closed.
    pub end_date: Option<DateTime<Utc>>,

    /// Sum of charges in pence.
    pub accumulated_spend_pence: i64,

    /// Number of charges.
    pub lead_count: u32,

    /// Charges in arrival order.
    pub charges: Vec<LeadCharge>,

    /// Open or closed.
    pub status: PeriodStatus,
}

impl BillingPeriod {
    /// Open a new, empty period.
    #[must_use]
    pub fn open(assessor_id: AssessorId, now: DateTime<Utc>, length: Duration) -> Self {
        Self {
            id: PeriodId::generate(),
            assessor_id,
            start_date: now,
            scheduled_end: now + length,
            end_date: None,
            accumulated_spend_pence: 0,
            lead_count: 0,
            charges: Vec::new(),
            status: PeriodStatus::Open,
        }
    }

    /// Whether the period is open.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.status == PeriodStatus::Open
    }

    /// Whether the period has passed its calendar end.
    #[must_use]
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.is_open() && self.scheduled_end <= now
    }

    /// Whether a lead was charged into this period.
    #[must_use]
    pub fn contains_lead(&self, lead_id: &LeadId) -> bool {
        self.charges.iter().any(|c| &c.lead_id == lead_id)
    }

    /// Find the charge for a lead.
    #[must_use]
    pub fn charge_for(&self, lead_id: &LeadId) -> Option<&LeadCharge> {
        self.charges.iter().find(|c| &c.lead_id == lead_id)
    }

    /// Append a charge and return the new accumulated spend.
    ///
    /// # Errors
    ///
    /// Returns `InvalidAmount` if the spend would overflow. The period is
    /// left unchanged.
    pub fn add_charge(&mut self, charge: LeadCharge) -> Result<i64> {
        let spend = self
            .accumulated_spend_pence
            .checked_add(charge.amount_pence)
            .ok_or_else(|| {
                BillingError::InvalidAmount(format!(
                    "period spend overflows adding {} pence",
                    charge.amount_pence
                ))
            })?;
        self.accumulated_spend_pence = spend;
        self.lead_count += 1;
        self.charges.push(charge);
        Ok(spend)
    }

    /// Mark the period closed. Returns `false` if it was already closed.
    pub fn close(&mut self, now: DateTime<Utc>) -> bool {
        if !self.is_open() {
            return false;
        }
        self.status = PeriodStatus::Closed;
        self.end_date = Some(now);
        true
    }

    /// Advance an empty period past `now` by whole period lengths.
    pub fn roll_forward(&mut self, now: DateTime<Utc>, length: Duration) {
        while self.scheduled_end <= now {
            self.start_date = self.scheduled_end;
            self.scheduled_end += length;
        }
    }
}
