//! Core types and the billing state machine for EPC lead billing.
//!
//! This crate has no I/O. It provides:
//!
//! - **Identifiers**: `AssessorId`, `PeriodId`, `InvoiceId`, `CreditNoteId`, `LeadId`
//! - **Ledger entities**: `Assessor`, `BillingPeriod`, `LeadCharge`, `Invoice`, `CreditNote`
//! - **Policy**: `TrustTierTable`, `BillingPolicy`, `PostcodePricing`
//! - **State machine**: `AssessorBook`, whose operations record touched
//!   entities in `LedgerChanges` for an atomic commit
//!
//! # Money
//!
//! All amounts are `i64` pence. `format_pence` renders `£450.00` for display.
//!
//! # Lifecycle
//!
//! Lead charges accumulate in an open period. The period closes into one
//! invoice when spend reaches the assessor's threshold or the period reaches
//! its calendar end. Paid invoices advance the on-time streak that drives
//! trust tier promotion:
//!
//! | tier | threshold | unlock |
//! |---|---|---|
//! | bronze | £450 | default |
//! | silver | £600 | 3 consecutive on-time payments |
//! | gold | £900 | 6 consecutive, multi-invoice, NET-30 |
//! | platinum | £1,200 | gold streak and 10 payments in total |

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod accumulator;
pub mod assessor;
pub mod book;
pub mod credit;
pub mod credit_note;
pub mod cycle;
pub mod error;
pub mod ids;
pub mod invoice;
pub mod pause;
pub mod period;
pub mod policy;
pub mod pricing;
pub mod tier;

pub use accumulator::ChargeReceipt;
pub use assessor::{format_pence, Assessor};
pub use book::{AssessorBook, BillingSummary, LedgerChanges};
pub use credit_note::{CreditMode, CreditNote, CreditNoteStatus, CreditRequest};
pub use cycle::{DisputeResolution, PaymentReceipt, ResolutionReceipt};
pub use error::{BillingError, Result};
pub use ids::{AssessorId, CreditNoteId, IdError, InvoiceId, LeadId, PeriodId};
pub use invoice::{
    CloseReason, Invoice, InvoiceStatus, PaymentEvent, PaymentOutcome, CREDIT_BALANCE_METHOD,
};
pub use pause::LimitEffect;
pub use period::{BillingPeriod, LeadCharge, PeriodStatus};
pub use policy::{
    BillingPolicy, DEFAULT_MAX_OUTSTANDING_INVOICES, DEFAULT_PAYMENT_TERMS_DAYS,
    DEFAULT_PERIOD_LENGTH_DAYS, MAX_AMOUNT_PENCE, MIN_SPENDING_LIMIT_PENCE,
};
pub use pricing::{outward_code, PostcodePricing, PricingLookup, DEFAULT_LEAD_PRICE_PENCE};
pub use tier::{TierPolicy, TrustLevel, TrustTierTable};
