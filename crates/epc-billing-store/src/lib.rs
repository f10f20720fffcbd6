//! Storage layer for EPC lead billing.
//!
//! This crate persists assessors, billing periods, invoices, credit notes and
//! the idempotency records for lead charges and payment events.
//!
//! # Backends
//!
//! - [`MemoryStore`]: `BTreeMap`s behind a lock, for tests and local runs
//! - [`RocksStore`] (feature `rocksdb-backend`): `RocksDB` with column families
//!   for owner indexes and CBOR-encoded values
//!
//! # Atomicity
//!
//! Every billing operation produces a [`LedgerChanges`] set which is written
//! with [`Store::commit`] as one unit. A failed commit leaves nothing behind.
//!
//! # Example
//!
//! ```no_run
//! use chrono::Utc;
//! use epc_billing_core::{Assessor, AssessorBook, AssessorId, TrustTierTable};
//! use epc_billing_store::{MemoryStore, Store};
//!
//! let store = MemoryStore::new();
//! let assessor = Assessor::new(
//!     AssessorId::generate(),
//!     "Green Homes EPC",
//!     None,
//!     &TrustTierTable::default(),
//!     Utc::now(),
//! );
//! let id = assessor.id;
//! let mut book = AssessorBook::register(assessor);
//! store.commit(&book.take_changes()).unwrap();
//!
//! let book = store.load_book(&id).unwrap().unwrap();
//! assert_eq!(book.assessor().spending_threshold_pence, 45_000);
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod keys;
pub mod memory;
#[cfg(feature = "rocksdb-backend")]
pub mod rocks;
pub mod schema;

pub use error::{Result, StoreError};
pub use memory::MemoryStore;
#[cfg(feature = "rocksdb-backend")]
pub use rocks::RocksStore;

use epc_billing_core::{
    Assessor, AssessorBook, AssessorId, BillingPeriod, CreditNote, CreditNoteId, Invoice,
    InvoiceId, LeadId, LedgerChanges, PaymentEvent, PeriodId,
};

/// The storage trait defining all database operations.
///
/// Reads are point lookups and owner-index scans. All writes go through
/// [`Store::commit`].
pub trait Store: Send + Sync {
    // =========================================================================
    // Assessors
    // =========================================================================

    /// Get an assessor by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_assessor(&self, assessor_id: &AssessorId) -> Result<Option<Assessor>>;

    /// List all registered assessor IDs.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_assessor_ids(&self) -> Result<Vec<AssessorId>>;

    // =========================================================================
    // Periods
    // =========================================================================

    /// Get a billing period by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_period(&self, period_id: &PeriodId) -> Result<Option<BillingPeriod>>;

    /// List an assessor's open periods, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_open_periods(&self, assessor_id: &AssessorId) -> Result<Vec<BillingPeriod>>;

    // =========================================================================
    // Invoices
    // =========================================================================

    /// Get an invoice by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_invoice(&self, invoice_id: &InvoiceId) -> Result<Option<Invoice>>;

    /// List an assessor's invoices, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_invoices_by_assessor(
        &self,
        assessor_id: &AssessorId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Invoice>>;

    /// List an assessor's pending, failed and disputed invoices, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_outstanding_invoices(&self, assessor_id: &AssessorId) -> Result<Vec<Invoice>>;

    // =========================================================================
    // Credit notes
    // =========================================================================

    /// Get a credit note by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_credit_note(&self, credit_note_id: &CreditNoteId) -> Result<Option<CreditNote>>;

    /// List an assessor's credit notes, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_credit_notes_by_assessor(
        &self,
        assessor_id: &AssessorId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<CreditNote>>;

    /// List every credit note issued against an invoice, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_credit_notes_by_invoice(&self, invoice_id: &InvoiceId) -> Result<Vec<CreditNote>>;

    /// List an assessor's unconsumed future credit, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_available_credits(&self, assessor_id: &AssessorId) -> Result<Vec<CreditNote>>;

    // =========================================================================
    // Idempotency records
    // =========================================================================

    /// Check if a lead has already been charged.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn has_lead_charge(&self, lead_id: &LeadId) -> Result<bool>;

    /// Get an applied payment event by provider event ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_payment_event(&self, event_id: &str) -> Result<Option<PaymentEvent>>;

    // =========================================================================
    // Compound operations
    // =========================================================================

    /// Write a change set atomically, maintaining all indexes.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails; nothing is persisted in that case.
    fn commit(&self, changes: &LedgerChanges) -> Result<()>;

    /// Load the billing aggregate for an assessor.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn load_book(&self, assessor_id: &AssessorId) -> Result<Option<AssessorBook>> {
        let Some(assessor) = self.get_assessor(assessor_id)? else {
            return Ok(None);
        };
        Ok(Some(AssessorBook::new(
            assessor,
            self.list_open_periods(assessor_id)?,
            self.list_outstanding_invoices(assessor_id)?,
            self.list_available_credits(assessor_id)?,
        )))
    }
}
